//! Image geometry and tensor utilities

pub mod letterbox;
pub mod tensor;
