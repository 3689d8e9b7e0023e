//! Compute backend catalog
//!
//! The selector never talks to the platform directly. It receives a
//! [`BackendCatalog`] handle that enumerates named compute backends with a
//! readiness state and exposes the two asynchronous preparation operations.
//! Both operations are idempotent and safe to call speculatively.

use crate::error::{Result, SegmentationError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Name used for the general-purpose CPU backend
pub const CPU_BACKEND: &str = "CPU";

/// Category of a compute backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Specialized hardware (NPU, neural engine) able to run the quantized model
    Accelerator,
    /// General-purpose CPU path for the float model
    GeneralPurpose,
}

/// Readiness of a compute backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadyState {
    /// Not present on this machine
    Absent,
    /// Present but requires preparation before use
    NotReady,
    /// Usable right now
    Ready,
}

impl std::fmt::Display for ReadyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::NotReady => write!(f, "not ready"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// A named hardware execution target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeBackend {
    pub name: String,
    pub kind: BackendKind,
    pub state: ReadyState,
    pub description: String,
}

impl ComputeBackend {
    #[must_use]
    pub fn new<N: Into<String>, D: Into<String>>(
        name: N,
        kind: BackendKind,
        state: ReadyState,
        description: D,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            state,
            description: description.into(),
        }
    }

    /// The always-ready CPU backend
    #[must_use]
    pub fn cpu() -> Self {
        Self::new(
            CPU_BACKEND,
            BackendKind::GeneralPurpose,
            ReadyState::Ready,
            "General-purpose CPU inference",
        )
    }

    #[must_use]
    pub fn is_accelerator(&self) -> bool {
        self.kind == BackendKind::Accelerator
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == ReadyState::Ready
    }
}

/// Capability provider injected into the session selector
#[async_trait]
pub trait BackendCatalog: Send + Sync {
    /// Enumerate backends with their current readiness
    fn backends(&self) -> Vec<ComputeBackend>;

    /// Look up a backend by name
    fn find(&self, name: &str) -> Option<ComputeBackend> {
        self.backends().into_iter().find(|b| b.name == name)
    }

    /// First accelerator that is present on this machine
    fn accelerator(&self) -> Option<ComputeBackend> {
        self.backends()
            .into_iter()
            .find(|b| b.is_accelerator() && b.state != ReadyState::Absent)
    }

    /// Make the named backend ready
    ///
    /// # Errors
    /// - `BackendPreparation` carrying the underlying cause
    async fn ensure_ready(&self, name: &str) -> Result<()>;

    /// Register all certified backends with the inference runtime
    ///
    /// # Errors
    /// - `BackendPreparation` when registration fails
    async fn register_certified(&self) -> Result<()>;
}

/// Scripted outcome of [`StaticBackendCatalog::ensure_ready`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparationOutcome {
    Succeed,
    Fail(String),
}

/// In-memory catalog with a scriptable preparation outcome
///
/// Used to force CPU-only runs and as an injected double that simulates
/// "no accelerator present" or "accelerator present but unprepared".
#[derive(Debug)]
pub struct StaticBackendCatalog {
    backends: Mutex<Vec<ComputeBackend>>,
    outcome: PreparationOutcome,
    ensure_ready_calls: AtomicUsize,
    register_calls: AtomicUsize,
}

impl StaticBackendCatalog {
    #[must_use]
    pub fn new(backends: Vec<ComputeBackend>) -> Self {
        Self {
            backends: Mutex::new(backends),
            outcome: PreparationOutcome::Succeed,
            ensure_ready_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
        }
    }

    /// Catalog containing only the CPU backend
    #[must_use]
    pub fn cpu_only() -> Self {
        Self::new(vec![ComputeBackend::cpu()])
    }

    /// CPU plus one accelerator in the given state
    #[must_use]
    pub fn with_accelerator<N: Into<String>>(name: N, state: ReadyState) -> Self {
        Self::new(vec![
            ComputeBackend::new(name, BackendKind::Accelerator, state, "Neural processing unit"),
            ComputeBackend::cpu(),
        ])
    }

    /// Script the result of the next preparation calls
    #[must_use]
    pub fn with_outcome(mut self, outcome: PreparationOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    #[must_use]
    pub fn ensure_ready_calls(&self) -> usize {
        self.ensure_ready_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ComputeBackend>> {
        self.backends.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BackendCatalog for StaticBackendCatalog {
    fn backends(&self) -> Vec<ComputeBackend> {
        self.lock().clone()
    }

    async fn ensure_ready(&self, name: &str) -> Result<()> {
        self.ensure_ready_calls.fetch_add(1, Ordering::SeqCst);

        if let PreparationOutcome::Fail(reason) = &self.outcome {
            return Err(SegmentationError::backend_preparation(name, reason.clone()));
        }

        let mut backends = self.lock();
        let backend = backends
            .iter_mut()
            .find(|b| b.name == name)
            .ok_or_else(|| SegmentationError::backend_preparation(name, "unknown backend"))?;

        match backend.state {
            ReadyState::Absent => Err(SegmentationError::backend_preparation(
                name,
                "backend is not present on this machine",
            )),
            ReadyState::NotReady | ReadyState::Ready => {
                backend.state = ReadyState::Ready;
                Ok(())
            },
        }
    }

    async fn register_certified(&self) -> Result<()> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(feature = "onnx")]
pub use self::ort_catalog::OrtBackendCatalog;

#[cfg(feature = "onnx")]
mod ort_catalog {
    use super::{BackendCatalog, BackendKind, ComputeBackend, ReadyState};
    use crate::error::{Result, SegmentationError};
    use async_trait::async_trait;
    use ort::execution_providers::{
        CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider, QNNExecutionProvider,
    };
    use std::sync::{Mutex, PoisonError};

    /// Catalog backed by the execution providers compiled into ONNX Runtime
    ///
    /// Execution providers are either linked in or not, so accelerators are
    /// reported as `Ready` or `Absent`; there is no preparation step to run.
    #[derive(Debug, Default)]
    pub struct OrtBackendCatalog {
        pub(super) certified: Mutex<Vec<String>>,
    }

    impl OrtBackendCatalog {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Names registered by the last `register_certified` call
        #[must_use]
        pub fn certified(&self) -> Vec<String> {
            self.certified
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        fn state_of(available: bool) -> ReadyState {
            if available {
                ReadyState::Ready
            } else {
                ReadyState::Absent
            }
        }
    }

    #[async_trait]
    impl BackendCatalog for OrtBackendCatalog {
        fn backends(&self) -> Vec<ComputeBackend> {
            let qnn = OrtExecutionProvider::is_available(&QNNExecutionProvider::default())
                .unwrap_or(false);
            let coreml = OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

            vec![
                ComputeBackend::new(
                    "QNN",
                    BackendKind::Accelerator,
                    Self::state_of(qnn),
                    "Qualcomm neural processing unit (HTP)",
                ),
                ComputeBackend::new(
                    "CoreML",
                    BackendKind::Accelerator,
                    Self::state_of(coreml),
                    "Apple Neural Engine (macOS only)",
                ),
                ComputeBackend::cpu(),
            ]
        }

        async fn ensure_ready(&self, name: &str) -> Result<()> {
            match self.find(name) {
                Some(backend) if backend.is_ready() => Ok(()),
                Some(_) => Err(SegmentationError::backend_preparation(
                    name,
                    "execution provider is not available in this ONNX Runtime build",
                )),
                None => Err(SegmentationError::backend_preparation(name, "unknown backend")),
            }
        }

        async fn register_certified(&self) -> Result<()> {
            let ready: Vec<String> = self
                .backends()
                .into_iter()
                .filter(ComputeBackend::is_ready)
                .map(|b| b.name)
                .collect();
            log::debug!("Certified execution providers: {}", ready.join(", "));
            *self.certified.lock().unwrap_or_else(PoisonError::into_inner) = ready;
            Ok(())
        }
    }
}
