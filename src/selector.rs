//! Hardware and precision selection
//!
//! Decides, once per session, whether the quantized model runs on an
//! accelerator or the float model runs on the CPU, then opens the session.
//! The policy itself is the pure [`decide`] function; [`SessionSelector`]
//! gathers its inputs from the injected catalog and the model directory.

use crate::{
    backends::catalog::{BackendCatalog, ComputeBackend, ReadyState, CPU_BACKEND},
    config::{AcceleratorPreference, Precision, SegmentationConfig},
    error::{Result, SegmentationError},
    inference::{InferenceBackend, InferenceSession},
    models::{ModelArtifact, ModelArtifacts},
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Factory trait for creating inference backends
///
/// Lets the selector open sessions without knowing which runtime backs them.
pub trait BackendFactory: Send + Sync {
    /// Load `artifact` bound to the named compute backend
    ///
    /// # Errors
    /// - Model loading or session creation failures
    fn create_backend(
        &self,
        artifact: &ModelArtifact,
        backend_name: &str,
        intra_threads: usize,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// Runtime name for diagnostics
    fn name(&self) -> &'static str;
}

/// Outcome of the selection policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionDecision {
    pub precision: Precision,
    pub backend: String,
}

/// Apply the selection policy
///
/// 1. A ready accelerator and a quantized artifact: quantized on the accelerator.
/// 2. Otherwise a float artifact: float on the CPU.
/// 3. Otherwise no usable combination exists.
///
/// # Errors
/// - `Configuration` when neither branch applies
pub fn decide(
    accelerator: Option<&ComputeBackend>,
    has_quantized: bool,
    has_float: bool,
) -> Result<SelectionDecision> {
    if let Some(backend) = accelerator.filter(|b| b.is_ready()) {
        if has_quantized {
            return Ok(SelectionDecision {
                precision: Precision::Quantized,
                backend: backend.name.clone(),
            });
        }
    }

    if has_float {
        return Ok(SelectionDecision {
            precision: Precision::Float,
            backend: CPU_BACKEND.to_string(),
        });
    }

    let reason = match accelerator {
        Some(backend) if backend.is_ready() => "no quantized or float model is available",
        Some(_) => "the accelerator is not ready and no float model is available",
        None => "no accelerator is present and no float model is available",
    };
    Err(SegmentationError::configuration(format!(
        "No usable backend: {reason}"
    )))
}

/// Opens inference sessions according to the selection policy
pub struct SessionSelector {
    config: SegmentationConfig,
    catalog: Arc<dyn BackendCatalog>,
    factory: Box<dyn BackendFactory>,
}

impl SessionSelector {
    #[must_use]
    pub fn new(
        config: SegmentationConfig,
        catalog: Arc<dyn BackendCatalog>,
        factory: Box<dyn BackendFactory>,
    ) -> Self {
        Self {
            config,
            catalog,
            factory,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Create a session bound to the selected precision and backend
    ///
    /// Artifacts are located before any backend is prepared or loaded, so a
    /// missing model fails without partial state.
    ///
    /// # Errors
    /// - `Configuration` when no artifact exists or no usable backend remains
    /// - `BackendPreparation` when readying the accelerator fails
    /// - Errors from the backend factory while loading the model
    #[instrument(skip(self), fields(model_dir = %self.config.model_dir.display()))]
    pub async fn create_session(&self) -> Result<InferenceSession> {
        let artifacts = ModelArtifacts::locate(&self.config)?;

        let accelerator = match self.config.accelerator {
            AcceleratorPreference::CpuOnly => {
                debug!("Accelerators disabled by configuration");
                None
            },
            AcceleratorPreference::Auto => self.prepare_accelerator().await?,
        };

        self.catalog.register_certified().await?;

        let decision = decide(
            accelerator.as_ref(),
            artifacts.quantized().is_some(),
            artifacts.float().is_some(),
        )?;

        let artifact = artifacts.get(decision.precision).ok_or_else(|| {
            SegmentationError::configuration(format!(
                "Selected {} model is missing",
                decision.precision
            ))
        })?;

        info!(
            precision = %decision.precision,
            backend = %decision.backend,
            runtime = self.factory.name(),
            "Opening inference session for {}",
            artifact.path.display()
        );

        let backend =
            self.factory
                .create_backend(artifact, &decision.backend, self.config.intra_threads)?;
        backend.metadata().validate()?;

        Ok(InferenceSession::new(backend))
    }

    /// Blocking variant of [`Self::create_session`]
    ///
    /// # Errors
    /// - Same conditions as [`Self::create_session`]
    pub fn create_session_blocking(&self) -> Result<InferenceSession> {
        futures::executor::block_on(self.create_session())
    }

    /// Find the accelerator and make it ready if it is present but unprepared
    async fn prepare_accelerator(&self) -> Result<Option<ComputeBackend>> {
        let Some(accelerator) = self.catalog.accelerator() else {
            debug!("No accelerator present");
            return Ok(None);
        };

        if accelerator.state == ReadyState::NotReady {
            info!(backend = %accelerator.name, "Preparing accelerator");
            self.catalog.ensure_ready(&accelerator.name).await?;
        }

        // readiness is re-read, preparation may have changed it
        Ok(self.catalog.find(&accelerator.name))
    }
}

impl std::fmt::Debug for SessionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSelector")
            .field("config", &self.config)
            .field("factory", &self.factory.name())
            .finish_non_exhaustive()
    }
}
