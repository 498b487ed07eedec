//! External transform capability.
//!
//! Regridding, downscaling and layering are performed by NCL scripts. The
//! pipeline only builds the request and looks at the exit status, so the
//! executable is hidden behind [`Transformer`] and can be swapped for a
//! fake in tests or a dry run.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::config::NclEnvironment;
use crate::error::{ForcingError, Result};

/// One invocation of an external processing script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    /// Interpreter executable (e.g. `ncl`)
    pub tool: String,
    /// Script handed to the interpreter
    pub script: String,
    /// Named inputs, rendered as `key="value"` command-line assignments
    pub params: Vec<(String, String)>,
}

impl TransformRequest {
    pub fn new(tool: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            script: script.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Value of the first parameter named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Argument vector following the tool name.
    pub fn args(&self) -> Vec<String> {
        self.params
            .iter()
            .map(|(key, value)| format!("{key}=\"{value}\""))
            .chain(std::iter::once(self.script.clone()))
            .collect()
    }
}

impl fmt::Display for TransformRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tool)?;
        for (key, value) in &self.params {
            write!(f, " '{key}=\"{value}\"'")?;
        }
        write!(f, " {}", self.script)
    }
}

/// Exit status of a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformStatus {
    pub success: bool,
    /// Process exit code; `None` when killed by a signal
    pub code: Option<i32>,
}

impl TransformStatus {
    pub const SUCCESS: TransformStatus = TransformStatus {
        success: true,
        code: Some(0),
    };

    pub fn failed(code: i32) -> Self {
        Self {
            success: false,
            code: Some(code),
        }
    }
}

/// Something that can apply an external transform.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Run the transform to completion and report its status.
    ///
    /// `Err` means the transform could not be started at all.
    async fn apply(&self, request: &TransformRequest) -> Result<TransformStatus>;
}

/// Runs NCL scripts as child processes.
#[derive(Debug, Clone, Default)]
pub struct NclTransformer {
    environment: NclEnvironment,
}

impl NclTransformer {
    pub fn new(environment: NclEnvironment) -> Self {
        Self { environment }
    }
}

#[async_trait]
impl Transformer for NclTransformer {
    #[instrument(skip(self, request), fields(script = %request.script))]
    async fn apply(&self, request: &TransformRequest) -> Result<TransformStatus> {
        debug!(command = %request, "Running external transform");

        let start = Instant::now();
        let status = Command::new(&request.tool)
            .args(request.args())
            .envs(self.environment.vars())
            .status()
            .await
            .map_err(|e| ForcingError::io(&request.tool, e))?;
        let elapsed = start.elapsed();

        info!(
            elapsed_secs = elapsed.as_secs_f64(),
            code = ?status.code(),
            "External transform finished"
        );

        Ok(TransformStatus {
            success: status.success(),
            code: status.code(),
        })
    }
}

/// Logs requests instead of running them and always reports success.
///
/// Requests are kept so callers can inspect what would have run.
#[derive(Debug, Default)]
pub struct DryRunTransformer {
    requests: Mutex<Vec<TransformRequest>>,
}

impl DryRunTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<TransformRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transformer for DryRunTransformer {
    async fn apply(&self, request: &TransformRequest) -> Result<TransformStatus> {
        info!(command = %request, "Dry run: skipping external transform");
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        Ok(TransformStatus::SUCCESS)
    }
}
