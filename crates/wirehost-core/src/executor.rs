//! Surface operations run through the execution bridge.
//!
//! [`SurfaceExecutor`] is what handlers talk to. It owns an
//! [`OwnerBridge`] and exposes one async method per surface operation.
//!
//! Script evaluation on the host surface is known to fail spuriously, so
//! [`SurfaceExecutor::evaluate_script`] retries with a fixed delay (see
//! [`RetryPolicy`]). After the last attempt the underlying fault is logged
//! and a generic [`ScriptError::Exhausted`] is returned instead.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::atoms::{atom_script, Atom, RESULT_SLOT};
use crate::bridge::{BridgeError, OwnerBridge};
use crate::driver::{Cookie, SurfaceFault};
use crate::protocol::AtomReply;

/// Attempts made before a script evaluation is reported as failed.
pub const MAX_SCRIPT_ATTEMPTS: u32 = 10;

/// Pause between script evaluation attempts.
pub const SCRIPT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Errors from script evaluation.
#[derive(Error, Debug)]
pub enum ScriptError {
    /// Every attempt failed.
    #[error("script execution failed after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// The bridge could not run the evaluation.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// The atom output was not a `{status, value}` document.
    #[error("undecodable atom result: {0}")]
    Decode(#[from] serde_json::Error),

    /// The script ran but left no result behind.
    #[error("script produced no result")]
    MissingResult,
}

/// Bound and delay for script evaluation retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_SCRIPT_ATTEMPTS,
            delay: SCRIPT_RETRY_DELAY,
        }
    }
}

/// Async front for every operation on the surface.
#[derive(Clone)]
pub struct SurfaceExecutor {
    bridge: OwnerBridge,
    retry: RetryPolicy,
}

impl SurfaceExecutor {
    /// Creates an executor with the default retry policy.
    pub fn new(bridge: OwnerBridge) -> Self {
        Self::with_retry_policy(bridge, RetryPolicy::default())
    }

    pub fn with_retry_policy(bridge: OwnerBridge, retry: RetryPolicy) -> Self {
        Self { bridge, retry }
    }

    pub fn bridge(&self) -> &OwnerBridge {
        &self.bridge
    }

    /// Evaluates `script` on the owner thread and reads back [`RESULT_SLOT`].
    ///
    /// Each attempt is one bridged call running the script followed by the
    /// read-back. Surface faults are retried; bridge failures are not.
    pub async fn evaluate_script(&self, script: String) -> Result<Option<String>, ScriptError> {
        let script = Arc::new(script);
        let attempts = self.retry.max_attempts.max(1);
        let mut last_fault = None;

        for attempt in 1..=attempts {
            let script = Arc::clone(&script);
            let outcome = self
                .bridge
                .run(move |surface| {
                    surface.evaluate(&script)?;
                    surface.evaluate(RESULT_SLOT)
                })
                .await?;

            match outcome {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(attempt, "Script evaluation succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(fault) => {
                    debug!(attempt, error = %fault, "Script evaluation failed");
                    last_fault = Some(fault);
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.retry.delay).await;
            }
        }

        warn!(
            attempts,
            last_error = ?last_fault.map(|fault| fault.to_string()),
            "Script evaluation retries exhausted"
        );
        Err(ScriptError::Exhausted { attempts })
    }

    /// Runs `atom` with `args` and decodes its `{status, value}` reply.
    pub async fn call_atom(&self, atom: Atom, args: Vec<Value>) -> Result<AtomReply, ScriptError> {
        let script = atom_script(atom, &args);
        let text = self
            .evaluate_script(script)
            .await?
            .ok_or(ScriptError::MissingResult)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn navigate(&self, uri: Url) -> Result<Result<(), SurfaceFault>, BridgeError> {
        let start = Instant::now();
        let result = self.bridge.run(move |surface| surface.navigate(&uri)).await;
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "navigate");
        result
    }

    pub async fn capture_image(&self) -> Result<Result<Vec<u8>, SurfaceFault>, BridgeError> {
        let start = Instant::now();
        let result = self.bridge.run(|surface| surface.capture_image()).await;
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "capture_image");
        result
    }

    pub async fn cookies(&self) -> Result<Result<Vec<Cookie>, SurfaceFault>, BridgeError> {
        let start = Instant::now();
        let result = self.bridge.run(|surface| surface.cookies()).await;
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "cookies");
        result
    }

    /// Goes back one history entry when the surface allows it.
    ///
    /// Returns whether navigation happened.
    pub async fn go_back(&self) -> Result<bool, BridgeError> {
        self.bridge
            .run(|surface| {
                let can = surface.can_go_back();
                if can {
                    surface.go_back();
                }
                can
            })
            .await
    }

    /// Goes forward one history entry when the surface allows it.
    ///
    /// Returns whether navigation happened.
    pub async fn go_forward(&self) -> Result<bool, BridgeError> {
        self.bridge
            .run(|surface| {
                let can = surface.can_go_forward();
                if can {
                    surface.go_forward();
                }
                can
            })
            .await
    }
}
