//! Runs blocking verifications off the async executor.
//!
//! Each call gets its own blocking-pool thread. A caller-side deadline may cut
//! the wait short; the abandoned verification keeps running to completion,
//! including removal of its staged file.

use std::time::Duration;
use veriface_core::{Rejection, Verification, Verifier};

/// Verify `bytes` on the blocking pool, waiting at most `deadline`.
pub async fn verify(
    verifier: Verifier,
    bytes: Vec<u8>,
    deadline: Option<Duration>,
) -> Verification {
    let task = tokio::task::spawn_blocking(move || verifier.verify_gender(&bytes));

    let joined = match deadline {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(
                    deadline_secs = limit.as_secs_f32(),
                    "verification exceeded deadline"
                );
                return Verification::Rejected(Rejection::Failed(format!(
                    "timed out after {:.1}s",
                    limit.as_secs_f32()
                )));
            }
        },
        None => task.await,
    };

    joined.unwrap_or_else(|err| {
        tracing::error!(error = %err, "verification task failed");
        Verification::Rejected(Rejection::Failed(format!("worker failed: {err}")))
    })
}
