//! Single fixed-delay retry for network-facing ports that declare retry support.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Default pause before the second attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Run `op`; if it fails with an error `is_transient` accepts, wait `delay`
/// and run it exactly once more.
pub async fn retry_once<T, E, F, Fut>(
    delay: Duration,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match op().await {
        Err(err) if is_transient(&err) => {
            tracing::warn!("Transient failure, retrying once in {:?}: {}", delay, err);
            if !delay.is_zero() {
                sleep(delay).await;
            }
            op().await
        }
        other => other,
    }
}
