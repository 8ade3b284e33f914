//! Bounded retry with exponential back-off.
//!
//! Any flaky external call (search provider, image download, database sync)
//! can be wrapped with [`retry`]. The operation decides per failure whether
//! trying again makes sense: errors converted with `?` are
//! [transient](Retry::Transient), and [`Retry::Stop`] short-circuits the loop
//! and hands back the inner error untouched.

use std::future::Future;
use std::time::Duration;

/// Failure of a single attempt.
#[derive(Debug)]
pub enum Retry<E> {
    /// Worth another attempt (after back-off).
    Transient(E),
    /// Give up immediately and surface the inner error.
    Stop(E),
}

impl<E> Retry<E> {
    pub fn stop(err: E) -> Self {
        Self::Stop(err)
    }

    /// Classify an error using its own retryability verdict.
    pub fn when(err: E, retryable: bool) -> Self {
        match retryable {
            true => Self::Transient(err),
            false => Self::Stop(err),
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            Self::Transient(err) | Self::Stop(err) => err,
        }
    }
}

impl<E> From<E> for Retry<E> {
    fn from(err: E) -> Self {
        Self::Transient(err)
    }
}

/// Run `op` up to `attempts` times (at least once).
///
/// After each transient failure the task sleeps for the current back-off,
/// which starts at `backoff` and doubles every round. The error of the last
/// attempt is returned once attempts are exhausted.
///
/// ```
/// use imgstock_asyncutils::{Retry, retry};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let result: Result<u8, &str> = retry(3, Duration::from_millis(1), || async {
///     Err(Retry::stop("not worth it"))
/// })
/// .await;
/// assert_eq!(result, Err("not worth it"));
/// # }
/// ```
pub async fn retry<T, E, F, Fut>(attempts: usize, backoff: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Retry<E>>>,
{
    let attempts = attempts.max(1);
    let mut delay = backoff;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(Retry::Stop(err)) => return Err(err),
            Err(Retry::Transient(err)) if attempt >= attempts => return Err(err),
            Err(Retry::Transient(_)) => {
                tracing::debug!(attempt, attempts, delay_ms = delay.as_millis() as u64, "Attempt failed, backing off");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            },
        }
    }
}
