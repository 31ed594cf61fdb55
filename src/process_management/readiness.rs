use log::{debug, warn};
use std::future::Future;
use std::time::Duration;

/// Polls `probe` until it reports ready or `timeout` elapses.
///
/// All readiness checks (display up, service answering) go through this
/// helper so timeouts and failures are logged the same way everywhere.
/// Returns `false` on timeout; the caller decides whether that is fatal.
pub async fn wait_until_ready<F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        if probe().await {
            debug!("{} ready after {} probe(s)", what, attempt);
            return true;
        }
        if tokio::time::Instant::now() + interval > deadline {
            warn!("{} not ready after {:?} ({} probes)", what, timeout, attempt);
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn reports_ready_once_the_probe_passes() {
        let calls = AtomicU32::new(0);
        let ready = wait_until_ready(
            "test-service",
            Duration::from_secs(2),
            Duration::from_millis(10),
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { n >= 2 }
            },
        )
        .await;
        assert!(ready);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_the_timeout() {
        let ready = wait_until_ready(
            "never-ready",
            Duration::from_millis(50),
            Duration::from_millis(10),
            || async { false },
        )
        .await;
        assert!(!ready);
    }
}
