//! Retry wrapper for read-only database queries.
//!
//! A read is retried only when its error falls into one of the
//! [`TransientKind`] categories. Every other failure, and a transient one
//! on the last attempt, comes back as a [`RetryFailure`] value so listing
//! endpoints can degrade to an empty result.

use std::{future::Future, io, time::Duration};

use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    NetworkUnavailable,
    Timeout,
    ConnectionRefused,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay slept after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    pub message: String,
    /// Whether the last error was transient, i.e. a further attempt would have been made.
    pub retryable: bool,
    pub attempts: u32,
}

fn classify_io(kind: io::ErrorKind) -> Option<TransientKind> {
    match kind {
        io::ErrorKind::ConnectionRefused => Some(TransientKind::ConnectionRefused),
        io::ErrorKind::TimedOut => Some(TransientKind::Timeout),
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => Some(TransientKind::NetworkUnavailable),
        _ => None,
    }
}

fn classify_sqlx(err: &sqlx::Error) -> Option<TransientKind> {
    match err {
        sqlx::Error::Io(e) => classify_io(e.kind()).or(Some(TransientKind::NetworkUnavailable)),
        sqlx::Error::PoolTimedOut => Some(TransientKind::Timeout),
        sqlx::Error::Tls(_) | sqlx::Error::WorkerCrashed => Some(TransientKind::NetworkUnavailable),
        _ => None,
    }
}

fn classify_message(message: &str) -> Option<TransientKind> {
    let lower = message.to_lowercase();
    if message.contains("ECONNREFUSED") || lower.contains("connection refused") {
        Some(TransientKind::ConnectionRefused)
    } else if lower.contains("timeout") || lower.contains("timed out") {
        Some(TransientKind::Timeout)
    } else if lower.contains("connection") {
        Some(TransientKind::NetworkUnavailable)
    } else {
        None
    }
}

/// Classifies an error, preferring the driver's structured error over its message.
pub fn classify(err: &anyhow::Error) -> Option<TransientKind> {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<sqlx::Error>() {
            return classify_sqlx(e);
        }
        if let Some(e) = cause.downcast_ref::<io::Error>() {
            if let Some(kind) = classify_io(e.kind()) {
                return Some(kind);
            }
        }
    }
    classify_message(&format!("{err:#}"))
}

pub async fn retry_read<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "read succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                let kind = classify(&err);
                if kind.is_some() && attempt < max_attempts {
                    let delay = policy.delay_after(attempt);
                    warn!(attempt, max_attempts, ?kind, error = %err, ?delay, "transient read failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                warn!(attempt, ?kind, error = %err, "read failed");
                return Err(RetryFailure {
                    message: err.to_string(),
                    retryable: kind.is_some(),
                    attempts: attempt,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    #[test]
    fn classifies_structured_errors_first() {
        let refused = anyhow::Error::new(sqlx::Error::Io(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "nope",
        )));
        assert_eq!(classify(&refused), Some(TransientKind::ConnectionRefused));
        assert_eq!(
            classify(&anyhow::Error::new(sqlx::Error::PoolTimedOut)),
            Some(TransientKind::Timeout)
        );
        assert_eq!(classify(&anyhow::Error::new(sqlx::Error::RowNotFound)), None);
    }

    #[test]
    fn falls_back_to_message() {
        assert_eq!(
            classify(&anyhow::anyhow!("connect ECONNREFUSED 127.0.0.1:5432")),
            Some(TransientKind::ConnectionRefused)
        );
        assert_eq!(
            classify(&anyhow::anyhow!("operation timed out")),
            Some(TransientKind::Timeout)
        );
        assert_eq!(
            classify(&anyhow::anyhow!("lost connection to server")),
            Some(TransientKind::NetworkUnavailable)
        );
        assert_eq!(classify(&anyhow::anyhow!("syntax error at or near")), None);
    }

    #[test]
    fn delays_double() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_after(1), Duration::from_secs(1));
        assert_eq!(p.delay_after(2), Duration::from_secs(2));
        assert_eq!(p.delay_after(3), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_two_backoffs() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let c = calls.clone();
        let out = retry_read(RetryPolicy::default(), move || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    anyhow::bail!("connection reset by peer");
                }
                Ok(vec![n])
            }
        })
        .await;

        assert_eq!(out, Ok(vec![3]));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_error_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let c = calls.clone();
        let out: Result<(), _> = retry_read(RetryPolicy::default(), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("column \"nme\" does not exist")
            }
        })
        .await;

        let failure = out.unwrap_err();
        assert!(!failure.retryable);
        assert_eq!(failure.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let out: Result<(), _> = retry_read(RetryPolicy::default(), || async {
            anyhow::bail!("request timeout")
        })
        .await;

        let failure = out.unwrap_err();
        assert!(failure.retryable);
        assert_eq!(failure.attempts, 3);
        assert_eq!(failure.message, "request timeout");
    }
}
