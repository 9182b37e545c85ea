//! # Worker Invocation
//!
//! The single boundary where worker failures are caught. Every error a
//! worker can produce (its own error, a timeout, a panic, an empty input)
//! leaves here as a string on the stage result.

use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::stage::{Payload, StageDescriptor, StageResult};
use crate::skills::{Worker, WorkerError};

/// Retry and timeout settings for one worker call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InvocationPolicy {
    /// `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// Extra attempts after the first failure
    pub retries: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
}

impl InvocationPolicy {
    /// Apply a descriptor's per-stage overrides
    pub fn for_stage(&self, descriptor: &StageDescriptor) -> Self {
        Self {
            timeout: descriptor.timeout.or(self.timeout),
            retries: descriptor.retries.unwrap_or(self.retries),
            retry_delay: self.retry_delay,
        }
    }
}

/// Raw outcome of invoking a worker
#[derive(Debug)]
pub struct Invocation {
    pub outcome: Result<Payload, WorkerError>,
    pub attempts: u32,
    pub duration: Duration,
}

/// Invoke `worker` under `policy`.
///
/// Empty input fails without calling the worker. Each attempt runs on its
/// own task so a panicking worker is reported as an error.
pub async fn invoke(
    worker: Arc<dyn Worker>,
    role: &str,
    input: String,
    policy: &InvocationPolicy,
) -> Invocation {
    let started = Instant::now();

    if input.trim().is_empty() {
        return Invocation {
            outcome: Err(WorkerError::new("empty input projected for worker")),
            attempts: 0,
            duration: started.elapsed(),
        };
    }

    let input: Arc<str> = Arc::from(input);
    let mut attempts = 0;
    loop {
        attempts += 1;
        let outcome = attempt(Arc::clone(&worker), role, Arc::clone(&input), policy.timeout).await;

        match outcome {
            Ok(payload) => {
                return Invocation {
                    outcome: Ok(payload),
                    attempts,
                    duration: started.elapsed(),
                }
            }
            Err(err) if attempts <= policy.retries => {
                tracing::debug!(
                    worker = worker.name(),
                    attempt = attempts,
                    error = %err,
                    "worker attempt failed, retrying"
                );
                if !policy.retry_delay.is_zero() {
                    tokio::time::sleep(policy.retry_delay).await;
                }
            }
            Err(err) => {
                return Invocation {
                    outcome: Err(err),
                    attempts,
                    duration: started.elapsed(),
                }
            }
        }
    }
}

async fn attempt(
    worker: Arc<dyn Worker>,
    role: &str,
    input: Arc<str>,
    timeout: Option<Duration>,
) -> Result<Payload, WorkerError> {
    let role = role.to_string();
    let task = tokio::spawn(async move { worker.run(&role, &input).await });

    let joined = match timeout {
        Some(limit) => {
            let abort = task.abort_handle();
            match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    abort.abort();
                    return Err(WorkerError::new(format!(
                        "worker timed out after {:.1}s",
                        limit.as_secs_f64()
                    )));
                }
            }
        }
        None => task.await,
    };

    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => Err(WorkerError::new(format!("worker panicked: {}", e))),
        Err(e) => Err(WorkerError::new(format!("worker task failed: {}", e))),
    }
}

/// Build the placeholder payload for a failed stage.
///
/// Starts from the descriptor's declared shape so downstream projections
/// see the same keys as an Ok payload, overlays any partial data, then
/// marks the payload as degraded.
pub fn placeholder_payload(shape: &Payload, error: &str, partial: Option<Payload>) -> Payload {
    let mut payload = shape.clone();
    if let Some(partial) = partial {
        payload.extend(partial);
    }
    payload.insert("degraded".to_string(), Value::Bool(true));
    payload.insert("error".to_string(), Value::String(error.to_string()));
    payload
}

/// Convert an invocation into the stage result to record
pub fn settle(descriptor: &StageDescriptor, invocation: Invocation) -> StageResult {
    let Invocation {
        outcome,
        attempts,
        duration,
    } = invocation;

    let result = match outcome {
        Ok(payload) => StageResult::ok(&descriptor.stage_id, payload),
        Err(err) => {
            let placeholder = placeholder_payload(&descriptor.placeholder, &err.message, err.partial);
            if descriptor.fatal {
                StageResult::failed(&descriptor.stage_id, placeholder, err.message)
            } else {
                StageResult::degraded(&descriptor.stage_id, placeholder, err.message)
            }
        }
    };
    result.with_timing(duration, attempts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::FnWorker;
    use crate::swarm::stage::StageStatus;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct SlowWorker;

    #[async_trait]
    impl Worker for SlowWorker {
        fn name(&self) -> &str {
            "slow"
        }

        async fn run(&self, _role: &str, _input: &str) -> Result<Payload, WorkerError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Payload::new())
        }
    }

    struct PanickingWorker;

    #[async_trait]
    impl Worker for PanickingWorker {
        fn name(&self) -> &str {
            "panicky"
        }

        async fn run(&self, _role: &str, _input: &str) -> Result<Payload, WorkerError> {
            panic!("index out of bounds")
        }
    }

    fn flaky(failures: u32, calls: Arc<AtomicU32>) -> Arc<dyn Worker> {
        Arc::new(FnWorker::new("flaky", move |_: &str, _: &str| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                Err(WorkerError::new("connection reset"))
            } else {
                Ok(json!({ "summary": "ok" }).as_object().cloned().unwrap_or_default())
            }
        }))
    }

    #[tokio::test]
    async fn test_success_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let inv = invoke(flaky(0, calls.clone()), "r", "input".into(), &InvocationPolicy::default()).await;

        assert!(inv.outcome.is_ok());
        assert_eq!(inv.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let calls = Arc::new(AtomicU32::new(0));
        let inv = invoke(flaky(1, calls.clone()), "r", "input".into(), &InvocationPolicy::default()).await;

        assert_eq!(inv.outcome.unwrap_err().message, "connection reset");
        assert_eq!(inv.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = InvocationPolicy {
            retries: 2,
            ..Default::default()
        };
        let inv = invoke(flaky(2, calls.clone()), "r", "input".into(), &policy).await;

        assert!(inv.outcome.is_ok());
        assert_eq!(inv.attempts, 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = InvocationPolicy {
            retries: 1,
            ..Default::default()
        };
        let inv = invoke(flaky(5, calls.clone()), "r", "input".into(), &policy).await;

        assert!(inv.outcome.is_err());
        assert_eq!(inv.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_input_skips_worker() {
        let calls = Arc::new(AtomicU32::new(0));
        let inv = invoke(flaky(0, calls.clone()), "r", "   ".into(), &InvocationPolicy::default()).await;

        assert!(inv.outcome.unwrap_err().message.contains("empty input"));
        assert_eq!(inv.attempts, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_an_error() {
        let policy = InvocationPolicy {
            timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        };
        let inv = invoke(Arc::new(SlowWorker), "r", "input".into(), &policy).await;

        assert!(inv.outcome.unwrap_err().message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_panic_is_an_error() {
        let inv = invoke(Arc::new(PanickingWorker), "r", "input".into(), &InvocationPolicy::default()).await;
        assert!(inv.outcome.unwrap_err().message.contains("panicked"));
    }

    #[test]
    fn test_policy_stage_overrides() {
        let base = InvocationPolicy {
            timeout: Some(Duration::from_secs(30)),
            retries: 0,
            retry_delay: Duration::from_millis(200),
        };
        let descriptor = StageDescriptor::new("s", "r").retries(3);
        let policy = base.for_stage(&descriptor);

        assert_eq!(policy.timeout, Some(Duration::from_secs(30)));
        assert_eq!(policy.retries, 3);

        let descriptor = StageDescriptor::new("s", "r").timeout(Duration::from_secs(5));
        assert_eq!(base.for_stage(&descriptor).timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_placeholder_keeps_declared_shape() {
        let descriptor = StageDescriptor::new("geo", "geo").placeholder(json!({
            "administrative_levels": {},
            "enhanced_analysis": ""
        }));
        let partial = json!({ "basic_data": { "city": "Austin" } })
            .as_object()
            .cloned()
            .unwrap();
        let invocation = Invocation {
            outcome: Err(WorkerError::new("ConnectionError: geocoder down").with_partial(partial)),
            attempts: 1,
            duration: Duration::from_millis(10),
        };

        let result = settle(&descriptor, invocation);
        assert_eq!(result.status, StageStatus::Degraded);
        assert_eq!(result.payload["administrative_levels"], json!({}));
        assert_eq!(result.payload["enhanced_analysis"], "");
        assert_eq!(result.payload["basic_data"]["city"], "Austin");
        assert_eq!(result.payload["degraded"], true);
        assert_eq!(result.error.as_deref(), Some("ConnectionError: geocoder down"));
    }

    #[test]
    fn test_fatal_stage_settles_as_failed() {
        let descriptor = StageDescriptor::new("crawl", "crawler").fatal();
        let invocation = Invocation {
            outcome: Err(WorkerError::new("site unreachable")),
            attempts: 1,
            duration: Duration::ZERO,
        };
        assert_eq!(settle(&descriptor, invocation).status, StageStatus::Failed);
    }
}
