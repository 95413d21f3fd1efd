//! Run completion polling
//!
//! Waits on the tokio timer between status checks instead of blocking a
//! worker thread, and gives up as soon as the caller's cancellation token
//! fires.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::RelayError;
use crate::assistant::{AssistantApi, RunStatus};

/// Fixed-interval polling budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 30,
        }
    }
}

/// Poll until the run completes. Returns the number of status checks made.
pub async fn wait_for_run(
    assistant: &dyn AssistantApi,
    thread_id: &str,
    run_id: &str,
    policy: PollPolicy,
    cancel: &CancellationToken,
) -> Result<u32, RelayError> {
    for attempt in 1..=policy.max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
            _ = tokio::time::sleep(policy.interval) => {}
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
            status = assistant.run_status(thread_id, run_id) => {
                status.map_err(RelayError::RunStatusFailed)?
            }
        };
        debug!(run_id, attempt, status = status.as_str(), "run status");

        if status == RunStatus::Completed {
            return Ok(attempt);
        }
        if status.is_failure() {
            return Err(RelayError::RunFailed(status));
        }
    }

    Err(RelayError::RunTimeout {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::FakeAssistant;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_completes_on_first_terminal_status() {
        let assistant = FakeAssistant::new().with_statuses(&[
            RunStatus::Queued,
            RunStatus::InProgress,
            RunStatus::Completed,
        ]);
        let attempts = wait_for_run(
            &assistant,
            "thread_1",
            "run_1",
            PollPolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(attempts, 3);
        assert_eq!(assistant.count("run_status"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_thirty_one_second_polls() {
        let assistant = FakeAssistant::new();
        let started = Instant::now();
        let result = wait_for_run(
            &assistant,
            "thread_1",
            "run_1",
            PollPolicy::default(),
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(RelayError::RunTimeout { attempts: 30 })));
        assert_eq!(assistant.count("run_status"), 30);
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_states_stop_immediately() {
        for terminal in [RunStatus::Failed, RunStatus::Cancelled, RunStatus::Expired] {
            let assistant = FakeAssistant::new().with_statuses(&[terminal]);
            let result = wait_for_run(
                &assistant,
                "thread_1",
                "run_1",
                PollPolicy::default(),
                &CancellationToken::new(),
            )
            .await;
            assert!(matches!(result, Err(RelayError::RunFailed(s)) if s == terminal));
            assert_eq!(assistant.count("run_status"), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_polling() {
        let assistant = FakeAssistant::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = wait_for_run(
            &assistant,
            "thread_1",
            "run_1",
            PollPolicy::default(),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(RelayError::Cancelled)));
        assert_eq!(assistant.count("run_status"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_error_is_reported() {
        let assistant = FakeAssistant::new().failing("run_status");
        let result = wait_for_run(
            &assistant,
            "thread_1",
            "run_1",
            PollPolicy::default(),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(RelayError::RunStatusFailed(_))));
    }
}
