//! Periodic background work: session refresh and per-job status polling.
//!
//! Both loops wait one full period before their first request and stop as soon
//! as their [`CancellationToken`] fires.
use std::sync::Arc;
use std::time::Duration;

use lab_logging::{lab_debug, lab_info, lab_warn};
use threshlab_core::{JobId, SessionId};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::api::SessionApi;
use crate::{EngineEvent, EventSink};

/// Owns a background task; dropping the guard cancels it.
pub struct TaskGuard {
    token: CancellationToken,
    _guard: DropGuard,
}

impl TaskGuard {
    pub fn new() -> Self {
        let token = CancellationToken::new();
        let guard = token.clone().drop_guard();
        Self {
            token,
            _guard: guard,
        }
    }

    /// Token to hand to the task.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for TaskGuard {
    fn default() -> Self {
        Self::new()
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Re-fetches the session document every `period` until cancelled.
pub async fn refresh_session(
    api: Arc<dyn SessionApi>,
    session_id: SessionId,
    period: Duration,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
) {
    lab_info!("Session refresh started for {} every {:?}", session_id, period);
    let mut interval = ticker(period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = api.fetch_session(&session_id) => result,
        };
        if let Err(err) = &result {
            lab_warn!("Session refresh for {} failed: {}", session_id, err);
        }
        sink.emit(EngineEvent::SessionFetched {
            session_id: session_id.clone(),
            result,
        });
    }
    lab_info!("Session refresh stopped for {}", session_id);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Consecutive failures tolerated; 0 polls until cancelled or terminal.
    pub max_failures: u32,
}

/// Polls a pipeline job until it reaches a terminal status, the failure budget
/// runs out, or the token is cancelled.
pub async fn poll_job_status(
    api: Arc<dyn SessionApi>,
    job_id: JobId,
    settings: PollSettings,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
) {
    lab_info!("Polling status of job {}", job_id);
    let mut interval = ticker(settings.interval);
    let mut failures = 0u32;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = api.pipeline_status(&job_id) => result,
        };
        match result {
            Ok(report) => {
                failures = 0;
                let phase = report.phase;
                lab_debug!("Job {} is {}", job_id, phase);
                sink.emit(EngineEvent::StatusPolled {
                    job_id: job_id.clone(),
                    report,
                });
                if phase.is_terminal() {
                    lab_info!("Job {} finished: {}", job_id, phase);
                    break;
                }
            }
            Err(error) => {
                failures += 1;
                let gave_up = settings.max_failures > 0 && failures >= settings.max_failures;
                lab_warn!(
                    "Status poll {} for job {} failed: {}",
                    failures,
                    job_id,
                    error
                );
                sink.emit(EngineEvent::PollFailed {
                    job_id: job_id.clone(),
                    error,
                    gave_up,
                });
                if gave_up {
                    break;
                }
            }
        }
    }
    lab_debug!("Polling of job {} ended", job_id);
}
