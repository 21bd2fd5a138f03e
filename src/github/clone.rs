//! Clone job monitoring
//!
//! Submits a clone to the backend and polls the job until it finishes. A target
//! that is already cloned short-circuits to success without ever starting the
//! poller. Failed status fetches are transient; only the job reporting `error`
//! (or stalling past the configured window) ends the attempt.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{CloneJobStatus, CloneRequest, CloneSubmission, DashboardApi};
use crate::core::{Config, PollTask, StopFlag, TaskSlot};
use crate::error::{CrewdeckError, Result};
use crate::github::error_handler::error_message;

/// State of the clone stage
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CloneState {
    #[default]
    Idle,
    Submitting,
    Cloning {
        clone_id: String,
        progress: u8,
        status: CloneJobStatus,
        target_path: String,
    },
    Done {
        target_path: String,
        already_existed: bool,
    },
    Failed {
        message: String,
    },
}

/// Successful clone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOutcome {
    pub target_path: String,
    /// The target was already cloned and no job ran
    pub already_existed: bool,
}

struct CloneContext {
    api: Arc<dyn DashboardApi>,
    clone_id: String,
    target_path: String,
    state: Arc<watch::Sender<CloneState>>,
    poll_interval: Duration,
    stall_timeout: Duration,
}

/// Clone job monitor
pub struct CloneMonitor {
    api: Arc<dyn DashboardApi>,
    poll_interval: Duration,
    stall_timeout: Duration,
    state: Arc<watch::Sender<CloneState>>,
    task: TaskSlot,
}

impl CloneMonitor {
    pub fn new(api: Arc<dyn DashboardApi>, config: &Config) -> Self {
        let (state, _) = watch::channel(CloneState::Idle);
        Self {
            api,
            poll_interval: config.polling.clone_poll_interval(),
            stall_timeout: config.polling.clone_stall_timeout(),
            state: Arc::new(state),
            task: TaskSlot::new(),
        }
    }

    pub fn state(&self) -> CloneState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CloneState> {
        self.state.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.task.is_active()
    }

    /// Submit a clone and wait for it to finish
    pub async fn submit(&self, request: CloneRequest) -> Result<CloneOutcome> {
        self.task.cancel();
        self.state.send_replace(CloneState::Submitting);
        info!(
            repo = %format!("{}/{}", request.owner, request.repo),
            branch = %request.branch,
            target = %request.target_path,
            "submitting clone"
        );

        let submission = match self.api.submit_clone(&request).await {
            Ok(submission) => submission,
            Err(err) => {
                self.state.send_replace(CloneState::Failed {
                    message: error_message(&err),
                });
                return Err(err);
            }
        };

        let (clone_id, target_path) = match submission {
            CloneSubmission::AlreadyExists { target_path } => {
                info!(target = %target_path, "repository already cloned");
                self.state.send_replace(CloneState::Done {
                    target_path: target_path.clone(),
                    already_existed: true,
                });
                return Ok(CloneOutcome {
                    target_path,
                    already_existed: true,
                });
            }
            CloneSubmission::Started {
                clone_id,
                target_path,
            } => (clone_id, target_path),
        };

        self.state.send_replace(CloneState::Cloning {
            clone_id: clone_id.clone(),
            progress: 0,
            status: CloneJobStatus::Pending,
            target_path: target_path.clone(),
        });

        let (done_tx, done_rx) = oneshot::channel();
        let ctx = CloneContext {
            api: self.api.clone(),
            clone_id,
            target_path,
            state: self.state.clone(),
            poll_interval: self.poll_interval,
            stall_timeout: self.stall_timeout,
        };
        self.task
            .replace(PollTask::spawn(move |stop| poll_clone(ctx, stop, done_tx)));

        let outcome = done_rx.await.unwrap_or(Err(CrewdeckError::Cancelled));
        self.task.cancel();
        outcome
    }

    /// Stop polling; a pending `submit` resolves with `Cancelled`
    pub fn cancel(&self) {
        self.task.cancel();
    }

    /// Forget the last clone attempt
    pub fn reset(&self) {
        self.task.cancel();
        self.state.send_replace(CloneState::Idle);
    }
}

async fn poll_clone(ctx: CloneContext, stop: StopFlag, done: oneshot::Sender<Result<CloneOutcome>>) {
    let mut progress = 0u8;
    let mut status = CloneJobStatus::Pending;
    let mut last_advance = Instant::now();

    loop {
        tokio::time::sleep(ctx.poll_interval).await;
        if stop.is_stopped() {
            return;
        }

        // a fetch that never answers still counts against the stall window
        let budget = ctx.stall_timeout.saturating_sub(last_advance.elapsed());
        let response = tokio::time::timeout(budget, ctx.api.clone_status(&ctx.clone_id)).await;
        if stop.is_stopped() {
            return;
        }

        match response {
            Err(_) => {
                debug!(clone_id = %ctx.clone_id, "clone status fetch timed out");
            }
            Ok(Err(e)) => {
                debug!(clone_id = %ctx.clone_id, error = %e, "clone status fetch failed, will retry");
            }
            Ok(Ok(job)) => {
                let reported = job.progress.min(100);
                let advanced = reported > progress || job.status != status;
                progress = progress.max(reported);
                status = job.status;

                match job.status {
                    CloneJobStatus::Done => {
                        info!(clone_id = %ctx.clone_id, target = %ctx.target_path, "clone finished");
                        ctx.state.send_replace(CloneState::Done {
                            target_path: ctx.target_path.clone(),
                            already_existed: false,
                        });
                        let _ = done.send(Ok(CloneOutcome {
                            target_path: ctx.target_path,
                            already_existed: false,
                        }));
                        return;
                    }
                    CloneJobStatus::Error => {
                        let message = job
                            .error
                            .unwrap_or_else(|| "clone job reported an error".to_string());
                        warn!(clone_id = %ctx.clone_id, %message, "clone failed");
                        ctx.state.send_replace(CloneState::Failed {
                            message: message.clone(),
                        });
                        let _ = done.send(Err(CrewdeckError::CloneFailed(message)));
                        return;
                    }
                    CloneJobStatus::Pending | CloneJobStatus::Cloning => {
                        if advanced {
                            last_advance = Instant::now();
                            debug!(clone_id = %ctx.clone_id, progress, %status, "clone progress");
                            ctx.state.send_replace(CloneState::Cloning {
                                clone_id: ctx.clone_id.clone(),
                                progress,
                                status,
                                target_path: ctx.target_path.clone(),
                            });
                        }
                    }
                }
            }
        }

        if last_advance.elapsed() >= ctx.stall_timeout {
            let secs = ctx.stall_timeout.as_secs();
            warn!(clone_id = %ctx.clone_id, secs, "clone stalled");
            ctx.state.send_replace(CloneState::Failed {
                message: format!("no progress for {} seconds", secs),
            });
            let _ = done.send(Err(CrewdeckError::CloneStalled(secs)));
            return;
        }
    }
}
