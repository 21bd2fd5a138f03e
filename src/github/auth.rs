//! OAuth Device Flow authorization for the dashboard's GitHub connection
//!
//! The backend performs the actual exchange with GitHub; this client requests a
//! device code, shows the user where to enter it, and polls the backend until
//! the grant completes, expires, or is denied.
//! See: https://docs.github.com/en/apps/oauth-apps/building-oauth-apps/authorizing-oauth-apps#device-flow

use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::backend::{ConnectionStatus, DashboardApi, DeviceAuthorization, DevicePollStatus};
use crate::core::{Config, PollTask, StopFlag, TaskSlot};
use crate::error::{CrewdeckError, Result};

/// Why an authorization attempt ended without a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// The device code expired before the user approved it
    Expired,
    /// The user declined the request
    Denied,
}

impl AuthFailure {
    /// Stable reason code for the presentation layer
    pub fn reason_code(&self) -> &'static str {
        match self {
            AuthFailure::Expired => "expired",
            AuthFailure::Denied => "denied",
        }
    }

    fn into_error(self) -> CrewdeckError {
        match self {
            AuthFailure::Expired => CrewdeckError::AuthorizationExpired,
            AuthFailure::Denied => CrewdeckError::AuthorizationDenied,
        }
    }
}

/// Status of the current authorization attempt
///
/// Moves forward only; `reset()` is the single way back to `Idle`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceAuthStatus {
    #[default]
    Idle,
    /// Code issued, waiting for the user
    Waiting(DeviceAuthorization),
    Complete,
    Error(AuthFailure),
}

impl DeviceAuthStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeviceAuthStatus::Complete | DeviceAuthStatus::Error(_))
    }
}

/// What the poll loop does after one response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    /// Poll again after this interval
    Reschedule(Duration),
    Complete,
    Failed(AuthFailure),
}

/// Decide the next step for a poll response
///
/// `slow_down` grows the interval by `increment`, so after `k` slow-downs the
/// interval is `initial + k * increment`.
pub fn next_poll_step(current: Duration, status: DevicePollStatus, increment: Duration) -> PollStep {
    match status {
        DevicePollStatus::AuthorizationPending => PollStep::Reschedule(current),
        DevicePollStatus::SlowDown => PollStep::Reschedule(current + increment),
        DevicePollStatus::Complete => PollStep::Complete,
        DevicePollStatus::Expired => PollStep::Failed(AuthFailure::Expired),
        DevicePollStatus::Denied => PollStep::Failed(AuthFailure::Denied),
    }
}

/// Everything the spawned poll loop needs
struct PollContext {
    api: Arc<dyn DashboardApi>,
    state_id: String,
    status: Arc<watch::Sender<DeviceAuthStatus>>,
    interval_ms: Arc<AtomicU64>,
    initial: Duration,
    increment: Duration,
    settle: Duration,
}

/// Device authorization client
pub struct DeviceAuthClient {
    api: Arc<dyn DashboardApi>,
    open_browser: bool,
    increment: Duration,
    settle: Duration,
    status: Arc<watch::Sender<DeviceAuthStatus>>,
    interval_ms: Arc<AtomicU64>,
    task: TaskSlot,
    outcome: Mutex<Option<oneshot::Receiver<Result<()>>>>,
}

impl DeviceAuthClient {
    pub fn new(api: Arc<dyn DashboardApi>, config: &Config) -> Self {
        let (status, _) = watch::channel(DeviceAuthStatus::Idle);
        Self {
            api,
            open_browser: config.open_browser,
            increment: config.polling.slow_down_increment(),
            settle: config.polling.settle_delay(),
            status: Arc::new(status),
            interval_ms: Arc::new(AtomicU64::new(0)),
            task: TaskSlot::new(),
            outcome: Mutex::new(None),
        }
    }

    /// Current status
    pub fn status(&self) -> DeviceAuthStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to status transitions
    pub fn subscribe(&self) -> watch::Receiver<DeviceAuthStatus> {
        self.status.subscribe()
    }

    /// Interval the poll loop currently waits between requests
    pub fn current_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::SeqCst))
    }

    /// Ask the backend whether GitHub is connected
    pub async fn connection_status(&self) -> Result<ConnectionStatus> {
        self.api.connection_status().await
    }

    /// Request a device code and begin polling for approval
    ///
    /// Any earlier attempt's poller is cancelled first.
    pub async fn start(&self) -> Result<DeviceAuthorization> {
        self.task.cancel();

        let authorization = self.api.start_device_flow().await?;
        info!(
            user_code = %authorization.user_code,
            interval = authorization.interval_seconds,
            "device authorization started"
        );

        if self.open_browser && !open_browser(&authorization.verification_uri) {
            warn!(url = %authorization.verification_uri, "could not open browser");
        }

        // never poll faster than once a second
        let initial = Duration::from_secs(authorization.interval_seconds.max(1));
        self.interval_ms
            .store(initial.as_millis() as u64, Ordering::SeqCst);
        self.status
            .send_replace(DeviceAuthStatus::Waiting(authorization.clone()));

        let (done_tx, done_rx) = oneshot::channel();
        *self.outcome.lock().unwrap_or_else(|e| e.into_inner()) = Some(done_rx);

        let ctx = PollContext {
            api: self.api.clone(),
            state_id: authorization.state_id.clone(),
            status: self.status.clone(),
            interval_ms: self.interval_ms.clone(),
            initial,
            increment: self.increment,
            settle: self.settle,
        };
        self.task
            .replace(PollTask::spawn(move |stop| poll_loop(ctx, stop, done_tx)));

        Ok(authorization)
    }

    /// Revoke a stale authorization, then start a fresh exchange
    ///
    /// Used when the stored token lacks the scope needed for private repositories.
    pub async fn reconnect(&self) -> Result<DeviceAuthorization> {
        info!("revoking stale GitHub authorization before reconnecting");
        self.disconnect().await?;
        self.start().await
    }

    /// Revoke the stored authorization and drop any attempt in progress
    pub async fn disconnect(&self) -> Result<()> {
        self.reset();
        self.api.disconnect().await
    }

    /// Wait for the current attempt to finish
    ///
    /// Success is signalled after the settle delay that follows `complete`.
    pub async fn wait(&self) -> Result<()> {
        let receiver = self
            .outcome
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| {
                CrewdeckError::InvalidState("No device authorization in progress".into())
            })?;

        receiver.await.unwrap_or(Err(CrewdeckError::Cancelled))
    }

    /// Stop polling; a tick already in flight will not touch state
    pub fn cancel(&self) {
        self.task.cancel();
    }

    /// Explicit retry: drop the current attempt and return to `Idle`
    pub fn reset(&self) {
        self.task.cancel();
        self.outcome
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.interval_ms.store(0, Ordering::SeqCst);
        self.status.send_replace(DeviceAuthStatus::Idle);
    }

    pub fn is_polling(&self) -> bool {
        self.task.is_active()
    }
}

async fn poll_loop(ctx: PollContext, stop: StopFlag, done: oneshot::Sender<Result<()>>) {
    let mut interval = ctx.initial;

    loop {
        tokio::time::sleep(interval).await;
        if stop.is_stopped() {
            return;
        }

        let response = ctx.api.poll_device_flow(&ctx.state_id).await;
        if stop.is_stopped() {
            return;
        }

        let status = match response {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "device authorization poll failed, retrying");
                continue;
            }
        };

        match next_poll_step(interval, status, ctx.increment) {
            PollStep::Reschedule(next) => {
                if next != interval {
                    debug!(interval_ms = next.as_millis() as u64, "slowing down device polling");
                }
                interval = next;
                ctx.interval_ms
                    .store(interval.as_millis() as u64, Ordering::SeqCst);
            }
            PollStep::Complete => {
                info!("device authorization complete");
                ctx.status.send_replace(DeviceAuthStatus::Complete);
                tokio::time::sleep(ctx.settle).await;
                if stop.is_stopped() {
                    return;
                }
                let _ = done.send(Ok(()));
                return;
            }
            PollStep::Failed(failure) => {
                warn!(reason = failure.reason_code(), "device authorization failed");
                ctx.status.send_replace(DeviceAuthStatus::Error(failure));
                let _ = done.send(Err(failure.into_error()));
                return;
            }
        }
    }
}

/// Attempt to open a URL in the default browser
///
/// Returns true if the browser was successfully launched, false otherwise.
#[allow(unused_variables)]
pub fn open_browser(url: &str) -> bool {
    #[cfg(target_os = "macos")]
    {
        Command::new("open").arg(url).spawn().is_ok()
    }
    #[cfg(target_os = "linux")]
    {
        Command::new("xdg-open").arg(url).spawn().is_ok()
    }
    #[cfg(target_os = "windows")]
    {
        Command::new("cmd")
            .args(["/C", "start", url])
            .spawn()
            .is_ok()
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        false
    }
}
