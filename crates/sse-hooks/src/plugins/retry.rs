//! Bounded reconnect after failed attempts.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    error::TransportError,
    plugin::{HookResult, Plugin, PluginContext, PluginHooks},
    transport::OpenInfo,
};

/// Reconnects after an error, up to `max_retries` times in a row.
///
/// A successful open resets the count. So does any connect the plugin did not
/// schedule itself.
#[derive(Debug, Clone)]
pub struct RetryPlugin {
    max_retries: u32,
    interval: Duration,
}

impl Default for RetryPlugin {
    fn default() -> Self {
        Self {
            max_retries: 3,
            interval: Duration::from_millis(3000),
        }
    }
}

impl RetryPlugin {
    /// Three retries, three seconds apart.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consecutive reconnects allowed after errors.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Fixed delay before each reconnect.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl Plugin for RetryPlugin {
    fn install(self: Box<Self>, ctx: &PluginContext) -> Box<dyn PluginHooks> {
        Box::new(RetryHooks {
            max_retries: self.max_retries,
            interval: self.interval,
            ctx: ctx.clone(),
            state: Arc::new(RetryState::default()),
        })
    }
}

#[derive(Default)]
struct RetryState {
    retries: AtomicU32,
    /// Set by the timer right before it reconnects.
    scheduled: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
}

struct RetryHooks {
    max_retries: u32,
    interval: Duration,
    ctx: PluginContext,
    state: Arc<RetryState>,
}

impl RetryHooks {
    fn cancel_timer(&self) {
        if let Some(timer) = self.state.timer.lock().take() {
            debug!("Cancelling pending SSE reconnect");
            timer.abort();
        }
    }

    fn schedule(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No tokio runtime, SSE reconnect not scheduled");
            return;
        };

        let state = Arc::clone(&self.state);
        let ctx = self.ctx.clone();
        let shutdown = ctx.shutdown_token();
        let interval = self.interval;

        // Held across spawn so the task cannot clear the slot before it is filled.
        let mut timer = self.state.timer.lock();
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        *timer = Some(runtime.spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => return,
                () = tokio::time::sleep(interval) => {}
            }
            // Detach first: before_connect must not abort the running timer.
            state.timer.lock().take();
            state.scheduled.store(true, Ordering::SeqCst);
            ctx.reconnect();
        }));
    }
}

impl PluginHooks for RetryHooks {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn before_connect(&self, _ctx: &PluginContext) -> HookResult {
        self.cancel_timer();
        if !self.state.scheduled.swap(false, Ordering::SeqCst) {
            self.state.retries.store(0, Ordering::SeqCst);
        }
        Ok(())
    }

    fn on_open(&self, _response: &OpenInfo, _ctx: &PluginContext) -> HookResult {
        self.state.retries.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn on_error(&self, error: &TransportError, _ctx: &PluginContext) -> HookResult {
        let retries = self.state.retries.load(Ordering::SeqCst);
        if retries >= self.max_retries {
            warn!(
                max_retries = self.max_retries,
                error = %error,
                "SSE retry limit reached"
            );
            return Ok(());
        }

        let attempt = retries + 1;
        self.state.retries.store(attempt, Ordering::SeqCst);
        info!(
            attempt,
            max_retries = self.max_retries,
            delay_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "Scheduling SSE reconnect"
        );
        self.schedule();
        Ok(())
    }

    fn on_close(&self, _ctx: &PluginContext) -> HookResult {
        self.cancel_timer();
        Ok(())
    }
}
