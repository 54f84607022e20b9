//! Plugin contract and the ordered hook pipeline.
//!
//! A [`Plugin`] is a factory. When the client is built, it is handed the
//! engine's [`PluginContext`] and returns a [`PluginHooks`] object, called
//! here a hook set. Each hook set exposes up to five optional callbacks. The
//! pipeline calls them in registration order for every lifecycle event.
//!
//! ```rust
//! use sse_hooks::{
//!     MessageAction, SseMessage,
//!     error::HookError,
//!     plugin::{PluginContext, PluginHooks},
//! };
//!
//! /// Drops keep-alive pings before they reach any listener.
//! struct DropPings;
//!
//! impl PluginHooks for DropPings {
//!     fn name(&self) -> &'static str {
//!         "drop_pings"
//!     }
//!
//!     fn on_message(
//!         &self,
//!         message: &SseMessage,
//!         _ctx: &PluginContext,
//!     ) -> Result<MessageAction, HookError> {
//!         if message.event == "ping" {
//!             Ok(MessageAction::Drop)
//!         } else {
//!             Ok(MessageAction::Unchanged)
//!         }
//!     }
//! }
//! ```

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Weak},
};

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    client::Shared,
    config::RequestBody,
    error::{HookError, TransportError, TransportResult},
    message::{MessageAction, SseMessage},
    state::ConnectionState,
    transport::OpenInfo,
};

/// Result of a notification hook.
pub type HookResult = Result<(), HookError>;

/// Optional callbacks at the five extension points.
///
/// Every method has a do-nothing default, so a hook set implements only what
/// it needs. Errors and panics are logged by the pipeline and never stop the
/// hooks that follow.
pub trait PluginHooks: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str {
        "plugin"
    }

    /// Before the request of a new attempt is assembled. Headers set through
    /// [`PluginContext::set_header`] here go out with that request.
    fn before_connect(&self, _ctx: &PluginContext) -> HookResult {
        Ok(())
    }

    /// After a 2xx response with a body arrived.
    fn on_open(&self, _response: &OpenInfo, _ctx: &PluginContext) -> HookResult {
        Ok(())
    }

    /// For every parsed message; see [`MessageAction`].
    fn on_message(
        &self,
        _message: &SseMessage,
        _ctx: &PluginContext,
    ) -> Result<MessageAction, HookError> {
        Ok(MessageAction::Unchanged)
    }

    /// When an attempt failed with a transport error.
    fn on_error(&self, _error: &TransportError, _ctx: &PluginContext) -> HookResult {
        Ok(())
    }

    /// When the stream ended or the client disconnected.
    fn on_close(&self, _ctx: &PluginContext) -> HookResult {
        Ok(())
    }
}

/// Factory turning the engine's context into a hook set.
///
/// Implemented for closures, so an ad-hoc plugin can be written inline:
///
/// ```rust
/// use sse_hooks::plugin::{PluginContext, PluginHooks};
///
/// struct Noop;
/// impl PluginHooks for Noop {}
///
/// let plugin = |_ctx: &PluginContext| Box::new(Noop) as Box<dyn PluginHooks>;
/// # let _ = plugin;
/// ```
pub trait Plugin: Send {
    /// Instantiate the hook set. Called exactly once per client.
    fn install(self: Box<Self>, ctx: &PluginContext) -> Box<dyn PluginHooks>;
}

impl<F> Plugin for F
where
    F: FnOnce(&PluginContext) -> Box<dyn PluginHooks> + Send,
{
    fn install(self: Box<Self>, ctx: &PluginContext) -> Box<dyn PluginHooks> {
        (*self)(ctx)
    }
}

/// Wrap a hook set that does not need the context into a [`Plugin`].
pub fn from_hooks<H: PluginHooks + 'static>(hooks: H) -> impl Plugin {
    move |_ctx: &PluginContext| Box::new(hooks) as Box<dyn PluginHooks>
}

// ---------------------------------------------------------------------------
// PluginContext
// ---------------------------------------------------------------------------

/// Capability handle shared by all plugins of one client.
///
/// Holds a non-owning reference to the engine: once the client is dropped,
/// every method degrades to a no-op (or a neutral value).
#[derive(Clone)]
pub struct PluginContext {
    engine: Weak<Shared>,
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("attached", &(self.engine.strong_count() > 0))
            .finish()
    }
}

impl PluginContext {
    pub(crate) fn new(engine: Weak<Shared>) -> Self {
        Self { engine }
    }

    fn engine(&self) -> Option<Arc<Shared>> {
        self.engine.upgrade()
    }

    /// Current target URL.
    pub fn url(&self) -> String {
        self.engine().map(|e| e.url()).unwrap_or_default()
    }

    /// Retarget future attempts. Last writer wins.
    pub fn set_url(&self, url: impl Into<String>) {
        if let Some(engine) = self.engine() {
            engine.set_url(url.into());
        }
    }

    /// Inject a header into the request of the attempt being assembled.
    ///
    /// Plugin headers are cleared at the start of every attempt and win over
    /// base and caller headers.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or value is not a valid HTTP header.
    pub fn set_header(&self, name: &str, value: &str) -> TransportResult<()> {
        let name = http::HeaderName::from_bytes(name.as_bytes())?;
        let value = http::HeaderValue::from_str(value)?;
        if let Some(engine) = self.engine() {
            engine.set_plugin_header(name, value);
        }
        Ok(())
    }

    /// Current connection state.
    pub fn ready_state(&self) -> ConnectionState {
        self.engine()
            .map(|e| e.ready_state())
            .unwrap_or(ConnectionState::Closed)
    }

    /// Cancellation token of the in-flight attempt, if there is one.
    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        self.engine().and_then(|e| e.attempt_token())
    }

    /// Token cancelled when the client is torn down.
    ///
    /// Background work a plugin spawns should stop when this fires.
    pub fn shutdown_token(&self) -> CancellationToken {
        match self.engine() {
            Some(engine) => engine.shutdown_token(),
            None => {
                let token = CancellationToken::new();
                token.cancel();
                token
            }
        }
    }

    /// Start a new attempt, superseding any in-flight one.
    pub fn connect(&self, body: Option<RequestBody>) {
        if let Some(engine) = self.engine() {
            engine.connect(body);
        }
    }

    /// Start a new attempt with the body of the most recent one.
    pub fn reconnect(&self) {
        if let Some(engine) = self.engine() {
            engine.reconnect();
        }
    }

    /// Cancel any in-flight attempt and close.
    pub fn disconnect(&self) {
        if let Some(engine) = self.engine() {
            engine.disconnect();
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run one hook, turning a panic into a [`HookError`].
fn guarded<T>(call: impl FnOnce() -> Result<T, HookError>) -> Result<T, HookError> {
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(HookError::failed(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload");
    format!("panicked: {detail}")
}

/// Ordered hook sets of one client.
#[derive(Default)]
pub(crate) struct Pipeline {
    hooks: Vec<Box<dyn PluginHooks>>,
}

impl Pipeline {
    pub(crate) const fn empty() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Install every plugin, in registration order, against `ctx`.
    pub(crate) fn install(plugins: Vec<Box<dyn Plugin>>, ctx: &PluginContext) -> Self {
        Self {
            hooks: plugins.into_iter().map(|p| p.install(ctx)).collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Run one notification hook on every plugin.
    ///
    /// `live` is checked before each hook: once it turns false (a hook
    /// superseded the attempt) the rest of the chain is skipped. Returns
    /// whether the chain ran to completion.
    fn notify<F>(&self, hook: &'static str, live: &dyn Fn() -> bool, mut call: F) -> bool
    where
        F: FnMut(&dyn PluginHooks) -> HookResult,
    {
        for plugin in &self.hooks {
            if !live() {
                return false;
            }
            tracing::trace!(plugin = plugin.name(), hook, "Running plugin hook");
            if let Err(err) = guarded(|| call(plugin.as_ref())) {
                warn!(plugin = plugin.name(), hook, error = %err, "Plugin hook failed");
            }
        }
        live()
    }

    pub(crate) fn before_connect(&self, ctx: &PluginContext, live: &dyn Fn() -> bool) -> bool {
        self.notify("before_connect", live, |p| p.before_connect(ctx))
    }

    pub(crate) fn on_open(
        &self,
        response: &OpenInfo,
        ctx: &PluginContext,
        live: &dyn Fn() -> bool,
    ) -> bool {
        self.notify("on_open", live, |p| p.on_open(response, ctx))
    }

    pub(crate) fn on_error(
        &self,
        error: &TransportError,
        ctx: &PluginContext,
        live: &dyn Fn() -> bool,
    ) -> bool {
        self.notify("on_error", live, |p| p.on_error(error, ctx))
    }

    pub(crate) fn on_close(&self, ctx: &PluginContext, live: &dyn Fn() -> bool) -> bool {
        self.notify("on_close", live, |p| p.on_close(ctx))
    }

    /// Thread a message through every `on_message` hook.
    ///
    /// Returns the surviving message, or `None` if a hook dropped it (or the
    /// attempt went stale midway). A failing hook leaves the message as it
    /// was.
    pub(crate) fn on_message(
        &self,
        message: SseMessage,
        ctx: &PluginContext,
        live: &dyn Fn() -> bool,
    ) -> Option<SseMessage> {
        let mut message = message;
        for plugin in &self.hooks {
            if !live() {
                return None;
            }
            match guarded(|| plugin.on_message(&message, ctx)) {
                Ok(MessageAction::Forward(replacement)) => message = replacement,
                Ok(MessageAction::Unchanged) => {}
                Ok(MessageAction::Drop) => {
                    tracing::debug!(
                        plugin = plugin.name(),
                        event = %message.event,
                        "Message dropped by plugin"
                    );
                    return None;
                }
                Err(err) => {
                    warn!(
                        plugin = plugin.name(),
                        hook = "on_message",
                        error = %err,
                        "Plugin hook failed"
                    );
                }
            }
        }
        live().then_some(message)
    }
}
