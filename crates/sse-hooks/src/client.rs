//! SSE engine: connection state machine, attempt driver and public handle.
//!
//! # Attempts
//!
//! Every `connect` starts a new *attempt* with its own generation number and
//! [`CancellationToken`]. Starting an attempt cancels the previous token first,
//! so at most one request is ever in flight. The request itself runs on a
//! spawned task. Every notification that task produces (open, message, close,
//! error) is delivered under the engine's dispatch lock, and only if the
//! attempt is still the current one. A superseded attempt therefore goes
//! completely silent.
//!
//! ```text
//! connect(body)
//!   ├─ cancel previous attempt token, bump generation
//!   ├─ state = Connecting, clear plugin headers
//!   ├─ plugins.before_connect
//!   └─ spawn drive_attempt ──► Connector::open
//!                                 ├─ non-2xx / no body ─► fail()   ─► on_error chain
//!                                 └─ open() ─► on_open chain
//!                                      └─ EventStream ─► deliver() ─► on_message chain ─► Dispatcher
//!                                           └─ end of stream ─► finish() ─► on_close chain
//! ```

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, OnceLock},
    time::Duration,
};

use futures_util::StreamExt;
use http::{HeaderMap, HeaderName, HeaderValue, header};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tokio::{sync::watch, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    config::{RequestBody, SseConfig},
    dispatch::{Dispatcher, MessageCallback},
    error::{TransportError, TransportResult},
    message::SseMessage,
    parse::EventStream,
    plugin::{Pipeline, Plugin, PluginContext},
    state::ConnectionState,
    transport::{Connector, OpenInfo, ReqwestConnector, SseRequest},
};

static EMPTY_PIPELINE: Pipeline = Pipeline::empty();

/// Callback receiving the accepted response.
pub type OpenCallback = Arc<dyn Fn(&OpenInfo) + Send + Sync>;
/// Callback receiving the error that ended an attempt.
pub type ErrorCallback = Arc<dyn Fn(&TransportError) + Send + Sync>;
/// Callback fired when the connection closes.
pub type CloseCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_open: Option<OpenCallback>,
    on_error: Option<ErrorCallback>,
    on_close: Option<CloseCallback>,
}

// ---------------------------------------------------------------------------
// Attempt bookkeeping
// ---------------------------------------------------------------------------

#[derive(Default)]
struct AttemptSlot {
    generation: u64,
    token: Option<CancellationToken>,
    /// Body argument of the most recent `connect`, replayed by `reconnect`.
    body: Option<RequestBody>,
}

#[derive(Clone, Debug)]
struct Attempt {
    generation: u64,
    token: CancellationToken,
}

// ---------------------------------------------------------------------------
// Shared engine state
// ---------------------------------------------------------------------------

pub(crate) struct Shared {
    url: RwLock<String>,
    method: http::Method,
    headers: HeaderMap,
    default_body: Option<RequestBody>,
    connect_timeout: Duration,
    connector: Arc<dyn Connector>,
    pipeline: OnceLock<Pipeline>,
    ctx: PluginContext,
    dispatcher: Dispatcher,
    callbacks: Callbacks,
    state: watch::Sender<ConnectionState>,
    attempt: Mutex<AttemptSlot>,
    plugin_headers: Mutex<HeaderMap>,
    /// Serializes every hook and callback invocation. Re-entrant so hooks may
    /// call back into `connect`/`disconnect`.
    dispatch_lock: ReentrantMutex<()>,
    shutdown: CancellationToken,
}

impl Shared {
    fn pipeline(&self) -> &Pipeline {
        self.pipeline.get().unwrap_or(&EMPTY_PIPELINE)
    }

    pub(crate) fn url(&self) -> String {
        self.url.read().clone()
    }

    pub(crate) fn set_url(&self, url: String) {
        *self.url.write() = url;
    }

    pub(crate) fn set_plugin_header(&self, name: HeaderName, value: HeaderValue) {
        self.plugin_headers.lock().insert(name, value);
    }

    pub(crate) fn ready_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn attempt_token(&self) -> Option<CancellationToken> {
        self.attempt.lock().token.clone()
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "SSE state changed");
        }
    }

    fn is_current(&self, attempt: &Attempt) -> bool {
        !attempt.token.is_cancelled() && self.attempt.lock().generation == attempt.generation
    }

    /// Cancel the in-flight attempt (if any) and register a new one.
    fn begin_attempt(&self, body: Option<RequestBody>) -> Attempt {
        let mut slot = self.attempt.lock();
        if let Some(previous) = slot.token.take() {
            previous.cancel();
        }
        slot.generation = slot.generation.wrapping_add(1);
        let token = CancellationToken::new();
        slot.token = Some(token.clone());
        slot.body = body;
        Attempt {
            generation: slot.generation,
            token,
        }
    }

    pub(crate) fn connect(self: &Arc<Self>, body: Option<RequestBody>) {
        if self.shutdown.is_cancelled() {
            debug!("SSE client torn down, ignoring connect");
            return;
        }

        let _dispatch = self.dispatch_lock.lock();
        let attempt = self.begin_attempt(body.clone());
        self.plugin_headers.lock().clear();
        self.set_state(ConnectionState::Connecting);

        let live = || self.is_current(&attempt);
        if !self.pipeline().before_connect(&self.ctx, &live) {
            debug!(
                attempt = attempt.generation,
                "SSE attempt superseded during before_connect"
            );
            return;
        }

        let request = match self.build_request(body) {
            Ok(request) => request,
            Err(err) => {
                self.fail(&attempt, err);
                return;
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(drive_attempt(Arc::clone(self), attempt, request));
            }
            Err(_) => self.fail(
                &attempt,
                TransportError::internal("connect called outside a tokio runtime"),
            ),
        }
    }

    pub(crate) fn reconnect(self: &Arc<Self>) {
        let body = self.attempt.lock().body.clone();
        self.connect(body);
    }

    pub(crate) fn disconnect(&self) {
        let _dispatch = self.dispatch_lock.lock();
        {
            let mut slot = self.attempt.lock();
            if let Some(token) = slot.token.take() {
                token.cancel();
            }
            slot.generation = slot.generation.wrapping_add(1);
        }
        self.set_state(ConnectionState::Closed);
        info!(url = %self.url(), "SSE disconnected");

        self.pipeline().on_close(&self.ctx, &|| true);
        if let Some(on_close) = &self.callbacks.on_close {
            on_close();
        }
    }

    /// Merge the header layers and resolve the body for one attempt.
    fn build_request(&self, body: Option<RequestBody>) -> TransportResult<SseRequest> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.extend(self.headers.clone());
        headers.extend(self.plugin_headers.lock().clone());

        let body = body.or_else(|| self.default_body.clone());
        // GET and HEAD requests carry no body.
        let body = if self.method == http::Method::GET || self.method == http::Method::HEAD {
            if body.is_some() {
                debug!(method = %self.method, "Dropping request body");
            }
            None
        } else {
            body.map(|b| b.to_text()).transpose()?
        };

        Ok(SseRequest {
            url: self.url(),
            method: self.method.clone(),
            headers,
            body,
        })
    }

    /// Response accepted: move to `Open` and run the open chain.
    fn open(&self, attempt: &Attempt, info: &OpenInfo) {
        let _dispatch = self.dispatch_lock.lock();
        if !self.is_current(attempt) {
            return;
        }
        self.set_state(ConnectionState::Open);
        info!(
            url = %self.url(),
            attempt = attempt.generation,
            status = info.status.as_u16(),
            "SSE connection established"
        );

        let live = || self.is_current(attempt);
        if self.pipeline().on_open(info, &self.ctx, &live)
            && let Some(on_open) = &self.callbacks.on_open
        {
            on_open(info);
        }
    }

    /// Run one parsed message through the plugins and on to the listeners.
    fn deliver(&self, attempt: &Attempt, message: SseMessage) {
        let _dispatch = self.dispatch_lock.lock();
        if !self.is_current(attempt) {
            return;
        }
        debug!(
            event = %message.event,
            id = ?message.id,
            "SSE message received"
        );

        let live = || self.is_current(attempt);
        if let Some(message) = self.pipeline().on_message(message, &self.ctx, &live) {
            self.dispatcher.dispatch(message);
        }
    }

    /// Stream ended on its own.
    fn finish(&self, attempt: &Attempt) {
        let _dispatch = self.dispatch_lock.lock();
        if !self.is_current(attempt) {
            return;
        }
        self.set_state(ConnectionState::Closed);
        info!(url = %self.url(), attempt = attempt.generation, "SSE stream ended");

        let live = || self.is_current(attempt);
        if self.pipeline().on_close(&self.ctx, &live)
            && let Some(on_close) = &self.callbacks.on_close
        {
            on_close();
        }
    }

    /// Attempt failed; cancellation never ends up here.
    fn fail(&self, attempt: &Attempt, err: TransportError) {
        let _dispatch = self.dispatch_lock.lock();
        if !self.is_current(attempt) {
            return;
        }
        self.set_state(ConnectionState::Closed);
        error!(
            url = %self.url(),
            attempt = attempt.generation,
            error = %err,
            "SSE connection failed"
        );

        let live = || self.is_current(attempt);
        if self.pipeline().on_error(&err, &self.ctx, &live)
            && let Some(on_error) = &self.callbacks.on_error
        {
            on_error(&err);
        }
    }

    async fn stream_attempt(&self, attempt: &Attempt, request: SseRequest) -> TransportResult<()> {
        info!(url = %request.url, attempt = attempt.generation, "SSE connecting");

        let opened = timeout(self.connect_timeout, self.connector.open(request))
            .await
            .map_err(|_| TransportError::timeout(self.connect_timeout))??;

        if !opened.status.is_success() {
            return Err(TransportError::status(opened.status));
        }
        let (info, body) = opened.into_parts();
        let body = body.ok_or(TransportError::EmptyBody)?;

        self.open(attempt, &info);

        // A fresh parser per attempt: nothing partial survives into the next.
        let mut events = EventStream::new(body);
        while let Some(item) = events.next().await {
            self.deliver(attempt, item?);
        }
        Ok(())
    }
}

/// Body of the task spawned for one attempt.
async fn drive_attempt(shared: Arc<Shared>, attempt: Attempt, request: SseRequest) {
    let token = attempt.token.clone();
    let outcome = tokio::select! {
        biased;

        () = token.cancelled() => {
            debug!(attempt = attempt.generation, "SSE attempt cancelled");
            return;
        }
        outcome = shared.stream_attempt(&attempt, request) => outcome,
    };

    match outcome {
        Ok(()) => shared.finish(&attempt),
        Err(err) => shared.fail(&attempt, err),
    }
}

// ---------------------------------------------------------------------------
// Public API: SseClient
// ---------------------------------------------------------------------------

/// One SSE engine instance.
///
/// Owns the plugins, listeners and connection state. Dropping it disconnects
/// (running the close hooks) and cancels the shutdown token handed to plugins,
/// so no scheduled reconnect outlives the client.
pub struct SseClient {
    shared: Arc<Shared>,
}

impl SseClient {
    /// Start configuring a client.
    pub fn builder(config: SseConfig) -> SseClientBuilder {
        SseClientBuilder::new(config)
    }

    /// Start a new attempt, cancelling any in-flight one.
    ///
    /// Without a body the configured default body is sent (if any). Must be
    /// called inside a tokio runtime; otherwise the attempt fails through the
    /// error chain.
    pub fn connect(&self, body: Option<RequestBody>) {
        self.shared.connect(body);
    }

    /// Cancel any in-flight attempt, move to `Closed` and run the close chain.
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    /// Current target URL.
    pub fn url(&self) -> String {
        self.shared.url()
    }

    /// Retarget future attempts. The in-flight one is left alone.
    pub fn set_url(&self, url: impl Into<String>) {
        self.shared.set_url(url.into());
    }

    /// Current connection state.
    pub fn ready_state(&self) -> ConnectionState {
        self.shared.ready_state()
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// The most recent message that reached the listeners.
    pub fn latest_message(&self) -> Option<SseMessage> {
        self.shared.dispatcher.latest()
    }

    /// Watch the latest-message slot.
    pub fn subscribe_latest(&self) -> watch::Receiver<Option<SseMessage>> {
        self.shared.dispatcher.subscribe()
    }

    /// Cancellation token of the in-flight attempt, if there is one.
    pub fn attempt_token(&self) -> Option<CancellationToken> {
        self.shared.attempt_token()
    }

    /// Number of installed plugins.
    pub fn plugin_count(&self) -> usize {
        self.shared.pipeline().len()
    }
}

impl fmt::Debug for SseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseClient")
            .field("url", &self.url())
            .field("state", &self.ready_state())
            .field("plugins", &self.plugin_count())
            .finish()
    }
}

impl Drop for SseClient {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
        self.shared.disconnect();
    }
}

// ---------------------------------------------------------------------------
// SseClientBuilder
// ---------------------------------------------------------------------------

/// Builder for [`SseClient`].
pub struct SseClientBuilder {
    config: SseConfig,
    connector: Option<Arc<dyn Connector>>,
    plugins: Vec<Box<dyn Plugin>>,
    listeners: HashMap<String, MessageCallback>,
    on_message: Option<MessageCallback>,
    callbacks: Callbacks,
}

impl SseClientBuilder {
    fn new(config: SseConfig) -> Self {
        Self {
            config,
            connector: None,
            plugins: Vec::new(),
            listeners: HashMap::new(),
            on_message: None,
            callbacks: Callbacks::default(),
        }
    }

    /// Use a custom [`Connector`] instead of the default reqwest one.
    #[must_use]
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Register a plugin. Hooks run in registration order.
    #[must_use]
    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// Listen for messages with the given event name. One listener per name;
    /// a later registration replaces an earlier one.
    #[must_use]
    pub fn event_listener<F>(mut self, event: impl Into<String>, listener: F) -> Self
    where
        F: Fn(&SseMessage) + Send + Sync + 'static,
    {
        self.listeners.insert(event.into(), Arc::new(listener));
        self
    }

    /// Called for every dispatched message, after its named listener.
    #[must_use]
    pub fn on_message<F>(mut self, callback: F) -> Self
    where
        F: Fn(&SseMessage) + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(callback));
        self
    }

    /// Called after the plugins' `on_open` hooks.
    #[must_use]
    pub fn on_open<F>(mut self, callback: F) -> Self
    where
        F: Fn(&OpenInfo) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(callback));
        self
    }

    /// Called after the plugins' `on_error` hooks.
    #[must_use]
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.callbacks.on_error = Some(Arc::new(callback));
        self
    }

    /// Called after the plugins' `on_close` hooks.
    #[must_use]
    pub fn on_close<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(callback));
        self
    }

    /// Install the plugins and create the client.
    ///
    /// Connects right away unless the config is `manual`.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails, if the default
    /// connector cannot be created, or if an auto-connecting client is built
    /// outside a tokio runtime.
    pub fn build(self) -> TransportResult<SseClient> {
        self.config.validate().map_err(TransportError::config)?;
        if !self.config.manual && tokio::runtime::Handle::try_current().is_err() {
            return Err(TransportError::config(
                "A client that is not manual must be built inside a tokio runtime",
            ));
        }

        let connector = match self.connector {
            Some(connector) => connector,
            None => Arc::new(ReqwestConnector::new()?),
        };
        let SseConfig {
            url,
            method,
            headers,
            body,
            connect_timeout,
            manual,
        } = self.config;
        let (state, _) = watch::channel(ConnectionState::Closed);

        let shared = Arc::new_cyclic(|engine| Shared {
            url: RwLock::new(url),
            method,
            headers,
            default_body: body,
            connect_timeout,
            connector,
            pipeline: OnceLock::new(),
            ctx: PluginContext::new(engine.clone()),
            dispatcher: Dispatcher::new(self.listeners, self.on_message),
            callbacks: self.callbacks,
            state,
            attempt: Mutex::new(AttemptSlot::default()),
            plugin_headers: Mutex::new(HeaderMap::new()),
            dispatch_lock: ReentrantMutex::new(()),
            shutdown: CancellationToken::new(),
        });

        let pipeline = Pipeline::install(self.plugins, &shared.ctx);
        debug!(plugins = pipeline.len(), "SSE plugins installed");
        let _ = shared.pipeline.set(pipeline);

        let client = SseClient { shared };
        if !manual {
            client.connect(None);
        }
        Ok(client)
    }
}
