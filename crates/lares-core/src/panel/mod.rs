// ── Panel session ──
//
// Full lifecycle of the connection to one Lares panel: connect with
// retries, bootstrap the static and realtime snapshots, run the listener,
// dispatcher, pollers and sweeper, and rebuild the session whenever the
// connection goes away.

mod accessors;
mod commands;
mod dispatcher;
mod listener;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures_util::future::BoxFuture;
use lares_api::{Connector, Dispatch, Frame, PanelLink, SecurityMode, WsConnector};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::QueuedCommand;
use crate::config::PanelConfig;
use crate::error::CoreError;
use crate::listeners::{BoxError, ListenerRegistry};
use crate::model::log::max_seq;
use crate::model::static_config::{log_entries, section};
use crate::model::{
    HeuristicPartitionDecoder, PartitionDecoder, RealtimeSnapshot, StaticConfig, StreamKind,
    StreamUpdate, ThermostatConfig,
};
use crate::pending::PendingTable;
use crate::poller;
use crate::reconnect::Backoff;
use crate::router::Router;
use crate::store::PanelStore;

/// Log entries fetched at bootstrap and by the logs poller.
pub const LOG_WINDOW: u32 = 500;

/// Close code of a clean close; the panel refuses reconnects for a while
/// after sending it.
const CLEAN_CLOSE: u16 = 1000;

/// Shortest wait once a cooldown is active.
const MIN_COOLDOWN_WAIT: Duration = Duration::from_secs(1);

// ── SessionState ─────────────────────────────────────────────────────

/// Session lifecycle observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SessionState {
    Disconnected,
    Connecting,
    LoggedIn,
    Running,
    Closing,
}

/// Called after every successful (re)connect with the fresh snapshots.
pub type ReconnectHook = Arc<
    dyn Fn(Arc<StaticConfig>, Arc<RealtimeSnapshot>, Option<Arc<Map<String, Value>>>) -> Result<(), BoxError>
        + Send
        + Sync,
>;

// ── Panel ────────────────────────────────────────────────────────────

/// Handle to the panel session.
///
/// Cheaply cloneable via `Arc<PanelInner>`. Build one with
/// [`Panel::builder`], then call [`connect`](Self::connect) or
/// [`connect_secure`](Self::connect_secure).
#[derive(Clone)]
pub struct Panel {
    inner: Arc<PanelInner>,
}

struct PanelInner {
    config: PanelConfig,
    connector: Arc<dyn Connector>,
    decoder: Arc<dyn PartitionDecoder>,
    /// The one connection. Every request/response round trip holds this
    /// lock for its whole duration.
    link: Mutex<Option<PanelLink>>,
    state: watch::Sender<SessionState>,
    store: Arc<PanelStore>,
    pending: Arc<PendingTable>,
    router: Router,
    on_reconnect: Option<ReconnectHook>,
    command_tx: mpsc::UnboundedSender<QueuedCommand>,
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<QueuedCommand>>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    secure: AtomicBool,
    cooldown_until: ArcSwapOption<Instant>,
    /// Highest log sequence seen, seeded by the bootstrap.
    log_cursor: Mutex<Option<u64>>,
}

impl Panel {
    pub fn builder(config: PanelConfig) -> PanelBuilder {
        PanelBuilder::new(config)
    }

    pub fn config(&self) -> &PanelConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<PanelStore> {
        &self.inner.store
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Subscribe to session state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Commands awaiting their `CMD_USR_RES`.
    pub fn pending_commands(&self) -> usize {
        self.inner.pending.len()
    }

    fn set_state(&self, state: SessionState) {
        self.inner.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!(from = %current, to = %state, "session state");
            *current = state;
            true
        });
    }

    fn security(&self) -> SecurityMode {
        if self.inner.secure.load(Ordering::Acquire) {
            SecurityMode::Secure
        } else {
            SecurityMode::Plain
        }
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Connect over plain `ws://`.
    ///
    /// Retries with exponential backoff and returns
    /// [`CoreError::RetriesExhausted`] once the retry budget is spent.
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.connect_with(SecurityMode::Plain).await
    }

    /// Connect over `wss://`, accepting the panel's self-signed certificate.
    pub async fn connect_secure(&self) -> Result<(), CoreError> {
        self.connect_with(SecurityMode::Secure).await
    }

    async fn connect_with(&self, mode: SecurityMode) -> Result<(), CoreError> {
        self.inner
            .secure
            .store(mode == SecurityMode::Secure, Ordering::Release);
        self.close_link().await;

        let mut backoff = Backoff::new(self.inner.config.reconnect.clone());
        loop {
            if self.inner.cancel.is_cancelled() {
                return Err(CoreError::NotConnected);
            }
            match self.attempt(mode).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    self.set_state(SessionState::Disconnected);
                    let delay = backoff.next_delay();
                    if backoff.exhausted() {
                        error!(attempts = backoff.attempts(), error = %e, "maximum connect retries reached");
                        return Err(CoreError::RetriesExhausted {
                            attempts: backoff.attempts(),
                        });
                    }
                    error!(
                        attempt = backoff.attempts(),
                        retry_in_secs = delay.as_secs(),
                        error = %e,
                        "panel connection failed"
                    );
                    if !self.sleep_or_cancel(delay).await {
                        return Err(CoreError::NotConnected);
                    }
                }
            }
        }
    }

    /// One connect attempt: socket, login, bootstrap, start tasks.
    async fn attempt(&self, mode: SecurityMode) -> Result<(), CoreError> {
        self.wait_cooldown().await;
        self.set_state(SessionState::Connecting);
        info!(host = %self.inner.config.host, ?mode, "connecting to panel");

        let transport = self.inner.connector.connect(mode).await?;
        let mut link = PanelLink::new(transport);

        let login_id = match link.login(&self.inner.config.pin).await {
            Ok(id) => id,
            Err(e) => {
                link.close().await;
                return Err(e.into());
            }
        };
        if login_id <= 0 {
            link.close().await;
            return Err(CoreError::LoginRejected { login_id });
        }
        info!(login_id, "logged in to panel");
        self.set_state(SessionState::LoggedIn);

        if let Err(e) = self.bootstrap(&mut link).await {
            link.close().await;
            return Err(e);
        }

        *self.inner.link.lock().await = Some(link);
        self.set_state(SessionState::Running);
        info!("panel session running");

        self.ensure_tasks().await;
        self.call_on_reconnect();
        Ok(())
    }

    /// Fetch the session bootstrap data on a link nobody else can see
    /// yet. Version, logs and thermostat failures are tolerated.
    async fn bootstrap(&self, link: &mut PanelLink) -> Result<(), CoreError> {
        let router = &self.inner.router;
        let store = &self.inner.store;
        let mut dispatch = |frame| router.route(frame);

        info!("reading system version");
        match link.system_version(&mut dispatch).await {
            Ok(version) => store.set_version(version),
            Err(e) => warn!(error = %e, "system version read failed"),
        }

        info!("reading event logs");
        match link.logs(LOG_WINDOW, &mut dispatch).await {
            Ok(payload) => {
                let seq = max_seq(&log_entries(&payload));
                if seq.is_some() {
                    *self.inner.log_cursor.lock().await = seq;
                }
            }
            Err(e) => warn!(error = %e, "event log read failed"),
        }

        info!("reading static configuration");
        let payload = link.read_static(&mut dispatch).await?;
        let mut config = StaticConfig::from_payload(&payload)?;

        info!("reading thermostat configuration");
        match link
            .read_thermostats(Some(&self.inner.config.pin), &mut dispatch)
            .await
        {
            Ok(payload) => {
                if let Some(list) = section::<ThermostatConfig>(&payload, "CFG_THERMOSTATS") {
                    config.thermostats = list;
                }
            }
            Err(e) => error!(error = %e, "thermostat configuration read failed"),
        }
        store.set_static(config);

        info!("registering for realtime updates");
        let payload = link.register_realtime(&mut dispatch).await?;
        store.set_realtime(RealtimeSnapshot::from_payload(&payload)?);
        debug!("initial data acquired");
        Ok(())
    }

    /// Spawn the background tasks on the first successful connect. They
    /// outlive individual connections and idle while not running.
    async fn ensure_tasks(&self) {
        let mut handles = self.inner.task_handles.lock().await;
        if !handles.is_empty() {
            return;
        }

        handles.push(tokio::spawn(listener::listener_task(self.clone())));
        if let Some(rx) = self.inner.command_rx.lock().await.take() {
            handles.push(tokio::spawn(dispatcher::dispatcher_task(self.clone(), rx)));
        }
        handles.push(tokio::spawn(dispatcher::sweeper_task(self.clone())));
        handles.push(tokio::spawn(poller::logs::logs_task(self.clone())));
        handles.push(tokio::spawn(poller::schedulers::schedulers_task(self.clone())));
        handles.push(tokio::spawn(poller::thermostats::thermostats_task(self.clone())));
        handles.push(tokio::spawn(poller::zones::zones_task(self.clone())));
        debug!(tasks = handles.len(), "background tasks started");
    }

    fn call_on_reconnect(&self) {
        let Some(hook) = &self.inner.on_reconnect else {
            return;
        };
        let store = &self.inner.store;
        let (Some(config), Some(realtime)) = (store.static_config(), store.realtime()) else {
            return;
        };
        match catch_unwind(AssertUnwindSafe(|| hook(config, realtime, store.version()))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "reconnect callback failed"),
            Err(_) => error!("reconnect callback panicked"),
        }
    }

    async fn wait_cooldown(&self) {
        let Some(until) = self.inner.cooldown_until.load_full() else {
            return;
        };
        let now = Instant::now();
        if *until > now {
            let wait = (*until - now).max(MIN_COOLDOWN_WAIT);
            info!(wait_secs = wait.as_secs(), "waiting for reconnect cooldown");
            self.sleep_or_cancel(wait).await;
        }
    }

    /// Park until the session is running. `false` once it is shut down.
    pub(crate) async fn wait_running(&self) -> bool {
        let mut state = self.inner.state.subscribe();
        tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => false,
            res = state.wait_for(|s| *s == SessionState::Running) => res.is_ok(),
        }
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// `false` when the session was shut down during the sleep.
    pub(crate) async fn sleep_or_cancel(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    async fn close_link(&self) {
        let link = self.inner.link.lock().await.take();
        if let Some(mut link) = link {
            link.close().await;
        }
    }

    /// Run one round trip on the link, holding the link lock throughout.
    /// Frames that arrive in the meantime go to the router.
    pub(crate) async fn with_link<T>(
        &self,
        request: impl for<'l> FnOnce(&'l mut PanelLink, Dispatch<'l>) -> BoxFuture<'l, Result<T, lares_api::Error>>,
    ) -> Result<T, CoreError> {
        let router = &self.inner.router;
        let mut dispatch = |frame: Frame| router.route(frame);
        let mut guard = self.inner.link.lock().await;
        let link = guard.as_mut().ok_or(CoreError::NotConnected)?;
        Ok(request(link, &mut dispatch).await?)
    }

    pub(crate) fn log_cursor(&self) -> &Mutex<Option<u64>> {
        &self.inner.log_cursor
    }

    /// Wait until both bootstrap snapshots are present.
    pub async fn wait_for_initial_data(&self, limit: Duration) -> bool {
        self.inner.store.wait_ready(limit).await
    }

    // ── Teardown & reconnection ──────────────────────────────────────

    /// Called by the listener, pollers and dispatcher when the connection
    /// failed under them. Only the first detector of a loss acts on it.
    pub(crate) async fn connection_lost(&self, close_code: Option<u16>) {
        let was_running = self.inner.state.send_if_modified(|state| {
            if *state == SessionState::Running {
                *state = SessionState::Disconnected;
                true
            } else {
                false
            }
        });
        if !was_running {
            return;
        }
        error!(?close_code, "panel connection lost, reconnecting");
        if close_code == Some(CLEAN_CLOSE) {
            let until = Instant::now() + self.inner.config.reconnect_cooldown;
            let later = self
                .inner
                .cooldown_until
                .load_full()
                .map_or(until, |current| (*current).max(until));
            self.inner.cooldown_until.store(Some(Arc::new(later)));
        }
        self.teardown().await;
        self.trigger_reconnect().await;
    }

    async fn teardown(&self) {
        self.close_link().await;
        self.inner.pending.fail_all();
    }

    /// Drop the connection and start the reconnection controller.
    /// Safe to call while already disconnected.
    pub async fn force_reconnect(&self) {
        info!("forced reconnect");
        self.set_state(SessionState::Disconnected);
        self.teardown().await;
        self.trigger_reconnect().await;
    }

    /// Start the reconnection controller unless it is already active.
    async fn trigger_reconnect(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        let mut slot = self.inner.reconnect_task.lock().await;
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("reconnect already in progress");
            return;
        }
        *slot = Some(tokio::spawn(reconnect_loop(self.clone())));
    }

    /// Cancel every background task, close the connection and fail any
    /// in-flight commands.
    pub async fn shutdown(&self) {
        self.set_state(SessionState::Closing);
        self.inner.cancel.cancel();

        let reconnect = self.inner.reconnect_task.lock().await.take();
        if let Some(handle) = reconnect {
            let _ = handle.await;
        }
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        self.teardown().await;
        self.set_state(SessionState::Disconnected);
        debug!("panel session shut down");
    }

    /// Run `update` through the listener registry.
    pub(crate) fn notify(&self, update: &StreamUpdate) {
        self.inner.router.notify(update);
    }
}

/// Reconnection controller: keeps reconnecting in the last used mode
/// until the session is running again. Boxed so the task type does not
/// recurse through `connect`.
fn reconnect_loop(panel: Panel) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        info!("reconnect loop started");
        let mut backoff = Backoff::new(panel.inner.config.reconnect.clone());
        loop {
            let mode = panel.security();
            if let Err(e) = panel.connect_with(mode).await {
                error!(error = %e, "reconnect attempt failed");
            }

            // The exit check shares the lock with `trigger_reconnect`, so a
            // loss reported after this point always starts a fresh loop.
            {
                let mut slot = panel.inner.reconnect_task.lock().await;
                if panel.is_running() || panel.inner.cancel.is_cancelled() {
                    *slot = None;
                    backoff.reset();
                    return;
                }
            }

            let delay = backoff.next_delay();
            if !panel.sleep_or_cancel(delay).await {
                return;
            }
        }
    })
}

// ── PanelBuilder ─────────────────────────────────────────────────────

/// Composition root: listeners, reconnect hook, and the seams tests swap.
pub struct PanelBuilder {
    config: PanelConfig,
    listeners: ListenerRegistry,
    on_reconnect: Option<ReconnectHook>,
    connector: Option<Arc<dyn Connector>>,
    decoder: Arc<dyn PartitionDecoder>,
}

impl PanelBuilder {
    fn new(config: PanelConfig) -> Self {
        Self {
            config,
            listeners: ListenerRegistry::new(),
            on_reconnect: None,
            connector: None,
            decoder: Arc::new(HeuristicPartitionDecoder),
        }
    }

    pub fn register_listener<F>(mut self, kind: StreamKind, listener: F) -> Self
    where
        F: Fn(&StreamUpdate) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.listeners.register(kind, listener);
        self
    }

    pub fn set_on_reconnect<F>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<StaticConfig>, Arc<RealtimeSnapshot>, Option<Arc<Map<String, Value>>>) -> Result<(), BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.on_reconnect = Some(Arc::new(hook));
        self
    }

    /// Replace the WebSocket connector.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_partition_decoder(mut self, decoder: Arc<dyn PartitionDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Build the session. Does not connect.
    pub fn build(self) -> Panel {
        let store = Arc::new(PanelStore::new());
        let pending = Arc::new(PendingTable::new());
        let router = Router::new(
            self.listeners,
            Arc::clone(&pending),
            Arc::clone(&store),
            self.config.output_debug_verbose,
        );
        let connector = self.connector.unwrap_or_else(|| {
            Arc::new(WsConnector::new(self.config.host.clone(), self.config.port))
        });
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let secure = self.config.security == SecurityMode::Secure;

        Panel {
            inner: Arc::new(PanelInner {
                config: self.config,
                connector,
                decoder: self.decoder,
                link: Mutex::new(None),
                state,
                store,
                pending,
                router,
                on_reconnect: self.on_reconnect,
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
                reconnect_task: Mutex::new(None),
                secure: AtomicBool::new(secure),
                cooldown_until: ArcSwapOption::empty(),
                log_cursor: Mutex::new(None),
            }),
        }
    }
}

impl std::fmt::Debug for Panel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Panel")
            .field("host", &self.inner.config.host)
            .field("state", &self.state())
            .field("listeners", self.inner.router.listeners())
            .finish_non_exhaustive()
    }
}
