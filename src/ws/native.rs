//! Native WebSocket client over `tokio-tungstenite`.
//!
//! Full implementation with:
//! - Background tokio task owning the connection and all bookkeeping
//! - `hello` handshake on every connect, surfaced as [`WsEvent::Connected`]
//! - Pending-request table correlating `rf`/`rr`/`re` frames to their owners
//! - Subscription tracking + replay under the original ids on reconnect
//! - Outbound queue while disconnected (flushed on reconnect)
//! - Doubling reconnect backoff, reset by a successful handshake
//! - Fixed-interval `ping` heartbeat while connected

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream, Stream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::WsError;
use crate::shared::RequestId;
use crate::ws::backoff::Backoff;
use crate::ws::frame::{self, InboundFrame, Op, ResponseKind};
use crate::ws::subscriptions::{SubscriptionRegistry, TopicSpec};
use crate::ws::{Delivery, ReadyState, WsConfig, WsEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

// ─── Commands from public API to background task ─────────────────────────────

enum Command {
    Send {
        op: Op,
        id: RequestId,
        body: Value,
        responder: Option<Responder>,
    },
    Subscribe {
        id: RequestId,
        spec: TopicSpec,
        tx: mpsc::UnboundedSender<Delivery>,
    },
    Unsubscribe(RequestId),
    /// Drop bookkeeping for an id without telling the server (request timeout).
    Clear(RequestId),
    Shutdown,
}

/// Completion handle for a pending id.
enum Responder {
    Once(oneshot::Sender<Delivery>),
    Stream(mpsc::UnboundedSender<Delivery>),
}

/// What the task must do after registering a command.
enum Action {
    Write { text: String, queue_offline: bool },
    Nothing,
    Shutdown,
}

// ─── Disconnect reasons ──────────────────────────────────────────────────────

enum DisconnectReason {
    Shutdown,
    Lost { code: Option<u16>, reason: String },
}

// ─── Background task state ───────────────────────────────────────────────────

struct TaskState {
    config: WsConfig,
    event_tx: mpsc::Sender<WsEvent>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    pending: HashMap<RequestId, Responder>,
    subscriptions: SubscriptionRegistry,
    outbox: Vec<String>,
    backoff: Backoff,
    next_id: Arc<AtomicU64>,
    ready_state: Arc<AtomicU16>,
}

impl TaskState {
    fn new(
        config: WsConfig,
        event_tx: mpsc::Sender<WsEvent>,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
        next_id: Arc<AtomicU64>,
        ready_state: Arc<AtomicU16>,
    ) -> Self {
        let backoff = Backoff::from_millis(
            config.initial_reconnect_delay_ms,
            config.max_reconnect_delay_ms,
        );
        Self {
            config,
            event_tx,
            cmd_rx,
            pending: HashMap::new(),
            subscriptions: SubscriptionRegistry::default(),
            outbox: Vec::new(),
            backoff,
            next_id,
            ready_state,
        }
    }

    fn emit(&self, event: WsEvent) {
        let _ = self.event_tx.try_send(event);
    }

    fn set_ready(&self, state: ReadyState) {
        self.ready_state.store(state as u16, Ordering::SeqCst);
    }

    fn allocate_id(&self) -> RequestId {
        allocate_id(&self.next_id)
    }

    fn clear(&mut self, id: &RequestId) {
        self.pending.remove(id);
        self.subscriptions.remove(id);
    }

    /// Update bookkeeping for a command and say what to put on the wire.
    fn register(&mut self, cmd: Command) -> Action {
        match cmd {
            Command::Send {
                op,
                id,
                body,
                responder,
            } => {
                let text = frame::encode(op, &id, &body);
                if let Some(responder) = responder {
                    self.pending.insert(id, responder);
                }
                Action::Write {
                    text,
                    queue_offline: !op.is_subscription(),
                }
            }
            Command::Subscribe { id, spec, tx } => {
                let text = frame::encode(Op::Sub, &id, &spec.to_body());
                self.pending.insert(id.clone(), Responder::Stream(tx));
                self.subscriptions.insert(id, spec);
                Action::Write {
                    text,
                    queue_offline: false,
                }
            }
            Command::Unsubscribe(id) => {
                self.clear(&id);
                Action::Write {
                    text: frame::encode(Op::Unsub, &id, &json!({})),
                    queue_offline: false,
                }
            }
            Command::Clear(id) => {
                self.clear(&id);
                Action::Nothing
            }
            Command::Shutdown => Action::Shutdown,
        }
    }

    /// Handle a command with no open transport. Returns `false` on shutdown.
    fn register_offline(&mut self, cmd: Command) -> bool {
        match self.register(cmd) {
            Action::Write {
                text,
                queue_offline: true,
            } => {
                self.outbox.push(text);
                true
            }
            Action::Write { .. } | Action::Nothing => true,
            Action::Shutdown => false,
        }
    }

    /// Route a decoded frame to whoever is waiting on its id.
    fn dispatch(&mut self, inbound: InboundFrame) {
        let id = inbound.id.clone();
        let is_stream = match self.pending.get(&id) {
            Some(Responder::Stream(_)) => true,
            Some(Responder::Once(_)) => false,
            // Probably already unsubscribed.
            None => return,
        };

        let keep_open = is_stream && inbound.kind != ResponseKind::Final;
        let delivery = inbound.into_delivery();

        if keep_open {
            let delivered = match self.pending.get(&id) {
                Some(Responder::Stream(tx)) => tx.send(delivery).is_ok(),
                _ => false,
            };
            if !delivered {
                tracing::debug!(id = %id, "Subscriber dropped, clearing");
                self.clear(&id);
            }
            return;
        }

        let responder = self.pending.remove(&id);
        self.subscriptions.remove(&id);
        match responder {
            Some(Responder::Once(tx)) => {
                let _ = tx.send(delivery);
            }
            Some(Responder::Stream(tx)) => {
                let _ = tx.send(delivery);
            }
            None => {}
        }
    }

    /// Handle one inbound text frame. The handshake id is answered here
    /// rather than through the pending table.
    fn handle_text(&mut self, text: &str, handshake: &mut Option<RequestId>) {
        let inbound = match frame::decode(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::error!("Unexpected frame from orderbook: {}", e);
                return;
            }
        };

        if handshake.as_ref() == Some(&inbound.id) {
            *handshake = None;
            match inbound.into_delivery() {
                Ok(hello) => {
                    self.backoff.reset();
                    tracing::info!("Handshake complete");
                    self.emit(WsEvent::Connected(hello));
                }
                Err(e) => {
                    tracing::error!("Connection error: {}", e);
                    self.emit(WsEvent::Error(format!("Handshake rejected: {}", e)));
                }
            }
            return;
        }

        self.dispatch(inbound);
    }
}

fn allocate_id(counter: &AtomicU64) -> RequestId {
    RequestId::new(counter.fetch_add(1, Ordering::SeqCst).to_string())
}

// ─── Public WsClient ─────────────────────────────────────────────────────────

/// A live subscription. Every `rr`/`re` frame for its id arrives on
/// [`Subscription::recv`] until it is unsubscribed.
pub struct Subscription {
    id: RequestId,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Next delivery, or `None` once the subscription is cleared.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

/// Native WebSocket client using `tokio-tungstenite`.
///
/// Uses a background tokio task for connection management. The public API
/// communicates with it via mpsc channels, so every method is usable before
/// the first connect: non-subscription sends are queued and subscriptions are
/// replayed once the transport opens.
pub struct WsClient {
    config: WsConfig,
    next_id: Arc<AtomicU64>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    cmd_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    event_rx: tokio::sync::Mutex<mpsc::Receiver<WsEvent>>,
    event_tx: mpsc::Sender<WsEvent>,
    task_handle: Mutex<Option<JoinHandle<()>>>,
    ready_state: Arc<AtomicU16>,
}

impl WsClient {
    /// Create a new WS client. Does not connect yet.
    pub fn new(config: WsConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        Self {
            config,
            next_id: Arc::new(AtomicU64::new(1)),
            cmd_tx,
            cmd_rx: Mutex::new(Some(cmd_rx)),
            event_rx: tokio::sync::Mutex::new(event_rx),
            event_tx,
            task_handle: Mutex::new(None),
            ready_state: Arc::new(AtomicU16::new(ReadyState::Closed as u16)),
        }
    }

    /// Start the background connection task.
    ///
    /// The task keeps reconnecting until [`WsClient::shutdown`] is called.
    /// Calling this twice is a no-op.
    pub fn connect(&self) {
        let Some(cmd_rx) = self.cmd_rx.lock().ok().and_then(|mut guard| guard.take()) else {
            return;
        };
        self.ready_state
            .store(ReadyState::Connecting as u16, Ordering::SeqCst);

        let state = TaskState::new(
            self.config.clone(),
            self.event_tx.clone(),
            cmd_rx,
            Arc::clone(&self.next_id),
            Arc::clone(&self.ready_state),
        );

        let handle = tokio::spawn(run_task(state));
        if let Ok(mut guard) = self.task_handle.lock() {
            *guard = Some(handle);
        }
    }

    /// Stop reconnecting, close the transport and stop the heartbeat.
    /// Irreversible.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown);

        let handle = self.task_handle.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            if tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .is_err()
            {
                tracing::warn!("WS task did not stop in time");
            }
        }

        self.ready_state
            .store(ReadyState::Closed as u16, Ordering::SeqCst);
    }

    fn allocate_id(&self) -> RequestId {
        allocate_id(&self.next_id)
    }

    fn submit(
        &self,
        op: Op,
        body: Value,
        id: Option<RequestId>,
        responder: Option<Responder>,
    ) -> Result<RequestId, WsError> {
        let id = id.unwrap_or_else(|| self.allocate_id());
        self.cmd_tx
            .send(Command::Send {
                op,
                id: id.clone(),
                body,
                responder,
            })
            .map_err(|_| WsError::ShutDown)?;
        Ok(id)
    }

    /// Fire-and-forget send. Returns the id the frame went out under.
    pub fn send(&self, op: Op, body: Value) -> Result<RequestId, WsError> {
        self.submit(op, body, None, None)
    }

    /// Send and keep a handle for the response. There is no deadline:
    /// the entry stays pending until the server answers or it is cleared.
    pub fn send_tracked(
        &self,
        op: Op,
        body: Value,
        id_override: Option<RequestId>,
    ) -> Result<(RequestId, oneshot::Receiver<Delivery>), WsError> {
        let (tx, rx) = oneshot::channel();
        let id = self.submit(op, body, id_override, Some(Responder::Once(tx)))?;
        Ok((id, rx))
    }

    /// Send and await the first response.
    ///
    /// `timeout` defaults to the configured request timeout. On expiry the
    /// pending entry is cleared and `WsError::Timeout` is returned. A `sub`
    /// issued this way is unsubscribed after its first response.
    pub async fn request(
        &self,
        op: Op,
        body: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, WsError> {
        let timeout = timeout.unwrap_or(Duration::from_millis(self.config.request_timeout_ms));
        let (id, rx) = self.send_tracked(op, body, None)?;

        let outcome = tokio::time::timeout(timeout, rx).await;

        if op == Op::Sub {
            let _ = self.unsubscribe(&id);
        }

        match outcome {
            Ok(Ok(delivery)) => delivery,
            Ok(Err(_)) => Err(WsError::ShutDown),
            Err(_) => {
                let _ = self.cmd_tx.send(Command::Clear(id));
                Err(WsError::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Open a subscription. It is replayed on every reconnect until
    /// [`WsClient::unsubscribe`] is called.
    pub fn subscribe(&self, spec: TopicSpec) -> Result<Subscription, WsError> {
        let id = self.allocate_id();
        let (tx, rx) = mpsc::unbounded_channel();
        self.cmd_tx
            .send(Command::Subscribe {
                id: id.clone(),
                spec,
                tx,
            })
            .map_err(|_| WsError::ShutDown)?;
        Ok(Subscription { id, rx })
    }

    /// Send `unsub` if connected and drop local bookkeeping regardless.
    pub fn unsubscribe(&self, id: &RequestId) -> Result<(), WsError> {
        self.cmd_tx
            .send(Command::Unsubscribe(id.clone()))
            .map_err(|_| WsError::ShutDown)
    }

    /// Whether the WebSocket is currently open.
    pub fn is_connected(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Current connection state.
    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from(self.ready_state.load(Ordering::SeqCst))
    }

    /// Get a stream of connection events.
    ///
    /// The returned stream borrows `self`, so it must be dropped
    /// before the client is.
    pub fn events(&self) -> Pin<Box<dyn Stream<Item = WsEvent> + Send + '_>> {
        Box::pin(futures_util::stream::unfold(
            &self.event_rx,
            |rx| async move {
                let mut guard = rx.lock().await;
                guard.recv().await.map(|event| (event, rx))
            },
        ))
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        if let Ok(guard) = self.task_handle.get_mut() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

// ─── Background task ─────────────────────────────────────────────────────────

async fn run_task(mut state: TaskState) {
    loop {
        // ── 1. Attempt connection, still taking commands ─────────────────
        state.set_ready(ReadyState::Connecting);
        let url = state.config.url.clone();
        let connecting = attempt_connect(&url);
        tokio::pin!(connecting);

        let attempt = loop {
            tokio::select! {
                result = &mut connecting => break result,
                cmd = state.cmd_rx.recv() => {
                    let keep_going = match cmd {
                        Some(cmd) => state.register_offline(cmd),
                        None => false,
                    };
                    if !keep_going {
                        state.set_ready(ReadyState::Closed);
                        return;
                    }
                }
            }
        };

        // ── 2. Run the connection until it breaks ────────────────────────
        match attempt {
            Ok((sink, stream)) => {
                state.set_ready(ReadyState::Open);
                let reason = run_connected(&mut state, sink, stream).await;
                state.set_ready(ReadyState::Closed);

                match reason {
                    DisconnectReason::Shutdown => {
                        tracing::info!("WebSocket shut down");
                        return;
                    }
                    DisconnectReason::Lost { code, reason } => {
                        tracing::warn!(?code, "WebSocket disconnected: {}", reason);
                        state.emit(WsEvent::Disconnected { code, reason });
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "WebSocket connect attempt failed");
                state.set_ready(ReadyState::Closed);
                state.emit(WsEvent::Disconnected {
                    code: None,
                    reason: e.to_string(),
                });
            }
        }

        // ── 3. Back off, still taking commands ───────────────────────────
        let delay = state.backoff.next_delay();
        tracing::info!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
        if !wait_offline(&mut state, delay).await {
            state.set_ready(ReadyState::Closed);
            return;
        }
    }
}

/// The inner connected loop. Runs until the connection breaks.
async fn run_connected(
    state: &mut TaskState,
    mut sink: WsSink,
    mut stream: SplitStream<WsStream>,
) -> DisconnectReason {
    // ── Handshake, queued messages, subscription replay ──────────────────
    let hello_id = state.allocate_id();
    let hello = frame::encode(
        Op::Hello,
        &hello_id,
        &json!({ "version": state.config.version }),
    );
    if let Err(e) = send_text(&mut sink, hello).await {
        return DisconnectReason::Lost {
            code: None,
            reason: format!("hello not sent: {}", e),
        };
    }
    let mut handshake = Some(hello_id);

    flush_outbox(&mut sink, &mut state.outbox).await;
    resubscribe_all(&mut sink, &state.subscriptions).await;

    let ping_dur = Duration::from_millis(state.config.ping_interval_ms);
    let mut ping_interval = tokio::time::interval(ping_dur);
    ping_interval.reset(); // skip immediate first tick

    loop {
        tokio::select! {
            // ── a) Incoming WS message ───────────────────────────────────
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let text_str: &str = text.as_ref();
                        state.handle_text(text_str, &mut handshake);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = extract_close(frame.as_ref());
                        return DisconnectReason::Lost { code: Some(code), reason };
                    }
                    Some(Ok(_)) => {} // Binary, Pong, Frame: ignored
                    Some(Err(e)) => {
                        return DisconnectReason::Lost { code: None, reason: e.to_string() };
                    }
                    None => {
                        return DisconnectReason::Lost {
                            code: None,
                            reason: "Stream ended".into(),
                        };
                    }
                }
            }

            // ── b) Command from public API ───────────────────────────────
            cmd = state.cmd_rx.recv() => {
                let action = match cmd {
                    Some(cmd) => state.register(cmd),
                    // WsClient dropped, clean exit
                    None => Action::Shutdown,
                };
                match action {
                    Action::Write { text, .. } => {
                        if let Err(e) = send_text(&mut sink, text).await {
                            tracing::warn!("Send failed: {}", e);
                        }
                    }
                    Action::Nothing => {}
                    Action::Shutdown => {
                        let _ = sink.send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "Client shutdown".into(),
                        }))).await;
                        return DisconnectReason::Shutdown;
                    }
                }
            }

            // ── c) Heartbeat ─────────────────────────────────────────────
            _ = ping_interval.tick() => {
                let id = state.allocate_id();
                if let Err(e) = send_text(&mut sink, frame::encode(Op::Ping, &id, &json!({}))).await {
                    tracing::warn!("Failed to send ping: {}", e);
                }
            }
        }
    }
}

/// Sleep out a backoff delay while still accepting commands.
/// Returns `false` if shutdown was requested.
async fn wait_offline(state: &mut TaskState, delay: Duration) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            () = &mut sleep => return true,
            cmd = state.cmd_rx.recv() => {
                let keep_going = match cmd {
                    Some(cmd) => state.register_offline(cmd),
                    None => false,
                };
                if !keep_going {
                    return false;
                }
            }
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Attempt to establish a WebSocket connection with a 30-second timeout.
async fn attempt_connect(url: &str) -> Result<(WsSink, SplitStream<WsStream>), WsError> {
    let (ws_stream, _) = tokio::time::timeout(Duration::from_secs(30), connect_async(url))
        .await
        .map_err(|_| WsError::ConnectionFailed("timeout".into()))?
        .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

    Ok(ws_stream.split())
}

async fn send_text(sink: &mut WsSink, text: String) -> Result<(), WsError> {
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|e| WsError::SendFailed(e.to_string()))
}

/// Extract close code and reason from an optional CloseFrame.
fn extract_close(frame: Option<&CloseFrame>) -> (u16, String) {
    match frame {
        Some(f) => (f.code.into(), f.reason.to_string()),
        None => (1006, "No close frame".into()),
    }
}

async fn resubscribe_all(sink: &mut WsSink, subs: &SubscriptionRegistry) {
    if subs.is_empty() {
        return;
    }
    tracing::info!("Resubscribing to {} tracked subscription(s)", subs.len());
    for (id, spec) in subs.iter() {
        if let Err(e) = send_text(sink, frame::encode(Op::Sub, id, &spec.to_body())).await {
            tracing::warn!("Failed to resubscribe: {}", e);
        }
    }
}

async fn flush_outbox(sink: &mut WsSink, outbox: &mut Vec<String>) {
    if outbox.is_empty() {
        return;
    }
    tracing::info!("Flushing {} pending message(s)", outbox.len());
    for text in std::mem::take(outbox) {
        if let Err(e) = send_text(sink, text).await {
            tracing::warn!("Failed to flush pending message: {}", e);
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
