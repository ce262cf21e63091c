//! High-level client: `DegensClient`.
//!
//! Owns the wire client and the synchronized [`ExchangeState`]. Every
//! subscription gets a pump task that applies its patch batches; the
//! connection task installs the server config on handshake and wipes state
//! on disconnect. Consumers read a cloned state and listen for
//! [`ClientEvent`]s.

use crate::error::WsError;
use crate::orders::SignedOrder;
use crate::state::{parse_batch, ExchangeState, TopicKey};
use crate::ws::{Delivery, Op, Subscription, TopicSpec, WsClient, WsConfig, WsEvent};

use async_lock::RwLock;
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What changed, for whoever drives updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Handshake done and config installed.
    Connected,
    /// A topic snapshot was replaced.
    Updated(TopicKey),
    /// Transport lost; state has been reset.
    Disconnected,
}

/// Which account topics to follow besides `account` itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountTopics {
    pub positions: bool,
    pub order_fills: bool,
}

pub struct DegensClient {
    ws: Arc<WsClient>,
    state: Arc<RwLock<ExchangeState>>,
    event_tx: mpsc::UnboundedSender<ClientEvent>,
    event_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ClientEvent>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DegensClient {
    pub fn new(config: WsConfig) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            ws: Arc::new(WsClient::new(config)),
            state: Arc::new(RwLock::new(ExchangeState::default())),
            event_tx,
            event_rx: tokio::sync::Mutex::new(event_rx),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn ws(&self) -> &WsClient {
        &self.ws
    }

    /// Keep a handle so `shutdown` can abort it. Finished tasks are dropped
    /// here, so per-`put` waiters do not pile up.
    fn track(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.retain(|task| !task.is_finished());
            tasks.push(handle);
        }
    }

    /// Start the connection task and the wire client.
    pub fn connect(&self) {
        let ws = Arc::clone(&self.ws);
        let state = Arc::clone(&self.state);
        let tx = self.event_tx.clone();
        self.track(tokio::spawn(watch_connection(ws, state, tx)));
        self.ws.connect();
    }

    fn subscribe(&self, spec: TopicSpec) -> Result<(), WsError> {
        let key = TopicKey::from(&spec);
        let sub = self.ws.subscribe(spec)?;
        tracing::debug!(id = %sub.id(), topic = ?key, "Subscribed");
        self.track(tokio::spawn(pump(
            sub,
            key,
            Arc::clone(&self.state),
            self.event_tx.clone(),
        )));
        Ok(())
    }

    pub fn subscribe_account(&self, addr: &str, extras: AccountTopics) -> Result<(), WsError> {
        self.subscribe(TopicSpec::Account {
            addr: addr.to_string(),
        })?;
        if extras.positions {
            self.subscribe(TopicSpec::Positions {
                addr: addr.to_string(),
            })?;
        }
        if extras.order_fills {
            self.subscribe(TopicSpec::OrderFills {
                maker: addr.to_string(),
            })?;
        }
        Ok(())
    }

    pub fn subscribe_events(&self) -> Result<(), WsError> {
        self.subscribe(TopicSpec::Events)
    }

    pub fn subscribe_gas_prices(&self) -> Result<(), WsError> {
        self.subscribe(TopicSpec::GasPrices)
    }

    /// Copy of the current state. Snapshots are shared, not deep-copied.
    pub async fn state(&self) -> ExchangeState {
        self.state.read().await.clone()
    }

    /// Next state or connection change. `None` once the client is gone.
    pub async fn next_event(&self) -> Option<ClientEvent> {
        self.event_rx.lock().await.recv().await
    }

    /// Submit a batch of orders in one `put`. Errors in the server's answer
    /// are logged when it arrives. Returns how many orders went out.
    pub fn send_orders(&self, orders: &[SignedOrder]) -> Result<usize, WsError> {
        if orders.is_empty() {
            return Ok(0);
        }
        let (id, rx) = self.ws.send_tracked(Op::Put, put_body(orders), None)?;
        let count = orders.len();
        tracing::info!(id = %id, orders = count, "Sending orders");

        self.track(tokio::spawn(async move {
            match rx.await {
                Ok(Err(e)) => tracing::error!(orders = count, error = %e, "Error sending orders"),
                Ok(Ok(_)) => tracing::debug!(orders = count, "Orders accepted"),
                Err(_) => {}
            }
        }));
        Ok(count)
    }

    /// Close the wire client and stop all pumps.
    pub async fn shutdown(&self) {
        self.ws.shutdown().await;
        let tasks = self
            .tasks
            .lock()
            .map(|mut tasks| std::mem::take(&mut *tasks))
            .unwrap_or_default();
        for task in tasks {
            task.abort();
        }
    }
}

/// `put` body: one `{order}` wrapper per signed order.
pub fn put_body(orders: &[SignedOrder]) -> Value {
    Value::Array(orders.iter().map(|order| json!({ "order": order })).collect())
}

/// The hello response carries the server config under `config`.
pub fn hello_config(hello: Value) -> Value {
    match hello {
        Value::Object(mut map) if map.contains_key("config") => {
            map.remove("config").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Apply one subscription delivery. Returns whether the snapshot changed.
/// Errors are logged and leave the state untouched.
pub fn apply_delivery(state: &mut ExchangeState, key: &TopicKey, delivery: Delivery) -> bool {
    let batch = match delivery {
        Ok(batch) => batch,
        Err(e) => {
            tracing::error!(topic = ?key, error = %e, "Error from orderbook");
            return false;
        }
    };

    let ops = match parse_batch(batch) {
        Ok(ops) => ops,
        Err(e) => {
            tracing::warn!(topic = ?key, error = %e, "Discarding malformed patch");
            return false;
        }
    };

    match state.apply(key, &ops) {
        Ok(changed) => changed,
        Err(e) => {
            tracing::warn!(topic = ?key, error = %e, "Discarding patch");
            false
        }
    }
}

async fn pump(
    mut sub: Subscription,
    key: TopicKey,
    state: Arc<RwLock<ExchangeState>>,
    tx: mpsc::UnboundedSender<ClientEvent>,
) {
    while let Some(delivery) = sub.recv().await {
        let changed = apply_delivery(&mut *state.write().await, &key, delivery);
        if changed && tx.send(ClientEvent::Updated(key.clone())).is_err() {
            break;
        }
    }
    tracing::debug!(topic = ?key, "Subscription closed");
}

async fn watch_connection(
    ws: Arc<WsClient>,
    state: Arc<RwLock<ExchangeState>>,
    tx: mpsc::UnboundedSender<ClientEvent>,
) {
    let mut events = ws.events();
    while let Some(event) = events.next().await {
        let forwarded = match event {
            WsEvent::Connected(hello) => {
                state.write().await.set_config(hello_config(hello));
                tracing::info!("Connected to orderbook");
                ClientEvent::Connected
            }
            WsEvent::Disconnected { code, reason } => {
                state.write().await.reset();
                tracing::warn!(?code, reason = %reason, "Disconnected from orderbook");
                ClientEvent::Disconnected
            }
            WsEvent::Error(e) => {
                tracing::warn!(error = %e, "Orderbook connection error");
                continue;
            }
        };
        if tx.send(forwarded).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{Direction, MarketId};
    use futures_util::SinkExt;
    use serde_json::json;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    fn signed_order(price: u64) -> SignedOrder {
        SignedOrder {
            maker: "0xm".into(),
            taker: "0x0".into(),
            token: "0xt".into(),
            match_id: MarketId::new("7"),
            amount: "1000".into(),
            price,
            direction: Direction::Buy,
            expiry: 10,
            timestamp: 5,
            order_group: "0xg".into(),
            fill_hash: "0xh".into(),
            sig: "0xs".into(),
        }
    }

    /// Exchange stand-in that answers every frame with a final response.
    async fn answering_server(listener: TcpListener) {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else {
                continue;
            };
            let text: &str = text.as_ref();
            let mut parts = text.splitn(3, '|');
            let op = parts.next().unwrap_or_default();
            let id = parts.next().unwrap_or_default();
            let body = if op == "hello" {
                json!({"config": {}})
            } else {
                json!({"accepted": 1})
            };
            let frame = format!("rf|{}|{}", id, body);
            if ws.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    }

    fn unfinished(client: &DegensClient) -> usize {
        let tasks = client.tasks.lock().unwrap();
        tasks.iter().filter(|task| !task.is_finished()).count()
    }

    #[test]
    fn test_hello_config() {
        assert_eq!(
            hello_config(json!({"config": {"tokens": {}}, "now": 1})),
            json!({"tokens": {}})
        );
        assert_eq!(hello_config(json!({"tokens": {}})), json!({"tokens": {}}));
    }

    #[test]
    fn test_apply_delivery() {
        let mut state = ExchangeState::default();
        let key = TopicKey::OrderFills("0xabc".into());

        let changed = apply_delivery(
            &mut state,
            &key,
            Ok(json!([{"op": "replace", "path": "", "value": {"recs": {"0xf": "5"}}}])),
        );
        assert!(changed);
        assert_eq!(state.fill_amount("0xabc", "0xf"), 5);

        assert!(!apply_delivery(&mut state, &key, Err(WsError::Server("nope".into()))));
        assert!(!apply_delivery(&mut state, &key, Ok(json!({"op": "add"}))));
        assert!(!apply_delivery(
            &mut state,
            &key,
            Ok(json!([{"op": "add", "path": "/missing/x", "value": 1}]))
        ));
        assert_eq!(state.fill_amount("0xabc", "0xf"), 5);
    }

    #[test]
    fn test_put_body_wraps_orders() {
        let body = put_body(&[signed_order(500_000_000)]);
        assert_eq!(body[0]["order"]["matchId"], json!("7"));
        assert_eq!(body[0]["order"]["direction"], json!(1));
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_answered_puts_do_not_accumulate_tasks() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = WsConfig {
            url: format!("ws://{}", listener.local_addr().unwrap()),
            ..WsConfig::default()
        };
        let server = tokio::spawn(answering_server(listener));

        let client = DegensClient::new(config);
        client.connect();
        let first = tokio::time::timeout(Duration::from_secs(5), client.next_event())
            .await
            .unwrap();
        assert_eq!(first, Some(ClientEvent::Connected));

        for i in 0..20 {
            assert_eq!(client.send_orders(&[signed_order(400_000_000 + i)]).unwrap(), 1);
        }

        // Only the connection watcher outlives the answered puts.
        tokio::time::timeout(Duration::from_secs(5), async {
            while unfinished(&client) > 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        client.send_orders(&[signed_order(500_000_000)]).unwrap();
        assert_eq!(client.tasks.lock().unwrap().len(), 2);

        client.shutdown().await;
        server.abort();
    }
}
