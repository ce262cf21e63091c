//! Text frame codec: `opcode|id|jsonBody`.

use crate::error::WsError;
use crate::shared::RequestId;
use serde_json::Value;

// ─── Outbound ────────────────────────────────────────────────────────────────

/// Outbound operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Hello,
    Sub,
    Unsub,
    Put,
    Ping,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Hello => "hello",
            Op::Sub => "sub",
            Op::Unsub => "unsub",
            Op::Put => "put",
            Op::Ping => "ping",
        }
    }

    /// Subscription management frames are never queued while offline;
    /// the registry replays them on the next connect instead.
    pub fn is_subscription(self) -> bool {
        matches!(self, Op::Sub | Op::Unsub)
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame an outbound message.
pub fn encode(op: Op, id: &RequestId, body: &Value) -> String {
    format!("{}|{}|{}", op, id, body)
}

// ─── Inbound ─────────────────────────────────────────────────────────────────

/// The three response kinds the server sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// `rf`: last message for this id.
    Final,
    /// `rr`: one record of a stream; more may follow.
    Record,
    /// `re`: failure. The body is a plain string, not JSON.
    Error,
}

impl ResponseKind {
    pub fn from_opcode(s: &str) -> Option<Self> {
        match s {
            "rf" => Some(ResponseKind::Final),
            "rr" => Some(ResponseKind::Record),
            "re" => Some(ResponseKind::Error),
            _ => None,
        }
    }
}

/// A parsed inbound frame. The body is kept raw until dispatch so that
/// frames for unknown ids are never deserialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub kind: ResponseKind,
    pub id: RequestId,
    pub body: String,
}

impl InboundFrame {
    /// Decode the body into the value handed to the request owner.
    pub fn into_delivery(self) -> Result<Value, WsError> {
        match self.kind {
            ResponseKind::Error => Err(WsError::Server(self.body)),
            ResponseKind::Final | ResponseKind::Record => serde_json::from_str(&self.body)
                .map_err(|e| WsError::DeserializationError(e.to_string())),
        }
    }
}

/// Split an inbound frame. The body may itself contain `|`.
pub fn decode(text: &str) -> Result<InboundFrame, WsError> {
    let mut parts = text.splitn(3, '|');
    let opcode = parts.next().unwrap_or_default();
    let kind = ResponseKind::from_opcode(opcode)
        .ok_or_else(|| WsError::Frame(format!("unexpected opcode {:?}", opcode)))?;
    let id = parts
        .next()
        .ok_or_else(|| WsError::Frame("missing id".into()))?;
    let body = parts.next().unwrap_or_default();

    Ok(InboundFrame {
        kind,
        id: RequestId::new(id),
        body: body.to_string(),
    })
}
