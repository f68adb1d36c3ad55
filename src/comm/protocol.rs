//! JSON frames exchanged on `/hubs/comm`.
//!
//! Client to server: `{"invocationId": "7", "target": "SendMessage", "arguments": [42, "Hello"]}`.
//! Server to client: either an `event` frame or a `completion` frame answering an invocation.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use time::OffsetDateTime;

use crate::db::{CallId, CallSession, MediaKind, Message, MessageId, ThreadId};

use super::HubError;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    #[serde(default)]
    pub invocation_id: Option<String>,
    pub target: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl Invocation {
    pub fn new(target: &str, arguments: Vec<Value>) -> Self {
        Self {
            invocation_id: None,
            target: target.to_owned(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    pub fn into_event(self, payload: Value) -> HubEvent {
        use SignalKind::*;
        match self {
            Offer => HubEvent::ReceiveOffer(payload),
            Answer => HubEvent::ReceiveAnswer(payload),
            IceCandidate => HubEvent::ReceiveIceCandidate(payload),
        }
    }
}

/// A parsed, typed invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum HubCall {
    JoinThread { thread_id: ThreadId },
    SendMessage { thread_id: ThreadId, text: String },
    Signal { kind: SignalKind, thread_id: ThreadId, payload: Value },
    StartCall { thread_id: ThreadId, kind: MediaKind },
    EndCall { call_id: CallId },
}

impl TryFrom<Invocation> for HubCall {
    type Error = HubError;

    fn try_from(invocation: Invocation) -> Result<Self, Self::Error> {
        let Invocation { target, arguments, .. } = invocation;

        let call = match target.as_str() {
            "JoinThread" => {
                let (thread_id,) = args(&target, arguments)?;
                HubCall::JoinThread { thread_id }
            }
            "SendMessage" => {
                let (thread_id, text) = args(&target, arguments)?;
                HubCall::SendMessage { thread_id, text }
            }
            "SendOffer" | "SendAnswer" | "SendIceCandidate" => {
                let kind = match target.as_str() {
                    "SendOffer" => SignalKind::Offer,
                    "SendAnswer" => SignalKind::Answer,
                    _ => SignalKind::IceCandidate,
                };
                let (thread_id, payload) = args(&target, arguments)?;
                HubCall::Signal { kind, thread_id, payload }
            }
            "StartCall" => {
                let (thread_id, kind) = args(&target, arguments)?;
                HubCall::StartCall { thread_id, kind }
            }
            "EndCall" => {
                let (call_id,) = args(&target, arguments)?;
                HubCall::EndCall { call_id }
            }
            other => return Err(HubError::BadRequest(format!("unknown target {other}"))),
        };

        Ok(call)
    }
}

fn args<T: DeserializeOwned>(target: &str, arguments: Vec<Value>) -> Result<T, HubError> {
    serde_json::from_value(Value::Array(arguments))
        .map_err(|e| HubError::BadRequest(format!("{target}: {e}")))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
    pub sender_user_id: String,
    pub sender_name: String,
}

impl MessageView {
    pub fn new(message: Message, sender_name: String) -> Self {
        Self {
            id: message.id,
            thread_id: message.thread_id,
            text: message.text,
            sent_at: message.sent_at,
            sender_user_id: message.sender_user_id,
            sender_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStarted {
    pub thread_id: ThreadId,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub call_id: CallId,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
}

impl From<&CallSession> for CallStarted {
    fn from(call: &CallSession) -> Self {
        Self {
            thread_id: call.thread_id,
            kind: call.kind,
            call_id: call.id,
            started_at: call.started_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEnded {
    pub call_id: CallId,
    #[serde(with = "time::serde::rfc3339")]
    pub ended_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "target", content = "argument", rename_all = "camelCase")]
pub enum HubEvent {
    ReceiveMessage(MessageView),
    ReceiveOffer(Value),
    ReceiveAnswer(Value),
    ReceiveIceCandidate(Value),
    CallStarted(CallStarted),
    CallEnded(CallEnded),
}

impl HubEvent {
    pub fn target(&self) -> &'static str {
        use HubEvent::*;
        match self {
            ReceiveMessage(_) => "receiveMessage",
            ReceiveOffer(_) => "receiveOffer",
            ReceiveAnswer(_) => "receiveAnswer",
            ReceiveIceCandidate(_) => "receiveIceCandidate",
            CallStarted(_) => "callStarted",
            CallEnded(_) => "callEnded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    Event(HubEvent),
    #[serde(rename_all = "camelCase")]
    Completion {
        invocation_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}
