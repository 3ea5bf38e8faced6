//! Event types streamed to browser clients.
//!
//! Every event is a JSON object with a `type` discriminator. Layout and
//! artifact updates carry a fixed tag; anything else is a chat message whose
//! own `type` field is the message kind ("text", "thought", ...).

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::artifacts::ArtifactUpdate;
use crate::layout::LayoutUpdate;

const LAYOUT_UPDATE_TAG: &str = "layout_update";
const ARTIFACT_UPDATE_TAG: &str = "artifact_update";
const TEXT_KIND: &str = "text";

// ============================================================================
// Chat messages
// ============================================================================

/// A file attached to a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub size: u64,
    /// MIME type.
    #[serde(rename = "type")]
    pub mime_type: String,
    #[serde(default)]
    pub preview: Option<String>,
}

/// A chat message, inbound from a client or outbound from the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
    /// Message kind, e.g. "text" or "thought". `None` is sent as "text".
    #[serde(
        rename = "type",
        default = "default_kind",
        serialize_with = "serialize_kind"
    )]
    pub kind: Option<String>,
    #[serde(default = "default_status")]
    pub status: Option<String>,
    #[serde(default)]
    pub trace: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(rename = "replyingTo", default)]
    pub replying_to: Option<String>,
}

fn default_kind() -> Option<String> {
    Some(TEXT_KIND.to_string())
}

fn serialize_kind<S: Serializer>(kind: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(kind.as_deref().unwrap_or(TEXT_KIND))
}

fn default_status() -> Option<String> {
    Some("success".to_string())
}

impl Message {
    /// Create a plain text message.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: String::new(),
            kind: default_kind(),
            status: default_status(),
            trace: None,
            attachments: None,
            replying_to: None,
        }
    }

    /// Create a "thought" message, rendered by clients as reasoning.
    pub fn thought(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(role, content).with_kind("thought")
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn replying_to(mut self, id: impl Into<String>) -> Self {
        self.replying_to = Some(id.into());
        self
    }
}

// ============================================================================
// Events (Server -> Client)
// ============================================================================

/// Events pushed to every stream subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A chat message.
    Message(Message),
    /// Full layout state.
    LayoutUpdate(LayoutUpdate),
    /// An artifact was created, updated or deleted.
    ArtifactUpdate(ArtifactUpdate),
}

impl ChatEvent {
    /// The wire discriminator of this event.
    pub fn event_type(&self) -> &str {
        match self {
            ChatEvent::Message(message) => message.kind.as_deref().unwrap_or(TEXT_KIND),
            ChatEvent::LayoutUpdate(_) => LAYOUT_UPDATE_TAG,
            ChatEvent::ArtifactUpdate(_) => ARTIFACT_UPDATE_TAG,
        }
    }

    /// Encode as a JSON string for the wire.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<Message> for ChatEvent {
    fn from(message: Message) -> Self {
        ChatEvent::Message(message)
    }
}

impl From<LayoutUpdate> for ChatEvent {
    fn from(update: LayoutUpdate) -> Self {
        ChatEvent::LayoutUpdate(update)
    }
}

impl From<ArtifactUpdate> for ChatEvent {
    fn from(update: ArtifactUpdate) -> Self {
        ChatEvent::ArtifactUpdate(update)
    }
}

#[derive(Serialize)]
struct Tagged<'a, T> {
    #[serde(rename = "type")]
    tag: &'static str,
    #[serde(flatten)]
    body: &'a T,
}

impl Serialize for ChatEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ChatEvent::Message(message) => message.serialize(serializer),
            ChatEvent::LayoutUpdate(update) => Tagged {
                tag: LAYOUT_UPDATE_TAG,
                body: update,
            }
            .serialize(serializer),
            ChatEvent::ArtifactUpdate(update) => Tagged {
                tag: ARTIFACT_UPDATE_TAG,
                body: update,
            }
            .serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ChatEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut value = Value::deserialize(deserializer)?;
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_owned);

        match tag.as_deref() {
            Some(LAYOUT_UPDATE_TAG) | Some(ARTIFACT_UPDATE_TAG) => {
                if let Some(object) = value.as_object_mut() {
                    object.remove("type");
                }
                if tag.as_deref() == Some(LAYOUT_UPDATE_TAG) {
                    serde_json::from_value(value)
                        .map(ChatEvent::LayoutUpdate)
                        .map_err(D::Error::custom)
                } else {
                    serde_json::from_value(value)
                        .map(ChatEvent::ArtifactUpdate)
                        .map_err(D::Error::custom)
                }
            }
            _ => serde_json::from_value(value)
                .map(ChatEvent::Message)
                .map_err(D::Error::custom),
        }
    }
}
