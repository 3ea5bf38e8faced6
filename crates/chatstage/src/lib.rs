//! Chatstage: chat-style web applications backed by a server-sent event hub.
//!
//! A [`ChatApp`] owns a [`BroadcastHub`], the shared [`LayoutState`] and
//! [`ArtifactStore`], and an optional [`MessageHandler`]. Every state change
//! is pushed to connected browsers over `GET /api/chat/stream`; new
//! connections first receive the current layout and all artifacts.

pub mod api;
pub mod app;
pub mod artifacts;
pub mod layout;
pub mod manifest;
pub mod settings;
pub mod stream;

pub use api::ServerOptions;
pub use app::{AI_ROLE, CLI_ENV_VAR, ChatApp, MessageHandler, shutdown_signal};
pub use artifacts::{
    Artifact, ArtifactAction, ArtifactStore, ArtifactType, ArtifactUpdate, DEFAULT_ARTIFACT_TITLE,
};
pub use layout::{LayoutDefaults, LayoutMode, LayoutState, LayoutUpdate};
pub use manifest::Manifest;
pub use settings::Settings;
pub use stream::{Attachment, BroadcastHub, ChatEvent, EventSink, Message, Subscriber};
