//! UI layout state mirrored to every connected client.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::stream::{ChatEvent, EventSink};

/// Arrangement of the chat pane and the artifact pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    #[default]
    Standard,
    ChatOnly,
    ArtifactRight,
    Split,
}

impl LayoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutMode::Standard => "standard",
            LayoutMode::ChatOnly => "chat_only",
            LayoutMode::ArtifactRight => "artifact_right",
            LayoutMode::Split => "split",
        }
    }
}

impl fmt::Display for LayoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayoutMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(LayoutMode::Standard),
            "chat_only" => Ok(LayoutMode::ChatOnly),
            "artifact_right" => Ok(LayoutMode::ArtifactRight),
            "split" => Ok(LayoutMode::Split),
            _ => anyhow::bail!("invalid layout mode: {s}"),
        }
    }
}

/// Full layout state as sent on the wire (`type: "layout_update"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutUpdate {
    pub mode: LayoutMode,
    pub sidebar_visible: bool,
    pub header_title: String,
    pub header_subtitle: String,
}

/// Initial header text for a fresh layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutDefaults {
    pub header_title: String,
    pub header_subtitle: String,
}

impl Default for LayoutDefaults {
    fn default() -> Self {
        Self {
            header_title: "Chatstage".to_string(),
            header_subtitle: String::new(),
        }
    }
}

/// Current layout. Every setter emits the full state to the sink.
pub struct LayoutState {
    state: RwLock<LayoutUpdate>,
    sink: Arc<dyn EventSink>,
}

impl LayoutState {
    pub fn new(sink: Arc<dyn EventSink>, defaults: LayoutDefaults) -> Self {
        Self {
            state: RwLock::new(LayoutUpdate {
                mode: LayoutMode::default(),
                sidebar_visible: true,
                header_title: defaults.header_title,
                header_subtitle: defaults.header_subtitle,
            }),
            sink,
        }
    }

    /// Apply a mutation and emit the resulting state through the sink.
    ///
    /// The mutation runs inside [`EventSink::emit_with`], so concurrent
    /// setters reach subscribers in the order they changed the state.
    fn mutate(&self, f: impl FnOnce(&mut LayoutUpdate)) {
        let mut f = Some(f);
        self.sink.emit_with(&mut || {
            let f = f.take()?;
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut state);
            debug!("Layout changed: mode={} sidebar={}", state.mode, state.sidebar_visible);
            Some(ChatEvent::LayoutUpdate(state.clone()))
        });
    }

    pub fn snapshot(&self) -> LayoutUpdate {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn mode(&self) -> LayoutMode {
        self.snapshot().mode
    }

    pub fn sidebar_visible(&self) -> bool {
        self.snapshot().sidebar_visible
    }

    pub fn header_title(&self) -> String {
        self.snapshot().header_title
    }

    pub fn header_subtitle(&self) -> String {
        self.snapshot().header_subtitle
    }

    pub fn set_mode(&self, mode: LayoutMode) {
        self.mutate(|state| state.mode = mode);
    }

    pub fn set_sidebar_visible(&self, visible: bool) {
        self.mutate(|state| state.sidebar_visible = visible);
    }

    /// Set both header lines with a single update.
    pub fn set_header(&self, title: impl Into<String>, subtitle: impl Into<String>) {
        let (title, subtitle) = (title.into(), subtitle.into());
        self.mutate(|state| {
            state.header_title = title;
            state.header_subtitle = subtitle;
        });
    }

    pub fn set_header_title(&self, title: impl Into<String>) {
        let title = title.into();
        self.mutate(|state| state.header_title = title);
    }

    pub fn set_header_subtitle(&self, subtitle: impl Into<String>) {
        let subtitle = subtitle.into();
        self.mutate(|state| state.header_subtitle = subtitle);
    }

    /// Replace the whole layout with a single update.
    pub fn apply(&self, layout: LayoutUpdate) {
        self.mutate(|state| *state = layout);
    }

    /// Current state as an event, without emitting anything.
    pub fn get_update_message(&self) -> ChatEvent {
        ChatEvent::LayoutUpdate(self.snapshot())
    }
}
