//! App manifests: TOML files the launcher loads to seed state and pick a reply behavior.
//!
//! ```toml
//! [layout]
//! mode = "split"
//! header_title = "Demo"
//!
//! [reply]
//! kind = "echo"
//! prefix = "echo: "
//!
//! [[artifacts]]
//! id = "readme"
//! title = "Readme"
//! type = "markdown"
//! content = "# Hello"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{debug, info, warn};
use notify::{EventKind, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::app::{ChatApp, MessageHandler};
use crate::artifacts::{ArtifactType, DEFAULT_ARTIFACT_TITLE};
use crate::layout::{LayoutMode, LayoutUpdate};
use crate::stream::Message;

/// Quiet period after the last file event before a reload.
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    pub layout: Option<ManifestLayout>,
    pub reply: ReplyConfig,
    pub artifacts: Vec<ManifestArtifact>,
}

/// Layout overrides. Missing fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManifestLayout {
    pub mode: Option<LayoutMode>,
    pub sidebar_visible: Option<bool>,
    pub header_title: Option<String>,
    pub header_subtitle: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    /// Reply with the inbound content behind a prefix.
    #[default]
    Echo,
    /// Register no handler; inbound messages are dropped.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplyConfig {
    pub kind: ReplyKind,
    pub prefix: String,
    /// Send a "thought" message before each reply.
    pub think: bool,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            kind: ReplyKind::Echo,
            prefix: "echo: ".to_string(),
            think: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestArtifact {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: ArtifactType,
    pub content: String,
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing manifest")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("loading manifest {}", path.display()))
    }

    /// Apply layout and artifacts to the app.
    ///
    /// Artifacts are matched by id, or by title when they have no id. A
    /// matched artifact with the same type only has its content updated;
    /// anything else is created.
    pub fn apply(&self, app: &ChatApp) {
        if let Some(layout) = &self.layout {
            let current = app.layout().snapshot();
            let merged = layout.merge_into(current.clone());
            if merged != current {
                app.layout().apply(merged);
            }
        }

        let store = app.artifacts();
        for entry in &self.artifacts {
            let title = entry.title.as_deref().unwrap_or(DEFAULT_ARTIFACT_TITLE);
            let existing = match &entry.id {
                Some(id) => store.get(id),
                None => store.all().into_iter().find(|a| a.title == title),
            };

            match existing {
                Some(found) if found.kind == entry.kind && found.title == title => {
                    if found.content != entry.content {
                        store.update(&found.id, entry.content.clone());
                    }
                }
                Some(found) => {
                    store.create(entry.content.clone(), title, entry.kind, Some(found.id));
                }
                None => {
                    store.create(entry.content.clone(), title, entry.kind, entry.id.clone());
                }
            }
        }
    }

    /// Register the reply handler described by the manifest.
    pub fn install_reply(&self, app: &ChatApp) {
        match self.reply.kind {
            ReplyKind::Echo => app.set_handler(Arc::new(EchoReply {
                prefix: self.reply.prefix.clone(),
                think: self.reply.think,
            })),
            ReplyKind::None => {
                debug!("Manifest declares no reply handler");
            }
        }
    }
}

impl ManifestLayout {
    fn merge_into(&self, mut layout: LayoutUpdate) -> LayoutUpdate {
        if let Some(mode) = self.mode {
            layout.mode = mode;
        }
        if let Some(visible) = self.sidebar_visible {
            layout.sidebar_visible = visible;
        }
        if let Some(title) = &self.header_title {
            layout.header_title = title.clone();
        }
        if let Some(subtitle) = &self.header_subtitle {
            layout.header_subtitle = subtitle.clone();
        }
        layout
    }
}

struct EchoReply {
    prefix: String,
    think: bool,
}

#[async_trait]
impl MessageHandler for EchoReply {
    async fn handle(&self, app: &ChatApp, message: Message) -> Result<()> {
        if self.think {
            app.think(format!("Reading {} characters", message.content.chars().count()));
        }
        app.reply(format!("{}{}", self.prefix, message.content));
        Ok(())
    }
}

/// Watch the manifest file and re-apply it whenever it changes.
///
/// The directory is watched rather than the file so editors that replace the
/// file on save are picked up. A manifest that fails to parse is logged and
/// the previous state is kept.
pub fn spawn_reload(path: PathBuf, app: ChatApp) -> Result<JoinHandle<()>> {
    let file_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .ok_or_else(|| anyhow!("manifest path has no file name: {}", path.display()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let (tx, mut rx) = mpsc::channel(128);
    let mut watcher = notify::recommended_watcher(move |res| {
        if tx.blocking_send(res).is_err() {
            debug!("Manifest watch channel closed");
        }
    })
    .context("creating manifest watcher")?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("watching {}", dir.display()))?;

    info!("Watching {} for changes", path.display());

    Ok(tokio::spawn(async move {
        // Dropping the watcher stops notifications.
        let _watcher = watcher;
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                incoming = rx.recv() => {
                    match incoming {
                        Some(Ok(event)) => {
                            let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                                && event
                                    .paths
                                    .iter()
                                    .any(|p| p.file_name() == Some(file_name.as_os_str()));
                            if relevant {
                                deadline = Some(Instant::now() + RELOAD_DEBOUNCE);
                            }
                        }
                        Some(Err(err)) => {
                            warn!("Manifest watcher error: {:?}", err);
                        }
                        None => break,
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    match Manifest::load(&path) {
                        Ok(manifest) => {
                            manifest.apply(&app);
                            manifest.install_reply(&app);
                            info!("Reloaded manifest {}", path.display());
                        }
                        Err(e) => {
                            warn!("Keeping previous state, manifest reload failed: {:#}", e);
                        }
                    }
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ChatEvent;

    const DEMO: &str = r##"
[layout]
mode = "split"
header_title = "Demo"

[reply]
prefix = ">> "
think = true

[[artifacts]]
id = "readme"
title = "Readme"
content = "# Hello"

[[artifacts]]
type = "csv"
content = "a,b"
"##;

    #[test]
    fn test_parse_defaults() {
        let manifest = Manifest::parse("").unwrap();
        assert_eq!(manifest, Manifest::default());
        assert_eq!(manifest.reply.kind, ReplyKind::Echo);
        assert_eq!(manifest.reply.prefix, "echo: ");
    }

    #[test]
    fn test_parse_rejects_unknown_values() {
        assert!(Manifest::parse("[layout]\nmode = \"fullscreen\"\n").is_err());
        assert!(Manifest::parse("[[artifacts]]\ntype = \"xlsx\"\ncontent = \"\"\n").is_err());
        assert!(Manifest::parse("[server]\nport = 1\n").is_err());
    }

    #[test]
    fn test_apply_seeds_layout_and_artifacts() {
        let app = ChatApp::new();
        Manifest::parse(DEMO).unwrap().apply(&app);

        let layout = app.layout().snapshot();
        assert_eq!(layout.mode, LayoutMode::Split);
        assert_eq!(layout.header_title, "Demo");
        assert!(layout.sidebar_visible);

        let artifacts = app.artifacts().all();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].id, "readme");
        assert_eq!(artifacts[0].kind, ArtifactType::Markdown);
        assert_eq!(artifacts[1].title, DEFAULT_ARTIFACT_TITLE);
        assert_eq!(artifacts[1].kind, ArtifactType::Csv);
    }

    #[test]
    fn test_reapply_updates_in_place() {
        let app = ChatApp::new();
        Manifest::parse(DEMO).unwrap().apply(&app);
        let mut sub = app.hub().register();

        let changed = DEMO.replace("# Hello", "# Changed");
        Manifest::parse(&changed).unwrap().apply(&app);

        assert_eq!(app.artifacts().len(), 2);
        assert_eq!(app.artifacts().get("readme").unwrap().content, "# Changed");

        let events = sub.drain();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ChatEvent::ArtifactUpdate(update) => assert_eq!(update.artifact.id, "readme"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_echo_reply_with_thought() {
        let app = ChatApp::new();
        Manifest::parse(DEMO).unwrap().install_reply(&app);
        let mut sub = app.hub().register();

        app.dispatch(Message::new("user", "hi")).await;
        let events = sub.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), "thought");
        assert_eq!(events[1], ChatEvent::Message(Message::new("ai", ">> hi")));
    }

    #[test]
    fn test_reply_none_installs_nothing() {
        let app = ChatApp::new();
        Manifest::parse("[reply]\nkind = \"none\"\n")
            .unwrap()
            .install_reply(&app);
        assert!(!app.has_handler());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("missing.toml"));
    }
}
