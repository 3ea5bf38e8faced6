//! Artifacts: typed pieces of content tracked server-side and mirrored to clients.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stream::{ChatEvent, EventSink};

/// Title used when an artifact is created without one.
pub const DEFAULT_ARTIFACT_TITLE: &str = "New Artifact";

/// Kind of content an artifact holds.
///
/// For image, video, audio and pdf the content is a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    #[default]
    Markdown,
    Html,
    Code,
    Text,
    Image,
    Video,
    Audio,
    Csv,
    Pdf,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Markdown => "markdown",
            ArtifactType::Html => "html",
            ArtifactType::Code => "code",
            ArtifactType::Text => "text",
            ArtifactType::Image => "image",
            ArtifactType::Video => "video",
            ArtifactType::Audio => "audio",
            ArtifactType::Csv => "csv",
            ArtifactType::Pdf => "pdf",
        }
    }

    /// Title given by the typed constructors when the caller passes none.
    pub fn default_title(&self) -> &'static str {
        match self {
            ArtifactType::Markdown => "Markdown Artifact",
            ArtifactType::Html => "HTML Artifact",
            ArtifactType::Code => "Code Artifact",
            ArtifactType::Text => "Text Artifact",
            ArtifactType::Image => "Image Artifact",
            ArtifactType::Video => "Video Artifact",
            ArtifactType::Audio => "Audio Artifact",
            ArtifactType::Csv => "CSV Artifact",
            ArtifactType::Pdf => "PDF Artifact",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" => Ok(ArtifactType::Markdown),
            "html" => Ok(ArtifactType::Html),
            "code" => Ok(ArtifactType::Code),
            "text" => Ok(ArtifactType::Text),
            "image" => Ok(ArtifactType::Image),
            "video" => Ok(ArtifactType::Video),
            "audio" => Ok(ArtifactType::Audio),
            "csv" => Ok(ArtifactType::Csv),
            "pdf" => Ok(ArtifactType::Pdf),
            _ => anyhow::bail!("invalid artifact type: {s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: ArtifactType,
}

/// What happened to an artifact.
///
/// `Delete` is part of the wire schema for clients; the store never emits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactAction {
    Create,
    Update,
    Delete,
}

/// Artifact change as sent on the wire (`type: "artifact_update"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactUpdate {
    pub action: ArtifactAction,
    pub artifact: Artifact,
}

impl ArtifactUpdate {
    pub fn new(action: ArtifactAction, artifact: Artifact) -> Self {
        Self { action, artifact }
    }
}

/// Store of all artifacts, kept in creation order.
pub struct ArtifactStore {
    artifacts: RwLock<Vec<Artifact>>,
    sink: Arc<dyn EventSink>,
}

impl ArtifactStore {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            artifacts: RwLock::new(Vec::new()),
            sink,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Artifact>> {
        self.artifacts.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn event(action: ArtifactAction, artifact: Artifact) -> ChatEvent {
        debug!("Artifact {:?}: {} ({})", action, artifact.id, artifact.kind);
        ChatEvent::ArtifactUpdate(ArtifactUpdate::new(action, artifact))
    }

    /// Create an artifact and emit a "create" event.
    ///
    /// A fresh UUID is assigned when `id` is `None`. Creating with an id that
    /// already exists replaces that artifact and keeps its position.
    pub fn create(
        &self,
        content: impl Into<String>,
        title: impl Into<String>,
        kind: ArtifactType,
        id: Option<String>,
    ) -> Artifact {
        let artifact = Artifact {
            id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            title: title.into(),
            content: content.into(),
            kind,
        };

        self.sink.emit_with(&mut || {
            let mut artifacts = self.artifacts.write().unwrap_or_else(PoisonError::into_inner);
            match artifacts.iter_mut().find(|a| a.id == artifact.id) {
                Some(existing) => *existing = artifact.clone(),
                None => artifacts.push(artifact.clone()),
            }
            Some(Self::event(ArtifactAction::Create, artifact.clone()))
        });
        artifact
    }

    /// Replace the content of an artifact and emit an "update" event.
    ///
    /// Unknown ids are ignored. Returns whether an artifact was updated.
    pub fn update(&self, id: &str, content: impl Into<String>) -> bool {
        let content = content.into();
        let mut updated = false;

        self.sink.emit_with(&mut || {
            let mut artifacts = self.artifacts.write().unwrap_or_else(PoisonError::into_inner);
            let artifact = artifacts.iter_mut().find(|a| a.id == id)?;
            artifact.content = content.clone();
            updated = true;
            Some(Self::event(ArtifactAction::Update, artifact.clone()))
        });
        updated
    }

    pub fn get(&self, id: &str) -> Option<Artifact> {
        self.read().iter().find(|a| a.id == id).cloned()
    }

    pub fn all(&self) -> Vec<Artifact> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// One "create" event per stored artifact, in store order.
    ///
    /// Nothing is emitted; the result is meant for replay to a single client.
    pub fn get_all_artifacts_updates(&self) -> Vec<ChatEvent> {
        self.read()
            .iter()
            .cloned()
            .map(|artifact| {
                ChatEvent::ArtifactUpdate(ArtifactUpdate::new(ArtifactAction::Create, artifact))
            })
            .collect()
    }

    /// Create an artifact of `kind`, titled with [`ArtifactType::default_title`]
    /// unless `title` is given.
    pub fn create_typed(
        &self,
        content: impl Into<String>,
        title: Option<&str>,
        kind: ArtifactType,
    ) -> Artifact {
        self.create(content, title.unwrap_or(kind.default_title()), kind, None)
    }

    pub fn markdown(&self, content: impl Into<String>, title: Option<&str>) -> Artifact {
        self.create_typed(content, title, ArtifactType::Markdown)
    }

    pub fn text(&self, content: impl Into<String>, title: Option<&str>) -> Artifact {
        self.create_typed(content, title, ArtifactType::Text)
    }

    pub fn html(&self, content: impl Into<String>, title: Option<&str>) -> Artifact {
        self.create_typed(content, title, ArtifactType::Html)
    }

    pub fn image(&self, url: impl Into<String>, title: Option<&str>) -> Artifact {
        self.create_typed(url, title, ArtifactType::Image)
    }

    pub fn video(&self, url: impl Into<String>, title: Option<&str>) -> Artifact {
        self.create_typed(url, title, ArtifactType::Video)
    }

    pub fn audio(&self, url: impl Into<String>, title: Option<&str>) -> Artifact {
        self.create_typed(url, title, ArtifactType::Audio)
    }

    pub fn csv(&self, content: impl Into<String>, title: Option<&str>) -> Artifact {
        self.create_typed(content, title, ArtifactType::Csv)
    }

    pub fn pdf(&self, url: impl Into<String>, title: Option<&str>) -> Artifact {
        self.create_typed(url, title, ArtifactType::Pdf)
    }

    pub fn code(&self, content: impl Into<String>, title: Option<&str>) -> Artifact {
        self.create_typed(content, title, ArtifactType::Code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::BroadcastHub;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<ChatEvent>>);

    impl EventSink for RecordingSink {
        fn emit(&self, event: ChatEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    impl RecordingSink {
        fn actions(&self) -> Vec<(ArtifactAction, String)> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    ChatEvent::ArtifactUpdate(u) => Some((u.action, u.artifact.content.clone())),
                    _ => None,
                })
                .collect()
        }
    }

    fn store() -> (ArtifactStore, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (ArtifactStore::new(sink.clone()), sink)
    }

    #[test]
    fn test_create_get_update_round_trip() {
        let (store, sink) = store();

        let artifact = store.create("X", "Doc", ArtifactType::Markdown, None);
        assert_eq!(store.get(&artifact.id).unwrap().content, "X");

        assert!(store.update(&artifact.id, "Y"));
        assert_eq!(store.get(&artifact.id).unwrap().content, "Y");
        assert_eq!(store.get(&artifact.id).unwrap().title, "Doc");

        assert_eq!(
            sink.actions(),
            vec![
                (ArtifactAction::Create, "X".to_string()),
                (ArtifactAction::Update, "Y".to_string()),
            ]
        );
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let (store, sink) = store();
        let artifact = store.text("keep", None);

        assert!(!store.update("nonexistent", "Y"));
        assert_eq!(store.all(), vec![artifact]);
        assert_eq!(sink.actions().len(), 1);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let (store, _) = store();
        let a = store.markdown("a", None);
        let b = store.markdown("b", None);
        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());
    }

    #[test]
    fn test_create_with_existing_id_keeps_position() {
        let (store, _) = store();
        store.create("1", "one", ArtifactType::Text, Some("a".to_string()));
        store.create("2", "two", ArtifactType::Text, Some("b".to_string()));
        store.create("1b", "one again", ArtifactType::Code, Some("a".to_string()));

        let ids: Vec<_> = store.all().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.get("a").unwrap().kind, ArtifactType::Code);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_replay_updates_are_creates_without_emitting() {
        let (store, sink) = store();
        let a = store.image("https://example.com/a.png", None);
        let b = store.csv("x,y\n1,2", None);
        store.update(&b.id, "x,y\n3,4");

        let replay = store.get_all_artifacts_updates();
        assert_eq!(sink.actions().len(), 3);
        assert_eq!(replay.len(), 2);

        let expected_b = store.get(&b.id).unwrap();
        assert_eq!(
            replay,
            vec![
                ChatEvent::ArtifactUpdate(ArtifactUpdate::new(ArtifactAction::Create, a)),
                ChatEvent::ArtifactUpdate(ArtifactUpdate::new(ArtifactAction::Create, expected_b)),
            ]
        );
    }

    #[test]
    fn test_convenience_constructors_set_type_and_title() {
        let (store, _) = store();
        let cases = [
            (store.markdown("c", None), ArtifactType::Markdown, "Markdown Artifact"),
            (store.text("c", None), ArtifactType::Text, "Text Artifact"),
            (store.html("c", None), ArtifactType::Html, "HTML Artifact"),
            (store.image("c", None), ArtifactType::Image, "Image Artifact"),
            (store.video("c", None), ArtifactType::Video, "Video Artifact"),
            (store.audio("c", None), ArtifactType::Audio, "Audio Artifact"),
            (store.csv("c", None), ArtifactType::Csv, "CSV Artifact"),
            (store.pdf("c", None), ArtifactType::Pdf, "PDF Artifact"),
            (store.code("c", None), ArtifactType::Code, "Code Artifact"),
        ];
        for (artifact, kind, title) in cases {
            assert_eq!(artifact.kind, kind);
            assert_eq!(artifact.title, title);
        }
        assert_eq!(store.len(), 9);
    }

    #[test]
    fn test_convenience_constructor_title_override() {
        let (store, sink) = store();
        let report = store.markdown("# Q3", Some("Quarterly Report"));
        let clip = store.video("https://example.com/v.mp4", Some("Demo Clip"));

        assert_eq!(report.title, "Quarterly Report");
        assert_eq!(report.kind, ArtifactType::Markdown);
        assert_eq!(store.get(&clip.id).unwrap().title, "Demo Clip");
        assert_eq!(clip.kind, ArtifactType::Video);
        assert_eq!(sink.actions().len(), 2);
    }

    #[test]
    fn test_concurrent_updates_leave_subscribers_on_stored_content() {
        let hub = Arc::new(BroadcastHub::new());
        let store = Arc::new(ArtifactStore::new(hub.clone()));
        let doc = store.text("0", None);
        let mut sub = hub.register();

        let writers: Vec<_> = (0..4)
            .map(|worker| {
                let store = store.clone();
                let id = doc.id.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        store.update(&id, format!("{worker}-{i}"));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let last = sub
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                ChatEvent::ArtifactUpdate(u) => Some(u.artifact.content),
                _ => None,
            })
            .last();
        assert_eq!(last, Some(store.get(&doc.id).unwrap().content));
    }

    #[test]
    fn test_artifact_type_parse() {
        assert_eq!("PDF".parse::<ArtifactType>().unwrap(), ArtifactType::Pdf);
        assert!("spreadsheet".parse::<ArtifactType>().is_err());
    }
}
