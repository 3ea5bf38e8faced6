//! Replay of current state to newly connected subscribers.

use std::sync::Arc;

use crate::artifacts::ArtifactStore;
use crate::layout::LayoutState;

use super::types::ChatEvent;

/// Produces the events a new subscriber receives before any live event.
pub trait ReplaySource: Send + Sync {
    fn replay(&self) -> anyhow::Result<Vec<ChatEvent>>;
}

/// Replays the current layout followed by every stored artifact.
#[derive(Clone)]
pub struct ConnectionReplay {
    layout: Arc<LayoutState>,
    artifacts: Arc<ArtifactStore>,
}

impl ConnectionReplay {
    pub fn new(layout: Arc<LayoutState>, artifacts: Arc<ArtifactStore>) -> Self {
        Self { layout, artifacts }
    }
}

impl ReplaySource for ConnectionReplay {
    fn replay(&self) -> anyhow::Result<Vec<ChatEvent>> {
        let mut events = vec![self.layout.get_update_message()];
        events.extend(self.artifacts.get_all_artifacts_updates());
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactAction, ArtifactType};
    use crate::layout::{LayoutDefaults, LayoutMode};
    use crate::stream::NullSink;

    #[test]
    fn test_replay_order_is_layout_then_artifacts() {
        let sink = Arc::new(NullSink);
        let layout = Arc::new(LayoutState::new(sink.clone(), LayoutDefaults::default()));
        let artifacts = Arc::new(ArtifactStore::new(sink));

        layout.set_mode(LayoutMode::Split);
        let a = artifacts.create("A", "First", ArtifactType::Markdown, None);
        let b = artifacts.create("B", "Second", ArtifactType::Code, None);

        let events = ConnectionReplay::new(layout, artifacts).replay().unwrap();
        assert_eq!(events.len(), 3);

        match &events[0] {
            ChatEvent::LayoutUpdate(update) => assert_eq!(update.mode, LayoutMode::Split),
            other => panic!("expected layout update, got {other:?}"),
        }
        for (event, expected) in events[1..].iter().zip([&a, &b]) {
            match event {
                ChatEvent::ArtifactUpdate(update) => {
                    assert_eq!(update.action, ArtifactAction::Create);
                    assert_eq!(&update.artifact, expected);
                }
                other => panic!("expected artifact update, got {other:?}"),
            }
        }
    }
}
