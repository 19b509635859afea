// Progress events shared by the orchestrators and the extractor

use serde::Serialize;
use tokio::sync::mpsc;

use super::models::OutcomeStatus;

/// Per-item progress, delivered in the order things happen
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { url: String },
    Progress { url: String, percent: f32, status: String },
    /// Second pass with a cookie file attached
    Retrying { url: String },
    Finished { url: String, status: OutcomeStatus },
}

impl ProgressEvent {
    pub fn url(&self) -> &str {
        match self {
            Self::Started { url }
            | Self::Progress { url, .. }
            | Self::Retrying { url }
            | Self::Finished { url, .. } => url,
        }
    }
}

/// Progress emitter helper; a closed or missing receiver is ignored
#[derive(Debug, Clone, Default)]
pub struct ProgressEmitter {
    sender: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressEmitter {
    pub fn new(sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Emitter that drops every event
    pub fn silent() -> Self {
        Self::default()
    }

    /// Emitter plus the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}
