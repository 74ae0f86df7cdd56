use serde::{Deserialize, Serialize};

/// A notification stream advertised by a device (RFC 5277 `<streams>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stream {
    pub name: String,
    pub description: Option<String>,
    /// Whether the device keeps a replay log for this stream.
    pub replay_support: bool,
}

impl Stream {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            replay_support: false,
        }
    }

    pub fn with_replay(mut self) -> Self {
        self.replay_support = true;
        self
    }
}
