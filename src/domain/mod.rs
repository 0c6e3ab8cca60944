mod artwork;
mod locator;
mod queue;
mod track;

pub use artwork::{ArtworkHandle, ArtworkResolver};
pub use locator::Locator;
pub use queue::PlayQueue;
pub use track::Track;

use serde::{Deserialize, Serialize};

/// One of the two independent playback lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    Music,
    Speech,
}

impl ChannelKind {
    pub fn label(&self) -> &'static str {
        match self {
            ChannelKind::Music => "music",
            ChannelKind::Speech => "speech",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
