use std::path::PathBuf;

/// Resolved artwork image, as handed back by the host's cache/loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtworkHandle(pub PathBuf);

/// Artwork lookup is delegated to the host application; the engine only
/// keeps the resolved handle and the locator it was resolved from.
pub trait ArtworkResolver: Send + Sync {
    fn resolve(&self, locator: &str) -> Option<ArtworkHandle>;
}
