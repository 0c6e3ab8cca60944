use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const LIBRARY_SCHEME: &str = "library://";

/// Where a track's audio lives. The three kinds are distinguished by
/// prefix/scheme of the string form, which is also the persisted form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Locator {
    /// File on disk, relative or absolute.
    LocalFile(PathBuf),
    /// Reference into the device media library.
    LibraryRef(String),
    /// http(s) stream.
    RemoteUrl(String),
}

impl Locator {
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Locator::RemoteUrl(raw.to_string())
        } else if let Some(reference) = raw.strip_prefix(LIBRARY_SCHEME) {
            Locator::LibraryRef(reference.to_string())
        } else {
            Locator::LocalFile(PathBuf::from(raw))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Locator::RemoteUrl(_))
    }

    pub fn as_string(&self) -> String {
        match self {
            Locator::LocalFile(path) => path.to_string_lossy().into_owned(),
            Locator::LibraryRef(reference) => format!("{LIBRARY_SCHEME}{reference}"),
            Locator::RemoteUrl(url) => url.clone(),
        }
    }
}

impl From<String> for Locator {
    fn from(raw: String) -> Self {
        Locator::parse(&raw)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.as_string()
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_by_scheme() {
        assert!(matches!(
            Locator::parse("https://example.com/feed/ep1.mp3"),
            Locator::RemoteUrl(_)
        ));
        assert!(matches!(
            Locator::parse("http://example.com/ep1.mp3"),
            Locator::RemoteUrl(_)
        ));
        assert_eq!(
            Locator::parse("library://item/12345"),
            Locator::LibraryRef("item/12345".into())
        );
        assert_eq!(
            Locator::parse("audio/book.m4b"),
            Locator::LocalFile(PathBuf::from("audio/book.m4b"))
        );
    }

    #[test]
    fn string_form_round_trips() {
        for raw in [
            "https://example.com/a.mp3",
            "library://item/9",
            "chapters/part1.mp3",
        ] {
            assert_eq!(Locator::parse(raw).as_string(), raw);
        }
    }
}
