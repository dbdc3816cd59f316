//! ULID-based identifier generation with prefixes.
//!
//! Identifiers in appsnap follow the pattern: `prefix_ulid`
//! For example: `app_01hqxyz...` for apps.
//!
//! Snapshot identifiers are not generated here: they are content hashes
//! produced by the snapshot store.

use ulid::Ulid;

/// Known identifier prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    App,
    Subscriber,
    Task,
}

impl IdPrefix {
    /// Get the string prefix for this identifier type.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdPrefix::App => "app",
            IdPrefix::Subscriber => "sub",
            IdPrefix::Task => "tsk",
        }
    }

    /// Parse a prefix from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "app" => Some(IdPrefix::App),
            "sub" => Some(IdPrefix::Subscriber),
            "tsk" => Some(IdPrefix::Task),
            _ => None,
        }
    }
}

/// Identifier generation and parsing utilities.
pub struct Identifier;

impl Identifier {
    /// Generate a new ascending identifier (newer = larger).
    pub fn ascending(prefix: IdPrefix) -> String {
        Self::with_ulid(prefix, Ulid::new())
    }

    /// Generate an identifier with a specific ULID (for testing or imports).
    pub fn with_ulid(prefix: IdPrefix, ulid: Ulid) -> String {
        format!("{}_{}", prefix.as_str(), ulid.to_string().to_lowercase())
    }

    /// Parse an identifier into its prefix and ULID parts.
    pub fn parse(id: &str) -> Option<(IdPrefix, Ulid)> {
        let (prefix, rest) = id.split_once('_')?;
        let prefix = IdPrefix::parse(prefix)?;
        let ulid = Ulid::from_string(rest).ok()?;
        Some((prefix, ulid))
    }

    /// Check if an identifier has the expected prefix.
    pub fn has_prefix(id: &str, prefix: IdPrefix) -> bool {
        id.starts_with(prefix.as_str()) && id.chars().nth(prefix.as_str().len()) == Some('_')
    }

    /// Generate an app ID.
    ///
    /// App ids are the stable external identity of a project and double as
    /// the name of its working directory, so they must be filesystem safe.
    pub fn app() -> String {
        Self::ascending(IdPrefix::App)
    }

    /// Generate a subscriber ID.
    pub fn subscriber() -> String {
        Self::ascending(IdPrefix::Subscriber)
    }

    /// Generate a generator task ID.
    pub fn task() -> String {
        Self::ascending(IdPrefix::Task)
    }

    /// Check whether a string is usable as a directory name for an app.
    pub fn is_path_safe(id: &str) -> bool {
        !id.is_empty()
            && id != "."
            && id != ".."
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    }
}
