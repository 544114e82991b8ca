//! Key namespace codec
//!
//! Builds the flat key/value store keys addressing each field of an entry,
//! and recognizes completion markers when enumerating the store.
//!
//! Store, entry and parameter names are percent-encoded, `.` included, so
//! the first `.` after the store prefix always starts the field suffix and
//! no parameter key can be mistaken for a completion marker.

use std::borrow::Cow;

const COMPLETED: &str = ".completed";
const PARAMETER_NAMES: &str = ".paramsnames";
const PARAMETER: &str = ".param.";
const PARAMETER_FORMAT: &str = ".paramformat.";
const BLOB_LOCK: &str = ".bloblock";
const BLOB_INFO: &str = ".blobinfo";
const BLOB: &str = ".blob.";
const STORAGE_SIZE: &str = "__blobsize__";

/// Escape `name` so it holds neither `.` nor `:`
fn encode(name: &str) -> Cow<'_, str> {
    match urlencoding::encode(name) {
        Cow::Borrowed(plain) if !plain.contains('.') => Cow::Borrowed(plain),
        encoded => Cow::Owned(encoded.replace('.', "%2E")),
    }
}

/// Key codec of one store namespace
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyCodec {
    prefix: String,
}

impl KeyCodec {
    /// Codec for the store named `store_name`
    pub fn new(store_name: &str) -> Self {
        Self {
            prefix: format!("{}:", encode(store_name)),
        }
    }

    /// Prefix shared by every key of the store
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn field(&self, entry: &str, suffix: &str) -> String {
        format!("{}{}{suffix}", self.prefix, encode(entry))
    }

    #[must_use]
    pub fn completed(&self, entry: &str) -> String {
        self.field(entry, COMPLETED)
    }

    #[must_use]
    pub fn parameter_names(&self, entry: &str) -> String {
        self.field(entry, PARAMETER_NAMES)
    }

    #[must_use]
    pub fn parameter(&self, entry: &str, name: &str) -> String {
        format!("{}{}{PARAMETER}{}", self.prefix, encode(entry), encode(name))
    }

    #[must_use]
    pub fn parameter_format(&self, entry: &str, name: &str) -> String {
        format!(
            "{}{}{PARAMETER_FORMAT}{}",
            self.prefix,
            encode(entry),
            encode(name)
        )
    }

    #[must_use]
    pub fn blob_lock(&self, entry: &str) -> String {
        self.field(entry, BLOB_LOCK)
    }

    #[must_use]
    pub fn blob_info(&self, entry: &str) -> String {
        self.field(entry, BLOB_INFO)
    }

    #[must_use]
    pub fn blob(&self, entry: &str, index: u32) -> String {
        format!("{}{}{BLOB}{index}", self.prefix, encode(entry))
    }

    /// Common prefix of every blob descriptor of `entry`
    #[must_use]
    pub fn blob_prefix(&self, entry: &str) -> String {
        self.field(entry, BLOB)
    }

    /// Store-wide approximate size counter
    #[must_use]
    pub fn storage_size(&self) -> String {
        format!("{}{STORAGE_SIZE}", self.prefix)
    }

    /// Entry addressed by a completion marker key, if `key` is one
    #[must_use]
    pub fn entry_of_completed(&self, key: &str) -> Option<String> {
        let encoded = key
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(COMPLETED)
            .filter(|entry| !entry.is_empty() && !entry.contains('.'))?;
        urlencoding::decode(encoded).ok().map(Cow::into_owned)
    }
}
