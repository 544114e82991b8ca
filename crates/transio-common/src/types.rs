//! Core type definitions for Transio
//!
//! This module defines the values exchanged with a transient store: blobs
//! and their descriptors, the per-entry blob aggregate and parameter values.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A blob attached to an entry: bytes plus descriptive metadata
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Blob {
    /// Content
    pub data: Bytes,
    /// MIME type (e.g. "application/pdf")
    pub mime_type: Option<String>,
    /// Character encoding for text content
    pub encoding: Option<String>,
    /// Original file name
    pub filename: Option<String>,
    /// Content digest; computed on write when absent
    pub digest: Option<String>,
}

impl Blob {
    /// Create a blob from raw bytes
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// Set the MIME type
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Set the encoding
    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Set the file name
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set the digest
    #[must_use]
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    /// Content length in bytes
    #[must_use]
    pub fn length(&self) -> u64 {
        self.data.len() as u64
    }

    /// Rebuild a blob from its descriptor and the bytes read from a provider
    #[must_use]
    pub fn from_ref(blob_ref: &BlobRef, data: Bytes) -> Self {
        Self {
            data,
            mime_type: blob_ref.mime_type.clone(),
            encoding: blob_ref.encoding.clone(),
            filename: blob_ref.filename.clone(),
            digest: blob_ref.digest.clone(),
        }
    }
}

/// Descriptor of a blob stored in a blob provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    /// Key under which the provider stores the bytes
    pub provider_key: String,
    pub mime_type: Option<String>,
    pub encoding: Option<String>,
    pub filename: Option<String>,
    pub length: Option<u64>,
    pub digest: Option<String>,
}

impl BlobRef {
    /// Describe `blob` as stored under `provider_key`
    #[must_use]
    pub fn describe(provider_key: impl Into<String>, blob: &Blob) -> Self {
        Self {
            provider_key: provider_key.into(),
            mime_type: blob.mime_type.clone(),
            encoding: blob.encoding.clone(),
            filename: blob.filename.clone(),
            length: Some(blob.length()),
            digest: blob.digest.clone(),
        }
    }
}

/// Per-entry aggregate of the blobs currently written
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    /// Number of descriptors at positions `0..count`
    pub count: u32,
    /// Sum of the blob lengths
    pub total_size: u64,
}

/// Storage format of a parameter value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParameterFormat {
    /// UTF-8 text stored verbatim
    Plain,
    /// Serialized value behind a format tag
    TaggedBinary,
}

impl ParameterFormat {
    /// Marker stored alongside the value
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::TaggedBinary => "tagged",
        }
    }
}

impl std::str::FromStr for ParameterFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "tagged" => Ok(Self::TaggedBinary),
            _ => Err(format!("unknown parameter format: {s}")),
        }
    }
}

impl fmt::Display for ParameterFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of an entry parameter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Text(String),
    Bytes(Vec<u8>),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<ParameterValue>),
    Map(BTreeMap<String, ParameterValue>),
}

impl ParameterValue {
    /// Format this value is stored with
    #[must_use]
    pub const fn format(&self) -> ParameterFormat {
        match self {
            Self::Text(_) => ParameterFormat::Plain,
            _ => ParameterFormat::TaggedBinary,
        }
    }

    /// Text content, if this is a text value
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ParameterValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<Vec<u8>> for ParameterValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}
