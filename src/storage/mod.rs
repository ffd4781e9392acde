//! Object storage abstraction for uploaded PDFs and index artifacts

pub mod local;

use async_trait::async_trait;

use crate::error::{Error, Result};

pub use local::LocalObjectStore;

/// Notification that an object landed in the store
#[derive(Debug, Clone)]
pub struct StorageEvent {
    /// Object key, possibly URL-encoded by the event source
    pub key: String,
    /// Object size in bytes
    pub size: u64,
}

impl StorageEvent {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }

    /// Decoded object key. Event sources encode spaces as `+` and
    /// reserved characters as `%XX` escapes.
    pub fn decoded_key(&self) -> Result<String> {
        decode_key(&self.key)
    }
}

/// Decode a URL-encoded object key
pub fn decode_key(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");
    let bytes = spaced.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .ok_or_else(|| Error::Storage(format!("truncated escape in key '{raw}'")))?;
            let hex = std::str::from_utf8(hex)
                .map_err(|_| Error::Storage(format!("bad escape in key '{raw}'")))?;
            let value = u8::from_str_radix(hex, 16)
                .map_err(|_| Error::Storage(format!("bad escape in key '{raw}'")))?;
            out.push(value);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| Error::Storage(format!("key '{raw}' is not valid UTF-8")))
}

/// Canonical filename of an object: the first `/`-separated segment of
/// its decoded key. Artifacts for a document are stored under this
/// segment as a prefix.
pub fn canonical_filename(decoded_key: &str) -> Result<&str> {
    let first = decoded_key.split('/').next().unwrap_or("");
    if first.is_empty() {
        return Err(Error::Storage(format!(
            "object key '{decoded_key}' has no filename segment"
        )));
    }
    Ok(first)
}

/// Blob storage for documents and their derived artifacts.
///
/// Keys are `/`-separated paths. Implementations must reject traversal
/// outside their root.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// List object keys under a prefix
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    fn name(&self) -> &str;
}
