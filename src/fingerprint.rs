//! Attachment content fingerprints using BLAKE3
//!
//! A file can be referenced by a test's description and by one or more of its
//! steps. Uploading it once per test is enough: the fingerprint of its bytes
//! keys the uploaded URL in an [`UploadCache`].
//!
//! # Algorithm
//!
//! 1. Hash the file bytes using BLAKE3
//! 2. Take the first 128 bits (16 bytes) of the hash
//! 3. Encode as a lowercase hexadecimal string
//!
//! # Example
//!
//! ```
//! use testcase_migrator::fingerprint::fingerprint;
//!
//! let a = fingerprint(b"PNG bytes");
//! assert_eq!(a.len(), 32);
//! assert_eq!(a, fingerprint(b"PNG bytes"));
//! assert_ne!(a, fingerprint(b"other bytes"));
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::Path;

/// Fingerprint of in-memory content
pub fn fingerprint(content: &[u8]) -> String {
    let hash = blake3::hash(content);
    hex::encode(&hash.as_bytes()[..16])
}

/// Fingerprint of a file, read in a streaming fashion
pub fn fingerprint_file(path: &Path) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    let mut file = File::open(path)?;
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(&hasher.finalize().as_bytes()[..16]))
}

/// Uploaded URLs keyed by content fingerprint
#[derive(Debug, Default)]
pub struct UploadCache {
    urls: HashMap<String, String>,
}

impl UploadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// URL of an already uploaded file with this fingerprint
    pub fn get(&self, fingerprint: &str) -> Option<&str> {
        self.urls.get(fingerprint).map(String::as_str)
    }

    pub fn insert(&mut self, fingerprint: String, url: String) {
        self.urls.insert(fingerprint, url);
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}
