//! Baseline Store: current on-disk content of a repo file.
//!
//! Files are decoded as UTF-8 text. Content containing NUL bytes in its first
//! block is treated as binary and rejected rather than lossily decoded.

use std::fs;
use std::io::{self, ErrorKind};

use crate::core::error::PatchError;
use crate::infra::safepath::RepoRoot;

/// Bytes inspected for NUL when sniffing binary content.
const BINARY_SNIFF_BYTES: usize = 8 * 1024;

/// Text content and `blake3:<hex>` fingerprint of a file as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    pub content: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone)]
pub struct BaselineStore {
    root: RepoRoot,
}

impl BaselineStore {
    pub fn new(root: RepoRoot) -> Self {
        Self { root }
    }

    /// Read `rel`; `Ok(None)` when nothing exists at that path.
    pub fn read(&self, rel: &str) -> Result<Option<Baseline>, PatchError> {
        let abs = self.root.resolve(rel)?;
        let bytes = match fs::read(&abs) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PatchError::io(rel, e)),
        };
        let fingerprint = fingerprint(&bytes);
        let content = decode_text(rel, bytes)?;
        Ok(Some(Baseline { content, fingerprint }))
    }
}

/// Decode bytes as UTF-8 text, rejecting binary content.
pub fn decode_text(rel: &str, bytes: Vec<u8>) -> Result<String, PatchError> {
    let head = &bytes[..bytes.len().min(BINARY_SNIFF_BYTES)];
    if memchr::memchr(0, head).is_some() {
        return Err(PatchError::io(
            rel,
            io::Error::new(ErrorKind::InvalidData, "binary file is not supported"),
        ));
    }
    String::from_utf8(bytes).map_err(|e| {
        PatchError::io(
            rel,
            io::Error::new(ErrorKind::InvalidData, format!("file is not valid UTF-8: {e}")),
        )
    })
}

/// `blake3:<hex>` digest of the given bytes.
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(bytes).to_hex())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> BaselineStore {
        BaselineStore::new(RepoRoot::new(tmp.path()).unwrap())
    }

    #[test]
    fn missing_file_is_absent() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(store(&tmp).read("nope.txt").unwrap(), None);
    }

    #[test]
    fn reads_text_with_fingerprint() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "hello").unwrap();

        let b = store(&tmp).read("a.txt").unwrap().unwrap();
        assert_eq!(b.content, "hello");
        assert_eq!(b.fingerprint, fingerprint(b"hello"));
        assert!(b.fingerprint.starts_with("blake3:"));
    }

    #[test]
    fn rejects_binary_and_invalid_utf8() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("bin.dat"), [0x89, b'P', b'N', b'G', 0, 0, 1]).unwrap();
        fs::write(tmp.path().join("latin1.txt"), [b'c', b'a', b'f', 0xE9]).unwrap();

        for rel in ["bin.dat", "latin1.txt"] {
            match store(&tmp).read(rel) {
                Err(PatchError::Io { path, source }) => {
                    assert_eq!(path, rel);
                    assert_eq!(source.kind(), ErrorKind::InvalidData);
                }
                other => panic!("expected Io error for {rel}, got {other:?}"),
            }
        }
    }

    #[test]
    fn empty_file_is_present_and_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("empty"), "").unwrap();
        let b = store(&tmp).read("empty").unwrap().unwrap();
        assert_eq!(b.content, "");
    }
}
