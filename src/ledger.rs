//! Hash ledger: the persisted record of content already indexed.
//!
//! The ledger is an append-only text file with one digest per line. Reads
//! collapse it into a set, so duplicate lines are harmless; writes never
//! deduplicate. A missing file is an empty ledger.
//!
//! Digests are MD5 over the file bytes only, so a renamed or moved file is
//! still recognized while any edit to its content is not.

use anyhow::{Context, Result};
use md5::{Digest, Md5};
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::LedgerConfig;

/// Lowercase hex digest of a file's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Md5::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentDigest {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Digest of the file at `path`, streamed from disk.
pub fn digest_of(path: &Path) -> Result<ContentDigest> {
    let mut file =
        fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Md5::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(ContentDigest(format!("{:x}", hasher.finalize())))
}

#[derive(Debug, Clone)]
pub struct HashLedger {
    path: PathBuf,
}

impl HashLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(&config.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every digest recorded so far.
    ///
    /// Lines are trimmed and blank lines skipped. Bytes that are not valid
    /// UTF-8 (e.g. a torn trailing line) are replaced rather than rejected,
    /// so such a line can only ever be a non-matching digest.
    pub fn list(&self) -> Result<HashSet<ContentDigest>> {
        tracing::info!("Listing hashes in: {}", self.path.display());

        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read ledger {}", self.path.display()))
            }
        };

        let hashes: HashSet<ContentDigest> = String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ContentDigest::from)
            .collect();

        tracing::info!("{} hashes listed.", hashes.len());
        Ok(hashes)
    }

    pub fn contains(&self, digest: &ContentDigest) -> Result<bool> {
        Ok(self.list()?.contains(digest))
    }

    /// Appends `digest` as one line with a single write, then syncs.
    pub fn record(&self, digest: &ContentDigest) -> Result<()> {
        tracing::info!("Indexing hash: {}", digest);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open ledger {}", self.path.display()))?;

        // Terminate a torn last line so the new digest stays on its own line.
        let mut line = String::new();
        if ends_mid_line(&mut file)? {
            line.push('\n');
        }
        line.push_str(digest.as_str());
        line.push('\n');

        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to append to ledger {}", self.path.display()))?;
        file.sync_data()?;

        tracing::info!("Hash indexed.");
        Ok(())
    }
}

fn ends_mid_line(file: &mut fs::File) -> Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_digest_golden_value() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hello.txt");
        fs::write(&path, b"hello world").unwrap();

        let expected = "5eb63bbbe01eeed093cb22bb8f5acdc3";
        assert_eq!(digest_of(&path).unwrap().as_str(), expected);
        assert_eq!(ContentDigest::of_bytes(b"hello world").as_str(), expected);
    }

    #[test]
    fn test_digest_ignores_path() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.pdf");
        let b = tmp.path().join("renamed.pdf");
        fs::write(&a, b"same bytes").unwrap();
        fs::write(&b, b"same bytes").unwrap();
        assert_eq!(digest_of(&a).unwrap(), digest_of(&b).unwrap());

        fs::write(&b, b"same bytez").unwrap();
        assert_ne!(digest_of(&a).unwrap(), digest_of(&b).unwrap());
    }

    #[test]
    fn test_digest_missing_file_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(digest_of(&tmp.path().join("gone.pdf")).is_err());
    }

    #[test]
    fn test_list_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let ledger = HashLedger::new(tmp.path().join("indexed_hashes.txt"));
        assert!(ledger.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_multiple() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("indexed_hashes.txt");
        fs::write(
            &path,
            "f923637121bf9141025283ecbfaecfb4\n4d2f305e66615ed3349d02417a1541f4\n",
        )
        .unwrap();

        let listed = HashLedger::new(&path).list().unwrap();
        let expected: HashSet<ContentDigest> = [
            "f923637121bf9141025283ecbfaecfb4",
            "4d2f305e66615ed3349d02417a1541f4",
        ]
        .into_iter()
        .map(ContentDigest::from)
        .collect();
        assert_eq!(listed, expected);
    }

    #[test]
    fn test_list_deduplicates_and_trims() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("indexed_hashes.txt");
        fs::write(&path, "  d1 \nd1\n\nd2\r\nd1\n").unwrap();

        let listed = HashLedger::new(&path).list().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&ContentDigest::from("d1")));
        assert!(listed.contains(&ContentDigest::from("d2")));
    }

    #[test]
    fn test_list_tolerates_torn_trailing_line() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("indexed_hashes.txt");
        let mut bytes = b"5eb63bbbe01eeed093cb22bb8f5acdc3\n5eb6".to_vec();
        bytes.push(0xE2); // truncated multi-byte sequence
        fs::write(&path, bytes).unwrap();

        let ledger = HashLedger::new(&path);
        let listed = ledger.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(ledger
            .contains(&ContentDigest::from("5eb63bbbe01eeed093cb22bb8f5acdc3"))
            .unwrap());
        assert!(!ledger.contains(&ContentDigest::from("5eb6")).unwrap());
    }

    #[test]
    fn test_record_after_torn_line_starts_new_line() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("indexed_hashes.txt");
        fs::write(&path, "5eb63bbbe01eeed093cb22bb8f5acdc3\n5eb6").unwrap();

        let ledger = HashLedger::new(&path);
        let digest = ContentDigest::from("b6fec6100be93b50d7ea0f115e15267a");
        ledger.record(&digest).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3\n5eb6\nb6fec6100be93b50d7ea0f115e15267a\n"
        );
        assert!(ledger.contains(&digest).unwrap());
    }

    #[test]
    fn test_record_creates_and_appends() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state").join("indexed_hashes.txt");
        let ledger = HashLedger::new(&path);

        let digest = ContentDigest::from("85a3d71a6c0d7da43946ed643f5d7d4b");
        ledger.record(&digest).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "85a3d71a6c0d7da43946ed643f5d7d4b\n"
        );

        // No dedup on write
        ledger.record(&digest).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
        assert_eq!(ledger.list().unwrap().len(), 1);
        assert!(ledger.contains(&digest).unwrap());
    }
}
