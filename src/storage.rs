//! File-backed storage service: directory layout, line-oriented JSONL
//! read/write, atomic rewrites, and advisory file locks (spec.md §4.1).

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use serde::de::DeserializeOwned;
use serde::Serialize;

const LOCK_RETRY_BUDGET: Duration = Duration::from_millis(5_000);
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// Root directory layout: `<root>/<lang-pair>/*.jsonl` and `<root>/user/*`.
#[derive(Clone, Debug)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("create data root: {}", root.display()))?;
        fs::create_dir_all(root.join("user"))
            .with_context(|| format!("create user dir: {}", root.join("user").display()))?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn language_dir(&self, lang_pair: &str) -> PathBuf {
        self.root.join(lang_pair)
    }

    #[must_use]
    pub fn user_dir(&self) -> PathBuf {
        self.root.join("user")
    }

    pub fn language_file(&self, lang_pair: &str, name: &str) -> anyhow::Result<PathBuf> {
        let dir = self.language_dir(lang_pair);
        fs::create_dir_all(&dir).with_context(|| format!("create lang dir: {}", dir.display()))?;
        Ok(dir.join(name))
    }

    pub fn user_file(&self, name: &str) -> PathBuf {
        self.user_dir().join(name)
    }
}

/// Decode a file's bytes as text, detecting BOMs and falling back to the
/// zero-byte heuristic for UTF-16LE described in spec.md §4.1.
pub fn read_all_text(path: &Path) -> anyhow::Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    let bytes = fs::read(path).with_context(|| format!("read file: {}", path.display()))?;
    Ok(decode_text(&bytes))
}

#[must_use]
pub fn decode_text(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(&bytes[3..]).into_owned();
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        let (text, _, _) = encoding_rs::UTF_16LE.decode(&bytes[2..]);
        return text.into_owned();
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let (text, _, _) = encoding_rs::UTF_16BE.decode(&bytes[2..]);
        return text.into_owned();
    }
    let sample_len = bytes.len().min(2000);
    let sample = &bytes[..sample_len];
    if sample_len > 0 {
        let zero_count = sample.iter().filter(|&&b| b == 0).count();
        if zero_count * 10 >= sample_len {
            let (text, _, _) = encoding_rs::UTF_16LE.decode(bytes);
            return text.into_owned();
        }
    }
    String::from_utf8(bytes.to_vec())
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
}

/// Lazily read a JSONL file: one object per line, blank lines and malformed
/// lines silently skipped. Missing files yield an empty iterator, never an
/// error (spec.md §4.1 failure semantics).
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("open jsonl: {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Ok(item) = serde_json::from_str::<T>(trimmed) {
            out.push(item);
        }
        // Malformed lines are dropped silently; spec.md §7 DataFormatError is
        // counted by callers that care (repositories track a skip counter),
        // never surfaced per-request.
    }
    Ok(out)
}

/// Atomically rewrite a JSONL file: write to `<file>.tmp`, flush, rename over
/// the original. Must be performed under `with_file_lock` by callers that
/// mutate shared files.
pub fn rewrite_jsonl<T: Serialize>(path: &Path, items: &[T]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create parent dir: {}", parent.display()))?;
    }
    let tmp_path = tmp_path_for(path);
    {
        let mut file = File::create(&tmp_path)
            .with_context(|| format!("create tmp file: {}", tmp_path.display()))?;
        for item in items {
            let line = serde_json::to_string(item).context("serialize jsonl entry")?;
            writeln!(file, "{line}").with_context(|| format!("write tmp file: {}", tmp_path.display()))?;
        }
        file.flush().context("flush tmp file")?;
    }
    fs::rename(&tmp_path, path)
        .with_context(|| format!("rename {} -> {}", tmp_path.display(), path.display()))?;
    Ok(())
}

/// Append a single JSON line to a file, creating it if necessary.
pub fn append_jsonl<T: Serialize>(path: &Path, item: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create parent dir: {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open for append: {}", path.display()))?;
    let line = serde_json::to_string(item).context("serialize jsonl entry")?;
    writeln!(file, "{line}").with_context(|| format!("append to: {}", path.display()))?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}

/// An advisory, cross-process lock held by exclusively creating
/// `<target>.lock`. Retries with backoff up to ~5s; releases by deleting the
/// lock file, even on panic unwind through the action closure.
pub struct FileLockGuard {
    path: PathBuf,
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn acquire_lock(target: &Path) -> anyhow::Result<FileLockGuard> {
    let lock_path = lock_path_for(target);
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent).ok();
    }
    let deadline = Instant::now() + LOCK_RETRY_BUDGET;
    loop {
        match OpenOptions::new().create_new(true).write(true).open(&lock_path) {
            Ok(_) => return Ok(FileLockGuard { path: lock_path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if Instant::now() >= deadline {
                    return Err(anyhow!(
                        "lock timeout acquiring {} after {:?}",
                        lock_path.display(),
                        LOCK_RETRY_BUDGET
                    ));
                }
                thread::sleep(LOCK_RETRY_INTERVAL);
            }
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("create lock file: {}", lock_path.display()))
            }
        }
    }
}

/// Run `action` while holding the advisory lock on `target`. All mutations to
/// shared files go through this.
pub fn with_file_lock<T>(
    target: &Path,
    action: impl FnOnce() -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let _guard = acquire_lock(target)?;
    action()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Item {
        n: u32,
    }

    #[test]
    fn read_jsonl_skips_blank_and_malformed_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("items.jsonl");
        fs::write(&path, "{\"n\":1}\n\nnot json\n{\"n\":2}\n").unwrap();
        let items: Vec<Item> = read_jsonl(&path).unwrap();
        assert_eq!(items, vec![Item { n: 1 }, Item { n: 2 }]);
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.jsonl");
        let items: Vec<Item> = read_jsonl(&path).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn rewrite_is_atomic_and_replaces_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("items.jsonl");
        rewrite_jsonl(&path, &[Item { n: 1 }, Item { n: 2 }]).unwrap();
        let items: Vec<Item> = read_jsonl(&path).unwrap();
        assert_eq!(items, vec![Item { n: 1 }, Item { n: 2 }]);
        rewrite_jsonl(&path, &[Item { n: 3 }]).unwrap();
        let items: Vec<Item> = read_jsonl(&path).unwrap();
        assert_eq!(items, vec![Item { n: 3 }]);
        assert!(!dir.path().join("items.jsonl.tmp").exists());
    }

    #[test]
    fn append_adds_single_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("items.jsonl");
        append_jsonl(&path, &Item { n: 1 }).unwrap();
        append_jsonl(&path, &Item { n: 2 }).unwrap();
        let items: Vec<Item> = read_jsonl(&path).unwrap();
        assert_eq!(items, vec![Item { n: 1 }, Item { n: 2 }]);
    }

    #[test]
    fn with_file_lock_excludes_concurrent_acquire() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("items.jsonl");
        let _guard = acquire_lock(&target).unwrap();
        let lock_path = lock_path_for(&target);
        assert!(lock_path.exists());
        drop(_guard);
        assert!(!lock_path.exists());
    }

    #[test]
    fn decode_text_handles_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("hello".as_bytes());
        assert_eq!(decode_text(&bytes), "hello");
    }
}
