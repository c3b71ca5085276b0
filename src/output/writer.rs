//! Single-threaded artifact writer
//!
//! Runs in a dedicated thread and receives artifacts via a channel. Being
//! the only writer of the output tree, it needs no file locking: two
//! artifacts never race for the same file, and a destination that already
//! exists is refused rather than overwritten.
//!
//! Shutdown is an explicit message on the same channel, so every artifact
//! sent before [`ResultWriter::finish`] is on disk when it returns.

use crate::artifact::{normalize_path, Artifact, Format};
use crate::error::{WriterError, WriterResult};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

/// Message types sent to the writer thread
#[derive(Debug)]
pub enum WriterMessage {
    /// Persist an artifact
    Artifact(Artifact),

    /// Stop after everything queued before this message
    Shutdown,
}

/// Writer behavior switches
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    /// Re-serialize JSON payloads with sorted keys and indentation
    pub pretty_json: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self { pretty_json: true }
    }
}

/// Statistics about write operations
#[derive(Debug, Default)]
pub struct WriterStats {
    /// Artifacts persisted
    pub artifacts_written: AtomicU64,

    /// Persisted artifacts that record a failed command
    pub failed_commands: AtomicU64,

    /// Payload bytes persisted
    pub bytes_written: AtomicU64,

    /// Artifacts lost to write errors
    pub write_errors: AtomicU64,
}

impl WriterStats {
    pub fn artifacts_written(&self) -> u64 {
        self.artifacts_written.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn write_errors(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }

    fn snapshot(&self) -> WriterSummary {
        WriterSummary {
            artifacts_written: self.artifacts_written(),
            failed_commands: self.failed_commands.load(Ordering::Relaxed),
            bytes_written: self.bytes_written(),
            write_errors: self.write_errors(),
        }
    }
}

/// Final writer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterSummary {
    pub artifacts_written: u64,
    pub failed_commands: u64,
    pub bytes_written: u64,
    pub write_errors: u64,
}

/// Handle for sending artifacts to the writer
#[derive(Clone)]
pub struct WriterHandle {
    sender: Sender<WriterMessage>,
    stats: Arc<WriterStats>,
}

impl WriterHandle {
    /// Queue an artifact for writing (never blocks)
    pub fn send(&self, artifact: Artifact) -> WriterResult<()> {
        self.sender
            .send(WriterMessage::Artifact(artifact))
            .map_err(|_| WriterError::ChannelClosed)
    }

    fn shutdown(&self) -> WriterResult<()> {
        self.sender
            .send(WriterMessage::Shutdown)
            .map_err(|_| WriterError::ChannelClosed)
    }
}

/// Artifact writer that runs in its own thread
pub struct ResultWriter {
    /// Thread handle
    handle: Option<JoinHandle<()>>,

    /// Writer handle for sending messages
    writer_handle: WriterHandle,
}

impl ResultWriter {
    /// Spawn the writer thread for an output root
    pub fn new(root: &Path, options: WriterOptions) -> WriterResult<Self> {
        let (sender, receiver) = unbounded();
        let stats = Arc::new(WriterStats::default());

        let writer_handle = WriterHandle {
            sender,
            stats: Arc::clone(&stats),
        };

        fs::create_dir_all(root).map_err(|source| WriterError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        let thread_root = root.to_path_buf();
        let handle = thread::Builder::new()
            .name("result-writer".into())
            .spawn(move || writer_thread(thread_root, receiver, stats, options))
            .map_err(|e| WriterError::Thread(e.to_string()))?;

        Ok(Self {
            handle: Some(handle),
            writer_handle,
        })
    }

    /// Get a handle for sending artifacts to the writer
    pub fn handle(&self) -> WriterHandle {
        self.writer_handle.clone()
    }

    /// Drain everything queued so far, stop the thread and report
    pub fn finish(mut self) -> WriterResult<WriterSummary> {
        self.writer_handle.shutdown()?;

        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| WriterError::Thread("writer thread panicked".into()))?;
        }

        Ok(self.writer_handle.stats.snapshot())
    }
}

/// Internal writer thread function
fn writer_thread(
    root: PathBuf,
    receiver: Receiver<WriterMessage>,
    stats: Arc<WriterStats>,
    options: WriterOptions,
) {
    debug!(root = %root.display(), "Result writer started");

    while let Ok(msg) = receiver.recv() {
        match msg {
            WriterMessage::Artifact(artifact) => {
                if !artifact.ok {
                    stats.failed_commands.fetch_add(1, Ordering::Relaxed);
                }

                match write_artifact(&root, &artifact, options) {
                    Ok((dest, bytes)) => {
                        stats.artifacts_written.fetch_add(1, Ordering::Relaxed);
                        stats.bytes_written.fetch_add(bytes, Ordering::Relaxed);
                        trace!(path = %dest.display(), bytes, "Artifact written");
                    }
                    Err(e) => {
                        stats.write_errors.fetch_add(1, Ordering::Relaxed);
                        warn!(path = %artifact.path, error = %e, "Artifact lost");
                    }
                }
            }
            WriterMessage::Shutdown => break,
        }
    }

    debug!(
        artifacts = stats.artifacts_written(),
        errors = stats.write_errors(),
        "Result writer stopped"
    );
}

/// Resolve the on-disk destination of a logical path
pub fn destination(root: &Path, path: &str, format: Format) -> WriterResult<PathBuf> {
    let normalized = normalize_path(path);

    if normalized.is_empty() {
        return Err(WriterError::EmptyPath {
            path: path.to_string(),
        });
    }

    if normalized.split('/').any(|segment| segment == "..") {
        return Err(WriterError::UnsafePath {
            path: path.to_string(),
        });
    }

    Ok(root.join(format!("{}.{}", normalized, format.extension())))
}

/// Persist one artifact, returning its destination and size
pub fn write_artifact(
    root: &Path,
    artifact: &Artifact,
    options: WriterOptions,
) -> WriterResult<(PathBuf, u64)> {
    let dest = destination(root, &artifact.path, artifact.format)?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|source| WriterError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let reformatted;
    let payload: &[u8] = match artifact.format {
        Format::Bin => &artifact.payload,
        Format::Json if options.pretty_json => match pretty_json(&artifact.payload) {
            Some(pretty) => {
                reformatted = pretty;
                &reformatted
            }
            None => {
                warn!(path = %artifact.path, "Payload is not valid JSON, storing as is");
                &artifact.payload
            }
        },
        Format::Json | Format::Txt | Format::Xml | Format::Err => &artifact.payload,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&dest)
        .map_err(|source| {
            if source.kind() == ErrorKind::AlreadyExists {
                WriterError::AlreadyWritten { path: dest.clone() }
            } else {
                WriterError::Io {
                    path: dest.clone(),
                    source,
                }
            }
        })?;

    file.write_all(payload).map_err(|source| WriterError::Io {
        path: dest.clone(),
        source,
    })?;

    Ok((dest, payload.len() as u64))
}

/// Canonical JSON: sorted keys, four-space indentation
fn pretty_json(raw: &[u8]) -> Option<Vec<u8>> {
    let value: Value = serde_json::from_slice(raw).ok()?;

    let mut out = Vec::with_capacity(raw.len() * 2);
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    serde::Serialize::serialize(&value, &mut ser).ok()?;
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_destination() {
        let root = Path::new("/out");
        assert_eq!(
            destination(root, "//osd/0//journal/stats/", Format::Json).unwrap(),
            PathBuf::from("/out/osd/0/journal/stats.json")
        );
        assert!(matches!(
            destination(root, "//", Format::Txt),
            Err(WriterError::EmptyPath { .. })
        ));
        assert!(matches!(
            destination(root, "hosts/../../etc/passwd", Format::Txt),
            Err(WriterError::UnsafePath { .. })
        ));
    }

    #[test]
    fn test_pretty_json_is_sorted_and_indented() {
        let pretty = pretty_json(br#"{"b": 1, "a": {"d": [1, 2], "c": null}}"#).unwrap();
        let text = String::from_utf8(pretty).unwrap();
        assert_eq!(
            text,
            "{\n    \"a\": {\n        \"c\": null,\n        \"d\": [\n            1,\n            2\n        ]\n    },\n    \"b\": 1\n}"
        );
        assert!(pretty_json(b"not json").is_none());
    }

    #[test]
    fn test_write_formats() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let opts = WriterOptions::default();

        let bin = Artifact::new("master/crushmap", Format::Bin, true, vec![0u8, 159, 146, 150]);
        let (dest, size) = write_artifact(root, &bin, opts).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), vec![0u8, 159, 146, 150]);
        assert_eq!(size, 4);

        let json = Artifact::new("master/status", Format::Json, true, r#"{"z":1,"a":2}"#);
        let (dest, _) = write_artifact(root, &json, opts).unwrap();
        assert_eq!(fs::read_to_string(dest).unwrap(), "{\n    \"a\": 2,\n    \"z\": 1\n}");

        let raw = WriterOptions { pretty_json: false };
        let json = Artifact::new("master/df", Format::Json, true, r#"{"z":1,"a":2}"#);
        let (dest, _) = write_artifact(root, &json, raw).unwrap();
        assert_eq!(fs::read_to_string(dest).unwrap(), r#"{"z":1,"a":2}"#);

        let err = Artifact::new("hosts/h1/lshw", Format::Xml, false, "command not found");
        let (dest, _) = write_artifact(root, &err, opts).unwrap();
        assert!(dest.ends_with("hosts/h1/lshw.err"));
    }

    #[test]
    fn test_never_overwrites() {
        let dir = tempdir().unwrap();
        let opts = WriterOptions::default();

        let first = Artifact::new("hosts/h1/uname", Format::Txt, true, "first");
        let second = Artifact::new("/hosts//h1/uname/", Format::Txt, true, "second");

        let (dest, _) = write_artifact(dir.path(), &first, opts).unwrap();
        let err = write_artifact(dir.path(), &second, opts).unwrap_err();
        assert!(matches!(err, WriterError::AlreadyWritten { .. }));
        assert_eq!(fs::read_to_string(dest).unwrap(), "first");
    }

    #[test]
    fn test_writer_thread_drains_before_exit() {
        let dir = tempdir().unwrap();
        let writer = ResultWriter::new(dir.path(), WriterOptions::default()).unwrap();
        let handle = writer.handle();

        for i in 0..200 {
            handle
                .send(Artifact::new(format!("hosts/h{}/uname", i), Format::Txt, true, "Linux"))
                .unwrap();
        }
        handle
            .send(Artifact::new("hosts/h0/uname", Format::Txt, true, "duplicate"))
            .unwrap();
        handle
            .send(Artifact::new("hosts/h0/dmidecode", Format::Txt, false, "denied"))
            .unwrap();

        let summary = writer.finish().unwrap();
        assert_eq!(summary.artifacts_written, 201);
        assert_eq!(summary.write_errors, 1);
        assert_eq!(summary.failed_commands, 1);
        assert!(dir.path().join("hosts/h199/uname.txt").exists());
        assert!(dir.path().join("hosts/h0/dmidecode.err").exists());
    }
}
