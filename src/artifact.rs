//! Artifact records emitted by collection tasks
//!
//! An [`Artifact`] is produced inside a worker and moved through the result
//! channel to the writer thread, which is the only place that touches the
//! output tree.

use std::fmt;

/// Storage format of an artifact, determines the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Plain text
    Txt,
    /// XML document (written as text)
    Xml,
    /// JSON document (optionally re-indented by the writer)
    Json,
    /// Opaque bytes
    Bin,
    /// Diagnostic output of a failed command
    Err,
}

impl Format {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Txt => "txt",
            Format::Xml => "xml",
            Format::Json => "json",
            Format::Bin => "bin",
            Format::Err => "err",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One collected artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Whether the producing command succeeded
    pub ok: bool,

    /// Logical slash-separated path, not yet normalized
    pub path: String,

    /// Storage format (`Err` whenever `ok` is false)
    pub format: Format,

    /// Raw payload
    pub payload: Vec<u8>,
}

impl Artifact {
    /// Build an artifact, falling back to [`Format::Err`] on failure
    pub fn new(path: impl Into<String>, format: Format, ok: bool, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            ok,
            path: path.into(),
            format: if ok { format } else { Format::Err },
            payload: payload.into(),
        }
    }
}

/// Normalize a logical path
///
/// Repeated separators are collapsed and leading/trailing separators
/// removed. Normalizing twice gives the same result.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_artifact_uses_err_format() {
        let a = Artifact::new("master/status", Format::Json, false, "timeout");
        assert_eq!(a.format, Format::Err);
        assert!(!a.ok);

        let a = Artifact::new("master/crushmap", Format::Bin, true, vec![0u8, 1, 2]);
        assert_eq!(a.format, Format::Bin);
        assert_eq!(a.format.extension(), "bin");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/master//status/"), "master/status");
        assert_eq!(normalize_path("///osd///0//journal///stats"), "osd/0/journal/stats");
        assert_eq!(normalize_path("hosts/h1/uname"), "hosts/h1/uname");
        assert_eq!(normalize_path("///"), "");
        assert_eq!(normalize_path(""), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "",
            "/",
            "a",
            "//a//b//",
            "/perf_stats/h1/1700000000-0-disk",
            "mon//h1/",
            "x/./y",
        ];
        for sample in samples {
            let once = normalize_path(sample);
            assert_eq!(normalize_path(&once), once, "input {:?}", sample);
            assert!(!once.starts_with('/'));
            assert!(!once.ends_with('/'));
            assert!(!once.contains("//"));
        }
    }
}
