//! Path exclusion filter
//!
//! Artifacts are addressed by slash-separated logical paths. The filter
//! holds a list of compiled regexes; a path is collected unless one of them
//! matches anywhere in it.

use crate::error::ConfigError;
use regex::Regex;

/// Set of exclusion patterns, compiled once before the run starts
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    patterns: Vec<Regex>,
}

impl PathFilter {
    /// Filter that allows everything
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Compile a filter from raw pattern strings
    pub fn new<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(p).map_err(|e| ConfigError::InvalidExcludePattern {
                    pattern: p.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// Check if a logical path should be collected
    pub fn allowed(&self, path: &str) -> bool {
        !self.patterns.iter().any(|re| re.is_match(path))
    }

    /// Number of configured patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_allows_everything() {
        let filter = PathFilter::allow_all();
        assert!(filter.allowed("master/status"));
        assert!(filter.allowed(""));
        assert!(filter.is_empty());
    }

    #[test]
    fn test_substring_search() {
        let filter = PathFilter::new(["osd/0/journal"]).unwrap();
        assert!(!filter.allowed("osd/0/journal"));
        assert!(!filter.allowed("osd/0/journal/stats"));
        assert!(!filter.allowed("/osd/0/journal/hdparm"));
        assert!(filter.allowed("osd/0/data/stats"));
        assert!(filter.allowed("osd/10/data"));
    }

    #[test]
    fn test_regex_patterns() {
        let filter = PathFilter::new([r"smartctl$", r"^hosts/.*/dmidecode"]).unwrap();
        assert!(!filter.allowed("osd/3/data/smartctl"));
        assert!(!filter.allowed("hosts/h1/dmidecode"));
        assert!(filter.allowed("osd/3/data/hdparm"));
        assert!(filter.allowed("mon/hosts/h1/dmidecode"));
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn test_invalid_pattern() {
        let err = PathFilter::new(["osd/(0"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidExcludePattern { .. }));
    }
}
