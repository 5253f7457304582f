//! URL pattern compiler (spec §3 "URL pattern"): `:name` for a single-segment
//! capture, `:name+` for a greedy capture spanning the rest of the path.

use std::collections::HashMap;

use regex::Regex;

use crate::error::{Error, Result};

/// A compiled URL pattern plus its original source (kept for the
/// `Predicate`'s `expression` field, spec §3).
#[derive(Debug, Clone)]
pub struct UrlPattern {
    source: String,
    regex: Regex,
    names: Vec<String>,
}

impl UrlPattern {
    /// Compiles `pattern` into a regex with one named capture group per
    /// `:name`/`:name+` segment.
    pub fn compile(pattern: &str) -> Result<Self> {
        let mut regex_src = String::from("^");
        let mut names = Vec::new();

        let segments: Vec<&str> = pattern.split('/').collect();
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                regex_src.push('/');
            }
            if let Some(name) = segment.strip_prefix(':') {
                let (name, greedy) = match name.strip_suffix('+') {
                    Some(stripped) => (stripped, true),
                    None => (name, false),
                };
                if name.is_empty() {
                    return Err(Error::Internal(format!(
                        "invalid URL pattern segment {segment:?} in {pattern:?}"
                    )));
                }
                names.push(name.to_string());
                if greedy {
                    regex_src.push_str(&format!("(?P<{name}>.+)"));
                } else {
                    regex_src.push_str(&format!("(?P<{name}>[^/]+)"));
                }
            } else {
                regex_src.push_str(&regex::escape(segment));
            }
        }
        regex_src.push('$');

        let regex = Regex::new(&regex_src)
            .map_err(|e| Error::Internal(format!("bad URL pattern {pattern:?}: {e}")))?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            names,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Matches `url` and, on success, returns the captured segment values.
    #[must_use]
    pub fn matches(&self, url: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(url)?;
        let mut segments = HashMap::with_capacity(self.names.len());
        for name in &self.names {
            if let Some(value) = captures.name(name) {
                segments.insert(name.clone(), value.as_str().to_string());
            }
        }
        Some(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_segments_match_exactly() {
        let pattern = UrlPattern::compile("/users/list").unwrap();
        assert!(pattern.matches("/users/list").is_some());
        assert!(pattern.matches("/users/list/extra").is_none());
    }

    #[test]
    fn single_segment_capture_does_not_cross_slashes() {
        let pattern = UrlPattern::compile("/users/:id").unwrap();
        let segments = pattern.matches("/users/42").unwrap();
        assert_eq!(segments.get("id"), Some(&"42".to_string()));
        assert!(pattern.matches("/users/42/extra").is_none());
    }

    #[test]
    fn greedy_capture_spans_remaining_segments() {
        let pattern = UrlPattern::compile("/files/:path+").unwrap();
        let segments = pattern.matches("/files/a/b/c").unwrap();
        assert_eq!(segments.get("path"), Some(&"a/b/c".to_string()));
    }

    #[test]
    fn mixed_literal_and_capture_segments() {
        let pattern = UrlPattern::compile("/orgs/:org/repos/:repo").unwrap();
        let segments = pattern.matches("/orgs/acme/repos/widgets").unwrap();
        assert_eq!(segments.get("org"), Some(&"acme".to_string()));
        assert_eq!(segments.get("repo"), Some(&"widgets".to_string()));
    }
}
