//! Predicates: pure `Context -> bool` tests a `HandlerEntry` is gated on
//! (spec §3 "Predicate"). Compose via [`Predicate::all`], [`Predicate::any`],
//! or a raw [`Predicate::callback`].

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::context::AnyContext;

use super::pattern::UrlPattern;

type TestFn = Arc<dyn Fn(&dyn AnyContext) -> bool + Send + Sync>;

enum Kind {
    Url(UrlPattern),
    Equal { key: String, value: Value },
    Between { key: String, min: f64, max: f64 },
    InList { key: String, values: Vec<Value> },
    Match { key: String, pattern: regex::Regex },
    HasValue { key: String },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Callback(TestFn),
}

/// A named test over a context, carrying its source expression (spec:
/// "carrying an optional `expression` string, for URL patterns the pattern
/// source").
#[derive(Clone)]
pub struct Predicate {
    expression: Option<String>,
    kind: Arc<Kind>,
}

impl Predicate {
    /// A URL pattern predicate. During creation the pattern is compiled into
    /// a regex (spec §3).
    pub fn url(pattern: &str) -> crate::error::Result<Self> {
        let compiled = UrlPattern::compile(pattern)?;
        Ok(Self {
            expression: Some(compiled.source().to_string()),
            kind: Arc::new(Kind::Url(compiled)),
        })
    }

    /// True when the URL-segment value named `key` equals `value` exactly.
    #[must_use]
    pub fn equal(key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        Self {
            expression: Some(format!("{key} == {value}")),
            kind: Arc::new(Kind::Equal { key, value }),
        }
    }

    /// True when the segment, parsed as `f64`, falls within `[min, max]`.
    #[must_use]
    pub fn between(key: impl Into<String>, min: f64, max: f64) -> Self {
        let key = key.into();
        Self {
            expression: Some(format!("{key} between {min}..{max}")),
            kind: Arc::new(Kind::Between { key, min, max }),
        }
    }

    /// True when the segment value is one of `values`.
    #[must_use]
    pub fn in_list(key: impl Into<String>, values: Vec<Value>) -> Self {
        let key = key.into();
        Self {
            expression: Some(format!("{key} in {values:?}")),
            kind: Arc::new(Kind::InList { key, values }),
        }
    }

    /// True when the segment value matches `pattern` as a regex.
    pub fn matching(key: impl Into<String>, pattern: &str) -> crate::error::Result<Self> {
        let key = key.into();
        let regex = regex::Regex::new(pattern)
            .map_err(|e| crate::error::Error::Internal(format!("bad predicate regex: {e}")))?;
        Ok(Self {
            expression: Some(format!("{key} matches {pattern}")),
            kind: Arc::new(Kind::Match { key, pattern: regex }),
        })
    }

    /// True when the named URL segment is present at all.
    #[must_use]
    pub fn has_value(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            expression: Some(format!("has {key}")),
            kind: Arc::new(Kind::HasValue { key }),
        }
    }

    /// True when every sub-predicate is true.
    #[must_use]
    pub fn all(predicates: Vec<Predicate>) -> Self {
        Self {
            expression: None,
            kind: Arc::new(Kind::All(predicates)),
        }
    }

    /// True when at least one sub-predicate is true.
    #[must_use]
    pub fn any(predicates: Vec<Predicate>) -> Self {
        Self {
            expression: None,
            kind: Arc::new(Kind::Any(predicates)),
        }
    }

    /// An arbitrary user-supplied test.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&dyn AnyContext) -> bool + Send + Sync + 'static,
    {
        Self {
            expression: None,
            kind: Arc::new(Kind::Callback(Arc::new(f))),
        }
    }

    #[must_use]
    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    #[must_use]
    pub fn test(&self, ctx: &dyn AnyContext) -> bool {
        match self.kind.as_ref() {
            Kind::Url(pattern) => pattern.matches(ctx.url()).is_some(),
            Kind::Equal { key, value } => ctx
                .url_segments()
                .get(key)
                .map(|v| segment_eq(v, value))
                .unwrap_or(false),
            Kind::Between { key, min, max } => ctx
                .url_segments()
                .get(key)
                .and_then(|v| v.parse::<f64>().ok())
                .map(|n| n >= *min && n <= *max)
                .unwrap_or(false),
            Kind::InList { key, values } => ctx
                .url_segments()
                .get(key)
                .map(|v| values.iter().any(|candidate| segment_eq(v, candidate)))
                .unwrap_or(false),
            Kind::Match { key, pattern } => ctx
                .url_segments()
                .get(key)
                .map(|v| pattern.is_match(v))
                .unwrap_or(false),
            Kind::HasValue { key } => ctx.url_segments().contains_key(key),
            Kind::All(predicates) => predicates.iter().all(|p| p.test(ctx)),
            Kind::Any(predicates) => predicates.iter().any(|p| p.test(ctx)),
            Kind::Callback(f) => f(ctx),
        }
    }

    /// Recursively searches for a `Url` predicate (direct, or nested inside
    /// `All`/`Any`) and returns its captures against `url`, if any matches.
    /// The Router uses this to populate `ctx.url_segments` once a
    /// `HandlerEntry` has been selected.
    #[must_use]
    pub fn url_captures(&self, url: &str) -> Option<HashMap<String, String>> {
        match self.kind.as_ref() {
            Kind::Url(pattern) => pattern.matches(url),
            Kind::All(predicates) | Kind::Any(predicates) => {
                predicates.iter().find_map(|p| p.url_captures(url))
            }
            _ => None,
        }
    }
}

fn segment_eq(segment: &str, value: &Value) -> bool {
    match value {
        Value::String(s) => segment == s,
        Value::Number(n) => segment.parse::<f64>().ok() == n.as_f64(),
        Value::Bool(b) => segment.parse::<bool>().ok() == Some(*b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RESTfulContext;
    use crate::di::ServiceCollection;
    use tokio_util::sync::CancellationToken;

    fn ctx(url: &str, segments: &[(&str, &str)]) -> RESTfulContext {
        let mut ctx = RESTfulContext::new(
            "s1".into(),
            url.into(),
            crate::context::RequestView::default(),
            ServiceCollection::new().build(),
            CancellationToken::new(),
        );
        for (k, v) in segments {
            ctx.url_segments_mut().insert((*k).to_string(), (*v).to_string());
        }
        ctx
    }

    #[test]
    fn url_predicate_matches_the_compiled_pattern() {
        let predicate = Predicate::url("/users/:id").unwrap();
        assert!(predicate.test(&ctx("/users/1", &[])));
        assert!(!predicate.test(&ctx("/teams/1", &[])));
    }

    #[test]
    fn equal_predicate_compares_segment_values() {
        let predicate = Predicate::equal("role", "admin");
        assert!(predicate.test(&ctx("/", &[("role", "admin")])));
        assert!(!predicate.test(&ctx("/", &[("role", "user")])));
    }

    #[test]
    fn all_requires_every_sub_predicate() {
        let predicate = Predicate::all(vec![
            Predicate::url("/users/:id").unwrap(),
            Predicate::equal("id", "1"),
        ]);
        assert!(predicate.test(&ctx("/users/1", &[("id", "1")])));
        assert!(!predicate.test(&ctx("/users/1", &[("id", "2")])));
    }

    #[test]
    fn url_captures_resolves_through_all() {
        let predicate = Predicate::all(vec![
            Predicate::url("/users/:id").unwrap(),
            Predicate::has_value("id"),
        ]);
        let captures = predicate.url_captures("/users/42").unwrap();
        assert_eq!(captures.get("id"), Some(&"42".to_string()));
    }
}
