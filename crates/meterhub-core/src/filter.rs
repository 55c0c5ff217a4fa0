//! Meter filter chain.
//!
//! Filters are pure `MeterId -> Keep(MeterId) | Drop` functions applied in
//! insertion order at registration time only. The registry memoizes the
//! chain's result per raw identity, so a filter runs once per distinct input.
//!
//! Rules from configuration are compiled here (regex lists for URI rewrite and
//! ignore patterns) so malformed patterns fail at startup, not on the hot path.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::error::{MeterError, Result};
use crate::id::{MeterId, Tag};

/// Outcome of one filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterReply {
    Keep(MeterId),
    Drop,
}

type FilterFn = dyn Fn(MeterId) -> FilterReply + Send + Sync;

/// A single named filter.
#[derive(Clone)]
pub struct MeterFilter {
    label: String,
    f: Arc<FilterFn>,
}

impl fmt::Debug for MeterFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterFilter").field("label", &self.label).finish()
    }
}

impl MeterFilter {
    /// Arbitrary transform. Must be pure: same input, same output.
    pub fn new<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(MeterId) -> FilterReply + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            f: Arc::new(f),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn apply(&self, id: MeterId) -> FilterReply {
        (self.f)(id)
    }

    /// Add tags missing on the instrument; instrument tags win.
    pub fn common_tags(tags: Vec<Tag>) -> Self {
        Self::new("common_tags", move |id| FilterReply::Keep(id.with_default_tags(&tags)))
    }

    /// Drop every instrument whose name starts with `prefix`.
    pub fn deny_name_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self::new(format!("deny_prefix:{prefix}"), move |id| {
            if id.name().starts_with(prefix.as_str()) {
                FilterReply::Drop
            } else {
                FilterReply::Keep(id)
            }
        })
    }

    /// Strip tag keys entirely.
    pub fn ignore_tags(keys: Vec<String>) -> Self {
        Self::new("ignore_tags", move |id| {
            let id = keys.iter().fold(id, |id, k| id.without_tag(k));
            FilterReply::Keep(id)
        })
    }

    /// Rename a tag key on instruments whose name starts with `name_prefix`.
    pub fn rename_tag(
        name_prefix: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        let (name_prefix, from, to) = (name_prefix.into(), from.into(), to.into());
        Self::new(format!("rename_tag:{from}->{to}"), move |id| {
            if !id.name().starts_with(name_prefix.as_str()) {
                return FilterReply::Keep(id);
            }
            let Some(v) = id.tag(&from).map(str::to_owned) else {
                return FilterReply::Keep(id);
            };
            FilterReply::Keep(id.without_tag(&from).with_tag(to.clone(), v))
        })
    }

    /// Rewrite the value of `key` using the first matching rule.
    pub fn replace_tag_values(key: impl Into<String>, rules: Vec<RewriteRule>) -> Self {
        let key = key.into();
        Self::new(format!("replace_tag_values:{key}"), move |id| {
            let Some(value) = id.tag(&key) else {
                return FilterReply::Keep(id);
            };
            match rules.iter().find(|r| r.pattern.is_match(value)) {
                Some(rule) => {
                    let replaced = rule.replacement.clone();
                    FilterReply::Keep(id.with_tag(key.clone(), replaced))
                }
                None => FilterReply::Keep(id),
            }
        })
    }

    /// Drop instruments whose `key` tag matches any pattern.
    pub fn deny_tag_values(key: impl Into<String>, patterns: Vec<Regex>) -> Self {
        let key = key.into();
        Self::new(format!("deny_tag_values:{key}"), move |id| {
            match id.tag(&key) {
                Some(v) if patterns.iter().any(|p| p.is_match(v)) => FilterReply::Drop,
                _ => FilterReply::Keep(id),
            }
        })
    }
}

/// Compiled `REGEX=REPLACEMENT` rule.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pub pattern: Regex,
    pub replacement: String,
}

/// Compile an anchored full-match pattern.
pub fn compile_pattern(raw: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{raw})$"))
        .map_err(|e| MeterError::InvalidConfig(format!("invalid pattern {raw:?}: {e}")))
}

pub fn compile_rewrite_rules(raw: &[String]) -> Result<Vec<RewriteRule>> {
    let mut out = Vec::with_capacity(raw.len());
    for s in raw {
        // format: "regex=replacement"; the regex itself may contain '='
        let (pat, replacement) = s.rsplit_once('=').ok_or_else(|| {
            MeterError::InvalidConfig(format!("invalid match pattern: {s} (expected REGEX=REPLACEMENT)"))
        })?;
        if pat.is_empty() {
            return Err(MeterError::InvalidConfig(format!("empty regex in match pattern: {s}")));
        }
        out.push(RewriteRule {
            pattern: compile_pattern(pat)?,
            replacement: replacement.to_string(),
        });
    }
    Ok(out)
}

pub fn compile_patterns(raw: &[String]) -> Result<Vec<Regex>> {
    raw.iter().map(|s| compile_pattern(s)).collect()
}

/// Ordered filter sequence. Built at configuration time, immutable after.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<MeterFilter>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, f: MeterFilter) {
        self.filters.push(f);
    }

    pub fn with(mut self, f: MeterFilter) -> Self {
        self.push(f);
        self
    }

    pub fn extend(&mut self, other: FilterChain) {
        self.filters.extend(other.filters);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run every filter in order; stops at the first `Drop`.
    pub fn apply(&self, id: MeterId) -> Option<MeterId> {
        let mut cur = id;
        for f in &self.filters {
            match f.apply(cur) {
                FilterReply::Keep(next) => cur = next,
                FilterReply::Drop => {
                    tracing::debug!(filter = %f.label(), "meter dropped by filter");
                    return None;
                }
            }
        }
        Some(cur)
    }
}
