//! Instrument identity: name + tag set.
//!
//! Tags are kept sorted by key with unique keys, so derived `Eq`/`Hash`/`Ord`
//! give order-independent identity and deterministic rendering order.

use std::fmt;

/// Instrument variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MeterKind {
    Counter,
    Gauge,
    Timer,
    Summary,
}

impl MeterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MeterKind::Counter => "counter",
            MeterKind::Gauge => "gauge",
            MeterKind::Timer => "timer",
            MeterKind::Summary => "summary",
        }
    }
}

impl fmt::Display for MeterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single key/value tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Immutable instrument identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeterId {
    name: String,
    tags: Vec<Tag>,
}

impl MeterId {
    /// Build an id. Duplicate keys collapse to the last value given.
    pub fn new<I, K, V>(name: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let tags = tags.into_iter().map(|(k, v)| Tag::new(k, v)).collect();
        Self::from_tags(name, tags)
    }

    pub fn from_tags(name: impl Into<String>, tags: Vec<Tag>) -> Self {
        Self {
            name: name.into(),
            tags: normalize(tags),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags in key order.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .binary_search_by(|t| t.key.as_str().cmp(key))
            .ok()
            .map(|i| self.tags[i].value.as_str())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Insert or overwrite a tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let tag = Tag::new(key, value);
        match self.tags.binary_search_by(|t| t.key.cmp(&tag.key)) {
            Ok(i) => self.tags[i] = tag,
            Err(i) => self.tags.insert(i, tag),
        }
        self
    }

    pub fn without_tag(mut self, key: &str) -> Self {
        self.tags.retain(|t| t.key != key);
        self
    }

    /// Add tags that are missing; existing keys keep their value.
    pub fn with_default_tags(mut self, defaults: &[Tag]) -> Self {
        for d in defaults {
            if let Err(i) = self.tags.binary_search_by(|t| t.key.cmp(&d.key)) {
                self.tags.insert(i, d.clone());
            }
        }
        self
    }
}

impl fmt::Display for MeterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.tags.is_empty() {
            return Ok(());
        }
        f.write_str("{")?;
        for (i, t) in self.tags.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", t.key, t.value)?;
        }
        f.write_str("}")
    }
}

fn normalize(mut tags: Vec<Tag>) -> Vec<Tag> {
    // stable sort keeps insertion order among equal keys; keep the last one
    tags.sort_by(|a, b| a.key.cmp(&b.key));
    let mut out: Vec<Tag> = Vec::with_capacity(tags.len());
    for t in tags {
        match out.last_mut() {
            Some(last) if last.key == t.key => *last = t,
            _ => out.push(t),
        }
    }
    out
}
