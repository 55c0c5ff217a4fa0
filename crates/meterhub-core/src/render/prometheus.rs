//! Prometheus text exposition format.
//!
//! Layout per family:
//! ```text
//! # HELP <family> <description>
//! # TYPE <family> counter|gauge|summary
//! <family>{k="v",...} <value>
//! ```
//! Counters get a `_total` suffix, timers a `_seconds` suffix (values in
//! seconds). Timers and summaries are rendered as a `summary` family plus a
//! separate `<family>_max` gauge family holding the windowed max. Families are
//! emitted in name order, each with exactly one HELP/TYPE header.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use crate::error::{MeterError, Result};
use crate::id::{MeterId, MeterKind};
use crate::instrument::DistributionSample;
use crate::snapshot::{MeterSample, Sample, Snapshot};

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Map to `[a-zA-Z0-9_:]`, prefixing names that start with a digit.
pub fn sanitize_name(raw: &str) -> Option<String> {
    sanitize(raw, true)
}

fn sanitize_label(raw: &str) -> Option<String> {
    sanitize(raw, false)
}

fn sanitize(raw: &str, allow_colon: bool) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let mut out = String::with_capacity(raw.len() + 2);
    if raw.starts_with(|c: char| c.is_ascii_digit()) {
        out.push_str("m_");
    }
    for c in raw.chars() {
        let ok = c.is_ascii_alphanumeric() || c == '_' || (allow_colon && c == ':');
        out.push(if ok { c } else { '_' });
    }
    Some(out)
}

fn fmt_f64(v: f64) -> String {
    if v.is_nan() {
        "NaN".into()
    } else if v == f64::INFINITY {
        "+Inf".into()
    } else if v == f64::NEG_INFINITY {
        "-Inf".into()
    } else {
        format!("{v}")
    }
}

fn family_name(id: &MeterId, kind: MeterKind) -> Result<String> {
    let base = sanitize_name(id.name()).ok_or_else(|| MeterError::render(id, "empty metric name"))?;
    let name = match kind {
        MeterKind::Counter if !base.ends_with("_total") => format!("{base}_total"),
        MeterKind::Timer if !base.ends_with("_seconds") => format!("{base}_seconds"),
        _ => base,
    };
    Ok(name)
}

/// `{k="v",...}` including an optional trailing label; empty string if no labels.
fn labels(id: &MeterId, extra: Option<(&str, &str)>) -> Result<String> {
    let mut parts = Vec::with_capacity(id.tags().len() + 1);
    for t in id.tags() {
        let key = sanitize_label(&t.key).ok_or_else(|| MeterError::render(id, "empty tag key"))?;
        parts.push(format!("{}=\"{}\"", key, escape_label(&t.value)));
    }
    if let Some((k, v)) = extra {
        parts.push(format!("{}=\"{}\"", k, escape_label(v)));
    }
    if parts.is_empty() {
        return Ok(String::new());
    }
    Ok(format!("{{{}}}", parts.join(",")))
}

fn write_header(out: &mut String, family: &str, kind: &str, help: Option<&str>) {
    match help {
        Some(h) if !h.is_empty() => {
            let _ = writeln!(out, "# HELP {} {}", family, escape_help(h));
        }
        _ => {
            let _ = writeln!(out, "# HELP {}", family);
        }
    }
    let _ = writeln!(out, "# TYPE {} {}", family, kind);
}

fn render_distribution(out: &mut String, family: &str, id: &MeterId, d: &DistributionSample) -> Result<()> {
    for (p, v) in &d.percentiles {
        let q = format!("{}", p);
        let _ = writeln!(out, "{}{} {}", family, labels(id, Some(("quantile", &q)))?, fmt_f64(*v));
    }
    let l = labels(id, None)?;
    let _ = writeln!(out, "{}_count{} {}", family, l, d.count);
    let _ = writeln!(out, "{}_sum{} {}", family, l, fmt_f64(d.total));
    Ok(())
}

fn render_sample(out: &mut String, family: &str, s: &MeterSample) -> Result<()> {
    match &s.sample {
        Sample::Counter(v) => {
            let _ = writeln!(out, "{}{} {}", family, labels(&s.id, None)?, v);
        }
        Sample::Gauge(v) => {
            let _ = writeln!(out, "{}{} {}", family, labels(&s.id, None)?, fmt_f64(*v));
        }
        Sample::Timer(d) | Sample::Summary(d) => render_distribution(out, family, &s.id, d)?,
    }
    Ok(())
}

fn render_max(out: &mut String, family: &str, s: &MeterSample) -> Result<()> {
    if let Sample::Timer(d) | Sample::Summary(d) = &s.sample {
        let _ = writeln!(out, "{}_max{} {}", family, labels(&s.id, None)?, fmt_f64(d.max));
    }
    Ok(())
}

/// Exposition type of a rendered family. `WindowMax` is the gauge family
/// derived from a timer or summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FamilyType {
    Counter,
    Gauge,
    Summary,
    WindowMax,
}

impl FamilyType {
    fn of(kind: MeterKind) -> Self {
        match kind {
            MeterKind::Counter => FamilyType::Counter,
            MeterKind::Gauge => FamilyType::Gauge,
            MeterKind::Timer | MeterKind::Summary => FamilyType::Summary,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            FamilyType::Counter => "counter",
            FamilyType::Gauge | FamilyType::WindowMax => "gauge",
            FamilyType::Summary => "summary",
        }
    }
}

struct Family<'a> {
    ty: FamilyType,
    help: Option<&'a str>,
    samples: Vec<&'a MeterSample>,
}

/// Samples grouped by rendered family name. Distinct meter names may collapse
/// to one family after sanitizing and suffixing; same-type collisions share
/// one header, and a sample whose family is already taken by another type is
/// skipped.
fn group_families(snapshot: &Snapshot) -> BTreeMap<String, Family<'_>> {
    let mut families: BTreeMap<String, Family<'_>> = BTreeMap::new();

    for s in snapshot.iter() {
        let kind = s.sample.kind();
        let family = match family_name(&s.id, kind) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(meter = %s.id, error = %e, "instrument skipped");
                continue;
            }
        };
        let ty = FamilyType::of(kind);

        let mut wanted = vec![(family.clone(), ty)];
        if ty == FamilyType::Summary {
            wanted.push((format!("{family}_max"), FamilyType::WindowMax));
        }

        if let Some((name, taken)) = wanted.iter().find_map(|(name, ty)| {
            families
                .get(name)
                .filter(|f| f.ty != *ty)
                .map(|f| (name, f.ty))
        }) {
            let err = MeterError::render(
                &s.id,
                format!("family {name} already rendered as {}", taken.as_str()),
            );
            tracing::warn!(meter = %s.id, code = err.code().as_str(), error = %err, "instrument skipped");
            continue;
        }

        for (name, ty) in wanted {
            let f = families.entry(name).or_insert_with(|| Family {
                ty,
                help: None,
                samples: Vec::new(),
            });
            if f.help.is_none() {
                f.help = s.description.as_deref();
            }
            f.samples.push(s);
        }
    }
    families
}

/// Render a snapshot. Never fails as a whole.
pub fn render(snapshot: &Snapshot) -> String {
    let mut out = String::with_capacity(snapshot.len() * 96);
    let mut line = String::with_capacity(256);
    let mut body = String::new();

    for (name, family) in group_families(snapshot) {
        // a WindowMax family is rendered under its parent's name
        let base = match family.ty {
            FamilyType::WindowMax => name.strip_suffix("_max").unwrap_or(&name),
            _ => name.as_str(),
        };

        body.clear();
        let mut series = BTreeSet::new();
        for s in &family.samples {
            // two meter names collapsing to one family may also collapse to one series
            if let Ok(l) = labels(&s.id, None) {
                if !series.insert(l) {
                    let err = MeterError::render(&s.id, format!("duplicate series in family {name}"));
                    tracing::warn!(meter = %s.id, code = err.code().as_str(), error = %err, "instrument skipped");
                    continue;
                }
            }
            line.clear();
            let res = match family.ty {
                FamilyType::WindowMax => render_max(&mut line, base, s),
                _ => render_sample(&mut line, base, s),
            };
            match res {
                Ok(()) => body.push_str(&line),
                Err(e) => tracing::warn!(meter = %s.id, error = %e, "instrument skipped"),
            }
        }
        if body.is_empty() {
            continue;
        }
        write_header(&mut out, &name, family.ty.as_str(), family.help);
        out.push_str(&body);
    }
    out
}
