//! Unified-diff decomposition and triage statistics
//!
//! Splits a raw patch into per-file [`DiffUnit`]s, strips commit metadata,
//! and provides the cheap structural signals the engine uses before any
//! fingerprinting: changed-line counts, code-movement statistics, and
//! removal of pure rebranding hunks.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::ProvenaConfig;

/// One file's changed content within a patch, pre-normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffUnit {
    pub path: String,
    /// Added-line text, without the leading `+`
    pub added: Vec<String>,
    /// Removed-line text, without the leading `-`
    pub removed: Vec<String>,
}

impl DiffUnit {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// Total changed lines in this unit.
    pub fn changed_lines(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

static FILE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" b/(.*)$").expect("file header regex"));

/// Email-format patch metadata that must never reach fingerprinting.
const METADATA_PREFIXES: &[&str] = &[
    "From ",
    "From: ",
    "Date: ",
    "Subject: ",
    "Signed-off-by: ",
    "Co-authored-by: ",
];

/// Split a unified diff into per-file units.
///
/// Hunk headers, index lines, and commit metadata are discarded; only the
/// `+`/`-` content lines survive. Files with no changed lines produce no
/// unit.
pub fn split_unified_diff(diff_text: &str) -> Vec<DiffUnit> {
    let mut units: Vec<DiffUnit> = Vec::new();
    let mut current: Option<DiffUnit> = None;

    for line in diff_text.lines() {
        if line.starts_with("diff --git") {
            if let Some(unit) = current.take() {
                if unit.changed_lines() > 0 {
                    units.push(unit);
                }
            }
            let path = FILE_HEADER
                .captures(line)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            current = Some(DiffUnit::new(path));
            continue;
        }

        let Some(unit) = current.as_mut() else { continue };

        if METADATA_PREFIXES.iter().any(|p| line.starts_with(p)) {
            continue;
        }
        if line.starts_with("+++") || line.starts_with("---") {
            continue;
        }
        if let Some(rest) = line.strip_prefix('+') {
            unit.added.push(rest.to_string());
        } else if let Some(rest) = line.strip_prefix('-') {
            unit.removed.push(rest.to_string());
        }
    }

    if let Some(unit) = current.take() {
        if unit.changed_lines() > 0 {
            units.push(unit);
        }
    }
    units
}

/// Total changed lines across a unit set.
pub fn changed_line_count(units: &[DiffUnit]) -> usize {
    units.iter().map(|u| u.changed_lines()).sum()
}

/// Structural signals for code-movement triage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementStats {
    /// Added minus removed substantive lines
    pub net_new_lines: i64,
    /// Fraction of added lines that exactly match a removed line
    pub movement_ratio: f64,
}

/// Compute code-movement statistics over a unit set.
///
/// Comment-leading and blank lines are ignored on both sides so that a
/// relocated block keeps its movement signature even when its surrounding
/// comments change.
pub fn movement_stats(units: &[DiffUnit]) -> MovementStats {
    fn substantive(line: &str) -> bool {
        !line.is_empty() && !line.starts_with("//") && !line.starts_with("/*") && !line.starts_with('#')
    }
    fn collect<'a>(lines: impl Iterator<Item = &'a String>) -> Vec<&'a str> {
        lines
            .map(|l| l.trim())
            .filter(|l| substantive(l))
            .collect()
    }

    let added = collect(units.iter().flat_map(|u| u.added.iter()));
    let removed = collect(units.iter().flat_map(|u| u.removed.iter()));

    let removed_set: HashSet<&str> = removed.iter().copied().collect();
    let unique_added: HashSet<&str> = added.iter().copied().collect();
    let relocated = unique_added.intersection(&removed_set).count();

    MovementStats {
        net_new_lines: added.len() as i64 - removed.len() as i64,
        movement_ratio: if added.is_empty() {
            0.0
        } else {
            relocated as f64 / added.len() as f64
        },
    }
}

/// Remove paired `-`/`+` runs that differ only by brand terms.
///
/// A fork renaming `RedisModuleCtx` to `ValkeyModuleCtx` produces thousands
/// of such hunks; none of them carry provenance signal, and left in place
/// they drown the fingerprints of real changes. Operates on the raw diff
/// text because the pairing depends on hunk line order.
pub fn filter_rebranding(diff_text: &str, config: &ProvenaConfig) -> String {
    if diff_text.is_empty() {
        return String::new();
    }
    let canon = BrandCanonicalizer::new(config);
    let lines: Vec<&str> = diff_text.split('\n').collect();
    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());
    let mut idx = 0;

    while idx < lines.len() {
        let line = lines[idx];
        if line.starts_with('-') && !line.starts_with("---") {
            let mut j = idx;
            let mut minus: Vec<&str> = Vec::new();
            while j < lines.len() && lines[j].starts_with('-') && !lines[j].starts_with("---") {
                minus.push(lines[j]);
                j += 1;
            }
            let mut plus: Vec<&str> = Vec::new();
            while j < lines.len() && lines[j].starts_with('+') && !lines[j].starts_with("+++") {
                plus.push(lines[j]);
                j += 1;
            }
            if !minus.is_empty() && minus.len() == plus.len() {
                let all_rebranding = minus
                    .iter()
                    .zip(plus.iter())
                    .all(|(m, p)| canon.canonical(&m[1..]) == canon.canonical(&p[1..]));
                if all_rebranding {
                    idx = j;
                    continue;
                }
            }
        }
        kept.push(line);
        idx += 1;
    }
    kept.join("\n")
}

/// Erases every configured brand and prefix term so two lines can be
/// compared for branding-only differences.
struct BrandCanonicalizer {
    patterns: Vec<(Regex, &'static str)>,
}

impl BrandCanonicalizer {
    fn new(config: &ProvenaConfig) -> Self {
        let mut patterns = Vec::new();
        for rule in &config.branding_rules {
            for term in [&rule.source_term, &rule.target_term] {
                if let Ok(re) = Regex::new(&format!(r"\b{}", regex::escape(term))) {
                    patterns.push((re, "BRAND"));
                }
            }
        }
        for rule in &config.prefix_rules {
            for term in [&rule.source_term, &rule.target_term] {
                if let Ok(re) = Regex::new(&format!(r"\b{}", regex::escape(term))) {
                    patterns.push((re, "BRAND_"));
                }
            }
        }
        Self { patterns }
    }

    fn canonical(&self, line: &str) -> String {
        let mut out = line.to_string();
        for (re, repl) in &self.patterns {
            out = re.replace_all(&out, *repl).into_owned();
        }
        out
    }
}
