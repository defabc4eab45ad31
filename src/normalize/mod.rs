//! Diff normalization — canonical token streams for fingerprinting
//!
//! Turns raw changed-line text into an ordered token sequence that is
//! stable across the edits a fork makes while rebranding upstream code:
//! comments are stripped per source grammar, brand terms and identifier
//! prefixes are rewritten to the target's form, string and numeric
//! literals collapse to placeholders, and whitespace carries no signal.
//!
//! Languages without a known grammar are not an error: they fall back to
//! whitespace-only tokenization and the result is flagged as degraded so
//! downstream scoring knows it is working at reduced precision.

pub mod identifier;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::ProvenaConfig;
use crate::diff::DiffUnit;

/// Source grammars the comment stripper understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    /// C / C++ — `//` line and `/* */` block comments
    C,
    /// Python — `#` line comments, docstring lines
    Python,
    /// Tcl — `#` line comments
    Tcl,
}

impl Language {
    /// Infer the grammar from a file path, `None` when unknown.
    pub fn from_path(path: &str) -> Option<Language> {
        let ext = path.rsplit('.').next()?;
        match ext {
            "c" | "h" | "cc" | "cpp" | "cxx" | "hpp" | "hh" => Some(Language::C),
            "py" => Some(Language::Python),
            "tcl" => Some(Language::Tcl),
            _ => None,
        }
    }
}

/// A normalized lexical unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    /// True when the token sits in the preserved-keyword set and was kept
    /// verbatim, bypassing all substitution rules
    pub preserved: bool,
}

/// Ordered token sequence derived from one or more diff units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedDiff {
    pub tokens: Vec<Token>,
    /// Set when the language had no known grammar and only whitespace
    /// normalization was applied
    pub degraded: bool,
}

impl NormalizedDiff {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.tokens.iter().map(|t| t.text.as_str()).collect()
    }

    pub fn extend(&mut self, other: NormalizedDiff) {
        self.tokens.extend(other.tokens);
        self.degraded |= other.degraded;
    }
}

/// Host-language keywords always kept verbatim (C, Python, Tcl). A brand
/// term colliding with one of these must not be rewritten.
static HOST_KEYWORDS: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    [
        // C / C++
        "int", "char", "void", "long", "short", "double", "float", "unsigned", "signed",
        "const", "static", "volatile", "struct", "union", "enum", "typedef", "if", "else",
        "for", "while", "do", "switch", "case", "default", "break", "continue", "return",
        "goto", "sizeof", "NULL", "true", "false",
        // Python
        "def", "class", "import", "from", "try", "except", "raise", "finally", "with",
        "as", "pass", "lambda", "yield", "await", "async", "None", "True", "False", "is",
        "in", "not", "and", "or",
        // Tcl
        "proc", "set", "elseif", "foreach", "expr", "catch", "puts", "after", "upvar",
        "global", "variable", "namespace", "package", "source", "test", "r", "assert",
        "assert_equal", "assert_error", "assert_match",
    ]
    .into_iter()
    .collect()
});

// Quotes are excluded from the punctuation run so a literal adjacent to
// punctuation ("foo(\"bar\")") still tokenizes as a string.
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|[A-Za-z_][A-Za-z0-9_]*|\d+[uUlLfF]*|[^\w\s"']+"#,
    )
    .expect("token regex")
});

/// Normalize raw changed-line text into a token stream.
pub fn normalize_text(
    raw: &str,
    language: Option<Language>,
    config: &ProvenaConfig,
) -> NormalizedDiff {
    let Some(lang) = language else {
        let tokens = raw
            .split_whitespace()
            .map(|t| Token {
                text: t.to_string(),
                preserved: false,
            })
            .collect();
        return NormalizedDiff {
            tokens,
            degraded: true,
        };
    };

    let mut tokens = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Block-comment continuation and docstring lines carry no code.
        if lang == Language::C && line.starts_with('*') {
            continue;
        }
        if lang == Language::Python && (line.starts_with("\"\"\"") || line.starts_with("'''")) {
            continue;
        }

        let stripped = strip_comments(line, lang);
        let stripped = stripped.trim();
        if stripped.is_empty() {
            continue;
        }

        for found in TOKEN_RE.find_iter(stripped) {
            let tok = found.as_str();
            let first = tok.chars().next().unwrap_or('\0');
            if first == '"' || first == '\'' {
                tokens.push(Token {
                    text: "STR".to_string(),
                    preserved: false,
                });
            } else if first.is_ascii_digit() {
                tokens.push(Token {
                    text: "NUM".to_string(),
                    preserved: false,
                });
            } else if first.is_ascii_alphabetic() || first == '_' {
                if HOST_KEYWORDS.contains(tok) || config.preserved_keywords.contains(tok) {
                    tokens.push(Token {
                        text: tok.to_string(),
                        preserved: true,
                    });
                } else {
                    tokens.push(Token {
                        text: identifier::rewrite(tok, config),
                        preserved: false,
                    });
                }
            } else {
                tokens.push(Token {
                    text: tok.to_string(),
                    preserved: false,
                });
            }
        }
    }

    NormalizedDiff {
        tokens,
        degraded: false,
    }
}

/// Normalize one diff unit, inferring the grammar from its path.
pub fn normalize_unit(unit: &DiffUnit, config: &ProvenaConfig) -> NormalizedDiff {
    let text: Vec<&str> = unit
        .added
        .iter()
        .chain(unit.removed.iter())
        .map(|s| s.as_str())
        .collect();
    normalize_text(&text.join("\n"), Language::from_path(&unit.path), config)
}

/// Normalize a whole unit set into one concatenated stream.
///
/// Units that normalize to nothing (formatting or comment-only changes)
/// contribute no tokens at all, so they cannot distort similarity scores.
pub fn normalize_units(units: &[DiffUnit], config: &ProvenaConfig) -> NormalizedDiff {
    let mut combined = NormalizedDiff::default();
    for unit in units {
        let normalized = normalize_unit(unit, config);
        if !normalized.is_empty() {
            combined.extend(normalized);
        } else {
            combined.degraded |= normalized.degraded;
        }
    }
    combined
}

/// Strip comments for one line, tracking string state so comment markers
/// inside literals never remove content.
fn strip_comments(line: &str, lang: Language) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    let mut in_string: Option<char> = None;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if let Some(quote) = in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                in_string = Some(c);
                out.push(c);
            }
            '/' if lang == Language::C => match chars.peek() {
                Some('/') => break,
                Some('*') => {
                    chars.next();
                    let mut prev = '\0';
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        if prev == '*' && inner == '/' {
                            closed = true;
                            break;
                        }
                        prev = inner;
                    }
                    if !closed {
                        break;
                    }
                }
                _ => out.push(c),
            },
            '#' if matches!(lang, Language::Python | Language::Tcl) => break,
            _ => out.push(c),
        }
    }
    out
}
