//! Engine configuration — branding rules, thresholds, resource bounds
//!
//! The configuration is an explicit immutable value threaded through every
//! call. Nothing in the engine reads ambient process state, so concurrent
//! validations (and tests with per-call overrides) stay independent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{ProvenaError, ProvenaResult};

/// Rewrites occurrences of an upstream brand term to the target's term
/// inside identifiers (e.g. `Redis` → `Valkey`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandingRule {
    pub source_term: String,
    pub target_term: String,
}

/// Rewrites a leading identifier prefix (e.g. `RM_` → `VM_`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixRule {
    pub source_term: String,
    pub target_term: String,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenaConfig {
    /// Upstream source repository, `owner/repo`
    pub source_repo: String,
    /// Brand-term substitutions, applied in declaration order
    pub branding_rules: Vec<BrandingRule>,
    /// Identifier-prefix substitutions, applied in declaration order
    pub prefix_rules: Vec<PrefixRule>,
    /// Tokens exempt from all substitution rules (host-language keywords
    /// are always exempt; this set adds project-specific terms)
    pub preserved_keywords: BTreeSet<String>,
    /// Path fragments identifying infrastructure files excluded from
    /// candidate generation (CI config, vendored deps, docs)
    pub infrastructure_patterns: Vec<String>,
    /// Token-shingle width for simhash and deep comparison
    pub shingle_width: usize,
    /// Maximum Hamming distance (of 64 bits) for a fuzzy candidate
    pub max_distance: u32,
    /// Layer 2 acceptance threshold for jaccard / subset coverage
    pub jaccard_threshold: f64,
    /// Upper bound on candidates forwarded to Layer 2
    pub max_candidates: usize,
    /// Concurrent Layer 2 fetches
    pub validation_concurrency: usize,
    /// Fetch attempts per candidate before it is marked incomplete
    pub retry_attempts: u32,
    /// Overall Layer 2 deadline; expiry yields partial evidence
    pub deadline_ms: Option<u64>,
    /// Minimum normalized tokens for a diff to be worth checking
    pub min_tokens: usize,
    /// Minimum changed lines for a diff to be worth checking
    pub min_lines: usize,
    /// Minimum net new lines before a diff counts as real content
    pub min_net_new_lines: i64,
    /// Fraction of added lines that are relocated removals before the
    /// diff is treated as trivial code movement
    pub movement_threshold: f64,
}

impl Default for ProvenaConfig {
    fn default() -> Self {
        Self {
            source_repo: String::new(),
            branding_rules: Vec::new(),
            prefix_rules: Vec::new(),
            preserved_keywords: BTreeSet::new(),
            infrastructure_patterns: Vec::new(),
            shingle_width: 3,
            max_distance: 3,
            jaccard_threshold: 0.85,
            max_candidates: 10,
            validation_concurrency: 4,
            retry_attempts: 3,
            deadline_ms: None,
            min_tokens: 5,
            min_lines: 5,
            min_net_new_lines: 5,
            movement_threshold: 0.70,
        }
    }
}

impl ProvenaConfig {
    /// Reject malformed configuration before any fingerprinting begins.
    pub fn validate(&self) -> ProvenaResult<()> {
        for rule in &self.branding_rules {
            if rule.source_term.is_empty() || rule.target_term.is_empty() {
                return Err(ProvenaError::InvalidConfig(
                    "branding rule with empty source or target term".into(),
                ));
            }
        }
        for rule in &self.prefix_rules {
            if rule.source_term.is_empty() || rule.target_term.is_empty() {
                return Err(ProvenaError::InvalidConfig(
                    "prefix rule with empty source or target term".into(),
                ));
            }
        }
        if self.shingle_width == 0 {
            return Err(ProvenaError::InvalidConfig("shingle width must be > 0".into()));
        }
        if self.max_distance > 64 {
            return Err(ProvenaError::InvalidConfig(
                "max distance exceeds 64 bits".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jaccard_threshold) {
            return Err(ProvenaError::InvalidConfig(
                "jaccard threshold outside [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.movement_threshold) {
            return Err(ProvenaError::InvalidConfig(
                "movement threshold outside [0, 1]".into(),
            ));
        }
        if self.validation_concurrency == 0 {
            return Err(ProvenaError::InvalidConfig(
                "validation concurrency must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Convenience constructor for the common single-pair fork setup.
    pub fn for_fork(
        source_repo: &str,
        branding: (&str, &str),
        prefix: Option<(&str, &str)>,
    ) -> Self {
        let mut config = Self {
            source_repo: source_repo.to_string(),
            ..Self::default()
        };
        let (src, tgt) = branding;
        config.branding_rules.push(BrandingRule {
            source_term: src.to_string(),
            target_term: tgt.to_string(),
        });
        // Case variants ride along; substitution is case-sensitive.
        if src.to_lowercase() != src {
            config.branding_rules.push(BrandingRule {
                source_term: src.to_lowercase(),
                target_term: tgt.to_lowercase(),
            });
        }
        if src.to_uppercase() != src {
            config.branding_rules.push(BrandingRule {
                source_term: src.to_uppercase(),
                target_term: tgt.to_uppercase(),
            });
        }
        if let Some((src, tgt)) = prefix {
            config.prefix_rules.push(PrefixRule {
                source_term: src.to_string(),
                target_term: tgt.to_string(),
            });
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ProvenaConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_branding_term_is_rejected() {
        let mut config = ProvenaConfig::default();
        config.branding_rules.push(BrandingRule {
            source_term: String::new(),
            target_term: "Valkey".into(),
        });
        assert!(matches!(
            config.validate(),
            Err(crate::ProvenaError::InvalidConfig(_))
        ));
    }

    #[test]
    fn empty_prefix_target_is_rejected() {
        let mut config = ProvenaConfig::default();
        config.prefix_rules.push(PrefixRule {
            source_term: "RM_".into(),
            target_term: String::new(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = ProvenaConfig {
            validation_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn fork_constructor_adds_case_variants() {
        let config = ProvenaConfig::for_fork("redis/redis", ("Redis", "Valkey"), Some(("RM_", "VM_")));
        assert_eq!(config.branding_rules.len(), 3);
        assert_eq!(config.branding_rules[1].source_term, "redis");
        assert_eq!(config.branding_rules[2].source_term, "REDIS");
        assert_eq!(config.prefix_rules.len(), 1);
        assert!(config.validate().is_ok());
    }
}
