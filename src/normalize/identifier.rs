//! Identifier rewriting — brand and prefix substitution
//!
//! Substitution canonicalizes on the *target* form: upstream-branded
//! identifiers are rewritten to the fork's spelling, so an unmodified
//! fork identifier and its rebranded upstream twin normalize to the same
//! token. Matching is case-sensitive; configurations carry explicit
//! case variants. Declaration order breaks ties between rules.

use crate::config::ProvenaConfig;

/// Rewrite one identifier through the configured rules.
///
/// The caller has already excluded preserved keywords; this function
/// applies the first matching prefix rule, then every branding rule in
/// declaration order.
pub fn rewrite(ident: &str, config: &ProvenaConfig) -> String {
    let mut out = ident.to_string();

    for rule in &config.prefix_rules {
        if let Some(rest) = out.strip_prefix(&rule.source_term) {
            out = format!("{}{}", rule.target_term, rest);
            break;
        }
        if out.starts_with(&rule.target_term) {
            // Already in target form; later prefix rules must not stack.
            break;
        }
    }

    for rule in &config.branding_rules {
        if out.contains(&rule.source_term) {
            out = out.replace(&rule.source_term, &rule.target_term);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrandingRule, PrefixRule, ProvenaConfig};

    fn fork_config() -> ProvenaConfig {
        ProvenaConfig::for_fork("redis/redis", ("Redis", "Valkey"), Some(("RM_", "VM_")))
    }

    #[test]
    fn prefix_rewrites_to_target() {
        let config = fork_config();
        assert_eq!(rewrite("RM_Call", &config), "VM_Call");
        assert_eq!(rewrite("VM_Call", &config), "VM_Call");
    }

    #[test]
    fn brand_term_rewrites_anywhere_in_identifier() {
        let config = fork_config();
        assert_eq!(rewrite("RedisModuleCtx", &config), "ValkeyModuleCtx");
        assert_eq!(rewrite("createRedisContext", &config), "createValkeyContext");
        assert_eq!(rewrite("redis_connection", &config), "valkey_connection");
    }

    #[test]
    fn substitution_is_case_sensitive() {
        let config = ProvenaConfig {
            branding_rules: vec![BrandingRule {
                source_term: "Redis".into(),
                target_term: "Valkey".into(),
            }],
            ..Default::default()
        };
        // No lowercase rule declared, so the lowercase form is untouched.
        assert_eq!(rewrite("redisLog", &config), "redisLog");
        assert_eq!(rewrite("RedisLog", &config), "ValkeyLog");
    }

    #[test]
    fn declaration_order_breaks_prefix_ties() {
        let config = ProvenaConfig {
            prefix_rules: vec![
                PrefixRule {
                    source_term: "REDISMODULE_".into(),
                    target_term: "VALKEYMODULE_".into(),
                },
                PrefixRule {
                    source_term: "REDIS".into(),
                    target_term: "VALKEY".into(),
                },
            ],
            ..Default::default()
        };
        // The longer rule is declared first and wins; the second never runs.
        assert_eq!(rewrite("REDISMODULE_OK", &config), "VALKEYMODULE_OK");
    }

    #[test]
    fn multiple_brand_pairs_converge() {
        let config = ProvenaConfig {
            branding_rules: vec![
                BrandingRule {
                    source_term: "Redis".into(),
                    target_term: "Valkey".into(),
                },
                BrandingRule {
                    source_term: "KeyDB".into(),
                    target_term: "Valkey".into(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(rewrite("RedisLog", &config), "ValkeyLog");
        assert_eq!(rewrite("KeyDBLog", &config), "ValkeyLog");
        assert_eq!(rewrite("ValkeyLog", &config), "ValkeyLog");
    }

    #[test]
    fn unrelated_identifier_passes_through() {
        let config = fork_config();
        assert_eq!(rewrite("clientBuffer", &config), "clientBuffer");
    }
}
