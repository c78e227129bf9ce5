//! Security rules

use crate::models::{Category, RuleScope, Severity};
use crate::rules::{FileContext, Rule, RuleMeta};
use anyhow::Result;

/// Identifier fragments that name a credential
const SECRET_NAMES: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "apikey",
    "token",
    "privatekey",
    "accesskey",
    "credential",
];

/// Minimum length for a literal to be treated as a real credential
const MIN_SECRET_LEN: usize = 8;

/// Flags string literals assigned to credential-like names
pub struct NoHardcodedSecrets {
    meta: RuleMeta,
}

impl NoHardcodedSecrets {
    pub fn new() -> Self {
        Self {
            meta: RuleMeta::new(
                "security/no-hardcoded-secrets",
                Category::Security,
                Severity::Error,
                RuleScope::File,
                "credential stored as a string literal",
                "Load secrets from the environment or a secret store (e.g. ConfigService)",
            ),
        }
    }
}

impl Default for NoHardcodedSecrets {
    fn default() -> Self {
        Self::new()
    }
}

fn is_secret_name(name: &str) -> bool {
    let normalized: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    SECRET_NAMES.iter().any(|s| normalized.contains(s))
}

fn looks_like_secret(value: &str) -> bool {
    value.len() >= MIN_SECRET_LEN
        && !value.chars().any(char::is_whitespace)
        && !value.contains("${")
        && !value.contains("{{")
        && !value.starts_with("process.env")
}

impl Rule for NoHardcodedSecrets {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn check_file(&self, ctx: &FileContext<'_>) -> Result<()> {
        for literal in &ctx.facts().literal_assignments {
            if is_secret_name(&literal.name) && looks_like_secret(&literal.value) {
                ctx.report(
                    literal.line,
                    literal.column,
                    format!("Hardcoded secret assigned to '{}'", literal.name),
                );
            }
        }
        Ok(())
    }
}
