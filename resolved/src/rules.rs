//! Rule store (spec §4.1): a flat list of domain-suffix rules loaded from a
//! text file, one rule per line, format `DOMAIN-SUFFIX,<suffix>`. Grounded
//! directly on `dnsmasq.LoadDomainRules`/`MatchesRules` in
//! `examples/original_source/dnsmasq/resolver.go` — the suffix check there
//! is a raw `strings.HasSuffix`, not label-aligned, and this workspace
//! preserves that verbatim (spec §4.1, boundary scenario 6).

use std::fmt;
use std::sync::{Arc, RwLock};

use tokio::fs::read_to_string;

const DOMAIN_SUFFIX_PREFIX: &str = "DOMAIN-SUFFIX,";

/// A single domain-suffix rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub suffix: String,
}

/// An immutable set of rules, loaded once and replaced wholesale on reload.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// True iff `domain` has any rule's suffix as a literal byte-suffix,
    /// case-insensitively, with no label-boundary check (spec §4.1: a rule
    /// `example.com` also matches `evil-example.com`).
    pub fn matches(&self, domain: &str) -> bool {
        let domain = domain.to_ascii_lowercase();
        self.rules
            .iter()
            .any(|rule| domain.ends_with(&rule.suffix))
    }
}

/// Parse rule text in the `DOMAIN-SUFFIX,<suffix>` format (spec §4.1).
/// Comment lines (`#`), blank lines, and unrecognised prefixes are skipped
/// silently (forward-compat with richer rule grammars this system does not
/// implement).
pub fn parse(text: &str) -> Vec<Rule> {
    let mut rules = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(suffix) = line.strip_prefix(DOMAIN_SUFFIX_PREFIX) {
            rules.push(Rule {
                suffix: suffix.trim().to_ascii_lowercase(),
            });
        }
    }
    rules
}

pub async fn load(path: &str) -> Result<RuleSet, Error> {
    let text = read_to_string(path)
        .await
        .map_err(|source| Error::Read {
            path: path.to_string(),
            source,
        })?;
    Ok(RuleSet::new(parse(&text)))
}

/// A hot-swappable handle to the current [`RuleSet`] (spec §4.9: a
/// subscription refresh replaces the merged rule file wholesale, and the
/// listener's in-flight queries should see the new set without a restart).
/// Mirrors `dns_resolver::SharedCache`'s lock-around-a-clonable-value shape.
#[derive(Clone)]
pub struct SharedRuleSet(Arc<RwLock<Arc<RuleSet>>>);

impl SharedRuleSet {
    pub fn new(rules: RuleSet) -> Self {
        Self(Arc::new(RwLock::new(Arc::new(rules))))
    }

    /// Current rule set, cheap to clone (an `Arc` bump).
    pub fn current(&self) -> Arc<RuleSet> {
        self.0.read().expect("rule set lock poisoned").clone()
    }

    /// Atomically swap in a freshly loaded rule set.
    pub fn replace(&self, rules: RuleSet) {
        *self.0.write().expect("rule set lock poisoned") = Arc::new(rules);
    }
}

#[derive(Debug)]
pub enum Error {
    Read { path: String, source: std::io::Error },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Read { path, source } => write!(f, "could not read rule file {path}: {source}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Read { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_blank_lines() {
        let rules = parse("# a comment\n\nDOMAIN-SUFFIX,example.com\n");
        assert_eq!(vec![Rule { suffix: "example.com".to_string() }], rules);
    }

    #[test]
    fn ignores_unrecognised_prefixes() {
        let rules = parse("DOMAIN,example.com\nDOMAIN-SUFFIX,ok.com\n");
        assert_eq!(vec![Rule { suffix: "ok.com".to_string() }], rules);
    }

    #[test]
    fn lowercases_and_trims_suffix() {
        let rules = parse("DOMAIN-SUFFIX,  Example.COM  \n");
        assert_eq!(vec![Rule { suffix: "example.com".to_string() }], rules);
    }

    #[test]
    fn matches_is_not_label_aligned() {
        let set = RuleSet::new(vec![Rule { suffix: "ample.com".to_string() }]);
        assert!(set.matches("example.com"));
    }

    #[test]
    fn matches_is_case_insensitive() {
        let set = RuleSet::new(vec![Rule { suffix: "example.com".to_string() }]);
        assert!(set.matches("Example.Com"));
    }

    #[test]
    fn empty_rule_set_matches_nothing() {
        let set = RuleSet::default();
        assert!(!set.matches("example.com"));
    }
}
