//! Host-pattern rule sets: the native policy format.
//!
//! A rule set is an ordered list of host patterns, each mapping to a
//! directive list in the PAC result form, plus a default list for hosts no
//! rule matches. The first matching rule wins.
//!
//! # Pattern Matching
//!
//! - Exact match: `internal.corp`
//! - Wildcard match: `*.corp` matches `git.corp` and `a.b.corp`
//!   but NOT `corp` itself
//!
//! Matching is case-insensitive.
//!
//! # Document format
//!
//! ```toml
//! default = "DIRECT"
//!
//! [[rules]]
//! pattern = "*.corp"
//! directives = "PROXY proxy.corp:8080; DIRECT"
//! ```

use serde::{Deserialize, Serialize};
use url::Url;

use super::directive::{parse_directives, Directive};
use super::error::PolicyError;
use super::resolver::PolicyResolver;

/// One rule entry as written in TOML.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleEntry {
    /// Host pattern: exact host or `*.`-prefixed wildcard.
    pub pattern: String,
    /// Directive list in PAC result form, e.g. `"PROXY p:8080; DIRECT"`.
    pub directives: String,
}

/// A compiled rule.
#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    directives: Vec<Directive>,
}

/// An ordered, first-match-wins rule set.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    default: Vec<Directive>,
}

/// Serde shape of a standalone rules document.
#[derive(Debug, Default, Deserialize)]
struct RulesDocument {
    #[serde(default)]
    default: Option<String>,
    #[serde(default)]
    rules: Vec<RuleEntry>,
}

impl RuleSet {
    /// Compile a rule set from entries and a default directive string.
    pub fn new(entries: &[RuleEntry], default: &str) -> Result<Self, PolicyError> {
        let rules = entries
            .iter()
            .map(|e| {
                Ok(Rule {
                    pattern: e.pattern.to_lowercase(),
                    directives: parse_directives(&e.directives)?,
                })
            })
            .collect::<Result<Vec<_>, PolicyError>>()?;
        Ok(Self {
            rules,
            default: parse_directives(default)?,
        })
    }

    /// A rule set with no rules that always answers `DIRECT`.
    pub fn direct() -> Self {
        Self {
            rules: Vec::new(),
            default: vec![Directive::Direct],
        }
    }

    /// A rule set that routes everything through one upstream proxy.
    pub fn fixed_upstream(host: &str, port: u16) -> Self {
        Self {
            rules: Vec::new(),
            default: vec![Directive::Proxy {
                host: host.to_string(),
                port,
            }],
        }
    }

    /// Parse a standalone TOML rules document.
    pub fn from_toml(text: &str) -> Result<Self, PolicyError> {
        let doc: RulesDocument =
            toml::from_str(text).map_err(|e| PolicyError::InvalidRules(e.to_string()))?;
        Self::new(&doc.rules, doc.default.as_deref().unwrap_or("DIRECT"))
    }

    /// Number of compiled rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the rule set contains no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl PolicyResolver for RuleSet {
    fn find_proxy(&self, url: &Url) -> Result<Vec<Directive>, PolicyError> {
        let Some(host) = url.host_str() else {
            return Ok(self.default.clone());
        };
        let host = host.to_lowercase();
        for rule in &self.rules {
            if matches_pattern(&rule.pattern, &host) {
                return Ok(rule.directives.clone());
            }
        }
        Ok(self.default.clone())
    }
}

/// Check if a host matches a pattern.
///
/// Pattern `*.example.com` matches `sub.example.com` and
/// `deep.sub.example.com` but NOT `example.com` itself. Patterns without a
/// leading `*.` must match exactly.
fn matches_pattern(pattern: &str, host: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix("*.") {
        if host.ends_with(suffix) {
            let prefix_len = host.len() - suffix.len();
            prefix_len > 0 && host.as_bytes().get(prefix_len - 1) == Some(&b'.')
        } else {
            false
        }
    } else {
        pattern == host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pattern: &str, directives: &str) -> RuleEntry {
        RuleEntry {
            pattern: pattern.to_string(),
            directives: directives.to_string(),
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_pattern_matching() {
        assert!(matches_pattern("*.example.com", "sub.example.com"));
        assert!(matches_pattern("*.example.com", "deep.sub.example.com"));
        assert!(!matches_pattern("*.example.com", "example.com"));
        assert!(!matches_pattern("*.example.com", "fakeexample.com"));
        assert!(matches_pattern("example.com", "example.com"));
        assert!(!matches_pattern("example.com", "sub.example.com"));
    }

    #[test]
    fn test_first_match_wins() {
        let rules = RuleSet::new(
            &[
                entry("*.corp", "PROXY first:1"),
                entry("git.corp", "PROXY second:2"),
            ],
            "DIRECT",
        )
        .unwrap();
        let list = rules.find_proxy(&url("http://git.corp/")).unwrap();
        assert_eq!(
            list[0],
            Directive::Proxy {
                host: "first".to_string(),
                port: 1
            }
        );
    }

    #[test]
    fn test_default_when_no_match() {
        let rules = RuleSet::new(&[entry("*.corp", "PROXY p:1")], "DIRECT").unwrap();
        let list = rules.find_proxy(&url("http://example.com/")).unwrap();
        assert_eq!(list, vec![Directive::Direct]);
    }

    #[test]
    fn test_case_insensitive_matching() {
        let rules = RuleSet::new(&[entry("Internal.Corp", "PROXY p:1")], "DIRECT").unwrap();
        let list = rules.find_proxy(&url("http://INTERNAL.CORP/")).unwrap();
        assert!(matches!(list[0], Directive::Proxy { .. }));
    }

    #[test]
    fn test_fixed_upstream() {
        let rules = RuleSet::fixed_upstream("proxy.corp", 8080);
        let list = rules.find_proxy(&url("http://anything.example/")).unwrap();
        assert_eq!(
            list,
            vec![Directive::Proxy {
                host: "proxy.corp".to_string(),
                port: 8080
            }]
        );
    }

    #[test]
    fn test_direct_rule_set() {
        let rules = RuleSet::direct();
        assert!(rules.is_empty());
        let list = rules.find_proxy(&url("http://example.com/")).unwrap();
        assert_eq!(list, vec![Directive::Direct]);
    }

    #[test]
    fn test_from_toml() {
        let doc = r#"
default = "DIRECT"

[[rules]]
pattern = "*.corp"
directives = "PROXY proxy.corp:8080; DIRECT"

[[rules]]
pattern = "blocked.example"
directives = "PROXY sinkhole:1"
"#;
        let rules = RuleSet::from_toml(doc).unwrap();
        assert_eq!(rules.len(), 2);
        let list = rules.find_proxy(&url("http://git.corp/")).unwrap();
        assert_eq!(
            list[0],
            Directive::Proxy {
                host: "proxy.corp".to_string(),
                port: 8080
            }
        );
    }

    #[test]
    fn test_from_toml_defaults() {
        let rules = RuleSet::from_toml("").unwrap();
        assert!(rules.is_empty());
        let list = rules.find_proxy(&url("http://example.com/")).unwrap();
        assert_eq!(list, vec![Directive::Direct]);
    }

    #[test]
    fn test_from_toml_invalid() {
        assert!(RuleSet::from_toml("not valid toml [").is_err());
        let bad_directive = r#"
[[rules]]
pattern = "a"
directives = "PROXY host:notaport"
"#;
        assert!(RuleSet::from_toml(bad_directive).is_err());
    }
}
