//! Domain policy: which hosts an action may reach or run against.
//!
//! Used in two places: navigation actions check their target URL against
//! the task allow-list, and the registry checks the environment's current
//! location against an action's domain filter.

use url::Url;

/// Result of checking a location against a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainCheck {
    /// Location is allowed
    Allowed,
    /// Location is denied
    Denied { location: String, reason: String },
}

impl DomainCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// A set of allowed domain patterns.
///
/// Pattern rules:
/// - `"*"` → allow all
/// - `"example.com"` → the host itself and any subdomain
/// - `"*.example.com"` → same as above, spelled explicitly
/// - a full URL is reduced to its host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainPolicy {
    patterns: Vec<String>,
}

impl DomainPolicy {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| normalize_pattern(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        Self { patterns }
    }

    /// A policy that allows everything.
    pub fn unrestricted() -> Self {
        Self::new(["*"])
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Check a location (URL) against this policy.
    ///
    /// An empty policy denies everything. `about:blank` is always allowed so
    /// a fresh environment can be observed.
    pub fn check(&self, location: &str) -> DomainCheck {
        if self.patterns.iter().any(|p| p == "*") {
            return DomainCheck::Allowed;
        }
        if location == "about:blank" {
            return DomainCheck::Allowed;
        }

        let Some(host) = host_of(location) else {
            return DomainCheck::Denied {
                location: location.into(),
                reason: "location has no host".into(),
            };
        };

        if self.patterns.iter().any(|p| host_matches(&host, p)) {
            DomainCheck::Allowed
        } else {
            DomainCheck::Denied {
                location: location.into(),
                reason: format!(
                    "host '{}' not in allowed domains ({} configured)",
                    host,
                    self.patterns.len()
                ),
            }
        }
    }
}

/// The lowercase host of a URL, if it has one.
pub fn host_of(location: &str) -> Option<String> {
    let parsed = Url::parse(location).ok()?;
    parsed.host_str().map(|h| h.trim_end_matches('.').to_lowercase())
}

fn normalize_pattern(pattern: &str) -> String {
    let pattern = pattern.trim();
    if pattern.contains("://") {
        return host_of(pattern).unwrap_or_default();
    }
    pattern.trim_end_matches('/').to_lowercase()
}

fn host_matches(host: &str, pattern: &str) -> bool {
    let base = pattern.strip_prefix("*.").unwrap_or(pattern);
    host == base || host.ends_with(&format!(".{base}"))
}
