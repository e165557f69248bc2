//! Endpoint classification rules.
//!
//! An ordered table maps request paths to policy names. The first matching
//! rule wins, so specific patterns must be listed before general ones. A path
//! that matches nothing is governed by the default policy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, trace};

use super::policy::{PolicyCatalog, PolicyConfig, DEFAULT_POLICY};
use crate::error::{FloodgateError, Result};

/// A complete policy + endpoint rule document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitRules {
    /// Map of policy name to its limits
    #[serde(default)]
    pub policies: HashMap<String, PolicyConfig>,
    /// Ordered endpoint rules
    #[serde(default)]
    pub endpoints: Vec<EndpointRule>,
}

/// One row of the classification table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRule {
    /// Exact path, or a prefix when it ends with `*`
    pub pattern: String,
    /// Name of the policy to apply
    pub policy: String,
}

impl EndpointRule {
    pub fn new(pattern: impl Into<String>, policy: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            policy: policy.into(),
        }
    }
}

/// Endpoint table shipped when configuration does not provide one.
pub fn builtin_endpoints() -> Vec<EndpointRule> {
    vec![
        EndpointRule::new("/api/auth/*", "auth"),
        EndpointRule::new("/api/users/login", "auth"),
        EndpointRule::new("/api/users/forgot-password", "auth"),
        EndpointRule::new("/api/users/reset-password", "auth"),
        EndpointRule::new("/api/forms/*", "forms"),
        EndpointRule::new("/api/form-submissions*", "forms"),
        EndpointRule::new("/api/media*", "upload"),
        EndpointRule::new("/api/graphql", "api"),
        EndpointRule::new("/api/public-*", DEFAULT_POLICY),
    ]
}

impl RateLimitRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("Failed to parse rate limit rules: {}", e)))
    }

    /// Validate the document, substituting built-ins for empty sections.
    pub fn build(&self) -> Result<(PolicyCatalog, EndpointClassifier)> {
        let catalog = if self.policies.is_empty() {
            PolicyCatalog::builtin()
        } else {
            PolicyCatalog::from_config(&self.policies)?
        };

        let endpoints = if self.endpoints.is_empty() {
            builtin_endpoints()
        } else {
            self.endpoints.clone()
        };

        let classifier = EndpointClassifier::new(&endpoints, &catalog)?;
        Ok((catalog, classifier))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathPattern {
    Exact(String),
    Prefix(String),
}

impl PathPattern {
    fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw == "*" {
            return Err(FloodgateError::Config(format!(
                "endpoint pattern '{}' matches nothing specific",
                raw
            )));
        }
        match raw.strip_suffix('*') {
            Some(prefix) => Ok(PathPattern::Prefix(prefix.to_string())),
            None => Ok(PathPattern::Exact(normalize(raw).to_string())),
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(exact) => normalize(path) == exact,
            PathPattern::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

/// Trailing slashes do not distinguish endpoints.
fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Maps request paths to policy names.
#[derive(Debug, Clone)]
pub struct EndpointClassifier {
    rules: Vec<(PathPattern, String)>,
    default_policy: String,
}

impl EndpointClassifier {
    /// Build a classifier, checking every rule names a known policy.
    pub fn new(rules: &[EndpointRule], catalog: &PolicyCatalog) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            if !catalog.contains(&rule.policy) {
                return Err(FloodgateError::Config(format!(
                    "endpoint '{}' refers to unknown policy '{}'",
                    rule.pattern, rule.policy
                )));
            }
            compiled.push((PathPattern::parse(&rule.pattern)?, rule.policy.clone()));
        }

        Ok(Self {
            rules: compiled,
            default_policy: catalog.default_policy().name().to_string(),
        })
    }

    /// Classifier over the built-in endpoint table and catalog.
    pub fn builtin() -> Self {
        let catalog = PolicyCatalog::builtin();
        let rules = builtin_endpoints()
            .into_iter()
            .filter_map(|rule| {
                PathPattern::parse(&rule.pattern)
                    .ok()
                    .map(|pattern| (pattern, rule.policy))
            })
            .collect();
        Self {
            rules,
            default_policy: catalog.default_policy().name().to_string(),
        }
    }

    /// The policy name governing `path`.
    pub fn classify(&self, path: &str) -> &str {
        for (pattern, policy) in &self.rules {
            if pattern.matches(path) {
                trace!(path = %path, policy = %policy, "Classified endpoint");
                return policy;
            }
        }
        &self.default_policy
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for EndpointClassifier {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_classification() {
        let classifier = EndpointClassifier::builtin();

        assert_eq!(classifier.classify("/api/auth/login"), "auth");
        assert_eq!(classifier.classify("/api/users/login"), "auth");
        assert_eq!(classifier.classify("/api/public-voiceovers"), "public");
        assert_eq!(classifier.classify("/api/media/upload"), "upload");
        assert_eq!(classifier.classify("/api/forms/contact"), "forms");
    }

    #[test]
    fn test_unknown_path_falls_back_to_default() {
        let classifier = EndpointClassifier::builtin();
        assert_eq!(classifier.classify("/api/unknown-thing"), DEFAULT_POLICY);
        assert_eq!(classifier.classify("/"), DEFAULT_POLICY);
    }

    #[test]
    fn test_first_match_wins() {
        let yaml = r#"
policies:
  strict:
    max_requests: 1
    window_seconds: 60
  loose:
    max_requests: 100
    window_seconds: 60
  public:
    max_requests: 50
    window_seconds: 60
endpoints:
  - pattern: /api/admin/login
    policy: strict
  - pattern: /api/admin/*
    policy: loose
"#;
        let rules = RateLimitRules::from_yaml(yaml).unwrap();
        let (_, classifier) = rules.build().unwrap();

        assert_eq!(classifier.classify("/api/admin/login"), "strict");
        assert_eq!(classifier.classify("/api/admin/login/"), "strict");
        assert_eq!(classifier.classify("/api/admin/users"), "loose");
    }

    #[test]
    fn test_general_rule_first_shadows_specific() {
        let catalog = PolicyCatalog::builtin();
        let rules = vec![
            EndpointRule::new("/api/*", "api"),
            EndpointRule::new("/api/auth/login", "auth"),
        ];
        let classifier = EndpointClassifier::new(&rules, &catalog).unwrap();

        assert_eq!(classifier.classify("/api/auth/login"), "api");
    }

    #[test]
    fn test_exact_pattern_does_not_match_children() {
        let catalog = PolicyCatalog::builtin();
        let rules = vec![EndpointRule::new("/api/graphql", "api")];
        let classifier = EndpointClassifier::new(&rules, &catalog).unwrap();

        assert_eq!(classifier.classify("/api/graphql"), "api");
        assert_eq!(classifier.classify("/api/graphql/schema"), DEFAULT_POLICY);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let catalog = PolicyCatalog::builtin();
        let rules = vec![EndpointRule::new("/api/x", "missing")];

        let err = EndpointClassifier::new(&rules, &catalog).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let catalog = PolicyCatalog::builtin();
        let rules = vec![EndpointRule::new("  ", "auth")];
        assert!(EndpointClassifier::new(&rules, &catalog).is_err());

        let rules = vec![EndpointRule::new("*", "auth")];
        assert!(EndpointClassifier::new(&rules, &catalog).is_err());
    }

    #[test]
    fn test_empty_document_uses_builtins() {
        let rules = RateLimitRules::from_yaml("{}").unwrap();
        let (catalog, classifier) = rules.build().unwrap();

        assert!(catalog.contains("auth"));
        assert_eq!(classifier.len(), builtin_endpoints().len());
    }

    #[test]
    fn test_invalid_policy_in_document_rejected() {
        let yaml = r#"
policies:
  public:
    max_requests: 0
    window_seconds: 60
"#;
        let rules = RateLimitRules::from_yaml(yaml).unwrap();
        assert!(rules.build().is_err());
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let err = RateLimitRules::from_yaml("policies: [not, a, map]").unwrap_err();
        assert!(matches!(err, FloodgateError::Config(_)));
    }
}
