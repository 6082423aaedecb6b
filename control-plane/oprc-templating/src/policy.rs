//! Annotation keys and matching rules the patchers and the deleter consult.

use std::num::ParseIntError;

use kube::ResourceExt;
use kube::core::DynamicObject;

use crate::resource::gvk_of;

pub const REMOVE_DEFAULTING_ANNOTATIONS_KEY: &str =
    "templating.oaas.io/remove-defaulting-annotations";
pub const DEFAULTING_ANNOTATION_KEY: &str =
    "resourceclass.oaas.io/is-default-class";
pub const DELETION_PRIORITY_KEY: &str = "templating.oaas.io/deletion-priority";

pub const LABEL_PARENT_GROUP: &str = "templating.oaas.io/parent-group";
pub const LABEL_PARENT_VERSION: &str = "templating.oaas.io/parent-version";
pub const LABEL_PARENT_KIND: &str = "templating.oaas.io/parent-kind";
pub const LABEL_PARENT_NAME: &str = "templating.oaas.io/parent-name";
pub const LABEL_PARENT_NAMESPACE: &str = "templating.oaas.io/parent-namespace";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PolicyError {
    #[error("expected <group-suffix>=<kind>, got {0:?}")]
    MalformedGroupKind(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationPolicy {
    /// Parent annotation that requests stripping the defaulting annotation.
    pub remove_defaulting_key: String,
    /// Child annotation stripped when requested.
    pub defaulting_key: String,
    pub deletion_priority_key: String,
    pub default_deletion_priority: i64,
}

impl Default for AnnotationPolicy {
    fn default() -> Self {
        Self {
            remove_defaulting_key: REMOVE_DEFAULTING_ANNOTATIONS_KEY.into(),
            defaulting_key: DEFAULTING_ANNOTATION_KEY.into(),
            deletion_priority_key: DELETION_PRIORITY_KEY.into(),
            default_deletion_priority: 0,
        }
    }
}

impl AnnotationPolicy {
    pub fn remove_defaulting_requested(&self, parent: &DynamicObject) -> bool {
        parent
            .annotations()
            .get(&self.remove_defaulting_key)
            .is_some_and(|v| v == "true")
    }

    /// Deletion priority of `child`; absent means the default, anything that
    /// is not an integer is an error.
    pub fn deletion_priority(
        &self,
        child: &DynamicObject,
    ) -> Result<i64, ParseIntError> {
        match child.annotations().get(&self.deletion_priority_key) {
            Some(raw) => raw.parse::<i64>(),
            None => Ok(self.default_deletion_priority),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SharedDependencyRule {
    /// Kind name, compared case-insensitively.
    Kind(String),
    /// API group ending in `group_suffix` with the given kind.
    GroupSuffixKind { group_suffix: String, kind: String },
}

impl SharedDependencyRule {
    fn matches(&self, group: &str, kind: &str) -> bool {
        match self {
            Self::Kind(k) => k.eq_ignore_ascii_case(kind),
            Self::GroupSuffixKind { group_suffix, kind: k } => {
                group.ends_with(group_suffix.as_str())
                    && k.eq_ignore_ascii_case(kind)
            }
        }
    }
}

/// Identifies children that are long-lived shared dependencies. Those never
/// get an owner reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedDependencyPolicy {
    rules: Vec<SharedDependencyRule>,
}

impl Default for SharedDependencyPolicy {
    fn default() -> Self {
        Self {
            rules: vec![SharedDependencyRule::Kind("provider".into())],
        }
    }
}

impl SharedDependencyPolicy {
    pub fn new(rules: Vec<SharedDependencyRule>) -> Self {
        Self { rules }
    }

    pub fn none() -> Self {
        Self { rules: Vec::new() }
    }

    /// Build from comma separated lists: `kinds` like `provider,Secret` and
    /// `group_kinds` like `crossplane.io=Provider`.
    pub fn parse(kinds: &str, group_kinds: &str) -> Result<Self, PolicyError> {
        let mut rules: Vec<SharedDependencyRule> = kinds
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| SharedDependencyRule::Kind(k.to_string()))
            .collect();
        for entry in group_kinds.split(',').map(str::trim) {
            if entry.is_empty() {
                continue;
            }
            let (suffix, kind) = entry.split_once('=').ok_or_else(|| {
                PolicyError::MalformedGroupKind(entry.to_string())
            })?;
            rules.push(SharedDependencyRule::GroupSuffixKind {
                group_suffix: suffix.trim().to_string(),
                kind: kind.trim().to_string(),
            });
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[SharedDependencyRule] {
        &self.rules
    }

    pub fn matches(&self, child: &DynamicObject) -> bool {
        let Ok(gvk) = gvk_of(child) else {
            return false;
        };
        self.rules.iter().any(|r| r.matches(&gvk.group, &gvk.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::*;

    #[test]
    fn priority_defaults_and_parses() {
        let policy = AnnotationPolicy::default();
        assert_eq!(policy.deletion_priority(&config_map("a")), Ok(0));

        let neg = with_annotation(config_map("b"), DELETION_PRIORITY_KEY, "-1");
        assert_eq!(policy.deletion_priority(&neg), Ok(-1));

        let bad = with_annotation(config_map("c"), DELETION_PRIORITY_KEY, "x");
        assert!(policy.deletion_priority(&bad).is_err());
    }

    #[test]
    fn defaulting_removal_needs_literal_true() {
        let policy = AnnotationPolicy::default();
        let p = parent("default", "blog");
        assert!(!policy.remove_defaulting_requested(&p));
        let p = with_annotation(p, REMOVE_DEFAULTING_ANNOTATIONS_KEY, "yes");
        assert!(!policy.remove_defaulting_requested(&p));
        let p = with_annotation(p, REMOVE_DEFAULTING_ANNOTATIONS_KEY, "true");
        assert!(policy.remove_defaulting_requested(&p));
    }

    #[test]
    fn default_policy_matches_provider_kind_any_case() {
        let policy = SharedDependencyPolicy::default();
        assert!(policy.matches(&child("example.org/v1", "Provider", "p")));
        assert!(policy.matches(&child("example.org/v1", "PROVIDER", "p")));
        assert!(!policy.matches(&child("example.org/v1", "ProviderConfig", "p")));
    }

    #[test]
    fn group_suffix_rule_requires_both_parts() {
        let policy =
            SharedDependencyPolicy::parse("", "crossplane.io=Provider").unwrap();
        assert!(policy.matches(&child("gcp.crossplane.io/v1", "Provider", "p")));
        assert!(!policy.matches(&child("example.org/v1", "Provider", "p")));
        assert!(!policy.matches(&child("gcp.crossplane.io/v1", "Bucket", "b")));
    }

    #[test]
    fn parse_rejects_malformed_group_rule() {
        assert_eq!(
            SharedDependencyPolicy::parse("", "crossplane.io"),
            Err(PolicyError::MalformedGroupKind("crossplane.io".into()))
        );
        let policy = SharedDependencyPolicy::parse(" provider , ", "").unwrap();
        assert_eq!(policy.rules().len(), 1);
    }
}
