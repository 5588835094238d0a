use regex::{Regex, RegexBuilder};

use crate::config::{ConfigError, RestrictionConfig};
use crate::doc::Metadata;

/// A metadata condition gating a handler: `pattern` must match a whole value
/// stored under `field`.
#[derive(Debug, Clone)]
pub struct Restriction {
    field: String,
    pattern: String,
    case_sensitive: bool,
    regex: Regex,
}

impl Restriction {
    pub fn new(
        field: impl Into<String>,
        pattern: impl Into<String>,
        case_sensitive: bool,
    ) -> Result<Self, ConfigError> {
        let field = field.into();
        let pattern = pattern.into();
        if field.trim().is_empty() {
            return Err(ConfigError::MissingValue {
                handler: "restriction",
                field: "field",
            });
        }
        let regex = RegexBuilder::new(&format!("^(?:{pattern})$"))
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|source| ConfigError::InvalidPattern {
                field: field.clone(),
                pattern: pattern.clone(),
                source,
            })?;
        Ok(Self {
            field,
            pattern,
            case_sensitive,
            regex,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// True when any value of the field matches. A missing field never matches.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        metadata
            .get(&self.field)
            .iter()
            .any(|value| self.regex.is_match(value))
    }

    pub fn to_config(&self) -> RestrictionConfig {
        RestrictionConfig {
            field: self.field.clone(),
            pattern: self.pattern.clone(),
            case_sensitive: self.case_sensitive,
        }
    }
}

impl PartialEq for Restriction {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field
            && self.pattern == other.pattern
            && self.case_sensitive == other.case_sensitive
    }
}

/// OR-combined restrictions. An empty set applies to every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Restrictions(Vec<Restriction>);

impl Restrictions {
    pub fn new(restrictions: Vec<Restriction>) -> Self {
        Self(restrictions)
    }

    pub fn from_configs(configs: &[RestrictionConfig]) -> Result<Self, ConfigError> {
        configs
            .iter()
            .map(|c| Restriction::new(&c.field, &c.pattern, c.case_sensitive))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn applies(&self, metadata: &Metadata) -> bool {
        self.0.is_empty() || self.0.iter().any(|r| r.matches(metadata))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Restriction> {
        self.0.iter()
    }

    pub fn to_configs(&self) -> Vec<RestrictionConfig> {
        self.0.iter().map(Restriction::to_config).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, &str)]) -> Metadata {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_empty_restrictions_always_apply() {
        let restrictions = Restrictions::default();
        assert!(restrictions.applies(&Metadata::new()));
        assert!(restrictions.applies(&metadata(&[("anything", "at all")])));
    }

    #[test]
    fn test_case_insensitive_match_is_idempotent() {
        let restrictions = Restrictions::new(vec![Restriction::new("f", "a.*", false).unwrap()]);
        let md = metadata(&[("f", "Apple")]);

        let first = restrictions.applies(&md);
        let second = restrictions.applies(&md);
        assert!(first);
        assert_eq!(first, second);
    }

    #[test]
    fn test_case_sensitive_match() {
        let restriction = Restriction::new("f", "a.*", true).unwrap();
        assert!(!restriction.matches(&metadata(&[("f", "Apple")])));
        assert!(restriction.matches(&metadata(&[("f", "apple")])));
    }

    #[test]
    fn test_pattern_must_match_whole_value() {
        let restriction = Restriction::new("document.contentType", "text/html", false).unwrap();
        assert!(restriction.matches(&metadata(&[("document.contentType", "text/html")])));
        assert!(!restriction.matches(&metadata(&[(
            "document.contentType",
            "text/html; charset=utf-8"
        )])));
    }

    #[test]
    fn test_any_value_of_field_matches() {
        let restriction = Restriction::new("tags", "rust", true).unwrap();
        let mut md = Metadata::new();
        md.add("tags", ["go", "rust", "zig"]);
        assert!(restriction.matches(&md));
    }

    #[test]
    fn test_missing_field_does_not_match() {
        let restrictions = Restrictions::new(vec![Restriction::new("f", ".*", false).unwrap()]);
        assert!(!restrictions.applies(&metadata(&[("g", "x")])));
    }

    #[test]
    fn test_restrictions_are_or_combined() {
        let restrictions = Restrictions::new(vec![
            Restriction::new("a", "1", false).unwrap(),
            Restriction::new("b", "2", false).unwrap(),
        ]);
        assert!(restrictions.applies(&metadata(&[("b", "2")])));
        assert!(!restrictions.applies(&metadata(&[("a", "2"), ("b", "1")])));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = Restriction::new("f", "(unclosed", false).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_blank_field_is_config_error() {
        assert!(Restriction::new("  ", ".*", false).is_err());
    }
}

#[cfg(all(test, feature = "fuzz"))]
mod fuzz {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_applies_is_pure(
            pattern in "[a-z.*]{1,8}",
            values in proptest::collection::vec("[a-zA-Z]{0,12}", 0..5),
        ) {
            if let Ok(restriction) = Restriction::new("f", pattern, false) {
                let restrictions = Restrictions::new(vec![restriction]);
                let mut md = Metadata::new();
                md.add("f", values);
                let before = md.clone();
                let first = restrictions.applies(&md);
                prop_assert_eq!(first, restrictions.applies(&md));
                prop_assert_eq!(before, md);
            }
        }
    }
}
