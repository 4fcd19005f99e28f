//! Repeat-count policy for segments and property-bound lines.

use crate::binding::PropertyKind;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardinalityMode {
    /// Exceeding the maximum fails the record
    Strict,
    /// Instances beyond the maximum are dropped
    Restricted,
    /// Everything is attached; exceeding the maximum is only logged
    #[default]
    Loose,
    /// The property holds one instance
    Single,
    /// `Single` or `Loose`, depending on whether the property is a collection
    AutoResolve,
}

impl CardinalityMode {
    /// Resolve `AutoResolve` against the declared kind of the target property
    pub fn resolve(self, kind: Option<PropertyKind>) -> Self {
        match self {
            CardinalityMode::AutoResolve => match kind {
                Some(PropertyKind::List) => CardinalityMode::Loose,
                _ => CardinalityMode::Single,
            },
            other => other,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CardinalityMode::Strict => "STRICT",
            CardinalityMode::Restricted => "RESTRICTED",
            CardinalityMode::Loose => "LOOSE",
            CardinalityMode::Single => "SINGLE",
            CardinalityMode::AutoResolve => "AUTO_RESOLVE",
        }
    }
}

impl fmt::Display for CardinalityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a built child bean goes and how many of them are allowed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cardinality {
    pub bean_ref: String,
    pub parent_bean_ref: Option<String>,
    pub property_name: Option<String>,
    pub add_method: Option<String>,
    /// Negative means no minimum
    pub min_count: i64,
    /// Zero or negative means unbounded
    pub max_count: i64,
    pub mode: CardinalityMode,
}

impl Cardinality {
    pub fn new(bean_ref: impl Into<String>) -> Self {
        Self {
            bean_ref: bean_ref.into(),
            parent_bean_ref: None,
            property_name: None,
            add_method: None,
            min_count: 0,
            max_count: -1,
            mode: CardinalityMode::default(),
        }
    }

    /// Attach to `parent.property`
    pub fn attached_to(mut self, parent: impl Into<String>, property: impl Into<String>) -> Self {
        self.parent_bean_ref = Some(parent.into());
        self.property_name = Some(property.into());
        self
    }

    pub fn with_add_method(mut self, method: impl Into<String>) -> Self {
        self.add_method = Some(method.into());
        self
    }

    pub fn with_counts(mut self, min_count: i64, max_count: i64) -> Self {
        self.min_count = min_count;
        self.max_count = max_count;
        self
    }

    pub fn with_mode(mut self, mode: CardinalityMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn effective_min(&self) -> usize {
        usize::try_from(self.min_count).unwrap_or(0)
    }

    pub fn effective_max(&self) -> usize {
        if self.max_count <= 0 {
            usize::MAX
        } else {
            usize::try_from(self.max_count).unwrap_or(usize::MAX)
        }
    }

    /// Name used in messages: the property, else the add-method, else the bean
    pub fn target_name(&self) -> &str {
        self.property_name
            .as_deref()
            .or(self.add_method.as_deref())
            .unwrap_or(&self.bean_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_counts() {
        let unbounded = Cardinality::new("item");
        assert_eq!(unbounded.effective_min(), 0);
        assert_eq!(unbounded.effective_max(), usize::MAX);

        let bounded = Cardinality::new("item").with_counts(-3, 2);
        assert_eq!(bounded.effective_min(), 0);
        assert_eq!(bounded.effective_max(), 2);
        assert_eq!(Cardinality::new("x").with_counts(1, 0).effective_max(), usize::MAX);
    }

    #[test]
    fn test_auto_resolve() {
        assert_eq!(
            CardinalityMode::AutoResolve.resolve(Some(PropertyKind::List)),
            CardinalityMode::Loose
        );
        assert_eq!(
            CardinalityMode::AutoResolve.resolve(Some(PropertyKind::Bean)),
            CardinalityMode::Single
        );
        assert_eq!(
            CardinalityMode::Strict.resolve(None),
            CardinalityMode::Strict
        );
    }

    #[test]
    fn test_mode_names_round_trip_through_serde() {
        let mode: CardinalityMode = serde_json::from_str("\"AUTO_RESOLVE\"").unwrap();
        assert_eq!(mode, CardinalityMode::AutoResolve);
        assert_eq!(mode.to_string(), "AUTO_RESOLVE");
    }
}
