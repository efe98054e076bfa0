//! Has-conditions attached to vertex-centric and graph-centric queries.

use super::value::{Cmp, Predicate, Value};

/// One conjunct of a query's filter.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// `key <predicate> value`; `value` is `None` for presence tests
    /// (`Equal` means "has no value", `NotEqual` means "has some value").
    Has {
        key: String,
        predicate: Predicate,
        value: Option<Value>,
    },
    /// `key` equals one of `values`.
    AnyOf { key: String, values: Vec<Value> },
    /// The element's label is one of `labels`.
    HasLabel { labels: Vec<String> },
}

impl Condition {
    pub fn has(key: impl Into<String>, predicate: impl Into<Predicate>, value: impl Into<Value>) -> Self {
        Condition::Has {
            key: key.into(),
            predicate: predicate.into(),
            value: Some(value.into()),
        }
    }

    pub fn equal(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::has(key, Cmp::Equal, value)
    }

    /// The element has some value for `key`.
    pub fn exists(key: impl Into<String>) -> Self {
        Condition::Has {
            key: key.into(),
            predicate: Predicate::Cmp(Cmp::NotEqual),
            value: None,
        }
    }

    pub fn any_of(key: impl Into<String>, values: Vec<Value>) -> Self {
        Condition::AnyOf {
            key: key.into(),
            values,
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Condition::HasLabel {
            labels: vec![label.into()],
        }
    }

    /// Property key the condition tests, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Condition::Has { key, .. } | Condition::AnyOf { key, .. } => Some(key),
            Condition::HasLabel { .. } => None,
        }
    }

    /// Values the key must equal, when the condition is an equality or a
    /// disjunction of equalities.
    pub fn equality_values(&self) -> Option<&[Value]> {
        match self {
            Condition::Has {
                predicate: Predicate::Cmp(Cmp::Equal),
                value: Some(value),
                ..
            } => Some(std::slice::from_ref(value)),
            Condition::AnyOf { values, .. } if !values.is_empty() => Some(values),
            _ => None,
        }
    }

    /// Evaluates the condition against an element's value for the key, or
    /// its label for label conditions.
    pub fn evaluate(&self, value: Option<&Value>, label: Option<&str>) -> bool {
        match self {
            Condition::Has {
                predicate,
                value: condition,
                ..
            } => predicate.test(value, condition.as_ref()),
            Condition::AnyOf { values, .. } => value.is_some_and(|v| values.contains(v)),
            Condition::HasLabel { labels } => label.is_some_and(|l| labels.iter().any(|x| x == l)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_values_cover_equal_and_any_of() {
        let eq = Condition::equal("age", 3i64);
        assert_eq!(eq.equality_values(), Some(&[Value::Long(3)][..]));
        let any = Condition::any_of("age", vec![Value::Long(1), Value::Long(2)]);
        assert_eq!(any.equality_values().map(<[Value]>::len), Some(2));
        assert!(Condition::any_of("age", Vec::new()).equality_values().is_none());
        assert!(Condition::exists("age").equality_values().is_none());
    }

    #[test]
    fn evaluate_checks_values_and_labels() {
        assert!(Condition::exists("name").evaluate(Some(&"x".into()), None));
        assert!(!Condition::exists("name").evaluate(None, None));
        assert!(Condition::label("person").evaluate(None, Some("person")));
        assert!(Condition::any_of("n", vec![Value::Long(4)]).evaluate(Some(&Value::Long(4)), None));
    }
}
