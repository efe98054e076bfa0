//! Property values, predicates, and the intervals compiled from them.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::schema::DataType;

/// A property value or an implicit id.
#[derive(Clone, Debug)]
pub enum Value {
    Bool(bool),
    Long(i64),
    Double(f64),
    Text(String),
    /// Vertex or relation id, compared as unsigned.
    Id(u64),
}

impl Value {
    fn rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Long(_) => 1,
            Value::Double(_) => 2,
            Value::Text(_) => 3,
            Value::Id(_) => 4,
        }
    }

    /// Data type of a property holding this value; `None` for ids.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Bool(_) => Some(DataType::Boolean),
            Value::Long(_) => Some(DataType::Long),
            Value::Double(_) => Some(DataType::Double),
            Value::Text(_) => Some(DataType::Text),
            Value::Id(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Values of different variants order by variant; doubles use total order.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Long(a), Value::Long(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Id(a), Value::Id(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Bool(v) => v.hash(state),
            Value::Long(v) => v.hash(state),
            Value::Double(v) => v.to_bits().hash(state),
            Value::Text(v) => v.hash(state),
            Value::Id(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v:?}"),
            Value::Id(v) => write!(f, "#{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Comparison predicates.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Cmp {
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
}

impl Cmp {
    pub fn test(self, value: &Value, condition: &Value) -> bool {
        let ord = value.cmp(condition);
        match self {
            Cmp::Equal => ord == Ordering::Equal,
            Cmp::NotEqual => ord != Ordering::Equal,
            Cmp::LessThan => ord == Ordering::Less,
            Cmp::LessThanEqual => ord != Ordering::Greater,
            Cmp::GreaterThan => ord == Ordering::Greater,
            Cmp::GreaterThanEqual => ord != Ordering::Less,
        }
    }
}

/// Full-text predicates, answerable by mixed indexes only.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TextPredicate {
    /// Some whitespace-or-punctuation separated token equals the term,
    /// ignoring case.
    Contains,
    /// Some token starts with the term, ignoring case.
    ContainsPrefix,
}

impl TextPredicate {
    pub fn test(self, value: &str, term: &str) -> bool {
        let term = term.to_lowercase();
        let mut tokens = value
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);
        match self {
            TextPredicate::Contains => tokens.any(|t| t == term),
            TextPredicate::ContainsPrefix => tokens.any(|t| t.starts_with(&term)),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Predicate {
    Cmp(Cmp),
    Text(TextPredicate),
}

impl Predicate {
    pub fn is_text(self) -> bool {
        matches!(self, Predicate::Text(_))
    }

    /// Evaluates the predicate for a stored `value` (absent when the element
    /// has no such property).
    pub fn test(self, value: Option<&Value>, condition: Option<&Value>) -> bool {
        match (self, value, condition) {
            (Predicate::Cmp(Cmp::Equal), None, None) => true,
            (Predicate::Cmp(Cmp::NotEqual), Some(_), None) => true,
            (Predicate::Cmp(cmp), Some(v), Some(c)) => cmp.test(v, c),
            (Predicate::Text(text), Some(Value::Text(v)), Some(Value::Text(c))) => text.test(v, c),
            _ => false,
        }
    }
}

impl From<Cmp> for Predicate {
    fn from(cmp: Cmp) -> Self {
        Predicate::Cmp(cmp)
    }
}

impl From<TextPredicate> for Predicate {
    fn from(text: TextPredicate) -> Self {
        Predicate::Text(text)
    }
}

/// One end of a range interval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bound {
    pub value: Value,
    pub inclusive: bool,
}

/// The set of values a condition admits: a finite set of points or a range
/// whose absent ends are unbounded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Interval {
    Points(Vec<Value>),
    Range {
        start: Option<Bound>,
        end: Option<Bound>,
    },
}

impl Interval {
    pub fn point(value: Value) -> Self {
        Interval::Points(vec![value])
    }

    /// Sorted, deduplicated point set.
    pub fn points(mut values: Vec<Value>) -> Self {
        values.sort();
        values.dedup();
        Interval::Points(values)
    }

    pub fn unbounded() -> Self {
        Interval::Range {
            start: None,
            end: None,
        }
    }

    /// The interval admitted by `value <cmp> condition`; `None` when the
    /// predicate cannot be expressed as one interval.
    pub fn from_cmp(cmp: Cmp, condition: &Value) -> Option<Self> {
        let bound = |inclusive| {
            Some(Bound {
                value: condition.clone(),
                inclusive,
            })
        };
        match cmp {
            Cmp::Equal => Some(Interval::point(condition.clone())),
            Cmp::NotEqual => None,
            Cmp::LessThan => Some(Interval::Range { start: None, end: bound(false) }),
            Cmp::LessThanEqual => Some(Interval::Range { start: None, end: bound(true) }),
            Cmp::GreaterThan => Some(Interval::Range { start: bound(false), end: None }),
            Cmp::GreaterThanEqual => Some(Interval::Range { start: bound(true), end: None }),
        }
    }

    pub fn is_points(&self) -> bool {
        matches!(self, Interval::Points(_))
    }

    pub fn start(&self) -> Option<&Bound> {
        match self {
            Interval::Range { start, .. } => start.as_ref(),
            Interval::Points(_) => None,
        }
    }

    pub fn end(&self) -> Option<&Bound> {
        match self {
            Interval::Range { end, .. } => end.as_ref(),
            Interval::Points(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Interval::Points(points) => points.is_empty(),
            Interval::Range {
                start: Some(start),
                end: Some(end),
            } => match start.value.cmp(&end.value) {
                Ordering::Greater => true,
                Ordering::Equal => !(start.inclusive && end.inclusive),
                Ordering::Less => false,
            },
            Interval::Range { .. } => false,
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        match self {
            Interval::Points(points) => points.binary_search(value).is_ok(),
            Interval::Range { start, end } => {
                let after_start = start.as_ref().map_or(true, |b| match value.cmp(&b.value) {
                    Ordering::Greater => true,
                    Ordering::Equal => b.inclusive,
                    Ordering::Less => false,
                });
                let before_end = end.as_ref().map_or(true, |b| match value.cmp(&b.value) {
                    Ordering::Less => true,
                    Ordering::Equal => b.inclusive,
                    Ordering::Greater => false,
                });
                after_start && before_end
            }
        }
    }

    /// Values admitted by both intervals.
    pub fn intersect(&self, other: &Interval) -> Interval {
        match (self, other) {
            (Interval::Points(points), other) | (other, Interval::Points(points)) => {
                Interval::Points(points.iter().filter(|p| other.contains(p)).cloned().collect())
            }
            (
                Interval::Range { start: s1, end: e1 },
                Interval::Range { start: s2, end: e2 },
            ) => Interval::Range {
                start: tighter(s1, s2, Ordering::Greater),
                end: tighter(e1, e2, Ordering::Less),
            },
        }
    }
}

/// Picks the more restrictive of two bounds; `prefer` is the ordering of the
/// value that restricts more.
fn tighter(a: &Option<Bound>, b: &Option<Bound>, prefer: Ordering) -> Option<Bound> {
    match (a, b) {
        (None, other) | (other, None) => other.clone(),
        (Some(x), Some(y)) => {
            let ord = x.value.cmp(&y.value);
            if ord == Ordering::Equal {
                Some(Bound {
                    value: x.value.clone(),
                    inclusive: x.inclusive && y.inclusive,
                })
            } else if ord == prefer {
                Some(x.clone())
            } else {
                Some(y.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: Option<(i64, bool)>, end: Option<(i64, bool)>) -> Interval {
        let bound = |(v, inclusive): (i64, bool)| Bound {
            value: Value::Long(v),
            inclusive,
        };
        Interval::Range {
            start: start.map(bound),
            end: end.map(bound),
        }
    }

    #[test]
    fn ranges_intersect_to_tighter_bounds() {
        let a = range(Some((1, true)), Some((10, true)));
        let b = range(Some((5, false)), None);
        assert_eq!(a.intersect(&b), range(Some((5, false)), Some((10, true))));
        let c = range(Some((10, false)), None);
        assert!(a.intersect(&c).is_empty());
    }

    #[test]
    fn points_are_filtered_by_ranges() {
        let points = Interval::points(vec![Value::Long(7), Value::Long(2), Value::Long(7)]);
        assert_eq!(points, Interval::Points(vec![Value::Long(2), Value::Long(7)]));
        let r = Interval::from_cmp(Cmp::GreaterThan, &Value::Long(2)).unwrap();
        assert_eq!(points.intersect(&r), Interval::point(Value::Long(7)));
        assert_eq!(r.intersect(&points), Interval::point(Value::Long(7)));
        assert!(Interval::from_cmp(Cmp::NotEqual, &Value::Long(1)).is_none());
    }

    #[test]
    fn single_value_range_needs_inclusive_ends() {
        assert!(!range(Some((3, true)), Some((3, true))).is_empty());
        assert!(range(Some((3, true)), Some((3, false))).is_empty());
        assert!(!Interval::unbounded().is_empty());
    }

    #[test]
    fn doubles_have_total_order() {
        assert!(Value::Double(-0.5) < Value::Double(0.0));
        assert_eq!(Value::Double(1.5), Value::Double(1.5));
        assert!(Value::Bool(true) < Value::Long(0));
    }

    #[test]
    fn predicates_handle_absent_values() {
        let eq = Predicate::Cmp(Cmp::Equal);
        assert!(eq.test(None, None));
        assert!(!eq.test(Some(&Value::Long(1)), None));
        assert!(Predicate::Cmp(Cmp::NotEqual).test(Some(&Value::Long(1)), None));
        let text = Predicate::Text(TextPredicate::Contains);
        assert!(text.test(Some(&"Hello, World".into()), Some(&"world".into())));
        assert!(Predicate::Text(TextPredicate::ContainsPrefix)
            .test(Some(&"graph databases".into()), Some(&"data".into())));
    }
}
