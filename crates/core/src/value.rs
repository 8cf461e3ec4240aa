//! TaggedValue - small tagged union
//!
//! | tag   | payload              | `Display`       |
//! |-------|----------------------|-----------------|
//! | Nil   | -                    | `<null>`        |
//! | Bool  | `bool`               | `true`/`false`  |
//! | Int   | `i64`                | `42`            |
//! | Float | `f64`                | `0.5`           |
//! | List  | [`SharedList`]       | `[a, b]`        |
//!
//! Cloning a `List` value aliases the list; nothing is deep-copied.
//!
//! Conversions to primitives never fail: `Nil` and `List` give zero/false,
//! `Bool` gives 0 or 1, numbers are cast with `as` (truncating and saturating
//! like any Rust numeric cast).

use crate::list::{MAX_RECURSION_DEPTH, SharedList, report_recursion_limit};
use std::fmt;

#[derive(Clone, Default)]
pub enum TaggedValue {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    List(SharedList),
}

/// Tag of a [`TaggedValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Nil,
    Bool,
    Int,
    Float,
    List,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Nil => "Nil",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::List => "List",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TaggedValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            TaggedValue::Nil => ValueType::Nil,
            TaggedValue::Bool(_) => ValueType::Bool,
            TaggedValue::Int(_) => ValueType::Int,
            TaggedValue::Float(_) => ValueType::Float,
            TaggedValue::List(_) => ValueType::List,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, TaggedValue::Nil)
    }

    pub fn as_list(&self) -> Option<&SharedList> {
        match self {
            TaggedValue::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn to_bool(&self) -> bool {
        match self {
            TaggedValue::Bool(b) => *b,
            TaggedValue::Int(i) => *i != 0,
            TaggedValue::Float(x) => *x != 0.0,
            TaggedValue::Nil | TaggedValue::List(_) => false,
        }
    }

    pub fn to_i64(&self) -> i64 {
        match self {
            TaggedValue::Bool(b) => *b as i64,
            TaggedValue::Int(i) => *i,
            TaggedValue::Float(x) => *x as i64,
            TaggedValue::Nil | TaggedValue::List(_) => 0,
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            TaggedValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            TaggedValue::Int(i) => *i as f64,
            TaggedValue::Float(x) => *x,
            TaggedValue::Nil | TaggedValue::List(_) => 0.0,
        }
    }

    /// Equality with a nesting budget.
    ///
    /// Different tags are never equal. Two `Nil`s are equal. Lists compare
    /// element by element through [`SharedList::is_equal`]; past
    /// `MAX_RECURSION_DEPTH` the comparison reports and gives up (false).
    pub fn hash_compare(&self, other: &TaggedValue, depth: usize) -> bool {
        if depth > MAX_RECURSION_DEPTH {
            report_recursion_limit("value comparison");
            return false;
        }
        match (self, other) {
            (TaggedValue::Nil, TaggedValue::Nil) => true,
            (TaggedValue::Bool(a), TaggedValue::Bool(b)) => a == b,
            (TaggedValue::Int(a), TaggedValue::Int(b)) => a == b,
            (TaggedValue::Float(a), TaggedValue::Float(b)) => a == b,
            (TaggedValue::List(a), TaggedValue::List(b)) => a.is_equal_at(b, depth),
            _ => false,
        }
    }

    pub(crate) fn fmt_at(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        match self {
            TaggedValue::Nil => f.write_str("<null>"),
            TaggedValue::Bool(b) => write!(f, "{}", b),
            TaggedValue::Int(i) => write!(f, "{}", i),
            TaggedValue::Float(x) => write!(f, "{}", x),
            TaggedValue::List(list) => list.fmt_at(f, depth),
        }
    }
}

impl PartialEq for TaggedValue {
    fn eq(&self, other: &TaggedValue) -> bool {
        self.hash_compare(other, 0)
    }
}

impl fmt::Display for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_at(f, 0)
    }
}

impl fmt::Debug for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaggedValue::Nil => f.write_str("Nil"),
            TaggedValue::Bool(b) => write!(f, "Bool({})", b),
            TaggedValue::Int(i) => write!(f, "Int({})", i),
            TaggedValue::Float(x) => write!(f, "Float({:?})", x),
            TaggedValue::List(list) => write!(f, "List({})", list),
        }
    }
}

// =============================================================================
// Conversions in
// =============================================================================

macro_rules! from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for TaggedValue {
                fn from(v: $t) -> Self {
                    TaggedValue::Int(v as i64)
                }
            }
        )*
    };
}

from_int!(i8, i16, i32, i64, u8, u16, u32, u64, isize, usize);

impl From<bool> for TaggedValue {
    fn from(v: bool) -> Self {
        TaggedValue::Bool(v)
    }
}

impl From<f32> for TaggedValue {
    fn from(v: f32) -> Self {
        TaggedValue::Float(v as f64)
    }
}

impl From<f64> for TaggedValue {
    fn from(v: f64) -> Self {
        TaggedValue::Float(v)
    }
}

impl From<SharedList> for TaggedValue {
    fn from(list: SharedList) -> Self {
        TaggedValue::List(list)
    }
}

impl From<&SharedList> for TaggedValue {
    fn from(list: &SharedList) -> Self {
        TaggedValue::List(list.clone())
    }
}

// =============================================================================
// Conversions out
// =============================================================================

macro_rules! into_int {
    ($($t:ty),*) => {
        $(
            impl From<&TaggedValue> for $t {
                fn from(v: &TaggedValue) -> $t {
                    match v {
                        TaggedValue::Float(x) => *x as $t,
                        other => other.to_i64() as $t,
                    }
                }
            }
        )*
    };
}

into_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl From<&TaggedValue> for bool {
    fn from(v: &TaggedValue) -> bool {
        v.to_bool()
    }
}

impl From<&TaggedValue> for f32 {
    fn from(v: &TaggedValue) -> f32 {
        v.to_f64() as f32
    }
}

impl From<&TaggedValue> for f64 {
    fn from(v: &TaggedValue) -> f64 {
        v.to_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_nil() {
        let v = TaggedValue::default();
        assert!(v.is_nil());
        assert_eq!(v.value_type(), ValueType::Nil);
        assert_eq!(v.to_string(), "<null>");
    }

    #[test]
    fn test_conversions_out() {
        assert_eq!(i64::from(&TaggedValue::Nil), 0);
        assert!(!bool::from(&TaggedValue::Nil));
        assert_eq!(u8::from(&TaggedValue::Bool(true)), 1);
        assert_eq!(f64::from(&TaggedValue::Bool(false)), 0.0);
        assert_eq!(i32::from(&TaggedValue::Float(2.9)), 2);
        assert_eq!(f32::from(&TaggedValue::Int(3)), 3.0);
        assert!(bool::from(&TaggedValue::Int(-1)));
        assert!(!bool::from(&TaggedValue::Float(0.0)));
        assert_eq!(i16::from(&TaggedValue::List(SharedList::new())), 0);
        // Narrowing wraps like `as`
        assert_eq!(u8::from(&TaggedValue::Int(300)), 44);
    }

    #[test]
    fn test_conversions_in() {
        assert_eq!(TaggedValue::from(7u8), TaggedValue::Int(7));
        assert_eq!(TaggedValue::from(-7i16), TaggedValue::Int(-7));
        assert_eq!(TaggedValue::from(1.5f32), TaggedValue::Float(1.5));
        assert_eq!(TaggedValue::from(true).value_type(), ValueType::Bool);
    }

    #[test]
    fn test_different_tags_never_equal() {
        assert_ne!(TaggedValue::Int(1), TaggedValue::Float(1.0));
        assert_ne!(TaggedValue::Int(0), TaggedValue::Bool(false));
        assert_ne!(TaggedValue::Nil, TaggedValue::Int(0));
        assert_eq!(TaggedValue::Nil, TaggedValue::Nil);
        assert_ne!(TaggedValue::Float(f64::NAN), TaggedValue::Float(f64::NAN));
    }

    #[test]
    fn test_list_values_alias_and_compare_deeply() {
        let list = SharedList::from_values([1.into(), 2.into()]);
        let a = TaggedValue::from(&list);
        let b = a.clone();
        list.append(3.into()).unwrap();
        assert_eq!(b.as_list().map(|l| l.len()), Some(3));

        let c = TaggedValue::from(SharedList::from_values([1.into(), 2.into(), 3.into()]));
        assert_eq!(a, c);
        assert_eq!(a.to_string(), "[1, 2, 3]");
        assert_eq!(format!("{:?}", c), "List([1, 2, 3])");
    }

    #[test]
    fn test_display_scalars() {
        assert_eq!(TaggedValue::Bool(true).to_string(), "true");
        assert_eq!(TaggedValue::Int(-4).to_string(), "-4");
        assert_eq!(TaggedValue::Float(0.25).to_string(), "0.25");
        assert_eq!(format!("{:?}", TaggedValue::Float(1.0)), "Float(1.0)");
        assert_eq!(ValueType::List.to_string(), "List");
    }

    #[test]
    fn test_depth_limit_stops_comparison() {
        assert!(!TaggedValue::Int(1).hash_compare(&TaggedValue::Int(1), MAX_RECURSION_DEPTH + 1));
        assert!(TaggedValue::Int(1).hash_compare(&TaggedValue::Int(1), MAX_RECURSION_DEPTH));
    }
}
