use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A stable identifier for a live object.
///
/// Handles are non-owning: copying one copies the integer, and a handle may
/// outlive its object (lookups on a dead handle simply miss). Handle 0 is
/// reserved as the null handle and never identifies an object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle(u32);

impl Handle {
    pub const NULL: Handle = Handle(0);

    pub fn from_raw(raw: u32) -> Self {
        Handle(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A VM value.
///
/// Every script-visible datum lives in one of these cells: the stack, the
/// per-object heaps, program constant pools and native-method parameters all
/// share this type. `Clone` is the deep copy: a string cell duplicates its
/// bytes so every cell owns its string, while an object-handle cell copies
/// just the integer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Variant {
    #[default]
    Null,
    Number(f64),
    Boolean(bool),
    String(String),
    ObjectHandle(Handle),
}

impl Variant {
    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Variant::Number(_))
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Variant::Boolean(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Variant::String(_))
    }

    pub fn is_objecthandle(&self) -> bool {
        matches!(self, Variant::ObjectHandle(_))
    }

    pub fn set_null(&mut self) {
        *self = Variant::Null;
    }

    pub fn set_number(&mut self, value: f64) {
        *self = Variant::Number(value);
    }

    pub fn set_boolean(&mut self, value: bool) {
        *self = Variant::Boolean(value);
    }

    pub fn set_string(&mut self, value: impl Into<String>) {
        *self = Variant::String(value.into());
    }

    pub fn set_objecthandle(&mut self, handle: Handle) {
        *self = Variant::ObjectHandle(handle);
    }

    /// Overwrites this cell with a deep copy of `other`, releasing whatever
    /// the cell held before.
    pub fn copy_from(&mut self, other: &Variant) {
        *self = other.clone();
    }

    /// Exchanges two cells in place, without allocating.
    pub fn swap(&mut self, other: &mut Variant) {
        std::mem::swap(self, other);
    }

    /// Numeric coercion.
    ///
    /// Strings are parsed; a malformed string yields NaN (the recoverable
    /// type-coercion sentinel), never an error. Handles have no numeric
    /// interpretation and also coerce to NaN.
    pub fn as_number(&self) -> f64 {
        match self {
            Variant::Null => 0.0,
            Variant::Number(n) => *n,
            Variant::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Variant::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
            Variant::ObjectHandle(_) => f64::NAN,
        }
    }

    /// String coercion. Numbers are formatted with the minimum unambiguous
    /// precision: integral values print without a fractional part, everything
    /// else uses the shortest representation that round-trips.
    pub fn as_string(&self) -> String {
        match self {
            Variant::Null => "null".to_string(),
            Variant::Number(n) => format_number(*n),
            Variant::Boolean(b) => b.to_string(),
            Variant::String(s) => s.clone(),
            Variant::ObjectHandle(h) => format!("[object {}]", h),
        }
    }

    pub fn as_boolean(&self) -> bool {
        match self {
            Variant::Null => false,
            Variant::Number(n) => *n != 0.0 && !n.is_nan(),
            Variant::Boolean(b) => *b,
            Variant::String(s) => !s.is_empty(),
            Variant::ObjectHandle(h) => !h.is_null(),
        }
    }

    pub fn as_handle(&self) -> Handle {
        match self {
            Variant::ObjectHandle(h) => *h,
            _ => Handle::NULL,
        }
    }

    /// Total ordering between any two cells.
    ///
    /// Same-variant comparisons use the natural order (numeric, lexicographic,
    /// false < true, handle integer). Mixed variants coerce: if either side is
    /// a string both sides compare as strings, otherwise both compare as
    /// numbers. NaN orders after every other number so the ordering stays
    /// total; comparison itself never fails.
    pub fn compare(&self, other: &Variant) -> Ordering {
        use Variant::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Number(a), Number(b)) => compare_numbers(*a, *b),
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (ObjectHandle(a), ObjectHandle(b)) => a.cmp(b),
            _ if self.is_string() || other.is_string() => self.as_string().cmp(&other.as_string()),
            _ => compare_numbers(self.as_number(), other.as_number()),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => write!(f, "null"),
            Variant::Number(n) => write!(f, "{}", format_number(*n)),
            Variant::Boolean(b) => write!(f, "{}", b),
            Variant::String(s) => write!(f, "{:?}", s),
            Variant::ObjectHandle(h) => write!(f, "[object {}]", h),
        }
    }
}

fn compare_numbers(a: f64, b: f64) -> Ordering {
    match a.partial_cmp(&b) {
        Some(ord) => ord,
        None => match (a.is_nan(), b.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => Ordering::Equal,
        },
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    // 2^53: above this every f64 is integral anyway and i64 formatting
    // would start lying about precision
    if n == n.trunc() && n.abs() < 9007199254740992.0 {
        return format!("{}", n as i64);
    }
    format!("{}", n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_to_number_parses_or_yields_nan() {
        assert_eq!(Variant::String("42.5".into()).as_number(), 42.5);
        assert_eq!(Variant::String("  7 ".into()).as_number(), 7.0);
        assert!(Variant::String("seven".into()).as_number().is_nan());
        assert!(Variant::String("".into()).as_number().is_nan());
    }

    #[test]
    fn number_to_string_uses_minimum_precision() {
        assert_eq!(Variant::Number(3.0).as_string(), "3");
        assert_eq!(Variant::Number(-0.0).as_string(), "0");
        assert_eq!(Variant::Number(0.5).as_string(), "0.5");
        assert_eq!(Variant::Number(f64::NAN).as_string(), "nan");
    }

    #[test]
    fn clone_is_a_deep_copy_for_strings() {
        let a = Variant::String("owned".into());
        let mut b = a.clone();
        b.set_string("changed");
        assert_eq!(a.as_string(), "owned");
    }

    #[test]
    fn same_variant_comparison_is_natural() {
        assert_eq!(Variant::Number(1.0).compare(&Variant::Number(2.0)), Ordering::Less);
        assert_eq!(
            Variant::String("abc".into()).compare(&Variant::String("abd".into())),
            Ordering::Less
        );
        assert_eq!(
            Variant::Boolean(false).compare(&Variant::Boolean(true)),
            Ordering::Less
        );
        assert_eq!(Variant::Null.compare(&Variant::Null), Ordering::Equal);
    }

    #[test]
    fn mixed_comparison_coerces_toward_number_then_string() {
        // numeric coercion: true == 1
        assert_eq!(Variant::Boolean(true).compare(&Variant::Number(1.0)), Ordering::Equal);
        // a string operand forces string comparison
        assert_eq!(
            Variant::Number(2.0).compare(&Variant::String("2".into())),
            Ordering::Equal
        );
        assert_eq!(
            Variant::Number(10.0).compare(&Variant::String("9".into())),
            Ordering::Less
        );
    }

    #[test]
    fn swap_exchanges_cells_in_place() {
        let mut a = Variant::Number(1.0);
        let mut b = Variant::String("x".into());
        a.swap(&mut b);
        assert_eq!(a.as_string(), "x");
        assert_eq!(b.as_number(), 1.0);
    }

    #[test]
    fn serde_round_trip() {
        let v = Variant::String("persisted".into());
        let json = serde_json::to_string(&v).unwrap();
        let back: Variant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
