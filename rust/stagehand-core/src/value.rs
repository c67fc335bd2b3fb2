//! Dynamically-typed scalar values and their coercion rules.
//!
//! A [`Value`] is one of a number, a boolean, a string, or one of the three
//! special numbers `Infinity`, `-Infinity` and `NaN`. Every operation on it is
//! total: mismatched operands are coerced, and anything without a sensible
//! answer degrades to `0`, `false` or `NaN` instead of failing.
//!
//! Strings that look like numbers are not kept as strings. Construction runs
//! the numeric-literal grammar over the text and stores the parsed number
//! instead, so `Value::from("3.5")` is the number `3.5`.

use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Rem, Sub};

/// Largest magnitude for which every integer is exactly representable in an
/// `f64`; operands below it take the integer arithmetic path.
const EXACT_INT_LIMIT: f64 = 9_007_199_254_740_992.0;

// ---------------------------------------------------------------------------
// ValueType
// ---------------------------------------------------------------------------

/// Discriminant of a [`Value`], useful for logging and dispatch tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Number,
    Bool,
    String,
    Infinity,
    NegativeInfinity,
    NaN,
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A dynamically-typed scalar.
///
/// `Number` always holds a finite float; non-finite results are classified
/// into `Infinity`, `NegativeInfinity` or `NaN` when the value is built.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "Literal")]
pub enum Value {
    Number(f64),
    Bool(bool),
    String(String),
    Infinity,
    NegativeInfinity,
    NaN,
}

/// The shapes a value can take in serialized form.
#[derive(Deserialize)]
#[serde(untagged)]
enum Literal {
    Number(f64),
    Bool(bool),
    String(String),
}

impl From<Literal> for Value {
    fn from(literal: Literal) -> Self {
        match literal {
            Literal::Number(n) => Value::from(n),
            Literal::Bool(b) => Value::Bool(b),
            Literal::String(s) => Value::from(s),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::String(s) => serializer.serialize_str(s),
            _ => serializer.serialize_str(&self.to_string()),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Number(0.0)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        if n.is_nan() {
            Value::NaN
        } else if n == f64::INFINITY {
            Value::Infinity
        } else if n == f64::NEG_INFINITY {
            Value::NegativeInfinity
        } else {
            Value::Number(n)
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        match parse_number(&s) {
            Some(n) => Value::from(n),
            None => Value::String(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        match parse_number(s) {
            Some(n) => Value::from(n),
            None => Value::String(s.to_string()),
        }
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Number(_) => ValueType::Number,
            Value::Bool(_) => ValueType::Bool,
            Value::String(_) => ValueType::String,
            Value::Infinity => ValueType::Infinity,
            Value::NegativeInfinity => ValueType::NegativeInfinity,
            Value::NaN => ValueType::NaN,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_infinity(&self) -> bool {
        matches!(self, Value::Infinity)
    }

    pub fn is_negative_infinity(&self) -> bool {
        matches!(self, Value::NegativeInfinity)
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Value::NaN)
    }

    /// Whether the value reads as a number in a numeric context without
    /// falling back to the default `0`.
    pub fn is_valid_number(&self) -> bool {
        match self {
            Value::Number(_) | Value::Bool(_) | Value::Infinity | Value::NegativeInfinity => true,
            Value::NaN => false,
            Value::String(s) => parse_number(s).is_some_and(|n| !n.is_nan()),
        }
    }

    /// The exact integer behind a number, if it has no fractional part and
    /// fits the integer fast path.
    fn as_exact_int(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.abs() < EXACT_INT_LIMIT => Some(*n as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    // -- conversions --------------------------------------------------------

    /// Truncating integer conversion. The infinities and `NaN` become `0`.
    pub fn to_long(&self) -> i64 {
        match self {
            Value::Number(n) => *n as i64,
            Value::Bool(b) => i64::from(*b),
            Value::String(s) => parse_number(s)
                .filter(|n| n.is_finite())
                .map_or(0, |n| n as i64),
            Value::Infinity | Value::NegativeInfinity | Value::NaN => 0,
        }
    }

    /// Truncating 32-bit conversion with the same rules as [`Value::to_long`].
    pub fn to_int(&self) -> i32 {
        match self {
            Value::Number(n) => *n as i32,
            Value::Bool(b) => i32::from(*b),
            Value::String(s) => parse_number(s)
                .filter(|n| n.is_finite())
                .map_or(0, |n| n as i32),
            Value::Infinity | Value::NegativeInfinity | Value::NaN => 0,
        }
    }

    pub fn to_double(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::String(s) => parse_number(s)
                .filter(|n| !n.is_nan())
                .unwrap_or(0.0),
            Value::Infinity => f64::INFINITY,
            Value::NegativeInfinity => f64::NEG_INFINITY,
            Value::NaN => 0.0,
        }
    }

    pub fn to_bool(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::Bool(b) => *b,
            Value::String(s) => !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")),
            Value::Infinity | Value::NegativeInfinity => true,
            Value::NaN => false,
        }
    }

    // -- arithmetic ---------------------------------------------------------

    pub fn add(&self, rhs: &Value) -> Value {
        if let (Some(a), Some(b)) = (self.as_exact_int(), rhs.as_exact_int()) {
            if let Some(sum) = a.checked_add(b) {
                return Value::Number(sum as f64);
            }
        }
        Value::from(self.to_double() + rhs.to_double())
    }

    pub fn subtract(&self, rhs: &Value) -> Value {
        if let (Some(a), Some(b)) = (self.as_exact_int(), rhs.as_exact_int()) {
            if let Some(diff) = a.checked_sub(b) {
                return Value::Number(diff as f64);
            }
        }
        Value::from(self.to_double() - rhs.to_double())
    }

    pub fn multiply(&self, rhs: &Value) -> Value {
        if let (Some(a), Some(b)) = (self.as_exact_int(), rhs.as_exact_int()) {
            if let Some(product) = a.checked_mul(b) {
                return Value::Number(product as f64);
            }
        }
        Value::from(self.to_double() * rhs.to_double())
    }

    /// Division; `0 / 0` is `NaN` and a nonzero dividend over zero is the
    /// infinity carrying the combined sign.
    pub fn divide(&self, rhs: &Value) -> Value {
        Value::from(self.to_double() / rhs.to_double())
    }

    /// Floored modulo: the result takes the sign of the divisor. A zero or
    /// infinite divisor involving an infinite dividend yields `NaN`.
    pub fn modulo(&self, rhs: &Value) -> Value {
        if let (Some(a), Some(b)) = (self.as_exact_int(), rhs.as_exact_int()) {
            if b == 0 {
                return Value::NaN;
            }
            if let Some(mut rem) = a.checked_rem(b) {
                if rem != 0 && (rem < 0) != (b < 0) {
                    rem += b;
                }
                return Value::Number(rem as f64);
            }
        }
        let divisor = rhs.to_double();
        let mut rem = self.to_double() % divisor;
        if rem / divisor < 0.0 {
            rem += divisor;
        }
        Value::from(rem)
    }

    // -- comparison ---------------------------------------------------------

    /// Language equality: numeric where both sides are numeric, otherwise a
    /// case-insensitive comparison of the rendered strings. `NaN` equals
    /// nothing.
    pub fn equals(&self, other: &Value) -> bool {
        if self.is_nan() || other.is_nan() {
            return false;
        }
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Infinity, Value::Infinity)
            | (Value::NegativeInfinity, Value::NegativeInfinity) => true,
            (Value::String(a), Value::String(b)) => eq_ignore_case(a, b),
            _ if self.is_string() || other.is_string() => {
                eq_ignore_case(&self.to_string(), &other.to_string())
            }
            _ => self.to_double() == other.to_double(),
        }
    }

    /// Ordering used by `<` and `>`; `None` when either side is `NaN`.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if self.is_nan() || other.is_nan() {
            return None;
        }
        if self.is_string() || other.is_string() {
            let a = self.to_string();
            let b = other.to_string();
            return Some(
                a.chars()
                    .flat_map(char::to_lowercase)
                    .cmp(b.chars().flat_map(char::to_lowercase)),
            );
        }
        self.to_double().partial_cmp(&other.to_double())
    }

    pub fn less_than(&self, other: &Value) -> bool {
        self.compare(other) == Some(Ordering::Less)
    }

    pub fn greater_than(&self, other: &Value) -> bool {
        self.compare(other) == Some(Ordering::Greater)
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Bool(b) => write!(f, "{}", b),
            Value::String(s) => f.write_str(s),
            Value::Infinity => f.write_str("Infinity"),
            Value::NegativeInfinity => f.write_str("-Infinity"),
            Value::NaN => f.write_str("NaN"),
        }
    }
}

/// Shortest round-trip rendering, switching to exponent form outside
/// `[1e-6, 1e21)` the way the source language prints numbers.
fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return format!("{}", n);
    }
    let rendered = format!("{:e}", n);
    match rendered.split_once('e') {
        Some((mantissa, exp)) if exp.starts_with('-') => format!("{}e{}", mantissa, exp),
        Some((mantissa, exp)) => format!("{}e+{}", mantissa, exp),
        None => rendered,
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

// ---------------------------------------------------------------------------
// Numeric literal grammar
// ---------------------------------------------------------------------------

/// Parse text with the numeric-literal grammar.
///
/// Accepts an optional sign, digits with at most one `.` (so `.5` and `5.`
/// both parse), an optional exponent, unsigned `0x`/`0o`/`0b` radix forms and
/// the exact tokens `Infinity`, `-Infinity` and `NaN`. Surrounding whitespace
/// is not accepted.
pub fn parse_number(text: &str) -> Option<f64> {
    match text {
        "" => return None,
        "Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        "NaN" => return Some(f64::NAN),
        _ => {}
    }

    if let Some(n) = parse_radix(text) {
        return Some(n);
    }

    let (negative, body) = match text.as_bytes()[0] {
        b'+' => (false, &text[1..]),
        b'-' => (true, &text[1..]),
        _ => (false, text),
    };
    if !is_decimal_literal(body) {
        return None;
    }
    let n: f64 = body.parse().ok()?;
    Some(if negative { -n } else { n })
}

fn parse_radix(text: &str) -> Option<f64> {
    let (radix, digits) = match text.get(..2)? {
        "0x" | "0X" => (16, &text[2..]),
        "0o" | "0O" => (8, &text[2..]),
        "0b" | "0B" => (2, &text[2..]),
        _ => return None,
    };
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, radix).ok().map(|n| n as f64)
}

fn is_decimal_literal(body: &str) -> bool {
    let bytes = body.as_bytes();
    let mut i = 0;
    let mut digits = 0;
    let mut seen_dot = false;
    while i < bytes.len() {
        match bytes[i] {
            b'0'..=b'9' => digits += 1,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        i += 1;
    }
    if digits == 0 {
        return false;
    }
    if i == bytes.len() {
        return true;
    }
    if bytes[i] != b'e' && bytes[i] != b'E' {
        return false;
    }
    i += 1;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let exponent_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    i > exponent_start && i == bytes.len()
}

// ---------------------------------------------------------------------------
// Operator traits
// ---------------------------------------------------------------------------

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other)
    }
}

macro_rules! binary_operator {
    ($trait:ident, $method:ident, $impl_fn:ident) => {
        impl $trait<&Value> for &Value {
            type Output = Value;
            fn $method(self, rhs: &Value) -> Value {
                Value::$impl_fn(self, rhs)
            }
        }
    };
}

binary_operator!(Add, add, add);
binary_operator!(Sub, sub, subtract);
binary_operator!(Mul, mul, multiply);
binary_operator!(Div, div, divide);
binary_operator!(Rem, rem, modulo);
