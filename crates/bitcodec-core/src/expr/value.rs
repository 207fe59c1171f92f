//! Runtime values produced and consumed by the expression evaluator.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Bytes(Vec<u8>),
}

#[derive(Debug, Error, PartialEq)]
pub enum ValueError {
    #[error("expected a {expected} value, got {got}")]
    WrongType { expected: &'static str, got: &'static str },
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::Bytes(_) => "bytes",
        }
    }

    pub fn as_f64(&self) -> Result<f64, ValueError> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => parse_numeric_str(s).ok_or(ValueError::WrongType { expected: "numeric", got: "string" }),
            Value::Bytes(_) => Err(ValueError::WrongType { expected: "numeric", got: "bytes" }),
        }
    }

    pub fn as_i64(&self) -> Result<i64, ValueError> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Float(f) => Ok(*f as i64),
            Value::Bool(b) => Ok(if *b { 1 } else { 0 }),
            Value::Str(s) => parse_numeric_str(s)
                .map(|f| f as i64)
                .ok_or(ValueError::WrongType { expected: "numeric", got: "string" }),
            Value::Bytes(_) => Err(ValueError::WrongType { expected: "numeric", got: "bytes" }),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ValueError> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::Float(f) => Ok(*f != 0.0),
            Value::Str(s) => Ok(!s.is_empty()),
            Value::Bytes(b) => Ok(!b.is_empty()),
        }
    }

    pub fn as_str(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Bytes(b) => bitcodec_support::hex::format_hex_bytes(b),
        }
    }

    /// `true` when either operand of a binary arithmetic op should force
    /// float math (spec §9 numeric coercion: "widest matching numeric type
    /// (signed 64-bit integer, else 64-bit float)").
    pub fn is_float_leaning(&self) -> bool {
        matches!(self, Value::Float(_)) || matches!(self, Value::Str(s) if s.contains('.') && parse_numeric_str(s).is_some())
    }
}

/// Parses a numeric string the way the engine's numeric coercion does:
/// decimal, `0x…` hex, or a trailing `H` hex suffix (spec §4.2 UINT parsing).
///
/// Goes through `f64`, so integers above 2^53 lose precision; callers that
/// need an exact 64-bit integer (the UINT/INT codecs, which both support
/// full 64-bit-wide fields) should use [`parse_u64_str`]/[`parse_i64_str`]
/// instead.
pub fn parse_numeric_str(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().map(|v| v as f64);
    }
    if let Some(hex) = s.strip_suffix('H').or_else(|| s.strip_suffix('h')) {
        return u64::from_str_radix(hex, 16).ok().map(|v| v as f64);
    }
    s.parse::<f64>().ok()
}

/// Same literal grammar as [`parse_numeric_str`], parsed directly into a
/// `u64` with no `f64` round trip, so a 64-bit-wide UINT literal above 2^53
/// encodes exactly instead of rounding to the nearest representable float.
pub fn parse_u64_str(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }
    if let Some(hex) = s.strip_suffix('H').or_else(|| s.strip_suffix('h')) {
        return u64::from_str_radix(hex, 16).ok();
    }
    s.parse::<u64>().ok()
}

/// Signed counterpart of [`parse_u64_str`], for the INT codec.
pub fn parse_i64_str(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().map(|v| v as i64);
    }
    if let Some(hex) = s.strip_suffix('H').or_else(|| s.strip_suffix('h')) {
        return u64::from_str_radix(hex, 16).ok().map(|v| v as i64);
    }
    s.parse::<i64>().ok()
}
