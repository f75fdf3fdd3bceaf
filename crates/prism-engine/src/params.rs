use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::error::ProcessingError;

/// A validated parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// An integer.
    Int(i64),
    /// A real number.
    Float(f64),
    /// A flag.
    Bool(bool),
    /// One of the choices of an enum parameter.
    Choice(String),
    /// A dense matrix stored row by row.
    Matrix(Vec<Vec<f64>>),
    /// An absent value of a nullable parameter.
    Null,
}

/// Fixed precision float formatting used by canonical keys.
fn canonical_float(v: f64) -> String {
    // -0.0 and 0.0 must collide
    let v = if v == 0.0 { 0.0 } else { v };
    format!("{v:.5e}")
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => f.write_str(&canonical_float(*v)),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Choice(v) => f.write_str(v),
            Self::Matrix(rows) => {
                let rows = rows
                    .iter()
                    .map(|row| {
                        let row = row.iter().map(|v| canonical_float(*v)).collect::<Vec<_>>();
                        format!("[{}]", row.join(","))
                    })
                    .collect::<Vec<_>>();
                write!(f, "[{}]", rows.join(","))
            }
            Self::Null => f.write_str("null"),
        }
    }
}

/// The canonical string of a parameter set.
///
/// Lists every parameter sorted by name as `name=value`, joined by `;`.
pub fn canonical_string(params: &BTreeMap<&'static str, ParamValue>) -> String {
    params
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(";")
}

/// A parity constraint on integer parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// Any integer.
    Any,
    /// Odd integers only.
    Odd,
    /// Even integers only.
    Even,
}

/// The type and domain of a parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamKind {
    /// An integer in `[min, max]`.
    Int {
        /// Smallest allowed value.
        min: i64,
        /// Largest allowed value.
        max: i64,
        /// Increment suggested to form generators.
        step: i64,
        /// Parity constraint.
        parity: Parity,
    },
    /// A real number in `[min, max]`.
    Float {
        /// Smallest allowed value.
        min: f64,
        /// Largest allowed value.
        max: f64,
        /// Increment suggested to form generators.
        step: f64,
    },
    /// One of a fixed list of strings.
    Enum {
        /// The allowed values.
        choices: &'static [&'static str],
    },
    /// A flag.
    Bool,
    /// A `rows x cols` matrix with entries in `[min, max]`.
    Matrix {
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
        /// Smallest allowed entry.
        min: f64,
        /// Largest allowed entry.
        max: f64,
    },
}

/// The declaration of one operation parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    /// The parameter name.
    pub name: &'static str,
    /// The type and domain.
    #[serde(flatten)]
    pub kind: ParamKind,
    /// The value used when the parameter is omitted.
    pub default: ParamValue,
    /// Whether out of range values are clamped instead of rejected.
    pub clampable: bool,
    /// Whether `null` is accepted.
    pub nullable: bool,
}

impl ParamSpec {
    fn new(name: &'static str, kind: ParamKind, default: ParamValue) -> Self {
        Self {
            name,
            kind,
            default,
            clampable: false,
            nullable: false,
        }
    }

    /// An integer parameter.
    pub fn int(name: &'static str, min: i64, max: i64, default: i64) -> Self {
        let kind = ParamKind::Int {
            min,
            max,
            step: 1,
            parity: Parity::Any,
        };
        Self::new(name, kind, ParamValue::Int(default))
    }

    /// An odd integer parameter, such as a window size.
    pub fn odd(name: &'static str, min: i64, max: i64, default: i64) -> Self {
        let kind = ParamKind::Int {
            min,
            max,
            step: 2,
            parity: Parity::Odd,
        };
        Self::new(name, kind, ParamValue::Int(default))
    }

    /// An even integer parameter.
    pub fn even(name: &'static str, min: i64, max: i64, default: i64) -> Self {
        let kind = ParamKind::Int {
            min,
            max,
            step: 2,
            parity: Parity::Even,
        };
        Self::new(name, kind, ParamValue::Int(default))
    }

    /// A real parameter.
    pub fn float(name: &'static str, min: f64, max: f64, step: f64, default: f64) -> Self {
        let kind = ParamKind::Float { min, max, step };
        Self::new(name, kind, ParamValue::Float(default))
    }

    /// An enum parameter.
    pub fn choice(name: &'static str, choices: &'static [&'static str], default: &str) -> Self {
        Self::new(name, ParamKind::Enum { choices }, ParamValue::Choice(default.to_string()))
    }

    /// A flag.
    pub fn flag(name: &'static str, default: bool) -> Self {
        Self::new(name, ParamKind::Bool, ParamValue::Bool(default))
    }

    /// A matrix parameter.
    pub fn matrix(name: &'static str, min: f64, max: f64, default: Vec<Vec<f64>>) -> Self {
        let kind = ParamKind::Matrix {
            rows: default.len(),
            cols: default.first().map_or(0, Vec::len),
            min,
            max,
        };
        Self::new(name, kind, ParamValue::Matrix(default))
    }

    /// Mark the parameter as clamped to its range.
    pub fn clamped(mut self) -> Self {
        self.clampable = true;
        self
    }

    /// Mark the parameter as nullable with a `null` default.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self.default = ParamValue::Null;
        self
    }

    fn error(&self, detail: impl Into<String>) -> ProcessingError {
        ProcessingError::invalid_param(self.name, detail)
    }

    /// Coerce a raw JSON value into a value of this parameter.
    ///
    /// Numbers may be given as strings, flags as `"true"` or `"false"`.
    /// Out of range values are clamped for clampable parameters and rejected
    /// otherwise.
    pub fn coerce(&self, raw: &Value) -> Result<ParamValue, ProcessingError> {
        if raw.is_null() {
            return if self.nullable {
                Ok(ParamValue::Null)
            } else {
                Err(self.error("must not be null"))
            };
        }

        match &self.kind {
            ParamKind::Int {
                min,
                max,
                parity,
                ..
            } => {
                let v = self.coerce_int(raw)?;
                let v = if self.clampable { v.clamp(*min, *max) } else { v };
                if v < *min || v > *max {
                    return Err(self.error(format!("must be within [{min}, {max}], got {v}")));
                }
                match parity {
                    Parity::Odd if v % 2 == 0 => Err(self.error(format!("must be odd, got {v}"))),
                    Parity::Even if v % 2 != 0 => Err(self.error(format!("must be even, got {v}"))),
                    _ => Ok(ParamValue::Int(v)),
                }
            }
            ParamKind::Float { min, max, .. } => {
                let v = self.coerce_float(raw)?;
                let v = if self.clampable { v.clamp(*min, *max) } else { v };
                if v < *min || v > *max {
                    return Err(self.error(format!("must be within [{min}, {max}], got {v}")));
                }
                Ok(ParamValue::Float(v))
            }
            ParamKind::Enum { choices } => match raw.as_str() {
                Some(s) if choices.contains(&s) => Ok(ParamValue::Choice(s.to_string())),
                _ => Err(self.error(format!("must be one of {choices:?}, got {raw}"))),
            },
            ParamKind::Bool => match raw {
                Value::Bool(b) => Ok(ParamValue::Bool(*b)),
                Value::String(s) if s == "true" => Ok(ParamValue::Bool(true)),
                Value::String(s) if s == "false" => Ok(ParamValue::Bool(false)),
                _ => Err(self.error(format!("must be a boolean, got {raw}"))),
            },
            ParamKind::Matrix {
                rows,
                cols,
                min,
                max,
            } => {
                let shape_error = || self.error(format!("must be a {rows}x{cols} matrix"));
                let raw_rows = raw.as_array().ok_or_else(shape_error)?;
                if raw_rows.len() != *rows {
                    return Err(shape_error());
                }
                let mut matrix = Vec::with_capacity(*rows);
                for raw_row in raw_rows {
                    let raw_row = raw_row.as_array().ok_or_else(shape_error)?;
                    if raw_row.len() != *cols {
                        return Err(shape_error());
                    }
                    let row = raw_row
                        .iter()
                        .map(|v| {
                            let v = self.coerce_float(v)?;
                            if v < *min || v > *max {
                                return Err(self.error(format!(
                                    "entries must be within [{min}, {max}], got {v}"
                                )));
                            }
                            Ok(v)
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    matrix.push(row);
                }
                Ok(ParamValue::Matrix(matrix))
            }
        }
    }

    fn coerce_float(&self, raw: &Value) -> Result<f64, ProcessingError> {
        let v = match raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match v {
            Some(v) if v.is_finite() => Ok(v),
            _ => Err(self.error(format!("must be a finite number, got {raw}"))),
        }
    }

    fn coerce_int(&self, raw: &Value) -> Result<i64, ProcessingError> {
        if let Some(v) = raw.as_i64() {
            return Ok(v);
        }
        if let Value::String(s) = raw {
            if let Ok(v) = s.trim().parse::<i64>() {
                return Ok(v);
            }
        }
        let v = self
            .coerce_float(raw)
            .map_err(|_| self.error(format!("must be an integer, got {raw}")))?;
        if v.fract() != 0.0 || v.abs() > i64::MAX as f64 {
            return Err(self.error(format!("must be an integer, got {raw}")));
        }
        Ok(v as i64)
    }
}

/// A complete set of validated parameters, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSet(pub(crate) BTreeMap<&'static str, ParamValue>);

impl ParamSet {
    fn get(&self, name: &'static str) -> Result<&ParamValue, ProcessingError> {
        self.0
            .get(name)
            .ok_or_else(|| ProcessingError::invalid_param(name, "missing value"))
    }

    fn mismatch(name: &'static str, expected: &str) -> ProcessingError {
        ProcessingError::invalid_param(name, format!("expected {expected}"))
    }

    pub(crate) fn int(&self, name: &'static str) -> Result<i64, ProcessingError> {
        match self.get(name)? {
            ParamValue::Int(v) => Ok(*v),
            _ => Err(Self::mismatch(name, "an integer")),
        }
    }

    pub(crate) fn usize(&self, name: &'static str) -> Result<usize, ProcessingError> {
        usize::try_from(self.int(name)?).map_err(|_| Self::mismatch(name, "a non-negative integer"))
    }

    pub(crate) fn float(&self, name: &'static str) -> Result<f64, ProcessingError> {
        match self.get(name)? {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            _ => Err(Self::mismatch(name, "a number")),
        }
    }

    pub(crate) fn opt_float(&self, name: &'static str) -> Result<Option<f64>, ProcessingError> {
        match self.get(name)? {
            ParamValue::Null => Ok(None),
            _ => self.float(name).map(Some),
        }
    }

    pub(crate) fn opt_u64(&self, name: &'static str) -> Result<Option<u64>, ProcessingError> {
        match self.get(name)? {
            ParamValue::Null => Ok(None),
            _ => u64::try_from(self.int(name)?)
                .map(Some)
                .map_err(|_| Self::mismatch(name, "a non-negative integer")),
        }
    }

    pub(crate) fn flag(&self, name: &'static str) -> Result<bool, ProcessingError> {
        match self.get(name)? {
            ParamValue::Bool(v) => Ok(*v),
            _ => Err(Self::mismatch(name, "a boolean")),
        }
    }

    pub(crate) fn choice(&self, name: &'static str) -> Result<&str, ProcessingError> {
        match self.get(name)? {
            ParamValue::Choice(v) => Ok(v),
            _ => Err(Self::mismatch(name, "a string")),
        }
    }

    pub(crate) fn matrix(&self, name: &'static str) -> Result<&[Vec<f64>], ProcessingError> {
        match self.get(name)? {
            ParamValue::Matrix(v) => Ok(v),
            _ => Err(Self::mismatch(name, "a matrix")),
        }
    }
}
