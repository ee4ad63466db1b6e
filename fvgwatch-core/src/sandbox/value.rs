//! Runtime values and elementwise operators.

use std::rc::Rc;

use super::ast::BinaryOp;
use super::ExecutionError;
use crate::domain::Candle;

/// Read-only OHLCV columns handed to `calculate` as its first argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl Buffer {
    pub const COLUMNS: [&'static str; 5] = ["open", "high", "low", "close", "volume"];

    pub fn from_candles(candles: &[Candle]) -> Self {
        Self {
            open: candles.iter().map(|c| c.open).collect(),
            high: candles.iter().map(|c| c.high).collect(),
            low: candles.iter().map(|c| c.low).collect(),
            close: candles.iter().map(|c| c.close).collect(),
            volume: candles.iter().map(|c| c.volume).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        match name {
            "open" => Some(&self.open),
            "high" => Some(&self.high),
            "low" => Some(&self.low),
            "close" => Some(&self.close),
            "volume" => Some(&self.volume),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Number(f64),
    Bool(bool),
    Series(Vec<f64>),
    Buffer(Rc<Buffer>),
    Map(Vec<(String, Value)>),
}

pub(crate) fn runtime(message: impl Into<String>) -> ExecutionError {
    ExecutionError::Runtime(message.into())
}

/// Truthiness of one series element: non-zero and not NaN.
fn flag(x: f64) -> bool {
    x != 0.0 && !x.is_nan()
}

fn from_flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nothing",
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Series(_) => "series",
            Value::Buffer(_) => "buffer",
            Value::Map(_) => "map",
        }
    }

    /// Scalar view; bools count as 1/0.
    pub fn as_number(&self, what: &str) -> Result<f64, ExecutionError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Bool(b) => Ok(from_flag(*b)),
            other => Err(runtime(format!(
                "{what} must be a number, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn as_series(&self, what: &str) -> Result<&[f64], ExecutionError> {
        match self {
            Value::Series(values) => Ok(values),
            other => Err(runtime(format!(
                "{what} must be a series, got {}",
                other.type_name()
            ))),
        }
    }

    /// Condition value for `if` / `while`.
    pub fn truthy(&self) -> Result<bool, ExecutionError> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Number(n) => Ok(flag(*n)),
            Value::Series(_) => Err(runtime(
                "a series has no single truth value; index it or use where()",
            )),
            other => Err(runtime(format!(
                "{} cannot be used as a condition",
                other.type_name()
            ))),
        }
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Series(values) => Some(values.len()),
            Value::Buffer(buf) => Some(buf.len()),
            Value::Map(entries) => Some(entries.len()),
            _ => None,
        }
    }
}

/// Either a scalar or a series, for broadcasting.
pub(crate) enum Operand<'a> {
    Scalar(f64),
    Series(&'a [f64]),
}

impl<'a> Operand<'a> {
    pub(crate) fn of(value: &'a Value, what: &str) -> Result<Self, ExecutionError> {
        match value {
            Value::Series(values) => Ok(Operand::Series(values)),
            other => Ok(Operand::Scalar(other.as_number(what)?)),
        }
    }

    fn at(&self, i: usize) -> f64 {
        match self {
            Operand::Scalar(x) => *x,
            Operand::Series(values) => values[i],
        }
    }
}

/// Apply `f` elementwise, broadcasting scalars. Two series must match in
/// length.
pub(crate) fn broadcast(
    operands: &[Operand<'_>],
    f: impl Fn(&[f64]) -> f64,
) -> Result<Value, ExecutionError> {
    let mut len: Option<usize> = None;
    for op in operands {
        if let Operand::Series(values) = op {
            match len {
                Some(n) if n != values.len() => {
                    return Err(runtime(format!(
                        "series length mismatch: {n} vs {}",
                        values.len()
                    )))
                }
                _ => len = Some(values.len()),
            }
        }
    }

    let mut scratch = vec![0.0; operands.len()];
    match len {
        None => {
            for (slot, op) in scratch.iter_mut().zip(operands) {
                *slot = op.at(0);
            }
            Ok(Value::Number(f(&scratch)))
        }
        Some(n) => {
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                for (slot, op) in scratch.iter_mut().zip(operands) {
                    *slot = op.at(i);
                }
                out.push(f(&scratch));
            }
            Ok(Value::Series(out))
        }
    }
}

/// Evaluate a non-short-circuit binary operator.
pub fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, ExecutionError> {
    let scalar_only = !matches!(lhs, Value::Series(_)) && !matches!(rhs, Value::Series(_));

    // Bool == bool stays boolean.
    if let (Value::Bool(a), Value::Bool(b)) = (lhs, rhs) {
        match op {
            BinaryOp::Eq => return Ok(Value::Bool(a == b)),
            BinaryOp::Ne => return Ok(Value::Bool(a != b)),
            _ => {}
        }
    }

    let operands = [
        Operand::of(lhs, "left operand")?,
        Operand::of(rhs, "right operand")?,
    ];
    let result = broadcast(&operands, |v| {
        let (a, b) = (v[0], v[1]);
        match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Rem => a % b,
            BinaryOp::Eq => from_flag(a == b),
            BinaryOp::Ne => from_flag(a != b),
            BinaryOp::Lt => from_flag(a < b),
            BinaryOp::Le => from_flag(a <= b),
            BinaryOp::Gt => from_flag(a > b),
            BinaryOp::Ge => from_flag(a >= b),
            BinaryOp::And => from_flag(flag(a) && flag(b)),
            BinaryOp::Or => from_flag(flag(a) || flag(b)),
        }
    })?;

    let is_predicate = matches!(
        op,
        BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::And
            | BinaryOp::Or
    );
    Ok(match result {
        Value::Number(x) if scalar_only && is_predicate => Value::Bool(flag(x)),
        other => other,
    })
}

pub fn negate(value: &Value) -> Result<Value, ExecutionError> {
    broadcast(&[Operand::of(value, "operand of '-'")?], |v| -v[0])
}

pub fn not(value: &Value) -> Result<Value, ExecutionError> {
    match value {
        Value::Series(values) => Ok(Value::Series(
            values.iter().map(|&x| from_flag(!flag(x))).collect(),
        )),
        other => Ok(Value::Bool(!other.truthy()?)),
    }
}
