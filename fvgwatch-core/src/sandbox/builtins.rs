//! The functions a script can call. Nothing outside this table resolves.

use super::value::{broadcast, runtime, Operand, Value};
use super::ExecutionError;
use crate::series;

/// Every callable name. Scripts may not define functions with these names.
pub const BUILTINS: &[&str] = &[
    "rolling_mean",
    "rolling_std",
    "rolling_min",
    "rolling_max",
    "rolling_sum",
    "ewm_mean",
    "cumsum",
    "diff",
    "shift",
    "where",
    "fill_nan",
    "series",
    "abs",
    "min",
    "max",
    "sqrt",
    "round",
    "len",
    "range",
];

/// Longest series `range()` may materialise outside a `for` header.
pub const MAX_RANGE_LEN: usize = 1_000_000;

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ExecutionError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(runtime(format!(
            "{name}() takes {expected} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

/// A whole, non-negative count such as a window length.
pub(crate) fn count(value: &Value, what: &str) -> Result<usize, ExecutionError> {
    let n = value.as_number(what)?;
    if n.is_finite() && n >= 0.0 && n.fract() == 0.0 {
        Ok(n as usize)
    } else {
        Err(runtime(format!("{what} must be a non-negative whole number, got {n}")))
    }
}

fn window(value: &Value, name: &str) -> Result<usize, ExecutionError> {
    let n = count(value, &format!("{name}() window"))?;
    if n == 0 {
        return Err(runtime(format!("{name}() window must be at least 1")));
    }
    Ok(n)
}

fn lag(args: &[Value], name: &str) -> Result<i64, ExecutionError> {
    match args.get(1) {
        None => Ok(1),
        Some(v) => {
            let n = v.as_number(&format!("{name}() periods"))?;
            if n.is_finite() && n.fract() == 0.0 {
                Ok(n as i64)
            } else {
                Err(runtime(format!("{name}() periods must be a whole number, got {n}")))
            }
        }
    }
}

fn unary_math(args: &[Value], name: &str, f: fn(f64) -> f64) -> Result<Value, ExecutionError> {
    arity(name, args, 1, 1)?;
    broadcast(&[Operand::of(&args[0], &format!("{name}() argument"))?], |v| f(v[0]))
}

/// NaN-skipping fold over one series, NaN when nothing is left.
fn reduce(values: &[f64], f: fn(f64, f64) -> f64) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .reduce(f)
        .unwrap_or(f64::NAN)
}

fn extremum(args: &[Value], name: &str, f: fn(f64, f64) -> f64) -> Result<Value, ExecutionError> {
    arity(name, args, 1, 2)?;
    if args.len() == 1 {
        return Ok(Value::Number(reduce(
            args[0].as_series(&format!("{name}() argument"))?,
            f,
        )));
    }
    // NaN-propagating, so windows with gaps stay NaN.
    broadcast(
        &[
            Operand::of(&args[0], &format!("{name}() first argument"))?,
            Operand::of(&args[1], &format!("{name}() second argument"))?,
        ],
        |v| {
            if v[0].is_nan() || v[1].is_nan() {
                f64::NAN
            } else {
                f(v[0], v[1])
            }
        },
    )
}

fn range_series(args: &[Value]) -> Result<Value, ExecutionError> {
    arity("range", args, 1, 3)?;
    let nums = args
        .iter()
        .map(|a| a.as_number("range() bound"))
        .collect::<Result<Vec<f64>, _>>()?;
    let (start, end, step) = match nums.as_slice() {
        [end] => (0.0, *end, 1.0),
        [start, end] => (*start, *end, 1.0),
        [start, end, step] => (*start, *end, *step),
        _ => return Err(runtime("range() takes 1 to 3 arguments")),
    };
    let len = range_len(start, end, step)?;
    if len > MAX_RANGE_LEN {
        return Err(runtime(format!("range() of {len} elements exceeds {MAX_RANGE_LEN}")));
    }
    Ok(Value::Series(
        (0..len).map(|i| start + step * i as f64).collect(),
    ))
}

/// Number of elements in `range(start, end, step)`.
pub(crate) fn range_len(start: f64, end: f64, step: f64) -> Result<usize, ExecutionError> {
    if !(start.is_finite() && end.is_finite() && step.is_finite()) {
        return Err(runtime("range() bounds must be finite"));
    }
    if step == 0.0 {
        return Err(runtime("range() step must not be zero"));
    }
    let span = (end - start) / step;
    Ok(if span <= 0.0 { 0 } else { span.ceil() as usize })
}

/// Call builtin `name`. `buffer_len` sizes `series(value)`.
pub fn call(name: &str, args: &[Value], buffer_len: usize) -> Result<Value, ExecutionError> {
    match name {
        "rolling_mean" | "rolling_std" | "rolling_min" | "rolling_max" | "rolling_sum" => {
            arity(name, args, 2, 2)?;
            let values = args[0].as_series(&format!("{name}() input"))?;
            let n = window(&args[1], name)?;
            let out = match name {
                "rolling_mean" => series::rolling_mean(values, n),
                "rolling_std" => series::rolling_std(values, n),
                "rolling_min" => series::rolling_min(values, n),
                "rolling_max" => series::rolling_max(values, n),
                _ => series::rolling_sum(values, n),
            };
            Ok(Value::Series(out))
        }
        "ewm_mean" => {
            arity(name, args, 2, 2)?;
            let values = args[0].as_series("ewm_mean() input")?;
            let span = args[1].as_number("ewm_mean() span")?;
            if span.is_nan() || span < 1.0 {
                return Err(runtime(format!("ewm_mean() span must be >= 1, got {span}")));
            }
            Ok(Value::Series(series::ewm_mean(values, span)))
        }
        "cumsum" => {
            arity(name, args, 1, 1)?;
            Ok(Value::Series(series::cumsum(args[0].as_series("cumsum() input")?)))
        }
        "diff" => {
            arity(name, args, 1, 2)?;
            let values = args[0].as_series("diff() input")?;
            let periods = lag(args, name)?;
            if periods < 0 {
                return Err(runtime("diff() periods must not be negative"));
            }
            Ok(Value::Series(series::diff(values, periods as usize)))
        }
        "shift" => {
            arity(name, args, 1, 2)?;
            let values = args[0].as_series("shift() input")?;
            Ok(Value::Series(series::shift(values, lag(args, name)?)))
        }
        "where" => {
            arity(name, args, 3, 3)?;
            let ops = [
                Operand::of(&args[0], "where() condition")?,
                Operand::of(&args[1], "where() value if true")?,
                Operand::of(&args[2], "where() value if false")?,
            ];
            broadcast(&ops, |v| {
                if v[0] != 0.0 && !v[0].is_nan() {
                    v[1]
                } else {
                    v[2]
                }
            })
        }
        "fill_nan" => {
            arity(name, args, 2, 2)?;
            let values = args[0].as_series("fill_nan() input")?;
            let fill = args[1].as_number("fill_nan() value")?;
            Ok(Value::Series(series::fill_nan(values, fill)))
        }
        "series" => {
            arity(name, args, 1, 2)?;
            let fill = args[0].as_number("series() value")?;
            let len = match args.get(1) {
                Some(v) => count(v, "series() length")?,
                None => buffer_len,
            };
            if len > MAX_RANGE_LEN {
                return Err(runtime(format!("series() of {len} elements exceeds {MAX_RANGE_LEN}")));
            }
            Ok(Value::Series(vec![fill; len]))
        }
        "abs" => unary_math(args, name, f64::abs),
        "sqrt" => unary_math(args, name, f64::sqrt),
        "min" => extremum(args, name, f64::min),
        "max" => extremum(args, name, f64::max),
        "round" => {
            arity(name, args, 1, 2)?;
            let digits = match args.get(1) {
                Some(v) => v.as_number("round() digits")?,
                None => 0.0,
            };
            let scale = 10f64.powf(digits.trunc());
            broadcast(&[Operand::of(&args[0], "round() argument")?], |v| {
                (v[0] * scale).round() / scale
            })
        }
        "len" => {
            arity(name, args, 1, 1)?;
            args[0]
                .len()
                .map(|n| Value::Number(n as f64))
                .ok_or_else(|| runtime(format!("len() of {}", args[0].type_name())))
        }
        "range" => range_series(args),
        other => Err(runtime(format!("unknown function '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(values: &[f64]) -> Value {
        Value::Series(values.to_vec())
    }

    #[test]
    fn rolling_functions_dispatch() {
        let out = call("rolling_sum", &[s(&[1.0, 2.0, 3.0]), Value::Number(2.0)], 3).unwrap();
        let Value::Series(v) = out else { panic!() };
        assert!(v[0].is_nan());
        assert_eq!(v[1..], [3.0, 5.0]);
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(call("rolling_mean", &[s(&[1.0]), Value::Number(0.0)], 1).is_err());
        assert!(call("rolling_mean", &[s(&[1.0]), Value::Number(1.5)], 1).is_err());
    }

    #[test]
    fn where_broadcasts() {
        let out = call(
            "where",
            &[s(&[1.0, 0.0, f64::NAN]), s(&[10.0, 20.0, 30.0]), Value::Number(-1.0)],
            3,
        )
        .unwrap();
        assert_eq!(out, s(&[10.0, -1.0, -1.0]));
    }

    #[test]
    fn series_defaults_to_buffer_length() {
        assert_eq!(call("series", &[Value::Number(0.5)], 3).unwrap(), s(&[0.5; 3]));
        assert_eq!(
            call("series", &[Value::Number(1.0), Value::Number(2.0)], 3).unwrap(),
            s(&[1.0, 1.0])
        );
    }

    #[test]
    fn min_max_forms() {
        assert_eq!(
            call("max", &[Value::Number(2.0), Value::Number(5.0)], 0).unwrap(),
            Value::Number(5.0)
        );
        assert_eq!(
            call("min", &[s(&[3.0, f64::NAN, 1.0])], 0).unwrap(),
            Value::Number(1.0)
        );
        let Value::Series(v) = call("max", &[s(&[1.0, f64::NAN]), Value::Number(0.0)], 2).unwrap()
        else {
            panic!()
        };
        assert_eq!(v[0], 1.0);
        assert!(v[1].is_nan());
    }

    #[test]
    fn round_with_digits() {
        assert_eq!(
            call("round", &[Value::Number(3.14159), Value::Number(2.0)], 0).unwrap(),
            Value::Number(3.14)
        );
        assert_eq!(call("round", &[Value::Number(2.5)], 0).unwrap(), Value::Number(3.0));
    }

    #[test]
    fn range_as_series() {
        assert_eq!(call("range", &[Value::Number(3.0)], 0).unwrap(), s(&[0.0, 1.0, 2.0]));
        assert_eq!(
            call("range", &[Value::Number(5.0), Value::Number(0.0), Value::Number(-2.0)], 0)
                .unwrap(),
            s(&[5.0, 3.0, 1.0])
        );
        assert!(call("range", &[Value::Number(0.0), Value::Number(1e12)], 0).is_err());
        assert!(call("range", &[Value::Number(0.0), Value::Number(1.0), Value::Number(0.0)], 0).is_err());
    }

    #[test]
    fn arity_errors() {
        assert!(call("cumsum", &[], 0).is_err());
        assert!(call("abs", &[Value::Number(1.0), Value::Number(2.0)], 0).is_err());
    }

    #[test]
    fn names_outside_the_table_do_not_resolve() {
        assert!(!is_builtin("open"));
        assert!(!is_builtin("exec"));
        assert!(matches!(
            call("exec", &[], 0),
            Err(ExecutionError::Runtime(_))
        ));
    }
}
