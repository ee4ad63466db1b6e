//! Restricted interpreter for user-authored indicator scripts.
//!
//! A script defines `fn calculate(buf, name = default, ...)` and returns
//! either one series the length of the buffer or a `{ name: series, ... }`
//! map of them. The only names a script can reach are its own locals and
//! functions, the buffer columns, the functions in [`builtins::BUILTINS`] and
//! the constant `nan`. There is no I/O, no imports and no reflection, so the
//! capability surface is exactly that list.
//!
//! ```text
//! fn calculate(buf, period = 20, mult = 2) {
//!     let mid = rolling_mean(buf.close, period);
//!     let sd = rolling_std(buf.close, period);
//!     return { upper: mid + sd * mult, middle: mid, lower: mid - sd * mult };
//! }
//! ```
//!
//! Execution is bounded by [`SandboxLimits`]: a step budget, a wall-clock
//! timeout and a call-depth limit. Failures come back as [`ExecutionError`]
//! values; a script can never panic the host.

pub mod ast;
pub mod builtins;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod value;

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use crate::domain::Candle;
use crate::indicators::Params;
use crate::series::SeriesOutput;

use ast::Program;
use interp::Interpreter;
use value::{Buffer, Value};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("code must define a 'calculate' function")]
    MissingCalculate,

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("execution exceeded the budget of {0} steps")]
    StepLimit(u64),

    #[error("invalid output: {0}")]
    InvalidOutput(String),
}

/// Resource bounds for one script run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    pub timeout: Duration,
    pub max_steps: u64,
    pub max_call_depth: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(250),
            max_steps: 5_000_000,
            max_call_depth: 32,
        }
    }
}

/// Runs indicator scripts under fixed limits. Stateless between runs.
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    limits: SandboxLimits,
}

impl Sandbox {
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Parse `code` and make sure it defines `calculate`, without running it.
    pub fn check(&self, code: &str) -> Result<(), ExecutionError> {
        compile(code).map(|_| ())
    }

    /// Execute `calculate(buffer, **params)` over `candles`.
    pub fn run(
        &self,
        code: &str,
        candles: &[Candle],
        params: &Params,
    ) -> Result<SeriesOutput, ExecutionError> {
        let program = compile(code)?;
        let started = Instant::now();
        let mut interp = Interpreter::new(&program, Buffer::from_candles(candles), &self.limits);
        let value = interp.call_calculate(params)?;
        debug!(
            steps = interp.steps(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "script finished"
        );
        into_output(value, candles.len())
    }
}

fn compile(code: &str) -> Result<Program, ExecutionError> {
    let program = parser::parse(code)?;
    if program.function("calculate").is_none() {
        return Err(ExecutionError::MissingCalculate);
    }
    Ok(program)
}

/// Check the return value against the output contract.
fn into_output(value: Value, len: usize) -> Result<SeriesOutput, ExecutionError> {
    let series_of_len = |name: &str, v: Value| match v {
        Value::Series(values) if values.len() == len => Ok(values),
        Value::Series(values) => Err(ExecutionError::InvalidOutput(format!(
            "series '{name}' has {} values, expected {len}",
            values.len()
        ))),
        other => Err(ExecutionError::InvalidOutput(format!(
            "'{name}' is a {}, expected a series",
            other.type_name()
        ))),
    };

    match value {
        Value::Series(_) => Ok(SeriesOutput::Single(series_of_len("result", value)?)),
        Value::Map(entries) if entries.is_empty() => Err(ExecutionError::InvalidOutput(
            "returned an empty map".to_string(),
        )),
        Value::Map(entries) => entries
            .into_iter()
            .map(|(name, v)| series_of_len(&name, v).map(|values| (name, values)))
            .collect::<Result<Vec<_>, _>>()
            .map(SeriesOutput::Multi),
        other => Err(ExecutionError::InvalidOutput(format!(
            "calculate() returned a {}, expected a series or a map of series",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    fn run(code: &str, closes: &[f64]) -> Result<SeriesOutput, ExecutionError> {
        Sandbox::default().run(code, &make_candles(closes), &Params::new())
    }

    fn run_with(code: &str, closes: &[f64], params: &[(&str, f64)]) -> Result<SeriesOutput, ExecutionError> {
        let params: Params = params.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        Sandbox::default().run(code, &make_candles(closes), &params)
    }

    #[test]
    fn single_series_output() {
        let out = run(
            "fn calculate(buf, period = 2) { return rolling_mean(buf.close, period); }",
            &[1.0, 2.0, 3.0],
        )
        .unwrap();
        let SeriesOutput::Single(v) = out else {
            panic!("expected single series")
        };
        assert!(v[0].is_nan());
        assert_approx(v[1], 1.5, DEFAULT_EPSILON);
        assert_approx(v[2], 2.5, DEFAULT_EPSILON);
    }

    #[test]
    fn params_override_defaults_and_unknown_ones_are_ignored() {
        let code = "fn calculate(buf, period = 2) { return rolling_sum(buf.close, period); }";
        let out = run_with(code, &[1.0, 2.0, 3.0], &[("period", 3.0), ("bogus", 1.0)]).unwrap();
        assert_approx(out.line(None).unwrap()[2], 6.0, DEFAULT_EPSILON);
    }

    #[test]
    fn missing_param_without_default() {
        let err = run("fn calculate(buf, period) { return buf.close; }", &[1.0]).unwrap_err();
        assert!(matches!(err, ExecutionError::Runtime(ref m) if m.contains("period")), "{err}");
    }

    #[test]
    fn map_output_keeps_order() {
        let code = r#"
            fn calculate(buf) {
                return { zeta: buf.close, alpha: buf.close * 2 };
            }
        "#;
        let out = run(code, &[1.0, 2.0]).unwrap();
        assert_eq!(out.names(), vec!["zeta", "alpha"]);
        assert_eq!(out.get("alpha").unwrap(), &[2.0, 4.0]);
    }

    #[test]
    fn loops_and_index_assignment() {
        let code = r#"
            fn calculate(buf) {
                let out = series(nan);
                for i in range(1, len(buf)) {
                    if buf.close[i] > buf.close[i - 1] {
                        out[i] = 1;
                    } else {
                        out[i] = -1;
                    }
                }
                return out;
            }
        "#;
        let out = run(code, &[1.0, 2.0, 1.5, 3.0]).unwrap();
        let v = out.line(None).unwrap();
        assert!(v[0].is_nan());
        assert_eq!(&v[1..], &[1.0, -1.0, 1.0]);
    }

    #[test]
    fn helper_functions() {
        let code = r#"
            fn spread(a, b = 0) { return a - b; }
            fn calculate(buf) { return spread(buf.high, buf.low); }
        "#;
        let out = run(code, &[10.0, 11.0]).unwrap();
        // make_candles gives a range of |close - open| + 2
        assert_eq!(out.line(None).unwrap(), &[2.0, 3.0]);
    }

    #[test]
    fn syntax_error_has_position() {
        let err = run("fn calculate(buf) {\n  return buf.close\n}", &[1.0]).unwrap_err();
        assert!(matches!(err, ExecutionError::Syntax { line: 3, .. }), "{err:?}");
    }

    #[test]
    fn missing_calculate() {
        let err = run("fn other(buf) { return buf.close; }", &[1.0]).unwrap_err();
        assert_eq!(err, ExecutionError::MissingCalculate);
    }

    #[test]
    fn unknown_names_do_not_resolve() {
        let err = run("fn calculate(buf) { return open_file(buf); }", &[1.0]).unwrap_err();
        assert!(matches!(err, ExecutionError::Runtime(ref m) if m.contains("open_file")));
        let err = run("fn calculate(buf) { return env; }", &[1.0]).unwrap_err();
        assert!(matches!(err, ExecutionError::Runtime(ref m) if m.contains("env")));
        let err = run("fn calculate(buf) { return buf.timestamp; }", &[1.0]).unwrap_err();
        assert!(matches!(err, ExecutionError::Runtime(_)));
    }

    #[test]
    fn runtime_errors_carry_line() {
        let err = run("fn calculate(buf) {\n  let x = 1;\n  return buf.close[99];\n}", &[1.0])
            .unwrap_err();
        match err {
            ExecutionError::Runtime(message) => assert!(message.starts_with("line 3:"), "{message}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn infinite_loop_hits_step_limit() {
        let sandbox = Sandbox::new(SandboxLimits {
            timeout: Duration::from_secs(30),
            max_steps: 10_000,
            max_call_depth: 8,
        });
        let code = "fn calculate(buf) { while true { let x = 1; } return buf.close; }";
        let err = sandbox.run(code, &make_candles(&[1.0]), &Params::new()).unwrap_err();
        assert_eq!(err, ExecutionError::StepLimit(10_000));
    }

    #[test]
    fn slow_script_times_out() {
        let sandbox = Sandbox::new(SandboxLimits {
            timeout: Duration::from_millis(1),
            max_steps: u64::MAX,
            max_call_depth: 8,
        });
        let code = "fn calculate(buf) { while true { let x = rolling_std(buf.close, 50); } return buf.close; }";
        let closes: Vec<f64> = (0..500).map(|i| i as f64).collect();
        let err = sandbox.run(code, &make_candles(&closes), &Params::new()).unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout(_)), "{err:?}");
    }

    #[test]
    fn wide_rolling_window_stays_within_the_clock() {
        let sandbox = Sandbox::new(SandboxLimits {
            timeout: Duration::from_millis(250),
            ..SandboxLimits::default()
        });
        let code = r#"
            fn calculate(buf) {
                let r = range(200000);
                let x = rolling_std(r, 100000);
                return buf.close;
            }
        "#;
        let started = std::time::Instant::now();
        let result = sandbox.run(code, &make_candles(&[1.0, 2.0]), &Params::new());
        assert!(result.is_ok(), "{result:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn series_arithmetic_is_charged_per_element() {
        let sandbox = Sandbox::new(SandboxLimits {
            timeout: Duration::from_secs(30),
            max_steps: 5_000_000,
            max_call_depth: 8,
        });
        let code = "fn calculate(buf) { let r = range(1000000); while true { let x = r + 1; } return buf.close; }";
        let started = std::time::Instant::now();
        let err = sandbox.run(code, &make_candles(&[1.0]), &Params::new()).unwrap_err();
        assert_eq!(err, ExecutionError::StepLimit(5_000_000));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn unbounded_recursion_hits_depth_limit() {
        let code = r#"
            fn down(n) { return down(n + 1); }
            fn calculate(buf) { return down(0); }
        "#;
        let err = run(code, &[1.0]).unwrap_err();
        assert!(matches!(err, ExecutionError::Runtime(ref m) if m.contains("depth")), "{err:?}");
    }

    #[test]
    fn invalid_outputs() {
        for code in [
            "fn calculate(buf) { return 1; }",
            "fn calculate(buf) { let x = 1; }",
            "fn calculate(buf) { return {}; }",
            "fn calculate(buf) { return { a: 1 }; }",
            "fn calculate(buf) { return series(0, 1); }",
            "fn calculate(buf) { return buf; }",
        ] {
            let err = run(code, &[1.0, 2.0]).unwrap_err();
            assert!(matches!(err, ExecutionError::InvalidOutput(_)), "{code}: {err:?}");
        }
    }

    #[test]
    fn check_validates_without_running() {
        let sandbox = Sandbox::default();
        assert!(sandbox.check("fn calculate(buf) { while true { } }").is_ok());
        assert_eq!(
            sandbox.check("fn f(buf) { return buf.close; }"),
            Err(ExecutionError::MissingCalculate)
        );
    }
}
