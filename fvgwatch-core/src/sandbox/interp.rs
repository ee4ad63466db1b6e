//! Tree-walking evaluator with step, time and depth budgets.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use super::ast::{BinaryOp, Expr, Function, Program, Stmt, StmtKind, UnaryOp};
use super::builtins::{self, is_builtin, range_len};
use super::value::{binary, negate, not, runtime, Buffer, Value};
use super::{ExecutionError, SandboxLimits};
use crate::indicators::Params;

/// Steps between wall-clock checks.
const CLOCK_INTERVAL: u64 = 1024;

type Env = HashMap<String, Value>;

/// Steps charged for handling a value: one per series element.
fn weight(value: &Value) -> u64 {
    match value {
        Value::Series(values) => values.len() as u64,
        Value::Map(entries) => entries.iter().map(|(_, v)| weight(v)).sum(),
        _ => 0,
    }
}

enum Flow {
    Next,
    Return(Value),
}

pub struct Interpreter<'a> {
    program: &'a Program,
    buffer: Rc<Buffer>,
    limits: &'a SandboxLimits,
    started: Instant,
    steps: u64,
    next_clock_check: u64,
    depth: usize,
    error_line: Option<usize>,
}

impl<'a> Interpreter<'a> {
    pub fn new(program: &'a Program, buffer: Buffer, limits: &'a SandboxLimits) -> Self {
        Self {
            program,
            buffer: Rc::new(buffer),
            limits,
            started: Instant::now(),
            steps: 0,
            next_clock_check: CLOCK_INTERVAL,
            depth: 0,
            error_line: None,
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Invoke `calculate(buffer, **params)`.
    pub fn call_calculate(&mut self, params: &Params) -> Result<Value, ExecutionError> {
        let function = self
            .program
            .function("calculate")
            .ok_or(ExecutionError::MissingCalculate)?;
        if function.params.is_empty() {
            return Err(runtime("calculate() must accept the candle buffer as its first parameter"));
        }

        let mut env = Env::new();
        env.insert(
            function.params[0].name.clone(),
            Value::Buffer(Rc::clone(&self.buffer)),
        );
        for param in &function.params[1..] {
            let value = match (params.get(&param.name), &param.default) {
                (Some(v), _) => Value::Number(*v),
                (None, Some(default)) => self.eval(default, &mut Env::new())?,
                (None, None) => {
                    return Err(runtime(format!(
                        "calculate() parameter '{}' has no value and no default",
                        param.name
                    )))
                }
            };
            env.insert(param.name.clone(), value);
        }

        let result = self.run_body(function, env);
        result.map_err(|err| match (err, self.error_line) {
            (ExecutionError::Runtime(message), Some(line)) => {
                ExecutionError::Runtime(format!("line {line}: {message}"))
            }
            (other, _) => other,
        })
    }

    fn run_body(&mut self, function: &Function, mut env: Env) -> Result<Value, ExecutionError> {
        if self.depth >= self.limits.max_call_depth {
            return Err(runtime(format!(
                "call depth limit of {} exceeded in '{}'",
                self.limits.max_call_depth, function.name
            )));
        }
        self.depth += 1;
        let flow = self.exec_block(&function.body, &mut env);
        self.depth -= 1;
        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Next => Ok(Value::Nil),
        }
    }

    fn call_function(&mut self, function: &Function, args: Vec<Value>) -> Result<Value, ExecutionError> {
        if args.len() > function.params.len() {
            return Err(runtime(format!(
                "{}() takes at most {} argument(s), got {}",
                function.name,
                function.params.len(),
                args.len()
            )));
        }
        let mut env = Env::new();
        let mut args = args.into_iter();
        for param in &function.params {
            let value = match (args.next(), &param.default) {
                (Some(v), _) => v,
                (None, Some(default)) => self.eval(default, &mut Env::new())?,
                (None, None) => {
                    return Err(runtime(format!(
                        "{}() missing argument '{}'",
                        function.name, param.name
                    )))
                }
            };
            env.insert(param.name.clone(), value);
        }
        self.run_body(function, env)
    }

    fn tick(&mut self, cost: u64) -> Result<(), ExecutionError> {
        self.steps = self.steps.saturating_add(cost);
        if self.steps > self.limits.max_steps {
            return Err(ExecutionError::StepLimit(self.limits.max_steps));
        }
        if self.steps >= self.next_clock_check {
            self.next_clock_check = self.steps + CLOCK_INTERVAL;
            if self.started.elapsed() > self.limits.timeout {
                return Err(ExecutionError::Timeout(self.limits.timeout));
            }
        }
        Ok(())
    }

    // ─── Statements ──────────────────────────────────────────────────

    fn exec_block(&mut self, stmts: &[Stmt], env: &mut Env) -> Result<Flow, ExecutionError> {
        for stmt in stmts {
            let flow = self.exec(stmt, env).map_err(|err| {
                if self.error_line.is_none() {
                    self.error_line = Some(stmt.line);
                }
                err
            })?;
            if let Flow::Return(value) = flow {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn exec(&mut self, stmt: &Stmt, env: &mut Env) -> Result<Flow, ExecutionError> {
        self.tick(1)?;
        match &stmt.kind {
            StmtKind::Let(name, expr) => {
                let value = self.eval(expr, env)?;
                env.insert(name.clone(), value);
            }
            StmtKind::Assign(name, expr) => {
                let value = self.eval(expr, env)?;
                match env.get_mut(name) {
                    Some(slot) => *slot = value,
                    None => {
                        return Err(runtime(format!(
                            "assignment to undeclared variable '{name}' (declare it with let)"
                        )))
                    }
                }
            }
            StmtKind::IndexAssign(name, index, expr) => {
                let index = self.eval(index, env)?;
                let value = self.eval(expr, env)?.as_number("assigned element")?;
                let target = env
                    .get_mut(name)
                    .ok_or_else(|| runtime(format!("unknown name '{name}'")))?;
                match target {
                    Value::Series(values) => {
                        let i = resolve_index(&index, values.len())?;
                        values[i] = value;
                    }
                    other => {
                        return Err(runtime(format!(
                            "cannot assign by index into a {}",
                            other.type_name()
                        )))
                    }
                }
            }
            StmtKind::If(cond, then, otherwise) => {
                let branch = if self.eval(cond, env)?.truthy()? {
                    then
                } else {
                    otherwise
                };
                return self.exec_block(branch, env);
            }
            StmtKind::For {
                var,
                start,
                end,
                step,
                body,
            } => {
                let start = self.eval(start, env)?.as_number("range() start")?;
                let end = self.eval(end, env)?.as_number("range() end")?;
                let step = match step {
                    Some(expr) => self.eval(expr, env)?.as_number("range() step")?,
                    None => 1.0,
                };
                let iterations = range_len(start, end, step)?;
                for k in 0..iterations {
                    self.tick(1)?;
                    env.insert(var.clone(), Value::Number(start + step * k as f64));
                    if let Flow::Return(value) = self.exec_block(body, env)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            StmtKind::While(cond, body) => {
                while self.eval(cond, env)?.truthy()? {
                    self.tick(1)?;
                    if let Flow::Return(value) = self.exec_block(body, env)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Nil,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Expr(expr) => {
                self.eval(expr, env)?;
            }
        }
        Ok(Flow::Next)
    }

    // ─── Expressions ─────────────────────────────────────────────────

    fn eval(&mut self, expr: &Expr, env: &mut Env) -> Result<Value, ExecutionError> {
        let value = match expr {
            Expr::Number(n) => Value::Number(*n),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Var(name) => match env.get(name) {
                Some(v) => v.clone(),
                None if name == "nan" => Value::Number(f64::NAN),
                None => return Err(runtime(format!("unknown name '{name}'"))),
            },
            Expr::Unary(op, inner) => {
                let value = self.eval(inner, env)?;
                self.tick(weight(&value))?;
                match op {
                    UnaryOp::Neg => negate(&value)?,
                    UnaryOp::Not => not(&value)?,
                }
            }
            Expr::Binary(op @ (BinaryOp::And | BinaryOp::Or), lhs, rhs) => {
                let left = self.eval(lhs, env)?;
                if matches!(left, Value::Series(_)) {
                    let right = self.eval(rhs, env)?;
                    self.tick(weight(&left) + weight(&right))?;
                    binary(*op, &left, &right)?
                } else {
                    let l = left.truthy()?;
                    let decided = match op {
                        BinaryOp::And => !l,
                        _ => l,
                    };
                    if decided {
                        Value::Bool(l)
                    } else {
                        let right = self.eval(rhs, env)?;
                        match right {
                            Value::Series(_) => binary(*op, &left, &right)?,
                            other => Value::Bool(other.truthy()?),
                        }
                    }
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let left = self.eval(lhs, env)?;
                let right = self.eval(rhs, env)?;
                self.tick(weight(&left) + weight(&right))?;
                binary(*op, &left, &right)?
            }
            Expr::Call(name, arg_exprs) => {
                let mut args = Vec::with_capacity(arg_exprs.len());
                for arg in arg_exprs {
                    args.push(self.eval(arg, env)?);
                }
                self.tick(1)?;
                if let Some(function) = self.program.function(name) {
                    self.call_function(function, args)?
                } else if is_builtin(name) {
                    // Builtins do their work in one go, so the budget is
                    // charged for the input before and the output after.
                    self.tick(args.iter().map(weight).sum())?;
                    let value = builtins::call(name, &args, self.buffer.len())?;
                    self.tick(weight(&value))?;
                    value
                } else {
                    return Err(runtime(format!("unknown function '{name}'")));
                }
            }
            Expr::Index(target, index) => {
                let target = self.eval(target, env)?;
                let index = self.eval(index, env)?;
                match &target {
                    Value::Series(values) => Value::Number(values[resolve_index(&index, values.len())?]),
                    other => {
                        return Err(runtime(format!("cannot index into a {}", other.type_name())))
                    }
                }
            }
            Expr::Field(target, field) => match self.eval(target, env)? {
                Value::Buffer(buf) => match buf.column(field) {
                    Some(column) => Value::Series(column.to_vec()),
                    None => {
                        return Err(runtime(format!(
                            "buffer has no column '{field}' (expected one of {})",
                            Buffer::COLUMNS.join(", ")
                        )))
                    }
                },
                Value::Map(entries) => entries
                    .into_iter()
                    .find(|(k, _)| k == field)
                    .map(|(_, v)| v)
                    .ok_or_else(|| runtime(format!("map has no entry '{field}'")))?,
                other => {
                    return Err(runtime(format!(
                        "{} has no field '{field}'",
                        other.type_name()
                    )))
                }
            },
            Expr::Map(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    out.push((key.clone(), self.eval(value, env)?));
                }
                Value::Map(out)
            }
        };

        // Series-valued work is charged by length.
        if let Value::Series(values) = &value {
            self.tick(values.len() as u64 / 16)?;
        }
        Ok(value)
    }
}

/// Whole-number index into a series of `len`; negative counts from the end.
fn resolve_index(index: &Value, len: usize) -> Result<usize, ExecutionError> {
    let raw = index.as_number("index")?;
    if !raw.is_finite() || raw.fract() != 0.0 {
        return Err(runtime(format!("index must be a whole number, got {raw}")));
    }
    let resolved = if raw < 0.0 { len as f64 + raw } else { raw };
    if resolved < 0.0 || resolved >= len as f64 {
        return Err(runtime(format!("index {raw} out of range for length {len}")));
    }
    Ok(resolved as usize)
}
