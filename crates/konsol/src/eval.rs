use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    exception::Exception,
    expressions::{Builtin, CmpOperator, Expr, ExprLoc, Literal, Operator, Program, StrPart, UnaryOp},
    io::ConsoleWriter,
    value::{Value, floor_div, floor_mod},
};

/// Evaluated call arguments; most builtin calls take one or two.
type Args = SmallVec<[Value; 4]>;

/// Tree-walking evaluator over a session's persistent bindings.
///
/// Borrows the bindings and console for the duration of one snippet. All
/// snippet failures surface as [`Exception`] values; the evaluator itself
/// does not fail.
pub(crate) struct Interp<'a, W: ConsoleWriter> {
    bindings: &'a mut AHashMap<String, Value>,
    console: &'a mut W,
    script_name: &'a str,
}

impl<'a, W: ConsoleWriter> Interp<'a, W> {
    pub(crate) fn new(bindings: &'a mut AHashMap<String, Value>, console: &'a mut W, script_name: &'a str) -> Self {
        Self {
            bindings,
            console,
            script_name,
        }
    }

    /// Runs a parsed snippet and returns the value of its last statement.
    ///
    /// An exception leaving a statement gets a backtrace frame for that
    /// statement if the raise site did not already record one.
    pub(crate) fn run(&mut self, program: &Program) -> Result<Value, Exception> {
        let mut last = Value::Nil;
        for statement in program {
            last = self.eval(statement).map_err(|mut exc| {
                if exc.backtrace().is_empty() {
                    exc.push_frame(self.frame(statement));
                }
                exc
            })?;
        }
        Ok(last)
    }

    fn frame(&self, at: &ExprLoc) -> String {
        format!("{}:{}:in `<main>'", self.script_name, at.span.line)
    }

    fn eval(&mut self, expr: &ExprLoc) -> Result<Value, Exception> {
        match &expr.expr {
            Expr::Literal(literal) => Ok(literal_value(literal)),
            Expr::StrInterp(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        StrPart::Text(segment) => text.push_str(segment),
                        StrPart::Interp(inner) => text.push_str(&self.eval(inner)?.to_display()),
                    }
                }
                Ok(Value::Str(text))
            }
            Expr::Name(name) => self
                .bindings
                .get(name)
                .cloned()
                .ok_or_else(|| Exception::name_error(name)),
            Expr::Assign { name, value } => {
                let value = self.eval(value)?;
                self.bindings.insert(name.clone(), value.clone());
                Ok(value)
            }
            Expr::OpAssign { name, op, value } => {
                let current = self
                    .bindings
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Exception::name_error(name))?;
                let rhs = self.eval(value)?;
                let updated = binary_op(current, *op, rhs)?;
                self.bindings.insert(name.clone(), updated.clone());
                Ok(updated)
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                unary_op(*op, value)
            }
            Expr::Op { left, op, right } => {
                let lhs = self.eval(left)?;
                let rhs = self.eval(right)?;
                binary_op(lhs, *op, rhs)
            }
            Expr::CmpOp { left, op, right } => {
                let lhs = self.eval(left)?;
                let rhs = self.eval(right)?;
                compare_op(&lhs, *op, &rhs)
            }
            Expr::And { left, right } => {
                let lhs = self.eval(left)?;
                if lhs.is_truthy() { self.eval(right) } else { Ok(lhs) }
            }
            Expr::Or { left, right } => {
                let lhs = self.eval(left)?;
                if lhs.is_truthy() { Ok(lhs) } else { self.eval(right) }
            }
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::Array(values))
            }
            Expr::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                index_op(&object, &index)
            }
            Expr::Call { builtin, args } => {
                let mut values = Args::new();
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                self.call_builtin(*builtin, values, expr)
            }
        }
    }

    fn call_builtin(&mut self, builtin: Builtin, args: Args, at: &ExprLoc) -> Result<Value, Exception> {
        match builtin {
            Builtin::Puts => {
                if args.is_empty() {
                    self.console.write_stdout("\n");
                } else {
                    for arg in &args {
                        self.puts_value(arg);
                    }
                }
                Ok(Value::Nil)
            }
            Builtin::Print => {
                for arg in &args {
                    self.console.write_stdout(&arg.to_display());
                }
                Ok(Value::Nil)
            }
            Builtin::P => {
                for arg in &args {
                    self.console.write_stdout(&arg.inspect());
                    self.console.write_stdout("\n");
                }
                // `p` echoes its argument(s): one value passes through, many
                // come back as an array, none is nil.
                let mut args = args;
                Ok(match args.len() {
                    0 => Value::Nil,
                    1 => args.swap_remove(0),
                    _ => Value::Array(args.into_vec()),
                })
            }
            Builtin::Warn => {
                for arg in &args {
                    self.console.write_stderr(&arg.to_display());
                    self.console.write_stderr("\n");
                }
                Ok(Value::Nil)
            }
            Builtin::Raise => {
                let mut exc = match args.len() {
                    0 => Exception::runtime_error("unhandled exception"),
                    1 => match &args[0] {
                        Value::Str(message) => Exception::runtime_error(message.clone()),
                        other => {
                            return Err(Exception::type_error(format!(
                                "exception message must be a String, not {}",
                                other.type_name()
                            )));
                        }
                    },
                    n => {
                        return Err(Exception::argument_error(format!(
                            "wrong number of arguments (given {n}, expected 0..1)"
                        )));
                    }
                };
                // The raise site is the innermost frame.
                exc.push_frame(self.frame(at));
                Err(exc)
            }
        }
    }

    /// `puts` writes arrays one element per line, recursively.
    fn puts_value(&mut self, value: &Value) {
        match value {
            Value::Array(items) => {
                if items.is_empty() {
                    self.console.write_stdout("\n");
                }
                for item in items {
                    self.puts_value(item);
                }
            }
            other => {
                self.console.write_stdout(&other.to_display());
                self.console.write_stdout("\n");
            }
        }
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Nil => Value::Nil,
        Literal::True => Value::Bool(true),
        Literal::False => Value::Bool(false),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::Str(s) => Value::Str(s.clone()),
    }
}

fn unary_op(op: UnaryOp, value: Value) -> Result<Value, Exception> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOp::Neg => match value {
            Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(Exception::type_error(format!(
                "can't negate {}",
                other.type_name()
            ))),
        },
    }
}

fn binary_op(lhs: Value, op: Operator, rhs: Value) -> Result<Value, Exception> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => int_op(a, op, b),
        (Value::Float(a), Value::Float(b)) => Ok(float_op(a, op, b)),
        (Value::Int(a), Value::Float(b)) => Ok(float_op(a as f64, op, b)),
        (Value::Float(a), Value::Int(b)) => Ok(float_op(a, op, b as f64)),
        (Value::Str(a), Value::Str(b)) if op == Operator::Add => Ok(Value::Str(a + &b)),
        (Value::Str(_), other) if op == Operator::Add => Err(Exception::type_error(format!(
            "no implicit conversion of {} into String",
            other.type_name()
        ))),
        (Value::Str(a), Value::Int(n)) if op == Operator::Mul => repeat_str(&a, n),
        (Value::Array(mut a), Value::Array(b)) if op == Operator::Add => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (Value::Array(a), Value::Int(n)) if op == Operator::Mul => repeat_array(a, n),
        (lhs, rhs) => Err(Exception::type_error(format!(
            "{} can't be coerced into {}",
            rhs.type_name(),
            lhs.type_name()
        ))),
    }
}

fn int_op(a: i64, op: Operator, b: i64) -> Result<Value, Exception> {
    let result = match op {
        Operator::Add => a.wrapping_add(b),
        Operator::Sub => a.wrapping_sub(b),
        Operator::Mul => a.wrapping_mul(b),
        Operator::Div => {
            if b == 0 {
                return Err(Exception::zero_division());
            }
            floor_div(a, b)
        }
        Operator::Mod => {
            if b == 0 {
                return Err(Exception::zero_division());
            }
            floor_mod(a, b)
        }
    };
    Ok(Value::Int(result))
}

/// Float arithmetic never raises; division by zero yields an infinity.
fn float_op(a: f64, op: Operator, b: f64) -> Value {
    let result = match op {
        Operator::Add => a + b,
        Operator::Sub => a - b,
        Operator::Mul => a * b,
        Operator::Div => a / b,
        Operator::Mod => {
            let rem = a % b;
            // Match floor-mod sign convention.
            if rem != 0.0 && (rem < 0.0) != (b < 0.0) { rem + b } else { rem }
        }
    };
    Value::Float(result)
}

fn repeat_str(text: &str, count: i64) -> Result<Value, Exception> {
    if count < 0 {
        return Err(Exception::argument_error("negative argument"));
    }
    Ok(Value::Str(text.repeat(count as usize)))
}

fn repeat_array(items: Vec<Value>, count: i64) -> Result<Value, Exception> {
    if count < 0 {
        return Err(Exception::argument_error("negative argument"));
    }
    let mut out = Vec::with_capacity(items.len().saturating_mul(count as usize));
    for _ in 0..count {
        out.extend(items.iter().cloned());
    }
    Ok(Value::Array(out))
}

fn compare_op(lhs: &Value, op: CmpOperator, rhs: &Value) -> Result<Value, Exception> {
    match op {
        CmpOperator::Eq => Ok(Value::Bool(values_equal(lhs, rhs))),
        CmpOperator::Ne => Ok(Value::Bool(!values_equal(lhs, rhs))),
        ordered => {
            let ordering = match (lhs, rhs) {
                (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
                (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
                (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
                (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
                (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
                _ => None,
            };
            let Some(ordering) = ordering else {
                return Err(Exception::type_error(format!(
                    "comparison of {} with {} failed",
                    lhs.type_name(),
                    rhs.type_name()
                )));
            };
            let result = match ordered {
                CmpOperator::Lt => ordering.is_lt(),
                CmpOperator::Le => ordering.is_le(),
                CmpOperator::Gt => ordering.is_gt(),
                CmpOperator::Ge => ordering.is_ge(),
                CmpOperator::Eq | CmpOperator::Ne => unreachable!("handled above"),
            };
            Ok(Value::Bool(result))
        }
    }
}

/// Equality crosses the int/float divide; other type mismatches are just
/// unequal, never an error.
fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(a), Value::Float(b)) => (*a as f64) == *b,
        (Value::Float(a), Value::Int(b)) => *a == (*b as f64),
        _ => lhs == rhs,
    }
}

fn index_op(object: &Value, index: &Value) -> Result<Value, Exception> {
    let Value::Int(raw_index) = index else {
        return Err(Exception::type_error(format!(
            "no implicit conversion of {} into Integer",
            index.type_name()
        )));
    };
    match object {
        Value::Array(items) => Ok(resolve_index(*raw_index, items.len())
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Nil)),
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            Ok(resolve_index(*raw_index, chars.len())
                .and_then(|i| chars.get(i).copied())
                .map_or(Value::Nil, |ch| Value::Str(ch.to_string())))
        }
        other => Err(Exception::type_error(format!(
            "can't index {}",
            other.type_name()
        ))),
    }
}

/// Resolves a possibly negative index against a length; out of range is None.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    if index >= 0 {
        Some(index as usize)
    } else {
        len.checked_sub(index.unsigned_abs() as usize)
    }
}
