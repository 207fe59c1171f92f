//! Evaluates an [`Expr`] AST against an environment and a node-resolution
//! context (spec §4.3, numeric coercion per §9).

use std::collections::HashMap;

use super::ast::{BinOp, Expr, UnOp};
use super::functions;
use super::value::Value;

pub type Environment = HashMap<String, Value>;

/// Everything the evaluator needs to resolve `#id` references and dispatch
/// node-aware builtin functions, without depending on the engine or model
/// crates directly. The orchestrator (`engine`) implements this over the
/// protocol tree being encoded or decoded.
pub trait EvalContext {
    /// Decoded/forward-expression value of the referenced node, as a [`Value`].
    fn node_value(&self, node_ref: &str) -> Result<Value, String>;
    /// Start bit offset of the referenced node within its protocol.
    fn node_offset(&self, node_ref: &str) -> Result<u64, String>;
    /// End bit offset (exclusive) of the referenced node.
    fn node_end_offset(&self, node_ref: &str) -> Result<u64, String>;
    /// Declared bit length of the referenced node.
    fn node_length(&self, node_ref: &str) -> Result<u32, String>;
    /// Raw encoded bytes already produced for the referenced node this pass.
    fn node_bytes(&self, node_ref: &str) -> Result<Vec<u8>, String>;
    /// Inclusive byte range spanning from one referenced node through another,
    /// in declaration order ("between" functions, spec §4.3 / EXPANSION §E.2).
    fn bytes_between(&self, from_ref: &str, to_ref: &str) -> Result<Vec<u8>, String>;
    /// Ordered child ids of a `NodeGroup` structural node, for `indexOfNode`/`listSize`.
    fn group_children(&self, group_ref: &str) -> Result<Vec<String>, String>;
    /// `true` if the referenced node is disabled or has no decoded/forward value.
    fn node_is_empty(&self, node_ref: &str) -> Result<bool, String>;
}

/// A numeric literal with no fractional part is an integer; spec §9's
/// "widest matching numeric type" coercion otherwise has nothing to prefer
/// integer math against, since every literal would arrive as a float.
fn number_literal(n: f64) -> Value {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < (1i64 << 62) as f64 {
        Value::Int(n as i64)
    } else {
        Value::Float(n)
    }
}

pub fn eval(expr: &Expr, env: &Environment, ctx: &dyn EvalContext) -> Result<Value, String> {
    match expr {
        Expr::Number(n) => Ok(number_literal(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::NodeRef(id) => ctx.node_value(id),
        Expr::Ident(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| format!("undefined variable '{name}'")),
        Expr::Unary { op, expr } => {
            let v = eval(expr, env, ctx)?;
            eval_unary(*op, v)
        }
        Expr::Binary { op, lhs, rhs } => {
            let l = eval(lhs, env, ctx)?;
            let r = eval(rhs, env, ctx)?;
            eval_binary(*op, l, r)
        }
        Expr::Ternary { cond, if_true, if_false } => {
            let c = eval(cond, env, ctx)?.as_bool().map_err(|e| e.to_string())?;
            if c { eval(if_true, env, ctx) } else { eval(if_false, env, ctx) }
        }
        Expr::Call { name, args } => {
            let values = args.iter().map(|a| eval(a, env, ctx)).collect::<Result<Vec<_>, _>>()?;
            functions::call(name, &values, args, ctx)
        }
    }
}

fn eval_unary(op: UnOp, v: Value) -> Result<Value, String> {
    match op {
        UnOp::Neg => match v {
            Value::Int(i) => Ok(Value::Int(-i)),
            other => Ok(Value::Float(-other.as_f64().map_err(|e| e.to_string())?)),
        },
        UnOp::Not => Ok(Value::Bool(!v.as_bool().map_err(|e| e.to_string())?)),
    }
}

fn eval_binary(op: BinOp, l: Value, r: Value) -> Result<Value, String> {
    use BinOp::*;
    match op {
        Add | Sub | Mul | Div | Mod => numeric_binary(op, l, r),
        BitAnd | BitOr | BitXor | Shl | Shr => integer_binary(op, l, r),
        And => Ok(Value::Bool(l.as_bool().map_err(|e| e.to_string())? && r.as_bool().map_err(|e| e.to_string())?)),
        Or => Ok(Value::Bool(l.as_bool().map_err(|e| e.to_string())? || r.as_bool().map_err(|e| e.to_string())?)),
        Eq => Ok(Value::Bool(values_equal(&l, &r)?)),
        NotEq => Ok(Value::Bool(!values_equal(&l, &r)?)),
        Lt | LtEq | Gt | GtEq => compare(op, l, r),
    }
}

/// "Widest matching numeric type" coercion (spec §9): integer math stays
/// integer unless either side is genuinely a float, at which point both
/// sides promote to `f64`.
fn numeric_binary(op: BinOp, l: Value, r: Value) -> Result<Value, String> {
    let stays_integer = !l.is_float_leaning() && !r.is_float_leaning();
    if stays_integer {
        let a = l.as_i64().map_err(|e| e.to_string())?;
        let b = r.as_i64().map_err(|e| e.to_string())?;
        return Ok(Value::Int(match op {
            BinOp::Add => a.wrapping_add(b),
            BinOp::Sub => a.wrapping_sub(b),
            BinOp::Mul => a.wrapping_mul(b),
            BinOp::Div => {
                if b == 0 {
                    return Err("division by zero".to_string());
                }
                a.wrapping_div(b)
            }
            BinOp::Mod => {
                if b == 0 {
                    return Err("modulo by zero".to_string());
                }
                a.wrapping_rem(b)
            }
            _ => unreachable!(),
        }));
    }
    let a = l.as_f64().map_err(|e| e.to_string())?;
    let b = r.as_f64().map_err(|e| e.to_string())?;
    Ok(Value::Float(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err("division by zero".to_string());
            }
            a / b
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err("modulo by zero".to_string());
            }
            a % b
        }
        _ => unreachable!(),
    }))
}

fn integer_binary(op: BinOp, l: Value, r: Value) -> Result<Value, String> {
    let a = l.as_i64().map_err(|e| e.to_string())?;
    let b = r.as_i64().map_err(|e| e.to_string())?;
    Ok(Value::Int(match op {
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::Shl => a.wrapping_shl(b as u32),
        BinOp::Shr => a.wrapping_shr(b as u32),
        _ => unreachable!(),
    }))
}

fn values_equal(l: &Value, r: &Value) -> Result<bool, String> {
    match (l, r) {
        (Value::Str(a), Value::Str(b)) => Ok(a == b),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Bytes(a), Value::Bytes(b)) => Ok(a == b),
        _ => Ok(l.as_f64().map_err(|e| e.to_string())? == r.as_f64().map_err(|e| e.to_string())?),
    }
}

fn compare(op: BinOp, l: Value, r: Value) -> Result<Value, String> {
    let a = l.as_f64().map_err(|e| e.to_string())?;
    let b = r.as_f64().map_err(|e| e.to_string())?;
    Ok(Value::Bool(match op {
        BinOp::Lt => a < b,
        BinOp::LtEq => a <= b,
        BinOp::Gt => a > b,
        BinOp::GtEq => a >= b,
        _ => unreachable!(),
    }))
}
