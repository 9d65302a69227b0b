use crate::script::ast::BinaryOp;
use crate::script::error::ScriptError;
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// 脚本产生的字符串最大字节数
pub const MAX_STR_BYTES: usize = 1024 * 1024;

/// 脚本产生的 list 最大元素个数
pub const MAX_LIST_LEN: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

pub(crate) fn as_num(value: &Value) -> Option<Num> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Num::Int)
            .or_else(|| n.as_f64().map(Num::Float)),
        Value::Bool(b) => Some(Num::Int(*b as i64)),
        _ => None,
    }
}

pub(crate) fn float_value(f: f64, line: usize) -> Result<Value, ScriptError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ScriptError::runtime(line, "numeric result is not finite"))
}

pub(crate) fn num_value(n: Num, line: usize) -> Result<Value, ScriptError> {
    match n {
        Num::Int(i) => Ok(Value::from(i)),
        Num::Float(f) => float_value(f, line),
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// 数值按大小比较（1 == 1.0），容器逐项比较
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => match (as_num(a), as_num(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => x == y,
            (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
            _ => false,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

pub(crate) fn compare(a: &Value, b: &Value, line: usize) -> Result<Ordering, ScriptError> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => match (as_num(a), as_num(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => Ok(x.cmp(&y)),
            (Some(x), Some(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .ok_or_else(|| ScriptError::runtime(line, "cannot compare NaN")),
            _ => Err(ScriptError::runtime(
                line,
                format!("cannot compare {} with {}", type_name(a), type_name(b)),
            )),
        },
    }
}

pub(crate) fn contains(container: &Value, item: &Value, line: usize) -> Result<bool, ScriptError> {
    match container {
        Value::String(text) => match item {
            Value::String(needle) => Ok(text.contains(needle.as_str())),
            other => Err(ScriptError::runtime(
                line,
                format!("`in <str>` requires a str operand, got {}", type_name(other)),
            )),
        },
        Value::Array(items) => Ok(items.iter().any(|v| values_equal(v, item))),
        Value::Object(map) => match item {
            Value::String(key) => Ok(map.contains_key(key)),
            _ => Ok(false),
        },
        other => Err(ScriptError::runtime(
            line,
            format!("{} is not a container", type_name(other)),
        )),
    }
}

pub(crate) fn binary(op: BinaryOp, lhs: &Value, rhs: &Value, line: usize) -> Result<Value, ScriptError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(lhs, rhs))),
        BinaryOp::NotEq => Ok(Value::Bool(!values_equal(lhs, rhs))),
        BinaryOp::Lt => Ok(Value::Bool(compare(lhs, rhs, line)? == Ordering::Less)),
        BinaryOp::Le => Ok(Value::Bool(compare(lhs, rhs, line)? != Ordering::Greater)),
        BinaryOp::Gt => Ok(Value::Bool(compare(lhs, rhs, line)? == Ordering::Greater)),
        BinaryOp::Ge => Ok(Value::Bool(compare(lhs, rhs, line)? != Ordering::Less)),
        BinaryOp::In => Ok(Value::Bool(contains(rhs, lhs, line)?)),
        BinaryOp::Add => match (lhs, rhs) {
            (Value::String(a), Value::String(b)) => {
                check_str_len(a.len() + b.len(), line)?;
                Ok(Value::String(format!("{}{}", a, b)))
            }
            (Value::Array(a), Value::Array(b)) => {
                check_list_len(a.len() + b.len(), line)?;
                Ok(Value::Array(a.iter().chain(b).cloned().collect()))
            }
            _ => arithmetic(op, lhs, rhs, line),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, lhs, rhs, line)
        }
        // and/or 在解释器里短路求值
        BinaryOp::And | BinaryOp::Or => Err(ScriptError::runtime(
            line,
            "logical operators are evaluated lazily",
        )),
    }
}

pub(crate) fn check_str_len(len: usize, line: usize) -> Result<(), ScriptError> {
    if len > MAX_STR_BYTES {
        return Err(ScriptError::runtime(
            line,
            format!("string would exceed {} bytes", MAX_STR_BYTES),
        ));
    }
    Ok(())
}

pub(crate) fn check_list_len(len: usize, line: usize) -> Result<(), ScriptError> {
    if len > MAX_LIST_LEN {
        return Err(ScriptError::runtime(
            line,
            format!("list would exceed {} items", MAX_LIST_LEN),
        ));
    }
    Ok(())
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value, line: usize) -> Result<Value, ScriptError> {
    let (Some(a), Some(b)) = (as_num(lhs), as_num(rhs)) else {
        return Err(ScriptError::runtime(
            line,
            format!(
                "unsupported operand types for {:?}: {} and {}",
                op,
                type_name(lhs),
                type_name(rhs)
            ),
        ));
    };

    if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b.as_f64() == 0.0 {
        return Err(ScriptError::runtime(line, "division by zero"));
    }

    let overflow = || ScriptError::runtime(line, "integer overflow");
    let result = match (op, a, b) {
        (BinaryOp::Div, _, _) => Num::Float(a.as_f64() / b.as_f64()),
        (BinaryOp::Add, Num::Int(x), Num::Int(y)) => Num::Int(x.checked_add(y).ok_or_else(overflow)?),
        (BinaryOp::Sub, Num::Int(x), Num::Int(y)) => Num::Int(x.checked_sub(y).ok_or_else(overflow)?),
        (BinaryOp::Mul, Num::Int(x), Num::Int(y)) => Num::Int(x.checked_mul(y).ok_or_else(overflow)?),
        (BinaryOp::Rem, Num::Int(x), Num::Int(y)) => {
            Num::Int(x.checked_rem_euclid(y).ok_or_else(overflow)?)
        }
        (BinaryOp::Add, _, _) => Num::Float(a.as_f64() + b.as_f64()),
        (BinaryOp::Sub, _, _) => Num::Float(a.as_f64() - b.as_f64()),
        (BinaryOp::Mul, _, _) => Num::Float(a.as_f64() * b.as_f64()),
        (BinaryOp::Rem, _, _) => Num::Float(a.as_f64().rem_euclid(b.as_f64())),
        _ => return Err(ScriptError::runtime(line, format!("unsupported operator {:?}", op))),
    };
    num_value(result, line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equality_is_numeric() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!({"a": [1, 2]}), &json!({"a": [1.0, 2]})));
        assert!(!values_equal(&json!("1"), &json!(1)));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(binary(BinaryOp::Add, &json!(2), &json!(3), 1).unwrap(), json!(5));
        assert_eq!(binary(BinaryOp::Div, &json!(7), &json!(2), 1).unwrap(), json!(3.5));
        assert_eq!(binary(BinaryOp::Rem, &json!(-1), &json!(3), 1).unwrap(), json!(2));
        assert_eq!(
            binary(BinaryOp::Add, &json!("Bearer "), &json!("abc"), 1).unwrap(),
            json!("Bearer abc")
        );
        assert!(binary(BinaryOp::Div, &json!(1), &json!(0), 1).is_err());
        assert!(binary(BinaryOp::Add, &json!("a"), &json!(1), 1).is_err());
        assert!(binary(BinaryOp::Mul, &json!(i64::MAX), &json!(2), 1).is_err());
    }

    #[test]
    fn test_concatenation_is_capped() {
        let half = json!("x".repeat(MAX_STR_BYTES / 2));
        let full = binary(BinaryOp::Add, &half, &half, 1).unwrap();
        let err = binary(BinaryOp::Add, &full, &json!("y"), 3).unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { line: 3, .. }));

        let items = Value::Array(vec![json!(0); MAX_LIST_LEN]);
        assert!(binary(BinaryOp::Add, &items, &json!([]), 1).is_ok());
        assert!(binary(BinaryOp::Add, &items, &json!([1]), 1).is_err());
    }

    #[test]
    fn test_membership() {
        assert!(contains(&json!("hello"), &json!("ell"), 1).unwrap());
        assert!(contains(&json!([1, 2]), &json!(2.0), 1).unwrap());
        assert!(contains(&json!({"k": 1}), &json!("k"), 1).unwrap());
        assert!(contains(&json!(5), &json!(5), 1).is_err());
    }

    #[test]
    fn test_truthy_and_type_name() {
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!([0])));
        assert_eq!(type_name(&json!(1.5)), "float");
        assert_eq!(type_name(&json!(1)), "int");
    }
}
