use crate::script::error::ScriptError;
use crate::script::sandbox::{ScriptMode, ScriptScope};
use crate::script::value::{
    Num, as_num, compare, contains, float_value, num_value, truthy, type_name, values_equal,
};
use crate::variable::store::stringify;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

/// range() 最多生成的元素个数
pub const MAX_RANGE_LEN: i64 = 10_000;

/// 只读参数的能力
pub type PureFn = fn(args: &[Value], line: usize) -> Result<Value, ScriptError>;

/// 需要访问变量存储或输出的能力
pub type StatefulFn =
    fn(args: &[Value], scope: &mut ScriptScope<'_>, line: usize) -> Result<Value, ScriptError>;

#[derive(Clone, Copy)]
pub enum Capability {
    Pure(PureFn),
    Stateful(StatefulFn),
}

/// 方法白名单，接收者类型在解释器中检查
pub const METHODS: [&str; 11] = [
    "get",
    "keys",
    "values",
    "contains",
    "upper",
    "lower",
    "strip",
    "split",
    "startswith",
    "endswith",
    "append",
];

/// 脚本可调用的函数表，不在表里的调用一律拒绝
#[derive(Clone, Default)]
pub struct CapabilityTable {
    entries: HashMap<&'static str, Capability>,
}

impl CapabilityTable {
    pub fn for_mode(mode: ScriptMode) -> Self {
        let mut table = Self::default();

        table.register("get_var", Capability::Stateful(get_var));
        table.register("set_var", Capability::Stateful(set_var));
        table.register("has_var", Capability::Stateful(has_var));
        table.register("print", Capability::Stateful(print));

        table.register("len", Capability::Pure(len));
        table.register("str", Capability::Pure(to_str));
        table.register("int", Capability::Pure(to_int));
        table.register("float", Capability::Pure(to_float));
        table.register("bool", Capability::Pure(to_bool));
        table.register("list", Capability::Pure(to_list));
        table.register("dict", Capability::Pure(to_dict));
        table.register("round", Capability::Pure(round));
        table.register("abs", Capability::Pure(abs));
        table.register("min", Capability::Pure(min));
        table.register("max", Capability::Pure(max));
        table.register("sum", Capability::Pure(sum));
        table.register("range", Capability::Pure(range));
        table.register("type", Capability::Pure(type_of));

        if mode == ScriptMode::Assertion {
            table.register("assert_equal", Capability::Pure(assert_equal));
            table.register("assert_not_equal", Capability::Pure(assert_not_equal));
            table.register("assert_contains", Capability::Pure(assert_contains));
            table.register("assert_greater_than", Capability::Pure(assert_greater_than));
            table.register("assert_less_than", Capability::Pure(assert_less_than));
            table.register("assert_true", Capability::Pure(assert_true));
            table.register("assert_false", Capability::Pure(assert_false));
        }

        table
    }

    pub fn register(&mut self, name: &'static str, capability: Capability) {
        self.entries.insert(name, capability);
    }

    pub fn remove(&mut self, name: &str) -> Option<Capability> {
        self.entries.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Capability> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

fn arity(name: &str, args: &[Value], min: usize, max: usize, line: usize) -> Result<(), ScriptError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{}..={}", min, max)
        };
        return Err(ScriptError::runtime(
            line,
            format!("{}() takes {} argument(s), got {}", name, expected, args.len()),
        ));
    }
    Ok(())
}

fn str_arg<'v>(name: &str, value: &'v Value, line: usize) -> Result<&'v str, ScriptError> {
    value.as_str().ok_or_else(|| {
        ScriptError::runtime(
            line,
            format!("{}() expects a str, got {}", name, type_name(value)),
        )
    })
}

fn num_arg(name: &str, value: &Value, line: usize) -> Result<Num, ScriptError> {
    as_num(value).ok_or_else(|| {
        ScriptError::runtime(
            line,
            format!("{}() expects a number, got {}", name, type_name(value)),
        )
    })
}

fn get_var(args: &[Value], scope: &mut ScriptScope<'_>, line: usize) -> Result<Value, ScriptError> {
    arity("get_var", args, 1, 2, line)?;
    let name = str_arg("get_var", &args[0], line)?;
    Ok(scope
        .variables
        .get(name)
        .cloned()
        .or_else(|| args.get(1).cloned())
        .unwrap_or(Value::Null))
}

fn set_var(args: &[Value], scope: &mut ScriptScope<'_>, line: usize) -> Result<Value, ScriptError> {
    arity("set_var", args, 2, 2, line)?;
    let name = str_arg("set_var", &args[0], line)?;
    tracing::debug!(variable = %name, "Script set variable");
    scope.variables.set(name, args[1].clone());
    Ok(Value::Null)
}

fn has_var(args: &[Value], scope: &mut ScriptScope<'_>, line: usize) -> Result<Value, ScriptError> {
    arity("has_var", args, 1, 1, line)?;
    let name = str_arg("has_var", &args[0], line)?;
    Ok(Value::Bool(scope.variables.contains(name)))
}

fn print(args: &[Value], scope: &mut ScriptScope<'_>, _line: usize) -> Result<Value, ScriptError> {
    let text = args.iter().map(stringify).collect::<Vec<_>>().join(" ");
    tracing::info!(target: "rucase::script", "{}", text);
    scope.output.push(text);
    Ok(Value::Null)
}

fn len(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("len", args, 1, 1, line)?;
    let n = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        other => {
            return Err(ScriptError::runtime(
                line,
                format!("object of type {} has no len()", type_name(other)),
            ));
        }
    };
    Ok(Value::from(n))
}

fn to_str(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("str", args, 1, 1, line)?;
    Ok(Value::String(stringify(&args[0])))
}

fn to_int(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("int", args, 1, 1, line)?;
    match &args[0] {
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|f| f.trunc() as i64))
                .map(Value::from)
                .ok_or_else(|| {
                    ScriptError::runtime(line, format!("invalid literal for int(): {:?}", s))
                })
        }
        other => match num_arg("int", other, line)? {
            Num::Int(i) => Ok(Value::from(i)),
            Num::Float(f) => Ok(Value::from(f.trunc() as i64)),
        },
    }
}

fn to_float(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("float", args, 1, 1, line)?;
    let f = match &args[0] {
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
            ScriptError::runtime(line, format!("could not convert string to float: {:?}", s))
        })?,
        other => num_arg("float", other, line)?.as_f64(),
    };
    float_value(f, line)
}

fn to_bool(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("bool", args, 1, 1, line)?;
    Ok(Value::Bool(truthy(&args[0])))
}

fn to_list(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("list", args, 0, 1, line)?;
    match args.first() {
        None => Ok(Value::Array(Vec::new())),
        Some(Value::Array(items)) => Ok(Value::Array(items.clone())),
        Some(Value::Object(map)) => Ok(Value::Array(
            map.keys().cloned().map(Value::String).collect(),
        )),
        Some(Value::String(s)) => Ok(Value::Array(
            s.chars().map(|c| Value::String(c.to_string())).collect(),
        )),
        Some(other) => Err(ScriptError::runtime(
            line,
            format!("{} is not iterable", type_name(other)),
        )),
    }
}

fn to_dict(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("dict", args, 0, 1, line)?;
    match args.first() {
        None => Ok(Value::Object(Map::new())),
        Some(Value::Object(map)) => Ok(Value::Object(map.clone())),
        Some(Value::Array(pairs)) => {
            let mut map = Map::new();
            for pair in pairs {
                match pair.as_array().map(Vec::as_slice) {
                    Some([Value::String(k), v]) => {
                        map.insert(k.clone(), v.clone());
                    }
                    _ => {
                        return Err(ScriptError::runtime(
                            line,
                            "dict() expects a list of [key, value] pairs with str keys",
                        ));
                    }
                }
            }
            Ok(Value::Object(map))
        }
        Some(other) => Err(ScriptError::runtime(
            line,
            format!("cannot convert {} to dict", type_name(other)),
        )),
    }
}

fn round(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("round", args, 1, 2, line)?;
    let n = num_arg("round", &args[0], line)?;
    match args.get(1) {
        None => Ok(Value::from(n.as_f64().round() as i64)),
        Some(digits) => {
            let digits = match num_arg("round", digits, line)? {
                Num::Int(d) => d.clamp(0, 15) as i32,
                Num::Float(_) => {
                    return Err(ScriptError::runtime(line, "round() digits must be an int"));
                }
            };
            let factor = 10f64.powi(digits);
            float_value((n.as_f64() * factor).round() / factor, line)
        }
    }
}

fn abs(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("abs", args, 1, 1, line)?;
    match num_arg("abs", &args[0], line)? {
        Num::Int(i) => i
            .checked_abs()
            .map(Value::from)
            .ok_or_else(|| ScriptError::runtime(line, "integer overflow")),
        Num::Float(f) => float_value(f.abs(), line),
    }
}

/// min/max 既接受单个 list，也接受多个参数
fn extremum(name: &str, args: &[Value], want: Ordering, line: usize) -> Result<Value, ScriptError> {
    let items: &[Value] = match args {
        [Value::Array(items)] => items,
        _ => args,
    };
    let mut iter = items.iter();
    let mut best = iter
        .next()
        .ok_or_else(|| ScriptError::runtime(line, format!("{}() arg is an empty sequence", name)))?;
    for item in iter {
        if compare(item, best, line)? == want {
            best = item;
        }
    }
    Ok(best.clone())
}

fn min(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    extremum("min", args, Ordering::Less, line)
}

fn max(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    extremum("max", args, Ordering::Greater, line)
}

fn sum(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("sum", args, 1, 1, line)?;
    let items = args[0].as_array().ok_or_else(|| {
        ScriptError::runtime(line, format!("sum() expects a list, got {}", type_name(&args[0])))
    })?;
    let mut total = Num::Int(0);
    for item in items {
        let n = num_arg("sum", item, line)?;
        total = match (total, n) {
            (Num::Int(a), Num::Int(b)) => Num::Int(
                a.checked_add(b)
                    .ok_or_else(|| ScriptError::runtime(line, "integer overflow"))?,
            ),
            (a, b) => Num::Float(a.as_f64() + b.as_f64()),
        };
    }
    num_value(total, line)
}

fn range(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("range", args, 1, 3, line)?;
    let mut ints = Vec::with_capacity(args.len());
    for arg in args {
        match num_arg("range", arg, line)? {
            Num::Int(i) => ints.push(i),
            Num::Float(_) => {
                return Err(ScriptError::runtime(line, "range() arguments must be ints"));
            }
        }
    }
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => (0, 0, 1),
    };
    if step == 0 {
        return Err(ScriptError::runtime(line, "range() step must not be zero"));
    }

    let span = if step > 0 {
        stop.saturating_sub(start)
    } else {
        start.saturating_sub(stop)
    };
    let count = if span <= 0 {
        0
    } else {
        (span - 1) / step.saturating_abs() + 1
    };
    if count > MAX_RANGE_LEN {
        return Err(ScriptError::runtime(
            line,
            format!("range() is limited to {} items", MAX_RANGE_LEN),
        ));
    }

    Ok(Value::Array(
        (0..count).map(|i| Value::from(start + i * step)).collect(),
    ))
}

fn type_of(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("type", args, 1, 1, line)?;
    Ok(Value::String(type_name(&args[0]).to_string()))
}

fn assertion_message(args: &[Value], index: usize, default: String) -> String {
    match args.get(index) {
        Some(Value::String(msg)) if !msg.is_empty() => msg.clone(),
        Some(other) if !other.is_null() => stringify(other),
        _ => default,
    }
}

fn assert_equal(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("assert_equal", args, 2, 3, line)?;
    if values_equal(&args[0], &args[1]) {
        return Ok(Value::Bool(true));
    }
    Err(ScriptError::AssertionFailed(assertion_message(
        args,
        2,
        format!("expected {}, got {}", args[1], args[0]),
    )))
}

fn assert_not_equal(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("assert_not_equal", args, 2, 3, line)?;
    if !values_equal(&args[0], &args[1]) {
        return Ok(Value::Bool(true));
    }
    Err(ScriptError::AssertionFailed(assertion_message(
        args,
        2,
        format!("expected value different from {}", args[1]),
    )))
}

fn assert_contains(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("assert_contains", args, 2, 3, line)?;
    if contains(&args[0], &args[1], line)? {
        return Ok(Value::Bool(true));
    }
    Err(ScriptError::AssertionFailed(assertion_message(
        args,
        2,
        format!("{} does not contain {}", args[0], args[1]),
    )))
}

fn assert_greater_than(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("assert_greater_than", args, 2, 3, line)?;
    if compare(&args[0], &args[1], line)? == Ordering::Greater {
        return Ok(Value::Bool(true));
    }
    Err(ScriptError::AssertionFailed(assertion_message(
        args,
        2,
        format!("expected {} > {}", args[0], args[1]),
    )))
}

fn assert_less_than(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("assert_less_than", args, 2, 3, line)?;
    if compare(&args[0], &args[1], line)? == Ordering::Less {
        return Ok(Value::Bool(true));
    }
    Err(ScriptError::AssertionFailed(assertion_message(
        args,
        2,
        format!("expected {} < {}", args[0], args[1]),
    )))
}

fn assert_true(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("assert_true", args, 1, 2, line)?;
    if truthy(&args[0]) {
        return Ok(Value::Bool(true));
    }
    Err(ScriptError::AssertionFailed(assertion_message(
        args,
        1,
        format!("expected truthy value, got {}", args[0]),
    )))
}

fn assert_false(args: &[Value], line: usize) -> Result<Value, ScriptError> {
    arity("assert_false", args, 1, 2, line)?;
    if !truthy(&args[0]) {
        return Ok(Value::Bool(true));
    }
    Err(ScriptError::AssertionFailed(assertion_message(
        args,
        1,
        format!("expected falsy value, got {}", args[0]),
    )))
}
