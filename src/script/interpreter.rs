use crate::script::ast::{BinaryOp, Callee, Expr, Program, Stmt, Target, UnaryOp};
use crate::script::builtins::{Capability, CapabilityTable};
use crate::script::error::ScriptError;
use crate::script::sandbox::ScriptScope;
use crate::script::value::{self, Num, as_num, contains, num_value, truthy, type_name};
use crate::variable::store::stringify;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// 树遍历解释器
///
/// 局部变量优先于只读绑定（case / api / environment / response），
/// 每条语句、每次循环迭代和每次调用都消耗一步预算。
pub struct Interpreter<'s, 'a> {
    scope: &'s mut ScriptScope<'a>,
    capabilities: &'s CapabilityTable,
    locals: HashMap<String, Value>,
    steps: u64,
    budget: u64,
}

impl<'s, 'a> Interpreter<'s, 'a> {
    pub fn new(scope: &'s mut ScriptScope<'a>, capabilities: &'s CapabilityTable, budget: u64) -> Self {
        Self {
            scope,
            capabilities,
            locals: HashMap::new(),
            steps: 0,
            budget,
        }
    }

    pub fn run(&mut self, program: &Program) -> Result<(), ScriptError> {
        self.block(&program.body)
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    fn tick(&mut self) -> Result<(), ScriptError> {
        self.steps += 1;
        if self.steps > self.budget {
            return Err(ScriptError::BudgetExceeded(self.budget));
        }
        Ok(())
    }

    fn block(&mut self, body: &[Stmt]) -> Result<(), ScriptError> {
        body.iter().try_for_each(|stmt| self.stmt(stmt))
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), ScriptError> {
        self.tick()?;
        match stmt {
            Stmt::Assign {
                target,
                value,
                line,
            } => {
                let value = self.eval(value)?;
                self.assign(target, value, *line)
            }
            Stmt::If {
                branches,
                otherwise,
                ..
            } => {
                for (cond, body) in branches {
                    if truthy(&self.eval(cond)?) {
                        return self.block(body);
                    }
                }
                match otherwise {
                    Some(body) => self.block(body),
                    None => Ok(()),
                }
            }
            Stmt::For {
                var,
                iter,
                body,
                line,
            } => {
                let items = match self.eval(iter)? {
                    Value::Array(items) => items,
                    Value::Object(map) => map.into_iter().map(|(k, _)| Value::String(k)).collect(),
                    Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
                    other => {
                        return Err(ScriptError::runtime(
                            *line,
                            format!("{} is not iterable", type_name(&other)),
                        ));
                    }
                };
                for item in items {
                    self.tick()?;
                    self.assign(&Target::Name(var.clone()), item, *line)?;
                    self.block(body)?;
                }
                Ok(())
            }
            Stmt::Expr { expr, .. } => self.eval(expr).map(|_| ()),
            // 校验器已拒绝，这里只是兜底
            Stmt::Import { keyword, line, .. } => Err(ScriptError::Rejected(format!(
                "`{}` is not allowed (line {})",
                keyword, line
            ))),
        }
    }

    fn assign(&mut self, target: &Target, value: Value, line: usize) -> Result<(), ScriptError> {
        match target {
            Target::Name(name) => {
                if !self.locals.contains_key(name) && self.scope.bindings.contains_key(name) {
                    return Err(ScriptError::runtime(
                        line,
                        format!("`{}` is read-only", name),
                    ));
                }
                self.locals.insert(name.clone(), value);
                Ok(())
            }
            Target::Index { name, index } => {
                let key = self.eval(index)?;
                let is_binding = self.scope.bindings.contains_key(name);
                let container = self.locals.get_mut(name).ok_or_else(|| {
                    if is_binding {
                        ScriptError::runtime(line, format!("`{}` is read-only", name))
                    } else {
                        ScriptError::runtime(line, format!("name `{}` is not defined", name))
                    }
                })?;
                match container {
                    Value::Object(map) => {
                        let key = key.as_str().ok_or_else(|| {
                            ScriptError::runtime(line, "dict keys must be str")
                        })?;
                        map.insert(key.to_string(), value);
                        Ok(())
                    }
                    Value::Array(items) => {
                        let slot = list_slot(items.len(), &key, line)?;
                        items[slot] = value;
                        Ok(())
                    }
                    other => Err(ScriptError::runtime(
                        line,
                        format!("{} does not support item assignment", type_name(other)),
                    )),
                }
            }
        }
    }

    fn lookup(&self, name: &str, line: usize) -> Result<Value, ScriptError> {
        self.locals
            .get(name)
            .or_else(|| self.scope.bindings.get(name))
            .cloned()
            .ok_or_else(|| ScriptError::runtime(line, format!("name `{}` is not defined", name)))
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Name { name, line } => self.lookup(name, *line),
            Expr::List(items) => items
                .iter()
                .map(|e| self.eval(e))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Map(entries) => {
                let mut map = Map::new();
                for (k, v) in entries {
                    let key = stringify(&self.eval(k)?);
                    let value = self.eval(v)?;
                    map.insert(key, value);
                }
                Ok(Value::Object(map))
            }
            Expr::Unary { op, expr, line } => {
                let v = self.eval(expr)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!truthy(&v))),
                    UnaryOp::Neg => match as_num(&v) {
                        Some(Num::Int(i)) => i
                            .checked_neg()
                            .map(Value::from)
                            .ok_or_else(|| ScriptError::runtime(*line, "integer overflow")),
                        Some(Num::Float(f)) => num_value(Num::Float(-f), *line),
                        None => Err(ScriptError::runtime(
                            *line,
                            format!("bad operand type for unary -: {}", type_name(&v)),
                        )),
                    },
                }
            }
            Expr::Binary { op, lhs, rhs, line } => match op {
                BinaryOp::And => {
                    let l = self.eval(lhs)?;
                    if !truthy(&l) { Ok(l) } else { self.eval(rhs) }
                }
                BinaryOp::Or => {
                    let l = self.eval(lhs)?;
                    if truthy(&l) { Ok(l) } else { self.eval(rhs) }
                }
                _ => {
                    let l = self.eval(lhs)?;
                    let r = self.eval(rhs)?;
                    value::binary(*op, &l, &r, *line)
                }
            },
            Expr::Index { base, index, line } => {
                let base = self.eval(base)?;
                let index = self.eval(index)?;
                index_value(&base, &index, *line)
            }
            Expr::Attr { base, name, line } => match self.eval(base)? {
                Value::Object(map) => map.get(name).cloned().ok_or_else(|| {
                    ScriptError::runtime(*line, format!("dict has no field `{}`", name))
                }),
                other => Err(ScriptError::runtime(
                    *line,
                    format!("{} has no attribute `{}`", type_name(&other), name),
                )),
            },
            Expr::Call { callee, args, line } => {
                self.tick()?;
                match callee {
                    Callee::Function(name) => self.call_function(name, args, *line),
                    Callee::Method { receiver, name } => self.call_method(receiver, name, args, *line),
                }
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, ScriptError> {
        args.iter().map(|a| self.eval(a)).collect()
    }

    fn call_function(&mut self, name: &str, args: &[Expr], line: usize) -> Result<Value, ScriptError> {
        let capability = self.capabilities.get(name).ok_or_else(|| {
            ScriptError::Rejected(format!("function `{}` is not available (line {})", name, line))
        })?;
        let args = self.eval_args(args)?;
        match capability {
            Capability::Pure(f) => f(&args, line),
            Capability::Stateful(f) => f(&args, &mut *self.scope, line),
        }
    }

    fn call_method(&mut self, receiver: &Expr, name: &str, args: &[Expr], line: usize) -> Result<Value, ScriptError> {
        let args = self.eval_args(args)?;

        // append 原地修改局部 list
        if name == "append" {
            let Expr::Name { name: var, .. } = receiver else {
                return Err(ScriptError::runtime(line, "append() needs a list variable as receiver"));
            };
            let [item] = args.as_slice() else {
                return Err(ScriptError::runtime(line, "append() takes exactly 1 argument"));
            };
            return match self.locals.get_mut(var) {
                Some(Value::Array(items)) => {
                    value::check_list_len(items.len() + 1, line)?;
                    items.push(item.clone());
                    Ok(Value::Null)
                }
                Some(other) => Err(ScriptError::runtime(
                    line,
                    format!("{} has no method append()", type_name(other)),
                )),
                None => Err(ScriptError::runtime(
                    line,
                    format!("append() needs a local list, `{}` is not one", var),
                )),
            };
        }

        let target = self.eval(receiver)?;
        call_method(&target, name, &args, line)
    }
}

fn list_slot(len: usize, key: &Value, line: usize) -> Result<usize, ScriptError> {
    let idx = match as_num(key) {
        Some(Num::Int(i)) if !key.is_boolean() => i,
        _ => return Err(ScriptError::runtime(line, "list indices must be int")),
    };
    let resolved = if idx < 0 { len as i64 + idx } else { idx };
    if resolved < 0 || resolved >= len as i64 {
        return Err(ScriptError::runtime(line, format!("list index {} out of range", idx)));
    }
    Ok(resolved as usize)
}

fn index_value(base: &Value, index: &Value, line: usize) -> Result<Value, ScriptError> {
    match base {
        Value::Array(items) => Ok(items[list_slot(items.len(), index, line)?].clone()),
        Value::Object(map) => {
            let key = stringify(index);
            map.get(&key)
                .cloned()
                .ok_or_else(|| ScriptError::runtime(line, format!("key {:?} not found", key)))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::String(chars[list_slot(chars.len(), index, line)?].to_string()))
        }
        other => Err(ScriptError::runtime(
            line,
            format!("{} is not subscriptable", type_name(other)),
        )),
    }
}

fn call_method(target: &Value, name: &str, args: &[Value], line: usize) -> Result<Value, ScriptError> {
    let unsupported = || {
        ScriptError::runtime(
            line,
            format!("{} has no method {}()", type_name(target), name),
        )
    };
    let str_arg = |i: usize| -> Result<&str, ScriptError> {
        args.get(i)
            .and_then(Value::as_str)
            .ok_or_else(|| ScriptError::runtime(line, format!("{}() expects a str argument", name)))
    };

    match (name, target) {
        ("get", Value::Object(map)) => {
            let key = stringify(args.first().unwrap_or(&Value::Null));
            Ok(map
                .get(&key)
                .cloned()
                .or_else(|| args.get(1).cloned())
                .unwrap_or(Value::Null))
        }
        ("get", Value::Array(items)) => {
            let found = args
                .first()
                .and_then(|k| list_slot(items.len(), k, line).ok())
                .map(|i| items[i].clone());
            Ok(found.or_else(|| args.get(1).cloned()).unwrap_or(Value::Null))
        }
        ("keys", Value::Object(map)) => Ok(Value::Array(
            map.keys().cloned().map(Value::String).collect(),
        )),
        ("values", Value::Object(map)) => Ok(Value::Array(map.values().cloned().collect())),
        ("contains", _) => {
            let item = args
                .first()
                .ok_or_else(|| ScriptError::runtime(line, "contains() takes 1 argument"))?;
            contains(target, item, line).map(Value::Bool)
        }
        ("upper", Value::String(s)) => Ok(Value::String(s.to_uppercase())),
        ("lower", Value::String(s)) => Ok(Value::String(s.to_lowercase())),
        ("strip", Value::String(s)) => Ok(Value::String(s.trim().to_string())),
        ("split", Value::String(s)) => {
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Null) => s
                    .split_whitespace()
                    .map(|p| Value::String(p.to_string()))
                    .collect(),
                Some(_) => {
                    let sep = str_arg(0)?;
                    if sep.is_empty() {
                        return Err(ScriptError::runtime(line, "split() separator is empty"));
                    }
                    s.split(sep).map(|p| Value::String(p.to_string())).collect()
                }
            };
            Ok(Value::Array(parts))
        }
        ("startswith", Value::String(s)) => Ok(Value::Bool(s.starts_with(str_arg(0)?))),
        ("endswith", Value::String(s)) => Ok(Value::Bool(s.ends_with(str_arg(0)?))),
        _ => Err(unsupported()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parser::parse_program;
    use crate::script::sandbox::ScriptMode;
    use crate::variable::VariableStore;
    use serde_json::json;

    fn run(source: &str, store: &mut VariableStore) -> Result<Vec<String>, ScriptError> {
        let mut scope = ScriptScope::new(store).bind("case", json!({"name": "login"}));
        let table = CapabilityTable::for_mode(ScriptMode::Assertion);
        let program = parse_program(source)?;
        Interpreter::new(&mut scope, &table, 10_000).run(&program)?;
        Ok(scope.output)
    }

    #[test]
    fn test_variables_and_control_flow() {
        let mut store = VariableStore::new();
        store.set("count", 3);
        let source = r#"
total = 0
for i in range(get_var('count')) { total = total + i }
if total == 3 { set_var('total', total) } else { set_var('total', -1) }
"#;
        run(source, &mut store).unwrap();
        assert_eq!(store.get("total"), Some(&json!(3)));
    }

    #[test]
    fn test_collections_and_methods() {
        let mut store = VariableStore::new();
        let source = r#"
items = []
items.append('A b')
m = {'k': items}
m['n'] = len(m['k'])
print(m['k'][-1].lower().split(), m.get('missing', 'dflt'), m.n)
"#;
        let output = run(source, &mut store).unwrap();
        assert_eq!(output, vec![r#"["a","b"] dflt 1"#.to_string()]);
    }

    #[test]
    fn test_bindings_are_read_only() {
        let mut store = VariableStore::new();
        assert!(run("print(case.name)", &mut store).is_ok());
        let err = run("case = 1", &mut store).unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { line: 1, .. }));
        assert!(run("case['name'] = 'x'", &mut store).is_err());
    }

    #[test]
    fn test_short_circuit() {
        let mut store = VariableStore::new();
        // 右侧未定义也不会求值
        run("x = true or undefined_name\ny = false and undefined_name", &mut store).unwrap();
    }

    #[test]
    fn test_runtime_errors_carry_line() {
        let mut store = VariableStore::new();
        let err = run("a = 1\nb = a / 0", &mut store).unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { line: 2, .. }));
        assert!(run("x = [1][5]", &mut store).is_err());
        assert!(run("x = missing", &mut store).is_err());
    }

    #[test]
    fn test_step_budget() {
        let mut store = VariableStore::new();
        let mut scope = ScriptScope::new(&mut store);
        let table = CapabilityTable::for_mode(ScriptMode::Hook);
        let program = parse_program("for i in range(1000) { for j in range(1000) { x = j } }").unwrap();
        let err = Interpreter::new(&mut scope, &table, 500).run(&program).unwrap_err();
        assert_eq!(err, ScriptError::BudgetExceeded(500));
    }

    #[test]
    fn test_assertion_signal_propagates() {
        let mut store = VariableStore::new();
        let err = run("assert_equal(1, 2, 'nope')\nprint('unreachable')", &mut store).unwrap_err();
        assert_eq!(err, ScriptError::AssertionFailed("nope".to_string()));
    }
}
