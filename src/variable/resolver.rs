use crate::variable::store::{VariableMap, stringify};
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::OnceLock;

/// 变量替换器
///
/// 单遍替换：替换进来的文本不会被再次扫描，未知变量保持原样
pub struct VariableResolver;

impl VariableResolver {
    fn placeholder() -> &'static Regex {
        static VAR_REGEX: OnceLock<Regex> = OnceLock::new();
        VAR_REGEX.get_or_init(|| {
            Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.\-]*)\}").expect("placeholder regex is valid")
        })
    }

    /// 替换文本中的所有 ${variable} 占位符
    pub fn substitute(text: &str, vars: &VariableMap) -> String {
        Self::placeholder()
            .replace_all(text, |caps: &Captures| match vars.get(&caps[1]) {
                Some(value) => stringify(value),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// 深度优先处理嵌套结构，保持 key 顺序和列表顺序；key 本身不替换
    pub fn resolve_value(value: &Value, vars: &VariableMap) -> Value {
        match value {
            Value::String(s) => Value::String(Self::substitute(s, vars)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| Self::resolve_value(v, vars)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::resolve_value(v, vars)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}
