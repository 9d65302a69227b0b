use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 字符串键的变量表，值保留 JSON 原生类型
pub type VariableMap = serde_json::Map<String, Value>;

/// 变量层，按读取优先级从高到低排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableLayer {
    /// 运行时注入：调用方种子、提取结果、脚本 set_var
    Runtime,
    Environment,
    Case,
    Credential,
}

impl VariableLayer {
    /// 读取时的优先级顺序
    pub const PRECEDENCE: [VariableLayer; 4] = [
        VariableLayer::Runtime,
        VariableLayer::Environment,
        VariableLayer::Case,
        VariableLayer::Credential,
    ];

    fn slot(self) -> usize {
        match self {
            VariableLayer::Runtime => 0,
            VariableLayer::Environment => 1,
            VariableLayer::Case => 2,
            VariableLayer::Credential => 3,
        }
    }
}

/// 单次用例执行的变量存储
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableStore {
    layers: [VariableMap; 4],
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按优先级读取变量
    pub fn get(&self, name: &str) -> Option<&Value> {
        VariableLayer::PRECEDENCE
            .iter()
            .find_map(|layer| self.layers[layer.slot()].get(name))
    }

    /// 读取变量的字符串形式
    pub fn get_str(&self, name: &str) -> Option<String> {
        self.get(name).map(stringify)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// 写入运行时层
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.insert(VariableLayer::Runtime, name, value);
    }

    pub fn insert(&mut self, layer: VariableLayer, name: impl Into<String>, value: impl Into<Value>) {
        self.layers[layer.slot()].insert(name.into(), value.into());
    }

    pub fn extend(&mut self, layer: VariableLayer, vars: &VariableMap) {
        let target = &mut self.layers[layer.slot()];
        for (k, v) in vars {
            target.insert(k.clone(), v.clone());
        }
    }

    pub fn layer(&self, layer: VariableLayer) -> &VariableMap {
        &self.layers[layer.slot()]
    }

    /// 变量名在某一层中是否存在
    pub fn defined_in(&self, layer: VariableLayer, name: &str) -> bool {
        self.layers[layer.slot()].contains_key(name)
    }

    /// 展平为单层变量表，高优先级覆盖低优先级
    pub fn flatten(&self) -> VariableMap {
        let mut flat = VariableMap::new();
        for layer in VariableLayer::PRECEDENCE.iter().rev() {
            for (k, v) in &self.layers[layer.slot()] {
                flat.insert(k.clone(), v.clone());
            }
        }
        flat
    }

    /// 不同变量名的数量
    pub fn len(&self) -> usize {
        self.flatten().len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(|l| l.is_empty())
    }
}

/// 字符串原样输出，其余值输出 JSON 文本
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_precedence() {
        let mut store = VariableStore::new();
        store.insert(VariableLayer::Credential, "token", "cred");
        assert_eq!(store.get("token"), Some(&json!("cred")));

        store.insert(VariableLayer::Case, "token", "case");
        assert_eq!(store.get("token"), Some(&json!("case")));

        store.insert(VariableLayer::Environment, "token", "env");
        assert_eq!(store.get("token"), Some(&json!("env")));

        store.set("token", "runtime");
        assert_eq!(store.get("token"), Some(&json!("runtime")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_flatten_respects_precedence() {
        let mut store = VariableStore::new();
        store.insert(VariableLayer::Case, "a", 1);
        store.insert(VariableLayer::Environment, "a", 2);
        store.insert(VariableLayer::Case, "b", 3);

        let flat = store.flatten();
        assert_eq!(flat.get("a"), Some(&json!(2)));
        assert_eq!(flat.get("b"), Some(&json!(3)));
    }

    #[test]
    fn test_stringify() {
        assert_eq!(stringify(&json!("abc")), "abc");
        assert_eq!(stringify(&json!(42)), "42");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(stringify(&Value::Null), "");
    }
}
