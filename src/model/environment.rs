use crate::model::ParameterRow;
use crate::variable::VariableMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 运行环境：base URL、环境变量、默认 header 与钩子脚本
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Environment {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub variables: VariableMap,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub pre_script: Option<String>,

    #[serde(default)]
    pub post_script: Option<String>,

    /// 参数化用例自身没有数据行时使用的默认数据行
    #[serde(default)]
    pub parameters: Vec<ParameterRow>,
}

impl Environment {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            base_url: Some(base_url.into()),
            ..Default::default()
        }
    }

    pub fn with_variable(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.variables.insert(key.to_string(), value.into());
        self
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }
}
