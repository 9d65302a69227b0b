use crate::model::{Environment, ParameterRow};
use crate::variable::VariableMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// 测试用例：对某个 API 定义的一次具体调用
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TestCase {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub api_id: String,

    /// 覆盖套件/调用方指定的环境
    #[serde(default)]
    pub environment_id: Option<String>,

    /// 用例级覆盖
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub params: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub body: Option<Value>,

    #[serde(default)]
    pub assertions: Vec<AssertionSpec>,

    /// 变量提取规则 {变量名 → 来源路径}
    #[serde(default)]
    pub extractors: BTreeMap<String, String>,

    /// 用例声明的变量（优先级低于环境变量）
    #[serde(default)]
    pub variables: VariableMap,

    #[serde(default)]
    pub pre_script: Option<String>,

    #[serde(default)]
    pub post_script: Option<String>,

    #[serde(default)]
    pub is_parameterized: bool,

    #[serde(default)]
    pub parameters: Vec<ParameterRow>,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl TestCase {
    pub fn new(id: impl Into<String>, api_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            api_id: api_id.into(),
            environment_id: None,
            url: None,
            headers: None,
            params: None,
            body: None,
            assertions: Vec::new(),
            extractors: BTreeMap::new(),
            variables: VariableMap::new(),
            pre_script: None,
            post_script: None,
            is_parameterized: false,
            parameters: Vec::new(),
            is_active: true,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_assertion(mut self, assertion: AssertionSpec) -> Self {
        self.assertions.push(assertion);
        self
    }

    pub fn with_extractor(mut self, name: &str, source: &str) -> Self {
        self.extractors.insert(name.to_string(), source.to_string());
        self
    }

    pub fn with_parameters(mut self, rows: Vec<ParameterRow>) -> Self {
        self.is_parameterized = true;
        self.parameters = rows;
        self
    }

    /// 参数化数据行：用例自身的优先，没有时取环境的
    pub fn parameter_rows<'a>(&'a self, environment: &'a Environment) -> &'a [ParameterRow] {
        if !self.is_parameterized {
            &[]
        } else if self.parameters.is_empty() {
            &environment.parameters
        } else {
            &self.parameters
        }
    }

    /// 是否需要展开为多次子运行
    pub fn expands(&self, environment: &Environment) -> bool {
        !self.parameter_rows(environment).is_empty()
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// 断言类型，持久化格式需保持向后兼容
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionType {
    StatusCode,
    ResponseTime,
    Contains,
    JsonPath,
    Equals,
    #[serde(alias = "script")]
    Manual,
}

impl AssertionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusCode => "status_code",
            Self::ResponseTime => "response_time",
            Self::Contains => "contains",
            Self::JsonPath => "json_path",
            Self::Equals => "equals",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for AssertionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// json_path 断言的运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonPathOperator {
    #[default]
    Equals,
    Contains,
    Exists,
}

/// 断言配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AssertionSpec {
    #[serde(rename = "type")]
    pub kind: AssertionType,

    #[serde(default, alias = "value")]
    pub expected: Option<Value>,

    /// json_path / equals 使用的路径
    #[serde(default, alias = "json_path")]
    pub path: Option<String>,

    #[serde(default)]
    pub operator: JsonPathOperator,

    /// manual 断言的脚本
    #[serde(default)]
    pub script: Option<String>,

    /// 展示用标签
    #[serde(default, alias = "description")]
    pub name: Option<String>,
}

impl AssertionSpec {
    fn of(kind: AssertionType, expected: Option<Value>) -> Self {
        Self {
            kind,
            expected,
            path: None,
            operator: JsonPathOperator::default(),
            script: None,
            name: None,
        }
    }

    pub fn status_code(code: u16) -> Self {
        Self::of(AssertionType::StatusCode, Some(Value::from(code)))
    }

    pub fn response_time(max_ms: u64) -> Self {
        Self::of(AssertionType::ResponseTime, Some(Value::from(max_ms)))
    }

    pub fn contains(text: &str) -> Self {
        Self::of(AssertionType::Contains, Some(Value::from(text)))
    }

    pub fn json_path(path: &str, operator: JsonPathOperator, expected: Option<Value>) -> Self {
        let mut spec = Self::of(AssertionType::JsonPath, expected);
        spec.path = Some(path.to_string());
        spec.operator = operator;
        spec
    }

    pub fn equals(path: Option<&str>, expected: Value) -> Self {
        let mut spec = Self::of(AssertionType::Equals, Some(expected));
        spec.path = path.map(|p| p.to_string());
        spec
    }

    pub fn script(source: &str) -> Self {
        let mut spec = Self::of(AssertionType::Manual, None);
        spec.script = Some(source.to_string());
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assertion_wire_format() {
        let specs: Vec<AssertionSpec> = serde_json::from_value(serde_json::json!([
            {"type": "status_code", "expected": 200},
            {"type": "json_path", "path": "data.id", "operator": "exists"},
            {"type": "script", "script": "assert_true(true)"},
            {"type": "equals", "expected": "ok"}
        ]))
        .unwrap();

        assert_eq!(specs[0].kind, AssertionType::StatusCode);
        assert_eq!(specs[1].operator, JsonPathOperator::Exists);
        assert_eq!(specs[2].kind, AssertionType::Manual);
        assert_eq!(specs[3].operator, JsonPathOperator::Equals);
    }

    #[test]
    fn test_assertion_legacy_keys() {
        let specs: Vec<AssertionSpec> = serde_json::from_value(serde_json::json!([
            {"type": "json_path", "json_path": "$.data.id", "value": 7},
            {"type": "manual", "script": "assert_true(true)", "description": "登录成功"}
        ]))
        .unwrap();

        assert_eq!(specs[0].path.as_deref(), Some("$.data.id"));
        assert_eq!(specs[0].expected, Some(serde_json::json!(7)));
        assert_eq!(specs[1].name.as_deref(), Some("登录成功"));
    }

    #[test]
    fn test_case_defaults() {
        let case: TestCase =
            serde_json::from_value(serde_json::json!({"id": "c1", "api_id": "a1"})).unwrap();
        assert!(case.is_active);
        assert!(!case.expands(&Environment::default()));
        assert_eq!(case.display_name(), "c1");
    }

    #[test]
    fn test_parameter_rows_fall_back_to_environment() {
        let row = serde_json::json!({"n": 1}).as_object().unwrap().clone();
        let mut environment = Environment::default();
        environment.parameters = vec![row.clone()];

        let plain = TestCase::new("c", "a");
        assert!(!plain.expands(&environment));

        let mut flagged = TestCase::new("c", "a");
        flagged.is_parameterized = true;
        assert_eq!(flagged.parameter_rows(&environment), &[row.clone()][..]);

        let own = TestCase::new("c", "a").with_parameters(vec![row.clone(), row]);
        assert_eq!(own.parameter_rows(&environment).len(), 2);
    }
}
