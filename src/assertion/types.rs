use crate::model::AssertionType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 单条断言的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionOutcome {
    #[serde(rename = "type")]
    pub kind: AssertionType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// 期望值
    pub expected: Option<Value>,

    /// 实际值，无法取得时为 None
    pub actual: Option<Value>,

    pub success: bool,

    pub message: String,
}

impl AssertionOutcome {
    /// 创建通过的断言结果
    pub fn success(kind: AssertionType, expected: Option<Value>, actual: Option<Value>) -> Self {
        Self {
            kind,
            name: None,
            expected,
            actual,
            success: true,
            message: "passed".to_string(),
        }
    }

    /// 创建失败的断言结果
    pub fn failure(
        kind: AssertionType,
        expected: Option<Value>,
        actual: Option<Value>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: None,
            expected,
            actual,
            success: false,
            message: message.into(),
        }
    }

    pub fn named(mut self, name: Option<&str>) -> Self {
        self.name = name.map(|n| n.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_wire_format() {
        let outcome = AssertionOutcome::failure(
            AssertionType::StatusCode,
            Some(Value::from(200)),
            Some(Value::from(404)),
            "Expected status 200, got 404",
        );
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["type"], "status_code");
        assert_eq!(json["success"], false);
        assert_eq!(json["actual"], 404);
        assert!(json.get("name").is_none());
    }
}
