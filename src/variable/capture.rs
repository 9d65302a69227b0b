use crate::http::Response;
use crate::variable::path::JsonPath;
use crate::variable::store::VariableMap;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// 变量捕获来源
///
/// 语法（持久化格式，需保持兼容）:
/// - `status_code` → 状态码（整数）
/// - `header.X-Token` → 响应 header（大小写不敏感）
/// - `body` → 原始响应文本
/// - `time` → 网络耗时（毫秒）
/// - 其余一律按 JSON 路径处理：`data.items[0].id` / `orders.0.id` / `$.token` / `body.token`
/// - 空字符串 → 不提取
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    StatusCode,
    Header(String),
    Body,
    ResponseTime,
    JsonPath(JsonPath),
    Empty,
}

impl CaptureSource {
    pub fn parse(source: &str) -> Self {
        let source = source.trim();
        match source {
            "" => CaptureSource::Empty,
            "status_code" => CaptureSource::StatusCode,
            "body" => CaptureSource::Body,
            "time" => CaptureSource::ResponseTime,
            _ => match source.strip_prefix("header.") {
                Some(name) => CaptureSource::Header(name.to_string()),
                None => CaptureSource::JsonPath(response_path(source)),
            },
        }
    }
}

/// 解析针对响应 JSON 的路径，允许 `body.` 前缀
pub fn response_path(raw: &str) -> JsonPath {
    let raw = raw.trim();
    JsonPath::parse(raw.strip_prefix("body.").unwrap_or(raw))
}

/// 变量捕获配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableCapture {
    /// 变量名称
    pub name: String,

    /// 捕获来源
    pub source: CaptureSource,
}

impl VariableCapture {
    pub fn parse(var_name: &str, source_str: &str) -> Self {
        Self {
            name: var_name.to_string(),
            source: CaptureSource::parse(source_str),
        }
    }

    /// 从响应中提取；找不到时返回 None
    pub fn capture(&self, response: &Response, json: Option<&Value>) -> Option<Value> {
        match &self.source {
            CaptureSource::Empty => None,
            CaptureSource::StatusCode => Some(Value::from(response.status.code())),
            CaptureSource::Header(name) => response.header(name).map(Value::from),
            CaptureSource::Body => Some(Value::String(response.body.clone())),
            CaptureSource::ResponseTime => Some(Value::from(response.time_ms())),
            CaptureSource::JsonPath(path) => json.and_then(|root| path.lookup(root)).cloned(),
        }
    }
}

/// 按提取规则从响应中收集变量
///
/// Best-effort：单个变量提取失败只记录日志，不影响其他变量
pub fn extract_variables(extractors: &BTreeMap<String, String>, response: &Response) -> VariableMap {
    let mut extracted = VariableMap::new();
    if extractors.is_empty() {
        return extracted;
    }

    let json = response.json();

    for (name, source) in extractors {
        let capture = VariableCapture::parse(name, source);
        if capture.source == CaptureSource::Empty {
            continue;
        }
        match capture.capture(response, json.as_ref()) {
            Some(value) => {
                debug!(variable = %name, source = %source, "Extracted variable");
                extracted.insert(name.clone(), value);
            }
            None => {
                debug!(variable = %name, source = %source, "Extraction skipped: source not found");
            }
        }
    }

    extracted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::types::Status;
    use reqwest::header::HeaderMap;
    use serde_json::json;
    use std::time::Duration;

    fn create_test_response(status: u16, body: &str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace-id", "trace-1".parse().unwrap());

        Response {
            status: Status::new(status).unwrap(),
            headers,
            body: body.to_string(),
            duration: Duration::from_millis(87),
        }
    }

    #[test]
    fn test_parse_sources() {
        assert_eq!(CaptureSource::parse("status_code"), CaptureSource::StatusCode);
        assert_eq!(CaptureSource::parse("body"), CaptureSource::Body);
        assert_eq!(CaptureSource::parse(""), CaptureSource::Empty);
        assert_eq!(
            CaptureSource::parse("header.X-Trace-Id"),
            CaptureSource::Header("X-Trace-Id".to_string())
        );
        assert_eq!(
            CaptureSource::parse("body.user.id"),
            CaptureSource::JsonPath(JsonPath::parse("user.id"))
        );
    }

    #[test]
    fn test_unknown_keywords_are_json_paths() {
        assert_eq!(
            CaptureSource::parse("status"),
            CaptureSource::JsonPath(JsonPath::parse("status"))
        );
        assert_eq!(
            CaptureSource::parse("headers.X-Trace-Id"),
            CaptureSource::JsonPath(JsonPath::parse("headers.X-Trace-Id"))
        );
        assert_eq!(
            CaptureSource::parse("response_time"),
            CaptureSource::JsonPath(JsonPath::parse("response_time"))
        );

        let response = create_test_response(200, r#"{"status":"ok","headers":{"X-Trace-Id":"from-json"}}"#);
        let mut extractors = BTreeMap::new();
        extractors.insert("state".to_string(), "status".to_string());
        extractors.insert("trace".to_string(), "headers.X-Trace-Id".to_string());

        let vars = extract_variables(&extractors, &response);
        assert_eq!(vars.get("state"), Some(&json!("ok")));
        assert_eq!(vars.get("trace"), Some(&json!("from-json")));
    }

    #[test]
    fn test_extract_all_kinds() {
        let response = create_test_response(201, r#"{"orders":[{"id":42}],"token":"abc"}"#);
        let mut extractors = BTreeMap::new();
        extractors.insert("code".to_string(), "status_code".to_string());
        extractors.insert("trace".to_string(), "header.X-Trace-Id".to_string());
        extractors.insert("order_id".to_string(), "orders.0.id".to_string());
        extractors.insert("token".to_string(), "$.token".to_string());
        extractors.insert("elapsed".to_string(), "time".to_string());

        let vars = extract_variables(&extractors, &response);
        assert_eq!(vars.get("code"), Some(&json!(201)));
        assert_eq!(vars.get("trace"), Some(&json!("trace-1")));
        assert_eq!(vars.get("order_id"), Some(&json!(42)));
        assert_eq!(vars.get("token"), Some(&json!("abc")));
        assert_eq!(vars.get("elapsed"), Some(&json!(87)));
    }

    #[test]
    fn test_failed_extraction_does_not_abort_others() {
        let response = create_test_response(200, r#"{"orders":[]}"#);
        let mut extractors = BTreeMap::new();
        extractors.insert("a_missing".to_string(), "orders.3.id".to_string());
        extractors.insert("b_header".to_string(), "header.X-Missing".to_string());
        extractors.insert("c_noop".to_string(), "".to_string());
        extractors.insert("d_status".to_string(), "status_code".to_string());

        let vars = extract_variables(&extractors, &response);
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("d_status"), Some(&json!(200)));
    }

    #[test]
    fn test_json_path_on_non_json_body() {
        let response = create_test_response(200, "plain text");
        let mut extractors = BTreeMap::new();
        extractors.insert("id".to_string(), "data.id".to_string());
        extractors.insert("raw".to_string(), "body".to_string());

        let vars = extract_variables(&extractors, &response);
        assert_eq!(vars.get("id"), None);
        assert_eq!(vars.get("raw"), Some(&json!("plain text")));
    }
}
