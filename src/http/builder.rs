use crate::auth::ResolvedAuth;
use crate::http::request::{HeaderLayerKind, HeaderStack, Request, RequestBody};
use crate::model::{ApiDefinition, Environment, TestCase};
use crate::variable::{VariableMap, VariableResolver};
use crate::{Result, RucaseError};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use url::Url;

/// 把 API 定义、用例覆盖、环境与认证组装为一次可派发的请求
pub struct RequestPlan<'a> {
    pub api: &'a ApiDefinition,
    pub case: &'a TestCase,
    pub environment: &'a Environment,
    pub default_content_type: &'a str,
}

impl<'a> RequestPlan<'a> {
    pub fn new(api: &'a ApiDefinition, case: &'a TestCase, environment: &'a Environment) -> Self {
        Self {
            api,
            case,
            environment,
            default_content_type: "application/json",
        }
    }

    pub fn with_default_content_type(mut self, content_type: &'a str) -> Self {
        self.default_content_type = content_type;
        self
    }

    pub fn build(&self, vars: &VariableMap, auth: Option<&ResolvedAuth>) -> Result<Request> {
        let url = resolve_url(
            self.case.url.as_deref(),
            &self.api.url,
            self.environment.base_url.as_deref(),
            vars,
        )?;

        let headers = self.header_stack(auth).merge();
        let headers: Vec<(String, String)> = headers
            .into_iter()
            .map(|(k, v)| {
                let value = VariableResolver::substitute(&v, vars);
                (k, value)
            })
            .collect();

        let body = self.body(vars).and_then(RequestBody::from_value);

        let mut request = Request::new(self.api.method, url.as_str())?
            .with_headers(&headers)?
            .with_body(body);

        for (key, value) in self.params() {
            request = request.with_query(&key, &VariableResolver::substitute(&value, vars));
        }

        Ok(request)
    }

    /// 模板化后的请求体；只有 POST / PUT / PATCH 且内容非空时才发送
    pub fn body(&self, vars: &VariableMap) -> Option<Value> {
        if !self.api.method.carries_body() {
            return None;
        }
        self.case
            .body
            .as_ref()
            .or(self.api.body.as_ref())
            .filter(|b| !is_empty_body(b))
            .map(|b| VariableResolver::resolve_value(b, vars))
    }

    /// 环境前置钩子可见的请求概要 {method, url, path, body}
    ///
    /// URL 无法解析时退回模板化后的原始 URL，错误留给真正构建请求时报告。
    pub fn summary(&self, vars: &VariableMap) -> Value {
        let (url, path) = match resolve_url(
            self.case.url.as_deref(),
            &self.api.url,
            self.environment.base_url.as_deref(),
            vars,
        ) {
            Ok(url) => (url.to_string(), url.path().to_string()),
            Err(_) => {
                let raw = self.case.url.as_deref().filter(|u| !u.trim().is_empty()).unwrap_or(&self.api.url);
                let raw = VariableResolver::substitute(raw, vars);
                (raw.clone(), raw)
            }
        };

        json!({
            "method": self.api.method.as_str(),
            "url": url,
            "path": path,
            "body": self.body(vars).unwrap_or(Value::Null),
        })
    }

    /// default content-type → 环境 → API → 用例覆盖 → 认证注入
    pub fn header_stack(&self, auth: Option<&ResolvedAuth>) -> HeaderStack {
        let mut stack = HeaderStack::new();
        if !self.default_content_type.is_empty() {
            stack.layer(
                HeaderLayerKind::DefaultContentType,
                [("Content-Type", self.default_content_type)],
            );
        }
        stack.layer(HeaderLayerKind::Environment, self.environment.headers.clone());
        stack.layer(HeaderLayerKind::Api, self.api.headers.clone());
        if let Some(overrides) = &self.case.headers {
            stack.layer(HeaderLayerKind::CaseOverride, overrides.clone());
        }
        if let Some(auth) = auth {
            let (name, value) = auth.header();
            stack.layer(HeaderLayerKind::Auth, [(name, value)]);
        }
        stack
    }

    /// API 参数叠加用例覆盖
    fn params(&self) -> BTreeMap<String, String> {
        let mut params = self.api.params.clone();
        if let Some(overrides) = &self.case.params {
            params.extend(overrides.clone());
        }
        params
    }
}

/// 用例 URL 覆盖 > API URL；相对路径拼接环境 base_url
pub fn resolve_url(
    case_url: Option<&str>,
    api_url: &str,
    base_url: Option<&str>,
    vars: &VariableMap,
) -> Result<Url> {
    let raw = case_url
        .filter(|u| !u.trim().is_empty())
        .unwrap_or(api_url);
    let resolved = VariableResolver::substitute(raw.trim(), vars);

    if is_absolute(&resolved) {
        return Url::parse(&resolved).map_err(|e| {
            RucaseError::Configuration(format!("Invalid request URL `{}`: {}", resolved, e))
        });
    }

    let base = base_url
        .map(|b| VariableResolver::substitute(b.trim(), vars))
        .filter(|b| is_absolute(b))
        .ok_or_else(|| {
            RucaseError::Configuration(format!(
                "URL `{}` is relative and no usable base URL is configured",
                resolved
            ))
        })?;

    let joined = if resolved.is_empty() {
        base
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            resolved.trim_start_matches('/')
        )
    };

    Url::parse(&joined).map_err(|e| {
        RucaseError::Configuration(format!("Invalid request URL `{}`: {}", joined, e))
    })
}

fn is_empty_body(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthScheme, AuthSource};
    use crate::http::types::Method;
    use serde_json::json;

    fn vars() -> VariableMap {
        json!({"host": "api.example.com", "id": 9, "user": "alice"})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_resolve_url_override_wins() {
        let url = resolve_url(
            Some("https://${host}/v2/users/${id}"),
            "/v1/users",
            Some("http://base"),
            &vars(),
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v2/users/9");
    }

    #[test]
    fn test_resolve_url_joins_base_path() {
        let url = resolve_url(None, "/users/${id}", Some("http://localhost:8080/api/"), &vars())
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/users/9");

        // 空的用例覆盖不生效
        let url = resolve_url(Some("  "), "users", Some("http://localhost:8080/api"), &vars())
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/users");
    }

    #[test]
    fn test_resolve_url_without_base_is_configuration_error() {
        let result = resolve_url(None, "/users", None, &vars());
        assert!(matches!(result, Err(RucaseError::Configuration(_))));

        let result = resolve_url(None, "/users", Some("not-a-url"), &vars());
        assert!(matches!(result, Err(RucaseError::Configuration(_))));
    }

    #[test]
    fn test_build_layers_and_templates() {
        let api = ApiDefinition::new("a", Method::Post, "/users")
            .with_header("X-Client", "api")
            .with_header("X-User", "${user}")
            .with_body(json!({"name": "${user}", "tags": ["${id}"]}));
        let mut case = TestCase::new("c", "a");
        let mut overrides = BTreeMap::new();
        overrides.insert("x-client".to_string(), "case".to_string());
        case.headers = Some(overrides);
        let mut params = BTreeMap::new();
        params.insert("page".to_string(), "${id}".to_string());
        case.params = Some(params);
        let env = Environment::new("dev", "http://${host}").with_header("X-Env", "dev");

        let auth = ResolvedAuth {
            scheme: AuthScheme::Bearer,
            credential: "tok".to_string(),
            source: AuthSource::ApiDefinition,
        };
        let request = RequestPlan::new(&api, &case, &env)
            .build(&vars(), Some(&auth))
            .unwrap();

        assert_eq!(request.full_url().as_str(), "http://api.example.com/users?page=9");
        assert_eq!(request.headers.get("x-client").unwrap(), "case");
        assert_eq!(request.headers.get("x-user").unwrap(), "alice");
        assert_eq!(request.headers.get("x-env").unwrap(), "dev");
        assert_eq!(request.headers.get("content-type").unwrap(), "application/json");
        assert_eq!(request.headers.get("authorization").unwrap(), "Bearer tok");
        assert_eq!(
            request.body,
            Some(RequestBody::Json(json!({"name": "alice", "tags": ["9"]})))
        );
    }

    #[test]
    fn test_case_body_replaces_api_body() {
        let api = ApiDefinition::new("a", Method::Post, "http://x/y").with_body(json!({"a": 1}));
        let case = TestCase::new("c", "a").with_body(json!("raw ${user}"));
        let env = Environment::default();

        let request = RequestPlan::new(&api, &case, &env).build(&vars(), None).unwrap();
        assert_eq!(request.body, Some(RequestBody::Text("raw alice".to_string())));
    }

    #[test]
    fn test_body_only_for_methods_that_carry_one() {
        let env = Environment::default();
        let case = TestCase::new("c", "a");

        let get = ApiDefinition::new("a", Method::Get, "http://x/y").with_body(json!({"a": 1}));
        let request = RequestPlan::new(&get, &case, &env).build(&vars(), None).unwrap();
        assert_eq!(request.body, None);

        let delete = ApiDefinition::new("a", Method::Delete, "http://x/y").with_body(json!({"a": 1}));
        let request = RequestPlan::new(&delete, &case, &env).build(&vars(), None).unwrap();
        assert_eq!(request.body, None);

        let empty = ApiDefinition::new("a", Method::Post, "http://x/y").with_body(json!({}));
        let request = RequestPlan::new(&empty, &case, &env).build(&vars(), None).unwrap();
        assert_eq!(request.body, None);

        let patch = ApiDefinition::new("a", Method::Patch, "http://x/y").with_body(json!({"a": "${id}"}));
        let request = RequestPlan::new(&patch, &case, &env).build(&vars(), None).unwrap();
        assert_eq!(request.body, Some(RequestBody::Json(json!({"a": "9"}))));
    }

    #[test]
    fn test_summary_for_pre_hooks() {
        let api = ApiDefinition::new("a", Method::Post, "/users/${id}").with_body(json!({"name": "${user}"}));
        let case = TestCase::new("c", "a");
        let env = Environment::new("dev", "http://${host}/v1");

        let summary = RequestPlan::new(&api, &case, &env).summary(&vars());
        assert_eq!(summary["method"], "POST");
        assert_eq!(summary["url"], "http://api.example.com/v1/users/9");
        assert_eq!(summary["path"], "/v1/users/9");
        assert_eq!(summary["body"], json!({"name": "alice"}));

        let broken = Environment::default();
        let summary = RequestPlan::new(&api, &case, &broken).summary(&vars());
        assert_eq!(summary["url"], "/users/9");
        assert_eq!(summary["path"], "/users/9");
    }
}
