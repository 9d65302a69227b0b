use crate::http::types::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// API 定义：一个可复用的 HTTP 端点描述
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiDefinition {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default = "default_method")]
    pub method: Method,

    /// 绝对 URL 或相对于环境 base_url 的路径
    pub url: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// 请求体模板（JSON 值；字符串按原文发送）
    #[serde(default)]
    pub body: Option<Value>,

    #[serde(default)]
    pub auth: Option<AuthDescriptor>,
}

fn default_method() -> Method {
    Method::Get
}

impl ApiDefinition {
    pub fn new(id: impl Into<String>, method: Method, url: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            params: BTreeMap::new(),
            body: None,
            auth: None,
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_auth(mut self, auth: AuthDescriptor) -> Self {
        self.auth = Some(auth);
        self
    }
}

/// API 上显式声明的认证方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Bearer,
    #[serde(alias = "drf_token")]
    Token,
    Basic,
    #[serde(alias = "custom-header", alias = "header")]
    CustomHeader,
    ApiKey,
}

/// 认证描述 {type, config}，config 中的值都支持 `${var}` 模板
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AuthDescriptor {
    #[serde(rename = "type")]
    pub kind: AuthType,

    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl AuthDescriptor {
    pub fn bearer(token: impl Into<String>) -> Self {
        let mut config = BTreeMap::new();
        config.insert("token".to_string(), token.into());
        Self {
            kind: AuthType::Bearer,
            config,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(|s| s.as_str())
    }
}
