use crate::http::types::Method;
use crate::{Result, RucaseError};
use reqwest::header::{HeaderMap as Headers, HeaderName, HeaderValue};
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

/// header 合并层，按声明顺序叠加，后层覆盖前层同名 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLayerKind {
    DefaultContentType,
    Environment,
    Api,
    CaseOverride,
    Auth,
}

impl HeaderLayerKind {
    /// 合并顺序（低 → 高）
    pub const ORDER: [HeaderLayerKind; 5] = [
        HeaderLayerKind::DefaultContentType,
        HeaderLayerKind::Environment,
        HeaderLayerKind::Api,
        HeaderLayerKind::CaseOverride,
        HeaderLayerKind::Auth,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderLayer {
    pub kind: HeaderLayerKind,
    pub headers: Vec<(String, String)>,
}

/// 显式的 header 优先级栈
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderStack {
    layers: Vec<HeaderLayer>,
}

impl HeaderStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入某一层；同一层多次写入会追加
    pub fn layer<I, K, V>(&mut self, kind: HeaderLayerKind, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let headers: Vec<(String, String)> = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        match self.layers.iter_mut().find(|l| l.kind == kind) {
            Some(existing) => existing.headers.extend(headers),
            None => self.layers.push(HeaderLayer { kind, headers }),
        }
        self
    }

    /// 按 ORDER 合并；header 名大小写不敏感，保留首次出现的位置
    pub fn merge(&self) -> Vec<(String, String)> {
        let mut merged: Vec<(String, String)> = Vec::new();
        for kind in HeaderLayerKind::ORDER {
            let Some(layer) = self.layers.iter().find(|l| l.kind == kind) else {
                continue;
            };
            for (name, value) in &layer.headers {
                match merged
                    .iter_mut()
                    .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
                {
                    Some(slot) => *slot = (name.clone(), value.clone()),
                    None => merged.push((name.clone(), value.clone())),
                }
            }
        }
        merged
    }
}

/// 请求体
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Text(String),
}

impl RequestBody {
    /// JSON 字符串按原文发送，其余按 JSON 序列化
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(RequestBody::Text(s)),
            other => Some(RequestBody::Json(other)),
        }
    }

    pub fn to_text(&self) -> Result<String> {
        match self {
            RequestBody::Json(v) => Ok(serde_json::to_string(v)?),
            RequestBody::Text(s) => Ok(s.clone()),
        }
    }
}

/// 已完成合并与模板替换、可直接派发的请求
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    pub body: Option<RequestBody>,
    pub query_params: BTreeMap<String, String>,
}

impl Request {
    pub fn new(method: Method, url: &str) -> Result<Self> {
        Ok(Self {
            method,
            url: Url::parse(url)?,
            headers: Headers::new(),
            body: None,
            query_params: BTreeMap::new(),
        })
    }

    pub fn with_headers(mut self, headers: &[(String, String)]) -> Result<Self> {
        for (key, value) in headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                RucaseError::Configuration(format!("Invalid header name `{}`: {}", key, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                RucaseError::Configuration(format!("Invalid header value for `{}`: {}", key, e))
            })?;
            self.headers.insert(name, value);
        }
        Ok(self)
    }

    pub fn with_body(mut self, body: Option<RequestBody>) -> Self {
        self.body = body;
        self
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query_params.insert(key.to_string(), value.to_string());
        self
    }

    /// 带查询参数的最终 URL
    pub fn full_url(&self) -> Url {
        let mut url = self.url.clone();
        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.query_params {
                pairs.append_pair(k, v);
            }
        }
        url
    }
}
