use crate::Result;
use crate::http::types::Status;
use reqwest::header::HeaderMap as Headers;
use serde_json::{Map, Value, json};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Response {
    pub status: Status,
    pub headers: Headers,
    pub body: String,
    /// 纯网络耗时（发送到读完 body），不含脚本与断言
    pub duration: Duration,
}

impl Response {
    pub fn new(status: u16, headers: Headers, body: String, duration: Duration) -> Result<Self> {
        Ok(Self {
            status: Status::new(status)?,
            headers,
            body,
            duration,
        })
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn time_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }

    /// header 值（名称大小写不敏感）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// 按 JSON 解析 body，非 JSON 返回 None
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    /// 脚本中只读的 `response` 绑定
    pub fn to_binding(&self, json: Option<&Value>) -> Value {
        let headers: Map<String, Value> = self
            .headers
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), Value::from(v.to_str().ok()?))))
            .collect();

        json!({
            "status_code": self.status.code(),
            "headers": headers,
            "body": self.body,
            "json": json.cloned().unwrap_or(Value::Null),
            "time_ms": self.time_ms(),
        })
    }
}
