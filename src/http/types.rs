use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::{Result, RucaseError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl FromStr for Method {
    type Err = RucaseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            _ => Err(RucaseError::Configuration(format!(
                "Invalid HTTP method: {}",
                s
            ))),
        }
    }
}

impl TryFrom<String> for Method {
    type Error = RucaseError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Method> for String {
    fn from(method: Method) -> Self {
        method.as_str().to_string()
    }
}

impl Method {
    pub fn parse(s: &str) -> Result<Self> {
        s.parse()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    /// 只有 POST / PUT / PATCH 发送请求体
    pub fn carries_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(u16);

impl Status {
    pub fn new(code: u16) -> Result<Self> {
        if (100..600).contains(&code) {
            Ok(Self(code))
        } else {
            Err(RucaseError::Other(format!(
                "Invalid HTTP status code: {}",
                code
            )))
        }
    }

    pub fn code(&self) -> u16 {
        self.0
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.0)
    }
}

/// 分类后的网络失败，与断言失败区分
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkFailure {
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("DNS resolution failed: {0}")]
    Dns(String),

    #[error("TLS/certificate error: {0}")]
    Certificate(String),

    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Connection failed: {0}")]
    Other(String),
}

impl NetworkFailure {
    /// 根据 reqwest 错误及其 source 链分类
    pub fn classify(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return NetworkFailure::Timeout(timeout.as_millis() as u64);
        }

        let mut text = err.to_string();
        let mut source = std::error::Error::source(err);
        while let Some(inner) = source {
            text.push_str(": ");
            text.push_str(&inner.to_string());
            source = std::error::Error::source(inner);
        }
        Self::classify_message(&text)
    }

    pub fn classify_message(text: &str) -> Self {
        let lower = text.to_lowercase();
        let message = text.to_string();

        if lower.contains("dns")
            || lower.contains("failed to lookup")
            || lower.contains("name or service not known")
            || lower.contains("nodename nor servname")
            || lower.contains("no such host")
        {
            NetworkFailure::Dns(message)
        } else if lower.contains("certificate") || lower.contains("tls") || lower.contains("ssl") {
            NetworkFailure::Certificate(message)
        } else if lower.contains("connection refused") || lower.contains("actively refused") {
            NetworkFailure::ConnectionRefused(message)
        } else {
            NetworkFailure::Other(message)
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, NetworkFailure::Timeout(_))
    }
}
