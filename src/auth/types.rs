use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

/// 认证方案
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    Bearer,
    Token,
    /// credential 为 "username:password"
    Basic,
    /// 自定义 header；有前缀时值为 "{prefix} {credential}"
    CustomHeader {
        header_name: String,
        prefix: Option<String>,
    },
}

/// 凭据来源，用于日志与排查
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSource {
    ApiDefinition,
    DynamicToken(String),
    GlobalCredential(String),
}

/// 解析结果 {scheme, credential}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAuth {
    pub scheme: AuthScheme,
    pub credential: String,
    pub source: AuthSource,
}

impl ResolvedAuth {
    /// Authorization header 的值；custom header 方案不走这里，返回 None
    pub fn authorization_value(&self) -> Option<String> {
        match &self.scheme {
            AuthScheme::Bearer => Some(format!("Bearer {}", self.credential)),
            AuthScheme::Token => Some(format!("Token {}", self.credential)),
            AuthScheme::Basic => Some(format!("Basic {}", BASE64.encode(&self.credential))),
            AuthScheme::CustomHeader { .. } => None,
        }
    }

    /// 需要注入的 header（名称, 值）
    pub fn header(&self) -> (String, String) {
        match &self.scheme {
            AuthScheme::CustomHeader {
                header_name,
                prefix,
            } => {
                let value = match prefix.as_deref().map(str::trim) {
                    Some(p) if !p.is_empty() => format!("{} {}", p, self.credential),
                    _ => self.credential.clone(),
                };
                (header_name.clone(), value)
            }
            _ => (
                "Authorization".to_string(),
                self.authorization_value().unwrap_or_default(),
            ),
        }
    }
}
