use thiserror::Error;

use crate::http::types::NetworkFailure;
use crate::script::ScriptError;

#[derive(Error, Debug)]
pub enum RucaseError {
    /// URL 无法解析、缺少必需的覆盖项等，只中止当前用例
    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("网络错误: {0}")]
    Network(#[from] NetworkFailure),

    #[error("脚本错误: {0}")]
    Script(#[from] ScriptError),

    #[error("未找到 {kind}: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("执行记录存储错误: {0}")]
    Storage(String),

    #[error("引擎未启动或已停止")]
    Stopped,

    #[error("HTTP 请求失败: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML 解析错误: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("URL 解析错误: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("{0}")]
    Other(String),
}

impl RucaseError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        RucaseError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// 网络类错误需要与断言失败区分开展示
    pub fn is_network(&self) -> bool {
        matches!(self, RucaseError::Network(_))
    }
}

impl From<anyhow::Error> for RucaseError {
    fn from(err: anyhow::Error) -> Self {
        RucaseError::Other(err.to_string())
    }
}

/// Result type for rucase crate
pub type Result<T> = std::result::Result<T, RucaseError>;
