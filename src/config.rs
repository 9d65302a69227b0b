use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 引擎配置（rucase.toml）
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// 单次请求超时（秒），超时即为最终失败，不重试
    pub request_timeout_secs: u64,

    /// 超时结果上报的固定耗时（毫秒），缺省等于超时时间
    pub timeout_sentinel_ms: Option<u64>,

    /// 脚本大小上限（字节）
    pub script_max_bytes: usize,

    /// 单个脚本最多执行的步数
    pub script_step_budget: u64,

    /// 追加到默认禁用列表的能力名
    pub script_denylist_extra: Vec<String>,

    /// 默认 Content-Type（header 合并的第一层）
    pub default_content_type: String,

    /// 执行记录日志文件（JSON Lines），为空时只保存在内存中
    pub record_log: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            timeout_sentinel_ms: None,
            script_max_bytes: 10 * 1024,
            script_step_budget: 100_000,
            script_denylist_extra: Vec::new(),
            default_content_type: "application/json".to_string(),
            record_log: None,
        }
    }
}

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn timeout_sentinel_ms(&self) -> u64 {
        self.timeout_sentinel_ms
            .unwrap_or(self.request_timeout_secs.saturating_mul(1000))
    }
}

/// 配置文件加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 配置文件名
    const CONFIG_FILE: &'static str = "rucase.toml";

    /// 从指定路径加载配置文件
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<EngineConfig> {
        let content = fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&content)?)
    }

    /// 查找并加载配置文件
    /// 查找顺序：
    /// 1. 当前目录及父目录
    /// 2. 用户配置目录 ~/.config/rucase/
    pub fn find_and_load() -> Option<EngineConfig> {
        Self::try_load_from_current_dir().or_else(Self::try_load_from_user_dir)
    }

    fn try_load_from_current_dir() -> Option<EngineConfig> {
        let mut current = std::env::current_dir().ok()?;

        loop {
            let config_path = current.join(Self::CONFIG_FILE);
            if config_path.exists() {
                return Self::load_logged(&config_path);
            }

            if !current.pop() {
                break;
            }
        }

        None
    }

    fn try_load_from_user_dir() -> Option<EngineConfig> {
        let home = dirs::home_dir()?;
        let config_path = home.join(".config").join("rucase").join(Self::CONFIG_FILE);

        if config_path.exists() {
            Self::load_logged(&config_path)
        } else {
            None
        }
    }

    fn load_logged(path: &Path) -> Option<EngineConfig> {
        match Self::load_from_path(path) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "Loaded engine config");
                Some(config)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "Ignoring invalid config file: {}", e);
                None
            }
        }
    }

    /// 解析 CLI 变量参数 "key=value"
    pub fn parse_cli_var(s: &str) -> Option<(String, String)> {
        s.split_once('=')
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
    }
}
