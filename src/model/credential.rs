use crate::variable::VariableMap;
use crate::{Result, RucaseError};
use serde::{Deserialize, Serialize};

/// 全局凭据的认证方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    Bearer,
    #[serde(alias = "drf_token")]
    Token,
    #[serde(alias = "custom-header", alias = "header")]
    CustomHeader,
}

/// 平台级兜底凭据，用例自身未配置认证时使用
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GlobalCredential {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub kind: CredentialKind,

    /// 密钥值，本身也可以是 `${var}` 模板
    pub value: String,

    /// custom_header 使用的 header 名
    #[serde(default)]
    pub header_name: Option<String>,

    /// custom_header 值的前缀，未设置时为 "Bearer"，空字符串表示不加前缀
    #[serde(default, alias = "token_format")]
    pub format: Option<String>,

    /// 凭据自带的变量，注入变量存储的凭据层（`value` 中的模板通常引用这里）
    #[serde(default)]
    pub variables: VariableMap,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub is_default: bool,
}

fn default_true() -> bool {
    true
}

impl GlobalCredential {
    pub fn bearer(id: impl Into<String>, value: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: CredentialKind::Bearer,
            value: value.into(),
            header_name: None,
            format: None,
            variables: VariableMap::new(),
            is_active: true,
            is_default: false,
        }
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// custom_header 使用的前缀；None 表示直接发送凭据
    pub fn prefix(&self) -> Option<&str> {
        match self.format.as_deref().map(str::trim) {
            None => Some("Bearer"),
            Some("") => None,
            Some(format) => Some(format),
        }
    }
}

/// 全局凭据集合
///
/// 不变量：活跃凭据中至多一个 is_default，写入时校验
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CredentialSet {
    items: Vec<GlobalCredential>,
}

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从已有列表构建，违反默认凭据约束时报错
    pub fn from_vec(items: Vec<GlobalCredential>) -> Result<Self> {
        let set = Self { items };
        set.validate()?;
        Ok(set)
    }

    pub fn validate(&self) -> Result<()> {
        let defaults: Vec<&str> = self
            .items
            .iter()
            .filter(|c| c.is_active && c.is_default)
            .map(|c| c.id.as_str())
            .collect();

        if defaults.len() > 1 {
            return Err(RucaseError::Configuration(format!(
                "Only one active default credential is allowed, found: {}",
                defaults.join(", ")
            )));
        }
        Ok(())
    }

    /// 写入（或替换同 id 的）凭据
    pub fn insert(&mut self, credential: GlobalCredential) -> Result<()> {
        if credential.is_active
            && credential.is_default
            && let Some(existing) = self
                .items
                .iter()
                .find(|c| c.is_active && c.is_default && c.id != credential.id)
        {
            return Err(RucaseError::Configuration(format!(
                "Credential '{}' is already the active default",
                existing.id
            )));
        }

        match self.items.iter_mut().find(|c| c.id == credential.id) {
            Some(slot) => *slot = credential,
            None => self.items.push(credential),
        }
        Ok(())
    }

    /// 当前生效的凭据：优先 is_default，否则第一个活跃的
    pub fn active(&self) -> Option<&GlobalCredential> {
        self.items
            .iter()
            .find(|c| c.is_active && c.is_default)
            .or_else(|| self.items.iter().find(|c| c.is_active))
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &GlobalCredential> {
        self.items.iter().filter(|c| c.is_active)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

impl<'de> Deserialize<'de> for CredentialSet {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let items = Vec::<GlobalCredential>::deserialize(deserializer)?;
        CredentialSet::from_vec(items).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_prefers_default() {
        let set = CredentialSet::from_vec(vec![
            GlobalCredential::bearer("first", "a"),
            GlobalCredential::bearer("second", "b").as_default(),
        ])
        .unwrap();

        assert_eq!(set.active().unwrap().id, "second");
    }

    #[test]
    fn test_active_falls_back_to_first_active() {
        let mut inactive = GlobalCredential::bearer("off", "x").as_default();
        inactive.is_active = false;
        let set =
            CredentialSet::from_vec(vec![inactive, GlobalCredential::bearer("on", "y")]).unwrap();

        assert_eq!(set.active().unwrap().id, "on");
    }

    #[test]
    fn test_two_active_defaults_rejected() {
        let result = CredentialSet::from_vec(vec![
            GlobalCredential::bearer("a", "1").as_default(),
            GlobalCredential::bearer("b", "2").as_default(),
        ]);
        assert!(matches!(result, Err(RucaseError::Configuration(_))));
    }

    #[test]
    fn test_insert_enforces_single_default() {
        let mut set = CredentialSet::new();
        set.insert(GlobalCredential::bearer("a", "1").as_default())
            .unwrap();
        assert!(set.insert(GlobalCredential::bearer("b", "2").as_default()).is_err());

        // 替换自身不算冲突
        set.insert(GlobalCredential::bearer("a", "updated").as_default())
            .unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.active().unwrap().value, "updated");
    }

    #[test]
    fn test_prefix_defaults_to_bearer() {
        let mut credential = GlobalCredential::bearer("h", "abc");
        assert_eq!(credential.prefix(), Some("Bearer"));

        credential.format = Some("Token".to_string());
        assert_eq!(credential.prefix(), Some("Token"));

        credential.format = Some(String::new());
        assert_eq!(credential.prefix(), None);
    }

    #[test]
    fn test_deserialize_with_variables() {
        let credential: GlobalCredential = serde_json::from_str(
            r#"{"id":"g","kind":"custom_header","value":"${api_key}","token_format":"","variables":{"api_key":"k-1"}}"#,
        )
        .unwrap();
        assert_eq!(credential.prefix(), None);
        assert_eq!(credential.variables.get("api_key"), Some(&serde_json::json!("k-1")));
        assert!(credential.is_active);
    }

    #[test]
    fn test_empty_set_has_no_active() {
        assert!(CredentialSet::new().active().is_none());
    }
}
