use crate::model::{ApiDefinition, CredentialSet, Environment, TestCase, TestSuite};
use crate::store::EntityLoader;
use crate::{Result, RucaseError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 工作区文件：一次性加载的实体快照（TOML 或 JSON）
///
/// ```toml
/// [[apis]]
/// id = "login"
/// method = "POST"
/// url = "/auth/login"
///
/// [[cases]]
/// id = "login-ok"
/// api_id = "login"
/// extractors = { token = "data.token" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Workspace {
    pub apis: Vec<ApiDefinition>,
    pub cases: Vec<TestCase>,
    pub suites: Vec<TestSuite>,
    pub environments: Vec<Environment>,
    pub credentials: CredentialSet,
}

impl Workspace {
    /// 按扩展名选择格式：`.json` 为 JSON，其余按 TOML 解析
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let workspace = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content)?,
            _ => Self::from_toml_str(&content)?,
        };
        tracing::debug!(
            path = %path.display(),
            apis = workspace.apis.len(),
            cases = workspace.cases.len(),
            suites = workspace.suites.len(),
            "Loaded workspace"
        );
        Ok(workspace)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn with_api(mut self, api: ApiDefinition) -> Self {
        self.apis.push(api);
        self
    }

    pub fn with_case(mut self, case: TestCase) -> Self {
        self.cases.push(case);
        self
    }

    pub fn with_suite(mut self, suite: TestSuite) -> Self {
        self.suites.push(suite);
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environments.push(environment);
        self
    }

    pub fn with_credentials(mut self, credentials: CredentialSet) -> Self {
        self.credentials = credentials;
        self
    }

    fn find<'a, T>(items: &'a [T], kind: &'static str, id: &str, key: impl Fn(&T) -> &str) -> Result<&'a T> {
        items
            .iter()
            .find(|item| key(item) == id)
            .ok_or_else(|| RucaseError::not_found(kind, id))
    }
}

#[async_trait]
impl EntityLoader for Workspace {
    async fn load_api(&self, id: &str) -> Result<ApiDefinition> {
        Self::find(&self.apis, "api", id, |a| a.id.as_str()).cloned()
    }

    async fn load_case(&self, id: &str) -> Result<TestCase> {
        Self::find(&self.cases, "case", id, |c| c.id.as_str()).cloned()
    }

    async fn load_suite(&self, id: &str) -> Result<TestSuite> {
        Self::find(&self.suites, "suite", id, |s| s.id.as_str()).cloned()
    }

    async fn load_environment(&self, id: &str) -> Result<Environment> {
        Self::find(&self.environments, "environment", id, |e| e.id.as_str()).cloned()
    }

    async fn load_credentials(&self) -> Result<CredentialSet> {
        Ok(self.credentials.clone())
    }
}
