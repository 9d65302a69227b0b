use crate::config::EngineConfig;
use crate::http::Client;
use crate::model::{CredentialSet, Environment, TestSuite};
use crate::runner::suite::resolve_environment;
use crate::runner::{
    CaseContext, CaseExecutor, CaseResult, CaseRun, ParameterizedResult, Recorder, SuiteOrchestrator, SuiteResult,
};
use crate::script::{ScriptMode, ScriptSandbox};
use crate::store::{EntityLoader, JsonlRecordStore, MemoryRecordStore, RecordStore, Workspace};
use crate::variable::VariableMap;
use crate::{Result, RucaseError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// 测试执行引擎
///
/// 显式构造的服务对象：持有共享的 HTTP 客户端、脚本沙箱、记录存储与实体加载器。
/// `Send + Sync`，可以放进 `Arc` 在多个任务间共享；每次运行使用私有的变量存储。
///
/// ```no_run
/// # async fn demo() -> rucase::Result<()> {
/// use rucase::{Engine, config::EngineConfig, store::Workspace};
/// use std::sync::Arc;
///
/// let workspace = Workspace::load("workspace.toml")?;
/// let engine = Engine::new(EngineConfig::default())?.with_loader(Arc::new(workspace));
/// engine.start();
/// let result = engine.run_suite_by_id("smoke", None, &Default::default()).await?;
/// println!("{}%", result.pass_rate);
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    config: EngineConfig,
    client: Client,
    sandbox: ScriptSandbox,
    recorder: Recorder,
    loader: Arc<dyn EntityLoader>,
    running: AtomicBool,
}

impl Engine {
    /// 新建的引擎处于停止状态，需要调用 `start()`
    pub fn new(config: EngineConfig) -> Result<Self> {
        let client = Client::new(config.request_timeout())?;
        let sandbox = ScriptSandbox::new(&config);
        let store: Arc<dyn RecordStore> = match &config.record_log {
            Some(path) => Arc::new(JsonlRecordStore::new(path.clone())),
            None => Arc::new(MemoryRecordStore::new()),
        };

        Ok(Self {
            config,
            client,
            sandbox,
            recorder: Recorder::new(store),
            loader: Arc::new(Workspace::default()),
            running: AtomicBool::new(false),
        })
    }

    pub fn with_record_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.recorder = Recorder::new(store);
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn EntityLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn record_store(&self) -> Arc<dyn RecordStore> {
        Arc::clone(self.recorder.store())
    }

    pub fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("Engine started");
        }
    }

    /// 正在进行的运行不受影响，之后的新运行会被拒绝
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(RucaseError::Stopped)
        }
    }

    fn orchestrator(&self) -> SuiteOrchestrator<'_> {
        let executor = CaseExecutor::new(&self.client, &self.sandbox, &self.config);
        SuiteOrchestrator::new(executor, &self.recorder)
    }

    /// 执行一次用例（不展开参数化数据）
    pub async fn run_case(&self, ctx: CaseContext<'_>, seed: &VariableMap) -> Result<CaseResult> {
        self.ensure_running()?;
        let mut shared = seed.clone();
        Ok(self.orchestrator().run_single(ctx, &mut shared, None).await)
    }

    /// 按数据行逐次执行，记录为一个父记录加每行一个子记录
    pub async fn run_parameterized_case(&self, ctx: CaseContext<'_>, seed: &VariableMap) -> Result<ParameterizedResult> {
        self.ensure_running()?;
        let mut shared = seed.clone();
        Ok(self.orchestrator().run_parameterized(ctx, &mut shared, None).await)
    }

    pub async fn run_suite(
        &self,
        suite: &TestSuite,
        environment: &Environment,
        credentials: &CredentialSet,
        seed: &VariableMap,
    ) -> Result<SuiteResult> {
        self.ensure_running()?;
        Ok(self
            .orchestrator()
            .run_suite(suite, environment, credentials, seed, self.loader.as_ref())
            .await)
    }

    /// 通过加载器取实体后执行；参数化用例自动展开
    pub async fn run_case_by_id(&self, case_id: &str, environment_id: Option<&str>, seed: &VariableMap) -> Result<CaseRun> {
        self.ensure_running()?;
        let loader = self.loader.as_ref();
        let case = loader.load_case(case_id).await?;
        let api = loader.load_api(&case.api_id).await?;
        let environment = resolve_environment(loader, environment_id, case.environment_id.as_deref()).await?;
        let credentials = loader.load_credentials().await?;

        let ctx = CaseContext {
            api: &api,
            case: &case,
            environment: &environment,
            credentials: &credentials,
        };
        let mut shared = seed.clone();
        Ok(self.orchestrator().run_any(ctx, &mut shared, None).await)
    }

    pub async fn run_suite_by_id(&self, suite_id: &str, environment_id: Option<&str>, seed: &VariableMap) -> Result<SuiteResult> {
        self.ensure_running()?;
        let loader = self.loader.as_ref();
        let suite = loader.load_suite(suite_id).await?;
        let environment = resolve_environment(loader, environment_id, suite.environment_id.as_deref()).await?;
        let credentials = loader.load_credentials().await?;
        self.run_suite(&suite, &environment, &credentials, seed).await
    }

    /// 只做静态校验，不执行
    pub fn check_script(&self, source: &str, mode: ScriptMode) -> Result<()> {
        self.sandbox.check(source, mode)?;
        Ok(())
    }
}
