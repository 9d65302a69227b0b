use crate::model::{CredentialSet, Environment, RecordKind, RecordUpdate, TestSuite};
use crate::runner::case::{CaseContext, CaseExecutor};
use crate::runner::recorder::Recorder;
use crate::runner::types::{CaseResult, CaseRun, ParameterizedResult, SuiteResult};
use crate::store::EntityLoader;
use crate::variable::VariableMap;
use crate::{Result, RucaseError};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 套件编排：按顺序执行用例，在用例之间传递共享变量
///
/// 单个用例的失败（包括加载失败）只影响它自己，套件总会执行完毕。
pub struct SuiteOrchestrator<'e> {
    executor: CaseExecutor<'e>,
    recorder: &'e Recorder,
}

impl<'e> SuiteOrchestrator<'e> {
    pub fn new(executor: CaseExecutor<'e>, recorder: &'e Recorder) -> Self {
        Self { executor, recorder }
    }

    /// 执行单次用例，提取到的变量合并回 shared
    pub async fn run_single(&self, ctx: CaseContext<'_>, shared: &mut VariableMap, parent: Option<Uuid>) -> CaseResult {
        let case = ctx.case;
        let record = self
            .recorder
            .open(parent, RecordKind::Case, &case.id, case.display_name())
            .await;

        let result = self.executor.execute(ctx, shared).await;
        merge(shared, &result.extracted_variables);

        self.recorder
            .finish(record, RecordUpdate::finish_leaf(result.clone()))
            .await;
        result
    }

    /// 参数化用例：每行数据叠加在 shared 的副本上执行一次
    ///
    /// 数据行本身不会写回 shared，各次迭代提取的变量按顺序合并回去。
    pub async fn run_parameterized(
        &self,
        ctx: CaseContext<'_>,
        shared: &mut VariableMap,
        parent: Option<Uuid>,
    ) -> ParameterizedResult {
        let case = ctx.case;
        let started = Instant::now();
        let record = self
            .recorder
            .open(parent, RecordKind::Case, &case.id, case.display_name())
            .await;

        let rows = case.parameter_rows(ctx.environment);
        let mut iterations = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let iteration = index + 1;
            let name = format!("{} [{}]", case.display_name(), iteration);
            let child = self
                .recorder
                .open(record, RecordKind::Iteration, &case.id, &name)
                .await;

            let mut seed = shared.clone();
            merge(&mut seed, row);

            let mut result = self.executor.execute(ctx, &seed).await;
            result.iteration = Some(iteration);
            result.name = name;
            merge(shared, &result.extracted_variables);

            self.recorder
                .finish(child, RecordUpdate::finish_leaf(result.clone()))
                .await;
            iterations.push(result);
        }

        let result = ParameterizedResult::new(&case.id, case.display_name(), iterations);
        info!(
            case = %case.id,
            total = result.summary.total,
            passed = result.summary.passed,
            "Parameterized case finished"
        );
        self.recorder
            .finish(
                record,
                RecordUpdate::finish_parent(result.summary, started.elapsed().as_millis() as u64),
            )
            .await;
        result
    }

    /// 参数化用例展开，其余执行一次
    pub async fn run_any(&self, ctx: CaseContext<'_>, shared: &mut VariableMap, parent: Option<Uuid>) -> CaseRun {
        if ctx.case.expands(ctx.environment) {
            CaseRun::Parameterized(self.run_parameterized(ctx, shared, parent).await)
        } else {
            CaseRun::Single(self.run_single(ctx, shared, parent).await)
        }
    }

    pub async fn run_suite(
        &self,
        suite: &TestSuite,
        environment: &Environment,
        credentials: &CredentialSet,
        seed: &VariableMap,
        loader: &dyn EntityLoader,
    ) -> SuiteResult {
        let started = Instant::now();
        let suite_name = if suite.name.is_empty() { &suite.id } else { &suite.name };
        let record = self
            .recorder
            .open(None, RecordKind::Suite, &suite.id, suite_name)
            .await;

        let entries = suite.ordered_entries();
        info!(suite = %suite.id, cases = entries.len(), "Running suite");

        // 共享变量以环境变量为底，调用方种子覆盖其上
        let mut shared = environment.variables.clone();
        merge(&mut shared, seed);

        let mut case_results = Vec::new();
        for entry in entries {
            let loaded = async {
                let case = loader.load_case(&entry.case_id).await?;
                let api = loader.load_api(&case.api_id).await?;
                Ok::<_, RucaseError>((case, api))
            }
            .await;

            let (case, api) = match loaded {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(case = %entry.case_id, "Skipping case that failed to load: {}", e);
                    case_results.push(self.record_load_failure(&entry.case_id, record, &e).await);
                    continue;
                }
            };
            if !case.is_active {
                debug!(case = %case.id, "Skipping inactive case");
                continue;
            }

            let ctx = CaseContext {
                api: &api,
                case: &case,
                environment,
                credentials,
            };
            match self.run_any(ctx, &mut shared, record).await {
                CaseRun::Single(result) => case_results.push(result),
                CaseRun::Parameterized(result) => case_results.extend(result.iterations),
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let result = SuiteResult::from_results(&suite.id, suite_name, case_results, duration_ms);
        info!(
            suite = %suite.id,
            total = result.total,
            passed = result.passed,
            failed = result.failed,
            pass_rate = result.pass_rate,
            "Suite finished"
        );

        self.recorder
            .finish(record, RecordUpdate::finish_parent(result.summary(), duration_ms))
            .await;
        result
    }

    async fn record_load_failure(&self, case_id: &str, parent: Option<Uuid>, error: &RucaseError) -> CaseResult {
        let record = self
            .recorder
            .open(parent, RecordKind::Case, case_id, case_id)
            .await;
        self.recorder
            .finish(record, RecordUpdate::failed(error.to_string()))
            .await;
        CaseResult::failed(case_id, case_id, error.to_string())
    }
}

fn merge(target: &mut VariableMap, source: &VariableMap) {
    for (k, v) in source {
        target.insert(k.clone(), v.clone());
    }
}

/// 按 ID 运行时用到的环境解析：显式指定 > 用例/套件声明 > 空环境
pub async fn resolve_environment(loader: &dyn EntityLoader, explicit: Option<&str>, declared: Option<&str>) -> Result<Environment> {
    match explicit.or(declared) {
        Some(id) => loader.load_environment(id).await,
        None => Ok(Environment::default()),
    }
}
