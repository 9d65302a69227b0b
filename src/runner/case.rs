use crate::assertion::{AssertionEvaluator, case_passed};
use crate::auth::AuthResolver;
use crate::config::EngineConfig;
use crate::http::{Client, RequestPlan, Response};
use crate::model::{ApiDefinition, CredentialSet, Environment, TestCase};
use crate::runner::types::{CaseResult, CaseState};
use crate::script::{ScriptMode, ScriptSandbox, ScriptScope};
use crate::variable::{VariableLayer, VariableMap, VariableStore, extract_variables};
use crate::{Result, RucaseError};
use serde_json::Value;
use tracing::{debug, warn};

/// 一次用例执行所需的只读实体
#[derive(Clone, Copy)]
pub struct CaseContext<'a> {
    pub api: &'a ApiDefinition,
    pub case: &'a TestCase,
    pub environment: &'a Environment,
    pub credentials: &'a CredentialSet,
}

/// 用例执行器
///
/// Created → PreHooksRun → Dispatched → PostHooksRun → Finalized，严格顺序推进。
/// 任何错误都在这里转为失败结果，调用方总能拿到终态结果。
pub struct CaseExecutor<'e> {
    client: &'e Client,
    sandbox: &'e ScriptSandbox,
    config: &'e EngineConfig,
}

/// 钩子共享的变量存储与输出
struct HookRun<'h> {
    store: &'h mut VariableStore,
    output: &'h mut Vec<String>,
}

/// 状态推进，只用于日志追踪
struct Progress<'c> {
    case_id: &'c str,
    state: CaseState,
}

impl Progress<'_> {
    fn advance(&mut self, next: CaseState) {
        debug!(case = %self.case_id, from = %self.state, to = %next, "Case state transition");
        self.state = next;
    }
}

impl<'e> CaseExecutor<'e> {
    pub fn new(client: &'e Client, sandbox: &'e ScriptSandbox, config: &'e EngineConfig) -> Self {
        Self {
            client,
            sandbox,
            config,
        }
    }

    /// 执行单个用例；seed 写入运行时层（调用方种子、套件共享变量或参数化数据行）
    pub async fn execute(&self, ctx: CaseContext<'_>, seed: &VariableMap) -> CaseResult {
        let case = ctx.case;
        let mut progress = Progress {
            case_id: &case.id,
            state: CaseState::Created,
        };

        let mut store = Self::build_store(ctx, seed);
        let seeded_runtime = store.layer(VariableLayer::Runtime).clone();
        let mut bindings = Self::bindings(ctx);
        bindings.insert(
            "request".to_string(),
            RequestPlan::new(ctx.api, case, ctx.environment).summary(&store.flatten()),
        );
        let mut output = Vec::new();

        let mut result = CaseResult::new(
            &case.id,
            case.display_name(),
            ctx.api.method.as_str(),
            case.url.as_deref().unwrap_or(&ctx.api.url),
        );

        // 前置钩子：环境 → 用例
        let mut hooks = HookRun {
            store: &mut store,
            output: &mut output,
        };
        self.run_hook(ctx.environment.pre_script.as_deref(), "environment pre", &mut hooks, &bindings);
        self.run_hook(case.pre_script.as_deref(), "case pre", &mut hooks, &bindings);
        progress.advance(CaseState::PreHooksRun);

        match self.dispatch(ctx, &store, &mut result).await {
            Ok(response) => {
                progress.advance(CaseState::Dispatched);
                let json = response.json();

                let extracted = extract_variables(&case.extractors, &response);
                store.extend(VariableLayer::Runtime, &extracted);

                bindings.insert("response".to_string(), response.to_binding(json.as_ref()));

                let mut evaluator = AssertionEvaluator::new(self.sandbox, bindings.clone());
                let outcomes = evaluator.evaluate_all(&case.assertions, &response, json.as_ref(), &mut store);
                output.extend(evaluator.into_output());

                result.success = case_passed(&outcomes, response.status);
                result.assertions = outcomes;
                result.status_code = Some(response.status.code());
                result.time_ms = response.time_ms();
                result.headers = response.headers;
                result.body = response.body;
                result.parsed_json = json;

                // 后置钩子：用例 → 环境
                let mut hooks = HookRun {
                    store: &mut store,
                    output: &mut output,
                };
                self.run_hook(case.post_script.as_deref(), "case post", &mut hooks, &bindings);
                self.run_hook(ctx.environment.post_script.as_deref(), "environment post", &mut hooks, &bindings);
                progress.advance(CaseState::PostHooksRun);
            }
            Err(e) => {
                result.success = false;
                result.status_code = None;
                result.time_ms = match &e {
                    RucaseError::Network(failure) if failure.is_timeout() => {
                        self.config.timeout_sentinel_ms()
                    }
                    _ => 0,
                };
                warn!(case = %case.id, "Case failed before assertions: {}", e);
                result.error = Some(e.to_string());
            }
        }

        result.extracted_variables = runtime_changes(&seeded_runtime, store.layer(VariableLayer::Runtime));
        result.script_output = output;
        progress.advance(CaseState::Finalized);

        debug!(
            case = %case.id,
            success = result.success,
            status = ?result.status_code,
            time_ms = result.time_ms,
            "Case finalized"
        );
        result
    }

    /// 解析认证、构建请求并派发；URL 与方法在构建成功后回填到结果
    async fn dispatch(&self, ctx: CaseContext<'_>, store: &VariableStore, result: &mut CaseResult) -> Result<Response> {
        let vars = store.flatten();
        let auth = AuthResolver::new(ctx.credentials).resolve(ctx.api, store)?;

        let request = RequestPlan::new(ctx.api, ctx.case, ctx.environment)
            .with_default_content_type(&self.config.default_content_type)
            .build(&vars, auth.as_ref())?;

        result.method = request.method.as_str().to_string();
        result.url = request.full_url().to_string();

        self.client.execute(request).await
    }

    fn build_store(ctx: CaseContext<'_>, seed: &VariableMap) -> VariableStore {
        let mut store = VariableStore::new();
        store.extend(VariableLayer::Credential, &AuthResolver::new(ctx.credentials).credential_variables());
        store.extend(VariableLayer::Case, &ctx.case.variables);
        store.extend(VariableLayer::Environment, &ctx.environment.variables);
        store.extend(VariableLayer::Runtime, seed);
        store
    }

    /// 脚本可见的只读定义；`request` 概要在前置钩子之前绑定
    fn bindings(ctx: CaseContext<'_>) -> VariableMap {
        let mut bindings = VariableMap::new();
        bindings.insert("case".to_string(), to_binding(ctx.case));
        bindings.insert("api".to_string(), to_binding(ctx.api));
        bindings.insert("environment".to_string(), to_binding(ctx.environment));
        bindings
    }

    /// 钩子是尽力而为的：被拒绝或运行出错只记录日志，不中止用例
    fn run_hook(&self, script: Option<&str>, label: &str, hooks: &mut HookRun<'_>, bindings: &VariableMap) {
        let Some(source) = script.filter(|s| !s.trim().is_empty()) else {
            return;
        };

        let mut scope = ScriptScope::new(&mut *hooks.store);
        scope.bindings = bindings.clone();
        let outcome = self.sandbox.run(source, ScriptMode::Hook, &mut scope);
        hooks.output.append(&mut scope.output);

        match outcome {
            Ok(()) => debug!(hook = label, "Hook finished"),
            Err(e) => warn!(hook = label, "Hook failed, continuing: {}", e),
        }
    }
}

fn to_binding<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// 运行时层中新增或被改写的变量
fn runtime_changes(before: &VariableMap, after: &VariableMap) -> VariableMap {
    after
        .iter()
        .filter(|(k, v)| before.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
