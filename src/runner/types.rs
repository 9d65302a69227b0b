use crate::assertion::AssertionOutcome;
use crate::model::RunSummary;
use crate::variable::VariableMap;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 用例执行的状态机，严格顺序推进
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CaseState {
    Created,
    PreHooksRun,
    Dispatched,
    PostHooksRun,
    Finalized,
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::PreHooksRun => "pre_hooks_run",
            Self::Dispatched => "dispatched",
            Self::PostHooksRun => "post_hooks_run",
            Self::Finalized => "finalized",
        };
        write!(f, "{}", s)
    }
}

/// 单个用例（或参数化迭代）的执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_id: String,

    pub name: String,

    /// 参数化迭代序号（从 1 开始）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<usize>,

    pub method: String,

    pub url: String,

    /// 超时或连接失败时没有状态码
    pub status_code: Option<u16>,

    #[serde(default, with = "crate::http::serialization::header_map")]
    pub headers: HeaderMap,

    #[serde(default)]
    pub body: String,

    #[serde(default)]
    pub parsed_json: Option<Value>,

    /// 网络耗时（毫秒）；超时为固定哨兵值
    pub time_ms: u64,

    pub success: bool,

    #[serde(default)]
    pub assertions: Vec<AssertionOutcome>,

    #[serde(default)]
    pub error: Option<String>,

    /// 本次执行写入运行时层的变量（提取结果与脚本 set_var）
    #[serde(default)]
    pub extracted_variables: VariableMap,

    /// 钩子与脚本断言中 print 的输出
    #[serde(default)]
    pub script_output: Vec<String>,
}

impl CaseResult {
    pub fn new(case_id: &str, name: &str, method: &str, url: &str) -> Self {
        Self {
            case_id: case_id.to_string(),
            name: name.to_string(),
            iteration: None,
            method: method.to_string(),
            url: url.to_string(),
            status_code: None,
            headers: HeaderMap::new(),
            body: String::new(),
            parsed_json: None,
            time_ms: 0,
            success: false,
            assertions: Vec::new(),
            error: None,
            extracted_variables: VariableMap::new(),
            script_output: Vec::new(),
        }
    }

    /// 未能执行的用例（加载失败、配置错误等）
    pub fn failed(case_id: &str, name: &str, error: impl Into<String>) -> Self {
        let mut result = Self::new(case_id, name, "", "");
        result.error = Some(error.into());
        result
    }

    pub fn passed_assertions(&self) -> usize {
        self.assertions.iter().filter(|a| a.success).count()
    }
}

/// 参数化用例的结果：父记录只有聚合，迭代各自携带 HTTP 结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterizedResult {
    pub case_id: String,
    pub name: String,
    #[serde(flatten)]
    pub summary: RunSummary,
    pub iterations: Vec<CaseResult>,
}

impl ParameterizedResult {
    pub fn new(case_id: &str, name: &str, iterations: Vec<CaseResult>) -> Self {
        let passed = iterations.iter().filter(|r| r.success).count();
        Self {
            case_id: case_id.to_string(),
            name: name.to_string(),
            summary: RunSummary::from_counts(iterations.len(), passed),
            iterations,
        }
    }
}

/// 单个用例的执行产物：普通用例一个结果，参数化用例一组迭代
#[derive(Debug, Clone, PartialEq)]
pub enum CaseRun {
    Single(CaseResult),
    Parameterized(ParameterizedResult),
}

impl CaseRun {
    pub fn results(&self) -> &[CaseResult] {
        match self {
            CaseRun::Single(result) => std::slice::from_ref(result),
            CaseRun::Parameterized(result) => &result.iterations,
        }
    }

    pub fn summary(&self) -> RunSummary {
        match self {
            CaseRun::Single(result) => RunSummary::from_counts(1, usize::from(result.success)),
            CaseRun::Parameterized(result) => result.summary,
        }
    }
}

/// 套件执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteResult {
    pub suite_id: String,
    pub name: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    pub duration_ms: u64,
    /// 按执行顺序排列；参数化用例的每次迭代各占一项
    pub case_results: Vec<CaseResult>,
}

impl SuiteResult {
    pub fn from_results(suite_id: &str, name: &str, case_results: Vec<CaseResult>, duration_ms: u64) -> Self {
        let passed = case_results.iter().filter(|r| r.success).count();
        let summary = RunSummary::from_counts(case_results.len(), passed);
        Self {
            suite_id: suite_id.to_string(),
            name: name.to_string(),
            total: summary.total,
            passed: summary.passed,
            failed: summary.failed,
            pass_rate: summary.pass_rate,
            duration_ms,
            case_results,
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total: self.total,
            passed: self.passed,
            failed: self.failed,
            pass_rate: self.pass_rate,
        }
    }
}
