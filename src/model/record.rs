use crate::runner::CaseResult;
use crate::{Result, RucaseError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Skipped)
    }

    pub fn from_success(success: bool) -> Self {
        if success { Self::Passed } else { Self::Failed }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// 记录在执行树中的层级：suite → case → 参数化迭代
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Suite,
    Case,
    Iteration,
}

/// 聚合计数
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// 百分比，保留两位小数；total 为 0 时为 0
    pub pass_rate: f64,
}

impl RunSummary {
    pub fn from_counts(total: usize, passed: usize) -> Self {
        Self {
            total,
            passed,
            failed: total.saturating_sub(passed),
            pass_rate: pass_rate(total, passed),
        }
    }
}

/// passed / total × 100，四舍五入到两位小数
pub fn pass_rate(total: usize, passed: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = passed as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

/// 创建记录时的草稿，parent_id 只在此时设置
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub parent_id: Option<Uuid>,
    pub kind: RecordKind,
    pub target_id: String,
    pub name: String,
}

/// 记录的增量更新
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RecordUpdate {
    pub status: Option<ExecutionStatus>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub result: Option<CaseResult>,
    pub summary: Option<RunSummary>,
    pub error: Option<String>,
}

impl RecordUpdate {
    /// 叶子记录的终态：携带自身 HTTP 结果
    pub fn finish_leaf(result: CaseResult) -> Self {
        Self {
            status: Some(ExecutionStatus::from_success(result.success)),
            finished_at: Some(Utc::now()),
            duration_ms: Some(result.time_ms),
            error: result.error.clone(),
            result: Some(result),
            summary: None,
        }
    }

    /// 父记录的终态：只携带聚合计数
    pub fn finish_parent(summary: RunSummary, duration_ms: u64) -> Self {
        Self {
            status: Some(ExecutionStatus::from_success(summary.failed == 0)),
            finished_at: Some(Utc::now()),
            duration_ms: Some(duration_ms),
            result: None,
            summary: Some(summary),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(ExecutionStatus::Failed),
            finished_at: Some(Utc::now()),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// 一次用例或套件执行的记录
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub kind: RecordKind,
    pub target_id: String,
    pub name: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub result: Option<CaseResult>,
    pub summary: Option<RunSummary>,
    pub error: Option<String>,
}

impl ExecutionRecord {
    /// 记录在派发前创建，状态直接为 running
    pub fn from_draft(id: Uuid, draft: RecordDraft) -> Self {
        Self {
            id,
            parent_id: draft.parent_id,
            kind: draft.kind,
            target_id: draft.target_id,
            name: draft.name,
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            result: None,
            summary: None,
            error: None,
        }
    }

    /// 应用更新；终态只能写入一次
    pub fn apply(&mut self, update: RecordUpdate) -> Result<()> {
        if let Some(status) = update.status {
            if self.status.is_terminal() {
                return Err(RucaseError::Storage(format!(
                    "Record {} is already finalized as {}",
                    self.id, self.status
                )));
            }
            self.status = status;
        }
        if update.finished_at.is_some() {
            self.finished_at = update.finished_at;
        }
        if update.duration_ms.is_some() {
            self.duration_ms = update.duration_ms;
        }
        if update.result.is_some() {
            self.result = update.result;
        }
        if update.summary.is_some() {
            self.summary = update.summary;
        }
        if update.error.is_some() {
            self.error = update.error;
        }
        Ok(())
    }
}
