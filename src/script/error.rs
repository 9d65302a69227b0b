/// 脚本错误
///
/// AssertionFailed 是断言辅助函数抛出的可区分信号，其余均视为脚本自身的问题
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    #[error("Script rejected: {0}")]
    Rejected(String),

    #[error("Syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Runtime error at line {line}: {message}")]
    Runtime { line: usize, message: String },

    #[error("{0}")]
    AssertionFailed(String),

    #[error("Script exceeded its step budget ({0} steps)")]
    BudgetExceeded(u64),
}

impl ScriptError {
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        ScriptError::Syntax {
            line,
            message: message.into(),
        }
    }

    pub fn runtime(line: usize, message: impl Into<String>) -> Self {
        ScriptError::Runtime {
            line,
            message: message.into(),
        }
    }

    /// 校验阶段被拒绝（含语法错误），脚本一行都没有执行
    pub fn is_rejected(&self) -> bool {
        matches!(self, ScriptError::Rejected(_) | ScriptError::Syntax { .. })
    }

    pub fn is_assertion_failure(&self) -> bool {
        matches!(self, ScriptError::AssertionFailed(_))
    }
}
