/// 数据模型 - 引擎接收的只读实体快照与执行记录
mod api;
mod case;
mod credential;
mod environment;
mod record;
mod suite;

pub use api::{ApiDefinition, AuthDescriptor, AuthType};
pub use case::{AssertionSpec, AssertionType, JsonPathOperator, TestCase};
pub use credential::{CredentialKind, CredentialSet, GlobalCredential};
pub use environment::Environment;
pub use record::{
    ExecutionRecord, ExecutionStatus, RecordDraft, RecordKind, RecordUpdate, RunSummary, pass_rate,
};
pub use suite::{SuiteEntry, TestSuite};

/// 参数化数据行
pub type ParameterRow = crate::variable::VariableMap;
