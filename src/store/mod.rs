//! 外部协作者的边界：实体加载与执行记录存储
mod jsonl;
mod memory;
mod workspace;

pub use jsonl::JsonlRecordStore;
pub use memory::MemoryRecordStore;
pub use workspace::Workspace;

use crate::Result;
use crate::model::{
    ApiDefinition, CredentialSet, Environment, ExecutionRecord, RecordDraft, RecordUpdate,
    TestCase, TestSuite,
};
use async_trait::async_trait;
use uuid::Uuid;

/// 执行记录存储
///
/// 记录构成 suite → case → iteration 的树，父子关系只通过 parent_id 显式建立
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 创建记录（状态为 running），返回记录 ID
    async fn create(&self, draft: RecordDraft) -> Result<Uuid>;

    /// 更新记录；已终结的记录不能再次写入终态
    async fn update(&self, id: Uuid, update: RecordUpdate) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<ExecutionRecord>>;

    /// 按创建顺序返回直接子记录
    async fn children(&self, parent_id: Uuid) -> Result<Vec<ExecutionRecord>>;
}

/// 只读实体加载
#[async_trait]
pub trait EntityLoader: Send + Sync {
    async fn load_api(&self, id: &str) -> Result<ApiDefinition>;

    async fn load_case(&self, id: &str) -> Result<TestCase>;

    async fn load_suite(&self, id: &str) -> Result<TestSuite>;

    async fn load_environment(&self, id: &str) -> Result<Environment>;

    /// 全局凭据集合
    async fn load_credentials(&self) -> Result<CredentialSet>;
}
