use crate::model::{ExecutionRecord, RecordDraft, RecordUpdate};
use crate::store::RecordStore;
use crate::{Result, RucaseError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Records {
    by_id: HashMap<Uuid, ExecutionRecord>,
    /// 创建顺序
    order: Vec<Uuid>,
}

/// 进程内的执行记录存储
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<Records>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按创建顺序返回全部记录
    pub async fn all(&self) -> Vec<ExecutionRecord> {
        let records = self.records.read().await;
        records
            .order
            .iter()
            .filter_map(|id| records.by_id.get(id).cloned())
            .collect()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, draft: RecordDraft) -> Result<Uuid> {
        let mut records = self.records.write().await;
        if let Some(parent) = draft.parent_id
            && !records.by_id.contains_key(&parent)
        {
            return Err(RucaseError::Storage(format!("Parent record {} does not exist", parent)));
        }

        let id = Uuid::new_v4();
        records.by_id.insert(id, ExecutionRecord::from_draft(id, draft));
        records.order.push(id);
        Ok(id)
    }

    async fn update(&self, id: Uuid, update: RecordUpdate) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .by_id
            .get_mut(&id)
            .ok_or_else(|| RucaseError::not_found("record", id.to_string()))?;
        record.apply(update)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ExecutionRecord>> {
        Ok(self.records.read().await.by_id.get(&id).cloned())
    }

    async fn children(&self, parent_id: Uuid) -> Result<Vec<ExecutionRecord>> {
        let records = self.records.read().await;
        Ok(records
            .order
            .iter()
            .filter_map(|id| records.by_id.get(id))
            .filter(|r| r.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }
}
