use crate::model::{RecordDraft, RecordKind, RecordUpdate};
use crate::store::RecordStore;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// 执行记录写入
///
/// 这是一个 Best-effort 操作：存储失败只打印警告，不影响用例执行与返回结果。
#[derive(Clone)]
pub struct Recorder {
    store: Arc<dyn RecordStore>,
}

impl Recorder {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// 创建 running 状态的记录，parent 显式指定
    pub async fn open(&self, parent_id: Option<Uuid>, kind: RecordKind, target_id: &str, name: &str) -> Option<Uuid> {
        let draft = RecordDraft {
            parent_id,
            kind,
            target_id: target_id.to_string(),
            name: name.to_string(),
        };
        match self.store.create(draft).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(target_id = %target_id, ?kind, "Failed to create execution record: {}", e);
                None
            }
        }
    }

    /// 写入终态；记录未创建成功时什么也不做
    pub async fn finish(&self, id: Option<Uuid>, update: RecordUpdate) {
        let Some(id) = id else {
            return;
        };
        if let Err(e) = self.store.update(id, update).await {
            warn!(record = %id, "Failed to finalize execution record: {}", e);
        }
    }
}
