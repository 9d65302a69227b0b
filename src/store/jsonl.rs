use crate::model::{ExecutionRecord, RecordDraft, RecordUpdate};
use crate::store::RecordStore;
use crate::{Result, RucaseError};
use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

// 日志超过 20 MB 时压缩
const COMPACTION_THRESHOLD_BYTES: u64 = 20 * 1024 * 1024;
// 压缩后最多保留的记录数
const MAX_RECORDS: usize = 10_000;

/// 日志中的一行：创建或更新
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntry {
    Create { record: ExecutionRecord },
    Update { id: Uuid, update: RecordUpdate },
}

/// 追加写入的 JSON Lines 执行记录存储
///
/// # Concurrency Strategy
/// 每次写入都持有 `fs2` 排他锁：先重放日志校验更新是否合法，再追加一行，
/// 多个进程共享同一个日志文件也不会写入交错或重复终结。读取持有共享锁。
///
/// # Compaction
/// 写入后若文件超过阈值，在同一把排他锁内把日志重写为每条记录一行的最新状态，
/// 并按创建顺序淘汰最旧的、已全部终结的记录树，直到不超过 `max_records`。
/// 仍在运行的记录树不会被淘汰，父子关系保持不变。
pub struct JsonlRecordStore {
    file_path: PathBuf,
    compaction_threshold: u64,
    max_records: usize,
}

impl JsonlRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: path.into(),
            compaction_threshold: COMPACTION_THRESHOLD_BYTES,
            max_records: MAX_RECORDS,
        }
    }

    pub fn with_compaction(mut self, threshold_bytes: u64, max_records: usize) -> Self {
        self.compaction_threshold = threshold_bytes;
        self.max_records = max_records;
        self
    }

    /// 立即压缩，返回保留的记录数
    pub async fn compact(&self) -> Result<usize> {
        let max_records = self.max_records;
        self.blocking(move |path| {
            let file = open_locked(path)?;
            let (records, order) = replay(&file)?;
            rewrite(&file, records, &order, max_records)
        })
        .await
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn compaction(&self) -> Compaction {
        Compaction {
            threshold: self.compaction_threshold,
            max_records: self.max_records,
        }
    }

    /// 在阻塞线程池里执行文件操作
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T> + Send + 'static,
    {
        let path = self.file_path.clone();
        tokio::task::spawn_blocking(move || op(&path))
            .await
            .map_err(|e| RucaseError::Storage(format!("Record log task failed: {}", e)))?
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn open_locked(path: &Path) -> Result<File> {
    ensure_dir(path)?;
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    file.lock_exclusive()?;
    Ok(file)
}

/// 重放日志，得到每条记录的最新状态与创建顺序
fn replay(mut file: &File) -> Result<(HashMap<Uuid, ExecutionRecord>, Vec<Uuid>)> {
    let mut records = HashMap::new();
    let mut order = Vec::new();

    file.seek(SeekFrom::Start(0))?;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogEntry>(&line) {
            Ok(LogEntry::Create { record }) => {
                order.push(record.id);
                records.insert(record.id, record);
            }
            Ok(LogEntry::Update { id, update }) => {
                if let Some(record) = records.get_mut(&id)
                    && let Err(e) = record.apply(update)
                {
                    warn!(line = index + 1, "Skipping invalid record update: {}", e);
                }
            }
            Err(e) => warn!(line = index + 1, "Skipping malformed record log line: {}", e),
        }
    }

    Ok((records, order))
}

fn append(mut file: &File, entry: &LogEntry) -> Result<()> {
    let json = serde_json::to_string(entry)?;
    writeln!(file, "{}", json)?;
    file.flush()?;
    Ok(())
}

#[derive(Clone, Copy)]
struct Compaction {
    threshold: u64,
    max_records: usize,
}

impl Compaction {
    /// 调用方必须持有排他锁
    fn run_if_needed(self, file: &File) -> Result<()> {
        if file.metadata()?.len() < self.threshold {
            return Ok(());
        }
        let (records, order) = replay(file)?;
        let before = order.len();
        let kept = rewrite(file, records, &order, self.max_records)?;
        debug!(before, kept, "Compacted record log");
        Ok(())
    }
}

/// 截断后按创建顺序写回保留的记录，每条一行 create
fn rewrite(
    file: &File,
    mut records: HashMap<Uuid, ExecutionRecord>,
    order: &[Uuid],
    max_records: usize,
) -> Result<usize> {
    let keep = retained(&records, order, max_records);

    file.set_len(0)?;
    let mut writer = BufWriter::new(file);
    let mut kept = 0;
    for id in order.iter().filter(|id| keep.contains(*id)) {
        if let Some(record) = records.remove(id) {
            writeln!(writer, "{}", serde_json::to_string(&LogEntry::Create { record })?)?;
            kept += 1;
        }
    }
    writer.flush()?;
    Ok(kept)
}

/// 以根记录为单位淘汰：最旧的、整棵树都已终结的先走
fn retained(records: &HashMap<Uuid, ExecutionRecord>, order: &[Uuid], max_records: usize) -> HashSet<Uuid> {
    // 子记录总在父记录之后创建，按顺序一遍即可求出根
    let mut root_of: HashMap<Uuid, Uuid> = HashMap::new();
    let mut trees: Vec<(Uuid, Vec<Uuid>)> = Vec::new();
    for id in order {
        let Some(record) = records.get(id) else {
            continue;
        };
        let root = record
            .parent_id
            .and_then(|p| root_of.get(&p).copied())
            .unwrap_or(*id);
        root_of.insert(*id, root);
        match trees.iter_mut().find(|(r, _)| *r == root) {
            Some((_, members)) => members.push(*id),
            None => trees.push((root, vec![*id])),
        }
    }

    let mut total: usize = trees.iter().map(|(_, members)| members.len()).sum();
    let mut keep: HashSet<Uuid> = root_of.keys().copied().collect();
    for (_, members) in &trees {
        if total <= max_records {
            break;
        }
        let finished = members
            .iter()
            .all(|id| records.get(id).is_some_and(|r| r.status.is_terminal()));
        if finished {
            for id in members {
                keep.remove(id);
            }
            total -= members.len();
        }
    }
    keep
}

fn read_snapshot(path: &Path) -> Result<(HashMap<Uuid, ExecutionRecord>, Vec<Uuid>)> {
    if !path.exists() {
        return Ok((HashMap::new(), Vec::new()));
    }
    let file = File::open(path)?;
    file.lock_shared()?;
    replay(&file)
}

#[async_trait]
impl RecordStore for JsonlRecordStore {
    async fn create(&self, draft: RecordDraft) -> Result<Uuid> {
        let compaction = self.compaction();
        self.blocking(move |path| {
            let file = open_locked(path)?;
            if let Some(parent) = draft.parent_id {
                let (records, _) = replay(&file)?;
                if !records.contains_key(&parent) {
                    return Err(RucaseError::Storage(format!(
                        "Parent record {} does not exist",
                        parent
                    )));
                }
            }

            let id = Uuid::new_v4();
            let record = ExecutionRecord::from_draft(id, draft);
            append(&file, &LogEntry::Create { record })?;
            compaction.run_if_needed(&file)?;
            Ok(id)
        })
        .await
    }

    async fn update(&self, id: Uuid, update: RecordUpdate) -> Result<()> {
        let compaction = self.compaction();
        self.blocking(move |path| {
            let file = open_locked(path)?;
            let (mut records, _) = replay(&file)?;
            let record = records
                .get_mut(&id)
                .ok_or_else(|| RucaseError::not_found("record", id.to_string()))?;
            // 先在快照上校验，合法才落盘
            record.apply(update.clone())?;
            append(&file, &LogEntry::Update { id, update })?;
            compaction.run_if_needed(&file)
        })
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<ExecutionRecord>> {
        self.blocking(move |path| {
            let (mut records, _) = read_snapshot(path)?;
            Ok(records.remove(&id))
        })
        .await
    }

    async fn children(&self, parent_id: Uuid) -> Result<Vec<ExecutionRecord>> {
        self.blocking(move |path| {
            let (mut records, order) = read_snapshot(path)?;
            Ok(order
                .into_iter()
                .filter_map(|id| records.remove(&id))
                .filter(|r| r.parent_id == Some(parent_id))
                .collect())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExecutionStatus, RecordKind};
    use crate::runner::CaseResult;
    use tempfile::TempDir;

    fn draft(parent: Option<Uuid>, kind: RecordKind) -> RecordDraft {
        RecordDraft {
            parent_id: parent,
            kind,
            target_id: "t".to_string(),
            name: "t".to_string(),
        }
    }

    #[tokio::test]
    async fn test_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("records").join("log.jsonl");

        let store = JsonlRecordStore::new(&path);
        let parent = store.create(draft(None, RecordKind::Case)).await.unwrap();
        let child = store.create(draft(Some(parent), RecordKind::Iteration)).await.unwrap();

        let mut result = CaseResult::new("t", "t", "GET", "http://example.com");
        result.success = true;
        result.status_code = Some(200);
        store.update(child, RecordUpdate::finish_leaf(result.clone())).await.unwrap();

        let reopened = JsonlRecordStore::new(&path);
        let record = reopened.get(child).await.unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Passed);
        assert_eq!(record.result, Some(result));

        let children = reopened.children(parent).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, child);
    }

    #[tokio::test]
    async fn test_rejects_second_finalization() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonlRecordStore::new(temp_dir.path().join("log.jsonl"));
        let id = store.create(draft(None, RecordKind::Suite)).await.unwrap();

        store.update(id, RecordUpdate::failed("boom")).await.unwrap();
        assert!(store.update(id, RecordUpdate::failed("again")).await.is_err());

        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.error.as_deref(), Some("boom"));
    }

    fn line_count(path: &Path) -> usize {
        fs::read_to_string(path).unwrap().lines().count()
    }

    #[tokio::test]
    async fn test_compaction_folds_updates() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log.jsonl");
        let store = JsonlRecordStore::new(&path).with_compaction(1, 100);

        let parent = store.create(draft(None, RecordKind::Case)).await.unwrap();
        let child = store.create(draft(Some(parent), RecordKind::Iteration)).await.unwrap();
        store.update(child, RecordUpdate::failed("boom")).await.unwrap();
        store.update(parent, RecordUpdate::failed("boom")).await.unwrap();

        assert_eq!(line_count(&path), 2);
        let record = store.get(child).await.unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(store.children(parent).await.unwrap()[0].id, child);

        // 压缩后的状态仍然只能终结一次
        assert!(store.update(child, RecordUpdate::failed("again")).await.is_err());
    }

    #[tokio::test]
    async fn test_compaction_keeps_running_trees() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonlRecordStore::new(temp_dir.path().join("log.jsonl")).with_compaction(1, 2);

        let a = store.create(draft(None, RecordKind::Suite)).await.unwrap();
        store.update(a, RecordUpdate::failed("done")).await.unwrap();
        let b = store.create(draft(None, RecordKind::Suite)).await.unwrap();
        store.update(b, RecordUpdate::failed("done")).await.unwrap();
        let c = store.create(draft(None, RecordKind::Suite)).await.unwrap();
        let d = store.create(draft(None, RecordKind::Suite)).await.unwrap();

        assert!(store.get(a).await.unwrap().is_none());
        assert!(store.get(b).await.unwrap().is_none());
        assert!(store.get(c).await.unwrap().is_some());
        assert!(store.get(d).await.unwrap().is_some());

        // 全部在运行时超出上限也不淘汰
        let e = store.create(draft(None, RecordKind::Suite)).await.unwrap();
        assert!(store.get(c).await.unwrap().is_some());
        assert!(store.get(e).await.unwrap().is_some());
        assert_eq!(store.compact().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonlRecordStore::new(temp_dir.path().join("none.jsonl"));
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.children(Uuid::new_v4()).await.unwrap().is_empty());
    }
}
