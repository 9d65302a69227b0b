use serde::{Deserialize, Serialize};

/// 测试套件：共享环境与变量的有序用例集合
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TestSuite {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub environment_id: Option<String>,

    #[serde(default)]
    pub cases: Vec<SuiteEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SuiteEntry {
    pub case_id: String,

    #[serde(default)]
    pub order: i64,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl TestSuite {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            environment_id: None,
            cases: Vec::new(),
        }
    }

    pub fn with_case(mut self, case_id: &str, order: i64) -> Self {
        self.cases.push(SuiteEntry {
            case_id: case_id.to_string(),
            order,
            is_active: true,
        });
        self
    }

    /// 按 order 排序的活跃用例；order 相同时保持声明顺序（稳定排序）
    pub fn ordered_entries(&self) -> Vec<&SuiteEntry> {
        let mut entries: Vec<&SuiteEntry> = self.cases.iter().filter(|e| e.is_active).collect();
        entries.sort_by_key(|e| e.order);
        entries
    }
}
