use rucase::config::EngineConfig;
use rucase::http::Method;
use rucase::model::{
    ApiDefinition, AssertionSpec, Environment, ExecutionStatus, RecordDraft, RecordKind, RecordUpdate, RunSummary,
    TestCase, TestSuite,
};
use rucase::store::{JsonlRecordStore, RecordStore, Workspace};
use rucase::variable::VariableMap;
use rucase::Engine;
use serde_json::{Value, json};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// 日志中第一条 create 即套件记录
fn first_record_id(content: &str) -> Uuid {
    let line = content.lines().next().unwrap();
    let entry: Value = serde_json::from_str(line).unwrap();
    assert_eq!(entry["op"], "create");
    serde_json::from_value(entry["record"]["id"].clone()).unwrap()
}

#[tokio::test]
async fn test_suite_run_is_written_to_record_log() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"pong": true})))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("records.jsonl");

    let workspace = Workspace::default()
        .with_api(ApiDefinition::new("ping", Method::Get, "/ping"))
        .with_case(
            TestCase::new("ping-ok", "ping").with_assertion(AssertionSpec::equals(Some("pong"), json!(true))),
        )
        .with_case(TestCase::new("ping-404", "ping").with_assertion(AssertionSpec::status_code(404)))
        .with_case(TestCase::new("ping-again", "ping"))
        .with_environment(Environment::new("dev", mock_server.uri()))
        .with_suite(
            TestSuite::new("smoke")
                .with_case("ping-ok", 1)
                .with_case("ping-404", 2)
                .with_case("ping-again", 3),
        );

    let config = EngineConfig {
        record_log: Some(log_path.clone()),
        ..EngineConfig::default()
    };
    let engine = Engine::new(config).unwrap().with_loader(Arc::new(workspace));
    engine.start();

    let result = engine
        .run_suite_by_id("smoke", Some("dev"), &VariableMap::new())
        .await
        .unwrap();
    assert_eq!(result.total, 3);
    assert_eq!(result.passed, 2);
    assert_eq!(result.pass_rate, 66.67);

    // 用新实例重放日志，模拟另一个进程读取
    let content = fs::read_to_string(&log_path).unwrap();
    let suite_id = first_record_id(&content);
    let store = JsonlRecordStore::new(&log_path);

    let suite = store.get(suite_id).await.unwrap().unwrap();
    assert_eq!(suite.kind, RecordKind::Suite);
    assert_eq!(suite.status, ExecutionStatus::Failed);
    assert_eq!(suite.summary, Some(RunSummary::from_counts(3, 2)));

    let children = store.children(suite_id).await.unwrap();
    assert_eq!(children.len(), 3);
    assert!(children.iter().all(|c| c.parent_id == Some(suite_id)));
    assert!(children.iter().all(|c| c.status.is_terminal()));
    let first = children[0].result.as_ref().unwrap();
    assert_eq!(first.case_id, "ping-ok");
    assert_eq!(first.status_code, Some(200));
}

#[tokio::test]
async fn test_concurrent_writers_share_one_log() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("records.jsonl");

    let writer_count = 8;
    let records_per_writer = 20;

    let mut handles = Vec::new();
    for i in 0..writer_count {
        let path = log_path.clone();
        handles.push(tokio::spawn(async move {
            // 每个任务独立的实例，模拟多个进程
            let store = JsonlRecordStore::new(path);
            for j in 0..records_per_writer {
                let id = store
                    .create(RecordDraft {
                        parent_id: None,
                        kind: RecordKind::Case,
                        target_id: format!("case-{}-{}", i, j),
                        name: "concurrent".to_string(),
                    })
                    .await
                    .unwrap();
                store
                    .update(id, RecordUpdate::finish_parent(RunSummary::from_counts(1, 1), 1))
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let content = fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), writer_count * records_per_writer * 2);
    for line in lines {
        let entry: Value = serde_json::from_str(line).expect("every line is a complete JSON entry");
        assert!(entry["op"] == "create" || entry["op"] == "update");
    }
}
