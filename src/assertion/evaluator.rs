use crate::assertion::types::AssertionOutcome;
use crate::http::Response;
use crate::http::types::Status;
use crate::model::{AssertionSpec, AssertionType, JsonPathOperator};
use crate::script::{ScriptError, ScriptMode, ScriptSandbox, ScriptScope};
use crate::variable::capture::response_path;
use crate::variable::store::stringify;
use crate::variable::{VariableMap, VariableStore};
use serde_json::Value;

/// 断言求值器
///
/// 声明式断言直接比较响应；脚本断言交给沙箱执行，`assert_*` 抛出的失败信号
/// 与其他脚本错误都转为失败条目，不会向上传播。
pub struct AssertionEvaluator<'a> {
    sandbox: &'a ScriptSandbox,
    bindings: VariableMap,
    output: Vec<String>,
}

impl<'a> AssertionEvaluator<'a> {
    /// bindings 为脚本断言可见的只读上下文（case / api / environment / response）
    pub fn new(sandbox: &'a ScriptSandbox, bindings: VariableMap) -> Self {
        Self {
            sandbox,
            bindings,
            output: Vec::new(),
        }
    }

    /// 依次执行全部断言，某条失败不影响后续断言
    pub fn evaluate_all(
        &mut self,
        specs: &[AssertionSpec],
        response: &Response,
        json: Option<&Value>,
        store: &mut VariableStore,
    ) -> Vec<AssertionOutcome> {
        specs
            .iter()
            .filter_map(|spec| self.evaluate(spec, response, json, store))
            .collect()
    }

    /// 脚本为空的 manual 断言不产生结果，返回 None
    pub fn evaluate(
        &mut self,
        spec: &AssertionSpec,
        response: &Response,
        json: Option<&Value>,
        store: &mut VariableStore,
    ) -> Option<AssertionOutcome> {
        let outcome = match spec.kind {
            AssertionType::Manual => self.evaluate_script(spec, store)?,
            _ => evaluate_declarative(spec, response, json),
        };
        Some(outcome.named(spec.name.as_deref()))
    }

    fn evaluate_script(&mut self, spec: &AssertionSpec, store: &mut VariableStore) -> Option<AssertionOutcome> {
        let kind = AssertionType::Manual;
        let source = spec.script.as_deref().map(str::trim).filter(|s| !s.is_empty())?;

        let mut scope = ScriptScope::new(store);
        scope.bindings = self.bindings.clone();
        let result = self.sandbox.run(source, ScriptMode::Assertion, &mut scope);
        self.output.append(&mut scope.output);

        let outcome = match result {
            Ok(()) => AssertionOutcome::success(kind, None, None),
            Err(ScriptError::AssertionFailed(message)) => {
                AssertionOutcome::failure(kind, None, None, message)
            }
            Err(e) => {
                tracing::warn!("Script assertion errored: {}", e);
                AssertionOutcome::failure(kind, None, None, e.to_string())
            }
        };
        Some(outcome)
    }

    /// 脚本断言中 print 的输出
    pub fn into_output(self) -> Vec<String> {
        self.output
    }
}

/// 用例是否通过：所有断言通过且状态码为 2xx
pub fn case_passed(outcomes: &[AssertionOutcome], status: Status) -> bool {
    status.is_success() && outcomes.iter().all(|o| o.success)
}

/// 声明式断言求值
pub fn evaluate_declarative(
    spec: &AssertionSpec,
    response: &Response,
    json: Option<&Value>,
) -> AssertionOutcome {
    let kind = spec.kind;
    let expected = spec.expected.clone();

    match kind {
        AssertionType::StatusCode => {
            let actual = response.status.code();
            let Some(want) = expected.as_ref().and_then(as_integer) else {
                return invalid_expected(kind, expected, Some(Value::from(actual)));
            };
            if i64::from(actual) == want {
                AssertionOutcome::success(kind, expected, Some(Value::from(actual)))
            } else {
                AssertionOutcome::failure(
                    kind,
                    expected,
                    Some(Value::from(actual)),
                    format!("Expected status code {}, but got {}", want, actual),
                )
            }
        }

        AssertionType::ResponseTime => {
            let actual = response.time_ms();
            let Some(limit) = expected.as_ref().and_then(as_number) else {
                return invalid_expected(kind, expected, Some(Value::from(actual)));
            };
            if response.duration.as_secs_f64() * 1000.0 <= limit {
                AssertionOutcome::success(kind, expected, Some(Value::from(actual)))
            } else {
                AssertionOutcome::failure(
                    kind,
                    expected,
                    Some(Value::from(actual)),
                    format!("Expected response time <= {}ms, but took {}ms", limit, actual),
                )
            }
        }

        AssertionType::Contains => {
            let needle = expected.as_ref().map(stringify).unwrap_or_default();
            if response.body.contains(&needle) {
                AssertionOutcome::success(kind, expected, None)
            } else {
                AssertionOutcome::failure(
                    kind,
                    expected,
                    None,
                    format!("Expected response body to contain {:?}", needle),
                )
            }
        }

        AssertionType::JsonPath => evaluate_json_path(spec, json),

        AssertionType::Equals => {
            let (actual, matched) = match spec.path.as_deref() {
                Some(path) => {
                    let Some(root) = json else {
                        return not_json(kind, expected);
                    };
                    match response_path(path).lookup(root) {
                        Some(found) => {
                            let matched = expected
                                .as_ref()
                                .is_some_and(|want| loosely_equal(found, want));
                            (found.clone(), matched)
                        }
                        None => {
                            return AssertionOutcome::failure(
                                kind,
                                expected,
                                None,
                                format!("Path '{}' not found in response", path),
                            );
                        }
                    }
                }
                None => {
                    let body = Value::String(response.body.clone());
                    let matched = expected.as_ref().is_some_and(|want| {
                        response.body == stringify(want)
                            || json.is_some_and(|root| !want.is_string() && root == want)
                    });
                    (body, matched)
                }
            };

            if matched {
                AssertionOutcome::success(kind, expected, Some(actual))
            } else {
                let message = format!(
                    "Expected {}, but got {}",
                    expected.as_ref().map(stringify).unwrap_or_default(),
                    stringify(&actual)
                );
                AssertionOutcome::failure(kind, expected, Some(actual), message)
            }
        }

        AssertionType::Manual => AssertionOutcome::failure(
            kind,
            expected,
            None,
            "Script assertions require the sandbox",
        ),
    }
}

fn evaluate_json_path(spec: &AssertionSpec, json: Option<&Value>) -> AssertionOutcome {
    let kind = AssertionType::JsonPath;
    let expected = spec.expected.clone();

    let Some(path) = spec.path.as_deref().filter(|p| !p.trim().is_empty()) else {
        return AssertionOutcome::failure(kind, expected, None, "json_path assertion has no path");
    };
    let Some(root) = json else {
        return not_json(kind, expected);
    };
    let found = response_path(path).lookup(root);

    match spec.operator {
        JsonPathOperator::Exists => match found {
            Some(value) => AssertionOutcome::success(kind, expected, Some(value.clone())),
            None => AssertionOutcome::failure(
                kind,
                expected,
                None,
                format!("Expected path '{}' to exist, but it was not found", path),
            ),
        },
        JsonPathOperator::Contains | JsonPathOperator::Equals => {
            let Some(actual) = found else {
                return AssertionOutcome::failure(
                    kind,
                    expected,
                    None,
                    format!("Path '{}' not found in response", path),
                );
            };
            let want = expected.clone().unwrap_or(Value::Null);
            let (matched, verb) = if spec.operator == JsonPathOperator::Contains {
                let matched = match actual {
                    Value::Array(items) => items.iter().any(|item| loosely_equal(item, &want)),
                    Value::Object(map) => map.contains_key(&stringify(&want)),
                    other => stringify(other).contains(&stringify(&want)),
                };
                (matched, "contain")
            } else {
                (loosely_equal(actual, &want), "equal")
            };

            if matched {
                AssertionOutcome::success(kind, expected, Some(actual.clone()))
            } else {
                AssertionOutcome::failure(
                    kind,
                    expected,
                    Some(actual.clone()),
                    format!(
                        "Expected '{}' to {} {}, but got {}",
                        path,
                        verb,
                        stringify(&want),
                        stringify(actual)
                    ),
                )
            }
        }
    }
}

/// JSON 相等，或者字符串化后相等（"42" 与 42）
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    actual == expected || stringify(actual) == stringify(expected)
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn invalid_expected(kind: AssertionType, expected: Option<Value>, actual: Option<Value>) -> AssertionOutcome {
    let message = format!(
        "Invalid expected value for {}: {}",
        kind,
        expected.as_ref().map(stringify).unwrap_or_else(|| "missing".to_string())
    );
    AssertionOutcome::failure(kind, expected, actual, message)
}

fn not_json(kind: AssertionType, expected: Option<Value>) -> AssertionOutcome {
    AssertionOutcome::failure(kind, expected, None, "Response body is not valid JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;
    use serde_json::json;
    use std::time::Duration;

    fn create_test_response(status: u16, body: &str, duration_ms: u64) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());

        Response {
            status: Status::new(status).unwrap(),
            headers,
            body: body.to_string(),
            duration: Duration::from_millis(duration_ms),
        }
    }

    fn eval(spec: &AssertionSpec, response: &Response) -> AssertionOutcome {
        let json = response.json();
        evaluate_declarative(spec, response, json.as_ref())
    }

    #[test]
    fn test_status_code() {
        let response = create_test_response(404, "{}", 10);
        let outcome = eval(&AssertionSpec::status_code(200), &response);
        assert!(!outcome.success);
        assert_eq!(outcome.actual, Some(json!(404)));

        let mut spec = AssertionSpec::status_code(404);
        spec.expected = Some(json!("404"));
        assert!(eval(&spec, &response).success);
    }

    #[test]
    fn test_response_time_is_inclusive() {
        let response = create_test_response(200, "{}", 100);
        assert!(eval(&AssertionSpec::response_time(100), &response).success);
        assert!(!eval(&AssertionSpec::response_time(99), &response).success);

        let mut fractional = AssertionSpec::response_time(0);
        fractional.expected = Some(json!("100.5"));
        assert!(eval(&fractional, &response).success);
        fractional.expected = Some(json!(99.5));
        assert!(!eval(&fractional, &response).success);
        fractional.expected = Some(json!("fast"));
        assert!(eval(&fractional, &response).message.contains("Invalid expected value"));
    }

    #[test]
    fn test_blank_script_assertion_is_skipped() {
        let sandbox = ScriptSandbox::default();
        let response = create_test_response(200, "{}", 10);
        let mut no_script = AssertionSpec::script("");
        no_script.script = None;
        let specs = vec![AssertionSpec::script("   "), no_script, AssertionSpec::status_code(200)];

        let mut store = VariableStore::new();
        let mut evaluator = AssertionEvaluator::new(&sandbox, VariableMap::new());
        let outcomes = evaluator.evaluate_all(&specs, &response, None, &mut store);

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].kind, AssertionType::StatusCode);
    }

    #[test]
    fn test_contains() {
        let response = create_test_response(200, r#"{"msg": "hello world"}"#, 10);
        assert!(eval(&AssertionSpec::contains("hello"), &response).success);
        assert!(!eval(&AssertionSpec::contains("bye"), &response).success);
    }

    #[test]
    fn test_json_path_operators() {
        let response = create_test_response(
            200,
            r#"{"data": {"id": 42, "tags": ["a", "b"], "name": "widget"}}"#,
            10,
        );

        let exists = AssertionSpec::json_path("$.data.id", JsonPathOperator::Exists, None);
        assert!(eval(&exists, &response).success);

        let missing = AssertionSpec::json_path("data.nope", JsonPathOperator::Exists, None);
        assert!(!eval(&missing, &response).success);

        let equals = AssertionSpec::json_path("body.data.id", JsonPathOperator::Equals, Some(json!(42)));
        let outcome = eval(&equals, &response);
        assert!(outcome.success);
        assert_eq!(outcome.actual, Some(json!(42)));

        let loose = AssertionSpec::json_path("data.id", JsonPathOperator::Equals, Some(json!("42")));
        assert!(eval(&loose, &response).success);

        let in_list = AssertionSpec::json_path("data.tags", JsonPathOperator::Contains, Some(json!("b")));
        assert!(eval(&in_list, &response).success);

        let substring = AssertionSpec::json_path("data.name", JsonPathOperator::Contains, Some(json!("idg")));
        assert!(eval(&substring, &response).success);
    }

    #[test]
    fn test_json_path_on_non_json_body() {
        let response = create_test_response(200, "plain text", 10);
        let spec = AssertionSpec::json_path("data.id", JsonPathOperator::Exists, None);
        let outcome = eval(&spec, &response);
        assert!(!outcome.success);
        assert!(outcome.message.contains("not valid JSON"));
    }

    #[test]
    fn test_equals_with_and_without_path() {
        let response = create_test_response(200, r#"{"status": "ok", "count": 3}"#, 10);
        assert!(eval(&AssertionSpec::equals(Some("status"), json!("ok")), &response).success);
        assert!(eval(&AssertionSpec::equals(Some("count"), json!("3")), &response).success);
        assert!(
            eval(
                &AssertionSpec::equals(None, json!({"status": "ok", "count": 3})),
                &response
            )
            .success
        );

        let text = create_test_response(200, "pong", 10);
        assert!(eval(&AssertionSpec::equals(None, json!("pong")), &text).success);
        assert!(!eval(&AssertionSpec::equals(None, json!("ping")), &text).success);
    }

    #[test]
    fn test_script_assertions_and_rejections() {
        let sandbox = ScriptSandbox::default();
        let response = create_test_response(200, r#"{"id": 7}"#, 10);
        let json = response.json();
        let mut bindings = VariableMap::new();
        bindings.insert("response".to_string(), response.to_binding(json.as_ref()));

        let specs = vec![
            AssertionSpec::script("assert_equal(response.json.id, 7)"),
            AssertionSpec::script("assert_greater_than(response.json.id, 10, 'id too small')"),
            AssertionSpec::script("open('/etc/passwd')"),
            AssertionSpec::status_code(200),
        ];

        let mut store = VariableStore::new();
        let mut evaluator = AssertionEvaluator::new(&sandbox, bindings);
        let outcomes = evaluator.evaluate_all(&specs, &response, json.as_ref(), &mut store);

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);
        assert_eq!(outcomes[1].message, "id too small");
        assert!(!outcomes[2].success);
        assert!(outcomes[2].message.contains("rejected"));
        // 被拒绝的脚本不影响其余断言
        assert!(outcomes[3].success);

        assert!(!case_passed(&outcomes, response.status));
        assert!(case_passed(&outcomes[..1], response.status));
    }

    #[test]
    fn test_case_requires_2xx() {
        let outcomes = vec![AssertionOutcome::success(AssertionType::StatusCode, None, None)];
        assert!(case_passed(&outcomes, Status::new(204).unwrap()));
        assert!(!case_passed(&outcomes, Status::new(404).unwrap()));
        assert!(case_passed(&[], Status::new(200).unwrap()));
    }
}
