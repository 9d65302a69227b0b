use crate::config::EngineConfig;
use crate::script::ast::Program;
use crate::script::builtins::CapabilityTable;
use crate::script::error::ScriptError;
use crate::script::interpreter::Interpreter;
use crate::script::validator::ScriptValidator;
use crate::variable::{VariableMap, VariableStore};
use serde_json::Value;

/// 脚本运行的场景，决定能力表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptMode {
    /// 前置 / 后置钩子
    Hook,
    /// 脚本断言，额外提供 assert_* 辅助函数
    Assertion,
}

/// 脚本可见的上下文：实时变量存储、只读绑定、输出
pub struct ScriptScope<'a> {
    pub variables: &'a mut VariableStore,
    pub bindings: VariableMap,
    pub output: Vec<String>,
}

impl<'a> ScriptScope<'a> {
    pub fn new(variables: &'a mut VariableStore) -> Self {
        Self {
            variables,
            bindings: VariableMap::new(),
            output: Vec::new(),
        }
    }

    pub fn bind(mut self, name: &str, value: Value) -> Self {
        self.bindings.insert(name.to_string(), value);
        self
    }
}

/// 脚本沙箱：先校验后执行，校验失败的脚本一行都不会运行
#[derive(Clone)]
pub struct ScriptSandbox {
    validator: ScriptValidator,
    step_budget: u64,
    hook_capabilities: CapabilityTable,
    assertion_capabilities: CapabilityTable,
}

impl ScriptSandbox {
    pub fn new(config: &EngineConfig) -> Self {
        let mut hook_capabilities = CapabilityTable::for_mode(ScriptMode::Hook);
        let mut assertion_capabilities = CapabilityTable::for_mode(ScriptMode::Assertion);
        for name in &config.script_denylist_extra {
            hook_capabilities.remove(name);
            assertion_capabilities.remove(name);
        }

        Self {
            validator: ScriptValidator::new(config.script_max_bytes, &config.script_denylist_extra),
            step_budget: config.script_step_budget,
            hook_capabilities,
            assertion_capabilities,
        }
    }

    fn capabilities(&self, mode: ScriptMode) -> &CapabilityTable {
        match mode {
            ScriptMode::Hook => &self.hook_capabilities,
            ScriptMode::Assertion => &self.assertion_capabilities,
        }
    }

    /// 只做校验，不执行
    pub fn check(&self, source: &str, mode: ScriptMode) -> Result<Program, ScriptError> {
        self.validator.validate(source, self.capabilities(mode))
    }

    pub fn run(&self, source: &str, mode: ScriptMode, scope: &mut ScriptScope<'_>) -> Result<(), ScriptError> {
        let program = self.check(source, mode).inspect_err(|e| {
            tracing::warn!(?mode, "Script rejected before execution: {}", e);
        })?;

        let mut interpreter = Interpreter::new(scope, self.capabilities(mode), self.step_budget);
        let result = interpreter.run(&program);
        tracing::debug!(?mode, steps = interpreter.steps(), "Script finished");
        result
    }
}

impl Default for ScriptSandbox {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hook_writes_variables() {
        let sandbox = ScriptSandbox::default();
        let mut store = VariableStore::new();
        let mut scope = ScriptScope::new(&mut store)
            .bind("response", json!({"status_code": 200, "json": {"token": "abc"}}));

        sandbox
            .run(
                "if response.status_code == 200 { set_var('token', response.json.token) }\nprint('ok')",
                ScriptMode::Hook,
                &mut scope,
            )
            .unwrap();

        assert_eq!(scope.output, vec!["ok".to_string()]);
        assert_eq!(store.get_str("token"), Some("abc".to_string()));
    }

    #[test]
    fn test_rejected_script_has_no_side_effects() {
        let sandbox = ScriptSandbox::default();
        let mut store = VariableStore::new();
        let mut scope = ScriptScope::new(&mut store);

        let err = sandbox
            .run("set_var('x', 1)\nexec('rm -rf /')", ScriptMode::Hook, &mut scope)
            .unwrap_err();

        assert!(err.is_rejected());
        assert!(!store.contains("x"));
    }

    #[test]
    fn test_extra_denylist_removes_capability() {
        let config = EngineConfig {
            script_denylist_extra: vec!["print".to_string()],
            ..EngineConfig::default()
        };
        let sandbox = ScriptSandbox::new(&config);
        assert!(sandbox.check("print(1)", ScriptMode::Hook).is_err());
        assert!(sandbox.check("x = len('a')", ScriptMode::Hook).is_ok());
    }

    #[test]
    fn test_step_budget_from_config() {
        let config = EngineConfig {
            script_step_budget: 50,
            ..EngineConfig::default()
        };
        let sandbox = ScriptSandbox::new(&config);
        let mut store = VariableStore::new();
        let mut scope = ScriptScope::new(&mut store);
        let err = sandbox
            .run("for i in range(100) { x = i }", ScriptMode::Hook, &mut scope)
            .unwrap_err();
        assert_eq!(err, ScriptError::BudgetExceeded(50));
    }

    #[test]
    fn test_doubling_string_hits_size_cap() {
        let sandbox = ScriptSandbox::default();
        let mut store = VariableStore::new();
        let mut scope = ScriptScope::new(&mut store);
        let err = sandbox
            .run("s = 'x'\nfor i in range(40) { s = s + s }", ScriptMode::Hook, &mut scope)
            .unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { line: 2, .. }));
    }
}
