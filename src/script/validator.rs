use crate::script::ast::{Callee, Expr, Program, Stmt, Target};
use crate::script::builtins::{CapabilityTable, METHODS};
use crate::script::error::ScriptError;
use crate::script::parser::parse_program;
use std::collections::HashSet;

/// 默认禁用的能力名，调用、属性和裸名引用都会被拒绝
pub const DENYLIST: [&str; 22] = [
    "open",
    "eval",
    "exec",
    "compile",
    "exit",
    "quit",
    "reload",
    "__import__",
    "globals",
    "locals",
    "vars",
    "getattr",
    "setattr",
    "delattr",
    "input",
    "breakpoint",
    "system",
    "popen",
    "spawn",
    "subprocess",
    "os",
    "sys",
];

/// 执行前的静态校验：大小上限、导入、禁用名、未登记的函数与方法
#[derive(Debug, Clone)]
pub struct ScriptValidator {
    max_bytes: usize,
    denylist: HashSet<String>,
}

impl ScriptValidator {
    pub fn new(max_bytes: usize, extra_denied: &[String]) -> Self {
        let denylist = DENYLIST
            .iter()
            .map(|s| s.to_string())
            .chain(extra_denied.iter().cloned())
            .collect();
        Self {
            max_bytes,
            denylist,
        }
    }

    pub fn is_denied(&self, name: &str) -> bool {
        name.starts_with("__") || self.denylist.contains(name)
    }

    /// 校验通过时返回语法树，调用方直接拿去执行
    pub fn validate(&self, source: &str, capabilities: &CapabilityTable) -> Result<Program, ScriptError> {
        if source.len() > self.max_bytes {
            return Err(ScriptError::Rejected(format!(
                "script is {} bytes, limit is {} bytes",
                source.len(),
                self.max_bytes
            )));
        }

        let program = parse_program(source)?;
        let mut check = Check {
            validator: self,
            capabilities,
        };
        check.block(&program.body)?;
        Ok(program)
    }
}

struct Check<'v> {
    validator: &'v ScriptValidator,
    capabilities: &'v CapabilityTable,
}

impl Check<'_> {
    fn name(&self, name: &str, line: usize) -> Result<(), ScriptError> {
        if self.validator.is_denied(name) {
            return Err(ScriptError::Rejected(format!(
                "reference to forbidden name `{}` (line {})",
                name, line
            )));
        }
        Ok(())
    }

    fn block(&mut self, body: &[Stmt]) -> Result<(), ScriptError> {
        body.iter().try_for_each(|stmt| self.stmt(stmt))
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), ScriptError> {
        match stmt {
            Stmt::Import {
                keyword,
                module,
                line,
            } => Err(ScriptError::Rejected(format!(
                "`{} {}` is not allowed (line {})",
                keyword, module, line
            ))),
            Stmt::Assign {
                target,
                value,
                line,
            } => {
                match target {
                    Target::Name(name) => self.name(name, *line)?,
                    Target::Index { name, index } => {
                        self.name(name, *line)?;
                        self.expr(index)?;
                    }
                }
                self.expr(value)
            }
            Stmt::If {
                branches,
                otherwise,
                ..
            } => {
                for (cond, body) in branches {
                    self.expr(cond)?;
                    self.block(body)?;
                }
                match otherwise {
                    Some(body) => self.block(body),
                    None => Ok(()),
                }
            }
            Stmt::For {
                var,
                iter,
                body,
                line,
            } => {
                self.name(var, *line)?;
                self.expr(iter)?;
                self.block(body)
            }
            Stmt::Expr { expr, .. } => self.expr(expr),
        }
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), ScriptError> {
        match expr {
            Expr::Literal(_) => Ok(()),
            Expr::Name { name, line } => self.name(name, *line),
            Expr::List(items) => items.iter().try_for_each(|e| self.expr(e)),
            Expr::Map(entries) => entries.iter().try_for_each(|(k, v)| {
                self.expr(k)?;
                self.expr(v)
            }),
            Expr::Unary { expr, .. } => self.expr(expr),
            Expr::Binary { lhs, rhs, .. } => {
                self.expr(lhs)?;
                self.expr(rhs)
            }
            Expr::Index { base, index, .. } => {
                self.expr(base)?;
                self.expr(index)
            }
            Expr::Attr { base, name, line } => {
                self.name(name, *line)?;
                self.expr(base)
            }
            Expr::Call { callee, args, line } => {
                match callee {
                    Callee::Function(name) => {
                        self.name(name, *line)?;
                        if !self.capabilities.contains(name) {
                            return Err(ScriptError::Rejected(format!(
                                "function `{}` is not available (line {})",
                                name, line
                            )));
                        }
                    }
                    Callee::Method { receiver, name } => {
                        self.name(name, *line)?;
                        if !METHODS.contains(&name.as_str()) {
                            return Err(ScriptError::Rejected(format!(
                                "method `{}` is not available (line {})",
                                name, line
                            )));
                        }
                        self.expr(receiver)?;
                    }
                }
                args.iter().try_for_each(|arg| self.expr(arg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::sandbox::ScriptMode;

    fn validate(source: &str) -> Result<Program, ScriptError> {
        ScriptValidator::new(10 * 1024, &[])
            .validate(source, &CapabilityTable::for_mode(ScriptMode::Hook))
    }

    #[test]
    fn test_accepts_ordinary_script() {
        let source = "token = response['json']['data']['token']\nif len(token) > 0 { set_var('token', token.strip()) }";
        assert!(validate(source).is_ok());
    }

    #[test]
    fn test_rejects_denylisted_references() {
        for source in [
            "open('/etc/passwd')",
            "x = eval",
            "y = response.os",
            "os = 1",
            "for sys in [1] { }",
            "x = __builtins__",
            "x = case.__class__",
        ] {
            let err = validate(source).unwrap_err();
            assert!(err.is_rejected(), "{} should be rejected, got {:?}", source, err);
        }
    }

    #[test]
    fn test_rejects_imports() {
        assert!(matches!(validate("import os"), Err(ScriptError::Rejected(_))));
        assert!(matches!(
            validate("x = 1\nfrom subprocess import run"),
            Err(ScriptError::Rejected(_))
        ));
    }

    #[test]
    fn test_default_closed() {
        assert!(matches!(validate("fetch('http://x')"), Err(ScriptError::Rejected(_))));
        assert!(matches!(validate("x = 'a'.format(1)"), Err(ScriptError::Rejected(_))));
        // 断言辅助函数在钩子模式下不可用
        assert!(matches!(validate("assert_true(1)"), Err(ScriptError::Rejected(_))));
    }

    #[test]
    fn test_size_ceiling_and_extra_denylist() {
        let validator = ScriptValidator::new(8, &["sleep".to_string()]);
        let table = CapabilityTable::for_mode(ScriptMode::Hook);
        assert!(matches!(
            validator.validate("x = 123456789", &table),
            Err(ScriptError::Rejected(_))
        ));
        assert!(matches!(validator.validate("sleep", &table), Err(ScriptError::Rejected(_))));
    }
}
