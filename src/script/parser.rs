//! 脚本解析：pest 语法 (`grammar.pest`) 产出的配对树转换为语法树

use crate::script::ast::{BinaryOp, Callee, Expr, Program, Stmt, Target, UnaryOp};
use crate::script::error::ScriptError;
use pest::Parser;
use pest::error::{Error, LineColLocation};
use pest::iterators::{Pair, Pairs};
use pest_derive::Parser;
use serde_json::Value;

#[derive(Parser)]
#[grammar = "script/grammar.pest"]
struct ScriptParser;

/// 把脚本源码解析为语法树
pub fn parse_program(source: &str) -> Result<Program, ScriptError> {
    let mut pairs = ScriptParser::parse(Rule::program, source).map_err(convert_parse_error)?;
    let program = next(&mut pairs, 1)?;

    let body = statements(program.into_inner())?;
    Ok(Program { body })
}

// ============================================================================
// 语句
// ============================================================================

fn statements(pairs: Pairs<'_, Rule>) -> Result<Vec<Stmt>, ScriptError> {
    pairs
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(build_stmt)
        .collect()
}

fn build_stmt(pair: Pair<'_, Rule>) -> Result<Stmt, ScriptError> {
    let line = line_of(&pair);
    match pair.as_rule() {
        Rule::import_stmt => {
            let mut inner = pair.into_inner();
            let keyword = next(&mut inner, line)?.as_str().to_string();
            let module = inner.next().map(|p| module_name(p.as_str())).unwrap_or_default();
            Ok(Stmt::Import {
                keyword,
                module,
                line,
            })
        }

        Rule::if_stmt => {
            let mut branches = Vec::new();
            let mut otherwise = None;
            let mut inner = without_keywords(pair);

            let cond = build_expr(next(&mut inner, line)?)?;
            let body = build_block(next(&mut inner, line)?)?;
            branches.push((cond, body));

            for clause in inner {
                let clause_line = line_of(&clause);
                match clause.as_rule() {
                    Rule::elif_branch => {
                        let mut parts = without_keywords(clause);
                        let cond = build_expr(next(&mut parts, clause_line)?)?;
                        let body = build_block(next(&mut parts, clause_line)?)?;
                        branches.push((cond, body));
                    }
                    Rule::else_branch => {
                        let mut parts = without_keywords(clause);
                        otherwise = Some(build_block(next(&mut parts, clause_line)?)?);
                    }
                    rule => return Err(unexpected(rule, clause_line)),
                }
            }

            Ok(Stmt::If {
                branches,
                otherwise,
                line,
            })
        }

        Rule::for_stmt => {
            let mut inner = without_keywords(pair);
            let var = next(&mut inner, line)?.as_str().to_string();
            let iter = build_expr(next(&mut inner, line)?)?;
            let body = build_block(next(&mut inner, line)?)?;
            Ok(Stmt::For {
                var,
                iter,
                body,
                line,
            })
        }

        Rule::assign_stmt => {
            let mut inner = pair.into_inner();
            let target = build_target(build_expr(next(&mut inner, line)?)?, line)?;
            let _assign = next(&mut inner, line)?;
            let value = build_expr(next(&mut inner, line)?)?;
            Ok(Stmt::Assign {
                target,
                value,
                line,
            })
        }

        Rule::expr_stmt => {
            let mut inner = pair.into_inner();
            let expr = build_expr(next(&mut inner, line)?)?;
            Ok(Stmt::Expr { expr, line })
        }

        rule => Err(unexpected(rule, line)),
    }
}

fn build_block(pair: Pair<'_, Rule>) -> Result<Vec<Stmt>, ScriptError> {
    statements(pair.into_inner())
}

/// 只支持 `name = ...` 与 `name[key] = ...`
fn build_target(expr: Expr, line: usize) -> Result<Target, ScriptError> {
    match expr {
        Expr::Name { name, .. } => Ok(Target::Name(name)),
        Expr::Index { base, index, .. } => match *base {
            Expr::Name { name, .. } => Ok(Target::Index {
                name,
                index: *index,
            }),
            _ => Err(ScriptError::syntax(
                line,
                "only `name[key] = value` index assignment is supported",
            )),
        },
        _ => Err(ScriptError::syntax(line, "invalid assignment target")),
    }
}

/// `from subprocess import run` → "subprocess import run"
fn module_name(raw: &str) -> String {
    let raw = raw.split('#').next().unwrap_or_default();
    raw.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// 表达式
// ============================================================================

fn build_expr(pair: Pair<'_, Rule>) -> Result<Expr, ScriptError> {
    let line = line_of(&pair);
    match pair.as_rule() {
        Rule::expr | Rule::paren => build_expr(next(&mut pair.into_inner(), line)?),

        Rule::or_expr | Rule::and_expr | Rule::comparison | Rule::additive | Rule::multiplicative => {
            fold_binary(pair.into_inner(), line)
        }

        Rule::not_expr | Rule::unary => {
            let mut inner = pair.into_inner();
            let first = next(&mut inner, line)?;
            let op = match first.as_rule() {
                Rule::not_op => UnaryOp::Not,
                Rule::neg => UnaryOp::Neg,
                _ => return build_expr(first),
            };
            let operand = build_expr(next(&mut inner, line)?)?;
            Ok(Expr::Unary {
                op,
                expr: Box::new(operand),
                line,
            })
        }

        Rule::postfix => {
            let mut inner = pair.into_inner();
            let mut expr = build_expr(next(&mut inner, line)?)?;
            for suffix in inner {
                expr = apply_suffix(expr, suffix)?;
            }
            Ok(expr)
        }

        Rule::int => pair
            .as_str()
            .parse::<i64>()
            .map(|n| Expr::Literal(Value::from(n)))
            .map_err(|_| ScriptError::syntax(line, format!("integer out of range `{}`", pair.as_str()))),

        Rule::float => {
            let f: f64 = pair
                .as_str()
                .parse()
                .map_err(|_| ScriptError::syntax(line, format!("invalid number `{}`", pair.as_str())))?;
            Ok(Expr::Literal(
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            ))
        }

        Rule::string => {
            let text = pair.into_inner().next().map(|p| p.as_str()).unwrap_or_default();
            Ok(Expr::Literal(Value::String(unescape(text))))
        }

        Rule::boolean => Ok(Expr::Literal(Value::Bool(matches!(pair.as_str(), "true" | "True")))),

        Rule::null => Ok(Expr::Literal(Value::Null)),

        Rule::ident => Ok(Expr::Name {
            name: pair.as_str().to_string(),
            line,
        }),

        Rule::list => Ok(Expr::List(
            pair.into_inner().map(build_expr).collect::<Result<_, _>>()?,
        )),

        Rule::map => {
            let mut entries = Vec::new();
            for entry in pair.into_inner() {
                let entry_line = line_of(&entry);
                let mut kv = entry.into_inner();
                let key = build_expr(next(&mut kv, entry_line)?)?;
                let value = build_expr(next(&mut kv, entry_line)?)?;
                entries.push((key, value));
            }
            Ok(Expr::Map(entries))
        }

        Rule::import_ref => Err(ScriptError::Rejected(format!(
            "import-like construct `{}` is not allowed (line {})",
            pair.as_str(),
            line
        ))),

        rule => Err(unexpected(rule, line)),
    }
}

/// 左结合地折叠 `operand (op operand)*`
fn fold_binary(mut pairs: Pairs<'_, Rule>, line: usize) -> Result<Expr, ScriptError> {
    let mut lhs = build_expr(next(&mut pairs, line)?)?;

    while let Some(op) = pairs.next() {
        let op_line = line_of(&op);
        let rhs = build_expr(next(&mut pairs, op_line)?)?;
        lhs = match op.as_rule() {
            Rule::not_in => Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(binary(BinaryOp::In, lhs, rhs, op_line)),
                line: op_line,
            },
            rule => binary(binary_op(rule, op_line)?, lhs, rhs, op_line),
        };
    }

    Ok(lhs)
}

fn binary_op(rule: Rule, line: usize) -> Result<BinaryOp, ScriptError> {
    let op = match rule {
        Rule::or_op => BinaryOp::Or,
        Rule::and_op => BinaryOp::And,
        Rule::eq => BinaryOp::Eq,
        Rule::ne => BinaryOp::NotEq,
        Rule::lt => BinaryOp::Lt,
        Rule::le => BinaryOp::Le,
        Rule::gt => BinaryOp::Gt,
        Rule::ge => BinaryOp::Ge,
        Rule::in_op => BinaryOp::In,
        Rule::add => BinaryOp::Add,
        Rule::sub => BinaryOp::Sub,
        Rule::mul => BinaryOp::Mul,
        Rule::div => BinaryOp::Div,
        Rule::rem => BinaryOp::Rem,
        other => return Err(unexpected(other, line)),
    };
    Ok(op)
}

fn apply_suffix(expr: Expr, suffix: Pair<'_, Rule>) -> Result<Expr, ScriptError> {
    let line = line_of(&suffix);
    match suffix.as_rule() {
        Rule::call => {
            let args = suffix.into_inner().map(build_expr).collect::<Result<_, _>>()?;
            let callee = match expr {
                Expr::Name { name, .. } => Callee::Function(name),
                Expr::Attr { base, name, .. } => Callee::Method {
                    receiver: base,
                    name,
                },
                _ => {
                    return Err(ScriptError::syntax(
                        line,
                        "only named functions and methods can be called",
                    ));
                }
            };
            Ok(Expr::Call { callee, args, line })
        }
        Rule::attr => {
            let name = next(&mut suffix.into_inner(), line)?.as_str().to_string();
            Ok(Expr::Attr {
                base: Box::new(expr),
                name,
                line,
            })
        }
        Rule::index => {
            let index = build_expr(next(&mut suffix.into_inner(), line)?)?;
            Ok(Expr::Index {
                base: Box::new(expr),
                index: Box::new(index),
                line,
            })
        }
        rule => Err(unexpected(rule, line)),
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, line: usize) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        line,
    }
}

fn unescape(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('0') => result.push('\0'),
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }

    result
}

// ============================================================================
// 工具
// ============================================================================

fn line_of(pair: &Pair<'_, Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

fn next<'i>(pairs: &mut impl Iterator<Item = Pair<'i, Rule>>, line: usize) -> Result<Pair<'i, Rule>, ScriptError> {
    pairs
        .next()
        .ok_or_else(|| ScriptError::syntax(line, "incomplete statement"))
}

/// 关键字只用于识别结构，构建语法树时跳过
fn without_keywords(pair: Pair<'_, Rule>) -> impl Iterator<Item = Pair<'_, Rule>> {
    pair.into_inner().filter(|p| {
        !matches!(
            p.as_rule(),
            Rule::kw_if | Rule::kw_elif | Rule::kw_else | Rule::kw_for | Rule::kw_in
        )
    })
}

fn unexpected(rule: Rule, line: usize) -> ScriptError {
    ScriptError::syntax(line, format!("unexpected {:?}", rule))
}

fn convert_parse_error(error: Error<Rule>) -> ScriptError {
    let line = match error.line_col {
        LineColLocation::Pos((line, _)) => line,
        LineColLocation::Span((line, _), _) => line,
    };
    let error = error.renamed_rules(|rule| describe(*rule).to_string());
    ScriptError::syntax(line, error.variant.message().into_owned())
}

fn describe(rule: Rule) -> &'static str {
    match rule {
        Rule::EOI => "end of script",
        Rule::expr | Rule::or_expr | Rule::and_expr | Rule::not_expr | Rule::comparison => "expression",
        Rule::additive | Rule::multiplicative | Rule::unary | Rule::postfix => "expression",
        Rule::block => "`{`",
        Rule::ident => "name",
        Rule::assign_op => "`=`",
        Rule::call | Rule::attr | Rule::index => "`(`, `.` or `[`",
        Rule::string => "string",
        Rule::kw_in => "`in`",
        Rule::elif_branch | Rule::else_branch => "`elif` or `else`",
        _ => "token",
    }
}
