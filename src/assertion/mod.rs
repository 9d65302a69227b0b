/// 断言模块 - 声明式与脚本断言
mod evaluator;
mod types;

pub use evaluator::{AssertionEvaluator, case_passed, evaluate_declarative};
pub use types::AssertionOutcome;
