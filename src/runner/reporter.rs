use crate::assertion::AssertionOutcome;
use crate::runner::types::{CaseResult, CaseRun, SuiteResult};
use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, Table};

/// 终端输出
pub struct TestReporter {
    verbose: bool,
}

impl TestReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// 打印单个用例结果
    pub fn print_result(&self, result: &CaseResult) {
        let symbol = if result.success { "✓".green() } else { "✗".red() };
        let status = result
            .status_code
            .map(|s| s.to_string())
            .unwrap_or_else(|| "---".to_string());

        println!(
            " {} {} {} {} [{}] ({}ms)",
            symbol,
            result.name.bold(),
            result.method.cyan(),
            result.url,
            status,
            result.time_ms
        );

        if let Some(error) = &result.error {
            println!("   {}: {}", "Error".red().bold(), error);
        }

        // 失败时总是展开断言，verbose 时连同成功的一起
        if (self.verbose || !result.success) && !result.assertions.is_empty() {
            println!("   Assertions:");
            for outcome in &result.assertions {
                self.print_assertion(outcome);
            }
        }

        if self.verbose {
            if !result.extracted_variables.is_empty() {
                println!("   Extracted:");
                for (key, value) in &result.extracted_variables {
                    println!("     {} = {}", key.yellow(), value);
                }
            }
            for line in &result.script_output {
                println!("   {} {}", "»".dimmed(), line.dimmed());
            }
            if !result.body.is_empty() {
                println!("   Body: {}", truncate(&result.body, 500).dimmed());
            }
        }
    }

    fn print_assertion(&self, outcome: &AssertionOutcome) {
        let label = match &outcome.name {
            Some(name) => format!("{} ({})", name, outcome.kind),
            None => outcome.kind.to_string(),
        };
        if outcome.success {
            println!("     {} {}", "✓".green(), label);
        } else {
            println!("     {} {}", "✗".red(), label);
            println!("       {}", outcome.message.red());
        }
    }

    pub fn print_case_run(&self, run: &CaseRun) {
        for result in run.results() {
            self.print_result(result);
        }
        let summary = run.summary();
        if let CaseRun::Parameterized(_) = run {
            println!(
                "\n  {}: {} passed, {} failed, {} total ({:.2}%)",
                "Iterations".bold(),
                summary.passed.to_string().green(),
                summary.failed.to_string().red(),
                summary.total,
                summary.pass_rate
            );
        }
    }

    /// 打印套件开始
    pub fn print_header(&self, suite_name: &str, total: usize) {
        println!("\nRunning {} cases from suite {}...\n", total, suite_name.bold());
    }

    /// 打印套件汇总表
    pub fn print_suite(&self, suite: &SuiteResult) {
        for result in &suite.case_results {
            self.print_result(result);
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["Case", "Method", "Status", "Assertions", "Time", "Result"]);

        for result in &suite.case_results {
            let status = match result.status_code {
                Some(code) => Cell::new(code).fg(if code < 400 { Color::Green } else { Color::Red }),
                None => Cell::new("---").add_attribute(Attribute::Dim),
            };
            let verdict = if result.success {
                Cell::new("PASS").fg(Color::Green)
            } else {
                Cell::new("FAIL").fg(Color::Red)
            };
            table.add_row(vec![
                Cell::new(&result.name),
                Cell::new(&result.method),
                status,
                Cell::new(format!("{}/{}", result.passed_assertions(), result.assertions.len())),
                Cell::new(format!("{}ms", result.time_ms)),
                verdict,
            ]);
        }

        println!("\n{}", table);
        println!(
            "  {}: {} passed, {} failed, {} total",
            "Cases".bold(),
            suite.passed.to_string().green(),
            suite.failed.to_string().red(),
            suite.total
        );
        println!("  {}: {:.2}%", "Pass rate".bold(), suite.pass_rate);
        println!("  {}: {:.3}s", "Duration".bold(), suite.duration_ms as f64 / 1000.0);
        println!();
    }
}

impl Default for TestReporter {
    fn default() -> Self {
        Self::new(false)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
