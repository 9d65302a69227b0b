use crate::Result;
use clap::{Parser, Subcommand};
use rucase::config::{ConfigLoader, EngineConfig};
use rucase::runner::TestReporter;
use rucase::script::ScriptMode;
use rucase::store::Workspace;
use rucase::variable::VariableMap;
use rucase::Engine;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 工作区文件（TOML 或 JSON）
    #[arg(short, long, global = true, default_value = "workspace.toml")]
    pub workspace: PathBuf,

    /// 环境 ID，覆盖用例/套件声明的环境
    #[arg(short, long, global = true)]
    pub env: Option<String>,

    /// 运行时变量 key=value，可重复
    #[arg(long = "var", global = true)]
    pub vars: Vec<String>,

    /// 配置文件路径，缺省时自动查找 rucase.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// 显示详细输出
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 执行单个用例（参数化用例自动展开）
    RunCase { case_id: String },

    /// 按顺序执行套件
    RunSuite { suite_id: String },

    /// 静态校验脚本，不执行
    CheckScript {
        file: PathBuf,

        /// 按断言脚本校验（允许 assert_* 函数）
        #[arg(long)]
        assertion: bool,
    },
}

/// 执行命令，返回是否全部通过
pub async fn run(cli: Cli) -> Result<bool> {
    let config = load_config(cli.config.as_ref())?;
    let reporter = TestReporter::new(cli.verbose);

    if let Commands::CheckScript { file, assertion } = &cli.command {
        let source = fs::read_to_string(file)?;
        let mode = if *assertion { ScriptMode::Assertion } else { ScriptMode::Hook };
        let engine = Engine::new(config)?;
        return match engine.check_script(&source, mode) {
            Ok(()) => {
                println!("{} is valid", file.display());
                Ok(true)
            }
            Err(e) => {
                eprintln!("{}: {}", file.display(), e);
                Ok(false)
            }
        };
    }

    let workspace = Workspace::load(&cli.workspace)?;
    let engine = Engine::new(config)?.with_loader(Arc::new(workspace));
    let seed = parse_vars(&cli.vars)?;
    engine.start();

    let passed = match &cli.command {
        Commands::RunCase { case_id } => {
            let run = engine.run_case_by_id(case_id, cli.env.as_deref(), &seed).await?;
            reporter.print_case_run(&run);
            run.summary().failed == 0
        }
        Commands::RunSuite { suite_id } => {
            let result = engine.run_suite_by_id(suite_id, cli.env.as_deref(), &seed).await?;
            reporter.print_suite(&result);
            result.failed == 0
        }
        Commands::CheckScript { .. } => true,
    };

    engine.shutdown();
    Ok(passed)
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => Ok(ConfigLoader::load_from_path(path)?),
        None => Ok(ConfigLoader::find_and_load().unwrap_or_default()),
    }
}

/// 值能按 JSON 解析时保留类型（数字、布尔等），否则按字符串处理
fn parse_vars(vars: &[String]) -> Result<VariableMap> {
    let mut map = VariableMap::new();
    for var in vars {
        let (key, value) = ConfigLoader::parse_cli_var(var)
            .ok_or_else(|| anyhow::anyhow!("Invalid variable '{}', expected key=value", var))?;
        let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
        map.insert(key, value);
    }
    Ok(map)
}
