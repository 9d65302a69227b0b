mod cli;

use clap::Parser;
use cli::Cli;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志系统
    rucase::logger::init_logger(cli.verbose);

    if !cli::run(cli).await? {
        std::process::exit(1);
    }
    Ok(())
}
