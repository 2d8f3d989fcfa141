pub mod cli;
pub mod errors;
pub mod loader;

use errors::FrontendError;
use tracing::info;
use zsheet_config::SheetConfig;

pub use cli::{CliOptions, CliOutcome};

/// 执行一次 CLI 分页出图并打印结果。
pub fn run_cli(options: &CliOptions, config: &SheetConfig) -> Result<CliOutcome, FrontendError> {
    info!(mode = ?options.mode, renumber = options.renumber, "启动 CLI 前端");
    let outcome = cli::run(options, config)?;
    cli::print_outcome(&outcome);
    Ok(outcome)
}
