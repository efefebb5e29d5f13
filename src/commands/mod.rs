//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `parsers/`, `calculator/`, `batch/`, `utils/`
//! - 子模块: detect, convert, info, run, collect

pub mod collect;
pub mod convert;
pub mod detect;
pub mod info;
pub mod run;

use crate::cli::Commands;
use crate::error::Result;

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Detect(args) => detect::execute(args),
        Commands::Convert(args) => convert::execute(args),
        Commands::Info(args) => info::execute(args),
        Commands::Run(args) => run::execute(args),
        Commands::Collect(args) => collect::execute(args),
    }
}
