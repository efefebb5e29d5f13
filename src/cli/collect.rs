//! # collect 子命令 CLI 定义
//!
//! 汇总计算目录中 out.xml 的结果到 CSV
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/collect.rs`

use crate::parsers::outxml::DEFAULT_DISTANCE_THRESHOLD;
use clap::Args;
use std::path::PathBuf;

/// collect 子命令参数
#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Root directory containing FLEUR calculation folders
    pub dir: PathBuf,

    /// File name pattern of FLEUR outputs
    #[arg(short, long, default_value = "out.xml")]
    pub pattern: String,

    /// Only look at files directly inside DIR
    #[arg(long, default_value_t = false)]
    pub flat: bool,

    /// CSV file for the collected results
    #[arg(short, long, default_value = "fleur_results.csv")]
    pub output: PathBuf,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,

    /// Density distance below which a run counts as converged (me/bohr^3)
    #[arg(long, default_value_t = DEFAULT_DISTANCE_THRESHOLD)]
    pub threshold: f64,
}
