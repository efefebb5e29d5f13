//! # convert 子命令 CLI 定义
//!
//! 批量将 FLEUR 文件（inpgen / inp.xml / out.xml）转换为 inpgen 输入
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/convert.rs`

use clap::Args;
use std::path::PathBuf;

/// convert 子命令参数
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Input file or directory
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output directory for inpgen files
    #[arg(short, long)]
    pub output: PathBuf,

    /// Recurse into subdirectories
    #[arg(short, long, default_value_t = false)]
    pub recursive: bool,

    /// Glob pattern(s) for input files, comma separated
    #[arg(short, long, default_value = "*.xml,*.in")]
    pub pattern: String,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,

    /// Title line for the generated files
    #[arg(long)]
    pub title: Option<String>,

    /// Overwrite existing output files
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,
}
