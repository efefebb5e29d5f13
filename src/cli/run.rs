//! # run 子命令 CLI 定义
//!
//! 可执行文件可由命令行、环境变量 `FLEUR_INPGEN` / `FLEUR_EXECUTABLE`
//! 或 TOML 配置文件给出，优先级依次降低。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/run.rs`

use crate::models::Property;
use clap::Args;
use std::path::PathBuf;

/// run 子命令参数
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Structure file (inpgen input, inp.xml or out.xml)
    pub structure: PathBuf,

    /// TOML profile with executables and calculation parameters
    #[arg(long, value_name = "FILE")]
    pub profile: Option<PathBuf>,

    /// inpgen executable
    #[arg(long, env = "FLEUR_INPGEN")]
    pub inpgen: Option<PathBuf>,

    /// fleur executable
    #[arg(long, env = "FLEUR_EXECUTABLE")]
    pub fleur: Option<PathBuf>,

    /// Properties to extract (energy, free_energy, forces, fermi_level, magmoms)
    #[arg(long, value_delimiter = ',', default_value = "energy")]
    pub properties: Vec<Property>,

    /// Overall time limit in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// Working directory (default: a temporary directory)
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// Maximum number of fleur runs until the density converges
    #[arg(long)]
    pub max_runs: Option<usize>,

    /// SCF iterations per fleur run (sets scfLoop/@itmax)
    #[arg(long)]
    pub itmax: Option<u32>,

    /// Keep the working directory when the calculation fails
    #[arg(long, default_value_t = false)]
    pub keep_failed: bool,

    /// Print the FLEUR version before running
    #[arg(long, default_value_t = false)]
    pub show_version: bool,
}
