//! # info 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/info.rs`

use crate::parsers::outxml::DEFAULT_DISTANCE_THRESHOLD;
use clap::Args;
use std::path::PathBuf;

/// info 子命令参数
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// FLEUR file (inpgen input, inp.xml or out.xml)
    pub file: PathBuf,

    /// List every atom with its position
    #[arg(short, long, default_value_t = false)]
    pub atoms: bool,

    /// Density distance below which an out.xml counts as converged (me/bohr^3)
    #[arg(long, default_value_t = DEFAULT_DISTANCE_THRESHOLD)]
    pub threshold: f64,
}
