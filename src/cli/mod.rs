//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `detect`: 识别文件格式
//! - `convert`: 批量转换为 inpgen 输入
//! - `info`: 显示结构与计算结果摘要
//! - `run`: 运行 inpgen + fleur 计算
//! - `collect`: 汇总计算目录中的 out.xml 结果
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: detect, convert, info, run, collect

pub mod collect;
pub mod convert;
pub mod detect;
pub mod info;
pub mod run;

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// fleurio - FLEUR 文件格式与计算工具
#[derive(Parser, Debug)]
#[command(name = "fleurio")]
#[command(author = "Changjiang Wu")]
#[command(version)]
#[command(about = "FLEUR file formats and calculation runner", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Silence all log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect the FLEUR format of files from their content
    Detect(detect::DetectArgs),

    /// Convert FLEUR files (inpgen, inp.xml, out.xml) to inpgen input
    Convert(convert::ConvertArgs),

    /// Show the structure and results contained in a FLEUR file
    Info(info::InfoArgs),

    /// Run inpgen and fleur for a structure
    Run(run::RunArgs),

    /// Collect results from out.xml files into a CSV table
    Collect(collect::CollectArgs),
}
