//! # fleurio - FLEUR 文件格式与计算执行
//!
//! 读写 FLEUR 全电子 DFT 程序的输入输出文件，并驱动 inpgen / fleur 完成计算。
//!
//! ## 格式
//! - inpgen 输入（`FormatDialect::InputGenerator`，可读写）
//! - `inp.xml`（`FormatDialect::InputXml`，只读，可修改属性）
//! - `out.xml`（`FormatDialect::OutputXml`，只读，含计算结果）
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── calculator/ (inpgen / fleur 进程编排)
//!   │     ├── parsers/    (格式检测与编解码)
//!   │     │     └── document/ (XML 文档层)
//!   │     ├── batch/      (批量文件处理)
//!   │     └── models/     (数据模型)
//!   ├── utils/      (输出、进度条、日志)
//!   └── error.rs    (错误处理)
//! ```

pub mod batch;
pub mod calculator;
pub mod cli;
pub mod commands;
pub mod document;
pub mod error;
pub mod models;
pub mod parsers;
pub mod utils;

pub use calculator::{calculate, Calculator, CalculationProfile};
pub use error::{FleurError, Result};
pub use models::{Atom, CalculationResult, Lattice, Property, Structure};
pub use parsers::{detect, FormatDialect};
