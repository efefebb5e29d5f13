//! # 批量处理模块
//!
//! 对一组 FLEUR 文件做相同的纯解析/转换工作，供 convert 与 collect 使用。
//! 子进程计算不经过这里，见 `calculator/`。
//!
//! ## 功能
//! - 单文件或目录输入，目录按 glob 模式（逗号分隔）筛选
//! - 在指定大小的线程池中并行处理，结果保持输入顺序
//! - 成功 / 跳过 / 失败计数
//!
//! ## 依赖关系
//! - 被 `commands/convert.rs`, `commands/collect.rs` 使用
//! - 使用 `rayon` 进行并行处理
//! - 使用 `indicatif` 显示进度

pub mod collector;
pub mod runner;

pub use collector::FileCollector;
pub use runner::{BatchResult, BatchRunner, ProcessResult};
