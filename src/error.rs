//! # 统一错误处理模块
//!
//! 定义 fleurio 的所有错误类型，使用 `thiserror` 派生。
//! 每种失败原因对应一个独立的变体，调用方可以按原因分支处理
//! （例如只在 `TimeoutExceeded` 时重试）。
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use std::time::Duration;
use thiserror::Error;

/// fleurio 统一错误类型
#[derive(Error, Debug)]
pub enum FleurError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 文档结构与格式识别错误
    // ─────────────────────────────────────────────────────────────
    #[error("Malformed document at {line}:{column}: {reason}")]
    MalformedDocument {
        line: u32,
        column: u32,
        reason: String,
    },

    #[error("Unrecognized format: {0}")]
    UnrecognizedFormat(String),

    // ─────────────────────────────────────────────────────────────
    // 语义解析错误（携带行号或元素路径）
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid syntax at line {line}: {reason}")]
    InvalidSyntax { line: usize, reason: String },

    #[error("Invalid value '{value}' at {path}")]
    InvalidValue { path: String, value: String },

    #[error("Missing element: {path}")]
    MissingElement { path: String },

    #[error("Incomplete result: {reason}")]
    IncompleteResult { reason: String },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    // ─────────────────────────────────────────────────────────────
    // 外部进程错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to start '{program}'")]
    ProcessSpawnError {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with code {}\n{stderr_tail}", display_code(.code))]
    ProcessExitError {
        program: String,
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("Failed to parse calculation output")]
    ResultParseError {
        #[source]
        source: Box<FleurError>,
    },

    #[error("Calculation exceeded the timeout of {:.1} s", .0.as_secs_f64())]
    TimeoutExceeded(Duration),

    #[error("Calculation was cancelled")]
    Cancelled,

    // ─────────────────────────────────────────────────────────────
    // 参数与配置错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid profile {path}\nReason: {reason}")]
    ProfileError { path: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // CSV 错误
    // ─────────────────────────────────────────────────────────────
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

impl FleurError {
    /// 是否为超时导致的失败
    pub fn is_timeout(&self) -> bool {
        matches!(self, FleurError::TimeoutExceeded(_))
    }

    /// 是否为用户取消
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FleurError::Cancelled)
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "<killed by signal>".to_string(),
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, FleurError>;
