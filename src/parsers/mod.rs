//! # 解析器模块
//!
//! FLEUR 三种文本格式的读写：
//! - inpgen 输入 (`fleur.in` 等)
//! - inp.xml
//! - out.xml
//!
//! 按内容识别格式 (`detect`)，按格式分发读写 (`read` / `write`)。
//!
//! ## 依赖关系
//! - 被 `commands/`, `calculator/`, `batch/` 使用
//! - 使用 `models/`, `document/`
//! - 子模块: detect, inpgen, inpxml, outxml

pub mod detect;
pub mod inpgen;
pub mod inpxml;
pub mod outxml;

pub use detect::{detect, detect_file};

use crate::error::{FleurError, Result};
use crate::models::Structure;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// 支持的文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatDialect {
    /// inpgen 输入文件
    InputGenerator,
    /// inp.xml
    InputXml,
    /// out.xml
    OutputXml,
}

impl FormatDialect {
    pub const ALL: [FormatDialect; 3] = [
        FormatDialect::InputGenerator,
        FormatDialect::InputXml,
        FormatDialect::OutputXml,
    ];

    /// 命令行中使用的名称
    pub fn name(&self) -> &'static str {
        match self {
            FormatDialect::InputGenerator => "inpgen",
            FormatDialect::InputXml => "inpxml",
            FormatDialect::OutputXml => "outxml",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FormatDialect::InputGenerator => "FLEUR input generator input",
            FormatDialect::InputXml => "FLEUR inp.xml",
            FormatDialect::OutputXml => "FLEUR out.xml",
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, FormatDialect::InputGenerator)
    }
}

impl fmt::Display for FormatDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FormatDialect {
    type Err = FleurError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inpgen" | "fleur-inpgen" => Ok(FormatDialect::InputGenerator),
            "inpxml" | "inp.xml" | "fleur-xml" => Ok(FormatDialect::InputXml),
            "outxml" | "out.xml" | "fleur-outxml" => Ok(FormatDialect::OutputXml),
            other => Err(FleurError::InvalidArgument(format!(
                "unknown format '{}' (expected inpgen, inpxml or outxml)",
                other
            ))),
        }
    }
}

/// 按指定格式读取结构
pub fn read(bytes: &[u8], dialect: FormatDialect) -> Result<Structure> {
    match dialect {
        FormatDialect::InputGenerator => {
            let text = std::str::from_utf8(bytes).map_err(|e| FleurError::InvalidSyntax {
                line: 1,
                reason: format!("content is not valid UTF-8: {}", e),
            })?;
            inpgen::parse_inpgen_content(text)
        }
        FormatDialect::InputXml => inpxml::parse_inpxml_content(bytes),
        FormatDialect::OutputXml => outxml::read_outxml_structure(bytes),
    }
}

/// 按指定格式写出结构；只有 inpgen 格式可写
pub fn write(structure: &Structure, dialect: FormatDialect) -> Result<String> {
    match dialect {
        FormatDialect::InputGenerator => {
            inpgen::to_inpgen_string(structure, &inpgen::InpgenOptions::default())
        }
        FormatDialect::InputXml | FormatDialect::OutputXml => {
            Err(FleurError::UnsupportedOperation(format!(
                "writing {} is not supported, generate it with inpgen",
                dialect.description()
            )))
        }
    }
}

/// 读取文件，识别格式后解析
pub fn read_file(path: &Path) -> Result<(FormatDialect, Structure)> {
    if !path.exists() {
        return Err(FleurError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    let bytes = fs::read(path).map_err(|e| FleurError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    let dialect = detect(&bytes)?;
    tracing::debug!(path = %path.display(), %dialect, "detected format");
    Ok((dialect, read(&bytes, dialect)?))
}
