//! # 格式识别
//!
//! 仅根据内容判断文件属于哪种 FLEUR 格式，与文件名无关：
//! 1. 能作为 XML 解析：根元素为 `fleurOutput`（或带 `fleurOutputVersion`）
//!    则为 out.xml，否则为 inp.xml
//! 2. 不能解析：首行及紧随其后的注释行含 inpgen 标记则为 inpgen 输入
//! 3. 其余情况：看起来像标记语言时返回解析错误，否则 `UnrecognizedFormat`
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs`, `commands/` 使用
//! - 使用 `document/`, `parsers/inpgen.rs`

use super::inpgen::has_title_marker;
use super::outxml::OUTPUT_ROOT;
use super::FormatDialect;
use crate::document;
use crate::error::{FleurError, Result};
use std::fs;
use std::path::Path;

/// 判断内容的格式
pub fn detect(bytes: &[u8]) -> Result<FormatDialect> {
    let xml_error = match document::parse(bytes) {
        Ok(root) => {
            let dialect = if root.name == OUTPUT_ROOT || root.attr("fleurOutputVersion").is_some() {
                FormatDialect::OutputXml
            } else {
                FormatDialect::InputXml
            };
            return Ok(dialect);
        }
        Err(e) => e,
    };

    let text = String::from_utf8_lossy(bytes);
    if header_lines(&text).any(has_title_marker) {
        return Ok(FormatDialect::InputGenerator);
    }

    if text.trim_start().starts_with('<') {
        return Err(xml_error);
    }

    let first = text.lines().next().unwrap_or("").trim();
    Err(FleurError::UnrecognizedFormat(if first.is_empty() {
        "empty content".to_string()
    } else {
        format!("no FLEUR format matches content starting with '{}'", truncate(first, 40))
    }))
}

/// 读取文件并判断格式
pub fn detect_file(path: &Path) -> Result<FormatDialect> {
    let bytes = fs::read(path).map_err(|e| FleurError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    detect(&bytes)
}

/// 首行以及紧随其后的 `!`/`#` 注释行
fn header_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut lines = text.lines();
    let first = lines.next();
    first.into_iter().chain(lines.take_while(|l| {
        let t = l.trim_start();
        t.starts_with('!') || t.starts_with('#')
    }))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
