//! # 文件收集器
//!
//! 根据输入路径和模式收集待处理文件列表。
//!
//! ## 功能
//! - 支持单文件和目录输入
//! - glob 模式匹配（逗号分隔多个模式）
//! - 递归目录搜索
//!
//! ## 依赖关系
//! - 被 `commands/convert.rs`, `commands/collect.rs` 调用
//! - 使用 `walkdir` 遍历目录，`glob` 匹配文件名

use crate::error::{FleurError, Result};

use glob::Pattern;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 文件收集器
pub struct FileCollector {
    /// 输入路径
    input: PathBuf,
    /// 匹配模式列表
    patterns: Vec<Pattern>,
    /// 是否递归
    recursive: bool,
}

impl FileCollector {
    /// 创建新的文件收集器，默认匹配所有文件
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            patterns: Vec::new(),
            recursive: false,
        }
    }

    /// 设置匹配模式（逗号分隔的多模式）
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        self.patterns = pattern
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    FleurError::InvalidArgument(format!("Invalid pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<_>>()?;
        Ok(self)
    }

    /// 设置是否递归搜索
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// 收集所有匹配的文件，按路径排序
    ///
    /// 单文件输入不做模式匹配，直接返回。
    pub fn collect(&self) -> Result<Vec<PathBuf>> {
        if self.input.is_file() {
            return Ok(vec![self.input.clone()]);
        }
        if !self.input.is_dir() {
            return Err(FleurError::DirectoryNotFound {
                path: self.input.display().to_string(),
            });
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };

        let mut files: Vec<PathBuf> = WalkDir::new(&self.input)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| self.matches(e.path()))
            .map(|e| e.path().to_path_buf())
            .collect();
        files.sort();
        Ok(files)
    }

    /// 文件名是否匹配任一模式
    fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_collect_with_patterns() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("calc1")).unwrap();
        fs::write(dir.path().join("calc1").join("out.xml"), "").unwrap();
        fs::write(dir.path().join("inp.xml"), "").unwrap();
        fs::write(dir.path().join("si.in"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let flat = FileCollector::new(dir.path())
            .with_pattern("*.xml, *.in")
            .unwrap()
            .collect()
            .unwrap();
        let names: Vec<_> = flat
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["inp.xml", "si.in"]);

        let deep = FileCollector::new(dir.path())
            .with_pattern("out.xml")
            .unwrap()
            .recursive(true)
            .collect()
            .unwrap();
        assert_eq!(deep, vec![dir.path().join("calc1").join("out.xml")]);
    }

    #[test]
    fn test_single_file_and_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("fleur.in");
        fs::write(&file, "").unwrap();
        assert_eq!(FileCollector::new(&file).collect().unwrap(), vec![file]);

        assert!(matches!(
            FileCollector::new(dir.path().join("missing")).collect(),
            Err(FleurError::DirectoryNotFound { .. })
        ));
        assert!(FileCollector::new(dir.path()).with_pattern("[").is_err());
    }
}
