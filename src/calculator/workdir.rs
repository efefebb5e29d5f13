//! # 计算工作目录
//!
//! 调用方指定目录（不存在时创建）或 `tempfile` 临时目录。
//! 已存在的指定目录在使用前删除上一次计算留下的文件，其它文件保留。
//! 失败清理时临时目录整体删除；指定目录若由本次计算创建则整体删除，
//! 否则只删除计算写入的文件。

use super::{
    FLEUR_ERR, FLEUR_LOG, INPGEN_ERR, INPGEN_INPUT, INPGEN_LOG, INPUT_XML, OUTPUT_XML,
};
use crate::error::{FleurError, Result};

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 计算过程中可能生成的文件
const CALCULATION_FILES: [&str; 7] = [
    INPGEN_INPUT,
    INPUT_XML,
    OUTPUT_XML,
    INPGEN_LOG,
    INPGEN_ERR,
    FLEUR_LOG,
    FLEUR_ERR,
];

#[derive(Debug)]
pub enum WorkDir {
    Temporary(TempDir),
    Persistent { path: PathBuf, created: bool },
}

impl WorkDir {
    /// 准备工作目录
    pub fn create(directory: Option<&Path>) -> Result<Self> {
        match directory {
            Some(path) => {
                let created = !path.exists();
                fs::create_dir_all(path).map_err(|e| FleurError::FileWriteError {
                    path: path.display().to_string(),
                    source: e,
                })?;
                if !created {
                    remove_calculation_files(path)?;
                }
                Ok(WorkDir::Persistent {
                    path: path.to_path_buf(),
                    created,
                })
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("fleurio-")
                    .tempdir()
                    .map_err(|e| FleurError::FileWriteError {
                        path: std::env::temp_dir().display().to_string(),
                        source: e,
                    })?;
                Ok(WorkDir::Temporary(dir))
            }
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            WorkDir::Temporary(dir) => dir.path(),
            WorkDir::Persistent { path, .. } => path,
        }
    }

    /// 删除计算产生的内容
    pub fn cleanup(self) {
        let result = match self {
            WorkDir::Temporary(dir) => dir.close(),
            WorkDir::Persistent { path, created: true } => fs::remove_dir_all(&path),
            WorkDir::Persistent {
                path,
                created: false,
            } => {
                if let Err(e) = remove_calculation_files(&path) {
                    tracing::warn!(error = %e, "failed to remove calculation files");
                }
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to clean up working directory");
        }
    }

    /// 保留目录（临时目录不再自动删除），返回其路径
    pub fn keep(self) -> PathBuf {
        match self {
            WorkDir::Temporary(dir) => dir.into_path(),
            WorkDir::Persistent { path, .. } => path,
        }
    }
}

/// 删除目录中计算会写入的文件
fn remove_calculation_files(dir: &Path) -> Result<()> {
    for name in CALCULATION_FILES {
        let file = dir.join(name);
        if file.exists() {
            tracing::debug!(path = %file.display(), "removing calculation file");
            fs::remove_file(&file).map_err(|e| FleurError::FileWriteError {
                path: file.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}
