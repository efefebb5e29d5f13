//! # convert 命令实现
//!
//! 批量将 FLEUR 文件转换为 inpgen 输入。
//!
//! ## 功能
//! - 按内容识别输入格式（inpgen / inp.xml / out.xml）
//! - 写出 `.in` 文件，输出名由相对路径推出，避免同名 out.xml 冲突
//! - 支持并行处理
//!
//! ## 依赖关系
//! - 使用 `cli/convert.rs` 定义的参数
//! - 使用 `parsers/`, `batch/`
//! - 使用 `utils/output.rs`

use crate::batch::{BatchRunner, FileCollector, ProcessResult};
use crate::cli::convert::ConvertArgs;
use crate::error::{FleurError, Result};
use crate::parsers::{self, inpgen};
use crate::utils::output;

use std::fs;
use std::path::{Path, PathBuf};

/// 执行 convert 命令
pub fn execute(args: ConvertArgs) -> Result<()> {
    output::print_header("Converting to inpgen input");

    if !args.input.exists() {
        return Err(FleurError::DirectoryNotFound {
            path: args.input.display().to_string(),
        });
    }

    fs::create_dir_all(&args.output).map_err(|e| FleurError::FileWriteError {
        path: args.output.display().to_string(),
        source: e,
    })?;

    let files = FileCollector::new(&args.input)
        .with_pattern(&args.pattern)?
        .recursive(args.recursive)
        .collect()?;

    if files.is_empty() {
        output::print_warning(&format!(
            "No files matched '{}' under {}",
            args.pattern,
            args.input.display()
        ));
        return Ok(());
    }

    output::print_info(&format!("Found {} files to convert", files.len()));

    let options = inpgen::InpgenOptions {
        title: args.title.clone(),
        namelists: Vec::new(),
    };

    let result = BatchRunner::new(args.jobs)
        .with_label("Converting")
        .run(&files, |input_path| {
            let output_path = args.output.join(output_name(&args.input, input_path));
            if output_path.exists() && !args.overwrite {
                return ProcessResult::Skipped(input_path.display().to_string());
            }
            match convert_file(input_path, &output_path, &options) {
                Ok(()) => ProcessResult::Success(output_path.display().to_string()),
                Err(e) => ProcessResult::Failed(input_path.display().to_string(), e.to_string()),
            }
        });

    for (path, err) in &result.failures {
        output::print_error(&format!("{}: {}", path, err));
    }

    output::print_done(&format!(
        "Converted {} file(s) into '{}' ({} skipped, {} failed)",
        result.success,
        args.output.display(),
        result.skipped,
        result.failed
    ));

    Ok(())
}

/// 读取任一 FLEUR 格式并写出 inpgen 输入
fn convert_file(input: &Path, output: &Path, options: &inpgen::InpgenOptions) -> Result<()> {
    let (dialect, structure) = parsers::read_file(input)?;
    tracing::debug!(file = %input.display(), %dialect, atoms = structure.len(), "converting");
    inpgen::write_inpgen(output, &structure, options)
}

/// 由输入相对路径生成输出文件名，如 `calc1/out.xml` → `calc1_out.in`
fn output_name(root: &Path, file: &Path) -> PathBuf {
    let relative = if root.is_file() {
        file.file_name().map(PathBuf::from).unwrap_or_default()
    } else {
        file.strip_prefix(root).unwrap_or(file).to_path_buf()
    };
    let relative = relative.with_extension("");
    let name = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("_");
    let name = if name.is_empty() { "structure".to_string() } else { name };
    PathBuf::from(format!("{}.in", name))
}
