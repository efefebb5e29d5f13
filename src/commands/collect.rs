//! # collect 命令实现
//!
//! 扫描计算目录中的 out.xml，汇总最后一次迭代的结果到 CSV。
//!
//! ## 功能
//! - 按文件名模式递归查找（`--flat` 时只查顶层）
//! - 并行解析，未收敛或出错的计算记录为失败
//! - 每个计算一行：路径、化学式、原子数、迭代数、密度距离、能量、自由能、费米能级、晶胞磁矩
//!
//! ## 依赖关系
//! - 使用 `cli/collect.rs` 定义的参数
//! - 使用 `batch/`, `parsers/outxml.rs`
//! - 使用 `utils/output.rs`

use crate::batch::{BatchRunner, FileCollector};
use crate::cli::collect::CollectArgs;
use crate::error::{FleurError, Result};
use crate::parsers::outxml::{self, FleurOutput, OutxmlOptions};
use crate::utils::output;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

const CSV_HEADER: [&str; 9] = [
    "path",
    "formula",
    "atoms",
    "iterations",
    "distance",
    "energy_ev",
    "free_energy_ev",
    "fermi_level_ev",
    "magmom_mub",
];

#[derive(Debug, Clone, Tabled)]
struct FailureRow {
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// 执行 collect 命令
pub fn execute(args: CollectArgs) -> Result<()> {
    output::print_header("Collecting FLEUR Results");

    let files = FileCollector::new(&args.dir)
        .with_pattern(&args.pattern)?
        .recursive(!args.flat)
        .collect()?;

    if files.is_empty() {
        output::print_warning(&format!(
            "No files matching '{}' found in {}",
            args.pattern,
            args.dir.display()
        ));
        return Ok(());
    }
    output::print_info(&format!("Found {} output file(s)", files.len()));

    let options = OutxmlOptions {
        properties: BTreeSet::new(),
        distance_threshold: args.threshold,
    };
    let results = BatchRunner::new(args.jobs)
        .with_label("Parsing out.xml")
        .map(&files, |file| read_output(file, &options));

    let mut writer = csv::Writer::from_path(&args.output)?;
    writer.write_record(CSV_HEADER)?;

    let mut collected = 0;
    let mut failures = Vec::new();
    for (file, result) in results {
        let label = relative_label(&args.dir, &file);
        match result {
            Ok(out) => {
                writer.write_record(csv_row(&label, &out))?;
                collected += 1;
            }
            Err(e) => {
                tracing::debug!(file = %file.display(), error = %e, "skipping output");
                failures.push(FailureRow {
                    file: label,
                    reason: e.to_string(),
                });
            }
        }
    }
    writer.flush().map_err(|e| FleurError::FileWriteError {
        path: args.output.display().to_string(),
        source: e,
    })?;

    if !failures.is_empty() {
        output::print_warning(&format!("{} output(s) skipped", failures.len()));
        println!("\n{}\n", Table::new(&failures));
    }
    output::print_done(&format!(
        "Collected {} result(s) to {}",
        collected,
        args.output.display()
    ));

    Ok(())
}

fn read_output(file: &Path, options: &OutxmlOptions) -> Result<FleurOutput> {
    let bytes = fs::read(file).map_err(|e| FleurError::FileReadError {
        path: file.display().to_string(),
        source: e,
    })?;
    outxml::read_outxml(&bytes, options)
}

/// 相对于扫描根目录的路径
fn relative_label(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .map(PathBuf::from)
        .unwrap_or_else(|_| file.to_path_buf())
        .display()
        .to_string()
}

fn csv_row(label: &str, out: &FleurOutput) -> Vec<String> {
    let opt = |v: Option<f64>| v.map(|x| format!("{:.10}", x)).unwrap_or_default();
    vec![
        label.to_string(),
        out.structure.formula(),
        out.structure.len().to_string(),
        out.result.iterations.to_string(),
        out.result
            .density_distance
            .map(|d| format!("{:e}", d))
            .unwrap_or_default(),
        opt(out.result.energy()),
        opt(out.result.free_energy()),
        opt(out.result.fermi_level()),
        opt(out.result.cell_magnetic_moment()),
    ]
}
