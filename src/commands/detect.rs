//! # detect 命令实现
//!
//! 逐个识别文件格式，以表格输出。无法识别的文件不会中断其余文件。
//!
//! ## 依赖关系
//! - 使用 `cli/detect.rs` 定义的参数
//! - 使用 `parsers/detect.rs`
//! - 使用 `utils/output.rs`

use crate::cli::detect::DetectArgs;
use crate::error::Result;
use crate::parsers;
use crate::utils::output;

use tabled::{Table, Tabled};

#[derive(Debug, Clone, Tabled)]
struct DetectRow {
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Format")]
    format: String,
    #[tabled(rename = "Details")]
    details: String,
}

/// 执行 detect 命令
pub fn execute(args: DetectArgs) -> Result<()> {
    let mut failed = 0;
    let rows: Vec<DetectRow> = args
        .files
        .iter()
        .map(|path| {
            let file = path.display().to_string();
            match parsers::detect_file(path) {
                Ok(dialect) => DetectRow {
                    file,
                    format: dialect.to_string(),
                    details: dialect.description().to_string(),
                },
                Err(e) => {
                    failed += 1;
                    DetectRow {
                        file,
                        format: "-".to_string(),
                        details: e.to_string(),
                    }
                }
            }
        })
        .collect();

    println!("{}", Table::new(&rows));

    if failed > 0 {
        output::print_warning(&format!(
            "{} of {} file(s) could not be identified",
            failed,
            rows.len()
        ));
    }
    Ok(())
}
