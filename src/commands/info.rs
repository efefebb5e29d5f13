//! # info 命令实现
//!
//! 显示文件中的结构摘要；out.xml 额外显示最后一次迭代的结果。
//!
//! ## 依赖关系
//! - 使用 `cli/info.rs` 定义的参数
//! - 使用 `parsers/`, `models/`
//! - 使用 `utils/output.rs`

use crate::cli::info::InfoArgs;
use crate::error::{FleurError, Result};
use crate::models::{CalculationResult, Structure};
use crate::parsers::{self, outxml, FormatDialect};
use crate::utils::output;

use std::collections::BTreeSet;
use std::fs;
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Tabled)]
struct AtomRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Element")]
    element: String,
    #[tabled(rename = "x (bohr)")]
    x: String,
    #[tabled(rename = "y (bohr)")]
    y: String,
    #[tabled(rename = "z (bohr)")]
    z: String,
    #[tabled(rename = "Relax")]
    relax: String,
}

#[derive(Debug, Clone, Tabled)]
struct AtomResultRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Element")]
    element: String,
    #[tabled(rename = "Fx (eV/bohr)")]
    fx: String,
    #[tabled(rename = "Fy (eV/bohr)")]
    fy: String,
    #[tabled(rename = "Fz (eV/bohr)")]
    fz: String,
    #[tabled(rename = "Moment (μB)")]
    moment: String,
    #[tabled(rename = "Charge (e)")]
    charge: String,
}

/// 执行 info 命令
pub fn execute(args: InfoArgs) -> Result<()> {
    if !args.file.exists() {
        return Err(FleurError::FileNotFound {
            path: args.file.display().to_string(),
        });
    }
    let bytes = fs::read(&args.file).map_err(|e| FleurError::FileReadError {
        path: args.file.display().to_string(),
        source: e,
    })?;
    let dialect = parsers::detect(&bytes)?;
    let structure = parsers::read(&bytes, dialect)?;

    output::print_header(&format!("{} ({})", args.file.display(), dialect.description()));
    print_structure(&structure, args.atoms);

    if dialect == FormatDialect::OutputXml {
        let options = outxml::OutxmlOptions {
            properties: BTreeSet::new(),
            distance_threshold: args.threshold,
        };
        match outxml::read_outxml(&bytes, &options) {
            Ok(out) => {
                if let Some(version) = &out.version {
                    output::print_field("FLEUR", version);
                }
                if !out.kpoints.is_empty() {
                    output::print_field("k-points", &out.kpoints.len().to_string());
                }
                if !out.eigenvalues.is_empty() {
                    let bands = out
                        .eigenvalues
                        .iter()
                        .map(|e| e.eigenvalues.len())
                        .max()
                        .unwrap_or(0);
                    output::print_field(
                        "Eigenvalues",
                        &format!("{} sets, up to {} bands", out.eigenvalues.len(), bands),
                    );
                }
                print_result(&structure, &out.result);
            }
            Err(e) => {
                if let Ok(status) = outxml::scf_status(&bytes) {
                    output::print_field("Iterations", &status.iterations.to_string());
                    if let Some(d) = status.distance {
                        output::print_field("Distance", &format!("{:.3e} me/bohr³", d));
                    }
                }
                output::print_warning(&format!("No usable result: {}", e));
            }
        }
    }

    Ok(())
}

fn print_structure(structure: &Structure, list_atoms: bool) {
    let periodicity = if structure.is_film() { "film" } else { "bulk" };
    output::print_field("Formula", &structure.formula());
    output::print_field("Atoms", &structure.len().to_string());
    output::print_field("Periodicity", periodicity);
    if let Some(volume) = structure.volume() {
        output::print_field("Volume", &format!("{:.4} bohr³", volume));
    }
    if let Some(lattice) = &structure.lattice {
        let (a, b, c, alpha, beta, gamma) = lattice.parameters();
        output::print_field("a, b, c", &format!("{:.6} {:.6} {:.6} bohr", a, b, c));
        output::print_field(
            "α, β, γ",
            &format!("{:.3} {:.3} {:.3} °", alpha, beta, gamma),
        );
    }

    if list_atoms {
        let rows: Vec<AtomRow> = structure
            .atoms
            .iter()
            .enumerate()
            .map(|(i, atom)| AtomRow {
                index: i + 1,
                element: atom.element.clone(),
                x: format!("{:.6}", atom.position[0]),
                y: format!("{:.6}", atom.position[1]),
                z: format!("{:.6}", atom.position[2]),
                relax: atom
                    .relax
                    .map(|r| r.iter().map(|&b| if b { 'T' } else { 'F' }).collect())
                    .unwrap_or_else(|| "-".to_string()),
            })
            .collect();
        println!("\n{}", Table::new(&rows));
    }
}

fn print_result(structure: &Structure, result: &CalculationResult) {
    output::print_field("Iterations", &result.iterations.to_string());
    if let Some(d) = result.density_distance {
        output::print_field("Distance", &format!("{:.3e} me/bohr³", d));
    }
    if let Some(e) = result.energy() {
        output::print_field("Total energy", &format!("{:.8} eV", e));
    }
    if let Some(e) = result.free_energy() {
        output::print_field("Free energy", &format!("{:.8} eV", e));
    }
    if let Some(ef) = result.fermi_level() {
        output::print_field("Fermi level", &format!("{:.6} eV", ef));
    }
    if let Some(m) = result.cell_magnetic_moment() {
        output::print_field("Cell moment", &format!("{:.4} μB", m));
    }

    let forces = result.forces();
    let moments = result.magnetic_moments();
    let charges = result.charges();
    if forces.is_none() && moments.is_none() && charges.is_none() {
        return;
    }

    let rows: Vec<AtomResultRow> = structure
        .atoms
        .iter()
        .enumerate()
        .map(|(i, atom)| {
            let f = forces.and_then(|f| f.get(i));
            let component = |k: usize| {
                f.map(|v| format!("{:.6}", v[k]))
                    .unwrap_or_else(|| "-".to_string())
            };
            AtomResultRow {
                index: i + 1,
                element: atom.element.clone(),
                fx: component(0),
                fy: component(1),
                fz: component(2),
                moment: moments
                    .and_then(|m| m.get(i))
                    .map(|m| format!("{:.4}", m))
                    .unwrap_or_else(|| "-".to_string()),
                charge: charges
                    .and_then(|c| c.get(i))
                    .map(|c| format!("{:.4}", c))
                    .unwrap_or_else(|| "-".to_string()),
            }
        })
        .collect();
    println!("\n{}", Table::new(&rows));
}
