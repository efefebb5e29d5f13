//! # run 命令实现
//!
//! 读取结构文件，用 inpgen + fleur 计算请求的物理量。
//!
//! ## 配置优先级
//! 命令行参数 > 环境变量 (`FLEUR_INPGEN`, `FLEUR_EXECUTABLE`) > `--profile` 文件 > 默认值
//!
//! ## 依赖关系
//! - 使用 `cli/run.rs` 定义的参数
//! - 使用 `calculator/`, `parsers/`
//! - 使用 `utils/output.rs`, `utils/progress.rs`

use crate::calculator::{Calculator, ProfileFile};
use crate::cli::run::RunArgs;
use crate::error::{FleurError, Result};
use crate::models::{CalculationResult, Property, PropertyValue, Structure};
use crate::parsers;
use crate::utils::{output, progress};

use std::collections::BTreeSet;
use std::time::Duration;
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Tabled)]
struct ResultRow {
    #[tabled(rename = "Property")]
    property: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Unit")]
    unit: &'static str,
}

/// 执行 run 命令
pub fn execute(args: RunArgs) -> Result<()> {
    let (dialect, structure) = parsers::read_file(&args.structure)?;
    tracing::info!(
        file = %args.structure.display(),
        format = %dialect,
        atoms = structure.len(),
        "structure loaded"
    );

    let config = load_profile(&args)?;

    if args.show_version {
        let version = config.profile.version()?;
        output::print_field("FLEUR", &version);
    }

    let properties: BTreeSet<Property> = args.properties.iter().copied().collect();
    let timeout = args.timeout.map(parse_timeout).transpose()?;

    output::print_header(&format!("FLEUR calculation: {}", structure.formula()));
    output::print_field("inpgen", &config.profile.inpgen.display().to_string());
    output::print_field("fleur", &config.profile.fleur.display().to_string());
    output::print_field(
        "Properties",
        &properties
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(", "),
    );

    let mut calculator = Calculator::new(config.profile)
        .with_parameters(config.parameters)
        .keep_failed(args.keep_failed);
    if let Some(dir) = &args.directory {
        calculator = calculator.in_directory(dir);
    }

    let spinner = progress::create_spinner("Running inpgen and fleur...");
    let result = calculator.calculate(&structure, &properties, timeout);
    spinner.finish_and_clear();

    for outcome in calculator.outcomes() {
        tracing::debug!(
            program = %outcome.program,
            seconds = outcome.duration.as_secs_f64(),
            "process summary"
        );
    }

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            if let Some(dir) = calculator.directory() {
                output::print_info(&format!("Failed calculation kept in {}", dir.display()));
            }
            return Err(e);
        }
    };

    print_result(&structure, &result);
    if let Some(dir) = &args.directory {
        output::print_info(&format!("Calculation files in {}", dir.display()));
    }
    output::print_done(&format!(
        "Finished after {} SCF iterations ({} fleur run(s))",
        result.iterations,
        calculator.outcomes().len().saturating_sub(1)
    ));

    Ok(())
}

/// 读取配置文件并应用命令行覆盖
fn load_profile(args: &RunArgs) -> Result<ProfileFile> {
    let mut config = match &args.profile {
        Some(path) => ProfileFile::from_toml_file(path)?,
        None => ProfileFile::default(),
    };

    if let Some(inpgen) = &args.inpgen {
        config.profile.inpgen = inpgen.clone();
    }
    if let Some(fleur) = &args.fleur {
        config.profile.fleur = fleur.clone();
    }
    if let Some(max_runs) = args.max_runs {
        if max_runs == 0 {
            return Err(FleurError::InvalidArgument(
                "--max-runs must be at least 1".to_string(),
            ));
        }
        config.parameters.max_runs = max_runs;
    }
    if let Some(itmax) = args.itmax {
        config.parameters.iterations_per_run = Some(itmax);
    }
    Ok(config)
}

fn parse_timeout(seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds).map_err(|_| {
        FleurError::InvalidArgument(format!("invalid timeout '{}'", seconds))
    })
}

fn print_result(structure: &Structure, result: &CalculationResult) {
    let mut rows = Vec::new();
    for (property, value) in result.properties() {
        match value {
            PropertyValue::Scalar(v) => rows.push(ResultRow {
                property: property.name().to_string(),
                value: format!("{:.8}", v),
                unit: unit_of(*property),
            }),
            PropertyValue::PerAtom(values) => {
                for (i, v) in values.iter().enumerate() {
                    rows.push(ResultRow {
                        property: atom_label(property, structure, i),
                        value: format!("{:.4}", v),
                        unit: unit_of(*property),
                    });
                }
            }
            PropertyValue::Vectors(vectors) => {
                for (i, v) in vectors.iter().enumerate() {
                    rows.push(ResultRow {
                        property: atom_label(property, structure, i),
                        value: format!("{:>12.6} {:>12.6} {:>12.6}", v[0], v[1], v[2]),
                        unit: unit_of(*property),
                    });
                }
            }
        }
    }
    println!("\n{}\n", Table::new(&rows));
}

fn atom_label(property: &Property, structure: &Structure, index: usize) -> String {
    let element = structure
        .atoms
        .get(index)
        .map(|a| a.element.as_str())
        .unwrap_or("?");
    format!("{}[{} {}]", property.name(), index + 1, element)
}

fn unit_of(property: Property) -> &'static str {
    match property {
        Property::Energy | Property::FreeEnergy | Property::FermiLevel => "eV",
        Property::Forces => "eV/bohr",
        Property::MagneticMoments | Property::CellMagneticMoment => "μB",
        Property::Charges => "e",
    }
}
