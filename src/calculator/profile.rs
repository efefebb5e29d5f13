//! # 执行配置
//!
//! `CalculationProfile` 描述 inpgen / fleur 可执行文件及其参数，
//! `CalculationParameters` 描述一次计算的输入设置。两者都可以从 TOML 文件读取：
//!
//! ```toml
//! inpgen = "/opt/fleur/bin/inpgen"
//! fleur = "/opt/fleur/bin/fleur"
//! fleur_args = ["-minimalOutput"]
//!
//! [parameters]
//! title = "Si bulk (inpgen)"
//! namelists = ["&kpt div1=4 div2=4 div3=4 /"]
//! iterations_per_run = 30
//! max_runs = 3
//!
//! [[parameters.inpxml_changes]]
//! tag = "scfLoop"
//! name = "alpha"
//! value = "0.02"
//! ```

use super::process;
use crate::error::{FleurError, Result};
use crate::parsers::inpxml::AttributeChange;
use crate::parsers::outxml::DEFAULT_DISTANCE_THRESHOLD;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// 可执行文件配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculationProfile {
    /// inpgen 可执行文件
    pub inpgen: PathBuf,
    /// fleur 可执行文件（或 MPI 启动器）
    pub fleur: PathBuf,
    /// 放在 `-f fleur.in` 之前的 inpgen 参数
    pub inpgen_args: Vec<String>,
    pub fleur_args: Vec<String>,
}

impl Default for CalculationProfile {
    fn default() -> Self {
        CalculationProfile {
            inpgen: PathBuf::from("inpgen"),
            fleur: PathBuf::from("fleur"),
            inpgen_args: Vec::new(),
            fleur_args: Vec::new(),
        }
    }
}

impl CalculationProfile {
    pub fn new(inpgen: impl Into<PathBuf>, fleur: impl Into<PathBuf>) -> Self {
        CalculationProfile {
            inpgen: inpgen.into(),
            fleur: fleur.into(),
            ..Default::default()
        }
    }

    /// 读取 TOML 配置文件中的执行配置
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        Ok(ProfileFile::from_toml_file(path)?.profile)
    }

    /// 运行 `fleur -info` 获取版本信息
    ///
    /// 返回 `(www.max-centre.eu)` 之前的部分，如 `MaX-Release 6.0`。
    pub fn version(&self) -> Result<String> {
        let program = self.fleur.display().to_string();
        let dir = tempfile::tempdir().map_err(|e| FleurError::FileWriteError {
            path: std::env::temp_dir().display().to_string(),
            source: e,
        })?;
        let err_path = dir.path().join("err");
        let err_file = File::create(&err_path).map_err(|e| FleurError::FileWriteError {
            path: err_path.display().to_string(),
            source: e,
        })?;

        let output = Command::new(&self.fleur)
            .args(&self.fleur_args)
            .arg("-info")
            .current_dir(dir.path())
            .stdin(Stdio::null())
            .stderr(Stdio::from(err_file))
            .output()
            .map_err(|e| FleurError::ProcessSpawnError {
                program: program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(FleurError::ProcessExitError {
                program,
                code: output.status.code(),
                stderr_tail: process::stderr_tail(&err_path, process::STDERR_TAIL_LINES),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_version(&stdout).ok_or_else(|| FleurError::InvalidValue {
            path: format!("{} -info", program),
            value: stdout.lines().next().unwrap_or("").to_string(),
        })
    }
}

/// 从 `fleur -info` 的输出中提取版本
pub fn parse_version(output: &str) -> Option<String> {
    let re = Regex::new(r"(?m)^(.*)\(www\.max-centre\.eu\)").ok()?;
    re.captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// 计算输入设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculationParameters {
    /// inpgen 文件标题
    pub title: Option<String>,
    /// 追加到 inpgen 文件的 namelist
    pub namelists: Vec<String>,
    /// inpgen 之后对 inp.xml 的修改
    pub inpxml_changes: Vec<AttributeChange>,
    /// 每次运行的最大 SCF 迭代数 (`scfLoop@itmax`)
    pub iterations_per_run: Option<u32>,
    /// 未收敛时最多运行 fleur 的次数
    pub max_runs: usize,
    /// 收敛阈值 (me/bohr³)
    pub distance_threshold: f64,
}

impl Default for CalculationParameters {
    fn default() -> Self {
        CalculationParameters {
            title: None,
            namelists: Vec::new(),
            inpxml_changes: Vec::new(),
            iterations_per_run: None,
            max_runs: 1,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }
}

impl CalculationParameters {
    /// 需要写入 inp.xml 的全部修改
    pub fn all_inpxml_changes(&self) -> Vec<AttributeChange> {
        let mut changes = Vec::with_capacity(self.inpxml_changes.len() + 1);
        if let Some(itmax) = self.iterations_per_run {
            changes.push(AttributeChange::new("scfLoop", "itmax", itmax.to_string()));
        }
        changes.extend(self.inpxml_changes.iter().cloned());
        changes
    }
}

/// TOML 配置文件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileFile {
    #[serde(flatten)]
    pub profile: CalculationProfile,
    #[serde(default)]
    pub parameters: CalculationParameters,
}

impl ProfileFile {
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| FleurError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&text).map_err(|e| match e {
            FleurError::ProfileError { reason, .. } => FleurError::ProfileError {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ProfileFile = toml::from_str(text).map_err(|e| FleurError::ProfileError {
            path: "<string>".to_string(),
            reason: e.to_string(),
        })?;
        if file.parameters.max_runs == 0 {
            return Err(FleurError::ProfileError {
                path: "<string>".to_string(),
                reason: "parameters.max_runs must be at least 1".to_string(),
            });
        }
        Ok(file)
    }
}
