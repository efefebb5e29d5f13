//! # FLEUR 计算执行
//!
//! 将结构写成 inpgen 输入，依次运行 inpgen 与 fleur，解析 out.xml 得到结果。
//!
//! ## 状态
//! ```text
//! Idle → InputWritten → Running → Succeeded
//!                          └────→ Failed
//! ```
//!
//! ## 流程
//! 1. 准备工作目录，写出 `fleur.in`
//! 2. `inpgen <inpgen_args> -f fleur.in` 生成 `inp.xml`，按需修改属性
//! 3. `fleur <fleur_args>`，未收敛时最多重复 `max_runs` 次
//! 4. 解析 `out.xml`；失败时删除工作目录（`keep_failed` 除外）
//!
//! 相同的 (结构, 参数, 物理量) 直接返回上一次成功的结果。
//!
//! ## 依赖关系
//! - 被 `commands/run.rs` 使用
//! - 使用 `parsers/`, `models/`
//! - 子模块: process, profile, workdir

pub mod process;
pub mod profile;
pub mod workdir;

pub use process::CancelToken;
pub use profile::{CalculationParameters, CalculationProfile, ProfileFile};

use crate::error::{FleurError, Result};
use crate::models::{CalculationResult, ProcessOutcome, Property, Structure};
use crate::parsers::inpgen::{self, InpgenOptions};
use crate::parsers::inpxml;
use crate::parsers::outxml::{self, OutxmlOptions};
use process::ProgramRun;
use workdir::WorkDir;

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// inpgen 输入文件名
pub const INPGEN_INPUT: &str = "fleur.in";
/// inpgen 生成的 FLEUR 输入
pub const INPUT_XML: &str = "inp.xml";
/// FLEUR 输出
pub const OUTPUT_XML: &str = "out.xml";
pub const INPGEN_LOG: &str = "inpgen.log";
pub const INPGEN_ERR: &str = "inpgen.err";
pub const FLEUR_LOG: &str = "fleur.log";
pub const FLEUR_ERR: &str = "fleur.err";

/// 计算器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculatorState {
    Idle,
    InputWritten,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for CalculatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CalculatorState::Idle => "idle",
            CalculatorState::InputWritten => "input written",
            CalculatorState::Running => "running",
            CalculatorState::Succeeded => "succeeded",
            CalculatorState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 缓存键
#[derive(Debug, Clone, PartialEq)]
struct CacheKey {
    structure: Structure,
    parameters: CalculationParameters,
    properties: BTreeSet<Property>,
}

/// FLEUR 计算器
pub struct Calculator {
    profile: CalculationProfile,
    parameters: CalculationParameters,
    directory: Option<PathBuf>,
    keep_failed: bool,
    cancel: CancelToken,
    state: CalculatorState,
    workdir: Option<WorkDir>,
    kept_directory: Option<PathBuf>,
    outcomes: Vec<ProcessOutcome>,
    cache: Option<(CacheKey, CalculationResult)>,
}

impl Calculator {
    pub fn new(profile: CalculationProfile) -> Self {
        Calculator {
            profile,
            parameters: CalculationParameters::default(),
            directory: None,
            keep_failed: false,
            cancel: CancelToken::new(),
            state: CalculatorState::Idle,
            workdir: None,
            kept_directory: None,
            outcomes: Vec::new(),
            cache: None,
        }
    }

    pub fn with_parameters(mut self, parameters: CalculationParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// 在指定目录中计算；默认使用临时目录
    pub fn in_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// 失败时保留工作目录
    pub fn keep_failed(mut self, keep: bool) -> Self {
        self.keep_failed = keep;
        self
    }

    /// 使用外部取消标记
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> CalculatorState {
        self.state
    }

    pub fn profile(&self) -> &CalculationProfile {
        &self.profile
    }

    pub fn parameters(&self) -> &CalculationParameters {
        &self.parameters
    }

    /// 上一次计算的工作目录（失败且已清理时为 `None`）
    pub fn directory(&self) -> Option<&Path> {
        match &self.workdir {
            Some(w) => Some(w.path()),
            None => self.kept_directory.as_deref(),
        }
    }

    /// 上一次计算中各子进程的运行记录
    pub fn outcomes(&self) -> &[ProcessOutcome] {
        &self.outcomes
    }

    /// 计算结构的物理量
    ///
    /// `timeout` 为整个计算（inpgen 与所有 fleur 运行）的时限。
    pub fn calculate(
        &mut self,
        structure: &Structure,
        properties: &BTreeSet<Property>,
        timeout: Option<Duration>,
    ) -> Result<CalculationResult> {
        let key = CacheKey {
            structure: structure.clone(),
            parameters: self.parameters.clone(),
            properties: properties.clone(),
        };
        if let Some((cached_key, result)) = &self.cache {
            if *cached_key == key {
                tracing::debug!("inputs unchanged, returning cached result");
                return Ok(result.clone());
            }
        }

        if self.cancel.is_cancelled() {
            return Err(FleurError::Cancelled);
        }
        if self.parameters.max_runs == 0 {
            return Err(FleurError::InvalidArgument(
                "max_runs must be at least 1".to_string(),
            ));
        }

        if let Some(previous) = self.workdir.take() {
            previous.cleanup();
        }
        self.kept_directory = None;
        self.outcomes.clear();
        self.cache = None;
        self.set_state(CalculatorState::Idle);

        let deadline = timeout.map(|t| (Instant::now() + t, t));
        let workdir = WorkDir::create(self.directory.as_deref())?;

        match self.execute(workdir.path(), structure, properties, deadline) {
            Ok(result) => {
                self.set_state(CalculatorState::Succeeded);
                self.workdir = Some(workdir);
                self.cache = Some((key, result.clone()));
                Ok(result)
            }
            Err(e) => {
                self.set_state(CalculatorState::Failed);
                if self.keep_failed {
                    let path = workdir.keep();
                    tracing::warn!(
                        directory = %path.display(),
                        "keeping failed calculation directory"
                    );
                    self.kept_directory = Some(path);
                } else {
                    workdir.cleanup();
                }
                Err(e)
            }
        }
    }

    fn set_state(&mut self, state: CalculatorState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "calculator state");
        }
        self.state = state;
    }

    fn execute(
        &mut self,
        dir: &Path,
        structure: &Structure,
        properties: &BTreeSet<Property>,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<CalculationResult> {
        let options = InpgenOptions {
            title: self.parameters.title.clone(),
            namelists: self.parameters.namelists.clone(),
        };
        inpgen::write_inpgen(&dir.join(INPGEN_INPUT), structure, &options)?;
        self.set_state(CalculatorState::InputWritten);

        self.set_state(CalculatorState::Running);
        let mut inpgen_args = self.profile.inpgen_args.clone();
        inpgen_args.extend(["-f".to_string(), INPGEN_INPUT.to_string()]);
        let outcome = process::run_program(&ProgramRun {
            program: &self.profile.inpgen,
            args: &inpgen_args,
            directory: dir,
            stdout: INPGEN_LOG,
            stderr: INPGEN_ERR,
            deadline,
            cancel: &self.cancel,
        })?;
        self.check_exit(outcome)?;

        let inp_path = dir.join(INPUT_XML);
        let changes = self.parameters.all_inpxml_changes();
        if !inp_path.exists() {
            return Err(FleurError::ResultParseError {
                source: Box::new(FleurError::FileNotFound {
                    path: inp_path.display().to_string(),
                }),
            });
        }
        if !changes.is_empty() {
            let bytes = read_bytes(&inp_path)?;
            let modified = inpxml::set_inpxml_attributes(&bytes, &changes)?;
            fs::write(&inp_path, modified).map_err(|e| FleurError::FileWriteError {
                path: inp_path.display().to_string(),
                source: e,
            })?;
        }

        let out_options = OutxmlOptions {
            properties: properties.clone(),
            distance_threshold: self.parameters.distance_threshold,
        };
        let out_path = dir.join(OUTPUT_XML);
        let max_runs = self.parameters.max_runs;

        for run in 1..=max_runs {
            let outcome = process::run_program(&ProgramRun {
                program: &self.profile.fleur,
                args: &self.profile.fleur_args,
                directory: dir,
                stdout: FLEUR_LOG,
                stderr: FLEUR_ERR,
                deadline,
                cancel: &self.cancel,
            })?;
            self.check_exit(outcome)?;

            let bytes = read_bytes(&out_path).map_err(|e| FleurError::ResultParseError {
                source: Box::new(e),
            })?;

            if run < max_runs {
                let status = outxml::scf_status(&bytes).map_err(|e| {
                    FleurError::ResultParseError {
                        source: Box::new(e),
                    }
                })?;
                if status.needs_more_iterations(self.parameters.distance_threshold) {
                    tracing::info!(
                        run,
                        max_runs,
                        iterations = status.iterations,
                        distance = ?status.distance,
                        "SCF not converged, running fleur again"
                    );
                    continue;
                }
            }

            return outxml::read_outxml(&bytes, &out_options)
                .map(|output| output.result)
                .map_err(|e| FleurError::ResultParseError {
                    source: Box::new(e),
                });
        }

        Err(FleurError::InvalidArgument(
            "max_runs must be at least 1".to_string(),
        ))
    }

    fn check_exit(&mut self, outcome: ProcessOutcome) -> Result<()> {
        let result = if outcome.success() {
            Ok(())
        } else {
            Err(FleurError::ProcessExitError {
                program: outcome.program.clone(),
                code: outcome.exit_code,
                stderr_tail: outcome.stderr_tail.clone(),
            })
        };
        self.outcomes.push(outcome);
        result
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(FleurError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    fs::read(path).map_err(|e| FleurError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })
}

/// 用给定配置对结构做一次计算
pub fn calculate(
    structure: &Structure,
    profile: &CalculationProfile,
    properties: &BTreeSet<Property>,
    timeout: Option<Duration>,
) -> Result<CalculationResult> {
    Calculator::new(profile.clone()).calculate(structure, properties, timeout)
}
