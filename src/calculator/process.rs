//! # 外部程序执行
//!
//! 在指定目录中运行 inpgen / fleur，stdout、stderr 重定向到文件。
//! 子进程放在独立的进程组中，超时或取消时整组强制结束，
//! 不会留下 MPI 启动器派生的孤儿进程。
//!
//! ## 依赖关系
//! - 被 `calculator/mod.rs` 使用
//! - 使用 `libc`（Unix 下结束进程组）

use crate::error::{FleurError, Result};
use crate::models::ProcessOutcome;

use std::fs::{self, File};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// 子进程状态轮询间隔
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 错误信息中保留的 stderr 末尾行数
pub const STDERR_TAIL_LINES: usize = 20;

/// 取消标记，可在其它线程中触发
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// 清除取消状态，以便再次计算
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 单次程序调用
pub struct ProgramRun<'a> {
    pub program: &'a Path,
    pub args: &'a [String],
    pub directory: &'a Path,
    /// stdout 文件名（相对于工作目录）
    pub stdout: &'a str,
    /// stderr 文件名（相对于工作目录）
    pub stderr: &'a str,
    /// 整个计算的截止时刻及对应的超时时长
    pub deadline: Option<(Instant, Duration)>,
    pub cancel: &'a CancelToken,
}

/// 运行程序直到结束、超时或被取消
///
/// 正常结束（无论退出码）时返回 `ProcessOutcome`，由调用方判断退出码。
pub fn run_program(run: &ProgramRun<'_>) -> Result<ProcessOutcome> {
    let program = run.program.display().to_string();

    if run.cancel.is_cancelled() {
        return Err(FleurError::Cancelled);
    }
    if let Some((deadline, timeout)) = run.deadline {
        if Instant::now() >= deadline {
            return Err(FleurError::TimeoutExceeded(timeout));
        }
    }

    let stdout_path = run.directory.join(run.stdout);
    let stderr_path = run.directory.join(run.stderr);
    let stdout = create_log(&stdout_path)?;
    let stderr = create_log(&stderr_path)?;

    let mut command = Command::new(run.program);
    command
        .args(run.args)
        .current_dir(run.directory)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    tracing::info!(
        program = %program,
        args = ?run.args,
        directory = %run.directory.display(),
        "starting process"
    );

    let start = Instant::now();
    let mut child = command
        .spawn()
        .map_err(|e| FleurError::ProcessSpawnError {
            program: program.clone(),
            source: e,
        })?;

    let status = wait_for(&mut child, run, &program)?;
    let duration = start.elapsed();

    let outcome = ProcessOutcome {
        program,
        exit_code: status.code(),
        duration,
        directory: run.directory.to_path_buf(),
        stderr_tail: stderr_tail(&stderr_path, STDERR_TAIL_LINES),
    };
    tracing::info!(
        program = %outcome.program,
        exit_code = ?outcome.exit_code,
        seconds = duration.as_secs_f64(),
        "process finished"
    );
    Ok(outcome)
}

fn create_log(path: &Path) -> Result<File> {
    File::create(path).map_err(|e| FleurError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })
}

fn wait_for(child: &mut Child, run: &ProgramRun<'_>, program: &str) -> Result<ExitStatus> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(e) => {
                kill_group(child);
                return Err(FleurError::ProcessSpawnError {
                    program: program.to_string(),
                    source: e,
                });
            }
        }

        if run.cancel.is_cancelled() {
            tracing::warn!(program, "cancellation requested, killing process group");
            kill_group(child);
            return Err(FleurError::Cancelled);
        }

        let mut sleep = POLL_INTERVAL;
        if let Some((deadline, timeout)) = run.deadline {
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    program,
                    timeout_secs = timeout.as_secs_f64(),
                    "timeout exceeded, killing process group"
                );
                kill_group(child);
                return Err(FleurError::TimeoutExceeded(timeout));
            }
            sleep = sleep.min(deadline - now);
        }
        thread::sleep(sleep);
    }
}

/// 强制结束子进程所在的整个进程组并回收子进程
fn kill_group(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = i32::try_from(child.id()) {
            // SAFETY: kill(2) 只接收整数参数；负 pid 表示进程组
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// 读取文件末尾 `lines` 行，文件不存在时返回空字符串
pub fn stderr_tail(path: &Path, lines: usize) -> String {
    let Ok(bytes) = fs::read(path) else {
        return String::new();
    };
    let text = String::from_utf8_lossy(&bytes);
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
