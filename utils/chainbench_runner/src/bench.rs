//! Runs every case in a child process of its own, and classifies how the child ended.

use core::fmt::{self, Display};
use std::{
    env,
    path::PathBuf,
    process::{Command, ExitStatus, Stdio},
};

use chainbench::{adapter::Variant, harness::EXIT_MISSING_PAYLOAD, Error};
use serde::Serialize;

/// How a child run ended
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "code")]
pub enum BenchOutcome {
    /// Exited with 0
    Ok,
    /// Killed by a signal, `SIGABRT` for a violated safety property
    Crash(i32),
    /// The stdin channel found no payload
    MissingPayload,
    /// Exited with another status
    Failed(i32),
}

impl BenchOutcome {
    /// Classifies an exit status
    #[must_use]
    pub fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::prelude::ExitStatusExt;

            if let Some(signal) = status.signal() {
                return Self::Crash(signal);
            }
        }
        match status.code() {
            Some(0) => Self::Ok,
            Some(EXIT_MISSING_PAYLOAD) => Self::MissingPayload,
            Some(code) => Self::Failed(code),
            None => Self::Failed(-1),
        }
    }
}

impl Display for BenchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Crash(signal) => write!(f, "crash({signal})"),
            Self::MissingPayload => write!(f, "missing_payload"),
            Self::Failed(code) => write!(f, "failed({code})"),
        }
    }
}

/// The result of one child run
#[derive(Debug, Clone, Serialize)]
pub struct BenchResult {
    /// The case id
    pub case: String,
    /// The variant
    pub variant: Variant,
    /// How the child ended
    pub outcome: BenchOutcome,
}

/// Spawns `chainbench single` children, one at a time
#[derive(Debug)]
pub struct BenchExecutor {
    program: PathBuf,
    forwarded: Vec<String>,
    debug_child: bool,
}

impl BenchExecutor {
    /// Creates an executor re-running the current binary. `forwarded` is appended to every
    /// `single` invocation.
    pub fn new(forwarded: Vec<String>, debug_child: bool) -> Result<Self, Error> {
        Ok(Self {
            program: env::current_exe()?,
            forwarded,
            debug_child,
        })
    }

    /// Runs `variant` of `case` in a fresh child
    pub fn run(&self, case: &str, variant: Variant) -> Result<BenchResult, Error> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("single")
            .arg("--case")
            .arg(case)
            .arg("--variant")
            .arg(variant.to_string())
            .args(&self.forwarded)
            .stdin(Stdio::null());

        if !self.debug_child {
            cmd.stdout(Stdio::null());
            cmd.stderr(Stdio::null());
        }

        log::debug!("spawning {cmd:?}");
        let status = cmd
            .status()
            .map_err(|err| Error::os_error(err, format!("spawning {}", self.program.display())))?;
        let outcome = BenchOutcome::from_status(status);
        log::info!("{case} ({variant}): {outcome}");

        Ok(BenchResult {
            case: case.to_string(),
            variant,
            outcome,
        })
    }
}
