//! External process execution.
//!
//! Provisioners never spawn processes directly; they hand an [`Invocation`]
//! to a [`CommandRunner`]. [`SystemRunner`] does the real work, [`DryRunRunner`]
//! records what would have run.

use crate::{ProvisionError, Result, log_debug};
use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

/// One external command: program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Value following `flag`, e.g. `value_of("--size")`.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|idx| self.args.get(idx + 1))
            .map(String::as_str)
    }

    /// First argument, which is the subcommand for `VBoxManage`.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program.to_string_lossy()))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(value: &str) -> String {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '"') {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandRunner {
    /// Fail with [`ProvisionError::ExecutableNotFound`] if `program` cannot be run.
    fn ensure_available(&self, program: &Path) -> Result<()>;

    /// Run to completion. A non-zero exit is an error.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;

    /// False when commands are only recorded; provisioners then skip filesystem setup.
    fn executes(&self) -> bool {
        true
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn ensure_available(&self, program: &Path) -> Result<()> {
        (**self).ensure_available(program)
    }

    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        (**self).run(invocation)
    }

    fn executes(&self) -> bool {
        (**self).executes()
    }
}

/// Runs commands with `std::process::Command`, blocking until they exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn ensure_available(&self, program: &Path) -> Result<()> {
        if locate_executable(program).is_some() {
            Ok(())
        } else {
            Err(ProvisionError::ExecutableNotFound(program.to_path_buf()))
        }
    }

    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        log_debug!("Running: {}", invocation);

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .output()
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => {
                    ProvisionError::ExecutableNotFound(invocation.program.clone())
                }
                _ => ProvisionError::Unexpected(format!(
                    "Failed to start {}: {}",
                    invocation.program.display(),
                    err
                )),
            })?;

        let result = CommandOutput {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.stdout.trim().is_empty() {
            log_debug!("{} stdout: {}", invocation.program.display(), result.stdout.trim());
        }

        if !output.status.success() {
            log_debug!(
                "Command failed ({}): {}",
                invocation,
                result.stderr.trim()
            );
            return Err(ProvisionError::ProcessFailure {
                command: invocation.to_string(),
                code: result.status_code,
                stderr: result.stderr,
            });
        }

        Ok(result)
    }
}

/// Resolve `program` to an existing file. Paths with a directory component are
/// checked as-is; bare names are looked up on `PATH`.
pub fn locate_executable(program: &Path) -> Option<PathBuf> {
    let has_dir = program.is_absolute() || program.components().count() > 1;
    if has_dir {
        return program.is_file().then(|| program.to_path_buf());
    }

    let search_path = std::env::var_os("PATH")?;
    std::env::split_paths(&search_path).find_map(|dir| {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) && program.extension().is_none() {
            let with_ext = candidate.with_extension("exe");
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }
        None
    })
}

/// Records invocations instead of running them. Used by `--dry-run`.
#[derive(Debug, Default)]
pub struct DryRunRunner {
    recorded: RefCell<Vec<Invocation>>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.recorded.borrow().clone()
    }
}

impl CommandRunner for DryRunRunner {
    fn ensure_available(&self, _program: &Path) -> Result<()> {
        Ok(())
    }

    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        log_debug!("Dry run: {}", invocation);
        self.recorded.borrow_mut().push(invocation.clone());
        Ok(CommandOutput {
            status_code: Some(0),
            ..CommandOutput::default()
        })
    }

    fn executes(&self) -> bool {
        false
    }
}
