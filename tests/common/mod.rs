// Shared fakes for the provisioning integration tests
#![allow(dead_code)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use vboxprov::config::{StorageControllerConfig, ToolsConfig};
use vboxprov::{CommandOutput, CommandRunner, Invocation, ProvisionError, Result};

/// What the fake saw when handed a diskpart script.
#[derive(Debug, Clone)]
pub struct ObservedScript {
    pub path: PathBuf,
    pub existed: bool,
    pub contents: String,
}

/// Records every invocation and fails on request.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    calls: RefCell<Vec<Invocation>>,
    scripts: RefCell<Vec<ObservedScript>>,
    fail_on: Option<(String, i32)>,
    missing_executable: bool,
}

impl ScriptedRunner {
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// Fail the call whose first argument is `first_arg` (a VBoxManage
    /// subcommand, or `/s` for diskpart).
    pub fn failing_on(first_arg: &str, code: i32) -> Self {
        Self {
            fail_on: Some((first_arg.to_string(), code)),
            ..Self::default()
        }
    }

    pub fn missing_executable() -> Self {
        Self {
            missing_executable: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    pub fn subcommands(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| call.subcommand().map(str::to_string))
            .collect()
    }

    pub fn scripts(&self) -> Vec<ObservedScript> {
        self.scripts.borrow().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn ensure_available(&self, program: &Path) -> Result<()> {
        if self.missing_executable {
            Err(ProvisionError::ExecutableNotFound(program.to_path_buf()))
        } else {
            Ok(())
        }
    }

    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(invocation.clone());

        if let Some(script) = invocation.value_of("/s") {
            let path = PathBuf::from(script);
            let contents = std::fs::read_to_string(&path).unwrap_or_default();
            self.scripts.borrow_mut().push(ObservedScript {
                existed: path.exists(),
                path,
                contents,
            });
        }

        if let Some((first_arg, code)) = &self.fail_on {
            if invocation.subcommand() == Some(first_arg.as_str()) {
                return Err(ProvisionError::ProcessFailure {
                    command: invocation.to_string(),
                    code: Some(*code),
                    stderr: String::new(),
                });
            }
        }

        Ok(CommandOutput {
            status_code: Some(0),
            ..CommandOutput::default()
        })
    }
}

pub fn tools_with_script_dir(dir: &Path) -> ToolsConfig {
    ToolsConfig {
        vboxmanage: PathBuf::from("VBoxManage"),
        diskpart: PathBuf::from("diskpart"),
        script_dir: Some(dir.to_path_buf()),
    }
}

pub fn sata_controller() -> StorageControllerConfig {
    StorageControllerConfig::default()
}
