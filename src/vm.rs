use crate::{
    ProvisionError, Result,
    config::{StorageControllerConfig, ToolsConfig},
    log_debug, log_info, log_warn,
    runner::{CommandRunner, Invocation},
};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Guest OS choices offered by the form, with the hypervisor's identifier for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OsType {
    Linux,
    MacOsX,
    Windows10,
    Windows7,
}

impl OsType {
    pub const ALL: [OsType; 4] = [
        OsType::Linux,
        OsType::MacOsX,
        OsType::Windows10,
        OsType::Windows7,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            OsType::Linux => "Linux",
            OsType::MacOsX => "Mac OS X",
            OsType::Windows10 => "Windows 10",
            OsType::Windows7 => "Windows 7",
        }
    }

    /// `--ostype` identifier understood by `VBoxManage createvm`.
    pub fn vbox_id(&self) -> &'static str {
        match self {
            OsType::Linux => "Linux_64",
            OsType::MacOsX => "MacOS_64",
            OsType::Windows10 => "Windows10_64",
            OsType::Windows7 => "Windows7_64",
        }
    }
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for OsType {
    type Err = ProvisionError;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        OsType::ALL
            .into_iter()
            .find(|os| {
                os.label().eq_ignore_ascii_case(value) || os.vbox_id().eq_ignore_ascii_case(value)
            })
            .ok_or_else(|| {
                let choices: Vec<&str> = OsType::ALL.iter().map(|os| os.label()).collect();
                ProvisionError::invalid(
                    "OS",
                    format!(
                        "Unknown OS '{}'. Choose one of: {}.",
                        value,
                        choices.join(", ")
                    ),
                )
            })
    }
}

/// A validated request to register a VM and attach an existing disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmRequest {
    pub name: String,
    pub os_type: OsType,
    pub memory_mb: u32,
    pub cpus: u32,
    pub disk_path: PathBuf,
}

impl VmRequest {
    pub fn new(
        name: impl Into<String>,
        os_type: OsType,
        memory_mb: u32,
        cpus: u32,
        disk_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let name = name.into();
        let disk_path = disk_path.into();

        if name.trim().is_empty() || disk_path.as_os_str().is_empty() {
            return Err(ProvisionError::MissingFields);
        }
        if memory_mb == 0 {
            return Err(ProvisionError::invalid(
                "Memory (MB)",
                "Memory must be at least 1 MB.",
            ));
        }
        if cpus == 0 {
            return Err(ProvisionError::invalid(
                "CPUs",
                "CPU count must be at least 1.",
            ));
        }
        if !disk_path.is_file() {
            return Err(ProvisionError::invalid(
                "Disk File",
                format!("Disk image not found:\n{}", disk_path.display()),
            ));
        }

        Ok(Self {
            name: name.trim().to_string(),
            os_type,
            memory_mb,
            cpus,
            disk_path,
        })
    }
}

/// One entry of the ordered VM provisioning plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionStep {
    pub name: &'static str,
    pub description: String,
    pub invocation: Invocation,
}

/// The four `VBoxManage` calls that register a VM and attach its disk, in order.
pub fn vm_plan(
    vboxmanage: &Path,
    controller: &StorageControllerConfig,
    request: &VmRequest,
) -> Vec<ProvisionStep> {
    let name = request.name.as_str();
    vec![
        ProvisionStep {
            name: "createvm",
            description: format!("Register VM '{}' ({})", name, request.os_type),
            invocation: Invocation::new(vboxmanage).args([
                "createvm",
                "--name",
                name,
                "--ostype",
                request.os_type.vbox_id(),
                "--register",
            ]),
        },
        ProvisionStep {
            name: "modifyvm",
            description: format!(
                "Set {} MB memory and {} CPU(s)",
                request.memory_mb, request.cpus
            ),
            invocation: Invocation::new(vboxmanage).args([
                "modifyvm".to_string(),
                name.to_string(),
                "--memory".to_string(),
                request.memory_mb.to_string(),
                "--cpus".to_string(),
                request.cpus.to_string(),
            ]),
        },
        ProvisionStep {
            name: "storagectl",
            description: format!("Add storage controller '{}'", controller.name),
            invocation: Invocation::new(vboxmanage).args([
                "storagectl",
                name,
                "--name",
                controller.name.as_str(),
                "--add",
                controller.bus.as_str(),
                "--controller",
                controller.chipset.as_str(),
            ]),
        },
        ProvisionStep {
            name: "storageattach",
            description: format!("Attach {}", request.disk_path.display()),
            invocation: Invocation::new(vboxmanage)
                .args([
                    "storageattach",
                    name,
                    "--storagectl",
                    controller.name.as_str(),
                    "--port",
                    "0",
                    "--device",
                    "0",
                    "--type",
                    "hdd",
                    "--medium",
                ])
                .arg(request.disk_path.to_string_lossy()),
        },
    ]
}

#[derive(Debug, Clone, Serialize)]
pub struct VmOutcome {
    pub name: String,
    pub disk_path: PathBuf,
    pub steps: Vec<ProvisionStep>,
}

pub struct VmProvisioner<R> {
    runner: R,
    tools: ToolsConfig,
    controller: StorageControllerConfig,
}

impl<R: CommandRunner> VmProvisioner<R> {
    pub fn new(runner: R, tools: ToolsConfig, controller: StorageControllerConfig) -> Self {
        Self {
            runner,
            tools,
            controller,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn plan(&self, request: &VmRequest) -> Vec<ProvisionStep> {
        vm_plan(&self.tools.vboxmanage, &self.controller, request)
    }

    /// Run the plan in order, stopping at the first failed step.
    ///
    /// Completed steps are not undone: a VM registered by `createvm` stays
    /// registered if a later step fails.
    pub fn provision(&self, request: &VmRequest) -> Result<VmOutcome> {
        self.runner.ensure_available(&self.tools.vboxmanage)?;

        let steps = self.plan(request);
        let total = steps.len();
        let mut completed: Vec<String> = Vec::with_capacity(total);

        for (idx, step) in steps.iter().enumerate() {
            log_info!("[{}/{}] {}", idx + 1, total, step.description);

            if let Err(err) = self.runner.run(&step.invocation) {
                log_debug!("Step '{}' failed for VM '{}': {}", step.name, request.name, err);
                if completed.iter().any(|name| name == "createvm") {
                    log_warn!(
                        "VM '{}' remains registered; remove it with: {} unregistervm \"{}\" --delete",
                        request.name,
                        self.tools.vboxmanage.display(),
                        request.name
                    );
                }
                return Err(ProvisionError::StepFailed {
                    step: step.name.to_string(),
                    completed,
                    source: Box::new(err),
                });
            }

            completed.push(step.name.to_string());
        }

        log_info!(
            "VM '{}' created and disk {} attached",
            request.name,
            request.disk_path.display()
        );

        Ok(VmOutcome {
            name: request.name.clone(),
            disk_path: request.disk_path.clone(),
            steps,
        })
    }
}
