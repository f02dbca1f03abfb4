use crate::{
    Result,
    config::ToolsConfig,
    log_info,
    runner::locate_executable,
};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub name: &'static str,
    pub configured: PathBuf,
    pub resolved: Option<PathBuf>,
}

impl ToolStatus {
    pub fn available(&self) -> bool {
        self.resolved.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PreflightSummary {
    pub host_os: &'static str,
    pub vboxmanage_version: Option<String>,
    pub tool_status: Vec<ToolStatus>,
    /// Problems that block every action.
    pub issues: Vec<String>,
    /// Problems that only affect some actions, e.g. VHD creation.
    pub notes: Vec<String>,
}

impl PreflightSummary {
    pub fn is_ready(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for PreflightSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "vboxprov Preflight Summary (host: {}, VirtualBox: {})",
            self.host_os,
            self.vboxmanage_version.as_deref().unwrap_or("unknown")
        )?;
        writeln!(f, "\nTools:")?;
        for tool in &self.tool_status {
            match &tool.resolved {
                Some(path) => writeln!(f, "  - {}: available ({})", tool.name, path.display())?,
                None => writeln!(
                    f,
                    "  - {}: missing ({})",
                    tool.name,
                    tool.configured.display()
                )?,
            }
        }
        if !self.notes.is_empty() {
            writeln!(f, "\nNotes:")?;
            for note in &self.notes {
                writeln!(f, "  - {}", note)?;
            }
        }
        if self.issues.is_empty() {
            writeln!(f, "\n✅ Ready to provision disks and VMs")
        } else {
            writeln!(f, "\n⚠ Issues:")?;
            for issue in &self.issues {
                writeln!(f, "  - {}", issue)?;
            }
            Ok(())
        }
    }
}

pub fn run_preflight(tools: &ToolsConfig) -> Result<PreflightSummary> {
    log_info!("Running preflight checks");

    let tool_status = vec![
        probe_tool("VBoxManage", &tools.vboxmanage),
        probe_tool("diskpart", &tools.diskpart),
    ];

    let vboxmanage_version = tool_status[0]
        .resolved
        .as_deref()
        .and_then(read_vboxmanage_version);

    let mut issues = Vec::new();
    let mut notes = Vec::new();
    let (vboxmanage, diskpart) = (&tool_status[0], &tool_status[1]);
    if !vboxmanage.available() {
        issues.push(format!(
            "VBoxManage not found at {}",
            vboxmanage.configured.display()
        ));
    }
    if !diskpart.available() {
        let mut note = format!(
            "diskpart not found at {}; VHD disks cannot be created",
            diskpart.configured.display()
        );
        if !cfg!(windows) {
            note.push_str(" (diskpart only ships with Windows)");
        }
        notes.push(note);
    }

    let script_dir = tools.resolve_script_dir();
    if !script_dir.is_dir() {
        issues.push(format!(
            "Script directory {} does not exist",
            script_dir.display()
        ));
    }

    Ok(PreflightSummary {
        host_os: std::env::consts::OS,
        vboxmanage_version,
        tool_status,
        issues,
        notes,
    })
}

fn probe_tool(name: &'static str, configured: &Path) -> ToolStatus {
    ToolStatus {
        name,
        configured: configured.to_path_buf(),
        resolved: locate_executable(configured),
    }
}

fn read_vboxmanage_version(program: &Path) -> Option<String> {
    Command::new(program)
        .arg("--version")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|version| !version.is_empty())
}
