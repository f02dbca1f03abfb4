use crate::{
    ProvisionError, Result,
    config::ToolsConfig,
    log_debug, log_info, log_warn,
    runner::{CommandRunner, Invocation},
};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::TempPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiskFormat {
    Vdi,
    Vhd,
    Vmdk,
}

impl DiskFormat {
    pub const ALL: [DiskFormat; 3] = [DiskFormat::Vdi, DiskFormat::Vhd, DiskFormat::Vmdk];

    /// Value passed to `VBoxManage createhd --format`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskFormat::Vdi => "VDI",
            DiskFormat::Vhd => "VHD",
            DiskFormat::Vmdk => "VMDK",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DiskFormat::Vdi => "vdi",
            DiskFormat::Vhd => "vhd",
            DiskFormat::Vmdk => "vmdk",
        }
    }

    /// VHD images are built with the OS disk utility rather than the hypervisor.
    pub fn is_native(&self) -> bool {
        matches!(self, DiskFormat::Vhd)
    }
}

impl fmt::Display for DiskFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiskFormat {
    type Err = ProvisionError;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        DiskFormat::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| {
                ProvisionError::invalid(
                    "Format",
                    format!("Unknown disk format '{}'. Choose VDI, VHD or VMDK.", value),
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiskVariant {
    Fixed,
    Dynamic,
}

impl DiskVariant {
    pub const ALL: [DiskVariant; 2] = [DiskVariant::Fixed, DiskVariant::Dynamic];

    pub fn label(&self) -> &'static str {
        match self {
            DiskVariant::Fixed => "Fixed-Size",
            DiskVariant::Dynamic => "Dynamic-Size",
        }
    }

    /// `VBoxManage createhd --variant` value.
    pub fn vbox_variant(&self) -> &'static str {
        match self {
            DiskVariant::Fixed => "Fixed",
            DiskVariant::Dynamic => "Standard",
        }
    }

    /// `diskpart create vdisk type=` value.
    pub fn diskpart_type(&self) -> &'static str {
        match self {
            DiskVariant::Fixed => "fixed",
            DiskVariant::Dynamic => "expandable",
        }
    }
}

impl fmt::Display for DiskVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DiskVariant {
    type Err = ProvisionError;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "fixed-size" | "fixed" => Ok(DiskVariant::Fixed),
            "dynamic-size" | "dynamic" => Ok(DiskVariant::Dynamic),
            _ => Err(ProvisionError::invalid(
                "Type",
                format!(
                    "Unknown disk type '{}'. Choose Fixed-Size or Dynamic-Size.",
                    value.trim()
                ),
            )),
        }
    }
}

/// A validated request to create one virtual disk image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskRequest {
    pub path: PathBuf,
    pub size_gb: f64,
    pub format: DiskFormat,
    pub variant: DiskVariant,
}

impl DiskRequest {
    /// Build a request, appending the format's extension when `path` has none.
    pub fn new(
        path: impl Into<PathBuf>,
        size_gb: f64,
        format: DiskFormat,
        variant: DiskVariant,
    ) -> Result<Self> {
        let mut path = path.into();
        if path.as_os_str().is_empty() {
            return Err(ProvisionError::MissingFields);
        }
        if !size_gb.is_finite() || size_gb <= 0.0 {
            return Err(ProvisionError::invalid(
                "Size",
                "Size must be a positive number of gigabytes.",
            ));
        }
        if path.extension().is_none() {
            path.set_extension(format.extension());
        }

        let request = Self {
            path,
            size_gb,
            format,
            variant,
        };
        if request.size_mb() == 0 {
            return Err(ProvisionError::invalid(
                "Size",
                format!("Size {} GB is smaller than 1 MB.", size_gb),
            ));
        }
        Ok(request)
    }

    /// Size in megabytes, truncated toward zero.
    pub fn size_mb(&self) -> u64 {
        (self.size_gb * 1024.0) as u64
    }
}

/// Build the diskpart script that creates, attaches, partitions and formats a VHD.
pub fn diskpart_script(full_path: &Path, size_mb: u64, variant: DiskVariant) -> String {
    let quoted = format!("\"{}\"", full_path.display());
    let label = volume_label(full_path);

    let mut script = String::new();
    script.push_str(&format!(
        "create vdisk file={} maximum={} type={}\n",
        quoted,
        size_mb,
        variant.diskpart_type()
    ));
    script.push_str(&format!("select vdisk file={}\n", quoted));
    script.push_str("attach vdisk\n");
    script.push_str("create partition primary\n");
    script.push_str(&format!("format fs=ntfs label=\"{}\" quick\n", label));
    script.push_str("assign\n");
    script.push_str("exit\n");
    script
}

fn volume_label(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// What a provisioning call did.
#[derive(Debug, Clone, Serialize)]
pub struct DiskOutcome {
    pub path: PathBuf,
    pub format: DiskFormat,
    pub variant: DiskVariant,
    pub size_mb: u64,
    pub command: Invocation,
    /// The generated diskpart script, for VHD images.
    pub script: Option<String>,
}

pub struct DiskProvisioner<R> {
    runner: R,
    tools: ToolsConfig,
}

impl<R: CommandRunner> DiskProvisioner<R> {
    pub fn new(runner: R, tools: ToolsConfig) -> Self {
        Self { runner, tools }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn provision(&self, request: &DiskRequest) -> Result<DiskOutcome> {
        log_info!(
            "Creating {} disk ({}, {} MB) at {}",
            request.format,
            request.variant,
            request.size_mb(),
            request.path.display()
        );

        if request.format.is_native() {
            self.create_native(request)
        } else {
            self.create_with_hypervisor(request)
        }
    }

    fn create_native(&self, request: &DiskRequest) -> Result<DiskOutcome> {
        let full_path = std::path::absolute(&request.path)?;
        if self.runner.executes() {
            ensure_parent_dir(&full_path)?;
        }

        let script = diskpart_script(&full_path, request.size_mb(), request.variant);
        log_debug!("diskpart script:\n{}", script);

        let script_path = self.write_script(&script)?;
        let command = Invocation::new(&self.tools.diskpart)
            .arg("/s")
            .arg(script_path.to_string_lossy());

        let result = self.runner.run(&command);

        let shown = script_path.to_path_buf();
        if let Err(err) = script_path.close() {
            log_warn!(
                "Failed to remove diskpart script {}: {}",
                shown.display(),
                err
            );
        }
        result?;

        Ok(DiskOutcome {
            path: full_path,
            format: request.format,
            variant: request.variant,
            size_mb: request.size_mb(),
            command,
            script: Some(script),
        })
    }

    fn create_with_hypervisor(&self, request: &DiskRequest) -> Result<DiskOutcome> {
        self.runner.ensure_available(&self.tools.vboxmanage)?;
        if self.runner.executes() {
            ensure_parent_dir(&request.path)?;
        }

        let command = createhd_invocation(&self.tools.vboxmanage, request);
        self.runner.run(&command)?;

        Ok(DiskOutcome {
            path: request.path.clone(),
            format: request.format,
            variant: request.variant,
            size_mb: request.size_mb(),
            command,
            script: None,
        })
    }

    /// The returned path removes the file when closed or dropped.
    fn write_script(&self, script: &str) -> Result<TempPath> {
        let dir = self.tools.resolve_script_dir();
        fs::create_dir_all(&dir)?;

        let mut file = tempfile::Builder::new()
            .prefix("dp_script")
            .suffix(".txt")
            .tempfile_in(&dir)?;
        file.write_all(script.as_bytes())?;
        file.flush()?;

        Ok(file.into_temp_path())
    }
}

pub fn createhd_invocation(vboxmanage: &Path, request: &DiskRequest) -> Invocation {
    Invocation::new(vboxmanage)
        .arg("createhd")
        .arg("--filename")
        .arg(request.path.to_string_lossy())
        .arg("--size")
        .arg(request.size_mb().to_string())
        .arg("--format")
        .arg(request.format.as_str())
        .arg("--variant")
        .arg(request.variant.vbox_variant())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            log_debug!("Creating directory {}", parent.display());
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_form_labels() {
        assert_eq!("vdi".parse::<DiskFormat>().unwrap(), DiskFormat::Vdi);
        assert_eq!(" VMDK ".parse::<DiskFormat>().unwrap(), DiskFormat::Vmdk);
        assert_eq!(
            "Fixed-Size".parse::<DiskVariant>().unwrap(),
            DiskVariant::Fixed
        );
        assert_eq!(
            "dynamic".parse::<DiskVariant>().unwrap(),
            DiskVariant::Dynamic
        );
        assert!("qcow2".parse::<DiskFormat>().is_err());
        assert!("sparse".parse::<DiskVariant>().is_err());
    }

    #[test]
    fn variant_maps_to_tool_keywords() {
        assert_eq!(DiskVariant::Fixed.vbox_variant(), "Fixed");
        assert_eq!(DiskVariant::Dynamic.vbox_variant(), "Standard");
        assert_eq!(DiskVariant::Fixed.diskpart_type(), "fixed");
        assert_eq!(DiskVariant::Dynamic.diskpart_type(), "expandable");
    }

    #[test]
    fn size_is_truncated_to_whole_megabytes() {
        let request =
            DiskRequest::new("disk.vdi", 0.5, DiskFormat::Vdi, DiskVariant::Fixed).unwrap();
        assert_eq!(request.size_mb(), 512);

        let request =
            DiskRequest::new("disk.vdi", 1.0009, DiskFormat::Vdi, DiskVariant::Fixed).unwrap();
        assert_eq!(request.size_mb(), 1024);
    }

    #[test]
    fn rejects_non_positive_and_tiny_sizes() {
        for size in [0.0, -1.0, f64::NAN, 0.0005] {
            let err = DiskRequest::new("disk.vdi", size, DiskFormat::Vdi, DiskVariant::Fixed)
                .unwrap_err();
            assert!(err.is_validation(), "size {} should be rejected", size);
        }
    }

    #[test]
    fn appends_extension_for_format() {
        let request =
            DiskRequest::new("disks/data", 1.0, DiskFormat::Vmdk, DiskVariant::Dynamic).unwrap();
        assert_eq!(request.path, PathBuf::from("disks/data.vmdk"));

        let request =
            DiskRequest::new("disks/data.img", 1.0, DiskFormat::Vmdk, DiskVariant::Dynamic)
                .unwrap();
        assert_eq!(request.path, PathBuf::from("disks/data.img"));
    }

    #[test]
    fn script_follows_diskpart_grammar() {
        let script = diskpart_script(Path::new("/vms/backup.vhd"), 512, DiskVariant::Dynamic);
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(
            lines,
            vec![
                "create vdisk file=\"/vms/backup.vhd\" maximum=512 type=expandable",
                "select vdisk file=\"/vms/backup.vhd\"",
                "attach vdisk",
                "create partition primary",
                "format fs=ntfs label=\"backup\" quick",
                "assign",
                "exit",
            ]
        );
    }
}
