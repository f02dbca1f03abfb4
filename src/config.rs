use crate::{ProvisionError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionConfig {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub disk: DiskDefaults,
    #[serde(default)]
    pub vm: VmDefaults,
    #[serde(default)]
    pub storage: StorageControllerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Hypervisor management executable.
    #[serde(default = "default_vboxmanage")]
    pub vboxmanage: PathBuf,
    /// Native disk-partitioning utility.
    #[serde(default = "default_diskpart")]
    pub diskpart: PathBuf,
    /// Where generated diskpart scripts are written. Defaults to the system temp dir.
    #[serde(default)]
    pub script_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskDefaults {
    #[serde(default = "default_disk_size")]
    pub size_gb: String,
    #[serde(default = "default_disk_format")]
    pub format: String,
    #[serde(default = "default_disk_variant")]
    pub variant: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmDefaults {
    #[serde(default = "default_os")]
    pub os: String,
    #[serde(default = "default_memory")]
    pub memory_mb: String,
    #[serde(default = "default_cpus")]
    pub cpus: String,
    /// Amount added or removed by `+`/`-` at the memory prompt.
    #[serde(default = "default_memory_step")]
    pub memory_step: i64,
    #[serde(default = "default_cpu_step")]
    pub cpu_step: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageControllerConfig {
    #[serde(default = "default_controller_name")]
    pub name: String,
    #[serde(default = "default_controller_bus")]
    pub bus: String,
    #[serde(default = "default_controller_chipset")]
    pub chipset: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            vboxmanage: default_vboxmanage(),
            diskpart: default_diskpart(),
            script_dir: None,
        }
    }
}

impl Default for DiskDefaults {
    fn default() -> Self {
        Self {
            size_gb: default_disk_size(),
            format: default_disk_format(),
            variant: default_disk_variant(),
        }
    }
}

impl Default for VmDefaults {
    fn default() -> Self {
        Self {
            os: default_os(),
            memory_mb: default_memory(),
            cpus: default_cpus(),
            memory_step: default_memory_step(),
            cpu_step: default_cpu_step(),
        }
    }
}

impl Default for StorageControllerConfig {
    fn default() -> Self {
        Self {
            name: default_controller_name(),
            bus: default_controller_bus(),
            chipset: default_controller_chipset(),
        }
    }
}

#[cfg(windows)]
fn default_vboxmanage() -> PathBuf {
    PathBuf::from(r"C:\Program Files\Oracle\VirtualBox\VBoxManage.exe")
}

#[cfg(not(windows))]
fn default_vboxmanage() -> PathBuf {
    PathBuf::from("VBoxManage")
}

fn default_diskpart() -> PathBuf {
    PathBuf::from("diskpart")
}

fn default_disk_size() -> String {
    "1".to_string()
}

fn default_disk_format() -> String {
    "VDI".to_string()
}

fn default_disk_variant() -> String {
    "Dynamic-Size".to_string()
}

fn default_os() -> String {
    "Linux".to_string()
}

fn default_memory() -> String {
    "2048".to_string()
}

fn default_cpus() -> String {
    "2".to_string()
}

fn default_memory_step() -> i64 {
    256
}

fn default_cpu_step() -> i64 {
    1
}

fn default_controller_name() -> String {
    "SATA Controller".to_string()
}

fn default_controller_bus() -> String {
    "sata".to_string()
}

fn default_controller_chipset() -> String {
    "IntelAhci".to_string()
}

impl ToolsConfig {
    pub fn resolve_script_dir(&self) -> PathBuf {
        self.script_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl ProvisionConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    pub fn from_str(contents: &str) -> Result<Self> {
        let config: ProvisionConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Stepper increments must be positive, otherwise `+` and `-` trade places.
    pub fn validate(&self) -> Result<()> {
        if self.vm.memory_step <= 0 {
            return Err(ProvisionError::Config(format!(
                "vm.memory_step must be at least 1, got {}",
                self.vm.memory_step
            )));
        }
        if self.vm.cpu_step <= 0 {
            return Err(ProvisionError::Config(format!(
                "vm.cpu_step must be at least 1, got {}",
                self.vm.cpu_step
            )));
        }
        Ok(())
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

/// `<config dir>/vboxprov/config.toml`, or `./vboxprov.toml` when no config dir is known.
pub fn default_config_path() -> PathBuf {
    match dirs::config_dir() {
        Some(dir) => dir.join("vboxprov").join(CONFIG_FILE_NAME),
        None => PathBuf::from("vboxprov.toml"),
    }
}
