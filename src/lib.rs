pub mod app;
pub mod config;
pub mod dialog;
pub mod disk;
pub mod error;
pub mod form;
pub mod logger;
pub mod preflight;
pub mod runner;
pub mod vm;

pub use error::ProvisionError;

pub type Result<T> = std::result::Result<T, ProvisionError>;

pub use dialog::{Dialog, DialogLevel};
pub use disk::{DiskFormat, DiskProvisioner, DiskRequest, DiskVariant};
pub use runner::{CommandOutput, CommandRunner, DryRunRunner, Invocation, SystemRunner};
pub use vm::{OsType, VmProvisioner, VmRequest};
