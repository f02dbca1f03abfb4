//! Action handlers: one form in, exactly one dialog out.

use crate::{
    ProvisionError,
    dialog::Dialog,
    disk::{DiskOutcome, DiskProvisioner},
    form::{DiskForm, VmForm},
    log_error,
    runner::CommandRunner,
    vm::{VmOutcome, VmProvisioner},
};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ActionReport<T> {
    pub dialog: Dialog,
    pub outcome: Option<T>,
}

impl<T> ActionReport<T> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Validate the disk form and create the image. Every error becomes the dialog.
pub fn create_disk<R: CommandRunner>(
    provisioner: &DiskProvisioner<R>,
    form: &DiskForm,
) -> ActionReport<DiskOutcome> {
    let result = form
        .validate()
        .and_then(|request| provisioner.provision(&request));

    match result {
        Ok(outcome) => ActionReport {
            dialog: Dialog::info(
                "Success",
                format!(
                    "{} disk ({}) created:\n{}",
                    outcome.format,
                    outcome.variant,
                    outcome.path.display()
                ),
            ),
            outcome: Some(outcome),
        },
        Err(err) => {
            log_error!("Disk creation failed: {}", err);
            ActionReport {
                dialog: disk_error_dialog(&err),
                outcome: None,
            }
        }
    }
}

fn disk_error_dialog(err: &ProvisionError) -> Dialog {
    match err {
        ProvisionError::ProcessFailure { .. } => {
            Dialog::error("Disk Creation Failed", err.to_string())
        }
        _ => common_error_dialog(err),
    }
}

/// Validate the VM form and run the provisioning steps. Every error becomes the dialog.
pub fn create_vm<R: CommandRunner>(
    provisioner: &VmProvisioner<R>,
    form: &VmForm,
) -> ActionReport<VmOutcome> {
    let result = form
        .validate()
        .and_then(|request| provisioner.provision(&request));

    match result {
        Ok(outcome) => ActionReport {
            dialog: Dialog::info(
                "Success",
                format!(
                    "VM '{}' created and disk attached:\n{}",
                    outcome.name,
                    outcome.disk_path.display()
                ),
            ),
            outcome: Some(outcome),
        },
        Err(err) => {
            log_error!("VM creation failed: {}", err);
            ActionReport {
                dialog: vm_error_dialog(&err),
                outcome: None,
            }
        }
    }
}

fn vm_error_dialog(err: &ProvisionError) -> Dialog {
    match err {
        ProvisionError::StepFailed { source, .. } => {
            Dialog::error("Error", format!("Failed to create VM:\n{}", source))
        }
        ProvisionError::ProcessFailure { .. } => {
            Dialog::error("Error", format!("Failed to create VM:\n{}", err))
        }
        _ => common_error_dialog(err),
    }
}

fn common_error_dialog(err: &ProvisionError) -> Dialog {
    match err {
        ProvisionError::MissingFields => Dialog::warning("Missing Information", err.to_string()),
        ProvisionError::Validation { field: "Size", .. } => {
            Dialog::error("Invalid Size", err.to_string())
        }
        ProvisionError::Validation { .. } => Dialog::error("Invalid Input", err.to_string()),
        _ => Dialog::error("Error", err.to_string()),
    }
}
