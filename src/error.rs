use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Please fill in all fields.")]
    MissingFields,

    #[error("{message}")]
    Validation {
        /// Form field the message is about, e.g. "Size".
        field: &'static str,
        message: String,
    },

    #[error("{} not found:\n{}", executable_name(.0), .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("Command '{command}' returned non-zero exit status {}{}", exit_code(.code), stderr_suffix(.stderr))]
    ProcessFailure {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Step {step} failed: {source}")]
    StepFailed {
        step: String,
        /// Steps that finished before the failure, in order.
        completed: Vec<String>,
        #[source]
        source: Box<ProvisionError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    Serde(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Unexpected(String),
}

impl ProvisionError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        ProvisionError::Validation {
            field,
            message: message.into(),
        }
    }

    /// True for errors raised before any external process was spawned.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ProvisionError::MissingFields | ProvisionError::Validation { .. }
        )
    }

    /// The command line of the external process that failed, if any.
    pub fn failed_command(&self) -> Option<&str> {
        match self {
            ProvisionError::ProcessFailure { command, .. } => Some(command),
            ProvisionError::StepFailed { source, .. } => source.failed_command(),
            _ => None,
        }
    }
}

fn executable_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "unknown (terminated by signal)".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        ".".to_string()
    } else {
        format!(":\n{}", trimmed)
    }
}

impl From<toml::de::Error> for ProvisionError {
    fn from(err: toml::de::Error) -> Self {
        ProvisionError::Serde(err.to_string())
    }
}

impl From<toml::ser::Error> for ProvisionError {
    fn from(err: toml::ser::Error) -> Self {
        ProvisionError::Serde(err.to_string())
    }
}

impl From<serde_json::Error> for ProvisionError {
    fn from(err: serde_json::Error) -> Self {
        ProvisionError::Serde(err.to_string())
    }
}
