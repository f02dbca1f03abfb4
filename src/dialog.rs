use serde::Serialize;
use std::fmt;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogLevel {
    Info,
    Warning,
    Error,
}

/// The single message shown to the user at the end of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dialog {
    pub level: DialogLevel,
    pub title: String,
    pub message: String,
}

impl Dialog {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: DialogLevel::Info,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: DialogLevel::Warning,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: DialogLevel::Error,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.level == DialogLevel::Info
    }

    /// Info goes to stdout, warnings and errors to stderr.
    pub fn present(&self) -> io::Result<()> {
        match self.level {
            DialogLevel::Info => self.write_to(&mut io::stdout().lock()),
            DialogLevel::Warning | DialogLevel::Error => self.write_to(&mut io::stderr().lock()),
        }
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", self)?;
        out.flush()
    }
}

impl fmt::Display for Dialog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let icon = match self.level {
            DialogLevel::Info => "✅",
            DialogLevel::Warning => "⚠️ ",
            DialogLevel::Error => "❌",
        };
        write!(f, "{} {}", icon, self.title)?;
        for line in self.message.lines() {
            write!(f, "\n   {}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_title_then_indented_message() {
        let dialog = Dialog::info("Success", "VDI disk (Fixed-Size) created:\nC:/tmp/test.vdi");
        let mut out = Vec::new();
        dialog.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("✅ Success\n"));
        assert!(text.contains("\n   C:/tmp/test.vdi"));
    }

    #[test]
    fn only_info_counts_as_success() {
        assert!(Dialog::info("Success", "ok").is_success());
        assert!(!Dialog::warning("Missing Information", "x").is_success());
        assert!(!Dialog::error("Error", "x").is_success());
    }
}
