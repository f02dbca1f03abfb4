//! Raw form state and the interactive prompt session that fills it.
//!
//! Forms hold exactly what the user typed. `validate` turns them into the
//! immutable request records the provisioners consume.

use crate::{
    ProvisionError, Result,
    config::{DiskDefaults, VmDefaults},
    disk::{DiskFormat, DiskRequest, DiskVariant},
    vm::{OsType, VmRequest},
};
use std::io::{BufRead, Write};

/// Step a text-encoded integer by `delta`, never going below 1.
///
/// Text that is not an integer counts as 0, except that a non-positive delta
/// then yields 1.
pub fn adjust(current: &str, delta: i64) -> u64 {
    match current.trim().parse::<i128>() {
        Ok(value) => {
            let stepped = value.saturating_add(i128::from(delta)).max(1);
            u64::try_from(stepped).unwrap_or(u64::MAX)
        }
        Err(_) => {
            if delta > 0 {
                delta as u64
            } else {
                1
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskForm {
    pub path: String,
    pub size_gb: String,
    pub format: String,
    pub variant: String,
}

impl DiskForm {
    pub fn with_defaults(defaults: &DiskDefaults) -> Self {
        Self {
            path: String::new(),
            size_gb: defaults.size_gb.clone(),
            format: defaults.format.clone(),
            variant: defaults.variant.clone(),
        }
    }

    pub fn validate(&self) -> Result<DiskRequest> {
        let path = self.path.trim();
        let size = self.size_gb.trim();
        let format = self.format.trim();
        let variant = self.variant.trim();

        if path.is_empty() || size.is_empty() || format.is_empty() || variant.is_empty() {
            return Err(ProvisionError::MissingFields);
        }

        let size_gb: f64 = size
            .parse()
            .ok()
            .filter(|value: &f64| value.is_finite())
            .ok_or_else(|| {
                ProvisionError::invalid("Size", "Size must be a number (e.g., 0.5, 1.0).")
            })?;

        DiskRequest::new(path, size_gb, format.parse()?, variant.parse()?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmForm {
    pub name: String,
    pub os: String,
    pub memory_mb: String,
    pub cpus: String,
    pub disk_path: String,
}

impl VmForm {
    pub fn with_defaults(defaults: &VmDefaults) -> Self {
        Self {
            name: String::new(),
            os: defaults.os.clone(),
            memory_mb: defaults.memory_mb.clone(),
            cpus: defaults.cpus.clone(),
            disk_path: String::new(),
        }
    }

    pub fn validate(&self) -> Result<VmRequest> {
        let name = self.name.trim();
        let disk_path = self.disk_path.trim();
        if name.is_empty()
            || disk_path.is_empty()
            || self.os.trim().is_empty()
            || self.memory_mb.trim().is_empty()
            || self.cpus.trim().is_empty()
        {
            return Err(ProvisionError::MissingFields);
        }

        let os_type: OsType = self.os.parse()?;
        let memory_mb = parse_count("Memory (MB)", &self.memory_mb)?;
        let cpus = parse_count("CPUs", &self.cpus)?;

        VmRequest::new(name, os_type, memory_mb, cpus, disk_path)
    }
}

fn parse_count(field: &'static str, value: &str) -> Result<u32> {
    match value.trim().parse::<u32>() {
        Ok(count) if count >= 1 => Ok(count),
        _ => Err(ProvisionError::invalid(
            field,
            format!("{} must be a whole number of at least 1.", field),
        )),
    }
}

/// Line-oriented prompts over any reader/writer pair.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.input, self.output)
    }

    /// Read one line. `None` at end of input.
    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = self.input.read_line(&mut line)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    /// Free-text field. Enter keeps `current`.
    pub fn text(&mut self, label: &str, current: &str) -> Result<String> {
        if current.is_empty() {
            write!(self.output, "{}: ", label)?;
        } else {
            write!(self.output, "{} [{}]: ", label, current)?;
        }
        self.output.flush()?;

        Ok(match self.read_line()? {
            Some(line) if !line.is_empty() => line,
            _ => current.to_string(),
        })
    }

    /// Pick from `choices` by number or name. Enter keeps `current`.
    pub fn select(&mut self, label: &str, choices: &[&str], current: &str) -> Result<String> {
        writeln!(self.output, "{}:", label)?;
        for (idx, choice) in choices.iter().enumerate() {
            writeln!(self.output, "  {}) {}", idx + 1, choice)?;
        }

        loop {
            write!(
                self.output,
                "Enter choice [1-{}] (press Enter for {}): ",
                choices.len(),
                current
            )?;
            self.output.flush()?;

            let Some(input) = self.read_line()? else {
                return Ok(current.to_string());
            };
            if input.is_empty() {
                return Ok(current.to_string());
            }

            if let Ok(index) = input.parse::<usize>() {
                if (1..=choices.len()).contains(&index) {
                    return Ok(choices[index - 1].to_string());
                }
            }
            if let Some(choice) = choices
                .iter()
                .find(|choice| choice.eq_ignore_ascii_case(&input))
            {
                return Ok(choice.to_string());
            }

            writeln!(
                self.output,
                "'{}' is not a valid selection. Enter a number between 1 and {} or a name.",
                input,
                choices.len()
            )?;
        }
    }

    /// Integer field with steppers: `+`/`-` move by `step`, `+N`/`-N` by `N`,
    /// a plain number replaces the value, Enter accepts it.
    pub fn stepper(&mut self, label: &str, current: &str, step: i64) -> Result<String> {
        let mut value = current.to_string();
        loop {
            write!(
                self.output,
                "{} [{}] (+/- to adjust by {}): ",
                label, value, step
            )?;
            self.output.flush()?;

            let Some(input) = self.read_line()? else {
                return Ok(value);
            };

            match parse_step(&input, step) {
                StepInput::Accept => return Ok(value),
                StepInput::Delta(delta) => {
                    value = adjust(&value, delta).to_string();
                }
                StepInput::Replace(text) => return Ok(text),
            }
        }
    }
}

enum StepInput {
    Accept,
    Delta(i64),
    Replace(String),
}

fn parse_step(input: &str, step: i64) -> StepInput {
    match input {
        "" => StepInput::Accept,
        "+" => StepInput::Delta(step),
        "-" => StepInput::Delta(-step),
        _ => {
            let signed = input.starts_with('+') || input.starts_with('-');
            match input.parse::<i64>() {
                Ok(delta) if signed => StepInput::Delta(delta),
                _ => StepInput::Replace(input.to_string()),
            }
        }
    }
}

/// Ask for every disk field, pre-filled from `form`.
pub fn prompt_disk_form<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
    form: DiskForm,
) -> Result<DiskForm> {
    let formats: Vec<&str> = DiskFormat::ALL.iter().map(|f| f.as_str()).collect();
    let variants: Vec<&str> = DiskVariant::ALL.iter().map(|v| v.label()).collect();

    let path = prompter.text("Disk File Path", &form.path)?;
    let size_gb = prompter.text("Size (GB)", &form.size_gb)?;
    let format = prompter.select("Format", &formats, &form.format)?;
    let variant = prompter.select("Type", &variants, &form.variant)?;

    Ok(DiskForm {
        path,
        size_gb,
        format,
        variant,
    })
}

/// Ask for every VM field, pre-filled from `form`.
pub fn prompt_vm_form<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
    form: VmForm,
    defaults: &VmDefaults,
) -> Result<VmForm> {
    let os_labels: Vec<&str> = OsType::ALL.iter().map(|os| os.label()).collect();

    let name = prompter.text("VM Name", &form.name)?;
    let os = prompter.select("Select OS", &os_labels, &form.os)?;
    let memory_mb = prompter.stepper("Memory (MB)", &form.memory_mb, defaults.memory_step)?;
    let cpus = prompter.stepper("CPUs", &form.cpus, defaults.cpu_step)?;
    let disk_path = prompter.text("Disk File", &form.disk_path)?;

    Ok(VmForm {
        name,
        os,
        memory_mb,
        cpus,
        disk_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn adjust_steps_numeric_values() {
        assert_eq!(adjust("2048", 256), 2304);
        assert_eq!(adjust("2048", -256), 1792);
        assert_eq!(adjust(" 2 ", 1), 3);
    }

    #[test]
    fn adjust_never_goes_below_one() {
        assert_eq!(adjust("1", -1), 1);
        assert_eq!(adjust("100", -256), 1);
        assert_eq!(adjust("-40", 0), 1);
        assert_eq!(adjust("0", 0), 1);
    }

    #[test]
    fn adjust_treats_garbage_as_zero() {
        assert_eq!(adjust("", -256), 1);
        assert_eq!(adjust("abc", 0), 1);
        assert_eq!(adjust("abc", 256), 256);
        assert_eq!(adjust("1.5", 1), 1);
    }

    #[test]
    fn adjust_matches_max_rule_over_a_range() {
        for value in -300i64..300 {
            for delta in [-256i64, -1, 0, 1, 256] {
                let expected = (value + delta).max(1) as u64;
                assert_eq!(adjust(&value.to_string(), delta), expected);
            }
        }
    }

    #[test]
    fn adjust_handles_values_beyond_i64() {
        assert_eq!(adjust("99999999999999999999", -1), u64::MAX);
        assert_eq!(adjust("18446744073709551615", 1), u64::MAX);
        assert_eq!(adjust("18446744073709551615", -1), u64::MAX - 1);
        assert_eq!(adjust("-99999999999999999999", 5), 1);
    }

    #[test]
    fn disk_form_reports_missing_fields_first() {
        let form = DiskForm {
            path: "  ".into(),
            size_gb: "abc".into(),
            format: "VDI".into(),
            variant: "Fixed-Size".into(),
        };
        assert!(matches!(form.validate(), Err(ProvisionError::MissingFields)));
    }

    #[test]
    fn disk_form_rejects_non_numeric_size() {
        let form = DiskForm {
            path: "C:/tmp/test.vdi".into(),
            size_gb: "two".into(),
            format: "VDI".into(),
            variant: "Fixed-Size".into(),
        };
        let err = form.validate().unwrap_err();
        assert_eq!(err.to_string(), "Size must be a number (e.g., 0.5, 1.0).");
    }

    #[test]
    fn disk_form_builds_request() {
        let form = DiskForm {
            path: "C:/tmp/test.vdi".into(),
            size_gb: "2.0".into(),
            format: "VDI".into(),
            variant: "Fixed-Size".into(),
        };
        let request = form.validate().unwrap();
        assert_eq!(request.size_mb(), 2048);
        assert_eq!(request.format, DiskFormat::Vdi);
        assert_eq!(request.variant, DiskVariant::Fixed);
    }

    #[test]
    fn vm_form_rejects_non_numeric_memory() {
        let form = VmForm {
            name: "TestVM".into(),
            os: "Linux".into(),
            memory_mb: "lots".into(),
            cpus: "2".into(),
            disk_path: "disk.vdi".into(),
        };
        let err = form.validate().unwrap_err();
        assert!(err.to_string().starts_with("Memory (MB)"));
    }

    #[test]
    fn text_prompt_keeps_default_on_enter() {
        let mut prompter = Prompter::new(Cursor::new("\nnew\n"), Vec::new());
        assert_eq!(prompter.text("Size (GB)", "1").unwrap(), "1");
        assert_eq!(prompter.text("Size (GB)", "1").unwrap(), "new");
        let (_, output) = prompter.into_inner();
        assert!(String::from_utf8(output).unwrap().contains("Size (GB) [1]: "));
    }

    #[test]
    fn select_accepts_number_or_name_and_retries() {
        let mut prompter = Prompter::new(Cursor::new("9\nvmdk\n"), Vec::new());
        let choice = prompter
            .select("Format", &["VDI", "VHD", "VMDK"], "VDI")
            .unwrap();
        assert_eq!(choice, "VMDK");

        let mut prompter = Prompter::new(Cursor::new("2\n"), Vec::new());
        let choice = prompter
            .select("Format", &["VDI", "VHD", "VMDK"], "VDI")
            .unwrap();
        assert_eq!(choice, "VHD");
    }

    #[test]
    fn stepper_applies_plus_minus_then_accepts() {
        let mut prompter = Prompter::new(Cursor::new("+\n+\n-512\n\n"), Vec::new());
        let value = prompter.stepper("Memory (MB)", "2048", 256).unwrap();
        assert_eq!(value, "2048");

        let mut prompter = Prompter::new(Cursor::new("-\n-\n-\n"), Vec::new());
        let value = prompter.stepper("CPUs", "2", 1).unwrap();
        assert_eq!(value, "1");

        let mut prompter = Prompter::new(Cursor::new("4096\n"), Vec::new());
        let value = prompter.stepper("Memory (MB)", "2048", 256).unwrap();
        assert_eq!(value, "4096");
    }

    #[test]
    fn disk_prompt_session_uses_menus() {
        let input = "/vms/backup\n0.5\n2\nfixed-size\n";
        let mut prompter = Prompter::new(Cursor::new(input), Vec::new());
        let form = prompt_disk_form(&mut prompter, DiskForm::with_defaults(&DiskDefaults::default()))
            .unwrap();

        assert_eq!(
            form,
            DiskForm {
                path: "/vms/backup".into(),
                size_gb: "0.5".into(),
                format: "VHD".into(),
                variant: "Fixed-Size".into(),
            }
        );

        let (_, output) = prompter.into_inner();
        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("Size (GB) [1]: "));
        assert!(printed.contains("  3) VMDK"));
        assert!(printed.contains("  2) Dynamic-Size"));

        let request = form.validate().unwrap();
        assert_eq!(request.size_mb(), 512);
        assert_eq!(request.path.extension().unwrap(), "vhd");
    }

    #[test]
    fn disk_prompt_keeps_defaults_on_enter() {
        let mut prompter = Prompter::new(Cursor::new("C:/vms/a.vdi\n\n\n\n"), Vec::new());
        let form = prompt_disk_form(&mut prompter, DiskForm::with_defaults(&DiskDefaults::default()))
            .unwrap();
        assert_eq!(form.size_gb, "1");
        assert_eq!(form.format, "VDI");
        assert_eq!(form.variant, "Dynamic-Size");
    }

    #[test]
    fn vm_prompt_session_fills_every_field() {
        let input = "TestVM\n3\n+\n\n\n/vms/disk.vdi\n";
        let mut prompter = Prompter::new(Cursor::new(input), Vec::new());
        let defaults = VmDefaults::default();
        let form = prompt_vm_form(&mut prompter, VmForm::with_defaults(&defaults), &defaults)
            .unwrap();

        assert_eq!(
            form,
            VmForm {
                name: "TestVM".into(),
                os: "Windows 10".into(),
                memory_mb: "2304".into(),
                cpus: "2".into(),
                disk_path: "/vms/disk.vdi".into(),
            }
        );
    }
}
