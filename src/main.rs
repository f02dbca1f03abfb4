use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use vboxprov::{
    DiskProvisioner, DryRunRunner, OsType, SystemRunner, VmProvisioner,
    app::{self, ActionReport},
    config::{self, ProvisionConfig},
    disk::DiskOutcome,
    form::{DiskForm, Prompter, VmForm, prompt_disk_form, prompt_vm_form},
    logger,
    preflight,
    vm::VmOutcome,
};

#[derive(Parser)]
#[command(name = "vboxprov")]
#[command(about = "Create VirtualBox disks and virtual machines")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file (defaults to the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the commands that would run without running them
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a virtual disk image (VDI, VHD or VMDK)
    Disk(DiskArgs),
    /// Create and register a VM with an existing disk attached
    Vm(VmArgs),
    /// List the guest OS choices and their VirtualBox identifiers
    OsTypes,
    /// Check that VBoxManage and diskpart are available
    Preflight {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Configuration file management
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },
}

#[derive(Args, Debug)]
struct DiskArgs {
    /// Disk file path
    #[arg(short, long)]
    path: Option<String>,
    /// Size in GB (e.g. 0.5, 1.0)
    #[arg(short, long)]
    size: Option<String>,
    /// VDI, VHD or VMDK
    #[arg(short, long)]
    format: Option<String>,
    /// Fixed-Size or Dynamic-Size
    #[arg(short = 't', long = "type", alias = "variant")]
    variant: Option<String>,
    /// Prompt for each field
    #[arg(short, long)]
    interactive: bool,
    /// Emit the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct VmArgs {
    /// VM name
    #[arg(short, long)]
    name: Option<String>,
    /// Guest OS (see `vboxprov os-types`)
    #[arg(short, long)]
    os: Option<String>,
    /// Memory in MB
    #[arg(short, long)]
    memory: Option<String>,
    /// Number of virtual CPUs
    #[arg(long)]
    cpus: Option<String>,
    /// Existing disk image to attach
    #[arg(short, long)]
    disk: Option<String>,
    /// Prompt for each field
    #[arg(short, long)]
    interactive: bool,
    /// Emit the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    if cli.verbose {
        logger::init_logger_with("vboxprov=debug");
    } else {
        logger::init_logger();
    }

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let config = ProvisionConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    if !config_path.exists() {
        logger::debug!(
            "No configuration at {}, using defaults",
            config_path.display()
        );
    }

    match cli.command {
        Commands::Disk(args) => run_disk(args, &config, cli.dry_run),
        Commands::Vm(args) => run_vm(args, &config, cli.dry_run),
        Commands::OsTypes => {
            println!("{:<12} VirtualBox id", "OS");
            for os in OsType::ALL {
                println!("{:<12} {}", os.label(), os.vbox_id());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Preflight { json } => {
            let summary = preflight::run_preflight(&config.tools)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", summary);
            }
            Ok(if summary.is_ready() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Config { config_command } => match config_command {
            ConfigCommands::Init { force } => {
                if config_path.exists() && !force {
                    bail!(
                        "{} already exists (use --force to overwrite)",
                        config_path.display()
                    );
                }
                ProvisionConfig::default().save_to_file(&config_path)?;
                println!("Wrote default configuration to {}", config_path.display());
                Ok(ExitCode::SUCCESS)
            }
            ConfigCommands::Show => {
                println!("# {}", config_path.display());
                print!("{}", toml::to_string_pretty(&config)?);
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}

fn run_disk(args: DiskArgs, config: &ProvisionConfig, dry_run: bool) -> anyhow::Result<ExitCode> {
    let mut form = DiskForm::with_defaults(&config.disk);
    if let Some(path) = args.path {
        form.path = path;
    }
    if let Some(size) = args.size {
        form.size_gb = size;
    }
    if let Some(format) = args.format {
        form.format = format;
    }
    if let Some(variant) = args.variant {
        form.variant = variant;
    }

    if args.interactive {
        let stdin = io::stdin();
        let mut prompter = Prompter::new(stdin.lock(), io::stdout());
        form = prompt_disk_form(&mut prompter, form)?;
    }

    let report = if dry_run {
        let provisioner = DiskProvisioner::new(DryRunRunner::new(), config.tools.clone());
        app::create_disk(&provisioner, &form)
    } else {
        let provisioner = DiskProvisioner::new(SystemRunner::new(), config.tools.clone());
        app::create_disk(&provisioner, &form)
    };

    if dry_run && !args.json {
        if let Some(outcome) = &report.outcome {
            print_disk_plan(outcome);
        }
    }
    finish(report, args.json)
}

fn run_vm(args: VmArgs, config: &ProvisionConfig, dry_run: bool) -> anyhow::Result<ExitCode> {
    let mut form = VmForm::with_defaults(&config.vm);
    if let Some(name) = args.name {
        form.name = name;
    }
    if let Some(os) = args.os {
        form.os = os;
    }
    if let Some(memory) = args.memory {
        form.memory_mb = memory;
    }
    if let Some(cpus) = args.cpus {
        form.cpus = cpus;
    }
    if let Some(disk) = args.disk {
        form.disk_path = disk;
    }

    if args.interactive {
        let stdin = io::stdin();
        let mut prompter = Prompter::new(stdin.lock(), io::stdout());
        form = prompt_vm_form(&mut prompter, form, &config.vm)?;
    }

    let report = if dry_run {
        let provisioner = VmProvisioner::new(
            DryRunRunner::new(),
            config.tools.clone(),
            config.storage.clone(),
        );
        app::create_vm(&provisioner, &form)
    } else {
        let provisioner = VmProvisioner::new(
            SystemRunner::new(),
            config.tools.clone(),
            config.storage.clone(),
        );
        app::create_vm(&provisioner, &form)
    };

    if dry_run && !args.json {
        if let Some(outcome) = &report.outcome {
            print_vm_plan(outcome);
        }
    }
    finish(report, args.json)
}

fn print_disk_plan(outcome: &DiskOutcome) {
    println!("Dry run, nothing was executed. Would run:");
    println!("  {}", outcome.command);
    if let Some(script) = &outcome.script {
        println!("with script:");
        for line in script.lines() {
            println!("  {}", line);
        }
    }
    println!();
}

fn print_vm_plan(outcome: &VmOutcome) {
    println!("Dry run, nothing was executed. Would run:");
    for (idx, step) in outcome.steps.iter().enumerate() {
        println!("  {}. {}", idx + 1, step.invocation);
    }
    println!();
}

fn finish<T: Serialize>(report: ActionReport<T>, json: bool) -> anyhow::Result<ExitCode> {
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.dialog.present()?;
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
