use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use disk_sweep_core::{
    check_prerequisites, collect_doctor_info, render_markdown_summary, Diskutil, Journal,
    PrerequisiteError, RunMode, Session, SweepOptions, SweepReport, DEFAULT_LOG_DIR,
};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Exit status after SIGINT/SIGTERM, once cleanup has run.
const EXIT_INTERRUPTED: u8 = 130;
const EXIT_PREREQUISITE: u8 = 1;
const EXIT_SUCCESS: u8 = 0;

#[derive(Debug, Parser)]
#[command(
    name = "disk-sweep",
    version,
    about = "Verify and repair the filesystems of all external disks, remounting everything it unmounts."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Unmount, verify/repair and remount every external disk.
    Check(CheckArgs),
    /// Show environment, prerequisite status and mounted volumes.
    Doctor,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("mode").args(["dry_run", "non_interactive"])))]
struct CheckArgs {
    /// Simulate actions without making changes.
    #[arg(long)]
    dry_run: bool,

    /// Run without the interactive menu.
    #[arg(long)]
    non_interactive: bool,

    /// Directory for the check and error logs.
    #[arg(long, value_name = "DIR", default_value = DEFAULT_LOG_DIR)]
    log_dir: PathBuf,

    /// Optional JSON sweep report output file.
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Optional markdown summary output file.
    #[arg(long, value_name = "FILE")]
    md: Option<PathBuf>,

    /// Extra unmount attempts for a busy disk.
    #[arg(long, default_value_t = 0)]
    unmount_retries: u32,

    /// Delay before the first unmount retry; doubled for each later one.
    #[arg(long, default_value_t = 2000, value_name = "MS")]
    retry_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuChoice {
    Run(RunMode),
    Exit,
}

fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check(args) => run_check_command(args),
        Commands::Doctor => {
            run_doctor_command();
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_check_command(args: CheckArgs) -> Result<ExitCode> {
    let journal = Journal::open(&args.log_dir)?;

    if let Err(err) = check_prerequisites(&journal) {
        error!("{err}");
        return Ok(ExitCode::from(exit_status(Err(&err), false)));
    }

    let mode = match resolve_mode(&args)? {
        MenuChoice::Run(mode) => mode,
        MenuChoice::Exit => {
            println!("Exiting.");
            return Ok(ExitCode::SUCCESS);
        }
    };

    let options = SweepOptions {
        mode,
        unmount_retries: args.unmount_retries,
        retry_delay: Duration::from_millis(args.retry_delay_ms),
    };
    let session = Arc::new(Session::new(Diskutil::default(), journal, options));
    let _finalize_guard = session.finalize_on_drop();
    install_signal_handlers(&session)?;

    let status = session.run();
    let report = session.report(status);
    write_outputs(&report, args.report, args.md)?;

    println!("Recommendation: {}", report.summary.recommendation());
    if let Some((events_path, errors_path)) = session.journal().log_paths() {
        println!("Check log: {}", events_path.display());
        println!("Error log: {}", errors_path.display());
    }
    for disk in &report.left_unmounted {
        println!("Still unmounted, remount manually: {disk}");
    }

    // A signal may land after the report was taken.
    Ok(ExitCode::from(exit_status(Ok(&report), session.is_interrupted())))
}

/// Process status for `check`. Any interrupt, including one that arrives
/// after the report was built, yields 130.
fn exit_status(outcome: Result<&SweepReport, &PrerequisiteError>, interrupted: bool) -> u8 {
    match outcome {
        Err(_) => EXIT_PREREQUISITE,
        Ok(report) if report.interrupted || interrupted => EXIT_INTERRUPTED,
        Ok(_) => EXIT_SUCCESS,
    }
}

fn resolve_mode(args: &CheckArgs) -> Result<MenuChoice> {
    if args.non_interactive {
        return Ok(MenuChoice::Run(RunMode::Normal));
    }
    if args.dry_run {
        return Ok(MenuChoice::Run(RunMode::DryRun));
    }
    let stdin = io::stdin();
    let stdout = io::stdout();
    prompt_run_mode(&mut stdin.lock(), &mut stdout.lock())
}

fn prompt_run_mode(input: &mut impl BufRead, output: &mut impl Write) -> Result<MenuChoice> {
    loop {
        writeln!(output, "\nSelect an option:")?;
        writeln!(output, "1) Run normally")?;
        writeln!(output, "2) Dry run (simulate actions without making changes)")?;
        writeln!(output, "3) Exit")?;
        write!(output, "Enter your choice [1-3]: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line).context("failed to read menu choice")? == 0 {
            return Ok(MenuChoice::Exit);
        }
        match line.trim() {
            "1" => return Ok(MenuChoice::Run(RunMode::Normal)),
            "2" => return Ok(MenuChoice::Run(RunMode::DryRun)),
            "3" => return Ok(MenuChoice::Exit),
            _ => writeln!(
                output,
                "Invalid choice. Please enter a number between 1 and 3."
            )?,
        }
    }
}

#[cfg(unix)]
fn install_signal_handlers(session: &Arc<Session<Diskutil>>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("failed to register signal handlers")?;
    let session = Arc::clone(session);
    std::thread::spawn(move || {
        for signal in signals.forever() {
            if session.is_interrupted() && session.is_finalized() {
                std::process::exit(i32::from(EXIT_INTERRUPTED));
            }
            tracing::warn!(signal, "termination signal received");
            session.interrupt();
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handlers(_session: &Arc<Session<Diskutil>>) -> Result<()> {
    Ok(())
}

fn write_outputs(
    report: &SweepReport,
    report_path: Option<PathBuf>,
    md_path: Option<PathBuf>,
) -> Result<()> {
    if let Some(output) = report_path {
        let payload =
            serde_json::to_string_pretty(report).context("failed to serialize sweep report")?;
        fs::write(&output, payload)
            .with_context(|| format!("failed to write report to {}", output.display()))?;
        println!("Report written to {}", output.display());
    }

    if let Some(md_path) = md_path {
        let markdown = render_markdown_summary(report);
        fs::write(&md_path, markdown).with_context(|| {
            format!("failed to write markdown summary to {}", md_path.display())
        })?;
        println!("Markdown summary written to {}", md_path.display());
    }

    Ok(())
}

fn run_doctor_command() {
    let info = collect_doctor_info();
    println!("OS: {} ({})", info.os, info.arch);
    println!("Running as root: {}", info.privileged);
    if info.missing_commands.is_empty() {
        println!("Required commands: all present");
    } else {
        println!("Missing commands: {}", info.missing_commands.join(", "));
    }
    println!("Mounted volumes: {}", info.volumes.len());
    for volume in info.volumes {
        println!(
            "- {} [{}] fs={} removable={}",
            volume.name, volume.mount_point, volume.file_system, volume.is_removable
        );
    }
    for note in info.notes {
        println!("Note: {}", note);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
