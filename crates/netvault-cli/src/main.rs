//! netvault - network device configuration backup with versioned history.
//!
//! ## Commands
//!
//! - `run`: back up the fleet (or a device/group) into the git history
//! - `test`: connect-only reachability probe
//! - `status`: most recent run summary plus per-device backup status
//! - `history` / `diff`: inspect a device's snapshot history
//! - `list-devices`: dump the registry
//! - `schedule`: cron-driven backups
//! - `test-notifications`: send a synthetic report through one channel
//! - `init`: create config files and the backup repository

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use chrono::Utc;
use tracing::{error, info, Level};

use netvault_core::{
    send_all, sinks_from_settings, AppConfig, BackupRun, BackupTarget, DeviceFilter,
    DeviceRegistry, EmailSink, EnvSecretProvider, GitRepository, NotificationSink, Orchestrator,
    OrchestratorConfig, Report, Scheduler, SlackSink, SshSessionFactory, TriggerKind,
    VersionedRepository,
};

const DEVICES_EXAMPLE: &str = include_str!("../../../config/devices.yaml.example");
const SETTINGS_EXAMPLE: &str = include_str!("../../../config/settings.yaml.example");

#[derive(Parser)]
#[command(name = "netvault")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Network device configuration backup with versioned history", long_about = None)]
struct Cli {
    /// Configuration directory holding devices.yaml and settings.yaml
    #[arg(long, global = true, default_value = "./config")]
    config_dir: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backup over the selected devices (default: all enabled)
    Run {
        /// Back up a single device by name
        #[arg(long, conflicts_with = "group")]
        device: Option<String>,

        /// Back up all enabled devices in a group
        #[arg(long)]
        group: Option<String>,
    },

    /// Probe device reachability without fetching or committing
    Test {
        /// Test a single device by name (default: all enabled)
        #[arg(long)]
        device: Option<String>,
    },

    /// Show the most recent run summary and per-device backup status
    Status,

    /// List snapshot history for a device, oldest first
    History {
        device: String,

        /// Maximum number of entries to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Show the diff between a device's two most recent snapshots
    Diff { device: String },

    /// List all configured devices
    ListDevices,

    /// Run scheduled backups
    Schedule {
        /// Keep running on the configured cron cadence until interrupted
        #[arg(long)]
        daemon: bool,
    },

    /// Send a synthetic report through one notification channel
    TestNotifications {
        /// Test email delivery
        #[arg(long)]
        email: bool,

        /// Test Slack delivery
        #[arg(long)]
        slack: bool,
    },

    /// Create the configuration directory and initialize the repository
    Init {
        /// Repository location (default: from settings)
        #[arg(long)]
        repo_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Init { ref repo_path } => {
            netvault_core::init_tracing(cli.json, default_level(cli.verbose));
            cmd_init(&cli.config_dir, repo_path.clone()).await
        }
        Commands::Run {
            ref device,
            ref group,
        } => {
            let config = load_config(&cli)?;
            cmd_run(&config, device.clone(), group.clone()).await
        }
        Commands::Test { ref device } => {
            let config = load_config(&cli)?;
            cmd_test(&config, device.clone()).await
        }
        Commands::Status => {
            let config = load_config(&cli)?;
            cmd_status(&config).await
        }
        Commands::History {
            ref device,
            limit,
        } => {
            let config = load_config(&cli)?;
            cmd_history(&config, device, limit).await
        }
        Commands::Diff { ref device } => {
            let config = load_config(&cli)?;
            cmd_diff(&config, device).await
        }
        Commands::ListDevices => {
            let config = load_config(&cli)?;
            cmd_list_devices(&config)
        }
        Commands::Schedule { daemon } => {
            let config = load_config(&cli)?;
            cmd_schedule(config, daemon).await
        }
        Commands::TestNotifications { email, slack } => {
            let config = load_config(&cli)?;
            cmd_test_notifications(&config, email, slack).await
        }
    }
}

fn default_level(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Load configuration, then install tracing with settings-aware defaults.
fn load_config(cli: &Cli) -> Result<AppConfig> {
    let config = AppConfig::load(&cli.config_dir).context("failed to load configuration")?;

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::from_str(&config.settings.logging.level).unwrap_or(Level::INFO)
    };
    netvault_core::init_tracing(cli.json || config.settings.logging.json, level);

    Ok(config)
}

/// Build the orchestrator against the configured repository and the SSH
/// session factory.
async fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let repository = Arc::new(
        GitRepository::open_or_init(&config.settings.backup.repository_path)
            .await
            .context("failed to open backup repository")?,
    );
    Ok(Orchestrator::new(
        repository,
        Arc::new(SshSessionFactory),
        OrchestratorConfig::from(&config.settings.backup),
    ))
}

/// Resolve credentials for every selected device. Resolution failures are
/// configuration errors and abort before any job is dispatched.
fn build_targets(config: &AppConfig, filter: &DeviceFilter) -> Result<Vec<BackupTarget>> {
    let registry = DeviceRegistry::new(config.inventory.devices.clone());
    let devices = registry.list(filter).context("device selection failed")?;

    let secrets = EnvSecretProvider;
    let mut targets = Vec::new();
    for device in devices {
        let credential = config
            .inventory
            .resolve_credential(&device.name, &secrets)
            .with_context(|| format!("credential resolution failed for {}", device.name))?;
        targets.push(BackupTarget { device, credential });
    }
    Ok(targets)
}

/// One full backup cycle: select, orchestrate, persist the report, notify.
async fn perform_run(
    config: &AppConfig,
    orchestrator: &Orchestrator,
    filter: &DeviceFilter,
    trigger: TriggerKind,
) -> Result<Report> {
    let targets = build_targets(config, filter)?;
    let run = orchestrator.run(targets, trigger).await;
    let report = Report::build(&run);

    persist_last_run(&config.settings.backup.state_dir, &report)?;

    let secrets = EnvSecretProvider;
    let sinks = sinks_from_settings(&config.settings.notifications, &secrets);
    send_all(&sinks, &report).await;

    Ok(report)
}

async fn cmd_run(
    config: &AppConfig,
    device: Option<String>,
    group: Option<String>,
) -> Result<ExitCode> {
    let (filter, trigger) = match (device, group) {
        (Some(name), _) => (DeviceFilter::Name(name), TriggerKind::Filter),
        (None, Some(group)) => (DeviceFilter::Group(group), TriggerKind::Filter),
        (None, None) => (DeviceFilter::AllEnabled, TriggerKind::Manual),
    };

    let orchestrator = build_orchestrator(config).await?;
    println!("Starting backup operation...");
    let report = perform_run(config, &orchestrator, &filter, trigger).await?;

    println!("\n{}", report.render_text());

    Ok(if report.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_test(config: &AppConfig, device: Option<String>) -> Result<ExitCode> {
    let filter = match device {
        Some(name) => DeviceFilter::Name(name),
        None => DeviceFilter::AllEnabled,
    };
    let targets = build_targets(config, &filter)?;
    let orchestrator = build_orchestrator(config).await?;

    println!("Testing connections to {} device(s)...\n", targets.len());

    let mut failed = 0usize;
    for target in &targets {
        match orchestrator.test_connection(target).await {
            Ok(()) => println!("  ✓ {}", target.device.name),
            Err(err) => {
                failed += 1;
                println!("  ✗ {} ({err})", target.device.name);
            }
        }
    }

    println!(
        "\nResults: {}/{} successful",
        targets.len() - failed,
        targets.len()
    );

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_status(config: &AppConfig) -> Result<ExitCode> {
    match load_last_run(&config.settings.backup.state_dir) {
        Some(report) => {
            println!("\nMost recent run: {}", report.status_line());
            println!("  Run ID:         {}", report.run_id);
            println!("  Trigger:        {}", report.triggered_by);
            if let Some(end) = report.finished_at {
                println!("  Finished:       {}", end.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            println!(
                "  Devices:        {} total, {} changed, {} unchanged, {} first, {} failed",
                report.total_devices,
                report.changed,
                report.unchanged,
                report.first_snapshot,
                report.failed
            );
        }
        None => println!("\nNo runs recorded yet."),
    }

    let repository = GitRepository::open_or_init(&config.settings.backup.repository_path)
        .await
        .context("failed to open backup repository")?;

    let registry = DeviceRegistry::new(config.inventory.devices.clone());
    let devices = registry.list(&DeviceFilter::AllEnabled)?;

    println!("\nBackup status for {} device(s):\n", devices.len());

    let mut rows = Vec::new();
    for device in &devices {
        let history = repository.history(&device.name, 1).await?;
        let (last_backup, marker) = match history.last() {
            Some(meta) => (
                meta.captured_at.format("%Y-%m-%d %H:%M").to_string(),
                "✓".to_string(),
            ),
            None => ("Never".to_string(), "○".to_string()),
        };
        rows.push(vec![
            device.name.clone(),
            device.hostname.clone(),
            summarize_groups(&device.groups),
            last_backup,
            marker,
        ]);
    }

    println!(
        "{}\n",
        render_table(
            &["Device", "Hostname", "Groups", "Last Backup", "Status"],
            &rows
        )
    );

    Ok(ExitCode::SUCCESS)
}

async fn cmd_history(config: &AppConfig, device: &str, limit: usize) -> Result<ExitCode> {
    let registry = DeviceRegistry::new(config.inventory.devices.clone());
    registry.list(&DeviceFilter::Name(device.to_string()))?;

    let repository = GitRepository::open_or_init(&config.settings.backup.repository_path)
        .await
        .context("failed to open backup repository")?;
    let entries = repository.history(device, limit).await?;

    if entries.is_empty() {
        println!("No backup history found for {device}");
        return Ok(ExitCode::SUCCESS);
    }

    println!("\nBackup history for {device} (oldest first):\n");
    for entry in entries {
        println!(
            "  {}  {}",
            entry.captured_at.format("%Y-%m-%d %H:%M:%S"),
            &entry.commit_id[..8.min(entry.commit_id.len())]
        );
        println!("    {}", entry.message);
    }
    println!();

    Ok(ExitCode::SUCCESS)
}

async fn cmd_diff(config: &AppConfig, device: &str) -> Result<ExitCode> {
    let registry = DeviceRegistry::new(config.inventory.devices.clone());
    registry.list(&DeviceFilter::Name(device.to_string()))?;

    let repository = GitRepository::open_or_init(&config.settings.backup.repository_path)
        .await
        .context("failed to open backup repository")?;

    match repository.diff_latest(device).await? {
        Some(diff) => {
            println!("\nLatest changes for {device}:\n");
            println!("{diff}");
        }
        None => println!("No recorded changes for {device}"),
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_list_devices(config: &AppConfig) -> Result<ExitCode> {
    let devices = &config.inventory.devices;
    println!("\nConfigured devices ({}):\n", devices.len());

    let rows: Vec<Vec<String>> = devices
        .iter()
        .map(|device| {
            vec![
                device.name.clone(),
                device.hostname.clone(),
                device.device_type.clone(),
                summarize_groups(&device.groups),
                if device.enabled { "Yes" } else { "No" }.to_string(),
            ]
        })
        .collect();

    println!(
        "{}\n",
        render_table(&["Name", "Hostname", "Type", "Groups", "Enabled"], &rows)
    );

    Ok(ExitCode::SUCCESS)
}

/// Shared state for scheduler-triggered runs.
struct RunContext {
    config: AppConfig,
    orchestrator: Orchestrator,
}

async fn scheduled_backup(ctx: Arc<RunContext>) {
    info!("running scheduled backup");
    match perform_run(
        &ctx.config,
        &ctx.orchestrator,
        &DeviceFilter::AllEnabled,
        TriggerKind::Schedule,
    )
    .await
    {
        Ok(report) => info!(status = report.status_line(), "scheduled backup completed"),
        Err(err) => error!(error = %format!("{err:#}"), "scheduled backup failed"),
    }
}

async fn cmd_schedule(config: AppConfig, daemon: bool) -> Result<ExitCode> {
    if !config.settings.schedule.enabled {
        bail!("scheduling is disabled; enable it in settings.yaml");
    }

    let orchestrator = build_orchestrator(&config).await?;
    let cron_expression = config.settings.schedule.cron_expression.clone();
    let ctx = Arc::new(RunContext {
        config,
        orchestrator,
    });

    if daemon {
        let mut scheduler = Scheduler::new();
        scheduler.arm(&cron_expression)?;
        println!("Starting scheduler daemon (cron: {cron_expression})...");
        scheduler
            .run_daemon(move || {
                let ctx = Arc::clone(&ctx);
                async move { scheduled_backup(ctx).await }
            })
            .await?;
        Ok(ExitCode::SUCCESS)
    } else {
        println!("Running one-time scheduled backup...");
        let report = perform_run(
            &ctx.config,
            &ctx.orchestrator,
            &DeviceFilter::AllEnabled,
            TriggerKind::Schedule,
        )
        .await?;
        println!("\n{}", report.render_text());
        Ok(if report.all_succeeded() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}

async fn cmd_test_notifications(
    config: &AppConfig,
    email: bool,
    slack: bool,
) -> Result<ExitCode> {
    if !email && !slack {
        bail!("specify --email or --slack");
    }

    let secrets = EnvSecretProvider;
    let report = synthetic_report();

    if email {
        println!("Sending test email...");
        let sink = EmailSink::new(config.settings.notifications.email.clone(), &secrets)?;
        sink.deliver(&report)
            .await
            .context("test email delivery failed")?;
        println!("  ✓ Test email sent");
    }

    if slack {
        println!("Sending test Slack message...");
        let sink = SlackSink::new(&config.settings.notifications.slack, &secrets)?;
        sink.deliver(&report)
            .await
            .context("test Slack delivery failed")?;
        println!("  ✓ Test Slack message sent");
    }

    Ok(ExitCode::SUCCESS)
}

async fn cmd_init(config_dir: &Path, repo_path: Option<PathBuf>) -> Result<ExitCode> {
    println!("Initializing netvault...");

    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("cannot create {}", config_dir.display()))?;

    let devices_file = config_dir.join("devices.yaml");
    if devices_file.exists() {
        println!("  - {} already exists, leaving it alone", devices_file.display());
    } else {
        std::fs::write(&devices_file, DEVICES_EXAMPLE)?;
        println!("  ✓ Created {}", devices_file.display());
    }

    let settings_file = config_dir.join("settings.yaml");
    if settings_file.exists() {
        println!("  - {} already exists, leaving it alone", settings_file.display());
    } else {
        std::fs::write(&settings_file, SETTINGS_EXAMPLE)?;
        println!("  ✓ Created {}", settings_file.display());
    }

    let settings = netvault_core::BackupSettings::default();
    let repo_path = repo_path.unwrap_or(settings.repository_path);
    GitRepository::open_or_init(&repo_path)
        .await
        .context("failed to initialize backup repository")?;
    println!("  ✓ Initialized backup repository at {}", repo_path.display());

    std::fs::create_dir_all(&settings.state_dir)?;
    println!("  ✓ Created state directory at {}", settings.state_dir.display());

    println!("\nSetup complete. Next steps:");
    println!("  1. Edit {} to describe your fleet", devices_file.display());
    println!("  2. Edit {} to tune settings", settings_file.display());
    println!("  3. Export the credential environment variables named in devices.yaml");
    println!("  4. Test connectivity: netvault test");
    println!("  5. Run the first backup: netvault run");

    Ok(ExitCode::SUCCESS)
}

/// An empty finalized run, used to exercise notification channels.
fn synthetic_report() -> Report {
    let mut run = BackupRun::new(TriggerKind::Manual, Vec::new(), Utc::now());
    run.finalize();
    Report::build(&run)
}

fn persist_last_run(state_dir: &Path, report: &Report) -> Result<()> {
    std::fs::create_dir_all(state_dir)
        .with_context(|| format!("cannot create {}", state_dir.display()))?;
    let path = state_dir.join("last_run.json");
    std::fs::write(&path, serde_json::to_string_pretty(report)?)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}

fn load_last_run(state_dir: &Path) -> Option<Report> {
    let raw = std::fs::read_to_string(state_dir.join("last_run.json")).ok()?;
    serde_json::from_str(&raw).ok()
}

fn summarize_groups(groups: &[String]) -> String {
    let mut summary = groups
        .iter()
        .take(2)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if groups.len() > 2 {
        summary.push_str("...");
    }
    summary
}

/// Fixed-width ASCII table.
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let separator = format!(
        "+{}+",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );
    let render_row = |cells: &[String]| {
        let body = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| format!(" {:<width$} ", cell, width = widths[i]))
            .collect::<Vec<_>>()
            .join("|");
        format!("|{body}|")
    };

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let mut lines = vec![separator.clone(), render_row(&header_cells), separator.clone()];
    for row in rows {
        lines.push(render_row(row));
    }
    lines.push(separator);
    lines.join("\n")
}
