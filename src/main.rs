use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use mirador::config::{Config, ConfigError};
use mirador::core::profile::{DEFAULT_HOST, DEFAULT_PORT};
use mirador::monitor::MonitorStatus;
use mirador::utils::{format_bytes, format_duration, format_uptime};
use mirador::{ConnectionProfile, Mirador, ServerSnapshot};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "mirador")]
#[command(about = "Browse, edit and monitor Redis-compatible key-value servers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "Mirador Team")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    target: TargetArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Which server to talk to
#[derive(Args, Debug, Clone)]
struct TargetArgs {
    /// Server host name or address
    #[arg(long, global = true, default_value = DEFAULT_HOST)]
    host: String,
    /// Server port
    #[arg(long, global = true, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Server password
    #[arg(long, global = true)]
    password: Option<String>,
    /// Logical database index
    #[arg(long, global = true, default_value_t = 0)]
    db: i64,
    /// Connect over TLS
    #[arg(long, global = true)]
    tls: bool,
    /// Use a saved profile (by name or id) instead of the flags above
    #[arg(short, long, global = true)]
    profile: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Data(DataCommand),
    /// Manage saved connection profiles
    Profiles {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Generate an example configuration file
    Config {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate the configuration file given with --config
    Validate,
    /// Show version information
    Version,
}

/// Commands that need a live connection
#[derive(Subcommand)]
enum DataCommand {
    /// List keys matching a glob pattern
    Keys {
        /// Glob pattern (defaults to the configured pattern)
        pattern: Option<String>,
    },
    /// Print the string value of a key
    Get { key: String },
    /// Store a string value
    Set {
        key: String,
        value: String,
        /// Expire the key after this many seconds
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Delete a key
    Del { key: String },
    /// Print a server statistics snapshot
    Info,
    /// Poll server statistics until interrupted
    Monitor {
        /// Stop after this many snapshots
        #[arg(long)]
        ticks: Option<u64>,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List saved profiles
    List,
    /// Save the connection flags as a named profile
    Add { name: String },
    /// Remove a profile by name or id
    Remove { profile: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Data(command) => {
            run_data_command(cli.config.as_deref(), &cli.target, command).await?;
        }
        Commands::Profiles { action } => {
            manage_profiles(cli.config.as_deref(), &cli.target, action).await?;
        }
        Commands::Config { output } => {
            generate_config(output)?;
        }
        Commands::Validate => {
            validate_config(cli.config.as_deref())?;
        }
        Commands::Version => {
            show_version();
        }
    }

    Ok(())
}

async fn open(config_path: Option<&Path>) -> Result<Mirador> {
    let mirador = match config_path {
        Some(path) => Mirador::from_config_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Mirador::with_redis(Config::default()),
    };
    init_logging(mirador.config())?;

    mirador.profiles().load().await;
    Ok(mirador)
}

async fn run_data_command(
    config_path: Option<&Path>,
    target: &TargetArgs,
    command: DataCommand,
) -> Result<()> {
    let mirador = open(config_path).await?;
    let profile = resolve_profile(&mirador, target).await?;

    info!(
        "Connecting to {}:{} (database {})",
        profile.host, profile.port, profile.database
    );
    if !mirador.session().connect(profile.clone()).await {
        bail!("Could not connect to {}:{}", profile.host, profile.port);
    }

    let result = match command {
        DataCommand::Keys { pattern } => list_keys(&mirador, pattern.as_deref()).await,
        DataCommand::Get { key } => get_value(&mirador, &key).await,
        DataCommand::Set { key, value, ttl } => {
            set_value(&mirador, &key, &value, ttl.map(Duration::from_secs)).await
        }
        DataCommand::Del { key } => delete_key(&mirador, &key).await,
        DataCommand::Info => {
            print_snapshot(&mirador.stats().collect().await);
            Ok(())
        }
        DataCommand::Monitor { ticks } => monitor(&mirador, ticks).await,
    };

    mirador.session().disconnect().await;
    result
}

async fn resolve_profile(mirador: &Mirador, target: &TargetArgs) -> Result<ConnectionProfile> {
    match &target.profile {
        Some(wanted) => find_profile(mirador, wanted)
            .await
            .ok_or_else(|| anyhow!("No saved profile named {:?}", wanted)),
        None => Ok(profile_from_flags("command line", target)),
    }
}

async fn find_profile(mirador: &Mirador, wanted: &str) -> Option<ConnectionProfile> {
    match mirador.profiles().find_by_name(wanted).await {
        Some(profile) => Some(profile),
        None => mirador.profiles().get(wanted).await,
    }
}

fn profile_from_flags(name: &str, target: &TargetArgs) -> ConnectionProfile {
    let mut profile = ConnectionProfile::new(name, target.host.clone(), target.port)
        .with_database(target.db)
        .with_tls(target.tls);
    if let Some(password) = &target.password {
        profile = profile.with_password(password.clone());
    }
    profile
}

async fn list_keys(mirador: &Mirador, pattern: Option<&str>) -> Result<()> {
    let keys = mirador.keys(pattern).await;

    println!("{:<40} {:<10} {:>10} {:>12}", "KEY", "TYPE", "SIZE", "TTL");
    for key in &keys {
        let ttl = key
            .ttl
            .map(format_duration)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<40} {:<10} {:>10} {:>12}",
            key.name,
            key.key_type,
            format_bytes(key.size),
            ttl
        );
    }
    println!("{} keys", keys.len());
    Ok(())
}

async fn get_value(mirador: &Mirador, key: &str) -> Result<()> {
    match mirador.values().get(key).await {
        Some(value) => println!("{}", value),
        None => println!("(nil)"),
    }
    Ok(())
}

async fn set_value(mirador: &Mirador, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
    if !mirador.values().set(key, value, ttl).await {
        bail!("Failed to set {}", key);
    }
    println!("OK");
    Ok(())
}

async fn delete_key(mirador: &Mirador, key: &str) -> Result<()> {
    let removed = mirador.values().delete(key).await;
    println!("(integer) {}", u8::from(removed));
    Ok(())
}

async fn monitor(mirador: &Mirador, ticks: Option<u64>) -> Result<()> {
    let mut snapshots = mirador.monitor().subscribe();
    let mut status = mirador.monitor().subscribe_status();

    if !mirador.monitor().start() {
        bail!("Monitoring is already running");
    }
    info!(
        "Monitoring every {}, press Ctrl-C to stop",
        format_duration(mirador.monitor().interval())
    );

    let mut seen = 0u64;
    let outcome = loop {
        tokio::select! {
            received = snapshots.recv() => match received {
                Ok(snapshot) => {
                    print_snapshot(&snapshot);
                    seen += 1;
                    if ticks.is_some_and(|limit| seen >= limit) {
                        break Ok(());
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} snapshots", skipped),
                Err(RecvError::Closed) => break Ok(()),
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = status.borrow_and_update().clone();
                if let MonitorStatus::Failed { .. } = current {
                    break Err(anyhow!("{}", current));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break Ok(());
            }
        }
    };

    mirador.monitor().stop();
    outcome
}

fn print_snapshot(snapshot: &ServerSnapshot) {
    if snapshot.is_empty() {
        println!("No server statistics available");
        return;
    }

    println!("Version:     {}", snapshot.version);
    println!("Uptime:      {}", format_uptime(snapshot.uptime_seconds));
    println!("Memory:      {}", format_bytes(snapshot.used_memory));
    println!("Clients:     {}", snapshot.connected_clients);
    println!("Keys:        {}", snapshot.total_keys);
    println!("Commands:    {}", snapshot.total_commands_processed);
    println!();
}

async fn manage_profiles(
    config_path: Option<&Path>,
    target: &TargetArgs,
    action: ProfileAction,
) -> Result<()> {
    let mirador = open(config_path).await?;
    if mirador.config().profiles.file.is_none() {
        warn!("No profiles file configured; changes last for this run only");
    }

    match action {
        ProfileAction::List => {
            for profile in mirador.profiles().list().await {
                println!(
                    "{:<24} {}:{} db={}{}  ({})",
                    profile.name,
                    profile.host,
                    profile.port,
                    profile.database,
                    if profile.use_tls { " tls" } else { "" },
                    profile.id
                );
            }
        }
        ProfileAction::Add { name } => {
            let profile = profile_from_flags(&name, target);
            println!("Saved profile {} ({})", profile.name, profile.id);
            mirador.profiles().add(profile).await;
        }
        ProfileAction::Remove { profile } => {
            let found = find_profile(&mirador, &profile)
                .await
                .ok_or_else(|| anyhow!("No saved profile named {:?}", profile))?;
            mirador.profiles().remove(&found.id).await;
            println!("Removed profile {}", found.name);
        }
    }

    Ok(())
}

fn generate_config(output: PathBuf) -> Result<()> {
    println!("Generating configuration file: {:?}", output);

    Config::create_example_config(&output).context("Failed to generate config")?;

    println!("Configuration file generated successfully!");
    println!("Edit the file to match your environment and run:");
    println!("  mirador --config {:?} info", output);

    Ok(())
}

fn validate_config(config_path: Option<&Path>) -> Result<()> {
    let config_path = config_path.ok_or_else(|| anyhow!("validate needs --config <path>"))?;
    println!("Validating configuration file: {:?}", config_path);

    match Config::load_from_file(config_path) {
        Ok(config) => {
            println!("✓ Configuration file is valid");
            println!(
                "  Timeouts (ms): connect={} send={} receive={}",
                config.session.connect_timeout_ms,
                config.session.send_timeout_ms,
                config.session.receive_timeout_ms
            );
            println!(
                "  Catalog: pattern={:?} scan_count={}",
                config.catalog.default_pattern, config.catalog.scan_count
            );
            println!("  Monitor interval: {}ms", config.monitor.interval_ms);
            match &config.profiles.file {
                Some(file) => println!("  Profiles file: {}", file),
                None => println!("  Profiles file: (none, in-memory only)"),
            }
        }
        Err(e) => {
            eprintln!("✗ Configuration file validation failed:");
            match &e {
                ConfigError::IoError(msg) => eprintln!("  File error: {}", msg),
                ConfigError::ParseError(msg) => eprintln!("  Parse error: {}", msg),
                ConfigError::ValidationError(msg) => eprintln!("  Validation error: {}", msg),
                ConfigError::SerializeError(msg) => eprintln!("  Serialization error: {}", msg),
            }
            return Err(e.into());
        }
    }

    Ok(())
}

fn show_version() {
    println!("mirador v{}", env!("CARGO_PKG_VERSION"));
    println!("Browse, edit and monitor Redis-compatible key-value servers");
    println!();
    println!("Target: {}", std::env::consts::ARCH);
    println!(
        "TLS support: {}",
        if cfg!(feature = "tls") { "enabled" } else { "disabled" }
    );
}

fn init_logging(config: &Config) -> Result<()> {
    let log_level = match config.logging.level.as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };

    if config.logging.format == "json" {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log_level)
            .try_init()?;
    }

    info!("Logging initialized at level: {:?}", log_level);
    Ok(())
}
