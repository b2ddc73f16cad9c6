//! dirplug: inspect a directory of plugin manifests
//!
//! ```text
//! dirplug list --dir ./plugins
//! dirplug resolve WorkflowStep:copy
//! dirplug watch --rescan-interval-ms 5000
//! ```

mod tracing_support;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use dirplug_host::discovery::default_plugin_dir;
use dirplug_host::formats::ManifestFormat;
use dirplug_host::{
    DirPluginScanner, PluginDirProvider, ProviderIdent, ScannerConfig, StaticDirProvider,
    WatchedDirProvider,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_support::{TracingConfig, TracingFormat};

const APP_NAME: &str = "dirplug";

#[derive(Debug, Parser)]
#[command(name = "dirplug", version, about = "Inspect a directory of plugin manifests")]
struct Cli {
    /// Plugin directory (defaults to the platform plugin directory)
    #[arg(long, short, env = "DIRPLUG_DIR", global = true)]
    dir: Option<PathBuf>,

    /// Scanner configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimum time between rescans without a change notification
    #[arg(long, env = "DIRPLUG_RESCAN_INTERVAL_MS", global = true)]
    rescan_interval_ms: Option<u64>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    log_format: LogFormat,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List every provider and the manifest providing it
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the manifest providing SERVICE:NAME
    Resolve { ident: ProviderIdent },

    /// Watch the directory and print changes to the provider index
    Watch {
        /// How often to query the scanner
        #[arg(long, default_value_t = 1000)]
        poll_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormat> for TracingFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Pretty => TracingFormat::Pretty,
            LogFormat::Compact => TracingFormat::Compact,
            LogFormat::Json => TracingFormat::Json,
        }
    }
}

/// One row of the provider index
#[derive(Debug, Serialize)]
struct IndexEntry {
    ident: String,
    version: Option<String>,
    path: PathBuf,
}

impl Cli {
    fn tracing_config(&self) -> TracingConfig {
        let level = match self.verbose {
            0 => None,
            1 => Some(tracing::Level::DEBUG),
            _ => Some(tracing::Level::TRACE),
        };
        TracingConfig {
            level,
            format: self.log_format.into(),
            ..Default::default()
        }
    }

    fn scanner_config(&self) -> Result<ScannerConfig> {
        let mut config = match &self.config {
            Some(path) => ScannerConfig::from_json_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => ScannerConfig::default(),
        };
        if let Some(ms) = self.rescan_interval_ms {
            config.rescan_interval_ms = ms;
        }
        Ok(config)
    }

    fn plugin_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| default_plugin_dir(APP_NAME))
    }
}

fn collect_entries(scanner: &DirPluginScanner<ManifestFormat>) -> Result<Vec<IndexEntry>> {
    let entries = scanner
        .snapshot()?
        .into_iter()
        .map(|(ident, path, loader)| IndexEntry {
            ident: ident.to_string(),
            version: loader.manifest().version.clone(),
            path,
        })
        .collect();
    Ok(entries)
}

fn list(scanner: &DirPluginScanner<ManifestFormat>, json: bool) -> Result<()> {
    let entries = collect_entries(scanner)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in entries {
        println!(
            "{}\t{}\t{}",
            entry.ident,
            entry.version.as_deref().unwrap_or("-"),
            entry.path.display()
        );
    }
    Ok(())
}

fn resolve(scanner: &DirPluginScanner<ManifestFormat>, ident: &ProviderIdent) -> Result<()> {
    match scanner.resolve(ident)? {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => bail!("No plugin in {} provides {}", scanner.plugin_dir().display(), ident),
    }
}

fn watch(scanner: &DirPluginScanner<ManifestFormat>, poll: Duration) -> Result<()> {
    let mut previous: BTreeMap<String, PathBuf> = BTreeMap::new();
    loop {
        let current: BTreeMap<String, PathBuf> = match collect_entries(scanner) {
            Ok(entries) => entries.into_iter().map(|e| (e.ident, e.path)).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Scan failed, keeping previous index");
                std::thread::sleep(poll);
                continue;
            }
        };

        for (ident, path) in &current {
            match previous.get(ident) {
                None => println!("+ {}\t{}", ident, path.display()),
                Some(old) if old != path => println!("~ {}\t{}", ident, path.display()),
                Some(_) => {}
            }
        }
        for ident in previous.keys().filter(|ident| !current.contains_key(*ident)) {
            println!("- {}", ident);
        }

        previous = current;
        std::thread::sleep(poll);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_support::init_subscriber(&cli.tracing_config())
        .context("Failed to initialize logging")?;

    let dir = cli.plugin_dir();
    let config = cli.scanner_config()?;
    tracing::debug!(dir = %dir.display(), ?config, "Starting scanner");

    let provider: Arc<dyn PluginDirProvider> = match cli.command {
        Command::Watch { .. } => Arc::new(WatchedDirProvider::new(&dir)?),
        _ => Arc::new(StaticDirProvider::new(&dir)),
    };
    let scanner = DirPluginScanner::new(provider, ManifestFormat, config);

    match &cli.command {
        Command::List { json } => list(&scanner, *json),
        Command::Resolve { ident } => resolve(&scanner, ident),
        Command::Watch { poll_ms } => watch(&scanner, Duration::from_millis(*poll_ms)),
    }
}
