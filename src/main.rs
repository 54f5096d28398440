use anyhow::{Context, Result};
use chart_harvester::config::Settings;
use chart_harvester::harvest::{default_registry, HarvestOrchestrator, HarvestRequest, PLATFORM_IDS};
use chart_harvester::model::PlatformSnapshot;
use chart_harvester::report::{self, MockPolicy};
use chart_harvester::store::{SnapshotStore, SqliteSnapshotStore};
use chart_harvester::{export, logging};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::num::{NonZeroU64, NonZeroUsize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "Harvest music charts and derive economic indicators")]
struct CliArgs {
    /// TOML settings file. Every section is optional.
    #[arg(long, env = "CHART_HARVESTER_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path, overriding the settings.
    #[arg(long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered platforms.
    Platforms,

    /// Run one harvest cycle and print its summary.
    Run {
        /// Platform id to harvest; repeat for several. Defaults to all.
        #[arg(long = "platform")]
        platforms: Vec<String>,

        /// Maximum tracks per platform.
        #[arg(long)]
        limit: Option<NonZeroUsize>,

        /// Per-platform deadline in seconds.
        #[arg(long)]
        timeout_secs: Option<NonZeroU64>,

        /// Collectors allowed to run at once.
        #[arg(long)]
        concurrency: Option<NonZeroUsize>,
    },

    /// Most recent snapshots, newest first.
    Recent {
        #[arg(long)]
        platform: Option<String>,

        /// Only snapshots retrieved at or after this RFC 3339 timestamp.
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        #[arg(long, default_value = "10")]
        limit: NonZeroUsize,
    },

    /// Snapshot history of one platform, newest first.
    History {
        platform: String,

        #[arg(long, default_value = "10")]
        limit: NonZeroUsize,
    },

    /// Write the latest chart of every platform as CSV.
    Export {
        /// Output file; stdout when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Whether mock-tier snapshots are exported (include|exclude).
        #[arg(long, default_value = "include")]
        mock: MockPolicy,
    },

    /// Economic indicators over the latest snapshot of every platform.
    Kpis {
        /// Whether mock-tier snapshots count (include|exclude).
        #[arg(long, default_value = "exclude")]
        mock: MockPolicy,

        /// Number of artists in the leaderboard.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

#[derive(Serialize)]
struct KpiOutput {
    #[serde(flatten)]
    report: report::KpiReport,
    top_artists: Vec<report::ArtistStanding>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_store(settings: &Settings) -> Result<SqliteSnapshotStore> {
    SqliteSnapshotStore::open(&settings.database_path).with_context(|| {
        format!(
            "Failed to open snapshot store at {}",
            settings.database_path.display()
        )
    })
}

fn latest(store: &SqliteSnapshotStore, policy: MockPolicy) -> Result<Vec<PlatformSnapshot>> {
    Ok(store
        .latest_per_platform()
        .context("Failed to read latest snapshots")?
        .into_iter()
        .filter(|s| policy.admits(s))
        .collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let mut settings =
        Settings::load(cli_args.config.as_deref()).context("Failed to load settings")?;
    if let Some(database) = cli_args.database {
        settings.database_path = database;
    }

    logging::init_tracing(&settings.log_level)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))?;

    let registry = default_registry(&settings).context("Invalid collector registry")?;

    match cli_args.command {
        Command::Platforms => print_json(&registry.list()),
        Command::Run {
            platforms,
            limit,
            timeout_secs,
            concurrency,
        } => {
            let mut request = HarvestRequest::from_settings(&settings.harvest)?;
            if !platforms.is_empty() {
                request = request.with_filter(platforms);
            }
            if let Some(limit) = limit {
                request = request.with_limit(limit);
            }
            if let Some(secs) = timeout_secs {
                request = request.with_timeout(Duration::from_secs(secs.get()));
            }
            if let Some(concurrency) = concurrency {
                request = request.with_concurrency(concurrency);
            }

            let store = open_store(&settings)?;
            let orchestrator = HarvestOrchestrator::new(Arc::new(registry), Arc::new(store));
            let result = orchestrator.run_harvest(&request).await?;
            let summary = result.summary();
            info!(outcome = ?summary.outcome, "Harvest complete");
            print_json(&summary)
        }
        Command::Recent {
            platform,
            since,
            limit,
        } => print_json(&open_store(&settings)?.recent(platform.as_deref(), since, limit)?),
        Command::History { platform, limit } => {
            if !PLATFORM_IDS.contains(&platform.as_str()) {
                anyhow::bail!("Unknown platform '{}'", platform);
            }
            print_json(&open_store(&settings)?.history(&platform, limit)?)
        }
        Command::Export { output, mock } => {
            let snapshots = latest(&open_store(&settings)?, mock)?;
            match output {
                Some(path) => {
                    let rows = export::write_csv_file(&snapshots, &path)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(rows, path = %path.display(), "Exported chart");
                }
                None => {
                    export::write_csv(&snapshots, std::io::stdout().lock())?;
                }
            }
            Ok(())
        }
        Command::Kpis { mock, top } => {
            let snapshots = latest(&open_store(&settings)?, MockPolicy::Include)?;
            print_json(&KpiOutput {
                report: report::kpi_report(&snapshots, mock, &settings.economics),
                top_artists: report::top_artists(&snapshots, mock, top),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_timeout_is_rejected() {
        let parsed = CliArgs::try_parse_from(["chart-harvester", "run", "--timeout-secs", "0"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_run_flags_parse() {
        let cli = CliArgs::try_parse_from([
            "chart-harvester",
            "run",
            "--platform",
            "deezer",
            "--platform",
            "turntable",
            "--timeout-secs",
            "5",
        ])
        .unwrap();
        match cli.command {
            Command::Run {
                platforms,
                timeout_secs,
                ..
            } => {
                assert_eq!(platforms, vec!["deezer", "turntable"]);
                assert_eq!(timeout_secs.map(NonZeroU64::get), Some(5));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
