//! CLI command implementations
//!
//! Commands are one-shot: load config, open the topology file, do one
//! thing, print one JSON object, exit.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::observability::{log_event, Event, Logger, Severity};
use crate::reparent::{ReparentConfig, ReparentCoordinator, ReparentOutcome};
use crate::topology::{LocalCluster, ShardPath, TabletPath, TopologyStore};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Topology file (required). Relative paths resolve against the
    /// config file's directory.
    pub topology_file: String,

    /// Per-replica redirect deadline (optional, default 30s)
    #[serde(default = "default_redirect_timeout_ms")]
    pub redirect_timeout_ms: u64,

    /// Force flag for scrapping the failed master (optional, default false)
    #[serde(default)]
    pub scrap_force: bool,

    /// Minimum log severity (optional, default "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_redirect_timeout_ms() -> u64 {
    30_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let mut config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.topology_file.trim().is_empty() {
            return Err(CliError::config_error("topology_file must not be empty"));
        }

        self.severity()?;

        self.to_reparent_config()
            .validate()
            .map_err(|e| CliError::config_error(format!("Reparent config error: {}", e)))?;

        Ok(())
    }

    /// Topology file path, resolved against the config file location.
    pub fn topology_path(&self) -> PathBuf {
        let path = Path::new(&self.topology_file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn severity(&self) -> CliResult<Severity> {
        self.log_level
            .parse()
            .map_err(|e: String| CliError::config_error(format!("Invalid log_level: {}", e)))
    }

    pub fn to_reparent_config(&self) -> ReparentConfig {
        ReparentConfig::default()
            .with_redirect_timeout(Duration::from_millis(self.redirect_timeout_ms))
            .with_scrap_force(self.scrap_force)
    }
}

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Reparent {
            config,
            shard,
            master_elect,
            force,
            leave_master_read_only,
        } => reparent(&config, &shard, &master_elect, force, leave_master_read_only),
        Command::Show { config, shard } => show(&config, &shard),
    }
}

/// Run a reparent and print its summary.
///
/// Fatal errors are printed as an error object and returned, so the
/// process exits non-zero.
pub fn reparent(
    config_path: &Path,
    shard: &str,
    master_elect: &str,
    force: bool,
    leave_master_read_only: bool,
) -> CliResult<()> {
    let config = load_config(config_path)?;

    match execute_reparent(&config, shard, master_elect, force, leave_master_read_only) {
        Ok(outcome) => {
            let summary = serde_json::to_value(outcome.summary())?;
            write_response(summary)
        }
        Err(e) => {
            write_error(e.code_str(), e.message())?;
            Err(e)
        }
    }
}

/// Run one reparent against the configured topology file.
pub fn execute_reparent(
    config: &Config,
    shard: &str,
    master_elect: &str,
    force: bool,
    leave_master_read_only: bool,
) -> CliResult<ReparentOutcome> {
    let shard = ShardPath::parse(shard).map_err(|e| CliError::invalid_argument(e.to_string()))?;
    let master_elect =
        TabletPath::parse(master_elect).map_err(|e| CliError::invalid_argument(e.to_string()))?;

    let store = open_store(config)?;
    let cluster = Arc::new(LocalCluster::new(store));
    let request = cluster.build_request(&shard, &master_elect, force, leave_master_read_only)?;

    let reparent_config = config.to_reparent_config();
    let coordinator =
        ReparentCoordinator::new(cluster.collaborators(&reparent_config), reparent_config);

    log_event(
        Event::ReparentRequested,
        &[
            ("shard", shard.as_str()),
            ("master_elect", master_elect.as_str()),
            ("mode", request.mode.as_str()),
        ],
    );

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::io_error(format!("Failed to start runtime: {}", e)))?;

    match runtime.block_on(coordinator.reparent(request)) {
        Ok(outcome) => {
            let operation_id = outcome.operation_id.to_string();
            let event = if outcome.is_degraded() {
                Event::ReparentDegraded
            } else {
                Event::ReparentSucceeded
            };
            log_event(
                event,
                &[
                    ("operation_id", operation_id.as_str()),
                    ("shard", shard.as_str()),
                    ("new_master", outcome.new_master.path.as_str()),
                ],
            );
            Ok(outcome)
        }
        Err(e) => {
            let message = e.to_string();
            log_event(
                Event::ReparentFailed,
                &[
                    ("shard", shard.as_str()),
                    ("kind", e.kind.as_str()),
                    ("error", message.as_str()),
                ],
            );
            Err(CliError::from(e))
        }
    }
}

/// Print a shard's record and tablets.
pub fn show(config_path: &Path, shard: &str) -> CliResult<()> {
    let config = load_config(config_path)?;
    let view = shard_view(&config, shard)?;
    write_response(view)
}

/// JSON view of one shard.
pub fn shard_view(config: &Config, shard: &str) -> CliResult<Value> {
    let shard = ShardPath::parse(shard).map_err(|e| CliError::invalid_argument(e.to_string()))?;
    let store = open_store(config)?;
    let entry = store.shard_entry(&shard)?;

    Ok(json!({
        "shard": shard,
        "record": entry.record,
        "tablets": entry.tablets.values().collect::<Vec<_>>(),
    }))
}

fn load_config(config_path: &Path) -> CliResult<Config> {
    let config = Config::load(config_path)?;
    Logger::set_min_severity(config.severity()?);

    let path = config_path.display().to_string();
    log_event(Event::ConfigLoaded, &[("path", path.as_str())]);
    Ok(config)
}

fn open_store(config: &Config) -> CliResult<Arc<TopologyStore>> {
    let path = config.topology_path();
    let display = path.display().to_string();

    match TopologyStore::open(&path) {
        Ok(store) => {
            log_event(Event::TopologyLoaded, &[("path", display.as_str())]);
            Ok(Arc::new(store))
        }
        Err(e) => {
            let message = e.to_string();
            log_event(
                Event::TopologyLoadFailed,
                &[("path", display.as_str()), ("error", message.as_str())],
            );
            Err(CliError::from(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::errors::CliErrorCode;
    use super::*;
    use crate::topology::{
        ReplicationPosition, Tablet, TabletHealth, TabletRole, TopologyDocument,
    };
    use tempfile::TempDir;

    fn tablet(path: &str, role: TabletRole) -> Tablet {
        Tablet::new(
            TabletPath::parse(path).unwrap(),
            ShardPath::parse("commerce/0").unwrap(),
            role,
        )
        .with_address(format!("{}.db:3306", path))
        .with_position(ReplicationPosition::new(2, 50))
    }

    fn create_setup(temp_dir: &TempDir) -> PathBuf {
        let parent = TabletPath::parse("zone1-100").unwrap();
        let document = TopologyDocument::new()
            .with_tablet(tablet("zone1-100", TabletRole::Master).with_health(TabletHealth::Failed))
            .unwrap()
            .with_tablet(tablet("zone1-101", TabletRole::Replica).with_parent(parent.clone()))
            .unwrap()
            .with_tablet(tablet("zone1-102", TabletRole::Replica).with_parent(parent))
            .unwrap();
        TopologyStore::create(temp_dir.path().join("topology.json"), document).unwrap();

        let config_path = temp_dir.path().join("shardwrangler.json");
        let config = json!({
            "topology_file": "topology.json",
            "redirect_timeout_ms": 2000
        });
        fs::write(&config_path, config.to_string()).unwrap();
        config_path
    }

    #[test]
    fn test_config_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("shardwrangler.json");
        fs::write(&config_path, r#"{"topology_file": "topo.json"}"#).unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.redirect_timeout_ms, 30_000);
        assert!(!config.scrap_force);
        assert_eq!(config.severity().unwrap(), Severity::Info);
        assert_eq!(config.topology_path(), temp_dir.path().join("topo.json"));
        assert_eq!(
            config.to_reparent_config().redirect_timeout,
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_config_rejects_zero_timeout() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("shardwrangler.json");
        let config = json!({
            "topology_file": "topology.json",
            "redirect_timeout_ms": 0
        });
        fs::write(&config_path, config.to_string()).unwrap();

        let result = Config::load(&config_path);
        assert_eq!(result.unwrap_err().code(), &CliErrorCode::ConfigError);
    }

    #[test]
    fn test_config_rejects_unknown_log_level() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("shardwrangler.json");
        let config = json!({
            "topology_file": "topology.json",
            "log_level": "chatty"
        });
        fs::write(&config_path, config.to_string()).unwrap();

        assert!(Config::load(&config_path).is_err());
    }

    #[test]
    fn test_execute_reparent_updates_topology_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_setup(&temp_dir);
        let config = Config::load(&config_path).unwrap();

        let outcome = execute_reparent(&config, "commerce/0", "zone1-101", false, false).unwrap();
        assert_eq!(outcome.new_master.path.as_str(), "zone1-101");
        assert!(!outcome.is_degraded());

        let view = shard_view(&config, "commerce/0").unwrap();
        assert_eq!(view["record"]["master"], "zone1-101");
        assert_eq!(view["record"]["majority_restart"], true);
    }

    #[test]
    fn test_execute_reparent_rejects_bad_arguments() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_setup(&temp_dir);
        let config = Config::load(&config_path).unwrap();

        let result = execute_reparent(&config, "commerce", "zone1-101", false, false);
        assert_eq!(result.unwrap_err().code(), &CliErrorCode::InvalidArgument);
    }

    #[test]
    fn test_execute_reparent_reports_fatal_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_setup(&temp_dir);
        let config = Config::load(&config_path).unwrap();

        // The failed master is not a member of its own replica set
        let result = execute_reparent(&config, "commerce/0", "zone1-100", false, false);
        assert_eq!(result.unwrap_err().code(), &CliErrorCode::ReparentFailed);
    }

    #[test]
    fn test_missing_topology_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("shardwrangler.json");
        fs::write(&config_path, r#"{"topology_file": "absent.json"}"#).unwrap();
        let config = Config::load(&config_path).unwrap();

        let result = shard_view(&config, "commerce/0");
        assert_eq!(result.unwrap_err().code(), &CliErrorCode::TopologyError);
    }
}
