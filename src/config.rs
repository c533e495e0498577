use config::{self, File};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RelayError, Result};
use crate::request::{AcquisitionMode, CollectionRequest, LocalConfig, RemoteConfig};
use crate::sink::{Destination, SinkKind};

/// Prefix for environment variable overrides, e.g. `HOSTRELAY_TOPIC`
pub const ENV_PREFIX: &str = "HOSTRELAY";

/// Where local collection reads from
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// This host's `/proc`
    Local,
    /// A line stream from a remote socket
    #[default]
    Remote,
}

/// Logging level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

/// Resolved connector configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConnectorConfig {
    /// Forward standard input instead of collecting
    #[serde(default)]
    pub pipe: bool,
    /// Local or remote collection
    #[serde(default)]
    pub source_type: SourceType,
    /// Remote socket address (`host:port`)
    #[serde(default = "default_source_addr")]
    pub source_addr: String,
    /// Milliseconds between local snapshots, 0 runs once
    #[serde(default)]
    pub interval_ms: u64,
    /// Root of the proc filesystem to read
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,
    /// Monitoring agent URL, e.g. `http://host:8080`
    #[serde(default)]
    pub agent_url: Option<String>,
    /// Destination kind
    #[serde(default)]
    pub dest: SinkKind,
    /// Comma separated server or broker addresses
    #[serde(default)]
    pub server: String,
    /// Topic to publish under
    #[serde(default)]
    pub topic: String,
    /// Skip writing sent payloads to local files
    #[serde(default = "default_disable_file_save")]
    pub disable_file_save: bool,
    /// Directory for locally persisted payloads
    #[serde(default = "default_persist_dir")]
    pub persist_dir: PathBuf,
    /// Logging level
    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_source_addr() -> String {
    "127.0.0.1:9999".to_string()
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

fn default_disable_file_save() -> bool {
    true
}

fn default_persist_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            pipe: false,
            source_type: SourceType::default(),
            source_addr: default_source_addr(),
            interval_ms: 0,
            proc_root: default_proc_root(),
            agent_url: None,
            dest: SinkKind::default(),
            server: String::new(),
            topic: String::new(),
            disable_file_save: default_disable_file_save(),
            persist_dir: default_persist_dir(),
            log_level: LogLevel::default(),
        }
    }
}

impl ConnectorConfig {
    /// Resolve the configuration into the request for one run
    pub fn collection_request(&self) -> CollectionRequest {
        let mode = if self.pipe {
            AcquisitionMode::Pipe
        } else {
            match self.source_type {
                SourceType::Remote => AcquisitionMode::RemoteStream(RemoteConfig {
                    address: self.source_addr.trim().to_string(),
                }),
                SourceType::Local => AcquisitionMode::Local(LocalConfig {
                    proc_root: self.proc_root.clone(),
                    agent_url: self.agent_url.clone().filter(|u| !u.trim().is_empty()),
                    interval: Duration::from_millis(self.interval_ms),
                }),
            }
        };

        CollectionRequest::new(
            mode,
            Destination {
                kind: self.dest,
                server: self.server.clone(),
                topic: self.topic.clone(),
            },
            self.disable_file_save,
        )
    }
}

/// Source of configuration
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// File path; format chosen by extension
    File(PathBuf),
    /// Environment variables with a prefix
    Environment(String),
    /// TOML string
    Toml(String),
    /// A single key set explicitly, e.g. from the command line
    Override(String, config::Value),
    /// Every field of a serialized default value
    Defaults(config::Config),
}

/// Map a file extension onto a config format
fn file_format(path: &Path) -> Result<config::FileFormat> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .ok_or_else(|| {
            RelayError::Config(format!("Configuration file has no extension: {}", path.display()))
        })?;

    match extension.as_str() {
        "toml" => Ok(config::FileFormat::Toml),
        "json" => Ok(config::FileFormat::Json),
        "yaml" | "yml" => Ok(config::FileFormat::Yaml),
        format => Err(RelayError::Config(format!("Unsupported config format: {}", format))),
    }
}

/// Load configuration from sources applied in order; later sources win
pub fn load_config<T>(sources: Vec<ConfigSource>) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    let mut builder = config::Config::builder();

    for source in sources {
        match source {
            ConfigSource::File(path) => {
                if !path.exists() {
                    warn!("Configuration file not found: {}", path.display());
                    return Err(RelayError::Config(format!(
                        "Configuration file not found: {}",
                        path.display()
                    )));
                }

                debug!("Loading configuration from file: {}", path.display());
                let format = file_format(&path)?;
                builder = builder.add_source(File::from(path.as_path()).format(format));
            }
            ConfigSource::Environment(prefix) => {
                debug!("Loading configuration from environment with prefix: {}", prefix);
                builder = builder.add_source(
                    config::Environment::with_prefix(&prefix)
                        .prefix_separator("_")
                        .separator("__")
                        .try_parsing(true),
                );
            }
            ConfigSource::Toml(toml_str) => {
                debug!("Loading configuration from TOML string");
                builder = builder.add_source(File::from_str(&toml_str, config::FileFormat::Toml));
            }
            ConfigSource::Override(key, value) => {
                builder = builder.set_override(key.as_str(), value)?;
            }
            ConfigSource::Defaults(defaults) => {
                debug!("Loading configuration defaults");
                builder = builder.add_source(defaults);
            }
        }
    }

    let config = builder
        .build()
        .map_err(|e| RelayError::Config(format!("Failed to build configuration: {}", e)))?;

    let result = config
        .try_deserialize()
        .map_err(|e| RelayError::Config(format!("Failed to deserialize configuration: {}", e)))?;

    debug!("Configuration loaded successfully: {:?}", result);

    Ok(result)
}

/// Configuration builder
pub struct ConfigBuilder<T: for<'de> Deserialize<'de>> {
    sources: Vec<ConfigSource>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: for<'de> Deserialize<'de> + Debug> ConfigBuilder<T> {
    /// Create a new config builder
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Add a configuration file source
    pub fn add_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources.push(ConfigSource::File(path.as_ref().to_path_buf()));
        self
    }

    /// Add environment variables
    pub fn add_env(mut self, prefix: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Environment(prefix.into()));
        self
    }

    /// Add TOML string
    pub fn add_toml(mut self, toml: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Toml(toml.into()));
        self
    }

    /// Seed every key from `T::default()`; later sources override it
    pub fn use_defaults(mut self) -> Self
    where
        T: Default + Serialize,
    {
        match config::Config::try_from(&T::default()) {
            Ok(defaults) => self.sources.push(ConfigSource::Defaults(defaults)),
            Err(e) => warn!("Skipping configuration defaults: {}", e),
        }
        self
    }

    /// Set a single key, overriding every earlier source
    pub fn set(mut self, key: impl Into<String>, value: impl Into<config::Value>) -> Self {
        self.sources.push(ConfigSource::Override(key.into(), value.into()));
        self
    }

    /// Set a key only when a value is present
    pub fn set_opt<V: Into<config::Value>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    /// Build the configuration
    pub fn build(self) -> Result<T> {
        load_config::<T>(self.sources)
    }
}

impl<T: for<'de> Deserialize<'de> + Debug> Default for ConfigBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_defaults_match_command_line_tool() {
        let config = ConfigBuilder::<ConnectorConfig>::new().build().unwrap();
        assert!(!config.pipe);
        assert_eq!(config.source_type, SourceType::Remote);
        assert_eq!(config.source_addr, "127.0.0.1:9999");
        assert_eq!(config.interval_ms, 0);
        assert_eq!(config.proc_root, PathBuf::from("/proc"));
        assert_eq!(config.dest, SinkKind::Stdout);
        assert!(config.disable_file_save);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            source_type = "local"
            interval_ms = 500
            dest = "spark"
            server = "10.0.0.5:9000"
            topic = "metrics"
            "#
        )
        .unwrap();

        let config = ConfigBuilder::<ConnectorConfig>::new()
            .add_file(file.path())
            .build()
            .unwrap();
        assert_eq!(config.source_type, SourceType::Local);
        assert_eq!(config.interval_ms, 500);
        assert_eq!(config.dest, SinkKind::Spark);
        assert_eq!(config.topic, "metrics");
    }

    #[test]
    fn test_missing_or_unknown_file_is_config_error() {
        let result = ConfigBuilder::<ConnectorConfig>::new()
            .add_file("/definitely/not/here.toml")
            .build();
        assert!(matches!(result, Err(RelayError::Config(_))));

        let file = Builder::new().suffix(".ini").tempfile().unwrap();
        let result = ConfigBuilder::<ConnectorConfig>::new()
            .add_file(file.path())
            .build();
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[test]
    fn test_use_defaults_is_overridden_by_later_sources() {
        let config = ConfigBuilder::<ConnectorConfig>::new()
            .use_defaults()
            .add_toml(
                r#"
                source_type = "local"
                topic = "from-toml"
                "#,
            )
            .set("interval_ms", 750)
            .build()
            .unwrap();

        assert_eq!(config.source_type, SourceType::Local);
        assert_eq!(config.topic, "from-toml");
        assert_eq!(config.interval_ms, 750);
        assert_eq!(config.source_addr, "127.0.0.1:9999");
        assert_eq!(config.persist_dir, PathBuf::from("./data"));
        assert_eq!(config.agent_url, None);
        assert!(config.disable_file_save);
    }

    #[test]
    fn test_overrides_win_over_files() {
        let toml_str = r#"
        topic = "from-file"
        interval_ms = 10
        pipe = false
        "#;

        let config = ConfigBuilder::<ConnectorConfig>::new()
            .add_toml(toml_str)
            .set("topic", "from-cli")
            .set("pipe", true)
            .set_opt::<String>("server", None)
            .build()
            .unwrap();

        assert_eq!(config.topic, "from-cli");
        assert!(config.pipe);
        assert_eq!(config.interval_ms, 10);
        assert_eq!(config.server, "");
    }

    #[test]
    fn test_collection_request_mode_selection() {
        let mut config = ConnectorConfig {
            source_type: SourceType::Local,
            interval_ms: 250,
            agent_url: Some(" ".to_string()),
            ..Default::default()
        };

        match config.collection_request().mode() {
            AcquisitionMode::Local(local) => {
                assert_eq!(local.interval, Duration::from_millis(250));
                assert_eq!(local.agent_url, None);
            }
            other => panic!("unexpected mode: {:?}", other),
        }

        config.pipe = true;
        assert_eq!(config.collection_request().mode(), &AcquisitionMode::Pipe);

        config.pipe = false;
        config.source_type = SourceType::Remote;
        config.source_addr = "  ".to_string();
        assert_eq!(
            config.collection_request().mode(),
            &AcquisitionMode::RemoteStream(RemoteConfig {
                address: String::new()
            })
        );
    }
}
