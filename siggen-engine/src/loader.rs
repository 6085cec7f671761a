//! Config file discovery, layered loading, and environment variable overlay.
//!
//! Load order (later wins):
//! 1. Compiled defaults
//! 2. `/etc/siggen/config.toml`
//! 3. `~/.config/siggen/config.toml`
//! 4. `./siggen.toml`, or the path given on the command line
//! 5. Environment variables (`SIGGEN_*`, `RUST_LOG`)
//!
//! Files are merged table by table, so a local file that only sets
//! `source.frequency` keeps everything the system file said.

use std::env;
use std::path::{Path, PathBuf};

use crate::config::{Shape, SigGenConfig};
use crate::error::ConfigError;

/// Where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local/cli). Only returns files
/// that exist; a CLI path replaces the local override.
pub fn discover_config_files(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/siggen/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("siggen/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("siggen.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Recursively overlay `top` onto `base`. Non-table values replace.
fn merge_tables(base: &mut toml::Table, top: toml::Table) {
    for (key, value) in top {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(b)), toml::Value::Table(t)) => merge_tables(b, t),
            (_, v) => {
                base.insert(key, v);
            }
        }
    }
}

/// Load and merge `files` in order, without environment overrides.
pub fn load_files(files: &[PathBuf]) -> Result<SigGenConfig, ConfigError> {
    let mut merged = toml::Table::new();
    for path in files {
        merge_tables(&mut merged, read_table(path)?);
    }
    let origin = files.last().cloned().unwrap_or_default();
    let config: SigGenConfig = toml::Value::Table(merged).try_into().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: origin,
        message: e.to_string(),
    })?;
    config.source.validate()?;
    Ok(config)
}

/// Full layered load from the standard locations plus the process environment.
pub fn load(cli_path: Option<&Path>) -> Result<(SigGenConfig, ConfigSources), ConfigError> {
    let files = discover_config_files(cli_path);
    let mut config = load_files(&files)?;
    let mut sources = ConfigSources {
        files,
        env_overrides: Vec::new(),
    };
    apply_env_overrides(&mut config, &mut sources, |k| env::var(k).ok())?;
    Ok((config, sources))
}

fn parsed<V: std::str::FromStr>(field: &'static str, raw: &str) -> Result<V, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        field,
        reason: format!("cannot parse '{raw}'"),
    })
}

/// Apply `SIGGEN_*` overrides read through `lookup`.
///
/// The result is validated again, so an override cannot smuggle in a zero
/// sample rate.
pub fn apply_env_overrides<F>(
    config: &mut SigGenConfig,
    sources: &mut ConfigSources,
    lookup: F,
) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let src = &mut config.source;
    let mut hit = |name: &str| sources.env_overrides.push(name.to_string());

    if let Some(v) = lookup("SIGGEN_FREQUENCY") {
        src.frequency = parsed("frequency", &v)?;
        hit("SIGGEN_FREQUENCY");
    }
    if let Some(v) = lookup("SIGGEN_SAMPLE_RATE") {
        src.sample_rate = parsed("sample_rate", &v)?;
        hit("SIGGEN_SAMPLE_RATE");
    }
    if let Some(v) = lookup("SIGGEN_MAGNITUDE") {
        src.magnitude = parsed("magnitude", &v)?;
        hit("SIGGEN_MAGNITUDE");
    }
    if let Some(v) = lookup("SIGGEN_SHAPE") {
        src.shape = v.parse::<Shape>()?;
        hit("SIGGEN_SHAPE");
    }
    if let Some(v) = lookup("SIGGEN_TRANSFER_LENGTH") {
        src.transfer_length = parsed("transfer_length", &v)?;
        hit("SIGGEN_TRANSFER_LENGTH");
    }
    if let Some(v) = lookup("SIGGEN_THROTTLE") {
        src.throttle = parsed("throttle", &v)?;
        hit("SIGGEN_THROTTLE");
    }
    if let Some(v) = lookup("SIGGEN_STREAM_ID") {
        src.stream_id = v;
        hit("SIGGEN_STREAM_ID");
    }

    if let Some(v) = lookup("SIGGEN_LOG_LEVEL") {
        config.telemetry.log_level = v;
        hit("SIGGEN_LOG_LEVEL");
    }
    // RUST_LOG wins over everything
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        hit("RUST_LOG");
    }

    config.source.validate()
}
