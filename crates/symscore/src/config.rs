//! Layered defaults for the codec and for batch edits.
//!
//! Load order (later wins):
//! 1. Compiled defaults
//! 2. `/etc/symscore/config.toml`
//! 3. `~/.config/symscore/config.toml`
//! 4. `./symscore.toml`, or an explicit path in its place
//! 5. `SYMSCORE_*` environment variables
//!
//! ```toml
//! [parse]
//! derive_pedals = true
//!
//! [encode]
//! running_status = true
//! note_off_as_zero_velocity = true
//! sustain_controls = false
//!
//! [edit]
//! clamp_negative_times = false
//! ```

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec::{EncodeOptions, ParseOptions};
use crate::error::ConfigError;
use crate::ops::ShiftPolicy;

/// Defaults for [`Score::shift`](crate::Score::shift) callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditOptions {
    /// Clamp events shifted before zero instead of failing.
    pub clamp_negative_times: bool,
}

impl EditOptions {
    pub fn shift_policy(&self) -> ShiftPolicy {
        if self.clamp_negative_times {
            ShiftPolicy::ClampToZero
        } else {
            ShiftPolicy::Strict
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymscoreConfig {
    pub parse: ParseOptions,
    pub encode: EncodeOptions,
    pub edit: EditOptions,
}

/// Where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

impl SymscoreConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load with `config_path` replacing the local `./symscore.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let files = discover_config_files_with_override(config_path);
        let (mut config, mut sources) = load_files(&files)?;
        apply_env_overrides(&mut config, &mut sources);
        debug!(
            files = sources.files.len(),
            env_overrides = sources.env_overrides.len(),
            "loaded symscore config"
        );
        Ok((config, sources))
    }

    pub fn to_toml(&self) -> String {
        let mut output = String::new();
        output.push_str("[parse]\n");
        output.push_str(&format!("derive_pedals = {}\n", self.parse.derive_pedals));
        output.push_str("\n[encode]\n");
        output.push_str(&format!("running_status = {}\n", self.encode.running_status));
        output.push_str(&format!(
            "note_off_as_zero_velocity = {}\n",
            self.encode.note_off_as_zero_velocity
        ));
        output.push_str(&format!(
            "sustain_controls = {}\n",
            self.encode.sustain_controls
        ));
        output.push_str("\n[edit]\n");
        output.push_str(&format!(
            "clamp_negative_times = {}\n",
            self.edit.clamp_negative_times
        ));
        output
    }
}

/// Existing config files in load order (system, user, local or override).
pub fn discover_config_files_with_override(override_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/symscore/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("symscore/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = override_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("symscore.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Merge the given files over the defaults. Keys missing from a file keep
/// the value from earlier layers.
pub fn load_files(paths: &[PathBuf]) -> Result<(SymscoreConfig, ConfigSources), ConfigError> {
    let mut sources = ConfigSources::default();
    let mut merged = toml::Table::new();
    let mut last = PathBuf::new();

    for path in paths {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.clone(),
            source: e,
        })?;
        let table: toml::Table =
            contents
                .parse()
                .map_err(|e: toml::de::Error| ConfigError::Parse {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
        merge_tables(&mut merged, table);
        sources.files.push(path.clone());
        last = path.clone();
    }

    let config = toml::Value::Table(merged)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: last,
            message: e.to_string(),
        })?;
    Ok((config, sources))
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply `SYMSCORE_*` variables from the process environment.
pub fn apply_env_overrides(config: &mut SymscoreConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Apply overrides from any lookup; unparseable values are ignored.
pub fn apply_overrides_from<F>(config: &mut SymscoreConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let flags: [(&str, &mut bool); 5] = [
        ("SYMSCORE_DERIVE_PEDALS", &mut config.parse.derive_pedals),
        ("SYMSCORE_RUNNING_STATUS", &mut config.encode.running_status),
        (
            "SYMSCORE_NOTE_OFF_AS_ZERO_VELOCITY",
            &mut config.encode.note_off_as_zero_velocity,
        ),
        (
            "SYMSCORE_SUSTAIN_CONTROLS",
            &mut config.encode.sustain_controls,
        ),
        (
            "SYMSCORE_CLAMP_NEGATIVE_TIMES",
            &mut config.edit.clamp_negative_times,
        ),
    ];

    for (key, slot) in flags {
        let Some(raw) = lookup(key) else {
            continue;
        };
        match parse_flag(&raw) {
            Some(value) => {
                *slot = value;
                sources.env_overrides.push(key.to_string());
            }
            None => warn!(key, value = %raw, "ignoring non-boolean override"),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
