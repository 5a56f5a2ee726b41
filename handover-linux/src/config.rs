//! Load config from file and environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

/// Demo configuration. File: ~/.config/handover/config.toml or
/// /etc/handover/config.toml. Env overrides: HANDOVER_STORAGE_DIR,
/// HANDOVER_PRESET_FILE, HANDOVER_ELIGIBILITY_FILE, HANDOVER_DEFAULT_MESSAGE.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory received continuity files are copied into.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    /// Local file offered on a file handover.
    #[serde(default = "default_preset_file")]
    pub preset_file: PathBuf,
    /// Eligibility policy asset attached to broadcasts.
    #[serde(default = "default_eligibility_file")]
    pub eligibility_file: PathBuf,
    /// Fallback text for message handovers.
    #[serde(default = "default_message")]
    pub default_message: String,
}

fn default_storage_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".local/share/handover")
}

fn default_preset_file() -> PathBuf {
    PathBuf::from("handover-linux/assets/preset.jpg")
}

fn default_eligibility_file() -> PathBuf {
    PathBuf::from("handover-linux/assets/eligibility.json")
}

fn default_message() -> String {
    handover_core::DEFAULT_CONTINUITY_MSG.to_owned()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            preset_file: default_preset_file(),
            eligibility_file: default_eligibility_file(),
            default_message: default_message(),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    if let Ok(s) = std::env::var("HANDOVER_STORAGE_DIR") {
        c.storage_dir = PathBuf::from(s);
    }
    if let Ok(s) = std::env::var("HANDOVER_PRESET_FILE") {
        c.preset_file = PathBuf::from(s);
    }
    if let Ok(s) = std::env::var("HANDOVER_ELIGIBILITY_FILE") {
        c.eligibility_file = PathBuf::from(s);
    }
    if let Ok(s) = std::env::var("HANDOVER_DEFAULT_MESSAGE") {
        c.default_message = s;
    }
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/handover/config.toml"));
    }
    out.push(PathBuf::from("/etc/handover/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            if let Ok(s) = std::fs::read_to_string(&p) {
                if let Ok(c) = toml::from_str::<Config>(&s) {
                    return Some(c);
                }
            }
            break;
        }
    }
    None
}

/// Read the eligibility policy asset. The policy stays opaque; a missing or
/// unparseable asset disables broadcasts rather than aborting startup.
pub fn load_eligibility(path: &Path) -> Option<Value> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(path = %path.display(), %err, "cannot read eligibility asset");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(path = %path.display(), %err, "eligibility asset is not valid json");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn toml_with_partial_fields_fills_defaults() {
        let c: Config = toml::from_str("default_message = \"take this\"").unwrap();
        assert_eq!(c.default_message, "take this");
        assert_eq!(c.preset_file, default_preset_file());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<Config>("proxy_port = 3128").is_err());
    }

    #[test]
    fn eligibility_loads_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{{\"deviceType\": [\"pad\", \"pc\"]}}").unwrap();
        let value = load_eligibility(f.path()).unwrap();
        assert_eq!(value["deviceType"][0], "pad");
    }

    #[test]
    fn missing_or_malformed_eligibility_is_none() {
        assert!(load_eligibility(Path::new("/nonexistent/eligibility.json")).is_none());
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "not json").unwrap();
        assert!(load_eligibility(f.path()).is_none());
    }
}
