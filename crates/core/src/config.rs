use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_MAX_SIZE_BYTES: u64 = 2048 * 1024;
pub const DEFAULT_LEDGER_FILE: &str = "triage-ledger.json";
pub const DEFAULT_LARGE_DOCUMENT_MIN_BYTES: u64 = 512 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TriageConfig {
    pub max_size_bytes: u64,
    pub image_extensions: Vec<String>,
    pub metadata_exempt_extensions: Vec<String>,
    pub tracked_extensions: Vec<String>,
    pub duplicate_suffix_max: u32,
    pub keywords: Vec<String>,
    pub require_camera_metadata: bool,
    pub document_extensions: Vec<String>,
    pub large_document_min_bytes: Option<u64>,
    pub ledger_file_name: String,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            image_extensions: to_strings(&["jpg", "jpeg", "png"]),
            metadata_exempt_extensions: to_strings(&["png"]),
            tracked_extensions: to_strings(&["mp3", "m4a", "flac", "ogg"]),
            duplicate_suffix_max: 8,
            keywords: to_strings(&["screenshot"]),
            require_camera_metadata: false,
            document_extensions: to_strings(&["pdf"]),
            large_document_min_bytes: None,
            ledger_file_name: DEFAULT_LEDGER_FILE.to_string(),
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
}

pub fn app_paths() -> Result<AppPaths> {
    let proj = ProjectDirs::from("org", "media-triage", "media-triage")
        .context("could not resolve the OS configuration directory")?;
    let config_dir = proj.config_dir().to_path_buf();
    Ok(AppPaths {
        config_path: config_dir.join("config.toml"),
        config_dir,
    })
}

pub fn load_config() -> Result<TriageConfig> {
    let paths = app_paths()?;
    if !paths.config_path.exists() {
        return Ok(TriageConfig::default());
    }

    let raw = fs::read_to_string(&paths.config_path).with_context(|| {
        format!(
            "could not read config file: {}",
            paths.config_path.display()
        )
    })?;
    parse_config(&raw)
}

pub fn parse_config(raw: &str) -> Result<TriageConfig> {
    toml::from_str::<TriageConfig>(raw).context("could not parse config file")
}

pub fn save_config(config: &TriageConfig) -> Result<()> {
    let paths = app_paths()?;
    fs::create_dir_all(&paths.config_dir).with_context(|| {
        format!(
            "could not create config directory: {}",
            paths.config_dir.display()
        )
    })?;
    let body = toml::to_string_pretty(config).context("could not serialize config")?;
    fs::write(&paths.config_path, body).with_context(|| {
        format!(
            "could not write config file: {}",
            paths.config_path.display()
        )
    })?;
    Ok(())
}
