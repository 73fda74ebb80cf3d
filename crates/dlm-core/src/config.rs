use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Segment worker tuning (`[engine]` section in config.toml).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Receive buffer handed to curl; bounds the size of one written chunk.
    pub chunk_size_bytes: usize,
    pub connect_timeout_secs: u64,
    /// Window over which per-segment speed is measured.
    pub speed_sample_ms: u64,
    /// How long StopAll waits for workers to acknowledge.
    pub stop_grace_ms: u64,
    /// Most segments (and worker threads) one job may use.
    pub max_part_count: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: 64 * 1024,
            connect_timeout_secs: 30,
            speed_sample_ms: 1000,
            stop_grace_ms: 5000,
            max_part_count: 256,
        }
    }
}

impl EngineConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn speed_sample(&self) -> Duration {
        Duration::from_millis(self.speed_sample_ms.max(1))
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Global configuration loaded from `~/.config/dlm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DlmConfig {
    pub listen_host: String,
    pub listen_port: u16,
    /// Segments per job when `add_task` does not say.
    pub default_part_count: i64,
    /// Directory for jobs added without a file path (None = current directory).
    pub download_dir: Option<PathBuf>,
    /// Directory holding a custom `index.html` (None = embedded page).
    pub static_dir: Option<PathBuf>,
    /// Jobs file location (None = `$XDG_STATE_HOME/dlm/jobs.json`).
    pub settings_path: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Default for DlmConfig {
    fn default() -> Self {
        Self {
            listen_host: "127.0.0.1".to_string(),
            listen_port: 9981,
            default_part_count: 4,
            download_dir: None,
            static_dir: None,
            settings_path: None,
            engine: EngineConfig::default(),
        }
    }
}

impl DlmConfig {
    /// Jobs file: the configured override or the XDG state default.
    pub fn settings_path(&self) -> Result<PathBuf> {
        match &self.settings_path {
            Some(p) => Ok(p.clone()),
            None => crate::persist::default_settings_path(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dlm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DlmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = DlmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)
            .with_context(|| format!("failed to write default config {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let cfg: DlmConfig =
        toml::from_str(&data).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = DlmConfig::default();
        assert_eq!(cfg.listen_port, 9981);
        assert_eq!(cfg.default_part_count, 4);
        assert_eq!(cfg.engine.stop_grace(), Duration::from_secs(5));
        assert_eq!(cfg.engine.speed_sample(), Duration::from_secs(1));
    }

    #[test]
    fn config_toml_default_roundtrip() {
        let cfg = DlmConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: DlmConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.listen_host, cfg.listen_host);
        assert_eq!(parsed.engine, cfg.engine);
    }

    #[test]
    fn config_toml_partial_uses_defaults() {
        let toml = r#"
            listen_port = 8080
            download_dir = "/srv/downloads"

            [engine]
            stop_grace_ms = 250
        "#;
        let cfg: DlmConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.listen_port, 8080);
        assert_eq!(cfg.listen_host, "127.0.0.1");
        assert_eq!(cfg.download_dir.as_deref(), Some(std::path::Path::new("/srv/downloads")));
        assert_eq!(cfg.engine.stop_grace_ms, 250);
        assert_eq!(cfg.engine.chunk_size_bytes, 64 * 1024);
        assert_eq!(cfg.engine.max_part_count, 256);
    }

    #[test]
    fn settings_path_override() {
        let cfg = DlmConfig {
            settings_path: Some(PathBuf::from("/tmp/jobs.json")),
            ..DlmConfig::default()
        };
        assert_eq!(cfg.settings_path().unwrap(), PathBuf::from("/tmp/jobs.json"));
    }
}
