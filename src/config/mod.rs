//! Configuration management.
//!
//! Two layers, mirroring how the rest of the system is wired:
//!
//! - [`Settings`] — the JSON settings file. Recognized keys are typed;
//!   unknown keys are preserved verbatim and written back on save, so a
//!   newer tool editing the file never loses an older tool's keys.
//! - [`EngramConfig`] — runtime configuration assembled from the settings
//!   file, platform directories, and `ENGRAM_*` environment overrides.
//!   Handed to subsystem constructors explicitly; no global state.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default port of the vector worker sidecar.
pub const DEFAULT_WORKER_PORT: u16 = 8787;

/// Default distillation model alias. Opaque: passed to the subprocess
/// untouched, never used for behavioral decisions.
pub const DEFAULT_MODEL: &str = "haiku";

fn default_worker_port() -> u16 {
    DEFAULT_WORKER_PORT
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_recent_context_count() -> usize {
    10
}

fn default_summary_context_count() -> usize {
    5
}

fn default_vector_storage() -> String {
    "http".to_string()
}

/// Reranking parameters for hybrid retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankSettings {
    /// Candidate multiplier: each retrieval arm fetches `factor × limit`.
    #[serde(default = "RerankSettings::default_candidate_factor")]
    pub candidate_factor: usize,
    /// RRF dampening constant.
    #[serde(default = "RerankSettings::default_rrf_k")]
    pub rrf_k: f64,
}

impl RerankSettings {
    const fn default_candidate_factor() -> usize {
        2
    }

    const fn default_rrf_k() -> f64 {
        60.0
    }
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            candidate_factor: Self::default_candidate_factor(),
            rrf_k: Self::default_rrf_k(),
        }
    }
}

/// Relation-graph traversal parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSettings {
    /// Maximum traversal depth for neighborhood queries.
    #[serde(default = "GraphSettings::default_max_depth")]
    pub max_depth: u32,
    /// Minimum edge confidence included in traversals.
    #[serde(default = "GraphSettings::default_min_confidence")]
    pub min_confidence: f64,
}

impl GraphSettings {
    const fn default_max_depth() -> u32 {
        3
    }

    const fn default_min_confidence() -> f64 {
        0.3
    }
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            max_depth: Self::default_max_depth(),
            min_confidence: Self::default_min_confidence(),
        }
    }
}

/// Maintenance schedule parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceSettings {
    /// Hours between cleanup ticks; clamped to at least 1 at runtime.
    #[serde(default = "MaintenanceSettings::default_interval_hours")]
    pub interval_hours: u64,
    /// Observation retention in days; 0 disables age-based deletion.
    #[serde(default)]
    pub retention_days: i64,
    /// Whether superseded observations are deleted.
    #[serde(default = "MaintenanceSettings::default_cleanup_superseded")]
    pub cleanup_superseded: bool,
}

impl MaintenanceSettings {
    const fn default_interval_hours() -> u64 {
        24
    }

    const fn default_cleanup_superseded() -> bool {
        true
    }
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            interval_hours: Self::default_interval_hours(),
            retention_days: 0,
            cleanup_superseded: Self::default_cleanup_superseded(),
        }
    }
}

/// The JSON settings file.
///
/// Unknown keys land in `extra` and are re-serialized on save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Port of the vector worker sidecar.
    #[serde(default = "default_worker_port")]
    pub worker_port: u16,
    /// Distillation model name (opaque alias).
    #[serde(default = "default_model")]
    pub model: String,
    /// How many recent observations context tools return by default.
    #[serde(default = "default_recent_context_count")]
    pub recent_context_count: usize,
    /// How many recent summaries context tools return by default.
    #[serde(default = "default_summary_context_count")]
    pub summary_context_count: usize,
    /// Reranking parameters.
    #[serde(default)]
    pub rerank: RerankSettings,
    /// Relation-graph parameters.
    #[serde(default)]
    pub graph: GraphSettings,
    /// Maintenance schedule.
    #[serde(default)]
    pub maintenance: MaintenanceSettings,
    /// Vector storage strategy: `http` (sidecar worker) or `memory`.
    #[serde(default = "default_vector_storage")]
    pub vector_storage: String,
    /// Unrecognized keys, preserved across load/save.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            worker_port: default_worker_port(),
            model: default_model(),
            recent_context_count: default_recent_context_count(),
            summary_context_count: default_summary_context_count(),
            rerank: RerankSettings::default(),
            graph: GraphSettings::default(),
            maintenance: MaintenanceSettings::default(),
            vector_storage: default_vector_storage(),
            extra: serde_json::Map::new(),
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| Error::Fatal(format!("invalid settings file {}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Fatal(format!(
                "reading settings file {}: {e}",
                path.display()
            ))),
        }
    }

    /// Writes settings back as pretty JSON, preserving unknown keys.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Fatal(format!("serializing settings: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Fatal(format!("creating {}: {e}", parent.display())))?;
        }
        std::fs::write(path, contents)
            .map_err(|e| Error::Fatal(format!("writing {}: {e}", path.display())))
    }
}

/// Runtime configuration for the whole service.
#[derive(Debug, Clone)]
pub struct EngramConfig {
    /// Loaded settings.
    pub settings: Settings,
    /// Data directory holding the database.
    pub data_dir: PathBuf,
    /// SQLite database path.
    pub db_path: PathBuf,
    /// Distiller subprocess binary.
    pub distiller_binary: PathBuf,
}

impl EngramConfig {
    /// Builds configuration from the default platform data directory and
    /// the settings file inside it, then applies environment overrides.
    pub fn load_default() -> Result<Self> {
        let data_dir = directories::ProjectDirs::from("", "", "engram")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".engram"));
        Self::load_from_dir(&data_dir)
    }

    /// Builds configuration rooted at an explicit data directory.
    pub fn load_from_dir(data_dir: &Path) -> Result<Self> {
        let settings = Settings::load(&data_dir.join("settings.json"))?;
        let config = Self {
            db_path: data_dir.join("engram.db"),
            data_dir: data_dir.to_path_buf(),
            distiller_binary: PathBuf::from("claude"),
            settings,
        };
        Ok(config.with_env_overrides())
    }

    /// Applies `ENGRAM_*` environment overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("ENGRAM_WORKER_PORT") {
            if let Ok(parsed) = v.parse::<u16>() {
                self.settings.worker_port = parsed;
            }
        }
        if let Ok(v) = std::env::var("ENGRAM_MODEL") {
            if !v.is_empty() {
                self.settings.model = v;
            }
        }
        if let Ok(v) = std::env::var("ENGRAM_DB_PATH") {
            if !v.is_empty() {
                self.db_path = PathBuf::from(v);
            }
        }
        if let Ok(v) = std::env::var("ENGRAM_DISTILLER_BIN") {
            if !v.is_empty() {
                self.distiller_binary = PathBuf::from(v);
            }
        }
        if let Ok(v) = std::env::var("ENGRAM_VECTOR_STORAGE") {
            if !v.is_empty() {
                self.settings.vector_storage = v;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.worker_port, DEFAULT_WORKER_PORT);
        assert_eq!(settings.model, "haiku");
        assert_eq!(settings.vector_storage, "http");
        assert!((settings.rerank.rrf_k - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_keys_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"model":"sonnet","future_knob":{"nested":true},"worker_port":9000}"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.model, "sonnet");
        assert_eq!(settings.worker_port, 9000);
        assert!(settings.extra.contains_key("future_knob"));

        settings.save(&path).unwrap();
        let reloaded = Settings::load(&path).unwrap();
        assert_eq!(
            reloaded.extra.get("future_knob"),
            settings.extra.get("future_knob")
        );
    }

    #[test]
    fn test_missing_settings_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.model, DEFAULT_MODEL);
    }
}
