use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mslearn_core::GeneratorConfig;
use mslearn_engine::{AtomicFileWriter, ExportOptions, RecordFormat};
use mslearn_logging::{mslearn_error, mslearn_info};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

/// Contents of `settings.json`.
///
/// Every field has a default, so a file written by an older version, or one
/// edited down to a few keys, loads with the remaining keys filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub default_output_dir: PathBuf,
    pub dataset_name: String,
    pub record_format: RecordFormat,
    pub accepted_only: bool,
    pub chatml: bool,
    pub generator: GeneratorConfig,
}

impl Default for AppSettings {
    fn default() -> Self {
        let export = ExportOptions::default();
        Self {
            default_output_dir: PathBuf::from("MSLearn_Output"),
            dataset_name: export.dataset_name,
            record_format: export.format,
            accepted_only: export.accepted_only,
            chatml: export.chatml,
            generator: GeneratorConfig::default(),
        }
    }
}

impl AppSettings {
    /// Loads `path`, creating it with defaults when it does not exist.
    ///
    /// An unreadable or unparsable file is logged and replaced by defaults in
    /// memory; the file itself is left untouched for the user to fix.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let settings = Self::default();
            settings.save(path)?;
            mslearn_info!("created default settings at {}", path.display());
            return Ok(settings);
        }
        let loaded = fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|text| serde_json::from_str::<Self>(&text).map_err(anyhow::Error::from));
        match loaded {
            Ok(settings) => {
                mslearn_info!("settings loaded from {}", path.display());
                Ok(settings)
            }
            Err(err) => {
                mslearn_error!("error loading settings from {}: {err}", path.display());
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(DEFAULT_SETTINGS_FILE);
        AtomicFileWriter::new(dir)
            .write_json(filename, self)
            .with_context(|| format!("saving settings to {}", path.display()))?;
        Ok(())
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            dataset_name: self.dataset_name.clone(),
            format: self.record_format,
            accepted_only: self.accepted_only,
            chatml: self.chatml,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");

        let settings = AppSettings::load_or_create(&path).unwrap();

        assert_eq!(settings, AppSettings::default());
        assert!(path.is_file());
        let reloaded = AppSettings::load_or_create(&path).unwrap();
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn partial_file_is_merged_with_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        fs::write(
            &path,
            r#"{"dataset_name": "DNS", "generator": {"quality_threshold": 150}}"#,
        )
        .unwrap();

        let settings = AppSettings::load_or_create(&path).unwrap();

        assert_eq!(settings.dataset_name, "DNS");
        assert_eq!(settings.generator.quality_threshold, 150.0);
        assert_eq!(settings.generator.max_retry_attempts, 3);
        assert_eq!(settings.generator.min_request_delay_ms, 2_000);
        assert_eq!(settings.record_format, RecordFormat::JsonLines);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults_without_overwriting() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let settings = AppSettings::load_or_create(&path).unwrap();

        assert_eq!(settings, AppSettings::default());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }
}
