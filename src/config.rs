// src/config.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::warn;

/// Dataset column names the engine reads. Defaults match the crime dataset export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Columns {
    pub district: String,
    pub unit: String,
    pub beat: String,
    /// Time of offence, `HH:MM:SS`.
    pub time: String,
    /// Date of offence, `YYYY-MM-DD`.
    pub date: String,
    pub crime_type: String,
    pub crime_group: String,
    pub month: String,
    pub latitude: String,
    pub longitude: String,
    pub accused_age: String,
    pub accused_caste: String,
    pub accused_profession: String,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            district: "district_name".into(),
            unit: "unitname".into(),
            beat: "beat_name".into(),
            time: "Offence_From_Time_only".into(),
            date: "Offence_From_Date_only".into(),
            crime_type: "Crime_Type".into(),
            crime_group: "crime_group_name".into(),
            month: "month".into(),
            latitude: "latitude".into(),
            longitude: "longitude".into(),
            accused_age: "accused_age".into(),
            accused_caste: "accused_caste".into(),
            accused_profession: "accused_profession".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dataset_path: PathBuf,
    pub entries_path: PathBuf,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub columns: Columns,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("dataset/merged_data_cleaned.csv"),
            entries_path: PathBuf::from("dataset/entries.csv"),
            port: 5000,
            request_timeout_secs: 30,
            columns: Columns::default(),
        }
    }
}

impl Config {
    /// Read a YAML config file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let cfg: Config = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(cfg)
    }

    /// Defaults, then environment overrides.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Override fields from `DATASET_PATH`, `ENTRIES_PATH`, `PORT` and
    /// `REQUEST_TIMEOUT_SECS` when set.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| env::var(key).ok());
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(p) = lookup("DATASET_PATH") {
            self.dataset_path = PathBuf::from(p);
        }
        if let Some(p) = lookup("ENTRIES_PATH") {
            self.entries_path = PathBuf::from(p);
        }
        if let Some(port) = parse_var(&lookup, "PORT") {
            self.port = port;
        }
        if let Some(secs) = parse_var(&lookup, "REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = secs;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_yaml_partial_override() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("crimestats.yaml");
        fs::write(
            &path,
            "dataset_path: /data/fir.csv\nport: 8080\ncolumns:\n  district: District\n",
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.dataset_path, PathBuf::from("/data/fir.csv"));
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.columns.district, "District");
        assert_eq!(cfg.columns.unit, "unitname");
        assert_eq!(cfg.request_timeout_secs, 30);
    }

    #[test]
    fn test_env_overrides_and_bad_values() {
        let vars: HashMap<&str, &str> = [
            ("DATASET_PATH", "other.csv"),
            ("PORT", "not-a-port"),
            ("REQUEST_TIMEOUT_SECS", "5"),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        cfg.apply_vars(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.dataset_path, PathBuf::from("other.csv"));
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_config_file_errors() {
        let tmp = tempdir().unwrap();
        assert!(Config::load(tmp.path().join("absent.yaml")).is_err());
    }
}
