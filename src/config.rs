// src/config.rs

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

use crate::{
    family::{Family, FamilySpec},
    fetch::{announce::REGISTER_DOWNLOAD_URL, HttpSettings},
};

/// File picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "fuelsync.yaml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the per-family archive files.
    pub archive_dir: PathBuf,
    /// Sync checkpoint directory; `null` disables history.
    pub history_dir: Option<PathBuf>,
    /// Day of month on which the sync runs.
    pub trigger_day: u32,
    /// Skip families already synced on the same day.
    pub skip_if_synced: bool,
    pub http: HttpConfig,
    pub announce: AnnounceConfig,
    pub families: BTreeMap<Family, FamilyOverride>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnnounceConfig {
    pub enabled: bool,
    pub url: Url,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FamilyOverride {
    pub url: Option<Url>,
    pub archive: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            archive_dir: PathBuf::from("."),
            history_dir: Some(PathBuf::from("history")),
            trigger_day: 10,
            skip_if_synced: false,
            http: HttpConfig::default(),
            announce: AnnounceConfig::default(),
            families: BTreeMap::new(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        let base = HttpSettings::default();
        Self {
            timeout_secs: base.timeout.as_secs(),
            connect_timeout_secs: base.connect_timeout.as_secs(),
            user_agent: base.user_agent,
        }
    }
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: Url::parse(REGISTER_DOWNLOAD_URL).expect("static portal url should parse"),
        }
    }
}

impl Config {
    /// Load from `path`, else `./fuelsync.yaml` if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_or(path, Path::new(DEFAULT_CONFIG_FILE))
    }

    fn load_or(path: Option<&Path>, fallback: &Path) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None if fallback.is_file() => Self::from_file(fallback),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config `{}`", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing config `{}`", path.display()))
    }

    /// Parse and validate.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=31).contains(&self.trigger_day) {
            bail!("trigger_day must be within 1..=31, got {}", self.trigger_day);
        }
        if self.http.timeout_secs == 0 || self.http.connect_timeout_secs == 0 {
            bail!("http timeouts must be at least one second");
        }
        Ok(())
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(self.http.timeout_secs),
            connect_timeout: Duration::from_secs(self.http.connect_timeout_secs),
            user_agent: self.http.user_agent.clone(),
        }
    }

    /// Built-in family table with any configured overrides applied.
    pub fn family_specs(&self) -> Vec<FamilySpec> {
        Family::ALL
            .iter()
            .map(|family| {
                let mut spec = family.default_spec();
                if let Some(o) = self.families.get(family) {
                    if let Some(url) = &o.url {
                        spec.url = url.clone();
                    }
                    if let Some(archive) = &o.archive {
                        spec.archive = archive.clone();
                    }
                }
                spec
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.trigger_day, 10);
        assert!(!config.skip_if_synced);
        assert!(config.announce.enabled);
        assert_eq!(config.http.timeout_secs, 60);
        assert_eq!(config.http_settings().connect_timeout, Duration::from_secs(15));
        assert_eq!(config.family_specs().len(), 3);
        config.validate().unwrap();
    }

    #[test]
    fn test_yaml_overrides() {
        let config = Config::from_yaml(
            r#"
archive_dir: /data/anp
history_dir: null
trigger_day: 12
http:
  timeout_secs: 5
announce:
  enabled: false
families:
  diesel-cng:
    url: "http://mirror.local/diesel.csv"
    archive: "diesel.parquet"
"#,
        )
        .unwrap();

        assert_eq!(config.archive_dir, PathBuf::from("/data/anp"));
        assert!(config.history_dir.is_none());
        assert_eq!(config.trigger_day, 12);
        assert_eq!(config.http.timeout_secs, 5);
        assert_eq!(config.http.connect_timeout_secs, 15);
        assert!(!config.announce.enabled);

        let specs = config.family_specs();
        let diesel = specs.iter().find(|s| s.family == Family::DieselCng).unwrap();
        assert_eq!(diesel.url.as_str(), "http://mirror.local/diesel.csv");
        assert_eq!(diesel.archive, PathBuf::from("diesel.parquet"));
        let lpg = specs.iter().find(|s| s.family == Family::Lpg).unwrap();
        assert_eq!(lpg.archive, PathBuf::from("LPG Prices.parquet"));
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        assert!(Config::from_yaml("trigger_day: 0").is_err());
        assert!(Config::from_yaml("trigger_day: 32").is_err());
        assert!(Config::from_yaml("http:\n  timeout_secs: 0").is_err());
        assert!(Config::from_yaml("families:\n  kerosene: {}").is_err());
        assert!(Config::from_yaml("unknown_key: 1").is_err());
    }

    #[test]
    fn test_load_lookup_order() {
        let tmp = tempfile::tempdir().unwrap();
        let explicit = tmp.path().join("explicit.yaml");
        let fallback = tmp.path().join("fuelsync.yaml");
        fs::write(&explicit, "trigger_day: 3\n").unwrap();

        // nothing on disk: defaults
        assert_eq!(Config::load_or(None, &fallback).unwrap().trigger_day, 10);

        fs::write(&fallback, "trigger_day: 20\n").unwrap();
        assert_eq!(Config::load_or(None, &fallback).unwrap().trigger_day, 20);
        assert_eq!(
            Config::load_or(Some(&explicit), &fallback).unwrap().trigger_day,
            3
        );

        // an explicit path must exist
        let missing = tmp.path().join("missing.yaml");
        assert!(Config::load_or(Some(&missing), &fallback).is_err());

        // file-backed configs are validated
        fs::write(&fallback, "trigger_day: 40\n").unwrap();
        let err = Config::load_or(None, &fallback).unwrap_err();
        assert!(format!("{:#}", err).contains("trigger_day"));
    }

    #[test]
    fn test_static_urls_parse() {
        assert_eq!(
            Config::default().announce.url.as_str(),
            REGISTER_DOWNLOAD_URL
        );
        for spec in Config::default().family_specs() {
            assert_eq!(spec.url.scheme(), "https");
        }
    }
}
