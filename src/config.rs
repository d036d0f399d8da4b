#![forbid(unsafe_code)]

//! Runtime configuration: an optional TOML file overlaid with
//! `PATCHKIT_`-prefixed environment variables (`__` separates nested keys,
//! e.g. `PATCHKIT_PREFS__DEVICE_ID`).

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pak::{PakResult, PatchRule, PatchSet};
use crate::prefs::{MacCalculator, PrefsResult, TrustDomain, REGISTRY_SEED};

pub const DEFAULT_CONFIG_FILE: &str = "patchkit.toml";
pub const ENV_PREFIX: &str = "PATCHKIT_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub patch: PatchConfig,
    pub prefs: PrefsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    pub rules: Vec<PatchRule>,
    /// Stop scanning once every rule has matched at least one resource.
    pub stop_when_all_matched: bool,
}

impl PatchConfig {
    pub fn compile(&self) -> PakResult<PatchSet> {
        Ok(PatchSet::compile(&self.rules)?.stop_when_all_matched(self.stop_when_all_matched))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefsConfig {
    pub device_id: String,
    pub file_seed: String,
    pub registry_seed: String,
    /// Paths that always get a code, in addition to those already stored.
    pub tracked_paths: Vec<String>,
}

impl Default for PrefsConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            file_seed: String::new(),
            registry_seed: REGISTRY_SEED.to_owned(),
            tracked_paths: Vec::new(),
        }
    }
}

impl PrefsConfig {
    pub fn file_domain(&self) -> TrustDomain {
        TrustDomain::file(self.file_seed.as_bytes())
    }

    pub fn registry_domain(&self) -> TrustDomain {
        TrustDomain::registry(self.registry_seed.as_bytes())
    }

    /// File and registry calculators for the configured device.
    pub fn calculators(&self) -> PrefsResult<(MacCalculator, MacCalculator)> {
        Ok((
            MacCalculator::new(&self.file_domain(), self.device_id.clone())?,
            MacCalculator::new(&self.registry_domain(), self.device_id.clone())?,
        ))
    }
}

impl AppConfig {
    /// Defaults, then `path` if it exists, then the environment.
    pub fn load(path: &Path) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if path.exists() {
            debug!(path = %path.display(), "loading configuration file");
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract()
    }
}
