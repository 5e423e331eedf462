// Copyright 2024, The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Adapter configuration. The system version values are reported to keymaster 2
//! devices through `configure` and recorded in every key blob envelope; the remaining
//! fields tune the adapter itself.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[cfg(target_os = "android")]
const CONFIG_PATH: &str = "/vendor/etc/skeymaster/config.toml";

#[cfg(not(target_os = "android"))]
const CONFIG_PATH: &str = "./skeymaster/config.toml";

/// Maximal number of concurrent operations per adapter unless configured otherwise.
pub const DEFAULT_MAX_OPERATIONS: usize = 16;

/// Legacy calls taking longer than this are reported by the watchdog.
pub const DEFAULT_LEGACY_CALL_DEADLINE_MS: u64 = 500;

lazy_static::lazy_static! {
    /// The configuration used by the factory functions that take no explicit `Config`.
    pub static ref CONFIG: Config = Config::load(Path::new(CONFIG_PATH));
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Release string of the running system, e.g. "8.1.0".
    pub os_version: String,
    /// Security patch date of the running system, e.g. "2018-05-05".
    pub security_patch: String,
    /// Maximal number of concurrently open operations.
    pub max_operations: usize,
    /// Forces (`true`) or disables (`false`) serialization of all calls into the legacy
    /// device. When absent, keymaster 1 devices are serialized and keymaster 2 devices
    /// are not.
    pub serialize_legacy_calls: Option<bool>,
    /// Deadline for a single legacy call, in milliseconds, after which the watchdog
    /// starts logging.
    pub legacy_call_deadline_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            os_version: "8.1.0".to_string(),
            security_patch: "2018-05-05".to_string(),
            max_operations: DEFAULT_MAX_OPERATIONS,
            serialize_legacy_calls: None,
            legacy_call_deadline_ms: DEFAULT_LEGACY_CALL_DEADLINE_MS,
        }
    }
}

/// OS version and patch level in keymaster encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemVersion {
    pub os_version: u32,
    pub os_patchlevel: u32,
}

impl Config {
    /// Reads the configuration from `path`. A missing or malformed file is logged and
    /// yields the default configuration.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match Self::from_toml_str(&s) {
                Ok(c) => c,
                Err(e) => {
                    log::error!("Failed to parse config file {:?}, using default: {:?}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                log::error!("Failed to read config file {:?}, using default: {:?}", path, e);
                Self::default()
            }
        }
    }

    /// Parses a configuration from a TOML document. Absent fields take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).context("In Config::from_toml_str.")?;
        if config.max_operations == 0 {
            return Err(anyhow::anyhow!("max_operations must be at least 1."))
                .context("In Config::from_toml_str.");
        }
        Ok(config)
    }

    /// The encoded OS version and patch level of the running system.
    pub fn system_version(&self) -> SystemVersion {
        SystemVersion {
            os_version: self.os_version_value(),
            os_patchlevel: self.os_patchlevel_value(),
        }
    }

    /// The OS version in keymaster encoding, `major * 10000 + minor * 100 + patch`.
    pub fn os_version_value(&self) -> u32 {
        encode_os_version(&self.os_version).unwrap_or_else(|| {
            log::warn!("Cannot parse os_version {:?}, reporting 0.", self.os_version);
            0
        })
    }

    /// The security patch level in keymaster encoding, `YYYYMM`.
    pub fn os_patchlevel_value(&self) -> u32 {
        encode_patchlevel(&self.security_patch).unwrap_or_else(|| {
            log::warn!("Cannot parse security_patch {:?}, reporting 0.", self.security_patch);
            0
        })
    }
}

/// Encodes a release string like "8.1.0" as 80100. Missing minor or patch components
/// count as 0.
pub fn encode_os_version(release: &str) -> Option<u32> {
    let mut parts = release.trim().split('.');
    let mut next = |limit: u32| -> Option<u32> {
        match parts.next() {
            None => Some(0),
            Some(p) => p.parse::<u32>().ok().filter(|v| *v < limit),
        }
    };
    let major = next(u32::MAX / 10000)?;
    let minor = next(100)?;
    let patch = next(100)?;
    if parts.next().is_some() {
        return None;
    }
    Some(major * 10000 + minor * 100 + patch)
}

/// Encodes a security patch date like "2018-05-05" (or "2018-05") as 201805.
pub fn encode_patchlevel(date: &str) -> Option<u32> {
    let mut parts = date.trim().split('-');
    let year = parts.next().filter(|y| y.len() == 4)?.parse::<u32>().ok()?;
    let month = parts.next()?.parse::<u32>().ok().filter(|m| (1..=12).contains(m))?;
    Some(year * 100 + month)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::utils::TempDir;

    #[test]
    fn os_version_encoding() {
        assert_eq!(encode_os_version("8.1.0"), Some(80100));
        assert_eq!(encode_os_version("7.1.2"), Some(70102));
        assert_eq!(encode_os_version("9"), Some(90000));
        assert_eq!(encode_os_version("8.1"), Some(80100));
        assert_eq!(encode_os_version("8.100.0"), None);
        assert_eq!(encode_os_version("O"), None);
        assert_eq!(encode_os_version("8.1.0.1"), None);
    }

    #[test]
    fn patchlevel_encoding() {
        assert_eq!(encode_patchlevel("2018-05-05"), Some(201805));
        assert_eq!(encode_patchlevel("2017-12"), Some(201712));
        assert_eq!(encode_patchlevel("2017-13-01"), None);
        assert_eq!(encode_patchlevel("17-01-01"), None);
        assert_eq!(encode_patchlevel(""), None);
    }

    #[test]
    fn unparsable_values_encode_as_zero() {
        let config = Config {
            os_version: "Oreo".to_string(),
            security_patch: "soon".to_string(),
            ..Default::default()
        };
        assert_eq!(config.os_version_value(), 0);
        assert_eq!(config.os_patchlevel_value(), 0);
    }

    #[test]
    fn partial_document_takes_defaults() -> Result<()> {
        let config = Config::from_toml_str(
            r#"
            os_version = "8.0.0"
            serialize_legacy_calls = true
            "#,
        )?;
        assert_eq!(
            config.system_version(),
            SystemVersion { os_version: 80000, os_patchlevel: 201805 }
        );
        assert_eq!(config.serialize_legacy_calls, Some(true));
        assert_eq!(config.max_operations, DEFAULT_MAX_OPERATIONS);
        assert_eq!(config.legacy_call_deadline_ms, DEFAULT_LEGACY_CALL_DEADLINE_MS);
        Ok(())
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(Config::from_toml_str("max_operations = \"many\"").is_err());
        assert!(Config::from_toml_str("max_operations = 0").is_err());
    }

    #[test]
    fn load_falls_back_to_default() -> Result<()> {
        android_logger::init_once(
            android_logger::Config::default()
                .with_tag("skeymaster_config_tests")
                .with_max_level(log::LevelFilter::Debug),
        );
        let temp_dir = TempDir::new("load_falls_back_to_default")?;

        assert_eq!(Config::load(&temp_dir.build().push("missing.toml")), Config::default());

        let broken = temp_dir.write("broken.toml", "os_version = [")?;
        assert_eq!(Config::load(&broken), Config::default());

        let good =
            temp_dir.write("good.toml", "max_operations = 4\nlegacy_call_deadline_ms = 50\n")?;
        let config = Config::load(&good);
        assert_eq!(config.max_operations, 4);
        assert_eq!(config.legacy_call_deadline_ms, 50);
        Ok(())
    }
}
