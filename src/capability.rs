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

//! This module determines what a wrapped legacy device can do. Keymaster 1 devices are
//! probed through their `get_supported_*` entry points once at construction time.
//! Keymaster 2 removed those entry points and mandates the complete algorithm matrix,
//! which is what a keymaster 2 capability set describes.
//!
//! The resulting `CapabilitySet` is immutable and lets the translators reject
//! unsupported requests before they reach the legacy device.

use std::collections::{BTreeMap, BTreeSet};
use std::convert::TryFrom;
use std::fmt::Debug;

use anyhow::{Context, Result};

use crate::error::{map_km_error, translate_legacy_error, Ec, Error};
use crate::keymaster_definitions::{
    Algorithm, BlockMode, Digest, EcCurve, HardwareFeatures, KeyFormat, KeyPurpose, PaddingMode,
};
use crate::legacy::{
    Keymaster1Device, Keymaster2Device, LegacyError, ModuleInfo, KEYMASTER_SOFTWARE_ONLY,
};
use crate::watchdog as wd;

/// Generation of the wrapped legacy device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyVersion {
    /// keymaster1_device_t
    Keymaster1,
    /// keymaster2_device_t
    Keymaster2,
}

impl LegacyVersion {
    /// Decodes the generation byte of a key blob envelope.
    pub fn from_raw(v: u8) -> Option<Self> {
        match v {
            1 => Some(LegacyVersion::Keymaster1),
            2 => Some(LegacyVersion::Keymaster2),
            _ => None,
        }
    }

    /// Inverse of `from_raw`.
    pub fn to_raw(self) -> u8 {
        match self {
            LegacyVersion::Keymaster1 => 1,
            LegacyVersion::Keymaster2 => 2,
        }
    }
}

/// Modes, paddings and digests supported for one algorithm and purpose.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurposeCapabilities {
    pub block_modes: BTreeSet<BlockMode>,
    pub paddings: BTreeSet<PaddingMode>,
    pub digests: BTreeSet<Digest>,
}

/// Everything supported for one algorithm. Purposes absent from `purposes` are
/// unsupported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlgorithmCapabilities {
    pub purposes: BTreeMap<KeyPurpose, PurposeCapabilities>,
    pub import_formats: BTreeSet<KeyFormat>,
    pub export_formats: BTreeSet<KeyFormat>,
}

/// The immutable capability descriptor of a wrapped device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySet {
    version: LegacyVersion,
    algorithms: BTreeMap<Algorithm, AlgorithmCapabilities>,
    ec_curves: BTreeSet<EcCurve>,
    supports_attestation: bool,
    is_secure: bool,
    exclusive: bool,
    module: ModuleInfo,
}

const PROBED_PURPOSES: [KeyPurpose; 4] =
    [KeyPurpose::ENCRYPT, KeyPurpose::DECRYPT, KeyPurpose::SIGN, KeyPurpose::VERIFY];

const ALL_DIGESTS: [Digest; 7] = [
    Digest::NONE,
    Digest::MD5,
    Digest::SHA1,
    Digest::SHA_2_224,
    Digest::SHA_2_256,
    Digest::SHA_2_384,
    Digest::SHA_2_512,
];

const ALL_EC_CURVES: [EcCurve; 4] = [EcCurve::P_224, EcCurve::P_256, EcCurve::P_384, EcCurve::P_521];

/// Converts raw values reported by the device, dropping those the keymaster@3.0
/// interface does not define.
fn known<T>(raw: Vec<u32>, what: &str) -> BTreeSet<T>
where
    T: TryFrom<u32, Error = u32> + Ord,
{
    raw.into_iter()
        .filter_map(|v| match T::try_from(v) {
            Ok(t) => Some(t),
            Err(v) => {
                log::warn!("Ignoring unknown {} {} reported by legacy device.", what, v);
                None
            }
        })
        .collect()
}

/// Runs one probe call under the watchdog.
fn probe<T, F>(id: &'static str, deadline_ms: u64, f: F) -> Result<T, LegacyError>
where
    F: FnOnce() -> Result<T, LegacyError>,
{
    let _wp = wd::watch_millis(id, deadline_ms);
    f()
}

/// Like `probe`, but an `UNSUPPORTED_PURPOSE` answer yields `None`.
fn probe_purpose<T, F>(id: &'static str, deadline_ms: u64, f: F) -> Result<Option<T>>
where
    F: FnOnce() -> Result<T, LegacyError>,
{
    match probe(id, deadline_ms, f) {
        Ok(v) => Ok(Some(v)),
        Err(LegacyError::UNSUPPORTED_PURPOSE) => Ok(None),
        Err(e) => Err(translate_legacy_error(e)).context(id),
    }
}

impl CapabilitySet {
    /// Queries a keymaster 1 device for everything it supports. Fails if a probe fails
    /// for a reason other than an unsupported purpose, or if no usable algorithm remains.
    pub fn probe_km1(
        dev: &dyn Keymaster1Device,
        serialize_override: Option<bool>,
        deadline_ms: u64,
    ) -> Result<Self> {
        let raw_algorithms =
            map_km_error(probe("km1::get_supported_algorithms", deadline_ms, || {
                dev.get_supported_algorithms()
            }))
            .context("In probe_km1: get_supported_algorithms failed.")?;

        let mut algorithms = BTreeMap::new();
        for algorithm in known::<Algorithm>(raw_algorithms, "algorithm") {
            let a = algorithm as u32;
            let mut caps = AlgorithmCapabilities::default();
            for purpose in PROBED_PURPOSES.iter() {
                let p = *purpose as u32;
                let block_modes = probe_purpose("km1::get_supported_block_modes", deadline_ms, || {
                    dev.get_supported_block_modes(a, p)
                })
                .with_context(|| format!("In probe_km1: probing {:?} {:?}.", algorithm, purpose))?;
                let paddings =
                    probe_purpose("km1::get_supported_padding_modes", deadline_ms, || {
                        dev.get_supported_padding_modes(a, p)
                    })
                    .with_context(|| {
                        format!("In probe_km1: probing {:?} {:?}.", algorithm, purpose)
                    })?;
                let digests = probe_purpose("km1::get_supported_digests", deadline_ms, || {
                    dev.get_supported_digests(a, p)
                })
                .with_context(|| format!("In probe_km1: probing {:?} {:?}.", algorithm, purpose))?;

                if let (Some(block_modes), Some(paddings), Some(digests)) =
                    (block_modes, paddings, digests)
                {
                    caps.purposes.insert(
                        *purpose,
                        PurposeCapabilities {
                            block_modes: known(block_modes, "block mode"),
                            paddings: known(paddings, "padding mode"),
                            digests: known(digests, "digest"),
                        },
                    );
                }
            }
            if caps.purposes.is_empty() {
                log::warn!("Legacy device supports no purpose for {:?}, ignoring it.", algorithm);
                continue;
            }
            caps.import_formats = known(
                map_km_error(probe("km1::get_supported_import_formats", deadline_ms, || {
                    dev.get_supported_import_formats(a)
                }))
                .with_context(|| format!("In probe_km1: import formats of {:?}.", algorithm))?,
                "import format",
            );
            caps.export_formats = known(
                map_km_error(probe("km1::get_supported_export_formats", deadline_ms, || {
                    dev.get_supported_export_formats(a)
                }))
                .with_context(|| format!("In probe_km1: export formats of {:?}.", algorithm))?,
                "export format",
            );
            algorithms.insert(algorithm, caps);
        }

        if algorithms.is_empty() {
            return Err(Error::Km(Ec::UNSUPPORTED_ALGORITHM))
                .context("In probe_km1: Legacy device reports no usable algorithm.");
        }

        let ec_curves = if algorithms.contains_key(&Algorithm::EC) {
            ALL_EC_CURVES.iter().cloned().collect()
        } else {
            BTreeSet::new()
        };

        Ok(Self {
            version: LegacyVersion::Keymaster1,
            algorithms,
            ec_curves,
            supports_attestation: false,
            is_secure: dev.flags() & KEYMASTER_SOFTWARE_ONLY == 0,
            exclusive: serialize_override.unwrap_or(true),
            module: dev.module(),
        })
    }

    /// Keymaster 2 mandates the complete algorithm matrix, so nothing is probed.
    pub fn for_km2(dev: &dyn Keymaster2Device, serialize_override: Option<bool>) -> Self {
        fn set<T: Ord + Clone>(items: &[T]) -> BTreeSet<T> {
            items.iter().cloned().collect()
        }
        let purpose = |block_modes: &[BlockMode], paddings: &[PaddingMode], digests: &[Digest]| {
            PurposeCapabilities {
                block_modes: set(block_modes),
                paddings: set(paddings),
                digests: set(digests),
            }
        };

        let rsa_crypt = [PaddingMode::NONE, PaddingMode::RSA_OAEP, PaddingMode::RSA_PKCS1_1_5_ENCRYPT];
        let rsa_sign = [PaddingMode::NONE, PaddingMode::RSA_PSS, PaddingMode::RSA_PKCS1_1_5_SIGN];
        let aes_modes = [BlockMode::ECB, BlockMode::CBC, BlockMode::CTR, BlockMode::GCM];
        let aes_paddings = [PaddingMode::NONE, PaddingMode::PKCS7];
        let hmac_digests = &ALL_DIGESTS[2..];

        let mut algorithms = BTreeMap::new();
        algorithms.insert(
            Algorithm::RSA,
            AlgorithmCapabilities {
                purposes: vec![
                    (KeyPurpose::ENCRYPT, purpose(&[], &rsa_crypt, &ALL_DIGESTS)),
                    (KeyPurpose::DECRYPT, purpose(&[], &rsa_crypt, &ALL_DIGESTS)),
                    (KeyPurpose::SIGN, purpose(&[], &rsa_sign, &ALL_DIGESTS)),
                    (KeyPurpose::VERIFY, purpose(&[], &rsa_sign, &ALL_DIGESTS)),
                ]
                .into_iter()
                .collect(),
                import_formats: set(&[KeyFormat::PKCS8]),
                export_formats: set(&[KeyFormat::X509]),
            },
        );
        algorithms.insert(
            Algorithm::EC,
            AlgorithmCapabilities {
                purposes: vec![
                    (KeyPurpose::SIGN, purpose(&[], &[PaddingMode::NONE], &ALL_DIGESTS)),
                    (KeyPurpose::VERIFY, purpose(&[], &[PaddingMode::NONE], &ALL_DIGESTS)),
                ]
                .into_iter()
                .collect(),
                import_formats: set(&[KeyFormat::PKCS8]),
                export_formats: set(&[KeyFormat::X509]),
            },
        );
        algorithms.insert(
            Algorithm::AES,
            AlgorithmCapabilities {
                purposes: vec![
                    (KeyPurpose::ENCRYPT, purpose(&aes_modes, &aes_paddings, &[])),
                    (KeyPurpose::DECRYPT, purpose(&aes_modes, &aes_paddings, &[])),
                ]
                .into_iter()
                .collect(),
                import_formats: set(&[KeyFormat::RAW]),
                export_formats: BTreeSet::new(),
            },
        );
        algorithms.insert(
            Algorithm::HMAC,
            AlgorithmCapabilities {
                purposes: vec![
                    (KeyPurpose::SIGN, purpose(&[], &[], hmac_digests)),
                    (KeyPurpose::VERIFY, purpose(&[], &[], hmac_digests)),
                ]
                .into_iter()
                .collect(),
                import_formats: set(&[KeyFormat::RAW]),
                export_formats: BTreeSet::new(),
            },
        );

        Self {
            version: LegacyVersion::Keymaster2,
            algorithms,
            ec_curves: ALL_EC_CURVES.iter().cloned().collect(),
            supports_attestation: true,
            is_secure: dev.flags() & KEYMASTER_SOFTWARE_ONLY == 0,
            exclusive: serialize_override.unwrap_or(false),
            module: dev.module(),
        }
    }

    pub fn version(&self) -> LegacyVersion {
        self.version
    }

    pub fn supports_attestation(&self) -> bool {
        self.supports_attestation
    }

    /// True if every call into the legacy device must go through the device gate.
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn supports_ec_curve(&self, curve: EcCurve) -> bool {
        self.ec_curves.contains(&curve)
    }

    /// The v3 hardware feature record of the wrapped device.
    pub fn hardware_features(&self) -> HardwareFeatures {
        let signing_algorithms: Vec<&AlgorithmCapabilities> = [Algorithm::RSA, Algorithm::EC]
            .iter()
            .filter_map(|a| self.algorithms.get(a))
            .collect();
        let supports_all_digests = !signing_algorithms.is_empty()
            && signing_algorithms.iter().all(|caps| {
                caps.purposes
                    .get(&KeyPurpose::SIGN)
                    .map(|p| ALL_DIGESTS.iter().all(|d| p.digests.contains(d)))
                    .unwrap_or(false)
            });

        HardwareFeatures {
            isSecure: self.is_secure,
            supportsEllipticCurve: self.algorithms.contains_key(&Algorithm::EC),
            supportsSymmetricCryptography: self.algorithms.contains_key(&Algorithm::AES)
                || self.algorithms.contains_key(&Algorithm::HMAC),
            supportsAttestation: self.supports_attestation,
            supportsAllDigests: supports_all_digests,
            keymasterName: self.module.name.clone(),
            keymasterAuthorName: self.module.author.clone(),
        }
    }

    /// Looks up the capabilities of `algorithm`; `UNSUPPORTED_ALGORITHM` if there are none.
    pub fn algorithm(&self, algorithm: Algorithm) -> Result<&AlgorithmCapabilities, Error> {
        self.algorithms.get(&algorithm).ok_or(Error::Km(Ec::UNSUPPORTED_ALGORITHM))
    }

    /// Validates the authorizations of a key to be generated or imported. Each mode,
    /// padding and digest must be supported by at least one of the requested purposes.
    pub fn check_key_authorizations(
        &self,
        algorithm: Algorithm,
        purposes: &[KeyPurpose],
        block_modes: &[BlockMode],
        paddings: &[PaddingMode],
        digests: &[Digest],
    ) -> Result<(), Error> {
        let caps = self.algorithm(algorithm)?;
        let mut selected = Vec::new();
        for purpose in purposes {
            selected.push(caps.purposes.get(purpose).ok_or(Error::Km(Ec::UNSUPPORTED_PURPOSE))?);
        }
        if purposes.is_empty() {
            selected.extend(caps.purposes.values());
        }
        check_all(block_modes, &selected, |p| &p.block_modes, Ec::UNSUPPORTED_BLOCK_MODE)?;
        check_all(paddings, &selected, |p| &p.paddings, Ec::UNSUPPORTED_PADDING_MODE)?;
        check_all(digests, &selected, |p| &p.digests, Ec::UNSUPPORTED_DIGEST)
    }

    /// Validates the parameters of an operation against what the device supports for
    /// `algorithm` and `purpose`.
    pub fn check_operation(
        &self,
        algorithm: Algorithm,
        purpose: KeyPurpose,
        block_modes: &[BlockMode],
        paddings: &[PaddingMode],
        digests: &[Digest],
    ) -> Result<(), Error> {
        let caps = self
            .algorithm(algorithm)?
            .purposes
            .get(&purpose)
            .ok_or(Error::Km(Ec::UNSUPPORTED_PURPOSE))?;
        let selected = [caps];
        check_all(block_modes, &selected, |p| &p.block_modes, Ec::UNSUPPORTED_BLOCK_MODE)?;
        check_all(paddings, &selected, |p| &p.paddings, Ec::UNSUPPORTED_PADDING_MODE)?;
        check_all(digests, &selected, |p| &p.digests, Ec::UNSUPPORTED_DIGEST)
    }

    /// `UNSUPPORTED_KEY_FORMAT` unless keys of `algorithm` can be imported in `format`.
    pub fn check_import_format(&self, algorithm: Algorithm, format: KeyFormat) -> Result<(), Error> {
        if self.algorithm(algorithm)?.import_formats.contains(&format) {
            Ok(())
        } else {
            Err(Error::Km(Ec::UNSUPPORTED_KEY_FORMAT))
        }
    }
}

fn check_all<T, F>(
    requested: &[T],
    selected: &[&PurposeCapabilities],
    field: F,
    unsupported: crate::keymaster_definitions::ErrorCode,
) -> Result<(), Error>
where
    T: Ord + Debug,
    F: Fn(&PurposeCapabilities) -> &BTreeSet<T>,
{
    match requested.iter().find(|r| !selected.iter().any(|p| field(*p).contains(*r))) {
        Some(r) => {
            log::debug!("Legacy device does not support {:?}.", r);
            Err(Error::Km(unsupported))
        }
        None => Ok(()),
    }
}
