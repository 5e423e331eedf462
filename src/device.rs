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

//! This crate implements the `IKeymasterDevice` interface on top of a legacy
//! keymaster 1 or keymaster 2 device. `SKeymasterDevice` checks key blob envelopes,
//! owns the operation table, and hands everything else to the `RequestTranslator`
//! chosen when it was created.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::capability::{CapabilitySet, LegacyVersion};
use crate::config::{Config, SystemVersion, CONFIG};
use crate::error::{map_or_log_err, Ec, Error};
use crate::key_blob::KeyBlob;
use crate::key_parameter::KeyParameter;
use crate::keymaster_definitions::{
    BeginResult, FinishResult, HardwareFeatures, IKeymasterDevice, KeyCharacteristics,
    KeyCreationResult, KeyFormat, KeyPurpose, KmResult, UpdateResult,
};
use crate::legacy::{Keymaster1Device, Keymaster2Device};
use crate::operation::{Operation, OperationDb, Outcome};
use crate::translator::km1::Keymaster1Translator;
use crate::translator::km2::Keymaster2Translator;
use crate::translator::{opt, RequestTranslator};

// Entropy contributions larger than this are refused.
const MAX_ENTROPY_DATA: usize = 2048;

/// Wraps a keymaster 1 device in the keymaster@3.0 interface, configured from
/// the system configuration file.
pub fn create_skeymaster_device_km1(
    dev: Arc<dyn Keymaster1Device>,
) -> Result<Box<dyn IKeymasterDevice>> {
    create_skeymaster_device_km1_with_config(dev, &CONFIG)
}

/// Like `create_skeymaster_device_km1` with an explicit configuration.
pub fn create_skeymaster_device_km1_with_config(
    dev: Arc<dyn Keymaster1Device>,
    config: &Config,
) -> Result<Box<dyn IKeymasterDevice>> {
    Ok(Box::new(
        SKeymasterDevice::new_km1(dev, config).context("In create_skeymaster_device_km1.")?,
    ))
}

/// Wraps a keymaster 2 device in the keymaster@3.0 interface, configured from
/// the system configuration file.
pub fn create_skeymaster_device_km2(
    dev: Arc<dyn Keymaster2Device>,
) -> Result<Box<dyn IKeymasterDevice>> {
    create_skeymaster_device_km2_with_config(dev, &CONFIG)
}

/// Like `create_skeymaster_device_km2` with an explicit configuration.
pub fn create_skeymaster_device_km2_with_config(
    dev: Arc<dyn Keymaster2Device>,
    config: &Config,
) -> Result<Box<dyn IKeymasterDevice>> {
    Ok(Box::new(
        SKeymasterDevice::new_km2(dev, config).context("In create_skeymaster_device_km2.")?,
    ))
}

/// Implementation of `IKeymasterDevice` for one wrapped legacy device.
pub struct SKeymasterDevice {
    translator: Arc<dyn RequestTranslator>,
    caps: Arc<CapabilitySet>,
    operations: OperationDb,
    system: SystemVersion,
}

impl SKeymasterDevice {
    /// Probes the capabilities of a keymaster 1 device and wraps it.
    pub fn new_km1(dev: Arc<dyn Keymaster1Device>, config: &Config) -> Result<Self> {
        Self::check_config(config).context("In SKeymasterDevice::new_km1.")?;
        let caps = Arc::new(
            CapabilitySet::probe_km1(
                dev.as_ref(),
                config.serialize_legacy_calls,
                config.legacy_call_deadline_ms,
            )
            .context("In SKeymasterDevice::new_km1: Probing capabilities failed.")?,
        );
        let translator =
            Arc::new(Keymaster1Translator::new(dev, caps.clone(), config.legacy_call_deadline_ms));
        Ok(Self::new(translator, caps, config))
    }

    /// Configures a keymaster 2 device and wraps it.
    pub fn new_km2(dev: Arc<dyn Keymaster2Device>, config: &Config) -> Result<Self> {
        Self::check_config(config).context("In SKeymasterDevice::new_km2.")?;
        let caps = Arc::new(CapabilitySet::for_km2(dev.as_ref(), config.serialize_legacy_calls));
        let translator = Arc::new(
            Keymaster2Translator::new(
                dev,
                caps.clone(),
                config.system_version(),
                config.legacy_call_deadline_ms,
            )
            .context("In SKeymasterDevice::new_km2.")?,
        );
        Ok(Self::new(translator, caps, config))
    }

    /// Rejects configurations the adapter cannot run with, before the device is touched.
    fn check_config(config: &Config) -> Result<()> {
        if config.max_operations == 0 {
            return Err(Error::Km(Ec::INVALID_ARGUMENT))
                .context("In check_config: max_operations must be at least 1.");
        }
        Ok(())
    }

    fn new(translator: Arc<dyn RequestTranslator>, caps: Arc<CapabilitySet>, config: &Config) -> Self {
        let features = caps.hardware_features();
        log::info!(
            "Wrapping {:?} device \"{}\" by \"{}\" (secure: {}, exclusive: {}).",
            caps.version(),
            features.keymasterName,
            features.keymasterAuthorName,
            features.isSecure,
            caps.is_exclusive()
        );
        Self {
            translator,
            caps,
            operations: OperationDb::new(config.max_operations),
            system: config.system_version(),
        }
    }

    /// Unwraps a key blob produced by this adapter's legacy generation.
    fn parse_blob(&self, blob: &[u8]) -> Result<KeyBlob> {
        KeyBlob::parse_for(blob, self.caps.version()).context("In parse_blob.")
    }

    /// Keymaster 2 blobs created under an older system version must be upgraded first.
    /// Blobs with any component newer than the system can never be upgraded and are
    /// rejected as invalid.
    fn check_current(&self, blob: &KeyBlob) -> Result<()> {
        if blob.generation() != LegacyVersion::Keymaster2 {
            return Ok(());
        }
        if blob.is_newer_than(&self.system) {
            return Err(Error::Km(Ec::INVALID_KEY_BLOB)).context(format!(
                "In check_current: Blob from {:?} is newer than {:?}.",
                blob.created(),
                self.system
            ));
        }
        if blob.is_older_than(&self.system) {
            return Err(Error::Km(Ec::KEY_REQUIRES_UPGRADE)).context(format!(
                "In check_current: Blob from {:?} predates {:?}.",
                blob.created(),
                self.system
            ));
        }
        Ok(())
    }

    fn add_rng_entropy(&self, data: &[u8]) -> Result<()> {
        if data.len() > MAX_ENTROPY_DATA {
            return Err(Error::Km(Ec::INVALID_INPUT_LENGTH)).context(format!(
                "In add_rng_entropy: {} bytes of entropy exceed the limit of {}.",
                data.len(),
                MAX_ENTROPY_DATA
            ));
        }
        self.translator.add_rng_entropy(data).context("In add_rng_entropy.")
    }

    fn get_key_characteristics(
        &self,
        key_blob: &[u8],
        client_id: &[u8],
        app_data: &[u8],
    ) -> Result<KeyCharacteristics> {
        let blob = self.parse_blob(key_blob).context("In get_key_characteristics.")?;
        self.check_current(&blob).context("In get_key_characteristics.")?;
        self.translator
            .get_key_characteristics(&blob, opt(client_id), opt(app_data))
            .context("In get_key_characteristics.")
    }

    fn export_key(
        &self,
        format: KeyFormat,
        key_blob: &[u8],
        client_id: &[u8],
        app_data: &[u8],
    ) -> Result<Vec<u8>> {
        let blob = self.parse_blob(key_blob).context("In export_key.")?;
        self.check_current(&blob).context("In export_key.")?;
        self.translator
            .export_key(format, &blob, opt(client_id), opt(app_data))
            .context("In export_key.")
    }

    fn attest_key(&self, key_blob: &[u8], params: &[KeyParameter]) -> Result<Vec<Vec<u8>>> {
        if !self.caps.supports_attestation() {
            return Err(Error::unimplemented())
                .context("In attest_key: Legacy device does not support attestation.");
        }
        if !params.iter().any(|p| matches!(p, KeyParameter::AttestationChallenge(_))) {
            return Err(Error::Km(Ec::ATTESTATION_CHALLENGE_MISSING)).context("In attest_key.");
        }
        if !params.iter().any(|p| matches!(p, KeyParameter::AttestationApplicationId(_))) {
            return Err(Error::Km(Ec::ATTESTATION_APPLICATION_ID_MISSING))
                .context("In attest_key.");
        }
        let blob = self.parse_blob(key_blob).context("In attest_key.")?;
        self.check_current(&blob).context("In attest_key.")?;
        self.translator.attest_key(&blob, params).context("In attest_key.")
    }

    fn upgrade_key(&self, key_blob: &[u8], params: &[KeyParameter]) -> Result<Vec<u8>> {
        let blob = self.parse_blob(key_blob).context("In upgrade_key.")?;
        self.translator.upgrade_key(&blob, params).context("In upgrade_key.")
    }

    fn delete_key(&self, key_blob: &[u8]) -> Result<()> {
        let blob = self.parse_blob(key_blob).context("In delete_key.")?;
        self.translator.delete_key(&blob).context("In delete_key.")
    }

    fn begin_operation(
        &self,
        purpose: KeyPurpose,
        key_blob: &[u8],
        params: &[KeyParameter],
    ) -> Result<BeginResult> {
        let blob = self.parse_blob(key_blob).context("In begin_operation.")?;
        self.check_current(&blob).context("In begin_operation.")?;

        let reservation = self.operations.reserve().context("In begin_operation.")?;
        let mut legacy_op =
            self.translator.begin(purpose, &blob, params).context("In begin_operation.")?;
        let out_params = std::mem::take(&mut legacy_op.out_params);
        let translator = self.translator.clone();
        let handle =
            reservation.commit(|handle| Operation::new(handle, legacy_op, translator));
        log::debug!("Began {:?} operation {:#x}.", purpose, handle);

        Ok(BeginResult { outParams: out_params, operationHandle: handle })
    }

    fn update_operation(
        &self,
        handle: u64,
        params: &[KeyParameter],
        input: &[u8],
    ) -> Result<UpdateResult> {
        let op = self.operations.get(handle).context("In update_operation.")?;
        let result = op.update(params, input).context("In update_operation.");
        // Any error here means we can discard the operation.
        if result.is_err() {
            self.operations.remove(handle);
        }
        result
    }

    fn finish_operation(
        &self,
        handle: u64,
        params: &[KeyParameter],
        input: &[u8],
        signature: &[u8],
    ) -> Result<FinishResult> {
        let op = self.operations.get(handle).context("In finish_operation.")?;
        let result = op.finish(params, input, signature).context("In finish_operation.");
        self.operations.remove(handle);
        result
    }

    fn abort_operation(&self, handle: u64) -> Result<()> {
        let op = self.operations.get(handle).context("In abort_operation.")?;
        let result = op.abort(Outcome::Abort).context("In abort_operation.");
        self.operations.remove(handle);
        result
    }
}

impl Drop for SKeymasterDevice {
    fn drop(&mut self) {
        let outstanding = self.operations.clear();
        if outstanding > 0 {
            log::info!("Adapter torn down with {} outstanding operations.", outstanding);
        }
    }
}

#[allow(non_snake_case)]
impl IKeymasterDevice for SKeymasterDevice {
    fn getHardwareFeatures(&self) -> HardwareFeatures {
        self.caps.hardware_features()
    }

    fn addRngEntropy(&self, data: &[u8]) -> KmResult<()> {
        map_or_log_err(self.add_rng_entropy(data), Ok)
    }

    fn generateKey(&self, keyParams: &[KeyParameter]) -> KmResult<KeyCreationResult> {
        map_or_log_err(self.translator.generate_key(keyParams).context("In generateKey."), Ok)
    }

    fn importKey(
        &self,
        params: &[KeyParameter],
        keyFormat: KeyFormat,
        keyData: &[u8],
    ) -> KmResult<KeyCreationResult> {
        map_or_log_err(
            self.translator.import_key(params, keyFormat, keyData).context("In importKey."),
            Ok,
        )
    }

    fn getKeyCharacteristics(
        &self,
        keyBlob: &[u8],
        clientId: &[u8],
        appData: &[u8],
    ) -> KmResult<KeyCharacteristics> {
        map_or_log_err(self.get_key_characteristics(keyBlob, clientId, appData), Ok)
    }

    fn exportKey(
        &self,
        keyFormat: KeyFormat,
        keyBlob: &[u8],
        clientId: &[u8],
        appData: &[u8],
    ) -> KmResult<Vec<u8>> {
        map_or_log_err(self.export_key(keyFormat, keyBlob, clientId, appData), Ok)
    }

    fn attestKey(
        &self,
        keyToAttest: &[u8],
        attestParams: &[KeyParameter],
    ) -> KmResult<Vec<Vec<u8>>> {
        map_or_log_err(self.attest_key(keyToAttest, attestParams), Ok)
    }

    fn upgradeKey(
        &self,
        keyBlobToUpgrade: &[u8],
        upgradeParams: &[KeyParameter],
    ) -> KmResult<Vec<u8>> {
        map_or_log_err(self.upgrade_key(keyBlobToUpgrade, upgradeParams), Ok)
    }

    fn deleteKey(&self, keyBlob: &[u8]) -> KmResult<()> {
        map_or_log_err(self.delete_key(keyBlob), Ok)
    }

    fn deleteAllKeys(&self) -> KmResult<()> {
        map_or_log_err(self.translator.delete_all_keys().context("In deleteAllKeys."), Ok)
    }

    fn destroyAttestationIds(&self) -> KmResult<()> {
        map_or_log_err(
            Err(Error::unimplemented())
                .context("In destroyAttestationIds: Not supported by legacy devices."),
            Ok,
        )
    }

    fn begin(
        &self,
        purpose: KeyPurpose,
        key: &[u8],
        inParams: &[KeyParameter],
    ) -> KmResult<BeginResult> {
        map_or_log_err(self.begin_operation(purpose, key, inParams), Ok)
    }

    fn update(
        &self,
        operationHandle: u64,
        inParams: &[KeyParameter],
        input: &[u8],
    ) -> KmResult<UpdateResult> {
        map_or_log_err(self.update_operation(operationHandle, inParams, input), Ok)
    }

    fn finish(
        &self,
        operationHandle: u64,
        inParams: &[KeyParameter],
        input: &[u8],
        signature: &[u8],
    ) -> KmResult<FinishResult> {
        map_or_log_err(self.finish_operation(operationHandle, inParams, input, signature), Ok)
    }

    fn abort(&self, operationHandle: u64) -> KmResult<()> {
        map_or_log_err(self.abort_operation(operationHandle), Ok)
    }
}
