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

//! Translation onto keymaster 2 devices. Keymaster 2 is semantically close to
//! keymaster@3.0, so calls are forwarded one to one once they pass the capability
//! checks. Blobs are enveloped with the system version the device was configured with.

use std::sync::Arc;

use anyhow::{Context, Result};

use super::{
    app_binding, block_modes, characteristics_from_legacy, digests, find_algorithm, paddings,
    purposes, LegacyCaller, LegacyOperation, OperationContext, RequestTranslator,
};
use crate::capability::{CapabilitySet, LegacyVersion};
use crate::config::SystemVersion;
use crate::error::{Ec, Error};
use crate::key_blob::KeyBlob;
use crate::key_parameter::{self, Algorithm, KeyParameter, KeyPurpose};
use crate::keymaster_definitions::{
    FinishResult, KeyCharacteristics, KeyCreationResult, KeyFormat, UpdateResult,
};
use crate::legacy::{KmKeyCharacteristics, Keymaster2Device};

pub struct Keymaster2Translator {
    dev: Arc<dyn Keymaster2Device>,
    caps: Arc<CapabilitySet>,
    caller: LegacyCaller,
    system: SystemVersion,
}

impl Keymaster2Translator {
    /// Configures `dev` with the system version. A device that refuses the
    /// configuration is unusable, so construction fails.
    pub fn new(
        dev: Arc<dyn Keymaster2Device>,
        caps: Arc<CapabilitySet>,
        system: SystemVersion,
        deadline_ms: u64,
    ) -> Result<Self> {
        let caller = LegacyCaller::new(caps.is_exclusive(), deadline_ms);
        let params = key_parameter::to_legacy(&[
            KeyParameter::OsVersion(system.os_version),
            KeyParameter::OsPatchLevel(system.os_patchlevel),
        ]);
        caller
            .call("km2::configure", || dev.configure(&params))
            .context("In Keymaster2Translator::new: configure failed.")?;
        log::info!(
            "Configured keymaster 2 device with os_version {} os_patchlevel {}.",
            system.os_version,
            system.os_patchlevel
        );
        Ok(Self { dev, caps, caller, system })
    }

    /// Validates a key description against the capabilities and returns its algorithm.
    fn check_key_params(&self, params: &[KeyParameter]) -> Result<Algorithm> {
        let algorithm = find_algorithm(params)
            .ok_or(Error::Km(Ec::UNSUPPORTED_ALGORITHM))
            .context("In check_key_params: No algorithm specified.")?;
        self.caps
            .check_key_authorizations(
                algorithm,
                &purposes(params),
                &block_modes(params),
                &paddings(params),
                &digests(params),
            )
            .context("In check_key_params.")?;
        Ok(algorithm)
    }

    fn wrap_key(&self, blob: Vec<u8>, kc: KmKeyCharacteristics) -> Result<KeyCreationResult> {
        Ok(KeyCreationResult {
            keyBlob: KeyBlob::new(LegacyVersion::Keymaster2, self.system, blob)
                .encode()
                .context("In wrap_key.")?,
            keyCharacteristics: characteristics_from_legacy(kc),
        })
    }
}

impl RequestTranslator for Keymaster2Translator {
    fn version(&self) -> LegacyVersion {
        LegacyVersion::Keymaster2
    }

    fn add_rng_entropy(&self, data: &[u8]) -> Result<()> {
        self.caller
            .call("km2::add_rng_entropy", || self.dev.add_rng_entropy(data))
            .context("In Keymaster2Translator::add_rng_entropy.")
    }

    fn generate_key(&self, params: &[KeyParameter]) -> Result<KeyCreationResult> {
        self.check_key_params(params).context("In Keymaster2Translator::generate_key.")?;
        let legacy_params = key_parameter::to_legacy(params);
        let (blob, kc) = self
            .caller
            .call("km2::generate_key", || self.dev.generate_key(&legacy_params))
            .context("In Keymaster2Translator::generate_key.")?;
        self.wrap_key(blob, kc).context("In Keymaster2Translator::generate_key.")
    }

    fn import_key(
        &self,
        params: &[KeyParameter],
        format: KeyFormat,
        key_data: &[u8],
    ) -> Result<KeyCreationResult> {
        let algorithm =
            self.check_key_params(params).context("In Keymaster2Translator::import_key.")?;
        self.caps
            .check_import_format(algorithm, format)
            .context("In Keymaster2Translator::import_key.")?;
        let legacy_params = key_parameter::to_legacy(params);
        let (blob, kc) = self
            .caller
            .call("km2::import_key", || {
                self.dev.import_key(&legacy_params, format as u32, key_data)
            })
            .context("In Keymaster2Translator::import_key.")?;
        self.wrap_key(blob, kc).context("In Keymaster2Translator::import_key.")
    }

    fn get_key_characteristics(
        &self,
        blob: &KeyBlob,
        client_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
    ) -> Result<KeyCharacteristics> {
        let kc = self
            .caller
            .call("km2::get_key_characteristics", || {
                self.dev.get_key_characteristics(blob.legacy_blob(), client_id, app_data)
            })
            .context("In Keymaster2Translator::get_key_characteristics.")?;
        Ok(characteristics_from_legacy(kc))
    }

    fn export_key(
        &self,
        format: KeyFormat,
        blob: &KeyBlob,
        client_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        self.caller
            .call("km2::export_key", || {
                self.dev.export_key(format as u32, blob.legacy_blob(), client_id, app_data)
            })
            .context("In Keymaster2Translator::export_key.")
    }

    fn attest_key(&self, blob: &KeyBlob, params: &[KeyParameter]) -> Result<Vec<Vec<u8>>> {
        let legacy_params = key_parameter::to_legacy(params);
        self.caller
            .call("km2::attest_key", || self.dev.attest_key(blob.legacy_blob(), &legacy_params))
            .context("In Keymaster2Translator::attest_key.")
    }

    fn upgrade_key(&self, blob: &KeyBlob, params: &[KeyParameter]) -> Result<Vec<u8>> {
        if blob.is_newer_than(&self.system) {
            return Err(Error::Km(Ec::INVALID_ARGUMENT)).context(format!(
                "In Keymaster2Translator::upgrade_key: Blob from {:?} is newer than {:?}.",
                blob.created(),
                self.system
            ));
        }
        if !blob.is_older_than(&self.system) {
            return blob.encode().context("In Keymaster2Translator::upgrade_key.");
        }
        let legacy_params = key_parameter::to_legacy(params);
        let upgraded = self
            .caller
            .call("km2::upgrade_key", || self.dev.upgrade_key(blob.legacy_blob(), &legacy_params))
            .context("In Keymaster2Translator::upgrade_key.")?;
        KeyBlob::new(LegacyVersion::Keymaster2, self.system, upgraded)
            .encode()
            .context("In Keymaster2Translator::upgrade_key.")
    }

    fn delete_key(&self, blob: &KeyBlob) -> Result<()> {
        self.caller
            .call("km2::delete_key", || self.dev.delete_key(blob.legacy_blob()))
            .context("In Keymaster2Translator::delete_key.")
    }

    fn delete_all_keys(&self) -> Result<()> {
        self.caller
            .call("km2::delete_all_keys", || self.dev.delete_all_keys())
            .context("In Keymaster2Translator::delete_all_keys.")
    }

    fn begin(
        &self,
        purpose: KeyPurpose,
        blob: &KeyBlob,
        params: &[KeyParameter],
    ) -> Result<LegacyOperation> {
        let (app_id, app_data) = app_binding(params);
        let characteristics = self
            .get_key_characteristics(blob, app_id, app_data)
            .context("In Keymaster2Translator::begin: Looking up the key's algorithm.")?;
        let algorithm = find_algorithm(characteristics.iter())
            .ok_or(Error::Km(Ec::UNSUPPORTED_ALGORITHM))
            .context("In Keymaster2Translator::begin: Key has no algorithm.")?;
        self.caps
            .check_operation(
                algorithm,
                purpose,
                &block_modes(params),
                &paddings(params),
                &digests(params),
            )
            .context("In Keymaster2Translator::begin.")?;

        let legacy_params = key_parameter::to_legacy(params);
        let r = self
            .caller
            .call("km2::begin", || {
                self.dev.begin(purpose as u32, blob.legacy_blob(), &legacy_params)
            })
            .context("In Keymaster2Translator::begin.")?;
        Ok(LegacyOperation {
            legacy_handle: r.handle,
            out_params: key_parameter::from_legacy_lossy(r.out_params),
            context: OperationContext { purpose, algorithm: Some(algorithm) },
        })
    }

    fn update(
        &self,
        _context: &OperationContext,
        legacy_handle: u64,
        params: &[KeyParameter],
        input: &[u8],
    ) -> Result<UpdateResult> {
        let legacy_params = key_parameter::to_legacy(params);
        let r = self
            .caller
            .call("km2::update", || self.dev.update(legacy_handle, &legacy_params, input))
            .context("In Keymaster2Translator::update.")?;
        if r.input_consumed > input.len() {
            if let Err(e) = self.caller.call("km2::abort", || self.dev.abort(legacy_handle)) {
                log::error!("In Keymaster2Translator::update: abort failed: {:?}", e);
            }
            return Err(Error::Km(Ec::UNKNOWN_ERROR)).context(format!(
                "In Keymaster2Translator::update: Legacy update consumed {} of {} bytes.",
                r.input_consumed,
                input.len()
            ));
        }
        Ok(UpdateResult {
            inputConsumed: r.input_consumed as u32,
            outParams: key_parameter::from_legacy_lossy(r.out_params),
            output: r.output,
        })
    }

    fn finish(
        &self,
        _context: &OperationContext,
        legacy_handle: u64,
        params: &[KeyParameter],
        input: &[u8],
        signature: &[u8],
    ) -> Result<FinishResult> {
        let legacy_params = key_parameter::to_legacy(params);
        let r = self
            .caller
            .call("km2::finish", || {
                self.dev.finish(legacy_handle, &legacy_params, input, signature)
            })
            .context("In Keymaster2Translator::finish.")?;
        Ok(FinishResult {
            outParams: key_parameter::from_legacy_lossy(r.out_params),
            output: r.output,
        })
    }

    fn abort(&self, legacy_handle: u64) -> Result<()> {
        self.caller
            .call("km2::abort", || self.dev.abort(legacy_handle))
            .context("In Keymaster2Translator::abort.")
    }
}
