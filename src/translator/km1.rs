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

//! Translation onto keymaster 1 devices.
//!
//! Keymaster 1 predates several keymaster@3.0 features, which is handled as follows:
//!  * Tags introduced later are rejected with `UNSUPPORTED_TAG`.
//!  * EC keys are identified by key size, so `EC_CURVE` is converted into `KEY_SIZE` on
//!    the way in and reconstructed from `KEY_SIZE` on the way out.
//!  * Requests are checked against the probed `CapabilitySet`.
//!  * `finish` takes no input, so input to `finish` is fed through `update` first.
//!  * There is no attestation and no key upgrade. Keymaster 1 blobs are not bound to
//!    a system version and never need upgrading.

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
use crate::key_parameter::{self, Algorithm, EcCurve, KeyParameter, KeyPurpose, Tag};
use crate::keymaster_definitions::{
    FinishResult, KeyCharacteristics, KeyCreationResult, KeyFormat, UpdateResult,
};
use crate::legacy::{KmKeyCharacteristics, Keymaster1Device};

/// Tags that keymaster 1 does not know.
const POST_KM1_TAGS: &[Tag] = &[
    Tag::INCLUDE_UNIQUE_ID,
    Tag::ALLOW_WHILE_ON_BODY,
    Tag::OS_VERSION,
    Tag::OS_PATCHLEVEL,
    Tag::UNIQUE_ID,
    Tag::ATTESTATION_CHALLENGE,
    Tag::ATTESTATION_APPLICATION_ID,
    Tag::ATTESTATION_ID_BRAND,
    Tag::ATTESTATION_ID_DEVICE,
    Tag::ATTESTATION_ID_PRODUCT,
    Tag::ATTESTATION_ID_SERIAL,
    Tag::ATTESTATION_ID_IMEI,
    Tag::ATTESTATION_ID_MEID,
    Tag::ATTESTATION_ID_MANUFACTURER,
    Tag::ATTESTATION_ID_MODEL,
    Tag::RESET_SINCE_ID_ROTATION,
];

fn check_km1_tags(params: &[KeyParameter]) -> Result<(), Error> {
    match params.iter().find(|p| POST_KM1_TAGS.contains(&p.get_tag())) {
        Some(p) => {
            log::debug!("Keymaster 1 does not support tag {:?}.", p.get_tag());
            Err(Error::Km(Ec::UNSUPPORTED_TAG))
        }
        None => Ok(()),
    }
}

/// Adds `EC_CURVE` next to the `KEY_SIZE` of EC keys, as keymaster@3.0 clients expect it.
fn add_ec_curve(mut c: KeyCharacteristics) -> KeyCharacteristics {
    fn augment(list: &mut Vec<KeyParameter>) {
        if list.iter().any(|p| matches!(p, KeyParameter::EcCurve(_))) {
            return;
        }
        let curve = list.iter().find_map(|p| match p {
            KeyParameter::KeySize(size) => EcCurve::from_key_size(*size),
            _ => None,
        });
        if let Some(curve) = curve {
            list.push(KeyParameter::EcCurve(curve));
        }
    }

    if find_algorithm(c.iter()) != Some(Algorithm::EC) {
        return c;
    }
    if c.iter().any(|p| matches!(p, KeyParameter::EcCurve(_))) {
        return c;
    }
    if c.teeEnforced.iter().any(|p| matches!(p, KeyParameter::KeySize(_))) {
        augment(&mut c.teeEnforced);
    } else {
        augment(&mut c.softwareEnforced);
    }
    c
}

pub struct Keymaster1Translator {
    dev: Arc<dyn Keymaster1Device>,
    caps: Arc<CapabilitySet>,
    caller: LegacyCaller,
}

impl Keymaster1Translator {
    pub fn new(dev: Arc<dyn Keymaster1Device>, caps: Arc<CapabilitySet>, deadline_ms: u64) -> Self {
        let caller = LegacyCaller::new(caps.is_exclusive(), deadline_ms);
        Self { dev, caps, caller }
    }

    /// Rewrites a key description for keymaster 1 and validates it against the
    /// capabilities. Returns the algorithm and the rewritten parameters.
    fn prepare_key_params(&self, params: &[KeyParameter]) -> Result<(Algorithm, Vec<KeyParameter>)> {
        check_km1_tags(params).context("In prepare_key_params.")?;
        let algorithm = find_algorithm(params)
            .ok_or(Error::Km(Ec::UNSUPPORTED_ALGORITHM))
            .context("In prepare_key_params: No algorithm specified.")?;

        let mut params = params.to_vec();
        if algorithm == Algorithm::EC {
            params = self.ec_curve_to_key_size(params).context("In prepare_key_params.")?;
        }

        self.caps
            .check_key_authorizations(
                algorithm,
                &purposes(&params),
                &block_modes(&params),
                &paddings(&params),
                &digests(&params),
            )
            .context("In prepare_key_params.")?;
        Ok((algorithm, params))
    }

    fn ec_curve_to_key_size(&self, params: Vec<KeyParameter>) -> Result<Vec<KeyParameter>> {
        let curve = params.iter().find_map(|p| match p {
            KeyParameter::EcCurve(c) => Some(*c),
            _ => None,
        });
        let curve = match curve {
            Some(c) => c,
            None => return Ok(params),
        };
        if !self.caps.supports_ec_curve(curve) {
            return Err(Error::Km(Ec::UNSUPPORTED_EC_CURVE))
                .context(format!("In ec_curve_to_key_size: {:?}.", curve));
        }
        let key_size = curve.key_size();
        let mut has_key_size = false;
        for p in params.iter() {
            if let KeyParameter::KeySize(size) = p {
                if *size != key_size {
                    return Err(Error::Km(Ec::INVALID_ARGUMENT)).context(format!(
                        "In ec_curve_to_key_size: KEY_SIZE {} conflicts with {:?}.",
                        size, curve
                    ));
                }
                has_key_size = true;
            }
        }
        let mut params: Vec<KeyParameter> =
            params.into_iter().filter(|p| !matches!(p, KeyParameter::EcCurve(_))).collect();
        if !has_key_size {
            params.push(KeyParameter::KeySize(key_size));
        }
        Ok(params)
    }

    fn wrap_key(&self, blob: Vec<u8>, kc: KmKeyCharacteristics) -> Result<KeyCreationResult> {
        Ok(KeyCreationResult {
            keyBlob: KeyBlob::new(LegacyVersion::Keymaster1, SystemVersion::default(), blob)
                .encode()
                .context("In wrap_key.")?,
            keyCharacteristics: add_ec_curve(characteristics_from_legacy(kc)),
        })
    }

    /// Feeds `input` through legacy `update` until all of it is consumed.
    fn update_all(
        &self,
        legacy_handle: u64,
        params: &[KeyParameter],
        input: &[u8],
    ) -> Result<(Vec<KeyParameter>, Vec<u8>)> {
        let mut out_params = Vec::new();
        let mut output = Vec::new();
        let mut remaining = input;
        let mut legacy_params = key_parameter::to_legacy(params);
        while !remaining.is_empty() {
            let r = self
                .caller
                .call("km1::update", || self.dev.update(legacy_handle, &legacy_params, remaining))
                .context("In update_all: Legacy update failed.")?;
            if r.input_consumed == 0 || r.input_consumed > remaining.len() {
                // The legacy operation is still alive; release it before failing.
                if let Err(e) = self.caller.call("km1::abort", || self.dev.abort(legacy_handle)) {
                    log::error!("In update_all: abort failed: {:?}", e);
                }
                return Err(Error::Km(Ec::INVALID_INPUT_LENGTH)).context(format!(
                    "In update_all: Legacy update consumed {} of {} bytes.",
                    r.input_consumed,
                    remaining.len()
                ));
            }
            remaining = &remaining[r.input_consumed..];
            out_params.extend(key_parameter::from_legacy_lossy(r.out_params));
            output.extend_from_slice(&r.output);
            // Operation parameters such as associated data must be delivered once.
            legacy_params.clear();
        }
        Ok((out_params, output))
    }
}

impl RequestTranslator for Keymaster1Translator {
    fn version(&self) -> LegacyVersion {
        LegacyVersion::Keymaster1
    }

    fn add_rng_entropy(&self, data: &[u8]) -> Result<()> {
        self.caller
            .call("km1::add_rng_entropy", || self.dev.add_rng_entropy(data))
            .context("In Keymaster1Translator::add_rng_entropy.")
    }

    fn generate_key(&self, params: &[KeyParameter]) -> Result<KeyCreationResult> {
        let (_, params) =
            self.prepare_key_params(params).context("In Keymaster1Translator::generate_key.")?;
        let legacy_params = key_parameter::to_legacy(&params);
        let (blob, kc) = self
            .caller
            .call("km1::generate_key", || self.dev.generate_key(&legacy_params))
            .context("In Keymaster1Translator::generate_key.")?;
        self.wrap_key(blob, kc).context("In Keymaster1Translator::generate_key.")
    }

    fn import_key(
        &self,
        params: &[KeyParameter],
        format: KeyFormat,
        key_data: &[u8],
    ) -> Result<KeyCreationResult> {
        let (algorithm, params) =
            self.prepare_key_params(params).context("In Keymaster1Translator::import_key.")?;
        self.caps
            .check_import_format(algorithm, format)
            .context("In Keymaster1Translator::import_key.")?;
        let legacy_params = key_parameter::to_legacy(&params);
        let (blob, kc) = self
            .caller
            .call("km1::import_key", || {
                self.dev.import_key(&legacy_params, format as u32, key_data)
            })
            .context("In Keymaster1Translator::import_key.")?;
        self.wrap_key(blob, kc).context("In Keymaster1Translator::import_key.")
    }

    fn get_key_characteristics(
        &self,
        blob: &KeyBlob,
        client_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
    ) -> Result<KeyCharacteristics> {
        let kc = self
            .caller
            .call("km1::get_key_characteristics", || {
                self.dev.get_key_characteristics(blob.legacy_blob(), client_id, app_data)
            })
            .context("In Keymaster1Translator::get_key_characteristics.")?;
        Ok(add_ec_curve(characteristics_from_legacy(kc)))
    }

    fn export_key(
        &self,
        format: KeyFormat,
        blob: &KeyBlob,
        client_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        self.caller
            .call("km1::export_key", || {
                self.dev.export_key(format as u32, blob.legacy_blob(), client_id, app_data)
            })
            .context("In Keymaster1Translator::export_key.")
    }

    fn attest_key(&self, _blob: &KeyBlob, _params: &[KeyParameter]) -> Result<Vec<Vec<u8>>> {
        Err(Error::unimplemented())
            .context("In Keymaster1Translator::attest_key: Keymaster 1 has no attestation.")
    }

    fn upgrade_key(&self, blob: &KeyBlob, _params: &[KeyParameter]) -> Result<Vec<u8>> {
        blob.encode().context("In Keymaster1Translator::upgrade_key.")
    }

    fn delete_key(&self, blob: &KeyBlob) -> Result<()> {
        self.caller
            .call("km1::delete_key", || self.dev.delete_key(blob.legacy_blob()))
            .context("In Keymaster1Translator::delete_key.")
    }

    fn delete_all_keys(&self) -> Result<()> {
        self.caller
            .call("km1::delete_all_keys", || self.dev.delete_all_keys())
            .context("In Keymaster1Translator::delete_all_keys.")
    }

    fn begin(
        &self,
        purpose: KeyPurpose,
        blob: &KeyBlob,
        params: &[KeyParameter],
    ) -> Result<LegacyOperation> {
        check_km1_tags(params).context("In Keymaster1Translator::begin.")?;

        let (app_id, app_data) = app_binding(params);
        let characteristics = self
            .get_key_characteristics(blob, app_id, app_data)
            .context("In Keymaster1Translator::begin: Looking up the key's algorithm.")?;
        let algorithm = find_algorithm(characteristics.iter())
            .ok_or(Error::Km(Ec::UNSUPPORTED_ALGORITHM))
            .context("In Keymaster1Translator::begin: Key has no algorithm.")?;

        self.caps
            .check_operation(
                algorithm,
                purpose,
                &block_modes(params),
                &paddings(params),
                &digests(params),
            )
            .context("In Keymaster1Translator::begin.")?;

        let legacy_params = key_parameter::to_legacy(params);
        let r = self
            .caller
            .call("km1::begin", || {
                self.dev.begin(purpose as u32, blob.legacy_blob(), &legacy_params)
            })
            .context("In Keymaster1Translator::begin.")?;
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
            .call("km1::update", || self.dev.update(legacy_handle, &legacy_params, input))
            .context("In Keymaster1Translator::update.")?;
        if r.input_consumed > input.len() {
            if let Err(e) = self.caller.call("km1::abort", || self.dev.abort(legacy_handle)) {
                log::error!("In Keymaster1Translator::update: abort failed: {:?}", e);
            }
            return Err(Error::Km(Ec::UNKNOWN_ERROR)).context(format!(
                "In Keymaster1Translator::update: Legacy update consumed {} of {} bytes.",
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
        let (mut out_params, mut output, finish_params) = if input.is_empty() {
            (Vec::new(), Vec::new(), params)
        } else {
            let (p, o) = self
                .update_all(legacy_handle, params, input)
                .context("In Keymaster1Translator::finish.")?;
            (p, o, &[][..])
        };

        let legacy_params = key_parameter::to_legacy(finish_params);
        let r = self
            .caller
            .call("km1::finish", || self.dev.finish(legacy_handle, &legacy_params, signature))
            .context("In Keymaster1Translator::finish.")?;
        out_params.extend(key_parameter::from_legacy_lossy(r.out_params));
        output.extend_from_slice(&r.output);
        Ok(FinishResult { outParams: out_params, output })
    }

    fn abort(&self, legacy_handle: u64) -> Result<()> {
        self.caller
            .call("km1::abort", || self.dev.abort(legacy_handle))
            .context("In Keymaster1Translator::abort.")
    }
}
