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

//! Request translation. Each keymaster@3.0 call is mapped onto the entry points of the
//! wrapped legacy device by one of two `RequestTranslator` implementations, chosen once
//! when the adapter is constructed:
//!
//!  * `km1::Keymaster1Translator` validates requests against the probed capabilities and
//!    emulates what keymaster 1 lacks.
//!  * `km2::Keymaster2Translator` forwards calls one to one.
//!
//! Both funnel every legacy call through `LegacyCaller`, which owns the device gate and
//! arms the watchdog.

pub mod km1;
pub mod km2;

use std::sync::Mutex;

use anyhow::Result;

use crate::capability::LegacyVersion;
use crate::error::{map_km_error, Error};
use crate::key_blob::KeyBlob;
use crate::key_parameter::{
    self, Algorithm, BlockMode, Digest, KeyParameter, KeyPurpose, PaddingMode,
};
use crate::keymaster_definitions::{
    FinishResult, KeyCharacteristics, KeyCreationResult, KeyFormat, UpdateResult,
};
use crate::legacy::{KmKeyCharacteristics, LegacyResult};
use crate::watchdog as wd;

/// Translation state of one operation, kept next to the legacy operation handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationContext {
    pub purpose: KeyPurpose,
    /// Only known when the translator had to look it up.
    pub algorithm: Option<Algorithm>,
}

/// Output of a successful legacy `begin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyOperation {
    pub legacy_handle: u64,
    pub out_params: Vec<KeyParameter>,
    pub context: OperationContext,
}

/// The interface between the device adapter and the legacy device. Key blobs arrive
/// already unwrapped from their envelope and checked for the right generation.
pub trait RequestTranslator: Send + Sync {
    fn version(&self) -> LegacyVersion;

    fn add_rng_entropy(&self, data: &[u8]) -> Result<()>;

    fn generate_key(&self, params: &[KeyParameter]) -> Result<KeyCreationResult>;

    fn import_key(
        &self,
        params: &[KeyParameter],
        format: KeyFormat,
        key_data: &[u8],
    ) -> Result<KeyCreationResult>;

    fn get_key_characteristics(
        &self,
        blob: &KeyBlob,
        client_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
    ) -> Result<KeyCharacteristics>;

    fn export_key(
        &self,
        format: KeyFormat,
        blob: &KeyBlob,
        client_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
    ) -> Result<Vec<u8>>;

    fn attest_key(&self, blob: &KeyBlob, params: &[KeyParameter]) -> Result<Vec<Vec<u8>>>;

    /// Returns the enveloped upgraded blob. A blob that is already current is returned
    /// unchanged.
    fn upgrade_key(&self, blob: &KeyBlob, params: &[KeyParameter]) -> Result<Vec<u8>>;

    fn delete_key(&self, blob: &KeyBlob) -> Result<()>;

    fn delete_all_keys(&self) -> Result<()>;

    fn begin(
        &self,
        purpose: KeyPurpose,
        blob: &KeyBlob,
        params: &[KeyParameter],
    ) -> Result<LegacyOperation>;

    fn update(
        &self,
        context: &OperationContext,
        legacy_handle: u64,
        params: &[KeyParameter],
        input: &[u8],
    ) -> Result<UpdateResult>;

    fn finish(
        &self,
        context: &OperationContext,
        legacy_handle: u64,
        params: &[KeyParameter],
        input: &[u8],
        signature: &[u8],
    ) -> Result<FinishResult>;

    fn abort(&self, legacy_handle: u64) -> Result<()>;
}

/// Performs legacy calls. If the device is exclusive every call holds the device gate
/// for its whole duration. Every call is watched by the watchdog.
pub struct LegacyCaller {
    gate: Option<Mutex<()>>,
    deadline_ms: u64,
}

impl LegacyCaller {
    pub fn new(exclusive: bool, deadline_ms: u64) -> Self {
        Self { gate: if exclusive { Some(Mutex::new(())) } else { None }, deadline_ms }
    }

    /// Calls `f` and maps its legacy status code. `id` names the legacy entry point in
    /// watchdog reports.
    pub fn call<T, F>(&self, id: &'static str, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> LegacyResult<T>,
    {
        let _gate = self.gate.as_ref().map(|g| g.lock().unwrap());
        let _wp = wd::watch_millis(id, self.deadline_ms);
        map_km_error(f())
    }
}

/// Empty client ids and application data are passed to the legacy device as absent.
pub fn opt(data: &[u8]) -> Option<&[u8]> {
    if data.is_empty() {
        None
    } else {
        Some(data)
    }
}

/// Collects the values selected by `f` from a parameter set.
pub fn params_of<T, F>(params: &[KeyParameter], f: F) -> Vec<T>
where
    F: Fn(&KeyParameter) -> Option<T>,
{
    params.iter().filter_map(f).collect()
}

/// Returns the application id and data an operation request carries, with empty
/// values treated as absent.
pub fn app_binding(params: &[KeyParameter]) -> (Option<&[u8]>, Option<&[u8]>) {
    let app_id = params.iter().find_map(|p| match p {
        KeyParameter::ApplicationId(id) => Some(id.as_slice()),
        _ => None,
    });
    let app_data = params.iter().find_map(|p| match p {
        KeyParameter::ApplicationData(data) => Some(data.as_slice()),
        _ => None,
    });
    (app_id.and_then(opt), app_data.and_then(opt))
}

pub fn find_algorithm<'a, I>(params: I) -> Option<Algorithm>
where
    I: IntoIterator<Item = &'a KeyParameter>,
{
    params.into_iter().find_map(|p| match p {
        KeyParameter::Algorithm(a) => Some(*a),
        _ => None,
    })
}

pub fn purposes(params: &[KeyParameter]) -> Vec<KeyPurpose> {
    params_of(params, |p| match p {
        KeyParameter::KeyPurpose(v) => Some(*v),
        _ => None,
    })
}

pub fn block_modes(params: &[KeyParameter]) -> Vec<BlockMode> {
    params_of(params, |p| match p {
        KeyParameter::BlockMode(v) => Some(*v),
        _ => None,
    })
}

pub fn paddings(params: &[KeyParameter]) -> Vec<PaddingMode> {
    params_of(params, |p| match p {
        KeyParameter::PaddingMode(v) => Some(*v),
        _ => None,
    })
}

pub fn digests(params: &[KeyParameter]) -> Vec<Digest> {
    params_of(params, |p| match p {
        KeyParameter::Digest(v) => Some(*v),
        _ => None,
    })
}

/// Converts key characteristics reported by a legacy device. Hardware enforced
/// authorizations become `teeEnforced`.
pub fn characteristics_from_legacy(kc: KmKeyCharacteristics) -> KeyCharacteristics {
    KeyCharacteristics {
        softwareEnforced: key_parameter::from_legacy_lossy(kc.sw_enforced),
        teeEnforced: key_parameter::from_legacy_lossy(kc.hw_enforced),
    }
}
