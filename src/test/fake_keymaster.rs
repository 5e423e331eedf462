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

//! Fake keymaster 1 and keymaster 2 devices. Keys are kept in memory and the
//! "cryptography" is a keyed XOR stream and a keyed FNV hash, which is enough to
//! tell whether the adapter delivered the right bytes to the right operation.
//!
//! Both fakes count calls per entry point, detect overlapping calls, and can be told
//! to fail the next call with an arbitrary status code.

use std::collections::HashMap;
use std::convert::TryFrom;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::key_parameter::{
    self, Algorithm, BlockMode, Digest, KeyOrigin, KeyParameter, KeyPurpose, PaddingMode,
};
use crate::keymaster_definitions::KeyFormat;
use crate::legacy::{
    KmBeginOutput, KmFinishOutput, KmKeyCharacteristics, KmParam, KmUpdateOutput,
    Keymaster1Device, Keymaster2Device, LegacyError, LegacyResult, ModuleInfo,
};

/// Keymaster 1 devices process at most this many bytes per `update`.
const KM1_UPDATE_CHUNK: usize = 16;

/// Creation time reported for every fake key.
const CREATION_DATETIME: u64 = 1_500_000_000_000;

struct FakeKey {
    material: Vec<u8>,
    params: Vec<KeyParameter>,
    os_patchlevel: u32,
}

impl FakeKey {
    fn has(&self, param: &KeyParameter) -> bool {
        self.params.contains(param)
    }

    /// Checks the application binding of the key.
    fn check_app(&self, app_id: Option<&[u8]>, app_data: Option<&[u8]>) -> LegacyResult<()> {
        for p in &self.params {
            let ok = match p {
                KeyParameter::ApplicationId(id) => app_id == Some(id.as_slice()),
                KeyParameter::ApplicationData(data) => app_data == Some(data.as_slice()),
                _ => true,
            };
            if !ok {
                return Err(LegacyError::INVALID_KEY_BLOB);
            }
        }
        Ok(())
    }
}

struct FakeOp {
    material: Vec<u8>,
    purpose: KeyPurpose,
    processed: usize,
    data: Vec<u8>,
}

impl FakeOp {
    /// Processes `input` and returns the output produced so far.
    fn process(&mut self, input: &[u8]) -> Vec<u8> {
        let output = match self.purpose {
            KeyPurpose::ENCRYPT | KeyPurpose::DECRYPT => {
                keystream_xor(&self.material, self.processed, input)
            }
            _ => {
                self.data.extend_from_slice(input);
                Vec::new()
            }
        };
        self.processed += input.len();
        output
    }

    fn conclude(self, signature: &[u8]) -> LegacyResult<Vec<u8>> {
        match self.purpose {
            KeyPurpose::SIGN => Ok(toy_signature(&self.material, &self.data)),
            KeyPurpose::VERIFY => {
                if toy_signature(&self.material, &self.data) == signature {
                    Ok(Vec::new())
                } else {
                    Err(LegacyError::VERIFICATION_FAILED)
                }
            }
            _ => Ok(Vec::new()),
        }
    }
}

pub fn keystream_xor(material: &[u8], offset: usize, data: &[u8]) -> Vec<u8> {
    data.iter().enumerate().map(|(i, b)| b ^ material[(offset + i) % material.len()]).collect()
}

pub fn toy_signature(material: &[u8], data: &[u8]) -> Vec<u8> {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in material.iter().chain(data.iter()) {
        h ^= *b as u64;
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h.to_le_bytes().to_vec()
}

#[derive(Default)]
struct FakeState {
    keys: HashMap<Vec<u8>, FakeKey>,
    ops: HashMap<u64, FakeOp>,
    next_id: u64,
    configured: Option<(u32, u32)>,
    last_generate_params: Vec<KeyParameter>,
}

/// Marks a call as in progress for the concurrency detector.
struct CallGuard<'a> {
    core: &'a FakeCore,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.core.inside.store(false, Ordering::SeqCst);
    }
}

/// State and bookkeeping shared by both fakes.
#[derive(Default)]
pub struct FakeCore {
    state: Mutex<FakeState>,
    calls: Mutex<HashMap<&'static str, usize>>,
    next_fault: Mutex<Option<LegacyError>>,
    call_delay: Mutex<Duration>,
    stall_updates: AtomicBool,
    overreport_updates: AtomicBool,
    inside: AtomicBool,
    violations: AtomicUsize,
}

impl FakeCore {
    fn enter(&self, name: &'static str) -> LegacyResult<CallGuard<'_>> {
        *self.calls.lock().unwrap().entry(name).or_default() += 1;
        if self.inside.swap(true, Ordering::SeqCst) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        let guard = CallGuard { core: self };
        let delay = *self.call_delay.lock().unwrap();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        match self.next_fault.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(guard),
        }
    }

    /// A legacy device drops an operation that fails.
    fn fail_op(&self, handle: u64, e: LegacyError) -> LegacyError {
        self.state.lock().unwrap().ops.remove(&handle);
        e
    }

    /// Makes the next counted call fail with `e`.
    pub fn fail_next_call_with(&self, e: LegacyError) {
        *self.next_fault.lock().unwrap() = Some(e);
    }

    /// Every counted call sleeps for `delay`, to widen race windows.
    pub fn set_call_delay(&self, delay: Duration) {
        *self.call_delay.lock().unwrap() = delay;
    }

    /// Makes `update` consume no input.
    pub fn stall_updates(&self, stall: bool) {
        self.stall_updates.store(stall, Ordering::SeqCst);
    }

    /// Makes `update` claim one byte more than it was given.
    pub fn overreport_updates(&self, on: bool) {
        self.overreport_updates.store(on, Ordering::SeqCst);
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().get(name).cloned().unwrap_or(0)
    }

    /// Number of counted calls into the device. Capability queries are not counted.
    pub fn total_device_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn generate_calls(&self) -> usize {
        self.calls("generate_key")
    }

    pub fn begin_calls(&self) -> usize {
        self.calls("begin")
    }

    pub fn update_calls(&self) -> usize {
        self.calls("update")
    }

    pub fn abort_calls(&self) -> usize {
        self.calls("abort")
    }

    pub fn upgrade_calls(&self) -> usize {
        self.calls("upgrade_key")
    }

    pub fn attest_calls(&self) -> usize {
        self.calls("attest_key")
    }

    /// Number of times two calls were inside the device at once.
    pub fn concurrency_violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }

    pub fn open_operations(&self) -> usize {
        self.state.lock().unwrap().ops.len()
    }

    /// The parameters of the most recent `generate_key`.
    pub fn last_generate_params(&self) -> Vec<KeyParameter> {
        self.state.lock().unwrap().last_generate_params.clone()
    }

    /// The values passed to `configure`, if any.
    pub fn configured(&self) -> Option<(u32, u32)> {
        self.state.lock().unwrap().configured
    }

    fn create_key(
        &self,
        params: &[KmParam],
        material: Vec<u8>,
        origin: KeyOrigin,
        km2: bool,
    ) -> LegacyResult<(Vec<u8>, KmKeyCharacteristics)> {
        let params = key_parameter::from_legacy_lossy(params.to_vec());
        if !params.iter().any(|p| matches!(p, KeyParameter::Algorithm(_))) {
            return Err(LegacyError::INVALID_ARGUMENT);
        }
        if material.is_empty() {
            return Err(LegacyError::INVALID_ARGUMENT);
        }
        let mut state = self.state.lock().unwrap();
        let (os_version, os_patchlevel) = match (km2, state.configured) {
            (false, _) => (0, 0),
            (true, Some(v)) => v,
            (true, None) => return Err(LegacyError::KEYMASTER_NOT_CONFIGURED),
        };
        if origin == KeyOrigin::GENERATED {
            state.last_generate_params = params.clone();
        }

        let mut hw_enforced: Vec<KeyParameter> = params
            .iter()
            .filter(|p| {
                !matches!(p, KeyParameter::ApplicationId(_) | KeyParameter::ApplicationData(_))
            })
            .cloned()
            .collect();
        hw_enforced.push(KeyParameter::KeyOrigin(origin));
        if km2 {
            hw_enforced.push(KeyParameter::OsVersion(os_version));
            hw_enforced.push(KeyParameter::OsPatchLevel(os_patchlevel));
        }
        let characteristics = KmKeyCharacteristics {
            hw_enforced: key_parameter::to_legacy(&hw_enforced),
            sw_enforced: key_parameter::to_legacy(&[KeyParameter::CreationDateTime(
                CREATION_DATETIME,
            )]),
        };

        state.next_id += 1;
        let blob = format!("fake-key-{}", state.next_id).into_bytes();
        state.keys.insert(blob.clone(), FakeKey { material, params, os_patchlevel });
        Ok((blob, characteristics))
    }

    fn with_key<T, F>(
        &self,
        blob: &[u8],
        app_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
        f: F,
    ) -> LegacyResult<T>
    where
        F: FnOnce(&FakeKey, Option<(u32, u32)>) -> LegacyResult<T>,
    {
        let state = self.state.lock().unwrap();
        let key = state.keys.get(blob).ok_or(LegacyError::INVALID_KEY_BLOB)?;
        key.check_app(app_id, app_data)?;
        f(key, state.configured)
    }

    fn characteristics(
        &self,
        blob: &[u8],
        app_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
        km2: bool,
    ) -> LegacyResult<KmKeyCharacteristics> {
        self.with_key(blob, app_id, app_data, |key, configured| {
            check_upgrade(key, configured, km2)?;
            let mut hw_enforced: Vec<KeyParameter> = key
                .params
                .iter()
                .filter(|p| {
                    !matches!(p, KeyParameter::ApplicationId(_) | KeyParameter::ApplicationData(_))
                })
                .cloned()
                .collect();
            if km2 {
                hw_enforced.push(KeyParameter::OsPatchLevel(key.os_patchlevel));
            }
            Ok(KmKeyCharacteristics {
                hw_enforced: key_parameter::to_legacy(&hw_enforced),
                sw_enforced: key_parameter::to_legacy(&[KeyParameter::CreationDateTime(
                    CREATION_DATETIME,
                )]),
            })
        })
    }

    fn export(
        &self,
        blob: &[u8],
        app_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
        km2: bool,
    ) -> LegacyResult<Vec<u8>> {
        self.with_key(blob, app_id, app_data, |key, configured| {
            check_upgrade(key, configured, km2)?;
            if key.has(&KeyParameter::Algorithm(Algorithm::AES)) {
                return Err(LegacyError::UNIMPLEMENTED);
            }
            let mut public = b"fake-public:".to_vec();
            public.extend_from_slice(&toy_signature(&key.material, b"public"));
            Ok(public)
        })
    }

    fn begin_op(
        &self,
        purpose: u32,
        blob: &[u8],
        params: &[KmParam],
        km2: bool,
    ) -> LegacyResult<KmBeginOutput> {
        let purpose =
            KeyPurpose::try_from(purpose).map_err(|_| LegacyError::UNSUPPORTED_PURPOSE)?;
        let params = key_parameter::from_legacy_lossy(params.to_vec());
        let app_id = params.iter().find_map(|p| match p {
            KeyParameter::ApplicationId(id) => Some(id.clone()),
            _ => None,
        });
        let app_data = params.iter().find_map(|p| match p {
            KeyParameter::ApplicationData(data) => Some(data.clone()),
            _ => None,
        });
        let material = self.with_key(blob, app_id.as_deref(), app_data.as_deref(), |key, c| {
            check_upgrade(key, c, km2)?;
            if !key.has(&KeyParameter::KeyPurpose(purpose)) {
                return Err(LegacyError::UNSUPPORTED_PURPOSE);
            }
            Ok(key.material.clone())
        })?;

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let handle = 0x1000 + state.next_id;
        state.ops.insert(handle, FakeOp { material, purpose, processed: 0, data: Vec::new() });
        Ok(KmBeginOutput { handle, out_params: Vec::new() })
    }

    fn update_op(
        &self,
        handle: u64,
        input: &[u8],
        chunk: Option<usize>,
    ) -> LegacyResult<KmUpdateOutput> {
        let mut state = self.state.lock().unwrap();
        let op = state.ops.get_mut(&handle).ok_or(LegacyError::INVALID_OPERATION_HANDLE)?;
        if self.stall_updates.load(Ordering::SeqCst) {
            return Ok(KmUpdateOutput::default());
        }
        let n = chunk.map_or(input.len(), |c| c.min(input.len()));
        let output = op.process(&input[..n]);
        let input_consumed =
            if self.overreport_updates.load(Ordering::SeqCst) { n + 1 } else { n };
        Ok(KmUpdateOutput { input_consumed, out_params: Vec::new(), output })
    }

    fn finish_op(&self, handle: u64, input: &[u8], signature: &[u8]) -> LegacyResult<KmFinishOutput> {
        let mut op = self
            .state
            .lock()
            .unwrap()
            .ops
            .remove(&handle)
            .ok_or(LegacyError::INVALID_OPERATION_HANDLE)?;
        let mut output = op.process(input);
        output.extend(op.conclude(signature)?);
        Ok(KmFinishOutput { out_params: Vec::new(), output })
    }

    fn abort_op(&self, handle: u64) -> LegacyResult<()> {
        match self.state.lock().unwrap().ops.remove(&handle) {
            Some(_) => Ok(()),
            None => Err(LegacyError::INVALID_OPERATION_HANDLE),
        }
    }

    fn delete(&self, blob: &[u8]) -> LegacyResult<()> {
        match self.state.lock().unwrap().keys.remove(blob) {
            Some(_) => Ok(()),
            None => Err(LegacyError::INVALID_KEY_BLOB),
        }
    }

    fn delete_all(&self) -> LegacyResult<()> {
        self.state.lock().unwrap().keys.clear();
        Ok(())
    }
}

/// Keymaster 2 refuses keys created under an older patch level than configured.
fn check_upgrade(key: &FakeKey, configured: Option<(u32, u32)>, km2: bool) -> LegacyResult<()> {
    match configured {
        Some((_, patchlevel)) if km2 && key.os_patchlevel < patchlevel => {
            Err(LegacyError::KEY_REQUIRES_UPGRADE)
        }
        _ => Ok(()),
    }
}

fn random_material() -> Vec<u8> {
    rand::random::<u128>().to_le_bytes().to_vec()
}

/// A fake keymaster 1 device supporting RSA, EC and AES (ECB and CBC only), with a
/// reduced digest set and the undefined digest 99 reported for RSA signing.
pub struct FakeKeymaster1 {
    core: FakeCore,
    algorithms: Mutex<Vec<u32>>,
    probe_fault: Mutex<Option<LegacyError>>,
}

impl Deref for FakeKeymaster1 {
    type Target = FakeCore;

    fn deref(&self) -> &FakeCore {
        &self.core
    }
}

impl FakeKeymaster1 {
    pub fn new() -> Self {
        Self {
            core: Default::default(),
            algorithms: Mutex::new(vec![
                Algorithm::RSA as u32,
                Algorithm::EC as u32,
                Algorithm::AES as u32,
            ]),
            probe_fault: Mutex::new(None),
        }
    }

    pub fn set_supported_algorithms(&self, algorithms: Vec<u32>) {
        *self.algorithms.lock().unwrap() = algorithms;
    }

    /// Makes every capability probe fail with `e`.
    pub fn fail_probes_with(&self, e: LegacyError) {
        *self.probe_fault.lock().unwrap() = Some(e);
    }

    fn probe<T>(&self, f: impl FnOnce() -> LegacyResult<T>) -> LegacyResult<T> {
        match *self.probe_fault.lock().unwrap() {
            Some(e) => Err(e),
            None => f(),
        }
    }

    /// Block modes, paddings and digests supported for `algorithm` and `purpose`.
    fn purpose_support(algorithm: u32, purpose: u32) -> LegacyResult<[Vec<u32>; 3]> {
        let algorithm =
            Algorithm::try_from(algorithm).map_err(|_| LegacyError::UNSUPPORTED_PURPOSE)?;
        let purpose = KeyPurpose::try_from(purpose).map_err(|_| LegacyError::UNSUPPORTED_PURPOSE)?;
        match (algorithm, purpose) {
            (Algorithm::RSA, KeyPurpose::ENCRYPT) | (Algorithm::RSA, KeyPurpose::DECRYPT) => Ok([
                vec![],
                vec![
                    PaddingMode::NONE as u32,
                    PaddingMode::RSA_OAEP as u32,
                    PaddingMode::RSA_PKCS1_1_5_ENCRYPT as u32,
                ],
                vec![Digest::NONE as u32, Digest::SHA_2_256 as u32],
            ]),
            (Algorithm::RSA, KeyPurpose::SIGN) | (Algorithm::RSA, KeyPurpose::VERIFY) => Ok([
                vec![],
                vec![
                    PaddingMode::NONE as u32,
                    PaddingMode::RSA_PSS as u32,
                    PaddingMode::RSA_PKCS1_1_5_SIGN as u32,
                ],
                vec![Digest::NONE as u32, Digest::SHA_2_256 as u32, 99],
            ]),
            (Algorithm::EC, KeyPurpose::SIGN) | (Algorithm::EC, KeyPurpose::VERIFY) => Ok([
                vec![],
                vec![PaddingMode::NONE as u32],
                vec![Digest::NONE as u32, Digest::SHA_2_256 as u32],
            ]),
            (Algorithm::AES, KeyPurpose::ENCRYPT) | (Algorithm::AES, KeyPurpose::DECRYPT) => Ok([
                vec![BlockMode::ECB as u32, BlockMode::CBC as u32],
                vec![PaddingMode::NONE as u32, PaddingMode::PKCS7 as u32],
                vec![],
            ]),
            _ => Err(LegacyError::UNSUPPORTED_PURPOSE),
        }
    }
}

impl Keymaster1Device for FakeKeymaster1 {
    fn module(&self) -> ModuleInfo {
        ModuleInfo {
            name: "FakeKeymaster1".to_string(),
            author: "Fake Vendor".to_string(),
            module_api_version: 0x0100,
        }
    }

    fn flags(&self) -> u32 {
        0
    }

    fn get_supported_algorithms(&self) -> LegacyResult<Vec<u32>> {
        self.probe(|| Ok(self.algorithms.lock().unwrap().clone()))
    }

    fn get_supported_block_modes(&self, algorithm: u32, purpose: u32) -> LegacyResult<Vec<u32>> {
        self.probe(|| Self::purpose_support(algorithm, purpose).map(|[m, _, _]| m))
    }

    fn get_supported_padding_modes(
        &self,
        algorithm: u32,
        purpose: u32,
    ) -> LegacyResult<Vec<u32>> {
        self.probe(|| Self::purpose_support(algorithm, purpose).map(|[_, p, _]| p))
    }

    fn get_supported_digests(&self, algorithm: u32, purpose: u32) -> LegacyResult<Vec<u32>> {
        self.probe(|| Self::purpose_support(algorithm, purpose).map(|[_, _, d]| d))
    }

    fn get_supported_import_formats(&self, algorithm: u32) -> LegacyResult<Vec<u32>> {
        self.probe(|| match Algorithm::try_from(algorithm) {
            Ok(Algorithm::AES) => Ok(vec![KeyFormat::RAW as u32]),
            _ => Ok(vec![KeyFormat::PKCS8 as u32]),
        })
    }

    fn get_supported_export_formats(&self, algorithm: u32) -> LegacyResult<Vec<u32>> {
        self.probe(|| match Algorithm::try_from(algorithm) {
            Ok(Algorithm::AES) => Ok(vec![]),
            _ => Ok(vec![KeyFormat::X509 as u32]),
        })
    }

    fn add_rng_entropy(&self, _data: &[u8]) -> LegacyResult<()> {
        let _g = self.core.enter("add_rng_entropy")?;
        Ok(())
    }

    fn generate_key(&self, params: &[KmParam]) -> LegacyResult<(Vec<u8>, KmKeyCharacteristics)> {
        let _g = self.core.enter("generate_key")?;
        self.core.create_key(params, random_material(), KeyOrigin::GENERATED, false)
    }

    fn get_key_characteristics(
        &self,
        key_blob: &[u8],
        client_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
    ) -> LegacyResult<KmKeyCharacteristics> {
        let _g = self.core.enter("get_key_characteristics")?;
        self.core.characteristics(key_blob, client_id, app_data, false)
    }

    fn import_key(
        &self,
        params: &[KmParam],
        _key_format: u32,
        key_data: &[u8],
    ) -> LegacyResult<(Vec<u8>, KmKeyCharacteristics)> {
        let _g = self.core.enter("import_key")?;
        self.core.create_key(params, key_data.to_vec(), KeyOrigin::IMPORTED, false)
    }

    fn export_key(
        &self,
        _export_format: u32,
        key_blob: &[u8],
        client_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
    ) -> LegacyResult<Vec<u8>> {
        let _g = self.core.enter("export_key")?;
        self.core.export(key_blob, client_id, app_data, false)
    }

    fn delete_key(&self, key_blob: &[u8]) -> LegacyResult<()> {
        let _g = self.core.enter("delete_key")?;
        self.core.delete(key_blob)
    }

    fn delete_all_keys(&self) -> LegacyResult<()> {
        let _g = self.core.enter("delete_all_keys")?;
        self.core.delete_all()
    }

    fn begin(
        &self,
        purpose: u32,
        key_blob: &[u8],
        params: &[KmParam],
    ) -> LegacyResult<KmBeginOutput> {
        let _g = self.core.enter("begin")?;
        self.core.begin_op(purpose, key_blob, params, false)
    }

    fn update(
        &self,
        handle: u64,
        _params: &[KmParam],
        input: &[u8],
    ) -> LegacyResult<KmUpdateOutput> {
        let _g = self.core.enter("update").map_err(|e| self.core.fail_op(handle, e))?;
        self.core.update_op(handle, input, Some(KM1_UPDATE_CHUNK))
    }

    fn finish(
        &self,
        handle: u64,
        _params: &[KmParam],
        signature: &[u8],
    ) -> LegacyResult<KmFinishOutput> {
        let _g = self.core.enter("finish").map_err(|e| self.core.fail_op(handle, e))?;
        self.core.finish_op(handle, &[], signature)
    }

    fn abort(&self, handle: u64) -> LegacyResult<()> {
        let _g = self.core.enter("abort")?;
        self.core.abort_op(handle)
    }
}

/// A fake keymaster 2 device. It must be configured before use and reports
/// `KEY_REQUIRES_UPGRADE` for keys created under an older patch level.
pub struct FakeKeymaster2 {
    core: FakeCore,
    configure_fault: Mutex<Option<LegacyError>>,
}

impl Deref for FakeKeymaster2 {
    type Target = FakeCore;

    fn deref(&self) -> &FakeCore {
        &self.core
    }
}

impl FakeKeymaster2 {
    pub fn new() -> Self {
        Self { core: Default::default(), configure_fault: Mutex::new(None) }
    }

    pub fn fail_configure_with(&self, e: LegacyError) {
        *self.configure_fault.lock().unwrap() = Some(e);
    }
}

impl Keymaster2Device for FakeKeymaster2 {
    fn module(&self) -> ModuleInfo {
        ModuleInfo {
            name: "FakeKeymaster2".to_string(),
            author: "Fake Vendor".to_string(),
            module_api_version: 0x0200,
        }
    }

    fn flags(&self) -> u32 {
        0
    }

    fn configure(&self, params: &[KmParam]) -> LegacyResult<()> {
        if let Some(e) = *self.configure_fault.lock().unwrap() {
            return Err(e);
        }
        let params = key_parameter::from_legacy_lossy(params.to_vec());
        let os_version = params.iter().find_map(|p| match p {
            KeyParameter::OsVersion(v) => Some(*v),
            _ => None,
        });
        let os_patchlevel = params.iter().find_map(|p| match p {
            KeyParameter::OsPatchLevel(v) => Some(*v),
            _ => None,
        });
        match (os_version, os_patchlevel) {
            (Some(v), Some(p)) => {
                self.core.state.lock().unwrap().configured = Some((v, p));
                Ok(())
            }
            _ => Err(LegacyError::INVALID_ARGUMENT),
        }
    }

    fn add_rng_entropy(&self, _data: &[u8]) -> LegacyResult<()> {
        let _g = self.core.enter("add_rng_entropy")?;
        Ok(())
    }

    fn generate_key(&self, params: &[KmParam]) -> LegacyResult<(Vec<u8>, KmKeyCharacteristics)> {
        let _g = self.core.enter("generate_key")?;
        self.core.create_key(params, random_material(), KeyOrigin::GENERATED, true)
    }

    fn get_key_characteristics(
        &self,
        key_blob: &[u8],
        client_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
    ) -> LegacyResult<KmKeyCharacteristics> {
        let _g = self.core.enter("get_key_characteristics")?;
        self.core.characteristics(key_blob, client_id, app_data, true)
    }

    fn import_key(
        &self,
        params: &[KmParam],
        _key_format: u32,
        key_data: &[u8],
    ) -> LegacyResult<(Vec<u8>, KmKeyCharacteristics)> {
        let _g = self.core.enter("import_key")?;
        self.core.create_key(params, key_data.to_vec(), KeyOrigin::IMPORTED, true)
    }

    fn export_key(
        &self,
        _export_format: u32,
        key_blob: &[u8],
        client_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
    ) -> LegacyResult<Vec<u8>> {
        let _g = self.core.enter("export_key")?;
        self.core.export(key_blob, client_id, app_data, true)
    }

    fn attest_key(&self, key_blob: &[u8], params: &[KmParam]) -> LegacyResult<Vec<Vec<u8>>> {
        let _g = self.core.enter("attest_key")?;
        let challenge = key_parameter::from_legacy_lossy(params.to_vec())
            .into_iter()
            .find_map(|p| match p {
                KeyParameter::AttestationChallenge(c) => Some(c),
                _ => None,
            })
            .ok_or(LegacyError::INVALID_ARGUMENT)?;
        self.core.with_key(key_blob, None, None, |key, configured| {
            check_upgrade(key, configured, true)?;
            let mut leaf = b"fake-leaf:".to_vec();
            leaf.extend_from_slice(&challenge);
            leaf.extend_from_slice(&toy_signature(&key.material, &challenge));
            Ok(vec![leaf, b"fake-root".to_vec()])
        })
    }

    fn upgrade_key(&self, key_blob: &[u8], _params: &[KmParam]) -> LegacyResult<Vec<u8>> {
        let _g = self.core.enter("upgrade_key")?;
        let mut state = self.core.state.lock().unwrap();
        let (_, patchlevel) = state.configured.ok_or(LegacyError::KEYMASTER_NOT_CONFIGURED)?;
        let key = state.keys.get(key_blob).ok_or(LegacyError::INVALID_KEY_BLOB)?;
        let upgraded = FakeKey {
            material: key.material.clone(),
            params: key.params.clone(),
            os_patchlevel: patchlevel,
        };
        state.next_id += 1;
        let blob = format!("fake-key-{}", state.next_id).into_bytes();
        state.keys.insert(blob.clone(), upgraded);
        Ok(blob)
    }

    fn delete_key(&self, key_blob: &[u8]) -> LegacyResult<()> {
        let _g = self.core.enter("delete_key")?;
        self.core.delete(key_blob)
    }

    fn delete_all_keys(&self) -> LegacyResult<()> {
        let _g = self.core.enter("delete_all_keys")?;
        self.core.delete_all()
    }

    fn begin(
        &self,
        purpose: u32,
        key_blob: &[u8],
        params: &[KmParam],
    ) -> LegacyResult<KmBeginOutput> {
        let _g = self.core.enter("begin")?;
        self.core.begin_op(purpose, key_blob, params, true)
    }

    fn update(
        &self,
        handle: u64,
        _params: &[KmParam],
        input: &[u8],
    ) -> LegacyResult<KmUpdateOutput> {
        let _g = self.core.enter("update").map_err(|e| self.core.fail_op(handle, e))?;
        self.core.update_op(handle, input, None)
    }

    fn finish(
        &self,
        handle: u64,
        _params: &[KmParam],
        input: &[u8],
        signature: &[u8],
    ) -> LegacyResult<KmFinishOutput> {
        let _g = self.core.enter("finish").map_err(|e| self.core.fail_op(handle, e))?;
        self.core.finish_op(handle, input, signature)
    }

    fn abort(&self, handle: u64) -> LegacyResult<()> {
        let _g = self.core.enter("abort")?;
        self.core.abort_op(handle)
    }
}
