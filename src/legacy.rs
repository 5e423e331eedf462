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

//! Rust rendition of the legacy keymaster HAL entry points.
//!
//! `keymaster1_device_t` and `keymaster2_device_t` are C structs of function pointers.
//! A vendor HAL loader binds them to the [`Keymaster1Device`] and [`Keymaster2Device`]
//! traits below. The traits keep the C ABI shapes: enums travel as raw `u32` values,
//! parameters as tag/value pairs in the layout of `keymaster_key_param_t`, and failures
//! as raw `keymaster_error_t` status codes. Interpreting any of these is the job of the
//! translators in [`crate::translator`].

use std::fmt;

/// Raw `keymaster_error_t` as returned by a legacy device. Only failures are ever
/// wrapped in this type; success is expressed by `Ok`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct LegacyError(pub i32);

impl LegacyError {
    pub const UNSUPPORTED_PURPOSE: LegacyError = LegacyError(-2);
    pub const INVALID_INPUT_LENGTH: LegacyError = LegacyError(-21);
    pub const INVALID_OPERATION_HANDLE: LegacyError = LegacyError(-28);
    pub const VERIFICATION_FAILED: LegacyError = LegacyError(-30);
    pub const TOO_MANY_OPERATIONS: LegacyError = LegacyError(-31);
    pub const INVALID_KEY_BLOB: LegacyError = LegacyError(-33);
    pub const INVALID_ARGUMENT: LegacyError = LegacyError(-38);
    pub const SECURE_HW_COMMUNICATION_FAILED: LegacyError = LegacyError(-49);
    pub const KEY_REQUIRES_UPGRADE: LegacyError = LegacyError(-62);
    pub const KEYMASTER_NOT_CONFIGURED: LegacyError = LegacyError(-64);
    pub const UNIMPLEMENTED: LegacyError = LegacyError(-100);
    pub const UNKNOWN_ERROR: LegacyError = LegacyError(-1000);
}

impl fmt::Debug for LegacyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "keymaster_error_t({})", self.0)
    }
}

/// Result of a legacy entry point.
pub type LegacyResult<T> = Result<T, LegacyError>;

/// `KEYMASTER_SOFTWARE_ONLY`: the device runs without hardware protection.
pub const KEYMASTER_SOFTWARE_ONLY: u32 = 1 << 0;
/// `KEYMASTER_BLOBS_ARE_STANDALONE`: key blobs stay valid without device state.
pub const KEYMASTER_BLOBS_ARE_STANDALONE: u32 = 1 << 1;
/// `KEYMASTER_SUPPORTS_EC`: the device implements elliptic curve keys.
pub const KEYMASTER_SUPPORTS_EC: u32 = 1 << 3;

/// The union member of `keymaster_key_param_t`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KmParamValue {
    Enum(u32),
    Integer(u32),
    LongInteger(u64),
    DateTime(u64),
    Bool(bool),
    Blob(Vec<u8>),
}

/// One `keymaster_key_param_t`. The tag is kept raw because a legacy device may
/// report tags that the keymaster@3.0 interface does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmParam {
    pub tag: u32,
    pub value: KmParamValue,
}

/// `keymaster_key_characteristics_t`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KmKeyCharacteristics {
    pub hw_enforced: Vec<KmParam>,
    pub sw_enforced: Vec<KmParam>,
}

/// The identifying part of `hw_module_t`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleInfo {
    pub name: String,
    pub author: String,
    pub module_api_version: u16,
}

/// Output of the legacy `begin` entry point.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KmBeginOutput {
    pub handle: u64,
    pub out_params: Vec<KmParam>,
}

/// Output of the legacy `update` entry point.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KmUpdateOutput {
    pub input_consumed: usize,
    pub out_params: Vec<KmParam>,
    pub output: Vec<u8>,
}

/// Output of the legacy `finish` entry point.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KmFinishOutput {
    pub out_params: Vec<KmParam>,
    pub output: Vec<u8>,
}

/// Entry points of `keymaster1_device_t`.
///
/// Keymaster 1 has capability probing (`get_supported_*`), no attestation, no key
/// upgrade, no configuration step and a `finish` that takes no input data.
pub trait Keymaster1Device: Send + Sync {
    fn module(&self) -> ModuleInfo;
    fn flags(&self) -> u32;

    fn get_supported_algorithms(&self) -> LegacyResult<Vec<u32>>;
    fn get_supported_block_modes(&self, algorithm: u32, purpose: u32) -> LegacyResult<Vec<u32>>;
    fn get_supported_padding_modes(&self, algorithm: u32, purpose: u32)
        -> LegacyResult<Vec<u32>>;
    fn get_supported_digests(&self, algorithm: u32, purpose: u32) -> LegacyResult<Vec<u32>>;
    fn get_supported_import_formats(&self, algorithm: u32) -> LegacyResult<Vec<u32>>;
    fn get_supported_export_formats(&self, algorithm: u32) -> LegacyResult<Vec<u32>>;

    fn add_rng_entropy(&self, data: &[u8]) -> LegacyResult<()>;
    fn generate_key(&self, params: &[KmParam]) -> LegacyResult<(Vec<u8>, KmKeyCharacteristics)>;
    fn get_key_characteristics(
        &self,
        key_blob: &[u8],
        client_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
    ) -> LegacyResult<KmKeyCharacteristics>;
    fn import_key(
        &self,
        params: &[KmParam],
        key_format: u32,
        key_data: &[u8],
    ) -> LegacyResult<(Vec<u8>, KmKeyCharacteristics)>;
    fn export_key(
        &self,
        export_format: u32,
        key_blob: &[u8],
        client_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
    ) -> LegacyResult<Vec<u8>>;

    /// `delete_key` is optional in `keymaster1_device_t`; a NULL entry point reads as
    /// `UNIMPLEMENTED`.
    fn delete_key(&self, _key_blob: &[u8]) -> LegacyResult<()> {
        Err(LegacyError::UNIMPLEMENTED)
    }
    /// Optional like `delete_key`.
    fn delete_all_keys(&self) -> LegacyResult<()> {
        Err(LegacyError::UNIMPLEMENTED)
    }

    fn begin(&self, purpose: u32, key_blob: &[u8], params: &[KmParam])
        -> LegacyResult<KmBeginOutput>;
    fn update(&self, handle: u64, params: &[KmParam], input: &[u8])
        -> LegacyResult<KmUpdateOutput>;
    fn finish(&self, handle: u64, params: &[KmParam], signature: &[u8])
        -> LegacyResult<KmFinishOutput>;
    fn abort(&self, handle: u64) -> LegacyResult<()>;
}

/// Entry points of `keymaster2_device_t`.
///
/// Keymaster 2 must be configured with the OS version and patch level before any
/// other call, supports the whole algorithm matrix, attestation and key upgrade.
pub trait Keymaster2Device: Send + Sync {
    fn module(&self) -> ModuleInfo;
    fn flags(&self) -> u32;

    fn configure(&self, params: &[KmParam]) -> LegacyResult<()>;
    fn add_rng_entropy(&self, data: &[u8]) -> LegacyResult<()>;
    fn generate_key(&self, params: &[KmParam]) -> LegacyResult<(Vec<u8>, KmKeyCharacteristics)>;
    fn get_key_characteristics(
        &self,
        key_blob: &[u8],
        client_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
    ) -> LegacyResult<KmKeyCharacteristics>;
    fn import_key(
        &self,
        params: &[KmParam],
        key_format: u32,
        key_data: &[u8],
    ) -> LegacyResult<(Vec<u8>, KmKeyCharacteristics)>;
    fn export_key(
        &self,
        export_format: u32,
        key_blob: &[u8],
        client_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
    ) -> LegacyResult<Vec<u8>>;
    fn attest_key(&self, key_blob: &[u8], params: &[KmParam]) -> LegacyResult<Vec<Vec<u8>>>;
    fn upgrade_key(&self, key_blob: &[u8], params: &[KmParam]) -> LegacyResult<Vec<u8>>;
    fn delete_key(&self, key_blob: &[u8]) -> LegacyResult<()>;
    fn delete_all_keys(&self) -> LegacyResult<()>;

    fn begin(&self, purpose: u32, key_blob: &[u8], params: &[KmParam])
        -> LegacyResult<KmBeginOutput>;
    fn update(&self, handle: u64, params: &[KmParam], input: &[u8])
        -> LegacyResult<KmUpdateOutput>;
    fn finish(
        &self,
        handle: u64,
        params: &[KmParam],
        input: &[u8],
        signature: &[u8],
    ) -> LegacyResult<KmFinishOutput>;
    fn abort(&self, handle: u64) -> LegacyResult<()>;
}
