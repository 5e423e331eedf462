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

#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(missing_docs)]

//! Types and the device interface of android.hardware.keymaster@3.0.
//! The HIDL interface definition is at hardware/interfaces/keymaster/3.0. Numeric
//! values are shared with the legacy keymaster_defs.h, so raw legacy values convert
//! with `TryFrom<u32>`.

use std::convert::TryFrom;
use std::fmt;

/// Declares a `#[repr(u32)]` enum together with a fallible conversion from the raw
/// value. The error type is the offending raw value.
macro_rules! km_enum {
    (
        $(#[$enum_meta:meta])*
        pub enum $name:ident {
            $($variant:ident = $value:expr),* $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[repr(u32)]
        #[derive(PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Copy, Clone)]
        pub enum $name {
            $($variant = $value),*
        }

        impl TryFrom<u32> for $name {
            type Error = u32;

            fn try_from(v: u32) -> Result<Self, Self::Error> {
                $(
                    if v == $name::$variant as u32 {
                        return Ok($name::$variant);
                    }
                )*
                Err(v)
            }
        }
    };
}

km_enum! {
    pub enum TagType {
        INVALID = 0 << 28,
        ENUM = 1 << 28,
        ENUM_REP = 2 << 28,
        UINT = 3 << 28,
        UINT_REP = 4 << 28,
        ULONG = 5 << 28,
        DATE = 6 << 28,
        BOOL = 7 << 28,
        BIGNUM = 8 << 28,
        BYTES = 9 << 28,
        ULONG_REP = 10 << 28,
    }
}

km_enum! {
    pub enum Tag {
        INVALID = TagType::INVALID as u32,
        PURPOSE = TagType::ENUM_REP as u32 | 1,
        ALGORITHM = TagType::ENUM as u32 | 2,
        KEY_SIZE = TagType::UINT as u32 | 3,
        BLOCK_MODE = TagType::ENUM_REP as u32 | 4,
        DIGEST = TagType::ENUM_REP as u32 | 5,
        PADDING = TagType::ENUM_REP as u32 | 6,
        CALLER_NONCE = TagType::BOOL as u32 | 7,
        MIN_MAC_LENGTH = TagType::UINT as u32 | 8,
        KDF = TagType::ENUM_REP as u32 | 9,
        EC_CURVE = TagType::ENUM as u32 | 10,
        RSA_PUBLIC_EXPONENT = TagType::ULONG as u32 | 200,
        ECIES_SINGLE_HASH_MODE = TagType::BOOL as u32 | 201,
        INCLUDE_UNIQUE_ID = TagType::BOOL as u32 | 202,
        BLOB_USAGE_REQUIREMENTS = TagType::ENUM as u32 | 301,
        BOOTLOADER_ONLY = TagType::BOOL as u32 | 302,
        ACTIVE_DATETIME = TagType::DATE as u32 | 400,
        ORIGINATION_EXPIRE_DATETIME = TagType::DATE as u32 | 401,
        USAGE_EXPIRE_DATETIME = TagType::DATE as u32 | 402,
        MIN_SECONDS_BETWEEN_OPS = TagType::UINT as u32 | 403,
        MAX_USES_PER_BOOT = TagType::UINT as u32 | 404,
        ALL_USERS = TagType::BOOL as u32 | 500,
        USER_ID = TagType::UINT as u32 | 501,
        USER_SECURE_ID = TagType::ULONG_REP as u32 | 502,
        NO_AUTH_REQUIRED = TagType::BOOL as u32 | 503,
        USER_AUTH_TYPE = TagType::ENUM as u32 | 504,
        AUTH_TIMEOUT = TagType::UINT as u32 | 505,
        ALLOW_WHILE_ON_BODY = TagType::BOOL as u32 | 506,
        ALL_APPLICATIONS = TagType::BOOL as u32 | 600,
        APPLICATION_ID = TagType::BYTES as u32 | 601,
        EXPORTABLE = TagType::BOOL as u32 | 602,
        APPLICATION_DATA = TagType::BYTES as u32 | 700,
        CREATION_DATETIME = TagType::DATE as u32 | 701,
        ORIGIN = TagType::ENUM as u32 | 702,
        ROLLBACK_RESISTANT = TagType::BOOL as u32 | 703,
        ROOT_OF_TRUST = TagType::BYTES as u32 | 704,
        OS_VERSION = TagType::UINT as u32 | 705,
        OS_PATCHLEVEL = TagType::UINT as u32 | 706,
        UNIQUE_ID = TagType::BYTES as u32 | 707,
        ATTESTATION_CHALLENGE = TagType::BYTES as u32 | 708,
        ATTESTATION_APPLICATION_ID = TagType::BYTES as u32 | 709,
        ATTESTATION_ID_BRAND = TagType::BYTES as u32 | 710,
        ATTESTATION_ID_DEVICE = TagType::BYTES as u32 | 711,
        ATTESTATION_ID_PRODUCT = TagType::BYTES as u32 | 712,
        ATTESTATION_ID_SERIAL = TagType::BYTES as u32 | 713,
        ATTESTATION_ID_IMEI = TagType::BYTES as u32 | 714,
        ATTESTATION_ID_MEID = TagType::BYTES as u32 | 715,
        ATTESTATION_ID_MANUFACTURER = TagType::BYTES as u32 | 716,
        ATTESTATION_ID_MODEL = TagType::BYTES as u32 | 717,
        ASSOCIATED_DATA = TagType::BYTES as u32 | 1000,
        NONCE = TagType::BYTES as u32 | 1001,
        AUTH_TOKEN = TagType::BYTES as u32 | 1002,
        MAC_LENGTH = TagType::UINT as u32 | 1003,
        RESET_SINCE_ID_ROTATION = TagType::BOOL as u32 | 1004,
    }
}

impl Tag {
    /// Returns the type encoded in the upper four bits of the tag.
    pub fn tag_type(&self) -> TagType {
        // Every tag above is declared with one of the TagType values, so this cannot fail.
        TagType::try_from(*self as u32 & 0xF000_0000).unwrap_or(TagType::INVALID)
    }

    /// Repeatable tags may occur more than once in a parameter set.
    pub fn is_repeatable(&self) -> bool {
        matches!(self.tag_type(), TagType::ENUM_REP | TagType::UINT_REP | TagType::ULONG_REP)
    }
}

km_enum! {
    pub enum Algorithm {
        RSA = 1,
        EC = 3,
        AES = 32,
        HMAC = 128,
    }
}

km_enum! {
    pub enum BlockMode {
        ECB = 1,
        CBC = 2,
        CTR = 3,
        GCM = 32,
    }
}

km_enum! {
    pub enum PaddingMode {
        NONE = 1,
        RSA_OAEP = 2,
        RSA_PSS = 3,
        RSA_PKCS1_1_5_ENCRYPT = 4,
        RSA_PKCS1_1_5_SIGN = 5,
        PKCS7 = 64,
    }
}

km_enum! {
    pub enum Digest {
        NONE = 0,
        MD5 = 1,
        SHA1 = 2,
        SHA_2_224 = 3,
        SHA_2_256 = 4,
        SHA_2_384 = 5,
        SHA_2_512 = 6,
    }
}

km_enum! {
    pub enum EcCurve {
        P_224 = 0,
        P_256 = 1,
        P_384 = 2,
        P_521 = 3,
    }
}

impl EcCurve {
    /// Keymaster 1 devices identify curves by their key size.
    pub fn key_size(&self) -> u32 {
        match self {
            EcCurve::P_224 => 224,
            EcCurve::P_256 => 256,
            EcCurve::P_384 => 384,
            EcCurve::P_521 => 521,
        }
    }

    /// Inverse of `key_size`.
    pub fn from_key_size(key_size: u32) -> Option<EcCurve> {
        match key_size {
            224 => Some(EcCurve::P_224),
            256 => Some(EcCurve::P_256),
            384 => Some(EcCurve::P_384),
            521 => Some(EcCurve::P_521),
            _ => None,
        }
    }
}

km_enum! {
    pub enum KeyOrigin {
        GENERATED = 0,
        DERIVED = 1,
        IMPORTED = 2,
        UNKNOWN = 3,
    }
}

km_enum! {
    pub enum KeyBlobUsageRequirements {
        STANDALONE = 0,
        REQUIRES_FILE_SYSTEM = 1,
    }
}

km_enum! {
    pub enum KeyPurpose {
        ENCRYPT = 0,
        DECRYPT = 1,
        SIGN = 2,
        VERIFY = 3,
        DERIVE_KEY = 4,
        WRAP_KEY = 5,
    }
}

km_enum! {
    pub enum KeyDerivationFunction {
        NONE = 0,
        RFC5869_SHA256 = 1,
        ISO18033_2_KDF1_SHA1 = 2,
        ISO18033_2_KDF1_SHA256 = 3,
        ISO18033_2_KDF2_SHA1 = 4,
        ISO18033_2_KDF2_SHA256 = 5,
    }
}

km_enum! {
    pub enum HardwareAuthenticatorType {
        NONE = 0,
        PASSWORD = 1,
        FINGERPRINT = 1 << 1,
        ANY = 0xFFFF_FFFF,
    }
}

km_enum! {
    pub enum KeyFormat {
        X509 = 0,
        PKCS8 = 1,
        RAW = 3,
    }
}

km_enum! {
    pub enum SecurityLevel {
        SOFTWARE = 0,
        TRUSTED_ENVIRONMENT = 1,
    }
}

/// Declares the `ErrorCode` newtype. Error codes are kept as an open i32 newtype
/// rather than an enum because they travel as raw integers on both sides of the shim.
macro_rules! declare_error_codes {
    ($($name:ident = $value:literal,)*) => {
        /// Keymaster 3.0 error code. `ErrorCode::OK` is never used as an error.
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct ErrorCode(pub i32);

        impl ErrorCode {
            $(pub const $name: ErrorCode = ErrorCode($value);)*

            /// Symbolic name of a declared error code.
            pub fn name(&self) -> Option<&'static str> {
                match self.0 {
                    $($value => Some(stringify!($name)),)*
                    _ => None,
                }
            }
        }
    };
}

declare_error_codes! {
    OK = 0,
    ROOT_OF_TRUST_ALREADY_SET = -1,
    UNSUPPORTED_PURPOSE = -2,
    INCOMPATIBLE_PURPOSE = -3,
    UNSUPPORTED_ALGORITHM = -4,
    INCOMPATIBLE_ALGORITHM = -5,
    UNSUPPORTED_KEY_SIZE = -6,
    UNSUPPORTED_BLOCK_MODE = -7,
    INCOMPATIBLE_BLOCK_MODE = -8,
    UNSUPPORTED_MAC_LENGTH = -9,
    UNSUPPORTED_PADDING_MODE = -10,
    INCOMPATIBLE_PADDING_MODE = -11,
    UNSUPPORTED_DIGEST = -12,
    INCOMPATIBLE_DIGEST = -13,
    INVALID_EXPIRATION_TIME = -14,
    INVALID_USER_ID = -15,
    INVALID_AUTHORIZATION_TIMEOUT = -16,
    UNSUPPORTED_KEY_FORMAT = -17,
    INCOMPATIBLE_KEY_FORMAT = -18,
    UNSUPPORTED_KEY_ENCRYPTION_ALGORITHM = -19,
    UNSUPPORTED_KEY_VERIFICATION_ALGORITHM = -20,
    INVALID_INPUT_LENGTH = -21,
    KEY_EXPORT_OPTIONS_INVALID = -22,
    DELEGATION_NOT_ALLOWED = -23,
    KEY_NOT_YET_VALID = -24,
    KEY_EXPIRED = -25,
    KEY_USER_NOT_AUTHENTICATED = -26,
    OUTPUT_PARAMETER_NULL = -27,
    INVALID_OPERATION_HANDLE = -28,
    INSUFFICIENT_BUFFER_SPACE = -29,
    VERIFICATION_FAILED = -30,
    TOO_MANY_OPERATIONS = -31,
    UNEXPECTED_NULL_POINTER = -32,
    INVALID_KEY_BLOB = -33,
    IMPORTED_KEY_NOT_ENCRYPTED = -34,
    IMPORTED_KEY_DECRYPTION_FAILED = -35,
    IMPORTED_KEY_NOT_SIGNED = -36,
    IMPORTED_KEY_VERIFICATION_FAILED = -37,
    INVALID_ARGUMENT = -38,
    UNSUPPORTED_TAG = -39,
    INVALID_TAG = -40,
    MEMORY_ALLOCATION_FAILED = -41,
    IMPORT_PARAMETER_MISMATCH = -44,
    SECURE_HW_ACCESS_DENIED = -45,
    OPERATION_CANCELLED = -46,
    CONCURRENT_ACCESS_CONFLICT = -47,
    SECURE_HW_BUSY = -48,
    SECURE_HW_COMMUNICATION_FAILED = -49,
    UNSUPPORTED_EC_FIELD = -50,
    MISSING_NONCE = -51,
    INVALID_NONCE = -52,
    MISSING_MAC_LENGTH = -53,
    KEY_RATE_LIMIT_EXCEEDED = -54,
    CALLER_NONCE_PROHIBITED = -55,
    KEY_MAX_OPS_EXCEEDED = -56,
    INVALID_MAC_LENGTH = -57,
    MISSING_MIN_MAC_LENGTH = -58,
    UNSUPPORTED_MIN_MAC_LENGTH = -59,
    UNSUPPORTED_KDF = -60,
    UNSUPPORTED_EC_CURVE = -61,
    KEY_REQUIRES_UPGRADE = -62,
    ATTESTATION_CHALLENGE_MISSING = -63,
    KEYMASTER_NOT_CONFIGURED = -64,
    ATTESTATION_APPLICATION_ID_MISSING = -65,
    UNIMPLEMENTED = -100,
    VERSION_MISMATCH = -101,
    UNKNOWN_ERROR = -1000,
}

impl fmt::Debug for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}({})", name, self.0),
            None => write!(f, "ErrorCode({})", self.0),
        }
    }
}

/// Result type of every `IKeymasterDevice` call.
pub type KmResult<T> = Result<T, ErrorCode>;

/// Mirrors the output of `IKeymasterDevice::getHardwareFeatures`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HardwareFeatures {
    pub isSecure: bool,
    pub supportsEllipticCurve: bool,
    pub supportsSymmetricCryptography: bool,
    pub supportsAttestation: bool,
    pub supportsAllDigests: bool,
    pub keymasterName: String,
    pub keymasterAuthorName: String,
}

/// Authorizations of a key, split by the entity enforcing them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyCharacteristics {
    pub softwareEnforced: Vec<crate::key_parameter::KeyParameter>,
    pub teeEnforced: Vec<crate::key_parameter::KeyParameter>,
}

impl KeyCharacteristics {
    /// Iterates over both enforcement lists.
    pub fn iter(&self) -> impl Iterator<Item = &crate::key_parameter::KeyParameter> {
        self.teeEnforced.iter().chain(self.softwareEnforced.iter())
    }
}

/// Output of `generateKey` and `importKey`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyCreationResult {
    pub keyBlob: Vec<u8>,
    pub keyCharacteristics: KeyCharacteristics,
}

/// Output of `begin`. The operation handle doubles as the auth token challenge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BeginResult {
    pub outParams: Vec<crate::key_parameter::KeyParameter>,
    pub operationHandle: u64,
}

impl BeginResult {
    /// The challenge to be embedded in auth tokens for this operation.
    pub fn challenge(&self) -> u64 {
        self.operationHandle
    }
}

/// Output of `update`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateResult {
    pub inputConsumed: u32,
    pub outParams: Vec<crate::key_parameter::KeyParameter>,
    pub output: Vec<u8>,
}

/// Output of `finish`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FinishResult {
    pub outParams: Vec<crate::key_parameter::KeyParameter>,
    pub output: Vec<u8>,
}

/// The keymaster@3.0 device interface. Implementations must tolerate concurrent
/// calls from multiple transport threads.
pub trait IKeymasterDevice: Send + Sync {
    fn getHardwareFeatures(&self) -> HardwareFeatures;

    fn addRngEntropy(&self, data: &[u8]) -> KmResult<()>;

    fn generateKey(
        &self,
        keyParams: &[crate::key_parameter::KeyParameter],
    ) -> KmResult<KeyCreationResult>;

    fn importKey(
        &self,
        params: &[crate::key_parameter::KeyParameter],
        keyFormat: KeyFormat,
        keyData: &[u8],
    ) -> KmResult<KeyCreationResult>;

    fn getKeyCharacteristics(
        &self,
        keyBlob: &[u8],
        clientId: &[u8],
        appData: &[u8],
    ) -> KmResult<KeyCharacteristics>;

    fn exportKey(
        &self,
        keyFormat: KeyFormat,
        keyBlob: &[u8],
        clientId: &[u8],
        appData: &[u8],
    ) -> KmResult<Vec<u8>>;

    fn attestKey(
        &self,
        keyToAttest: &[u8],
        attestParams: &[crate::key_parameter::KeyParameter],
    ) -> KmResult<Vec<Vec<u8>>>;

    fn upgradeKey(
        &self,
        keyBlobToUpgrade: &[u8],
        upgradeParams: &[crate::key_parameter::KeyParameter],
    ) -> KmResult<Vec<u8>>;

    fn deleteKey(&self, keyBlob: &[u8]) -> KmResult<()>;

    fn deleteAllKeys(&self) -> KmResult<()>;

    fn destroyAttestationIds(&self) -> KmResult<()>;

    fn begin(
        &self,
        purpose: KeyPurpose,
        key: &[u8],
        inParams: &[crate::key_parameter::KeyParameter],
    ) -> KmResult<BeginResult>;

    fn update(
        &self,
        operationHandle: u64,
        inParams: &[crate::key_parameter::KeyParameter],
        input: &[u8],
    ) -> KmResult<UpdateResult>;

    fn finish(
        &self,
        operationHandle: u64,
        inParams: &[crate::key_parameter::KeyParameter],
        input: &[u8],
        signature: &[u8],
    ) -> KmResult<FinishResult>;

    fn abort(&self, operationHandle: u64) -> KmResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_type_is_encoded_in_upper_bits() {
        assert_eq!(Tag::PURPOSE.tag_type(), TagType::ENUM_REP);
        assert_eq!(Tag::RSA_PUBLIC_EXPONENT.tag_type(), TagType::ULONG);
        assert_eq!(Tag::USER_SECURE_ID.tag_type(), TagType::ULONG_REP);
        assert_eq!(Tag::APPLICATION_ID.tag_type(), TagType::BYTES);
        assert_eq!(Tag::INVALID.tag_type(), TagType::INVALID);
        assert!(Tag::DIGEST.is_repeatable());
        assert!(!Tag::ALGORITHM.is_repeatable());
    }

    #[test]
    fn raw_values_convert() {
        assert_eq!(Algorithm::try_from(32), Ok(Algorithm::AES));
        assert_eq!(Algorithm::try_from(2), Err(2));
        assert_eq!(Tag::try_from(0x1000_0002), Ok(Tag::ALGORITHM));
        assert_eq!(HardwareAuthenticatorType::try_from(u32::MAX), Ok(HardwareAuthenticatorType::ANY));
    }

    #[test]
    fn error_code_debug_names_known_codes() {
        assert_eq!(format!("{:?}", ErrorCode::INVALID_OPERATION_HANDLE), "INVALID_OPERATION_HANDLE(-28)");
        assert_eq!(format!("{:?}", ErrorCode(-42)), "ErrorCode(-42)");
    }

    #[test]
    fn ec_curve_key_sizes() {
        for curve in [EcCurve::P_224, EcCurve::P_256, EcCurve::P_384, EcCurve::P_521] {
            assert_eq!(EcCurve::from_key_size(curve.key_size()), Some(curve));
        }
        assert_eq!(EcCurve::from_key_size(512), None);
    }
}
