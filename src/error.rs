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

//! Error handling for the shim. Clients of the keymaster@3.0 interface expect a plain
//! `ErrorCode`, while legacy devices report raw `keymaster_error_t` values.
//! This module provides `Error`, which is used internally to diagnose error conditions
//! that need to be reported to the client, and the two conversions at the edges:
//!
//!  * `map_km_error` turns the result of a legacy entry point into `Result<T, Error>`
//!    using a fixed translation table.
//!  * `map_or_log_err` turns an `anyhow::Result` into the `KmResult` returned by the
//!    `IKeymasterDevice` methods, logging every error condition on the way.
//!
//! Internal functions should use `anyhow::Result` to return error conditions, and
//! context should be added every time an error is forwarded.

use std::cmp::PartialEq;

pub use crate::keymaster_definitions::ErrorCode as Ec;

use crate::keymaster_definitions::{ErrorCode, KmResult};
use crate::legacy::{LegacyError, LegacyResult};

/// This is the main error type of the shim. It wraps a keymaster@3.0 `ErrorCode` in the
/// Km variant, and a legacy status code that has no keymaster@3.0 counterpart in the
/// Unmapped variant.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// Wraps a keymaster@3.0 `ErrorCode`.
    #[error("Error::Km({0:?})")]
    Km(ErrorCode),
    /// A raw legacy status code that is absent from the translation table.
    #[error("Error::Unmapped({0})")]
    Unmapped(i32),
}

impl Error {
    /// Short hand for `Error::Km(ErrorCode::UNKNOWN_ERROR)`
    pub fn unknown() -> Self {
        Error::Km(Ec::UNKNOWN_ERROR)
    }

    /// Short hand for `Error::Km(ErrorCode::UNIMPLEMENTED)`
    pub fn unimplemented() -> Self {
        Error::Km(Ec::UNIMPLEMENTED)
    }

    /// The error code reported to the client for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Error::Km(ec) => *ec,
            Error::Unmapped(_) => Ec::UNKNOWN_ERROR,
        }
    }
}

/// Classification of every `ErrorCode` into the failure categories callers act upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The requested algorithm, parameter or operation is unavailable on the wrapped
    /// device generation.
    NotSupported,
    /// Malformed or inconsistent parameters.
    InvalidArgument,
    /// The operation handle is unknown, already finished or aborted.
    InvalidOperationHandle,
    /// The key blob is corrupt, from the wrong device generation, or must be upgraded.
    KeyBlobInvalid,
    /// A hardware level or policy failure reported by the legacy device.
    UnderlyingDeviceError,
    /// A status code the shim cannot classify.
    Unknown,
}

impl ErrorCode {
    /// Returns the category of this error code.
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Ec::UNSUPPORTED_PURPOSE
            | Ec::UNSUPPORTED_ALGORITHM
            | Ec::UNSUPPORTED_KEY_SIZE
            | Ec::UNSUPPORTED_BLOCK_MODE
            | Ec::UNSUPPORTED_MAC_LENGTH
            | Ec::UNSUPPORTED_PADDING_MODE
            | Ec::UNSUPPORTED_DIGEST
            | Ec::UNSUPPORTED_KEY_FORMAT
            | Ec::UNSUPPORTED_KEY_ENCRYPTION_ALGORITHM
            | Ec::UNSUPPORTED_KEY_VERIFICATION_ALGORITHM
            | Ec::UNSUPPORTED_TAG
            | Ec::UNSUPPORTED_EC_FIELD
            | Ec::UNSUPPORTED_MIN_MAC_LENGTH
            | Ec::UNSUPPORTED_KDF
            | Ec::UNSUPPORTED_EC_CURVE
            | Ec::UNIMPLEMENTED
            | Ec::VERSION_MISMATCH => ErrorKind::NotSupported,

            Ec::INVALID_OPERATION_HANDLE => ErrorKind::InvalidOperationHandle,

            Ec::INVALID_KEY_BLOB | Ec::KEY_REQUIRES_UPGRADE => ErrorKind::KeyBlobInvalid,

            Ec::ROOT_OF_TRUST_ALREADY_SET
            | Ec::DELEGATION_NOT_ALLOWED
            | Ec::KEY_NOT_YET_VALID
            | Ec::KEY_EXPIRED
            | Ec::KEY_USER_NOT_AUTHENTICATED
            | Ec::VERIFICATION_FAILED
            | Ec::TOO_MANY_OPERATIONS
            | Ec::IMPORTED_KEY_DECRYPTION_FAILED
            | Ec::IMPORTED_KEY_VERIFICATION_FAILED
            | Ec::MEMORY_ALLOCATION_FAILED
            | Ec::SECURE_HW_ACCESS_DENIED
            | Ec::OPERATION_CANCELLED
            | Ec::CONCURRENT_ACCESS_CONFLICT
            | Ec::SECURE_HW_BUSY
            | Ec::SECURE_HW_COMMUNICATION_FAILED
            | Ec::KEY_RATE_LIMIT_EXCEEDED
            | Ec::KEY_MAX_OPS_EXCEEDED
            | Ec::KEYMASTER_NOT_CONFIGURED => ErrorKind::UnderlyingDeviceError,

            Ec::INCOMPATIBLE_PURPOSE
            | Ec::INCOMPATIBLE_ALGORITHM
            | Ec::INCOMPATIBLE_BLOCK_MODE
            | Ec::INCOMPATIBLE_PADDING_MODE
            | Ec::INCOMPATIBLE_DIGEST
            | Ec::INVALID_EXPIRATION_TIME
            | Ec::INVALID_USER_ID
            | Ec::INVALID_AUTHORIZATION_TIMEOUT
            | Ec::INCOMPATIBLE_KEY_FORMAT
            | Ec::INVALID_INPUT_LENGTH
            | Ec::KEY_EXPORT_OPTIONS_INVALID
            | Ec::OUTPUT_PARAMETER_NULL
            | Ec::INSUFFICIENT_BUFFER_SPACE
            | Ec::UNEXPECTED_NULL_POINTER
            | Ec::IMPORTED_KEY_NOT_ENCRYPTED
            | Ec::IMPORTED_KEY_NOT_SIGNED
            | Ec::INVALID_ARGUMENT
            | Ec::INVALID_TAG
            | Ec::IMPORT_PARAMETER_MISMATCH
            | Ec::MISSING_NONCE
            | Ec::INVALID_NONCE
            | Ec::MISSING_MAC_LENGTH
            | Ec::CALLER_NONCE_PROHIBITED
            | Ec::INVALID_MAC_LENGTH
            | Ec::MISSING_MIN_MAC_LENGTH
            | Ec::ATTESTATION_CHALLENGE_MISSING
            | Ec::ATTESTATION_APPLICATION_ID_MISSING => ErrorKind::InvalidArgument,

            _ => ErrorKind::Unknown,
        }
    }
}

/// Translates a raw legacy status code into a keymaster@3.0 `ErrorCode`.
/// Keymaster 1 and 2 share the numbering of every code they define with keymaster@3.0,
/// but the table is spelled out so that a status value that was never defined does not
/// leak to the client as a seemingly meaningful code.
pub fn translate_legacy_error(legacy: LegacyError) -> Error {
    let ec = match legacy.0 {
        -1 => Ec::ROOT_OF_TRUST_ALREADY_SET,
        -2 => Ec::UNSUPPORTED_PURPOSE,
        -3 => Ec::INCOMPATIBLE_PURPOSE,
        -4 => Ec::UNSUPPORTED_ALGORITHM,
        -5 => Ec::INCOMPATIBLE_ALGORITHM,
        -6 => Ec::UNSUPPORTED_KEY_SIZE,
        -7 => Ec::UNSUPPORTED_BLOCK_MODE,
        -8 => Ec::INCOMPATIBLE_BLOCK_MODE,
        -9 => Ec::UNSUPPORTED_MAC_LENGTH,
        -10 => Ec::UNSUPPORTED_PADDING_MODE,
        -11 => Ec::INCOMPATIBLE_PADDING_MODE,
        -12 => Ec::UNSUPPORTED_DIGEST,
        -13 => Ec::INCOMPATIBLE_DIGEST,
        -14 => Ec::INVALID_EXPIRATION_TIME,
        -15 => Ec::INVALID_USER_ID,
        -16 => Ec::INVALID_AUTHORIZATION_TIMEOUT,
        -17 => Ec::UNSUPPORTED_KEY_FORMAT,
        -18 => Ec::INCOMPATIBLE_KEY_FORMAT,
        -19 => Ec::UNSUPPORTED_KEY_ENCRYPTION_ALGORITHM,
        -20 => Ec::UNSUPPORTED_KEY_VERIFICATION_ALGORITHM,
        -21 => Ec::INVALID_INPUT_LENGTH,
        -22 => Ec::KEY_EXPORT_OPTIONS_INVALID,
        -23 => Ec::DELEGATION_NOT_ALLOWED,
        -24 => Ec::KEY_NOT_YET_VALID,
        -25 => Ec::KEY_EXPIRED,
        -26 => Ec::KEY_USER_NOT_AUTHENTICATED,
        -27 => Ec::OUTPUT_PARAMETER_NULL,
        -28 => Ec::INVALID_OPERATION_HANDLE,
        -29 => Ec::INSUFFICIENT_BUFFER_SPACE,
        -30 => Ec::VERIFICATION_FAILED,
        -31 => Ec::TOO_MANY_OPERATIONS,
        -32 => Ec::UNEXPECTED_NULL_POINTER,
        -33 => Ec::INVALID_KEY_BLOB,
        -34 => Ec::IMPORTED_KEY_NOT_ENCRYPTED,
        -35 => Ec::IMPORTED_KEY_DECRYPTION_FAILED,
        -36 => Ec::IMPORTED_KEY_NOT_SIGNED,
        -37 => Ec::IMPORTED_KEY_VERIFICATION_FAILED,
        -38 => Ec::INVALID_ARGUMENT,
        -39 => Ec::UNSUPPORTED_TAG,
        -40 => Ec::INVALID_TAG,
        -41 => Ec::MEMORY_ALLOCATION_FAILED,
        -44 => Ec::IMPORT_PARAMETER_MISMATCH,
        -45 => Ec::SECURE_HW_ACCESS_DENIED,
        -46 => Ec::OPERATION_CANCELLED,
        -47 => Ec::CONCURRENT_ACCESS_CONFLICT,
        -48 => Ec::SECURE_HW_BUSY,
        -49 => Ec::SECURE_HW_COMMUNICATION_FAILED,
        -50 => Ec::UNSUPPORTED_EC_FIELD,
        -51 => Ec::MISSING_NONCE,
        -52 => Ec::INVALID_NONCE,
        -53 => Ec::MISSING_MAC_LENGTH,
        -54 => Ec::KEY_RATE_LIMIT_EXCEEDED,
        -55 => Ec::CALLER_NONCE_PROHIBITED,
        -56 => Ec::KEY_MAX_OPS_EXCEEDED,
        -57 => Ec::INVALID_MAC_LENGTH,
        -58 => Ec::MISSING_MIN_MAC_LENGTH,
        -59 => Ec::UNSUPPORTED_MIN_MAC_LENGTH,
        -60 => Ec::UNSUPPORTED_KDF,
        -61 => Ec::UNSUPPORTED_EC_CURVE,
        -62 => Ec::KEY_REQUIRES_UPGRADE,
        -63 => Ec::ATTESTATION_CHALLENGE_MISSING,
        -64 => Ec::KEYMASTER_NOT_CONFIGURED,
        -65 => Ec::ATTESTATION_APPLICATION_ID_MISSING,
        -100 => Ec::UNIMPLEMENTED,
        -101 => Ec::VERSION_MISMATCH,
        -1000 => Ec::UNKNOWN_ERROR,
        raw => {
            log::warn!("Legacy device returned unrecognized status code {}.", raw);
            return Error::Unmapped(raw);
        }
    };
    Error::Km(ec)
}

/// This function converts the result of a legacy entry point into a `Result` with the
/// shim's `Error`. Every failure is translated by `translate_legacy_error`.
///
/// # Examples
///
/// ```ignore
/// let characteristics = map_km_error(km1.get_key_characteristics(blob, None, None))
///     .context("In get_key_characteristics.")?;
/// ```
pub fn map_km_error<T>(r: LegacyResult<T>) -> Result<T, Error> {
    r.map_err(translate_legacy_error)
}

/// This function should be used by the `IKeymasterDevice` methods to translate error
/// conditions into the `ErrorCode` returned to the client.
/// All error conditions get logged by this function.
/// All `Error::Km(x)` variants get mapped onto `Err(x)`.
///
/// All non `Error` error conditions, and `Error::Unmapped`, get mapped onto
/// `ErrorCode::UNKNOWN_ERROR`.
///
/// `handle_ok` will be called if `result` is `Ok(value)` where `value` will be passed
/// as argument to `handle_ok`. `handle_ok` must generate a `KmResult`, typically
/// `Ok(value)`.
///
/// # Examples
///
/// ```ignore
/// fn generate_key() -> anyhow::Result<KeyCreationResult> {
///     if !supported {
///         Err(anyhow!(Error::Km(ErrorCode::UNSUPPORTED_ALGORITHM)))
///     } else {
///         Ok(result)
///     }
/// }
///
/// km_result = map_or_log_err(generate_key(), Ok);
/// ```
pub fn map_or_log_err<T, U, F>(result: anyhow::Result<U>, handle_ok: F) -> KmResult<T>
where
    F: FnOnce(U) -> KmResult<T>,
{
    result.map_or_else(
        |e| {
            log::error!("{:?}", e);
            let root_cause = e.root_cause();
            let ec = match root_cause.downcast_ref::<Error>() {
                Some(e) => e.error_code(),
                None => Ec::UNKNOWN_ERROR,
            };
            Err(ec)
        },
        handle_ok,
    )
}

// mod tests
