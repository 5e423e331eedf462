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

//! Key parameters describe properties of keys and operations. During key generation
//! and import they characterize a key and its usage restrictions, during the lifetime
//! of the key they are reported as key characteristics, and during cryptographic
//! operations they carry operation specific inputs and outputs.
//!
//! This module provides the strongly typed `KeyParameter` used by the keymaster@3.0
//! interface and its conversion from and into the legacy `keymaster_key_param_t`
//! shape (`KmParam`).
//!
//! ## Synopsis
//!
//! enum KeyParameter {
//!     Invalid,
//!     Algorithm(Algorithm),
//!     ...
//! }
//!
//! impl KeyParameter {
//!     pub fn get_tag(&self) -> Tag;
//! }
//!
//! impl TryFrom<KmParam> for KeyParameter {}
//! impl From<KeyParameter> for KmParam {}
//!
//! ## Implementation
//! All of the above is bootstrapped from a single list of key parameters that has
//! to be kept in sync with the keymaster@3.0 tag list. Each entry reads
//!
//!    Algorithm(Algorithm) with tag ALGORITHM and field Enum,
//!    $vname $(($vtype ))? with tag $tag_name and field $field_name,
//!
//! where the field names the variant of the legacy `KmParamValue` union that carries
//! the value. $vtype is optional to accommodate boolean tags, which are implicitly
//! true when present.
//!
//! Where the expansion depends on the presence of $vtype the macros recurse through
//! the list with the pattern
//!
//! (@<marker> <non repeating args>, [<out list>], [<in list>])
//!
//! popping one element off the in list per step, until the in list is empty.

use std::convert::TryFrom;

pub use crate::keymaster_definitions::{
    Algorithm, BlockMode, Digest, EcCurve, HardwareAuthenticatorType, KeyBlobUsageRequirements,
    KeyDerivationFunction, KeyOrigin, KeyPurpose, PaddingMode, Tag, TagType,
};
use crate::legacy::{KmParam, KmParamValue};

/// Associates each type that can be stored inside a KeyParameter with the primitive
/// that carries it in `KmParamValue`. Enum types convert fallibly because a legacy
/// device may hand us values that keymaster@3.0 does not define.
trait AssociatePrimitive: Sized {
    type Primitive;

    fn from_primitive(v: Self::Primitive) -> Option<Self>;
    fn to_primitive(&self) -> Self::Primitive;
}

/// Associates the given enum type with u32.
macro_rules! implement_associate_primitive_for_km_enum {
    ($t:ty) => {
        impl AssociatePrimitive for $t {
            type Primitive = u32;

            fn from_primitive(v: Self::Primitive) -> Option<Self> {
                <$t>::try_from(v).ok()
            }
            fn to_primitive(&self) -> Self::Primitive {
                *self as u32
            }
        }
    };
}

/// Associates the given type with itself.
macro_rules! implement_associate_primitive_identity {
    ($t:ty) => {
        impl AssociatePrimitive for $t {
            type Primitive = $t;

            fn from_primitive(v: Self::Primitive) -> Option<Self> {
                Some(v)
            }
            fn to_primitive(&self) -> Self::Primitive {
                self.clone()
            }
        }
    };
}

implement_associate_primitive_for_km_enum! {Algorithm}
implement_associate_primitive_for_km_enum! {BlockMode}
implement_associate_primitive_for_km_enum! {Digest}
implement_associate_primitive_for_km_enum! {EcCurve}
implement_associate_primitive_for_km_enum! {HardwareAuthenticatorType}
implement_associate_primitive_for_km_enum! {KeyBlobUsageRequirements}
implement_associate_primitive_for_km_enum! {KeyDerivationFunction}
implement_associate_primitive_for_km_enum! {KeyOrigin}
implement_associate_primitive_for_km_enum! {KeyPurpose}
implement_associate_primitive_for_km_enum! {PaddingMode}

implement_associate_primitive_identity! {Vec<u8>}
implement_associate_primitive_identity! {u64}
implement_associate_primitive_identity! {u32}

/// Returned when a legacy parameter cannot be represented as a `KeyParameter`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParameterError {
    /// The raw tag is not a keymaster@3.0 tag.
    #[error("Unknown tag {0:#x}.")]
    UnknownTag(u32),
    /// The union field does not match the type encoded in the tag.
    #[error("Value does not match the type of tag {0:?}.")]
    TypeMismatch(Tag),
    /// The enum value is not defined for the tag.
    #[error("Invalid value for tag {0:?}.")]
    InvalidValue(Tag),
}

/// Default values used when converting variants without a wrapped type into the
/// legacy representation. Boolean parameters are implicitly true if present.
trait KpDefault {
    fn default() -> Self;
}

impl KpDefault for u32 {
    fn default() -> Self {
        0
    }
}

impl KpDefault for bool {
    fn default() -> Self {
        true
    }
}

/// Expands the list of KeyParameter variants as follows:
///
/// Input:
/// pub enum KeyParameter {
///     Invalid with tag INVALID and field Integer,
///     Algorithm(Algorithm) with tag ALGORITHM and field Enum,
/// }
///
/// Output:
/// ```ignore
/// pub enum KeyParameter {
///     Invalid,
///     Algorithm(Algorithm),
/// }
/// ```
macro_rules! implement_enum {
    (
        $(#[$enum_meta:meta])*
        $enum_vis:vis enum $enum_name:ident {
             $($(#[$emeta:meta])* $vname:ident$(($vtype:ty))?),* $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        $enum_vis enum $enum_name {
            $(
                $(#[$emeta])*
                $vname$(($vtype))?
            ),*
        }
    };
}

/// Expands the list of KeyParameter variants as follows:
///
/// Input:
/// Invalid with tag INVALID and field Integer,
/// Algorithm(Algorithm) with tag ALGORITHM and field Enum,
///
/// Output:
/// ```ignore
/// pub fn get_tag(&self) -> Tag {
///     match self {
///         KeyParameter::Invalid => Tag::INVALID,
///         KeyParameter::Algorithm(_) => Tag::ALGORITHM,
///     }
/// }
/// ```
macro_rules! implement_get_tag {
    (
        @replace_type_spec
        $enum_name:ident,
        [$($out:tt)*],
        [$vname:ident($vtype:ty) $tag_name:ident, $($in:tt)*]
    ) => {
        implement_get_tag!{@replace_type_spec $enum_name, [$($out)*
            $enum_name::$vname(_) => Tag::$tag_name,
        ], [$($in)*]}
    };
    (
        @replace_type_spec
        $enum_name:ident,
        [$($out:tt)*],
        [$vname:ident $tag_name:ident, $($in:tt)*]
    ) => {
        implement_get_tag!{@replace_type_spec $enum_name, [$($out)*
            $enum_name::$vname => Tag::$tag_name,
        ], [$($in)*]}
    };
    (@replace_type_spec $enum_name:ident, [$($out:tt)*], []) => {
        /// Returns the tag of the given instance.
        pub fn get_tag(&self) -> Tag {
            match self {
                $($out)*
            }
        }
    };

    ($enum_name:ident; $($vname:ident$(($vtype:ty))? $tag_name:ident),*) => {
        implement_get_tag!{@replace_type_spec $enum_name, [], [$($vname$(($vtype))? $tag_name,)*]}
    };
}

/// Expands the list of KeyParameter variants as follows:
///
/// Input:
/// Invalid with tag INVALID and field Integer,
/// Algorithm(Algorithm) with tag ALGORITHM and field Enum,
///
/// Output:
/// ```ignore
/// impl TryFrom<KmParam> for KeyParameter {
///     type Error = ParameterError;
///
///     fn try_from(kp: KmParam) -> Result<Self, Self::Error> {
///         let tag = Tag::try_from(kp.tag).map_err(ParameterError::UnknownTag)?;
///         match (tag, kp.value) {
///             (Tag::INVALID, KmParamValue::Integer(_)) => Ok(KeyParameter::Invalid),
///             (Tag::ALGORITHM, KmParamValue::Enum(v)) => Ok(KeyParameter::Algorithm(
///                 <Algorithm>::from_primitive(v).ok_or(ParameterError::InvalidValue(tag))?
///             )),
///             (tag, _) => Err(ParameterError::TypeMismatch(tag)),
///         }
///     }
/// }
///
/// impl From<KeyParameter> for KmParam {
///     fn from(kp: KeyParameter) -> Self {
///         match kp {
///             KeyParameter::Invalid => KmParam {
///                 tag: Tag::INVALID as u32,
///                 value: KmParamValue::Integer(KpDefault::default()),
///             },
///             KeyParameter::Algorithm(v) => KmParam {
///                 tag: Tag::ALGORITHM as u32,
///                 value: KmParamValue::Enum(v.to_primitive()),
///             },
///         }
///     }
/// }
/// ```
macro_rules! implement_try_from_to_legacy_parameter {
    // The first three rules expand TryFrom<KmParam>.
    (
        @from
        $enum_name:ident,
        [$($out:tt)*],
        [$vname:ident($vtype:ty) $tag_name:ident $field_name:ident, $($in:tt)*]
    ) => {
        implement_try_from_to_legacy_parameter!{@from $enum_name, [$($out)*
            (Tag::$tag_name, KmParamValue::$field_name(v)) => Ok($enum_name::$vname(
                <$vtype>::from_primitive(v).ok_or(ParameterError::InvalidValue(Tag::$tag_name))?
            )),
        ], [$($in)*]
    }};
    (
        @from
        $enum_name:ident,
        [$($out:tt)*],
        [$vname:ident $tag_name:ident $field_name:ident, $($in:tt)*]
    ) => {
        implement_try_from_to_legacy_parameter!{@from $enum_name, [$($out)*
            (Tag::$tag_name, KmParamValue::$field_name(_)) => Ok($enum_name::$vname),
        ], [$($in)*]
    }};
    (@from $enum_name:ident, [$($out:tt)*], []) => {
        impl TryFrom<KmParam> for $enum_name {
            type Error = ParameterError;

            fn try_from(kp: KmParam) -> Result<Self, Self::Error> {
                let tag = Tag::try_from(kp.tag).map_err(ParameterError::UnknownTag)?;
                match (tag, kp.value) {
                    $($out)*
                    (tag, _) => Err(ParameterError::TypeMismatch(tag)),
                }
            }
        }
    };

    // The next three rules expand From<KeyParameter> for KmParam.
    (
        @into
        $enum_name:ident,
        [$($out:tt)*],
        [$vname:ident($vtype:ty) $tag_name:ident $field_name:ident, $($in:tt)*]
    ) => {
        implement_try_from_to_legacy_parameter!{@into $enum_name, [$($out)*
            $enum_name::$vname(v) => KmParam {
                tag: Tag::$tag_name as u32,
                value: KmParamValue::$field_name(v.to_primitive()),
            },
        ], [$($in)*]
    }};
    (
        @into
        $enum_name:ident,
        [$($out:tt)*],
        [$vname:ident $tag_name:ident $field_name:ident, $($in:tt)*]
    ) => {
        implement_try_from_to_legacy_parameter!{@into $enum_name, [$($out)*
            $enum_name::$vname => KmParam {
                tag: Tag::$tag_name as u32,
                value: KmParamValue::$field_name(KpDefault::default()),
            },
        ], [$($in)*]
    }};
    (@into $enum_name:ident, [$($out:tt)*], []) => {
        impl From<$enum_name> for KmParam {
            fn from(kp: $enum_name) -> Self {
                match kp {
                    $($out)*
                }
            }
        }
    };

    ($enum_name:ident; $($vname:ident$(($vtype:ty))? $tag_name:ident $field_name:ident),*) => {
        implement_try_from_to_legacy_parameter!(
            @from $enum_name,
            [],
            [$($vname$(($vtype))? $tag_name $field_name,)*]
        );
        implement_try_from_to_legacy_parameter!(
            @into $enum_name,
            [],
            [$($vname$(($vtype))? $tag_name $field_name,)*]
        );
    };
}

/// This is the top level macro. It takes the key parameter list and passes it on to the
/// other macros to generate the enum and all of its conversion functions. In addition,
/// it generates a test vector for verifying that the tag type of each tag matches the
/// legacy union field that carries it.
macro_rules! implement_key_parameter {
    (
        $(#[$enum_meta:meta])*
        $enum_vis:vis enum $enum_name:ident {
            $(
                 $(#[$emeta:meta])*
                $vname:ident$(($vtype:ty))? with tag $tag_name:ident and field $field_name:ident
            ),* $(,)?
        }
    ) => {
        implement_enum!(
            $(#[$enum_meta])*
            $enum_vis enum $enum_name {
            $(
                $(#[$emeta])*
                $vname$(($vtype))?
            ),*
        });

        impl $enum_name {
            implement_get_tag!($enum_name; $($vname$(($vtype))? $tag_name),*);

            #[cfg(test)]
            fn make_field_matches_tag_type_test_vector() -> Vec<(Tag, &'static str)> {
                vec![$((Tag::$tag_name, stringify!($field_name))),*]
            }
        }

        implement_try_from_to_legacy_parameter!(
            $enum_name;
            $($vname$(($vtype))? $tag_name $field_name),*
        );
    };
}

implement_key_parameter! {
/// KeyParameter holds a value corresponding to one of the Tags defined in
/// the HIDL interface definition at hardware/interfaces/keymaster/3.0
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum KeyParameter {
    /// Associated with Tag:INVALID
    Invalid with tag INVALID and field Integer,
    /// Set of purposes for which the key may be used
    KeyPurpose(KeyPurpose) with tag PURPOSE and field Enum,
    /// Cryptographic algorithm with which the key is used
    Algorithm(Algorithm) with tag ALGORITHM and field Enum,
    /// Size of the key, in bits
    KeySize(u32) with tag KEY_SIZE and field Integer,
    /// Block cipher mode(s) with which the key may be used
    BlockMode(BlockMode) with tag BLOCK_MODE and field Enum,
    /// Digest algorithms that may be used with the key to perform signing and verification
    Digest(Digest) with tag DIGEST and field Enum,
    /// Padding modes that may be used with the key. Relevant to RSA and AES keys.
    PaddingMode(PaddingMode) with tag PADDING and field Enum,
    /// Can the caller provide a nonce for nonce-requiring operations
    CallerNonce with tag CALLER_NONCE and field Bool,
    /// Minimum length of MAC for HMAC keys and AES keys that support GCM mode
    MinMacLength(u32) with tag MIN_MAC_LENGTH and field Integer,
    /// Key derivation functions usable with the key
    Kdf(KeyDerivationFunction) with tag KDF and field Enum,
    /// The elliptic curve
    EcCurve(EcCurve) with tag EC_CURVE and field Enum,
    /// Value of the public exponent for an RSA key pair
    RsaPublicExponent(u64) with tag RSA_PUBLIC_EXPONENT and field LongInteger,
    /// ECIES uses a single hash for both the KDF and the MAC
    EciesSingleHashMode with tag ECIES_SINGLE_HASH_MODE and field Bool,
    /// An attestation certificate for the generated key should contain an application-scoped
    /// and time-bounded device-unique ID
    IncludeUniqueId with tag INCLUDE_UNIQUE_ID and field Bool,
    /// Specifies whether the key blob depends on file system state
    BlobUsageRequirements(KeyBlobUsageRequirements) with tag BLOB_USAGE_REQUIREMENTS and field Enum,
    /// The key may only be used by the bootloader
    BootloaderOnly with tag BOOTLOADER_ONLY and field Bool,
    /// Date when the key becomes usable, in milliseconds since the epoch
    ActiveDateTime(u64) with tag ACTIVE_DATETIME and field DateTime,
    /// Date after which the key may no longer be used to create signatures or encrypt
    OriginationExpireDateTime(u64) with tag ORIGINATION_EXPIRE_DATETIME and field DateTime,
    /// Date after which the key may no longer be used at all
    UsageExpireDateTime(u64) with tag USAGE_EXPIRE_DATETIME and field DateTime,
    /// Minimum amount of time that elapses between allowed operations
    MinSecondsBetweenOps(u32) with tag MIN_SECONDS_BETWEEN_OPS and field Integer,
    /// Maximum number of times the key may be used between system reboots
    MaxUsesPerBoot(u32) with tag MAX_USES_PER_BOOT and field Integer,
    /// The key is usable by all users
    AllUsers with tag ALL_USERS and field Bool,
    /// ID of the Android user that is permitted to use the key
    UserId(u32) with tag USER_ID and field Integer,
    /// A key may only be used under a particular secure user authentication state
    UserSecureId(u64) with tag USER_SECURE_ID and field LongInteger,
    /// No authentication is required to use this key
    NoAuthRequired with tag NO_AUTH_REQUIRED and field Bool,
    /// The types of user authenticators that may be used to authorize this key
    UserAuthType(HardwareAuthenticatorType) with tag USER_AUTH_TYPE and field Enum,
    /// The time in seconds for which the key is authorized for use, after user authentication
    AuthTimeout(u32) with tag AUTH_TIMEOUT and field Integer,
    /// The key may be used after authentication timeout if device is still on-body
    AllowWhileOnBody with tag ALLOW_WHILE_ON_BODY and field Bool,
    /// The key is usable by all applications
    AllApplications with tag ALL_APPLICATIONS and field Bool,
    /// Application ID bound to the key
    ApplicationId(Vec<u8>) with tag APPLICATION_ID and field Blob,
    /// The key material may be exported
    Exportable with tag EXPORTABLE and field Bool,
    /// Application data bound to the key
    ApplicationData(Vec<u8>) with tag APPLICATION_DATA and field Blob,
    /// Specifies the date and time the key was created
    CreationDateTime(u64) with tag CREATION_DATETIME and field DateTime,
    /// Specifies where the key was created, if known
    KeyOrigin(KeyOrigin) with tag ORIGIN and field Enum,
    /// The key is rollback resistant
    RollbackResistant with tag ROLLBACK_RESISTANT and field Bool,
    /// The key's root of trust
    RootOfTrust(Vec<u8>) with tag ROOT_OF_TRUST and field Blob,
    /// System OS version with which the key may be used
    OsVersion(u32) with tag OS_VERSION and field Integer,
    /// Specifies the system security patch level with which the key may be used
    OsPatchLevel(u32) with tag OS_PATCHLEVEL and field Integer,
    /// Specifies a unique, time-based identifier
    UniqueId(Vec<u8>) with tag UNIQUE_ID and field Blob,
    /// Used to deliver a cryptographic challenge to the attestation procedure
    AttestationChallenge(Vec<u8>) with tag ATTESTATION_CHALLENGE and field Blob,
    /// Identifies the set of applications which may use a key, used only with attestation
    AttestationApplicationId(Vec<u8>) with tag ATTESTATION_APPLICATION_ID and field Blob,
    /// Provides the device's brand name, to attestKey()
    AttestationIdBrand(Vec<u8>) with tag ATTESTATION_ID_BRAND and field Blob,
    /// Provides the device's device name, to attestKey()
    AttestationIdDevice(Vec<u8>) with tag ATTESTATION_ID_DEVICE and field Blob,
    /// Provides the device's product name, to attestKey()
    AttestationIdProduct(Vec<u8>) with tag ATTESTATION_ID_PRODUCT and field Blob,
    /// Provides the device's serial number, to attestKey()
    AttestationIdSerial(Vec<u8>) with tag ATTESTATION_ID_SERIAL and field Blob,
    /// Provides the IMEIs for all radios on the device, to attestKey()
    AttestationIdIMEI(Vec<u8>) with tag ATTESTATION_ID_IMEI and field Blob,
    /// Provides the MEIDs for all radios on the device, to attestKey()
    AttestationIdMEID(Vec<u8>) with tag ATTESTATION_ID_MEID and field Blob,
    /// Provides the device's manufacturer name, to attestKey()
    AttestationIdManufacturer(Vec<u8>) with tag ATTESTATION_ID_MANUFACTURER and field Blob,
    /// Provides the device's model name, to attestKey()
    AttestationIdModel(Vec<u8>) with tag ATTESTATION_ID_MODEL and field Blob,
    /// Provides "associated data" for AES-GCM encryption or decryption
    AssociatedData(Vec<u8>) with tag ASSOCIATED_DATA and field Blob,
    /// Provides or returns a nonce or Initialization Vector (IV) for AES-GCM,
    /// AES-CBC, or AES-CTR encryption or decryption
    Nonce(Vec<u8>) with tag NONCE and field Blob,
    /// A serialized hardware auth token authorizing the operation
    AuthToken(Vec<u8>) with tag AUTH_TOKEN and field Blob,
    /// Provides the requested length of a MAC or GCM authentication tag, in bits
    MacLength(u32) with tag MAC_LENGTH and field Integer,
    /// Specifies whether the device has been factory reset since the
    /// last unique ID rotation. Used for key attestation
    ResetSinceIdRotation with tag RESET_SINCE_ID_ROTATION and field Bool,
}
}

/// Converts a parameter set into the legacy representation.
pub fn to_legacy(params: &[KeyParameter]) -> Vec<KmParam> {
    params.iter().cloned().map(KmParam::from).collect()
}

/// Converts a parameter set received from a legacy device. Parameters that cannot be
/// represented are dropped and logged; they were produced by the device, not the caller.
pub fn from_legacy_lossy(params: Vec<KmParam>) -> Vec<KeyParameter> {
    params
        .into_iter()
        .filter_map(|kp| {
            let raw_tag = kp.tag;
            match KeyParameter::try_from(kp) {
                Ok(p) => Some(p),
                Err(e) => {
                    log::warn!("Dropping legacy parameter with tag {:#x}: {}", raw_tag, e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_for_tag_type(tag_type: TagType) -> &'static str {
        match tag_type {
            TagType::INVALID | TagType::UINT | TagType::UINT_REP => "Integer",
            TagType::ENUM | TagType::ENUM_REP => "Enum",
            TagType::ULONG | TagType::ULONG_REP => "LongInteger",
            TagType::DATE => "DateTime",
            TagType::BOOL => "Bool",
            TagType::BIGNUM | TagType::BYTES => "Blob",
        }
    }

    #[test]
    fn key_parameter_field_matches_tag_type() {
        for (tag, field) in KeyParameter::make_field_matches_tag_type_test_vector() {
            assert_eq!(
                field_for_tag_type(tag.tag_type()),
                field,
                "Tag {:?} is carried in the wrong legacy field.",
                tag
            );
        }
    }

    #[test]
    fn convert_to_legacy_bool() {
        let kp: KmParam = KeyParameter::CallerNonce.into();
        assert_eq!(
            kp,
            KmParam { tag: Tag::CALLER_NONCE as u32, value: KmParamValue::Bool(true) }
        );
    }

    #[test]
    fn convert_to_legacy_enum() {
        let kp: KmParam = KeyParameter::Algorithm(Algorithm::EC).into();
        assert_eq!(kp, KmParam { tag: 0x1000_0002, value: KmParamValue::Enum(3) });
    }

    #[test]
    fn convert_to_legacy_blob() {
        let kp: KmParam = KeyParameter::ApplicationId(b"app".to_vec()).into();
        assert_eq!(
            kp,
            KmParam { tag: Tag::APPLICATION_ID as u32, value: KmParamValue::Blob(b"app".to_vec()) }
        );
    }

    #[test]
    fn convert_from_legacy_long_integer() {
        let kp = KmParam {
            tag: Tag::RSA_PUBLIC_EXPONENT as u32,
            value: KmParamValue::LongInteger(65537),
        };
        assert_eq!(KeyParameter::try_from(kp), Ok(KeyParameter::RsaPublicExponent(65537)));
    }

    #[test]
    fn convert_from_legacy_unknown_tag() {
        let kp = KmParam { tag: 0x1000_0999, value: KmParamValue::Enum(1) };
        assert_eq!(KeyParameter::try_from(kp), Err(ParameterError::UnknownTag(0x1000_0999)));
    }

    #[test]
    fn convert_from_legacy_type_mismatch() {
        let kp = KmParam { tag: Tag::KEY_SIZE as u32, value: KmParamValue::Blob(vec![1]) };
        assert_eq!(KeyParameter::try_from(kp), Err(ParameterError::TypeMismatch(Tag::KEY_SIZE)));
    }

    #[test]
    fn convert_from_legacy_invalid_enum_value() {
        let kp = KmParam { tag: Tag::DIGEST as u32, value: KmParamValue::Enum(77) };
        assert_eq!(KeyParameter::try_from(kp), Err(ParameterError::InvalidValue(Tag::DIGEST)));
    }

    #[test]
    fn lossy_conversion_keeps_valid_parameters() {
        let params = vec![
            KmParam { tag: Tag::KEY_SIZE as u32, value: KmParamValue::Integer(256) },
            KmParam { tag: 0x7000_0fff, value: KmParamValue::Bool(true) },
            KmParam { tag: Tag::NO_AUTH_REQUIRED as u32, value: KmParamValue::Bool(true) },
        ];
        assert_eq!(
            from_legacy_lossy(params),
            vec![KeyParameter::KeySize(256), KeyParameter::NoAuthRequired]
        );
    }

    #[test]
    fn get_tag_of_each_kind() {
        assert_eq!(KeyParameter::Invalid.get_tag(), Tag::INVALID);
        assert_eq!(KeyParameter::KeyPurpose(KeyPurpose::SIGN).get_tag(), Tag::PURPOSE);
        assert_eq!(KeyParameter::Nonce(vec![]).get_tag(), Tag::NONCE);
        assert_eq!(KeyParameter::ResetSinceIdRotation.get_tag(), Tag::RESET_SINCE_ID_ROTATION);
    }
}
