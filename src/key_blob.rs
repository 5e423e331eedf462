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

//! This module implements the envelope that the shim puts around every key blob it
//! hands out. The envelope records which legacy device generation produced the blob and
//! the OS version and patch level in force at the time, so that later calls can be
//! routed to the right legacy entry points and stale blobs can be detected.
//!
//! Layout, all integers little endian:
//!
//! ```text
//! magic "SKMB" (4) | format version u8 | generation u8 | os_version u32 |
//! os_patchlevel u32 | legacy blob length u32 | legacy blob
//! ```

use crate::capability::LegacyVersion;
use crate::config::SystemVersion;
use crate::error::{Ec, Error};
use anyhow::{Context, Result};
use std::convert::TryInto;
use std::io::Read;

const MAGIC: &[u8; 4] = b"SKMB";
const SUPPORTED_ENVELOPE_VERSION: u8 = 1;

/// A legacy key blob together with the context it was created in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBlob {
    generation: LegacyVersion,
    os_version: u32,
    os_patchlevel: u32,
    legacy_blob: Vec<u8>,
}

fn read_u8(stream: &mut &[u8]) -> Result<u8> {
    let mut buffer = [0u8; 1];
    stream
        .read_exact(&mut buffer)
        .map(|_| buffer[0])
        .map_err(|_| Error::Km(Ec::INVALID_KEY_BLOB))
        .context("In read_u8.")
}

fn read_le_u32(stream: &mut &[u8]) -> Result<u32> {
    const SIZE: usize = std::mem::size_of::<u32>();
    let mut buffer: [u8; SIZE] = [0; SIZE];
    stream
        .read_exact(&mut buffer)
        .map(|_| u32::from_le_bytes(buffer))
        .map_err(|_| Error::Km(Ec::INVALID_KEY_BLOB))
        .context("In read_le_u32.")
}

impl KeyBlob {
    const HEADER_SIZE: usize = 4 + 1 + 1 + 4 + 4 + 4;

    /// Wraps a blob freshly returned by a legacy device.
    pub fn new(generation: LegacyVersion, created: SystemVersion, legacy_blob: Vec<u8>) -> Self {
        Self {
            generation,
            os_version: created.os_version,
            os_patchlevel: created.os_patchlevel,
            legacy_blob,
        }
    }

    /// Parses an enveloped key blob. Every malformation is reported as
    /// `Error::Km(ErrorCode::INVALID_KEY_BLOB)`.
    pub fn parse(blob: &[u8]) -> Result<Self> {
        if blob.len() < Self::HEADER_SIZE {
            return Err(Error::Km(Ec::INVALID_KEY_BLOB)).context(format!(
                "In KeyBlob::parse: Blob too short. Expected at least {} got: {}.",
                Self::HEADER_SIZE,
                blob.len()
            ));
        }
        if &blob[0..4] != MAGIC {
            return Err(Error::Km(Ec::INVALID_KEY_BLOB))
                .context("In KeyBlob::parse: Blob has no envelope.");
        }

        let mut stream = &blob[4..];
        let version = read_u8(&mut stream).context("In KeyBlob::parse.")?;
        if version != SUPPORTED_ENVELOPE_VERSION {
            return Err(Error::Km(Ec::INVALID_KEY_BLOB))
                .context(format!("In KeyBlob::parse: Unknown envelope version: {}.", version));
        }
        let raw_generation = read_u8(&mut stream).context("In KeyBlob::parse.")?;
        let generation = LegacyVersion::from_raw(raw_generation)
            .ok_or(Error::Km(Ec::INVALID_KEY_BLOB))
            .context(format!("In KeyBlob::parse: Unknown generation: {}.", raw_generation))?;
        let os_version = read_le_u32(&mut stream).context("In KeyBlob::parse.")?;
        let os_patchlevel = read_le_u32(&mut stream).context("In KeyBlob::parse.")?;
        let length = read_le_u32(&mut stream).context("In KeyBlob::parse.")? as usize;

        if stream.len() != length {
            return Err(Error::Km(Ec::INVALID_KEY_BLOB)).context(format!(
                "In KeyBlob::parse: Legacy blob length mismatch. Expected: {} got: {}.",
                length,
                stream.len()
            ));
        }

        Ok(Self { generation, os_version, os_patchlevel, legacy_blob: stream.to_vec() })
    }

    /// Like `parse`, but additionally rejects blobs produced by another legacy
    /// generation than `expected`.
    pub fn parse_for(blob: &[u8], expected: LegacyVersion) -> Result<Self> {
        let key_blob = Self::parse(blob).context("In KeyBlob::parse_for.")?;
        if key_blob.generation != expected {
            return Err(Error::Km(Ec::INVALID_KEY_BLOB)).context(format!(
                "In KeyBlob::parse_for: Blob belongs to {:?}, this device is {:?}.",
                key_blob.generation, expected
            ));
        }
        Ok(key_blob)
    }

    /// Serializes the envelope.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let length: u32 = self
            .legacy_blob
            .len()
            .try_into()
            .map_err(|_| Error::Km(Ec::INVALID_KEY_BLOB))
            .context("In KeyBlob::encode: Legacy blob too large.")?;
        let mut result = Vec::with_capacity(Self::HEADER_SIZE + self.legacy_blob.len());
        result.extend_from_slice(MAGIC);
        result.push(SUPPORTED_ENVELOPE_VERSION);
        result.push(self.generation.to_raw());
        result.extend_from_slice(&self.os_version.to_le_bytes());
        result.extend_from_slice(&self.os_patchlevel.to_le_bytes());
        result.extend_from_slice(&length.to_le_bytes());
        result.extend_from_slice(&self.legacy_blob);
        Ok(result)
    }

    /// The legacy device generation that produced the blob.
    pub fn generation(&self) -> LegacyVersion {
        self.generation
    }

    /// The system version in force when the blob was created or last upgraded.
    pub fn created(&self) -> SystemVersion {
        SystemVersion { os_version: self.os_version, os_patchlevel: self.os_patchlevel }
    }

    /// The blob as understood by the legacy device.
    pub fn legacy_blob(&self) -> &[u8] {
        &self.legacy_blob
    }

    /// True if the blob was created under an older OS version or patch level than
    /// `current`.
    pub fn is_older_than(&self, current: &SystemVersion) -> bool {
        self.os_version < current.os_version || self.os_patchlevel < current.os_patchlevel
    }

    /// True if the blob was created under a newer OS version or patch level than
    /// `current`.
    pub fn is_newer_than(&self, current: &SystemVersion) -> bool {
        self.os_version > current.os_version || self.os_patchlevel > current.os_patchlevel
    }
}
