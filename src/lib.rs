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

//! This crate implements the keymaster@3.0 `IKeymasterDevice` interface on top of
//! legacy keymaster 1 and keymaster 2 devices.

pub mod capability;
pub mod config;
pub mod device;
pub mod error;
pub mod key_blob;
/// Internal Representation of Key Parameter and convenience functions.
pub mod key_parameter;
pub mod keymaster_definitions;
pub mod legacy;
pub mod logging;
pub mod operation;
pub mod translator;
pub mod watchdog;

pub use config::Config;
pub use device::{
    create_skeymaster_device_km1, create_skeymaster_device_km1_with_config,
    create_skeymaster_device_km2, create_skeymaster_device_km2_with_config, SKeymasterDevice,
};
pub use keymaster_definitions::IKeymasterDevice;

#[cfg(test)]
mod test {
    pub mod fake_keymaster;
    pub mod utils;
}
