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

//! Logging setup for processes hosting the adapter.

/// Installs the Android logger for the adapter. The log level is `Debug` so the
/// watchdog and the translators' diagnostics reach logcat. Calling this more than
/// once is harmless.
pub fn init() {
    android_logger::init_once(
        android_logger::Config::default()
            .with_tag("skeymaster")
            .with_max_level(log::LevelFilter::Debug),
    );
}
