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

use std::fs::{create_dir, remove_dir_all};
use std::io::ErrorKind;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// A scratch directory for configuration files, removed on drop.
#[derive(Debug)]
pub struct TempDir {
    path: PathBuf,
    do_drop: bool,
}

impl TempDir {
    pub fn new(prefix: &str) -> std::io::Result<Self> {
        let path = loop {
            let mut candidate = std::env::temp_dir();
            let number: u16 = rand::random();
            candidate.push(format!("skeymaster_{}_{:05}", prefix, number));
            match create_dir(&candidate) {
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
                Ok(()) => break candidate,
            }
        };
        Ok(Self { path, do_drop: true })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn build(&self) -> PathBuilder {
        PathBuilder(self.path.clone())
    }

    /// Writes `contents` to the file `name` inside the directory and returns its path.
    pub fn write(&self, name: &str, contents: &str) -> std::io::Result<PathBuilder> {
        let file = self.build().push(name);
        std::fs::write(&*file, contents)?;
        Ok(file)
    }

    /// When a test is failing you can call this in order to inspect the files
    /// after the test failed.
    #[allow(dead_code)]
    pub fn do_not_drop(&mut self) {
        log::info!("Disabled automatic cleanup for: {:?}", self.path);
        self.do_drop = false;
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        if self.do_drop {
            if let Err(e) = remove_dir_all(&self.path) {
                log::error!("Cannot delete temporary dir {:?}: {:?}", self.path, e);
            }
        }
    }
}

pub struct PathBuilder(PathBuf);

impl PathBuilder {
    pub fn push(mut self, segment: &str) -> Self {
        self.0.push(segment);
        self
    }
}

impl Deref for PathBuilder {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
