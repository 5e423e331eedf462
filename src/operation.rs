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

//! This module implements the operation table of the adapter. It maps the operation
//! handles handed out by `IKeymasterDevice::begin` onto the operations of the legacy
//! device.
//!
//! ## Operation Lifecycle
//! An operation gets created by `begin`. It may receive zero or more update
//! requests. The lifecycle ends when:
//!  * `update` or `finish` yields an error.
//!  * `finish` is called.
//!  * `abort` is called.
//!  * The adapter is destroyed.
//!
//! `Operation` has an `Outcome` member. While the outcome is `Outcome::Unknown`,
//! the operation is active. Any of the above conditions changes the outcome to
//! Success, Abort, Dropped, or ErrorCode exactly once. An operation that is still
//! active when its last reference goes away is aborted on the legacy device and
//! transitions to `Outcome::Dropped`.
//!
//! ## Locking
//! The table is guarded by one mutex which is held only to insert, look up, or
//! remove entries. Requests on an operation hold the operation's outcome lock for
//! their whole duration, so `update`, `finish`, and `abort` on one handle are
//! serialized. The loser of a race with a terminal request finds the outcome
//! finalized and gets `INVALID_OPERATION_HANDLE`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};

use crate::error::{Ec, Error};
use crate::key_parameter::KeyParameter;
use crate::keymaster_definitions::{ErrorCode, FinishResult, UpdateResult};
use crate::translator::{LegacyOperation, OperationContext, RequestTranslator};

/// Operations have `Outcome::Unknown` as long as they are active. They transition
/// to one of the other variants exactly once.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Outcome {
    Unknown,
    Success,
    Abort,
    Dropped,
    ErrorCode(ErrorCode),
}

// We don't accept more than 32KiB of data in `update` and `finish`.
const MAX_RECEIVE_DATA: usize = 0x8000;

/// Operation bundles the legacy operation with the translation state needed to
/// drive it and tracks the operation's outcome.
pub struct Operation {
    handle: u64,
    legacy_handle: u64,
    context: OperationContext,
    translator: Arc<dyn RequestTranslator>,
    outcome: Mutex<Outcome>,
}

impl Operation {
    pub fn new(handle: u64, op: LegacyOperation, translator: Arc<dyn RequestTranslator>) -> Self {
        Self {
            handle,
            legacy_handle: op.legacy_handle,
            context: op.context,
            translator,
            outcome: Mutex::new(Outcome::Unknown),
        }
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn outcome(&self) -> Outcome {
        *self.outcome.lock().unwrap()
    }

    // This function takes a Result from a translator call and inspects it for errors.
    // If an error was found it updates the given `locked_outcome` accordingly.
    // It forwards the Result unmodified.
    // The precondition to this call must be *locked_outcome == Outcome::Unknown.
    fn update_outcome<T>(&self, locked_outcome: &mut Outcome, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            *locked_outcome = match e.root_cause().downcast_ref::<Error>() {
                Some(e) => Outcome::ErrorCode(e.error_code()),
                None => Outcome::ErrorCode(Ec::UNKNOWN_ERROR),
            };
        }
        result
    }

    // This function grabs the outcome lock and checks the current outcome state.
    // If the outcome is still `Outcome::Unknown`, this function returns
    // the locked outcome for further updates. In any other case it returns
    // ErrorCode::INVALID_OPERATION_HANDLE indicating that this operation has
    // been finalized and is no longer active.
    fn check_active(&self) -> Result<MutexGuard<Outcome>> {
        let guard = self.outcome.lock().unwrap();
        match *guard {
            Outcome::Unknown => Ok(guard),
            _ => Err(Error::Km(Ec::INVALID_OPERATION_HANDLE)).context(format!(
                "In check_active: Call on finalized operation with outcome: {:?}.",
                *guard
            )),
        }
    }

    fn check_input_length(data: &[u8]) -> Result<()> {
        if data.len() > MAX_RECEIVE_DATA {
            return Err(Error::Km(Ec::INVALID_INPUT_LENGTH)).context(format!(
                "In check_input_length: {} bytes exceed the limit of {}.",
                data.len(),
                MAX_RECEIVE_DATA
            ));
        }
        Ok(())
    }

    /// Implementation of `IKeymasterDevice::update` for this operation.
    pub fn update(&self, params: &[KeyParameter], input: &[u8]) -> Result<UpdateResult> {
        let mut outcome = self.check_active().context("In update")?;
        Self::check_input_length(input).context("In update")?;

        self.update_outcome(
            &mut *outcome,
            self.translator.update(&self.context, self.legacy_handle, params, input),
        )
        .context("In update: Legacy update failed.")
    }

    /// Implementation of `IKeymasterDevice::finish` for this operation.
    pub fn finish(
        &self,
        params: &[KeyParameter],
        input: &[u8],
        signature: &[u8],
    ) -> Result<FinishResult> {
        let mut outcome = self.check_active().context("In finish")?;
        Self::check_input_length(input).context("In finish")?;

        let result = self
            .update_outcome(
                &mut *outcome,
                self.translator.finish(&self.context, self.legacy_handle, params, input, signature),
            )
            .context("In finish: Legacy finish failed.")?;

        // At this point the operation concluded successfully.
        *outcome = Outcome::Success;
        Ok(result)
    }

    /// Aborts the operation if it is active. IFF the operation is aborted the outcome is
    /// set to `outcome`. `outcome` must reflect the reason for the abort. Since the operation
    /// gets aborted `outcome` must not be `Operation::Success` or `Operation::Unknown`.
    pub fn abort(&self, outcome: Outcome) -> Result<()> {
        let mut locked_outcome = self.check_active().context("In abort")?;
        *locked_outcome = outcome;
        self.translator.abort(self.legacy_handle).context("In abort: Legacy abort failed.")
    }
}

impl Drop for Operation {
    fn drop(&mut self) {
        if let Ok(Outcome::Unknown) = self.outcome.get_mut() {
            // If the operation was still active we call abort, setting
            // the outcome to `Outcome::Dropped`
            if let Err(e) = self.abort(Outcome::Dropped) {
                log::error!("While dropping Operation: abort failed:\n    {:?}", e);
            }
        }
    }
}

#[derive(Default)]
struct OperationTable {
    operations: HashMap<u64, Arc<Operation>>,
    // Slots claimed by `begin` calls that have not reached the legacy device yet.
    reserved: usize,
}

/// The OperationDb holds all ongoing operations of one adapter.
pub struct OperationDb {
    table: Mutex<OperationTable>,
    max_operations: usize,
}

/// An operation slot claimed by `OperationDb::reserve`. The slot is released when the
/// reservation is dropped without being committed.
pub struct Reservation<'a> {
    db: &'a OperationDb,
    armed: bool,
}

impl Reservation<'_> {
    /// Inserts the operation built by `make` under a fresh handle and returns the
    /// handle. `make` is called with the table lock held.
    pub fn commit<F>(mut self, make: F) -> u64
    where
        F: FnOnce(u64) -> Operation,
    {
        let mut table = self.db.table.lock().unwrap();
        let handle = loop {
            let candidate: u64 = rand::random();
            if candidate != 0 && !table.operations.contains_key(&candidate) {
                break candidate;
            }
        };
        table.operations.insert(handle, Arc::new(make(handle)));
        table.reserved -= 1;
        self.armed = false;
        handle
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.db.table.lock().unwrap().reserved -= 1;
        }
    }
}

impl OperationDb {
    /// Creates a new OperationDb admitting at most `max_operations` concurrent
    /// operations.
    pub fn new(max_operations: usize) -> Self {
        Self { table: Mutex::new(Default::default()), max_operations }
    }

    /// Claims a slot for a new operation. Fails with `TOO_MANY_OPERATIONS` if all
    /// slots are taken.
    pub fn reserve(&self) -> Result<Reservation<'_>> {
        let mut table = self.table.lock().unwrap();
        if table.operations.len() + table.reserved >= self.max_operations {
            return Err(Error::Km(Ec::TOO_MANY_OPERATIONS)).context(format!(
                "In OperationDb::reserve: All {} operation slots are in use.",
                self.max_operations
            ));
        }
        table.reserved += 1;
        Ok(Reservation { db: self, armed: true })
    }

    /// Looks up an active operation.
    pub fn get(&self, handle: u64) -> Result<Arc<Operation>> {
        self.table
            .lock()
            .unwrap()
            .operations
            .get(&handle)
            .cloned()
            .ok_or(Error::Km(Ec::INVALID_OPERATION_HANDLE))
            .context(format!("In OperationDb::get: Unknown operation handle {:#x}.", handle))
    }

    /// Removes an operation from the table. The operation object may linger until
    /// the last request on it returns.
    pub fn remove(&self, handle: u64) -> Option<Arc<Operation>> {
        self.table.lock().unwrap().operations.remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap().operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all operations and returns how many there were. Operations that are
    /// still active get aborted as they are dropped.
    pub fn clear(&self) -> usize {
        let drained: Vec<Arc<Operation>> =
            self.table.lock().unwrap().operations.drain().map(|(_, op)| op).collect();
        let count = drained.len();
        // Dropping outside the table lock, aborts may block on the legacy device.
        drop(drained);
        count
    }
}
