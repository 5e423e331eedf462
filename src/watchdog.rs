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

//! This module implements the watchdog that reports legacy device calls which block
//! for longer than expected. Legacy HALs run in the TEE and a stuck call cannot be
//! cancelled from here, so the watchdog only logs.
//!
//! Every call into a legacy device is wrapped in a `WatchPoint`. A reporter thread
//! wakes up at the earliest pending deadline and, while overdue calls exist, logs them
//! at least once per `REPORT_INTERVAL`. The thread exits when it has been idle for a
//! while and is restarted by the next watch point.

use std::{
    collections::BTreeMap,
    sync::{Arc, Condvar, Mutex, MutexGuard},
    thread,
    time::{Duration, Instant},
};

lazy_static::lazy_static! {
    /// The watchdog shared by all adapters in the process.
    static ref WD: Arc<Watchdog> = Watchdog::new(Duration::from_secs(10));
}

/// Watches the legacy entry point `id` on the process wide watchdog. The call is
/// reported if the returned watch point is still alive after `millis`.
pub fn watch_millis(id: &'static str, millis: u64) -> Option<WatchPoint> {
    WD.watch(id, Duration::from_millis(millis))
}

/// Disarms its record when dropped. Calls that were reported as overdue are logged
/// once more when they finally return.
pub struct WatchPoint {
    seq: u64,
    wd: Arc<Watchdog>,
}

impl Drop for WatchPoint {
    fn drop(&mut self) {
        self.wd.disarm(self.seq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReporterState {
    NotRunning,
    Running,
}

/// One pending legacy call.
struct PendingCall {
    id: &'static str,
    thread: String,
    started: Instant,
    deadline: Instant,
    reported: bool,
}

impl PendingCall {
    fn is_overdue(&self, now: Instant) -> bool {
        self.deadline <= now
    }
}

struct WatchdogState {
    reporter: ReporterState,
    thread: Option<thread::JoinHandle<()>>,
    idle_timeout: Duration,
    next_seq: u64,
    pending: BTreeMap<u64, PendingCall>,
    // Number of reports logged so far.
    reports: usize,
}

impl WatchdogState {
    /// Time until the earliest deadline that has not passed yet.
    fn next_deadline(&self, now: Instant) -> Option<Duration> {
        self.pending
            .values()
            .filter(|c| !c.is_overdue(now))
            .map(|c| c.deadline.saturating_duration_since(now))
            .min()
    }

    /// Logs all overdue calls. Returns false if there were none.
    fn report(&mut self, now: Instant) -> bool {
        let overdue: Vec<&mut PendingCall> =
            self.pending.values_mut().filter(|c| c.is_overdue(now)).collect();
        if overdue.is_empty() {
            return false;
        }
        log::warn!("{} legacy keymaster call(s) overdue:", overdue.len());
        for call in overdue {
            log::warn!(
                "  {} on thread {}: pending for {:?}, {:?} past its deadline{}",
                call.id,
                call.thread,
                now.saturating_duration_since(call.started),
                now.saturating_duration_since(call.deadline),
                if call.reported { "" } else { " (new)" }
            );
            call.reported = true;
        }
        self.reports += 1;
        true
    }
}

/// Watchdog spawns a thread that logs all overdue legacy calls when a deadline is
/// missed and at least every `REPORT_INTERVAL` as long as overdue calls exist.
/// The thread terminates when idle for a given period of time.
pub struct Watchdog {
    state: Arc<(Condvar, Mutex<WatchdogState>)>,
}

impl Watchdog {
    /// While there are overdue calls a report is logged at least this often.
    const REPORT_INTERVAL: Duration = Duration::from_secs(1);

    /// Constructs a [`Watchdog`]. The reporter thread terminates when `idle_timeout` has
    /// elapsed without pending calls.
    pub fn new(idle_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new((
                Condvar::new(),
                Mutex::new(WatchdogState {
                    reporter: ReporterState::NotRunning,
                    thread: None,
                    idle_timeout,
                    next_seq: 0,
                    pending: BTreeMap::new(),
                    reports: 0,
                }),
            )),
        })
    }

    /// Registers a pending call to the legacy entry point `id` with the given timeout.
    pub fn watch(self: &Arc<Self>, id: &'static str, timeout: Duration) -> Option<WatchPoint> {
        let started = Instant::now();
        let deadline = match started.checked_add(timeout) {
            Some(d) => d,
            None => {
                log::warn!("Deadline computation failed for {}. Not watched.", id);
                return None;
            }
        };
        let thread = thread::current().name().unwrap_or("<unnamed>").to_string();

        let (ref condvar, ref state) = *self.state;
        let mut state = state.lock().unwrap();
        state.next_seq += 1;
        let seq = state.next_seq;
        state.pending.insert(seq, PendingCall { id, thread, started, deadline, reported: false });
        if state.reporter != ReporterState::Running {
            self.spawn_reporter(&mut state);
        }
        drop(state);
        condvar.notify_all();
        Some(WatchPoint { seq, wd: self.clone() })
    }

    fn disarm(&self, seq: u64) {
        let (_, ref state) = *self.state;
        // The reporter needs no wakeup, nothing changes before the next deadline.
        let call = state.lock().unwrap().pending.remove(&seq);
        if let Some(call) = call.filter(|c| c.reported) {
            log::warn!(
                "Overdue legacy call {} returned after {:?}.",
                call.id,
                call.started.elapsed()
            );
        }
    }

    fn spawn_reporter(&self, state: &mut MutexGuard<WatchdogState>) {
        if let Some(t) = state.thread.take() {
            if t.join().is_err() {
                log::error!("Watchdog reporter thread panicked.");
            }
        }

        let shared = self.state.clone();
        state.thread = Some(thread::spawn(move || {
            let (ref condvar, ref state) = *shared;
            let mut state = state.lock().unwrap();
            loop {
                let now = Instant::now();
                let overdue = state.report(now);
                let (wait, idle) = match (overdue, state.next_deadline(now)) {
                    (true, Some(next)) => (next.min(Self::REPORT_INTERVAL), false),
                    (true, None) => (Self::REPORT_INTERVAL, false),
                    (false, Some(next)) => (next, false),
                    (false, None) => (state.idle_timeout, true),
                };

                let (s, timeout) = condvar.wait_timeout(state, wait).unwrap();
                state = s;

                if idle && timeout.timed_out() && state.pending.is_empty() {
                    state.reporter = ReporterState::NotRunning;
                    break;
                }
            }
        }));
        state.reporter = ReporterState::Running;
    }
}
