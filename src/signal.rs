// Copyright (c) 2019 Chaintope Inc.
// Distributed under the MIT software license, see the accompanying
// file COPYING or http://www.opensource.org/licenses/mit-license.php.

use crate::errors::Error;
use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Value stored by `StopSignal::stop`, outside the range of signal numbers.
const STOP_REQUESTED: usize = usize::MAX;
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Shared stop flag. Zero while running, otherwise the number of the signal
/// that stopped us (or `STOP_REQUESTED`).
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicUsize>);

impl StopSignal {
    pub fn new() -> Self {
        StopSignal(Arc::new(AtomicUsize::new(0)))
    }

    /// Makes delivery of `signal` raise this flag.
    pub fn register(&self, signal: i32) -> Result<(), Error> {
        signal_hook::flag::register_usize(signal, Arc::clone(&self.0), signal as usize)
            .map_err(Error::SignalHandler)?;
        Ok(())
    }

    pub fn stop(&self) {
        self.0.store(STOP_REQUESTED, Ordering::Relaxed);
    }

    /// Returns what raised the flag, if anything did.
    pub fn raised(&self) -> Option<&'static str> {
        match self.0.load(Ordering::Relaxed) {
            0 => None,
            signal => Some(signal_to_string(signal)),
        }
    }

    /// Sleeps for `duration`, returning early with `Cancelled` once the flag is raised.
    pub fn sleep(&self, duration: Duration) -> Result<(), Error> {
        let deadline = Instant::now() + duration;
        loop {
            if let Some(by) = self.raised() {
                return Err(Error::Cancelled(by));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(std::cmp::min(SLEEP_SLICE, deadline - now));
        }
    }
}

/// Registers SIGINT and SIGTERM on a fresh stop signal.
pub fn set_stop_signal_handler() -> Result<StopSignal, Error> {
    let stop_signal = StopSignal::new();
    for signal in &[SIGINT, SIGTERM] {
        stop_signal.register(*signal)?;
    }
    Ok(stop_signal)
}

pub fn signal_to_string(signal: usize) -> &'static str {
    if signal == STOP_REQUESTED {
        return "stop request";
    }
    match signal as i32 {
        SIGHUP => "SIGHUP",
        SIGINT => "SIGINT",
        SIGQUIT => "SIGQUIT",
        SIGTERM => "SIGTERM",
        _ => "unknown signal",
    }
}
