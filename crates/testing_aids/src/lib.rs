// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! An unpublished crate containing testing utilities for use within this repo.

use std::sync::mpsc;
use std::time::Duration;
use std::{env, thread};

mod log;

pub use log::*;

/// If a test thread has not finished within this time, the test fails.
///
/// This only exists to turn a deadlock into a failure instead of a hang. No test is expected
/// to come anywhere near it.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Returns `true` when running under `cargo mutants`.
#[must_use]
pub fn is_mutation_testing() -> bool {
    env::var("MUTATION_TESTING").as_deref() == Ok("1")
}

/// Runs `f` on a background thread, returning `None` if it panics or does not finish
/// within [`TEST_TIMEOUT`].
///
/// A thread that times out is abandoned, not killed. Under mutation testing `f` runs on the
/// calling thread with no timeout, so that a mutation causing a hang is reported as one.
#[cfg_attr(test, mutants::skip)] // This is test logic - pointless to mutate.
#[must_use]
pub fn execute_or_abandon<F, R>(f: F) -> Option<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if is_mutation_testing() {
        return Some(f());
    }

    let (sender, receiver) = mpsc::channel();

    // A panic drops the sender, which closes the channel just like a timeout does.
    thread::spawn(move || {
        let _ = sender.send(f());
    });

    receiver.recv_timeout(TEST_TIMEOUT).ok()
}
