// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

/// Captures formatted log output into a shared buffer so tests can assert on it.
///
/// Install the capture with `tracing::subscriber::set_default(capture.subscriber())`. The
/// default is thread-local, so only events emitted on the installing thread are captured.
///
/// # Examples
///
/// ```
/// use testing_aids::LogCapture;
///
/// let capture = LogCapture::new();
/// let _guard = tracing::subscriber::set_default(capture.subscriber());
///
/// tracing::warn!(cache.id = "users", "slow populate");
/// capture.assert_contains("cache.id=\"users\"");
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Creates an empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything captured so far.
    #[must_use]
    pub fn output(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Asserts that the captured output contains `expected`.
    ///
    /// # Panics
    ///
    /// Panics with the full captured output if `expected` is missing.
    pub fn assert_contains(&self, expected: &str) {
        let output = self.output();
        assert!(
            output.contains(expected),
            "log output does not contain '{expected}', got:\n{output}"
        );
    }

    /// Creates a subscriber that formats every event, at every level, into this capture.
    #[must_use]
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::registry().with(tracing_subscriber::fmt::layer().with_writer(self.clone()).with_ansi(false))
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

/// Appends to the buffer of a [`LogCapture`].
#[derive(Debug)]
pub struct LogCaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for LogCaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_events_on_installing_thread() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        tracing::debug!(cache.hit_ratio = 0.5, "cache.read");

        capture.assert_contains("DEBUG");
        capture.assert_contains("cache.hit_ratio=0.5");
    }

    #[test]
    fn other_threads_are_not_captured() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        std::thread::spawn(|| tracing::info!("elsewhere")).join().unwrap();

        assert!(!capture.output().contains("elsewhere"));
    }
}
