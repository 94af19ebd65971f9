//! Counters and status lines for a running conversion.

use std::time::{Duration, Instant};

use super::BYTES_PER_MB;

/// Per-database batch counters.
#[derive(Debug)]
pub(crate) struct BatchProgress {
    started: Instant,
    status_period: Duration,
    last_status: Instant,
    batch_index: u64,
    batch_entries: u64,
    batch_bytes: u64,
    written_entries: u64,
    written_bytes: u64,
    batches_written: u64,
}

impl BatchProgress {
    pub(crate) fn new(started: Instant, status_period: Duration) -> Self {
        Self {
            started,
            status_period,
            last_status: Instant::now(),
            batch_index: 1,
            batch_entries: 0,
            batch_bytes: 0,
            written_entries: 0,
            written_bytes: 0,
            batches_written: 0,
        }
    }

    /// Account for one queued pair of `bytes` key + value bytes.
    pub(crate) fn record(&mut self, bytes: usize) {
        self.batch_entries += 1;
        self.batch_bytes += bytes as u64;
    }

    /// Move the current batch into the written totals and start the next one.
    pub(crate) fn batch_written(&mut self) {
        self.written_entries += self.batch_entries;
        self.written_bytes += self.batch_bytes;
        self.batches_written += 1;
        self.batch_index += 1;
        self.batch_entries = 0;
        self.batch_bytes = 0;
        self.last_status = Instant::now();
    }

    /// True at most once per status period.
    pub(crate) fn status_due(&mut self) -> bool {
        if self.last_status.elapsed() >= self.status_period {
            self.last_status = Instant::now();
            true
        } else {
            false
        }
    }

    pub(crate) fn line(&self, what: &str) -> String {
        format!(
            "{}: batch index {}, batch size {} MB, batch entries {}, total entries {}, run time {:.1}s",
            what,
            comma_string(self.batch_index),
            comma_string(self.batch_bytes / BYTES_PER_MB),
            comma_string(self.batch_entries),
            comma_string(self.written_entries + self.batch_entries),
            self.started.elapsed().as_secs_f64()
        )
    }

    pub(crate) fn written_entries(&self) -> u64 {
        self.written_entries
    }

    pub(crate) fn written_bytes(&self) -> u64 {
        self.written_bytes
    }

    pub(crate) fn batches_written(&self) -> u64 {
        self.batches_written
    }
}

/// Format an integer with thousands separators: `1234567` becomes `"1,234,567"`.
pub fn comma_string(v: u64) -> String {
    let digits = v.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i != 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
