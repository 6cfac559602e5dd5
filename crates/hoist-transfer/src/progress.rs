//! Progress reporting capability for the transfer and polling engines.
//!
//! Engines talk to a narrow [`ProgressSink`] rather than any specific
//! terminal library. Progress is purely cosmetic: a [`NullProgress`] sink
//! must not change retry counts, chunk sizes, or the errors raised.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Opaque handle for one progress line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

impl TaskHandle {
    /// Mint a handle. Sink implementations own the id space; engines only
    /// ever hand handles back to the sink that produced them.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

pub trait ProgressSink: Send + Sync {
    /// Start a new progress line. `total` of `None` renders indeterminate.
    fn add_task(&self, name: &str, total: Option<u64>) -> TaskHandle;

    /// Re-seed the expected total for a line.
    fn set_total(&self, task: TaskHandle, total: Option<u64>);

    fn advance(&self, task: TaskHandle, amount: u64);

    fn complete(&self, task: TaskHandle);
}

/// Quiet mode: accepts everything, renders nothing.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn add_task(&self, _name: &str, _total: Option<u64>) -> TaskHandle {
        TaskHandle::new(0)
    }

    fn set_total(&self, _task: TaskHandle, _total: Option<u64>) {}

    fn advance(&self, _task: TaskHandle, _amount: u64) {}

    fn complete(&self, _task: TaskHandle) {}
}

const BAR_STYLE: &str =
    "{spinner:.blue} {prefix:>12.cyan.bold} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

const SPINNER_STYLE: &str =
    "{spinner:.blue} {prefix:>12.cyan.bold} [{elapsed_precise}] {bytes} {wide_msg}";

/// Terminal progress rendering backed by `indicatif`.
pub struct BarProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<TaskHandle, ProgressBar>>,
    next_id: AtomicU64,
}

impl BarProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn style_for(total: Option<u64>) -> Option<ProgressStyle> {
        let template = if total.is_some() {
            BAR_STYLE
        } else {
            SPINNER_STYLE
        };
        ProgressStyle::with_template(template).ok()
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn add_task(&self, name: &str, total: Option<u64>) -> TaskHandle {
        let bar = match total {
            Some(len) => ProgressBar::new(len),
            None => ProgressBar::new_spinner(),
        };
        if let Some(style) = Self::style_for(total) {
            bar.set_style(style);
        }
        bar.set_prefix(name.to_string());
        let bar = self.multi.add(bar);
        let handle = TaskHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(handle, bar);
        }
        handle
    }

    fn set_total(&self, task: TaskHandle, total: Option<u64>) {
        if let Ok(bars) = self.bars.lock()
            && let Some(bar) = bars.get(&task)
        {
            match total {
                Some(len) => bar.set_length(len),
                None => bar.unset_length(),
            }
        }
    }

    fn advance(&self, task: TaskHandle, amount: u64) {
        if let Ok(bars) = self.bars.lock()
            && let Some(bar) = bars.get(&task)
        {
            bar.inc(amount);
        }
    }

    fn complete(&self, task: TaskHandle) {
        if let Ok(mut bars) = self.bars.lock()
            && let Some(bar) = bars.remove(&task)
        {
            bar.finish();
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Records every sink call so tests can assert on progress behavior.
    pub struct RecordingProgress {
        pub totals: Mutex<Vec<(TaskHandle, Option<u64>)>>,
        pub advanced: AtomicU64,
        pub completed: Mutex<Vec<TaskHandle>>,
        next_id: AtomicU64,
    }

    impl RecordingProgress {
        pub fn new() -> Self {
            Self {
                totals: Mutex::new(Vec::new()),
                advanced: AtomicU64::new(0),
                completed: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }
        }
    }

    impl ProgressSink for RecordingProgress {
        fn add_task(&self, _name: &str, total: Option<u64>) -> TaskHandle {
            let handle = TaskHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
            self.totals.lock().unwrap().push((handle, total));
            handle
        }

        fn set_total(&self, task: TaskHandle, total: Option<u64>) {
            self.totals.lock().unwrap().push((task, total));
        }

        fn advance(&self, _task: TaskHandle, amount: u64) {
            self.advanced.fetch_add(amount, Ordering::SeqCst);
        }

        fn complete(&self, task: TaskHandle) {
            self.completed.lock().unwrap().push(task);
        }
    }
}
