use crate::state::{new_state, Shared};
use std::collections::VecDeque;

pub const RAW_LINE_CAPACITY: usize = 300;

/// Bounded history of the most recent lines, oldest evicted first.
#[derive(Clone)]
pub struct RawLineBuffer {
    lines: Shared<VecDeque<String>>,
    capacity: usize,
}

impl RawLineBuffer {
    pub fn new() -> Self {
        Self::with_capacity(RAW_LINE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: new_state(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Up to `n` most recent lines, oldest first.
    pub fn recent(&self, n: usize) -> Vec<String> {
        let lines = self.lines.lock();
        let skip = lines.len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl Default for RawLineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
