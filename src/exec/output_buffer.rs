// src/exec/output_buffer.rs

//! Size-capped text store for captured process output.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Byte budget of each output buffer unless configured otherwise.
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

/// Bounded ring buffer of text chunks.
///
/// Appends push a chunk at the back; once the total exceeds `capacity`, bytes
/// are evicted from the front (whole chunks first, then a prefix of the
/// oldest remaining chunk). Afterwards the stored text is always the longest
/// suffix of everything appended that fits in `capacity` bytes and starts on
/// a UTF-8 character boundary.
#[derive(Debug)]
pub struct OutputBuffer {
    capacity: usize,
    inner: Mutex<Chunks>,
}

#[derive(Debug, Default)]
struct Chunks {
    chunks: VecDeque<String>,
    total: usize,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Chunks::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn append(&self, text: &str) {
        if text.is_empty() {
            return;
        }

        let mut inner = self.lock();
        inner.chunks.push_back(text.to_string());
        inner.total += text.len();

        while inner.total > self.capacity {
            let excess = inner.total - self.capacity;
            let Some(front) = inner.chunks.front_mut() else {
                break;
            };

            if front.len() <= excess {
                let removed = front.len();
                inner.chunks.pop_front();
                inner.total -= removed;
                continue;
            }

            let mut cut = excess;
            while !front.is_char_boundary(cut) {
                cut += 1;
            }
            front.drain(..cut);
            inner.total -= cut;
        }
    }

    /// Everything currently retained, oldest first.
    pub fn contents(&self) -> String {
        let inner = self.lock();
        let mut out = String::with_capacity(inner.total);
        for chunk in &inner.chunks {
            out.push_str(chunk);
        }
        out
    }

    /// Total bytes currently retained.
    pub fn len(&self) -> usize {
        self.lock().total
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.chunks.clear();
        inner.total = 0;
    }

    fn lock(&self) -> MutexGuard<'_, Chunks> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}
