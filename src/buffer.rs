// AngleControlPanel
// Author: J Taylor
// Supplied without warranty.
// Use at your own risk.


// src/buffer.rs
//
// Bounded (timestamp, angle) series. Oldest samples fall off the front.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// One telemetry reading: seconds since session start and angle in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl SampleBuffer {
    /// A zero capacity is raised to one so `append` always keeps the newest sample.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, sample: Sample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<Sample> {
        self.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

// ---------------- Shared handle ----------------

/// Handle shared between the ingestion side (writer) and the UI (reader).
#[derive(Debug, Clone)]
pub struct SharedBuffer {
    inner: Arc<Mutex<SampleBuffer>>,
}

impl SharedBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SampleBuffer::new(capacity))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SampleBuffer> {
        // A panicking writer cannot leave the deque half-updated, so keep going.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn append(&self, sample: Sample) {
        self.lock().append(sample);
    }

    pub fn snapshot(&self) -> Vec<Sample> {
        self.lock().snapshot()
    }

    pub fn latest(&self) -> Option<Sample> {
        self.lock().latest()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
