// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Thread-safe accumulator of serialized events.
//!
//! Append, threshold check and drain all happen through one [`BufferGuard`],
//! so counters always match the buffered bytes and a drain never splits an
//! append.

use crate::config::BatchLimits;
use crate::serializer::{EventSerializer, PreparedRecord};
use bytes::Bytes;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// A drained, immutable group of serialized events.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Position in drain order, starting at 1.
    pub sequence: u64,
    pub drained_at: Instant,
    pub events: usize,
    pub payload: Bytes,
}

#[derive(Debug, Default)]
struct BufferState {
    bytes: Vec<u8>,
    count: usize,
    drained: u64,
}

#[derive(Debug)]
pub struct BatchBuffer {
    limits: BatchLimits,
    state: Mutex<BufferState>,
}

impl BatchBuffer {
    #[must_use]
    pub fn new(limits: BatchLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(BufferState::default()),
        }
    }

    /// Takes the buffer lock. Hold the guard across append, check and drain.
    pub fn lock(&self) -> BufferGuard<'_> {
        BufferGuard {
            limits: self.limits,
            state: self.state.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

pub struct BufferGuard<'a> {
    limits: BatchLimits,
    state: MutexGuard<'a, BufferState>,
}

impl BufferGuard<'_> {
    /// Serializes `prepared` onto the end of the buffer.
    ///
    /// On failure the buffer is truncated back to its previous length and the
    /// event counter is left untouched.
    pub fn append(
        &mut self,
        serializer: &EventSerializer,
        prepared: &PreparedRecord,
    ) -> serde_json::Result<()> {
        let state = &mut *self.state;
        let mark = state.bytes.len();
        if let Err(e) = serializer.write(&mut state.bytes, prepared) {
            state.bytes.truncate(mark);
            return Err(e);
        }
        state.count += 1;
        Ok(())
    }

    #[must_use]
    pub fn should_flush(&self) -> bool {
        self.limits
            .is_reached(self.state.count, self.state.bytes.len())
    }

    /// Moves the buffered bytes out and resets the buffer for reuse.
    ///
    /// Returns `None` when nothing was buffered.
    pub fn drain(&mut self) -> Option<Batch> {
        let state = &mut *self.state;
        let events = std::mem::take(&mut state.count);
        if state.bytes.is_empty() {
            return None;
        }
        let payload = Bytes::copy_from_slice(&state.bytes);
        state.bytes.clear();
        state.drained += 1;
        Some(Batch {
            sequence: state.drained,
            drained_at: Instant::now(),
            events,
            payload,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.count == 0
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.state.bytes.len()
    }
}
