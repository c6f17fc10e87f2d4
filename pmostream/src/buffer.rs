//! Bounded playout buffer and its flow-control policy
//!
//! The fetcher is the only writer and the output callback the only reader.
//! Occupancy is read from a third context (the engine monitor) for the
//! buffering hysteresis and for diagnostics.

use crate::format::PcmFormat;
use crate::state::RecorderState;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Bounded FIFO of decoded PCM bytes
pub struct PlayoutBuffer {
    format: PcmFormat,
    capacity: usize,
    queue: Mutex<VecDeque<u8>>,
    dropped: AtomicU64,
}

impl PlayoutBuffer {
    /// Allocates a buffer holding `capacity` worth of audio in `format`.
    pub fn new(format: PcmFormat, capacity: Duration) -> Self {
        let capacity = format.bytes_for(capacity).max(format.block_align());
        Self {
            format,
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity
    }

    /// Appends decoded PCM without blocking.
    ///
    /// Bytes beyond the capacity are discarded (whole blocks only) and counted
    /// in [`dropped_bytes`](Self::dropped_bytes). Returns the accepted count.
    pub fn push(&self, pcm: &[u8]) -> usize {
        let mut queue = self.queue.lock();
        let free = self.capacity.saturating_sub(queue.len());
        let align = self.format.block_align().max(1);
        let accepted = pcm.len().min(free - free % align);
        queue.extend(&pcm[..accepted]);
        if accepted < pcm.len() {
            self.dropped
                .fetch_add((pcm.len() - accepted) as u64, Ordering::Relaxed);
        }
        accepted
    }

    /// Removes up to `out.len()` bytes in FIFO order; returns fewer on underrun.
    pub fn pull(&self, out: &mut [u8]) -> usize {
        let mut queue = self.queue.lock();
        let n = out.len().min(queue.len());
        let (head, tail) = queue.as_slices();
        if n <= head.len() {
            out[..n].copy_from_slice(&head[..n]);
        } else {
            out[..head.len()].copy_from_slice(head);
            out[head.len()..n].copy_from_slice(&tail[..n - head.len()]);
        }
        queue.drain(..n);
        n
    }

    pub fn buffered_bytes(&self) -> usize {
        self.queue.lock().len()
    }

    /// Playable duration currently queued
    pub fn occupancy(&self) -> Duration {
        self.format.duration_of(self.buffered_bytes())
    }

    /// Less than a quarter second of free space left
    pub fn near_full(&self) -> bool {
        let free = self.capacity.saturating_sub(self.buffered_bytes());
        free < self.format.bytes_per_second() / 4
    }

    pub fn dropped_bytes(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.queue.lock().clear();
    }
}

impl std::fmt::Debug for PlayoutBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayoutBuffer")
            .field("format", &self.format)
            .field("capacity", &self.capacity)
            .field("buffered", &self.buffered_bytes())
            .finish()
    }
}

/// Action requested by the buffering policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDecision {
    /// Hold the output until the buffer refills
    Rebuffer,
    /// Enough audio queued, start the output
    Resume,
    /// Stream fully downloaded and drained
    Finished,
}

/// Underrun/promotion hysteresis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferPolicy {
    /// Occupancy above which a buffering session starts playing
    pub resume_above: Duration,
    /// Occupancy below which a playing session goes back to buffering
    pub rebuffer_below: Duration,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self {
            resume_above: Duration::from_secs(4),
            rebuffer_below: Duration::from_millis(500),
        }
    }
}

impl BufferPolicy {
    /// Decides the next transition for `state`, or `None` to stay put.
    ///
    /// A paused session is left alone. Once the stream is fully downloaded a
    /// buffering session plays out whatever is left instead of waiting for a
    /// threshold it can no longer reach.
    pub fn evaluate(
        &self,
        state: RecorderState,
        occupancy: Duration,
        fully_downloaded: bool,
    ) -> Option<FlowDecision> {
        match state {
            RecorderState::Playing if !fully_downloaded && occupancy < self.rebuffer_below => {
                Some(FlowDecision::Rebuffer)
            }
            RecorderState::Buffering if occupancy > self.resume_above => Some(FlowDecision::Resume),
            RecorderState::Buffering if fully_downloaded && !occupancy.is_zero() => {
                Some(FlowDecision::Resume)
            }
            RecorderState::Playing | RecorderState::Buffering
                if fully_downloaded && occupancy.is_zero() =>
            {
                Some(FlowDecision::Finished)
            }
            _ => None,
        }
    }
}
