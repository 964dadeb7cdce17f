//! Bounded, overwriting, thread-safe record queue (§4.1).
//!
//! Capacity is runtime-resizable (`resize`, §4.1), and the physical storage
//! is a `VecDeque` rather than a hand-indexed array, so growing or
//! shrinking never needs to re-derive a contiguous/cut-through/wraparound
//! layout by hand. Blocking reads follow the standard check-then-block-
//! then-recheck condvar pattern: check the condition, and only block if it
//! still doesn't hold, re-checking after every wake so
//! a wakeup that raced with a waiter arming is never lost.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use hound_abi::RecordEnvelope;

struct Entry {
    seqno: u64,
    env: RecordEnvelope,
}

struct Inner {
    ring: VecDeque<Entry>,
    max_len: usize,
    /// Seqno that will be assigned to the next pushed record.
    next_seqno: u64,
    interrupted: bool,
}

impl Inner {
    fn front_seqno(&self) -> u64 {
        self.ring.front().map(|e| e.seqno).unwrap_or(self.next_seqno)
    }

    /// Evict the oldest entry, if any. Returns the evicted envelope so the
    /// caller can drop it outside the lock (§4.1: "decrements refcount of
    /// the displaced envelope outside the lock").
    fn evict_oldest(&mut self) -> Option<RecordEnvelope> {
        self.ring.pop_front().map(|e| e.env)
    }
}

/// Outcome of a blocking or non-blocking multi-record pop.
pub struct PopOutcome {
    pub records: Vec<RecordEnvelope>,
    pub first_seqno: u64,
    pub interrupted: bool,
}

/// The bounded ring described in §3/§4.1.
pub struct Queue {
    inner: Mutex<Inner>,
    ready: Condvar,
}

impl Queue {
    pub fn new(max_len: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ring: VecDeque::with_capacity(max_len),
                max_len,
                next_seqno: 0,
                interrupted: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Push one record envelope. Evicts the oldest entry first if the ring
    /// is full. Always succeeds.
    pub fn push(&self, env: RecordEnvelope) {
        let evicted = {
            let mut inner = self.inner.lock().unwrap();
            let evicted = if inner.ring.len() >= inner.max_len && inner.max_len > 0 {
                inner.evict_oldest()
            } else {
                None
            };
            let seqno = inner.next_seqno;
            inner.next_seqno += 1;
            inner.ring.push_back(Entry { seqno, env });
            self.ready.notify_all();
            evicted
        };
        drop(evicted);
    }

    /// Block until at least `n` records are available or the queue is
    /// interrupted, then pop up to `n` of them.
    pub fn pop_records_blocking(&self, n: usize) -> PopOutcome {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.interrupted {
                inner.interrupted = false;
                let out = self.drain_n(&mut inner, n);
                return PopOutcome {
                    records: out.0,
                    first_seqno: out.1,
                    interrupted: true,
                };
            }
            if inner.ring.len() >= n {
                let out = self.drain_n(&mut inner, n);
                return PopOutcome {
                    records: out.0,
                    first_seqno: out.1,
                    interrupted: false,
                };
            }
            inner = self.ready.wait(inner).unwrap();
        }
    }

    /// Pop up to `n` records without waiting.
    pub fn pop_records_nowait(&self, n: usize) -> PopOutcome {
        let mut inner = self.inner.lock().unwrap();
        let (records, first_seqno) = self.drain_n(&mut inner, n);
        PopOutcome {
            records,
            first_seqno,
            interrupted: false,
        }
    }

    /// Pop whole records from the front while the cumulative `record.size`
    /// stays within `budget`. Never pops a partial record.
    pub fn pop_bytes_nowait(&self, budget: usize) -> PopOutcome {
        let mut inner = self.inner.lock().unwrap();
        let first_seqno = inner.front_seqno();
        let mut records = Vec::new();
        let mut used = 0usize;
        while let Some(entry) = inner.ring.front() {
            let size = entry.env.size as usize;
            if used + size > budget {
                break;
            }
            used += size;
            records.push(inner.ring.pop_front().unwrap().env);
        }
        PopOutcome {
            records,
            first_seqno,
            interrupted: false,
        }
    }

    fn drain_n(&self, inner: &mut Inner, n: usize) -> (Vec<RecordEnvelope>, u64) {
        let first_seqno = inner.front_seqno();
        let count = n.min(inner.ring.len());
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            records.push(inner.ring.pop_front().unwrap().env);
        }
        (records, first_seqno)
    }

    /// Block until the queue holds at least one record, without consuming
    /// it. Returns `false` if woken by [`Queue::interrupt`] instead of new
    /// data arriving; the interrupted flag is consumed either way.
    pub fn wait_nonempty(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.interrupted {
                inner.interrupted = false;
                return false;
            }
            if !inner.ring.is_empty() {
                return true;
            }
            inner = self.ready.wait(inner).unwrap();
        }
    }

    /// Wake any blocked reader. Used by the context to break out of a
    /// blocking pop when stopping.
    pub fn interrupt(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.interrupted = true;
        self.ready.notify_all();
    }

    /// Grow or shrink the ring. If `flush`, all current records are
    /// dropped first. Otherwise, if shrinking below the current length,
    /// the oldest records are evicted until the new capacity is met; the
    /// relative order and seqno of surviving records is preserved.
    pub fn resize(&self, new_max: usize, flush: bool) {
        let mut evicted = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap();
            if flush {
                evicted.extend(inner.ring.drain(..).map(|e| e.env));
            } else {
                while inner.ring.len() > new_max {
                    if let Some(env) = inner.evict_oldest() {
                        evicted.push(env);
                    }
                }
            }
            inner.max_len = new_max;
        }
        drop(evicted);
    }

    /// Remove and return every record currently queued, in order.
    pub fn drain(&self) -> Vec<RecordEnvelope> {
        let mut inner = self.inner.lock().unwrap();
        inner.ring.drain(..).map(|e| e.env).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_len(&self) -> usize {
        self.inner.lock().unwrap().max_len
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod queue_tests;
