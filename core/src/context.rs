//! Consumer contexts (§4.4): the per-subscriber handle binding a request
//! list and a queue to whichever driver instances claim the requested data
//! IDs, plus the read paths consumers poll or block on.
//!
//! Grounded on the registry's own `ref`/`unref` pairing (§4.2.1): a context
//! is, structurally, "one `Queue` plus the set of `(DriverInstance,
//! [DataRequest])` groups it currently holds a ref on". `start`/`stop` drive
//! that pairing; `modify` diffs the old and new group sets and applies only
//! the delta, rolling back cleanly if any partial application fails (§9:
//! "modify must roll back fully, restoring both the queue size and the
//! request map, if any requested change fails" — deliberately preserved
//! here rather than silently relaxed).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use hound_abi::{DataRequest, Error, Record, Result, SchedMode, MAX_REQUESTS};
use hound_lib::Queue;
use log::warn;

use crate::driver::CurrentDriverGuard;
use crate::registry::{DriverInstance, DriverRegistry};

/// Invoked once per delivered record by every `read*` method (§4.4): the
/// callback is the delivery path itself, not a side channel. Receives the
/// record and the queue-assigned seqno of its pop (contiguous per queue,
/// distinct from whatever seqno the emitting driver stamped on the record).
pub type Callback = Arc<dyn Fn(&Record, u64) + Send + Sync>;
type Group = (Arc<DriverInstance>, Vec<DataRequest>);

/// Validate a request list against §4.4 step 1 and group its entries by the
/// driver instance that claims each data ID. Used by both `alloc` and
/// `modify` so the two paths can never drift apart.
fn validate_and_group(registry: &DriverRegistry, requests: &[DataRequest]) -> Result<Vec<Group>> {
    if requests.is_empty() {
        return Err(Error::NoDataRequested);
    }
    if requests.len() > MAX_REQUESTS {
        return Err(Error::TooMuchDataRequested);
    }

    let mut seen_pairs = HashSet::new();
    let mut seen_push_ids = HashSet::new();
    let mut groups: Vec<Group> = Vec::new();

    for req in requests {
        let instance = registry
            .lookup_by_data_id(req.id)
            .ok_or(Error::DataIdDoesNotExist)?;
        if !registry.period_supported(req.id, req.period.get()) {
            return Err(Error::PeriodUnsupported);
        }
        // §5 "timeout semantics": a pull-mode driver has no timer-free way
        // to service an on-demand request (there is no fd-readiness event
        // to drive it), so period == 0 is rejected here — the same place
        // push-mode's on-demand requests (which the driver services via its
        // own `poll`) are accepted. §4.2.1's binding path enforces the same
        // rule so the two paths can never disagree (see `ref_driver`).
        if instance.driver.mode() == SchedMode::Pull && req.period.is_on_demand() {
            return Err(Error::PeriodUnsupported);
        }
        if !seen_pairs.insert((req.id, req.period)) {
            return Err(Error::DuplicateDataRequested);
        }
        if instance.driver.mode() == SchedMode::Push && !seen_push_ids.insert(req.id) {
            return Err(Error::DuplicateDataRequested);
        }

        match groups.iter_mut().find(|(inst, _)| Arc::ptr_eq(inst, &instance)) {
            Some((_, reqs)) => reqs.push(*req),
            None => groups.push((instance, vec![*req])),
        }
    }

    Ok(groups)
}

struct State {
    active: bool,
    groups: Vec<Group>,
    /// Concurrent `read*` calls in flight (§3 Consumer Context data model,
    /// §4.4 `free`): incremented on entry to every read method, decremented
    /// on exit, checked by `free`.
    readers: u64,
}

/// A consumer's subscription: queue, request list, and (while active) the
/// driver refs backing it.
pub struct Context {
    registry: Arc<DriverRegistry>,
    queue: Arc<Queue>,
    callback: Callback,
    state: Mutex<State>,
}

impl Context {
    /// §4.4 `alloc`: validate, group by driver, and return an inactive
    /// context. Does not touch any driver until [`Context::start`].
    pub fn alloc(
        registry: Arc<DriverRegistry>,
        queue_len: usize,
        requests: &[DataRequest],
        callback: Option<Callback>,
    ) -> Result<Arc<Self>> {
        if queue_len == 0 {
            return Err(Error::EmptyQueue);
        }
        let callback = callback.ok_or(Error::MissingCallback)?;
        let groups = validate_and_group(&registry, requests)?;

        Ok(Arc::new(Self {
            registry,
            queue: Arc::new(Queue::new(queue_len)),
            callback,
            state: Mutex::new(State {
                active: false,
                groups,
                readers: 0,
            }),
        }))
    }

    pub fn queue_length(&self) -> usize {
        self.queue.len()
    }

    pub fn max_queue_length(&self) -> usize {
        self.queue.max_len()
    }

    /// §4.4 `start`: ref every driver group. Unwinds any ref already taken
    /// if a later one fails.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.active {
            return Err(Error::CtxActive);
        }

        let mut refed: Vec<&Group> = Vec::new();
        for group in &state.groups {
            if let Err(e) = self.registry.ref_driver(&group.0, &self.queue, &group.1) {
                for (instance, reqs) in refed {
                    if let Err(unwind_err) = self.registry.unref_driver(instance, &self.queue, reqs) {
                        warn!("hound ctx: failed to unwind ref() during start() rollback: {unwind_err}");
                    }
                }
                return Err(e);
            }
            refed.push(group);
        }

        state.active = true;
        Ok(())
    }

    /// §4.4 `stop`: interrupt any blocked reader first (so it returns
    /// promptly with `CTX_STOPPED` instead of racing the unrefs below), then
    /// unref every driver group.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.active {
            return Err(Error::CtxNotActive);
        }
        state.active = false;
        self.queue.interrupt();
        for (instance, reqs) in &state.groups {
            if let Err(e) = self.registry.unref_driver(instance, &self.queue, reqs) {
                warn!("hound ctx: unref() failed during stop(): {e}");
            }
        }
        Ok(())
    }

    /// §4.4 `modify`: diff the current and requested group sets, apply only
    /// the delta, and roll back fully (both the driver refs and the queue
    /// resize) if any part of the delta fails.
    pub fn modify(&self, new_requests: &[DataRequest], new_queue_len: Option<usize>, flush: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.active {
            return Err(Error::CtxNotActive);
        }

        let new_groups = validate_and_group(&self.registry, new_requests)?;

        let added: Vec<&Group> = new_groups
            .iter()
            .filter(|(inst, _)| !state.groups.iter().any(|(old, _)| Arc::ptr_eq(old, inst)))
            .collect();
        let removed: Vec<&Group> = state
            .groups
            .iter()
            .filter(|(old, _)| !new_groups.iter().any(|(inst, _)| Arc::ptr_eq(inst, old)))
            .collect();

        let mut ref_done: Vec<&Group> = Vec::new();
        let ref_result = (|| -> Result<()> {
            for group in &added {
                self.registry.ref_driver(&group.0, &self.queue, &group.1)?;
                ref_done.push(*group);
            }
            Ok(())
        })();
        if let Err(e) = ref_result {
            for (instance, reqs) in ref_done {
                if let Err(unwind_err) = self.registry.unref_driver(instance, &self.queue, reqs) {
                    warn!("hound ctx: failed to unwind ref() during modify() rollback: {unwind_err}");
                }
            }
            return Err(e);
        }

        for (instance, reqs) in &removed {
            if let Err(e) = self.registry.unref_driver(instance, &self.queue, reqs) {
                warn!("hound ctx: unref() failed during modify(): {e}");
            }
        }

        let old_max_len = self.queue.max_len();
        if let Some(new_len) = new_queue_len {
            if new_len == 0 {
                for group in &added {
                    if let Err(e) = self.registry.unref_driver(&group.0, &self.queue, &group.1) {
                        warn!("hound ctx: failed to unwind added ref() during modify() queue-len rollback: {e}");
                    }
                }
                for (instance, reqs) in &removed {
                    if let Err(e) = self.registry.ref_driver(instance, &self.queue, reqs) {
                        warn!("hound ctx: failed to restore removed ref() during modify() queue-len rollback: {e}");
                    }
                }
                return Err(Error::QueueTooSmall);
            }
            self.queue.resize(new_len, flush);
        } else if flush {
            self.queue.resize(old_max_len, true);
        }

        state.groups = new_groups;
        Ok(())
    }

    /// §6 `next(ctx, n)`: for each on-demand data ID in this context's
    /// request list, call `ops.next(id)` once. `n` has no counterpart in the
    /// driver ABI (`Driver::next` fires a single sample per call) and is
    /// accepted only to match the external interface's signature.
    pub fn next(&self, _n: usize) -> Result<()> {
        let state = self.state.lock().unwrap();
        if !state.active {
            return Err(Error::CtxNotActive);
        }
        for (instance, reqs) in &state.groups {
            let driver = instance.driver.as_driver();
            for req in reqs.iter().filter(|r| r.period.is_on_demand()) {
                let _guard = CurrentDriverGuard::enter(&instance.path);
                driver.next(req.id);
            }
        }
        Ok(())
    }

    /// §4.4 `read_blocking`: increments `readers`, blocks until `n` records
    /// are available or the context is interrupted (by `stop`), invokes the
    /// callback once per delivered record with its queue-assigned seqno
    /// (dropping each envelope right after, per §4.4 "decrementing the
    /// envelope refcount after"), then decrements `readers`.
    pub fn read_blocking(&self, n: usize) -> Result<ReadOutcome> {
        self.begin_read()?;
        let outcome = self.queue.pop_records_blocking(n);
        let interrupted = outcome.interrupted;
        let delivered = self.dispatch(outcome);
        let stopped = interrupted && !self.end_read();
        if stopped {
            return Err(Error::CtxStopped);
        }
        Ok(ReadOutcome {
            delivered,
            interrupted,
        })
    }

    /// §4.4 `read_nowait`: pop up to `n` records without blocking, dispatch
    /// each to the callback.
    pub fn read_nowait(&self, n: usize) -> Result<ReadOutcome> {
        self.begin_read()?;
        let outcome = self.queue.pop_records_nowait(n);
        if outcome.records.is_empty() {
            self.end_read();
            return Err(Error::EmptyQueue);
        }
        let delivered = self.dispatch(outcome);
        self.end_read();
        Ok(ReadOutcome {
            delivered,
            interrupted: false,
        })
    }

    /// §4.4 `read_bytes_nowait`: pop whole records from the front while
    /// their cumulative `size` stays within `budget`, dispatch each to the
    /// callback.
    pub fn read_bytes_nowait(&self, budget: usize) -> Result<ReadOutcome> {
        self.begin_read()?;
        let outcome = self.queue.pop_bytes_nowait(budget);
        if outcome.records.is_empty() {
            self.end_read();
            return Err(Error::EmptyQueue);
        }
        let delivered = self.dispatch(outcome);
        self.end_read();
        Ok(ReadOutcome {
            delivered,
            interrupted: false,
        })
    }

    /// §6 `read_all_nowait`: `read_nowait(usize::MAX)` — drain every record
    /// currently queued, dispatching each to the callback.
    pub fn read_all_nowait(&self) -> Result<ReadOutcome> {
        self.read_nowait(usize::MAX)
    }

    /// Invoke the callback once per record in `outcome`, in order, dropping
    /// each envelope's reference immediately after its callback returns
    /// (§4.4 "decrementing the envelope refcount after"). Returns the
    /// number of records dispatched.
    fn dispatch(&self, outcome: hound_lib::PopOutcome) -> usize {
        let mut delivered = 0;
        for (i, env) in outcome.records.into_iter().enumerate() {
            (self.callback)(&env, outcome.first_seqno + i as u64);
            drop(env);
            delivered += 1;
        }
        delivered
    }

    fn begin_read(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.active {
            return Err(Error::CtxNotActive);
        }
        state.readers += 1;
        Ok(())
    }

    /// Decrement `readers` and return whether the context is still active.
    fn end_read(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        state.readers = state.readers.saturating_sub(1);
        state.active
    }

    /// §4.4 `free`: rejects if `active` or `readers > 0`.
    pub fn free(&self) -> Result<()> {
        let state = self.state.lock().unwrap();
        if state.active || state.readers > 0 {
            return Err(Error::CtxActive);
        }
        drop(state);
        self.queue.drain();
        Ok(())
    }
}

/// Outcome of a callback-dispatching read (§4.4): how many records were
/// delivered to the callback and whether the queue's interrupt flag (set by
/// `stop`) cut the read short.
pub struct ReadOutcome {
    pub delivered: usize,
    pub interrupted: bool,
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
