//! The I/O poller (§4.3): a single dedicated thread multiplexing every
//! active driver fd, arming per-driver pull timers, parsing bytes into
//! records, and fanning them out to subscriber queues.
//!
//! A closure-based locked access pattern to a dispatch table, generalized
//! here to `Poller::mutate`, which the registry calls to install/remove fd
//! bindings. The pause/resume handshake in §4.3's design notes is
//! implemented with a self-pipe (§9 REDESIGN FLAGS: "prefer an always-armed
//! self-pipe/eventfd... over a per-thread signal") rather than POSIX signal
//! masking, since this is a hosted multi-threaded daemon.

use std::cell::Cell;
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use hound_abi::{DataId, DeviceId, Period, Record, RecordEnvelope};
use hound_lib::Queue;
use log::{debug, error, warn};

use crate::driver::DriverImpl;

/// One consumer queue bound to a subset of the data IDs flowing through a
/// given fd.
struct QueueBinding {
    queue: Arc<Queue>,
    ids: Vec<DataId>,
}

/// Per-ID pull timer state (§4.3 step 4, §5 "timeout semantics").
struct Timing {
    id: DataId,
    period_ns: u64,
    current_timeout_ns: u64,
}

/// Everything the poller tracks for one active driver fd.
struct FdEntry {
    driver: Arc<DriverImpl>,
    dev_id: DeviceId,
    next_seqno: Cell<u64>,
    timings: Vec<Timing>,
    bindings: Vec<QueueBinding>,
}

#[derive(Default)]
struct PollerTables {
    fds: HashMap<RawFd, FdEntry>,
}

impl PollerTables {
    fn min_timeout_ns(&self) -> Option<u64> {
        self.fds
            .values()
            .flat_map(|e| e.timings.iter())
            .map(|t| t.current_timeout_ns)
            .min()
    }
}

struct PollerState {
    tables: PollerTables,
    active_target: bool,
    active_current: bool,
}

/// The background I/O poller. One instance per broker process.
pub struct Poller {
    state: Mutex<PollerState>,
    running: Condvar,
    parked: Condvar,
    wake_read_fd: RawFd,
    wake_write_fd: RawFd,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// RAII handle returned by [`Poller::pause`]. Holds the poller's internal
/// lock (acquired only once the loop has parked) for the duration of a
/// mutation; dropping it resumes the loop.
pub struct PollerGuard<'a> {
    poller: &'a Poller,
    guard: Option<std::sync::MutexGuard<'a, PollerState>>,
}

impl<'a> PollerGuard<'a> {
    fn tables_mut(&mut self) -> &mut PollerTables {
        &mut self.guard.as_mut().unwrap().tables
    }
}

impl Drop for PollerGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            guard.active_target = true;
            drop(guard);
            self.poller.running.notify_all();
        }
    }
}

impl Poller {
    pub fn new() -> Arc<Self> {
        let mut fds = [0 as RawFd; 2];
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK) };
        if rc != 0 {
            panic!("hound: failed to create poller wake pipe");
        }
        let poller = Arc::new(Self {
            state: Mutex::new(PollerState {
                tables: PollerTables::default(),
                active_target: false,
                active_current: false,
            }),
            running: Condvar::new(),
            parked: Condvar::new(),
            wake_read_fd: fds[0],
            wake_write_fd: fds[1],
            handle: Mutex::new(None),
        });
        let thread_poller = poller.clone();
        let handle = std::thread::Builder::new()
            .name("hound-poller".into())
            .spawn(move || thread_poller.run())
            .expect("hound: failed to spawn poller thread");
        *poller.handle.lock().unwrap() = Some(handle);
        poller
    }

    fn wake_self_pipe(&self) {
        let byte = [1u8];
        unsafe {
            libc::write(self.wake_write_fd, byte.as_ptr() as *const _, 1);
        }
    }

    fn drain_self_pipe(&self) {
        let mut buf = [0u8; 64];
        loop {
            let n = unsafe { libc::read(self.wake_read_fd, buf.as_mut_ptr() as *mut _, buf.len()) };
            if n <= 0 {
                break;
            }
        }
    }

    /// Pause/resume protocol (§4.3): acquire exclusive access to the fd
    /// tables once the main loop has parked, and resume it automatically
    /// when the guard drops.
    pub fn pause(&self) -> PollerGuard<'_> {
        let mut guard = self.state.lock().unwrap();
        guard.active_target = false;
        self.wake_self_pipe();
        guard = self
            .parked
            .wait_while(guard, |s| s.active_current)
            .unwrap();
        PollerGuard {
            poller: self,
            guard: Some(guard),
        }
    }

    pub fn register_fd(
        &self,
        guard: &mut PollerGuard<'_>,
        fd: RawFd,
        driver: Arc<DriverImpl>,
        dev_id: DeviceId,
    ) {
        guard.tables_mut().fds.insert(
            fd,
            FdEntry {
                driver,
                dev_id,
                next_seqno: Cell::new(0),
                timings: Vec::new(),
                bindings: Vec::new(),
            },
        );
    }

    pub fn unregister_fd(&self, guard: &mut PollerGuard<'_>, fd: RawFd) {
        guard.tables_mut().fds.remove(&fd);
    }

    /// Bind `queue` to `ids` on the fd, adding or refreshing per-ID pull
    /// timers from `periods` (empty period means on-demand, no timer).
    pub fn bind_queue(
        &self,
        guard: &mut PollerGuard<'_>,
        fd: RawFd,
        queue: Arc<Queue>,
        ids: Vec<DataId>,
        periods: &[(DataId, Period)],
    ) {
        let tables = guard.tables_mut();
        let Some(entry) = tables.fds.get_mut(&fd) else {
            return;
        };
        for &(id, period) in periods {
            if period.is_on_demand() {
                continue;
            }
            if !entry.timings.iter().any(|t| t.id == id) {
                entry.timings.push(Timing {
                    id,
                    period_ns: period.get(),
                    current_timeout_ns: period.get(),
                });
            }
        }
        entry.bindings.push(QueueBinding { queue, ids });
    }

    /// Remove `queue`'s binding from the fd and drop the pull timer for any
    /// ID no longer requested by anyone on this fd.
    pub fn unbind_queue(&self, guard: &mut PollerGuard<'_>, fd: RawFd, queue: &Arc<Queue>, still_active_ids: &[DataId]) {
        let tables = guard.tables_mut();
        let Some(entry) = tables.fds.get_mut(&fd) else {
            return;
        };
        entry
            .bindings
            .retain(|b| !Arc::ptr_eq(&b.queue, queue));
        entry
            .timings
            .retain(|t| still_active_ids.contains(&t.id));
    }

    fn run(self: Arc<Self>) {
        loop {
            let mut guard = self.state.lock().unwrap();
            guard.active_current = false;
            self.parked.notify_all();
            guard = self
                .running
                .wait_while(guard, |s| !s.active_target || s.tables.fds.is_empty())
                .unwrap();
            guard.active_current = true;

            let min_timeout_ns = guard.tables.min_timeout_ns();
            let mut pollfds: Vec<libc::pollfd> = guard
                .tables
                .fds
                .keys()
                .map(|&fd| libc::pollfd {
                    fd,
                    events: libc::POLLIN,
                    revents: 0,
                })
                .collect();
            pollfds.push(libc::pollfd {
                fd: self.wake_read_fd,
                events: libc::POLLIN,
                revents: 0,
            });
            drop(guard);

            let timeout_ms = match min_timeout_ns {
                Some(ns) => ((ns + 999_999) / 1_000_000).max(1) as i32,
                None => -1,
            };
            let before = Instant::now();
            let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms) };
            let elapsed_ns = before.elapsed().as_nanos() as u64;

            if rc < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                error!("hound poller: poll() failed: {err}");
                continue;
            }

            let woke_for_control = pollfds
                .iter()
                .any(|p| p.fd == self.wake_read_fd && p.revents != 0);
            if woke_for_control {
                self.drain_self_pipe();
            }

            let mut guard = self.state.lock().unwrap();
            if !guard.active_target {
                // A pause was requested; let the top of the loop park us.
                continue;
            }

            self.advance_timings(&mut guard.tables, elapsed_ns);
            self.service_readable_fds(&mut guard.tables, &pollfds);
        }
    }

    fn advance_timings(&self, tables: &mut PollerTables, elapsed_ns: u64) {
        for entry in tables.fds.values_mut() {
            for t in entry.timings.iter_mut() {
                if t.current_timeout_ns <= elapsed_ns {
                    let lateness = elapsed_ns - t.current_timeout_ns;
                    entry.driver.as_driver().next(t.id);
                    t.current_timeout_ns = t.period_ns.saturating_sub(lateness);
                } else {
                    t.current_timeout_ns -= elapsed_ns;
                }
            }
        }
    }

    fn service_readable_fds(&self, tables: &mut PollerTables, pollfds: &[libc::pollfd]) {
        for p in pollfds {
            if p.fd == self.wake_read_fd || p.revents == 0 {
                continue;
            }
            let Some(entry) = tables.fds.get_mut(&p.fd) else {
                continue;
            };
            let Some(pull) = entry.driver.as_pull() else {
                // Push-mode: the driver owns its fd's I/O entirely.
                entry.driver.as_push().unwrap().poll(&PollerPushSink {
                    dev_id: entry.dev_id,
                    bindings: &entry.bindings,
                    next_seqno: &entry.next_seqno,
                });
                continue;
            };

            let mut buf = [0u8; 4096];
            let n = unsafe { libc::read(p.fd, buf.as_mut_ptr() as *mut _, buf.len()) };
            if n < 0 {
                let err = std::io::Error::last_os_error();
                match err.kind() {
                    std::io::ErrorKind::Interrupted => continue,
                    std::io::ErrorKind::WouldBlock => continue,
                    _ => {
                        error!("hound poller: read(fd={}) failed: {err}", p.fd);
                        continue;
                    }
                }
            }
            if n == 0 {
                continue;
            }

            let mut remaining = &buf[..n as usize];
            loop {
                let outcome = pull.parse(remaining);
                for mut record in outcome.records {
                    record.dev_id = entry.dev_id;
                    record.seqno = entry.next_seqno.get();
                    entry.next_seqno.set(entry.next_seqno.get() + 1);
                    fanout(record, &entry.bindings);
                }
                if outcome.bytes_left == remaining.len() || outcome.bytes_left == 0 {
                    break;
                }
                let consumed = remaining.len() - outcome.bytes_left;
                if consumed == 0 {
                    break;
                }
                remaining = &remaining[consumed..];
            }
        }
    }
}

fn fanout(record: Record, bindings: &[QueueBinding]) {
    let interested: Vec<&QueueBinding> = bindings
        .iter()
        .filter(|b| b.ids.contains(&record.data_id))
        .collect();
    if interested.is_empty() {
        debug!("hound poller: no subscriber for data_id {:?}", record.data_id);
        return;
    }
    let env: RecordEnvelope = Arc::new(record);
    for binding in interested {
        binding.queue.push(env.clone());
    }
}

struct PollerPushSink<'a> {
    dev_id: DeviceId,
    bindings: &'a [QueueBinding],
    next_seqno: &'a Cell<u64>,
}

impl crate::driver::PushSink for PollerPushSink<'_> {
    fn push_record(&self, mut record: Record) {
        record.dev_id = self.dev_id;
        let seqno = self.next_seqno.get();
        self.next_seqno.set(seqno + 1);
        record.seqno = seqno;
        fanout(record, self.bindings);
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            warn!("hound poller: dropping without joining background thread");
            drop(handle);
        }
    }
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod poller_tests;
