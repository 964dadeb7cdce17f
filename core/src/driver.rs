//! The driver op abstraction (§4.2.2).
//!
//! Every method takes `&self`; implementations reach for interior
//! mutability (a `Mutex`) instead of requiring `&mut self` through a
//! registry lock. That lets the poller call into a driver's `parse`/`poll`
//! without holding any lock the registry itself needs.
//!
//! A driver exposes exactly one of `parse` (pull mode) or `poll` (push
//! mode) — modeled as [`PullDriver`]/[`PushDriver`], two sub-traits of the
//! common [`Driver`], combined into one registry-held value via
//! [`DriverImpl`]. This is the same "one shared trait, one mode-specific
//! extension" shape `NetDevice` uses for `tx`/`poll_rx` versus the
//! control-plane methods, just split across two traits instead of one.

use std::os::unix::io::RawFd;

use hound_abi::{DataId, InitArgs, Period, Record, Result, SchedMode};

/// One line of a driver instance's `active_data` multiset (§4.2.1): a data
/// request plus the number of consumers currently holding it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveRequest {
    pub id: DataId,
    pub period: Period,
    pub refcount: u32,
}

/// Result of one `parse` call (§4.2.2, §9 "parse contract with partial
/// consumption"): `bytes_left` must be `<= ` the input length; equal means
/// "give up for now, the buffer is not re-presented".
pub struct ParseOutcome {
    pub bytes_left: usize,
    pub records: Vec<Record>,
}

/// Sink a push-mode driver uses to hand records to the poller for fanout,
/// the "provided push-records interface" of §4.3 step 7.
pub trait PushSink: Send + Sync {
    fn push_record(&self, record: Record);
}

/// Operations common to every driver, regardless of scheduling mode.
pub trait Driver: Send + Sync {
    /// Human-readable device name, validated at registration (§4.2 step 3).
    fn device_name(&self) -> String;

    /// Fill in `enabled`/`avail_periods` for each schema-derived descriptor
    /// (§4.2 step 5). Descriptors the driver leaves disabled are not
    /// claimed against the data-ID map.
    fn datadesc(&self, descs: &mut Vec<hound_abi::DataDescriptor>);

    /// Inform the driver of the current union of active requests across
    /// all consumers (§4.2.1). Called whenever the active set changes.
    fn setdata(&self, active: &[ActiveRequest]);

    /// Open whatever fd the poller should multiplex. Called on the first
    /// `ref` (§4.2.1 step 3).
    fn start(&self) -> Result<RawFd>;

    /// Close resources opened by `start`. Called when the instance's
    /// refcount reaches zero.
    fn stop(&self);

    /// On-demand sample requested for `id` (§6 `next`): fired by the
    /// poller's pull timer for pull-mode drivers (§4.3 step 4), or directly
    /// by `Context::next` for a push-mode driver's on-demand subscriptions
    /// (which have no poller timer backing them at all).
    fn next(&self, id: DataId);

    /// Release any resources held since `init`. Called by
    /// `DriverRegistry::destroy` once the instance's refcount is zero.
    fn destroy(&self);
}

/// Pull-mode driver: the poller reads raw bytes and hands them to `parse`.
pub trait PullDriver: Driver {
    fn parse(&self, buf: &[u8]) -> ParseOutcome;
}

/// Push-mode driver: the driver owns its fd's I/O and pushes records
/// through the sink whenever it chooses.
pub trait PushDriver: Driver {
    fn poll(&self, sink: &dyn PushSink);
}

/// The two driver flavors, as stored by the registry.
pub enum DriverImpl {
    Pull(Box<dyn PullDriver>),
    Push(Box<dyn PushDriver>),
}

impl DriverImpl {
    pub fn mode(&self) -> SchedMode {
        match self {
            Self::Pull(_) => SchedMode::Pull,
            Self::Push(_) => SchedMode::Push,
        }
    }

    pub fn as_driver(&self) -> &dyn Driver {
        match self {
            Self::Pull(d) => d.as_ref(),
            Self::Push(d) => d.as_ref(),
        }
    }

    pub fn as_pull(&self) -> Option<&dyn PullDriver> {
        match self {
            Self::Pull(d) => Some(d.as_ref()),
            Self::Push(_) => None,
        }
    }

    pub fn as_push(&self) -> Option<&dyn PushDriver> {
        match self {
            Self::Push(d) => Some(d.as_ref()),
            Self::Pull(_) => None,
        }
    }
}

/// Module-constructor-populated "ops map" entry (§4.2): given a path and
/// init args, produce a fresh driver instance of this kind.
pub trait DriverFactory: Send + Sync {
    fn init(&self, path: &str, args: &InitArgs) -> Result<DriverImpl>;
}

thread_local! {
    static CURRENT_DRIVER_NAME: std::cell::RefCell<Option<String>> = const { std::cell::RefCell::new(None) };
}

/// Scoped guard installing the thread-local "current driver" slot (§4.2.2,
/// §9 REDESIGN FLAGS): set for the duration of one `ops.*` dispatch and
/// cleared on drop, including on unwind. New code should prefer the `&dyn
/// Driver` the registry already passes explicitly; this exists only so a
/// driver that wants the ambient-style accessor can call [`current_driver`].
pub struct CurrentDriverGuard;

impl CurrentDriverGuard {
    pub fn enter(name: &str) -> Self {
        CURRENT_DRIVER_NAME.with(|slot| *slot.borrow_mut() = Some(name.to_string()));
        Self
    }
}

impl Drop for CurrentDriverGuard {
    fn drop(&mut self) {
        CURRENT_DRIVER_NAME.with(|slot| *slot.borrow_mut() = None);
    }
}

/// Device name of the driver currently dispatching on this thread, if any.
pub fn current_driver() -> Option<String> {
    CURRENT_DRIVER_NAME.with(|slot| slot.borrow().clone())
}
