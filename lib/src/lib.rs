pub mod clock;
pub mod logging;
pub mod queue;

pub use clock::{monotonic_ns, wall_clock_timestamp};
pub use queue::{PopOutcome, Queue};
