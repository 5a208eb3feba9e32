//! Poll loops driving the alert engine
//!
//! Each metric family gets its own fixed-interval loop. A tick reads the
//! source, reconciles the family's registry, evaluates every entity and hands
//! the resulting alerts to the dispatcher.

mod poller;

pub use poller::{CycleReport, Poller};

/// Hostname and pid of this daemon process
pub fn host_identity() -> (String, u32) {
    let hostname = sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string());
    (hostname, std::process::id())
}

/// Root span of the daemon; every poll loop and evaluation logs inside it
pub fn daemon_span() -> tracing::Span {
    let (hostname, pid) = host_identity();
    tracing::info_span!("rqmon", hostname = %hostname, pid)
}
