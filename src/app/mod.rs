//! Application core: the kernel's domain logic, no direct I/O.
//!
//! Port traits in [`ports`] are the only way out to hardware and network,
//! keeping the tick orchestration in [`service`] testable on the host.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
