//! Optional execution control of the machine behind a connector.
//!
//! Backends attached to a running target (a hypervisor channel, an
//! emulator) can pause and resume its CPUs, e.g. to take a consistent
//! snapshot with several reads. Dump files and plain buffers cannot, and
//! report no CPU state.

use crate::error::Result;

/// Pause/resume control of the target's CPUs.
///
/// Pausing a paused target or resuming a running one is not an error.
pub trait CpuState: Send + Sync {
    fn pause(&self) -> Result<()>;

    fn resume(&self) -> Result<()>;

    fn is_paused(&self) -> bool;
}
