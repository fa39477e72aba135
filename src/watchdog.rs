//! Caller-side deadlines for reads against slow or wedged backends.
//!
//! Backend calls are blocking and cannot be interrupted. The read runs on a
//! tokio blocking thread; if the deadline passes first the caller gets
//! `Timeout` and the backend call finishes in the background.

use crate::error::{MemError, Result};
use crate::mem::MemoryView;
use crate::types::Address;
use bytes::Bytes;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Read `len` bytes at `address`, giving up after `deadline`.
///
/// Must be called from within a tokio runtime.
pub async fn read_with_deadline<V>(
    view: V,
    address: Address,
    len: usize,
    deadline: Duration,
) -> Result<Bytes>
where
    V: MemoryView + 'static,
{
    let task = tokio::task::spawn_blocking(move || view.read_raw(address, len));

    match timeout(deadline, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(MemError::Io(std::io::Error::other(format!(
            "read task failed: {join_err}"
        )))),
        Err(_) => {
            let millis = deadline.as_millis() as u64;
            warn!(%address, len, millis, "read missed its deadline");
            Err(MemError::Timeout { millis })
        }
    }
}

/// Blocking form of `read_with_deadline` for callers without a runtime.
pub fn read_with_deadline_blocking<V>(
    view: V,
    address: Address,
    len: usize,
    deadline: Duration,
) -> Result<Bytes>
where
    V: MemoryView + 'static,
{
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    debug!(%address, len, "blocking read with deadline");
    let result = rt.block_on(read_with_deadline(view, address, len, deadline));
    // don't wait for a wedged backend call
    rt.shutdown_background();
    result
}
