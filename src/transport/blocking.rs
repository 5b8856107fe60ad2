//! Blocking forms of the async transport primitives.
//!
//! Blocking calls wait on the async primitive, never the reverse. Futures run
//! on a shared bridge runtime so sockets opened through a blocking call stay
//! registered with a live reactor after the call returns.

use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::error::{PeerError, Result};

static BRIDGE: OnceLock<Runtime> = OnceLock::new();

/// The shared bridge runtime, built on first use.
pub(crate) fn bridge_runtime() -> Result<&'static Runtime> {
    if let Some(runtime) = BRIDGE.get() {
        return Ok(runtime);
    }
    let runtime = Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("peerwire-bridge")
        .enable_all()
        .build()?;
    Ok(BRIDGE.get_or_init(|| runtime))
}

/// Run `future` to completion on the bridge runtime.
///
/// Refused from inside an async context, where blocking would stall a
/// worker.
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output> {
    if Handle::try_current().is_ok() {
        return Err(PeerError::BlockingInAsyncContext);
    }
    Ok(bridge_runtime()?.block_on(future))
}
