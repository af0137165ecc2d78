//! The event loop drives a client's transport session from a dedicated OS
//! thread. Every message the transport delivers is dispatched on this thread.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use crate::transport::{Transport, TransportError};
use crate::utils::error::HandleError;
use crate::utils::error_stream::ErrorReporter;

pub(crate) struct EventLoop {
    pub(crate) client_id: Uuid,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) closed: Arc<AtomicBool>,
    pub(crate) poll_interval: Duration,
    pub(crate) errors: ErrorReporter<HandleError>,
}

impl EventLoop {
    pub(crate) fn spawn(self) -> io::Result<JoinHandle<()>> {
        let name = format!("lcmchan-handle-{}", &self.client_id.simple().to_string()[..8]);
        thread::Builder::new().name(name).spawn(move || self.run())
    }

    /// Runs until the client is closed or the session disappears. A failed
    /// iteration is followed by one `poll_interval` pause. Dropping `self` at
    /// the end closes the client's error stream.
    fn run(self) {
        debug!(client = %self.client_id, "event loop started");
        while !self.closed.load(Ordering::Acquire) {
            match self.transport.handle_timeout(self.poll_interval) {
                Ok(_) => {}
                Err(TransportError::SessionClosed) => {
                    info!(client = %self.client_id, "transport session closed, stopping event loop");
                    break;
                }
                Err(source) => {
                    self.errors.report(HandleError { source });
                    // A session that fails without waiting must not spin this thread.
                    thread::sleep(self.poll_interval);
                }
            }
        }
        debug!(client = %self.client_id, "event loop stopped");
    }
}
