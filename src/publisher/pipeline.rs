use std::sync::Arc;

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::Publisher;
use crate::transport::Transport;
use crate::utils::error::PublishError;
use crate::utils::error_stream::{ErrorReporter, ErrorStream, error_stream};
use crate::utils::queue_capacity;

/// Parameters for one publisher pipeline, built by `Client::publisher`.
pub(crate) struct PublisherPipeline {
    pub(crate) channel: Arc<str>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) input_capacity: usize,
    pub(crate) error_capacity: usize,
}

impl PublisherPipeline {
    /// Starts the sender task on the current Tokio runtime.
    pub(crate) fn spawn(self) -> Result<(Publisher, ErrorStream<PublishError>), PublishError> {
        let runtime = Handle::try_current().map_err(|_| PublishError::NoRuntime)?;

        let (input_tx, input_rx) = mpsc::channel(queue_capacity(self.input_capacity));
        let (reporter, errors) =
            error_stream(self.error_capacity, format!("publisher {}", self.channel));

        let publisher = Publisher::new(self.channel.clone(), input_tx);
        runtime.spawn(run_sender(self.channel, self.transport, input_rx, reporter));

        Ok((publisher, errors))
    }
}

/// Drains `input` in order until every `Publisher` is gone. The error stream
/// closes when `errors` is dropped on return.
async fn run_sender(
    channel: Arc<str>,
    transport: Arc<dyn Transport>,
    mut input: mpsc::Receiver<Bytes>,
    errors: ErrorReporter<PublishError>,
) {
    debug!(%channel, "publisher started");
    while let Some(payload) = input.recv().await {
        let mut buf = Vec::with_capacity(payload.len());
        buf.extend_from_slice(&payload);

        match transport.publish(&channel, &buf) {
            Ok(()) => trace!(%channel, len = buf.len(), "published"),
            Err(source) => {
                errors.report(PublishError::Transport {
                    channel: channel.to_string(),
                    source,
                });
            }
        }
    }
    debug!(%channel, "publisher stopped");
}
