use std::time::Instant;

/// Counts bytes handed to the client and logs the outcome when dropped.
///
/// A body stream that is dropped before calling [`StreamObserver::complete`]
/// was abandoned by the client.
#[derive(Debug)]
pub struct StreamObserver {
    kind: &'static str,
    request_id: String,
    path: String,
    bytes: u64,
    started: Instant,
    completed: bool,
}

impl StreamObserver {
    pub fn new(kind: &'static str, request_id: &str, path: impl Into<String>) -> Self {
        Self {
            kind,
            request_id: request_id.to_string(),
            path: path.into(),
            bytes: 0,
            started: Instant::now(),
            completed: false,
        }
    }

    pub fn record(&mut self, n: usize) {
        self.bytes += n as u64;
    }

    pub fn complete(&mut self) {
        self.completed = true;
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for StreamObserver {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        if self.completed {
            tracing::info!(
                kind = self.kind,
                request_id = %self.request_id,
                path = %self.path,
                bytes = self.bytes,
                elapsed_ms,
                "Stream delivered"
            );
        } else if self.kind == "range" && self.bytes > 0 {
            // Players routinely cut a range short to seek or probe.
            tracing::debug!(
                request_id = %self.request_id,
                path = %self.path,
                bytes = self.bytes,
                elapsed_ms,
                "Range cut short (seek/probe)"
            );
        } else {
            tracing::info!(
                kind = self.kind,
                request_id = %self.request_id,
                path = %self.path,
                bytes = self.bytes,
                elapsed_ms,
                "Stream aborted by client"
            );
        }
    }
}
