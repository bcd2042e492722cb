use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::debug;

const READ_CHUNK: usize = 8192;

/// Bytes kept from one stream; anything past the cap is read and discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

impl Captured {
    fn push(&mut self, chunk: &[u8], cap: usize) {
        let room = cap.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }
}

/// Background reader for one child stream.
///
/// The buffer is shared so whatever arrived is kept even if the reader has to be
/// abandoned (a grandchild can hold the pipe open after the child is gone).
pub struct StreamCapture {
    buffer: Arc<Mutex<Captured>>,
    task: Option<JoinHandle<()>>,
}

impl StreamCapture {
    pub fn spawn<R>(reader: Option<R>, cap: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Captured::default()));
        let task = reader.map(|mut reader| {
            let buffer = buffer.clone();
            tokio::spawn(async move {
                let mut chunk = vec![0u8; READ_CHUNK];
                loop {
                    match reader.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => {
                            if let Ok(mut captured) = buffer.lock() {
                                captured.push(&chunk[..n], cap);
                            }
                        }
                        Err(e) => {
                            debug!(error = %e, "Stream capture read failed");
                            break;
                        }
                    }
                }
            })
        });
        Self { buffer, task }
    }

    /// Wait up to `grace` for end-of-stream, then take what was captured.
    pub async fn finish(mut self, grace: Duration) -> Captured {
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                debug!("Stream still open after grace period, abandoning reader");
                task.abort();
            }
        }
        self.take()
    }

    pub fn abort(mut self) -> Captured {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.take()
    }

    fn take(&self) -> Captured {
        self.buffer
            .lock()
            .map(|mut captured| std::mem::take(&mut *captured))
            .unwrap_or_default()
    }
}

impl Drop for StreamCapture {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
