use std::io;
use std::io::Write;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, MakeWriter};

#[derive(Clone)]
struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for CaptureWriter {
    type Writer = CaptureHandle;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureHandle {
            buffer: self.buffer.clone(),
        }
    }
}

struct CaptureHandle {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for CaptureHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.buffer.lock().unwrap_or_else(|err| err.into_inner());
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Captures tracing output for tests using a shared global subscriber.
/// Holding a capture serialises tests that inspect logs.
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    _permit: OwnedSemaphorePermit,
}

static CAPTURED: std::sync::OnceLock<Arc<Mutex<Vec<u8>>>> = std::sync::OnceLock::new();
static CAPTURE_GATE: std::sync::OnceLock<Arc<Semaphore>> = std::sync::OnceLock::new();

impl LogCapture {
    pub async fn new(filter: &str) -> Self {
        let semaphore = CAPTURE_GATE
            .get_or_init(|| Arc::new(Semaphore::new(1)))
            .clone();
        let permit = semaphore
            .acquire_owned()
            .await
            .expect("log capture semaphore closed");
        let buffer = CAPTURED
            .get_or_init(|| {
                let buffer = Arc::new(Mutex::new(Vec::new()));
                let writer = CaptureWriter {
                    buffer: buffer.clone(),
                };
                let subscriber = fmt::fmt()
                    .with_env_filter(EnvFilter::new(filter))
                    .with_target(false)
                    .with_ansi(false)
                    .compact()
                    .with_writer(writer)
                    .finish();
                let _ = tracing::subscriber::set_global_default(subscriber);
                buffer
            })
            .clone();
        buffer.lock().unwrap_or_else(|err| err.into_inner()).clear();
        Self {
            buffer,
            _permit: permit,
        }
    }

    pub fn text(&self) -> String {
        let guard = self.buffer.lock().unwrap_or_else(|err| err.into_inner());
        String::from_utf8_lossy(&guard).to_string()
    }

    /// Audit entries only, one line per decision.
    pub fn audit_lines(&self) -> Vec<String> {
        self.text()
            .lines()
            .filter(|line| line.contains("decision="))
            .map(str::to_string)
            .collect()
    }

    pub fn clear(&self) {
        self.buffer
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clear();
    }
}
