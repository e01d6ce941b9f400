use std::sync::atomic::{AtomicBool, Ordering};

use tracing_appender::non_blocking::WorkerGuard;

/// Handle для управления lifecycle логирования.
///
/// Держит guard файлового writer'а: пока handle жив, фоновая запись
/// в файл работает.
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    shutdown: AtomicBool,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            file_guard,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Пишется ли лог в файл.
    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Graceful shutdown: сбрасывает буфер файлового writer'а.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Release);
        tracing::info!(
            file_sink = self.file_guard.is_some(),
            "Logging shutdown"
        );
        drop(self.file_guard.take());
    }
}

impl Drop for LoggingHandle {
    fn drop(&mut self) {
        if !self.is_shutdown() && self.file_guard.is_some() {
            eprintln!(
                "WARNING: LoggingHandle dropped without explicit shutdown(). \
                 Some logs may be lost. Call .shutdown() for graceful cleanup."
            )
        }
    }
}
