//! ---
//! smk_section: "02-simulation-kernel"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Kernel services handed to models: logging, storage, context."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use std::sync::Arc;

use crate::errors::Result;
use crate::notifications::NotificationHub;
use crate::scheduler::Scheduler;
use crate::timekeeper::TimeKeeper;

/// Classification of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum LogKind {
    /// Plain progress information.
    Information,
    /// A discrete occurrence worth flagging in the log stream.
    Event,
    /// Something recoverable went wrong.
    Warning,
    /// Something failed.
    Error,
    /// Diagnostic detail.
    Debug,
}

/// The logging service models receive during configuration.
pub trait Logger: Send + Sync {
    /// Record `message` on behalf of `sender`.
    fn log(&self, sender: &str, message: &str, kind: LogKind);

    /// Record an [`LogKind::Information`] message.
    fn info(&self, sender: &str, message: &str) {
        self.log(sender, message, LogKind::Information);
    }

    /// Record an [`LogKind::Event`] message.
    fn event(&self, sender: &str, message: &str) {
        self.log(sender, message, LogKind::Event);
    }

    /// Record a [`LogKind::Warning`] message.
    fn warning(&self, sender: &str, message: &str) {
        self.log(sender, message, LogKind::Warning);
    }

    /// Record an [`LogKind::Error`] message.
    fn error(&self, sender: &str, message: &str) {
        self.log(sender, message, LogKind::Error);
    }

    /// Record a [`LogKind::Debug`] message.
    fn debug(&self, sender: &str, message: &str) {
        self.log(sender, message, LogKind::Debug);
    }
}

/// [`Logger`] that forwards to the process-wide `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, sender: &str, message: &str, kind: LogKind) {
        match kind {
            LogKind::Information => tracing::info!(sender, "{message}"),
            LogKind::Event => tracing::info!(sender, event = true, "{message}"),
            LogKind::Warning => tracing::warn!(sender, "{message}"),
            LogKind::Error => tracing::error!(sender, "{message}"),
            LogKind::Debug => tracing::debug!(sender, "{message}"),
        }
    }
}

/// Sink for the byte spans written during a Store pass.
///
/// Spans are opaque to the sink; a Restore pass replays them through a
/// [`StorageReader`] in the same order and with the same lengths.
pub trait StorageWriter {
    /// Append one span.
    fn store(&mut self, span: &[u8]) -> Result<()>;
}

/// Source of the byte spans consumed during a Restore pass.
pub trait StorageReader {
    /// Fill `span` with the next stored span; the caller asks for exactly
    /// the length it wrote.
    fn restore(&mut self, span: &mut [u8]) -> Result<()>;
}

/// The service bundle a model receives when it is connected.
///
/// Contexts are cheap to clone; models keep the handles they need for
/// later entry-point work.
#[derive(Debug, Clone)]
pub struct SimulationContext {
    scheduler: Arc<Scheduler>,
    time_keeper: Arc<TimeKeeper>,
    logger: Arc<dyn Logger>,
    notifications: Arc<NotificationHub>,
}

impl SimulationContext {
    /// Bundle the kernel services for hand-out.
    pub fn new(
        scheduler: Arc<Scheduler>,
        time_keeper: Arc<TimeKeeper>,
        logger: Arc<dyn Logger>,
        notifications: Arc<NotificationHub>,
    ) -> Self {
        Self {
            scheduler,
            time_keeper,
            logger,
            notifications,
        }
    }

    /// The event scheduler.
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// The simulation clock.
    pub fn time_keeper(&self) -> &Arc<TimeKeeper> {
        &self.time_keeper
    }

    /// The logging service.
    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    /// The kernel notification hub.
    pub fn notifications(&self) -> &Arc<NotificationHub> {
        &self.notifications
    }
}

impl std::fmt::Debug for dyn Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Logger")
    }
}
