//! Per-call capabilities handed to every decoder and encoder.
//!
//! A [`Context`] carries the optional [`ProgressMonitor`], the
//! [`ExceptionSink`] that collects warnings and the [`DelegateTable`] used by
//! delegate coders. Options travel separately in
//! [`ImageInfo`](pixmill_core::ImageInfo), which implements
//! [`OptionSource`](pixmill_core::OptionSource).
//!
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//! use pixmill_io::context::Context;
//!
//! let seen = Arc::new(AtomicU64::new(0));
//! let counter = seen.clone();
//! let ctx = Context::new().with_monitor(move |_tag: &str, offset: u64, _span: u64| {
//!     counter.store(offset, Ordering::Relaxed);
//!     offset < 3
//! });
//! assert!(ctx.progress("pnm", 2, 10).is_ok());
//! assert!(ctx.progress("pnm", 3, 10).unwrap_err().is_cancelled());
//! assert_eq!(seen.load(Ordering::Relaxed), 3);
//! ```

use std::fmt;
use std::sync::Arc;

use pixmill_core::{Image, Severity, Warning};
use tracing::{trace, warn};

use crate::delegate::DelegateTable;
use crate::error::{IoError, IoResult};

/// Receives row progress. Returning `false` cancels the call.
pub trait ProgressMonitor: Send + Sync {
    /// Reports that `offset` of `span` units of work under `tag` are done.
    fn progress(&self, tag: &str, offset: u64, span: u64) -> bool;
}

impl<F> ProgressMonitor for F
where
    F: Fn(&str, u64, u64) -> bool + Send + Sync,
{
    fn progress(&self, tag: &str, offset: u64, span: u64) -> bool {
        self(tag, offset, span)
    }
}

/// Collected warnings of one call.
#[derive(Debug, Clone, Default)]
pub struct ExceptionSink {
    warnings: Vec<Warning>,
}

impl ExceptionSink {
    /// Records a warning.
    pub fn push(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    /// Recorded warnings in arrival order.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Removes and returns every warning.
    pub fn take(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    /// Returns `true` if any warning has `template`.
    pub fn contains(&self, template: &str) -> bool {
        self.warnings.iter().any(|w| w.template == template)
    }

    /// Number of warnings.
    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    /// Returns `true` when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Capabilities of one decode or encode call.
#[derive(Default, Clone)]
pub struct Context {
    monitor: Option<Arc<dyn ProgressMonitor>>,
    delegates: Option<Arc<DelegateTable>>,
    /// Warnings raised during the call.
    pub exceptions: ExceptionSink,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("monitor", &self.monitor.is_some())
            .field("delegates", &self.delegates)
            .field("exceptions", &self.exceptions)
            .finish()
    }
}

impl Context {
    /// Creates a context with no monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a progress monitor.
    pub fn with_monitor(mut self, monitor: impl ProgressMonitor + 'static) -> Self {
        self.monitor = Some(Arc::new(monitor));
        self
    }

    /// Installs a shared progress monitor.
    pub fn with_shared_monitor(mut self, monitor: Arc<dyn ProgressMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Uses `delegates` instead of [`DelegateTable::global`].
    pub fn with_delegates(mut self, delegates: Arc<DelegateTable>) -> Self {
        self.delegates = Some(delegates);
        self
    }

    /// Delegate commands for this call.
    pub fn delegates(&self) -> &DelegateTable {
        self.delegates
            .as_deref()
            .unwrap_or_else(|| DelegateTable::global())
    }

    /// Reports progress; fails with [`IoError::Cancelled`] when the monitor
    /// asks to stop.
    pub fn progress(&self, tag: &str, offset: u64, span: u64) -> IoResult<()> {
        match &self.monitor {
            Some(monitor) if !monitor.progress(tag, offset, span) => {
                trace!(tag, offset, span, "cancelled by progress monitor");
                Err(IoError::Cancelled)
            }
            _ => Ok(()),
        }
    }

    /// Records a warning in the sink.
    pub fn warn(&mut self, warning: Warning) {
        warn!(%warning, "coder warning");
        self.exceptions.push(warning);
    }

    /// Records a warning on `image`. The dispatcher mirrors image warnings
    /// into the sink with [`Context::absorb`] once the call returns.
    pub fn warn_image(
        &self,
        image: &mut Image,
        module: &str,
        severity: Severity,
        template: &str,
    ) {
        let warning = Warning::new(module, severity, template, image.filename.clone());
        warn!(%warning, "coder warning");
        image.warnings.push(warning);
    }

    /// Copies the warnings attached to `image` into the sink.
    pub fn absorb(&mut self, image: &Image) {
        self.exceptions.warnings.extend(image.warnings.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_monitor_never_cancels() {
        let ctx = Context::new();
        assert!(ctx.progress("tiff", 100, 10).is_ok());
    }

    #[test]
    fn test_warn_image_mirrors_into_sink() {
        let mut ctx = Context::new();
        let mut image = Image::new(1, 1).unwrap();
        image.filename = "a.pgm".into();
        ctx.warn_image(&mut image, "pnm", Severity::CorruptImageWarning, "UnexpectedEndOfFile");
        assert_eq!(image.warnings.len(), 1);
        assert!(ctx.exceptions.is_empty());
        ctx.absorb(&image);
        assert!(ctx.exceptions.contains("UnexpectedEndOfFile"));
        assert_eq!(
            ctx.exceptions.warnings()[0].to_string(),
            "pnm CorruptImageWarning UnexpectedEndOfFile a.pgm"
        );
        assert_eq!(ctx.exceptions.take().len(), 1);
        assert!(ctx.exceptions.is_empty());
    }
}
