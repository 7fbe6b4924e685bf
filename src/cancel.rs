//! Cooperative cancellation of a running scan
//!
//! The surrounding job system owns the cancellation signal. The wrapper only
//! reads it once per wait loop iteration.

use crate::error::ZapWrapperError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// File the job system drops into the event folder to request cancellation
pub const CANCEL_REQUESTED_EVENT_FILE: &str = "cancel_requested.json";

/// Source of the external "job cancelled" signal
pub trait CancellationSource: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

/// In-process flag, shared with whoever may cancel the scan
#[derive(Debug, Clone, Default)]
pub struct FlagCancellation {
    flag: Arc<AtomicBool>,
}

impl FlagCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl CancellationSource for FlagCancellation {
    fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Watches the PDS job event folder for a cancel request
#[derive(Debug, Clone)]
pub struct EventFolderCancellation {
    event_folder: PathBuf,
}

impl EventFolderCancellation {
    pub fn new(event_folder: impl Into<PathBuf>) -> Self {
        Self {
            event_folder: event_folder.into(),
        }
    }
}

impl CancellationSource for EventFolderCancellation {
    fn is_cancelled(&self) -> bool {
        self.event_folder.join(CANCEL_REQUESTED_EVENT_FILE).exists()
    }
}

struct NeverCancelled;

impl CancellationSource for NeverCancelled {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Wraps the external cancellation signal for the orchestrator
#[derive(Clone)]
pub struct CancellationMonitor {
    source: Arc<dyn CancellationSource>,
}

impl CancellationMonitor {
    pub fn new(source: Arc<dyn CancellationSource>) -> Self {
        Self { source }
    }

    /// Monitor whose scan is never cancelled
    pub fn never() -> Self {
        Self::new(Arc::new(NeverCancelled))
    }

    pub fn is_scan_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }

    /// Builds the cancellation failure for the given scan.
    ///
    /// Callers stop their running engine phase before raising it.
    pub fn cancel_scan(&self, context_name: &str) -> ZapWrapperError {
        warn!("For scan {context_name}: Cancellation was requested, aborting scan");
        info!("For scan {context_name}: Scan job cancelled");
        ZapWrapperError::ScanCancelled {
            context_name: context_name.to_string(),
        }
    }
}

impl std::fmt::Debug for CancellationMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationMonitor")
            .field("cancelled", &self.is_scan_cancelled())
            .finish()
    }
}
