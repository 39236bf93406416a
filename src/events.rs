//! Lifecycle hooks for the repair loop.
//!
//! Attaching an [`EventHandler`] is optional. Handlers see each generation
//! call, each validation verdict and each repair round as it happens, which is
//! enough to drive progress reporting or metrics without parsing logs.

use crate::rules::Stage;
use std::sync::Arc;

/// Events emitted while a repair loop runs.
#[derive(Debug, Clone)]
pub enum Event {
    /// A loop has started.
    LoopStart {
        stage: Stage,
        max_attempts: u32,
    },
    /// A generated payload has been checked.
    AttemptValidated {
        stage: Stage,
        /// 1-indexed generation call number.
        attempt: u32,
        is_valid: bool,
        error_count: usize,
        warning_count: usize,
    },
    /// A repair request is about to be sent.
    RepairStart {
        stage: Stage,
        /// Number of the generation call being made.
        attempt: u32,
        /// Formatted issue lines sent to the model.
        issues: Vec<String>,
    },
    /// The provider reported a failed generation call.
    TransportFailure {
        stage: Stage,
        attempt: u32,
        error: String,
    },
    /// A loop has finished.
    LoopEnd {
        stage: Stage,
        success: bool,
        attempts: u32,
    },
    /// A transport-level retry due to an HTTP or connection error.
    TransportRetry {
        /// Provider name.
        provider: &'static str,
        /// The retry attempt number (1-indexed).
        attempt: u32,
        /// Delay before this retry attempt in milliseconds.
        delay_ms: u64,
        /// Reason for the retry (error description).
        reason: String,
    },
}

/// Handler for repair loop events.
///
/// # Example
///
/// ```
/// use crm_triage::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::AttemptValidated { attempt, is_valid, .. } => {
///                 println!("attempt {attempt}: valid={is_valid}")
///             }
///             Event::LoopEnd { success, .. } => println!("done ok={success}"),
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// ```
/// use crm_triage::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::RepairStart { issues, .. } = event {
///         eprintln!("repairing {} issue(s)", issues.len());
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}
