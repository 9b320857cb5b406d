//! Error reporting funnel.
//!
//! Every failure of a cached fetch goes through [`ErrorReporter::report`],
//! which turns it into one message, surfaces it globally unless silenced,
//! and hands it to the caller's callback.

use std::fmt;
use std::sync::Arc;

use assist_core::FetchError;
use tracing::{debug, error};

use crate::bus::{AssistEvent, EventBus};

/// Callback receiving the normalized error message.
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// How a single error should be reported.
#[derive(Clone, Default)]
pub struct ErrorOptions {
    /// Skip the global error surface (log + bus). The callback still runs.
    pub silence: bool,
    pub callback: Option<ErrorCallback>,
}

impl ErrorOptions {
    pub fn silenced() -> Self {
        Self {
            silence: true,
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for ErrorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorOptions")
            .field("silence", &self.silence)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Normalizes and publishes errors.
#[derive(Debug, Clone, Default)]
pub struct ErrorReporter {
    bus: Option<EventBus>,
}

impl ErrorReporter {
    /// A reporter that only logs.
    pub fn new() -> Self {
        Self::default()
    }

    /// A reporter that also publishes [`AssistEvent::ErrorReported`].
    pub fn with_bus(bus: EventBus) -> Self {
        Self { bus: Some(bus) }
    }

    /// Reports `error`, returning the message handed to the callback.
    ///
    /// Aborts and cached-only misses are swallowed and return `None`.
    pub fn report(&self, error: &FetchError, options: &ErrorOptions) -> Option<String> {
        if !error.is_reportable() {
            debug!(error = %error, "Swallowing non reportable error");
            return None;
        }

        let message = error.message();
        if !options.silence {
            error!(status = ?error.status(), "{}", message);
            if let Some(bus) = &self.bus {
                bus.publish(AssistEvent::ErrorReported {
                    message: message.clone(),
                });
            }
        }

        if let Some(callback) = &options.callback {
            callback(&message);
        }
        Some(message)
    }
}
