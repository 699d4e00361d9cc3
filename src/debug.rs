//! Peripheral debug-reporter hook.
//!
//! When a [`Task`](crate::task::Task)'s last handle is dropped without
//! anyone ever having observed a stored exception, that exception must not
//! be silently swallowed.

use std::error::Error as StdError;
use std::sync::OnceLock;

/// Receives exceptions that were stored in a future's result cell but never
/// observed by any caller before the future was destroyed.
pub trait DebugReporter: Send + Sync + 'static {
    fn report_unobserved_exception(&self, err: &(dyn StdError + 'static));
}

struct TracingReporter;

impl DebugReporter for TracingReporter {
    fn report_unobserved_exception(&self, err: &(dyn StdError + 'static)) {
        tracing::warn!(error = %err, "unobserved exception dropped with its task future");
    }
}

static REPORTER: OnceLock<Box<dyn DebugReporter>> = OnceLock::new();

/// Installs a custom reporter. Only the first call takes effect, matching
/// the one-dispatcher-per-process-default style of other global installs in
/// this crate (see [`Dispatcher::install`](crate::dispatcher::Dispatcher::install)).
pub fn install_reporter(reporter: Box<dyn DebugReporter>) {
    let _ = REPORTER.set(reporter);
}

pub(crate) fn report_unobserved(err: &(dyn StdError + 'static)) {
    REPORTER
        .get_or_init(|| Box::new(TracingReporter))
        .report_unobserved_exception(err);
}
