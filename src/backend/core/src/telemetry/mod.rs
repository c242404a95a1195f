//! Telemetry: structured logging.
//!
//! Metrics are recorded through the `metrics` facade at the call sites
//! (`cache_*_total`, `authz_decisions_total`, `warden_errors_total`); the
//! embedding application decides which recorder to install.

pub mod logging;

pub use logging::{init_logging, LogFormat, LoggingConfig};
