mod diagnostics;
mod health;
mod metrics;
mod weather;

pub use diagnostics::diagnostics_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use weather::{not_found_handler, proxy_handler};
