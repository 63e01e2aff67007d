use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

const DEFAULT_FILTER: &str = "docx_service=info,docx_from_html=info,html_prep=info";

/// Installs the global subscriber. Reads `DOCX_SERVICE_LOG`
/// (e.g. `docx_service=debug,html_prep=trace`); safe to call more than once.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("DOCX_SERVICE_LOG")
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .init();
    });
}
