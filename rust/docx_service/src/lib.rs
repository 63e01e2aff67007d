//! HTTP front end for the Markdown/HTML to DOCX pipeline.
//!
//! Requests are prepared with `html_prep` (cleanup, table enrichment,
//! heading anchors) and written either by the in-process `docx_from_html`
//! writer or by an external `pandoc`.

pub mod config;
pub mod error;
pub mod filename;
pub mod logging;
pub mod pandoc;
pub mod routes;

pub use config::{Config, Engine};
pub use error::ServiceError;
pub use routes::{router, AppState};
