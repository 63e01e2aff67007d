//! Minimal WordprocessingML writer for prepared HTML.
//!
//! The tree produced by `html_prep` is lowered into paragraphs, tables and
//! pictures, then packaged as a `.docx` with styles, numbering, hyperlinks,
//! an optional cover page and an optional TOC field.

pub mod build;
pub mod error;
pub mod media;
pub mod model;
pub mod package;
pub mod xml;

pub use build::build_blocks;
pub use error::DocxError;
pub use media::ImageData;
pub use model::Block;
pub use package::{blocks_to_docx, html_to_docx, DocxOptions};
pub use xml::BorderSpec;
