//! Markdown/HTML preparation for document export.
//!
//! Input is parsed into an owned tree, stripped of editor noise (empty
//! paragraphs around block elements, stray breaks after tables), its tables
//! enriched with sections, column groups and borders, and its headings given
//! anchors. The result feeds both the DOCX writer and the styled HTML page.

pub mod cleanup;
pub mod dom;
pub mod markdown;
pub mod page;
pub mod tables;
pub mod toc;

pub use cleanup::clean_tree;
pub use dom::{parse_fragment, serialize, Element, Node};
pub use markdown::markdown_to_html_string;
pub use page::{render_page, PageOptions};
pub use tables::{enrich_tables, TableStyle};
pub use toc::{collect_headings, render_toc, Heading};

#[derive(Clone, Debug)]
pub struct PrepOptions {
    /// `None` leaves tables as they came in.
    pub table_style: Option<TableStyle>,
    /// Deepest heading level that gets an anchor and a TOC entry.
    pub toc_depth: u8,
}

impl Default for PrepOptions {
    fn default() -> Self {
        Self {
            table_style: Some(TableStyle::default()),
            toc_depth: 3,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Prepared {
    pub nodes: Vec<Node>,
    pub html: String,
    pub headings: Vec<Heading>,
}

pub fn prepare_html(input_html: &str, opts: &PrepOptions) -> Prepared {
    let mut nodes = parse_fragment(input_html);
    clean_tree(&mut nodes);
    if let Some(style) = &opts.table_style {
        enrich_tables(&mut nodes, style);
    }
    let headings = collect_headings(&mut nodes, opts.toc_depth.clamp(1, 6));
    let html = serialize(&nodes);
    tracing::debug!(
        input_len = input_html.len(),
        output_len = html.len(),
        headings = headings.len(),
        "prepared html"
    );
    Prepared {
        nodes,
        html,
        headings,
    }
}

pub fn prepare_markdown(md: &str, opts: &PrepOptions) -> Prepared {
    prepare_html(&markdown_to_html_string(md), opts)
}
