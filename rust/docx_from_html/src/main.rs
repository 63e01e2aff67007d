use anyhow::{anyhow, Context, Result};
use clap::Parser;
use docx_from_html::{html_to_docx, BorderSpec, DocxError, DocxOptions, ImageData};
use html_prep::{prepare_html, prepare_markdown, PrepOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input HTML file (a full document or a fragment).
    #[arg(long, conflicts_with = "markdown_file", required_unless_present = "markdown_file")]
    html_file: Option<PathBuf>,

    /// Input Markdown file.
    #[arg(long)]
    markdown_file: Option<PathBuf>,

    /// Output .docx path.
    #[arg(long)]
    out: PathBuf,

    /// Document title metadata (optional).
    #[arg(long)]
    title: Option<String>,

    /// Insert a table of contents field after the cover.
    #[arg(long)]
    toc: bool,

    /// Cover image (PNG, JPEG or GIF) placed on its own first page.
    #[arg(long)]
    cover: Option<PathBuf>,

    /// Write tables without borders.
    #[arg(long)]
    no_borders: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("DOCX_FROM_HTML_LOG")
                .unwrap_or_else(|_| EnvFilter::new("docx_from_html=warn,html_prep=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let prep = PrepOptions {
        table_style: (!args.no_borders).then(Default::default),
        ..PrepOptions::default()
    };
    let prepared = match (&args.html_file, &args.markdown_file) {
        (Some(path), _) => {
            let html = std::fs::read_to_string(path)
                .with_context(|| format!("read {}", path.display()))?;
            prepare_html(&html, &prep)
        }
        (None, Some(path)) => {
            let md = std::fs::read_to_string(path)
                .with_context(|| format!("read {}", path.display()))?;
            prepare_markdown(&md, &prep)
        }
        (None, None) => return Err(anyhow!("either --html-file or --markdown-file is required")),
    };

    let cover = match &args.cover {
        Some(path) => {
            let bytes =
                std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
            Some(ImageData::from_bytes(bytes).with_context(|| format!("decode {}", path.display()))?)
        }
        None => None,
    };

    let opts = DocxOptions {
        title: args.title.clone(),
        toc: args.toc,
        cover,
        table_borders: (!args.no_borders).then(BorderSpec::default),
        ..DocxOptions::default()
    };

    let bytes = match html_to_docx(&prepared.nodes, &opts) {
        Err(DocxError::Empty) => return Err(anyhow!("no paragraphs produced from input")),
        other => other.context("write docx package")?,
    };

    if let Some(parent) = args.out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
    }
    std::fs::write(&args.out, &bytes)
        .with_context(|| format!("write {}", args.out.display()))?;

    tracing::info!(out = %args.out.display(), bytes = bytes.len(), "wrote docx");
    Ok(())
}
