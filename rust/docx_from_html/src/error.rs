/// Errors produced while building a DOCX package.
#[derive(Debug, thiserror::Error)]
pub enum DocxError {
    #[error("no content produced from input")]
    Empty,

    #[error("image error: {0}")]
    Image(String),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
