use crate::media::ImageData;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
    pub code: bool,
}

impl RunStyle {
    pub fn is_plain(&self) -> bool {
        *self == RunStyle::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text { text: String, style: RunStyle },
    LinkText { text: String, style: RunStyle, href: String },
    Break,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParagraphStyle {
    Normal,
    Heading(u8),
    CodeBlock,
    Quote,
}

impl ParagraphStyle {
    pub fn style_id(&self) -> Option<String> {
        match self {
            ParagraphStyle::Normal => None,
            ParagraphStyle::Heading(level) => Some(format!("Heading{}", (*level).clamp(1, 6))),
            ParagraphStyle::CodeBlock => Some("CodeBlock".to_string()),
            ParagraphStyle::Quote => Some("Quote".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListInfo {
    pub num_id: u32, // 1 = bullet, 2 = decimal
    pub ilvl: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    pub style: ParagraphStyle,
    pub list: Option<ListInfo>,
    /// Target name for in-document links, taken from the element `id`.
    pub bookmark: Option<String>,
    pub segments: Vec<Segment>,
}

impl Paragraph {
    pub fn new(style: ParagraphStyle) -> Self {
        Self {
            style,
            list: None,
            bookmark: None,
            segments: Vec::new(),
        }
    }

    pub fn has_content(&self) -> bool {
        self.segments.iter().any(|s| match s {
            Segment::Text { text, .. } => !text.trim().is_empty(),
            Segment::LinkText { text, .. } => !text.trim().is_empty(),
            Segment::Break => true,
        })
    }

    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for s in &self.segments {
            match s {
                Segment::Text { text, .. } | Segment::LinkText { text, .. } => out.push_str(text),
                Segment::Break => out.push('\n'),
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct ImageBlock {
    pub image: ImageData,
    pub alt: String,
}

#[derive(Debug, Clone)]
pub struct TableCell {
    pub blocks: Vec<Block>,
    pub span: u32,
    pub header: bool,
}

#[derive(Debug, Clone)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
    pub header: bool,
}

#[derive(Debug, Clone)]
pub struct Table {
    pub rows: Vec<TableRow>,
    pub columns: usize,
}

#[derive(Debug, Clone)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
    Image(ImageBlock),
}

/// Visits every paragraph, table cells included.
pub fn for_each_paragraph<'a>(blocks: &'a [Block], f: &mut impl FnMut(&'a Paragraph)) {
    for b in blocks {
        match b {
            Block::Paragraph(p) => f(p),
            Block::Table(t) => {
                for row in &t.rows {
                    for cell in &row.cells {
                        for_each_paragraph(&cell.blocks, f);
                    }
                }
            }
            Block::Image(_) => {}
        }
    }
}
