use std::collections::BTreeMap;

use crate::media::{ImageData, TEXT_HEIGHT_EMU, TEXT_WIDTH_EMU};
use crate::model::{Block, Paragraph, RunStyle, Segment, Table};

/// 6.5in in twentieths of a point.
const TEXT_WIDTH_TWIPS: usize = 9360;

pub fn xml_escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Border line for `w:tblBorders`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorderSpec {
    /// Hex RGB without `#`.
    pub color: String,
    /// Eighths of a point.
    pub size: u32,
}

impl Default for BorderSpec {
    fn default() -> Self {
        Self {
            color: "D9D9D9".to_string(),
            size: 4,
        }
    }
}

impl BorderSpec {
    /// Accepts `#RRGGBB` or `RRGGBB`.
    pub fn with_color(color: &str) -> Option<Self> {
        let hex = color.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self {
            color: hex.to_ascii_uppercase(),
            ..Self::default()
        })
    }
}

/// A picture referenced from `document.xml`, written to `word/media/`.
pub struct MediaPart<'a> {
    pub rid: String,
    pub name: String,
    pub image: &'a ImageData,
}

/// Word bookmark name for an HTML `id`: letters, digits and `_`, starting
/// with a letter, at most 40 characters.
pub fn bookmark_name(id: &str) -> String {
    let mut out: String = id
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if !out.chars().next().is_some_and(|c| c.is_alphabetic()) {
        out.insert(0, 'h');
    }
    out.chars().take(40).collect()
}

/// State threaded through body serialization: hyperlink ids in, media out.
pub struct XmlCtx<'a> {
    pub link_to_rid: BTreeMap<String, String>,
    pub media: Vec<MediaPart<'a>>,
    pub borders: Option<BorderSpec>,
    bookmarks: u32,
}

impl<'a> XmlCtx<'a> {
    pub fn new(link_to_rid: BTreeMap<String, String>, borders: Option<BorderSpec>) -> Self {
        Self {
            link_to_rid,
            media: Vec::new(),
            borders,
            bookmarks: 0,
        }
    }

    fn add_image(&mut self, image: &'a ImageData) -> (String, usize) {
        let n = self.media.len() + 1;
        let rid = format!("rIdImg{n}");
        self.media.push(MediaPart {
            rid: rid.clone(),
            name: format!("image{n}.{}", image.extension()),
            image,
        });
        (rid, n)
    }

    pub fn image_paragraph_xml(
        &mut self,
        image: &'a ImageData,
        alt: &str,
        max_width: u64,
        max_height: u64,
    ) -> String {
        let (rid, n) = self.add_image(image);
        let (cx, cy) = image.extent_emu(max_width, max_height);
        let descr = xml_escape_text(alt);
        format!(
            concat!(
                r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:drawing>"#,
                r#"<wp:inline distT="0" distB="0" distL="0" distR="0">"#,
                r#"<wp:extent cx="{cx}" cy="{cy}"/>"#,
                r#"<wp:docPr id="{n}" name="Picture {n}" descr="{descr}"/>"#,
                r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
                r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
                r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
                r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
                r#"<pic:nvPicPr><pic:cNvPr id="{n}" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
                r#"<pic:blipFill><a:blip r:embed="{rid}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
                r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
                r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
                r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#,
            ),
            cx = cx,
            cy = cy,
            n = n,
            descr = descr,
            name = format!("image{n}.{}", image.extension()),
            rid = rid,
        )
    }

    pub fn paragraph_xml(&mut self, p: &Paragraph) -> String {
        let mut out = String::new();
        out.push_str("<w:p>");

        let style_id = p.style.style_id();
        if style_id.is_some() || p.list.is_some() {
            out.push_str("<w:pPr>");
            if let Some(id) = style_id {
                out.push_str(&format!("<w:pStyle w:val=\"{id}\"/>"));
            }
            if let Some(li) = p.list {
                out.push_str("<w:numPr>");
                out.push_str(&format!("<w:ilvl w:val=\"{}\"/>", li.ilvl));
                out.push_str(&format!("<w:numId w:val=\"{}\"/>", li.num_id));
                out.push_str("</w:numPr>");
            }
            out.push_str("</w:pPr>");
        }
        if let Some(id) = &p.bookmark {
            let n = self.bookmarks;
            self.bookmarks += 1;
            out.push_str(&format!(
                "<w:bookmarkStart w:id=\"{n}\" w:name=\"{}\"/><w:bookmarkEnd w:id=\"{n}\"/>",
                xml_escape_text(&bookmark_name(id))
            ));
        }

        let mut in_link: Option<(String, RunStyle, String)> = None;
        let flush_link = |out: &mut String, st: &mut Option<(String, RunStyle, String)>| {
            if let Some((buf, style, href)) = st.take() {
                if buf.is_empty() {
                    return;
                }
                if let Some(fragment) = href.strip_prefix('#').filter(|f| !f.is_empty()) {
                    out.push_str(&format!(
                        "<w:hyperlink w:anchor=\"{}\" w:history=\"1\">",
                        xml_escape_text(&bookmark_name(fragment))
                    ));
                    out.push_str(&run_xml(&buf, style, true));
                    out.push_str("</w:hyperlink>");
                } else if let Some(rid) = self.link_to_rid.get(&href) {
                    out.push_str(&format!("<w:hyperlink r:id=\"{rid}\" w:history=\"1\">"));
                    out.push_str(&run_xml(&buf, style, true));
                    out.push_str("</w:hyperlink>");
                } else {
                    out.push_str(&run_xml(&buf, style, false));
                }
            }
        };

        for seg in &p.segments {
            match seg {
                Segment::Break => {
                    flush_link(&mut out, &mut in_link);
                    out.push_str("<w:r><w:br/></w:r>");
                }
                Segment::Text { text, style } => {
                    flush_link(&mut out, &mut in_link);
                    out.push_str(&run_xml(text, *style, false));
                }
                Segment::LinkText { text, style, href } => match &mut in_link {
                    Some((buf, cur_style, cur_href)) if cur_href == href && *cur_style == *style => {
                        buf.push_str(text);
                    }
                    _ => {
                        flush_link(&mut out, &mut in_link);
                        in_link = Some((text.clone(), *style, href.clone()));
                    }
                },
            }
        }
        flush_link(&mut out, &mut in_link);

        out.push_str("</w:p>");
        out
    }

    fn borders_xml(&self) -> String {
        let (val, size, color) = match &self.borders {
            Some(b) => ("single", b.size, b.color.as_str()),
            None => ("none", 0, "auto"),
        };
        let mut out = String::from("<w:tblBorders>");
        for side in ["top", "left", "bottom", "right", "insideH", "insideV"] {
            out.push_str(&format!(
                "<w:{side} w:val=\"{val}\" w:sz=\"{size}\" w:space=\"0\" w:color=\"{color}\"/>"
            ));
        }
        out.push_str("</w:tblBorders>");
        out
    }

    pub fn table_xml(&mut self, t: &'a Table) -> String {
        let columns = t.columns.max(1);
        let col_twips = TEXT_WIDTH_TWIPS / columns;
        let col_emu = TEXT_WIDTH_EMU / columns as u64;

        let mut out = String::new();
        out.push_str("<w:tbl>");
        out.push_str("<w:tblPr>");
        out.push_str("<w:tblW w:w=\"5000\" w:type=\"pct\"/>");
        out.push_str(&self.borders_xml());
        out.push_str("<w:tblCellMar><w:left w:w=\"108\" w:type=\"dxa\"/><w:right w:w=\"108\" w:type=\"dxa\"/></w:tblCellMar>");
        out.push_str("</w:tblPr>");

        out.push_str("<w:tblGrid>");
        for _ in 0..columns {
            out.push_str(&format!("<w:gridCol w:w=\"{col_twips}\"/>"));
        }
        out.push_str("</w:tblGrid>");

        for row in &t.rows {
            out.push_str("<w:tr>");
            if row.header {
                out.push_str("<w:trPr><w:tblHeader/></w:trPr>");
            }
            for cell in &row.cells {
                let span = cell.span.max(1);
                out.push_str("<w:tc><w:tcPr>");
                out.push_str(&format!(
                    "<w:tcW w:w=\"{}\" w:type=\"dxa\"/>",
                    col_twips * span as usize
                ));
                if span > 1 {
                    out.push_str(&format!("<w:gridSpan w:val=\"{span}\"/>"));
                }
                out.push_str("</w:tcPr>");
                let body = self.blocks_xml(&cell.blocks, col_emu * u64::from(span));
                // A cell must end with a paragraph.
                let ends_with_p = body.ends_with("</w:p>");
                out.push_str(&body);
                if !ends_with_p {
                    out.push_str("<w:p/>");
                }
                out.push_str("</w:tc>");
            }
            out.push_str("</w:tr>");
        }

        out.push_str("</w:tbl>");
        out
    }

    pub fn blocks_xml(&mut self, blocks: &'a [Block], max_image_width: u64) -> String {
        let mut body = String::new();
        for b in blocks {
            match b {
                Block::Paragraph(p) => body.push_str(&self.paragraph_xml(p)),
                Block::Table(t) => body.push_str(&self.table_xml(t)),
                Block::Image(img) => body.push_str(&self.image_paragraph_xml(
                    &img.image,
                    &img.alt,
                    max_image_width,
                    TEXT_HEIGHT_EMU,
                )),
            }
        }
        body
    }
}

fn run_xml(text: &str, style: RunStyle, link: bool) -> String {
    if text.is_empty() {
        return String::new();
    }
    let escaped = xml_escape_text(text);
    let mut out = String::new();
    out.push_str("<w:r>");
    if link || !style.is_plain() {
        out.push_str("<w:rPr>");
        if link {
            out.push_str("<w:rStyle w:val=\"Hyperlink\"/>");
        }
        if style.code {
            out.push_str("<w:rFonts w:ascii=\"Consolas\" w:hAnsi=\"Consolas\" w:cs=\"Consolas\"/>");
        }
        if style.bold {
            out.push_str("<w:b/>");
        }
        if style.italic {
            out.push_str("<w:i/>");
        }
        if style.strike {
            out.push_str("<w:strike/>");
        }
        if style.underline {
            out.push_str("<w:u w:val=\"single\"/>");
        }
        out.push_str("</w:rPr>");
    }
    out.push_str("<w:t xml:space=\"preserve\">");
    out.push_str(&escaped);
    out.push_str("</w:t></w:r>");
    out
}

pub fn page_break_xml() -> &'static str {
    "<w:p><w:r><w:br w:type=\"page\"/></w:r></w:p>"
}

pub fn toc_xml(title: &str) -> String {
    let mut out = String::new();
    out.push_str("<w:p><w:pPr><w:pStyle w:val=\"TOCHeading\"/></w:pPr>");
    out.push_str(&run_xml(title, RunStyle::default(), false));
    out.push_str("</w:p>");
    out.push_str("<w:p>");
    out.push_str("<w:r><w:fldChar w:fldCharType=\"begin\" w:dirty=\"true\"/></w:r>");
    out.push_str("<w:r><w:instrText xml:space=\"preserve\"> TOC \\o \"1-3\" \\h \\z \\u </w:instrText></w:r>");
    out.push_str("<w:r><w:fldChar w:fldCharType=\"separate\"/></w:r>");
    out.push_str(&run_xml(
        "Update the field to build the table of contents.",
        RunStyle {
            italic: true,
            ..RunStyle::default()
        },
        false,
    ));
    out.push_str("<w:r><w:fldChar w:fldCharType=\"end\"/></w:r>");
    out.push_str("</w:p>");
    out
}

pub fn document_xml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:wpc="http://schemas.microsoft.com/office/word/2010/wordprocessingCanvas"
 xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006"
 xmlns:o="urn:schemas-microsoft-com:office:office"
 xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"
 xmlns:m="http://schemas.openxmlformats.org/officeDocument/2006/math"
 xmlns:v="urn:schemas-microsoft-com:vml"
 xmlns:wp14="http://schemas.microsoft.com/office/word/2010/wordprocessingDrawing"
 xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"
 xmlns:w10="urn:schemas-microsoft-com:office:word"
 xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"
 xmlns:w14="http://schemas.microsoft.com/office/word/2010/wordprocessingml"
 xmlns:w15="http://schemas.microsoft.com/office/word/2012/wordprocessingml"
 xmlns:wpg="http://schemas.microsoft.com/office/word/2010/wordprocessingGroup"
 xmlns:wpi="http://schemas.microsoft.com/office/word/2010/wordprocessingInk"
 xmlns:wne="http://schemas.microsoft.com/office/word/2006/wordml"
 xmlns:wps="http://schemas.microsoft.com/office/word/2010/wordprocessingShape"
 mc:Ignorable="w14 w15 wp14">
  <w:body>
    {body}
    <w:sectPr>
      <w:pgSz w:w="12240" w:h="15840"/>
      <w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/>
      <w:cols w:space="708"/>
      <w:docGrid w:linePitch="360"/>
    </w:sectPr>
  </w:body>
</w:document>"#
    )
}
