use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Write};

use html_prep::Node;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::build::build_blocks;
use crate::error::DocxError;
use crate::media::{ImageData, TEXT_HEIGHT_EMU, TEXT_WIDTH_EMU};
use crate::model::{for_each_paragraph, Block, Segment};
use crate::xml::{
    document_xml, page_break_xml, toc_xml, xml_escape_text, BorderSpec, MediaPart, XmlCtx,
};

const CREATOR: &str = "docx_from_html";

#[derive(Debug, Clone)]
pub struct DocxOptions {
    pub title: Option<String>,
    pub toc: bool,
    pub toc_title: String,
    pub cover: Option<ImageData>,
    /// `None` writes tables without borders.
    pub table_borders: Option<BorderSpec>,
}

impl Default for DocxOptions {
    fn default() -> Self {
        Self {
            title: None,
            toc: false,
            toc_title: "Contents".to_string(),
            cover: None,
            table_borders: Some(BorderSpec::default()),
        }
    }
}

fn content_types_xml(has_numbering: bool, media: &[MediaPart<'_>]) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
    out.push('\n');
    out.push_str(
        r#"  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    );
    out.push('\n');
    out.push_str(r#"  <Default Extension="xml" ContentType="application/xml"/>"#);
    out.push('\n');
    let extensions: BTreeMap<&str, &str> = media
        .iter()
        .map(|m| (m.image.extension(), m.image.content_type()))
        .collect();
    for (ext, ct) in extensions {
        out.push_str(&format!(
            r#"  <Default Extension="{ext}" ContentType="{ct}"/>"#
        ));
        out.push('\n');
    }
    out.push_str(r#"  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#);
    out.push('\n');
    out.push_str(r#"  <Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>"#);
    out.push('\n');
    out.push_str(r#"  <Override PartName="/word/settings.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml"/>"#);
    out.push('\n');
    if has_numbering {
        out.push_str(r#"  <Override PartName="/word/numbering.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml"/>"#);
        out.push('\n');
    }
    out.push_str(r#"  <Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>"#);
    out.push('\n');
    out.push_str(r#"  <Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>"#);
    out.push('\n');
    out.push_str("</Types>");
    out
}

fn rels_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>
</Relationships>"#
}

fn document_rels_xml(
    link_to_rid: &BTreeMap<String, String>,
    media: &[MediaPart<'_>],
    has_numbering: bool,
) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#);
    out.push('\n');
    out.push_str(r#"  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#);
    out.push('\n');
    out.push_str(r#"  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/settings" Target="settings.xml"/>"#);
    out.push('\n');
    if has_numbering {
        out.push_str(r#"  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering" Target="numbering.xml"/>"#);
        out.push('\n');
    }
    for (href, rid) in link_to_rid {
        out.push_str(&format!(
            r#"  <Relationship Id="{rid}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="{href}" TargetMode="External"/>"#,
            rid = rid,
            href = xml_escape_text(href),
        ));
        out.push('\n');
    }
    for m in media {
        out.push_str(&format!(
            r#"  <Relationship Id="{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/{}"/>"#,
            m.rid, m.name
        ));
        out.push('\n');
    }
    out.push_str("</Relationships>");
    out
}

fn heading_style_xml(level: u8) -> String {
    let size = match level {
        1 => 32,
        2 => 28,
        3 => 26,
        4 => 24,
        _ => 22,
    };
    let before = if level <= 2 { 360 } else { 240 };
    format!(
        r#"  <w:style w:type="paragraph" w:styleId="Heading{level}">
    <w:name w:val="heading {level}"/>
    <w:basedOn w:val="Normal"/>
    <w:next w:val="Normal"/>
    <w:uiPriority w:val="9"/>
    <w:qFormat/>
    <w:pPr>
      <w:keepNext/>
      <w:spacing w:before="{before}" w:after="120"/>
      <w:outlineLvl w:val="{outline}"/>
    </w:pPr>
    <w:rPr>
      <w:b/>
      <w:sz w:val="{size}"/>
    </w:rPr>
  </w:style>
"#,
        outline = level - 1,
    )
}

fn styles_xml() -> String {
    let mut out = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:docDefaults>
    <w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri" w:cs="Calibri"/><w:sz w:val="22"/></w:rPr></w:rPrDefault>
    <w:pPrDefault><w:pPr><w:spacing w:after="120" w:line="264" w:lineRule="auto"/></w:pPr></w:pPrDefault>
  </w:docDefaults>
  <w:style w:type="paragraph" w:default="1" w:styleId="Normal">
    <w:name w:val="Normal"/>
    <w:qFormat/>
  </w:style>
"#,
    );
    for level in 1..=6u8 {
        out.push_str(&heading_style_xml(level));
    }
    out.push_str(
        r#"  <w:style w:type="paragraph" w:styleId="CodeBlock">
    <w:name w:val="Code Block"/>
    <w:basedOn w:val="Normal"/>
    <w:uiPriority w:val="99"/>
    <w:qFormat/>
    <w:pPr>
      <w:shd w:val="clear" w:color="auto" w:fill="F6F8FA"/>
      <w:spacing w:before="120" w:after="120" w:line="240" w:lineRule="auto"/>
    </w:pPr>
    <w:rPr>
      <w:rFonts w:ascii="Consolas" w:hAnsi="Consolas" w:cs="Consolas"/>
      <w:sz w:val="20"/>
    </w:rPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="Quote">
    <w:name w:val="Quote"/>
    <w:basedOn w:val="Normal"/>
    <w:uiPriority w:val="29"/>
    <w:qFormat/>
    <w:pPr>
      <w:pBdr><w:left w:val="single" w:sz="18" w:space="8" w:color="D0D7DE"/></w:pBdr>
      <w:ind w:left="360"/>
    </w:pPr>
    <w:rPr>
      <w:i/>
      <w:color w:val="595959"/>
    </w:rPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="TOCHeading">
    <w:name w:val="TOC Heading"/>
    <w:basedOn w:val="Normal"/>
    <w:next w:val="Normal"/>
    <w:uiPriority w:val="39"/>
    <w:pPr>
      <w:keepNext/>
      <w:spacing w:before="240" w:after="120"/>
    </w:pPr>
    <w:rPr>
      <w:b/>
      <w:sz w:val="32"/>
    </w:rPr>
  </w:style>
  <w:style w:type="character" w:styleId="Hyperlink">
    <w:name w:val="Hyperlink"/>
    <w:uiPriority w:val="99"/>
    <w:rPr>
      <w:color w:val="0563C1"/>
      <w:u w:val="single"/>
    </w:rPr>
  </w:style>
</w:styles>"#,
    );
    out
}

fn numbering_xml() -> String {
    let mut out = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:numbering xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
"#,
    );
    for (id, fmt) in [(1, "bullet"), (2, "decimal")] {
        out.push_str(&format!("  <w:abstractNum w:abstractNumId=\"{id}\">\n"));
        out.push_str("    <w:multiLevelType w:val=\"hybridMultilevel\"/>\n");
        for ilvl in 0..=8u32 {
            let text = if fmt == "bullet" {
                "•".to_string()
            } else {
                format!("%{}.", ilvl + 1)
            };
            out.push_str(&format!(
                "    <w:lvl w:ilvl=\"{ilvl}\"><w:start w:val=\"1\"/><w:numFmt w:val=\"{fmt}\"/><w:lvlText w:val=\"{text}\"/><w:lvlJc w:val=\"left\"/><w:pPr><w:ind w:left=\"{left}\" w:hanging=\"360\"/></w:pPr></w:lvl>\n",
                left = 720 * (ilvl + 1),
            ));
        }
        out.push_str("  </w:abstractNum>\n");
    }
    out.push_str("  <w:num w:numId=\"1\"><w:abstractNumId w:val=\"1\"/></w:num>\n");
    out.push_str("  <w:num w:numId=\"2\"><w:abstractNumId w:val=\"2\"/></w:num>\n");
    out.push_str("</w:numbering>");
    out
}

fn settings_xml(update_fields: bool) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(r#"<w:settings xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#);
    out.push_str(r#"<w:defaultTabStop w:val="720"/>"#);
    if update_fields {
        out.push_str(r#"<w:updateFields w:val="true"/>"#);
    }
    out.push_str(r#"<w:compat><w:compatSetting w:name="compatibilityMode" w:uri="http://schemas.microsoft.com/office/word" w:val="15"/></w:compat>"#);
    out.push_str("</w:settings>");
    out
}

fn core_xml(title: Option<&str>) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#);
    if let Some(t) = title.map(str::trim).filter(|t| !t.is_empty()) {
        out.push_str(&format!("<dc:title>{}</dc:title>", xml_escape_text(t)));
    }
    out.push_str(&format!("<dc:creator>{CREATOR}</dc:creator>"));
    out.push_str("</cp:coreProperties>");
    out
}

fn app_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties"><Application>{CREATOR}</Application></Properties>"#
    )
}

fn gather_hrefs(blocks: &[Block]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for_each_paragraph(blocks, &mut |p| {
        for s in &p.segments {
            if let Segment::LinkText { href, .. } = s {
                if !href.starts_with('#') {
                    out.insert(href.to_string());
                }
            }
        }
    });
    out
}

fn blocks_need_numbering(blocks: &[Block]) -> bool {
    let mut found = false;
    for_each_paragraph(blocks, &mut |p| found |= p.list.is_some());
    found
}

/// Writes a complete package for already-built blocks.
pub fn blocks_to_docx(blocks: &[Block], opts: &DocxOptions) -> Result<Vec<u8>, DocxError> {
    if blocks.is_empty() {
        return Err(DocxError::Empty);
    }

    let mut link_to_rid = BTreeMap::new();
    for (i, href) in gather_hrefs(blocks).into_iter().enumerate() {
        link_to_rid.insert(href, format!("rId{}", 10 + i));
    }
    let has_numbering = blocks_need_numbering(blocks);

    let mut ctx = XmlCtx::new(link_to_rid, opts.table_borders.clone());
    let mut body = String::new();
    if let Some(cover) = &opts.cover {
        // Leave room for the page break paragraph below the picture.
        body.push_str(&ctx.image_paragraph_xml(
            cover,
            "cover",
            TEXT_WIDTH_EMU,
            TEXT_HEIGHT_EMU - 457_200,
        ));
        body.push_str(page_break_xml());
    }
    if opts.toc {
        body.push_str(&toc_xml(&opts.toc_title));
    }
    body.push_str(&ctx.blocks_xml(blocks, TEXT_WIDTH_EMU));
    let document = document_xml(&body);

    tracing::debug!(
        blocks = blocks.len(),
        links = ctx.link_to_rid.len(),
        images = ctx.media.len(),
        numbering = has_numbering,
        toc = opts.toc,
        "writing docx package"
    );

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opt = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", opt)?;
    zip.write_all(content_types_xml(has_numbering, &ctx.media).as_bytes())?;

    zip.start_file("_rels/.rels", opt)?;
    zip.write_all(rels_xml().as_bytes())?;

    zip.start_file("docProps/core.xml", opt)?;
    zip.write_all(core_xml(opts.title.as_deref()).as_bytes())?;

    zip.start_file("docProps/app.xml", opt)?;
    zip.write_all(app_xml().as_bytes())?;

    zip.start_file("word/document.xml", opt)?;
    zip.write_all(document.as_bytes())?;

    zip.start_file("word/styles.xml", opt)?;
    zip.write_all(styles_xml().as_bytes())?;

    zip.start_file("word/settings.xml", opt)?;
    zip.write_all(settings_xml(opts.toc).as_bytes())?;

    if has_numbering {
        zip.start_file("word/numbering.xml", opt)?;
        zip.write_all(numbering_xml().as_bytes())?;
    }

    zip.start_file("word/_rels/document.xml.rels", opt)?;
    zip.write_all(document_rels_xml(&ctx.link_to_rid, &ctx.media, has_numbering).as_bytes())?;

    // Already-compressed formats gain nothing from deflate.
    let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for m in &ctx.media {
        zip.start_file(format!("word/media/{}", m.name), stored)?;
        zip.write_all(&m.image.bytes)?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Lowers a prepared tree and writes it as a `.docx`.
pub fn html_to_docx(nodes: &[Node], opts: &DocxOptions) -> Result<Vec<u8>, DocxError> {
    let blocks = build_blocks(nodes);
    blocks_to_docx(&blocks, opts)
}
