use html_prep::dom::{Element, Node};
use html_prep::tables::{colspan, column_count, row_cells};
use html_prep::toc::heading_level;

use crate::media::ImageData;
use crate::model::{
    Block, ImageBlock, ListInfo, Paragraph, ParagraphStyle, RunStyle, Segment, Table, TableCell,
    TableRow,
};

const MAX_LIST_LEVEL: u32 = 8;

pub fn sanitize_href(href: &str) -> Option<String> {
    let h = href.trim();
    if h.is_empty() {
        return None;
    }
    let low = h.to_ascii_lowercase();
    if low.starts_with("javascript:") || low.starts_with("data:") || low.starts_with("vbscript:") {
        return None;
    }
    Some(h.to_string())
}

fn collapse_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_ws = false;
    for ch in s.chars() {
        if ch.is_whitespace() && ch != '\u{a0}' {
            if !in_ws {
                out.push(' ');
                in_ws = true;
            }
        } else {
            out.push(ch);
            in_ws = false;
        }
    }
    out
}

#[derive(Clone, Default)]
struct BuildCtx {
    bold_depth: u32,
    italic_depth: u32,
    underline_depth: u32,
    strike_depth: u32,
    code_depth: u32,
    pre_depth: u32,
    quote_depth: u32,
    link_stack: Vec<Option<String>>,
    list_stack: Vec<u32>, // 1 bullet, 2 decimal
    li_list_stack: Vec<Option<ListInfo>>,
}

impl BuildCtx {
    fn current_href(&self) -> Option<&String> {
        self.link_stack.last().and_then(|x| x.as_ref())
    }

    fn current_list(&self) -> Option<ListInfo> {
        self.li_list_stack.last().cloned().unwrap_or(None)
    }

    fn run_style(&self) -> RunStyle {
        RunStyle {
            bold: self.bold_depth > 0,
            italic: self.italic_depth > 0,
            underline: self.underline_depth > 0,
            strike: self.strike_depth > 0,
            code: self.code_depth > 0 || self.pre_depth > 0,
        }
    }

    fn body_style(&self) -> ParagraphStyle {
        if self.quote_depth > 0 {
            ParagraphStyle::Quote
        } else {
            ParagraphStyle::Normal
        }
    }
}

fn flush_paragraph(blocks: &mut Vec<Block>, current: &mut Paragraph) {
    if current.has_content() {
        blocks.push(Block::Paragraph(current.clone()));
    }
    current.style = ParagraphStyle::Normal;
    current.list = None;
    current.bookmark = None;
    current.segments.clear();
}

fn start_paragraph(
    blocks: &mut Vec<Block>,
    current: &mut Paragraph,
    style: ParagraphStyle,
    list: Option<ListInfo>,
) {
    flush_paragraph(blocks, current);
    current.style = style;
    current.list = list;
}

fn emit_text(current: &mut Paragraph, ctx: &BuildCtx, raw: &str) {
    if raw.is_empty() {
        return;
    }

    let preserve_space = ctx.pre_depth > 0;
    let mut text = if preserve_space {
        raw.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        collapse_ws(&raw.replace("\r\n", "\n").replace('\r', "\n").replace('\n', " "))
    };

    if !preserve_space && current.segments.is_empty() {
        text = text.trim_start().to_string();
        if text.is_empty() {
            return;
        }
        if current.style == ParagraphStyle::Normal {
            current.style = ctx.body_style();
        }
    }

    let style = ctx.run_style();
    let push_text = |s: String, current: &mut Paragraph| {
        if let Some(href) = ctx.current_href() {
            current.segments.push(Segment::LinkText {
                text: s,
                style,
                href: href.to_string(),
            });
        } else {
            current.segments.push(Segment::Text { text: s, style });
        }
    };

    if preserve_space && text.contains('\n') {
        let mut first = true;
        for line in text.split('\n') {
            if !first {
                current.segments.push(Segment::Break);
            }
            first = false;
            if !line.is_empty() {
                push_text(line.to_string(), current);
            }
        }
        return;
    }

    if !text.is_empty() {
        push_text(text, current);
    }
}

fn embolden(blocks: &mut [Block]) {
    for b in blocks {
        if let Block::Paragraph(p) = b {
            for s in &mut p.segments {
                match s {
                    Segment::Text { style, .. } | Segment::LinkText { style, .. } => style.bold = true,
                    Segment::Break => {}
                }
            }
        }
    }
}

fn push_row(tr: &Element, in_head: bool, rows: &mut Vec<TableRow>) {
    let mut cells: Vec<TableCell> = Vec::new();
    for cell in row_cells(tr) {
        let header = in_head || cell.is("th");
        let mut blocks = build_blocks_from_nodes(&cell.children, false);
        if header {
            embolden(&mut blocks);
        }
        cells.push(TableCell {
            blocks,
            span: u32::try_from(colspan(cell)).unwrap_or(1),
            header,
        });
    }
    if cells.is_empty() {
        return;
    }
    let header = cells.iter().all(|c| c.header);
    rows.push(TableRow { cells, header });
}

fn parse_table(table: &Element) -> Table {
    let mut rows: Vec<TableRow> = Vec::new();
    for section in table.child_elements() {
        match section.tag.as_str() {
            "tr" => push_row(section, false, &mut rows),
            "thead" | "tbody" | "tfoot" => {
                let in_head = section.is("thead");
                for tr in section.child_elements().filter(|r| r.is("tr")) {
                    push_row(tr, in_head, &mut rows);
                }
            }
            _ => {}
        }
    }
    Table {
        rows,
        columns: column_count(table),
    }
}

fn build_blocks_from_nodes(nodes: &[Node], allow_tables: bool) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut current = Paragraph::new(ParagraphStyle::Normal);
    let mut ctx = BuildCtx::default();

    fn walk(
        node: &Node,
        allow_tables: bool,
        ctx: &mut BuildCtx,
        blocks: &mut Vec<Block>,
        current: &mut Paragraph,
    ) {
        let el = match node {
            Node::Text(s) => {
                emit_text(current, ctx, s);
                return;
            }
            Node::Comment(_) => return,
            Node::Element(el) => el,
        };
        let tag = el.tag.as_str();

        if allow_tables && tag == "table" {
            flush_paragraph(blocks, current);
            let table = parse_table(el);
            if !table.rows.is_empty() {
                blocks.push(Block::Table(table));
            }
            return;
        }

        if tag == "img" {
            let alt = el.attr("alt").unwrap_or("").trim().to_string();
            match el.attr("src").and_then(ImageData::from_data_uri) {
                Some(image) => {
                    let resume = current.style;
                    flush_paragraph(blocks, current);
                    blocks.push(Block::Image(ImageBlock { image, alt }));
                    current.style = resume;
                }
                None if !alt.is_empty() => {
                    ctx.italic_depth += 1;
                    emit_text(current, ctx, &format!("[{alt}]"));
                    ctx.italic_depth -= 1;
                }
                None => {}
            }
            return;
        }

        if tag == "math" || tag == "svg" {
            return;
        }

        if let Some(level) = heading_level(tag) {
            start_paragraph(blocks, current, ParagraphStyle::Heading(level), None);
            current.bookmark = el
                .attr("id")
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string);
        }

        match tag {
            "pre" => {
                ctx.pre_depth += 1;
                start_paragraph(blocks, current, ParagraphStyle::CodeBlock, ctx.current_list());
            }
            "blockquote" => {
                ctx.quote_depth += 1;
                start_paragraph(blocks, current, ParagraphStyle::Quote, None);
            }
            "p" | "div" | "section" | "article" | "header" | "footer" | "main" | "figure"
            | "figcaption" | "dt" | "dd" | "caption" => {
                let style = ctx.body_style();
                start_paragraph(blocks, current, style, ctx.current_list());
            }
            "br" => current.segments.push(Segment::Break),
            "hr" => flush_paragraph(blocks, current),
            "ul" => ctx.list_stack.push(1),
            "ol" => ctx.list_stack.push(2),
            "li" => {
                let num_id = ctx.list_stack.last().cloned().unwrap_or(1);
                let ilvl = (ctx.list_stack.len().saturating_sub(1) as u32).min(MAX_LIST_LEVEL);
                ctx.li_list_stack.push(Some(ListInfo { num_id, ilvl }));
                start_paragraph(blocks, current, ParagraphStyle::Normal, ctx.current_list());
            }
            "a" => {
                let href = el.attr("href").and_then(sanitize_href);
                ctx.link_stack.push(href);
            }
            "code" | "kbd" | "samp" | "tt" => ctx.code_depth += 1,
            "b" | "strong" => ctx.bold_depth += 1,
            "i" | "em" | "cite" => ctx.italic_depth += 1,
            "u" | "ins" => ctx.underline_depth += 1,
            "s" | "del" | "strike" => ctx.strike_depth += 1,
            _ => {}
        }

        for c in &el.children {
            walk(c, allow_tables, ctx, blocks, current);
        }

        match tag {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => flush_paragraph(blocks, current),
            "p" | "div" | "section" | "article" | "header" | "footer" | "main" | "figure"
            | "figcaption" | "dt" | "dd" | "caption" | "tr" => flush_paragraph(blocks, current),
            "td" | "th" => emit_text(current, ctx, " "),
            "pre" => {
                flush_paragraph(blocks, current);
                ctx.pre_depth = ctx.pre_depth.saturating_sub(1);
            }
            "blockquote" => {
                flush_paragraph(blocks, current);
                ctx.quote_depth = ctx.quote_depth.saturating_sub(1);
            }
            "ul" | "ol" => {
                let _ = ctx.list_stack.pop();
            }
            "li" => {
                flush_paragraph(blocks, current);
                let _ = ctx.li_list_stack.pop();
            }
            "a" => {
                let _ = ctx.link_stack.pop();
            }
            "code" | "kbd" | "samp" | "tt" => ctx.code_depth = ctx.code_depth.saturating_sub(1),
            "b" | "strong" => ctx.bold_depth = ctx.bold_depth.saturating_sub(1),
            "i" | "em" | "cite" => ctx.italic_depth = ctx.italic_depth.saturating_sub(1),
            "u" | "ins" => ctx.underline_depth = ctx.underline_depth.saturating_sub(1),
            "s" | "del" | "strike" => ctx.strike_depth = ctx.strike_depth.saturating_sub(1),
            _ => {}
        }
    }

    for n in nodes {
        walk(n, allow_tables, &mut ctx, &mut blocks, &mut current);
    }
    flush_paragraph(&mut blocks, &mut current);
    blocks
}

/// Lowers a prepared HTML tree into paragraphs, tables and images.
pub fn build_blocks(nodes: &[Node]) -> Vec<Block> {
    build_blocks_from_nodes(nodes, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use html_prep::parse_fragment;

    fn blocks(html: &str) -> Vec<Block> {
        build_blocks(&parse_fragment(html))
    }

    fn para(b: &Block) -> &Paragraph {
        match b {
            Block::Paragraph(p) => p,
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn maps_all_heading_levels() {
        let out = blocks("<h1>a</h1><h4>b</h4><h6>c</h6><p>d</p>");
        let styles: Vec<_> = out.iter().map(|b| para(b).style).collect();
        assert_eq!(
            styles,
            [
                ParagraphStyle::Heading(1),
                ParagraphStyle::Heading(4),
                ParagraphStyle::Heading(6),
                ParagraphStyle::Normal
            ]
        );
    }

    #[test]
    fn inline_styles_become_run_properties() {
        let out = blocks("<p><b>bold</b> <i>it</i> <u>un</u> <del>gone</del> <code>x</code></p>");
        let p = para(&out[0]);
        let styles: Vec<RunStyle> = p
            .segments
            .iter()
            .filter_map(|s| match s {
                Segment::Text { text, style } if !text.trim().is_empty() => Some(*style),
                _ => None,
            })
            .collect();
        assert!(styles[0].bold);
        assert!(styles[1].italic);
        assert!(styles[2].underline);
        assert!(styles[3].strike);
        assert!(styles[4].code);
    }

    #[test]
    fn nested_lists_carry_levels() {
        let out = blocks("<ul><li>a<ol><li>b</li></ol></li></ul>");
        let lists: Vec<_> = out.iter().map(|b| para(b).list).collect();
        assert_eq!(
            lists,
            [
                Some(ListInfo { num_id: 1, ilvl: 0 }),
                Some(ListInfo { num_id: 2, ilvl: 1 })
            ]
        );
    }

    #[test]
    fn drops_unsafe_links() {
        let out = blocks(r#"<p><a href="javascript:alert(1)">x</a> <a href="https://a.b">y</a></p>"#);
        let p = para(&out[0]);
        assert!(matches!(&p.segments[0], Segment::Text { text, .. } if text == "x"));
        assert!(p
            .segments
            .iter()
            .any(|s| matches!(s, Segment::LinkText { href, .. } if href == "https://a.b")));
    }

    #[test]
    fn pre_keeps_line_breaks() {
        let out = blocks("<pre><code>a\n  b</code></pre>");
        let p = para(&out[0]);
        assert_eq!(p.style, ParagraphStyle::CodeBlock);
        assert_eq!(p.plain_text(), "a\n  b");
    }

    #[test]
    fn blockquote_paragraphs_use_quote_style() {
        let out = blocks("<blockquote><p>q1</p><p>q2</p></blockquote><p>n</p>");
        let styles: Vec<_> = out.iter().map(|b| para(b).style).collect();
        assert_eq!(
            styles,
            [ParagraphStyle::Quote, ParagraphStyle::Quote, ParagraphStyle::Normal]
        );
    }

    #[test]
    fn tables_keep_header_rows_and_spans() {
        let out = blocks(
            "<table><thead><tr><th>A</th><th>B</th></tr></thead>\
<tbody><tr><td colspan=\"2\">wide</td></tr></tbody></table>",
        );
        let Block::Table(t) = &out[0] else {
            panic!("expected table");
        };
        assert_eq!(t.columns, 2);
        assert!(t.rows[0].header);
        assert!(!t.rows[1].header);
        assert_eq!(t.rows[1].cells[0].span, 2);
        let head = para(&t.rows[0].cells[0].blocks[0]);
        assert!(matches!(&head.segments[0], Segment::Text { style, .. } if style.bold));
    }

    #[test]
    fn data_uri_images_become_blocks_and_others_fall_back_to_alt() {
        use base64::Engine;
        let b64 =
            base64::engine::general_purpose::STANDARD.encode(crate::media::png_fixture(2, 2));
        let html = format!(
            r#"<p>before</p><p><img src="data:image/png;base64,{b64}" alt="chart"></p><p><img src="remote.png" alt="logo"></p>"#
        );
        let out = blocks(&html);
        assert_eq!(out.len(), 3);
        assert!(matches!(&out[1], Block::Image(img) if img.alt == "chart"));
        assert_eq!(para(&out[2]).plain_text(), "[logo]");
    }
}
