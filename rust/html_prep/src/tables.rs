use std::num::IntErrorKind;

use crate::dom::{Element, Node};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableStyle {
    pub borders: bool,
    pub border_color: String,
    pub cell_padding: String,
}

impl Default for TableStyle {
    fn default() -> Self {
        Self {
            borders: true,
            border_color: "#000000".to_string(),
            cell_padding: "4px 6px".to_string(),
        }
    }
}

pub fn is_cell(e: &Element) -> bool {
    e.is("td") || e.is("th")
}

pub fn row_cells(tr: &Element) -> impl Iterator<Item = &Element> {
    tr.child_elements().filter(|c| is_cell(c))
}

/// Rows of `table` in document order: bare rows and rows of
/// `thead`/`tbody`/`tfoot`. Rows of nested tables are not included.
pub fn table_rows(table: &Element) -> Vec<&Element> {
    let mut out = Vec::new();
    for c in table.child_elements() {
        match c.tag.as_str() {
            "tr" => out.push(c),
            "thead" | "tbody" | "tfoot" => out.extend(c.child_elements().filter(|r| r.is("tr"))),
            _ => {}
        }
    }
    out
}

/// Largest `colspan` honoured; larger values are clamped as browsers do.
pub const MAX_COLSPAN: usize = 1000;
/// Upper bound on the column grid of one table.
pub const MAX_COLUMNS: usize = 1000;

pub fn colspan(cell: &Element) -> usize {
    let Some(v) = cell.attr("colspan").map(str::trim) else {
        return 1;
    };
    match v.parse::<u64>() {
        Ok(0) => 1,
        Ok(n) => usize::try_from(n).unwrap_or(MAX_COLSPAN).min(MAX_COLSPAN),
        Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow) => MAX_COLSPAN,
        Err(_) => 1,
    }
}

pub fn column_count(table: &Element) -> usize {
    table_rows(table)
        .into_iter()
        .map(|tr| row_cells(tr).map(colspan).fold(0usize, usize::saturating_add))
        .max()
        .unwrap_or(0)
        .min(MAX_COLUMNS)
}

/// Adds borders, a `<colgroup>` and `<thead>`/`<tbody>` sections to every table,
/// nested tables included.
pub fn enrich_tables(nodes: &mut [Node], style: &TableStyle) {
    for n in nodes.iter_mut() {
        if let Node::Element(e) = n {
            enrich_tables(&mut e.children, style);
            if e.is("table") {
                enrich_table(e, style);
            }
        }
    }
}

fn enrich_table(table: &mut Element, style: &TableStyle) {
    wrap_bare_rows(table);
    split_header_row(table);
    insert_colgroup(table);
    if style.borders {
        apply_borders(table, style);
    }
}

fn wrap_bare_rows(table: &mut Element) {
    if !table.children.iter().any(|n| n.is_element("tr")) {
        return;
    }
    let mut out: Vec<Node> = Vec::with_capacity(table.children.len());
    let mut pending: Option<Element> = None;
    for n in std::mem::take(&mut table.children) {
        if n.is_element("tr") || (pending.is_some() && n.is_whitespace()) {
            pending
                .get_or_insert_with(|| Element::new("tbody"))
                .children
                .push(n);
            continue;
        }
        if let Some(body) = pending.take() {
            out.push(Node::Element(body));
        }
        out.push(n);
    }
    if let Some(body) = pending.take() {
        out.push(Node::Element(body));
    }
    table.children = out;
}

fn is_header_row(tr: &Element) -> bool {
    let mut cells = row_cells(tr).peekable();
    cells.peek().is_some() && cells.all(|c| c.is("th"))
}

fn split_header_row(table: &mut Element) {
    if table.child_elements().any(|c| c.is("thead")) {
        return;
    }
    let Some(body_idx) = table.children.iter().position(|n| n.is_element("tbody")) else {
        return;
    };
    let Some(Node::Element(body)) = table.children.get_mut(body_idx) else {
        return;
    };
    let Some(row_idx) = body.children.iter().position(|n| n.is_element("tr")) else {
        return;
    };
    if !body.children[row_idx].as_element().is_some_and(is_header_row) {
        return;
    }

    let row = body.children.remove(row_idx);
    if !body.children.iter().any(|n| n.is_element("tr")) {
        table.children.remove(body_idx);
    }
    table.children.insert(
        body_idx,
        Node::Element(Element::with_children("thead", vec![row])),
    );
}

fn insert_colgroup(table: &mut Element) {
    if table.child_elements().any(|c| c.is("colgroup")) {
        return;
    }
    let cols = column_count(table);
    if cols == 0 {
        return;
    }
    let width = (100 / cols).max(1);
    let group = Element::with_children(
        "colgroup",
        (0..cols)
            .map(|_| {
                let mut col = Element::new("col");
                col.set_attr("style", format!("width:{width}%"));
                Node::Element(col)
            })
            .collect(),
    );
    let at = table
        .children
        .iter()
        .position(|n| n.is_element("caption"))
        .map(|i| i + 1)
        .unwrap_or(0);
    table.children.insert(at, Node::Element(group));
}

/// Property names declared in the inline `style` of `e`, lowercased.
fn style_properties(e: &Element) -> Vec<String> {
    e.attr("style")
        .map(|s| {
            s.split(';')
                .filter_map(|d| d.split_once(':'))
                .map(|(name, _)| name.trim().to_ascii_lowercase())
                .collect()
        })
        .unwrap_or_default()
}

fn declares_cell_border(cell: &Element) -> bool {
    style_properties(cell).iter().any(|p| {
        matches!(
            p.as_str(),
            "border"
                | "border-width"
                | "border-style"
                | "border-color"
                | "border-top"
                | "border-right"
                | "border-bottom"
                | "border-left"
        )
    })
}

fn apply_borders(table: &mut Element, style: &TableStyle) {
    table.set_attr("border", "1");
    if !style_properties(table).iter().any(|p| p == "border-collapse") {
        table.append_style("border-collapse:collapse;");
    }

    let cell_style = format!(
        "border:1px solid {}; padding:{};",
        style.border_color, style.cell_padding
    );
    for c in table.children.iter_mut().filter_map(Node::as_element_mut) {
        match c.tag.as_str() {
            "tr" => style_row(c, &cell_style),
            "thead" | "tbody" | "tfoot" => {
                for r in c.children.iter_mut().filter_map(Node::as_element_mut) {
                    if r.is("tr") {
                        style_row(r, &cell_style);
                    }
                }
            }
            _ => {}
        }
    }
}

fn style_row(tr: &mut Element, cell_style: &str) {
    for cell in tr.children.iter_mut().filter_map(Node::as_element_mut) {
        if is_cell(cell) && !declares_cell_border(cell) {
            cell.append_style(cell_style);
        }
    }
}
