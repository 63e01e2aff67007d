use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// Owned HTML tree. Every later pass rewrites this instead of the rcdom graph,
/// which only offers shared `RefCell` children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_children(tag: &str, children: Vec<Node>) -> Self {
        Self {
            tag: tag.to_string(),
            attrs: Vec::new(),
            children,
        }
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag == tag
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some((_, v)) => *v = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    /// Appends `decl` to the inline style, adding the separating `;` when needed.
    pub fn append_style(&mut self, decl: &str) {
        let merged = match self.attr("style") {
            Some(existing) if !existing.trim().is_empty() => {
                let existing = existing.trim();
                if existing.ends_with(';') {
                    format!("{existing} {decl}")
                } else {
                    format!("{existing}; {decl}")
                }
            }
            _ => decl.to_string(),
        };
        self.set_attr("style", merged);
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for n in nodes {
        match n {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(&e.children, out),
            Node::Comment(_) => {}
        }
    }
}

impl Node {
    pub fn text(s: &str) -> Self {
        Node::Text(s.to_string())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_element(&self, tag: &str) -> bool {
        matches!(self, Node::Element(e) if e.tag == tag)
    }

    /// Text made only of whitespace; U+00A0 counts as whitespace.
    pub fn is_whitespace(&self) -> bool {
        matches!(self, Node::Text(t) if is_blank(t))
    }
}

pub fn is_blank(s: &str) -> bool {
    s.chars().all(|c| c.is_whitespace() || c == '\u{a0}')
}

fn is_drop_content_tag(lower: &str) -> bool {
    matches!(
        lower,
        "script" | "style" | "noscript" | "template" | "iframe" | "object" | "embed"
    )
}

pub fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "br" | "hr" | "img" | "meta" | "link" | "input" | "col" | "wbr" | "source"
    )
}

fn parse_to_dom(input: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(input)
}

fn find_body_children(dom: &RcDom) -> Option<Vec<Handle>> {
    fn find_elem(node: &Handle, name: &str) -> Option<Handle> {
        if let NodeData::Element { name: q, .. } = &node.data {
            if q.local.to_string().eq_ignore_ascii_case(name) {
                return Some(node.clone());
            }
        }
        for c in node.children.borrow().iter() {
            if let Some(x) = find_elem(c, name) {
                return Some(x);
            }
        }
        None
    }

    let body = find_elem(&dom.document, "body")?;
    let out = body.children.borrow().clone();
    Some(out)
}

fn convert_children(children: &[Handle]) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::new();
    for c in children {
        convert_node(c, &mut out);
    }
    out
}

fn convert_node(node: &Handle, out: &mut Vec<Node>) {
    match &node.data {
        NodeData::Text { contents } => {
            let text = contents.borrow().to_string();
            // html5ever already merges adjacent text, but fragments stitched from
            // several inputs can still produce runs.
            if let Some(Node::Text(prev)) = out.last_mut() {
                prev.push_str(&text);
            } else {
                out.push(Node::Text(text));
            }
        }
        NodeData::Comment { contents } => out.push(Node::Comment(contents.to_string())),
        NodeData::Document => out.extend(convert_children(&node.children.borrow())),
        NodeData::Doctype { .. } | NodeData::ProcessingInstruction { .. } => {}
        NodeData::Element { name, attrs, .. } => {
            let tag = name.local.to_string().to_ascii_lowercase();
            if is_drop_content_tag(&tag) {
                return;
            }
            let attrs = attrs
                .borrow()
                .iter()
                .map(|a| (a.name.local.to_string().to_ascii_lowercase(), a.value.to_string()))
                .collect();
            out.push(Node::Element(Element {
                tag,
                attrs,
                children: convert_children(&node.children.borrow()),
            }));
        }
    }
}

/// Parses a fragment or a full document and returns the content of `<body>`.
pub fn parse_fragment(input: &str) -> Vec<Node> {
    let wrapped = if input.to_ascii_lowercase().contains("<html") {
        input.to_string()
    } else {
        format!(
            "<!doctype html><html><head><meta charset=\"utf-8\"></head><body>{}</body></html>",
            input
        )
    };

    let dom = parse_to_dom(&wrapped);
    let children =
        find_body_children(&dom).unwrap_or_else(|| dom.document.children.borrow().clone());
    convert_children(&children)
}

pub fn esc_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn esc_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn serialize_node(out: &mut String, n: &Node) {
    match n {
        Node::Text(t) => out.push_str(&esc_text(t)),
        Node::Comment(c) => {
            out.push_str("<!--");
            out.push_str(c);
            out.push_str("-->");
        }
        Node::Element(Element {
            tag,
            attrs,
            children,
        }) => {
            out.push('<');
            out.push_str(tag);
            for (k, v) in attrs {
                out.push(' ');
                out.push_str(k);
                out.push_str("=\"");
                out.push_str(&esc_attr(v));
                out.push('"');
            }
            if is_void(tag) {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for c in children {
                serialize_node(out, c);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

pub fn serialize(nodes: &[Node]) -> String {
    let mut out = String::new();
    for n in nodes {
        serialize_node(&mut out, n);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fragment_into_body_children() {
        let nodes = parse_fragment("<p>Hello <b>world</b></p><p>Two</p>");
        assert_eq!(nodes.len(), 2);
        let p = nodes[0].as_element().unwrap();
        assert!(p.is("p"));
        assert_eq!(p.text_content(), "Hello world");
    }

    #[test]
    fn drops_script_and_style_content() {
        let out = serialize(&parse_fragment(
            "<p>a</p><script>alert(1)</script><style>p{}</style><p>b</p>",
        ));
        assert_eq!(out, "<p>a</p><p>b</p>");
    }

    #[test]
    fn bare_rows_gain_an_implicit_tbody() {
        let nodes = parse_fragment("<table><tr><td>x</td></tr></table>");
        let table = nodes[0].as_element().unwrap();
        assert!(table.children[0].is_element("tbody"));
    }

    #[test]
    fn serializes_void_elements_and_escapes() {
        let nodes = parse_fragment(r#"<p title="a&quot;b">1 &lt; 2<br>x</p><img src="a.png">"#);
        let out = serialize(&nodes);
        assert_eq!(
            out,
            r#"<p title="a&quot;b">1 &lt; 2<br/>x</p><img src="a.png"/>"#
        );
    }

    #[test]
    fn accepts_full_documents() {
        let nodes = parse_fragment(
            "<!DOCTYPE html><html><head><title>t</title></head><body><h1>Hi</h1></body></html>",
        );
        assert_eq!(serialize(&nodes), "<h1>Hi</h1>");
    }

    #[test]
    fn nbsp_counts_as_whitespace() {
        assert!(Node::text("\u{a0} \n").is_whitespace());
        assert!(!Node::text("\u{a0}x").is_whitespace());
    }

    #[test]
    fn append_style_keeps_existing_declarations() {
        let mut e = Element::new("td");
        e.set_attr("style", "color:red");
        e.append_style("border:1px solid #000;");
        assert_eq!(e.attr("style"), Some("color:red; border:1px solid #000;"));
    }
}
