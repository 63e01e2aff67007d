use std::collections::HashSet;

use crate::dom::{esc_attr, esc_text, Node};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub id: String,
    pub text: String,
}

pub fn heading_level(tag: &str) -> Option<u8> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut gap = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if gap && !out.is_empty() {
                out.push('-');
            }
            gap = false;
            out.extend(ch.to_lowercase());
        } else {
            gap = true;
        }
    }
    if out.is_empty() {
        "section".to_string()
    } else {
        out
    }
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn gather_ids(nodes: &[Node], used: &mut HashSet<String>) {
    for n in nodes {
        if let Node::Element(e) = n {
            if let Some(id) = e.attr("id") {
                used.insert(id.to_string());
            }
            gather_ids(&e.children, used);
        }
    }
}

fn unique_id(base: String, used: &mut HashSet<String>) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut n = 1;
    loop {
        let candidate = format!("{base}-{n}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn assign(nodes: &mut [Node], max_level: u8, used: &mut HashSet<String>, out: &mut Vec<Heading>) {
    for n in nodes.iter_mut() {
        let Node::Element(e) = n else { continue };
        if let Some(level) = heading_level(&e.tag).filter(|l| *l <= max_level) {
            let text = collapse_ws(&e.text_content());
            let id = match e.attr("id") {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => {
                    let id = unique_id(slugify(&text), used);
                    e.set_attr("id", id.clone());
                    id
                }
            };
            out.push(Heading { level, id, text });
            continue;
        }
        assign(&mut e.children, max_level, used, out);
    }
}

/// Gives every heading up to `max_level` a stable anchor and lists them in
/// document order. Ids already present in the tree are never reused.
pub fn collect_headings(nodes: &mut [Node], max_level: u8) -> Vec<Heading> {
    let mut used = HashSet::new();
    gather_ids(nodes, &mut used);
    let mut out = Vec::new();
    assign(nodes, max_level, &mut used, &mut out);
    out
}

pub fn render_toc(headings: &[Heading]) -> String {
    let Some(base) = headings.iter().map(|h| h.level).min() else {
        return String::new();
    };

    let mut out = String::from("<nav class=\"toc\">");
    let mut depth = 0usize;
    for h in headings {
        let target = usize::from(h.level - base) + 1;
        if target > depth {
            while depth < target {
                out.push_str("<ul>");
                depth += 1;
                if depth < target {
                    out.push_str("<li>");
                }
            }
        } else {
            out.push_str("</li>");
            while depth > target {
                out.push_str("</ul></li>");
                depth -= 1;
            }
        }
        out.push_str("<li><a href=\"#");
        out.push_str(&esc_attr(&h.id));
        out.push_str("\">");
        out.push_str(&esc_text(&h.text));
        out.push_str("</a>");
    }
    out.push_str("</li>");
    while depth > 1 {
        out.push_str("</ul></li>");
        depth -= 1;
    }
    out.push_str("</ul></nav>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{parse_fragment, serialize};

    #[test]
    fn slugs_are_lowercase_and_dashed() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Ünïcode  Title "), "ünïcode-title");
        assert_eq!(slugify("!!!"), "section");
    }

    #[test]
    fn assigns_unique_ids_and_keeps_existing_ones() {
        let mut nodes =
            parse_fragment("<h1>Intro</h1><h2 id=\"intro\">Kept</h2><h2>Intro</h2><h4>Deep</h4>");
        let headings = collect_headings(&mut nodes, 3);
        let ids: Vec<_> = headings.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, ["intro-1", "intro", "intro-2"]);
        let html = serialize(&nodes);
        assert!(html.contains("<h1 id=\"intro-1\">Intro</h1>"));
        assert!(html.contains("<h4>Deep</h4>"));
    }

    #[test]
    fn renders_nested_list() {
        let h = |level, id: &str| Heading {
            level,
            id: id.to_string(),
            text: id.to_uppercase(),
        };
        let out = render_toc(&[h(1, "a"), h(2, "b"), h(1, "c")]);
        assert_eq!(
            out,
            "<nav class=\"toc\"><ul><li><a href=\"#a\">A</a><ul><li><a href=\"#b\">B</a></li></ul></li>\
<li><a href=\"#c\">C</a></li></ul></nav>"
        );
    }

    #[test]
    fn level_jumps_stay_balanced() {
        let h = |level, id: &str| Heading {
            level,
            id: id.to_string(),
            text: id.to_string(),
        };
        let out = render_toc(&[h(3, "x"), h(2, "y")]);
        assert_eq!(out.matches("<ul>").count(), out.matches("</ul>").count());
        assert_eq!(out.matches("<li>").count(), out.matches("</li>").count());
    }

    #[test]
    fn empty_toc_renders_nothing() {
        assert_eq!(render_toc(&[]), "");
    }
}
