use crate::dom::{is_blank, Node};

fn is_inline_wrapper(tag: &str) -> bool {
    matches!(tag, "span" | "b" | "strong" | "i" | "em" | "u" | "font")
}

fn only_blank(nodes: &[Node]) -> bool {
    nodes.iter().all(|n| match n {
        Node::Text(t) => is_blank(t),
        Node::Comment(_) => true,
        Node::Element(e) if e.is("br") => true,
        Node::Element(e) if is_inline_wrapper(&e.tag) => only_blank(&e.children),
        Node::Element(_) => false,
    })
}

fn only_image(nodes: &[Node]) -> bool {
    let mut meaningful = nodes
        .iter()
        .filter(|n| !n.is_whitespace() && !matches!(n, Node::Comment(_)));
    matches!((meaningful.next(), meaningful.next()), (Some(n), None) if n.is_element("img"))
}

/// `<p>` holding nothing but whitespace, `&nbsp;`, `<br>` or empty inline wrappers.
pub fn is_empty_paragraph(node: &Node) -> bool {
    match node {
        Node::Element(e) if e.is("p") => only_blank(&e.children),
        _ => false,
    }
}

/// Elements whose neighbouring empty paragraphs are layout noise.
pub fn is_block_anchor(node: &Node) -> bool {
    let Some(e) = node.as_element() else {
        return false;
    };
    match e.tag.as_str() {
        "table" | "img" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => true,
        "p" | "figure" => only_image(&e.children),
        _ => false,
    }
}

/// Removes empty paragraphs around block anchors and the whitespace/`<br>` run
/// that editors leave behind a table. Applied to every child list in the tree.
pub fn clean_tree(nodes: &mut Vec<Node>) {
    for n in nodes.iter_mut() {
        if let Node::Element(e) = n {
            clean_tree(&mut e.children);
        }
    }

    let mut remove = vec![false; nodes.len()];
    for i in 0..nodes.len() {
        if !is_block_anchor(&nodes[i]) {
            continue;
        }

        let mut j = i;
        while j > 0 {
            j -= 1;
            if remove[j] || nodes[j].is_whitespace() {
                continue;
            }
            if is_empty_paragraph(&nodes[j]) {
                remove[j] = true;
                continue;
            }
            break;
        }

        let after_table = nodes[i].is_element("table");
        for j in i + 1..nodes.len() {
            let n = &nodes[j];
            if n.is_whitespace() {
                remove[j] = remove[j] || after_table;
                continue;
            }
            if is_empty_paragraph(n) || (after_table && n.is_element("br")) {
                remove[j] = true;
                continue;
            }
            break;
        }
    }

    let removed = remove.iter().filter(|r| **r).count();
    if removed > 0 {
        tracing::trace!(removed, "cleanup pass dropped nodes");
        let mut it = remove.into_iter();
        nodes.retain(|_| !it.next().unwrap_or(false));
    }
}
