use crate::dom::esc_text;
use crate::toc::render_toc;
use crate::Prepared;

#[derive(Clone, Debug, Default)]
pub struct PageOptions {
    pub title: Option<String>,
    pub toc: bool,
}

const STYLESHEET: &str = r#"body { font-family: Calibri, Arial, sans-serif; font-size: 11pt; line-height: 1.4; max-width: 48em; margin: 2em auto; padding: 0 1em; color: #222; }
h1, h2, h3, h4, h5, h6 { font-weight: bold; margin: 1.2em 0 0.5em 0; }
code { font-family: Consolas, 'Courier New', monospace; background: #f5f5f5; padding: 0 2px; border-radius: 2px; }
pre { font-family: Consolas, 'Courier New', monospace; background: #f5f5f5; padding: 8px; border-radius: 4px; white-space: pre-wrap; }
pre code { background: none; padding: 0; }
a { color: #1155cc; text-decoration: underline; }
blockquote { border-left: 3px solid #ccc; margin: 0; padding-left: 12px; color: #555; }
table { border-collapse: collapse; margin: 0.8em 0; }
th { font-weight: bold; background: #f2f2f2; }
img { max-width: 100%; height: auto; vertical-align: middle; }
nav.toc { border-bottom: 1px solid #ddd; margin-bottom: 1.5em; padding-bottom: 0.5em; }
nav.toc ul { list-style: none; padding-left: 1.2em; margin: 0; }
"#;

/// Wraps prepared body HTML into a standalone, styled HTML5 document.
pub fn render_page(prepared: &Prepared, opts: &PageOptions) -> String {
    let title = opts
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("Document");

    let mut out = String::with_capacity(prepared.html.len() + STYLESHEET.len() + 256);
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    out.push_str("<title>");
    out.push_str(&esc_text(title));
    out.push_str("</title>\n<style>\n");
    out.push_str(STYLESHEET);
    out.push_str("</style>\n</head>\n<body>\n");
    if opts.toc {
        out.push_str(&render_toc(&prepared.headings));
        out.push('\n');
    }
    out.push_str(&prepared.html);
    out.push_str("\n</body>\n</html>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{prepare_markdown, PrepOptions};

    #[test]
    fn wraps_body_with_title_and_stylesheet() {
        let prepared = prepare_markdown("# Hi\n\ntext", &PrepOptions::default());
        let page = render_page(
            &prepared,
            &PageOptions {
                title: Some("A <b> title".to_string()),
                toc: false,
            },
        );
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<title>A &lt;b&gt; title</title>"));
        assert!(page.contains("border-collapse: collapse"));
        assert!(page.contains("<h1 id=\"hi\">Hi</h1>"));
        assert!(!page.contains("nav class=\"toc\""));
    }

    #[test]
    fn places_toc_before_content() {
        let prepared = prepare_markdown("# One\n\n## Two\n", &PrepOptions::default());
        let page = render_page(
            &prepared,
            &PageOptions {
                title: None,
                toc: true,
            },
        );
        assert!(page.contains("<title>Document</title>"));
        let toc_at = page.find("<nav class=\"toc\">").unwrap();
        let body_at = page.find("<h1 id=\"one\">").unwrap();
        assert!(toc_at < body_at);
        assert!(page.contains("<a href=\"#two\">Two</a>"));
    }
}
