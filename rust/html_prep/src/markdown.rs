use pulldown_cmark::{html, Options, Parser};

pub fn markdown_to_html_string(md: &str) -> String {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts.insert(Options::ENABLE_TASKLISTS);
    opts.insert(Options::ENABLE_FOOTNOTES);
    let parser = Parser::new_ext(md, opts);
    let mut out = String::with_capacity(md.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_gfm_tables_with_sections() {
        let out = markdown_to_html_string("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(out.contains("<table>"));
        assert!(out.contains("<thead>"));
        assert!(out.contains("<td>1</td>"));
    }

    #[test]
    fn renders_strikethrough_and_tasks() {
        let out = markdown_to_html_string("~~gone~~\n\n- [x] done\n");
        assert!(out.contains("<del>gone</del>"));
        assert!(out.contains("checkbox"));
    }

    #[test]
    fn passes_raw_html_through() {
        let out = markdown_to_html_string("<div class=\"x\">raw</div>\n");
        assert!(out.contains("<div class=\"x\">raw</div>"));
    }

    #[test]
    fn empty_input_renders_nothing() {
        assert_eq!(markdown_to_html_string(""), "");
    }
}
