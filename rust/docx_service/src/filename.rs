use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

const MAX_STEM_CHARS: usize = 100;
const FALLBACK_STEM: &str = "converted";

/// RFC 5987 `attr-char` minus the characters that are safe unencoded.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn is_kept(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '.') || (!ch.is_ascii() && ch.is_alphanumeric())
}

fn is_edge(ch: char) -> bool {
    ch == '.' || ch == '_' || ch.is_whitespace()
}

/// Turns a user-supplied name into a safe download name ending in `.ext`.
pub fn sanitize_filename(raw: Option<&str>, ext: &str) -> String {
    let raw = raw.unwrap_or("").trim();
    let last = raw.rsplit(['/', '\\']).next().unwrap_or("");

    let suffix = format!(".{ext}");
    let stem = match last.len().checked_sub(suffix.len()).and_then(|cut| {
        last.get(cut..)
            .filter(|tail| tail.eq_ignore_ascii_case(&suffix))
            .and_then(|_| last.get(..cut))
    }) {
        Some(stripped) => stripped,
        None => last,
    };

    let mut cleaned = String::with_capacity(stem.len());
    for ch in stem.chars() {
        let ch = if is_kept(ch) { ch } else { '_' };
        if ch == '_' && cleaned.ends_with('_') {
            continue;
        }
        cleaned.push(ch);
    }

    let limited: String = cleaned.trim_matches(is_edge).chars().take(MAX_STEM_CHARS).collect();
    let stem = limited.trim_end_matches(is_edge);
    let stem = if stem.is_empty() { FALLBACK_STEM } else { stem };
    format!("{stem}.{ext}")
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 UTF-8 name.
pub fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let encoded = utf8_percent_encode(name, ATTR_CHAR);
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_missing_or_empty() {
        assert_eq!(sanitize_filename(None, "docx"), "converted.docx");
        assert_eq!(sanitize_filename(Some("   "), "docx"), "converted.docx");
        assert_eq!(sanitize_filename(Some("../.."), "docx"), "converted.docx");
        assert_eq!(sanitize_filename(Some("***"), "html"), "converted.html");
    }

    #[test]
    fn strips_paths_and_extension() {
        assert_eq!(sanitize_filename(Some("/etc/passwd"), "docx"), "passwd.docx");
        assert_eq!(sanitize_filename(Some("C:\\Users\\me\\Report.DOCX"), "docx"), "Report.docx");
        assert_eq!(sanitize_filename(Some("notes.md"), "docx"), "notes.md.docx");
    }

    #[test]
    fn replaces_and_collapses_unsafe_characters() {
        assert_eq!(
            sanitize_filename(Some("Q3 report: final?!"), "docx"),
            "Q3_report_final.docx"
        );
        assert_eq!(sanitize_filename(Some("__a  b__"), "docx"), "a_b.docx");
        assert_eq!(sanitize_filename(Some("отчёт 2024"), "docx"), "отчёт_2024.docx");
    }

    #[test]
    fn limits_length() {
        let long = "a".repeat(300);
        let out = sanitize_filename(Some(&long), "docx");
        assert_eq!(out.len(), MAX_STEM_CHARS + ".docx".len());
    }

    #[test]
    fn disposition_has_ascii_fallback_and_utf8_name() {
        assert_eq!(
            content_disposition("converted.docx"),
            "attachment; filename=\"converted.docx\"; filename*=UTF-8''converted.docx"
        );
        let header = content_disposition("отчёт.docx");
        assert!(header.starts_with("attachment; filename=\"_____.docx\""));
        assert!(header.ends_with("filename*=UTF-8''%D0%BE%D1%82%D1%87%D1%91%D1%82.docx"));
    }
}
