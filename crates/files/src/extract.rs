//! Media-type–driven text extraction.
//!
//! Turns stored artifact bytes into the text that gets injected as chat
//! context. Every extractor is size-bounded; failures are reported per
//! file so one bad artifact cannot sink a request.

use serde_json::Value;

/// Outcome of extracting one artifact.
pub enum Extracted {
    /// Usable text.
    Text(String),
    /// The type is stored but not understood; a short note stands in.
    Unsupported(String),
    /// Extraction failed; the reason goes into an in-band placeholder.
    Failed(String),
}

/// Extracts text from artifact bytes according to the declared media type.
///
/// `max_bytes` bounds the extracted text, not the input.
pub fn extract(media_type: &str, bytes: &[u8], max_bytes: usize, csv_preview_rows: usize) -> Extracted {
    let base_type = media_type.split(';').next().unwrap_or(media_type).trim();

    match base_type {
        "text/csv" => extract_csv(bytes, csv_preview_rows, max_bytes),
        "application/json" => extract_json(bytes, max_bytes),
        "text/html" | "application/xml" | "text/xml" => extract_markup(bytes, max_bytes),
        _ if is_textual(base_type) => extract_plain(bytes, max_bytes),
        other => Extracted::Unsupported(format!(
            "[Stored as binary; content of type '{other}' is not rendered as text]"
        )),
    }
}

/// Plain text, markdown, and source-code-like types.
fn is_textual(media_type: &str) -> bool {
    media_type.starts_with("text/")
        || matches!(
            media_type,
            "application/x-yaml"
                | "application/yaml"
                | "application/toml"
                | "application/x-sh"
                | "application/javascript"
                | "application/typescript"
        )
}

fn extract_plain(bytes: &[u8], max_bytes: usize) -> Extracted {
    match std::str::from_utf8(bytes) {
        Ok(text) => Extracted::Text(truncate_on_char_boundary(text, max_bytes).to_string()),
        Err(e) => Extracted::Failed(format!("not valid UTF-8 ({e})")),
    }
}

/// Header line plus a bounded number of rows; the remainder is summarized.
fn extract_csv(bytes: &[u8], preview_rows: usize, max_bytes: usize) -> Extracted {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => return Extracted::Failed(format!("not valid UTF-8 ({e})")),
    };

    let mut lines = text.lines();

    let Some(header) = lines.next() else {
        return Extracted::Failed("empty CSV".to_string());
    };

    let mut rendered = String::from(header);
    let mut shown = 0usize;
    let mut remaining = 0usize;

    for line in lines {
        if line.is_empty() {
            continue;
        }

        if shown < preview_rows {
            rendered.push('\n');
            rendered.push_str(line);
            shown += 1;
        } else {
            remaining += 1;
        }
    }

    if remaining > 0 {
        rendered.push_str(&format!("\n… and {remaining} more rows"));
    }

    Extracted::Text(truncate_on_char_boundary(&rendered, max_bytes).to_string())
}

/// Pretty-prints the document; objects get a top-level key/type summary
/// first so a model can orient without reading the whole body.
fn extract_json(bytes: &[u8], max_bytes: usize) -> Extracted {
    let value: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(e) => return Extracted::Failed(format!("invalid JSON ({e})")),
    };

    let mut rendered = String::new();

    if let Value::Object(map) = &value {
        rendered.push_str("Top-level keys:\n");

        for (key, entry) in map {
            rendered.push_str(&format!("  {key}: {}\n", json_type_name(entry)));
        }

        rendered.push('\n');
    }

    match serde_json::to_string_pretty(&value) {
        Ok(body) => rendered.push_str(&body),
        Err(e) => return Extracted::Failed(format!("unprintable JSON ({e})")),
    }

    Extracted::Text(truncate_on_char_boundary(&rendered, max_bytes).to_string())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Strips tags, keeps text. Block-level closers contribute line breaks so
/// the structure stays minimally legible.
fn extract_markup(bytes: &[u8], max_bytes: usize) -> Extracted {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => return Extracted::Failed(format!("not valid UTF-8 ({e})")),
    };

    let mut rendered = String::with_capacity(text.len() / 2);
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '<' {
            rendered.push(c);
            continue;
        }

        let mut tag = String::new();

        for tag_char in chars.by_ref() {
            if tag_char == '>' {
                break;
            }
            tag.push(tag_char);
        }

        let tag_name = tag
            .trim_start_matches('/')
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();

        if matches!(
            tag_name.as_str(),
            "p" | "div" | "br" | "li" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "section" | "article"
        ) && !rendered.ends_with('\n')
        {
            rendered.push('\n');
        }
    }

    // Collapse the whitespace noise markup leaves behind.
    let collapsed = rendered
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    Extracted::Text(truncate_on_char_boundary(&collapsed, max_bytes).to_string())
}

fn truncate_on_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }

    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }

    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn text_of(extracted: Extracted) -> String {
        match extracted {
            Extracted::Text(text) => text,
            Extracted::Unsupported(note) => unreachable!("expected text, got unsupported: {note}"),
            Extracted::Failed(reason) => unreachable!("expected text, got failure: {reason}"),
        }
    }

    #[test]
    fn plain_text_preserves_newlines() {
        let text = text_of(extract("text/plain", b"line one\nline two\n", 1024, 20));
        assert_eq!(text, "line one\nline two\n");
    }

    #[test]
    fn csv_keeps_header_and_truncates_rows() {
        let csv = "Date,Product,Sales\n2024-01-01,A,150\n2024-01-02,B,200\n2024-01-03,C,250";
        let text = text_of(extract("text/csv", csv.as_bytes(), 1024, 2));

        insta::assert_snapshot!(text, @r"
        Date,Product,Sales
        2024-01-01,A,150
        2024-01-02,B,200
        … and 1 more rows
        ");
    }

    #[test]
    fn csv_below_the_preview_limit_is_complete() {
        let csv = "Date,Product,Sales\n2024-01-01,A,150\n2024-01-02,B,200";
        let text = text_of(extract("text/csv", csv.as_bytes(), 1024, 20));

        assert!(text.contains("2024-01-02,B,200"));
        assert!(!text.contains("more rows"));
    }

    #[test]
    fn json_objects_get_a_key_summary() {
        let json = r#"{"name": "test", "items": [1, 2], "count": 2}"#;
        let text = text_of(extract("application/json", json.as_bytes(), 4096, 20));

        assert!(text.starts_with("Top-level keys:\n"));
        assert!(text.contains("  name: string"));
        assert!(text.contains("  items: array"));
        assert!(text.contains("  count: number"));
        assert!(text.contains("\"name\": \"test\""));
    }

    #[test]
    fn invalid_json_fails_with_a_reason() {
        let result = extract("application/json", b"{not json", 4096, 20);
        assert!(matches!(result, Extracted::Failed(reason) if reason.contains("invalid JSON")));
    }

    #[test]
    fn html_extraction_strips_tags() {
        let html = indoc! {r#"
            <html><body>
            <h1>Title</h1>
            <p>First paragraph.</p>
            <p>Second <b>bold</b> paragraph.</p>
            </body></html>
        "#};

        let text = text_of(extract("text/html", html.as_bytes(), 4096, 20));

        assert!(text.contains("Title"));
        assert!(text.contains("First paragraph."));
        assert!(text.contains("Second bold paragraph."));
        assert!(!text.contains('<'));
    }

    #[test]
    fn unknown_types_produce_a_placeholder_note() {
        let result = extract("application/octet-stream", &[0, 1, 2], 4096, 20);
        assert!(matches!(result, Extracted::Unsupported(note) if note.contains("application/octet-stream")));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "héllo wörld";
        let truncated = truncate_on_char_boundary(text, 2);
        assert_eq!(truncated, "h");
    }
}
