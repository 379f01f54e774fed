//! Chat-context preamble assembly.
//!
//! Produces the framed block that gets prepended to the first user message
//! when a request references uploaded files. The framing is part of the
//! gateway's contract: downstream prompts and tests rely on it verbatim.

use crate::artifact::ArtifactRecord;

const HEADER: &str = "=== UPLOADED FILES CONTEXT ===";
const FOOTER: &str = "========================";

/// One artifact resolved for injection.
pub struct ContextEntry {
    pub record: ArtifactRecord,
    /// Extracted text, or the in-band placeholder when extraction failed.
    pub content: String,
}

/// Assembles the context preamble.
///
/// The output is a pure function of the entries: callers pass them in a
/// deterministic order (sorted by id) so identical file sets produce
/// byte-identical preambles.
pub fn build_preamble(entries: &[ContextEntry]) -> String {
    let mut preamble = String::from(HEADER);
    preamble.push('\n');

    for entry in entries {
        preamble.push_str(&format!(
            "📄 **File: {}** ({}, {} bytes)\nCreated: {}\n\n**Processed Content:**\n{}\n\n",
            entry.record.original_filename,
            entry.record.media_type,
            entry.record.size_bytes,
            entry.record.created_iso8601(),
            entry.content,
        ));
    }

    preamble.push_str(FOOTER);
    preamble
}

/// The in-band placeholder for a file whose extraction failed.
pub fn failure_placeholder(reason: &str) -> String {
    format!("[File content could not be processed: {reason}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactStatus;

    fn record(id: &str, name: &str) -> ArtifactRecord {
        ArtifactRecord {
            id: id.to_string(),
            original_filename: name.to_string(),
            media_type: "text/csv".to_string(),
            size_bytes: 52,
            created: 1_700_000_000,
            purpose: "assistants".to_string(),
            status: ArtifactStatus::Processed,
        }
    }

    #[test]
    fn preamble_uses_the_canonical_framing() {
        let entries = vec![ContextEntry {
            record: record("file-1", "sales.csv"),
            content: "Date,Product,Sales\n2024-01-01,A,150".to_string(),
        }];

        let preamble = build_preamble(&entries);

        insta::assert_snapshot!(preamble, @r"
        === UPLOADED FILES CONTEXT ===
        📄 **File: sales.csv** (text/csv, 52 bytes)
        Created: 2023-11-14T22:13:20Z

        **Processed Content:**
        Date,Product,Sales
        2024-01-01,A,150

        ========================
        ");
    }

    #[test]
    fn identical_entries_produce_identical_bytes() {
        let make = || {
            vec![
                ContextEntry {
                    record: record("file-1", "a.csv"),
                    content: "a".to_string(),
                },
                ContextEntry {
                    record: record("file-2", "b.csv"),
                    content: "b".to_string(),
                },
            ]
        };

        assert_eq!(build_preamble(&make()), build_preamble(&make()));
    }

    #[test]
    fn failure_placeholder_carries_the_reason() {
        assert_eq!(
            failure_placeholder("not valid UTF-8"),
            "[File content could not be processed: not valid UTF-8]"
        );
    }
}
