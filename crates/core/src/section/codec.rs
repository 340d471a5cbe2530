//! JSON wire codec for sections.
//!
//! The wire representation is self-describing JSON carrying every
//! [`Section`] field. Compatibility rule: readers ignore unknown fields and
//! default absent optional fields, so fields can be added without breaking
//! older peers. There is no schema versioning beyond that.

use super::types::Section;

/// Serialize a section for publishing.
///
/// # Errors
///
/// Returns the underlying `serde_json` error; with the derives on
/// [`Section`] this only happens on an unwritable sink, which a `Vec`
/// target never is in practice.
pub fn encode(section: &Section) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(section)
}

/// Deserialize a section received from a subject.
///
/// # Errors
///
/// Returns the underlying `serde_json` error when the payload is not a
/// well-formed section.
pub fn decode(payload: &[u8]) -> Result<Section, serde_json::Error> {
    serde_json::from_slice(payload)
}

#[cfg(test)]
mod tests {
    use super::super::types::{ComparisonPair, FilePurpose, Row, RuleConfig, Verdict};
    use super::*;

    fn sample() -> Section {
        Section {
            id: Section::derive_id("file-1", 1),
            task_id: "task-1".to_owned(),
            file_id: "file-1".to_owned(),
            seq: 1,
            purpose: FilePurpose::Primary,
            rows: vec![Row::new(0, "1,Alice,10".to_owned(), vec![
                "1".to_owned(),
                "Alice".to_owned(),
                "10".to_owned(),
            ])],
            column_headers: vec!["id".to_owned(), "name".to_owned(), "amount".to_owned()],
            pairs: vec![ComparisonPair::identifier(0, 0), ComparisonPair::equality(2, 2)],
            config: RuleConfig {
                ignore_whitespace: true,
                ..RuleConfig::default()
            },
            is_terminator: false,
        }
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let section = sample();
        let bytes = encode(&section).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, section);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let mut value: serde_json::Value = serde_json::to_value(sample()).unwrap();
        value["a_future_field"] = serde_json::json!({"nested": true});
        let bytes = serde_json::to_vec(&value).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn missing_optional_fields_take_defaults() {
        // Only the key fields on the wire; everything else defaults.
        let bytes = br#"{
            "id": "file-1-2",
            "task_id": "task-1",
            "file_id": "file-1",
            "seq": 2,
            "purpose": "Comparison"
        }"#;
        let decoded = decode(bytes).unwrap();
        assert_eq!(decoded.seq, 2);
        assert_eq!(decoded.purpose, FilePurpose::Comparison);
        assert!(decoded.rows.is_empty());
        assert!(decoded.pairs.is_empty());
        assert_eq!(decoded.config, RuleConfig::default());
        assert!(!decoded.is_terminator);
    }

    #[test]
    fn row_verdict_defaults_to_pending() {
        let bytes = br#"{
            "id": "f-1", "task_id": "t", "file_id": "f", "seq": 1,
            "purpose": "Primary",
            "rows": [{"row_number": 0, "raw": "a", "columns": ["a"]}]
        }"#;
        let decoded = decode(bytes).unwrap();
        assert_eq!(decoded.rows[0].verdict, Verdict::Pending);
        assert!(decoded.rows[0].reasons.is_empty());
    }

    #[test]
    fn garbage_payload_is_rejected() {
        assert!(decode(b"not json at all").is_err());
    }
}
