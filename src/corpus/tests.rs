use super::*;
use std::fs;
use tempfile::TempDir;

fn write_corpus(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("corpus.jsonl");
    fs::write(&path, contents).expect("should write corpus");
    path
}

#[test]
fn loads_records_in_file_order_skipping_blank_lines() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = write_corpus(
        &dir,
        concat!(
            r#"{"code":"I10","description":"Essential (primary) hypertension","synonyms":["high blood pressure"]}"#,
            "\n\n   \n",
            r#"{"code":"E11.9","description":"Type 2 diabetes mellitus without complications","parent_code":"E11","parent_description":"Type 2 diabetes mellitus"}"#,
            "\n",
        ),
    );

    let entries = load_corpus(&path).expect("corpus should load");

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].record.code, "I10");
    assert_eq!(entries[0].line, 1);
    assert_eq!(entries[0].record.synonyms, vec!["high blood pressure"]);
    assert_eq!(entries[1].record.code, "E11.9");
    assert_eq!(entries[1].line, 4);
    assert_eq!(entries[1].record.parent_code.as_deref(), Some("E11"));
}

#[test]
fn missing_file_is_corpus_not_found() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("nope.jsonl");

    let result = load_corpus(&path);

    assert!(matches!(result, Err(IcdError::CorpusNotFound(p)) if p == path));
}

#[test]
fn malformed_line_reports_line_number() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = write_corpus(
        &dir,
        concat!(
            r#"{"code":"I10","description":"Essential hypertension"}"#,
            "\n",
            "\n",
            "{not json\n",
        ),
    );

    let result = load_corpus(&path);

    assert!(matches!(
        result,
        Err(IcdError::MalformedRecord { line: 3, .. })
    ));
}

#[test]
fn rejects_non_object_lines() {
    let result = parse_line("[1, 2, 3]", 7);
    assert!(matches!(
        result,
        Err(IcdError::MalformedRecord { line: 7, ref message }) if message.contains("object")
    ));
}

#[test]
fn rejects_missing_required_fields() {
    let result = parse_line(r#"{"description":"no code"}"#, 1);
    assert!(matches!(
        result,
        Err(IcdError::MalformedRecord { ref message, .. }) if message.contains("'code'")
    ));
}

#[test]
fn rejects_wrongly_typed_fields() {
    assert!(parse_line(r#"{"code":10,"description":"numeric code"}"#, 1).is_err());
    assert!(parse_line(r#"{"code":"A","description":"d","synonyms":"one"}"#, 1).is_err());
    assert!(parse_line(r#"{"code":"A","description":"d","synonyms":[1]}"#, 1).is_err());
}

#[test]
fn parent_code_requires_parent_description() {
    let result = parse_line(
        r#"{"code":"E11.9","description":"Type 2 diabetes","parent_code":"E11"}"#,
        2,
    );
    assert!(matches!(
        result,
        Err(IcdError::MalformedRecord { line: 2, .. })
    ));

    let top_level = parse_line(r#"{"code":"E11","description":"Type 2 diabetes"}"#, 3)
        .expect("records without a parent are legal");
    assert_eq!(top_level.record.parent_code, None);
    assert_eq!(top_level.record.parent_description, None);
}

#[test]
fn null_fields_are_treated_as_absent() {
    let entry = parse_line(
        r#"{"code":"A00","description":"Cholera","synonyms":null,"parent_code":null,"parent_description":null}"#,
        1,
    )
    .expect("nulls are allowed");

    assert!(entry.record.synonyms.is_empty());
    assert_eq!(entry.record.parent_code, None);

    let document = build_document(&entry);
    let parsed = DiagnosticCodeRecord::from_document_text(&document.searchable_text)
        .expect("null fields should parse back");
    assert_eq!(parsed, entry.record);

    let via_serde: DiagnosticCodeRecord =
        serde_json::from_str(&document.searchable_text).expect("serde accepts null synonyms");
    assert_eq!(via_serde, entry.record);
}

#[test]
fn invalid_utf8_line_reports_its_line_number() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("corpus.jsonl");
    let mut contents = br#"{"code":"I10","description":"Essential (primary) hypertension"}"#.to_vec();
    contents.extend_from_slice(b"\n\xff\xfe\n");
    fs::write(&path, contents).expect("should write corpus");

    let result = load_corpus(&path);

    match result {
        Err(IcdError::MalformedRecord { line, message }) => {
            assert_eq!(line, 2);
            assert!(message.contains("UTF-8"));
        }
        other => panic!("expected a malformed record, got {:?}", other),
    }
}

#[test]
fn record_round_trip_through_document_text() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = write_corpus(
        &dir,
        concat!(
            r#"{"code":"J45.909","description":"Unspecified asthma, uncomplicated","synonyms":["asthma"],"parent_code":"J45","parent_description":"Asthma"}"#,
            "\n",
            r#"{"code":"Z00.00","description":"Encounter for general adult medical examination"}"#,
            "\n",
            r#"{"code":"R51.9","description":"Headache, unspecified","synonyms":[],"parent_code":"R51","parent_description":"Headache","source":"2024"}"#,
            "\n",
        ),
    );

    for entry in load_corpus(&path).expect("corpus should load") {
        let document = build_document(&entry);
        let parsed = DiagnosticCodeRecord::from_document_text(&document.searchable_text)
            .expect("searchable text should parse");
        assert_eq!(parsed, entry.record);
    }
}

#[test]
fn from_document_text_rejects_invalid_text() {
    let result =
        DiagnosticCodeRecord::from_document_text("Error retrieving documents for query: I10");
    assert!(matches!(result, Err(IcdError::RecordParse(_))));

    let result = DiagnosticCodeRecord::from_document_text(r#"{"code":"I10"}"#);
    assert!(matches!(result, Err(IcdError::RecordParse(_))));

    // Same parent rule as loading
    let result = DiagnosticCodeRecord::from_document_text(
        r#"{"code":"E11.9","description":"Type 2 diabetes","parent_code":"E11"}"#,
    );
    match result {
        Err(IcdError::RecordParse(message)) => assert!(message.contains("parent_description")),
        other => panic!("expected a parse error, got {:?}", other),
    }
}
