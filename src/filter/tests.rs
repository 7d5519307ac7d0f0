use super::*;
use serde_json::json;

const COSMOS_TEXT: &str = "Azure Cosmos DB is a fully managed NoSQL, relational, and vector database.";

fn names() -> FieldNames {
    FieldNames::new("text", "hash", "vectors")
}

fn document(value: serde_json::Value) -> Document {
    Document::from_value(value, &names()).expect("should parse document")
}

#[test]
fn known_digests() {
    assert_eq!(
        content_hash(""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_eq!(
        content_hash("abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn new_document_needs_update() {
    let filter = ChangeFilter::new(&names());
    let decision = filter.decide(&document(json!({"id": "1", "text": COSMOS_TEXT})));

    assert!(decision.needs_update);
    assert_eq!(decision.new_hash, content_hash(COSMOS_TEXT));
}

#[test]
fn matching_hash_is_unchanged() {
    let filter = ChangeFilter::new(&names());
    let decision = filter.decide(&document(json!({
        "id": "1",
        "text": COSMOS_TEXT,
        "hash": content_hash(COSMOS_TEXT),
        "vectors": [0.5, 0.25]
    })));

    assert!(!decision.needs_update);
    assert_eq!(decision.new_hash, content_hash(COSMOS_TEXT));
}

#[test]
fn edited_text_needs_update() {
    let filter = ChangeFilter::new(&names());
    let decision = filter.decide(&document(json!({
        "id": "1",
        "text": "edited",
        "hash": content_hash(COSMOS_TEXT)
    })));

    assert!(decision.needs_update);
    assert_eq!(decision.new_hash, content_hash("edited"));
}

#[test]
fn only_the_embed_field_is_hashed() {
    let filter = ChangeFilter::new(&names());
    let decision = filter.decide(&document(json!({
        "id": "1",
        "text": "same",
        "hash": content_hash("same"),
        "category": "changed since last embedding",
        "_etag": "\"new-etag\""
    })));

    assert!(!decision.needs_update);
}

#[test]
fn missing_text_hashes_as_empty() {
    let filter = ChangeFilter::new(&names());

    let unseen = filter.decide(&document(json!({"id": "1"})));
    assert!(unseen.needs_update);
    assert_eq!(unseen.new_hash, content_hash(""));

    let seen = filter.decide(&document(json!({"id": "1", "hash": content_hash("")})));
    assert!(!seen.needs_update);

    let non_string = filter.decide(&document(json!({
        "id": "1",
        "text": ["not", "text"],
        "hash": content_hash("")
    })));
    assert!(!non_string.needs_update);
}

#[test]
fn non_string_stored_hash_never_matches() {
    let filter = ChangeFilter::new(&names());
    let decision = filter.decide(&document(json!({"id": "1", "text": "", "hash": 0})));
    assert!(decision.needs_update);
}

#[test]
fn hash_comparison_is_case_sensitive() {
    let filter = ChangeFilter::new(&names());
    let decision = filter.decide(&document(json!({
        "id": "1",
        "text": "abc",
        "hash": content_hash("abc").to_uppercase()
    })));
    assert!(decision.needs_update);
}

#[test]
fn uses_configured_embed_field() {
    let names = FieldNames::new("body", "digest", "embedding");
    let filter = ChangeFilter::new(&names);
    assert_eq!(filter.embed_field(), "body");

    let document = Document::from_value(
        json!({"id": "1", "text": "ignored", "body": "used", "digest": content_hash("used")}),
        &names,
    )
    .expect("should parse document");
    assert!(!filter.decide(&document).needs_update);
}

#[test]
fn decide_is_deterministic_and_leaves_input_alone() {
    let filter = ChangeFilter::new(&names());
    let doc = document(json!({"id": "1", "text": "hello", "hash": "stale"}));
    let before = doc.clone();

    let first = filter.decide(&doc);
    let second = filter.decide(&doc);

    assert_eq!(first, second);
    assert_eq!(doc, before);
}
