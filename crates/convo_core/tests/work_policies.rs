use convo_core::{
    dedupe_citations, BreakerState, CircuitBreaker, CitationEntry, DonePolicy, RecordStatus,
    ResponseRecord,
};
use pretty_assertions::assert_eq;

#[test]
fn breaker_trips_after_five_consecutive_failures() {
    let mut breaker = CircuitBreaker::default();
    for _ in 0..4 {
        assert_eq!(breaker.record_failure(), BreakerState::Closed);
    }
    assert_eq!(breaker.record_failure(), BreakerState::Tripped);
    assert_eq!(breaker.consecutive_failures(), 0);
}

#[test]
fn success_resets_breaker() {
    let mut breaker = CircuitBreaker::new(2);
    assert_eq!(breaker.record_failure(), BreakerState::Closed);
    breaker.record_success();
    assert_eq!(breaker.record_failure(), BreakerState::Closed);
    assert_eq!(breaker.record_failure(), BreakerState::Tripped);
}

#[test]
fn duplicate_href_keeps_first_position() {
    let entries = vec![
        CitationEntry::new("https://a", "A", ""),
        CitationEntry::new("https://b", "B first", "s1"),
        CitationEntry::new("https://c", "C", ""),
        CitationEntry::new("https://d", "D", ""),
        CitationEntry::new("https://b", "B again", "s2"),
    ];
    let deduped = dedupe_citations(entries);
    let hrefs: Vec<&str> = deduped.iter().map(|c| c.href.as_str()).collect();
    assert_eq!(hrefs, vec!["https://a", "https://b", "https://c", "https://d"]);
    assert_eq!(deduped[1].title, "B first");
}

#[test]
fn failed_record_round_trips_as_ndjson_line() {
    let record = ResponseRecord::failed(
        "train",
        "deepseek",
        "  hello  ",
        "https://chat.example.com/a/chat/s/0123456789abcdef",
        "boom",
    );
    assert_eq!(record.status, RecordStatus::Error);
    assert_eq!(record.conversation_id, "0123456789abcdef");
    assert_eq!(record.prompt_key(), "hello");
    assert!(!DonePolicy::OkOnly.is_done_record(&record));

    let line = serde_json::to_string(&record).unwrap();
    assert!(line.contains("\"status\":\"error\""));
    assert!(line.contains("\"error_message\":\"boom\""));
    let back: ResponseRecord = serde_json::from_str(&line).unwrap();
    assert_eq!(back, record);
}

#[test]
fn sparse_legacy_line_still_parses() {
    let line = r#"{"task_id":"t","prompt_text":"p","status":"ok"}"#;
    let record: ResponseRecord = serde_json::from_str(line).unwrap();
    assert_eq!(record.status, RecordStatus::Ok);
    assert!(record.citations.is_empty());
}
