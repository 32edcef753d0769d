use std::fs;
use std::path::Path;

use convo_core::{DonePolicy, RecordStatus, ResponseRecord, ShardPlan};
use convo_engine::{read_done_set, Ledger, OutputNaming, Transcript};
use pretty_assertions::assert_eq;

fn record(prompt: &str, status: RecordStatus) -> ResponseRecord {
    let mut record = ResponseRecord::failed("train", "kimi", prompt, "https://kimi.example/chat/abcdefghijkl", "");
    record.status = status;
    if status != RecordStatus::Error {
        record.response_text = format!("answer to {prompt}");
    }
    record
}

fn write_lines(path: &Path, records: &[ResponseRecord], extra: &[&str]) {
    let mut content = String::new();
    for r in records {
        content.push_str(&serde_json::to_string(r).unwrap());
        content.push('\n');
    }
    for line in extra {
        content.push_str(line);
        content.push('\n');
    }
    fs::write(path, content).unwrap();
}

#[test]
fn load_prunes_everything_but_ok_records() {
    engine_logging::initialize_for_tests();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kimi_conversations_train.ndjson");
    write_lines(
        &path,
        &[
            record("alpha", RecordStatus::Ok),
            record("beta", RecordStatus::Error),
            record(" gamma ", RecordStatus::Ok),
            record("delta", RecordStatus::Empty),
        ],
        &["{not json", ""],
    );

    let ledger = Ledger::new(&path, DonePolicy::OkOnly);
    let loaded = ledger.load().unwrap();

    let mut done: Vec<String> = loaded.done.into_iter().collect();
    done.sort();
    assert_eq!(done, vec!["alpha".to_string(), "gamma".to_string()]);
    assert_eq!(loaded.kept, 2);
    assert_eq!(loaded.pruned, 2);
    assert_eq!(loaded.malformed, 1);

    let remaining: Vec<ResponseRecord> = fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|r| r.status == RecordStatus::Ok));
}

#[test]
fn empty_records_count_as_done_under_ok_or_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.ndjson");
    write_lines(
        &path,
        &[record("a", RecordStatus::Empty), record("b", RecordStatus::Error)],
        &[],
    );

    let loaded = Ledger::new(&path, DonePolicy::OkOrEmpty).load().unwrap();
    assert!(loaded.done.contains("a"));
    assert!(!loaded.done.contains("b"));
}

#[test]
fn missing_ledger_is_empty_and_not_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.ndjson");
    let loaded = Ledger::new(&path, DonePolicy::OkOnly).load().unwrap();
    assert!(loaded.done.is_empty());
    assert!(!path.exists());
}

#[test]
fn appended_records_are_seen_by_the_next_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.ndjson");
    let ledger = Ledger::new(&path, DonePolicy::OkOnly);

    ledger.append(&[record("one", RecordStatus::Ok)]).unwrap();
    ledger
        .append(&[record("two", RecordStatus::Ok), record("three", RecordStatus::Ok)])
        .unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    assert_eq!(raw.lines().count(), 3);
    assert!(raw.ends_with('\n'));

    let loaded = ledger.load().unwrap();
    assert_eq!(loaded.done.len(), 3);
    assert_eq!(loaded.pruned, 0);
    assert_eq!(fs::read_to_string(&path).unwrap(), raw);
}

#[test]
fn sibling_shard_ledgers_are_read_without_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let own = OutputNaming::new("kimi", "train", ShardPlan::new(0, 2).unwrap());
    let other = OutputNaming::new("kimi", "train", ShardPlan::new(1, 2).unwrap());
    let unrelated = OutputNaming::new("kimi", "test", ShardPlan::single());

    let other_path = dir.path().join(other.ledger_file_name());
    write_lines(
        &other_path,
        &[record("x", RecordStatus::Ok), record("y", RecordStatus::Error)],
        &[],
    );
    let before = fs::read_to_string(&other_path).unwrap();
    write_lines(
        &dir.path().join(unrelated.ledger_file_name()),
        &[record("z", RecordStatus::Ok)],
        &[],
    );

    let siblings = own.sibling_ledgers(dir.path()).unwrap();
    assert_eq!(siblings, vec![other_path.clone()]);

    let done = read_done_set(&other_path, DonePolicy::OkOnly).unwrap();
    assert_eq!(done.len(), 1);
    assert!(done.contains("x"));
    assert_eq!(fs::read_to_string(&other_path).unwrap(), before);
}

#[test]
fn transcript_sections_follow_ledger_order() {
    let dir = tempfile::tempdir().unwrap();
    let transcript = Transcript::new(dir.path().join("t.md"));
    transcript
        .append(&[record("first", RecordStatus::Ok), record("second", RecordStatus::Ok)])
        .unwrap();
    let text = fs::read_to_string(transcript.path()).unwrap();
    let first = text.find("## Prompt\n\nfirst").unwrap();
    let second = text.find("## Prompt\n\nsecond").unwrap();
    assert!(first < second);
    assert_eq!(text.matches("---\n").count(), 2);
}
