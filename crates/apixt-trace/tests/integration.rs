//! Integration tests for apixt-trace
//!
//! Exercises the public recorder API end to end: building a tree, halting
//! it at checkpoints, and reading back the serialized body.

use std::time::{Duration, Instant};

use apixt_trace::{BlockData, TimerRegistry, TraceError, Tree, parse_lines};
use serde_json::Value;

fn lines(tree: &mut Tree) -> Vec<Value> {
    parse_lines(&tree.body().unwrap()).unwrap()
}

fn block_names(lines: &[Value]) -> Vec<String> {
    lines
        .iter()
        .filter(|v| v["cmd"] == 6)
        .map(|v| v["name"].as_str().unwrap().to_string())
        .collect()
}

/// Nested records come out depth-first with children in creation order,
/// even when a later top-level record was created between them.
#[test]
fn test_nested_sections_serialize_depth_first() {
    let mut tree = Tree::new();

    let outer = tree.add_section("outer");
    tree.add_block_in(outer, "o1", BlockData::new(1));
    let inner = tree.add_section_in(outer, "inner");
    tree.add_block("top-level", BlockData::new(0));
    tree.add_block_in(inner, "i1", BlockData::new(2));
    tree.add_block_in(outer, "o2", BlockData::new(3));
    tree.close_section(inner);
    tree.close_section(outer);
    tree.end();

    let lines = lines(&mut tree);
    let shape: Vec<String> = lines
        .iter()
        .map(|v| match v["cmd"].as_u64().unwrap() {
            0 => "end".to_string(),
            1 => format!("open:{}", v["name"].as_str().unwrap()),
            2 => "close".to_string(),
            6 => v["name"].as_str().unwrap().to_string(),
            other => format!("cmd{other}"),
        })
        .collect();

    assert_eq!(
        shape,
        [
            "open:outer",
            "o1",
            "open:inner",
            "i1",
            "close",
            "o2",
            "close",
            "top-level",
            "end",
        ]
    );
}

/// One line per defined record when nothing halts.
#[test]
fn test_one_line_per_record() {
    let mut tree = Tree::new();
    let section = tree.add_section("s");
    for i in 0..5 {
        tree.add_block_in(section, format!("b{i}"), BlockData::new(i));
    }
    tree.close_section(section);
    tree.end();

    let lines = lines(&mut tree);
    assert_eq!(lines.len(), 1 + 5 + 1 + 1);
    assert!(tree.body().unwrap().is_empty());
}

#[test]
fn test_empty_section_is_balanced() {
    let mut tree = Tree::new();
    let section = tree.add_section("empty");
    tree.close_section(section);

    let lines = lines(&mut tree);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["cmd"], 1);
    assert_eq!(lines[0]["name"], "empty");
    assert_eq!(lines[1]["cmd"], 2);
}

#[test]
fn test_close_details_without_open_fails() {
    let mut tree = Tree::new();
    let section = tree.add_section("Response");

    let err = tree.close_details(section).unwrap_err();
    assert!(matches!(err, TraceError::Protocol(_)));
    assert!(err.to_string().contains("\"Response\""));
}

#[test]
fn test_stop_unknown_timer_fails() {
    let mut tree = Tree::new();
    let err = tree.stop_timer("unknown").unwrap_err();
    assert!(matches!(err, TraceError::Protocol(_)));
}

/// Overlapping starts of one timer charge a single interval.
#[test]
fn test_overlapping_timer_is_one_interval() {
    let base = Instant::now();
    let mut timers = TimerRegistry::new();

    timers.start_at("t", base);
    timers.start_at("t", base + Duration::from_millis(30));
    timers.stop_at("t", base + Duration::from_millis(40)).unwrap();
    timers.stop_at("t", base + Duration::from_millis(100)).unwrap();

    let results = timers.drain();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].runs, 2);
    assert_eq!(results[0].duration, Duration::from_millis(100));
}

#[test]
fn test_immediate_halt_at_checkpoint() {
    let mut tree = Tree::with_halt_token(Some("checkpointA"));
    let section = tree.add_section("handler");

    tree.add_block_in(section, "x", BlockData::new(1));
    tree.add_block_in(section, "checkpointA", BlockData::new(2));
    tree.add_block_in(section, "y", BlockData::new(3));

    assert!(tree.is_halted());
    assert_eq!(tree.halt().unwrap().stopped_at(), Some("checkpointA"));

    let lines = lines(&mut tree);
    assert_eq!(block_names(&lines), ["x", "checkpointA"]);

    let codes: Vec<u64> = lines.iter().map(|v| v["cmd"].as_u64().unwrap()).collect();
    assert_eq!(codes, [1, 6, 6, 2, 7, 0]);

    let abort = &lines[4];
    assert_eq!(abort["next"], "-checkpointA");
    assert_eq!(abort["status"], "Halted at checkpointA");
}

/// A resume token passes its checkpoint and halts at the block after it,
/// whatever that block is called.
#[test]
fn test_resume_token_halts_after_checkpoint() {
    let mut tree = Tree::with_halt_token(Some("-checkpointA"));

    tree.add_block("x", BlockData::new(0));
    assert!(!tree.is_halted());
    tree.add_block("checkpointA", BlockData::new(1));
    assert!(!tree.is_halted());
    tree.add_block("z", BlockData::new(2));
    assert!(tree.is_halted());
    tree.add_block("after", BlockData::new(3));

    assert_eq!(tree.halt().unwrap().stopped_at(), Some("z"));
    let lines = lines(&mut tree);
    assert_eq!(block_names(&lines), ["x", "checkpointA", "z"]);
    let abort = lines.iter().find(|v| v["cmd"] == 7).unwrap();
    assert_eq!(abort["next"], "-z");
}

/// A repeated checkpoint name counts as "the next block" once the first
/// occurrence has been passed.
#[test]
fn test_resume_token_with_repeated_checkpoint() {
    let mut tree = Tree::with_halt_token(Some("-checkpointA"));

    tree.add_block("checkpointA", BlockData::new(1));
    tree.add_block("checkpointA", BlockData::new(2));
    tree.add_block("z", BlockData::new(3));

    assert_eq!(tree.halt().unwrap().stopped_at(), Some("checkpointA"));
    let lines = lines(&mut tree);
    assert_eq!(block_names(&lines), ["checkpointA", "checkpointA"]);
}

#[test]
fn test_halt_closes_every_open_section() {
    let mut tree = Tree::with_halt_token(Some("deep"));
    let outer = tree.add_section("outer");
    let middle = tree.add_section_in(outer, "middle");
    tree.open_details(middle);
    let inner = tree.add_section_in(middle, "inner");
    tree.add_block_in(inner, "deep", BlockData::new(1));

    assert!(tree.is_section_closed(outer));
    assert!(tree.is_section_closed(middle));
    assert!(tree.is_section_closed(inner));

    let lines = lines(&mut tree);
    let opens = lines.iter().filter(|v| v["cmd"] == 1).count();
    let closes = lines.iter().filter(|v| v["cmd"] == 2).count();
    let details = lines.iter().filter(|v| v["cmd"] == 3 || v["cmd"] == 4).count();
    assert_eq!(opens, 3);
    assert_eq!(closes, 3);
    assert_eq!(details, 2);
    assert_eq!(lines.last().unwrap()["cmd"], 0);
}

/// Code that paired its details calls keeps working when a halt lands in
/// between: the late close is dropped, not rejected.
#[test]
fn test_halt_inside_details_accepts_late_close() {
    let mut tree = Tree::with_halt_token(Some("-Query"));
    let section = tree.add_section("Database");
    tree.open_details(section);
    tree.add_block_in(section, "Query", BlockData::new(1));
    tree.add_block_in(section, "Plan", BlockData::new(2));
    assert!(tree.is_halted());

    tree.close_details(section).unwrap();
    tree.add_block_in(section, "Rows", BlockData::new(3));
    tree.close_section(section);
    tree.end();

    let lines = lines(&mut tree);
    assert_eq!(block_names(&lines), ["Query", "Plan"]);
    let details = lines.iter().filter(|v| v["cmd"] == 3 || v["cmd"] == 4).count();
    assert_eq!(details, 2);
    assert_eq!(lines[lines.len() - 2]["next"], "-Plan");
    assert_eq!(lines.last().unwrap()["cmd"], 0);
}

#[test]
fn test_malformed_token_never_halts() {
    for token in [None, Some(""), Some("-"), Some("   ")] {
        let mut tree = Tree::with_halt_token(token);
        tree.add_block("", BlockData::new(1));
        tree.add_block("-", BlockData::new(2));
        assert!(tree.halt().is_none());
        assert!(!tree.is_halted());
    }
}

#[tokio::test]
async fn test_halt_signal_wakes_waiter() {
    let mut tree = Tree::with_halt_token(Some("stop"));
    let mut signal = tree.halt_signal();

    let waiter = tokio::spawn(async move {
        let woke = signal.wait_for(|halted| *halted).await.is_ok();
        woke
    });

    tree.add_block("go", BlockData::new(1));
    tree.add_block("stop", BlockData::new(2));

    let woke = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
    assert!(woke);
}

#[test]
fn test_timer_summary_block() {
    let mut tree = Tree::new();
    tree.start_timer("db");
    tree.stop_timer("db").unwrap();

    let summary = tree.drain_timers();
    let names: Vec<_> = summary.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["db", "total"]);

    tree.add_block("Execution Times", BlockData::json(&summary).unwrap());
    let lines = lines(&mut tree);
    assert_eq!(lines[0]["mime"], "text/json");
    assert_eq!(lines[0]["content"][0]["name"], "db");
    assert_eq!(lines[0]["content"][0]["runs"], 1);
    assert!(tree.timers().is_empty());
}
