use std::path::Path;

use kunit_harvest::harvest::{HarvestMode, Harvester};
use kunit_harvest::ktest::{KTest, KTestObject};

const WATCHED: [&str; 2] = ["x", "ret"];

fn record(objects: &[(&str, i32)]) -> Vec<u8> {
    KTest {
        version: 3,
        args: vec!["tests.bc".to_string()],
        sym_argvs: 0,
        sym_argv_len: 0,
        objects: objects
            .iter()
            .map(|(name, value)| KTestObject {
                name: name.to_string(),
                bytes: value.to_le_bytes().to_vec(),
            })
            .collect(),
    }
    .encode()
}

fn write(dir: &Path, ordinal: u32, bytes: &[u8]) {
    std::fs::write(dir.join(format!("test{ordinal:06}.ktest")), bytes).unwrap();
}

#[test]
fn test_records_are_fetched_in_ordinal_order() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), 1, &record(&[("x", -3), ("ret", -1)]));
    write(dir.path(), 2, &record(&[("ret", 0), ("x", 0)]));

    let mut harvester = Harvester::new(dir.path());
    let records = harvester.fetch_new_records(&WATCHED, HarvestMode::Live);

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].ordinal, 1);
    assert_eq!(records[0].get("x"), Some(&(-3i32).to_le_bytes()[..]));
    let names: Vec<_> = records[1].values.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, WATCHED);
    assert_eq!(harvester.next_ordinal(), 3);
}

#[test]
fn test_fetch_is_idempotent_without_new_files() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), 1, &record(&[("x", 1), ("ret", 1)]));

    let mut harvester = Harvester::new(dir.path());
    assert_eq!(harvester.fetch_new_records(&WATCHED, HarvestMode::Live).len(), 1);
    assert!(harvester.fetch_new_records(&WATCHED, HarvestMode::Live).is_empty());
    assert_eq!(harvester.records().len(), 1);

    write(dir.path(), 2, &record(&[("x", 2), ("ret", 1)]));
    let fresh = harvester.fetch_new_records(&WATCHED, HarvestMode::Live);
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].ordinal, 2);
    assert_eq!(harvester.records().len(), 2);
}

#[test]
fn test_gap_stops_the_scan() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), 2, &record(&[("x", 1), ("ret", 1)]));
    let mut harvester = Harvester::new(dir.path());
    assert!(harvester.fetch_new_records(&WATCHED, HarvestMode::Final).is_empty());
    assert_eq!(harvester.next_ordinal(), 1);
}

#[test]
fn test_partial_record_blocks_later_ones_while_live() {
    let dir = tempfile::tempdir().unwrap();
    let full = record(&[("x", 5), ("ret", 1)]);
    write(dir.path(), 1, &full[..full.len() - 3]);
    write(dir.path(), 2, &record(&[("x", 6), ("ret", 1)]));

    let mut harvester = Harvester::new(dir.path());
    assert!(harvester.fetch_new_records(&WATCHED, HarvestMode::Live).is_empty());
    assert_eq!(harvester.next_ordinal(), 1);

    // The engine finishes writing the first file.
    write(dir.path(), 1, &full);
    let records = harvester.fetch_new_records(&WATCHED, HarvestMode::Live);
    assert_eq!(records.iter().map(|r| r.ordinal).collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn test_record_missing_a_watched_name_is_incomplete() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), 1, &record(&[("x", 5)]));
    let mut harvester = Harvester::new(dir.path());
    assert!(harvester.fetch_new_records(&WATCHED, HarvestMode::Live).is_empty());
    assert!(harvester.skipped().is_empty());
}

#[test]
fn test_final_pass_skips_unusable_records() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), 1, b"KTEST\0\0");
    write(dir.path(), 2, &record(&[("x", 5)]));
    write(dir.path(), 3, &record(&[("x", 7), ("ret", 1)]));

    let mut harvester = Harvester::new(dir.path());
    let records = harvester.fetch_new_records(&WATCHED, HarvestMode::Final);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].ordinal, 3);
    assert_eq!(harvester.skipped(), &[1, 2]);
    assert_eq!(harvester.next_ordinal(), 4);
}

#[test]
fn test_unwatched_objects_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), 1, &record(&[("x", 1), ("ret", 1), ("scratch", 9)]));
    let mut harvester = Harvester::new(dir.path());
    let records = harvester.fetch_new_records(&WATCHED, HarvestMode::Live);
    assert_eq!(records[0].values.len(), 2);
    assert!(records[0].get("scratch").is_none());
}

#[test]
fn test_records_serialize_to_json() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), 1, &record(&[("x", 1), ("ret", 1)]));
    let mut harvester = Harvester::new(dir.path());
    harvester.fetch_new_records(&WATCHED, HarvestMode::Live);

    let json = serde_json::to_value(harvester.records()).unwrap();
    assert_eq!(json[0]["ordinal"], 1);
    assert_eq!(json[0]["values"][0]["name"], "x");
    assert_eq!(json[0]["values"][0]["bytes"], serde_json::json!([1, 0, 0, 0]));
}
