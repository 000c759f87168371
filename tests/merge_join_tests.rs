//! End-to-end merge join behaviour against a nested-loop reference.

mod common;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use common::*;
use spilljoin_core::types::{Scalar, Tuple};
use spilljoin_io::{build_storage, MemoryStorage};
use spilljoin_mem::error::{Error as MemError, Result as MemResult};
use spilljoin_mem::Storage;
use spilljoin_operators::join::{
    BandJoinChecker, EquiJoinChecker, JoinCondition, MergeJoinChecker, MergeJoinOperator,
};
use spilljoin_operators::OpError;

fn equi() -> EquiJoinChecker {
    EquiJoinChecker::new(vec![0], vec![0]).unwrap()
}

#[test]
fn duplicate_keys_overflow_a_one_frame_window() {
    let storage = MemoryStorage::new();
    let left = rows(&[1, 2, 2, 5]);
    let right = rows(&[2, 2, 3]);

    let (out, stats) = run_join(
        &config(1, 2, "memory://it-overflow"),
        equi(),
        left.clone(),
        right.clone(),
        Arc::new(storage.clone()),
    )
    .unwrap();

    assert_eq!(out.len(), 4);
    assert_eq!(sorted(out), sorted(nested_loop(&left, &right, |l, r| l == r)));
    assert_eq!(stats.spill_points, vec![2]);
    assert_eq!(stats.emitted, 4);
    assert!(storage.is_empty());
}

#[test]
fn without_pressure_no_run_file_is_created() {
    let storage = MemoryStorage::new();
    let left = rows(&sorted_keys(200, 50, 1));
    let right = rows(&sorted_keys(150, 50, 2));

    let (out, stats) = run_join(
        &config(64, 16, "memory://it-ample"),
        equi(),
        left.clone(),
        right.clone(),
        Arc::new(storage.clone()),
    )
    .unwrap();

    assert_eq!(stats.spills, 0);
    assert_eq!(stats.spilled_left_tuples, 0);
    assert_eq!(sorted(out), sorted(nested_loop(&left, &right, |l, r| l == r)));
}

#[test]
fn unique_right_keys_keep_left_order_while_spilling() {
    let storage = MemoryStorage::new();
    // Every left key is >= 3, so right keys 0..=2 alone overflow the window.
    let left_keys: Vec<i64> = sorted_keys(80, 45, 7).into_iter().map(|k| k + 3).collect();
    let right_keys: Vec<i64> = (0..50).collect();
    let left = rows(&left_keys);
    let right = rows(&right_keys);

    let (out, stats) = run_join(
        &config(1, 2, "memory://it-order"),
        equi(),
        left.clone(),
        right.clone(),
        Arc::new(storage.clone()),
    )
    .unwrap();

    assert!(stats.spills >= 1);
    assert_eq!(out, nested_loop(&left, &right, |l, r| l == r));
    assert!(storage.is_empty());
}

#[test]
fn duplicates_on_both_sides_survive_every_small_budget() {
    for (frames, per_frame) in [(1, 1), (1, 2), (2, 2), (1, 3), (3, 1)] {
        for seed in 0..4u64 {
            let storage = MemoryStorage::new();
            let left = rows(&sorted_keys(60, 12, seed));
            let right = rows(&sorted_keys(40, 12, seed + 100));
            let dir = format!("memory://it-dups-{frames}-{per_frame}-{seed}");

            let (out, stats) = run_join(
                &config(frames, per_frame, &dir),
                equi(),
                left.clone(),
                right.clone(),
                Arc::new(storage.clone()),
            )
            .unwrap();

            assert_eq!(
                sorted(out),
                sorted(nested_loop(&left, &right, |l, r| l == r)),
                "budget {frames}x{per_frame}, seed {seed}"
            );
            assert!(stats.peak_window_tuples <= (frames * per_frame) as u64);
            assert_eq!(stats.left_tuples, 60);
            assert_eq!(stats.right_tuples, 40);
            assert!(storage.is_empty(), "run files left for seed {seed}");
        }
    }
}

#[test]
fn band_join_matches_brute_force() {
    for (frames, per_frame) in [(1, 2), (2, 3), (16, 16)] {
        let storage = MemoryStorage::new();
        let left = rows(&sorted_keys(50, 40, 11));
        let right = rows(&sorted_keys(50, 40, 12));

        let (out, stats) = run_join(
            &config(frames, per_frame, "memory://it-band"),
            BandJoinChecker::new(0, 0, 2.0, 1.0).unwrap(),
            left.clone(),
            right.clone(),
            Arc::new(storage.clone()),
        )
        .unwrap();

        let expected = nested_loop(&left, &right, |l, r| l - 2 <= r && r <= l + 1);
        assert_eq!(sorted(out), sorted(expected));
        assert!(stats.peak_window_tuples <= (frames * per_frame) as u64);
    }
}

#[test]
fn condition_built_from_column_names() {
    let storage = MemoryStorage::new();
    let left = rows(&[1, 3, 3, 4]);
    let right = rows(&[3, 4, 4]);
    let checker = JoinCondition::equi("k", "k")
        .build(&schema("left"), &schema("right"))
        .unwrap();

    let (out, _) = run_join(
        &config(1, 2, "memory://it-named"),
        checker,
        left.clone(),
        right.clone(),
        Arc::new(storage),
    )
    .unwrap();
    assert_eq!(sorted(out), sorted(nested_loop(&left, &right, |l, r| l == r)));
}

#[test]
fn unknown_key_column_is_rejected() {
    let err = JoinCondition::equi("missing", "k")
        .build(&schema("left"), &schema("right"))
        .err()
        .expect("should fail");
    assert!(matches!(err, OpError::Config(_)));
}

#[test]
fn null_keys_never_match() {
    let storage = MemoryStorage::new();
    let null_row = |tag| Tuple::new(vec![Scalar::Null, Scalar::I64(tag)]);
    let left = vec![null_row(0), null_row(1), row(1, 2)];
    let right = vec![null_row(0), row(1, 1)];

    let (out, _) = run_join(
        &config(2, 2, "memory://it-nulls"),
        equi(),
        left,
        right,
        Arc::new(storage),
    )
    .unwrap();
    assert_eq!(out, vec![(1, 2, 1, 1)]);
}

#[test]
fn empty_inputs_produce_nothing() {
    let storage = MemoryStorage::new();
    let (out, stats) = run_join(
        &config(1, 2, "memory://it-empty"),
        equi(),
        rows(&[1, 2, 3]),
        Vec::new(),
        Arc::new(storage.clone()),
    )
    .unwrap();
    assert!(out.is_empty());
    assert_eq!(stats.right_tuples, 0);

    let (out, _) = run_join(
        &config(1, 2, "memory://it-empty"),
        equi(),
        Vec::new(),
        rows(&[1, 2, 3]),
        Arc::new(storage.clone()),
    )
    .unwrap();
    assert!(out.is_empty());
    assert!(storage.is_empty());
}

#[test]
fn zero_frame_budget_is_a_config_error() {
    let err = run_join(
        &config(0, 2, "memory://it-zero"),
        equi(),
        rows(&[1]),
        rows(&[1]),
        Arc::new(MemoryStorage::new()),
    )
    .err()
    .expect("should fail");
    assert!(matches!(err, OpError::Config(_)));
}

fn run_files_in(dir: &str) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.ends_with(".run"))
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[test]
fn filesystem_run_files_are_removed_after_the_join() {
    let dir = temp_spill_dir("fs-cleanup");
    let cfg = config(1, 2, &dir);
    let storage = build_storage(&cfg).expect("fs storage");
    let left = rows(&sorted_keys(40, 8, 3));
    let right = rows(&sorted_keys(30, 8, 4));

    let (out, stats) = run_join(&cfg, equi(), left.clone(), right.clone(), storage).unwrap();

    assert!(stats.spills >= 1);
    assert_eq!(sorted(out), sorted(nested_loop(&left, &right, |l, r| l == r)));
    assert!(run_files_in(&dir).is_empty());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn file_scheme_prefix_is_accepted() {
    let dir = temp_spill_dir("fs-scheme");
    let cfg = config(1, 2, &format!("file://{dir}"));
    let storage = build_storage(&cfg).expect("fs storage");

    let (out, stats) = run_join(&cfg, equi(), rows(&[1, 2, 2, 5]), rows(&[2, 2, 3]), storage)
        .unwrap();
    assert_eq!(out.len(), 4);
    assert_eq!(stats.spills, 1);
    assert!(run_files_in(&dir).is_empty());
    let _ = std::fs::remove_dir_all(&dir);
}

/// Accepts reads and deletes but refuses every write.
struct FullDisk;

impl Storage for FullDisk {
    fn write(&self, _path: &str, _bytes: &[u8]) -> MemResult<()> {
        Err(MemError::Storage("no space left on device".into()))
    }
    fn append(&self, _path: &str, _bytes: &[u8]) -> MemResult<()> {
        Err(MemError::Storage("no space left on device".into()))
    }
    fn read_range(&self, path: &str, _offset: u64, _len: usize) -> MemResult<Vec<u8>> {
        Err(MemError::Storage(format!("{path} not found")))
    }
    fn delete(&self, _path: &str) -> MemResult<()> {
        Ok(())
    }
    fn list(&self, _prefix: &str) -> MemResult<Vec<String>> {
        Ok(Vec::new())
    }
    fn size(&self, path: &str) -> MemResult<u64> {
        Err(MemError::Storage(format!("{path} not found")))
    }
}

#[test]
fn spill_failure_surfaces_as_a_spill_error() {
    let err = run_join(
        &config(1, 2, "/unused"),
        equi(),
        rows(&[1, 2, 2, 5]),
        rows(&[2, 2, 3]),
        Arc::new(FullDisk),
    )
    .err()
    .expect("should fail");
    assert!(matches!(err, OpError::Spill(_)), "got {err:?}");
}

#[test]
fn full_disk_is_harmless_when_nothing_spills() {
    let (out, stats) = run_join(
        &config(8, 8, "/unused"),
        equi(),
        rows(&[1, 2, 2, 5]),
        rows(&[2, 2, 3]),
        Arc::new(FullDisk),
    )
    .unwrap();
    assert_eq!(out.len(), 4);
    assert_eq!(stats.spills, 0);
}

#[test]
fn result_schema_suffixes_clashing_names() {
    let (left, _right) = MergeJoinOperator::new(
        &config(1, 2, "memory://it-schema"),
        equi(),
        schema("left"),
        schema("right"),
        Arc::new(MemoryStorage::new()),
    )
    .unwrap();
    let names: Vec<&str> = left
        .result_format()
        .fields
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(names, vec!["k", "left_tag", "k_right", "right_tag"]);
}

#[derive(Default)]
struct EvictionLog {
    evicted: HashSet<i64>,
    evictions: usize,
    revisited: Vec<i64>,
}

/// Delegates to `inner` and records every right row it was asked about after
/// that row had been evicted from the window.
struct EvictionAudit<C> {
    inner: C,
    log: Arc<Mutex<EvictionLog>>,
}

fn right_tag(t: &Tuple) -> i64 {
    match t.field(1) {
        Some(Scalar::I64(v)) => *v,
        other => panic!("right row without a tag: {other:?}"),
    }
}

impl<C: MergeJoinChecker> EvictionAudit<C> {
    fn visit(&self, right: &Tuple) {
        let tag = right_tag(right);
        let mut log = self.log.lock().unwrap();
        if log.evicted.contains(&tag) {
            log.revisited.push(tag);
        }
    }
}

impl<C: MergeJoinChecker> MergeJoinChecker for EvictionAudit<C> {
    fn check_to_load_next_right_tuple(
        &self,
        left: &Tuple,
        right: &Tuple,
    ) -> Result<bool, OpError> {
        self.inner.check_to_load_next_right_tuple(left, right)
    }

    fn check_to_save_in_memory(&self, left: &Tuple, right: &Tuple) -> Result<bool, OpError> {
        self.inner.check_to_save_in_memory(left, right)
    }

    fn check_to_save_in_result(
        &self,
        left: &Tuple,
        right: &Tuple,
        is_reversed: bool,
    ) -> Result<bool, OpError> {
        self.visit(if is_reversed { left } else { right });
        self.inner.check_to_save_in_result(left, right, is_reversed)
    }

    fn check_to_remove_in_memory(&self, left: &Tuple, right: &Tuple) -> Result<bool, OpError> {
        self.visit(right);
        let remove = self.inner.check_to_remove_in_memory(left, right)?;
        if remove {
            let mut log = self.log.lock().unwrap();
            log.evicted.insert(right_tag(right));
            log.evictions += 1;
        }
        Ok(remove)
    }
}

#[test]
fn evicted_window_entries_are_never_consulted_again() {
    for (frames, per_frame) in [(1, 2), (1, 1), (2, 2)] {
        for seed in 0..3u64 {
            let storage = MemoryStorage::new();
            let log = Arc::new(Mutex::new(EvictionLog::default()));
            let audit = EvictionAudit {
                inner: equi(),
                log: log.clone(),
            };
            let left = rows(&sorted_keys(50, 10, seed + 20));
            let right = rows(&sorted_keys(40, 10, seed + 40));

            let (out, _) = run_join(
                &config(frames, per_frame, "memory://it-evict"),
                audit,
                left.clone(),
                right.clone(),
                Arc::new(storage.clone()),
            )
            .unwrap();

            assert_eq!(sorted(out), sorted(nested_loop(&left, &right, |l, r| l == r)));
            let log = log.lock().unwrap();
            assert!(log.evictions > 0, "budget {frames}x{per_frame}, seed {seed}");
            assert!(
                log.revisited.is_empty(),
                "evicted rows consulted again: {:?}",
                log.revisited
            );
            assert!(storage.is_empty());
        }
    }
}

#[test]
fn band_eviction_is_final_too() {
    let log = Arc::new(Mutex::new(EvictionLog::default()));
    let audit = EvictionAudit {
        inner: BandJoinChecker::new(0, 0, 1.0, 2.0).unwrap(),
        log: log.clone(),
    };
    let left = rows(&sorted_keys(40, 30, 5));
    let right = rows(&sorted_keys(40, 30, 6));

    let (out, _) = run_join(
        &config(1, 2, "memory://it-evict-band"),
        audit,
        left.clone(),
        right.clone(),
        Arc::new(MemoryStorage::new()),
    )
    .unwrap();

    let expected = nested_loop(&left, &right, |l, r| l - 1 <= r && r <= l + 2);
    assert_eq!(sorted(out), sorted(expected));
    assert!(log.lock().unwrap().revisited.is_empty());
}
