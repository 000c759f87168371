//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::thread;

use spilljoin_core::config::JoinConfig;
use spilljoin_core::frame::Frame;
use spilljoin_core::schema::{DataType, Field, Schema};
use spilljoin_core::types::{Scalar, Tuple};
use spilljoin_mem::Storage;
use spilljoin_operators::join::{JoinStats, MergeJoinChecker, MergeJoinOperator};
use spilljoin_operators::{CollectingWriter, OpError};

/// Encoded size of a `(key, tag)` row.
pub fn row_len() -> usize {
    row(0, 0).encoded_len()
}

/// A row carrying a sort key and a tag identifying the original position.
pub fn row(key: i64, tag: i64) -> Tuple {
    Tuple::new(vec![Scalar::I64(key), Scalar::I64(tag)])
}

/// Tag rows by position so duplicate keys stay distinguishable.
pub fn rows(keys: &[i64]) -> Vec<Tuple> {
    keys.iter()
        .enumerate()
        .map(|(i, k)| row(*k, i as i64))
        .collect()
}

pub fn schema(side: &str) -> Schema {
    Schema::new(vec![
        Field::new("k", DataType::Int64, true),
        Field::new(format!("{side}_tag"), DataType::Int64, false),
    ])
}

/// `frames` frames of `per_frame` rows each.
pub fn config(frames: usize, per_frame: usize, spill_dir: &str) -> JoinConfig {
    JoinConfig {
        memory_frames: frames,
        frame_size: row_len() * per_frame,
        spill_dir: spill_dir.to_string(),
        ..JoinConfig::default()
    }
}

pub fn temp_spill_dir(name: &str) -> String {
    let mut dir = std::env::temp_dir();
    dir.push(format!("spilljoin-tests-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir.to_string_lossy().to_string()
}

/// Sorted pseudo-random keys in `0..span` from a fixed seed.
pub fn sorted_keys(n: usize, span: i64, seed: u64) -> Vec<i64> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut keys: Vec<i64> = (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) % span as u64) as i64
        })
        .collect();
    keys.sort_unstable();
    keys
}

/// A joined row as `(left key, left tag, right key, right tag)`.
pub type Joined = (i64, i64, i64, i64);

pub fn joined(t: &Tuple) -> Joined {
    let int = |i: usize| match t.field(i) {
        Some(Scalar::I64(v)) => *v,
        other => panic!("unexpected field {i}: {other:?}"),
    };
    (int(0), int(1), int(2), int(3))
}

/// Feed `left` and `right` through a merge join, right side on its own thread.
pub fn run_join<C: MergeJoinChecker>(
    cfg: &JoinConfig,
    checker: C,
    left: Vec<Tuple>,
    right: Vec<Tuple>,
    storage: Arc<dyn Storage>,
) -> Result<(Vec<Joined>, JoinStats), OpError> {
    let (out, stats) = run_join_tuples(cfg, checker, left, right, storage)?;
    Ok((out.iter().map(joined).collect(), stats))
}

/// Like `run_join`, but hands back the raw result tuples.
pub fn run_join_tuples<C: MergeJoinChecker>(
    cfg: &JoinConfig,
    checker: C,
    left: Vec<Tuple>,
    right: Vec<Tuple>,
    storage: Arc<dyn Storage>,
) -> Result<(Vec<Tuple>, JoinStats), OpError> {
    let (mut lb, mut rb) =
        MergeJoinOperator::new(cfg, checker, schema("left"), schema("right"), storage)?;
    let left_frames = Frame::pack(cfg.frame_size, left);
    let right_frames = Frame::pack(cfg.frame_size, right);

    thread::scope(|s| {
        let producer = s.spawn(move || -> Result<(), OpError> {
            for f in right_frames {
                rb.next_frame(f)?;
            }
            rb.close()
        });

        let mut out = CollectingWriter::new();
        let driven = (|| {
            for f in left_frames {
                lb.next_frame(f, &mut out)?;
            }
            lb.close(&mut out)
        })();
        let produced = producer.join().expect("right producer panicked");
        let stats = driven?;
        produced?;
        Ok((out.into_tuples(), stats))
    })
}

/// Nested-loop reference: left order, then right order within each left row.
pub fn nested_loop(
    left: &[Tuple],
    right: &[Tuple],
    matches: impl Fn(i64, i64) -> bool,
) -> Vec<Joined> {
    let mut out = Vec::new();
    for l in left {
        for r in right {
            let (lk, rk) = match (l.field(0), r.field(0)) {
                (Some(Scalar::I64(a)), Some(Scalar::I64(b))) => (*a, *b),
                _ => continue,
            };
            if matches(lk, rk) {
                out.push(joined(&Tuple::concat(l, r)));
            }
        }
    }
    out
}

pub fn sorted(mut v: Vec<Joined>) -> Vec<Joined> {
    v.sort_unstable();
    v
}
