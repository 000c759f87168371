//! Join predicates consulted by the merge join at four decision points.
//!
//! For each left tuple the engine asks whether to pull the next right tuple,
//! whether a pulled right tuple belongs in the window, and then, for every
//! window entry from newest to oldest, whether to emit the pair and whether
//! the entry can be dropped. Both inputs are sorted ascending on their keys.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use spilljoin_core::schema::Schema;
use spilljoin_core::types::{scalar_tuple_cmp, Scalar, Tuple};

use crate::traits::OpError;

pub trait MergeJoinChecker: Send + Sync {
    /// Should the right cursor advance past `right` for the current `left`?
    fn check_to_load_next_right_tuple(&self, left: &Tuple, right: &Tuple)
        -> Result<bool, OpError>;

    /// Should `right` be buffered in the window?
    fn check_to_save_in_memory(&self, left: &Tuple, right: &Tuple) -> Result<bool, OpError>;

    /// Does the pair join? With `is_reversed` the first argument is the right tuple.
    fn check_to_save_in_result(
        &self,
        left: &Tuple,
        right: &Tuple,
        is_reversed: bool,
    ) -> Result<bool, OpError>;

    /// Can the window entry `right` never match `left` or any later left tuple?
    fn check_to_remove_in_memory(&self, left: &Tuple, right: &Tuple) -> Result<bool, OpError>;
}

impl<C: MergeJoinChecker + ?Sized> MergeJoinChecker for Box<C> {
    fn check_to_load_next_right_tuple(
        &self,
        left: &Tuple,
        right: &Tuple,
    ) -> Result<bool, OpError> {
        (**self).check_to_load_next_right_tuple(left, right)
    }

    fn check_to_save_in_memory(&self, left: &Tuple, right: &Tuple) -> Result<bool, OpError> {
        (**self).check_to_save_in_memory(left, right)
    }

    fn check_to_save_in_result(
        &self,
        left: &Tuple,
        right: &Tuple,
        is_reversed: bool,
    ) -> Result<bool, OpError> {
        (**self).check_to_save_in_result(left, right, is_reversed)
    }

    fn check_to_remove_in_memory(&self, left: &Tuple, right: &Tuple) -> Result<bool, OpError> {
        (**self).check_to_remove_in_memory(left, right)
    }
}

fn key<'a>(tuple: &'a Tuple, idx: usize, side: &str) -> Result<&'a Scalar, OpError> {
    tuple.field(idx).ok_or_else(|| {
        OpError::Predicate(format!(
            "{side} key column {idx} out of range for tuple of arity {}",
            tuple.arity()
        ))
    })
}

/// Equality on one or more key columns, compared lexicographically.
///
/// Every right tuple the cursor passes is buffered; entries that sort below
/// the current left key are evicted on the next scan. Null keys never match.
#[derive(Debug, Clone)]
pub struct EquiJoinChecker {
    left_keys: Vec<usize>,
    right_keys: Vec<usize>,
}

impl EquiJoinChecker {
    pub fn new(left_keys: Vec<usize>, right_keys: Vec<usize>) -> Result<Self, OpError> {
        if left_keys.is_empty() || left_keys.len() != right_keys.len() {
            return Err(OpError::Config(format!(
                "equi join needs the same non-zero number of keys on both sides (got {} and {})",
                left_keys.len(),
                right_keys.len()
            )));
        }
        Ok(Self {
            left_keys,
            right_keys,
        })
    }

    fn keys<'a>(
        &self,
        tuple: &'a Tuple,
        idxs: &[usize],
        side: &str,
    ) -> Result<Vec<&'a Scalar>, OpError> {
        idxs.iter().map(|&i| key(tuple, i, side)).collect()
    }

    fn compare(&self, left: &Tuple, right: &Tuple) -> Result<Ordering, OpError> {
        let l = self.keys(left, &self.left_keys, "left")?;
        let r = self.keys(right, &self.right_keys, "right")?;
        Ok(scalar_tuple_cmp(&l, &r))
    }
}

impl MergeJoinChecker for EquiJoinChecker {
    fn check_to_load_next_right_tuple(
        &self,
        left: &Tuple,
        right: &Tuple,
    ) -> Result<bool, OpError> {
        Ok(self.compare(left, right)? != Ordering::Less)
    }

    fn check_to_save_in_memory(&self, _left: &Tuple, _right: &Tuple) -> Result<bool, OpError> {
        Ok(true)
    }

    fn check_to_save_in_result(
        &self,
        left: &Tuple,
        right: &Tuple,
        is_reversed: bool,
    ) -> Result<bool, OpError> {
        let (l, r) = if is_reversed {
            (
                self.keys(right, &self.left_keys, "left")?,
                self.keys(left, &self.right_keys, "right")?,
            )
        } else {
            (
                self.keys(left, &self.left_keys, "left")?,
                self.keys(right, &self.right_keys, "right")?,
            )
        };
        if l.iter().chain(r.iter()).any(|s| s.is_null()) {
            return Ok(false);
        }
        Ok(scalar_tuple_cmp(&l, &r) == Ordering::Equal)
    }

    fn check_to_remove_in_memory(&self, left: &Tuple, right: &Tuple) -> Result<bool, OpError> {
        Ok(self.compare(left, right)? == Ordering::Greater)
    }
}

/// Range join on one numeric key: `left - lower <= right <= left + upper`.
///
/// Null keys never match; a non-numeric, non-null key is a predicate error.
#[derive(Debug, Clone)]
pub struct BandJoinChecker {
    left_key: usize,
    right_key: usize,
    lower: f64,
    upper: f64,
}

impl BandJoinChecker {
    pub fn new(left_key: usize, right_key: usize, lower: f64, upper: f64) -> Result<Self, OpError> {
        if !(lower.is_finite() && upper.is_finite()) || lower < 0.0 || upper < 0.0 {
            return Err(OpError::Config(format!(
                "band bounds must be finite and non-negative (got lower={lower}, upper={upper})"
            )));
        }
        Ok(Self {
            left_key,
            right_key,
            lower,
            upper,
        })
    }

    fn value(tuple: &Tuple, idx: usize, side: &str) -> Result<Option<f64>, OpError> {
        let s = key(tuple, idx, side)?;
        if s.is_null() {
            return Ok(None);
        }
        s.as_f64().map(Some).ok_or_else(|| {
            OpError::Predicate(format!(
                "band join needs a numeric {side} key, got {:?}",
                s.data_type()
            ))
        })
    }

    fn pair(&self, left: &Tuple, right: &Tuple) -> Result<(Option<f64>, Option<f64>), OpError> {
        Ok((
            Self::value(left, self.left_key, "left")?,
            Self::value(right, self.right_key, "right")?,
        ))
    }
}

impl MergeJoinChecker for BandJoinChecker {
    fn check_to_load_next_right_tuple(
        &self,
        left: &Tuple,
        right: &Tuple,
    ) -> Result<bool, OpError> {
        Ok(match self.pair(left, right)? {
            // nulls sort first
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(l), Some(r)) => r <= l + self.upper,
        })
    }

    fn check_to_save_in_memory(&self, left: &Tuple, right: &Tuple) -> Result<bool, OpError> {
        Ok(match self.pair(left, right)? {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(l), Some(r)) => r >= l - self.lower,
        })
    }

    fn check_to_save_in_result(
        &self,
        left: &Tuple,
        right: &Tuple,
        is_reversed: bool,
    ) -> Result<bool, OpError> {
        let (l, r) = if is_reversed {
            let (r, l) = (
                Self::value(left, self.right_key, "right")?,
                Self::value(right, self.left_key, "left")?,
            );
            (l, r)
        } else {
            self.pair(left, right)?
        };
        Ok(match (l, r) {
            (Some(l), Some(r)) => l - self.lower <= r && r <= l + self.upper,
            _ => false,
        })
    }

    fn check_to_remove_in_memory(&self, left: &Tuple, right: &Tuple) -> Result<bool, OpError> {
        Ok(match self.pair(left, right)? {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(l), Some(r)) => r < l - self.lower,
        })
    }
}

/// Serializable join condition, resolved against the input formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JoinCondition {
    Equi {
        left_keys: Vec<String>,
        right_keys: Vec<String>,
    },
    Band {
        left_key: String,
        right_key: String,
        lower: f64,
        upper: f64,
    },
}

impl JoinCondition {
    pub fn equi(left: impl Into<String>, right: impl Into<String>) -> Self {
        JoinCondition::Equi {
            left_keys: vec![left.into()],
            right_keys: vec![right.into()],
        }
    }

    pub fn build(
        &self,
        left: &Schema,
        right: &Schema,
    ) -> Result<Box<dyn MergeJoinChecker>, OpError> {
        match self {
            JoinCondition::Equi {
                left_keys,
                right_keys,
            } => {
                let l = left_keys
                    .iter()
                    .map(|k| left.require(k))
                    .collect::<Result<Vec<_>, _>>()?;
                let r = right_keys
                    .iter()
                    .map(|k| right.require(k))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Box::new(EquiJoinChecker::new(l, r)?))
            }
            JoinCondition::Band {
                left_key,
                right_key,
                lower,
                upper,
            } => Ok(Box::new(BandJoinChecker::new(
                left.require(left_key)?,
                right.require(right_key)?,
                *lower,
                *upper,
            )?)),
        }
    }
}
