//! Scalar values and tuples.
//!
//! A `Tuple` is an ordered list of `Scalar` fields. The join never looks inside
//! a tuple itself; only the predicate delegate compares key fields. The
//! encoded length is the fixed-format footprint used for frame accounting.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::schema::DataType;

/// Bytes reserved per tuple for its slot offset inside a frame.
pub const TUPLE_SLOT_BYTES: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
}

impl Scalar {
    pub fn data_type(&self) -> DataType {
        match self {
            Scalar::Null => DataType::Utf8, // untyped; read as text
            Scalar::Bool(_) => DataType::Boolean,
            Scalar::I32(_) => DataType::Int32,
            Scalar::I64(_) => DataType::Int64,
            Scalar::F32(_) => DataType::Float32,
            Scalar::F64(_) => DataType::Float64,
            Scalar::Str(_) => DataType::Utf8,
            Scalar::Bin(_) => DataType::Binary,
        }
    }

    /// Encoded size: one tag byte plus the payload.
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            Scalar::Null => 0,
            Scalar::Bool(_) => 1,
            Scalar::I32(_) | Scalar::F32(_) => 4,
            Scalar::I64(_) | Scalar::F64(_) => 8,
            Scalar::Str(s) => 4 + s.len(),
            Scalar::Bin(b) => 4 + b.len(),
        }
    }

    /// Numeric view used by range predicates. `None` for non-numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::I32(v) => Some(*v as f64),
            Scalar::I64(v) => Some(*v as f64),
            Scalar::F32(v) => Some(*v as f64),
            Scalar::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

/// One record: an ordered list of fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tuple {
    pub fields: Vec<Scalar>,
}

impl Tuple {
    pub fn new(fields: Vec<Scalar>) -> Self {
        Self { fields }
    }

    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, idx: usize) -> Option<&Scalar> {
        self.fields.get(idx)
    }

    /// Fixed-format footprint of this tuple inside a frame.
    pub fn encoded_len(&self) -> usize {
        TUPLE_SLOT_BYTES + self.fields.iter().map(Scalar::encoded_len).sum::<usize>()
    }

    /// Concatenate a left and a right tuple into one output record.
    pub fn concat(left: &Tuple, right: &Tuple) -> Tuple {
        let mut fields = Vec::with_capacity(left.arity() + right.arity());
        fields.extend(left.fields.iter().cloned());
        fields.extend(right.fields.iter().cloned());
        Tuple { fields }
    }
}

impl From<Vec<Scalar>> for Tuple {
    fn from(fields: Vec<Scalar>) -> Self {
        Tuple { fields }
    }
}

/// Compare two scalar tuples lexicographically.
pub fn scalar_tuple_cmp(a: &[&Scalar], b: &[&Scalar]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match scalar_cmp(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Total order over scalars.
///
/// Nulls sort first and NaN sorts after every other number. Integers and
/// floats of any width compare by value; other mixed types order by variant.
pub fn scalar_cmp(a: &Scalar, b: &Scalar) -> Ordering {
    use Scalar::*;

    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Null, _) => Ordering::Less,
        (_, Null) => Ordering::Greater,
        (Bool(x), Bool(y)) => x.cmp(y),
        (I32(x), I32(y)) => x.cmp(y),
        (I64(x), I64(y)) => x.cmp(y),
        (I32(x), I64(y)) => (*x as i64).cmp(y),
        (I64(x), I32(y)) => x.cmp(&(*y as i64)),
        (F32(x), F32(y)) => float_cmp(*x as f64, *y as f64),
        (F64(x), F64(y)) => float_cmp(*x, *y),
        (F32(x), F64(y)) => float_cmp(*x as f64, *y),
        (F64(x), F32(y)) => float_cmp(*x, *y as f64),
        (I32(x), F32(y)) => int_float_cmp(*x as i64, *y as f64),
        (I32(x), F64(y)) => int_float_cmp(*x as i64, *y),
        (I64(x), F32(y)) => int_float_cmp(*x, *y as f64),
        (I64(x), F64(y)) => int_float_cmp(*x, *y),
        (F32(_) | F64(_), I32(_) | I64(_)) => scalar_cmp(b, a).reverse(),
        (Str(x), Str(y)) => x.cmp(y),
        (Bin(x), Bin(y)) => x.cmp(y),
        // Mixed types: order by variant order
        _ => scalar_type_order(a).cmp(&scalar_type_order(b)),
    }
}

fn float_cmp(x: f64, y: f64) -> Ordering {
    if x.is_nan() && y.is_nan() {
        Ordering::Equal
    } else if x.is_nan() {
        Ordering::Greater
    } else if y.is_nan() {
        Ordering::Less
    } else {
        x.partial_cmp(&y).unwrap_or(Ordering::Equal)
    }
}

/// Exact order of an integer against a float.
fn int_float_cmp(i: i64, f: f64) -> Ordering {
    if f.is_nan() {
        return Ordering::Less;
    }
    match (i as f64).partial_cmp(&f) {
        // `i as f64` may round; a tie means `f` is integral, so settle it in i64.
        Some(Ordering::Equal) if f >= 9_223_372_036_854_775_808.0 => Ordering::Less,
        Some(Ordering::Equal) => i.cmp(&(f as i64)),
        Some(o) => o,
        None => Ordering::Equal,
    }
}

/// Assign a numeric order to scalar types for mixed-type comparisons.
fn scalar_type_order(s: &Scalar) -> u8 {
    use Scalar::*;
    match s {
        Null => 0,
        Bool(_) => 1,
        I32(_) => 2,
        I64(_) => 3,
        F32(_) => 4,
        F64(_) => 5,
        Str(_) => 6,
        Bin(_) => 7,
    }
}
