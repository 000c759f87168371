//! Record formats: the logical layout of the tuples flowing through a join.
//!
//! Tuples themselves are untyped `Vec<Scalar>`; the schema names the fields so
//! key columns can be resolved and the joined output can be described.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float32,
    Float64,
    Utf8,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Resolve a column name, failing with a schema error when it is absent.
    pub fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| Error::Schema(format!("column '{}' not found", name)))
    }

    /// Output format of a join: left fields followed by right fields.
    ///
    /// Right fields whose name collides with a left field get a `_right` suffix.
    pub fn concat(left: &Schema, right: &Schema) -> Schema {
        let mut fields = Vec::with_capacity(left.len() + right.len());
        fields.extend(left.fields.iter().cloned());
        for f in &right.fields {
            let mut f = f.clone();
            if left.index_of(&f.name).is_some() {
                f.name = format!("{}_right", f.name);
            }
            fields.push(f);
        }
        Schema { fields }
    }
}
