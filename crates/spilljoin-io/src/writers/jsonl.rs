//! Streaming NDJSON writer for joined frames.

use std::fs::File;
use std::io::{BufWriter, Write};

use serde_json::{Map, Value};
use spilljoin_core::frame::Frame;
use spilljoin_core::schema::Schema;
use spilljoin_core::types::Scalar;

use crate::error::Result;

pub struct JsonlWriter<W: Write> {
    writer: BufWriter<W>,
    // output names by field position
    columns: Vec<String>,
    rows_written: u64,
}

impl JsonlWriter<File> {
    pub fn to_path(path: &str, schema: &Schema) -> Result<Self> {
        let f = File::create(path)?;
        Ok(Self::to_writer(f, schema))
    }
}

impl<W: Write> JsonlWriter<W> {
    pub fn to_writer(writer: W, schema: &Schema) -> Self {
        Self {
            writer: BufWriter::new(writer),
            columns: schema.fields.iter().map(|f| f.name.clone()).collect(),
            rows_written: 0,
        }
    }

    /// Write every tuple of `frame` as one JSON object per line.
    ///
    /// Fields beyond the known columns are named by position (`col{i}`).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        for tuple in frame.tuples() {
            let mut obj = Map::with_capacity(tuple.arity());
            for (i, value) in tuple.fields.iter().enumerate() {
                let name = self
                    .columns
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("col{i}"));
                obj.insert(name, scalar_to_json(value));
            }
            serde_json::to_writer(&mut self.writer, &Value::Object(obj))?;
            self.writer.write_all(b"\n")?;
            self.rows_written += 1;
        }
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| crate::error::Error::Io(e.into_error()))
    }
}

fn scalar_to_json(v: &Scalar) -> Value {
    use Scalar::*;
    match v {
        Null => Value::Null,
        Bool(b) => Value::Bool(*b),
        I32(i) => Value::from(*i),
        I64(i) => Value::from(*i),
        F32(f) => Value::from(*f as f64),
        F64(f) => Value::from(*f),
        Str(s) => Value::String(s.clone()),
        Bin(b) => Value::String(format!("[binary {} bytes]", b.len())),
    }
}
