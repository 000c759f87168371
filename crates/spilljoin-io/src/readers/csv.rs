//! CSV input: rows become tuples, packed into frames of at most `frame_size`
//! encoded bytes.
//!
//! Field values are typed by shape: empty cells are `Null`, then integer,
//! float and boolean parses are tried before falling back to a string. The
//! schema is taken from the header row and the first data row; integer cells
//! in a column typed `Float64` are widened so a column never mixes the two.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use spilljoin_core::frame::Frame;
use spilljoin_core::schema::{DataType, Field, Schema};
use spilljoin_core::types::{Scalar, Tuple};

use crate::error::Result;

pub struct CsvFrameReader<R: Read> {
    reader: csv::Reader<R>,
    schema: Schema,
    frame_size: usize,
    carry: Option<Tuple>,
    rows_read: u64,
}

impl CsvFrameReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P, frame_size: usize) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::with_capacity(frame_size.max(8 * 1024), file), frame_size)
    }
}

impl<R: Read> CsvFrameReader<R> {
    pub fn from_reader(reader: R, frame_size: usize) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut record = csv::StringRecord::new();
        let carry = if reader.read_record(&mut record)? {
            Some(parse_record(&record))
        } else {
            None
        };

        let fields = headers
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let data_type = carry
                    .as_ref()
                    .and_then(|t| t.field(i))
                    .filter(|s| !s.is_null())
                    .map(Scalar::data_type)
                    .unwrap_or(DataType::Utf8);
                Field::new(name, data_type, true)
            })
            .collect();

        Ok(Self {
            reader,
            schema: Schema::new(fields),
            frame_size,
            rows_read: carry.is_some() as u64,
            carry,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Read the next frame, or `None` at end of input.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut frame = Frame::new(self.frame_size);
        if let Some(t) = self.carry.take() {
            let accepted = frame.try_append(t).is_ok();
            debug_assert!(accepted, "an empty frame always accepts one tuple");
        }

        let mut record = csv::StringRecord::new();
        while self.reader.read_record(&mut record)? {
            self.rows_read += 1;
            let tuple = self.conform(parse_record(&record));
            if let Err(t) = frame.try_append(tuple) {
                self.carry = Some(t);
                break;
            }
        }

        if frame.is_empty() {
            Ok(None)
        } else {
            Ok(Some(frame))
        }
    }

    fn conform(&self, mut tuple: Tuple) -> Tuple {
        for (value, field) in tuple.fields.iter_mut().zip(&self.schema.fields) {
            if let (Scalar::I64(i), DataType::Float64) = (&*value, &field.data_type) {
                *value = Scalar::F64(*i as f64);
            }
        }
        tuple
    }

    /// Drain the remaining input into frames.
    pub fn read_all(&mut self) -> Result<Vec<Frame>> {
        let mut out = Vec::new();
        while let Some(f) = self.next_frame()? {
            out.push(f);
        }
        Ok(out)
    }
}

fn parse_record(record: &csv::StringRecord) -> Tuple {
    Tuple::new(record.iter().map(parse_scalar).collect())
}

pub fn parse_scalar(raw: &str) -> Scalar {
    if raw.is_empty() {
        return Scalar::Null;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Scalar::I64(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Scalar::F64(f);
    }
    match raw {
        "true" => Scalar::Bool(true),
        "false" => Scalar::Bool(false),
        _ => Scalar::Str(raw.to_string()),
    }
}
