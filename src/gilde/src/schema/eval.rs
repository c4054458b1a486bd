//! Schema evaluator
//!
//! One recursive interpreter for every [`Kind`]. Values parsed so far for the
//! struct being built live in a [`Frame`]; nested structs get a fresh frame
//! that points back at the enclosing one, so expressions can read siblings
//! and the immediate parent without any shared mutable context.

use std::fmt::{self, Write};

use tracing::trace;

use super::{is_name_byte, Encoding, Expr, Kind, Primitive, Schema, Stop};
use crate::cursor::{Cursor, ReadError};
use crate::value::{Record, Value};

/// Decode failure with the dotted path of the field that failed
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("{field} at offset 0x{offset:x}: expected {expected}, found {found}")]
    Malformed {
        field: String,
        offset: usize,
        expected: String,
        found: String,
    },

    #[error("{field}: depends on absent value '{reference}'")]
    MissingReference { field: String, reference: String },
}

impl ParseError {
    pub fn field(&self) -> &str {
        match self {
            ParseError::Malformed { field, .. } | ParseError::MissingReference { field, .. } => {
                field
            }
        }
    }
}

/// Values parsed so far for one struct
pub(crate) struct Frame<'p> {
    pub(crate) record: Record,
    pub(crate) parent: Option<&'p Frame<'p>>,
    pub(crate) index: Option<usize>,
}

impl<'p> Frame<'p> {
    pub(crate) fn new(record: Record, parent: Option<&'p Frame<'p>>, index: Option<usize>) -> Self {
        Self {
            record,
            parent,
            index,
        }
    }
}

/// Everything an expression may look at
pub(crate) struct Env<'a> {
    pub(crate) frame: &'a Frame<'a>,
    pub(crate) index: Option<usize>,
    pub(crate) position: usize,
    pub(crate) remaining: usize,
}

enum Segment {
    Field(String),
    Index(usize),
}

enum Cause {
    Read(ReadError),
    Missing(String),
    Invalid {
        offset: usize,
        expected: String,
        found: String,
    },
    Rejected {
        offset: usize,
    },
}

/// Internal failure; the field path is collected innermost-first while unwinding
struct Fault {
    path: Vec<Segment>,
    cause: Cause,
}

impl Fault {
    fn new(cause: Cause) -> Self {
        Self {
            path: Vec::new(),
            cause,
        }
    }

    fn missing(expr: &Expr) -> Self {
        Self::new(Cause::Missing(expr.to_string()))
    }

    fn invalid(offset: usize, expected: &str, found: String) -> Self {
        Self::new(Cause::Invalid {
            offset,
            expected: expected.to_string(),
            found,
        })
    }

    fn within_field(mut self, name: &str) -> Self {
        self.path.push(Segment::Field(name.to_string()));
        self
    }

    fn within_index(mut self, index: usize) -> Self {
        self.path.push(Segment::Index(index));
        self
    }

    fn field_path(&self) -> String {
        let mut out = String::new();
        for segment in self.path.iter().rev() {
            match segment {
                Segment::Field(name) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(name);
                }
                Segment::Index(i) => {
                    let _ = write!(out, "[{}]", i);
                }
            }
        }
        if out.is_empty() {
            out.push_str("<root>");
        }
        out
    }

    fn into_parse_error(self) -> ParseError {
        let field = self.field_path();
        match self.cause {
            Cause::Read(err) => {
                let (expected, found) = err.describe();
                ParseError::Malformed {
                    field,
                    offset: err.offset(),
                    expected,
                    found,
                }
            }
            Cause::Missing(reference) => ParseError::MissingReference { field, reference },
            Cause::Invalid {
                offset,
                expected,
                found,
            } => ParseError::Malformed {
                field,
                offset,
                expected,
                found,
            },
            Cause::Rejected { offset } => ParseError::Malformed {
                field,
                offset,
                expected: "accepted element".to_string(),
                found: "rejected element".to_string(),
            },
        }
    }
}

impl From<ReadError> for Fault {
    fn from(err: ReadError) -> Self {
        Fault::new(Cause::Read(err))
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Cause::Read(err) => {
                let (expected, found) = err.describe();
                write!(f, "{}: expected {}, found {}", self.field_path(), expected, found)
            }
            Cause::Missing(reference) => {
                write!(f, "{}: '{}' is absent", self.field_path(), reference)
            }
            Cause::Invalid {
                expected, found, ..
            } => write!(f, "{}: expected {}, found {}", self.field_path(), expected, found),
            Cause::Rejected { .. } => write!(f, "{}: element rejected", self.field_path()),
        }
    }
}

impl Stop {
    fn admits(&self, value: &Value) -> bool {
        let member = |set: &[i64]| value.as_int().is_some_and(|n| set.contains(&n));
        match self {
            Stop::At(set) => !member(set),
            Stop::Outside(set) => member(set),
            Stop::Failure(_) => true,
        }
    }
}

pub(super) fn parse_root(schema: &Schema, cursor: &mut Cursor<'_>) -> Result<Record, ParseError> {
    parse_struct(schema, cursor, None, None, None).map_err(Fault::into_parse_error)
}

fn parse_struct(
    schema: &Schema,
    cursor: &mut Cursor<'_>,
    parent: Option<&Frame<'_>>,
    index: Option<usize>,
    accept: Option<&Expr>,
) -> Result<Record, Fault> {
    let mut frame = Frame::new(Record::with_capacity(schema.fields.len()), parent, index);

    for field in &schema.fields {
        let value = parse_kind(&field.kind, cursor, &frame, None)
            .map_err(|fault| fault.within_field(&field.name))?;
        frame.record.push(field.name.as_str(), value);
    }

    if let Some(accept) = accept {
        if evaluate(accept, &frame, None, cursor).truthy() != Some(true) {
            return Err(Fault::new(Cause::Rejected {
                offset: cursor.position(),
            }));
        }
    }

    let mut record = frame.record;
    record.retain(|name| !schema.is_hidden(name));
    Ok(record)
}

fn evaluate(expr: &Expr, frame: &Frame<'_>, index: Option<usize>, cursor: &Cursor<'_>) -> Value {
    let env = Env {
        frame,
        index: index.or(frame.index),
        position: cursor.position(),
        remaining: cursor.remaining(),
    };
    expr.eval(&env).into_owned()
}

/// Evaluate a length or offset; absence is a cross-field consistency error
fn evaluate_count(
    expr: &Expr,
    frame: &Frame<'_>,
    index: Option<usize>,
    cursor: &Cursor<'_>,
) -> Result<usize, Fault> {
    match evaluate(expr, frame, index, cursor) {
        Value::Absent => Err(Fault::missing(expr)),
        value => value
            .as_int()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| {
                Fault::invalid(
                    cursor.position(),
                    "non-negative integer",
                    format!("{} = {:?}", expr, value),
                )
            }),
    }
}

fn parse_kind(
    kind: &Kind,
    cursor: &mut Cursor<'_>,
    frame: &Frame<'_>,
    index: Option<usize>,
) -> Result<Value, Fault> {
    match kind {
        Kind::Primitive(primitive) => parse_primitive(primitive, cursor, frame, index),

        Kind::Optional(inner) => {
            let mark = cursor.mark();
            match parse_kind(inner, cursor, frame, index) {
                Ok(value) => Ok(value),
                Err(fault) => {
                    trace!(offset = mark.position(), "optional field absent ({})", fault);
                    cursor.rewind(mark);
                    Ok(Value::Absent)
                }
            }
        }

        Kind::Conditional(predicate, inner) => {
            match evaluate(predicate, frame, index, cursor).truthy() {
                Some(true) => parse_kind(inner, cursor, frame, index),
                _ => Ok(Value::Absent),
            }
        }

        Kind::Computed(expr) => Ok(evaluate(expr, frame, index, cursor)),

        Kind::Array(len, element) => {
            let count = evaluate_count(len, frame, index, cursor)?;
            // a corrupt count must not turn into a huge allocation
            let mut items = Vec::with_capacity(count.min(cursor.remaining()));
            for i in 0..count {
                let item = parse_kind(element, cursor, frame, Some(i))
                    .map_err(|fault| fault.within_index(i))?;
                items.push(item);
            }
            Ok(Value::List(items))
        }

        Kind::GreedyUntil(element, stop) => {
            let mut items = Vec::new();
            while !cursor.at_end() {
                let mark = cursor.mark();
                let i = items.len();
                let attempt = match (stop, element.as_ref()) {
                    (Stop::Failure(Some(accept)), Kind::Nested(schema)) => {
                        parse_struct(schema, cursor, Some(frame), Some(i), Some(accept))
                            .map(Value::Record)
                    }
                    _ => parse_kind(element, cursor, frame, Some(i)),
                };
                let item = match attempt {
                    Ok(value) if stop.admits(&value) => value,
                    _ => {
                        cursor.rewind(mark);
                        break;
                    }
                };
                items.push(item);
                if cursor.position() == mark.position() {
                    break;
                }
            }
            Ok(Value::List(items))
        }

        Kind::Pointer(offset, inner) => {
            let target = evaluate_count(offset, frame, index, cursor)?;
            let saved = cursor.position();
            cursor.seek(target)?;
            let result = parse_kind(inner, cursor, frame, index);
            cursor.restore(saved);
            result
        }

        Kind::Nested(schema) => {
            parse_struct(schema, cursor, Some(frame), index, None).map(Value::Record)
        }
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn parse_primitive(
    primitive: &Primitive,
    cursor: &mut Cursor<'_>,
    frame: &Frame<'_>,
    index: Option<usize>,
) -> Result<Value, Fault> {
    let value = match primitive {
        Primitive::U8 => Value::Int(i64::from(cursor.read_u8()?)),
        Primitive::U16 => Value::Int(i64::from(cursor.read_u16()?)),
        Primitive::U32 => Value::Int(i64::from(cursor.read_u32()?)),
        Primitive::I32 => Value::Int(i64::from(cursor.read_i32()?)),
        Primitive::F32 => Value::Float(cursor.read_f32()?),
        Primitive::Const(bytes) => {
            cursor.expect(bytes)?;
            Value::Bytes(bytes.clone())
        }
        Primitive::Bytes(len) => {
            let len = evaluate_count(len, frame, index, cursor)?;
            Value::Bytes(cursor.take(len)?.to_vec())
        }
        Primitive::CString(Encoding::Ascii) => {
            let mark = cursor.mark();
            let start = mark.position();
            let bytes = cursor.read_cstring()?;
            if let Some(pos) = bytes.iter().position(|b| !b.is_ascii()) {
                cursor.rewind(mark);
                return Err(ReadError::InvalidText {
                    offset: start + pos,
                    byte: bytes[pos],
                }
                .into());
            }
            Value::Text(latin1(bytes))
        }
        Primitive::CString(Encoding::Latin1) => Value::Text(latin1(cursor.read_cstring()?)),
        Primitive::PaddedString(width) => {
            let raw = cursor.take(*width)?;
            let end = raw.iter().rposition(|&b| b != 0).map_or(0, |last| last + 1);
            Value::Text(latin1(&raw[..end]))
        }
        Primitive::Name => {
            let raw = cursor.read_cstring()?;
            let end = raw
                .iter()
                .position(|&b| !is_name_byte(b))
                .unwrap_or(raw.len());
            Value::Text(latin1(&raw[..end]))
        }
    };
    Ok(value)
}
