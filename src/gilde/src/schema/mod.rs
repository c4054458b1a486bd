//! Declarative field algebra
//!
//! A [`Schema`] is an ordered list of named [`Field`]s, each described by a
//! [`Kind`]:
//!
//! | Kind | Consumes | Value |
//! |------|----------|-------|
//! | `Primitive` | fixed width / terminator | scalar, bytes or text |
//! | `Optional` | inner, or nothing on failure | inner or absent |
//! | `Conditional` | inner when the predicate holds | inner or absent |
//! | `Computed` | nothing | expression result |
//! | `Array` | `len` elements | list |
//! | `GreedyUntil` | elements until the stop policy fires | list |
//! | `Pointer` | nothing at the current offset | inner parsed at an absolute offset |
//! | `Nested` | child schema | record |
//!
//! Schemas are built through [`SchemaBuilder`], which rejects expressions
//! that read fields not yet in scope. A nested schema records the parent
//! fields it reads, and embedding it checks those against the fields the
//! enclosing schema has declared so far.

mod eval;
mod expr;

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

pub use eval::ParseError;
pub use expr::{BinOp, Expr};

use expr::Reference;

use crate::cursor::Cursor;
use crate::value::Record;

/// Bytes allowed in asset names: printable ASCII and the high Latin-1 block
pub fn is_name_byte(byte: u8) -> bool {
    matches!(byte, 0x20..=0x7E | 0xA0..=0xFF)
}

/// [`is_name_byte`] as a value set for [`Stop`] policies
pub fn name_byte_set() -> Vec<i64> {
    (0..=u8::MAX)
        .filter(|&b| is_name_byte(b))
        .map(i64::from)
        .collect()
}

/// Text encodings for null-terminated strings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Fails on bytes >= 0x80
    Ascii,
    /// Every byte maps to the code point of the same value
    Latin1,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    U8,
    U16,
    U32,
    I32,
    F32,
    /// Required marker; mismatch fails
    Const(Vec<u8>),
    /// Raw run whose length comes from an expression
    Bytes(Expr),
    CString(Encoding),
    /// Fixed width, trailing NULs stripped
    PaddedString(usize),
    /// Null-terminated name restricted to printable ASCII and high Latin-1
    Name,
}

impl Primitive {
    fn is_integer(&self) -> bool {
        matches!(
            self,
            Primitive::U8 | Primitive::U16 | Primitive::U32 | Primitive::I32
        )
    }
}

/// When a [`Kind::GreedyUntil`] repetition ends
#[derive(Debug, Clone, PartialEq)]
pub enum Stop {
    /// Stop before an element whose value is in the set
    At(Vec<i64>),
    /// Stop before an element whose value is not in the set
    Outside(Vec<i64>),
    /// Stop at the first element that fails to parse, or that the
    /// expression (evaluated inside the element) rejects
    Failure(Option<Expr>),
}

#[derive(Debug, Clone)]
pub enum Kind {
    Primitive(Primitive),
    Optional(Box<Kind>),
    Conditional(Expr, Box<Kind>),
    Computed(Expr),
    Array(Expr, Box<Kind>),
    GreedyUntil(Box<Kind>, Stop),
    Pointer(Expr, Box<Kind>),
    Nested(Arc<Schema>),
}

impl Kind {
    pub fn u8() -> Self {
        Kind::Primitive(Primitive::U8)
    }

    pub fn u16() -> Self {
        Kind::Primitive(Primitive::U16)
    }

    pub fn u32() -> Self {
        Kind::Primitive(Primitive::U32)
    }

    pub fn i32() -> Self {
        Kind::Primitive(Primitive::I32)
    }

    pub fn f32() -> Self {
        Kind::Primitive(Primitive::F32)
    }

    pub fn constant(bytes: &[u8]) -> Self {
        Kind::Primitive(Primitive::Const(bytes.to_vec()))
    }

    pub fn bytes(len: impl Into<Expr>) -> Self {
        Kind::Primitive(Primitive::Bytes(len.into()))
    }

    pub fn cstring(encoding: Encoding) -> Self {
        Kind::Primitive(Primitive::CString(encoding))
    }

    pub fn padded_string(width: usize) -> Self {
        Kind::Primitive(Primitive::PaddedString(width))
    }

    pub fn name() -> Self {
        Kind::Primitive(Primitive::Name)
    }

    pub fn optional(inner: Kind) -> Self {
        Kind::Optional(Box::new(inner))
    }

    /// Optional marker bytes
    pub fn marker(bytes: &[u8]) -> Self {
        Kind::optional(Kind::constant(bytes))
    }

    pub fn when(predicate: Expr, inner: Kind) -> Self {
        Kind::Conditional(predicate, Box::new(inner))
    }

    pub fn computed(expr: impl Into<Expr>) -> Self {
        Kind::Computed(expr.into())
    }

    pub fn array(len: impl Into<Expr>, element: Kind) -> Self {
        Kind::Array(len.into(), Box::new(element))
    }

    pub fn greedy(element: Kind, stop: Stop) -> Self {
        Kind::GreedyUntil(Box::new(element), stop)
    }

    /// Repeat until an element fails to parse
    pub fn repeat(element: Kind) -> Self {
        Kind::greedy(element, Stop::Failure(None))
    }

    /// Consume bytes for as long as they belong to `set`
    pub fn run_of(set: &[i64]) -> Self {
        Kind::greedy(Kind::u8(), Stop::Outside(set.to_vec()))
    }

    /// Consume bytes up to (not including) the first one in `set`
    pub fn skip_until(set: &[i64]) -> Self {
        Kind::greedy(Kind::u8(), Stop::At(set.to_vec()))
    }

    pub fn pointer(offset: impl Into<Expr>, inner: Kind) -> Self {
        Kind::Pointer(offset.into(), Box::new(inner))
    }

    /// Parse at the current offset without consuming
    pub fn peek(inner: Kind) -> Self {
        Kind::pointer(Expr::here(), inner)
    }

    pub fn nested(schema: &Arc<Schema>) -> Self {
        Kind::Nested(Arc::clone(schema))
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    kind: Kind,
    hidden: bool,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Hidden fields are visible to later expressions but left out of the result
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }
}

#[derive(Debug)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
    parent_refs: BTreeSet<String>,
}

impl Schema {
    pub fn builder(name: &str) -> SchemaBuilder {
        SchemaBuilder {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Parent fields this schema (not its children) reads
    pub fn parent_refs(&self) -> impl Iterator<Item = &str> {
        self.parent_refs.iter().map(String::as_str)
    }

    fn field_names(&self) -> HashSet<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    fn is_hidden(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.hidden && f.name == name)
    }

    /// Parse a root record from the cursor's current position
    pub fn parse(&self, cursor: &mut Cursor<'_>) -> Result<Record, ParseError> {
        eval::parse_root(self, cursor)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("{schema}.{field}: '{reference}' is not declared before this field")]
    UnknownField {
        schema: String,
        field: String,
        reference: String,
    },

    #[error("{schema}.{field}: nested '{nested}' reads parent field '{reference}' which is not declared before it")]
    UnknownParentField {
        schema: String,
        field: String,
        nested: String,
        reference: String,
    },

    #[error("{schema}: duplicate field '{field}'")]
    DuplicateField { schema: String, field: String },

    #[error("{schema}.{field}: {reason}")]
    Invalid {
        schema: String,
        field: String,
        reason: String,
    },

    #[error("root schema '{schema}' reads parent field '{reference}'")]
    UnboundParent { schema: String, reference: String },
}

pub struct SchemaBuilder {
    name: String,
    fields: Vec<Field>,
}

impl SchemaBuilder {
    pub fn field(mut self, name: &str, kind: Kind) -> Self {
        self.fields.push(Field {
            name: name.to_string(),
            kind,
            hidden: false,
        });
        self
    }

    pub fn hidden(mut self, name: &str, kind: Kind) -> Self {
        self.fields.push(Field {
            name: name.to_string(),
            kind,
            hidden: true,
        });
        self
    }

    /// Validate references and build a schema usable as a nested struct
    pub fn build(self) -> Result<Arc<Schema>, SchemaError> {
        let mut checker = ScopeCheck {
            schema: &self.name,
            field: "",
            declared: HashSet::new(),
            parent_refs: BTreeSet::new(),
        };

        for field in &self.fields {
            checker.field = &field.name;
            checker.check_kind(&field.kind)?;
            if !checker.declared.insert(&field.name) {
                return Err(SchemaError::DuplicateField {
                    schema: self.name.clone(),
                    field: field.name.clone(),
                });
            }
        }

        let parent_refs = checker.parent_refs;
        Ok(Arc::new(Schema {
            name: self.name,
            fields: self.fields,
            parent_refs,
        }))
    }

    /// Build a top-level schema; reading a parent field is an error here
    pub fn build_root(self) -> Result<Arc<Schema>, SchemaError> {
        let schema = self.build()?;
        if let Some(reference) = schema.parent_refs.iter().next() {
            return Err(SchemaError::UnboundParent {
                schema: schema.name.clone(),
                reference: reference.clone(),
            });
        }
        Ok(schema)
    }
}

struct ScopeCheck<'a> {
    schema: &'a str,
    field: &'a str,
    declared: HashSet<&'a str>,
    parent_refs: BTreeSet<String>,
}

impl<'a> ScopeCheck<'a> {
    fn unknown(&self, reference: &str) -> SchemaError {
        SchemaError::UnknownField {
            schema: self.schema.to_string(),
            field: self.field.to_string(),
            reference: reference.to_string(),
        }
    }

    fn invalid(&self, reason: &str) -> SchemaError {
        SchemaError::Invalid {
            schema: self.schema.to_string(),
            field: self.field.to_string(),
            reason: reason.to_string(),
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> Result<(), SchemaError> {
        for reference in expr.references() {
            match reference {
                Reference::Field(name) if !self.declared.contains(name) => {
                    return Err(self.unknown(name));
                }
                Reference::Field(_) => {}
                Reference::Parent(name) => {
                    self.parent_refs.insert(name.to_string());
                }
            }
        }
        Ok(())
    }

    fn check_nested(&self, nested: &Schema) -> Result<(), SchemaError> {
        match nested.parent_refs().find(|name| !self.declared.contains(name)) {
            Some(reference) => Err(SchemaError::UnknownParentField {
                schema: self.schema.to_string(),
                field: self.field.to_string(),
                nested: nested.name.clone(),
                reference: reference.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn check_kind(&mut self, kind: &Kind) -> Result<(), SchemaError> {
        match kind {
            Kind::Primitive(Primitive::Bytes(len)) => self.check_expr(len),
            Kind::Primitive(_) => Ok(()),
            Kind::Optional(inner) => self.check_kind(inner),
            Kind::Conditional(predicate, inner) => {
                self.check_expr(predicate)?;
                self.check_kind(inner)
            }
            Kind::Computed(expr) => self.check_expr(expr),
            Kind::Array(len, element) => {
                self.check_expr(len)?;
                self.check_kind(element)
            }
            Kind::Pointer(offset, inner) => {
                self.check_expr(offset)?;
                self.check_kind(inner)
            }
            Kind::Nested(schema) => self.check_nested(schema),
            Kind::GreedyUntil(element, stop) => {
                self.check_kind(element)?;
                match stop {
                    Stop::At(_) | Stop::Outside(_) => match element.as_ref() {
                        Kind::Primitive(p) if p.is_integer() => Ok(()),
                        _ => Err(self.invalid("stop sets need an integer element")),
                    },
                    Stop::Failure(None) => Ok(()),
                    Stop::Failure(Some(accept)) => {
                        let Kind::Nested(nested) = element.as_ref() else {
                            return Err(self.invalid("acceptance checks need a nested element"));
                        };
                        let element_fields = nested.field_names();
                        for reference in accept.references() {
                            match reference {
                                Reference::Field(name) if !element_fields.contains(name) => {
                                    return Err(self.unknown(name));
                                }
                                Reference::Parent(name) if !self.declared.contains(name) => {
                                    return Err(self.unknown(name));
                                }
                                _ => {}
                            }
                        }
                        Ok(())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec3() -> Arc<Schema> {
        Schema::builder("vec3")
            .field("x", Kind::f32())
            .field("y", Kind::f32())
            .field("z", Kind::f32())
            .build()
            .unwrap()
    }

    #[test]
    fn test_forward_reference_rejected() {
        let err = Schema::builder("model")
            .field("vertices", Kind::array(Expr::field("count"), Kind::nested(&vec3())))
            .field("count", Kind::u16())
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownField {
                schema: "model".to_string(),
                field: "vertices".to_string(),
                reference: "count".to_string(),
            }
        );
    }

    #[test]
    fn test_parent_reference_checked_on_embed() {
        let child = Schema::builder("child")
            .field("data", Kind::bytes(Expr::parent("size")))
            .build()
            .unwrap();
        assert_eq!(child.parent_refs().collect::<Vec<_>>(), vec!["size"]);

        let err = Schema::builder("parent")
            .field("child", Kind::nested(&child))
            .field("size", Kind::u8())
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownParentField { .. }));

        let ok = Schema::builder("parent")
            .field("size", Kind::u8())
            .field("child", Kind::optional(Kind::nested(&child)))
            .build_root();
        assert!(ok.is_ok());
    }

    #[test]
    fn test_root_cannot_read_parent() {
        let err = Schema::builder("root")
            .field("n", Kind::computed(Expr::parent("x")))
            .build_root()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnboundParent { .. }));
    }

    #[test]
    fn test_duplicate_and_invalid_stop() {
        let err = Schema::builder("dup")
            .field("a", Kind::u8())
            .field("a", Kind::u8())
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { .. }));

        let err = Schema::builder("bad")
            .field("run", Kind::greedy(Kind::nested(&vec3()), Stop::At(vec![0])))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::Invalid { .. }));
    }

    #[test]
    fn test_accept_reads_element_fields() {
        let element = Schema::builder("element")
            .hidden("lead", Kind::run_of(&[0, 1]))
            .field("id", Kind::u8())
            .build()
            .unwrap();
        let ok = Schema::builder("list")
            .field(
                "items",
                Kind::greedy(
                    Kind::nested(&element),
                    Stop::Failure(Some(Expr::field("lead").len().equals(1))),
                ),
            )
            .build();
        assert!(ok.is_ok());

        let err = Schema::builder("list")
            .field(
                "items",
                Kind::greedy(
                    Kind::nested(&element),
                    Stop::Failure(Some(Expr::field("missing").present())),
                ),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownField { .. }));
    }
}
