//! Expressions over already-decoded fields
//!
//! Lengths, offsets, predicates and computed values are written as a small
//! AST instead of closures so that references can be checked when a schema
//! is built. Evaluation never reads from the stream; it only looks at values
//! already stored in the current frame (and its immediate parent).
//!
//! Absence is contagious: any operation that touches [`Value::Absent`]
//! yields `Absent`, with [`Expr::present`] as the one way to turn absence
//! into a boolean.

use std::borrow::Cow;
use std::fmt;
use std::ops::{Add, Div, Mul, Not, Sub};

use super::eval::Env;
use crate::value::{Record, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    And,
    Or,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Value),
    /// Sibling declared earlier in the same struct
    Field(String),
    /// Field of the immediately enclosing struct
    Parent(String),
    /// Index of the innermost array element being parsed
    Index,
    /// Current cursor offset
    Here,
    /// Bytes left after the current offset
    Remaining,
    Member(Box<Expr>, String),
    At(Box<Expr>, Box<Expr>),
    Len(Box<Expr>),
    Present(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Select(Box<Expr>, Box<Expr>, Box<Expr>),
    OneOf(Box<Expr>, Vec<Value>),
    Record(Vec<(String, Expr)>),
}

/// A name an expression reads, used for build-time scope checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reference<'a> {
    Field(&'a str),
    Parent(&'a str),
}

impl Expr {
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Lit(value.into())
    }

    pub fn field(name: &str) -> Self {
        Expr::Field(name.to_string())
    }

    pub fn parent(name: &str) -> Self {
        Expr::Parent(name.to_string())
    }

    pub fn index() -> Self {
        Expr::Index
    }

    pub fn here() -> Self {
        Expr::Here
    }

    pub fn remaining() -> Self {
        Expr::Remaining
    }

    pub fn record<const N: usize>(fields: [(&str, Expr); N]) -> Self {
        Expr::Record(
            fields
                .into_iter()
                .map(|(name, expr)| (name.to_string(), expr))
                .collect(),
        )
    }

    pub fn select(cond: Expr, then: impl Into<Expr>, otherwise: impl Into<Expr>) -> Self {
        Expr::Select(
            Box::new(cond),
            Box::new(then.into()),
            Box::new(otherwise.into()),
        )
    }

    pub fn member(self, name: &str) -> Self {
        Expr::Member(Box::new(self), name.to_string())
    }

    pub fn at(self, index: impl Into<Expr>) -> Self {
        Expr::At(Box::new(self), Box::new(index.into()))
    }

    pub fn len(self) -> Self {
        Expr::Len(Box::new(self))
    }

    pub fn present(self) -> Self {
        Expr::Present(Box::new(self))
    }

    pub fn equals(self, other: impl Into<Expr>) -> Self {
        self.binary(BinOp::Eq, other)
    }

    pub fn differs(self, other: impl Into<Expr>) -> Self {
        self.binary(BinOp::Ne, other)
    }

    pub fn less(self, other: impl Into<Expr>) -> Self {
        self.binary(BinOp::Lt, other)
    }

    pub fn greater(self, other: impl Into<Expr>) -> Self {
        self.binary(BinOp::Gt, other)
    }

    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinOp::And, other)
    }

    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinOp::Or, other)
    }

    pub fn one_of<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        Expr::OneOf(Box::new(self), values.into_iter().map(Into::into).collect())
    }

    fn binary(self, op: BinOp, other: impl Into<Expr>) -> Self {
        Expr::Binary(op, Box::new(self), Box::new(other.into()))
    }

    /// Every field name this expression reads
    pub(crate) fn references(&self) -> Vec<Reference<'_>> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<Reference<'a>>) {
        match self {
            Expr::Field(name) => out.push(Reference::Field(name)),
            Expr::Parent(name) => out.push(Reference::Parent(name)),
            Expr::Lit(_) | Expr::Index | Expr::Here | Expr::Remaining => {}
            Expr::Member(inner, _)
            | Expr::Len(inner)
            | Expr::Present(inner)
            | Expr::Not(inner)
            | Expr::OneOf(inner, _) => inner.collect_references(out),
            Expr::At(a, b) | Expr::Binary(_, a, b) => {
                a.collect_references(out);
                b.collect_references(out);
            }
            Expr::Select(c, a, b) => {
                c.collect_references(out);
                a.collect_references(out);
                b.collect_references(out);
            }
            Expr::Record(fields) => {
                for (_, expr) in fields {
                    expr.collect_references(out);
                }
            }
        }
    }

    pub(crate) fn eval<'v>(&'v self, env: &Env<'v>) -> Cow<'v, Value> {
        match self {
            Expr::Lit(value) => Cow::Borrowed(value),
            Expr::Field(name) => lookup(env.frame.record.get(name)),
            Expr::Parent(name) => lookup(env.frame.parent.and_then(|p| p.record.get(name))),
            Expr::Index => owned(env.index.map(|i| Value::Int(i as i64))),
            Expr::Here => Cow::Owned(Value::Int(env.position as i64)),
            Expr::Remaining => Cow::Owned(Value::Int(env.remaining as i64)),
            Expr::Member(base, name) => member(base.eval(env), name),
            Expr::At(base, index) => {
                let index = index.eval(env).as_int();
                match index.and_then(|i| usize::try_from(i).ok()) {
                    Some(i) => element(base.eval(env), i),
                    None => Cow::Owned(Value::Absent),
                }
            }
            Expr::Len(inner) => owned(length(&inner.eval(env)).map(|n| Value::Int(n as i64))),
            Expr::Present(inner) => Cow::Owned(Value::Bool(!inner.eval(env).is_absent())),
            Expr::Not(inner) => owned(inner.eval(env).truthy().map(|b| Value::Bool(!b))),
            Expr::Binary(op, a, b) => Cow::Owned(binary(*op, &a.eval(env), &b.eval(env))),
            Expr::Select(cond, then, otherwise) => match cond.eval(env).truthy() {
                Some(true) => then.eval(env),
                Some(false) => otherwise.eval(env),
                None => Cow::Owned(Value::Absent),
            },
            Expr::OneOf(inner, values) => {
                let value = inner.eval(env);
                if value.is_absent() {
                    return Cow::Owned(Value::Absent);
                }
                Cow::Owned(Value::Bool(values.iter().any(|v| equal(&value, v))))
            }
            Expr::Record(fields) => {
                let mut record = Record::with_capacity(fields.len());
                for (name, expr) in fields {
                    record.push(name.as_str(), expr.eval(env).into_owned());
                }
                Cow::Owned(Value::Record(record))
            }
        }
    }
}

fn lookup(value: Option<&Value>) -> Cow<'_, Value> {
    value.map_or(Cow::Owned(Value::Absent), Cow::Borrowed)
}

fn owned<'v>(value: Option<Value>) -> Cow<'v, Value> {
    Cow::Owned(value.unwrap_or(Value::Absent))
}

fn member<'v>(base: Cow<'v, Value>, name: &str) -> Cow<'v, Value> {
    match base {
        Cow::Borrowed(value) => lookup(value.as_record().and_then(|r| r.get(name))),
        Cow::Owned(Value::Record(record)) => owned(
            record
                .iter()
                .find(|(field, _)| *field == name)
                .map(|(_, value)| value.clone()),
        ),
        Cow::Owned(_) => Cow::Owned(Value::Absent),
    }
}

fn element(base: Cow<'_, Value>, index: usize) -> Cow<'_, Value> {
    match base {
        Cow::Borrowed(Value::List(items)) => lookup(items.get(index)),
        Cow::Borrowed(Value::Bytes(bytes)) => {
            owned(bytes.get(index).map(|b| Value::Int(i64::from(*b))))
        }
        Cow::Owned(Value::List(mut items)) if index < items.len() => {
            Cow::Owned(items.swap_remove(index))
        }
        Cow::Owned(Value::Bytes(bytes)) => {
            owned(bytes.get(index).map(|b| Value::Int(i64::from(*b))))
        }
        _ => Cow::Owned(Value::Absent),
    }
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::List(items) => Some(items.len()),
        Value::Bytes(bytes) => Some(bytes.len()),
        Value::Text(text) => Some(text.chars().count()),
        Value::Record(record) => Some(record.len()),
        _ => None,
    }
}

/// Equality with int/float coercion
fn equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => *x as f32 == *y,
        _ => a == b,
    }
}

fn binary(op: BinOp, a: &Value, b: &Value) -> Value {
    if a.is_absent() || b.is_absent() {
        return Value::Absent;
    }
    match op {
        BinOp::Eq => Value::Bool(equal(a, b)),
        BinOp::Ne => Value::Bool(!equal(a, b)),
        BinOp::And | BinOp::Or => match (a.truthy(), b.truthy()) {
            (Some(x), Some(y)) => Value::Bool(if op == BinOp::And { x && y } else { x || y }),
            _ => Value::Absent,
        },
        BinOp::Lt | BinOp::Gt => match (a, b) {
            (Value::Int(x), Value::Int(y)) => Value::Bool(if op == BinOp::Lt { x < y } else { x > y }),
            _ => match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => Value::Bool(if op == BinOp::Lt { x < y } else { x > y }),
                _ => Value::Absent,
            },
        },
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => arithmetic(op, a, b),
    }
}

fn arithmetic(op: BinOp, a: &Value, b: &Value) -> Value {
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        if !matches!(a, Value::Float(_)) && !matches!(b, Value::Float(_)) {
            let result = match op {
                BinOp::Add => x.checked_add(y),
                BinOp::Sub => x.checked_sub(y),
                BinOp::Mul => x.checked_mul(y),
                _ => x.checked_div(y),
            };
            return result.map_or(Value::Absent, Value::Int);
        }
    }
    match (a.as_float(), b.as_float()) {
        (Some(x), Some(y)) => Value::Float(match op {
            BinOp::Add => x + y,
            BinOp::Sub => x - y,
            BinOp::Mul => x * y,
            _ if y == 0.0 => return Value::Absent,
            _ => x / y,
        }),
        _ => Value::Absent,
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Lit(value)
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Expr::Lit(Value::Int(v))
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Expr::Lit(Value::Int(i64::from(v)))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Lit(Value::Bool(b))
    }
}

macro_rules! arithmetic_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<R: Into<Expr>> $trait<R> for Expr {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                self.binary($op, rhs)
            }
        }
    };
}

arithmetic_operator!(Add, add, BinOp::Add);
arithmetic_operator!(Sub, sub, BinOp::Sub);
arithmetic_operator!(Mul, mul, BinOp::Mul);
arithmetic_operator!(Div, div, BinOp::Div);

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Lit(value) => match value {
                Value::Int(v) => write!(f, "{}", v),
                Value::Float(v) => write!(f, "{}", v),
                Value::Bool(b) => write!(f, "{}", b),
                Value::Text(s) => write!(f, "{:?}", s),
                Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
                Value::Absent => write!(f, "absent"),
                Value::List(_) | Value::Record(_) => write!(f, "<literal>"),
            },
            Expr::Field(name) => write!(f, "{}", name),
            Expr::Parent(name) => write!(f, "_.{}", name),
            Expr::Index => write!(f, "_index"),
            Expr::Here => write!(f, "_here"),
            Expr::Remaining => write!(f, "_remaining"),
            Expr::Member(base, name) => write!(f, "{}.{}", base, name),
            Expr::At(base, index) => write!(f, "{}[{}]", base, index),
            Expr::Len(inner) => write!(f, "len({})", inner),
            Expr::Present(inner) => write!(f, "present({})", inner),
            Expr::Not(inner) => write!(f, "!{}", inner),
            Expr::Binary(op, a, b) => write!(f, "({} {} {})", a, op.symbol(), b),
            Expr::Select(c, a, b) => write!(f, "({} ? {} : {})", c, a, b),
            Expr::OneOf(inner, values) => write!(f, "{} in [{} values]", inner, values.len()),
            Expr::Record(fields) => {
                let names: Vec<_> = fields.iter().map(|(name, _)| name.as_str()).collect();
                write!(f, "{{{}}}", names.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::eval::Frame;

    fn frame(fields: &[(&str, Value)]) -> Frame<'static> {
        let mut record = Record::new();
        for (name, value) in fields {
            record.push(*name, value.clone());
        }
        Frame::new(record, None, None)
    }

    fn eval(expr: &Expr, frame: &Frame<'_>) -> Value {
        let env = Env {
            frame,
            index: Some(2),
            position: 10,
            remaining: 5,
        };
        expr.eval(&env).into_owned()
    }

    #[test]
    fn test_arithmetic() {
        let f = frame(&[("a", Value::Int(6)), ("b", Value::Int(7))]);
        assert_eq!(eval(&(Expr::field("a") * Expr::field("b")), &f), Value::Int(42));
        assert_eq!(eval(&(Expr::field("a") - 10), &f), Value::Int(-4));
        assert_eq!(eval(&(Expr::field("a") / 0), &f), Value::Absent);
        assert_eq!(eval(&(Expr::lit(Value::Float(1.5)) + 1), &f), Value::Float(2.5));
    }

    #[test]
    fn test_absent_propagates() {
        let f = frame(&[("flag", Value::Absent), ("n", Value::Int(3))]);
        assert_eq!(eval(&(Expr::field("flag") + 1), &f), Value::Absent);
        assert_eq!(eval(&Expr::field("flag").equals(1), &f), Value::Absent);
        assert_eq!(eval(&!Expr::field("flag"), &f), Value::Absent);
        assert_eq!(eval(&Expr::field("flag").member("x"), &f), Value::Absent);
        assert_eq!(
            eval(&Expr::select(Expr::field("flag"), 1, 2), &f),
            Value::Absent
        );
        assert_eq!(eval(&Expr::field("flag").present(), &f), Value::Bool(false));
        assert_eq!(eval(&Expr::field("n").present(), &f), Value::Bool(true));
    }

    #[test]
    fn test_lists_and_members() {
        let mut def = Record::new();
        def.push("length", Value::Int(9));
        let f = frame(&[
            ("defs", Value::List(vec![Value::Int(0), Value::Int(0), Value::Record(def)])),
            ("run", Value::List(vec![Value::Int(1), Value::Int(1)])),
        ]);
        assert_eq!(
            eval(&Expr::field("defs").at(Expr::index()).member("length"), &f),
            Value::Int(9)
        );
        assert_eq!(eval(&Expr::field("defs").at(7), &f), Value::Absent);
        assert_eq!(eval(&Expr::field("run").len(), &f), Value::Int(2));
        assert_eq!(
            eval(
                &Expr::field("run").equals(Value::List(vec![Value::Int(1), Value::Int(1)])),
                &f
            ),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_cursor_terms_and_one_of() {
        let f = frame(&[("t", Value::Int(0x40))]);
        assert_eq!(eval(&Expr::here(), &f), Value::Int(10));
        assert_eq!(eval(&Expr::remaining(), &f), Value::Int(5));
        assert_eq!(eval(&Expr::index(), &f), Value::Int(2));
        assert_eq!(
            eval(&Expr::field("t").one_of([0x80, 0x40]), &f),
            Value::Bool(true)
        );
        assert_eq!(eval(&Expr::field("t").one_of([5, 7]), &f), Value::Bool(false));
    }

    #[test]
    fn test_references_and_display() {
        let expr = Expr::parent("type1") * Expr::field("size");
        assert_eq!(
            expr.references(),
            vec![Reference::Parent("type1"), Reference::Field("size")]
        );
        assert_eq!(expr.to_string(), "(_.type1 * size)");
    }
}
