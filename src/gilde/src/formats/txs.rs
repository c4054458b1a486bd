//! TXS: texture-name tables

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::schema::{Expr, Kind, Schema, SchemaError};
use crate::value::Value;

pub fn schema() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder("txs")
        .field("magic", Kind::u32())
        .field("num1", Kind::u32())
        .field("num2", Kind::u32())
        .field(
            "texture_names",
            Kind::array(Expr::field("num1") * Expr::field("num2"), Kind::name()),
        )
        .build_root()
}

/// Distinct non-empty names of a decoded table, lowercased and restricted to ASCII
pub fn texture_names(decoded: &Value) -> BTreeSet<String> {
    decoded
        .lookup("texture_names")
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_text)
        .map(|name| {
            name.chars()
                .filter(char::is_ascii)
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|name| !name.is_empty())
        .collect()
}
