//! Structs shared by several formats

use std::sync::Arc;

use crate::schema::{Kind, Schema, SchemaError};

/// Three little-endian floats
pub fn vec3() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder("vec3")
        .field("x", Kind::f32())
        .field("y", Kind::f32())
        .field("z", Kind::f32())
        .build()
}

/// Position and rotation, as used by scene and group elements
pub fn transform() -> Result<Arc<Schema>, SchemaError> {
    let vec3 = vec3()?;
    Schema::builder("transform")
        .field("position", Kind::nested(&vec3))
        .field("rotation", Kind::nested(&vec3))
        .build()
}

/// Three u32 vertex indices
pub fn face() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder("face")
        .field("a", Kind::u32())
        .field("b", Kind::u32())
        .field("c", Kind::u32())
        .build()
}
