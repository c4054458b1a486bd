//! BGF: 3D objects
//!
//! Layout:
//! - header (name, mapping address, texture count)
//! - textures, repeated until a record fails to parse
//! - game objects, repeated the same way, each with an optional raw model
//! - mapping section, located through the header's absolute address
//! - footer of texture names
//!
//! The texture/object boundary has no count field; textures are tried
//! first and the first record that does not parse as a texture starts the
//! object list.

use std::sync::Arc;

use super::common::{face, vec3};
use crate::schema::{name_byte_set, Encoding, Expr, Kind, Schema, SchemaError, Stop};

fn header() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder("bgf_header")
        .field("name", Kind::name())
        .hidden("tag_2e", Kind::constant(&[0x2E]))
        .field("mapping_address", Kind::u32())
        .hidden("tag_0101", Kind::constant(&[0x01, 0x01]))
        .field("num1", Kind::u8())
        .hidden("tag_cdab02", Kind::constant(&[0xCD, 0xAB, 0x02]))
        .field("num2", Kind::u8())
        .hidden("anim_marker", Kind::marker(&[0x37]))
        .field("anim_count", Kind::when(Expr::field("anim_marker"), Kind::u16()))
        .hidden(
            "anim_padding",
            Kind::when(Expr::field("anim_marker"), Kind::constant(&[0x00, 0x00])),
        )
        .hidden("tag_0304", Kind::constant(&[0x03, 0x04]))
        .field("texture_count", Kind::u16())
        .hidden("tag_0000", Kind::constant(&[0x00, 0x00]))
        .build()
}

pub fn texture() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder("bgf_texture")
        .hidden("tag_0506", Kind::constant(&[0x05, 0x06]))
        .field("id", Kind::u16())
        .hidden("tag_0000", Kind::constant(&[0x00, 0x00]))
        .hidden("marker_07", Kind::marker(&[0x07]))
        .hidden("marker_08", Kind::marker(&[0x08]))
        .field("name", Kind::name())
        .hidden("appendix_08", Kind::marker(&[0x08]))
        .hidden("appendix_09", Kind::marker(&[0x09]))
        .field(
            "name_appendix",
            Kind::when(
                Expr::field("appendix_08")
                    .present()
                    .or(Expr::field("appendix_09").present()),
                Kind::cstring(Encoding::Latin1),
            ),
        )
        .hidden("marker_0a", Kind::marker(&[0x0A]))
        .field("num_0a", Kind::when(Expr::field("marker_0a"), Kind::u8()))
        .hidden("marker_0b", Kind::marker(&[0x0B]))
        .field("num_0b", Kind::when(Expr::field("marker_0b"), Kind::u8()))
        .hidden("skipped", Kind::skip_until(&[0x28]))
        .hidden("tag_28", Kind::constant(&[0x28]))
        .build()
}

fn texture_mapping() -> Result<Arc<Schema>, SchemaError> {
    let vec3 = vec3()?;
    let coordinate = |axis: &str| {
        Expr::record([
            ("u", Expr::field("vertex_u").member(axis)),
            ("v", Expr::field("vertex_v").member(axis)),
            ("w", Expr::field("vertex_w").member(axis)),
        ])
    };
    Schema::builder("texture_mapping")
        .field("vertex_u", Kind::nested(&vec3))
        .field("vertex_v", Kind::nested(&vec3))
        .field("vertex_w", Kind::nested(&vec3))
        .field("a", Kind::computed(coordinate("x")))
        .field("b", Kind::computed(coordinate("y")))
        .field("c", Kind::computed(coordinate("z")))
        .build()
}

fn polygon() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder("bgf_polygon")
        .field("face", Kind::nested(&face()?))
        .hidden("marker_1e", Kind::marker(&[0x1E]))
        .field("texture_mapping", Kind::nested(&texture_mapping()?))
        .hidden("marker_1f", Kind::marker(&[0x1F]))
        .field("normal", Kind::when(Expr::field("marker_1f"), Kind::nested(&vec3()?)))
        .hidden("marker_20", Kind::marker(&[0x20]))
        .field("texture_index", Kind::when(Expr::field("marker_20"), Kind::u8()))
        .hidden("marker_1d", Kind::marker(&[0x1D]))
        .build()
}

fn model() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder("bgf_model")
        .hidden("tag_19", Kind::constant(&[0x19]))
        .field("vertex_count", Kind::u16())
        .hidden("tag_0000", Kind::constant(&[0x00, 0x00]))
        .hidden("tag_1a", Kind::constant(&[0x1A]))
        .field("polygon_count", Kind::u16())
        .hidden("tag_0000_2", Kind::constant(&[0x00, 0x00]))
        .hidden("tag_1b", Kind::constant(&[0x1B]))
        .field(
            "vertices",
            Kind::array(Expr::field("vertex_count"), Kind::nested(&vec3()?)),
        )
        .hidden("tag_1c1d", Kind::constant(&[0x1C, 0x1D]))
        .field(
            "polygons",
            Kind::array(Expr::field("polygon_count"), Kind::nested(&polygon()?)),
        )
        .build()
}

fn anim_data() -> Result<Arc<Schema>, SchemaError> {
    let vec3 = vec3()?;
    Schema::builder("bgf_anim_data")
        .hidden("tag_38", Kind::constant(&[0x38]))
        .field("name", Kind::cstring(Encoding::Latin1))
        .hidden("tag_39", Kind::constant(&[0x39]))
        .field("point1", Kind::nested(&vec3))
        .field("value", Kind::u8())
        .field("point2", Kind::nested(&vec3))
        .build()
}

fn game_object() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder("bgf_game_object")
        .hidden("marker_28", Kind::marker(&[0x28]))
        .hidden("tag_1415", Kind::constant(&[0x14, 0x15]))
        .field("name", Kind::name())
        .hidden("marker_1601", Kind::marker(&[0x16, 0x01]))
        .hidden("padding_3", Kind::when(Expr::field("marker_1601"), Kind::bytes(3)))
        .hidden("marker_1718", Kind::marker(&[0x17, 0x18]))
        .hidden("padding_4", Kind::when(Expr::field("marker_1718"), Kind::bytes(4)))
        .field("model", Kind::when(Expr::field("marker_1718"), Kind::nested(&model()?)))
        .hidden("marker_28_2", Kind::marker(&[0x28]))
        .hidden("marker_28_3", Kind::marker(&[0x28]))
        .hidden("marker_28_4", Kind::marker(&[0x28]))
        .hidden("marker_37", Kind::marker(&[0x37]))
        .field("anim_count", Kind::when(Expr::field("marker_37"), Kind::u16()))
        .hidden("padding_2", Kind::when(Expr::field("marker_37"), Kind::bytes(2)))
        .field(
            "anim_data",
            Kind::when(
                Expr::field("marker_37"),
                Kind::array(Expr::field("anim_count"), Kind::nested(&anim_data()?)),
            ),
        )
        .build()
}

fn vertex_mapping() -> Result<Arc<Schema>, SchemaError> {
    let vec3 = vec3()?;
    Schema::builder("vertex_mapping")
        .field("vertex1", Kind::nested(&vec3))
        .field("vertex2", Kind::nested(&vec3))
        .build()
}

fn polygon_mapping() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder("polygon_mapping")
        .field("face", Kind::nested(&face()?))
        .field("texture_mapping", Kind::nested(&texture_mapping()?))
        .field("texture_index", Kind::u8())
        .build()
}

/// The de-duplicated vertex and polygon tables used for rendering
pub fn mapping() -> Result<Arc<Schema>, SchemaError> {
    let vertex_mapping = vertex_mapping()?;
    Schema::builder("bgf_mapping")
        .hidden("tag_2f2d", Kind::constant(&[0x2F, 0x2D]))
        .field("num1", Kind::u8())
        .field("num2", Kind::u16())
        .hidden("padding_1", Kind::bytes(1))
        .field("num3", Kind::u16())
        .hidden("tag_b5fa", Kind::constant(&[0xB5, 0xFA]))
        .field("texture_count", Kind::u32())
        .field("vertex_mapping_count", Kind::u32())
        .field("polygon_mapping_count", Kind::u32())
        .field(
            "vertex_mappings",
            Kind::array(
                Expr::field("vertex_mapping_count"),
                Kind::nested(&vertex_mapping),
            ),
        )
        .field("box_vertex_mappings", Kind::array(8, Kind::nested(&vertex_mapping)))
        .field("some_float", Kind::f32())
        .field(
            "polygons",
            Kind::array(
                Expr::field("polygon_mapping_count"),
                Kind::nested(&polygon_mapping()?),
            ),
        )
        .build()
}

fn texture_name() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder("bgf_texture_name")
        .field("name", Kind::name())
        .hidden("skipped", Kind::skip_until(&name_byte_set()))
        .hidden("marker_2f", Kind::marker(&[0x2F]))
        .build()
}

pub fn schema() -> Result<Arc<Schema>, SchemaError> {
    let mapping = mapping()?;
    let mapping_address = Expr::field("header").member("mapping_address");

    Schema::builder("bgf")
        .field("header", Kind::nested(&header()?))
        .field("textures", Kind::repeat(Kind::nested(&texture()?)))
        .field("game_objects", Kind::repeat(Kind::nested(&game_object()?)))
        .field("mapping", Kind::pointer(mapping_address.clone(), Kind::nested(&mapping)))
        // the usual layout: mapping directly after the objects, footer after it
        .hidden(
            "mapping_inline",
            Kind::when(
                mapping_address.clone().equals(Expr::here()),
                Kind::nested(&mapping),
            ),
        )
        // footer names must not run into a mapping section stored after them
        .hidden(
            "footer_limit",
            Kind::computed(Expr::select(
                mapping_address.clone().greater(Expr::here()),
                mapping_address,
                Expr::here() + Expr::remaining(),
            )),
        )
        .field(
            "footer",
            Kind::greedy(
                Kind::nested(&texture_name()?),
                Stop::Failure(Some(!Expr::here().greater(Expr::parent("footer_limit")))),
            ),
        )
        .build_root()
}
