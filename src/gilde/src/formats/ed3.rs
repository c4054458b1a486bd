//! ED3: scene graphs
//!
//! A main camera followed by element groups. Every group starts with a
//! single `01` byte and holds a first element plus continuation elements
//! that each start with `01 01`. The element body is chosen by the type
//! fields: `type1` of 0x40/0x80 marks a city (terrain) element, otherwise
//! `type3` selects dummy, camera, object or light.

use std::sync::Arc;

use super::common::transform;
use crate::schema::{Encoding, Expr, Kind, Schema, SchemaError, Stop};
use crate::value::Value;

const WATER_FLAGS: [[u8; 4]; 4] = [
    [0x00, 0x00, 0x00, 0xDC],
    [0x00, 0x00, 0x00, 0xC8],
    [0x00, 0x00, 0x00, 0xCD],
    [0x00, 0x00, 0x00, 0xE6],
];
const TEXTURE_FLAGS: [[u8; 5]; 2] = [
    [0x80, 0x00, 0x00, 0x00, 0x80],
    [0x40, 0x00, 0x00, 0x00, 0x40],
];

fn byte_values<const N: usize>(flags: &[[u8; N]]) -> Vec<Value> {
    flags.iter().map(|flag| Value::Bytes(flag.to_vec())).collect()
}

fn run(values: &[i64]) -> Value {
    Value::List(values.iter().copied().map(Value::Int).collect())
}

fn main_camera() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder("main_camera")
        .field("name", Kind::cstring(Encoding::Ascii))
        .field("nums", Kind::array(179, Kind::f32()))
        .field("magic", Kind::u8())
        .hidden("skipped", Kind::bytes(24))
        .build()
}

fn city_block() -> Result<Arc<Schema>, SchemaError> {
    let water = Schema::builder("water_block")
        .hidden("padding", Kind::bytes(3))
        .field("type", Kind::u8())
        .hidden("padding2", Kind::bytes(3))
        .field("data", Kind::array(11, Kind::f32()))
        .field("num", Kind::u32())
        .build()?;
    let texture = Schema::builder("texture_block")
        .hidden("padding", Kind::bytes(8))
        .field("data", Kind::bytes(Expr::parent("size")))
        .build()?;

    Schema::builder("city_block")
        .field("name", Kind::cstring(Encoding::Ascii))
        .hidden("size", Kind::computed(Expr::parent("size")))
        .hidden("water_flag", Kind::optional(Kind::peek(Kind::bytes(4))))
        .hidden("texture_flag", Kind::optional(Kind::peek(Kind::bytes(5))))
        .field(
            "water_block",
            Kind::when(
                Expr::field("water_flag").one_of(byte_values(&WATER_FLAGS)),
                Kind::nested(&water),
            ),
        )
        .field(
            "texture_block",
            Kind::when(
                Expr::field("texture_flag").one_of(byte_values(&TEXTURE_FLAGS)),
                Kind::nested(&texture),
            ),
        )
        .build()
}

fn city_element() -> Result<Arc<Schema>, SchemaError> {
    let footer = Schema::builder("city_footer")
        .field("names", Kind::repeat(Kind::cstring(Encoding::Ascii)))
        .field("data", Kind::bytes(Expr::remaining()))
        .build()?;
    let has_data3 = || Expr::field("height_data3_flag").equals(1);

    Schema::builder("city_element")
        .hidden("padding1", Kind::bytes(3))
        .field(
            "size",
            Kind::computed(Expr::parent("type1") * Expr::parent("type2")),
        )
        .field("height_data1", Kind::bytes(Expr::field("size")))
        .field("magic", Kind::u32())
        .hidden("padding2", Kind::bytes(1))
        .field("magic2", Kind::u8())
        .hidden("padding3", Kind::bytes(2))
        .field("height_data2", Kind::bytes(Expr::field("size") * 4))
        .hidden("height_data3_flag", Kind::optional(Kind::peek(Kind::u8())))
        .field("magic3", Kind::marker(&[0x02, 0x00, 0x00, 0x00]))
        .field("a", Kind::when(has_data3(), Kind::u32()))
        .field("b", Kind::when(has_data3(), Kind::u32()))
        .field(
            "height_data3",
            Kind::when(has_data3(), Kind::bytes(Expr::field("size"))),
        )
        .hidden("skip0", Kind::run_of(&[0]))
        .hidden("marker_1e", Kind::marker(&[0x1E]))
        .field("blocks", Kind::repeat(Kind::nested(&city_block()?)))
        .field("footer", Kind::nested(&footer))
        .build()
}

fn scene_element() -> Result<Arc<Schema>, SchemaError> {
    let transform = transform()?;

    let dummy0 = Schema::builder("dummy0_element")
        .hidden("padding", Kind::bytes(5))
        .field("data", Kind::array(10, Kind::f32()))
        .build()?;
    let transforms = |name: &str, count: i64| {
        Schema::builder(name)
            .hidden("padding", Kind::bytes(4))
            .field("transform", Kind::nested(&transform))
            .hidden("padding2", Kind::bytes(1))
            .field("transforms", Kind::array(count, Kind::nested(&transform)))
            .build()
    };
    let dummy = transforms("dummy_element", 10)?;
    let camera = transforms("camera_element", 11)?;
    let object = Schema::builder("object_element")
        .hidden("padding", Kind::bytes(19))
        .field("name", Kind::cstring(Encoding::Ascii))
        .field("transforms", Kind::array(11, Kind::nested(&transform)))
        .build()?;
    let light_block = Schema::builder("light_block")
        .field("data", Kind::array(13, Kind::f32()))
        .hidden("skipped", Kind::bytes(4))
        .build()?;
    let light = Schema::builder("light_element")
        .hidden("padding", Kind::bytes(6))
        .field("blocks", Kind::array(8, Kind::nested(&light_block)))
        .build()?;

    let of_type = |type3: i64| (!Expr::field("is_city")).and(Expr::field("type3").equals(type3));

    Schema::builder("scene_element")
        .hidden("skip01", Kind::run_of(&[0, 1]))
        .field("name", Kind::cstring(Encoding::Ascii))
        .field("type1", Kind::u32())
        .field("type2", Kind::u32())
        .field("type3", Kind::u8())
        .hidden("is_city", Kind::computed(Expr::field("type1").one_of([0x80, 0x40])))
        .field(
            "city_element",
            Kind::when(Expr::field("is_city"), Kind::nested(&city_element()?)),
        )
        .field("dummy0_element", Kind::when(of_type(0), Kind::nested(&dummy0)))
        .field("dummy_element", Kind::when(of_type(2), Kind::nested(&dummy)))
        .field("camera_element", Kind::when(of_type(3), Kind::nested(&camera)))
        .field("object_element", Kind::when(of_type(4), Kind::nested(&object)))
        .field("light_element5", Kind::when(of_type(5), Kind::nested(&light)))
        .field("light_element7", Kind::when(of_type(7), Kind::nested(&light)))
        .field("light_element8", Kind::when(of_type(8), Kind::nested(&light)))
        .hidden("skip0", Kind::run_of(&[0]))
        .build()
}

pub fn schema() -> Result<Arc<Schema>, SchemaError> {
    let element = scene_element()?;
    let group = Schema::builder("element_group")
        .hidden("skip01", Kind::run_of(&[0, 1]))
        .field("first_element", Kind::nested(&element))
        .field(
            "elements",
            Kind::greedy(
                Kind::nested(&element),
                Stop::Failure(Some(Expr::field("skip01").equals(run(&[1, 1])))),
            ),
        )
        .build()?;

    Schema::builder("ed3")
        .hidden("skipped", Kind::bytes(4))
        .field("main_camera", Kind::nested(&main_camera()?))
        .field(
            "element_groups",
            Kind::greedy(
                Kind::nested(&group),
                Stop::Failure(Some(Expr::field("skip01").equals(run(&[1])))),
            ),
        )
        .build_root()
}
