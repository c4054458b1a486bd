//! OGR: object groups
//!
//! A flat list of dummies, placed objects and lights. The byte run between
//! an element's name and its type doubles as the padding width of the
//! light data blocks.

use std::sync::Arc;

use super::common::vec3;
use crate::schema::{Encoding, Expr, Kind, Schema, SchemaError};

fn object_data() -> Result<Arc<Schema>, SchemaError> {
    let vec3 = vec3()?;
    Schema::builder("object_data")
        .field("offset", Kind::nested(&vec3))
        .field("data", Kind::nested(&vec3))
        .build()
}

fn light_element() -> Result<Arc<Schema>, SchemaError> {
    let block = Schema::builder("light_data_block")
        .field("data", Kind::array(9, Kind::f32()))
        .hidden("zeros", Kind::bytes(12))
        .hidden(
            "skipped",
            Kind::when(
                Expr::parent("data_padding").greater(0),
                Kind::bytes(Expr::parent("data_padding")),
            ),
        )
        .build()?;

    Schema::builder("light_element")
        .hidden("skipped", Kind::bytes(6))
        .hidden("data_padding", Kind::computed(Expr::parent("skip013").len()))
        .field(
            "data_count",
            Kind::computed(Expr::select(
                Expr::field("data_padding")
                    .equals(8)
                    .and(!Expr::parent("type").one_of([7, 8])),
                8,
                7,
            )),
        )
        .field(
            "light_data_blocks",
            Kind::array(Expr::field("data_count"), Kind::nested(&block)),
        )
        .build()
}

fn object_element() -> Result<Arc<Schema>, SchemaError> {
    let object_data = object_data()?;
    Schema::builder("object_element")
        .hidden("skip012345678", Kind::run_of(&[0, 1, 2, 3, 4, 5, 6, 7, 8]))
        .field("name", Kind::cstring(Encoding::Ascii))
        .field("object_data", Kind::nested(&object_data))
        .hidden("next", Kind::optional(Kind::peek(Kind::u8())))
        .field(
            "additional_flag",
            Kind::when(Expr::field("next").equals(1), Kind::u8()),
        )
        .field(
            "object_data_additional",
            Kind::when(
                Expr::field("additional_flag").equals(1),
                Kind::nested(&object_data),
            ),
        )
        .build()
}

fn group_element() -> Result<Arc<Schema>, SchemaError> {
    let dummy = Schema::builder("dummy_element")
        .hidden("skipped", Kind::bytes(4))
        .field("object_data", Kind::nested(&object_data()?))
        .build()?;

    Schema::builder("group_element")
        .hidden("skip01", Kind::run_of(&[0, 1]))
        .field("name", Kind::cstring(Encoding::Ascii))
        .hidden("skip013", Kind::run_of(&[0, 1, 3]))
        .field("type", Kind::u8())
        .field(
            "dummy_element",
            Kind::when(Expr::field("type").equals(2), Kind::nested(&dummy)),
        )
        .field(
            "object_element",
            Kind::when(Expr::field("type").equals(4), Kind::nested(&object_element()?)),
        )
        .field(
            "light_element",
            Kind::when(
                Expr::field("type").one_of([5, 6, 7, 8]),
                Kind::nested(&light_element()?),
            ),
        )
        .build()
}

pub fn schema() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder("ogr")
        .field("magic1", Kind::u8())
        .field("magic2", Kind::u8())
        .field("magic3", Kind::u16())
        .hidden("skipped1", Kind::run_of(&[1, 2, 3, 4, 5, 6, 7, 8]))
        .hidden("skipped2", Kind::run_of(&[0]))
        .field("group_elements", Kind::repeat(Kind::nested(&group_element()?)))
        .build_root()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Cursor;
    use crate::value::Value;

    fn floats(count: usize, value: f32) -> Vec<u8> {
        std::iter::repeat(value.to_le_bytes())
            .take(count)
            .flatten()
            .collect()
    }

    #[test]
    fn test_objects_and_lights() {
        let mut data = vec![0x10, 0x20, 0x01, 0x00, 0x02, 0x03, 0x00, 0x00];
        // object with additional data
        data.extend_from_slice(b"\x01haus\0\x00\x04");
        data.extend_from_slice(&[0x00, 0x02]);
        data.extend_from_slice(b"ob_haus\0");
        data.extend(floats(6, 1.0));
        data.push(0x01);
        data.extend(floats(6, 2.0));
        // light with eight bytes of padding
        data.extend_from_slice(b"\x01lamp\0");
        data.extend_from_slice(&[0x00; 8]);
        data.push(0x05);
        data.extend_from_slice(&[0x00; 6]);
        for _ in 0..8 {
            data.extend(floats(9, 0.5));
            data.extend_from_slice(&[0x00; 12]);
            data.extend_from_slice(&[0x00; 8]);
        }

        let schema = schema().unwrap();
        let mut cursor = Cursor::new(&data);
        let record = Value::Record(schema.parse(&mut cursor).unwrap());
        assert_eq!(cursor.position(), data.len());

        assert_eq!(record.lookup("magic3"), Some(&Value::Int(1)));
        assert_eq!(
            record.lookup("group_elements[0].object_element.name").and_then(Value::as_text),
            Some("ob_haus")
        );
        assert_eq!(
            record.lookup("group_elements[0].object_element.additional_flag"),
            Some(&Value::Int(1))
        );
        assert_eq!(
            record.lookup("group_elements[0].object_element.object_data_additional.data.z"),
            Some(&Value::Float(2.0))
        );
        assert_eq!(
            record.lookup("group_elements[1].light_element.data_count"),
            Some(&Value::Int(8))
        );
        assert_eq!(
            record
                .lookup("group_elements[1].light_element.light_data_blocks[7].data[8]"),
            Some(&Value::Float(0.5))
        );
        assert_eq!(record.lookup("group_elements[1].object_element"), Some(&Value::Absent));
    }

    #[test]
    fn test_light_count_depends_on_type() {
        let mut data = vec![0x10, 0x20, 0x01, 0x00, 0x01];
        data.extend_from_slice(b"\x01spot\0");
        data.extend_from_slice(&[0x00; 8]);
        data.push(0x07);
        data.extend_from_slice(&[0x00; 6]);
        for _ in 0..7 {
            data.extend(floats(9, 0.0));
            data.extend_from_slice(&[0x00; 20]);
        }

        let schema = schema().unwrap();
        let mut cursor = Cursor::new(&data);
        let record = Value::Record(schema.parse(&mut cursor).unwrap());
        assert_eq!(cursor.position(), data.len());
        assert_eq!(
            record.lookup("group_elements[0].light_element.data_count"),
            Some(&Value::Int(7))
        );
    }
}
