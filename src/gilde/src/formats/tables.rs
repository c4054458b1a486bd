//! A_Obj and A_Geb: fixed-size object and building tables
//!
//! Both files are plain arrays of fixed-width records. Building records
//! pad their variable-length arrays to constant widths.

use std::sync::Arc;

use crate::schema::{Expr, Kind, Schema, SchemaBuilder, SchemaError};

pub const OBJECT_COUNT: i64 = 732;
pub const OBJECT_RECORD_SIZE: usize = 65;

pub const BUILDING_COUNT: i64 = 88;
pub const BUILDING_RECORD_SIZE: usize = 589;

/// `array` of `len` elements of `width` bytes, padded with skipped bytes to `size`
fn padded_array(
    builder: SchemaBuilder,
    name: &str,
    len: Expr,
    element: Kind,
    width: i64,
    size: i64,
) -> SchemaBuilder {
    builder
        .field(name, Kind::array(len.clone(), element))
        .hidden(
            &format!("{name}_padding"),
            Kind::bytes(Expr::lit(size) - len * width),
        )
}

pub fn aobj_schema() -> Result<Arc<Schema>, SchemaError> {
    let object = Schema::builder("object")
        .field("object_type", Kind::u8())
        .field("name", Kind::padded_string(32))
        .field("level", Kind::u8())
        .field("time", Kind::u32())
        .field("data1", Kind::array(4, Kind::u16()))
        .field("data2", Kind::array(4, Kind::u16()))
        .field("magic1", Kind::u16())
        .field("price", Kind::u16())
        .hidden("zeros1", Kind::bytes(2))
        .field("magic2", Kind::u16())
        .hidden("zeros2", Kind::bytes(2))
        .field("magic3", Kind::u8())
        .build()?;

    Schema::builder("aobj")
        .field("objects", Kind::array(OBJECT_COUNT, Kind::nested(&object)))
        .build_root()
}

pub fn ageb_schema() -> Result<Arc<Schema>, SchemaError> {
    let point = Schema::builder("point")
        .field("a", Kind::u8())
        .field("b", Kind::u8())
        .field("c", Kind::u8())
        .build()?;

    let size = || Expr::field("size_data");
    let mut building = Schema::builder("building")
        .field("building_group_id", Kind::u8())
        .field("name", Kind::padded_string(32))
        .field("magic_byte", Kind::u8())
        .field("size_data", Kind::u8());
    building = padded_array(building, "data1", size() * 2, Kind::u16(), 2, 136);
    building = padded_array(building, "data2", size() * 4, Kind::u32(), 4, 248);
    building = padded_array(building, "data3", size(), Kind::u8(), 1, 65);
    building = padded_array(building, "data4", size(), Kind::u8(), 1, 63);
    let building = building
        .field("data5", Kind::array(26, Kind::u8()))
        .field("point1", Kind::nested(&point))
        .field("point2", Kind::nested(&point))
        .field("time", Kind::u32())
        .field("level", Kind::u8())
        .field("magic_byte2", Kind::u8())
        .field("price", Kind::u32())
        .build()?;

    Schema::builder("ageb")
        .field("buildings", Kind::array(BUILDING_COUNT, Kind::nested(&building)))
        .build_root()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Cursor;
    use crate::value::Value;

    fn object_record(name: &str, price: u16) -> Vec<u8> {
        let mut data = vec![3];
        let mut name = name.as_bytes().to_vec();
        name.resize(32, 0);
        data.extend(name);
        data.push(2);
        data.extend_from_slice(&120u32.to_le_bytes());
        data.extend_from_slice(&[0; 16]);
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&price.to_le_bytes());
        data.extend_from_slice(&[0; 2]);
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&[0; 2]);
        data.push(0);
        assert_eq!(data.len(), OBJECT_RECORD_SIZE);
        data
    }

    fn building_record(name: &str, size_data: u8) -> Vec<u8> {
        let mut data = vec![7];
        let mut name = name.as_bytes().to_vec();
        name.resize(32, 0);
        data.extend(name);
        data.push(0);
        data.push(size_data);
        let n = usize::from(size_data);
        let mut data1 = vec![0u8; 136];
        for i in 0..n * 2 {
            data1[i * 2..i * 2 + 2].copy_from_slice(&(i as u16 + 1).to_le_bytes());
        }
        data.extend(data1);
        data.extend(vec![0u8; 248]);
        data.extend(vec![5u8; 65]);
        data.extend(vec![6u8; 63]);
        data.extend(vec![0u8; 26]);
        data.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        data.extend_from_slice(&600u32.to_le_bytes());
        data.push(1);
        data.push(0);
        data.extend_from_slice(&2500u32.to_le_bytes());
        assert_eq!(data.len(), BUILDING_RECORD_SIZE);
        data
    }

    #[test]
    fn test_object_table() {
        let mut data = object_record("Hammer", 40);
        for _ in 1..OBJECT_COUNT {
            data.extend(object_record("", 0));
        }

        let schema = aobj_schema().unwrap();
        let mut cursor = Cursor::new(&data);
        let record = Value::Record(schema.parse(&mut cursor).unwrap());
        assert!(cursor.at_end());
        assert_eq!(
            record.lookup("objects[0].name").and_then(Value::as_text),
            Some("Hammer")
        );
        assert_eq!(record.lookup("objects[0].price"), Some(&Value::Int(40)));
        assert_eq!(
            record.lookup("objects").and_then(Value::as_list).map(<[Value]>::len),
            Some(OBJECT_COUNT as usize)
        );
    }

    #[test]
    fn test_building_table_padding() {
        let mut data = building_record("Schmiede", 3);
        for _ in 1..BUILDING_COUNT {
            data.extend(building_record("", 0));
        }

        let schema = ageb_schema().unwrap();
        let mut cursor = Cursor::new(&data);
        let record = Value::Record(schema.parse(&mut cursor).unwrap());
        assert!(cursor.at_end());

        let smithy = record.lookup("buildings[0]").unwrap();
        assert_eq!(smithy.lookup("name").and_then(Value::as_text), Some("Schmiede"));
        assert_eq!(
            smithy.lookup("data1").and_then(Value::as_list).map(<[Value]>::len),
            Some(6)
        );
        assert_eq!(smithy.lookup("data1[5]"), Some(&Value::Int(6)));
        assert_eq!(smithy.lookup("data3[2]"), Some(&Value::Int(5)));
        assert_eq!(smithy.lookup("point2.c"), Some(&Value::Int(6)));
        assert_eq!(smithy.lookup("price"), Some(&Value::Int(2500)));
        assert_eq!(
            record.lookup("buildings[1].data2").and_then(Value::as_list).map(<[Value]>::len),
            Some(0)
        );
    }
}
