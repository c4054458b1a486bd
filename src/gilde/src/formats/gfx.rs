//! GFX: sprite atlases
//!
//! A table of shape bank descriptors. Only descriptors with a non-zero
//! address own a bank body; the body is read through a pointer so the
//! descriptor table itself stays contiguous.

use std::sync::Arc;

use crate::schema::{Expr, Kind, Schema, SchemaError};

/// Width of the offset table at the start of every bank
pub const OFFSET_TABLE_SIZE: i64 = 0x800;

const BANK_MAGIC: &[u8] = b"SHAPBANK";

fn graphic() -> Result<Arc<Schema>, SchemaError> {
    let block = Schema::builder("transparency_block")
        .field("size_transparent", Kind::u32())
        .field("count_pixels", Kind::u32())
        .field("pixel_data", Kind::bytes(Expr::field("count_pixels") * 3))
        .build()?;

    let row = Schema::builder("graphic_row")
        .field("block_count", Kind::u32())
        .field(
            "transparency_blocks",
            Kind::array(Expr::field("block_count"), Kind::nested(&block)),
        )
        .build()?;

    let mut builder = Schema::builder("graphic")
        .field("size", Kind::u32())
        .field("magic1", Kind::u16())
        .field("width", Kind::u16())
        .field("magic2", Kind::u16())
        .field("height", Kind::u16());
    for magic in ["magic3", "magic4", "magic5"] {
        builder = builder.field(magic, Kind::u16());
    }
    builder = builder
        .field("width2", Kind::u16())
        .field("height2", Kind::u16());
    for magic in [
        "magic6", "magic7", "magic8", "magic9", "magic10", "magic11", "magic12", "magic13",
    ] {
        builder = builder.field(magic, Kind::u16());
    }

    builder
        .field("magic14", Kind::u32())
        .field("size_without_footer", Kind::u32())
        .field("magic15", Kind::u32())
        .field(
            "footer_size",
            Kind::computed(Expr::field("size") - Expr::field("size_without_footer")),
        )
        .field(
            "has_transparency",
            Kind::computed(Expr::field("size_without_footer").greater(0)),
        )
        .field(
            "pixel_data",
            Kind::when(
                !Expr::field("has_transparency"),
                Kind::bytes(Expr::field("width") * Expr::field("height") * 3),
            ),
        )
        .field(
            "graphic_rows",
            Kind::when(
                Expr::field("has_transparency"),
                Kind::array(Expr::field("height"), Kind::nested(&row)),
            ),
        )
        .field(
            "footer_data",
            Kind::when(
                Expr::field("has_transparency"),
                Kind::array(Expr::field("footer_size") / 4, Kind::u32()),
            ),
        )
        .build()
}

pub fn shapebank() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder("shapebank")
        .hidden("magic", Kind::constant(BANK_MAGIC))
        .field("magic1", Kind::u8())
        .field("magic2", Kind::u8())
        .hidden("zeros1", Kind::bytes(32))
        .field("graphics_count", Kind::u16())
        .field("magic_data1", Kind::array(2, Kind::u16()))
        .field("size", Kind::u32())
        .field("magic3", Kind::u32())
        .hidden("zeros2", Kind::bytes(6))
        .field("size_without_footer", Kind::u16())
        .hidden("zeros3", Kind::bytes(3))
        .field("magic4", Kind::u16())
        .field(
            "offsets",
            Kind::array(Expr::field("graphics_count"), Kind::u32()),
        )
        .hidden(
            "offsets_padding",
            Kind::bytes(Expr::lit(OFFSET_TABLE_SIZE) - Expr::field("graphics_count") * 4),
        )
        .field(
            "graphics",
            Kind::array(Expr::field("graphics_count"), Kind::nested(&graphic()?)),
        )
        .field(
            "has_footer",
            Kind::computed(Expr::field("size_without_footer").differs(0)),
        )
        .field(
            "footer_size",
            Kind::computed(Expr::select(
                Expr::field("has_footer"),
                Expr::field("graphics_count") * 8,
                0,
            )),
        )
        .field("footer", Kind::bytes(Expr::field("footer_size")))
        .build()
}

fn shapebank_definition() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder("shapebank_definition")
        .field("name", Kind::padded_string(48))
        .field("address", Kind::u32())
        .hidden("zeros1", Kind::bytes(4))
        .field("size", Kind::u32())
        .field("magic1", Kind::u32())
        .hidden("zeros2", Kind::bytes(4))
        .field("magic_flag_int", Kind::u8())
        .field(
            "magic_flag",
            Kind::computed(Expr::field("magic_flag_int").equals(1)),
        )
        .hidden("zeros3", Kind::bytes(7))
        .field("magic2", Kind::u32())
        .field("width", Kind::u16())
        .field("height", Kind::u16())
        .field(
            "is_main_bank",
            Kind::computed(Expr::field("address").differs(0)),
        )
        .field(
            "is_font",
            Kind::computed(
                Expr::field("width")
                    .equals(0)
                    .and(Expr::field("height").equals(0)),
            ),
        )
        .field(
            "shapebank",
            Kind::when(
                Expr::field("is_main_bank"),
                Kind::pointer(Expr::field("address"), Kind::nested(&shapebank()?)),
            ),
        )
        .build()
}

pub fn schema() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder("gfx")
        .field("shapebank_count", Kind::u32())
        .field(
            "shapebank_definitions",
            Kind::array(
                Expr::field("shapebank_count"),
                Kind::nested(&shapebank_definition()?),
            ),
        )
        .build_root()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::cursor::Cursor;
    use crate::formats::Format;
    use crate::pipeline::Decoder;
    use crate::value::Value;
    use crate::Error;

    const DEFINITION_SIZE: usize = 48 + 4 * 6 + 1 + 7 + 4;

    fn definition(name: &str, address: u32, width: u16, height: u16) -> Vec<u8> {
        let mut data = vec![0u8; 48];
        data[..name.len()].copy_from_slice(name.as_bytes());
        data.extend_from_slice(&address.to_le_bytes());
        data.extend_from_slice(&[0; 4]);
        data.extend_from_slice(&0x100u32.to_le_bytes());
        data.extend_from_slice(&7u32.to_le_bytes());
        data.extend_from_slice(&[0; 4]);
        data.push(1);
        data.extend_from_slice(&[0; 7]);
        data.extend_from_slice(&9u32.to_le_bytes());
        data.extend_from_slice(&width.to_le_bytes());
        data.extend_from_slice(&height.to_le_bytes());
        data
    }

    fn graphic_header(size: u32, width: u16, height: u16, size_without_footer: u32) -> Vec<u8> {
        let mut data = size.to_le_bytes().to_vec();
        let words = [0, width, 0, height, 0, 0, 0, width, height, 0, 0, 0, 0, 0, 0, 0, 0];
        for word in words {
            data.extend_from_slice(&word.to_le_bytes());
        }
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&size_without_footer.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data
    }

    fn bank(graphics: &[Vec<u8>], size_without_footer: u16) -> Vec<u8> {
        let mut data = BANK_MAGIC.to_vec();
        data.extend_from_slice(&[1, 2]);
        data.extend_from_slice(&[0; 32]);
        data.extend_from_slice(&(graphics.len() as u16).to_le_bytes());
        data.extend_from_slice(&[0; 4]);
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&[0; 6]);
        data.extend_from_slice(&size_without_footer.to_le_bytes());
        data.extend_from_slice(&[0; 3]);
        data.extend_from_slice(&0u16.to_le_bytes());
        let mut table = vec![0u8; OFFSET_TABLE_SIZE as usize];
        for (i, _) in graphics.iter().enumerate() {
            table[i * 4..i * 4 + 4].copy_from_slice(&(i as u32).to_le_bytes());
        }
        data.extend(table);
        for graphic in graphics {
            data.extend_from_slice(graphic);
        }
        if size_without_footer != 0 {
            data.extend(vec![0xEE; graphics.len() * 8]);
        }
        data
    }

    #[test]
    fn test_non_main_bank_reads_nothing() {
        let mut data = 1u32.to_le_bytes().to_vec();
        data.extend(definition("font_small", 0, 0, 0));

        let schema = schema().unwrap();
        let mut cursor = Cursor::new(&data);
        let record = Value::Record(schema.parse(&mut cursor).unwrap());

        assert_eq!(cursor.position(), 4 + DEFINITION_SIZE);
        assert_eq!(cursor.high_water(), data.len());
        let def = record.lookup("shapebank_definitions[0]").unwrap();
        assert_eq!(def.lookup("name").and_then(Value::as_text), Some("font_small"));
        assert_eq!(def.lookup("is_main_bank"), Some(&Value::Bool(false)));
        assert_eq!(def.lookup("is_font"), Some(&Value::Bool(true)));
        assert_eq!(def.lookup("shapebank"), Some(&Value::Absent));
    }

    #[test]
    fn test_flat_and_transparent_graphics() {
        // 2x1 flat RGB
        let mut flat = graphic_header(0, 2, 1, 0);
        flat.extend_from_slice(&[1, 2, 3, 4, 5, 6]);

        // 1 row: 3 transparent then 1 explicit pixel, one footer word
        let mut transparent = graphic_header(12, 4, 1, 8);
        transparent.extend_from_slice(&1u32.to_le_bytes());
        transparent.extend_from_slice(&3u32.to_le_bytes());
        transparent.extend_from_slice(&1u32.to_le_bytes());
        transparent.extend_from_slice(&[9, 9, 9]);
        transparent.extend_from_slice(&0xABCDu32.to_le_bytes());

        let header_len = 4 + 2 * DEFINITION_SIZE;
        let mut data = 2u32.to_le_bytes().to_vec();
        data.extend(definition("font", 0, 0, 0));
        data.extend(definition("main", header_len as u32, 4, 1));
        assert_eq!(data.len(), header_len);
        data.extend(bank(&[flat, transparent], 1));

        let schema = schema().unwrap();
        let mut cursor = Cursor::new(&data);
        let record = Value::Record(schema.parse(&mut cursor).unwrap());

        // the bank is read through a pointer; the table ends the sequential read
        assert_eq!(cursor.position(), header_len);
        assert_eq!(cursor.high_water(), data.len());

        let bank = record.lookup("shapebank_definitions[1].shapebank").unwrap();
        assert_eq!(bank.lookup("graphics_count"), Some(&Value::Int(2)));
        assert_eq!(bank.lookup("offsets[1]"), Some(&Value::Int(1)));
        assert_eq!(bank.lookup("footer_size"), Some(&Value::Int(16)));

        assert_eq!(
            bank.lookup("graphics[0].pixel_data").and_then(Value::as_bytes),
            Some(&[1u8, 2, 3, 4, 5, 6][..])
        );
        assert_eq!(bank.lookup("graphics[0].graphic_rows"), Some(&Value::Absent));

        let second = bank.lookup("graphics[1]").unwrap();
        assert_eq!(second.lookup("has_transparency"), Some(&Value::Bool(true)));
        assert_eq!(second.lookup("pixel_data"), Some(&Value::Absent));
        assert_eq!(
            second.lookup("graphic_rows[0].transparency_blocks[0].size_transparent"),
            Some(&Value::Int(3))
        );
        assert_eq!(second.lookup("footer_data[0]"), Some(&Value::Int(0xABCD)));
    }

    #[test]
    fn test_bytes_skipped_by_the_bank_address_are_unread() {
        let mut flat = graphic_header(0, 1, 1, 0);
        flat.extend_from_slice(&[1, 2, 3]);

        let header_len = 4 + DEFINITION_SIZE;
        let mut data = 1u32.to_le_bytes().to_vec();
        data.extend(definition("main", header_len as u32 + 16, 1, 1));
        data.extend([0xAA; 16]);
        data.extend(bank(&[flat], 0));

        let schema = schema().unwrap();
        let mut cursor = Cursor::new(&data);
        schema.parse(&mut cursor).unwrap();
        assert_eq!(cursor.high_water(), data.len());
        assert_eq!(cursor.first_gap(), Some((header_len, header_len + 16)));

        let decoder = Decoder::new(&Config::default());
        match decoder.decode_bytes(Format::Gfx, &data, "ui.gfx").unwrap_err() {
            Error::MalformedAsset { offset, found, .. } => {
                assert_eq!(offset, header_len);
                assert!(found.contains("16 unread"), "{found}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
