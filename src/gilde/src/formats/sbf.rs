//! SBF: soundbanks
//!
//! All bank descriptors come first, then the bank bodies in the same order.
//! A body looks up its own descriptor by index; single-sound banks have no
//! sub-header.

use std::sync::Arc;

use crate::schema::{Expr, Kind, Schema, SchemaError};

pub const BANK_SINGLE: i64 = 1;
pub const BANK_MULTI: i64 = 2;

pub const SOUND_WAV: i64 = 1;
pub const SOUND_MP3: i64 = 2;

fn soundbank_definition() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder("soundbank_definition")
        .field("address", Kind::u32())
        .field("name", Kind::padded_string(50))
        .field("soundbank_type", Kind::u16())
        .hidden("padding", Kind::bytes(8))
        .build()
}

fn soundbank() -> Result<Arc<Schema>, SchemaError> {
    let header = Schema::builder("soundbank_header")
        .field("sound_count", Kind::u32())
        .field("magic1", Kind::u32())
        .field("magic2", Kind::u32())
        .build()?;

    let sound = Schema::builder("sound_definition")
        .field("sound_type", Kind::u32())
        .field(
            "is_mp3",
            Kind::computed(Expr::field("sound_type").equals(SOUND_MP3)),
        )
        .field("length", Kind::u32())
        .field("magic", Kind::u32())
        .build()?;

    Schema::builder("soundbank")
        .field(
            "soundbank_definition",
            Kind::computed(Expr::parent("soundbank_definitions").at(Expr::index())),
        )
        .hidden(
            "soundbank_type",
            Kind::computed(Expr::field("soundbank_definition").member("soundbank_type")),
        )
        .field(
            "soundbank_header",
            Kind::when(
                Expr::field("soundbank_type").equals(BANK_MULTI),
                Kind::nested(&header),
            ),
        )
        .field(
            "sound_count",
            Kind::computed(Expr::select(
                Expr::field("soundbank_type").equals(BANK_SINGLE),
                1,
                Expr::field("soundbank_header").member("sound_count"),
            )),
        )
        .field(
            "sound_definitions",
            Kind::array(Expr::field("sound_count"), Kind::nested(&sound)),
        )
        .field(
            "sounds",
            Kind::array(
                Expr::field("sound_count"),
                Kind::bytes(
                    Expr::field("sound_definitions")
                        .at(Expr::index())
                        .member("length"),
                ),
            ),
        )
        .build()
}

pub fn schema() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder("sbf")
        .field("name", Kind::padded_string(308))
        .field("soundbank_count", Kind::u32())
        .field("magic", Kind::bytes(4))
        .hidden("padding", Kind::bytes(8))
        .field(
            "soundbank_definitions",
            Kind::array(
                Expr::field("soundbank_count"),
                Kind::nested(&soundbank_definition()?),
            ),
        )
        .field(
            "soundbanks",
            Kind::array(Expr::field("soundbank_count"), Kind::nested(&soundbank()?)),
        )
        .build_root()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Cursor;
    use crate::value::Value;

    fn padded(text: &str, width: usize) -> Vec<u8> {
        let mut data = text.as_bytes().to_vec();
        data.resize(width, 0);
        data
    }

    fn bank_definition(name: &str, kind: u16) -> Vec<u8> {
        let mut data = 0u32.to_le_bytes().to_vec();
        data.extend(padded(name, 50));
        data.extend_from_slice(&kind.to_le_bytes());
        data.extend_from_slice(&[0; 8]);
        data
    }

    fn sound_definition(kind: u32, length: u32) -> Vec<u8> {
        let mut data = kind.to_le_bytes().to_vec();
        data.extend_from_slice(&length.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data
    }

    #[test]
    fn test_single_and_multi_banks() {
        let mut data = padded("ambient", 308);
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(b"SBF1");
        data.extend_from_slice(&[0; 8]);
        data.extend(bank_definition("rain", 1));
        data.extend(bank_definition("market", 2));

        // single bank: one wav of 3 bytes
        data.extend(sound_definition(1, 3));
        data.extend_from_slice(b"abc");

        // multi bank: header with two sounds
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&[0; 8]);
        data.extend(sound_definition(2, 2));
        data.extend(sound_definition(1, 4));
        data.extend_from_slice(b"xy");
        data.extend_from_slice(b"wxyz");

        let schema = schema().unwrap();
        let mut cursor = Cursor::new(&data);
        let record = Value::Record(schema.parse(&mut cursor).unwrap());
        assert!(cursor.at_end());

        assert_eq!(record.lookup("name").and_then(Value::as_text), Some("ambient"));
        assert_eq!(
            record
                .lookup("soundbanks[0].soundbank_definition.name")
                .and_then(Value::as_text),
            Some("rain")
        );
        assert_eq!(record.lookup("soundbanks[0].soundbank_header"), Some(&Value::Absent));
        assert_eq!(record.lookup("soundbanks[0].sound_count"), Some(&Value::Int(1)));
        assert_eq!(
            record.lookup("soundbanks[0].sounds[0]").and_then(Value::as_bytes),
            Some(&b"abc"[..])
        );

        assert_eq!(record.lookup("soundbanks[1].sound_count"), Some(&Value::Int(2)));
        assert_eq!(
            record.lookup("soundbanks[1].sound_definitions[0].is_mp3"),
            Some(&Value::Bool(true))
        );
        assert_eq!(
            record.lookup("soundbanks[1].sounds[1]").and_then(Value::as_bytes),
            Some(&b"wxyz"[..])
        );
    }

    #[test]
    fn test_sound_payload_length_from_definition() {
        let mut data = padded("short", 308);
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&[0; 12]);
        data.extend(bank_definition("bell", 1));
        data.extend(sound_definition(1, 10));
        data.extend_from_slice(&[0; 4]);

        let schema = schema().unwrap();
        let err = schema.parse(&mut Cursor::new(&data)).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("sounds"), "{text}");
    }
}
