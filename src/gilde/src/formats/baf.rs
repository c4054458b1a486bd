//! BAF: keyframed vertex animations
//!
//! Each key holds `groups_per_key` point containers (one per animated
//! model). Timing lives outside the binary in an `.ini` sidecar next to the
//! `.baf`, read by [`AnimationSettings`].

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use super::common::vec3;
use crate::schema::{Encoding, Expr, Kind, Schema, SchemaError};
use crate::value::{Record, Value};
use crate::Error;

pub const SETTINGS_SECTION: &str = "4HEAD Studios Animation-Settings";
const KEY_NUM_KEYS: &str = "numkeys";
const KEY_KEYS: &str = "keys";
const KEY_LOOP_IN: &str = "loopin";
const KEY_LOOP_OUT: &str = "loopout";

/// Ticks per second of the `Keys` timeline
pub const TICKS_PER_SECOND: f32 = 80.0;

fn header() -> Result<Arc<Schema>, SchemaError> {
    let flagged_u32 = |flag: &str| Kind::when(Expr::field(flag), Kind::u32());
    Schema::builder("baf_header")
        .hidden("magic", Kind::constant(b"BGF\0"))
        .hidden("tag_30", Kind::constant(&[0x30]))
        .field("size_less_10", Kind::u32())
        .hidden("tag_01", Kind::constant(&[0x01]))
        .field("a", Kind::u16())
        .hidden("tag_cdab23", Kind::constant(&[0xCD, 0xAB, 0x23]))
        .field("num_keys", Kind::u32())
        .hidden("marker_3301", Kind::marker(&[0x33, 0x01]))
        .hidden("marker_2400", Kind::marker(&[0x24, 0x00]))
        .hidden("marker_37", Kind::marker(&[0x37]))
        .field("b", flagged_u32("marker_37"))
        .hidden("marker_36", Kind::marker(&[0x36]))
        .field("optional_groups_per_key", flagged_u32("marker_36"))
        .field(
            "groups_per_key",
            Kind::computed(Expr::select(
                Expr::field("optional_groups_per_key")
                    .present()
                    .and(Expr::field("optional_groups_per_key").differs(0)),
                Expr::field("optional_groups_per_key"),
                1,
            )),
        )
        .hidden("marker_34", Kind::marker(&[0x34]))
        .field("num_points", flagged_u32("marker_34"))
        .hidden("marker_29", Kind::marker(&[0x29]))
        .field("d", flagged_u32("marker_29"))
        .hidden("marker_2a", Kind::marker(&[0x2A]))
        .field("e", flagged_u32("marker_2a"))
        .build()
}

fn skeleton() -> Result<Arc<Schema>, SchemaError> {
    let vec3 = vec3()?;
    let data = Schema::builder("skeleton_data")
        .field("point_a", Kind::nested(&vec3))
        .hidden("tag_3a", Kind::constant(&[0x3A]))
        .field("point_b", Kind::nested(&vec3))
        .build()?;
    Schema::builder("skeleton")
        .hidden("marker_38", Kind::marker(&[0x38]))
        .field(
            "name",
            Kind::when(Expr::field("marker_38"), Kind::cstring(Encoding::Ascii)),
        )
        .hidden("marker_39", Kind::marker(&[0x39]))
        .field("data", Kind::when(Expr::field("marker_39"), Kind::nested(&data)))
        .build()
}

fn skeleton_container() -> Result<Arc<Schema>, SchemaError> {
    let vec3 = vec3()?;
    let skeleton = skeleton()?;
    Schema::builder("skeleton_container")
        .field("point_a", Kind::nested(&vec3))
        .field("point_b", Kind::nested(&vec3))
        .field("skeleton_head", Kind::nested(&skeleton))
        .field("skeleton_left_hand", Kind::nested(&skeleton))
        .field("skeleton_right_hand", Kind::nested(&skeleton))
        .build()
}

fn point_container() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder("point_container")
        .hidden("tag_18", Kind::constant(&[0x18]))
        .field("id", Kind::u32())
        .hidden("tag_19", Kind::constant(&[0x19]))
        .field("count", Kind::u32())
        .hidden("tag_21", Kind::constant(&[0x21]))
        .field("vertices", Kind::array(Expr::field("count"), Kind::nested(&vec3()?)))
        .hidden("tag_28", Kind::constant(&[0x28]))
        .hidden("marker_31", Kind::marker(&[0x31]))
        .field(
            "skeleton_container",
            Kind::when(Expr::field("marker_31"), Kind::nested(&skeleton_container()?)),
        )
        .build()
}

pub fn schema() -> Result<Arc<Schema>, SchemaError> {
    let key = Schema::builder("baf_key")
        .field(
            "models",
            Kind::array(
                Expr::parent("header").member("groups_per_key"),
                Kind::nested(&point_container()?),
            ),
        )
        .build()?;

    Schema::builder("baf")
        .field("header", Kind::nested(&header()?))
        .field(
            "keys",
            Kind::array(Expr::field("header").member("num_keys"), Kind::nested(&key)),
        )
        .hidden("footer", Kind::constant(&[0x2F]))
        .build_root()
}

/// Timing sidecar of an animation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationSettings {
    pub num_keys: i64,
    /// Key times in seconds
    pub key_times: Option<Vec<f32>>,
    pub loop_in: Option<i64>,
    pub loop_out: Option<i64>,
}

impl AnimationSettings {
    /// Parse the `[4HEAD Studios Animation-Settings]` section
    ///
    /// Keys are matched case-insensitively; `;` and `#` start comments.
    pub fn parse(text: &str, path: &Path) -> crate::Result<Self> {
        let invalid = |reason: String| Error::Settings {
            path: path.to_path_buf(),
            reason,
        };

        let mut in_section = false;
        let mut found_section = false;
        let mut entries: Vec<(String, String)> = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                in_section = section.trim() == SETTINGS_SECTION;
                found_section |= in_section;
                continue;
            }
            if !in_section {
                continue;
            }
            if let Some((key, value)) = line.split_once('=').or_else(|| line.split_once(':')) {
                entries.push((key.trim().to_ascii_lowercase(), value.trim().to_string()));
            }
        }

        if !found_section {
            return Err(invalid(format!("missing section [{}]", SETTINGS_SECTION)));
        }

        let get = |key: &str| {
            entries
                .iter()
                .rev()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.as_str())
        };
        let int = |key: &str| -> crate::Result<Option<i64>> {
            get(key)
                .map(|value| {
                    value
                        .parse::<i64>()
                        .map_err(|_| invalid(format!("{} is not an integer: '{}'", key, value)))
                })
                .transpose()
        };

        let num_keys = int(KEY_NUM_KEYS)?
            .ok_or_else(|| invalid(format!("missing {}", KEY_NUM_KEYS)))?;
        let key_times = get(KEY_KEYS)
            .map(|value| {
                value
                    .split(',')
                    .map(|tick| {
                        tick.trim()
                            .parse::<f32>()
                            .map(|tick| tick / TICKS_PER_SECOND)
                            .map_err(|_| invalid(format!("bad key time '{}'", tick.trim())))
                    })
                    .collect::<crate::Result<Vec<_>>>()
            })
            .transpose()?;

        Ok(Self {
            num_keys,
            key_times,
            loop_in: int(KEY_LOOP_IN)?,
            loop_out: int(KEY_LOOP_OUT)?,
        })
    }

    /// Sidecar files are Latin-1 text
    pub fn from_bytes(bytes: &[u8], path: &Path) -> crate::Result<Self> {
        let text: String = bytes.iter().map(|&b| char::from(b)).collect();
        Self::parse(&text, path)
    }

    pub fn to_value(&self) -> Value {
        let mut record = Record::with_capacity(4);
        record.push("num_keys", Value::Int(self.num_keys));
        record.push(
            "key_times",
            self.key_times.as_ref().map_or(Value::Absent, |times| {
                Value::List(times.iter().copied().map(Value::Float).collect())
            }),
        );
        record.push("loop_in", Value::from(self.loop_in));
        record.push("loop_out", Value::from(self.loop_out));
        Value::Record(record)
    }
}
