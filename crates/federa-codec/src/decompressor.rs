use bytes::Bytes;
use tracing::trace;

use crate::config::CodecConfig;
use crate::dictionary::{DecodeDictionary, Slot, OBJECT_SENTINEL, PROPERTY_SENTINEL};
use crate::error::{CodecError, Result};
use crate::object_id::{ObjectId, OBJECT_ID_LEN};
use crate::primitives::{tag, WireReader};
use crate::value::{Value, ValueMap};

/// Stateful decoder for one direction of a stream.
///
/// Any error leaves the dictionaries in an unknown state relative to the
/// sending [`Compressor`](crate::Compressor); the caller should reset the
/// stream.
#[derive(Debug)]
pub struct Decompressor {
    config: CodecConfig,
    properties: DecodeDictionary<String>,
    objects: DecodeDictionary<ObjectId>,
}

impl Decompressor {
    pub fn new() -> Self {
        Self::with_config(CodecConfig::default())
    }

    pub fn with_config(config: CodecConfig) -> Self {
        Self {
            config,
            properties: DecodeDictionary::new(PROPERTY_SENTINEL),
            objects: DecodeDictionary::new(OBJECT_SENTINEL),
        }
    }

    /// Decode one buffer produced by the paired compressor.
    ///
    /// Bytes after the top-level terminator are ignored.
    pub fn decode(&mut self, buf: Bytes) -> Result<ValueMap> {
        let mut reader = WireReader::new(buf);
        let map = self.read_map(&mut reader, 0)?;
        trace!(
            entries = map.len(),
            trailing = reader.remaining(),
            "decoded value map"
        );
        Ok(map)
    }

    pub fn decode_slice(&mut self, buf: &[u8]) -> Result<ValueMap> {
        self.decode(Bytes::copy_from_slice(buf))
    }

    fn read_map(&mut self, r: &mut WireReader, depth: usize) -> Result<ValueMap> {
        let mut map = ValueMap::new();
        loop {
            let header = r.u8()?;
            if header == tag::TERMINATOR {
                return Ok(map);
            }
            let name = self.read_property(r, header)?;
            let value = self.read_value(r, header, depth)?;
            map.insert(name, value);
        }
    }

    fn read_array(&mut self, r: &mut WireReader, depth: usize) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        loop {
            let header = r.u8()?;
            if header == tag::TERMINATOR {
                return Ok(items);
            }
            items.push(self.read_value(r, header, depth)?);
        }
    }

    fn read_value(&mut self, r: &mut WireReader, header: u8, depth: usize) -> Result<Value> {
        let code = header & tag::TYPE_MASK;
        let value = match code {
            tag::NULL => Value::Null,
            tag::FALSE => Value::Bool(false),
            tag::TRUE => Value::Bool(true),
            tag::MAP => Value::Map(self.read_map(r, self.nested(depth)?)?),
            tag::ARRAY => Value::Array(self.read_array(r, self.nested(depth)?)?),
            tag::FLOAT32 => Value::Float(f64::from(r.f32()?)),
            tag::FLOAT64 => Value::Float(r.f64()?),
            0x08..=0x0f => Value::Object(self.read_object(r, code)?),
            0x20..=0x37 => Value::Int(i64::from(code & 0x1f)),
            0x38..=0x3f => {
                let magnitude = match code & 0x03 {
                    0 => u32::from(r.u8()?),
                    1 => u32::from(r.u16()?),
                    2 => r.u32()?,
                    _ => return Err(CodecError::InvalidHeader(header)),
                };
                let magnitude = i64::from(magnitude);
                if code & tag::INT_NEGATIVE != 0 {
                    Value::Int(!magnitude)
                } else {
                    Value::Int(magnitude)
                }
            }
            0x40..=0x5f => {
                let size = match code & 0x1f {
                    0 => usize::from(r.u16()?),
                    0x1f => r.u32()? as usize,
                    n => usize::from(n),
                };
                Value::Bytes(r.bytes(size)?)
            }
            0x60..=0x7f => match code & 0x1f {
                0 => Value::String(r.cstr()?),
                n => Value::String(r.str(usize::from(n))?),
            },
            _ => return Err(CodecError::InvalidHeader(header)),
        };
        Ok(value)
    }

    fn read_property(&mut self, r: &mut WireReader, header: u8) -> Result<String> {
        let mut index = u16::from(r.u8()?);
        if header & tag::PROPERTY_HIGH_BIT != 0 {
            index |= 0x100;
        }
        match self.properties.slot(index) {
            Slot::New => {
                let name = r.cstr()?;
                self.properties.push(name.clone());
                Ok(name)
            }
            Slot::Existing(position) => {
                self.properties
                    .get(position)
                    .cloned()
                    .ok_or(CodecError::InvalidPropertyIndex {
                        index: position,
                        len: self.properties.len(),
                    })
            }
        }
    }

    fn read_object(&mut self, r: &mut WireReader, code: u8) -> Result<ObjectId> {
        let index = (u16::from(code & 0x07) << 8) | u16::from(r.u8()?);
        match self.objects.slot(index) {
            Slot::New => {
                let id = ObjectId::from_bytes(r.array::<OBJECT_ID_LEN>()?);
                self.objects.push(id);
                Ok(id)
            }
            Slot::Existing(position) => {
                self.objects
                    .get(position)
                    .copied()
                    .ok_or(CodecError::InvalidObjectIndex {
                        index: position,
                        len: self.objects.len(),
                    })
            }
        }
    }

    fn nested(&self, depth: usize) -> Result<usize> {
        let depth = depth + 1;
        if depth > self.config.max_depth {
            return Err(CodecError::NestingTooDeep {
                max: self.config.max_depth,
            });
        }
        Ok(depth)
    }
}

impl Default for Decompressor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Compressor;

    fn unhex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    fn map(entries: Vec<(&str, Value)>) -> ValueMap {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn decodes_cold_then_warm_buffers() {
        let mut decompressor = Decompressor::new();
        let first = decompressor
            .decode_slice(&unhex("010078000200790003007a0006007700c3f5484000"))
            .unwrap();
        let second = decompressor
            .decode_slice(&unhex("0101020203030604c3f5484000"))
            .unwrap();

        let expected = map(vec![
            ("x", Value::Null),
            ("y", false.into()),
            ("z", true.into()),
            ("w", f64::from(3.14f32).into()),
        ]);
        assert_eq!(first, expected);
        assert_eq!(second, expected);
    }

    #[test]
    fn decodes_negative_integers() {
        let decoded = Decompressor::new()
            .decode_slice(&unhex(
                "3c006100003c006200633d00630003e73e006400000f423f00",
            ))
            .unwrap();
        assert_eq!(
            decoded,
            map(vec![
                ("a", (-1).into()),
                ("b", (-100).into()),
                ("c", (-1000).into()),
                ("d", (-1_000_000).into()),
            ])
        );
    }

    #[test]
    fn decodes_nested_arrays_and_maps() {
        let mut decompressor = Decompressor::new();
        let decoded = decompressor
            .decode_slice(&unhex("0500780004380079002f000438007a003e000000"))
            .unwrap();
        let expected = map(vec![(
            "x",
            Value::Array(vec![
                map(vec![("y", 47.into())]).into(),
                map(vec![("z", 62.into())]).into(),
            ]),
        )]);
        assert_eq!(decoded, expected);
        let warm = decompressor
            .decode_slice(&unhex("05010438022f000438033e000000"))
            .unwrap();
        assert_eq!(warm, expected);
    }

    #[test]
    fn decodes_object_references() {
        let mut decompressor = Decompressor::new();
        let first = decompressor
            .decode_slice(&unhex(
                "0800780000111122223333444455556666\
                 0800790000aaaabbbbccccddddeeeeffff00",
            ))
            .unwrap();
        let second = decompressor.decode_slice(&unhex("08010108020200")).unwrap();

        let id1: ObjectId = "111122223333444455556666".parse().unwrap();
        let id2: ObjectId = "aaaabbbbccccddddeeeeffff".parse().unwrap();
        let expected = map(vec![("x", id1.into()), ("y", id2.into())]);
        assert_eq!(first, expected);
        assert_eq!(second, expected);
    }

    #[test]
    fn tracks_dictionary_reset() {
        let names: Vec<String> = (0..1200).map(|i| format!("name{i}")).collect();
        let value: ValueMap = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), Value::from(i as i64)))
            .collect();

        let mut compressor = Compressor::new();
        let mut decompressor = Decompressor::new();
        for _ in 0..3 {
            let bytes = compressor.encode(&value).unwrap();
            assert_eq!(decompressor.decode(bytes).unwrap(), value);
        }
    }

    #[test]
    fn tracks_object_dictionary_reset() {
        let ids: Vec<ObjectId> = (0..2100u32)
            .map(|i| {
                let mut bytes = [0u8; OBJECT_ID_LEN];
                bytes[8..].copy_from_slice(&i.to_be_bytes());
                ObjectId::from_bytes(bytes)
            })
            .collect();
        let value = map(vec![(
            "ids",
            Value::Array(ids.into_iter().map(Value::from).collect()),
        )]);

        let mut compressor = Compressor::new();
        let mut decompressor = Decompressor::new();
        for _ in 0..2 {
            let bytes = compressor.encode(&value).unwrap();
            assert_eq!(decompressor.decode(bytes).unwrap(), value);
        }
    }

    #[test]
    fn double_width_floats_decode_exactly() {
        let config = CodecConfig {
            float_width: crate::FloatWidth::Double,
            ..CodecConfig::default()
        };
        let value = map(vec![("w", 0.1.into())]);
        let bytes = Compressor::with_config(config).encode(&value).unwrap();
        assert_eq!(Decompressor::new().decode(bytes).unwrap(), value);
    }

    #[test]
    fn unknown_property_index_is_an_error() {
        let err = Decompressor::new().decode_slice(&[0x01, 0x05, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidPropertyIndex { index: 4, len: 0 }
        ));
        assert!(err.is_desync());
    }

    #[test]
    fn unknown_object_index_is_an_error() {
        let err = Decompressor::new()
            .decode_slice(&[0x08, 0x00, b'x', 0x00, 0x03, 0x00])
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidObjectIndex { index: 2, len: 0 }
        ));
    }

    #[test]
    fn unknown_header_is_an_error() {
        let err = Decompressor::new()
            .decode_slice(&[0x10, 0x00, b'x', 0x00, 0x00])
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidHeader(0x10)));

        let err = Decompressor::new()
            .decode_slice(&[0x3b, 0x00, b'x', 0x00, 0x00])
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidHeader(0x3b)));
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut decompressor = Decompressor::new();
        assert!(matches!(
            decompressor.decode_slice(&[]),
            Err(CodecError::UnexpectedEof { .. })
        ));
        assert!(matches!(
            Decompressor::new().decode_slice(&[0x3a, 0x00, b'n', 0x00, 0x00, 0x01]),
            Err(CodecError::UnexpectedEof { .. })
        ));
        // Missing top-level terminator.
        assert!(matches!(
            Decompressor::new().decode_slice(&[0x01, 0x00, b'x', 0x00]),
            Err(CodecError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn rejects_excessive_nesting() {
        let config = CodecConfig {
            max_depth: 1,
            ..CodecConfig::default()
        };
        // {x: [[ ]]}
        let err = Decompressor::with_config(config)
            .decode_slice(&[0x05, 0x00, b'x', 0x00, 0x05, 0x00, 0x00, 0x00])
            .unwrap_err();
        assert!(matches!(err, CodecError::NestingTooDeep { max: 1 }));
    }

    #[test]
    fn empty_property_name_roundtrips() {
        let value = map(vec![("", 5.into())]);
        let bytes = Compressor::new().encode(&value).unwrap();
        assert_eq!(bytes.as_ref(), &[0x25, 0x00, 0x00, 0x00]);
        assert_eq!(Decompressor::new().decode(bytes).unwrap(), value);
    }
}
