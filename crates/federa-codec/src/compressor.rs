use bytes::Bytes;
use tracing::trace;

use crate::config::{CodecConfig, FloatWidth};
use crate::dictionary::{EncodeDictionary, OBJECT_SENTINEL, PROPERTY_SENTINEL};
use crate::error::{CodecError, Result};
use crate::object_id::ObjectId;
use crate::primitives::{tag, WireWriter};
use crate::value::{Value, ValueMap};

const INITIAL_CAPACITY: usize = 64;

/// Largest magnitude an integer may have after the sign transform.
const MAX_MAGNITUDE: u64 = u32::MAX as u64;

/// Stateful encoder for one direction of a stream.
///
/// Property names and object ids are remembered across calls to
/// [`encode`](Self::encode), so a repeated name costs a single byte. The
/// paired [`Decompressor`](crate::Decompressor) must see every buffer this
/// produces, in order.
#[derive(Debug)]
pub struct Compressor {
    config: CodecConfig,
    properties: EncodeDictionary<String>,
    objects: EncodeDictionary<ObjectId>,
}

impl Compressor {
    pub fn new() -> Self {
        Self::with_config(CodecConfig::default())
    }

    pub fn with_config(config: CodecConfig) -> Self {
        Self {
            config,
            properties: EncodeDictionary::new(PROPERTY_SENTINEL),
            objects: EncodeDictionary::new(OBJECT_SENTINEL),
        }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Encode a top-level map.
    ///
    /// The whole value is checked before anything is written, so a failed
    /// call leaves the dictionaries untouched and the stream in sync.
    pub fn encode(&mut self, map: &ValueMap) -> Result<Bytes> {
        self.check_map(map, 0)?;

        let mut out = WireWriter::with_capacity(INITIAL_CAPACITY);
        for (name, value) in map {
            self.write_element(&mut out, Some(name.as_str()), value);
        }
        out.put_u8(tag::TERMINATOR);

        trace!(
            len = out.len(),
            properties = self.properties.len(),
            objects = self.objects.len(),
            "encoded value map"
        );
        Ok(out.take())
    }

    fn check_map(&self, map: &ValueMap, depth: usize) -> Result<()> {
        for (name, value) in map {
            if name.as_bytes().contains(&0) {
                return Err(CodecError::InteriorNul);
            }
            self.check_value(value, depth)?;
        }
        Ok(())
    }

    fn check_value(&self, value: &Value, depth: usize) -> Result<()> {
        match value {
            Value::Int(n) => {
                if magnitude(*n) > MAX_MAGNITUDE {
                    return Err(CodecError::IntegerOutOfRange(*n));
                }
            }
            Value::String(s) => {
                if !fits_inline(s.len()) && s.as_bytes().contains(&0) {
                    return Err(CodecError::InteriorNul);
                }
            }
            Value::Bytes(b) => {
                if b.len() as u64 > u64::from(u32::MAX) {
                    return Err(CodecError::BinaryTooLarge(b.len()));
                }
            }
            Value::Array(items) => {
                let depth = self.nested(depth)?;
                for item in items {
                    self.check_value(item, depth)?;
                }
            }
            Value::Map(map) => self.check_map(map, self.nested(depth)?)?,
            Value::Null | Value::Bool(_) | Value::Float(_) | Value::Object(_) => {}
        }
        Ok(())
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

    /// Write one element. Array elements have no name and no property slot.
    fn write_element(&mut self, out: &mut WireWriter, name: Option<&str>, value: &Value) {
        let slot = name.map(|name| (self.properties.index_for(name), name));
        let high = match slot {
            Some((index, _)) if index & 0x100 != 0 => tag::PROPERTY_HIGH_BIT,
            _ => 0,
        };

        match value {
            Value::Null => {
                out.put_u8(high | tag::NULL);
                self.write_slot(out, slot);
            }
            Value::Bool(b) => {
                out.put_u8(high | if *b { tag::TRUE } else { tag::FALSE });
                self.write_slot(out, slot);
            }
            Value::Float(f) => match self.config.float_width {
                FloatWidth::Single => {
                    out.put_u8(high | tag::FLOAT32);
                    self.write_slot(out, slot);
                    out.put_f32(*f as f32);
                }
                FloatWidth::Double => {
                    out.put_u8(high | tag::FLOAT64);
                    self.write_slot(out, slot);
                    out.put_f64(*f);
                }
            },
            Value::Int(n) => self.write_int(out, high, slot, *n),
            Value::Object(id) => {
                let index = self.objects.index_for(id);
                out.put_u8(high | tag::OBJECT | ((index >> 8) & 0x07) as u8);
                self.write_slot(out, slot);
                out.put_u8((index & 0xff) as u8);
                if self.objects.is_inline(index) {
                    out.put_slice(id.as_bytes());
                }
            }
            Value::Bytes(b) => {
                let size = b.len();
                if size != 0 && size < usize::from(tag::BINARY_LONG) {
                    out.put_u8(high | tag::BINARY | size as u8);
                    self.write_slot(out, slot);
                } else if size <= usize::from(u16::MAX) {
                    out.put_u8(high | tag::BINARY);
                    self.write_slot(out, slot);
                    out.put_u16(size as u16);
                } else {
                    out.put_u8(high | tag::BINARY_LONG);
                    self.write_slot(out, slot);
                    out.put_u32(size as u32);
                }
                out.put_slice(b);
            }
            Value::String(s) => {
                let len = s.len();
                if fits_inline(len) {
                    out.put_u8(high | tag::STRING | len as u8);
                    self.write_slot(out, slot);
                    out.put_slice(s.as_bytes());
                } else {
                    out.put_u8(high | tag::STRING);
                    self.write_slot(out, slot);
                    out.put_cstr(s);
                }
            }
            Value::Array(items) => {
                out.put_u8(high | tag::ARRAY);
                self.write_slot(out, slot);
                for item in items {
                    self.write_element(out, None, item);
                }
                out.put_u8(tag::TERMINATOR);
            }
            Value::Map(map) => {
                out.put_u8(high | tag::MAP);
                self.write_slot(out, slot);
                for (name, item) in map {
                    self.write_element(out, Some(name.as_str()), item);
                }
                out.put_u8(tag::TERMINATOR);
            }
        }
    }

    fn write_int(&self, out: &mut WireWriter, high: u8, slot: Option<(u16, &str)>, n: i64) {
        if (0..24).contains(&n) {
            out.put_u8(high | tag::SMALL_INT | n as u8);
            self.write_slot(out, slot);
            return;
        }

        let sign = if n < 0 { tag::INT_NEGATIVE } else { 0 };
        let magnitude = magnitude(n) as u32;
        if magnitude < 0x100 {
            out.put_u8(high | tag::INT | sign);
            self.write_slot(out, slot);
            out.put_u8(magnitude as u8);
        } else if magnitude < 0x1_0000 {
            out.put_u8(high | tag::INT | sign | 0x01);
            self.write_slot(out, slot);
            out.put_u16(magnitude as u16);
        } else {
            out.put_u8(high | tag::INT | sign | 0x02);
            self.write_slot(out, slot);
            out.put_u32(magnitude);
        }
    }

    fn write_slot(&self, out: &mut WireWriter, slot: Option<(u16, &str)>) {
        if let Some((index, name)) = slot {
            out.put_u8((index & 0xff) as u8);
            if self.properties.is_inline(index) {
                out.put_cstr(name);
            }
        }
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

/// Negative values are stored as `-n - 1`.
fn magnitude(n: i64) -> u64 {
    if n < 0 {
        !n as u64
    } else {
        n as u64
    }
}

fn fits_inline(len: usize) -> bool {
    len != 0 && len < 0x20
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn map(entries: Vec<(&str, Value)>) -> ValueMap {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    /// Encode twice with the same compressor: cold and warm dictionary.
    fn encode_twice(value: &ValueMap) -> (String, String) {
        let mut compressor = Compressor::new();
        let first = compressor.encode(value).unwrap();
        let second = compressor.encode(value).unwrap();
        (hex(&first), hex(&second))
    }

    #[test]
    fn empty_map() {
        assert_eq!(encode_twice(&ValueMap::new()), ("00".into(), "00".into()));
    }

    #[test]
    fn null_bool_float() {
        let value = map(vec![
            ("x", Value::Null),
            ("y", false.into()),
            ("z", true.into()),
            ("w", 3.14.into()),
        ]);
        let (first, second) = encode_twice(&value);
        assert_eq!(first, "010078000200790003007a0006007700c3f5484000");
        assert_eq!(second, "0101020203030604c3f5484000");
    }

    #[test]
    fn integer_widths() {
        let value = map(vec![
            ("a", 0.into()),
            ("b", 10.into()),
            ("c", 100.into()),
            ("d", 1000.into()),
            ("e", 100000.into()),
        ]);
        let (first, second) = encode_twice(&value);
        assert_eq!(
            first,
            "200061002a00620038006300643900640003e83a006500000186a000"
        );
        assert_eq!(second, "20012a02380364390403e83a05000186a000");
    }

    #[test]
    fn negative_integers() {
        let value = map(vec![
            ("a", (-1).into()),
            ("b", (-100).into()),
            ("c", (-1000).into()),
            ("d", (-1_000_000).into()),
        ]);
        let (first, second) = encode_twice(&value);
        assert_eq!(
            first,
            "3c006100003c006200633d00630003e73e006400000f423f00"
        );
        assert_eq!(second, "3c01003c02633d0303e73e04000f423f00");
    }

    #[test]
    fn strings_inline_and_terminated() {
        let value = map(vec![
            ("x", "A".into()),
            ("y", "foobar".into()),
            ("z", "0123456789abcdef0123456789abcdef".into()),
        ]);
        let (first, second) = encode_twice(&value);
        assert_eq!(
            first,
            "610078004166007900666f6f62617260007a0030313233343536373839616263646566\
             303132333435363738396162636465660000"
        );
        assert_eq!(
            second,
            "6101416602666f6f626172600330313233343536373839616263646566\
             303132333435363738396162636465660000"
        );
    }

    #[test]
    fn empty_string_is_terminated() {
        let mut compressor = Compressor::new();
        let out = compressor.encode(&map(vec![("s", "".into())])).unwrap();
        assert_eq!(hex(&out), "600073000000");
    }

    #[test]
    fn binary_inline() {
        let value = map(vec![("x", vec![65u8, 66, 67].into())]);
        let (first, second) = encode_twice(&value);
        assert_eq!(first, "4300780041424300");
        assert_eq!(second, "430141424300");
    }

    #[test]
    fn binary_length_prefixes() {
        let mut compressor = Compressor::new();
        let empty = compressor.encode(&map(vec![("b", Vec::<u8>::new().into())])).unwrap();
        assert_eq!(hex(&empty), "40006200000000");

        let long = compressor.encode(&map(vec![("b", vec![7u8; 31].into())])).unwrap();
        assert_eq!(&long[..4], &[0x40, 0x01, 0x00, 0x1f]);

        let huge = compressor
            .encode(&map(vec![("b", vec![0u8; 0x1_0000].into())]))
            .unwrap();
        assert_eq!(&huge[..6], &[0x5f, 0x01, 0x00, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn array_of_scalars() {
        let value = map(vec![(
            "x",
            Value::Array(vec![47.into(), 62.into(), "ABC".into()]),
        )]);
        let (first, second) = encode_twice(&value);
        assert_eq!(first, "05007800382f383e634142430000");
        assert_eq!(second, "0501382f383e634142430000");
    }

    #[test]
    fn array_of_maps() {
        let one = map(vec![(
            "x",
            Value::Array(vec![map(vec![("y", 47.into())]).into()]),
        )]);
        let (first, second) = encode_twice(&one);
        assert_eq!(first, "0500780004380079002f000000");
        assert_eq!(second, "05010438022f000000");

        let two = map(vec![(
            "x",
            Value::Array(vec![
                map(vec![("y", 47.into())]).into(),
                map(vec![("z", 62.into())]).into(),
            ]),
        )]);
        let (first, second) = encode_twice(&two);
        assert_eq!(first, "0500780004380079002f000438007a003e000000");
        assert_eq!(second, "05010438022f000438033e000000");
    }

    #[test]
    fn nested_maps() {
        let value = map(vec![("x", map(vec![("y", 47.into())]).into())]);
        let (first, second) = encode_twice(&value);
        assert_eq!(first, "04007800380079002f0000");
        assert_eq!(second, "040138022f0000");

        let deeper = map(vec![(
            "x",
            map(vec![("y", map(vec![("z", 47.into())]).into())]).into(),
        )]);
        let (first, second) = encode_twice(&deeper);
        assert_eq!(first, "040078000400790038007a002f000000");
        assert_eq!(second, "0401040238032f000000");
    }

    #[test]
    fn object_references() {
        let id1: ObjectId = "111122223333444455556666".parse().unwrap();
        let id2: ObjectId = "aaaabbbbccccddddeeeeffff".parse().unwrap();
        let value = map(vec![("x", id1.into()), ("y", id2.into())]);
        let (first, second) = encode_twice(&value);
        assert_eq!(
            first,
            "0800780000111122223333444455556666080079000\
             0aaaabbbbccccddddeeeeffff00"
        );
        assert_eq!(second, "08010108020200");
    }

    #[test]
    fn property_dictionary_resets_at_sentinel() {
        let names: Vec<String> = (0..511).map(|i| format!("p{i}")).collect();
        let value: ValueMap = names.iter().map(|n| (n.clone(), Value::Null)).collect();

        let out = Compressor::new().encode(&value).unwrap();
        let sentinel: Vec<u8> = [&[0x81u8, 0xff][..], &b"p510"[..], &[0u8][..]].concat();
        let hits = out.windows(2).filter(|w| **w == [0x81, 0xff]).count();
        assert_eq!(hits, 1);
        assert!(out.windows(sentinel.len()).any(|w| w == sentinel.as_slice()));
    }

    #[test]
    fn high_property_index_sets_header_bit() {
        let names: Vec<String> = (0..300).map(|i| format!("p{i}")).collect();
        let value: ValueMap = names.iter().map(|n| (n.clone(), Value::Null)).collect();
        let mut compressor = Compressor::new();
        compressor.encode(&value).unwrap();

        // p299 holds index 300 = 0x12c.
        let out = compressor.encode(&map(vec![("p299", Value::Null)])).unwrap();
        assert_eq!(out.as_ref(), &[0x81, 0x2c, 0x00]);
    }

    #[test]
    fn double_width_floats_are_opt_in() {
        let config = CodecConfig {
            float_width: FloatWidth::Double,
            ..CodecConfig::default()
        };
        let out = Compressor::with_config(config)
            .encode(&map(vec![("w", 0.1.into())]))
            .unwrap();
        assert_eq!(out[0], tag::FLOAT64);
        assert_eq!(&out[4..12], &0.1f64.to_le_bytes());
    }

    #[test]
    fn integer_range_limits() {
        let mut compressor = Compressor::new();
        assert!(compressor
            .encode(&map(vec![("n", i64::from(u32::MAX).into())]))
            .is_ok());
        assert!(compressor
            .encode(&map(vec![("n", (-(1i64 << 32)).into())]))
            .is_ok());
        assert!(matches!(
            compressor.encode(&map(vec![("n", (1i64 << 32).into())])),
            Err(CodecError::IntegerOutOfRange(_))
        ));
        assert!(matches!(
            compressor.encode(&map(vec![("n", (-(1i64 << 32) - 1).into())])),
            Err(CodecError::IntegerOutOfRange(_))
        ));
    }

    #[test]
    fn failed_encode_leaves_dictionary_untouched() {
        let mut compressor = Compressor::new();
        let bad = map(vec![("a", 1.into()), ("b", i64::MAX.into())]);
        assert!(compressor.encode(&bad).is_err());

        let out = compressor.encode(&map(vec![("a", 1.into())])).unwrap();
        assert_eq!(hex(&out), "2100610000");
    }

    #[test]
    fn rejects_nul_in_terminated_strings_and_names() {
        let mut compressor = Compressor::new();
        assert!(matches!(
            compressor.encode(&map(vec![("a\0b", Value::Null)])),
            Err(CodecError::InteriorNul)
        ));
        let long = "x".repeat(40) + "\0";
        assert!(matches!(
            compressor.encode(&map(vec![("s", long.into())])),
            Err(CodecError::InteriorNul)
        ));
        // Inline strings carry their length and may contain NUL.
        assert!(compressor.encode(&map(vec![("s", "a\0b".into())])).is_ok());
    }

    #[test]
    fn rejects_excessive_nesting() {
        let config = CodecConfig {
            max_depth: 2,
            ..CodecConfig::default()
        };
        let mut compressor = Compressor::with_config(config);
        let ok = Value::Array(vec![Value::Array(vec![])]);
        assert!(compressor.encode(&map(vec![("a", ok)])).is_ok());

        let deep = Value::Array(vec![Value::Array(vec![Value::Array(vec![])])]);
        assert!(matches!(
            compressor.encode(&map(vec![("a", deep)])),
            Err(CodecError::NestingTooDeep { max: 2 })
        ));
    }
}
