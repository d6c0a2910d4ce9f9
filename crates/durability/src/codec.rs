//! Binary codec for object images and deltas
//!
//! One [`DeltaCodec`] exists per entity descriptor; the [`CodecRegistry`]
//! builds them all once from the entity registry.
//!
//! ## Frame Format
//!
//! ```text
//! [magic: u32][format: u8][schema: u8][tag: u16][body][crc32: u32]
//! ```
//!
//! - **magic**: `CHRD` for deltas, `CHRO` for object rows
//! - **format**: layout version of this codec (currently 1)
//! - **schema**: schema version of the entity when the frame was written
//! - **crc32**: checksum over everything before it
//!
//! Delta body:
//!
//! ```text
//! [action: u8][flags: u8][valid_from: i64 micros][prior image]?[new image]?
//! ```
//!
//! Image:
//!
//! ```text
//! [id: u64][valid_from: i64][parent: u8 (+u64)]
//! [property count: u16]([present: u8][value by declared kind])*
//! [edge count: u16]([child count: u32][child: u64]*)*
//! ```
//!
//! ## Schema Evolution
//!
//! Properties and edges are only ever appended to a descriptor. An image
//! written with fewer properties or edges than the current descriptor decodes
//! with the missing trailing properties as `Null` and missing edges empty.
//! An image with more than the descriptor declares cannot be interpreted and
//! is a decode error.
//!
//! All integers are little endian.

use std::io::{self, Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use crc32fast::Hasher;
use rustc_hash::FxHashMap;
use thiserror::Error;

use chronicle_core::{
    AuditAction, EntityDescriptor, EntityRegistry, EntityTag, Error, ObjectId, PersistentObject, PropertyKind,
    Value,
};

use crate::delta::Delta;

/// Magic of a delta frame
pub const DELTA_MAGIC: u32 = u32::from_le_bytes(*b"CHRD");
/// Magic of an object row frame
pub const OBJECT_MAGIC: u32 = u32::from_le_bytes(*b"CHRO");
/// Current frame layout version
pub const FORMAT_VERSION: u8 = 1;

/// Delta header flag: the aggregate was rolled back before this commit
pub const FLAG_ROLLED_BACK: u8 = 0x01;
/// Delta header flag: a prior image follows
pub const FLAG_HAS_PRIOR: u8 = 0x02;
/// Delta header flag: a new image follows
pub const FLAG_HAS_NEW: u8 = 0x04;

/// magic + format + schema + tag
const HEADER_LEN: usize = 4 + 1 + 1 + 2;
const CRC_LEN: usize = 4;

/// Codec failures
#[derive(Debug, Error)]
pub enum CodecError {
    /// Input ended early or could not be read
    #[error("truncated input: {0}")]
    Io(#[from] io::Error),

    /// Frame does not start with the expected magic
    #[error("bad magic {found:#010x}, expected {expected:#010x}")]
    BadMagic {
        /// Magic for the requested frame kind
        expected: u32,
        /// Magic found in the input
        found: u32,
    },

    /// Frame layout version this codec does not know
    #[error("unsupported format version {0}")]
    UnsupportedFormat(u8),

    /// Stored checksum does not match the content
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Checksum in the frame
        stored: u32,
        /// Checksum of the content
        computed: u32,
    },

    /// No codec registered for the entity tag
    #[error("no codec for entity tag {0}")]
    UnknownEntity(EntityTag),

    /// Frame or image belongs to another entity type
    #[error("payload belongs to entity tag {found}, codec is for {expected}")]
    EntityMismatch {
        /// Tag of the codec
        expected: EntityTag,
        /// Tag found in the input
        found: EntityTag,
    },

    /// Frame written by a newer schema than the descriptor knows
    #[error("{entity} schema version {found} is newer than the current version {current}")]
    NewerSchema {
        /// Entity name
        entity: String,
        /// Version in the frame
        found: u8,
        /// Version of the descriptor
        current: u8,
    },

    /// Image holds more properties or edges than the descriptor declares
    #[error("{entity} image has {found} {what}, the descriptor declares {declared}")]
    TooWide {
        /// Entity name
        entity: String,
        /// "properties" or "edges"
        what: &'static str,
        /// Count in the image
        found: usize,
        /// Count in the descriptor
        declared: usize,
    },

    /// Object does not have the shape of its descriptor
    #[error("cannot encode {entity} {object_id}: {reason}")]
    Shape {
        /// Entity name
        entity: String,
        /// Object being encoded
        object_id: ObjectId,
        /// What did not fit
        reason: String,
    },

    /// Byte string longer than its 32-bit length prefix allows
    #[error("{0} bytes do not fit a length prefix")]
    TooLong(usize),

    /// Action byte out of range
    #[error("unknown audit action {0}")]
    UnknownAction(u8),

    /// Presence byte other than 0 or 1
    #[error("invalid presence byte {0}")]
    InvalidPresence(u8),

    /// Timestamp outside the representable range
    #[error("timestamp {0} out of range")]
    InvalidTimestamp(i64),

    /// Text property is not valid UTF-8
    #[error("invalid text: {0}")]
    InvalidText(#[from] std::string::FromUtf8Error),

    /// Bytes left over after the frame was decoded
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::DeltaDecode { reason: e.to_string() }
    }
}

type CodecResult<T> = std::result::Result<T, CodecError>;

/// Encoder/decoder for one entity type
#[derive(Debug, Clone)]
pub struct DeltaCodec {
    descriptor: EntityDescriptor,
}

impl DeltaCodec {
    /// Create the codec of a descriptor
    pub fn new(descriptor: EntityDescriptor) -> Self {
        DeltaCodec { descriptor }
    }

    /// Descriptor this codec encodes for
    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    /// Encode a delta frame
    pub fn encode_delta(&self, delta: &Delta) -> CodecResult<Vec<u8>> {
        let mut buf = self.start_frame(DELTA_MAGIC)?;

        let mut flags = 0u8;
        if delta.rolled_back {
            flags |= FLAG_ROLLED_BACK;
        }
        if delta.prior.is_some() {
            flags |= FLAG_HAS_PRIOR;
        }
        if delta.new.is_some() {
            flags |= FLAG_HAS_NEW;
        }
        buf.write_u8(delta.action.as_byte())?;
        buf.write_u8(flags)?;
        buf.write_i64::<LittleEndian>(delta.valid_from.timestamp_micros())?;
        if let Some(prior) = &delta.prior {
            self.write_image(&mut buf, prior)?;
        }
        if let Some(new) = &delta.new {
            self.write_image(&mut buf, new)?;
        }

        finish_frame(buf)
    }

    /// Decode a delta frame
    pub fn decode_delta(&self, bytes: &[u8]) -> CodecResult<Delta> {
        let (schema_version, body) = self.open_frame(bytes, DELTA_MAGIC)?;
        let mut cursor = Cursor::new(body);

        let action_byte = cursor.read_u8()?;
        let action = AuditAction::from_byte(action_byte).ok_or(CodecError::UnknownAction(action_byte))?;
        let flags = cursor.read_u8()?;
        let valid_from = read_timestamp(&mut cursor)?;
        let prior = if flags & FLAG_HAS_PRIOR != 0 {
            Some(self.read_image(&mut cursor)?)
        } else {
            None
        };
        let new = if flags & FLAG_HAS_NEW != 0 {
            Some(self.read_image(&mut cursor)?)
        } else {
            None
        };
        expect_end(&cursor)?;

        Ok(Delta {
            entity_tag: self.descriptor.tag,
            schema_version,
            action,
            valid_from,
            rolled_back: flags & FLAG_ROLLED_BACK != 0,
            prior,
            new,
        })
    }

    /// Encode the persisted row payload of an object
    pub fn encode_object(&self, object: &PersistentObject) -> CodecResult<Vec<u8>> {
        let mut buf = self.start_frame(OBJECT_MAGIC)?;
        self.write_image(&mut buf, object)?;
        finish_frame(buf)
    }

    /// Decode the persisted row payload of an object
    pub fn decode_object(&self, bytes: &[u8]) -> CodecResult<PersistentObject> {
        let (_, body) = self.open_frame(bytes, OBJECT_MAGIC)?;
        let mut cursor = Cursor::new(body);
        let object = self.read_image(&mut cursor)?;
        expect_end(&cursor)?;
        Ok(object)
    }

    fn start_frame(&self, magic: u32) -> CodecResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(64);
        buf.write_u32::<LittleEndian>(magic)?;
        buf.write_u8(FORMAT_VERSION)?;
        buf.write_u8(self.descriptor.schema_version)?;
        buf.write_u16::<LittleEndian>(self.descriptor.tag.as_u16())?;
        Ok(buf)
    }

    /// Validate header and checksum; returns the schema version and the body
    fn open_frame<'a>(&self, bytes: &'a [u8], magic: u32) -> CodecResult<(u8, &'a [u8])> {
        let (content, body) = split_frame(bytes, magic)?;
        let schema_version = content[5];
        let tag = EntityTag(u16::from_le_bytes([content[6], content[7]]));
        if tag != self.descriptor.tag {
            return Err(CodecError::EntityMismatch {
                expected: self.descriptor.tag,
                found: tag,
            });
        }
        if schema_version > self.descriptor.schema_version {
            return Err(CodecError::NewerSchema {
                entity: self.descriptor.name.clone(),
                found: schema_version,
                current: self.descriptor.schema_version,
            });
        }
        Ok((schema_version, body))
    }

    fn write_image(&self, buf: &mut Vec<u8>, object: &PersistentObject) -> CodecResult<()> {
        let d = &self.descriptor;
        if object.entity_tag() != d.tag {
            return Err(CodecError::EntityMismatch {
                expected: d.tag,
                found: object.entity_tag(),
            });
        }
        if object.values.len() != d.properties.len() || object.owned.len() != d.ownership.len() {
            return Err(self.shape_error(object, "property or edge count differs from the descriptor".to_string()));
        }

        buf.write_u64::<LittleEndian>(object.id.as_u64())?;
        buf.write_i64::<LittleEndian>(object.valid_from.timestamp_micros())?;
        match object.parent {
            Some(parent) => {
                buf.write_u8(1)?;
                buf.write_u64::<LittleEndian>(parent.as_u64())?;
            }
            None => buf.write_u8(0)?,
        }

        let property_count = u16::try_from(object.values.len())
            .map_err(|_| self.shape_error(object, format!("{} properties exceed the frame limit", object.values.len())))?;
        buf.write_u16::<LittleEndian>(property_count)?;
        for (value, prop) in object.values.iter().zip(&d.properties) {
            if !value.conforms_to(prop.kind) {
                return Err(self.shape_error(
                    object,
                    format!("{} expects {:?}, holds {:?}", prop.name, prop.kind, value.kind()),
                ));
            }
            write_value(buf, value).map_err(|e| match e {
                CodecError::TooLong(len) => self.shape_error(object, format!("{} holds {} bytes", prop.name, len)),
                other => other,
            })?;
        }

        let edge_count = u16::try_from(object.owned.len())
            .map_err(|_| self.shape_error(object, format!("{} edges exceed the frame limit", object.owned.len())))?;
        buf.write_u16::<LittleEndian>(edge_count)?;
        for (children, edge) in object.owned.iter().zip(&d.ownership) {
            let child_count = u32::try_from(children.len())
                .map_err(|_| self.shape_error(object, format!("{} holds {} children", edge.name, children.len())))?;
            buf.write_u32::<LittleEndian>(child_count)?;
            for child in children {
                buf.write_u64::<LittleEndian>(child.as_u64())?;
            }
        }
        Ok(())
    }

    fn read_image(&self, cursor: &mut Cursor<&[u8]>) -> CodecResult<PersistentObject> {
        let d = &self.descriptor;
        let id = ObjectId::from_raw(cursor.read_u64::<LittleEndian>()?);
        if id.entity_tag() != d.tag {
            return Err(CodecError::EntityMismatch {
                expected: d.tag,
                found: id.entity_tag(),
            });
        }
        let valid_from = read_timestamp(cursor)?;
        let parent = match cursor.read_u8()? {
            0 => None,
            1 => Some(ObjectId::from_raw(cursor.read_u64::<LittleEndian>()?)),
            other => return Err(CodecError::InvalidPresence(other)),
        };

        let property_count = cursor.read_u16::<LittleEndian>()? as usize;
        if property_count > d.properties.len() {
            return Err(CodecError::TooWide {
                entity: d.name.clone(),
                what: "properties",
                found: property_count,
                declared: d.properties.len(),
            });
        }
        let mut values = Vec::with_capacity(d.properties.len());
        for prop in &d.properties[..property_count] {
            values.push(read_value(cursor, prop.kind)?);
        }
        values.resize(d.properties.len(), Value::Null);

        let edge_count = cursor.read_u16::<LittleEndian>()? as usize;
        if edge_count > d.ownership.len() {
            return Err(CodecError::TooWide {
                entity: d.name.clone(),
                what: "edges",
                found: edge_count,
                declared: d.ownership.len(),
            });
        }
        let mut owned = Vec::with_capacity(d.ownership.len());
        for _ in 0..edge_count {
            let count = cursor.read_u32::<LittleEndian>()? as usize;
            let mut children = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                children.push(ObjectId::from_raw(cursor.read_u64::<LittleEndian>()?));
            }
            owned.push(children);
        }
        owned.resize(d.ownership.len(), Vec::new());

        Ok(PersistentObject {
            id,
            values,
            owned,
            parent,
            valid_from,
        })
    }

    fn shape_error(&self, object: &PersistentObject, reason: String) -> CodecError {
        CodecError::Shape {
            entity: self.descriptor.name.clone(),
            object_id: object.id,
            reason,
        }
    }
}

/// Check magic, format and checksum; returns (header, body)
fn split_frame(bytes: &[u8], magic: u32) -> CodecResult<(&[u8], &[u8])> {
    if bytes.len() < HEADER_LEN + CRC_LEN {
        return Err(CodecError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("frame of {} bytes is shorter than the minimum of {}", bytes.len(), HEADER_LEN + CRC_LEN),
        )));
    }
    let found = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if found != magic {
        return Err(CodecError::BadMagic { expected: magic, found });
    }
    if bytes[4] != FORMAT_VERSION {
        return Err(CodecError::UnsupportedFormat(bytes[4]));
    }

    let (content, crc_bytes) = bytes.split_at(bytes.len() - CRC_LEN);
    let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    let mut hasher = Hasher::new();
    hasher.update(content);
    let computed = hasher.finalize();
    if stored != computed {
        return Err(CodecError::ChecksumMismatch { stored, computed });
    }

    Ok(content.split_at(HEADER_LEN))
}

/// Peek the entity tag of a frame without validating it
fn peek_tag(bytes: &[u8]) -> CodecResult<EntityTag> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "frame header truncated")));
    }
    Ok(EntityTag(u16::from_le_bytes([bytes[6], bytes[7]])))
}

fn finish_frame(mut buf: Vec<u8>) -> CodecResult<Vec<u8>> {
    let mut hasher = Hasher::new();
    hasher.update(&buf);
    let crc = hasher.finalize();
    buf.write_u32::<LittleEndian>(crc)?;
    Ok(buf)
}

fn expect_end(cursor: &Cursor<&[u8]>) -> CodecResult<()> {
    let remaining = cursor.get_ref().len() as u64 - cursor.position();
    if remaining != 0 {
        return Err(CodecError::TrailingBytes(remaining as usize));
    }
    Ok(())
}

fn read_timestamp(cursor: &mut Cursor<&[u8]>) -> CodecResult<DateTime<Utc>> {
    let micros = cursor.read_i64::<LittleEndian>()?;
    DateTime::<Utc>::from_timestamp_micros(micros).ok_or(CodecError::InvalidTimestamp(micros))
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> CodecResult<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| CodecError::TooLong(bytes.len()))?;
    buf.write_u32::<LittleEndian>(len)?;
    buf.extend_from_slice(bytes);
    Ok(())
}

fn read_bytes(cursor: &mut Cursor<&[u8]>) -> CodecResult<Vec<u8>> {
    let len = cursor.read_u32::<LittleEndian>()? as usize;
    let remaining = cursor.get_ref().len() as u64 - cursor.position();
    if len as u64 > remaining {
        return Err(CodecError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("length {} exceeds the {} remaining bytes", len, remaining),
        )));
    }
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// Write one value; the payload layout follows the declared kind
fn write_value(buf: &mut Vec<u8>, value: &Value) -> CodecResult<()> {
    if value.is_null() {
        buf.write_u8(0)?;
        return Ok(());
    }
    buf.write_u8(1)?;
    match value {
        Value::Null => {}
        Value::Bool(b) => buf.write_u8(u8::from(*b))?,
        Value::Int(i) => buf.write_i64::<LittleEndian>(*i)?,
        Value::Float(f) => buf.write_f64::<LittleEndian>(*f)?,
        Value::Text(s) => write_bytes(buf, s.as_bytes())?,
        Value::Bytes(b) => write_bytes(buf, b)?,
        Value::Timestamp(ts) => buf.write_i64::<LittleEndian>(ts.timestamp_micros())?,
        Value::Reference(id) => buf.write_u64::<LittleEndian>(id.as_u64())?,
    }
    Ok(())
}

fn read_value(cursor: &mut Cursor<&[u8]>, kind: PropertyKind) -> CodecResult<Value> {
    match cursor.read_u8()? {
        0 => return Ok(Value::Null),
        1 => {}
        other => return Err(CodecError::InvalidPresence(other)),
    }
    let value = match kind {
        PropertyKind::Bool => Value::Bool(cursor.read_u8()? != 0),
        PropertyKind::Int => Value::Int(cursor.read_i64::<LittleEndian>()?),
        PropertyKind::Float => Value::Float(cursor.read_f64::<LittleEndian>()?),
        PropertyKind::Text => Value::Text(String::from_utf8(read_bytes(cursor)?)?),
        PropertyKind::Bytes => Value::Bytes(read_bytes(cursor)?),
        PropertyKind::Timestamp => Value::Timestamp(read_timestamp(cursor)?),
        PropertyKind::Reference => Value::Reference(ObjectId::from_raw(cursor.read_u64::<LittleEndian>()?)),
    };
    Ok(value)
}

/// One codec per registered entity type
#[derive(Debug, Clone, Default)]
pub struct CodecRegistry {
    codecs: FxHashMap<EntityTag, DeltaCodec>,
}

impl CodecRegistry {
    /// Build a codec for every descriptor of the registry
    pub fn new(registry: &EntityRegistry) -> Self {
        let codecs = registry
            .iter()
            .map(|descriptor| (descriptor.tag, DeltaCodec::new(descriptor.clone())))
            .collect();
        CodecRegistry { codecs }
    }

    /// Codec of an entity type
    pub fn codec(&self, tag: EntityTag) -> CodecResult<&DeltaCodec> {
        self.codecs.get(&tag).ok_or(CodecError::UnknownEntity(tag))
    }

    /// Encode a delta with the codec of its entity type
    pub fn encode_delta(&self, delta: &Delta) -> CodecResult<Vec<u8>> {
        self.codec(delta.entity_tag)?.encode_delta(delta)
    }

    /// Decode a delta, dispatching on the entity tag in its header
    pub fn decode_delta(&self, bytes: &[u8]) -> CodecResult<Delta> {
        self.codec(peek_tag(bytes)?)?.decode_delta(bytes)
    }

    /// Encode an object row payload
    pub fn encode_object(&self, object: &PersistentObject) -> CodecResult<Vec<u8>> {
        self.codec(object.entity_tag())?.encode_object(object)
    }

    /// Decode an object row payload
    pub fn decode_object(&self, bytes: &[u8]) -> CodecResult<PersistentObject> {
        self.codec(peek_tag(bytes)?)?.decode_object(bytes)
    }

    /// Number of codecs
    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    /// Check if no codec is registered
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}
