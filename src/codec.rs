//! Codec assembly: turning a compiled [`Schema`] into encode/decode routines
//! over [`Value`] trees.
//!
//! Assembly is the second build-time phase. Every non-template message gets a
//! [`MessageAdapter`] whose field adapters are sorted by ascending tag;
//! template messages are type-level artifacts and are never given a codec.
//! Submessage and enum adapters are referenced by canonical name, so
//! recursive message types terminate.
//!
//! Presence follows the usual wire conventions: numeric and bool scalars are
//! always written (the default when absent), everything else contributes only
//! when present. Maps encode as repeated entry submessages with the key at
//! tag 1 and the value at tag 2. Enum constants travel by wire tag, never by
//! declaration ordinal.

use std::collections::{BTreeMap, BTreeSet};

use crate::compiler::Schema;
use crate::model::{EnumConstant, FieldModel, MessageModel, ModelId, ModelKind, ScalarKind};
use crate::value::{MessageValue, UnknownField, Value};
use crate::wire::{
    key_len, unzigzag32, unzigzag64, varint_len, zigzag32, zigzag64, WireError, WireReader,
    WireType, WireWriter,
};

/// What decode does with a tag the schema does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownFieldPolicy {
    /// Skip the payload and drop it.
    Discard,
    /// Retain the raw payload and re-emit it after the known fields.
    Preserve,
}

/// Build-time assembly failure. These are schema defects, not data defects.
#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    #[error("cannot assemble a codec involving template type '{0}'")]
    Template(String),
    #[error("{owner}.{field}: packed encoding requires a fixed-width scalar component, found {component}")]
    PackedNotFixedWidth { owner: String, field: String, component: String },
    #[error("{owner}.{field}: no wire mapping for '{model}'")]
    Unsupported { owner: String, field: String, model: String },
}

/// Runtime encode/decode failure.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("unknown message type '{0}'")]
    UnknownMessage(String),
    #[error("unknown enum type '{0}'")]
    UnknownEnum(String),
    #[error("'{0}' is a template and has no codec")]
    Template(String),
    #[error("enum '{0}' has no constant named '{1}'")]
    UnknownEnumConstant(String, String),
}

/// How one model encodes. Message and enum references go through the codec's
/// adapter tables by name, which breaks recursion.
#[derive(Debug, Clone)]
enum Adapter {
    Scalar(ScalarKind),
    Repeated(Box<Adapter>),
    Packed(ScalarKind),
    Map(Box<Adapter>, Box<Adapter>),
    Enum(String),
    Message(String),
}

#[derive(Debug)]
pub struct FieldAdapter {
    pub name: String,
    pub tag: u32,
    adapter: Adapter,
}

/// Per-message codec: field adapters in ascending tag order.
#[derive(Debug)]
pub struct MessageAdapter {
    pub name: String,
    fields: Vec<FieldAdapter>,
    by_tag: BTreeMap<u32, usize>,
}

#[derive(Debug)]
pub struct WireCodec {
    schema: Schema,
    policy: UnknownFieldPolicy,
    messages: BTreeMap<String, MessageAdapter>,
    enums: BTreeMap<String, Vec<EnumConstant>>,
    templates: BTreeSet<String>,
}

impl WireCodec {
    /// Assemble codecs for every non-template message in the schema.
    pub fn assemble(schema: Schema, policy: UnknownFieldPolicy) -> Result<Self, AssembleError> {
        let mut messages = BTreeMap::new();
        let mut enums = BTreeMap::new();
        let mut templates = BTreeSet::new();

        for (name, id) in schema.registry.declared_names() {
            match schema.registry.arena.get(id) {
                ModelKind::Message(m) if m.template => {
                    templates.insert(name.clone());
                }
                ModelKind::Message(m) => {
                    let adapter = build_message_adapter(&schema, m)?;
                    messages.insert(m.declared.name.clone(), adapter);
                }
                ModelKind::Impl(i) => {
                    // Addressable both by the nested impl name and by the
                    // rendered instantiation the field adapters reference.
                    if let Some(m) = schema.registry.arena.message(i.message) {
                        messages.insert(name.clone(), build_message_adapter(&schema, m)?);
                        messages.insert(m.declared.name.clone(), build_message_adapter(&schema, m)?);
                    }
                }
                ModelKind::Enum(e) => {
                    enums.insert(name.clone(), e.constants.clone());
                }
                _ => {}
            }
        }

        // Instantiations materialized at non-field sites (container
        // components, inherited supertypes) have no impl record; their
        // adapters are only reachable by rendered name.
        for (name, id) in schema.registry.instantiations() {
            match schema.registry.arena.get(id) {
                ModelKind::Message(m) if m.template => {
                    templates.insert(name.clone());
                }
                ModelKind::Message(m) => {
                    if !messages.contains_key(name) {
                        messages.insert(name.clone(), build_message_adapter(&schema, m)?);
                    }
                }
                _ => {}
            }
        }

        Ok(WireCodec { schema, policy, messages, enums, templates })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn policy(&self) -> UnknownFieldPolicy {
        self.policy
    }

    /// The assembled adapter for a message, by canonical name.
    pub fn adapter(&self, name: &str) -> Result<&MessageAdapter, CodecError> {
        match self.messages.get(name) {
            Some(adapter) => Ok(adapter),
            None if self.templates.contains(name) => Err(CodecError::Template(name.to_string())),
            None => Err(CodecError::UnknownMessage(name.to_string())),
        }
    }

    /// Encoded size of a top-level message, without an outer length prefix.
    pub fn encoded_size(&self, name: &str, value: &Value) -> Result<usize, CodecError> {
        let adapter = self.adapter(name)?;
        self.message_size(adapter, as_message(value))
    }

    /// Encode a top-level message, without an outer length prefix.
    pub fn encode_message(&self, name: &str, value: &Value) -> Result<Vec<u8>, CodecError> {
        let adapter = self.adapter(name)?;
        let mut w = WireWriter::new();
        self.encode_fields(adapter, as_message(value), &mut w)?;
        Ok(w.into_bytes())
    }

    /// Decode a top-level message from the whole input slice.
    pub fn decode_message(&self, name: &str, bytes: &[u8]) -> Result<Value, CodecError> {
        let adapter = self.adapter(name)?;
        let mut r = WireReader::new(bytes);
        let mv = self.decode_fields(adapter, &mut r)?;
        Ok(Value::Message(mv))
    }

    fn encode_fields(
        &self,
        adapter: &MessageAdapter,
        value: &MessageValue,
        w: &mut WireWriter,
    ) -> Result<(), CodecError> {
        for fa in &adapter.fields {
            self.encode_field(fa, value.get(&fa.name), w)?;
        }
        if self.policy == UnknownFieldPolicy::Preserve {
            for u in &value.unknown {
                w.write_key(u.tag, u.wire_type);
                w.write_raw(&u.bytes);
            }
        }
        Ok(())
    }

    fn message_size(
        &self,
        adapter: &MessageAdapter,
        value: &MessageValue,
    ) -> Result<usize, CodecError> {
        let mut size = 0;
        for fa in &adapter.fields {
            size += self.field_size(fa, value.get(&fa.name))?;
        }
        if self.policy == UnknownFieldPolicy::Preserve {
            for u in &value.unknown {
                size += key_len(u.tag) + u.bytes.len();
            }
        }
        Ok(size)
    }

    fn encode_field(
        &self,
        fa: &FieldAdapter,
        value: Option<&Value>,
        w: &mut WireWriter,
    ) -> Result<(), CodecError> {
        match &fa.adapter {
            Adapter::Scalar(kind) => {
                if value.is_none() && !scalar_always_present(*kind) {
                    return Ok(());
                }
                w.write_key(fa.tag, scalar_wire_type(*kind));
                write_scalar(*kind, value, w);
            }
            Adapter::Repeated(inner) => {
                let items = match value.and_then(Value::as_list) {
                    Some(items) => items,
                    None => return Ok(()),
                };
                for item in items {
                    self.encode_element(fa.tag, inner, item, w)?;
                }
            }
            Adapter::Packed(kind) => {
                let items = match value.and_then(Value::as_list) {
                    Some(items) if !items.is_empty() => items,
                    _ => return Ok(()),
                };
                let payload: usize = items.iter().map(|i| scalar_size(*kind, Some(i))).sum();
                w.write_key(fa.tag, WireType::LengthDelimited);
                w.write_varint(payload as u64);
                for item in items {
                    write_scalar(*kind, Some(item), w);
                }
            }
            Adapter::Map(key, val) => {
                let entries = match value {
                    Some(Value::Map(entries)) => entries,
                    _ => return Ok(()),
                };
                for (k, v) in entries {
                    let entry = self.entry_size(key, val, k, v)?;
                    w.write_key(fa.tag, WireType::LengthDelimited);
                    w.write_varint(entry as u64);
                    self.encode_element(1, key, k, w)?;
                    self.encode_element(2, val, v, w)?;
                }
            }
            Adapter::Enum(name) => {
                let value = match value {
                    Some(v) => v,
                    None => return Ok(()),
                };
                let tag = self.enum_tag(name, value)?;
                w.write_key(fa.tag, WireType::Varint);
                w.write_varint(tag as u64);
            }
            Adapter::Message(name) => {
                let value = match value {
                    Some(v) => v,
                    None => return Ok(()),
                };
                let adapter = self.adapter(name)?;
                let size = self.message_size(adapter, as_message(value))?;
                w.write_key(fa.tag, WireType::LengthDelimited);
                w.write_varint(size as u64);
                self.encode_fields(adapter, as_message(value), w)?;
            }
        }
        Ok(())
    }

    /// One keyed element of a repeated field or map entry.
    fn encode_element(
        &self,
        tag: u32,
        adapter: &Adapter,
        value: &Value,
        w: &mut WireWriter,
    ) -> Result<(), CodecError> {
        match adapter {
            Adapter::Scalar(kind) => {
                w.write_key(tag, scalar_wire_type(*kind));
                write_scalar(*kind, Some(value), w);
            }
            Adapter::Enum(name) => {
                let t = self.enum_tag(name, value)?;
                w.write_key(tag, WireType::Varint);
                w.write_varint(t as u64);
            }
            Adapter::Message(name) => {
                let inner = self.adapter(name)?;
                let size = self.message_size(inner, as_message(value))?;
                w.write_key(tag, WireType::LengthDelimited);
                w.write_varint(size as u64);
                self.encode_fields(inner, as_message(value), w)?;
            }
            // Assembly rejects nested repeated/packed/map components.
            Adapter::Repeated(_) | Adapter::Packed(_) | Adapter::Map(..) => {}
        }
        Ok(())
    }

    fn field_size(&self, fa: &FieldAdapter, value: Option<&Value>) -> Result<usize, CodecError> {
        let size = match &fa.adapter {
            Adapter::Scalar(kind) => {
                if value.is_none() && !scalar_always_present(*kind) {
                    return Ok(0);
                }
                key_len(fa.tag) + scalar_size(*kind, value)
            }
            Adapter::Repeated(inner) => {
                let items = match value.and_then(Value::as_list) {
                    Some(items) => items,
                    None => return Ok(0),
                };
                let mut size = 0;
                for item in items {
                    size += key_len(fa.tag) + self.element_size(inner, item)?;
                }
                size
            }
            Adapter::Packed(kind) => {
                let items = match value.and_then(Value::as_list) {
                    Some(items) if !items.is_empty() => items,
                    _ => return Ok(0),
                };
                let payload: usize = items.iter().map(|i| scalar_size(*kind, Some(i))).sum();
                key_len(fa.tag) + varint_len(payload as u64) + payload
            }
            Adapter::Map(key, val) => {
                let entries = match value {
                    Some(Value::Map(entries)) => entries,
                    _ => return Ok(0),
                };
                let mut size = 0;
                for (k, v) in entries {
                    let entry = self.entry_size(key, val, k, v)?;
                    size += key_len(fa.tag) + varint_len(entry as u64) + entry;
                }
                size
            }
            Adapter::Enum(name) => {
                let value = match value {
                    Some(v) => v,
                    None => return Ok(0),
                };
                key_len(fa.tag) + varint_len(self.enum_tag(name, value)? as u64)
            }
            Adapter::Message(name) => {
                let value = match value {
                    Some(v) => v,
                    None => return Ok(0),
                };
                let adapter = self.adapter(name)?;
                let inner = self.message_size(adapter, as_message(value))?;
                key_len(fa.tag) + varint_len(inner as u64) + inner
            }
        };
        Ok(size)
    }

    fn element_size(&self, adapter: &Adapter, value: &Value) -> Result<usize, CodecError> {
        match adapter {
            Adapter::Scalar(kind) => Ok(scalar_size(*kind, Some(value))),
            Adapter::Enum(name) => Ok(varint_len(self.enum_tag(name, value)? as u64)),
            Adapter::Message(name) => {
                let inner = self.adapter(name)?;
                let size = self.message_size(inner, as_message(value))?;
                Ok(varint_len(size as u64) + size)
            }
            Adapter::Repeated(_) | Adapter::Packed(_) | Adapter::Map(..) => Ok(0),
        }
    }

    /// Key/value payload size of one map entry submessage.
    fn entry_size(
        &self,
        key: &Adapter,
        val: &Adapter,
        k: &Value,
        v: &Value,
    ) -> Result<usize, CodecError> {
        Ok(key_len(1) + self.element_size(key, k)? + key_len(2) + self.element_size(val, v)?)
    }

    /// Resolve an enum value to its wire tag; constant names are accepted.
    fn enum_tag(&self, name: &str, value: &Value) -> Result<u32, CodecError> {
        if let Value::Str(constant) = value {
            let constants = self
                .enums
                .get(name)
                .ok_or_else(|| CodecError::UnknownEnum(name.to_string()))?;
            return constants
                .iter()
                .find(|c| c.name == *constant)
                .map(|c| c.tag)
                .ok_or_else(|| {
                    CodecError::UnknownEnumConstant(name.to_string(), constant.clone())
                });
        }
        Ok(value.as_u64().unwrap_or(0) as u32)
    }

    fn decode_fields(
        &self,
        adapter: &MessageAdapter,
        r: &mut WireReader<'_>,
    ) -> Result<MessageValue, CodecError> {
        let mut mv = MessageValue::new();
        while let Some((tag, wire_type)) = r.read_key()? {
            let fa = match adapter.by_tag.get(&tag) {
                Some(&index) => &adapter.fields[index],
                None => {
                    self.keep_unknown(&mut mv, tag, wire_type, r)?;
                    continue;
                }
            };
            if !accepts(&fa.adapter, wire_type) {
                // Wire type disagrees with the schema; treat as unknown.
                self.keep_unknown(&mut mv, tag, wire_type, r)?;
                continue;
            }
            self.decode_field(fa, wire_type, &mut mv, r)?;
        }
        Ok(mv)
    }

    fn keep_unknown(
        &self,
        mv: &mut MessageValue,
        tag: u32,
        wire_type: WireType,
        r: &mut WireReader<'_>,
    ) -> Result<(), CodecError> {
        let bytes = r.skip(wire_type)?;
        if self.policy == UnknownFieldPolicy::Preserve {
            mv.unknown.push(UnknownField { tag, wire_type, bytes: bytes.to_vec() });
        }
        Ok(())
    }

    fn decode_field(
        &self,
        fa: &FieldAdapter,
        wire_type: WireType,
        mv: &mut MessageValue,
        r: &mut WireReader<'_>,
    ) -> Result<(), CodecError> {
        match &fa.adapter {
            Adapter::Scalar(kind) => {
                let value = read_scalar(*kind, r)?;
                mv.fields.insert(fa.name.clone(), value);
            }
            Adapter::Repeated(inner) => {
                let scalar = match inner.as_ref() {
                    Adapter::Scalar(k) => Some(*k),
                    _ => None,
                };
                // A length-delimited burst for a non-delimited scalar
                // component is the packed form; accept it on decode.
                if wire_type == WireType::LengthDelimited {
                    if let Some(kind) = scalar {
                        if scalar_wire_type(kind) != WireType::LengthDelimited {
                            let payload = r.read_len_delimited()?;
                            let mut sub = WireReader::new(payload);
                            while !sub.at_end() {
                                let value = read_scalar(kind, &mut sub)?;
                                push_list(mv, &fa.name, value);
                            }
                            return Ok(());
                        }
                    }
                }
                let value = self.decode_element(inner, r)?;
                push_list(mv, &fa.name, value);
            }
            Adapter::Packed(kind) => {
                if wire_type == WireType::LengthDelimited {
                    let payload = r.read_len_delimited()?;
                    let mut sub = WireReader::new(payload);
                    while !sub.at_end() {
                        let value = read_scalar(*kind, &mut sub)?;
                        push_list(mv, &fa.name, value);
                    }
                } else {
                    let value = read_scalar(*kind, r)?;
                    push_list(mv, &fa.name, value);
                }
            }
            Adapter::Map(key, val) => {
                let payload = r.read_len_delimited()?;
                let mut sub = WireReader::new(payload);
                let mut k = None;
                let mut v = None;
                while let Some((tag, wt)) = sub.read_key()? {
                    match tag {
                        1 => k = Some(self.decode_element(key, &mut sub)?),
                        2 => v = Some(self.decode_element(val, &mut sub)?),
                        _ => {
                            sub.skip(wt)?;
                        }
                    }
                }
                let k = k.unwrap_or_else(|| default_value(key));
                let v = v.unwrap_or_else(|| default_value(val));
                let entry = mv
                    .fields
                    .entry(fa.name.clone())
                    .or_insert_with(|| Value::Map(Vec::new()));
                if let Value::Map(entries) = entry {
                    entries.push((k, v));
                }
            }
            Adapter::Enum(_) => {
                let tag = r.read_varint()? as u32;
                mv.fields.insert(fa.name.clone(), Value::Enum(tag));
            }
            Adapter::Message(name) => {
                let inner = self.adapter(name)?;
                let payload = r.read_len_delimited()?;
                let mut sub = WireReader::new(payload);
                let value = self.decode_fields(inner, &mut sub)?;
                mv.fields.insert(fa.name.clone(), Value::Message(value));
            }
        }
        Ok(())
    }

    fn decode_element(
        &self,
        adapter: &Adapter,
        r: &mut WireReader<'_>,
    ) -> Result<Value, CodecError> {
        match adapter {
            Adapter::Scalar(kind) => Ok(read_scalar(*kind, r)?),
            Adapter::Enum(_) => Ok(Value::Enum(r.read_varint()? as u32)),
            Adapter::Message(name) => {
                let inner = self.adapter(name)?;
                let payload = r.read_len_delimited()?;
                let mut sub = WireReader::new(payload);
                Ok(Value::Message(self.decode_fields(inner, &mut sub)?))
            }
            Adapter::Repeated(_) | Adapter::Packed(_) | Adapter::Map(..) => {
                Ok(Value::List(Vec::new()))
            }
        }
    }
}

fn build_message_adapter(
    schema: &Schema,
    msg: &MessageModel,
) -> Result<MessageAdapter, AssembleError> {
    let mut fields = Vec::with_capacity(msg.fields.len());
    let mut by_tag = BTreeMap::new();
    for (&tag, &index) in &msg.fields_by_tag {
        let field = &msg.fields[index];
        let adapter = field_adapter(schema, msg, field)?;
        by_tag.insert(tag, fields.len());
        fields.push(FieldAdapter { name: field.name.clone(), tag, adapter });
    }
    Ok(MessageAdapter { name: msg.declared.name.clone(), fields, by_tag })
}

fn field_adapter(
    schema: &Schema,
    owner: &MessageModel,
    field: &FieldModel,
) -> Result<Adapter, AssembleError> {
    model_adapter(schema, owner, field, field.model, field.packed)
}

fn model_adapter(
    schema: &Schema,
    owner: &MessageModel,
    field: &FieldModel,
    model: ModelId,
    packed: bool,
) -> Result<Adapter, AssembleError> {
    let unsupported = |model: ModelId| AssembleError::Unsupported {
        owner: owner.declared.name.clone(),
        field: field.name.clone(),
        model: schema.registry.arena.render(model),
    };
    match schema.registry.arena.get(model) {
        ModelKind::Primitive(kind) => Ok(Adapter::Scalar(*kind)),
        ModelKind::List(l) => {
            let inner = model_adapter(schema, owner, field, l.component, false)?;
            if packed || l.packed {
                match inner {
                    Adapter::Scalar(kind) if kind.is_fixed_width() => Ok(Adapter::Packed(kind)),
                    Adapter::Scalar(kind) => Err(AssembleError::PackedNotFixedWidth {
                        owner: owner.declared.name.clone(),
                        field: field.name.clone(),
                        component: kind.proto_name().to_string(),
                    }),
                    _ => Err(AssembleError::PackedNotFixedWidth {
                        owner: owner.declared.name.clone(),
                        field: field.name.clone(),
                        component: schema.registry.arena.render(l.component),
                    }),
                }
            } else {
                match inner {
                    Adapter::Repeated(_) | Adapter::Packed(_) | Adapter::Map(..) => {
                        Err(unsupported(l.component))
                    }
                    inner => Ok(Adapter::Repeated(Box::new(inner))),
                }
            }
        }
        ModelKind::Map(m) => {
            let key = model_adapter(schema, owner, field, m.key, false)?;
            if !matches!(key, Adapter::Scalar(_)) {
                return Err(unsupported(m.key));
            }
            let value = model_adapter(schema, owner, field, m.value, false)?;
            if matches!(value, Adapter::Repeated(_) | Adapter::Packed(_) | Adapter::Map(..)) {
                return Err(unsupported(m.value));
            }
            Ok(Adapter::Map(Box::new(key), Box::new(value)))
        }
        ModelKind::Enum(e) => Ok(Adapter::Enum(e.declared.name.clone())),
        ModelKind::Message(m) if m.template => {
            Err(AssembleError::Template(m.declared.name.clone()))
        }
        ModelKind::Message(m) => Ok(Adapter::Message(m.declared.name.clone())),
        ModelKind::Impl(i) => match schema.registry.arena.message(i.message) {
            Some(m) => Ok(Adapter::Message(m.declared.name.clone())),
            None => Err(unsupported(model)),
        },
        _ => Err(unsupported(model)),
    }
}

/// Numeric and bool scalars are always on the wire; strings and bytes only
/// when present.
fn scalar_always_present(kind: ScalarKind) -> bool {
    !matches!(kind, ScalarKind::String | ScalarKind::Bytes)
}

fn scalar_wire_type(kind: ScalarKind) -> WireType {
    match kind {
        ScalarKind::Bool
        | ScalarKind::Int32
        | ScalarKind::Uint32
        | ScalarKind::Sint32
        | ScalarKind::Int64
        | ScalarKind::Uint64
        | ScalarKind::Sint64 => WireType::Varint,
        ScalarKind::Fixed32 | ScalarKind::Sfixed32 | ScalarKind::Float => WireType::Fixed32,
        ScalarKind::Fixed64 | ScalarKind::Sfixed64 | ScalarKind::Double => WireType::Fixed64,
        ScalarKind::String | ScalarKind::Bytes => WireType::LengthDelimited,
    }
}

/// Does a decoded wire type fit this adapter? Repeated fields also accept the
/// packed length-delimited form.
fn accepts(adapter: &Adapter, wire_type: WireType) -> bool {
    match adapter {
        Adapter::Scalar(kind) => scalar_wire_type(*kind) == wire_type,
        Adapter::Repeated(inner) => match inner.as_ref() {
            Adapter::Scalar(kind) => {
                scalar_wire_type(*kind) == wire_type || wire_type == WireType::LengthDelimited
            }
            Adapter::Enum(_) => wire_type == WireType::Varint,
            _ => wire_type == WireType::LengthDelimited,
        },
        Adapter::Packed(kind) => {
            wire_type == WireType::LengthDelimited || scalar_wire_type(*kind) == wire_type
        }
        Adapter::Map(..) | Adapter::Message(_) => wire_type == WireType::LengthDelimited,
        Adapter::Enum(_) => wire_type == WireType::Varint,
    }
}

fn write_scalar(kind: ScalarKind, value: Option<&Value>, w: &mut WireWriter) {
    let u = |v: Option<&Value>| v.and_then(Value::as_u64).unwrap_or(0);
    let i = |v: Option<&Value>| v.and_then(Value::as_i64).unwrap_or(0);
    match kind {
        ScalarKind::Bool => w.write_varint((i(value) != 0) as u64),
        ScalarKind::Int32 => w.write_varint(i(value) as u64),
        ScalarKind::Uint32 | ScalarKind::Uint64 => w.write_varint(u(value)),
        ScalarKind::Int64 => w.write_varint(i(value) as u64),
        ScalarKind::Sint32 => w.write_varint(zigzag32(i(value) as i32) as u64),
        ScalarKind::Sint64 => w.write_varint(zigzag64(i(value))),
        ScalarKind::Fixed32 => w.write_fixed32(u(value) as u32),
        ScalarKind::Sfixed32 => w.write_fixed32(i(value) as i32 as u32),
        ScalarKind::Fixed64 => w.write_fixed64(u(value)),
        ScalarKind::Sfixed64 => w.write_fixed64(i(value) as u64),
        ScalarKind::Float => w.write_float(value.and_then(Value::as_f64).unwrap_or(0.0) as f32),
        ScalarKind::Double => w.write_double(value.and_then(Value::as_f64).unwrap_or(0.0)),
        ScalarKind::String => {
            w.write_len_delimited(value.and_then(Value::as_str).unwrap_or("").as_bytes())
        }
        ScalarKind::Bytes => {
            w.write_len_delimited(value.and_then(Value::as_bytes).unwrap_or(&[]))
        }
    }
}

fn scalar_size(kind: ScalarKind, value: Option<&Value>) -> usize {
    let u = |v: Option<&Value>| v.and_then(Value::as_u64).unwrap_or(0);
    let i = |v: Option<&Value>| v.and_then(Value::as_i64).unwrap_or(0);
    match kind {
        ScalarKind::Bool => 1,
        ScalarKind::Int32 | ScalarKind::Int64 => varint_len(i(value) as u64),
        ScalarKind::Uint32 | ScalarKind::Uint64 => varint_len(u(value)),
        ScalarKind::Sint32 => varint_len(zigzag32(i(value) as i32) as u64),
        ScalarKind::Sint64 => varint_len(zigzag64(i(value))),
        ScalarKind::Fixed32 | ScalarKind::Sfixed32 | ScalarKind::Float => 4,
        ScalarKind::Fixed64 | ScalarKind::Sfixed64 | ScalarKind::Double => 8,
        ScalarKind::String => {
            let len = value.and_then(Value::as_str).unwrap_or("").len();
            varint_len(len as u64) + len
        }
        ScalarKind::Bytes => {
            let len = value.and_then(Value::as_bytes).unwrap_or(&[]).len();
            varint_len(len as u64) + len
        }
    }
}

fn read_scalar(kind: ScalarKind, r: &mut WireReader<'_>) -> Result<Value, WireError> {
    let value = match kind {
        ScalarKind::Bool => Value::Bool(r.read_varint()? != 0),
        ScalarKind::Int32 => Value::I32(r.read_varint()? as i64 as i32),
        ScalarKind::Uint32 => Value::U32(r.read_varint()? as u32),
        ScalarKind::Sint32 => Value::I32(unzigzag32(r.read_varint()? as u32)),
        ScalarKind::Int64 => Value::I64(r.read_varint()? as i64),
        ScalarKind::Uint64 => Value::U64(r.read_varint()?),
        ScalarKind::Sint64 => Value::I64(unzigzag64(r.read_varint()?)),
        ScalarKind::Fixed32 => Value::U32(r.read_fixed32()?),
        ScalarKind::Sfixed32 => Value::I32(r.read_fixed32()? as i32),
        ScalarKind::Fixed64 => Value::U64(r.read_fixed64()?),
        ScalarKind::Sfixed64 => Value::I64(r.read_fixed64()? as i64),
        ScalarKind::Float => Value::F32(r.read_float()?),
        ScalarKind::Double => Value::F64(r.read_double()?),
        ScalarKind::String => {
            let bytes = r.read_len_delimited()?;
            let s = std::str::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)?;
            Value::Str(s.to_string())
        }
        ScalarKind::Bytes => Value::Bytes(r.read_len_delimited()?.to_vec()),
    };
    Ok(value)
}

fn push_list(mv: &mut MessageValue, name: &str, value: Value) {
    let entry = mv
        .fields
        .entry(name.to_string())
        .or_insert_with(|| Value::List(Vec::new()));
    if let Value::List(items) = entry {
        items.push(value);
    }
}

fn default_value(adapter: &Adapter) -> Value {
    match adapter {
        Adapter::Scalar(kind) => match kind {
            ScalarKind::Bool => Value::Bool(false),
            ScalarKind::Int32 | ScalarKind::Sint32 | ScalarKind::Sfixed32 => Value::I32(0),
            ScalarKind::Uint32 | ScalarKind::Fixed32 => Value::U32(0),
            ScalarKind::Int64 | ScalarKind::Sint64 | ScalarKind::Sfixed64 => Value::I64(0),
            ScalarKind::Uint64 | ScalarKind::Fixed64 => Value::U64(0),
            ScalarKind::Float => Value::F32(0.0),
            ScalarKind::Double => Value::F64(0.0),
            ScalarKind::String => Value::Str(String::new()),
            ScalarKind::Bytes => Value::Bytes(Vec::new()),
        },
        Adapter::Enum(_) => Value::Enum(0),
        Adapter::Message(_) => Value::Message(MessageValue::new()),
        Adapter::Repeated(_) | Adapter::Packed(_) => Value::List(Vec::new()),
        Adapter::Map(..) => Value::Map(Vec::new()),
    }
}

/// Top-level values are message values; anything else encodes as empty.
fn as_message(value: &Value) -> &MessageValue {
    static EMPTY: MessageValue = MessageValue { fields: BTreeMap::new(), unknown: Vec::new() };
    match value {
        Value::Message(m) => m,
        _ => &EMPTY,
    }
}
