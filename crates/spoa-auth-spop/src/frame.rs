//! Frame model and payload encoding.
//!
//! ```text
//! FRAME      : <FRAME-LENGTH:4 bytes> <FRAME-TYPE:1 byte> <METADATA> <FRAME-PAYLOAD>
//! METADATA   : <FLAGS:4 bytes> <STREAM-ID:varint> <FRAME-ID:varint>
//! KV-LIST    : [ <KV-NAME:string> <KV-VALUE:typed> ... ]
//! MESSAGES   : [ <NAME:string> <NB-ARGS:1 byte> <KV-LIST of NB-ARGS items> ... ]
//! ACTIONS    : [ <TYPE:1 byte> <NB-ARGS:1 byte> <SCOPE:1 byte> <NAME:string> [<VALUE:typed>] ... ]
//! ```
//!
//! Typed data starts with one byte: the low nibble is the type, the high
//! nibble holds flags (booleans keep their value there).

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{BufMut, Bytes, BytesMut};
use spoa_auth_types::{Attributes, TypedData};

use crate::error::{ProtocolError, Result};
use crate::varint;

const TYPE_NULL: u8 = 0;
const TYPE_BOOL: u8 = 1;
const TYPE_INT32: u8 = 2;
const TYPE_UINT32: u8 = 3;
const TYPE_INT64: u8 = 4;
const TYPE_UINT64: u8 = 5;
const TYPE_IPV4: u8 = 6;
const TYPE_IPV6: u8 = 7;
const TYPE_STRING: u8 = 8;
const TYPE_BINARY: u8 = 9;

const DATA_TYPE_MASK: u8 = 0x0f;
const DATA_FLAG_TRUE: u8 = 0x10;

const ACTION_SET_VAR: u8 = 1;
const ACTION_UNSET_VAR: u8 = 2;

// ─────────────────────────────────────────────────────────────────────────────
// Header
// ─────────────────────────────────────────────────────────────────────────────

/// Frame type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Continuation of a fragmented frame.
    Unset,
    HaproxyHello,
    HaproxyDisconnect,
    Notify,
    AgentHello,
    AgentDisconnect,
    Ack,
    /// A type this agent does not know; carried through and skipped.
    Unknown(u8),
}

impl FrameType {
    pub fn from_u8(tag: u8) -> Self {
        match tag {
            0 => Self::Unset,
            1 => Self::HaproxyHello,
            2 => Self::HaproxyDisconnect,
            3 => Self::Notify,
            101 => Self::AgentHello,
            102 => Self::AgentDisconnect,
            103 => Self::Ack,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Unset => 0,
            Self::HaproxyHello => 1,
            Self::HaproxyDisconnect => 2,
            Self::Notify => 3,
            Self::AgentHello => 101,
            Self::AgentDisconnect => 102,
            Self::Ack => 103,
            Self::Unknown(tag) => tag,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unset => "UNSET",
            Self::HaproxyHello => "HAPROXY-HELLO",
            Self::HaproxyDisconnect => "HAPROXY-DISCONNECT",
            Self::Notify => "NOTIFY",
            Self::AgentHello => "AGENT-HELLO",
            Self::AgentDisconnect => "AGENT-DISCONNECT",
            Self::Ack => "ACK",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

/// Frame flags bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FrameFlags(pub u32);

impl FrameFlags {
    /// Last (or only) fragment of a frame.
    pub const FIN: u32 = 0x0000_0001;
    /// The fragmented frame is abandoned.
    pub const ABORT: u32 = 0x0000_0002;

    pub fn fin() -> Self {
        Self(Self::FIN)
    }

    /// Flags of a fragment with more to follow.
    pub fn continuation() -> Self {
        Self(0)
    }

    pub fn is_fin(self) -> bool {
        self.0 & Self::FIN != 0
    }

    pub fn is_abort(self) -> bool {
        self.0 & Self::ABORT != 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payload items
// ─────────────────────────────────────────────────────────────────────────────

/// Variable scope of a SET-VAR / UNSET-VAR action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VarScope {
    Process,
    #[default]
    Session,
    Transaction,
    Request,
    Response,
}

impl VarScope {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Process),
            1 => Some(Self::Session),
            2 => Some(Self::Transaction),
            3 => Some(Self::Request),
            4 => Some(Self::Response),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Process => 0,
            Self::Session => 1,
            Self::Transaction => 2,
            Self::Request => 3,
            Self::Response => 4,
        }
    }

    /// Parse the short names used by the proxy configuration (`sess`, `txn`, ...).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "proc" | "process" => Some(Self::Process),
            "sess" | "session" => Some(Self::Session),
            "txn" | "transaction" => Some(Self::Transaction),
            "req" | "request" => Some(Self::Request),
            "res" | "response" => Some(Self::Response),
            _ => None,
        }
    }
}

/// One message of a NOTIFY frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub name: String,
    pub args: Attributes,
}

impl Message {
    pub fn new(name: impl Into<String>, args: Attributes) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// One action of an ACK frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SetVar {
        scope: VarScope,
        name: String,
        value: TypedData,
    },
    UnsetVar {
        scope: VarScope,
        name: String,
    },
}

impl Action {
    pub fn set_var(scope: VarScope, name: impl Into<String>, value: impl Into<TypedData>) -> Self {
        Self::SetVar {
            scope,
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Decoded frame payload.
///
/// Which variant a frame carries is fixed by its type and flags; see
/// [`Frame::is_well_formed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// HELLO and DISCONNECT frames.
    KvList(Vec<(String, TypedData)>),
    /// Complete NOTIFY frames.
    Messages(Vec<Message>),
    /// Complete ACK frames.
    Actions(Vec<Action>),
    /// Fragments and frames of unknown type.
    Raw(Bytes),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadKind {
    KvList,
    Messages,
    Actions,
    Raw,
}

fn payload_kind(frame_type: FrameType, flags: FrameFlags) -> PayloadKind {
    match frame_type {
        FrameType::HaproxyHello
        | FrameType::AgentHello
        | FrameType::HaproxyDisconnect
        | FrameType::AgentDisconnect => PayloadKind::KvList,
        FrameType::Notify if flags.is_fin() => PayloadKind::Messages,
        FrameType::Ack if flags.is_fin() => PayloadKind::Actions,
        _ => PayloadKind::Raw,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame
// ─────────────────────────────────────────────────────────────────────────────

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub flags: FrameFlags,
    pub stream_id: u64,
    pub frame_id: u64,
    pub payload: Payload,
}

impl Frame {
    pub fn haproxy_hello(items: Vec<(String, TypedData)>) -> Self {
        Self::connection_frame(FrameType::HaproxyHello, items)
    }

    pub fn agent_hello(items: Vec<(String, TypedData)>) -> Self {
        Self::connection_frame(FrameType::AgentHello, items)
    }

    pub fn haproxy_disconnect(status: u32, message: impl Into<String>) -> Self {
        Self::connection_frame(
            FrameType::HaproxyDisconnect,
            disconnect_items(status, message.into()),
        )
    }

    pub fn agent_disconnect(status: u32, message: impl Into<String>) -> Self {
        Self::connection_frame(
            FrameType::AgentDisconnect,
            disconnect_items(status, message.into()),
        )
    }

    pub fn notify(stream_id: u64, frame_id: u64, messages: Vec<Message>) -> Self {
        Self {
            frame_type: FrameType::Notify,
            flags: FrameFlags::fin(),
            stream_id,
            frame_id,
            payload: Payload::Messages(messages),
        }
    }

    pub fn ack(stream_id: u64, frame_id: u64, actions: Vec<Action>) -> Self {
        Self {
            frame_type: FrameType::Ack,
            flags: FrameFlags::fin(),
            stream_id,
            frame_id,
            payload: Payload::Actions(actions),
        }
    }

    fn connection_frame(frame_type: FrameType, items: Vec<(String, TypedData)>) -> Self {
        Self {
            frame_type,
            flags: FrameFlags::fin(),
            stream_id: 0,
            frame_id: 0,
            payload: Payload::KvList(items),
        }
    }

    /// Whether the payload variant matches what the type and flags imply.
    ///
    /// Only well-formed frames survive an encode/decode round trip unchanged.
    pub fn is_well_formed(&self) -> bool {
        matches!(
            (payload_kind(self.frame_type, self.flags), &self.payload),
            (PayloadKind::KvList, Payload::KvList(_))
                | (PayloadKind::Messages, Payload::Messages(_))
                | (PayloadKind::Actions, Payload::Actions(_))
                | (PayloadKind::Raw, Payload::Raw(_))
        )
    }

    /// Key-value items of a HELLO or DISCONNECT frame.
    pub fn kv_items(&self) -> Option<&[(String, TypedData)]> {
        match &self.payload {
            Payload::KvList(items) => Some(items),
            _ => None,
        }
    }

    /// Status code of a DISCONNECT frame.
    pub fn disconnect_status(&self) -> Option<(u32, String)> {
        let items = self.kv_items()?;
        let status = items.iter().find_map(|(k, v)| match (k.as_str(), v) {
            ("status-code", TypedData::Uint32(code)) => Some(*code),
            _ => None,
        })?;
        let message = items
            .iter()
            .find(|(k, _)| k == "message")
            .and_then(|(_, v)| v.as_str())
            .unwrap_or_default()
            .to_string();
        Some((status, message))
    }

    /// Append the header (without length prefix) and payload to `buf`.
    pub(crate) fn encode_body(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(self.frame_type.as_u8());
        buf.put_u32(self.flags.0);
        varint::encode(self.stream_id, buf);
        varint::encode(self.frame_id, buf);

        match (&self.payload, payload_kind(self.frame_type, self.flags)) {
            (Payload::KvList(items), PayloadKind::KvList) => encode_kv_list(items, buf),
            (Payload::Messages(messages), PayloadKind::Messages) => {
                encode_messages(messages, buf)
            }
            (Payload::Actions(actions), PayloadKind::Actions) => encode_actions(actions, buf),
            (Payload::Raw(raw), PayloadKind::Raw) => {
                buf.put_slice(raw);
                Ok(())
            }
            _ => Err(ProtocolError::malformed(format!(
                "payload does not match {} frame",
                self.frame_type.name()
            ))),
        }
    }

    /// Parse a frame body (everything after the length prefix).
    pub(crate) fn decode_body(body: Bytes) -> Result<Self> {
        let mut reader = PayloadReader::new(&body);
        let frame_type = FrameType::from_u8(reader.read_u8()?);
        let flags = FrameFlags(reader.read_u32()?);
        let stream_id = reader.read_varint()?;
        let frame_id = reader.read_varint()?;
        let offset = reader.position();

        let payload = match payload_kind(frame_type, flags) {
            PayloadKind::KvList => Payload::KvList(reader.read_kv_items_to_end()?),
            PayloadKind::Messages => Payload::Messages(decode_messages_from(&mut reader)?),
            PayloadKind::Actions => Payload::Actions(decode_actions_from(&mut reader)?),
            PayloadKind::Raw => Payload::Raw(body.slice(offset..)),
        };

        Ok(Self {
            frame_type,
            flags,
            stream_id,
            frame_id,
            payload,
        })
    }
}

fn disconnect_items(status: u32, message: String) -> Vec<(String, TypedData)> {
    vec![
        ("status-code".to_string(), TypedData::Uint32(status)),
        ("message".to_string(), TypedData::String(message)),
    ]
}

/// Parse the messages of a reassembled NOTIFY payload.
pub fn decode_messages(payload: &[u8]) -> Result<Vec<Message>> {
    let mut reader = PayloadReader::new(payload);
    decode_messages_from(&mut reader)
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────────────────────────

fn encode_string(value: &[u8], buf: &mut BytesMut) {
    varint::encode(value.len() as u64, buf);
    buf.put_slice(value);
}

/// Append one typed value.
pub fn encode_typed(value: &TypedData, buf: &mut BytesMut) {
    match value {
        TypedData::Null => buf.put_u8(TYPE_NULL),
        TypedData::Bool(v) => buf.put_u8(TYPE_BOOL | if *v { DATA_FLAG_TRUE } else { 0 }),
        TypedData::Int32(v) => {
            buf.put_u8(TYPE_INT32);
            varint::encode(i64::from(*v) as u64, buf);
        }
        TypedData::Uint32(v) => {
            buf.put_u8(TYPE_UINT32);
            varint::encode(u64::from(*v), buf);
        }
        TypedData::Int64(v) => {
            buf.put_u8(TYPE_INT64);
            varint::encode(*v as u64, buf);
        }
        TypedData::Uint64(v) => {
            buf.put_u8(TYPE_UINT64);
            varint::encode(*v, buf);
        }
        TypedData::Ipv4(addr) => {
            buf.put_u8(TYPE_IPV4);
            buf.put_slice(&addr.octets());
        }
        TypedData::Ipv6(addr) => {
            buf.put_u8(TYPE_IPV6);
            buf.put_slice(&addr.octets());
        }
        TypedData::String(s) => {
            buf.put_u8(TYPE_STRING);
            encode_string(s.as_bytes(), buf);
        }
        TypedData::Binary(b) => {
            buf.put_u8(TYPE_BINARY);
            encode_string(b, buf);
        }
    }
}

fn encode_kv_list(items: &[(String, TypedData)], buf: &mut BytesMut) -> Result<()> {
    for (name, value) in items {
        encode_string(name.as_bytes(), buf);
        encode_typed(value, buf);
    }
    Ok(())
}

fn encode_messages(messages: &[Message], buf: &mut BytesMut) -> Result<()> {
    for message in messages {
        let nb_args = u8::try_from(message.args.len()).map_err(|_| {
            ProtocolError::malformed(format!("message '{}' has too many arguments", message.name))
        })?;
        encode_string(message.name.as_bytes(), buf);
        buf.put_u8(nb_args);
        for (name, value) in message.args.iter() {
            encode_string(name.as_bytes(), buf);
            encode_typed(value, buf);
        }
    }
    Ok(())
}

fn encode_actions(actions: &[Action], buf: &mut BytesMut) -> Result<()> {
    for action in actions {
        match action {
            Action::SetVar { scope, name, value } => {
                buf.put_u8(ACTION_SET_VAR);
                buf.put_u8(3);
                buf.put_u8(scope.as_u8());
                encode_string(name.as_bytes(), buf);
                encode_typed(value, buf);
            }
            Action::UnsetVar { scope, name } => {
                buf.put_u8(ACTION_UNSET_VAR);
                buf.put_u8(2);
                buf.put_u8(scope.as_u8());
                encode_string(name.as_bytes(), buf);
            }
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────────────

/// Bounds-checked cursor over a payload.
struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| ProtocolError::malformed("unexpected end of payload"))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_exact(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_varint(&mut self) -> Result<u64> {
        let (value, len) = varint::decode(&self.buf[self.pos.min(self.buf.len())..])?;
        self.pos += len;
        Ok(value)
    }

    fn read_exact(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(ProtocolError::malformed(format!(
                "length {} exceeds remaining payload of {} bytes",
                len,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_length_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()?;
        let len = usize::try_from(len)
            .map_err(|_| ProtocolError::malformed("length does not fit in memory"))?;
        self.read_exact(len)
    }

    fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_length_prefixed()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| ProtocolError::malformed("string is not valid UTF-8"))
    }

    fn read_typed(&mut self) -> Result<TypedData> {
        let tag = self.read_u8()?;
        let value = match tag & DATA_TYPE_MASK {
            TYPE_NULL => TypedData::Null,
            TYPE_BOOL => TypedData::Bool(tag & DATA_FLAG_TRUE != 0),
            TYPE_INT32 => {
                let raw = self.read_varint()? as i64;
                TypedData::Int32(
                    i32::try_from(raw)
                        .map_err(|_| ProtocolError::malformed("int32 value out of range"))?,
                )
            }
            TYPE_UINT32 => {
                let raw = self.read_varint()?;
                TypedData::Uint32(
                    u32::try_from(raw)
                        .map_err(|_| ProtocolError::malformed("uint32 value out of range"))?,
                )
            }
            TYPE_INT64 => TypedData::Int64(self.read_varint()? as i64),
            TYPE_UINT64 => TypedData::Uint64(self.read_varint()?),
            TYPE_IPV4 => {
                let b = self.read_exact(4)?;
                TypedData::Ipv4(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
            }
            TYPE_IPV6 => {
                let b = self.read_exact(16)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(b);
                TypedData::Ipv6(Ipv6Addr::from(octets))
            }
            TYPE_STRING => TypedData::String(self.read_string()?),
            TYPE_BINARY => TypedData::Binary(self.read_length_prefixed()?.to_vec()),
            other => {
                return Err(ProtocolError::malformed(format!(
                    "unknown data type tag {}",
                    other
                )));
            }
        };
        Ok(value)
    }

    fn read_kv_item(&mut self) -> Result<(String, TypedData)> {
        let name = self.read_string()?;
        let value = self.read_typed()?;
        Ok((name, value))
    }

    fn read_kv_items_to_end(&mut self) -> Result<Vec<(String, TypedData)>> {
        let mut items = Vec::new();
        while !self.is_empty() {
            items.push(self.read_kv_item()?);
        }
        Ok(items)
    }
}

fn decode_messages_from(reader: &mut PayloadReader<'_>) -> Result<Vec<Message>> {
    let mut messages = Vec::new();
    while !reader.is_empty() {
        let name = reader.read_string()?;
        let nb_args = reader.read_u8()?;
        let mut args = Vec::with_capacity(usize::from(nb_args));
        for _ in 0..nb_args {
            args.push(reader.read_kv_item()?);
        }
        messages.push(Message {
            name,
            args: Attributes::from(args),
        });
    }
    Ok(messages)
}

fn decode_actions_from(reader: &mut PayloadReader<'_>) -> Result<Vec<Action>> {
    let mut actions = Vec::new();
    while !reader.is_empty() {
        let action_type = reader.read_u8()?;
        let nb_args = reader.read_u8()?;
        let scope_tag = reader.read_u8()?;
        let scope = VarScope::from_u8(scope_tag)
            .ok_or_else(|| ProtocolError::malformed(format!("unknown scope {}", scope_tag)))?;
        let name = reader.read_string()?;
        let action = match (action_type, nb_args) {
            (ACTION_SET_VAR, 3) => Action::SetVar {
                scope,
                name,
                value: reader.read_typed()?,
            },
            (ACTION_UNSET_VAR, 2) => Action::UnsetVar { scope, name },
            (t, n) => {
                return Err(ProtocolError::malformed(format!(
                    "unknown action type {} with {} arguments",
                    t, n
                )));
            }
        };
        actions.push(action);
    }
    Ok(actions)
}
