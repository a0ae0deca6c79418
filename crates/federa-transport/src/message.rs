//! Protocol packets and the messages they carry.
//!
//! Packets travel as compressed maps with single-letter keys. [`Payload`]
//! and [`Message`] convert to and from that shape with `to_value` and
//! `from_value`.

use std::fmt;
use std::str::FromStr;

use federa_codec::{ObjectId, Value, ValueMap};
use serde::Serialize;

use crate::error::{Result, TransportError};

/// Short keys used in the wire maps.
pub mod key {
    pub const TYPE: &str = "m";
    pub const PROCESS_TYPE: &str = "pt";
    pub const PROCESS_ID: &str = "id";
    pub const ACCESS_TOKEN: &str = "a";
    pub const SUBJECT_ID: &str = "s";
    pub const NICKNAME: &str = "n";
    pub const IMAGE_URL: &str = "i";
    pub const MESSAGES: &str = "mm";
    pub const FEDERATION: &str = "x";
    pub const OBJECT: &str = "i";
    pub const CLASS: &str = "c";
    pub const CHANGE: &str = "t";
    pub const PROPERTIES: &str = "p";
    pub const PROPERTY_VALUE: &str = "v";
    pub const PROPERTY_TIME: &str = "t";
    pub const EVENT: &str = "e";
    pub const SERVICE: &str = "s";
    pub const REQUEST_ID: &str = "r";
    pub const VALUE: &str = "v";
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident = $value:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        #[serde(rename_all = "snake_case")]
        #[repr(u8)]
        pub enum $name {
            $($variant = $value),+
        }

        impl TryFrom<i64> for $name {
            type Error = TransportError;

            fn try_from(value: i64) -> Result<Self> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(TransportError::InvalidPacket(format!(
                        "unknown {} {other}",
                        stringify!($name)
                    ))),
                }
            }
        }

        impl From<$name> for Value {
            fn from(v: $name) -> Value {
                Value::Int(v as i64)
            }
        }
    };
}

wire_enum! {
    /// Role of the process announced in the handshake.
    ProcessType {
        Agent = 1,
        Headup = 2,
        Player = 3,
        Server = 4,
        Master = 5,
        Launcher = 6,
    }
}

wire_enum! {
    /// Packet kinds, carried in the `m` key of a payload.
    PacketType {
        Heartbeat = 0,
        Handshake = 1,
        Authenticate = 2,
        Messages = 3,
        FederationAdded = 4,
        FederationRemoved = 5,
    }
}

wire_enum! {
    /// Message kinds, carried in the `m` key of a message.
    MessageType {
        Null = 0,
        ObjectChanges = 1,
        EventDispatch = 2,
        ServiceRequest = 3,
        ServiceFulfill = 4,
        ServiceReject = 5,
    }
}

wire_enum! {
    /// Kind of object change.
    ObjectChange {
        Create = 1,
        Update = 2,
        Delete = 3,
    }
}

impl ProcessType {
    pub const ALL: [ProcessType; 6] = [
        ProcessType::Agent,
        ProcessType::Headup,
        ProcessType::Player,
        ProcessType::Server,
        ProcessType::Master,
        ProcessType::Launcher,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessType::Agent => "agent",
            ProcessType::Headup => "headup",
            ProcessType::Player => "player",
            ProcessType::Server => "server",
            ProcessType::Master => "master",
            ProcessType::Launcher => "launcher",
        }
    }
}

impl Default for ProcessType {
    fn default() -> Self {
        ProcessType::Agent
    }
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts either the numeric code or the name, case-insensitively.
impl FromStr for ProcessType {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(code) = s.parse::<i64>() {
            return ProcessType::try_from(code);
        }
        ProcessType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TransportError::InvalidPacket(format!("unknown process type '{s}'")))
    }
}

/// Credentials sent in an `Authenticate` packet.
#[derive(Clone, PartialEq, Eq, Default, Serialize)]
pub struct Credentials {
    #[serde(skip_serializing)]
    pub access_token: String,
    pub subject_id: String,
    pub nickname: String,
    pub image_url: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("subject_id", &self.subject_id)
            .field("nickname", &self.nickname)
            .field("image_url", &self.image_url)
            .finish()
    }
}

/// Top-level packet content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum Payload {
    Heartbeat,
    Handshake {
        process_id: String,
        process_type: ProcessType,
    },
    Authenticate(Credentials),
    /// A coalesced batch of messages.
    Messages(Vec<Message>),
    FederationAdded {
        federation: String,
        process_id: String,
    },
    FederationRemoved {
        federation: String,
        process_id: String,
    },
}

impl Payload {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Payload::Heartbeat => PacketType::Heartbeat,
            Payload::Handshake { .. } => PacketType::Handshake,
            Payload::Authenticate(_) => PacketType::Authenticate,
            Payload::Messages(_) => PacketType::Messages,
            Payload::FederationAdded { .. } => PacketType::FederationAdded,
            Payload::FederationRemoved { .. } => PacketType::FederationRemoved,
        }
    }

    /// Control packets are sent immediately rather than batched.
    pub fn is_control(&self) -> bool {
        !matches!(self, Payload::Messages(_))
    }

    pub fn to_value(&self) -> ValueMap {
        let mut map = ValueMap::new();
        map.insert(key::TYPE.into(), self.packet_type().into());
        match self {
            Payload::Heartbeat => {}
            Payload::Handshake {
                process_id,
                process_type,
            } => {
                map.insert(key::PROCESS_TYPE.into(), (*process_type).into());
                map.insert(key::PROCESS_ID.into(), process_id.as_str().into());
            }
            Payload::Authenticate(credentials) => {
                map.insert(key::ACCESS_TOKEN.into(), credentials.access_token.as_str().into());
                map.insert(key::SUBJECT_ID.into(), credentials.subject_id.as_str().into());
                map.insert(key::NICKNAME.into(), credentials.nickname.as_str().into());
                map.insert(key::IMAGE_URL.into(), credentials.image_url.as_str().into());
            }
            Payload::Messages(messages) => {
                let list = messages.iter().map(|m| Value::Map(m.to_value())).collect();
                map.insert(key::MESSAGES.into(), Value::Array(list));
            }
            Payload::FederationAdded {
                federation,
                process_id,
            }
            | Payload::FederationRemoved {
                federation,
                process_id,
            } => {
                map.insert(key::FEDERATION.into(), federation.as_str().into());
                map.insert(key::PROCESS_ID.into(), process_id.as_str().into());
            }
        }
        map
    }

    pub fn from_value(map: &ValueMap) -> Result<Self> {
        let fields = Fields::new(map, "payload");
        let payload = match PacketType::try_from(fields.int(key::TYPE)?)? {
            PacketType::Heartbeat => Payload::Heartbeat,
            PacketType::Handshake => Payload::Handshake {
                process_id: fields.string(key::PROCESS_ID)?,
                process_type: ProcessType::try_from(fields.int(key::PROCESS_TYPE)?)?,
            },
            PacketType::Authenticate => Payload::Authenticate(Credentials {
                access_token: fields.string(key::ACCESS_TOKEN)?,
                subject_id: fields.string(key::SUBJECT_ID)?,
                nickname: fields.string(key::NICKNAME)?,
                image_url: fields.string(key::IMAGE_URL)?,
            }),
            PacketType::Messages => {
                let list = fields
                    .get(key::MESSAGES)?
                    .as_array()
                    .ok_or_else(|| fields.invalid(key::MESSAGES, "an array"))?;
                let messages = list
                    .iter()
                    .map(|item| {
                        item.as_map()
                            .ok_or_else(|| fields.invalid(key::MESSAGES, "an array of maps"))
                            .and_then(Message::from_value)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Payload::Messages(messages)
            }
            PacketType::FederationAdded => Payload::FederationAdded {
                federation: fields.string(key::FEDERATION)?,
                process_id: fields.string(key::PROCESS_ID)?,
            },
            PacketType::FederationRemoved => Payload::FederationRemoved {
                federation: fields.string(key::FEDERATION)?,
                process_id: fields.string(key::PROCESS_ID)?,
            },
        };
        Ok(payload)
    }
}

/// A change to one replicated object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectChanges {
    pub federation: String,
    pub object: ObjectId,
    pub class_name: String,
    pub change: ObjectChange,
    pub properties: ValueMap,
}

impl ObjectChanges {
    pub fn new(
        federation: impl Into<String>,
        object: ObjectId,
        class_name: impl Into<String>,
        change: ObjectChange,
    ) -> Self {
        Self {
            federation: federation.into(),
            object,
            class_name: class_name.into(),
            change,
            properties: ValueMap::new(),
        }
    }

    /// Add a property value, builder style.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// A message inside a `Messages` packet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Null,
    ObjectChanges(ObjectChanges),
    EventDispatch {
        federation: String,
        event: String,
        value: Value,
    },
    ServiceRequest {
        federation: String,
        service: String,
        request_id: u32,
        value: Value,
    },
    ServiceFulfill {
        request_id: u32,
        value: Value,
    },
    ServiceReject {
        request_id: u32,
        reason: Value,
    },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Null => MessageType::Null,
            Message::ObjectChanges(_) => MessageType::ObjectChanges,
            Message::EventDispatch { .. } => MessageType::EventDispatch,
            Message::ServiceRequest { .. } => MessageType::ServiceRequest,
            Message::ServiceFulfill { .. } => MessageType::ServiceFulfill,
            Message::ServiceReject { .. } => MessageType::ServiceReject,
        }
    }

    /// The federation a message is addressed to, if any.
    pub fn federation(&self) -> Option<&str> {
        match self {
            Message::ObjectChanges(changes) => Some(&changes.federation),
            Message::EventDispatch { federation, .. }
            | Message::ServiceRequest { federation, .. } => Some(federation),
            _ => None,
        }
    }

    pub fn to_value(&self) -> ValueMap {
        let mut map = ValueMap::new();
        map.insert(key::TYPE.into(), self.message_type().into());
        match self {
            Message::Null => {}
            Message::ObjectChanges(changes) => {
                map.insert(key::FEDERATION.into(), changes.federation.as_str().into());
                map.insert(key::OBJECT.into(), changes.object.into());
                map.insert(key::CLASS.into(), changes.class_name.as_str().into());
                map.insert(key::CHANGE.into(), changes.change.into());
                let properties = changes
                    .properties
                    .iter()
                    .map(|(name, value)| {
                        let mut slot = ValueMap::new();
                        slot.insert(key::PROPERTY_VALUE.into(), value.clone());
                        slot.insert(key::PROPERTY_TIME.into(), Value::Int(0));
                        (name.clone(), Value::Map(slot))
                    })
                    .collect();
                map.insert(key::PROPERTIES.into(), Value::Map(properties));
            }
            Message::EventDispatch {
                federation,
                event,
                value,
            } => {
                map.insert(key::FEDERATION.into(), federation.as_str().into());
                map.insert(key::EVENT.into(), event.as_str().into());
                map.insert(key::VALUE.into(), value.clone());
            }
            Message::ServiceRequest {
                federation,
                service,
                request_id,
                value,
            } => {
                map.insert(key::FEDERATION.into(), federation.as_str().into());
                map.insert(key::SERVICE.into(), service.as_str().into());
                map.insert(key::REQUEST_ID.into(), (*request_id).into());
                map.insert(key::VALUE.into(), value.clone());
            }
            Message::ServiceFulfill { request_id, value } => {
                map.insert(key::REQUEST_ID.into(), (*request_id).into());
                map.insert(key::VALUE.into(), value.clone());
            }
            Message::ServiceReject { request_id, reason } => {
                map.insert(key::REQUEST_ID.into(), (*request_id).into());
                map.insert(key::VALUE.into(), reason.clone());
            }
        }
        map
    }

    pub fn from_value(map: &ValueMap) -> Result<Self> {
        let fields = Fields::new(map, "message");
        let message = match MessageType::try_from(fields.int(key::TYPE)?)? {
            MessageType::Null => Message::Null,
            MessageType::ObjectChanges => {
                let object = fields
                    .get(key::OBJECT)?
                    .as_object()
                    .ok_or_else(|| fields.invalid(key::OBJECT, "an object reference"))?;
                let mut properties = ValueMap::new();
                if let Some(slots) = map.get(key::PROPERTIES) {
                    let slots = slots
                        .as_map()
                        .ok_or_else(|| fields.invalid(key::PROPERTIES, "a map"))?;
                    for (name, slot) in slots {
                        let value = slot
                            .get(key::PROPERTY_VALUE)
                            .ok_or_else(|| fields.invalid(key::PROPERTIES, "a map of {v, t}"))?;
                        properties.insert(name.clone(), value.clone());
                    }
                }
                Message::ObjectChanges(ObjectChanges {
                    federation: fields.string(key::FEDERATION)?,
                    object,
                    class_name: fields.optional_string(key::CLASS)?,
                    change: ObjectChange::try_from(fields.int(key::CHANGE)?)?,
                    properties,
                })
            }
            MessageType::EventDispatch => Message::EventDispatch {
                federation: fields.string(key::FEDERATION)?,
                event: fields.string(key::EVENT)?,
                value: fields.value(key::VALUE),
            },
            MessageType::ServiceRequest => Message::ServiceRequest {
                federation: fields.string(key::FEDERATION)?,
                service: fields.string(key::SERVICE)?,
                request_id: fields.request_id()?,
                value: fields.value(key::VALUE),
            },
            MessageType::ServiceFulfill => Message::ServiceFulfill {
                request_id: fields.request_id()?,
                value: fields.value(key::VALUE),
            },
            MessageType::ServiceReject => Message::ServiceReject {
                request_id: fields.request_id()?,
                reason: fields.value(key::VALUE),
            },
        };
        Ok(message)
    }
}

/// Typed access to the keys of a wire map.
struct Fields<'a> {
    map: &'a ValueMap,
    context: &'static str,
}

impl<'a> Fields<'a> {
    fn new(map: &'a ValueMap, context: &'static str) -> Self {
        Self { map, context }
    }

    fn invalid(&self, key: &str, expected: &str) -> TransportError {
        TransportError::InvalidPacket(format!(
            "{} key '{key}' must be {expected}",
            self.context
        ))
    }

    fn get(&self, key: &str) -> Result<&'a Value> {
        self.map.get(key).ok_or_else(|| {
            TransportError::InvalidPacket(format!("{} is missing key '{key}'", self.context))
        })
    }

    fn int(&self, key: &str) -> Result<i64> {
        self.get(key)?
            .as_i64()
            .ok_or_else(|| self.invalid(key, "an integer"))
    }

    fn string(&self, key: &str) -> Result<String> {
        self.get(key)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.invalid(key, "a string"))
    }

    fn optional_string(&self, key: &str) -> Result<String> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(String::new()),
            Some(_) => self.string(key),
        }
    }

    /// Missing values read as null.
    fn value(&self, key: &str) -> Value {
        self.map.get(key).cloned().unwrap_or_default()
    }

    fn request_id(&self) -> Result<u32> {
        let raw = self.int(key::REQUEST_ID)?;
        u32::try_from(raw).map_err(|_| self.invalid(key::REQUEST_ID, "a 32-bit unsigned integer"))
    }
}
