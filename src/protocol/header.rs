//! Frame header.
//!
//! The header is the first value of every frame, a MessagePack map:
//! ```text
//! {
//!   protocol: "typh",
//!   version:  1,
//!   id:       "abc-123",        correlation id
//!   action:   "client:once",    client:once | client:subscribe | server:update
//!   handler?: "calc.bot",
//!   success?: true,             server:update only; false = error payload
//! }
//! ```
//!
//! Optional fields are omitted from the map when unset, never sent as nil.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::codec::MsgPackCodec;
use crate::error::{Result, TyphoonError};

/// Protocol tag carried by every header.
pub const PROTOCOL: &str = "typh";

/// Highest protocol version this crate speaks.
pub const PROTOCOL_VERSION: u32 = 1;

/// What a frame asks for or carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Single request, single response.
    ClientOnce,
    /// Open a push stream.
    ClientSubscribe,
    /// A pushed value; `success` tells data from error.
    ServerUpdate,
}

impl Action {
    /// Wire tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ClientOnce => "client:once",
            Action::ClientSubscribe => "client:subscribe",
            Action::ServerUpdate => "server:update",
        }
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "client:once" => Some(Action::ClientOnce),
            "client:subscribe" => Some(Action::ClientSubscribe),
            "server:update" => Some(Action::ServerUpdate),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Tags go out as plain strings regardless of the serializer's enum config.
impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TagVisitor;

        impl Visitor<'_> for TagVisitor {
            type Value = Action;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an action tag")
            }

            fn visit_str<E: de::Error>(self, tag: &str) -> std::result::Result<Action, E> {
                Action::from_tag(tag).ok_or_else(|| E::custom(format!("unknown action `{tag}`")))
            }

            fn visit_bytes<E: de::Error>(self, tag: &[u8]) -> std::result::Result<Action, E> {
                let tag = std::str::from_utf8(tag).map_err(E::custom)?;
                self.visit_str(tag)
            }
        }

        deserializer.deserialize_str(TagVisitor)
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Always [`PROTOCOL`] for valid frames.
    pub protocol: String,
    /// Protocol version.
    pub version: u32,
    /// Correlation id tying responses to requests.
    pub id: String,
    /// Frame action.
    pub action: Action,
    /// Target handler name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    /// For `server:update`: `false` when the payload is an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl Header {
    /// Create a header for the current protocol version.
    pub fn new(id: impl Into<String>, action: Action) -> Self {
        Self {
            protocol: PROTOCOL.to_string(),
            version: PROTOCOL_VERSION,
            id: id.into(),
            action,
            handler: None,
            success: None,
        }
    }

    /// `client:once` request for `handler`.
    ///
    /// ```
    /// use typhoon::protocol::{Action, Header};
    ///
    /// let header = Header::once("abc-123", "calc.bot");
    /// assert_eq!(header.action, Action::ClientOnce);
    /// assert_eq!(header.handler.as_deref(), Some("calc.bot"));
    /// ```
    pub fn once(id: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::new(id, Action::ClientOnce).with_handler(handler)
    }

    /// `client:subscribe` request for `handler`.
    pub fn subscribe(id: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::new(id, Action::ClientSubscribe).with_handler(handler)
    }

    /// `server:update` push; `success == false` marks an error payload.
    pub fn update(id: impl Into<String>, success: bool) -> Self {
        Self::new(id, Action::ServerUpdate).with_success(success)
    }

    /// Set the handler name.
    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    /// Set the success flag.
    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    /// Encode to a standalone MsgPack map.
    pub fn encode(&self) -> Result<Vec<u8>> {
        MsgPackCodec::encode(self)
    }

    /// Decode from the start of `buf` and validate.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let header: Header = MsgPackCodec::decode(buf)?;
        header.validate()?;
        Ok(header)
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Protocol tag is `"typh"`
    /// - Version is not newer than [`PROTOCOL_VERSION`]
    pub fn validate(&self) -> Result<()> {
        if self.protocol != PROTOCOL {
            return Err(TyphoonError::Protocol(format!(
                "unexpected protocol tag `{}`",
                self.protocol
            )));
        }

        if self.version > PROTOCOL_VERSION {
            return Err(TyphoonError::Protocol(format!(
                "unsupported version {} (max {})",
                self.version, PROTOCOL_VERSION
            )));
        }

        Ok(())
    }

    /// Check if this is a `client:once` request.
    #[inline]
    pub fn is_once(&self) -> bool {
        self.action == Action::ClientOnce
    }

    /// Check if this is a `client:subscribe` request.
    #[inline]
    pub fn is_subscribe(&self) -> bool {
        self.action == Action::ClientSubscribe
    }

    /// Check if this is a `server:update` push.
    #[inline]
    pub fn is_update(&self) -> bool {
        self.action == Action::ServerUpdate
    }

    /// Whether the payload is data rather than an error. Absent means data.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.success.unwrap_or(true)
    }
}
