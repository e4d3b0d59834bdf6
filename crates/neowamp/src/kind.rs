//! # Message Kinds
//!
//! The closed set of event kinds and their signed wire codes. The codes are
//! part of the interop contract and must never change.

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::error::Error;
use crate::error::Result;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum MessageKind {
    Call = 127,
    /// Shared by Cancel (abort before start) and Stop (abort a stream).
    Cancel = 126,
    Next = 125,
    Publish = 1,
    Accept = 0,
    Yield = -125,
    Error = -126,
    Reply = -127,
}

impl MessageKind {
    /// Stop travels on the Cancel code.
    pub const STOP: MessageKind = MessageKind::Cancel;

    pub fn code(self) -> i8 {
        self as i8
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            127 => Ok(Self::Call),
            126 => Ok(Self::Cancel),
            125 => Ok(Self::Next),
            1 => Ok(Self::Publish),
            0 => Ok(Self::Accept),
            -125 => Ok(Self::Yield),
            -126 => Ok(Self::Error),
            -127 => Ok(Self::Reply),
            other => Err(Error::UnknownKind(other)),
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Call => "Call",
            Self::Cancel => "Cancel",
            Self::Next => "Next",
            Self::Publish => "Publish",
            Self::Accept => "Accept",
            Self::Yield => "Yield",
            Self::Error => "Error",
            Self::Reply => "Reply",
        };
        write!(f, "{}({})", name, self.code())
    }
}

impl Serialize for MessageKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.code())
    }
}

impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = i64::deserialize(deserializer)?;
        Self::from_code(code).map_err(serde::de::Error::custom)
    }
}
