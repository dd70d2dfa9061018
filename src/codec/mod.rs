//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Objbox.
//
// Objbox is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Objbox is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Objbox. If not, see <http://www.gnu.org/licenses/>.

//! Conversion between typed attribute values and the bytes stored on
//! objects.
//!
//! Decoding never substitutes a default. A `None` from any decoder means the
//! bytes do not hold a value of the key's kind; callers decide whether that
//! is "absent" or "corrupt".

pub mod date;
pub mod flags;
pub mod numeric;
pub mod text;

pub use self::date::{convert_string_to_date, decode_date, encode_date};
pub use self::flags::{
    flags_to_string, resolve_flags, string_to_flags, MailFlags,
};
pub use self::numeric::{decode_u64, is_numeric, is_numeric_optional};
pub use self::text::find_and_replace;

use crate::model::{MetadataKey, ValueKind};
use crate::support::error::Error;

/// A decoded attribute value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttributeValue {
    /// Seconds since the UNIX epoch.
    Date(i64),
    Integer(u64),
    String(String),
    Flags(MailFlags),
}

impl AttributeValue {
    pub fn kind(&self) -> ValueKind {
        match *self {
            AttributeValue::Date(..) => ValueKind::Date,
            AttributeValue::Integer(..) => ValueKind::Integer,
            AttributeValue::String(..) => ValueKind::String,
            AttributeValue::Flags(..) => ValueKind::FlagSet,
        }
    }
}

pub fn is_date_attribute(key: MetadataKey) -> bool {
    ValueKind::Date == key.kind()
}

/// Encode `value` for storage under `key`.
///
/// Fails if the value is of the wrong kind for the key or cannot be
/// represented (e.g. a date outside the four-digit-year range).
pub fn encode(
    key: MetadataKey,
    value: &AttributeValue,
) -> Result<Vec<u8>, Error> {
    if key.kind() != value.kind() {
        return Err(Error::corrupt(key, format!("{:?}", value).as_bytes()));
    }

    match *value {
        AttributeValue::Date(t) => encode_date(t)
            .map(String::into_bytes)
            .ok_or_else(|| Error::corrupt(key, t.to_string().as_bytes())),
        AttributeValue::Integer(n) => Ok(n.to_string().into_bytes()),
        AttributeValue::String(ref s) => Ok(s.clone().into_bytes()),
        AttributeValue::Flags(f) => Ok(flags_to_string(f).into_bytes()),
    }
}

/// Decode the bytes stored under `key`.
pub fn decode(key: MetadataKey, raw: &[u8]) -> Option<AttributeValue> {
    let s = std::str::from_utf8(raw).ok()?;
    match key.kind() {
        ValueKind::Date => decode_date(s).map(AttributeValue::Date),
        ValueKind::Integer => {
            numeric::decode_u64(s).map(AttributeValue::Integer)
        }
        ValueKind::String => Some(AttributeValue::String(s.to_owned())),
        ValueKind::FlagSet => string_to_flags(s).map(AttributeValue::Flags),
    }
}

/// Like `decode`, but a value that fails to decode is a `Corrupt` error.
pub fn decode_strict(
    key: MetadataKey,
    raw: &[u8],
) -> Result<AttributeValue, Error> {
    decode(key, raw).ok_or_else(|| Error::corrupt(key, raw))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dispatch_by_kind() {
        assert!(is_date_attribute(MetadataKey::ReceivedTime));
        assert!(is_date_attribute(MetadataKey::SaveTime));
        assert!(!is_date_attribute(MetadataKey::PhysicalSize));

        assert_eq!(
            b"2017-10-10 12:12:12".to_vec(),
            encode(MetadataKey::SaveTime, &AttributeValue::Date(1507637532))
                .unwrap()
        );
        assert_eq!(
            Some(AttributeValue::Integer(1234)),
            decode(MetadataKey::PhysicalSize, b"1234")
        );
        assert_eq!(
            Some(AttributeValue::Flags(MailFlags::SEEN)),
            decode(MetadataKey::Flags, b"S")
        );
        assert_eq!(
            Some(AttributeValue::String("abc".to_owned())),
            decode(MetadataKey::Guid, b"abc")
        );
    }

    #[test]
    fn malformed_values_never_default() {
        assert_eq!(None, decode(MetadataKey::ReceivedTime, b"2017-2-2 "));
        assert_eq!(None, decode(MetadataKey::ReceivedTime, b"1507637532"));
        assert_eq!(None, decode(MetadataKey::VirtualSize, b""));
        assert_eq!(None, decode(MetadataKey::VirtualSize, b"12a3"));
        assert_eq!(None, decode(MetadataKey::Flags, b"S?"));
        assert_eq!(None, decode(MetadataKey::Guid, b"\xff\xfe"));

        assert_matches!(
            Err(Error::Corrupt { .. }),
            decode_strict(MetadataKey::PhysicalSize, b"-1")
        );
    }

    #[test]
    fn kind_mismatch_rejected() {
        assert_matches!(
            Err(Error::Corrupt { .. }),
            encode(MetadataKey::PhysicalSize, &AttributeValue::Date(0))
        );
        assert_matches!(
            Err(Error::Corrupt { .. }),
            encode(
                MetadataKey::SaveTime,
                &AttributeValue::Date(-1_000_000_000_000)
            )
        );
    }
}
