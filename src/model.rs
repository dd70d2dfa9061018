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

//! Types shared between the mail translator, the migrator, and the sync
//! engine.

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use rand::{rngs::OsRng, Rng};
use serde::{Deserialize, Serialize};

use crate::support::error::Error;

/// Uniquely identifies a message within a single mailbox.
///
/// UIDs are assigned by the host index, start at 1, and are never reused
/// within one UID validity epoch.
#[derive(
    Deserialize,
    Serialize,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
#[serde(transparent)]
pub struct Uid(pub NonZeroU32);

impl Uid {
    pub fn of(uid: u32) -> Option<Self> {
        NonZeroU32::new(uid).map(Uid)
    }

    #[cfg(test)]
    pub fn u(uid: u32) -> Self {
        Uid::of(uid).unwrap()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

/// The position of a message in the host's current view of the mailbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seqnum(pub NonZeroU32);

impl Seqnum {
    pub fn of(seqnum: u32) -> Option<Self> {
        NonZeroU32::new(seqnum).map(Seqnum)
    }

    #[cfg(test)]
    pub fn u(seqnum: u32) -> Self {
        Seqnum::of(seqnum).unwrap()
    }
}

/// The logical identity of a message, as handed to us by the host index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MailIdentity {
    pub uid: Uid,
    pub seq: Seqnum,
}

/// The 128-bit identifier of a mail object.
///
/// Rendered as 32 lowercase hex digits, which is also the object's name in
/// the store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u128);

impl ObjectId {
    pub fn generate() -> Self {
        ObjectId(OsRng.gen())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ObjectId({})", self)
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if 32 != s.len() || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::corrupt("object-id", s.as_bytes()));
        }

        u128::from_str_radix(s, 16)
            .map(ObjectId)
            .map_err(|_| Error::corrupt("object-id", s.as_bytes()))
    }
}

/// The per-message record this backend keeps in the host index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexRecord {
    pub object_id: ObjectId,
    /// Whether the object currently lives in the alternate tier.
    pub alt_storage: bool,
}

/// Which storage tier an object lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tier {
    Primary,
    Alternate,
}

impl Tier {
    pub fn of_record(record: &IndexRecord) -> Self {
        if record.alt_storage {
            Tier::Alternate
        } else {
            Tier::Primary
        }
    }

    pub fn other(self) -> Self {
        match self {
            Tier::Primary => Tier::Alternate,
            Tier::Alternate => Tier::Primary,
        }
    }
}

/// A message the index has expunged but whose object still exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpungedItem {
    pub uid: Uid,
    pub object_id: ObjectId,
    pub alt_storage: bool,
}

/// A UID validity epoch.
///
/// When this changes, every UID -> object mapping cached under the old value
/// is void.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SyncEpoch {
    pub uid_validity: u32,
}

impl SyncEpoch {
    /// Whether this epoch has actually been assigned. A mailbox that has
    /// never been synced reports 0.
    pub fn is_assigned(self) -> bool {
        0 != self.uid_validity
    }

    /// Choose a new epoch strictly greater than `prev`.
    ///
    /// The wall clock is used when it is ahead, so that a mailbox which is
    /// deleted and recreated gets a validity that no client has cached.
    pub fn next_after(prev: SyncEpoch, now_secs: i64) -> Option<SyncEpoch> {
        let now = u32::try_from(now_secs.max(0)).unwrap_or(u32::MAX);
        let min = prev.uid_validity.checked_add(1)?;
        Some(SyncEpoch {
            uid_validity: now.max(min),
        })
    }
}

/// The kind of value stored under a `MetadataKey`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Date,
    Integer,
    String,
    FlagSet,
}

/// The attributes we know how to interpret.
///
/// Each is stored on the object under a single-letter name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataKey {
    MailboxGuid,
    Guid,
    Pop3Uidl,
    Pop3Order,
    ReceivedTime,
    PhysicalSize,
    VirtualSize,
    Version,
    OrigMailbox,
    MailUid,
    FromEnvelope,
    PvtFlags,
    SaveTime,
    Flags,
    Keywords,
    ExtRefs,
}

impl MetadataKey {
    pub const ALL: &'static [MetadataKey] = &[
        MetadataKey::MailboxGuid,
        MetadataKey::Guid,
        MetadataKey::Pop3Uidl,
        MetadataKey::Pop3Order,
        MetadataKey::ReceivedTime,
        MetadataKey::PhysicalSize,
        MetadataKey::VirtualSize,
        MetadataKey::Version,
        MetadataKey::OrigMailbox,
        MetadataKey::MailUid,
        MetadataKey::FromEnvelope,
        MetadataKey::PvtFlags,
        MetadataKey::SaveTime,
        MetadataKey::Flags,
        MetadataKey::Keywords,
        MetadataKey::ExtRefs,
    ];

    /// Keys every valid mail object carries.
    pub const REQUIRED: &'static [MetadataKey] =
        &[MetadataKey::Guid, MetadataKey::MailboxGuid];

    pub fn letter(self) -> char {
        match self {
            MetadataKey::MailboxGuid => 'M',
            MetadataKey::Guid => 'G',
            MetadataKey::Pop3Uidl => 'P',
            MetadataKey::Pop3Order => 'O',
            MetadataKey::ReceivedTime => 'R',
            MetadataKey::PhysicalSize => 'Z',
            MetadataKey::VirtualSize => 'V',
            MetadataKey::Version => 'I',
            MetadataKey::OrigMailbox => 'B',
            MetadataKey::MailUid => 'U',
            MetadataKey::FromEnvelope => 'A',
            MetadataKey::PvtFlags => 'C',
            MetadataKey::SaveTime => 'S',
            MetadataKey::Flags => 'F',
            MetadataKey::Keywords => 'K',
            MetadataKey::ExtRefs => 'X',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        MetadataKey::ALL.iter().copied().find(|k| k.letter() == c)
    }

    pub fn kind(self) -> ValueKind {
        match self {
            MetadataKey::ReceivedTime | MetadataKey::SaveTime => {
                ValueKind::Date
            }

            MetadataKey::Pop3Order
            | MetadataKey::PhysicalSize
            | MetadataKey::VirtualSize
            | MetadataKey::MailUid => ValueKind::Integer,

            MetadataKey::Flags | MetadataKey::PvtFlags => ValueKind::FlagSet,

            MetadataKey::MailboxGuid
            | MetadataKey::Guid
            | MetadataKey::Pop3Uidl
            | MetadataKey::Version
            | MetadataKey::OrigMailbox
            | MetadataKey::FromEnvelope
            | MetadataKey::Keywords
            | MetadataKey::ExtRefs => ValueKind::String,
        }
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// The name of an attribute as stored on an object: either one we
/// understand, or an extension attribute that is carried through untouched.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeName {
    Known(MetadataKey),
    Extension(String),
}

impl AttributeName {
    pub fn parse(name: &str) -> Self {
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => MetadataKey::from_letter(c)
                .map(AttributeName::Known)
                .unwrap_or_else(|| AttributeName::Extension(name.to_owned())),
            _ => AttributeName::Extension(name.to_owned()),
        }
    }
}

impl From<MetadataKey> for AttributeName {
    fn from(key: MetadataKey) -> Self {
        AttributeName::Known(key)
    }
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AttributeName::Known(key) => write!(f, "{}", key),
            AttributeName::Extension(ref s) => write!(f, "{}", s),
        }
    }
}

/// The attributes attached to one object.
///
/// Values are kept as raw bytes; interpretation happens in `codec` when a
/// particular key is asked for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataMap(BTreeMap<AttributeName, Vec<u8>>);

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: MetadataKey) -> Option<&[u8]> {
        self.0.get(&AttributeName::Known(key)).map(|v| &v[..])
    }

    pub fn get_raw(&self, name: &AttributeName) -> Option<&[u8]> {
        self.0.get(name).map(|v| &v[..])
    }

    pub fn get_str(&self, key: MetadataKey) -> Option<&str> {
        self.get(key).and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn set(&mut self, key: MetadataKey, value: impl Into<Vec<u8>>) {
        self.0.insert(AttributeName::Known(key), value.into());
    }

    pub fn set_raw(&mut self, name: AttributeName, value: Vec<u8>) {
        self.0.insert(name, value);
    }

    pub fn remove(&mut self, key: MetadataKey) -> Option<Vec<u8>> {
        self.0.remove(&AttributeName::Known(key))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttributeName, &[u8])> {
        self.0.iter().map(|(k, v)| (k, &v[..]))
    }

    /// Whether every required key is present.
    pub fn validate(&self) -> bool {
        MetadataKey::REQUIRED.iter().all(|&k| self.get(k).is_some())
    }

    /// Convert to the plain string-keyed form stores persist.
    pub fn to_wire(&self) -> BTreeMap<String, Vec<u8>> {
        self.0
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    pub fn from_wire(wire: BTreeMap<String, Vec<u8>>) -> Self {
        MetadataMap(
            wire.into_iter()
                .map(|(k, v)| (AttributeName::parse(&k), v))
                .collect(),
        )
    }
}

impl std::iter::FromIterator<(MetadataKey, Vec<u8>)> for MetadataMap {
    fn from_iter<I: IntoIterator<Item = (MetadataKey, Vec<u8>)>>(
        it: I,
    ) -> Self {
        MetadataMap(
            it.into_iter()
                .map(|(k, v)| (AttributeName::Known(k), v))
                .collect(),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn object_id_format() {
        let id = ObjectId(0x1234);
        assert_eq!("00000000000000000000000000001234", id.to_string());
        assert_eq!(id, id.to_string().parse::<ObjectId>().unwrap());
        assert!("1234".parse::<ObjectId>().is_err());
        assert!("0000000000000000000000000000123g"
            .parse::<ObjectId>()
            .is_err());

        let a = ObjectId::generate();
        let b = ObjectId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn attribute_names() {
        assert_eq!(
            AttributeName::Known(MetadataKey::Guid),
            AttributeName::parse("G")
        );
        assert_eq!(
            AttributeName::Extension("Q".to_owned()),
            AttributeName::parse("Q")
        );
        assert_eq!(
            AttributeName::Extension("GG".to_owned()),
            AttributeName::parse("GG")
        );
        for &key in MetadataKey::ALL {
            assert_eq!(Some(key), MetadataKey::from_letter(key.letter()));
        }
    }

    #[test]
    fn wire_form_preserves_unknown_attributes() {
        let mut map = MetadataMap::new();
        map.set(MetadataKey::Guid, "abc");
        map.set_raw(
            AttributeName::Extension("x-vendor".to_owned()),
            b"\x00\x01".to_vec(),
        );
        let back = MetadataMap::from_wire(map.to_wire());
        assert_eq!(map, back);
        assert!(!back.validate());

        let mut map = back;
        map.set(MetadataKey::MailboxGuid, "def");
        assert!(map.validate());
    }

    #[test]
    fn epoch_assignment() {
        let zero = SyncEpoch { uid_validity: 0 };
        assert!(!zero.is_assigned());
        assert_eq!(
            1000,
            SyncEpoch::next_after(zero, 1000).unwrap().uid_validity
        );
        let ahead = SyncEpoch { uid_validity: 5000 };
        assert_eq!(
            5001,
            SyncEpoch::next_after(ahead, 1000).unwrap().uid_validity
        );
        assert!(SyncEpoch::next_after(
            SyncEpoch {
                uid_validity: u32::MAX
            },
            0
        )
        .is_none());
    }
}
