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

use std::fmt;

use crate::model::MetadataKey;

/// The selector used when none is configured.
///
/// Flags, private flags and keywords are left out, so by default those live
/// only in the host index.
pub const DEFAULT_MUTABLE_ATTRIBUTES: &str = "MGPORZVIBUASX";

/// The set of attributes which are persisted on mail objects.
///
/// Built from a selector string of attribute letters. Required attributes
/// are written regardless of the selector.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MutableAttributes(u32);

impl MutableAttributes {
    /// Build the set from `selector`, ignoring any character that does not
    /// name an attribute. `None` selects `DEFAULT_MUTABLE_ATTRIBUTES`.
    pub fn new(selector: Option<&str>) -> Self {
        let selector = selector.unwrap_or(DEFAULT_MUTABLE_ATTRIBUTES);
        MutableAttributes(
            selector
                .chars()
                .filter_map(MetadataKey::from_letter)
                .fold(0, |acc, key| acc | bit(key)),
        )
    }

    pub fn is_mail_attribute(self, key: MetadataKey) -> bool {
        0 != self.0 & bit(key)
    }

    /// Whether `key` must be written when saving a mail object.
    pub fn should_persist(self, key: MetadataKey) -> bool {
        MetadataKey::REQUIRED.contains(&key) || self.is_mail_attribute(key)
    }

    pub fn iter(self) -> impl Iterator<Item = MetadataKey> {
        MetadataKey::ALL
            .iter()
            .copied()
            .filter(move |&k| self.is_mail_attribute(k))
    }
}

impl Default for MutableAttributes {
    fn default() -> Self {
        MutableAttributes::new(None)
    }
}

impl fmt::Debug for MutableAttributes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MutableAttributes(")?;
        for key in self.iter() {
            write!(f, "{}", key)?;
        }
        write!(f, ")")
    }
}

fn bit(key: MetadataKey) -> u32 {
    1 << (key as u32)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn explicit_selector() {
        let attrs = MutableAttributes::new(Some("MGP"));
        assert!(attrs.is_mail_attribute(MetadataKey::MailboxGuid));
        assert!(attrs.is_mail_attribute(MetadataKey::Guid));
        assert!(attrs.is_mail_attribute(MetadataKey::Pop3Uidl));
        assert!(!attrs.is_mail_attribute(MetadataKey::OrigMailbox));
        assert!(!attrs.is_mail_attribute(MetadataKey::Flags));
        assert_eq!("MutableAttributes(MGP)", format!("{:?}", attrs));
    }

    #[test]
    fn default_selector() {
        let attrs = MutableAttributes::new(None);
        assert!(attrs.is_mail_attribute(MetadataKey::Pop3Uidl));
        assert!(attrs.is_mail_attribute(MetadataKey::OrigMailbox));
        assert!(!attrs.is_mail_attribute(MetadataKey::Flags));
        assert_eq!(attrs, MutableAttributes::default());
    }

    #[test]
    fn unknown_letters_ignored() {
        let attrs = MutableAttributes::new(Some("?G!q F"));
        assert_eq!(
            vec![MetadataKey::Guid, MetadataKey::Flags],
            attrs.iter().collect::<Vec<_>>()
        );
        assert!(MutableAttributes::new(Some("")).iter().next().is_none());
    }

    #[test]
    fn required_always_persisted() {
        let attrs = MutableAttributes::new(Some(""));
        assert!(attrs.should_persist(MetadataKey::Guid));
        assert!(attrs.should_persist(MetadataKey::MailboxGuid));
        assert!(!attrs.should_persist(MetadataKey::Pop3Uidl));
    }
}
