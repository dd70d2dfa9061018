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

use chrono::prelude::*;
use log::info;

use super::handle::ObjectHandle;
use super::host::{DateField, IndexHost, SizeField};
use super::ops::MailTransaction;
use super::stream::{self, MailStream};
use super::{Mail, MailState};
use crate::codec::{self, AttributeValue, MailFlags};
use crate::model::{
    AttributeName, IndexRecord, MetadataKey, MetadataMap, ObjectId, Tier,
};
use crate::support::error::Error;

/// The format version written to new mail objects.
pub const MAIL_OBJECT_VERSION: &str = "0.1";

/// A message about to be saved.
#[derive(Clone, Debug, Default)]
pub struct NewMail<'a> {
    pub content: &'a [u8],
    /// The internal date; defaults to the save time.
    pub received_date: Option<i64>,
    pub flags: MailFlags,
    /// Any further attributes the caller already has, such as the POP3
    /// UIDL, the original mailbox, or external attachment references.
    /// Extension attributes are stored as-is.
    pub attributes: MetadataMap,
}

impl<'s, H: IndexHost> MailTransaction<'s, H> {
    /// Save `new` as the message `mail` in primary storage.
    ///
    /// Required attributes are always written; optional ones only if the
    /// storage's attribute set selects them. The new handle is registered in
    /// this transaction, so `mail` is left open and later opens of the same
    /// UID reuse it.
    pub fn save(
        &mut self,
        mail: &mut Mail,
        new: NewMail<'_>,
    ) -> Result<IndexRecord, Error> {
        let uid = mail.uid();
        if 0 != self.arena.refcount(uid) {
            return Err(Error::UidInUse(uid.0.get()));
        }

        let now = Utc::now().timestamp();
        let received = new.received_date.unwrap_or(now);

        let raw_refs =
            new.attributes.get(MetadataKey::ExtRefs).unwrap_or_default();
        let parts = stream::parse_ext_refs(raw_refs)?;
        let physical = stream::logical_size(new.content.len() as u64, &parts)
            .ok_or_else(|| Error::corrupt("X", raw_refs))?;
        let virtual_size = stream::virtual_size(MailStream::new(
            new.content,
            self.storage.attachments.clone(),
            parts,
            physical,
        )?)?;

        let mut metadata = new.attributes;
        if metadata.get(MetadataKey::Guid).is_none() {
            metadata.set(MetadataKey::Guid, ObjectId::generate().to_string());
        }
        metadata.set(MetadataKey::MailboxGuid, self.host.mailbox_guid());
        metadata.set(MetadataKey::Version, MAIL_OBJECT_VERSION);
        for &(key, ref value) in &[
            (MetadataKey::ReceivedTime, AttributeValue::Date(received)),
            (MetadataKey::SaveTime, AttributeValue::Date(now)),
            (MetadataKey::PhysicalSize, AttributeValue::Integer(physical)),
            (MetadataKey::VirtualSize, AttributeValue::Integer(virtual_size)),
            (
                MetadataKey::MailUid,
                AttributeValue::Integer(uid.0.get().into()),
            ),
            (MetadataKey::Flags, AttributeValue::Flags(new.flags)),
        ] {
            metadata.set(key, codec::encode(key, value)?);
        }

        let attributes = self.storage.attributes;
        let mut persisted = MetadataMap::new();
        for (name, value) in metadata.iter() {
            let keep = match *name {
                // Without the part references the content is incomplete
                AttributeName::Known(MetadataKey::ExtRefs) => true,
                AttributeName::Known(key) => attributes.should_persist(key),
                AttributeName::Extension(_) => true,
            };
            if keep {
                persisted.set_raw(name.clone(), value.to_vec());
            }
        }

        let object_id = ObjectId::generate();
        let primary = self.storage.tier(Tier::Primary)?;
        primary.create(
            &object_id.to_string(),
            &mut &new.content[..],
            &persisted,
        )?;

        self.arena.insert(
            uid,
            ObjectHandle::new(object_id, Tier::Primary, primary),
        );
        mail.state = MailState::Opened;

        let record = IndexRecord {
            object_id,
            alt_storage: false,
        };
        self.host.assign_record(uid, record);
        self.host.cache_size(uid, SizeField::Physical, physical);
        self.host.cache_size(uid, SizeField::Virtual, virtual_size);
        self.host.cache_date(uid, DateField::Received, received);
        self.host.cache_date(uid, DateField::Save, now);

        info!(
            "{} Saved uid={} as {} ({} bytes)",
            self.log_prefix, uid, object_id, physical
        );
        Ok(record)
    }
}
