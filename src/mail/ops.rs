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

use std::io::{self, Read, Seek, SeekFrom};

use log::{debug, error, info, warn};

use super::handle::{HandleArena, ObjectHandle, SharedInput};
use super::host::{DateField, IndexHost, SizeField};
use super::stream::{self, AttachmentRef, MailStream};
use super::{Mail, MailState, OpenOutcome, SpecialField, Storage};
use crate::codec::{self, AttributeValue, MailFlags};
use crate::model::{IndexRecord, MetadataKey, Tier, Uid};
use crate::store::{self, REFS_COUNTER};
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

/// The content of a message, as returned by `MailTransaction::get_stream`.
pub type ContentStream = MailStream<io::Take<SharedInput>>;

/// One access scope over a mailbox.
///
/// Handles opened within the transaction are shared between all `Mail`s
/// with the same UID and are closed once the last of them is closed.
pub struct MailTransaction<'s, H: IndexHost> {
    pub(super) storage: &'s Storage,
    pub(super) host: &'s mut H,
    pub(super) arena: HandleArena,
    pub(super) log_prefix: LogPrefix,
}

impl<'s, H: IndexHost> MailTransaction<'s, H> {
    pub fn new(storage: &'s Storage, host: &'s mut H) -> Self {
        MailTransaction {
            storage,
            host,
            arena: HandleArena::new(),
            log_prefix: storage.log_prefix.clone(),
        }
    }

    pub fn storage(&self) -> &'s Storage {
        self.storage
    }

    pub fn host(&self) -> &H {
        &*self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut *self.host
    }

    /// The number of distinct handles currently open.
    pub fn open_handles(&self) -> usize {
        self.arena.len()
    }

    /// The number of references held to the handle for `uid`.
    pub fn handle_refcount(&self, uid: Uid) -> u32 {
        self.arena.refcount(uid)
    }

    /// Open `mail`.
    ///
    /// If another `Mail` in this transaction already has the message open
    /// (including one that was just saved), its handle is shared.
    pub fn open(&mut self, mail: &mut Mail) -> Result<OpenOutcome, Error> {
        match mail.state {
            MailState::Opened => return Ok(OpenOutcome::Reused),
            MailState::Expunged => return Err(Error::ExpungedMessage),
            MailState::Unopened | MailState::Opening | MailState::Closed => {
            }
        }

        let uid = mail.uid();
        mail.state = MailState::Opening;
        if self.arena.acquire(uid) {
            mail.state = MailState::Opened;
            return Ok(OpenOutcome::Reused);
        }

        match self.open_object(uid) {
            Ok(handle) => {
                debug!(
                    "{} Opened uid={} as {} in {:?} storage",
                    self.log_prefix,
                    uid,
                    handle.object_id(),
                    handle.tier()
                );
                self.arena.insert(uid, handle);
                mail.state = MailState::Opened;
                Ok(OpenOutcome::Opened)
            }
            Err(Error::NxObject) => Err(self.handle_missing(mail)),
            Err(e) => {
                mail.state = MailState::Unopened;
                Err(e)
            }
        }
    }

    fn open_object(&mut self, uid: Uid) -> Result<ObjectHandle, Error> {
        if self.host.lookup_abort() {
            return Err(Error::LookupAborted);
        }

        let record = self.host.record(uid).ok_or(Error::NxObject)?;
        let tier = Tier::of_record(&record);
        let mut handle =
            ObjectHandle::new(record.object_id, tier, self.storage.tier(tier)?);
        // Open right away so that a vanished object is noticed here
        handle.input()?;
        Ok(handle)
    }

    fn handle_missing(&mut self, mail: &mut Mail) -> Error {
        let uid = mail.uid();
        mail.state = MailState::Expunged;

        if let Err(e) = self.host.refresh_view() {
            warn!(
                "{} Failed to refresh index view looking for uid={}: {}",
                self.log_prefix, uid, e
            );
        }

        if self.host.is_uid_expunged(uid) {
            info!(
                "{} uid={} was expunged by another session",
                self.log_prefix, uid
            );
            self.host.mark_expunged(uid);
            Error::ExpungedMessage
        } else {
            let reason = format!("backing object for uid={} is missing", uid);
            error!("{} {}", self.log_prefix, reason);
            self.host.set_corrupted(&reason);
            Error::LostMessage(uid.0.get())
        }
    }

    /// Close `mail`, releasing its reference to the shared handle.
    ///
    /// The host is told about the close before the last reference goes
    /// away.
    pub fn close(&mut self, mail: &mut Mail) {
        if MailState::Opened != mail.state {
            return;
        }

        let uid = mail.uid();
        if 1 == self.arena.refcount(uid) {
            self.host.mail_closed(uid);
        }
        self.arena.release(uid);
        mail.state = MailState::Closed;
    }

    fn ensure_open(&mut self, mail: &mut Mail) -> Result<(), Error> {
        if MailState::Opened == mail.state {
            Ok(())
        } else {
            self.open(mail).map(|_| ())
        }
    }

    /// Open `mail` if needed and return its handle.
    fn handle(&mut self, mail: &mut Mail) -> Result<&mut ObjectHandle, Error> {
        self.ensure_open(mail)?;
        let uid = mail.uid();
        self.arena
            .get_mut(uid)
            .ok_or_else(|| Error::NxRecord(uid.0.get()))
    }

    /// Return the decoded value stored under `key` on `mail`'s object.
    ///
    /// A value which is present but cannot be decoded is an error, and
    /// raises the host's corruption signal.
    pub fn read_metadata(
        &mut self,
        mail: &mut Mail,
        key: MetadataKey,
    ) -> Result<Option<AttributeValue>, Error> {
        self.ensure_open(mail)?;
        let uid = mail.uid();
        let handle = self
            .arena
            .get_mut(uid)
            .ok_or_else(|| Error::NxRecord(uid.0.get()))?;

        let metadata = match handle.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                return Err(note_failure(
                    &mut *self.host,
                    &self.log_prefix,
                    uid,
                    e,
                ))
            }
        };

        let raw = match metadata.get(key) {
            Some(raw) => raw,
            None => return Ok(None),
        };

        match codec::decode(key, raw) {
            Some(value) => Ok(Some(value)),
            None => {
                let e = Error::corrupt(key, raw);
                Err(note_failure(&mut *self.host, &self.log_prefix, uid, e))
            }
        }
    }

    fn ext_refs(
        &mut self,
        mail: &mut Mail,
    ) -> Result<Vec<AttachmentRef>, Error> {
        match self.read_metadata(mail, MetadataKey::ExtRefs)? {
            Some(AttributeValue::String(s)) => stream::parse_ext_refs(
                s.as_bytes(),
            )
            .map_err(|e| {
                note_failure(&mut *self.host, &self.log_prefix, mail.uid(), e)
            }),
            _ => Ok(vec![]),
        }
    }

    pub fn get_physical_size(&mut self, mail: &mut Mail) -> Result<u64, Error> {
        let uid = mail.uid();
        if let Some(size) = self.host.cached_size(uid, SizeField::Physical) {
            return Ok(size);
        }
        if self.host.lookup_abort() {
            return Err(Error::LookupAborted);
        }

        let size = match self.read_metadata(mail, MetadataKey::PhysicalSize)? {
            Some(AttributeValue::Integer(size)) => size,
            _ => {
                let parts = self.ext_refs(mail)?;
                let content_size = self.handle(mail)?.stat()?.size;
                match stream::logical_size(content_size, &parts) {
                    Some(size) => size,
                    None => {
                        let raw = stream::format_ext_refs(&parts);
                        return Err(self.note_failure(
                            uid,
                            Error::corrupt("X", raw.as_bytes()),
                        ));
                    }
                }
            }
        };

        self.host.cache_size(uid, SizeField::Physical, size);
        Ok(size)
    }

    /// Return the size of the message with all line endings as CRLF.
    pub fn get_virtual_size(&mut self, mail: &mut Mail) -> Result<u64, Error> {
        let uid = mail.uid();
        if let Some(size) = self.host.cached_size(uid, SizeField::Virtual) {
            return Ok(size);
        }
        if self.host.lookup_abort() {
            return Err(Error::LookupAborted);
        }

        let size = match self.read_metadata(mail, MetadataKey::VirtualSize)? {
            Some(AttributeValue::Integer(size)) => size,
            _ => self.compute_virtual_size(mail)?,
        };

        self.host.cache_size(uid, SizeField::Virtual, size);
        Ok(size)
    }

    fn compute_virtual_size(&mut self, mail: &mut Mail) -> Result<u64, Error> {
        let physical = self.get_physical_size(mail)?;
        let parts = self.ext_refs(mail)?;
        let attachments = self.storage.attachments.clone();
        let handle = self.handle(mail)?;
        let content_size = handle.stat()?.size;
        let input = handle.input()?;

        input.with_position_restored(|inner| -> Result<u64, Error> {
            let offset = inner.content_offset();
            inner.seek(SeekFrom::Start(offset))?;
            let stream = MailStream::new(
                inner.by_ref().take(content_size),
                attachments,
                parts,
                physical,
            )?;
            Ok(stream::virtual_size(stream)?)
        })
    }

    pub fn get_received_date(&mut self, mail: &mut Mail) -> Result<i64, Error> {
        self.get_date(mail, DateField::Received, MetadataKey::ReceivedTime)
    }

    pub fn get_save_date(&mut self, mail: &mut Mail) -> Result<i64, Error> {
        self.get_date(mail, DateField::Save, MetadataKey::SaveTime)
    }

    fn get_date(
        &mut self,
        mail: &mut Mail,
        field: DateField,
        key: MetadataKey,
    ) -> Result<i64, Error> {
        let uid = mail.uid();
        if let Some(date) = self.host.cached_date(uid, field) {
            return Ok(date);
        }
        if self.host.lookup_abort() {
            return Err(Error::LookupAborted);
        }

        let date = match self.read_metadata(mail, key)? {
            Some(AttributeValue::Date(date)) => date,
            _ => self.handle(mail)?.stat()?.mtime,
        };

        self.host.cache_date(uid, field, date);
        Ok(date)
    }

    /// Return a reader over the full content of `mail`, with any external
    /// attachment parts stitched back in.
    ///
    /// The stream shares its cursor with the open handle; creating a new
    /// stream for the same message rewinds it.
    pub fn get_stream(
        &mut self,
        mail: &mut Mail,
    ) -> Result<ContentStream, Error> {
        if self.host.lookup_abort() {
            return Err(Error::LookupAborted);
        }

        let physical = self.get_physical_size(mail)?;
        let parts = self.ext_refs(mail)?;
        let attachments = self.storage.attachments.clone();
        let handle = self.handle(mail)?;
        let content_size = handle.stat()?.size;
        let mut input = handle.input()?;

        let offset = input.borrow_mut().content_offset();
        input.seek(SeekFrom::Start(offset))?;
        MailStream::new(input.take(content_size), attachments, parts, physical)
    }

    pub fn get_special(
        &mut self,
        mail: &mut Mail,
        field: SpecialField,
    ) -> Result<String, Error> {
        match field {
            SpecialField::Refcount => {
                let handle = self.handle(mail)?;
                let counters = handle.store().counters(&handle.name())?;
                let refs = counters.get(REFS_COUNTER).copied().unwrap_or(0);
                Ok(store::refcount_from_counter(refs).to_string())
            }

            SpecialField::Pop3Uidl => {
                if self.host.header_has_pop3_uidls() {
                    self.optional_string(mail, MetadataKey::Pop3Uidl)
                } else {
                    Ok(String::new())
                }
            }

            SpecialField::Pop3Order => {
                if self.host.header_has_pop3_orders() {
                    self.optional_string(mail, MetadataKey::Pop3Order)
                } else {
                    Ok(String::new())
                }
            }

            SpecialField::Guid => self.required_string(mail, MetadataKey::Guid),
            SpecialField::MailboxGuid => {
                self.required_string(mail, MetadataKey::MailboxGuid)
            }
        }
    }

    fn optional_string(
        &mut self,
        mail: &mut Mail,
        key: MetadataKey,
    ) -> Result<String, Error> {
        Ok(match self.read_metadata(mail, key)? {
            None => String::new(),
            Some(AttributeValue::String(s)) => s,
            Some(AttributeValue::Integer(n)) => n.to_string(),
            Some(AttributeValue::Date(d)) => d.to_string(),
            Some(AttributeValue::Flags(f)) => codec::flags_to_string(f),
        })
    }

    fn required_string(
        &mut self,
        mail: &mut Mail,
        key: MetadataKey,
    ) -> Result<String, Error> {
        match self.read_metadata(mail, key)? {
            Some(AttributeValue::String(s)) => Ok(s),
            _ => {
                let e = Error::corrupt(key, b"");
                Err(note_failure(
                    &mut *self.host,
                    &self.log_prefix,
                    mail.uid(),
                    e,
                ))
            }
        }
    }

    /// Write `value` under `key` on `mail`'s object.
    ///
    /// Keys not selected by the storage's attribute set are not persisted;
    /// returns whether anything was written. Later reads through this
    /// transaction see the new value.
    pub fn update_metadata(
        &mut self,
        mail: &mut Mail,
        key: MetadataKey,
        value: &AttributeValue,
    ) -> Result<bool, Error> {
        if !self.storage.attributes.should_persist(key) {
            return Ok(false);
        }

        let raw = codec::encode(key, value)?;
        let handle = self.handle(mail)?;
        handle
            .store()
            .set_attribute(&handle.name(), &key.into(), &raw)?;
        handle.note_written(key, raw);
        Ok(true)
    }

    /// Persist `flags` on `mail`'s object, if flags are among the selected
    /// attributes.
    pub fn update_flags(
        &mut self,
        mail: &mut Mail,
        flags: MailFlags,
    ) -> Result<bool, Error> {
        if !self.storage.attributes.is_mail_attribute(MetadataKey::Flags) {
            return Ok(false);
        }

        self.update_metadata(
            mail,
            MetadataKey::Flags,
            &AttributeValue::Flags(flags),
        )
    }

    /// Add a reference to `mail`'s object so that another mailbox can
    /// point at it.
    ///
    /// Returns the record the other mailbox should store, and the new total
    /// number of references.
    pub fn share(
        &mut self,
        mail: &mut Mail,
    ) -> Result<(IndexRecord, u64), Error> {
        let handle = self.handle(mail)?;
        let refs = store::share_object(&**handle.store(), &handle.name())?;
        let record = IndexRecord {
            object_id: handle.object_id(),
            alt_storage: Tier::Alternate == handle.tier(),
        };
        info!(
            "{} Shared {} (now {} references)",
            self.log_prefix, record.object_id, refs
        );
        Ok((record, refs))
    }

    /// Repoint any open handle for `uid` after its object moved to `tier`.
    pub(crate) fn note_relocated(
        &mut self,
        uid: Uid,
        tier: Tier,
    ) -> Result<(), Error> {
        if let Some(handle) = self.arena.get_mut(uid) {
            handle.relocate(tier, self.storage.tier(tier)?);
        }
        Ok(())
    }

    pub(crate) fn note_failure(&mut self, uid: Uid, e: Error) -> Error {
        note_failure(&mut *self.host, &self.log_prefix, uid, e)
    }
}

/// Raise the host's corruption signal if `e` calls for it, then hand `e`
/// back.
fn note_failure(
    host: &mut impl IndexHost,
    log_prefix: &LogPrefix,
    uid: Uid,
    e: Error,
) -> Error {
    if e.needs_attention() {
        let reason = format!("uid={}: {}", uid, e);
        error!("{} {}", log_prefix, reason);
        host.set_corrupted(&reason);
    }
    e
}
