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

//! Shared fixtures for tests that drive the translator, the migrator and
//! the sync engine.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::rc::Rc;

pub use super::host::{DateField, IndexHost, SizeField};
pub use super::{Mail, MailState, MailTransaction, OpenOutcome, Storage};
pub use crate::model::*;
pub use crate::store::{MemoryStore, ObjectStore};
pub use crate::support::error::Error;
pub use crate::support::log_prefix::LogPrefix;

pub const MAILBOX_GUID: &str = "0123456789abcdef0123456789abcdef";

/// An in-memory stand-in for the mailbox index.
#[derive(Debug, Default)]
pub struct FakeHost {
    pub records: BTreeMap<Uid, IndexRecord>,
    pub sizes: HashMap<(Uid, SizeField), u64>,
    pub dates: HashMap<(Uid, DateField), i64>,
    /// UIDs the index considers expunged.
    pub expunged: BTreeSet<Uid>,
    /// UIDs expunged since the last sync point.
    pub pending_expunges: BTreeSet<Uid>,
    /// UIDs the host has been told are gone.
    pub marked_expunged: Vec<Uid>,
    pub corrupted: Vec<String>,
    pub closed: Vec<Uid>,
    pub lookup_abort: bool,
    pub fail_alt_flag_updates: bool,
    pub refreshes: u32,
    pub pop3_uidls: bool,
    pub pop3_orders: bool,
    pub uid_validity: u32,
    /// If non-zero, the next this-many calls to `sync_expunges` bump the
    /// UID validity, as if another session had renumbered the mailbox.
    pub bump_validity_during_sync: u32,
    pub in_sync: bool,
    pub commits: u32,
    pub fsync_commits: u32,
    pub rollbacks: u32,
    pub rebuilt: Vec<(Uid, IndexRecord)>,
}

impl FakeHost {
    pub fn new() -> Self {
        FakeHost {
            uid_validity: 1,
            ..FakeHost::default()
        }
    }

    /// Expunge `uid` in the index, as another session would.
    pub fn expunge(&mut self, uid: Uid) {
        self.expunged.insert(uid);
        self.pending_expunges.insert(uid);
    }
}

impl IndexHost for FakeHost {
    fn record(&self, uid: Uid) -> Option<IndexRecord> {
        if self.expunged.contains(&uid) {
            None
        } else {
            self.records.get(&uid).copied()
        }
    }

    fn assign_record(&mut self, uid: Uid, record: IndexRecord) {
        self.records.insert(uid, record);
    }

    fn cached_size(&self, uid: Uid, field: SizeField) -> Option<u64> {
        self.sizes.get(&(uid, field)).copied()
    }

    fn cache_size(&mut self, uid: Uid, field: SizeField, size: u64) {
        self.sizes.insert((uid, field), size);
    }

    fn cached_date(&self, uid: Uid, field: DateField) -> Option<i64> {
        self.dates.get(&(uid, field)).copied()
    }

    fn cache_date(&mut self, uid: Uid, field: DateField, date: i64) {
        self.dates.insert((uid, field), date);
    }

    fn lookup_abort(&self) -> bool {
        self.lookup_abort
    }

    fn refresh_view(&mut self) -> Result<(), Error> {
        self.refreshes += 1;
        Ok(())
    }

    fn is_uid_expunged(&self, uid: Uid) -> bool {
        self.expunged.contains(&uid)
    }

    fn mark_expunged(&mut self, uid: Uid) {
        self.marked_expunged.push(uid);
    }

    fn set_corrupted(&mut self, reason: &str) {
        self.corrupted.push(reason.to_owned());
    }

    fn mail_closed(&mut self, uid: Uid) {
        self.closed.push(uid);
    }

    fn update_alt_flag(
        &mut self,
        uid: Uid,
        alt_storage: bool,
    ) -> Result<(), Error> {
        if self.fail_alt_flag_updates {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "index write failed",
            )));
        }

        let record = self
            .records
            .get_mut(&uid)
            .ok_or_else(|| Error::NxRecord(uid.0.get()))?;
        record.alt_storage = alt_storage;
        Ok(())
    }

    fn header_has_pop3_uidls(&self) -> bool {
        self.pop3_uidls
    }

    fn header_has_pop3_orders(&self) -> bool {
        self.pop3_orders
    }

    fn mailbox_guid(&self) -> String {
        MAILBOX_GUID.to_owned()
    }

    fn uid_validity(&self) -> u32 {
        self.uid_validity
    }

    fn set_uid_validity(&mut self, uid_validity: u32) {
        self.uid_validity = uid_validity;
    }

    fn sync_begin(&mut self, _force: bool) -> Result<(), Error> {
        assert!(!self.in_sync, "nested sync transaction");
        self.in_sync = true;
        Ok(())
    }

    fn sync_expunges(&mut self) -> Result<Vec<(Uid, IndexRecord)>, Error> {
        if self.bump_validity_during_sync > 0 {
            self.bump_validity_during_sync -= 1;
            self.uid_validity += 1;
        }

        Ok(self
            .pending_expunges
            .iter()
            .filter_map(|uid| self.records.get(uid).map(|r| (*uid, *r)))
            .collect())
    }

    fn sync_commit(&mut self, fsync: bool) -> Result<(), Error> {
        assert!(self.in_sync);
        self.in_sync = false;
        self.commits += 1;
        if fsync {
            self.fsync_commits += 1;
        }

        for uid in std::mem::take(&mut self.pending_expunges) {
            self.records.remove(&uid);
        }
        Ok(())
    }

    fn sync_rollback(&mut self) {
        self.in_sync = false;
        self.rollbacks += 1;
    }

    fn rebuild_reset(&mut self) {
        self.records.clear();
        self.rebuilt.clear();
    }

    fn rebuild_add(&mut self, uid: Uid, record: IndexRecord) {
        self.records.insert(uid, record);
        self.rebuilt.push((uid, record));
    }
}

/// Storage over fresh memory stores, with all three tiers configured.
pub fn memory_storage() -> (Storage, MemoryStore, MemoryStore, MemoryStore) {
    crate::init_test_log();

    let primary = MemoryStore::new("primary");
    let alternate = MemoryStore::new("alternate");
    let attachments = MemoryStore::new("attachments");
    let mut storage = Storage::new(
        LogPrefix::new("test".to_owned()),
        Rc::new(primary.clone()),
    );
    storage.alternate = Some(Rc::new(alternate.clone()));
    storage.attachments = Some(Rc::new(attachments.clone()));
    (storage, primary, alternate, attachments)
}

/// Attributes a well-formed mail object carries.
pub fn mail_attributes(uid: u32) -> MetadataMap {
    let mut md = MetadataMap::new();
    md.set(MetadataKey::Guid, format!("guid-{}", uid));
    md.set(MetadataKey::MailboxGuid, MAILBOX_GUID);
    md.set(MetadataKey::MailUid, uid.to_string());
    md
}

/// Put a mail object directly into `store` and register it with `host`.
pub fn put_mail(
    host: &mut FakeHost,
    store: &dyn ObjectStore,
    uid: u32,
    content: &[u8],
    attributes: &MetadataMap,
    alt_storage: bool,
) -> ObjectId {
    let object_id = ObjectId::generate();
    store
        .create(&object_id.to_string(), &mut &content[..], attributes)
        .unwrap();
    host.records.insert(
        Uid::u(uid),
        IndexRecord {
            object_id,
            alt_storage,
        },
    );
    object_id
}

pub fn mail(uid: u32) -> Mail {
    Mail::new(MailIdentity {
        uid: Uid::u(uid),
        seq: Seqnum::u(uid),
    })
}
