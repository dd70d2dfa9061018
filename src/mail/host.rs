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

//! The interface to the mailbox index which owns sequence numbers, UIDs,
//! and the cached per-message fields.

use crate::model::{IndexRecord, Uid};
use crate::support::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SizeField {
    Physical,
    Virtual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DateField {
    Received,
    Save,
}

/// Operations the mailbox index provides to this backend.
///
/// The index is authoritative for which UIDs exist and which have been
/// expunged; this backend is authoritative for the objects themselves.
pub trait IndexHost {
    /// Return the backend record for `uid`, if the index has one.
    fn record(&self, uid: Uid) -> Option<IndexRecord>;

    /// Associate `record` with `uid`, e.g. after saving a new message.
    fn assign_record(&mut self, uid: Uid, record: IndexRecord);

    fn cached_size(&self, uid: Uid, field: SizeField) -> Option<u64>;
    fn cache_size(&mut self, uid: Uid, field: SizeField, size: u64);
    fn cached_date(&self, uid: Uid, field: DateField) -> Option<i64>;
    fn cache_date(&mut self, uid: Uid, field: DateField, date: i64);

    /// Whether the current lookup must be answered from the cache alone.
    ///
    /// When this returns true, anything that would need to touch the object
    /// store fails with `LookupAborted` instead.
    fn lookup_abort(&self) -> bool;

    /// Re-read the index so that expunges by other sessions become visible.
    fn refresh_view(&mut self) -> Result<(), Error>;

    fn is_uid_expunged(&self, uid: Uid) -> bool;

    /// Record that `uid` is gone, so the host can tell clients.
    fn mark_expunged(&mut self, uid: Uid);

    /// Raise the "mailbox needs attention" signal.
    fn set_corrupted(&mut self, reason: &str);

    /// Called when the last reference to a message is about to be closed,
    /// before the backing object is released.
    fn mail_closed(&mut self, uid: Uid);

    /// Update the alternate-storage flag in the record for `uid`.
    fn update_alt_flag(&mut self, uid: Uid, alt_storage: bool)
        -> Result<(), Error>;

    /// Whether the index header declares that this mailbox has POP3 UIDLs.
    fn header_has_pop3_uidls(&self) -> bool;

    /// Whether the index header declares that this mailbox has POP3 order
    /// numbers.
    fn header_has_pop3_orders(&self) -> bool;

    fn mailbox_guid(&self) -> String;

    fn uid_validity(&self) -> u32;
    fn set_uid_validity(&mut self, uid_validity: u32);

    /// Open a sync transaction. `force` ignores any marker claiming the
    /// index is already in sync.
    fn sync_begin(&mut self, force: bool) -> Result<(), Error>;

    /// Return the records of messages expunged in the index since the last
    /// sync point.
    fn sync_expunges(&mut self) -> Result<Vec<(Uid, IndexRecord)>, Error>;

    /// Commit the sync transaction and advance the sync point.
    fn sync_commit(&mut self, fsync: bool) -> Result<(), Error>;

    /// Discard the sync transaction. Must not fail.
    fn sync_rollback(&mut self);

    /// Forget every record, in preparation for a rebuild.
    fn rebuild_reset(&mut self);

    /// Re-register a record discovered during a rebuild. Called in
    /// ascending UID order.
    fn rebuild_add(&mut self, uid: Uid, record: IndexRecord);
}
