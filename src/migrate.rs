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

//! Copying and moving objects between the primary and alternate tiers.
//!
//! A copy carries the content, every attribute (including ones we don't
//! understand) and every counter. A move is a copy followed by removal of
//! the source, and never removes the source unless the copy is known to be
//! complete.

use std::io::{Read, Seek, SeekFrom};

use log::{error, info, warn};

use crate::mail::{IndexHost, Mail, MailTransaction};
use crate::model::Tier;
use crate::store::{self, ObjectStat, ObjectStore};
use crate::support::error::Error;

/// Copy `src` in `from` to `dest` in `to`.
///
/// On failure, `src` is untouched and no partial `dest` is left behind
/// (unless `dest` already existed, in which case it is not ours to remove).
pub fn copy_object(
    src: &str,
    dest: &str,
    from: &dyn ObjectStore,
    to: &dyn ObjectStore,
) -> Result<ObjectStat, Error> {
    let stat = from.stat(src)?;
    let attributes = from.get_attributes(src)?;
    let counters = from.counters(src)?;
    let mut input = from.open(src)?;
    let offset = input.content_offset();
    input.seek(SeekFrom::Start(offset))?;
    let mut content = input.take(stat.size);

    let result = (|| -> Result<ObjectStat, Error> {
        to.create(dest, &mut content, &attributes)?;
        // Replayed as adds so that a concurrent adjustment to the
        // destination is never lost
        for (counter, &value) in &counters {
            if 0 != value {
                to.counter_add(dest, counter, value)?;
            }
        }

        let copied = to.stat(dest)?;
        if copied.size != stat.size {
            return Err(Error::CorruptObject(
                dest.to_owned(),
                format!(
                    "copy has {} bytes, expected {}",
                    copied.size, stat.size
                ),
            ));
        }
        Ok(copied)
    })();

    match result {
        Ok(copied) => Ok(copied),
        Err(Error::ObjectExists) => Err(Error::ObjectExists),
        Err(e) => {
            warn!(
                "{}: copying {} to {}:{} failed: {}",
                from.name(),
                src,
                to.name(),
                dest,
                e
            );
            match to.remove(dest) {
                Ok(()) | Err(Error::NxObject) => (),
                Err(e2) => error!(
                    "{}: failed to remove partial copy {}: {}",
                    to.name(),
                    dest,
                    e2
                ),
            }
            Err(e)
        }
    }
}

/// Move `name` from `from` to `to`.
///
/// If the copy succeeds but the source cannot be removed, both copies are
/// kept and `Inconsistent` is returned.
pub fn move_object(
    name: &str,
    from: &dyn ObjectStore,
    to: &dyn ObjectStore,
) -> Result<(), Error> {
    match copy_object(name, name, from, to) {
        Ok(_) => (),
        // Left behind by an earlier move whose delete phase failed
        Err(Error::ObjectExists) if is_same_object(name, from, to)? => {
            info!(
                "{}: {} already copied to {}, finishing the move",
                from.name(),
                name,
                to.name()
            );
        }
        Err(e) => return Err(e),
    }

    if let Err(e) = from.remove(name) {
        error!(
            "{}: {} copied to {} but the original could not be removed: {}",
            from.name(),
            name,
            to.name(),
            e
        );
        return Err(Error::Inconsistent(name.to_owned(), e.to_string()));
    }

    info!("{}: moved {} to {}", from.name(), name, to.name());
    Ok(())
}

/// Whether `name` in `to` has the same content, attributes and non-zero
/// counters as `name` in `from`.
fn is_same_object(
    name: &str,
    from: &dyn ObjectStore,
    to: &dyn ObjectStore,
) -> Result<bool, Error> {
    let nonzero_counters = |store: &dyn ObjectStore| {
        store.counters(name).map(|counters| {
            counters
                .into_iter()
                .filter(|&(_, v)| 0 != v)
                .collect::<Vec<_>>()
        })
    };

    Ok(from.stat(name)?.size == to.stat(name)?.size
        && from.get_attributes(name)? == to.get_attributes(name)?
        && nonzero_counters(from)? == nonzero_counters(to)?
        && store::read_all(from, name)? == store::read_all(to, name)?)
}

fn direction<'a>(
    primary: &'a dyn ObjectStore,
    alt: &'a dyn ObjectStore,
    inverse: bool,
) -> (&'a dyn ObjectStore, &'a dyn ObjectStore) {
    if inverse {
        (alt, primary)
    } else {
        (primary, alt)
    }
}

/// Copy `src` from primary to alternate storage as `dest`, or the other way
/// around if `inverse`.
pub fn copy_to_alt(
    src: &str,
    dest: &str,
    primary: &dyn ObjectStore,
    alt: &dyn ObjectStore,
    inverse: bool,
) -> Result<(), Error> {
    let (from, to) = direction(primary, alt, inverse);
    copy_object(src, dest, from, to).map(|_| ())
}

/// Move `name` from primary to alternate storage, or the other way around
/// if `inverse`.
pub fn move_to_alt(
    name: &str,
    primary: &dyn ObjectStore,
    alt: &dyn ObjectStore,
    inverse: bool,
) -> Result<(), Error> {
    let (from, to) = direction(primary, alt, inverse);
    move_object(name, from, to)
}

pub fn move_mail_to_alt<H: IndexHost>(
    txn: &mut MailTransaction<'_, H>,
    mail: &Mail,
) -> Result<(), Error> {
    move_mail(txn, mail, Tier::Alternate)
}

pub fn move_mail_from_alt<H: IndexHost>(
    txn: &mut MailTransaction<'_, H>,
    mail: &Mail,
) -> Result<(), Error> {
    move_mail(txn, mail, Tier::Primary)
}

/// Move the object behind `mail` to `to`, then update the index record and
/// any open handle to match.
fn move_mail<H: IndexHost>(
    txn: &mut MailTransaction<'_, H>,
    mail: &Mail,
    to: Tier,
) -> Result<(), Error> {
    let uid = mail.uid();
    let record = txn
        .host()
        .record(uid)
        .ok_or_else(|| Error::NxRecord(uid.0.get()))?;
    let from = Tier::of_record(&record);
    if from == to {
        return Ok(());
    }

    let storage = txn.storage();
    let src = storage.tier(from)?;
    let dst = storage.tier(to)?;
    let name = record.object_id.to_string();
    if let Err(e) = move_object(&name, &*src, &*dst) {
        return Err(txn.note_failure(uid, e));
    }

    // The object has moved whatever the index says, so open handles follow
    // it regardless
    let flagged = txn.host_mut().update_alt_flag(uid, Tier::Alternate == to);
    txn.note_relocated(uid, to)?;
    if let Err(e) = flagged {
        error!(
            "{}: {} moved to {:?} storage but the index was not updated: {}",
            src.name(),
            name,
            to,
            e
        );
        return Err(
            txn.note_failure(uid, Error::Inconsistent(name, e.to_string()))
        );
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use super::*;
    use crate::mail::test_prelude::*;
    use crate::store::faulty::FaultyStore;
    use crate::store::{self, REFS_COUNTER};

    fn snapshot(
        store: &dyn ObjectStore,
        name: &str,
    ) -> (Vec<u8>, MetadataMap, Vec<(String, i64)>) {
        (
            store::read_all(store, name).unwrap(),
            store.get_attributes(name).unwrap(),
            store.counters(name).unwrap().into_iter().collect(),
        )
    }

    fn source_object(store: &dyn ObjectStore) -> String {
        let mut md = mail_attributes(1);
        md.set_raw(
            AttributeName::Extension("x-vendor".to_owned()),
            b"\x00opaque".to_vec(),
        );
        store.create("obj", &mut &b"some content"[..], &md).unwrap();
        store.counter_add("obj", REFS_COUNTER, 2).unwrap();
        "obj".to_owned()
    }

    #[test]
    fn copy_carries_everything() {
        crate::init_test_log();
        let primary = MemoryStore::new("primary");
        let alt = MemoryStore::new("alt");
        let name = source_object(&primary);
        let before = snapshot(&primary, &name);

        copy_to_alt(&name, "copy", &primary, &alt, false).unwrap();
        assert_eq!(before, snapshot(&alt, "copy"));
        assert_eq!(before, snapshot(&primary, &name));

        // Inverse goes the other way
        copy_to_alt("copy", "back", &primary, &alt, true).unwrap();
        assert_eq!(before, snapshot(&primary, "back"));

        assert_matches!(
            Err(Error::ObjectExists),
            copy_to_alt(&name, "copy", &primary, &alt, false)
        );
        // The existing destination is not ours to clean up
        assert_eq!(before, snapshot(&alt, "copy"));
    }

    #[test]
    fn failed_copy_leaves_source_alone() {
        crate::init_test_log();
        let primary = MemoryStore::new("primary");
        let alt = FaultyStore::new(Rc::new(MemoryStore::new("alt")));
        let name = source_object(&primary);
        let before = snapshot(&primary, &name);

        alt.faults.partial_create.set(true);
        assert!(move_to_alt(&name, &primary, &alt, false).is_err());
        assert_eq!(before, snapshot(&primary, &name));
        assert_matches!(Err(Error::NxObject), alt.stat(&name));

        alt.faults.partial_create.set(false);
        alt.faults.counter_add.set(true);
        assert!(move_to_alt(&name, &primary, &alt, false).is_err());
        assert_eq!(before, snapshot(&primary, &name));
        assert_matches!(Err(Error::NxObject), alt.stat(&name));
    }

    #[test]
    fn failed_delete_keeps_both_copies() {
        crate::init_test_log();
        let primary = FaultyStore::new(Rc::new(MemoryStore::new("primary")));
        let alt = MemoryStore::new("alt");
        let name = source_object(&primary);
        let before = snapshot(&primary, &name);

        primary.faults.remove.set(true);
        assert_matches!(
            Err(Error::Inconsistent(..)),
            move_to_alt(&name, &primary, &alt, false)
        );
        assert_eq!(before, snapshot(&primary, &name));
        assert_eq!(before, snapshot(&alt, &name));

        // Once the source can be removed, retrying completes the move
        primary.faults.remove.set(false);
        move_to_alt(&name, &primary, &alt, false).unwrap();
        assert_matches!(Err(Error::NxObject), primary.stat(&name));
        assert_eq!(before, snapshot(&alt, &name));
    }

    #[test]
    fn retry_does_not_delete_over_different_copy() {
        crate::init_test_log();
        let primary = MemoryStore::new("primary");
        let alt = MemoryStore::new("alt");
        let name = source_object(&primary);
        let before = snapshot(&primary, &name);
        alt.create(&name, &mut &b"something else"[..], &MetadataMap::new())
            .unwrap();

        assert_matches!(
            Err(Error::ObjectExists),
            move_to_alt(&name, &primary, &alt, false)
        );
        assert_eq!(before, snapshot(&primary, &name));
    }

    #[test]
    fn successful_move_and_back() {
        crate::init_test_log();
        let primary = MemoryStore::new("primary");
        let alt = MemoryStore::new("alt");
        let name = source_object(&primary);
        let before = snapshot(&primary, &name);

        move_to_alt(&name, &primary, &alt, false).unwrap();
        assert_matches!(Err(Error::NxObject), primary.stat(&name));
        assert_eq!(before, snapshot(&alt, &name));

        move_to_alt(&name, &primary, &alt, true).unwrap();
        assert_matches!(Err(Error::NxObject), alt.stat(&name));
        assert_eq!(before, snapshot(&primary, &name));
    }

    #[test]
    fn mail_moves_update_index() {
        let (storage, primary, alternate, _) = memory_storage();
        let mut host = FakeHost::new();
        let oid = put_mail(
            &mut host,
            &primary,
            1,
            b"mail",
            &mail_attributes(1),
            false,
        );

        let mut txn = MailTransaction::new(&storage, &mut host);
        let mut m = mail(1);
        txn.open(&mut m).unwrap();

        move_mail_to_alt(&mut txn, &m).unwrap();
        assert!(txn.host().record(Uid::u(1)).unwrap().alt_storage);
        assert!(alternate.stat(&oid.to_string()).is_ok());
        assert_matches!(Err(Error::NxObject), primary.stat(&oid.to_string()));

        // The open handle follows the object
        let mut content = Vec::new();
        txn.get_stream(&mut m)
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(b"mail".to_vec(), content);

        // Moving to where it already is does nothing
        move_mail_to_alt(&mut txn, &m).unwrap();

        move_mail_from_alt(&mut txn, &m).unwrap();
        assert!(!txn.host().record(Uid::u(1)).unwrap().alt_storage);
        assert!(primary.stat(&oid.to_string()).is_ok());
    }

    #[test]
    fn failed_index_update_is_inconsistent() {
        crate::init_test_log();
        let (storage, primary, alternate, _) = memory_storage();
        let mut host = FakeHost::new();
        let oid = put_mail(
            &mut host,
            &primary,
            1,
            b"mail",
            &mail_attributes(1),
            false,
        );
        host.fail_alt_flag_updates = true;

        let mut txn = MailTransaction::new(&storage, &mut host);
        let mut m = mail(1);
        txn.open(&mut m).unwrap();

        assert_matches!(
            Err(Error::Inconsistent(..)),
            move_mail_to_alt(&mut txn, &m)
        );
        assert_eq!(1, txn.host().corrupted.len());
        assert!(!txn.host().record(Uid::u(1)).unwrap().alt_storage);
        assert!(alternate.stat(&oid.to_string()).is_ok());

        // Reads in this transaction still find the object
        let mut content = Vec::new();
        txn.get_stream(&mut m)
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(b"mail".to_vec(), content);
    }

    #[test]
    fn mail_move_without_alt_storage() {
        crate::init_test_log();
        let primary = MemoryStore::new("primary");
        let storage = Storage::new(
            LogPrefix::new("test".to_owned()),
            Rc::new(primary.clone()),
        );
        let mut host = FakeHost::new();
        put_mail(&mut host, &primary, 1, b"mail", &mail_attributes(1), false);

        let mut txn = MailTransaction::new(&storage, &mut host);
        assert_matches!(
            Err(Error::NoAltStorage),
            move_mail_to_alt(&mut txn, &mail(1))
        );
        assert!(!txn.host().record(Uid::u(1)).unwrap().alt_storage);
    }
}
