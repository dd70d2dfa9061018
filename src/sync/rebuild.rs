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

use std::convert::TryFrom;

use log::{info, warn};

use crate::codec;
use crate::mail::{IndexHost, Storage};
use crate::model::{IndexRecord, MetadataKey, ObjectId, Tier, Uid};
use crate::store::ObjectStore;
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

/// Regenerate the host's UID to object mapping from what is actually in the
/// store.
///
/// Every object on either tier whose mailbox GUID matches the host's is
/// registered under the UID recorded on the object. Objects that can't be
/// attributed to a UID are left alone. Returns the number of records
/// registered.
pub fn rebuild<H: IndexHost>(
    storage: &Storage,
    host: &mut H,
    log_prefix: &LogPrefix,
) -> Result<usize, Error> {
    let mailbox_guid = host.mailbox_guid();
    let mut found = Vec::<(Uid, IndexRecord)>::new();

    scan_tier(
        log_prefix,
        &*storage.primary,
        Tier::Primary,
        &mailbox_guid,
        &mut found,
    )?;
    if let Some(ref alternate) = storage.alternate {
        scan_tier(
            log_prefix,
            &**alternate,
            Tier::Alternate,
            &mailbox_guid,
            &mut found,
        )?;
    }

    dedup_claims(log_prefix, &mut found);

    host.rebuild_reset();
    for &(uid, record) in &found {
        host.rebuild_add(uid, record);
    }

    info!("{} Rebuilt index with {} messages", log_prefix, found.len());
    Ok(found.len())
}

/// Sort `found` by UID and keep one record per UID, preferring a primary
/// copy over an alternate one.
fn dedup_claims(log_prefix: &LogPrefix, found: &mut Vec<(Uid, IndexRecord)>) {
    found.sort_by_key(|&(uid, _)| uid);
    found.dedup_by(|b, a| {
        if a.0 != b.0 {
            return false;
        }

        // Left over from an interrupted migration; the primary copy wins
        if a.1.alt_storage && !b.1.alt_storage {
            std::mem::swap(a, b);
        }
        warn!(
            "{} Objects {} and {} both claim {}, keeping {}",
            log_prefix, a.1.object_id, b.1.object_id, a.0, a.1.object_id,
        );
        true
    });
}

fn scan_tier(
    log_prefix: &LogPrefix,
    store: &dyn ObjectStore,
    tier: Tier,
    mailbox_guid: &str,
    found: &mut Vec<(Uid, IndexRecord)>,
) -> Result<(), Error> {
    for name in store.list()? {
        let object_id = match name.parse::<ObjectId>() {
            Ok(oid) => oid,
            // Configuration and mapping objects share the namespace
            Err(_) => continue,
        };

        let attributes = match store.get_attributes(&name) {
            Ok(md) => md,
            Err(e) if e.is_not_found() => continue,
            Err(e) => {
                warn!(
                    "{} Skipping {} in {}: {}",
                    log_prefix,
                    name,
                    store.name(),
                    e
                );
                continue;
            }
        };

        if attributes.get(MetadataKey::MailboxGuid)
            != Some(mailbox_guid.as_bytes())
        {
            continue;
        }

        let uid = attributes
            .get(MetadataKey::MailUid)
            .and_then(|raw| std::str::from_utf8(raw).ok())
            .and_then(codec::decode_u64)
            .and_then(|uid| u32::try_from(uid).ok())
            .and_then(Uid::of);
        let uid = match uid {
            Some(uid) => uid,
            None => {
                warn!(
                    "{} Skipping {} in {}: missing or invalid UID",
                    log_prefix,
                    name,
                    store.name()
                );
                continue;
            }
        };

        found.push((
            uid,
            IndexRecord {
                object_id,
                alt_storage: Tier::Alternate == tier,
            },
        ));
    }

    Ok(())
}
