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

//! Reconciliation of the host index against the object store.
//!
//! A pass runs through `begin`, `scan`, `apply` and `finish`. Everything up
//! to the end of `scan` is free of side effects on the store, so a pass can
//! be abandoned at any point before `apply` begins. After that it must run
//! to completion.

use bitflags::bitflags;
use chrono::prelude::*;
use log::{debug, error, info, warn};

use crate::mail::{IndexHost, Storage};
use crate::migrate;
use crate::model::{ExpungedItem, SyncEpoch, Tier, Uid};
use crate::store::{self, ObjectStore, REFS_COUNTER};
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;
use crate::support::system_config::ExpungePolicy;

mod rebuild;

pub use self::rebuild::rebuild;

bitflags! {
    pub struct SyncFlags: u8 {
        /// Ignore any marker claiming the index is already in sync.
        const FORCE = 1 << 0;
        /// Commit the index transaction durably.
        const FSYNC = 1 << 1;
        /// Discard and regenerate the UID to object mapping first.
        const FORCE_REBUILD = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    Scanning,
    Applying,
    Committed,
    RolledBack,
}

/// What happened to one expunged message's object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposal {
    Removed,
    /// Moved to the alternate tier under the archive policy.
    Archived,
    /// Still referenced by another message; one reference dropped.
    Released,
    /// Already gone, presumably removed by a concurrent sync.
    AlreadyGone,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub disposed: Vec<(Uid, Disposal)>,
    /// Objects that could not be dealt with. These don't fail the pass.
    pub failures: Vec<(Uid, Error)>,
    /// Number of records registered, if the pass rebuilt the index.
    pub rebuilt: Option<usize>,
}

impl SyncReport {
    pub fn count(&self, disposal: Disposal) -> usize {
        self.disposed.iter().filter(|&&(_, d)| d == disposal).count()
    }
}

/// The state of one sync pass.
#[derive(Debug)]
pub struct SyncContext {
    pub flags: SyncFlags,
    /// The UID validity in effect when the pass began.
    pub epoch: SyncEpoch,
    /// Objects of expunged messages waiting to be disposed of.
    pub expunged_items: Vec<ExpungedItem>,
    pub phase: SyncPhase,
    pub report: SyncReport,
}

pub struct SyncEngine<'s, H: IndexHost> {
    storage: &'s Storage,
    host: &'s mut H,
    log_prefix: LogPrefix,
}

impl<'s, H: IndexHost> SyncEngine<'s, H> {
    pub fn new(storage: &'s Storage, host: &'s mut H) -> Self {
        SyncEngine {
            storage,
            host,
            log_prefix: storage.log_prefix.clone(),
        }
    }

    pub fn host(&self) -> &H {
        &*self.host
    }

    /// Run a complete pass.
    ///
    /// If the UID validity changes underneath the pass, it is rolled back
    /// and run once more. A second change is reported as `StaleSync`.
    pub fn sync(&mut self, flags: SyncFlags) -> Result<SyncReport, Error> {
        match self.sync_once(flags) {
            Err(Error::StaleSync) => {
                warn!(
                    "{} UID validity changed during sync, restarting",
                    self.log_prefix
                );
                self.sync_once(flags)
            }
            r => r,
        }
    }

    fn sync_once(&mut self, flags: SyncFlags) -> Result<SyncReport, Error> {
        let mut ctx = self.begin(flags)?;
        let result = self.scan(&mut ctx).and_then(|()| self.apply(&mut ctx));
        match result {
            Ok(()) => self.finish(ctx, true),
            Err(e) => {
                self.finish(ctx, false)?;
                Err(e)
            }
        }
    }

    /// Open the index sync transaction and snapshot the UID validity.
    pub fn begin(&mut self, flags: SyncFlags) -> Result<SyncContext, Error> {
        self.host.sync_begin(flags.contains(SyncFlags::FORCE))?;

        let mut ctx = SyncContext {
            flags,
            epoch: SyncEpoch {
                uid_validity: self.host.uid_validity(),
            },
            expunged_items: Vec::new(),
            phase: SyncPhase::Scanning,
            report: SyncReport::default(),
        };

        if let Err(e) = self.prepare(&mut ctx) {
            self.host.sync_rollback();
            return Err(e);
        }

        debug!(
            "{} Sync begun, uid_validity={}",
            self.log_prefix, ctx.epoch.uid_validity
        );
        Ok(ctx)
    }

    fn prepare(&mut self, ctx: &mut SyncContext) -> Result<(), Error> {
        if !ctx.epoch.is_assigned() {
            let now = Utc::now().timestamp();
            let epoch = SyncEpoch::next_after(ctx.epoch, now)
                .ok_or(Error::StaleSync)?;
            info!(
                "{} Assigning uid_validity={}",
                self.log_prefix, epoch.uid_validity
            );
            self.host.set_uid_validity(epoch.uid_validity);
            ctx.epoch = epoch;
        }

        if ctx.flags.contains(SyncFlags::FORCE_REBUILD) {
            ctx.report.rebuilt =
                Some(rebuild(self.storage, &mut *self.host, &self.log_prefix)?);
        }

        Ok(())
    }

    /// Queue an `ExpungedItem` for every message expunged in the index whose
    /// object still exists.
    pub fn scan(&mut self, ctx: &mut SyncContext) -> Result<(), Error> {
        debug_assert_eq!(SyncPhase::Scanning, ctx.phase);

        for (uid, record) in self.host.sync_expunges()? {
            let tier = Tier::of_record(&record);
            let store = match self.storage.tier(tier) {
                Ok(store) => store,
                Err(e) => {
                    error!(
                        "{} Can't reach {} of expunged {}: {}",
                        self.log_prefix, record.object_id, uid, e
                    );
                    ctx.report.failures.push((uid, e));
                    continue;
                }
            };

            match store.stat(&record.object_id.to_string()) {
                Ok(_) => ctx.expunged_items.push(ExpungedItem {
                    uid,
                    object_id: record.object_id,
                    alt_storage: record.alt_storage,
                }),
                Err(e) if e.is_not_found() => {
                    ctx.report.disposed.push((uid, Disposal::AlreadyGone));
                }
                // Still queued; applying will find out whether the failure
                // was transient
                Err(e) => {
                    warn!(
                        "{} Failed to stat {}: {}",
                        self.log_prefix, record.object_id, e
                    );
                    ctx.expunged_items.push(ExpungedItem {
                        uid,
                        object_id: record.object_id,
                        alt_storage: record.alt_storage,
                    });
                }
            }
        }

        self.check_epoch(ctx)
    }

    /// Abandon the pass.
    ///
    /// Only possible before anything has been applied.
    pub fn abort(&mut self, ctx: &mut SyncContext) -> Result<(), Error> {
        if SyncPhase::Scanning != ctx.phase {
            return Err(Error::SyncNotCancellable);
        }

        self.host.sync_rollback();
        ctx.phase = SyncPhase::RolledBack;
        info!(
            "{} Sync aborted with {} expunged objects untouched",
            self.log_prefix,
            ctx.expunged_items.len()
        );
        Ok(())
    }

    /// Dispose of every queued object.
    ///
    /// Failures for individual objects are collected in the report rather
    /// than failing the pass.
    pub fn apply(&mut self, ctx: &mut SyncContext) -> Result<(), Error> {
        self.check_epoch(ctx)?;
        ctx.phase = SyncPhase::Applying;

        for item in std::mem::take(&mut ctx.expunged_items) {
            match self.dispose(&item) {
                Ok(disposal) => {
                    debug!(
                        "{} {} of {}: {:?}",
                        self.log_prefix, item.object_id, item.uid, disposal
                    );
                    ctx.report.disposed.push((item.uid, disposal));
                }
                Err(e) if e.is_not_found() => {
                    debug!(
                        "{} {} already removed",
                        self.log_prefix, item.object_id
                    );
                    ctx.report.disposed.push((item.uid, Disposal::AlreadyGone));
                }
                Err(e) => {
                    error!(
                        "{} Failed to dispose of {} of {}: {}",
                        self.log_prefix, item.object_id, item.uid, e
                    );
                    if e.needs_attention() {
                        self.host.set_corrupted(&e.to_string());
                    }
                    ctx.report.failures.push((item.uid, e));
                }
            }
        }

        Ok(())
    }

    fn dispose(&mut self, item: &ExpungedItem) -> Result<Disposal, Error> {
        let tier = if item.alt_storage {
            Tier::Alternate
        } else {
            Tier::Primary
        };
        let store = self.storage.tier(tier)?;
        let name = item.object_id.to_string();

        let archive = ExpungePolicy::Archive == self.storage.expunge_policy
            && Tier::Primary == tier;
        if archive && !is_shared(&*store, &name)? {
            let alternate = self.storage.tier(Tier::Alternate)?;
            migrate::move_object(&name, &*store, &*alternate)?;
            return Ok(Disposal::Archived);
        }

        if ExpungePolicy::Archive == self.storage.expunge_policy
            && Tier::Alternate == tier
            && !is_shared(&*store, &name)?
        {
            // Already archived
            return Ok(Disposal::Archived);
        }

        if store::release_object(&*store, &name)? {
            Ok(Disposal::Removed)
        } else {
            Ok(Disposal::Released)
        }
    }

    /// Commit the pass if `success`, otherwise roll it back.
    ///
    /// A pass whose UID validity has changed is rolled back regardless and
    /// fails with `StaleSync`.
    pub fn finish(
        &mut self,
        mut ctx: SyncContext,
        success: bool,
    ) -> Result<SyncReport, Error> {
        if !success {
            self.host.sync_rollback();
            ctx.phase = SyncPhase::RolledBack;
            info!("{} Sync rolled back", self.log_prefix);
            return Ok(ctx.report);
        }

        if let Err(e) = self.check_epoch(&ctx) {
            self.host.sync_rollback();
            ctx.phase = SyncPhase::RolledBack;
            return Err(e);
        }

        if let Err(e) =
            self.host.sync_commit(ctx.flags.contains(SyncFlags::FSYNC))
        {
            error!("{} Failed to commit sync: {}", self.log_prefix, e);
            self.host.sync_rollback();
            ctx.phase = SyncPhase::RolledBack;
            return Err(e);
        }

        ctx.phase = SyncPhase::Committed;
        info!(
            "{} Sync committed: {} removed, {} archived, {} released, \
             {} failures",
            self.log_prefix,
            ctx.report.count(Disposal::Removed),
            ctx.report.count(Disposal::Archived),
            ctx.report.count(Disposal::Released),
            ctx.report.failures.len()
        );
        Ok(ctx.report)
    }

    fn check_epoch(&self, ctx: &SyncContext) -> Result<(), Error> {
        if ctx.epoch.uid_validity != self.host.uid_validity() {
            Err(Error::StaleSync)
        } else {
            Ok(())
        }
    }
}

fn is_shared(store: &dyn ObjectStore, name: &str) -> Result<bool, Error> {
    let refs = store
        .counters(name)?
        .get(REFS_COUNTER)
        .copied()
        .unwrap_or(0);
    Ok(store::refcount_from_counter(refs) > 1)
}
