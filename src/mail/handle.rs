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

use std::collections::hash_map::{Entry, HashMap};
use std::rc::Rc;

use crate::model::{MetadataKey, MetadataMap, ObjectId, Tier, Uid};
use crate::store::{ObjectInput, ObjectStat, ObjectStore};
use crate::support::error::Error;
use crate::support::rcio::RcIo;

pub type SharedInput = RcIo<Box<dyn ObjectInput>>;

/// An open mail object.
///
/// The object's input stream is shared between content readers and
/// metadata fetches; the metadata is read at most once.
pub struct ObjectHandle {
    object_id: ObjectId,
    tier: Tier,
    store: Rc<dyn ObjectStore>,
    input: Option<SharedInput>,
    metadata: Option<MetadataMap>,
}

impl ObjectHandle {
    pub fn new(
        object_id: ObjectId,
        tier: Tier,
        store: Rc<dyn ObjectStore>,
    ) -> Self {
        ObjectHandle {
            object_id,
            tier,
            store,
            input: None,
            metadata: None,
        }
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn name(&self) -> String {
        self.object_id.to_string()
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn store(&self) -> &Rc<dyn ObjectStore> {
        &self.store
    }

    /// Return the shared input, opening the object if that hasn't happened
    /// yet.
    pub fn input(&mut self) -> Result<SharedInput, Error> {
        if let Some(ref input) = self.input {
            return Ok(input.clone());
        }

        let input = RcIo::wrap(self.store.open(&self.name())?);
        self.input = Some(input.clone());
        Ok(input)
    }

    /// Return the object's attributes, fetching them on first use.
    ///
    /// The shared cursor is left where it was.
    pub fn metadata(&mut self) -> Result<&MetadataMap, Error> {
        if self.metadata.is_none() {
            let input = self.input()?;
            let metadata =
                input.with_position_restored(|i| i.read_attributes())?;
            self.metadata = Some(metadata);
        }

        Ok(self.metadata.get_or_insert_with(MetadataMap::new))
    }

    /// Reflect a write made through this handle in the cached metadata.
    pub fn note_written(&mut self, key: MetadataKey, value: Vec<u8>) {
        if let Some(ref mut metadata) = self.metadata {
            metadata.set(key, value);
        }
    }

    pub fn stat(&self) -> Result<ObjectStat, Error> {
        self.store.stat(&self.name())
    }

    /// Point this handle at a different tier, e.g. after the object has
    /// been migrated. The object is reopened on next use.
    pub fn relocate(&mut self, tier: Tier, store: Rc<dyn ObjectStore>) {
        self.tier = tier;
        self.store = store;
        self.input = None;
    }
}

struct Slot {
    handle: ObjectHandle,
    refcount: u32,
}

/// The handles open within one transaction, indexed by UID.
///
/// A handle stays in the arena as long as at least one reference to it is
/// held; releasing the last reference closes it.
#[derive(Default)]
pub struct HandleArena {
    slots: HashMap<Uid, Slot>,
}

impl HandleArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly opened handle, holding one reference.
    ///
    /// Returns `false` and leaves the existing handle alone if `uid` is
    /// already registered.
    pub fn insert(&mut self, uid: Uid, handle: ObjectHandle) -> bool {
        match self.slots.entry(uid) {
            Entry::Occupied(_) => false,
            Entry::Vacant(e) => {
                e.insert(Slot {
                    handle,
                    refcount: 1,
                });
                true
            }
        }
    }

    /// Take another reference to the handle for `uid`, if there is one.
    pub fn acquire(&mut self, uid: Uid) -> bool {
        match self.slots.get_mut(&uid) {
            Some(slot) => {
                slot.refcount += 1;
                true
            }
            None => false,
        }
    }

    /// Drop one reference to the handle for `uid`, closing the handle if
    /// that was the last one.
    ///
    /// Returns the number of references remaining, or `None` if there was
    /// no such handle.
    pub fn release(&mut self, uid: Uid) -> Option<u32> {
        let slot = self.slots.get_mut(&uid)?;
        slot.refcount = slot.refcount.saturating_sub(1);
        let remaining = slot.refcount;
        if 0 == remaining {
            self.slots.remove(&uid);
        }
        Some(remaining)
    }

    pub fn get_mut(&mut self, uid: Uid) -> Option<&mut ObjectHandle> {
        self.slots.get_mut(&uid).map(|s| &mut s.handle)
    }

    pub fn refcount(&self, uid: Uid) -> u32 {
        self.slots.get(&uid).map_or(0, |s| s.refcount)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
