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

//! The object store collaborator interface, plus two local implementations.
//!
//! An object store holds named binary objects, each with a set of
//! attributes and a set of signed counters, partitioned into namespaces.
//! Objects are immutable once created; only attributes and counters change.

use std::collections::BTreeMap;
use std::io::{Read, Seek};
use std::rc::Rc;

use crate::model::{AttributeName, MetadataMap};
use crate::support::error::Error;

mod fs;
mod memory;
#[cfg(test)]
pub mod faulty;

pub use self::fs::FsStore;
pub use self::memory::MemoryStore;

/// The counter tracking extra references to a shared object.
///
/// An object with no extra references has no counter (or a zero counter).
pub const REFS_COUNTER: &str = "refs";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectStat {
    /// Length of the content in bytes.
    pub size: u64,
    /// Modification time, seconds since the UNIX epoch.
    pub mtime: i64,
}

/// An open object.
///
/// `Read` and `Seek` operate on a single cursor over the object. Content
/// begins at `content_offset()`. Fetching the attributes through the open
/// object may move that cursor.
pub trait ObjectInput: Read + Seek {
    fn content_offset(&self) -> u64;

    fn read_attributes(&mut self) -> Result<MetadataMap, Error>;
}

pub trait ObjectStore {
    /// A name for this store, for use in log messages.
    fn name(&self) -> &str;

    /// The namespace this handle operates within.
    fn namespace(&self) -> &str;

    /// Return a handle to the same store, but within `namespace`.
    fn in_namespace(&self, namespace: &str)
        -> Result<Rc<dyn ObjectStore>, Error>;

    /// Create a new object.
    ///
    /// Fails with `ObjectExists` if there is already an object by that name.
    fn create(
        &self,
        name: &str,
        content: &mut dyn Read,
        attributes: &MetadataMap,
    ) -> Result<(), Error>;

    fn open(&self, name: &str) -> Result<Box<dyn ObjectInput>, Error>;

    fn stat(&self, name: &str) -> Result<ObjectStat, Error>;

    fn remove(&self, name: &str) -> Result<(), Error>;

    fn get_attributes(&self, name: &str) -> Result<MetadataMap, Error>;

    fn set_attribute(
        &self,
        name: &str,
        attribute: &AttributeName,
        value: &[u8],
    ) -> Result<(), Error>;

    /// Atomically add `delta` to the named counter, which starts at 0, and
    /// return the new value.
    fn counter_add(
        &self,
        name: &str,
        counter: &str,
        delta: i64,
    ) -> Result<i64, Error>;

    fn counters(&self, name: &str) -> Result<BTreeMap<String, i64>, Error>;

    /// Read up to `len` bytes of content starting at `offset`.
    fn read(&self, name: &str, offset: u64, len: u64)
        -> Result<Vec<u8>, Error>;

    /// List the names of all objects in this namespace, in no particular
    /// order.
    fn list(&self) -> Result<Vec<String>, Error>;
}

/// Read the entire content of `name`.
pub fn read_all(
    store: &dyn ObjectStore,
    name: &str,
) -> Result<Vec<u8>, Error> {
    let stat = store.stat(name)?;
    store.read(name, 0, stat.size)
}

/// Drop one reference to `name`, deleting the object once no references
/// remain.
///
/// Returns whether the object was actually deleted.
pub fn release_object(
    store: &dyn ObjectStore,
    name: &str,
) -> Result<bool, Error> {
    let remaining = store.counter_add(name, REFS_COUNTER, -1)?;
    if remaining < 0 {
        store.remove(name)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Add one reference to `name`, returning the new total reference count.
pub fn share_object(
    store: &dyn ObjectStore,
    name: &str,
) -> Result<u64, Error> {
    let refs = store.counter_add(name, REFS_COUNTER, 1)?;
    Ok(refcount_from_counter(refs))
}

/// Convert the raw `refs` counter to the total number of references.
pub fn refcount_from_counter(refs: i64) -> u64 {
    (refs.max(-1) + 1) as u64
}

#[cfg(test)]
pub(crate) fn store_behaves(store: &dyn ObjectStore) {
    use crate::model::MetadataKey;

    let mut attrs = MetadataMap::new();
    attrs.set(MetadataKey::Guid, "g");
    attrs.set_raw(AttributeName::Extension("ext".to_owned()), b"e".to_vec());

    store.create("a", &mut &b"hello world"[..], &attrs).unwrap();
    assert_matches!(
        Err(Error::ObjectExists),
        store.create("a", &mut &b"again"[..], &attrs)
    );
    assert_eq!(11, store.stat("a").unwrap().size);
    assert_eq!(attrs, store.get_attributes("a").unwrap());
    assert_eq!(b"world".to_vec(), store.read("a", 6, 100).unwrap());
    assert_eq!(b"lo".to_vec(), store.read("a", 3, 2).unwrap());
    assert!(store.read("a", 50, 2).unwrap().is_empty());

    {
        let mut input = store.open("a").unwrap();
        input
            .seek(std::io::SeekFrom::Start(input.content_offset()))
            .unwrap();
        let mut content = vec![0u8; 11];
        input.read_exact(&mut content).unwrap();
        assert_eq!(b"hello world", &content[..]);
        assert_eq!(attrs, input.read_attributes().unwrap());
    }

    store
        .set_attribute("a", &MetadataKey::Flags.into(), b"S")
        .unwrap();
    assert_eq!(
        Some(&b"S"[..]),
        store.get_attributes("a").unwrap().get(MetadataKey::Flags)
    );

    assert_eq!(1, store.counter_add("a", "c", 1).unwrap());
    assert_eq!(-2, store.counter_add("a", "c", -3).unwrap());
    assert_eq!(Some(&-2), store.counters("a").unwrap().get("c"));

    assert_eq!(2, share_object(store, "a").unwrap());
    assert!(!release_object(store, "a").unwrap());
    assert!(store.stat("a").is_ok());

    store.create("b", &mut &b""[..], &MetadataMap::new()).unwrap();
    let mut names = store.list().unwrap();
    names.sort();
    assert_eq!(vec!["a".to_owned(), "b".to_owned()], names);

    assert!(release_object(store, "a").unwrap());
    assert_matches!(Err(Error::NxObject), store.stat("a"));
    assert_matches!(Err(Error::NxObject), store.open("a").map(|_| ()));
    assert_matches!(Err(Error::NxObject), store.get_attributes("a"));
    assert_matches!(Err(Error::NxObject), store.counter_add("a", "c", 1));
    assert_matches!(Err(Error::NxObject), store.remove("a"));

    let other = store.in_namespace("other").unwrap();
    assert_eq!("other", other.namespace());
    assert!(other.list().unwrap().is_empty());
    assert_matches!(Err(Error::NxObject), other.stat("b"));
    other.create("b", &mut &b"x"[..], &MetadataMap::new()).unwrap();
    assert_eq!(0, store.stat("b").unwrap().size);
    assert_eq!(1, other.stat("b").unwrap().size);

    assert_matches!(Err(Error::UnsafeName), store.stat("../b"));
}
