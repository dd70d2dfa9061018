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

//! An object store backed by a directory tree.
//!
//! Layout under the root:
//!
//! - `default/`: objects in the unnamed namespace
//! - `ns/<namespace>/`: objects in each named namespace
//! - `tmp/`: scratch space for staging new files
//!
//! Each object is a single file: a little-endian `u64` content length, the
//! content itself, then the attributes as a CBOR map. Counters are kept in a
//! hidden `.<name>.counters` sidecar which is only ever touched while holding
//! an exclusive lock on the namespace directory's `.lock` file, which makes
//! counter updates atomic across processes. Attribute updates and removals
//! take the same lock. Every rewrite of an object or sidecar goes through a
//! file staged in `tmp/` and renamed into place.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::prelude::*;
use log::debug;
use serde::{Deserialize, Serialize};

use super::{ObjectInput, ObjectStat, ObjectStore};
use crate::model::{AttributeName, MetadataMap};
use crate::support::error::Error;
use crate::support::file_ops::{self, ErrorTransforms, IgnoreKinds};
use crate::support::safe_name::is_safe_name;

const HEADER_SIZE: u64 = 8;

#[derive(Serialize, Deserialize, Debug, Default)]
struct Trailer {
    #[serde(rename = "a")]
    attributes: BTreeMap<String, serde_bytes::ByteBuf>,
}

impl Trailer {
    fn from_metadata(metadata: &MetadataMap) -> Self {
        Trailer {
            attributes: metadata
                .to_wire()
                .into_iter()
                .map(|(k, v)| (k, serde_bytes::ByteBuf::from(v)))
                .collect(),
        }
    }

    fn into_metadata(self) -> MetadataMap {
        MetadataMap::from_wire(
            self.attributes
                .into_iter()
                .map(|(k, v)| (k, v.into_vec()))
                .collect(),
        )
    }
}

#[derive(Clone, Debug)]
pub struct FsStore {
    name: String,
    root: PathBuf,
    namespace: String,
    dir: PathBuf,
    tmp: PathBuf,
}

impl FsStore {
    /// Open (creating if necessary) the store rooted at `root`, in the
    /// unnamed namespace.
    pub fn open(name: impl Into<String>, root: &Path) -> Result<Self, Error> {
        let dir = root.join("default");
        let tmp = root.join("tmp");
        fs::create_dir_all(&dir)?;
        fs::create_dir_all(root.join("ns"))?;
        fs::create_dir_all(&tmp)?;

        Ok(FsStore {
            name: name.into(),
            root: root.to_owned(),
            namespace: String::new(),
            dir,
            tmp,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> Result<PathBuf, Error> {
        if is_safe_name(name) {
            Ok(self.dir.join(name))
        } else {
            Err(Error::UnsafeName)
        }
    }

    /// Lock the namespace against concurrent attribute, counter and removal
    /// updates.
    fn lock(&self) -> Result<file_ops::FileLock, Error> {
        file_ops::lock_exclusive(self.dir.join(".lock"))
    }

    fn counters_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!(".{}.counters", name))
    }

    fn open_file(&self, name: &str, write: bool) -> Result<fs::File, Error> {
        let path = self.path(name)?;
        fs::OpenOptions::new()
            .read(true)
            .write(write)
            .open(path)
            .on_not_found(Error::NxObject)
    }

    fn read_counters(
        &self,
        name: &str,
    ) -> Result<BTreeMap<String, i64>, Error> {
        let data = fs::read(self.counters_path(name)).ignore_not_found()?;
        if data.is_empty() {
            Ok(BTreeMap::new())
        } else {
            serde_cbor::from_slice(&data).map_err(|e| {
                Error::CorruptObject(name.to_owned(), e.to_string())
            })
        }
    }
}

impl ObjectStore for FsStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn in_namespace(
        &self,
        namespace: &str,
    ) -> Result<Rc<dyn ObjectStore>, Error> {
        let dir = if namespace.is_empty() {
            self.root.join("default")
        } else if is_safe_name(namespace) {
            self.root.join("ns").join(namespace)
        } else {
            return Err(Error::UnsafeName);
        };
        fs::create_dir_all(&dir)?;

        Ok(Rc::new(FsStore {
            name: self.name.clone(),
            root: self.root.clone(),
            namespace: namespace.to_owned(),
            dir,
            tmp: self.tmp.clone(),
        }))
    }

    fn create(
        &self,
        name: &str,
        content: &mut dyn Read,
        attributes: &MetadataMap,
    ) -> Result<(), Error> {
        let path = self.path(name)?;
        if path.exists() {
            return Err(Error::ObjectExists);
        }

        let mut tf = tempfile::NamedTempFile::new_in(&self.tmp)?;
        {
            let file = tf.as_file_mut();
            file.write_u64::<LittleEndian>(0)?;
            let size = io::copy(content, file)?;
            serde_cbor::to_writer(
                &mut *file,
                &Trailer::from_metadata(attributes),
            )?;
            file.seek(SeekFrom::Start(0))?;
            file.write_u64::<LittleEndian>(size)?;
            file.sync_all()?;
        }

        tf.persist_noclobber(&path)
            .map_err(|e| e.error)
            .on_exists(Error::ObjectExists)?;
        debug!("{}: created {}/{}", self.name, self.namespace, name);
        Ok(())
    }

    fn open(&self, name: &str) -> Result<Box<dyn ObjectInput>, Error> {
        let mut file = self.open_file(name, false)?;
        let content_length = file.read_u64::<LittleEndian>()?;
        Ok(Box::new(FsInput {
            name: name.to_owned(),
            file: BufReader::new(file),
            content_length,
        }))
    }

    fn stat(&self, name: &str) -> Result<ObjectStat, Error> {
        let mut file = self.open_file(name, false)?;
        let size = file.read_u64::<LittleEndian>()?;
        let mtime = DateTime::<Utc>::from(file.metadata()?.modified()?);
        Ok(ObjectStat {
            size,
            mtime: mtime.timestamp(),
        })
    }

    fn remove(&self, name: &str) -> Result<(), Error> {
        let path = self.path(name)?;
        let _lock = self.lock()?;
        fs::remove_file(path).on_not_found(Error::NxObject)?;
        fs::remove_file(self.counters_path(name)).ignore_not_found()?;
        debug!("{}: removed {}/{}", self.name, self.namespace, name);
        Ok(())
    }

    fn get_attributes(&self, name: &str) -> Result<MetadataMap, Error> {
        self.open(name)?.read_attributes()
    }

    fn set_attribute(
        &self,
        name: &str,
        attribute: &AttributeName,
        value: &[u8],
    ) -> Result<(), Error> {
        let path = self.path(name)?;
        let _lock = self.lock()?;
        let mut file = BufReader::new(self.open_file(name, false)?);
        let content_length = file.read_u64::<LittleEndian>()?;

        file.seek(SeekFrom::Start(HEADER_SIZE + content_length))?;
        let mut attributes = read_trailer(name, &mut file)?;
        attributes.set_raw(attribute.clone(), value.to_vec());

        // The new version is built beside the old one and renamed over it, so
        // a crash leaves one complete version or the other
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut tf = tempfile::NamedTempFile::new_in(&self.tmp)?;
        {
            let out = tf.as_file_mut();
            out.write_u64::<LittleEndian>(content_length)?;
            let copied = io::copy(&mut (&mut file).take(content_length), out)?;
            if copied != content_length {
                return Err(Error::CorruptObject(
                    name.to_owned(),
                    "content shorter than its header".to_owned(),
                ));
            }
            serde_cbor::to_writer(
                &mut *out,
                &Trailer::from_metadata(&attributes),
            )?;
            out.sync_all()?;
        }

        tf.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    fn counter_add(
        &self,
        name: &str,
        counter: &str,
        delta: i64,
    ) -> Result<i64, Error> {
        let path = self.path(name)?;
        let _lock = self.lock()?;
        if !path.is_file() {
            return Err(Error::NxObject);
        }

        let mut counters = self.read_counters(name)?;
        let value = {
            let value = counters.entry(counter.to_owned()).or_insert(0);
            *value += delta;
            *value
        };

        file_ops::spit(
            &self.tmp,
            self.counters_path(name),
            true,
            &serde_cbor::to_vec(&counters)?,
        )?;
        Ok(value)
    }

    fn counters(&self, name: &str) -> Result<BTreeMap<String, i64>, Error> {
        let path = self.path(name)?;
        let _lock = self.lock()?;
        if !path.is_file() {
            return Err(Error::NxObject);
        }

        self.read_counters(name)
    }

    fn read(
        &self,
        name: &str,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>, Error> {
        let mut file = self.open_file(name, false)?;
        let content_length = file.read_u64::<LittleEndian>()?;
        let start = offset.min(content_length);
        let end = offset.saturating_add(len).min(content_length);

        file.seek(SeekFrom::Start(HEADER_SIZE + start))?;
        let mut data = Vec::with_capacity((end - start) as usize);
        file.take(end - start).read_to_end(&mut data)?;
        Ok(data)
    }

    fn list(&self) -> Result<Vec<String>, Error> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if is_safe_name(name) && entry.file_type()?.is_file() {
                    names.push(name.to_owned());
                }
            }
        }

        Ok(names)
    }
}

fn read_trailer(name: &str, src: impl Read) -> Result<MetadataMap, Error> {
    let trailer: Trailer = serde_cbor::from_reader(src)
        .map_err(|e| Error::CorruptObject(name.to_owned(), e.to_string()))?;
    Ok(trailer.into_metadata())
}

struct FsInput {
    name: String,
    file: BufReader<fs::File>,
    content_length: u64,
}

impl Read for FsInput {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        self.file.read(dst)
    }
}

impl Seek for FsInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl ObjectInput for FsInput {
    fn content_offset(&self) -> u64 {
        HEADER_SIZE
    }

    fn read_attributes(&mut self) -> Result<MetadataMap, Error> {
        self.file
            .seek(SeekFrom::Start(HEADER_SIZE + self.content_length))?;
        read_trailer(&self.name, &mut self.file)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::MetadataKey;

    #[test]
    fn fs_store_behaves() {
        let root = tempfile::TempDir::new().unwrap();
        let store = FsStore::open("fs", root.path()).unwrap();
        super::super::store_behaves(&store);
    }

    #[test]
    fn objects_persist_across_instances() {
        let root = tempfile::TempDir::new().unwrap();
        {
            let store = FsStore::open("fs", root.path()).unwrap();
            let mut attrs = MetadataMap::new();
            attrs.set(MetadataKey::Guid, "g");
            store.create("a", &mut &b"content"[..], &attrs).unwrap();
            store.counter_add("a", "refs", 2).unwrap();
            store
                .set_attribute("a", &MetadataKey::Version.into(), b"0.1")
                .unwrap();
        }

        let store = FsStore::open("fs", root.path()).unwrap();
        assert_eq!(b"content".to_vec(), store.read("a", 0, 100).unwrap());
        assert_eq!(Some(&2), store.counters("a").unwrap().get("refs"));
        let attrs = store.get_attributes("a").unwrap();
        assert_eq!(Some("g"), attrs.get_str(MetadataKey::Guid));
        assert_eq!(Some("0.1"), attrs.get_str(MetadataKey::Version));
        // Sidecar files never show up as objects
        assert_eq!(vec!["a".to_owned()], store.list().unwrap());
    }

    #[test]
    fn shrinking_attributes_truncate_trailer() {
        let root = tempfile::TempDir::new().unwrap();
        let store = FsStore::open("fs", root.path()).unwrap();
        let mut attrs = MetadataMap::new();
        attrs.set(MetadataKey::Keywords, vec![b'k'; 200]);
        store.create("a", &mut &b"xyz"[..], &attrs).unwrap();
        store
            .set_attribute("a", &MetadataKey::Keywords.into(), b"k")
            .unwrap();

        let attrs = store.get_attributes("a").unwrap();
        assert_eq!(Some("k"), attrs.get_str(MetadataKey::Keywords));
        assert_eq!(3, store.stat("a").unwrap().size);
    }

    #[test]
    fn sidecars_do_not_accumulate() {
        let root = tempfile::TempDir::new().unwrap();
        let store = FsStore::open("fs", root.path()).unwrap();
        for i in 0..10 {
            let name = format!("obj{}", i);
            store
                .create(&name, &mut &b"xyz"[..], &MetadataMap::new())
                .unwrap();
            store.counter_add(&name, "refs", 1).unwrap();
            store
                .set_attribute(&name, &MetadataKey::Flags.into(), b"S")
                .unwrap();
            store.remove(&name).unwrap();
            assert_matches!(Err(Error::NxObject), store.counters(&name));
            assert_matches!(Err(Error::NxObject), store.remove(&name));
        }

        let mut left = fs::read_dir(root.path().join("default"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect::<Vec<_>>();
        left.sort();
        assert_eq!(vec![".lock".to_owned()], left);
        assert_eq!(0, fs::read_dir(root.path().join("tmp")).unwrap().count());
    }

    #[test]
    fn attribute_update_replaces_whole_file() {
        let root = tempfile::TempDir::new().unwrap();
        let store = FsStore::open("fs", root.path()).unwrap();
        let mut attrs = MetadataMap::new();
        attrs.set(MetadataKey::Guid, "g");
        store.create("a", &mut &b"xyz"[..], &attrs).unwrap();

        let mut before = store.open("a").unwrap();
        store
            .set_attribute("a", &MetadataKey::Flags.into(), b"S")
            .unwrap();

        // An input opened earlier still sees the complete old version
        let old = before.read_attributes().unwrap();
        assert_eq!(Some("g"), old.get_str(MetadataKey::Guid));
        assert_eq!(None, old.get(MetadataKey::Flags));

        let new = store.get_attributes("a").unwrap();
        assert_eq!(Some("g"), new.get_str(MetadataKey::Guid));
        assert_eq!(Some("S"), new.get_str(MetadataKey::Flags));
        assert_eq!(b"xyz".to_vec(), store.read("a", 0, 10).unwrap());
        assert_eq!(0, fs::read_dir(root.path().join("tmp")).unwrap().count());
    }

    #[test]
    fn corrupt_trailer_reported() {
        let root = tempfile::TempDir::new().unwrap();
        let store = FsStore::open("fs", root.path()).unwrap();
        store
            .create("a", &mut &b"xyz"[..], &MetadataMap::new())
            .unwrap();

        let path = root.path().join("default").join("a");
        let mut data = fs::read(&path).unwrap();
        data.truncate(HEADER_SIZE as usize + 3);
        data.extend_from_slice(b"\xff\xff");
        fs::write(&path, data).unwrap();

        assert_matches!(
            Err(Error::CorruptObject(..)),
            store.get_attributes("a")
        );
    }
}
