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

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::rc::Rc;

use chrono::prelude::*;

use super::{ObjectInput, ObjectStat, ObjectStore};
use crate::model::{AttributeName, MetadataMap};
use crate::support::error::Error;
use crate::support::safe_name::is_safe_name;

#[derive(Clone, Debug)]
struct MemObject {
    content: Rc<[u8]>,
    attributes: MetadataMap,
    counters: BTreeMap<String, i64>,
    mtime: i64,
}

type Objects = HashMap<(String, String), MemObject>;

/// An object store that lives entirely in memory.
///
/// Clones share the same underlying objects.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    name: String,
    namespace: String,
    objects: Rc<RefCell<Objects>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryStore {
            name: name.into(),
            namespace: String::new(),
            objects: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Override the modification time recorded for `name`.
    pub fn set_mtime(&self, name: &str, mtime: i64) -> Result<(), Error> {
        self.with_object(name, |obj| {
            obj.mtime = mtime;
            Ok(())
        })
    }

    fn key(&self, name: &str) -> Result<(String, String), Error> {
        if !is_safe_name(name) {
            return Err(Error::UnsafeName);
        }

        Ok((self.namespace.clone(), name.to_owned()))
    }

    fn with_object<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut MemObject) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let key = self.key(name)?;
        let mut objects = self.objects.borrow_mut();
        let obj = objects.get_mut(&key).ok_or(Error::NxObject)?;
        f(obj)
    }
}

impl ObjectStore for MemoryStore {
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
        if !namespace.is_empty() && !is_safe_name(namespace) {
            return Err(Error::UnsafeName);
        }

        Ok(Rc::new(MemoryStore {
            name: self.name.clone(),
            namespace: namespace.to_owned(),
            objects: Rc::clone(&self.objects),
        }))
    }

    fn create(
        &self,
        name: &str,
        content: &mut dyn Read,
        attributes: &MetadataMap,
    ) -> Result<(), Error> {
        let key = self.key(name)?;
        if self.objects.borrow().contains_key(&key) {
            return Err(Error::ObjectExists);
        }

        let mut data = Vec::new();
        content.read_to_end(&mut data)?;

        let mut objects = self.objects.borrow_mut();
        if objects.contains_key(&key) {
            return Err(Error::ObjectExists);
        }
        objects.insert(
            key,
            MemObject {
                content: Rc::from(data),
                attributes: attributes.clone(),
                counters: BTreeMap::new(),
                mtime: Utc::now().timestamp(),
            },
        );
        Ok(())
    }

    fn open(&self, name: &str) -> Result<Box<dyn ObjectInput>, Error> {
        self.with_object(name, |obj| {
            Ok(Box::new(MemoryInput {
                content: Cursor::new(Rc::clone(&obj.content)),
                attributes: obj.attributes.clone(),
            }) as Box<dyn ObjectInput>)
        })
    }

    fn stat(&self, name: &str) -> Result<ObjectStat, Error> {
        self.with_object(name, |obj| {
            Ok(ObjectStat {
                size: obj.content.len() as u64,
                mtime: obj.mtime,
            })
        })
    }

    fn remove(&self, name: &str) -> Result<(), Error> {
        let key = self.key(name)?;
        self.objects
            .borrow_mut()
            .remove(&key)
            .map(|_| ())
            .ok_or(Error::NxObject)
    }

    fn get_attributes(&self, name: &str) -> Result<MetadataMap, Error> {
        self.with_object(name, |obj| Ok(obj.attributes.clone()))
    }

    fn set_attribute(
        &self,
        name: &str,
        attribute: &AttributeName,
        value: &[u8],
    ) -> Result<(), Error> {
        self.with_object(name, |obj| {
            obj.attributes.set_raw(attribute.clone(), value.to_vec());
            Ok(())
        })
    }

    fn counter_add(
        &self,
        name: &str,
        counter: &str,
        delta: i64,
    ) -> Result<i64, Error> {
        self.with_object(name, |obj| {
            let value = obj.counters.entry(counter.to_owned()).or_insert(0);
            *value += delta;
            Ok(*value)
        })
    }

    fn counters(&self, name: &str) -> Result<BTreeMap<String, i64>, Error> {
        self.with_object(name, |obj| Ok(obj.counters.clone()))
    }

    fn read(
        &self,
        name: &str,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>, Error> {
        self.with_object(name, |obj| {
            let size = obj.content.len() as u64;
            let start = offset.min(size) as usize;
            let end = offset.saturating_add(len).min(size) as usize;
            Ok(obj.content[start..end].to_vec())
        })
    }

    fn list(&self) -> Result<Vec<String>, Error> {
        Ok(self
            .objects
            .borrow()
            .keys()
            .filter(|&&(ref ns, _)| *ns == self.namespace)
            .map(|&(_, ref name)| name.clone())
            .collect())
    }
}

/// The memory store's open object.
///
/// Attributes are conceptually stored after the content, so reading them
/// leaves the cursor at the end of the content, the same as the directory
/// store does.
struct MemoryInput {
    content: Cursor<Rc<[u8]>>,
    attributes: MetadataMap,
}

impl Read for MemoryInput {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        self.content.read(dst)
    }
}

impl Seek for MemoryInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.content.seek(pos)
    }
}

impl ObjectInput for MemoryInput {
    fn content_offset(&self) -> u64 {
        0
    }

    fn read_attributes(&mut self) -> Result<MetadataMap, Error> {
        self.content.seek(SeekFrom::End(0))?;
        Ok(self.attributes.clone())
    }
}
