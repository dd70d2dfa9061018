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

//! A store wrapper which fails on request, for exercising error paths.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::io::{self, Read};
use std::rc::Rc;

use super::{ObjectInput, ObjectStat, ObjectStore};
use crate::model::{AttributeName, MetadataMap};
use crate::support::error::Error;

#[derive(Debug, Default)]
pub struct Faults {
    /// `create` writes only part of the content, then fails.
    pub partial_create: Cell<bool>,
    pub remove: Cell<bool>,
    pub counter_add: Cell<bool>,
    pub stat: Cell<bool>,
}

#[derive(Clone)]
pub struct FaultyStore {
    inner: Rc<dyn ObjectStore>,
    pub faults: Rc<Faults>,
}

impl FaultyStore {
    pub fn new(inner: Rc<dyn ObjectStore>) -> Self {
        FaultyStore {
            inner,
            faults: Rc::new(Faults::default()),
        }
    }
}

fn injected() -> Error {
    Error::Io(io::Error::new(io::ErrorKind::Other, "injected fault"))
}

impl ObjectStore for FaultyStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    fn in_namespace(
        &self,
        namespace: &str,
    ) -> Result<Rc<dyn ObjectStore>, Error> {
        Ok(Rc::new(FaultyStore {
            inner: self.inner.in_namespace(namespace)?,
            faults: Rc::clone(&self.faults),
        }))
    }

    fn create(
        &self,
        name: &str,
        content: &mut dyn Read,
        attributes: &MetadataMap,
    ) -> Result<(), Error> {
        if self.faults.partial_create.get() {
            let mut data = Vec::new();
            content.read_to_end(&mut data)?;
            data.truncate(data.len() / 2);
            self.inner.create(name, &mut &data[..], attributes)?;
            return Err(injected());
        }

        self.inner.create(name, content, attributes)
    }

    fn open(&self, name: &str) -> Result<Box<dyn ObjectInput>, Error> {
        self.inner.open(name)
    }

    fn stat(&self, name: &str) -> Result<ObjectStat, Error> {
        if self.faults.stat.get() {
            return Err(injected());
        }

        self.inner.stat(name)
    }

    fn remove(&self, name: &str) -> Result<(), Error> {
        if self.faults.remove.get() {
            return Err(injected());
        }

        self.inner.remove(name)
    }

    fn get_attributes(&self, name: &str) -> Result<MetadataMap, Error> {
        self.inner.get_attributes(name)
    }

    fn set_attribute(
        &self,
        name: &str,
        attribute: &AttributeName,
        value: &[u8],
    ) -> Result<(), Error> {
        self.inner.set_attribute(name, attribute, value)
    }

    fn counter_add(
        &self,
        name: &str,
        counter: &str,
        delta: i64,
    ) -> Result<i64, Error> {
        if self.faults.counter_add.get() {
            return Err(injected());
        }

        self.inner.counter_add(name, counter, delta)
    }

    fn counters(&self, name: &str) -> Result<BTreeMap<String, i64>, Error> {
        self.inner.counters(name)
    }

    fn read(
        &self,
        name: &str,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>, Error> {
        self.inner.read(name, offset, len)
    }

    fn list(&self) -> Result<Vec<String>, Error> {
        self.inner.list()
    }
}
