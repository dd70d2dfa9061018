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

//! The operations behind the admin subcommands.
//!
//! Each writes its human-readable output to `out`, so that the same code
//! serves both the binary and the tests.

use std::io::Write;
use std::rc::Rc;

use crate::codec::{self, AttributeValue};
use crate::mail::Storage;
use crate::migrate;
use crate::model::{AttributeName, Tier};
use crate::namespace::{NamespaceConfig, NamespaceManager};
use crate::store::{self, ObjectStore};
use crate::support::error::Error;

pub(super) fn config_show(
    store: &dyn ObjectStore,
    out: &mut impl Write,
) -> Result<(), Error> {
    let mut config = NamespaceConfig::default();
    config.load(store)?;
    write!(out, "{}", config.describe())?;
    Ok(())
}

pub(super) fn config_init(
    store: &dyn ObjectStore,
    mut config: NamespaceConfig,
    out: &mut impl Write,
) -> Result<(), Error> {
    config.valid = true;
    config.store(store)?;
    write!(out, "{}", config.describe())?;
    Ok(())
}

pub(super) fn namespace_lookup(
    storage: &Storage,
    user: &str,
    out: &mut impl Write,
) -> Result<(), Error> {
    let mut config = NamespaceConfig::default();
    config.load(&*storage.primary)?;
    let manager = NamespaceManager::new(
        storage.log_prefix.clone(),
        Rc::clone(&storage.primary),
        config,
    )?;
    writeln!(out, "{}", manager.lookup(user)?)?;
    Ok(())
}

pub(super) fn object_ls(
    store: &dyn ObjectStore,
    out: &mut impl Write,
) -> Result<(), Error> {
    let mut names = store.list()?;
    names.sort();
    for name in names {
        match store.stat(&name) {
            Ok(stat) => writeln!(
                out,
                "{:<32} {:>10} {}",
                name,
                stat.size,
                codec::encode_date(stat.mtime).unwrap_or_default()
            )?,
            // Removed since listing
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

pub(super) fn object_stat(
    store: &dyn ObjectStore,
    name: &str,
    out: &mut impl Write,
) -> Result<(), Error> {
    let stat = store.stat(name)?;
    let attributes = store.get_attributes(name)?;
    let counters = store.counters(name)?;

    writeln!(out, "{}:{}/{}", store.name(), store.namespace(), name)?;
    writeln!(out, "  size={}", stat.size)?;
    writeln!(
        out,
        "  mtime={}",
        codec::encode_date(stat.mtime).unwrap_or_default()
    )?;
    for (attr, raw) in attributes.iter() {
        writeln!(out, "  {}", describe_attribute(attr, raw))?;
    }
    for (counter, value) in &counters {
        writeln!(out, "  counter {}={}", counter, value)?;
    }
    if let Some(&refs) = counters.get(store::REFS_COUNTER) {
        writeln!(out, "  refcount={}", store::refcount_from_counter(refs))?;
    }
    Ok(())
}

fn describe_attribute(name: &AttributeName, raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    match *name {
        AttributeName::Known(key) => {
            let value = match codec::decode(key, raw) {
                Some(AttributeValue::Date(t)) => format!("{} ({})", text, t),
                Some(AttributeValue::Flags(f)) => {
                    format!("{} ({})", text, codec::resolve_flags(f))
                }
                Some(_) => text.into_owned(),
                None => format!("{:?} (invalid)", text),
            };
            format!("{} {:?}={}", key, key, value)
        }
        AttributeName::Extension(ref ext) => format!("{}={}", ext, text),
    }
}

pub(super) fn object_migrate(
    storage: &Storage,
    name: &str,
    inverse: bool,
    out: &mut impl Write,
) -> Result<(), Error> {
    let alternate = storage.tier(Tier::Alternate)?;
    migrate::move_to_alt(name, &*storage.primary, &*alternate, inverse)?;
    writeln!(
        out,
        "Moved {} to {}",
        name,
        if inverse { "primary" } else { "alternate" }
    )?;
    Ok(())
}

pub(super) fn object_copy(
    storage: &Storage,
    name: &str,
    dest: &str,
    inverse: bool,
    out: &mut impl Write,
) -> Result<(), Error> {
    let alternate = storage.tier(Tier::Alternate)?;
    migrate::copy_to_alt(name, dest, &*storage.primary, &*alternate, inverse)?;
    writeln!(
        out,
        "Copied {} to {} as {}",
        name,
        if inverse { "primary" } else { "alternate" },
        dest
    )?;
    Ok(())
}
