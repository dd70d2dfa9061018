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
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, info};

use super::config::NamespaceConfig;
use crate::codec::find_and_replace;
use crate::model::ObjectId;
use crate::store::{self, ObjectStore};
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;
use crate::support::safe_name::is_safe_name;

/// Maps user names onto the namespaces holding their mail.
///
/// Lookups are cached for the lifetime of the manager.
pub struct NamespaceManager {
    log_prefix: LogPrefix,
    store: Rc<dyn ObjectStore>,
    config: NamespaceConfig,
    cache: RefCell<HashMap<String, String>>,
}

impl NamespaceManager {
    /// Create a manager over `store` using `config`, which must be valid.
    pub fn new(
        log_prefix: LogPrefix,
        store: Rc<dyn ObjectStore>,
        config: NamespaceConfig,
    ) -> Result<Self, Error> {
        if !config.valid {
            return Err(Error::BadConfig);
        }

        Ok(NamespaceManager {
            log_prefix,
            store,
            config,
            cache: RefCell::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &NamespaceConfig {
        &self.config
    }

    /// Return the name of the namespace holding `user`'s mail, creating the
    /// mapping if needed.
    pub fn lookup(&self, user: &str) -> Result<String, Error> {
        let user = normalize_user_name(user)?;
        if let Some(ns) = self.cache.borrow().get(&user) {
            return Ok(ns.clone());
        }

        let ns = if self.config.generated_namespace {
            self.generated_namespace(&user)?
        } else {
            format!("{}{}", user, self.config.ns_suffix)
        };

        debug!("{} User {} maps to namespace {}", self.log_prefix, user, ns);
        self.cache.borrow_mut().insert(user, ns.clone());
        Ok(ns)
    }

    /// Return a store handle within `user`'s namespace.
    pub fn open_user(&self, user: &str) -> Result<Rc<dyn ObjectStore>, Error> {
        let ns = self.lookup(user)?;
        self.store.in_namespace(&ns)
    }

    /// Return a store handle within the shared-mailbox namespace.
    pub fn open_public(&self) -> Result<Rc<dyn ObjectStore>, Error> {
        self.store.in_namespace(&self.config.public_namespace)
    }

    fn generated_namespace(&self, user: &str) -> Result<String, Error> {
        let ns_cfg = self.store.in_namespace(&self.config.ns_cfg)?;
        loop {
            match store::read_all(&*ns_cfg, user) {
                Ok(data) => {
                    return String::from_utf8(data)
                        .ok()
                        .filter(|ns| is_safe_name(ns))
                        .ok_or_else(|| {
                            Error::CorruptObject(
                                user.to_owned(),
                                "bad namespace mapping".to_owned(),
                            )
                        });
                }
                Err(Error::NxObject) => (),
                Err(e) => return Err(e),
            }

            let ns = ObjectId::generate().to_string();
            match ns_cfg.create(user, &mut ns.as_bytes(), &Default::default())
            {
                Ok(()) => {
                    info!(
                        "{} Assigned namespace {} to user {}",
                        self.log_prefix, ns, user
                    );
                    return Ok(ns);
                }
                // Lost a race with another session; use what it created
                Err(Error::ObjectExists) => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Rewrite `user` into a form usable as an object name.
///
/// Path separators are percent-escaped, as is `%` itself, so distinct user
/// names never share a namespace. Names that are still unusable after that
/// are rejected.
pub fn normalize_user_name(user: &str) -> Result<String, Error> {
    let name = find_and_replace(user, "%", "%25");
    let name = find_and_replace(&name, "/", "%2F");
    let name = find_and_replace(&name, "\\", "%5C");
    if is_safe_name(&name) {
        Ok(name)
    } else {
        Err(Error::UnsafeName)
    }
}
