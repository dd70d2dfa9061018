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

//! Translation of logical mail records into objects.
//!
//! A `MailTransaction` is one access scope over a mailbox. Within it, each
//! `Mail` names a message by its identity in the host index; opening it
//! resolves the backing object through the index record and registers a
//! handle in the transaction's arena, where it is shared with any other
//! `Mail` for the same UID until the last one is closed.

use std::path::Path;
use std::rc::Rc;

use crate::model::{MailIdentity, Tier, Uid};
use crate::namespace::MutableAttributes;
use crate::store::{FsStore, ObjectStore};
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;
use crate::support::system_config::{ExpungePolicy, SystemConfig};

mod handle;
pub mod host;
mod ops;
mod save;
pub mod stream;
#[cfg(test)]
pub mod test_prelude;

pub use self::handle::{HandleArena, ObjectHandle};
pub use self::host::{DateField, IndexHost, SizeField};
pub use self::ops::MailTransaction;
pub use self::save::NewMail;
pub use self::stream::{AttachmentRef, MailStream};

/// The object stores backing one mailbox, and the policy for using them.
pub struct Storage {
    pub log_prefix: LogPrefix,
    pub primary: Rc<dyn ObjectStore>,
    pub alternate: Option<Rc<dyn ObjectStore>>,
    pub attachments: Option<Rc<dyn ObjectStore>>,
    pub attributes: MutableAttributes,
    pub expunge_policy: ExpungePolicy,
}

impl Storage {
    pub fn new(log_prefix: LogPrefix, primary: Rc<dyn ObjectStore>) -> Self {
        Storage {
            log_prefix,
            primary,
            alternate: None,
            attachments: None,
            attributes: MutableAttributes::default(),
            expunge_policy: ExpungePolicy::default(),
        }
    }

    /// Open the directory-backed stores named by `config`, resolving
    /// relative paths against `root`.
    pub fn from_config(
        log_prefix: LogPrefix,
        config: &SystemConfig,
        root: &Path,
    ) -> Result<Self, Error> {
        let open = |name: &str,
                    path: &Path|
         -> Result<Rc<dyn ObjectStore>, Error> {
            Ok(Rc::new(FsStore::open(name, &root.join(path))?))
        };

        Ok(Storage {
            log_prefix,
            primary: open("primary", config.storage.primary.as_path())?,
            alternate: config
                .storage
                .alternate
                .as_ref()
                .map(|p| open("alternate", p.as_path()))
                .transpose()?,
            attachments: config
                .storage
                .attachments
                .as_ref()
                .map(|p| open("attachments", p.as_path()))
                .transpose()?,
            attributes: MutableAttributes::new(
                config.mail.attributes.as_deref(),
            ),
            expunge_policy: config.mail.expunge_policy,
        })
    }

    /// Derive the storage for `namespace` in every tier.
    ///
    /// Attachment parts are shared by all namespaces and stay where they
    /// are.
    pub fn in_namespace(&self, namespace: &str) -> Result<Self, Error> {
        Ok(Storage {
            log_prefix: self.log_prefix.clone(),
            primary: self.primary.in_namespace(namespace)?,
            alternate: self
                .alternate
                .as_ref()
                .map(|s| s.in_namespace(namespace))
                .transpose()?,
            attachments: self.attachments.clone(),
            attributes: self.attributes,
            expunge_policy: self.expunge_policy,
        })
    }

    pub fn tier(&self, tier: Tier) -> Result<Rc<dyn ObjectStore>, Error> {
        match tier {
            Tier::Primary => Ok(Rc::clone(&self.primary)),
            Tier::Alternate => {
                self.alternate.clone().ok_or(Error::NoAltStorage)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MailState {
    Unopened,
    Opening,
    Opened,
    Closed,
    /// Terminal: the backing object is gone.
    Expunged,
}

/// Whether `open` found the handle already in the transaction or had to
/// open the object itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenOutcome {
    Reused,
    Opened,
}

/// Fields answered by `MailTransaction::get_special`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecialField {
    /// Total number of references to the backing object.
    Refcount,
    Pop3Uidl,
    Pop3Order,
    Guid,
    MailboxGuid,
}

/// One message as seen through a transaction.
#[derive(Debug)]
pub struct Mail {
    identity: MailIdentity,
    state: MailState,
}

impl Mail {
    pub fn new(identity: MailIdentity) -> Self {
        Mail {
            identity,
            state: MailState::Unopened,
        }
    }

    pub fn identity(&self) -> MailIdentity {
        self.identity
    }

    pub fn uid(&self) -> Uid {
        self.identity.uid
    }

    pub fn state(&self) -> MailState {
        self.state
    }
}
