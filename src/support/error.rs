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

use std::io;

use thiserror::Error;

/// Coarse classification of an `Error`, used by callers to decide between
/// retrying, reconciling, and reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The object or attribute does not exist. This may be expected, e.g.
    /// after a concurrent expunge.
    NotFound,
    /// A value is present but cannot be decoded.
    Corrupt,
    /// A store-level failure that may succeed if retried.
    Transient,
    /// A migration left two copies (or none) behind.
    Inconsistent,
    /// The UID validity changed during a sync.
    Stale,
    /// The host asked for a lookup that must not touch the store.
    Aborted,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Object not found")]
    NxObject,
    #[error("Object already exists")]
    ObjectExists,
    #[error("Message has been expunged")]
    ExpungedMessage,
    #[error("Unexpectedly lost uid={0}")]
    LostMessage(u32),
    #[error("No index record for uid={0}")]
    NxRecord(u32),
    #[error("uid={0} is already open in this transaction")]
    UidInUse(u32),
    #[error("No alternate storage configured")]
    NoAltStorage,
    #[error("No attachment storage configured")]
    NoAttachmentStorage,
    #[error("Lookup aborted: data not in cache")]
    LookupAborted,
    #[error("Corrupt value for attribute {key}: {value:?}")]
    Corrupt { key: String, value: String },
    #[error("Corrupt object {0}: {1}")]
    CorruptObject(String, String),
    #[error("Invalid namespace configuration")]
    BadConfig,
    #[error("Unsafe user name")]
    UnsafeName,
    #[error("Inconsistent state after migrating {0}: {1}")]
    Inconsistent(String, String),
    #[error("UID validity changed during sync")]
    StaleSync,
    #[error("Sync can no longer be cancelled")]
    SyncNotCancellable,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Nix(#[from] nix::Error),
    #[error(transparent)]
    Cbor(#[from] serde_cbor::error::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Error::NxObject
            | Error::ExpungedMessage
            | Error::LostMessage(..)
            | Error::NxRecord(..) => ErrorKind::NotFound,

            Error::Corrupt { .. }
            | Error::CorruptObject(..)
            | Error::BadConfig
            | Error::UnsafeName
            | Error::Cbor(..)
            | Error::Json(..) => ErrorKind::Corrupt,

            Error::Inconsistent(..) => ErrorKind::Inconsistent,
            Error::StaleSync => ErrorKind::Stale,
            Error::LookupAborted => ErrorKind::Aborted,

            Error::Io(ref e) if io::ErrorKind::NotFound == e.kind() => {
                ErrorKind::NotFound
            }

            Error::ObjectExists
            | Error::UidInUse(..)
            | Error::NoAltStorage
            | Error::NoAttachmentStorage
            | Error::SyncNotCancellable
            | Error::Io(..)
            | Error::Nix(..) => ErrorKind::Transient,
        }
    }

    pub fn is_not_found(&self) -> bool {
        ErrorKind::NotFound == self.kind()
    }

    /// Whether this error should raise the host's "mailbox corrupted"
    /// signal.
    pub fn needs_attention(&self) -> bool {
        match self.kind() {
            ErrorKind::Corrupt | ErrorKind::Inconsistent => true,
            _ => matches!(*self, Error::LostMessage(..)),
        }
    }

    pub(crate) fn corrupt(key: impl ToString, value: &[u8]) -> Self {
        Error::Corrupt {
            key: key.to_string(),
            value: String::from_utf8_lossy(value).into_owned(),
        }
    }
}
