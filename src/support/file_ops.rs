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

//! Miscellaneous functions for working with files.

use std::fs;
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::support::error::Error;

/// Write `data` into the file at `path`, atomically.
///
/// The file will first be staged within `tmp`.
///
/// If `overwrite` is true, this will replace anything already at `path`. If
/// false, the call will fail if `path` already exists.
pub fn spit(
    tmp: impl AsRef<Path>,
    path: impl AsRef<Path>,
    overwrite: bool,
    data: &[u8],
) -> io::Result<()> {
    let mut tf = tempfile::NamedTempFile::new_in(tmp)?;
    tf.as_file_mut().write_all(data)?;
    tf.as_file_mut().sync_all()?;
    if overwrite {
        tf.persist(path)?;
    } else {
        tf.persist_noclobber(path)?;
    }
    Ok(())
}

/// An exclusive advisory lock, held until dropped.
pub struct FileLock {
    _file: fs::File,
}

/// Take an exclusive `flock()` on `path`, creating it if needed.
///
/// Blocks until the lock is available.
pub fn lock_exclusive(path: impl AsRef<Path>) -> Result<FileLock, Error> {
    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)?;
    nix::fcntl::flock(file.as_raw_fd(), nix::fcntl::FlockArg::LockExclusive)?;
    Ok(FileLock { _file: file })
}

pub trait IgnoreKinds {
    fn ignore_not_found(self) -> Self;
}

impl<R: Default> IgnoreKinds for Result<R, io::Error> {
    fn ignore_not_found(self) -> Self {
        match self {
            Ok(r) => Ok(r),
            Err(e) if io::ErrorKind::NotFound == e.kind() => Ok(R::default()),
            Err(e) => Err(e),
        }
    }
}

pub trait ErrorTransforms {
    type Coerced;
    fn on_exists(self, error: Error) -> Self::Coerced;
    fn on_not_found(self, error: Error) -> Self::Coerced;
}

impl<R, E: Into<Error>> ErrorTransforms for Result<R, E> {
    type Coerced = Result<R, Error>;

    fn on_exists(self, error: Error) -> Result<R, Error> {
        match self.map_err(|e| e.into()) {
            Err(Error::Io(e)) if io::ErrorKind::AlreadyExists == e.kind() => {
                Err(error)
            }
            s => s,
        }
    }

    fn on_not_found(self, error: Error) -> Result<R, Error> {
        match self.map_err(|e| e.into()) {
            Err(Error::Io(e)) if io::ErrorKind::NotFound == e.kind() => {
                Err(error)
            }
            s => s,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn spit_respects_overwrite() {
        let root = tempfile::TempDir::new().unwrap();
        let path = root.path().join("foo");

        spit(root.path(), &path, false, b"one").unwrap();
        assert!(spit(root.path(), &path, false, b"two").is_err());
        assert_eq!(b"one", &fs::read(&path).unwrap()[..]);

        spit(root.path(), &path, true, b"three").unwrap();
        assert_eq!(b"three", &fs::read(&path).unwrap()[..]);
    }

    #[test]
    fn not_found_is_coerced() {
        let root = tempfile::TempDir::new().unwrap();
        let res =
            fs::read(root.path().join("nx")).on_not_found(Error::NxObject);
        assert_matches!(Err(Error::NxObject), res);

        let res: io::Result<Vec<u8>> =
            fs::read(root.path().join("nx")).ignore_not_found();
        assert!(res.unwrap().is_empty());
    }
}
