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

use std::cell::{RefCell, RefMut};
use std::io::{self, Read, Seek, SeekFrom};
use std::rc::Rc;

/// Wraps a type in a `Rc<RefCell<T>>` and provides the `std::io` traits for it
/// through simple delegation.
///
/// All clones share one cursor. This is how an open object's content stream
/// and its metadata reader see the same underlying input: anything that moves
/// the cursor for its own purposes must put it back, which
/// `with_position_restored` takes care of.
#[derive(Debug)]
pub struct RcIo<T>(Rc<RefCell<T>>);

impl<T> RcIo<T> {
    pub fn wrap(inner: T) -> Self {
        RcIo(Rc::new(RefCell::new(inner)))
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }
}

impl<T: Seek> RcIo<T> {
    /// Run `f` against the inner value, then seek back to wherever the shared
    /// cursor was beforehand.
    ///
    /// The cursor is restored even if `f` fails, but the error from `f` takes
    /// precedence over any error from restoring it.
    pub fn with_position_restored<R, E: From<io::Error>>(
        &self,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Result<R, E> {
        let mut inner = self.0.borrow_mut();
        let pos = inner.seek(SeekFrom::Current(0))?;
        let result = f(&mut *inner);
        let restored = inner.seek(SeekFrom::Start(pos));
        let ret = result?;
        restored?;
        Ok(ret)
    }
}

impl<T> Clone for RcIo<T> {
    fn clone(&self) -> Self {
        RcIo(Rc::clone(&self.0))
    }
}

impl<T: Read> Read for RcIo<T> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        self.0.borrow_mut().read(dst)
    }
}

impl<T: Seek> Seek for RcIo<T> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.borrow_mut().seek(pos)
    }
}
