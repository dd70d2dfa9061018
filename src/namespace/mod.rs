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

//! Namespace configuration: how users map onto object store namespaces, and
//! which attributes are kept on mail objects.

pub mod attributes;
pub mod config;
pub mod manager;

pub use self::attributes::{MutableAttributes, DEFAULT_MUTABLE_ATTRIBUTES};
pub use self::config::{NamespaceConfig, CFG_OBJECT_NAME};
pub use self::manager::{normalize_user_name, NamespaceManager};
