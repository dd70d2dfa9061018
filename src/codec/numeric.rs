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

/// Whether `s` is a non-empty run of ASCII digits.
pub fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Like `is_numeric`, but the empty string is also accepted.
pub fn is_numeric_optional(s: &str) -> bool {
    s.is_empty() || is_numeric(s)
}

/// Parse a decimal integer attribute.
///
/// Signs, whitespace, and values that overflow are all rejected.
pub fn decode_u64(s: &str) -> Option<u64> {
    if is_numeric(s) {
        s.parse().ok()
    } else {
        None
    }
}
