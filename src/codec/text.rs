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

/// Replace every occurrence of `pattern` in `text` with `replacement`.
///
/// The scan is a single left-to-right pass over non-overlapping matches;
/// text produced by a replacement is never scanned again. An empty pattern
/// matches nothing.
pub fn find_and_replace(
    text: &str,
    pattern: &str,
    replacement: &str,
) -> String {
    if pattern.is_empty() {
        return text.to_owned();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(ix) = rest.find(pattern) {
        out.push_str(&rest[..ix]);
        out.push_str(replacement);
        rest = &rest[ix + pattern.len()..];
    }
    out.push_str(rest);
    out
}
