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

//! The compact string form of the 8-bit mail flags.
//!
//! Each set bit becomes one character from a fixed alphabet, written in
//! ascending bit order. The two reserved bits have characters too, so every
//! `u8` has exactly one canonical string.

use bitflags::bitflags;

bitflags! {
    #[derive(Default)]
    pub struct MailFlags: u8 {
        const ANSWERED = 0x01;
        const FLAGGED = 0x02;
        const DELETED = 0x04;
        const SEEN = 0x08;
        const DRAFT = 0x10;
        const RECENT = 0x20;
        const RESERVED_6 = 0x40;
        const RESERVED_7 = 0x80;
    }
}

const ALPHABET: [(MailFlags, char, &str); 8] = [
    (MailFlags::ANSWERED, 'A', "\\Answered"),
    (MailFlags::FLAGGED, 'F', "\\Flagged"),
    (MailFlags::DELETED, 'T', "\\Deleted"),
    (MailFlags::SEEN, 'S', "\\Seen"),
    (MailFlags::DRAFT, 'D', "\\Draft"),
    (MailFlags::RECENT, 'N', "\\Recent"),
    (MailFlags::RESERVED_6, 'x', "$Reserved6"),
    (MailFlags::RESERVED_7, 'y', "$Reserved7"),
];

pub fn flags_to_string(flags: MailFlags) -> String {
    ALPHABET
        .iter()
        .filter(|&&(f, _, _)| flags.contains(f))
        .map(|&(_, c, _)| c)
        .collect()
}

/// Parse the compact string form.
///
/// Any character outside the alphabet fails the whole conversion.
pub fn string_to_flags(s: &str) -> Option<MailFlags> {
    s.chars().try_fold(MailFlags::empty(), |acc, c| {
        ALPHABET
            .iter()
            .find(|&&(_, ch, _)| ch == c)
            .map(|&(f, _, _)| acc | f)
    })
}

/// Render `flags` for humans, e.g. `\Answered \Seen`.
pub fn resolve_flags(flags: MailFlags) -> String {
    ALPHABET
        .iter()
        .filter(|&&(f, _, _)| flags.contains(f))
        .map(|&(_, _, name)| name)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_bitmask_round_trips() {
        for bits in 0..=255u8 {
            let flags = MailFlags::from_bits_truncate(bits);
            assert_eq!(bits, flags.bits());
            let s = flags_to_string(flags);
            assert_eq!(bits.count_ones() as usize, s.len());
            assert_eq!(Some(flags), string_to_flags(&s));
        }
    }

    #[test]
    fn canonical_order() {
        assert_eq!(
            "AFTSDN",
            flags_to_string(MailFlags::from_bits_truncate(0x3f))
        );
        assert_eq!("", flags_to_string(MailFlags::empty()));
        // Order on input doesn't matter
        assert_eq!(
            Some(MailFlags::SEEN | MailFlags::ANSWERED),
            string_to_flags("SA")
        );
    }

    #[test]
    fn unknown_character_fails_everything() {
        assert_eq!(None, string_to_flags("ASq"));
        assert_eq!(None, string_to_flags(" "));
        assert_eq!(Some(MailFlags::empty()), string_to_flags(""));
    }

    #[test]
    fn human_readable() {
        assert_eq!(
            "\\Answered \\Seen",
            resolve_flags(MailFlags::SEEN | MailFlags::ANSWERED)
        );
        assert_eq!("", resolve_flags(MailFlags::empty()));
    }
}
