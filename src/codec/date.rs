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

//! The textual date form used for date-kind attributes.
//!
//! Dates are always `YYYY-MM-DD HH:MM:SS` in UTC, with every field
//! zero-padded. Anything else, including a value chrono itself would be
//! lenient about, is rejected.

use chrono::prelude::*;

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATE_SHAPE: &[u8; 19] = b"0000-00-00 00:00:00";

/// Parse `s` into seconds since the UNIX epoch.
///
/// Returns `None` if `s` is not exactly in the fixed pattern or names an
/// impossible date.
pub fn decode_date(s: &str) -> Option<i64> {
    let bytes = s.as_bytes();
    if DATE_SHAPE.len() != bytes.len() {
        return None;
    }

    let shape_ok = DATE_SHAPE.iter().zip(bytes).all(|(&shape, &b)| {
        if b'0' == shape {
            b.is_ascii_digit()
        } else {
            shape == b
        }
    });
    if !shape_ok {
        return None;
    }

    NaiveDateTime::parse_from_str(s, DATE_FORMAT)
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

/// Format `t` (seconds since the UNIX epoch) in the fixed pattern.
///
/// Returns `None` if the year would not fit in four digits.
pub fn encode_date(t: i64) -> Option<String> {
    let dt = DateTime::<Utc>::from_timestamp(t, 0)?;
    if !(0..=9999).contains(&dt.year()) {
        return None;
    }

    Some(dt.format(DATE_FORMAT).to_string())
}

/// Re-render a pattern date as its decimal epoch-seconds string.
///
/// Malformed input produces the empty string.
pub fn convert_string_to_date(s: &str) -> String {
    decode_date(s).map(|t| t.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parse_valid_dates() {
        assert_eq!(Some(1507637532), decode_date("2017-10-10 12:12:12"));
        assert_eq!(Some(0), decode_date("1970-01-01 00:00:00"));
    }

    #[test]
    fn reject_malformed_dates() {
        assert_eq!(None, decode_date("2017-2-2 "));
        assert_eq!(None, decode_date(""));
        assert_eq!(None, decode_date("2017-02-02"));
        assert_eq!(None, decode_date("2017-02-02 12:12:12 "));
        assert_eq!(None, decode_date("2017-02-02T12:12:12"));
        assert_eq!(None, decode_date("2017-02-30 12:12:12"));
        assert_eq!(None, decode_date("2017-02-02 25:00:00"));
        assert_eq!(None, decode_date("asjsjsjsj09202920"));
    }

    #[test]
    fn string_to_date_string() {
        assert_eq!("1507637532", convert_string_to_date("2017-10-10 12:12:12"));
        assert_eq!("", convert_string_to_date("asjsjsjsj09202920"));
    }

    #[test]
    fn format_dates() {
        assert_eq!(
            Some("2017-10-10 12:12:12".to_owned()),
            encode_date(1507637532)
        );
        assert_eq!(None, encode_date(253_402_300_800));
    }

    proptest! {
        #[test]
        fn date_round_trip(t in 0i64..=253_402_300_799) {
            let s = encode_date(t).unwrap();
            prop_assert_eq!(Some(t), decode_date(&s));
        }
    }
}
