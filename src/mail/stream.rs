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

//! Composition of a message's content from its object and any externalised
//! attachment parts.

use std::collections::VecDeque;
use std::io::{self, Cursor, Read};
use std::rc::Rc;

use crate::model::ObjectId;
use crate::store::ObjectStore;
use crate::support::error::Error;

/// One attachment part stored in its own object.
///
/// The part's bytes belong at `offset` in the logical message; the mail
/// object itself contains everything else, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentRef {
    pub offset: u64,
    pub size: u64,
    pub object_id: ObjectId,
}

/// Parse the external-references attribute: whitespace-separated
/// `offset size object-id` triples, in ascending, non-overlapping order.
pub fn parse_ext_refs(raw: &[u8]) -> Result<Vec<AttachmentRef>, Error> {
    let corrupt = || Error::corrupt("X", raw);
    let text = std::str::from_utf8(raw).map_err(|_| corrupt())?;
    let tokens = text.split_ascii_whitespace().collect::<Vec<_>>();
    if 0 != tokens.len() % 3 {
        return Err(corrupt());
    }

    let mut refs = Vec::<AttachmentRef>::with_capacity(tokens.len() / 3);
    let mut end = 0u64;
    for triple in tokens.chunks(3) {
        let offset = triple[0].parse::<u64>().map_err(|_| corrupt())?;
        let size = triple[1].parse::<u64>().map_err(|_| corrupt())?;
        let object_id = triple[2].parse::<ObjectId>().map_err(|_| corrupt())?;

        if offset < end {
            return Err(corrupt());
        }
        end = offset.checked_add(size).ok_or_else(corrupt)?;

        refs.push(AttachmentRef {
            offset,
            size,
            object_id,
        });
    }

    Ok(refs)
}

pub fn format_ext_refs(refs: &[AttachmentRef]) -> String {
    refs.iter()
        .map(|r| format!("{} {} {}", r.offset, r.size, r.object_id))
        .collect::<Vec<_>>()
        .join(" ")
}

/// The size of the logical message: `content_size` bytes held in the mail
/// object plus every attachment part.
///
/// Returns `None` if the total does not fit in a `u64`.
pub fn logical_size(content_size: u64, refs: &[AttachmentRef]) -> Option<u64> {
    refs.iter()
        .try_fold(content_size, |total, r| total.checked_add(r.size))
}

/// A reader over the logical content of a message.
///
/// `base` must yield exactly the content stored in the mail object. The
/// stream ends after `limit` bytes even if more content is available.
pub struct MailStream<R> {
    base: R,
    attachments: Option<Rc<dyn ObjectStore>>,
    parts: VecDeque<AttachmentRef>,
    current: Option<Cursor<Vec<u8>>>,
    pos: u64,
    limit: u64,
}

impl<R: Read> MailStream<R> {
    pub fn new(
        base: R,
        attachments: Option<Rc<dyn ObjectStore>>,
        parts: Vec<AttachmentRef>,
        limit: u64,
    ) -> Result<Self, Error> {
        if !parts.is_empty() && attachments.is_none() {
            return Err(Error::NoAttachmentStorage);
        }

        Ok(MailStream {
            base,
            attachments,
            parts: parts.into(),
            current: None,
            pos: 0,
            limit,
        })
    }

    fn load_part(&mut self, part: AttachmentRef) -> io::Result<()> {
        let store = self.attachments.as_ref().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, Error::NoAttachmentStorage)
        })?;
        let data = store
            .read(&part.object_id.to_string(), 0, part.size)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        if data.len() as u64 != part.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("attachment {} is truncated", part.object_id),
            ));
        }

        self.current = Some(Cursor::new(data));
        Ok(())
    }
}

impl<R: Read> Read for MailStream<R> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        loop {
            if dst.is_empty() || self.pos >= self.limit {
                return Ok(0);
            }

            let max = (dst.len() as u64).min(self.limit - self.pos) as usize;

            if let Some(ref mut current) = self.current {
                let n = current.read(&mut dst[..max])?;
                if n > 0 {
                    self.pos += n as u64;
                    return Ok(n);
                }
                self.current = None;
                continue;
            }

            let next_offset = self.parts.front().map(|p| p.offset);
            match next_offset {
                Some(offset) if offset <= self.pos => {
                    if let Some(part) = self.parts.pop_front() {
                        self.load_part(part)?;
                    }
                }

                Some(offset) => {
                    let max = max.min((offset - self.pos) as usize);
                    let n = self.base.read(&mut dst[..max])?;
                    if 0 == n {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "content ends before attachment offset",
                        ));
                    }
                    self.pos += n as u64;
                    return Ok(n);
                }

                None => {
                    let n = self.base.read(&mut dst[..max])?;
                    self.pos += n as u64;
                    return Ok(n);
                }
            }
        }
    }
}

/// Compute the size of `src` with every bare LF counted as CRLF.
pub fn virtual_size(mut src: impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8192];
    let mut total = 0u64;
    let mut prev_cr = false;

    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if io::ErrorKind::Interrupted == e.kind() => continue,
            Err(e) => return Err(e),
        };

        let chunk = &buf[..n];
        total += n as u64;
        for ix in memchr::memchr_iter(b'\n', chunk) {
            let preceded_by_cr = if 0 == ix {
                prev_cr
            } else {
                b'\r' == chunk[ix - 1]
            };
            if !preceded_by_cr {
                total += 1;
            }
        }
        prev_cr = b'\r' == chunk[n - 1];
    }

    Ok(total)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::MetadataMap;
    use crate::store::MemoryStore;

    fn read_all(mut r: impl Read) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        r.read_to_end(&mut data)?;
        Ok(data)
    }

    #[test]
    fn ext_refs_parsing() {
        let a = ObjectId(1);
        let b = ObjectId(2);
        let text = format!("10 5 {} 20 3 {}", a, b);
        let refs = parse_ext_refs(text.as_bytes()).unwrap();
        assert_eq!(
            vec![
                AttachmentRef {
                    offset: 10,
                    size: 5,
                    object_id: a
                },
                AttachmentRef {
                    offset: 20,
                    size: 3,
                    object_id: b
                },
            ],
            refs
        );
        assert_eq!(text, format_ext_refs(&refs));
        assert_eq!(Some(8), logical_size(0, &refs));
        assert_eq!(Some(18), logical_size(10, &refs));
        assert_eq!(None, logical_size(u64::MAX - 7, &refs));

        assert!(parse_ext_refs(b"").unwrap().is_empty());
        assert_matches!(Err(Error::Corrupt { .. }), parse_ext_refs(b"1 2"));
        assert_matches!(
            Err(Error::Corrupt { .. }),
            parse_ext_refs(format!("x 5 {}", a).as_bytes())
        );
        // Overlapping parts
        assert_matches!(
            Err(Error::Corrupt { .. }),
            parse_ext_refs(format!("10 5 {} 12 3 {}", a, b).as_bytes())
        );
        // A part ending past u64::MAX
        assert_matches!(
            Err(Error::Corrupt { .. }),
            parse_ext_refs(
                format!("18446744073709551615 1 {} 0 1 {}", a, b).as_bytes()
            )
        );
    }

    #[test]
    fn stitches_attachments() {
        let store = MemoryStore::new("att");
        let a = ObjectId(0xa);
        let b = ObjectId(0xb);
        store
            .create(&a.to_string(), &mut &b"AAA"[..], &MetadataMap::new())
            .unwrap();
        store
            .create(&b.to_string(), &mut &b"BB"[..], &MetadataMap::new())
            .unwrap();

        let parts = vec![
            AttachmentRef {
                offset: 0,
                size: 3,
                object_id: a,
            },
            AttachmentRef {
                offset: 5,
                size: 2,
                object_id: b,
            },
        ];
        let stream = MailStream::new(
            &b"xyzw"[..],
            Some(Rc::new(store.clone())),
            parts.clone(),
            9,
        )
        .unwrap();
        assert_eq!(b"AAAxyBBzw".to_vec(), read_all(stream).unwrap());

        // Bounded by the limit
        let stream = MailStream::new(
            &b"xyzw"[..],
            Some(Rc::new(store.clone())),
            parts.clone(),
            4,
        )
        .unwrap();
        assert_eq!(b"AAAx".to_vec(), read_all(stream).unwrap());

        // Base content too short to reach the second part
        let stream =
            MailStream::new(&b"x"[..], Some(Rc::new(store)), parts, 100)
                .unwrap();
        assert!(read_all(stream).is_err());
    }

    #[test]
    fn attachments_require_store() {
        let parts = vec![AttachmentRef {
            offset: 0,
            size: 1,
            object_id: ObjectId(1),
        }];
        assert_matches!(
            Err(Error::NoAttachmentStorage),
            MailStream::new(&b""[..], None, parts, 1).map(|_| ())
        );
    }

    #[test]
    fn virtual_size_counts_bare_lf() {
        assert_eq!(0, virtual_size(&b""[..]).unwrap());
        assert_eq!(4, virtual_size(&b"a\r\nb"[..]).unwrap());
        assert_eq!(4, virtual_size(&b"a\nb"[..]).unwrap());
        assert_eq!(6, virtual_size(&b"\n\n\r\n"[..]).unwrap());

        // CR and LF split across reads
        let src = (&b"a\r"[..]).chain(&b"\nb\n"[..]);
        assert_eq!(6, virtual_size(src).unwrap());
    }
}
