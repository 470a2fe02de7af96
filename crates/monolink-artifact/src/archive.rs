//! Archive container
//!
//! Unix `ar` layout: global magic `!<arch>\n`, then per-member 60-byte
//! headers (name 16, mtime 12, uid 6, gid 6, mode 8, size 10, terminator
//! `` `\n ``) with member data padded to even length. This is the fixed
//! external contract; monolink reads it for inspection and writes it when
//! consolidating.

use std::fmt;

/// Global archive magic.
pub const MAGIC: &[u8; 8] = b"!<arch>\n";

const HEADER_LEN: usize = 60;
const NAME_LEN: usize = 16;
const SIZE_LEN: usize = 10;
const TERMINATOR: [u8; 2] = [0x60, 0x0a];

/// Errors reading or writing the archive container.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArchiveError {
    /// Input does not start with `!<arch>\n`.
    #[error("bad archive magic")]
    BadMagic,

    /// A member header is malformed or the terminator is missing.
    #[error("malformed member header at offset {0}")]
    MalformedHeader(usize),

    /// The declared member size runs past the end of the input.
    #[error("truncated member '{name}' at offset {offset}")]
    TruncatedMember {
        /// Member name from the header.
        name: String,
        /// Offset of the member header.
        offset: usize,
    },

    /// A member name does not fit the 16-byte header field.
    #[error("member name too long: '{0}'")]
    NameTooLong(String),

    /// A member's size does not fit the 10-byte decimal size field.
    #[error("member '{name}' too large ({size} bytes)")]
    MemberTooLarge {
        /// Member name.
        name: String,
        /// Declared size in bytes.
        size: usize,
    },
}

/// One member of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    /// Member name, trailing header padding stripped.
    pub name: String,
    /// Raw member bytes.
    pub data: Vec<u8>,
}

impl fmt::Display for ArchiveMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.name, self.data.len())
    }
}

/// A parsed archive, members in container order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    /// Members in the order they appear.
    pub members: Vec<ArchiveMember>,
}

impl Archive {
    /// Whether the given bytes look like an archive.
    #[inline]
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> bool {
        bytes.len() >= MAGIC.len() && &bytes[..MAGIC.len()] == MAGIC
    }

    /// Parse an archive from its serialized form.
    ///
    /// # Errors
    /// Returns [`ArchiveError`] for wrong magic, malformed headers, or
    /// members whose declared size overruns the input.
    pub fn parse(bytes: &[u8]) -> Result<Self, ArchiveError> {
        if !Self::sniff(bytes) {
            return Err(ArchiveError::BadMagic);
        }

        let mut members = Vec::new();
        let mut offset = MAGIC.len();

        while offset < bytes.len() {
            if offset + HEADER_LEN > bytes.len() {
                return Err(ArchiveError::MalformedHeader(offset));
            }
            let header = &bytes[offset..offset + HEADER_LEN];
            if header[58..60] != TERMINATOR {
                return Err(ArchiveError::MalformedHeader(offset));
            }

            let name = str_field(&header[..NAME_LEN])
                .ok_or(ArchiveError::MalformedHeader(offset))?
                .to_string();
            let size: usize = str_field(&header[48..58])
                .and_then(|s| s.parse().ok())
                .ok_or(ArchiveError::MalformedHeader(offset))?;

            let data_start = offset + HEADER_LEN;
            let data_end = data_start + size;
            if data_end > bytes.len() {
                return Err(ArchiveError::TruncatedMember { name, offset });
            }

            members.push(ArchiveMember {
                name,
                data: bytes[data_start..data_end].to_vec(),
            });

            // Member data is padded to even length.
            offset = data_end + (size & 1);
        }

        Ok(Self { members })
    }
}

fn str_field(raw: &[u8]) -> Option<&str> {
    std::str::from_utf8(raw).ok().map(str::trim_end)
}

/// Incremental archive writer.
///
/// Members are emitted in append order, which is what makes consolidated
/// output deterministic in content given identical ordered inputs.
#[derive(Debug, Default)]
pub struct ArchiveWriter {
    buf: Vec<u8>,
}

impl ArchiveWriter {
    /// Start a new archive.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: MAGIC.to_vec(),
        }
    }

    /// Append one member.
    ///
    /// # Errors
    /// Returns [`ArchiveError::NameTooLong`] when `name` exceeds the
    /// 16-byte header field, [`ArchiveError::MemberTooLarge`] when the
    /// member size overflows the 10-byte decimal size field.
    pub fn append(&mut self, name: &str, data: &[u8]) -> Result<(), ArchiveError> {
        if name.len() > NAME_LEN {
            return Err(ArchiveError::NameTooLong(name.to_string()));
        }
        let size = size_field(name, data.len())?;

        let mut header = [b' '; HEADER_LEN];
        header[..name.len()].copy_from_slice(name.as_bytes());
        fill_field(&mut header[16..28], "0"); // mtime
        fill_field(&mut header[28..34], "0"); // uid
        fill_field(&mut header[34..40], "0"); // gid
        fill_field(&mut header[40..48], "644"); // mode
        fill_field(&mut header[48..58], &size);
        header[58..60].copy_from_slice(&TERMINATOR);

        self.buf.extend_from_slice(&header);
        self.buf.extend_from_slice(data);
        if data.len() & 1 == 1 {
            self.buf.push(b'\n');
        }
        Ok(())
    }

    /// Finish and return the serialized archive.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Render a member size, rejecting values the header field cannot hold.
fn size_field(name: &str, size: usize) -> Result<String, ArchiveError> {
    let rendered = size.to_string();
    if rendered.len() > SIZE_LEN {
        return Err(ArchiveError::MemberTooLarge {
            name: name.to_string(),
            size,
        });
    }
    Ok(rendered)
}

fn fill_field(field: &mut [u8], value: &str) {
    field[..value.len()].copy_from_slice(value.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ArchiveWriter::new();
        for (name, data) in members {
            writer.append(name, data).unwrap();
        }
        writer.finish()
    }

    #[test]
    fn writes_and_parses_members_in_order() {
        let bytes = build(&[("alpha.o", b"aaa"), ("beta.o", b"bb")]);
        let archive = Archive::parse(&bytes).unwrap();

        assert_eq!(archive.members.len(), 2);
        assert_eq!(archive.members[0].name, "alpha.o");
        assert_eq!(archive.members[0].data, b"aaa");
        assert_eq!(archive.members[1].name, "beta.o");
    }

    #[test]
    fn odd_sized_members_are_padded() {
        let bytes = build(&[("odd.o", b"xyz"), ("next.o", b"1234")]);
        // Total length stays even after each member.
        assert_eq!(bytes.len() % 2, 0);
        let archive = Archive::parse(&bytes).unwrap();
        assert_eq!(archive.members[1].data, b"1234");
    }

    #[test]
    fn empty_archive_is_just_magic() {
        let bytes = ArchiveWriter::new().finish();
        assert_eq!(bytes, MAGIC);
        let archive = Archive::parse(&bytes).unwrap();
        assert!(archive.members.is_empty());
    }

    #[test]
    fn rejects_bad_magic() {
        assert_eq!(Archive::parse(b"not an ar").unwrap_err(), ArchiveError::BadMagic);
    }

    #[test]
    fn rejects_truncated_member() {
        let mut bytes = build(&[("lib.o", b"0123456789")]);
        bytes.truncate(bytes.len() - 4);
        let err = Archive::parse(&bytes).unwrap_err();
        assert!(matches!(err, ArchiveError::TruncatedMember { name, .. } if name == "lib.o"));
    }

    #[test]
    fn rejects_member_size_overflowing_the_header_field() {
        // 11 decimal digits cannot be materialized as a real member, so the
        // guard is checked directly.
        let err = size_field("huge.o", 10_000_000_000).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MemberTooLarge { size, .. } if size == 10_000_000_000
        ));
        assert_eq!(size_field("ok.o", 9_999_999_999).unwrap(), "9999999999");
    }

    #[test]
    fn rejects_overlong_member_name() {
        let mut writer = ArchiveWriter::new();
        let err = writer
            .append("a-very-long-member-name.o", b"data")
            .unwrap_err();
        assert!(matches!(err, ArchiveError::NameTooLong(_)));
    }
}
