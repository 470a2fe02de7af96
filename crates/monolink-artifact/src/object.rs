//! LK object layout
//!
//! The per-object metadata format the inspector consumes. The layout is an
//! external contract — monolink reads and writes it but does not define it:
//!
//! ```text
//! magic           4 bytes  "LKOB"
//! version         u16 LE   (currently 1)
//! directive count u16 LE
//! symbol count    u16 LE
//! directives      count x (u16 LE length, ASCII bytes)
//! symbols         count x (u8 flags, u16 LE length, name bytes)
//! ```
//!
//! Symbol flag bits: bit 0 = weak, bit 1 = defined.

use std::fmt;

/// Object file magic.
pub const MAGIC: [u8; 4] = *b"LKOB";

/// Supported layout version.
pub const VERSION: u16 = 1;

const FLAG_WEAK: u8 = 0b0000_0001;
const FLAG_DEFINED: u8 = 0b0000_0010;

/// Errors reading or writing the object layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectError {
    /// Input does not start with the object magic.
    #[error("bad object magic")]
    BadMagic,

    /// Unsupported layout version.
    #[error("unsupported object version {0}")]
    UnsupportedVersion(u16),

    /// Input ended before the declared content.
    #[error("truncated object at offset {0}")]
    Truncated(usize),

    /// A directive or symbol name is not valid UTF-8.
    #[error("invalid name encoding at offset {0}")]
    InvalidName(usize),

    /// A name or table exceeds what the u16 fields can describe.
    #[error("object field too large: {0}")]
    TooLarge(&'static str),
}

/// A symbol table entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    /// Symbol name.
    pub name: String,
    /// Weak binding (weak duplicates are permitted at link time).
    pub weak: bool,
    /// Defined here, as opposed to an undefined reference.
    pub defined: bool,
}

impl Symbol {
    /// A strong defined symbol — the kind that may conflict.
    #[inline]
    #[must_use]
    pub fn strong(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weak: false,
            defined: true,
        }
    }

    /// A weak defined symbol.
    #[inline]
    #[must_use]
    pub fn weak(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weak: true,
            defined: true,
        }
    }

    /// An undefined reference to be resolved downstream.
    #[inline]
    #[must_use]
    pub fn undefined(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weak: false,
            defined: false,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match (self.defined, self.weak) {
            (true, false) => "T",
            (true, true) => "W",
            (false, _) => "U",
        };
        write!(f, "{kind} {}", self.name)
    }
}

/// One object's metadata: directive labels plus symbol table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectFile {
    /// Runtime-linkage directives, in declaration order.
    pub directives: Vec<String>,
    /// Symbol table, in declaration order.
    pub symbols: Vec<Symbol>,
}

impl ObjectFile {
    /// Build an object with the given directives and symbols.
    #[must_use]
    pub fn new(directives: Vec<String>, symbols: Vec<Symbol>) -> Self {
        Self { directives, symbols }
    }

    /// Parse an object from its serialized form.
    ///
    /// # Errors
    /// Returns [`ObjectError`] for wrong magic, unknown version, truncated
    /// input, or malformed names.
    pub fn parse(bytes: &[u8]) -> Result<Self, ObjectError> {
        let mut cursor = Cursor::new(bytes);

        let magic = cursor.take(4)?;
        if magic != MAGIC {
            return Err(ObjectError::BadMagic);
        }
        let version = cursor.read_u16()?;
        if version != VERSION {
            return Err(ObjectError::UnsupportedVersion(version));
        }
        let directive_count = cursor.read_u16()? as usize;
        let symbol_count = cursor.read_u16()? as usize;

        let mut directives = Vec::with_capacity(directive_count);
        for _ in 0..directive_count {
            directives.push(cursor.read_name()?);
        }

        let mut symbols = Vec::with_capacity(symbol_count);
        for _ in 0..symbol_count {
            let flags = cursor.read_u8()?;
            let name = cursor.read_name()?;
            symbols.push(Symbol {
                name,
                weak: flags & FLAG_WEAK != 0,
                defined: flags & FLAG_DEFINED != 0,
            });
        }

        Ok(Self { directives, symbols })
    }

    /// Serialize to the on-disk layout.
    ///
    /// # Errors
    /// Returns [`ObjectError::TooLarge`] when a table or name exceeds the
    /// u16 fields of the layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ObjectError> {
        let directive_count = u16::try_from(self.directives.len())
            .map_err(|_| ObjectError::TooLarge("directive table"))?;
        let symbol_count = u16::try_from(self.symbols.len())
            .map_err(|_| ObjectError::TooLarge("symbol table"))?;

        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&directive_count.to_le_bytes());
        out.extend_from_slice(&symbol_count.to_le_bytes());

        for directive in &self.directives {
            write_name(&mut out, directive, "directive name")?;
        }
        for symbol in &self.symbols {
            let mut flags = 0u8;
            if symbol.weak {
                flags |= FLAG_WEAK;
            }
            if symbol.defined {
                flags |= FLAG_DEFINED;
            }
            out.push(flags);
            write_name(&mut out, &symbol.name, "symbol name")?;
        }

        Ok(out)
    }

    /// Iterate over strong defined symbols (the conflict-relevant kind).
    pub fn defined_strong(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|s| s.defined && !s.weak)
    }

    /// Iterate over all defined symbols.
    pub fn defined(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|s| s.defined)
    }

    /// Whether the given bytes look like an LK object.
    #[inline]
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> bool {
        bytes.len() >= 4 && bytes[..4] == MAGIC
    }
}

fn write_name(out: &mut Vec<u8>, name: &str, what: &'static str) -> Result<(), ObjectError> {
    let len = u16::try_from(name.len()).map_err(|_| ObjectError::TooLarge(what))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    Ok(())
}

/// Bounds-checked reader over the raw bytes.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ObjectError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(ObjectError::Truncated(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, ObjectError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, ObjectError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_name(&mut self) -> Result<String, ObjectError> {
        let at = self.pos;
        let len = self.read_u16()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| ObjectError::InvalidName(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ObjectFile {
        ObjectFile::new(
            vec!["LIBCMT".to_string()],
            vec![
                Symbol::strong("inflate"),
                Symbol::weak("memcpy_fallback"),
                Symbol::undefined("malloc"),
            ],
        )
    }

    #[test]
    fn round_trips_through_bytes() {
        let object = sample();
        let bytes = object.to_bytes().unwrap();
        let parsed = ObjectFile::parse(&bytes).unwrap();
        assert_eq!(parsed, object);
    }

    #[test]
    fn rejects_bad_magic() {
        let err = ObjectFile::parse(b"ELF\x7fwhatever").unwrap_err();
        assert_eq!(err, ObjectError::BadMagic);
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[4] = 9;
        let err = ObjectFile::parse(&bytes).unwrap_err();
        assert_eq!(err, ObjectError::UnsupportedVersion(9));
    }

    #[test]
    fn rejects_truncated_input() {
        let bytes = sample().to_bytes().unwrap();
        let err = ObjectFile::parse(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, ObjectError::Truncated(_)));
    }

    #[test]
    fn strong_filter_skips_weak_and_undefined() {
        let object = sample();
        let strong: Vec<&str> = object.defined_strong().map(|s| s.name.as_str()).collect();
        assert_eq!(strong, vec!["inflate"]);
    }

    #[test]
    fn sniff_detects_magic() {
        assert!(ObjectFile::sniff(&sample().to_bytes().unwrap()));
        assert!(!ObjectFile::sniff(b"!<arch>\n"));
        assert!(!ObjectFile::sniff(b"LK"));
    }
}
