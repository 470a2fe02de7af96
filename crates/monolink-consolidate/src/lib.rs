//! monolink archive consolidation
//!
//! Merges a group of related, already-verified archives into one output so
//! a downstream linker resolves all required symbols from a single name.
//!
//! Two members defining the same strong symbol is a
//! [`ConsolidateError::DuplicateSymbol`] — genuine build-graph ambiguity
//! that requires operator intervention (reorder or exclude a member), never
//! auto-resolution. The consolidator also never repairs policy drift: every
//! member must be Built-and-Verified before it gets here.

use monolink_artifact::{Archive, ArchiveWriter, ObjectFile};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Maximum member name length the archive header can hold.
const MEMBER_NAME_MAX: usize = 16;

/// A primary output identity plus the ordered member artifacts to merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidationGroup {
    /// Name of the consolidated output (without extension).
    pub output: String,
    /// Member artifacts, in merge order.
    pub members: Vec<PathBuf>,
}

impl ConsolidationGroup {
    /// Create a group.
    #[must_use]
    pub fn new(output: impl Into<String>, members: Vec<PathBuf>) -> Self {
        Self {
            output: output.into(),
            members,
        }
    }
}

/// Consolidation failure.
#[derive(Debug, thiserror::Error)]
pub enum ConsolidateError {
    /// A group with no members has nothing to merge.
    #[error("consolidation group '{0}' has no members")]
    EmptyGroup(String),

    /// Two members define the same strong symbol.
    #[error(
        "duplicate strong symbol '{symbol}' defined by {} and {}",
        first.display(),
        second.display()
    )]
    DuplicateSymbol {
        /// The conflicting symbol name.
        symbol: String,
        /// Member that defined it first.
        first: PathBuf,
        /// Member that defined it again.
        second: PathBuf,
    },

    /// A member is not in a recognized artifact format.
    #[error("member {}: {reason}", path.display())]
    MemberUnreadable {
        /// The offending member artifact.
        path: PathBuf,
        /// What made it unreadable.
        reason: String,
    },

    /// Filesystem failure reading a member or writing the output.
    #[error("io error on {}: {source}", path.display())]
    Io {
        /// The offending path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// One object pulled out of a member artifact, with provenance.
struct MergedObject {
    source: PathBuf,
    member_name: String,
    data: Vec<u8>,
    object: ObjectFile,
}

/// Merge all member artifacts of `group` into `<out_dir>/<output>.lka`.
///
/// Deterministic in symbol content given identical ordered inputs. Objects
/// are copied member-by-member in group order; strong defined symbols are
/// checked for conflicts across the whole group before anything is written.
///
/// # Errors
/// [`ConsolidateError::DuplicateSymbol`] on a strong-symbol conflict
/// (naming both members), [`ConsolidateError::MemberUnreadable`] when a
/// member cannot be parsed, [`ConsolidateError::Io`] on filesystem failure.
pub fn consolidate(group: &ConsolidationGroup, out_dir: &Path) -> Result<PathBuf, ConsolidateError> {
    if group.members.is_empty() {
        return Err(ConsolidateError::EmptyGroup(group.output.clone()));
    }

    tracing::debug!(
        output = %group.output,
        members = group.members.len(),
        "consolidating group"
    );

    let mut objects = Vec::new();
    for member in &group.members {
        collect_objects(member, &mut objects)?;
    }

    // Conflict check over the whole group before writing anything.
    let mut defined_by: HashMap<&str, &MergedObject> = HashMap::new();
    for merged in &objects {
        for symbol in merged.object.defined_strong() {
            if let Some(previous) = defined_by.get(symbol.name.as_str()) {
                return Err(ConsolidateError::DuplicateSymbol {
                    symbol: symbol.name.clone(),
                    first: previous.source.clone(),
                    second: merged.source.clone(),
                });
            }
            defined_by.insert(symbol.name.as_str(), merged);
        }
    }

    let mut writer = ArchiveWriter::new();
    let mut used_names = HashSet::new();
    for (idx, merged) in objects.iter().enumerate() {
        let name = unique_member_name(&merged.source, &merged.member_name, idx, &mut used_names);
        // Names are clamped to the header field; only an oversized member
        // can make append fail.
        writer
            .append(&name, &merged.data)
            .map_err(|e| ConsolidateError::MemberUnreadable {
                path: merged.source.clone(),
                reason: e.to_string(),
            })?;
    }

    let out_path = out_dir.join(format!("{}.lka", group.output));
    std::fs::write(&out_path, writer.finish()).map_err(|source| ConsolidateError::Io {
        path: out_path.clone(),
        source,
    })?;

    tracing::info!(
        output = %out_path.display(),
        objects = objects.len(),
        symbols = defined_by.len(),
        "consolidated"
    );
    Ok(out_path)
}

/// Union of defined symbol names across one artifact's objects.
///
/// Used to check consolidation completeness: absent duplicate strong
/// symbols, the output's set equals the union of the members' sets.
pub fn defined_symbols(path: &Path) -> Result<BTreeSet<String>, ConsolidateError> {
    let mut objects = Vec::new();
    collect_objects(path, &mut objects)?;
    Ok(objects
        .iter()
        .flat_map(|m| m.object.defined().map(|s| s.name.clone()))
        .collect())
}

fn collect_objects(path: &Path, out: &mut Vec<MergedObject>) -> Result<(), ConsolidateError> {
    let unreadable = |reason: String| ConsolidateError::MemberUnreadable {
        path: path.to_path_buf(),
        reason,
    };

    let bytes = std::fs::read(path).map_err(|source| ConsolidateError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if Archive::sniff(&bytes) {
        let archive = Archive::parse(&bytes).map_err(|e| unreadable(e.to_string()))?;
        for member in archive.members {
            let object = ObjectFile::parse(&member.data)
                .map_err(|e| unreadable(format!("member '{}': {e}", member.name)))?;
            out.push(MergedObject {
                source: path.to_path_buf(),
                member_name: member.name,
                data: member.data,
                object,
            });
        }
        return Ok(());
    }

    if ObjectFile::sniff(&bytes) {
        let object = ObjectFile::parse(&bytes).map_err(|e| unreadable(e.to_string()))?;
        let member_name = path
            .file_stem()
            .map(|s| format!("{}.o", s.to_string_lossy()))
            .unwrap_or_else(|| "member.o".to_string());
        out.push(MergedObject {
            source: path.to_path_buf(),
            member_name,
            data: bytes,
            object,
        });
        return Ok(());
    }

    Err(unreadable("unrecognized format".to_string()))
}

/// Build a provenance-bearing member name that fits the header field and
/// stays unique within the output archive.
fn unique_member_name(
    source: &Path,
    member_name: &str,
    idx: usize,
    used: &mut HashSet<String>,
) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut candidate = format!("{stem}/{member_name}");
    if candidate.len() > MEMBER_NAME_MAX {
        candidate = member_name.to_string();
    }
    if candidate.len() > MEMBER_NAME_MAX || used.contains(&candidate) {
        candidate = format!("{idx}_{member_name}");
        clamp_name(&mut candidate);
    }
    // Index prefix makes the fallback unique; earlier shapes can collide.
    while used.contains(&candidate) {
        candidate = format!("{idx}_{candidate}");
        clamp_name(&mut candidate);
    }
    used.insert(candidate.clone());
    candidate
}

/// Clamp a member name to the header field without splitting a character.
fn clamp_name(name: &mut String) {
    if name.len() <= MEMBER_NAME_MAX {
        return;
    }
    let mut end = MEMBER_NAME_MAX;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use monolink_artifact::{ArchiveWriter, ObjectFile, Symbol};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_archive(dir: &Path, name: &str, objects: &[ObjectFile]) -> PathBuf {
        let mut writer = ArchiveWriter::new();
        for (i, object) in objects.iter().enumerate() {
            writer
                .append(&format!("o{i}.o"), &object.to_bytes().unwrap())
                .unwrap();
        }
        let path = dir.join(format!("{name}.lka"));
        std::fs::write(&path, writer.finish()).unwrap();
        path
    }

    fn object(directive: &str, symbols: Vec<Symbol>) -> ObjectFile {
        ObjectFile::new(vec![directive.to_string()], symbols)
    }

    #[test]
    fn merges_members_and_preserves_symbols() {
        let dir = TempDir::new().unwrap();
        let a = write_archive(
            dir.path(),
            "zlib",
            &[object("LIBCMT", vec![Symbol::strong("inflate")])],
        );
        let b = write_archive(
            dir.path(),
            "png",
            &[object("LIBCMT", vec![Symbol::strong("png_read")])],
        );

        let group = ConsolidationGroup::new("core_bundle", vec![a.clone(), b.clone()]);
        let out = consolidate(&group, dir.path()).unwrap();

        assert_eq!(out.file_name().unwrap(), "core_bundle.lka");
        let merged = defined_symbols(&out).unwrap();
        let mut expected = defined_symbols(&a).unwrap();
        expected.extend(defined_symbols(&b).unwrap());
        assert_eq!(merged, expected);
    }

    #[test]
    fn duplicate_strong_symbol_names_both_members() {
        let dir = TempDir::new().unwrap();
        let a = write_archive(
            dir.path(),
            "a",
            &[object("LIBCMT", vec![Symbol::strong("foo")])],
        );
        let b = write_archive(
            dir.path(),
            "b",
            &[object("LIBCMT", vec![Symbol::strong("foo")])],
        );

        let group = ConsolidationGroup::new("g", vec![a.clone(), b.clone()]);
        let err = consolidate(&group, dir.path()).unwrap_err();

        match err {
            ConsolidateError::DuplicateSymbol { symbol, first, second } => {
                assert_eq!(symbol, "foo");
                assert_eq!(first, a);
                assert_eq!(second, b);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn weak_duplicates_are_allowed() {
        let dir = TempDir::new().unwrap();
        let a = write_archive(dir.path(), "a", &[object("LIBCMT", vec![Symbol::weak("w")])]);
        let b = write_archive(dir.path(), "b", &[object("LIBCMT", vec![Symbol::weak("w")])]);

        let group = ConsolidationGroup::new("g", vec![a, b]);
        assert!(consolidate(&group, dir.path()).is_ok());
    }

    #[test]
    fn undefined_references_never_conflict() {
        let dir = TempDir::new().unwrap();
        let a = write_archive(
            dir.path(),
            "a",
            &[object("LIBCMT", vec![Symbol::strong("f"), Symbol::undefined("g")])],
        );
        let b = write_archive(
            dir.path(),
            "b",
            &[object("LIBCMT", vec![Symbol::strong("g")])],
        );

        let group = ConsolidationGroup::new("g", vec![a, b]);
        assert!(consolidate(&group, dir.path()).is_ok());
    }

    #[test]
    fn multibyte_member_names_are_clamped_safely() {
        let dir = TempDir::new().unwrap();
        let mut members = Vec::new();
        for (name, symbol) in [("€€€€€€", "a"), ("€€€€€€b", "b")] {
            let path = dir.path().join(format!("{name}.lko"));
            std::fs::write(
                &path,
                object("LIBCMT", vec![Symbol::strong(symbol)]).to_bytes().unwrap(),
            )
            .unwrap();
            members.push(path);
        }

        let group = ConsolidationGroup::new("g", members);
        let out = consolidate(&group, dir.path()).unwrap();

        let archive = Archive::parse(&std::fs::read(&out).unwrap()).unwrap();
        for member in &archive.members {
            assert!(member.name.len() <= MEMBER_NAME_MAX, "name: {}", member.name);
        }
        assert_eq!(
            defined_symbols(&out).unwrap(),
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn empty_group_is_rejected() {
        let dir = TempDir::new().unwrap();
        let group = ConsolidationGroup::new("empty", vec![]);
        let err = consolidate(&group, dir.path()).unwrap_err();
        assert!(matches!(err, ConsolidateError::EmptyGroup(name) if name == "empty"));
    }

    #[test]
    fn unreadable_member_is_reported() {
        let dir = TempDir::new().unwrap();
        let bogus = dir.path().join("bogus.lka");
        std::fs::write(&bogus, b"not an archive").unwrap();

        let group = ConsolidationGroup::new("g", vec![bogus]);
        let err = consolidate(&group, dir.path()).unwrap_err();
        assert!(matches!(err, ConsolidateError::MemberUnreadable { .. }));
    }

    #[test]
    fn bare_object_members_are_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stub.lko");
        std::fs::write(
            &path,
            object("LIBCMT", vec![Symbol::strong("s")]).to_bytes().unwrap(),
        )
        .unwrap();

        let group = ConsolidationGroup::new("g", vec![path]);
        let out = consolidate(&group, dir.path()).unwrap();
        assert_eq!(
            defined_symbols(&out).unwrap(),
            BTreeSet::from(["s".to_string()])
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Output symbol set equals the union of member symbol sets
            /// when no duplicate strong symbols exist.
            #[test]
            fn consolidation_preserves_symbol_union(
                names in proptest::collection::btree_set("[a-z][a-z0-9_]{0,8}", 1..24),
                chunks in 1usize..4,
            ) {
                let dir = TempDir::new().unwrap();
                let names: Vec<String> = names.into_iter().collect();

                let mut members = Vec::new();
                for (i, chunk) in names.chunks(names.len().div_ceil(chunks)).enumerate() {
                    let symbols = chunk.iter().map(Symbol::strong).collect();
                    members.push(write_archive(
                        dir.path(),
                        &format!("m{i}"),
                        &[object("LIBCMT", symbols)],
                    ));
                }

                let group = ConsolidationGroup::new("union", members);
                let out = consolidate(&group, dir.path()).unwrap();

                let expected: BTreeSet<String> = names.into_iter().collect();
                prop_assert_eq!(defined_symbols(&out).unwrap(), expected);
            }
        }
    }
}
