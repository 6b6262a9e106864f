//! Repository facade: resolves an object id to its typed content,
//! trying the loose-object layout before falling back to pack files.

use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;

use crate::error::{OdbError, Result};
use crate::id::{ObjectId, ObjectType};
use crate::object::{self, Object};
use crate::pack::{apply_chain, resolve_chain, PackEntry, PackFile, PackIndex};

/// A read-only view over a git object database rooted at a directory
/// containing `objects/` (loose objects under `objects/<xx>/<rest>`,
/// packs under `objects/pack/*.{pack,idx}`).
pub struct Repository {
    objects_dir: PathBuf,
}

impl Repository {
    pub fn open<P: AsRef<Path>>(git_dir: P) -> Self {
        Self {
            objects_dir: git_dir.as_ref().join("objects"),
        }
    }

    fn loose_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    fn pack_dir(&self) -> PathBuf {
        self.objects_dir.join("pack")
    }

    /// Resolves `id` to its object, reading it as a loose file first
    /// and falling back to every pack index in `objects/pack`.
    ///
    /// Returns `OdbError::NotFound` if the id isn't present anywhere,
    /// distinct from any I/O error encountered while reading an entry
    /// that does exist.
    pub fn open_object(&self, id: &ObjectId) -> Result<Object> {
        if let Some(object) = self.open_loose(id)? {
            return Ok(object);
        }
        if let Some(object) = self.open_from_packs(id)? {
            return Ok(object);
        }
        Err(OdbError::NotFound)
    }

    fn open_loose(&self, id: &ObjectId) -> Result<Option<Object>> {
        let path = self.loose_path(id);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut z = ZlibDecoder::new(file);
        let (ty, size) = read_loose_header(&mut z)?;
        log::trace!("loose object {}: {} {} bytes", id, ty.name(), size);
        Ok(Some(object::parse(ty, size, Box::new(z))?))
    }

    fn open_from_packs(&self, id: &ObjectId) -> Result<Option<Object>> {
        let entries = match fs::read_dir(self.pack_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let path = entry?.path();
            if path.extension().map(|e| e == "idx").unwrap_or(false) {
                if let Some(object) = self.try_pack(&path, id)? {
                    return Ok(Some(object));
                }
            }
        }
        Ok(None)
    }

    fn try_pack(&self, idx_path: &Path, id: &ObjectId) -> Result<Option<Object>> {
        let index = match PackIndex::open(idx_path) {
            Ok(index) => index,
            Err(OdbError::UnsupportedVersion(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let offset = match index.find_offset(id) {
            Ok(offset) => offset,
            Err(OdbError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };

        let pack = PackFile::open(idx_path.with_extension("pack"))?;
        match pack.read_entry(offset)? {
            PackEntry::Blob { size, reader } => {
                log::trace!("found {} in pack {:?} as blob", id, idx_path);
                Ok(Some(object::parse(ObjectType::Blob, size, Box::new(reader))?))
            }
            PackEntry::Standard { ty, content } => {
                log::trace!("found {} in pack {:?} as {}", id, idx_path, ty.name());
                let size = content.len() as u64;
                Ok(Some(object::parse(ty, size, Box::new(Cursor::new(content)))?))
            }
            PackEntry::Delta(_) => {
                let header = pack.read_raw_header(offset)?;
                let chain = resolve_chain(&pack, &index, offset, header)?;
                let (ty, bytes) = apply_chain(&pack, &chain)?;
                log::trace!("found {} in pack {:?} as {}", id, idx_path, ty.name());
                let size = bytes.len() as u64;
                Ok(Some(object::parse(ty, size, Box::new(Cursor::new(bytes)))?))
            }
        }
    }
}

/// Reads the `<type> SP <size> NUL` header from a loose object's
/// decompressed stream.
fn read_loose_header<R: Read>(r: &mut R) -> Result<(ObjectType, u64)> {
    let mut header = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        r.read_exact(&mut byte)?;
        if byte[0] == 0 {
            break;
        }
        if header.len() > 32 {
            return Err(OdbError::MalformedObject(
                "loose object header ran past the NUL terminator".into(),
            ));
        }
        header.push(byte[0]);
    }

    let text = std::str::from_utf8(&header)
        .map_err(|_| OdbError::MalformedObject("loose object header is not UTF-8".into()))?;
    let (ty_str, size_str) = text
        .split_once(' ')
        .ok_or_else(|| OdbError::MalformedObject(format!("bad loose object header {:?}", text)))?;

    let ty = match ty_str {
        "commit" => ObjectType::Commit,
        "tree" => ObjectType::Tree,
        "blob" => ObjectType::Blob,
        "tag" => ObjectType::Tag,
        other => {
            return Err(OdbError::MalformedObject(format!(
                "unknown loose object type {:?}",
                other
            )))
        }
    };
    let size: u64 = size_str
        .parse()
        .map_err(|_| OdbError::MalformedObject(format!("bad loose object size {:?}", size_str)))?;

    Ok((ty, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_loose_object(dir: &Path, content: &str, ty: &str) -> ObjectId {
        let body = content.as_bytes();
        let header = format!("{} {}\0", ty, body.len());
        let mut full = header.into_bytes();
        full.extend_from_slice(body);

        let id = ObjectId::compute_from_bytes(&full);
        let hex = id.hex();
        let dir = dir.join("objects").join(&hex[..2]);
        fs::create_dir_all(&dir).unwrap();

        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&full).unwrap();
        let compressed = encoder.finish().unwrap();
        fs::write(dir.join(&hex[2..]), compressed).unwrap();
        id
    }

    #[test]
    fn opens_a_loose_blob() {
        let dir = tempfile::tempdir().unwrap();
        let id = write_loose_object(dir.path(), "hello world", "blob");

        let repo = Repository::open(dir.path());
        let object = repo.open_object(&id).unwrap();
        let mut blob = match object {
            Object::Blob(b) => b,
            _ => panic!("expected a blob"),
        };
        let mut content = String::new();
        blob.read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello world");
    }

    #[test]
    fn opens_a_loose_commit() {
        let dir = tempfile::tempdir().unwrap();
        let tree = "a".repeat(40);
        let body = format!(
            "tree {}\nauthor A <a@x.com> 1000 +0000\ncommitter A <a@x.com> 1000 +0000\n\nmsg",
            tree
        );
        let id = write_loose_object(dir.path(), &body, "commit");

        let repo = Repository::open(dir.path());
        let object = repo.open_object(&id).unwrap();
        let commit = object.as_commit().unwrap();
        assert_eq!(commit.message, "msg");
    }

    #[test]
    fn missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::open(dir.path());
        let missing = ObjectId::from_array([0x42; 20]);
        assert!(matches!(repo.open_object(&missing), Err(OdbError::NotFound)));
    }
}
