//! Typed views over a decompressed standard object's bytes.

use std::io::Read;
use std::str::FromStr;

use crate::error::{OdbError, Result};
use crate::id::{ObjectId, ObjectType};

/// A parsed, typed object. Blob is the one variant that doesn't
/// materialize its content eagerly — it stays a byte stream so large
/// blobs can be consumed without buffering the whole thing.
pub enum Object {
    Commit(Commit),
    Tree(Tree),
    Tag(Tag),
    Blob(Blob),
}

impl Object {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Object::Commit(_) => ObjectType::Commit,
            Object::Tree(_) => ObjectType::Tree,
            Object::Tag(_) => ObjectType::Tag,
            Object::Blob(_) => ObjectType::Blob,
        }
    }

    pub fn as_commit(&self) -> Option<&Commit> {
        match self {
            Object::Commit(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Object::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            Object::Tag(t) => Some(t),
            _ => None,
        }
    }
}

/// A streamed blob: its declared size plus a reader over its content.
/// Owns whatever keeps its bytes alive — a file handle for a loose
/// object, a pack handle for a direct standard entry, or an in-memory
/// cursor for one reconstructed from a delta chain.
pub struct Blob {
    pub size: u64,
    reader: Box<dyn Read + Send>,
}

impl Blob {
    pub fn new(size: u64, reader: Box<dyn Read + Send>) -> Self {
        Self { size, reader }
    }
}

impl Read for Blob {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

/// Dispatches decompressed object bytes to the appropriate typed
/// parser. Commit/Tree/Tag are read fully into memory since their
/// fields need to be parsed structurally; Blob keeps the stream.
pub fn parse(ty: ObjectType, size: u64, mut reader: Box<dyn Read + Send>) -> Result<Object> {
    match ty {
        ObjectType::Blob => Ok(Object::Blob(Blob::new(size, reader))),
        ObjectType::Commit => {
            let mut content = Vec::with_capacity(size as usize);
            reader.read_to_end(&mut content)?;
            Ok(Object::Commit(Commit::parse(&content)?))
        }
        ObjectType::Tree => {
            let mut content = Vec::with_capacity(size as usize);
            reader.read_to_end(&mut content)?;
            Ok(Object::Tree(Tree::parse(&content)?))
        }
        ObjectType::Tag => {
            let mut content = Vec::with_capacity(size as usize);
            reader.read_to_end(&mut content)?;
            Ok(Object::Tag(Tag::parse(&content)?))
        }
        ObjectType::OfsDelta | ObjectType::RefDelta => Err(OdbError::MalformedObject(
            "cannot parse a delta entry as a standard object".into(),
        )),
    }
}

/// `Name <email> unix_ts tz_offset`, as used for both `author` and
/// `committer`/`tagger` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub timestamp: i64,
    /// The timezone offset exactly as written, e.g. `+0900` or `-0500`.
    pub tz_offset: String,
}

impl FromStr for Signature {
    type Err = OdbError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || OdbError::MalformedObject(format!("bad signature line {:?}", s));

        let email_start = s.find('<').ok_or_else(malformed)?;
        let email_end = s.find('>').ok_or_else(malformed)?;
        if email_end < email_start {
            return Err(malformed());
        }
        let name = s[..email_start].trim_end().to_owned();
        let email = s[email_start + 1..email_end].to_owned();
        let rest = s[email_end + 1..].trim();

        let mut parts = rest.split_whitespace();
        let timestamp: i64 = parts
            .next()
            .ok_or_else(malformed)?
            .parse()
            .map_err(|_| malformed())?;
        let tz_offset = parts.next().ok_or_else(malformed)?.to_owned();

        Ok(Signature {
            name,
            email,
            timestamp,
            tz_offset,
        })
    }
}

/// A commit object. Unrecognized header lines are preserved verbatim
/// rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
    pub extra_headers: Vec<(String, String)>,
}

impl Commit {
    pub fn parse(content: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(content)
            .map_err(|_| OdbError::MalformedObject("commit is not valid UTF-8".into()))?;

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut extra_headers = Vec::new();

        let mut lines = text.lines();
        for line in &mut lines {
            if line.is_empty() {
                break;
            }
            let (key, value) = line
                .split_once(' ')
                .ok_or_else(|| OdbError::MalformedObject(format!("bad header line {:?}", line)))?;
            match key {
                "tree" => tree = Some(value.parse()?),
                "parent" => parents.push(value.parse()?),
                "author" => author = Some(value.parse()?),
                "committer" => committer = Some(value.parse()?),
                other => extra_headers.push((other.to_owned(), value.to_owned())),
            }
        }

        let message = lines.collect::<Vec<_>>().join("\n");

        Ok(Commit {
            tree: tree.ok_or_else(|| OdbError::MalformedObject("commit missing tree".into()))?,
            parents,
            author: author
                .ok_or_else(|| OdbError::MalformedObject("commit missing author".into()))?,
            committer: committer
                .ok_or_else(|| OdbError::MalformedObject("commit missing committer".into()))?,
            message,
            extra_headers,
        })
    }
}

/// A tag object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub object: ObjectId,
    pub target_type: String,
    pub tag: String,
    pub tagger: Option<Signature>,
    pub message: String,
}

impl Tag {
    pub fn parse(content: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(content)
            .map_err(|_| OdbError::MalformedObject("tag is not valid UTF-8".into()))?;

        let mut object = None;
        let mut target_type = None;
        let mut tag = None;
        let mut tagger = None;

        let mut lines = text.lines();
        for line in &mut lines {
            if line.is_empty() {
                break;
            }
            let (key, value) = line
                .split_once(' ')
                .ok_or_else(|| OdbError::MalformedObject(format!("bad header line {:?}", line)))?;
            match key {
                "object" => object = Some(value.parse()?),
                "type" => target_type = Some(value.to_owned()),
                "tag" => tag = Some(value.to_owned()),
                "tagger" => tagger = Some(value.parse()?),
                _ => {}
            }
        }

        let message = lines.collect::<Vec<_>>().join("\n");

        Ok(Tag {
            object: object.ok_or_else(|| OdbError::MalformedObject("tag missing object".into()))?,
            target_type: target_type
                .ok_or_else(|| OdbError::MalformedObject("tag missing type".into()))?,
            tag: tag.ok_or_else(|| OdbError::MalformedObject("tag missing tag name".into()))?,
            tagger,
            message,
        })
    }
}

/// The kind of thing a tree entry's mode names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Tree,
    Blob,
    Symlink,
    Commit,
    Other,
}

impl EntryKind {
    fn from_mode(mode: u32) -> Self {
        match mode {
            0o040000 => EntryKind::Tree,
            0o100644 | 0o100664 | 0o100755 => EntryKind::Blob,
            0o120000 => EntryKind::Symlink,
            0o160000 => EntryKind::Commit,
            _ => EntryKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: u32,
    pub kind: EntryKind,
    pub name: String,
    pub id: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn parse(content: &[u8]) -> Result<Self> {
        let mut entries = Vec::new();
        let mut rest = content;

        while !rest.is_empty() {
            let space = rest
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| OdbError::MalformedObject("tree entry missing mode".into()))?;
            let mode_str = std::str::from_utf8(&rest[..space])
                .map_err(|_| OdbError::MalformedObject("tree entry mode is not UTF-8".into()))?;
            let mode = u32::from_str_radix(mode_str, 8)
                .map_err(|_| OdbError::MalformedObject(format!("bad octal mode {:?}", mode_str)))?;

            let name_start = space + 1;
            let nul = rest[name_start..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| OdbError::MalformedObject("tree entry missing name terminator".into()))?
                + name_start;
            let name = std::str::from_utf8(&rest[name_start..nul])
                .map_err(|_| OdbError::MalformedObject("tree entry name is not UTF-8".into()))?
                .to_owned();

            let id_start = nul + 1;
            let id_end = id_start + 20;
            if id_end > rest.len() {
                return Err(OdbError::MalformedObject(
                    "tree entry truncated before id".into(),
                ));
            }
            let id = ObjectId::from_bytes(&rest[id_start..id_end])?;

            entries.push(TreeEntry {
                mode,
                kind: EntryKind::from_mode(mode),
                name,
                id,
            });

            rest = &rest[id_end..];
        }

        Ok(Tree { entries })
    }
}
