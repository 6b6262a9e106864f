use std::fmt;
use std::str::FromStr;

use crate::error::OdbError;

/// A 20-byte SHA-1 object identifier.
#[derive(Debug, Clone, Copy, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, OdbError> {
        if bytes.len() != 20 {
            return Err(OdbError::MalformedObject(format!(
                "expected a 20-byte id, got {} bytes",
                bytes.len()
            )));
        }
        let mut contents = [0u8; 20];
        contents.copy_from_slice(bytes);
        Ok(Self(contents))
    }

    pub fn from_array(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn compute_from_bytes(bytes: &[u8]) -> Self {
        use sha1::Digest;
        use sha1::Sha1;

        let digest: [u8; 20] = Sha1::digest(bytes).into();
        Self(digest)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn hex(&self) -> String {
        faster_hex::hex_string(&self.0)
    }

    /// First byte of the identifier; selects the fan-out bucket.
    pub fn bucket(&self) -> u8 {
        self.0[0]
    }
}

impl FromStr for ObjectId {
    type Err = OdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 40 {
            return Err(OdbError::MalformedObject(format!(
                "id must be exactly 40 hex characters, got {}",
                s.len()
            )));
        }
        let mut contents = [0u8; 20];
        faster_hex::hex_decode(s.as_bytes(), &mut contents)
            .map_err(|_| OdbError::MalformedObject(format!("invalid hex id {:?}", s)))?;
        Ok(Self(contents))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

/// Tag identifying the kind of a git object, per the encoding used
/// inside pack-file object headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Commit = 1,
    Tree = 2,
    Blob = 3,
    Tag = 4,
    OfsDelta = 6,
    RefDelta = 7,
}

impl ObjectType {
    pub fn from_type_id(id: u8) -> Result<Self, OdbError> {
        match id {
            1 => Ok(ObjectType::Commit),
            2 => Ok(ObjectType::Tree),
            3 => Ok(ObjectType::Blob),
            4 => Ok(ObjectType::Tag),
            6 => Ok(ObjectType::OfsDelta),
            7 => Ok(ObjectType::RefDelta),
            other => Err(OdbError::UnknownType(other)),
        }
    }

    pub fn is_standard(self) -> bool {
        matches!(
            self,
            ObjectType::Commit | ObjectType::Tree | ObjectType::Blob | ObjectType::Tag
        )
    }

    pub fn is_delta(self) -> bool {
        matches!(self, ObjectType::OfsDelta | ObjectType::RefDelta)
    }

    pub fn name(self) -> &'static str {
        match self {
            ObjectType::Commit => "commit",
            ObjectType::Tree => "tree",
            ObjectType::Blob => "blob",
            ObjectType::Tag => "tag",
            ObjectType::OfsDelta => "ofs-delta",
            ObjectType::RefDelta => "ref-delta",
        }
    }
}

/// The 256-entry cumulative counter table at the head of a pack index.
///
/// `fanout[b]` is the number of identifiers in the table whose first
/// byte is `<= b`; it is monotonically non-decreasing and
/// `fanout[255]` equals the object count.
#[derive(Debug, Clone)]
pub struct FanOut([u32; 256]);

impl FanOut {
    pub fn new(counts: [u32; 256]) -> Self {
        Self(counts)
    }

    pub fn total(&self) -> u32 {
        self.0[255]
    }

    /// Half-open `[start, end)` bound within the identifier table for
    /// identifiers whose first byte is exactly `b`.
    pub fn bounds(&self, b: u8) -> std::ops::Range<usize> {
        let end = self.0[b as usize] as usize;
        let start = if b > 0 {
            self.0[(b - 1) as usize] as usize
        } else {
            0
        };
        start..end
    }

    pub fn is_non_decreasing(&self) -> bool {
        self.0.windows(2).all(|w| w[0] <= w[1])
    }
}
