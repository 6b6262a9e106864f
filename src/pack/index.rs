use std::fs::File;
use std::io::Read;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{OdbError, Result};
use crate::id::{FanOut, ObjectId};

const MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];

/// A parsed `.idx` file: fan-out table plus positional access into the
/// identifier, CRC and offset tables that follow it.
///
/// Reads against the tables are positional (`pread`-style) rather than
/// going through a shared seek cursor, so a `PackIndex` can be shared
/// across concurrent lookups without synchronization.
pub struct PackIndex {
    file: File,
    version: u32,
    fanout: FanOut,
    sha_base: u64,
}

impl PackIndex {
    /// Opens the `.idx` file at `path`, appending the extension if
    /// missing. Pack-index v1 is recognized but rejected — only v2 is
    /// supported for lookups.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = with_idx_extension(path.as_ref());
        let mut file = File::open(&path)?;

        let mut peek = [0u8; 4];
        file.read_exact(&mut peek)?;

        let version = if peek == MAGIC {
            file.read_u32::<BigEndian>()?
        } else {
            // Not the v2 magic: these 4 bytes are the start of the v1
            // fan-out table. Rewind so the fan-out read below sees them.
            file = File::open(&path)?;
            1
        };

        if version > 2 {
            return Err(OdbError::UnsupportedVersion(version));
        }

        let mut fanout = [0u32; 256];
        for slot in fanout.iter_mut() {
            *slot = file.read_u32::<BigEndian>()?;
        }
        let fanout = FanOut::new(fanout);

        if version == 1 {
            log::debug!("pack index {:?} is v1; refusing lookups", path);
            return Err(OdbError::UnsupportedVersion(1));
        }

        let sha_base = (u64::from(version) - 1) * 8 + 256 * 4;

        log::trace!(
            "opened pack index {:?}: version={} objects={}",
            path,
            version,
            fanout.total()
        );

        Ok(Self {
            file,
            version,
            fanout,
            sha_base,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn fanout(&self) -> &FanOut {
        &self.fanout
    }

    fn object_count(&self) -> u64 {
        u64::from(self.fanout.total())
    }

    /// Reads the identifier at table position `pos`.
    pub fn read_sha1(&self, pos: usize) -> Result<ObjectId> {
        let mut buf = [0u8; 20];
        let offset = self.sha_base + (pos as u64) * 20;
        self.file.read_exact_at(&mut buf, offset)?;
        Ok(ObjectId::from_array(buf))
    }

    /// Reads the pack offset stored at table position `pos`.
    ///
    /// Fails with `LargeOffsetUnsupported` if the stored value has its
    /// high bit set, which would otherwise index into the 64-bit
    /// large-offset table this reader does not implement.
    pub fn read_offset(&self, pos: usize) -> Result<u64> {
        let n = self.object_count();
        let offset = self.sha_base + n * 20 + n * 4 + (pos as u64) * 4;
        let mut buf = [0u8; 4];
        self.file.read_exact_at(&mut buf, offset)?;
        let raw = u32::from_be_bytes(buf);
        if raw & 0x8000_0000 != 0 {
            return Err(OdbError::LargeOffsetUnsupported);
        }
        Ok(u64::from(raw))
    }

    /// Binary-searches the identifier table for `target`, returning its
    /// table position.
    pub fn find_sha1(&self, target: &ObjectId) -> Result<usize> {
        let bounds = self.fanout.bounds(target.bucket());
        let (mut s, mut e) = (bounds.start, bounds.end);

        while s < e {
            let mid = s + (e - s) / 2;
            let candidate = self.read_sha1(mid)?;
            match candidate.cmp(target) {
                std::cmp::Ordering::Less => s = mid + 1,
                std::cmp::Ordering::Greater => e = mid,
                std::cmp::Ordering::Equal => {
                    log::trace!("found {} at index position {}", target, mid);
                    return Ok(mid);
                }
            }
        }
        Err(OdbError::NotFound)
    }

    /// Resolves `target` directly to a pack offset.
    pub fn find_offset(&self, target: &ObjectId) -> Result<u64> {
        let pos = self.find_sha1(target)?;
        self.read_offset(pos)
    }
}

fn with_idx_extension(path: &Path) -> PathBuf {
    if path.extension().map(|ext| ext == "idx").unwrap_or(false) {
        path.to_path_buf()
    } else {
        let mut owned = path.to_path_buf().into_os_string();
        owned.push(".idx");
        PathBuf::from(owned)
    }
}

/// Narrow capability the delta-chain resolver needs: turning a
/// `RefDelta`'s base identifier into a pack offset. Expressed as a
/// trait so the resolver can be exercised against an in-memory fake
/// instead of a real `.idx` file.
pub trait FindOffset {
    fn find_offset(&self, id: &ObjectId) -> Result<u64>;
}

impl FindOffset for PackIndex {
    fn find_offset(&self, id: &ObjectId) -> Result<u64> {
        PackIndex::find_offset(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_v2_index(ids: &[[u8; 20]], offsets: &[u32]) -> Vec<u8> {
        let mut sorted: Vec<[u8; 20]> = ids.to_vec();
        sorted.sort();

        let mut fanout = [0u32; 256];
        for id in &sorted {
            for slot in fanout.iter_mut().skip(id[0] as usize) {
                *slot += 1;
            }
        }

        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&2u32.to_be_bytes());
        for f in fanout {
            buf.extend_from_slice(&f.to_be_bytes());
        }
        for id in &sorted {
            buf.extend_from_slice(id);
        }
        for _ in &sorted {
            buf.extend_from_slice(&0u32.to_be_bytes()); // crc, unused by reads
        }
        for (id, off) in sorted.iter().zip(offsets) {
            let _ = id;
            buf.extend_from_slice(&off.to_be_bytes());
        }
        buf.extend_from_slice(&[0u8; 20]); // pack checksum
        buf.extend_from_slice(&[0u8; 20]); // index checksum
        buf
    }

    fn write_index(dir: &tempfile::TempDir, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join("pack.idx");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn fanout_bounds_are_half_open() {
        let mut counts = [0u32; 256];
        counts[0x2a] = 17;
        counts[0x2b] = 20;
        for c in counts.iter_mut().skip(0x2b + 1) {
            *c = 20;
        }
        let fanout = FanOut::new(counts);
        assert_eq!(fanout.bounds(0x2b), 17..20);
    }

    #[test]
    fn finds_every_id_and_rejects_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut ids = Vec::new();
        for i in 0u8..10 {
            let mut id = [0u8; 20];
            id[0] = 0x10;
            id[19] = i;
            ids.push(id);
        }
        let offsets: Vec<u32> = (0..10).map(|i| 100 + i * 17).collect();
        let bytes = build_v2_index(&ids, &offsets);
        let path = write_index(&dir, &bytes);

        let idx = PackIndex::open(&path).unwrap();
        let mut sorted = ids.clone();
        sorted.sort();
        for id in &sorted {
            let oid = ObjectId::from_array(*id);
            let pos = idx.find_sha1(&oid).unwrap();
            assert_eq!(&idx.read_sha1(pos).unwrap(), &oid);
            assert!(idx.fanout().bounds(oid.bucket()).contains(&pos));
        }

        let mut missing = [0u8; 20];
        missing[0] = 0x10;
        missing[19] = 99;
        let missing = ObjectId::from_array(missing);
        assert!(matches!(idx.find_sha1(&missing), Err(OdbError::NotFound)));
    }

    #[test]
    fn fanout_from_a_real_index_is_non_decreasing() {
        let dir = tempfile::tempdir().unwrap();
        let mut ids = Vec::new();
        for bucket in [0x01u8, 0x01, 0x10, 0x7f, 0xff] {
            let mut id = [0u8; 20];
            id[0] = bucket;
            id[19] = ids.len() as u8;
            ids.push(id);
        }
        let offsets: Vec<u32> = (0..ids.len() as u32).map(|i| 100 + i * 17).collect();
        let bytes = build_v2_index(&ids, &offsets);
        let path = write_index(&dir, &bytes);

        let idx = PackIndex::open(&path).unwrap();
        assert!(idx.fanout().is_non_decreasing());
        assert_eq!(idx.fanout().total() as usize, ids.len());
        assert_eq!(idx.version(), 2);
    }

    #[test]
    fn empty_bucket_finds_nothing_without_reading() {
        let dir = tempfile::tempdir().unwrap();
        let mut ids = Vec::new();
        for i in 0u8..3 {
            let mut id = [0u8; 20];
            id[0] = 0x05;
            id[19] = i;
            ids.push(id);
        }
        let offsets = vec![1, 2, 3];
        let bytes = build_v2_index(&ids, &offsets);
        let path = write_index(&dir, &bytes);
        let idx = PackIndex::open(&path).unwrap();

        let mut target = [0u8; 20];
        target[0] = 0x06; // empty bucket: fanout[0x05] == fanout[0x06]
        let target = ObjectId::from_array(target);
        assert_eq!(idx.fanout().bounds(0x06), 3..3);
        assert!(matches!(idx.find_sha1(&target), Err(OdbError::NotFound)));
    }

    #[test]
    fn large_offset_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut id = [0u8; 20];
        id[0] = 0x01;
        let bytes = build_v2_index(&[id], &[0x8000_0000]);
        let path = write_index(&dir, &bytes);
        let idx = PackIndex::open(&path).unwrap();
        let target = ObjectId::from_array(id);
        let pos = idx.find_sha1(&target).unwrap();
        assert!(matches!(
            idx.read_offset(pos),
            Err(OdbError::LargeOffsetUnsupported)
        ));
    }

    #[test]
    fn v1_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        // v1: fan-out starts immediately at offset 0, no magic/version.
        let mut buf = Vec::new();
        let fanout = [0u32; 256];
        for f in fanout {
            buf.extend_from_slice(&f.to_be_bytes());
        }
        let path = write_index(&dir, &buf);
        assert!(matches!(
            PackIndex::open(&path),
            Err(OdbError::UnsupportedVersion(1))
        ));
    }
}
