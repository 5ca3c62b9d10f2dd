use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use atomicwrites::{AtomicFile, OverwriteBehavior};
use sha2::{Digest, Sha256};

use crate::block::BlockRange;

/// Number of sub-directories the cache root is sharded into.
const BUCKETS: u32 = 16;

/// Content-addressed blob cache on local disk.
///
/// Entries are keyed by a digest of the requested range offsets, not by file
/// identity or content. Blobs are stored at `root/{bucket}/{hex_digest}`
/// where the bucket is the digit sum of the digest modulo 16, which bounds
/// the number of entries per directory.
///
/// Entries persist across runs and are never invalidated, so the cache is
/// only valid for re-reads of the same logical file.
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    /// Open the cache at `root`, creating the directory if missing.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs_err::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path at which the blob for this range set lives, whether or not it
    /// exists yet.
    pub fn blob_path(&self, ranges: &[BlockRange]) -> PathBuf {
        let (bucket_dir, digest) = self.bucket_parts(ranges);
        bucket_dir.join(digest)
    }

    fn bucket_parts(&self, ranges: &[BlockRange]) -> (PathBuf, String) {
        let digest = range_digest(ranges);
        let bucket = hex_digit_sum(&digest) % BUCKETS;
        (self.root.join(bucket.to_string()), digest)
    }

    /// Check whether a blob for this range set is present.
    pub fn lookup(&self, ranges: &[BlockRange]) -> Option<PathBuf> {
        let path = self.blob_path(ranges);
        path.is_file().then_some(path)
    }

    /// Read exactly `total_length` bytes of a cached blob.
    pub fn fetch(&self, path: &Path, total_length: usize) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0; total_length];
        let mut file = fs_err::File::open(path)?;
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Write the blob for this range set, overwriting any previous content.
    ///
    /// Concurrent writers of the same digest are not deduplicated; last
    /// writer wins, which is fine since the content for a given range set is
    /// deterministic.
    pub fn store(&self, ranges: &[BlockRange], buffer: &[u8]) -> io::Result<()> {
        let (bucket_dir, digest) = self.bucket_parts(ranges);
        fs_err::create_dir_all(&bucket_dir)?;
        let path = bucket_dir.join(digest);
        AtomicFile::new(&path, OverwriteBehavior::AllowOverwrite)
            .write(|file| file.write_all(buffer))
            .map_err(|err| match err {
                atomicwrites::Error::Internal(err) | atomicwrites::Error::User(err) => err,
            })
    }
}

/// Hex digest over the concatenation of the range offsets in decimal text,
/// in range order.
fn range_digest(ranges: &[BlockRange]) -> String {
    let mut hasher = Sha256::new();
    for range in ranges {
        hasher.update(range.offset.to_string().as_bytes());
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn hex_digit_sum(digest: &str) -> u32 {
    digest.chars().filter_map(|c| c.to_digit(16)).sum()
}

#[cfg(test)]
mod tests {
    use tempfile::Builder;

    use super::*;

    fn ranges(pairs: &[(i64, i32)]) -> Vec<BlockRange> {
        pairs.iter().copied().map(BlockRange::from).collect()
    }

    #[test]
    fn test_round_trip() {
        let dir = Builder::new().prefix("block_cache").tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("cache")).unwrap();

        let ranges = ranges(&[(0, 4), (100, 4)]);
        let payload = vec![1, 2, 3, 4, 5, 6, 7, 8];

        assert!(cache.lookup(&ranges).is_none());
        cache.store(&ranges, &payload).unwrap();

        let path = cache.lookup(&ranges).expect("stored blob must be found");
        assert_eq!(cache.fetch(&path, payload.len()).unwrap(), payload);
    }

    #[test]
    fn test_bucket_layout() {
        let dir = Builder::new().prefix("block_cache").tempdir().unwrap();
        let cache = DiskCache::new(dir.path()).unwrap();

        let path = cache.blob_path(&ranges(&[(42, 10)]));
        let bucket: u32 = path
            .parent()
            .unwrap()
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(bucket < BUCKETS);

        let digest = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(hex_digit_sum(digest) % BUCKETS, bucket);
    }

    #[test]
    fn test_key_depends_on_offsets_only() {
        let dir = Builder::new().prefix("block_cache").tempdir().unwrap();
        let cache = DiskCache::new(dir.path()).unwrap();

        let a = cache.blob_path(&ranges(&[(0, 4), (10, 4)]));
        let b = cache.blob_path(&ranges(&[(0, 8), (10, 8)]));
        let c = cache.blob_path(&ranges(&[(10, 4), (0, 4)]));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_store_overwrites() {
        let dir = Builder::new().prefix("block_cache").tempdir().unwrap();
        let cache = DiskCache::new(dir.path()).unwrap();

        let ranges = ranges(&[(7, 3)]);
        cache.store(&ranges, &[1, 1, 1]).unwrap();
        cache.store(&ranges, &[2, 2, 2]).unwrap();

        let path = cache.lookup(&ranges).unwrap();
        assert_eq!(cache.fetch(&path, 3).unwrap(), vec![2, 2, 2]);
    }

    #[test]
    fn test_store_creates_bucket_directory() {
        let dir = Builder::new().prefix("block_cache").tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("nested").join("cache")).unwrap();

        let ranges = ranges(&[(500, 2)]);
        cache.store(&ranges, &[3, 4]).unwrap();

        // The store and lookup paths agree on the bucket layout.
        let path = cache.lookup(&ranges).unwrap();
        assert_eq!(path, cache.blob_path(&ranges));
        assert_eq!(cache.fetch(&path, 2).unwrap(), vec![3, 4]);
    }

    #[test]
    fn test_fetch_rejects_truncated_blob() {
        let dir = Builder::new().prefix("block_cache").tempdir().unwrap();
        let cache = DiskCache::new(dir.path()).unwrap();

        let ranges = ranges(&[(1, 8)]);
        let path = cache.blob_path(&ranges);
        fs_err::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = fs_err::File::create(&path).unwrap();
        file.write_all(&[0; 4]).unwrap();

        assert!(cache.fetch(&path, 8).is_err());
    }
}
