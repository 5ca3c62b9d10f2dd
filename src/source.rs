use std::io;
use std::path::Path;
use std::time::Duration;

/// Random-access collaborator performing the actual scatter-gather reads.
///
/// Implementations may apply a constant base-offset correction (for example
/// an archive member's start within a container file) before issuing the
/// physical read; `base_offset` reports that correction so the engine can
/// translate the resolved block back to logical offsets.
pub trait RangeSource: Send + Sync {
    /// Read all `(offsets[i], lengths[i])` ranges in one pass and return
    /// their bytes concatenated in request order.
    fn read_ranges(&self, offsets: &[i64], lengths: &[i32]) -> io::Result<Vec<u8>>;

    fn base_offset(&self) -> i64 {
        0
    }
}

/// Optional hook notified after every physical read and every cache fetch.
pub trait IoInstrumentation: Send + Sync {
    fn record_read(&self, bytes: usize, elapsed: Duration);
}

/// `RangeSource` over a local file, using positional reads so the handle
/// can be shared between threads without seeking.
pub struct FileSource {
    file: fs_err::File,
    base_offset: i64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = fs_err::File::open(path.as_ref())?;
        Ok(Self {
            file,
            base_offset: 0,
        })
    }

    /// Shift every read by `base_offset` bytes, e.g. when the logical file is
    /// a member of a container starting at that position.
    pub fn with_base_offset(mut self, base_offset: i64) -> Self {
        self.base_offset = base_offset;
        self
    }

    fn read_exact_at(&self, buffer: &mut [u8], position: u64) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.file().read_exact_at(buffer, position)
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            let mut filled = 0;
            while filled < buffer.len() {
                let read = self
                    .file
                    .file()
                    .seek_read(&mut buffer[filled..], position + filled as u64)?;
                if read == 0 {
                    return Err(io::ErrorKind::UnexpectedEof.into());
                }
                filled += read;
            }
            Ok(())
        }
    }
}

impl RangeSource for FileSource {
    fn read_ranges(&self, offsets: &[i64], lengths: &[i32]) -> io::Result<Vec<u8>> {
        debug_assert_eq!(offsets.len(), lengths.len());
        let total: usize = lengths.iter().map(|len| *len as usize).sum();
        let mut buffer = vec![0; total];

        let mut cursor = 0;
        for (&offset, &length) in offsets.iter().zip(lengths) {
            let length = length as usize;
            let position = (offset + self.base_offset) as u64;
            self.read_exact_at(&mut buffer[cursor..cursor + length], position)?;
            cursor += length;
        }
        Ok(buffer)
    }

    fn base_offset(&self) -> i64 {
        self.base_offset
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::Builder;

    use super::*;

    #[test]
    fn test_scatter_gather_read() {
        let dir = Builder::new().prefix("source_dir").tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let mut file = fs_err::File::create(&path).unwrap();
        file.write_all(&(0..=255).collect::<Vec<u8>>()).unwrap();

        let source = FileSource::open(&path).unwrap();
        let bytes = source.read_ranges(&[0, 100, 250], &[4, 2, 6]).unwrap();
        assert_eq!(bytes, vec![0, 1, 2, 3, 100, 101, 250, 251, 252, 253, 254, 255]);
    }

    #[test]
    fn test_base_offset_applied() {
        let dir = Builder::new().prefix("source_dir").tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let mut file = fs_err::File::create(&path).unwrap();
        file.write_all(&[0; 10]).unwrap();
        file.write_all(&[7, 8, 9]).unwrap();

        let source = FileSource::open(&path).unwrap().with_base_offset(10);
        assert_eq!(source.read_ranges(&[0], &[3]).unwrap(), vec![7, 8, 9]);
    }

    #[test]
    fn test_read_past_end_fails() {
        let dir = Builder::new().prefix("source_dir").tempdir().unwrap();
        let path = dir.path().join("data.bin");
        fs_err::File::create(&path)
            .unwrap()
            .write_all(&[1, 2, 3])
            .unwrap();

        let source = FileSource::open(&path).unwrap();
        assert!(source.read_ranges(&[0], &[8]).is_err());
    }
}
