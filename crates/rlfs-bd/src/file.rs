use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use parking_lot::Mutex;

use rlfs_error::Result;

use crate::traits::Bd;

/// A block device backed by a disk image file.
///
/// Reads seek then read under a mutex; the file cursor is the only
/// shared state.
pub struct FileBd {
    file: Mutex<File>,
    extent: u64,
}

impl FileBd {
    /// Open a disk image read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let extent = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            extent,
        })
    }
}

impl Bd for FileBd {
    fn read_block(&self, block: u32, block_size: u32) -> Result<Vec<u8>> {
        let mut data = vec![0u8; block_size as usize];
        let off = u64::from(block) * u64::from(block_size);
        if off >= self.extent {
            return Ok(data);
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(off))?;

        // Loop until EOF or the block is full; the tail stays zeroed.
        let mut filled = 0;
        while filled < data.len() {
            let n = file.read(&mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(data)
    }

    fn extent(&self) -> Result<u64> {
        Ok(self.extent)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn reads_blocks_by_offset() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let mut image = vec![0xaau8; 512];
        image.extend_from_slice(&[0xbbu8; 512]);
        tmp.write_all(&image).unwrap();

        let bd = FileBd::open(tmp.path()).unwrap();
        assert_eq!(bd.extent().unwrap(), 1024);
        assert_eq!(bd.read_block(0, 512).unwrap(), vec![0xaa; 512]);
        assert_eq!(bd.read_block(1, 512).unwrap(), vec![0xbb; 512]);
    }

    #[test]
    fn zero_fills_past_eof() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0xcc; 100]).unwrap();

        let bd = FileBd::open(tmp.path()).unwrap();

        // Partial tail block: data then zeros.
        let data = bd.read_block(0, 512).unwrap();
        assert_eq!(&data[..100], &[0xcc; 100][..]);
        assert_eq!(&data[100..], &[0u8; 412][..]);

        // Entirely past the extent: all zeros.
        assert_eq!(bd.read_block(7, 512).unwrap(), vec![0u8; 512]);
    }
}
