use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

/// Positional reads and writes over one file. Each transfer carries its own
/// offset, so concurrent callers share the handle without a cursor.
#[derive(Debug)]
pub struct Disk {
    file: File,
}

impl Disk {
    /// Open or create
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Disk { file })
    }

    /// Fill `buf` from `offset`; a short read is an `UnexpectedEof` error
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact_at(buf, offset)
    }

    pub fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        self.file.write_all_at(buf, offset)
    }

    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("cinderdb-io-{}-{}", name, std::process::id()))
    }

    #[test]
    fn test_concurrent_writers_keep_their_offsets() {
        let path = temp_path("concurrent");
        let disk = Arc::new(Disk::open(&path).unwrap());

        let writers: Vec<_> = (0..8u8)
            .map(|n| {
                let disk = Arc::clone(&disk);
                thread::spawn(move || {
                    for _ in 0..50 {
                        disk.write_at(u64::from(n) * 16, &[n; 16]).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(disk.len().unwrap(), 128);
        for n in 0..8u8 {
            let mut buf = [0u8; 16];
            disk.read_at(u64::from(n) * 16, &mut buf).unwrap();
            assert_eq!(buf, [n; 16]);
        }
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_short_read_is_eof() {
        let path = temp_path("short");
        let disk = Disk::open(&path).unwrap();
        disk.write_at(0, &[1, 2, 3]).unwrap();

        let mut buf = [0u8; 8];
        let err = disk.read_at(0, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        std::fs::remove_file(&path).unwrap();
    }
}
