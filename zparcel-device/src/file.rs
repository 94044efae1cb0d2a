use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::ByteDevice;

/// `ByteDevice` backed by a real file. Seeking past the current length and
/// writing there extends the file, matching the tail-extend behavior the
/// allocator relies on.
pub struct FileDevice {
    file: File,
}

impl FileDevice {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    pub fn create(path: &str) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::new(file))
    }

    pub fn open(path: &str) -> io::Result<Self> {
        let file = File::options().read(true).write(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl ByteDevice for FileDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn seek(&mut self, pos: u64) -> io::Result<u64> {
        self.file.seek(SeekFrom::Start(pos))
    }

    fn tell(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    fn available(&mut self) -> io::Result<u64> {
        let pos = self.tell()?;
        let len = self.file.metadata()?.len();
        Ok(len.saturating_sub(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ByteDeviceExt;

    #[test]
    fn write_then_read_back() -> io::Result<()> {
        let tmp = std::env::temp_dir().join(format!("zparcel-device-test-{}", std::process::id()));
        let mut dev = FileDevice::create(tmp.to_str().unwrap())?;
        dev.write_beu64(42)?;
        dev.seek(0)?;
        assert_eq!(dev.read_beu64()?, 42);
        std::fs::remove_file(&tmp)?;
        Ok(())
    }
}
