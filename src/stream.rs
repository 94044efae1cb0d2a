//! Bounded view over a byte device's `[base, base + size)` window, with its
//! own cursor. Used for external payloads and for streaming file content.

use std::io;

use zparcel_device::ByteDevice;

/// Borrows the underlying device for the duration of its use; the engine
/// must not interleave other operations that move the device's cursor while
/// a `StreamAccessor` is alive, since both share it.
pub struct StreamAccessor<'a> {
    dev: &'a mut dyn ByteDevice,
    base: u64,
    size: u64,
    cursor: u64,
}

impl<'a> StreamAccessor<'a> {
    pub fn new(dev: &'a mut dyn ByteDevice, base: u64, size: u64) -> Self {
        Self {
            dev,
            base,
            size,
            cursor: 0,
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl ByteDevice for StreamAccessor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = (self.size - self.cursor) as usize;
        let n = remaining.min(buf.len());
        self.dev.seek(self.base + self.cursor)?;
        let got = self.dev.read(&mut buf[..n])?;
        self.cursor += got as u64;
        Ok(got)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let remaining = (self.size - self.cursor) as usize;
        let n = remaining.min(buf.len());
        self.dev.seek(self.base + self.cursor)?;
        let put = self.dev.write(&buf[..n])?;
        self.cursor += put as u64;
        Ok(put)
    }

    fn seek(&mut self, pos: u64) -> io::Result<u64> {
        self.cursor = pos.min(self.size);
        Ok(self.cursor)
    }

    fn tell(&mut self) -> io::Result<u64> {
        Ok(self.cursor)
    }

    fn available(&mut self) -> io::Result<u64> {
        Ok(self.size - self.cursor)
    }
}
