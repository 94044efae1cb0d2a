use std::io;

use crate::ByteDevice;

/// `ByteDevice` backed by an owned, growable buffer. Writing past the current
/// end extends it with zero bytes, mirroring how a real file grows.
pub struct MemoryDevice {
    buf: Vec<u8>,
    pos: usize,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
            pos: 0,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteDevice for MemoryDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let avail = self.buf.len().saturating_sub(self.pos);
        let n = avail.min(buf.len());
        buf[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let end = self.pos + buf.len();
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(buf.len())
    }

    fn seek(&mut self, pos: u64) -> io::Result<u64> {
        self.pos = pos as usize;
        if self.pos > self.buf.len() {
            self.buf.resize(self.pos, 0);
        }
        Ok(self.pos as u64)
    }

    fn tell(&mut self) -> io::Result<u64> {
        Ok(self.pos as u64)
    }

    fn available(&mut self) -> io::Result<u64> {
        Ok(self.buf.len().saturating_sub(self.pos) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ByteDeviceExt;

    #[test]
    fn grows_on_write() {
        let mut dev = MemoryDevice::new();
        dev.write_beu32(0xdeadbeef).unwrap();
        assert_eq!(dev.as_slice().len(), 4);
        dev.seek(0).unwrap();
        assert_eq!(dev.read_beu32().unwrap(), 0xdeadbeef);
    }

    #[test]
    fn seek_past_end_zero_fills() {
        let mut dev = MemoryDevice::new();
        dev.seek(8).unwrap();
        dev.write_u8(1).unwrap();
        assert_eq!(dev.as_slice().len(), 9);
        assert_eq!(&dev.as_slice()[..8], &[0u8; 8]);
    }
}
