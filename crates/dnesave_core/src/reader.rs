use std::borrow::Cow;
use std::io::{self, Read, Seek, SeekFrom};

use log::warn;

pub struct LittleEndianReader<R> {
    inner: R,
}

impl<R: Read + Seek> LittleEndianReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> io::Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> io::Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> io::Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> io::Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_bytes(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let start = self.position()?;
        let remaining = self.len()?.saturating_sub(start);
        if n as u64 > remaining {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("read of {n} bytes at 0x{start:X} runs past end of stream ({remaining} left)"),
            ));
        }
        let mut buf = vec![0u8; n];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read a u32 byte count followed by that many bytes of UTF-8 text.
    /// The final byte is the null terminator and is not part of the result.
    pub fn read_length_prefixed_string(&mut self) -> io::Result<String> {
        let start = self.position()?;
        let len = self.read_u32()? as usize;
        let bytes = match self.read_bytes(len) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.seek_to(start)?;
                return Err(e);
            }
        };
        let text = bytes.split_last().map(|(_, body)| body).unwrap_or(&[]);
        match String::from_utf8_lossy(text) {
            Cow::Borrowed(valid) => Ok(valid.to_string()),
            Cow::Owned(replaced) => {
                warn!("invalid UTF-8 in string at 0x{start:X}; replaced undecodable bytes");
                Ok(replaced)
            }
        }
    }

    pub fn peek_length_prefixed_string(&mut self) -> io::Result<String> {
        let pos = self.position()?;
        let result = self.read_length_prefixed_string();
        self.seek_to(pos)?;
        result
    }

    pub fn peek_u32(&mut self) -> io::Result<u32> {
        let pos = self.position()?;
        let result = self.read_u32();
        self.seek_to(pos)?;
        result
    }

    /// Consume `n` bytes that are expected to be zero. Non-zero content is
    /// reported but never treated as an error.
    pub fn read_reserved(&mut self, n: usize) -> io::Result<()> {
        let base = self.position()?;
        let bytes = self.read_bytes(n)?;
        for (i, &b) in bytes.iter().enumerate() {
            if b != 0 {
                warn!("reserved byte @ 0x{:06X} != 0x00: {b:02X}", base + i as u64);
            }
        }
        Ok(())
    }

    pub fn position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    pub fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn len(&mut self) -> io::Result<u64> {
        let cur = self.position()?;
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(cur))?;
        Ok(end)
    }

    pub fn is_empty(&mut self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn at_end(&mut self) -> io::Result<bool> {
        Ok(self.position()? >= self.len()?)
    }

    fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let start = self.position()?;
        let mut buf = [0u8; N];
        if let Err(e) = self.inner.read_exact(&mut buf) {
            self.seek_to(start)?;
            return Err(e);
        }
        Ok(buf)
    }
}
