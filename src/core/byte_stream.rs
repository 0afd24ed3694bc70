use crate::core::error::{ErrorBuilder, ErrorContext, ErrorKind, Res};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

/// Bounds-checked read cursor over an input byte range.
#[derive(Debug, Clone)]
pub struct ByteStream<'a> {
    data: &'a [u8],
    pos: usize,
    order: Endianness,
}

impl ErrorContext for ByteStream<'_> {
    fn describe(&self) -> Option<String> {
        Some(format!("ByteStream[{}/{}]", self.pos, self.data.len()))
    }
}

impl<'a> ByteStream<'a> {
    pub fn new(data: &'a [u8], order: Endianness) -> Self {
        Self {
            data,
            pos: 0,
            order,
        }
    }

    pub fn set_byte_order(&mut self, order: Endianness) {
        self.order = order;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Fails unless `count` more bytes are available.
    pub fn check(&self, count: usize) -> Res<()> {
        if count > self.remaining() {
            self.raise_kind(
                ErrorKind::OutOfBounds,
                format!(
                    "Out of bounds access: need {} bytes, {} left",
                    count,
                    self.remaining()
                ),
            )?
        }
        Ok(())
    }

    pub fn skip_bytes(&mut self, count: usize) -> Res<()> {
        self.check(count)?;
        self.pos += count;
        Ok(())
    }

    pub fn peek_slice(&self, count: usize) -> Res<&'a [u8]> {
        self.check(count)?;
        Ok(&self.data[self.pos..self.pos + count])
    }

    pub fn get_slice(&mut self, count: usize) -> Res<&'a [u8]> {
        let s = self.peek_slice(count)?;
        self.pos += count;
        Ok(s)
    }

    pub fn peek_remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Consumes `count` bytes as an independent stream with the same byte order.
    pub fn get_stream(&mut self, count: usize) -> Res<ByteStream<'a>> {
        Ok(ByteStream::new(self.get_slice(count)?, self.order))
    }

    /// A stream over `size` bytes starting `offset` bytes past the current position.
    pub fn sub_stream(&self, offset: usize, size: usize) -> Res<ByteStream<'a>> {
        let end = offset.checked_add(size).ok_or_else(|| ErrorBuilder {
            kind: ErrorKind::OutOfBounds,
            message: Some(format!("{} + {} overflows", offset, size)),
            context: self.describe(),
            ..Default::default()
        })?;
        self.check(end)?;
        Ok(ByteStream::new(
            &self.data[self.pos + offset..self.pos + end],
            self.order,
        ))
    }

    fn get_bytes<const N: usize>(&mut self) -> Res<[u8; N]> {
        let mut bytes = [0; N];
        bytes.copy_from_slice(self.get_slice(N)?);
        Ok(bytes)
    }

    fn peek_bytes<const N: usize>(&self) -> Res<[u8; N]> {
        let mut bytes = [0; N];
        bytes.copy_from_slice(self.peek_slice(N)?);
        Ok(bytes)
    }

    pub fn get_u8(&mut self) -> Res<u8> {
        Ok(self.get_bytes::<1>()?[0])
    }

    pub fn peek_u8(&self) -> Res<u8> {
        Ok(self.peek_bytes::<1>()?[0])
    }

    pub fn get_u16(&mut self) -> Res<u16> {
        let b = self.get_bytes()?;
        Ok(match self.order {
            Endianness::Little => u16::from_le_bytes(b),
            Endianness::Big => u16::from_be_bytes(b),
        })
    }

    pub fn get_u32(&mut self) -> Res<u32> {
        let b = self.get_bytes()?;
        Ok(match self.order {
            Endianness::Little => u32::from_le_bytes(b),
            Endianness::Big => u32::from_be_bytes(b),
        })
    }
}
