use bytes::Bytes;

/// A transferable binary buffer.
///
/// Wraps a reference-counted, immutable byte region. Cloning a `Buffer` hands
/// out another handle to the same region; the bytes themselves are never
/// copied. Two buffers are the same object when [`Buffer::ptr_eq`] holds.
#[derive(Clone, Default)]
pub struct Buffer(Bytes);

impl Buffer {
    #[must_use]
    pub fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Returns true if both handles refer to the same byte region.
    #[must_use]
    pub fn ptr_eq(&self, other: &Buffer) -> bool {
        self.0.as_ptr() == other.0.as_ptr() && self.0.len() == other.0.len()
    }

    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl std::ops::Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for Buffer {}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("ptr", &self.0.as_ptr())
            .field("len", &self.0.len())
            .finish()
    }
}

impl From<Bytes> for Buffer {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(value: Vec<u8>) -> Self {
        Self(value.into())
    }
}

impl From<&'static [u8]> for Buffer {
    fn from(value: &'static [u8]) -> Self {
        Self(Bytes::from_static(value))
    }
}

impl From<Buffer> for Bytes {
    fn from(value: Buffer) -> Self {
        value.0
    }
}
