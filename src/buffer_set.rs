//! Read and write buffers owned by one connection.

/// Read and write buffers of a connection.
#[derive(Debug)]
pub struct BufferSet {
    /// Bytes received from the server and not yet decoded
    pub read_buffer: Vec<u8>,
    /// Frontend messages waiting to be written
    pub write_buffer: Vec<u8>,
}

impl BufferSet {
    /// Create a new buffer set.
    pub fn new() -> Self {
        Self {
            read_buffer: Vec::with_capacity(8192),
            write_buffer: Vec::with_capacity(8192),
        }
    }

    /// Drop the first `consumed` bytes of the read buffer.
    pub fn consume(&mut self, consumed: usize) {
        if consumed >= self.read_buffer.len() {
            self.read_buffer.clear();
        } else {
            self.read_buffer.drain(..consumed);
        }
    }
}

impl Default for BufferSet {
    fn default() -> Self {
        Self::new()
    }
}
