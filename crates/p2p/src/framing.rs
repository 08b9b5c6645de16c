use wire::{decode_header, decode_payload, double_sha256, Message, Network, WireError, HEADER_LEN};

/// Streaming decoder turning a raw byte stream into whole messages.
///
/// Bytes go in via [`Framer::feed`]; [`Framer::next`] yields complete
/// messages as they become available.  The first error poisons the framer —
/// the stream has lost its framing and the caller must drop the connection.
pub struct Framer {
    network: Network,
    max_payload: usize,
    buf: Vec<u8>,
    poisoned: bool,
}

impl Framer {
    pub fn new(network: Network, max_payload: usize) -> Self {
        Self {
            network,
            max_payload,
            buf: Vec::new(),
            poisoned: false,
        }
    }

    /// Appends bytes received from the socket.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// True while a partial frame sits in the buffer, which turns EOF into a
    /// truncation error instead of a clean shutdown.
    pub fn in_progress(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Next complete message, an error (the framer is unrecoverable from then
    /// on), or `None` when more bytes are needed.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Result<Message, WireError>> {
        if self.poisoned {
            return None;
        }
        match self.try_next() {
            Ok(message) => message.map(Ok),
            Err(err) => {
                self.poisoned = true;
                Some(Err(err))
            }
        }
    }

    fn try_next(&mut self) -> Result<Option<Message>, WireError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut header_bytes = [0u8; HEADER_LEN];
        header_bytes.copy_from_slice(&self.buf[..HEADER_LEN]);
        let header = decode_header(&header_bytes, self.network, self.max_payload)?;

        let frame_len = HEADER_LEN + header.length as usize;
        if self.buf.len() < frame_len {
            return Ok(None);
        }

        let payload = &self.buf[HEADER_LEN..frame_len];
        if double_sha256(payload)[..4] != header.checksum {
            return Err(WireError::ChecksumMismatch);
        }
        let message = decode_payload(&header.command, payload)?;
        self.buf.drain(..frame_len);
        Ok(Some(message))
    }
}
