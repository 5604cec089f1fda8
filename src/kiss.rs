//! KISS framing as spoken by TNCs over TCP or serial links.
//!
//! Frames are delimited (not wrapped) by FEND: a FEND both closes the frame in
//! progress and opens the next one. Inside a frame FEND and FESC are escaped
//! as FESC TFEND and FESC TFESC.

use tracing::debug;

/// Frame End
pub const FEND: u8 = 0xC0;
/// Frame Escape
pub const FESC: u8 = 0xDB;
/// Transposed Frame End
pub const TFEND: u8 = 0xDC;
/// Transposed Frame Escape
pub const TFESC: u8 = 0xDD;

/// Longest unescaped frame the decoder will accumulate. An AX.25 UI frame with
/// a full digipeater path and a 256 byte information field is well under this.
pub const MAX_FRAME_LEN: usize = 1024;

/// KISS command carried in the low nibble of the first byte of each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KissCommand {
    Data,
    TxDelay,
    Persistence,
    SlotTime,
    TxTail,
    FullDuplex,
    SetHardware,
    Other(u8),
}

impl From<u8> for KissCommand {
    fn from(v: u8) -> Self {
        match v & 0x0F {
            0x00 => KissCommand::Data,
            0x01 => KissCommand::TxDelay,
            0x02 => KissCommand::Persistence,
            0x03 => KissCommand::SlotTime,
            0x04 => KissCommand::TxTail,
            0x05 => KissCommand::FullDuplex,
            0x06 => KissCommand::SetHardware,
            other => KissCommand::Other(other),
        }
    }
}

/// One de-framed KISS frame: the command byte followed by its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KissFrame {
    bytes: Vec<u8>,
}

impl KissFrame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Complete frame contents including the command byte
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// TNC port number (high nibble of the command byte)
    pub fn port(&self) -> u8 {
        self.bytes.first().map(|b| b >> 4).unwrap_or(0)
    }

    pub fn command(&self) -> KissCommand {
        KissCommand::from(self.bytes.first().copied().unwrap_or(0))
    }

    /// The AX.25 frame carried by a data frame.
    ///
    /// Returns `None` for non-data commands and for data frames with an empty
    /// payload; neither is an error.
    pub fn ax25_payload(&self) -> Option<&[u8]> {
        if self.command() != KissCommand::Data || self.bytes.len() < 2 {
            return None;
        }
        Some(&self.bytes[1..])
    }
}

/// Streaming de-framer. Owns the accumulator for a single connection.
#[derive(Debug, Default)]
pub struct KissDecoder {
    buffer: Vec<u8>,
    in_frame: bool,
    escape_next: bool,
}

impl KissDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes read from the TNC and collect every frame they complete.
    ///
    /// State carries over between calls, so frames and escape sequences may
    /// be split across reads arbitrarily.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<KissFrame> {
        let mut frames = Vec::new();
        for &byte in bytes {
            if let Some(frame) = self.push(byte) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Process a single byte, returning a frame when it closes one
    pub fn push(&mut self, byte: u8) -> Option<KissFrame> {
        if byte == FEND {
            let completed = if self.in_frame && !self.buffer.is_empty() {
                Some(KissFrame::new(std::mem::take(&mut self.buffer)))
            } else {
                None
            };
            self.buffer.clear();
            self.in_frame = true;
            self.escape_next = false;
            return completed;
        }

        // Noise before the first FEND
        if !self.in_frame {
            return None;
        }

        if self.escape_next {
            self.escape_next = false;
            match byte {
                TFEND => self.buffer.push(FEND),
                TFESC => self.buffer.push(FESC),
                other => {
                    // Protocol violation: keep both bytes rather than lose data
                    self.buffer.push(FESC);
                    self.buffer.push(other);
                }
            }
        } else if byte == FESC {
            self.escape_next = true;
            return None;
        } else {
            self.buffer.push(byte);
        }

        if self.buffer.len() > MAX_FRAME_LEN {
            debug!(
                "Discarding {} bytes of unterminated KISS frame, waiting for next FEND",
                self.buffer.len()
            );
            self.reset();
        }
        None
    }

    /// Discard any partial frame, e.g. after the connection drops
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.in_frame = false;
        self.escape_next = false;
    }

    /// Bytes accumulated for the frame in progress
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Apply KISS escaping to raw frame contents
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 4);
    for &b in data {
        match b {
            FEND => out.extend_from_slice(&[FESC, TFEND]),
            FESC => out.extend_from_slice(&[FESC, TFESC]),
            _ => out.push(b),
        }
    }
    out
}

/// Wrap an AX.25 frame as a port-0 KISS data frame: FEND 0x00 <escaped> FEND
pub fn encode_data_frame(ax25: &[u8]) -> Vec<u8> {
    encode_frame(0x00, ax25)
}

/// Wrap `data` in a KISS frame with the given command byte
pub fn encode_frame(command: u8, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 4);
    out.push(FEND);
    out.extend(escape(&[command]));
    out.extend(escape(data));
    out.push(FEND);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_data_frame() {
        let mut decoder = KissDecoder::new();
        let frames = decoder.feed(&[FEND, 0x00, 0x41, 0x42, FEND]);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), &[0x00, 0x41, 0x42]);
        assert_eq!(frames[0].command(), KissCommand::Data);
        assert_eq!(frames[0].ax25_payload(), Some(&[0x41, 0x42][..]));
    }

    #[test]
    fn test_round_trip_multiple_frames() {
        let payloads: Vec<Vec<u8>> = vec![
            vec![0x01, 0x02, 0x03],
            vec![FEND, 0x10, FESC, 0x20],
            vec![FESC, FESC, FEND, FEND],
            b"hello world".to_vec(),
        ];

        let mut stream = Vec::new();
        for p in &payloads {
            stream.extend(encode_data_frame(p));
        }

        let mut decoder = KissDecoder::new();
        let frames = decoder.feed(&stream);

        assert_eq!(frames.len(), payloads.len());
        for (frame, payload) in frames.iter().zip(&payloads) {
            assert_eq!(frame.ax25_payload(), Some(payload.as_slice()));
        }
    }

    #[test]
    fn test_escape_reproduces_original_bytes() {
        let original = vec![0x00, FEND, FESC, TFEND, TFESC, FEND, 0x7E];
        let mut decoder = KissDecoder::new();

        let mut stream = vec![FEND];
        stream.extend(escape(&original));
        stream.push(FEND);

        let frames = decoder.feed(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), original.as_slice());
    }

    #[test]
    fn test_escape_split_across_reads() {
        let mut decoder = KissDecoder::new();

        assert!(decoder.feed(&[FEND, 0x00, 0x41, FESC]).is_empty());
        assert!(decoder.feed(&[TFEND, 0x42]).is_empty());
        let frames = decoder.feed(&[FEND]);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), &[0x00, 0x41, FEND, 0x42]);
    }

    #[test]
    fn test_noise_before_first_fend_is_discarded() {
        let mut decoder = KissDecoder::new();
        let frames = decoder.feed(&[0x11, 0x22, 0x33, FEND, 0x00, 0x44, FEND]);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), &[0x00, 0x44]);
    }

    #[test]
    fn test_back_to_back_fends_produce_no_empty_frames() {
        let mut decoder = KissDecoder::new();
        let frames = decoder.feed(&[FEND, FEND, FEND, 0x00, 0x55, FEND, FEND]);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), &[0x00, 0x55]);
    }

    #[test]
    fn test_invalid_escape_keeps_both_bytes() {
        let mut decoder = KissDecoder::new();
        let frames = decoder.feed(&[FEND, 0x00, FESC, 0x41, 0x42, FEND]);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), &[0x00, FESC, 0x41, 0x42]);
    }

    #[test]
    fn test_fend_abandons_pending_escape() {
        let mut decoder = KissDecoder::new();
        let frames = decoder.feed(&[FEND, 0x00, 0x41, FESC, FEND, 0x00, TFEND, FEND]);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_bytes(), &[0x00, 0x41]);
        // TFEND outside an escape is an ordinary byte
        assert_eq!(frames[1].as_bytes(), &[0x00, TFEND]);
    }

    #[test]
    fn test_non_data_commands_have_no_payload() {
        let mut decoder = KissDecoder::new();
        let frames = decoder.feed(&[FEND, 0x01, 0x32, FEND, FEND, 0x16, 0x01, FEND]);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command(), KissCommand::TxDelay);
        assert_eq!(frames[0].ax25_payload(), None);
        assert_eq!(frames[1].command(), KissCommand::SetHardware);
        assert_eq!(frames[1].port(), 1);
        assert_eq!(frames[1].ax25_payload(), None);
    }

    #[test]
    fn test_data_frame_on_other_port() {
        let frame = KissFrame::new(vec![0x20, 0x99]);
        assert_eq!(frame.port(), 2);
        assert_eq!(frame.command(), KissCommand::Data);
        assert_eq!(frame.ax25_payload(), Some(&[0x99][..]));
    }

    #[test]
    fn test_command_only_data_frame_is_ignored() {
        let mut decoder = KissDecoder::new();
        let frames = decoder.feed(&[FEND, 0x00, FEND]);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].ax25_payload(), None);
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let mut decoder = KissDecoder::new();
        decoder.feed(&[FEND, 0x00, 0x01, 0x02]);
        assert_eq!(decoder.pending_len(), 3);

        decoder.reset();
        assert_eq!(decoder.pending_len(), 0);

        // Not in a frame any more, so this is treated as noise until FEND
        assert!(decoder.feed(&[0x00, 0x03, FEND]).is_empty());
    }

    #[test]
    fn test_unterminated_frame_is_bounded_and_decoder_resyncs() {
        let mut decoder = KissDecoder::new();
        decoder.feed(&[FEND, 0x00]);

        // A stream that never sends FEND must not grow the accumulator forever
        let junk = vec![0x41; MAX_FRAME_LEN * 4];
        for chunk in junk.chunks(100) {
            assert!(decoder.feed(chunk).is_empty());
            assert!(decoder.pending_len() <= MAX_FRAME_LEN);
        }

        // Escapes count towards the limit too
        let escapes = [FESC, 0x01].repeat(MAX_FRAME_LEN);
        assert!(decoder.feed(&[FEND]).is_empty());
        assert!(decoder.feed(&escapes).is_empty());
        assert!(decoder.pending_len() <= MAX_FRAME_LEN);

        // The overflow is dropped and the next delimited frame decodes normally
        let frames = decoder.feed(&[FEND, 0x00, 0x10, 0x20, FEND]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].ax25_payload(), Some(&[0x10, 0x20][..]));
    }

    #[test]
    fn test_frame_at_size_limit_is_accepted() {
        let mut decoder = KissDecoder::new();
        let mut stream = vec![FEND, 0x00];
        stream.extend(std::iter::repeat_n(0x41, MAX_FRAME_LEN - 1));
        stream.push(FEND);

        let frames = decoder.feed(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].ax25_payload().map(<[u8]>::len), Some(MAX_FRAME_LEN - 1));
    }
}
