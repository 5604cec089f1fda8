//! AX.25 UI-frame decoding.
//!
//! Only unnumbered-information frames carrying no layer-3 protocol are data
//! frames for APRS. Anything else decodes to `None`; it is not an error.

use std::fmt;

/// Encoded address length: six shifted callsign bytes plus the SSID octet
pub const ADDRESS_LEN: usize = 7;
/// Unnumbered Information control field
pub const CONTROL_UI: u8 = 0x03;
/// "No layer 3 protocol" PID
pub const PID_NO_LAYER3: u8 = 0xF0;
/// Destination + source + control + PID
pub const MIN_FRAME_LEN: usize = ADDRESS_LEN * 2 + 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ax25Address {
    pub callsign: String,
    pub ssid: u8,
    /// Set on the final address of the address field
    pub last: bool,
}

impl Ax25Address {
    pub fn new(callsign: impl Into<String>, ssid: u8) -> Self {
        Self {
            callsign: callsign.into(),
            ssid: ssid & 0x0F,
            last: false,
        }
    }

    /// Decode one 7-byte address. `bytes` must hold at least `ADDRESS_LEN` bytes.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let raw = bytes.get(..ADDRESS_LEN)?;

        let callsign: String = raw[..6]
            .iter()
            .map(|b| (b >> 1) as char)
            .filter(|c| *c != ' ')
            .collect::<String>()
            .trim()
            .to_ascii_uppercase();

        let ssid_byte = raw[6];
        Some(Self {
            callsign,
            ssid: (ssid_byte >> 1) & 0x0F,
            last: ssid_byte & 0x01 == 0x01,
        })
    }

    /// Encode to the 7-byte wire form, marking the end of the address field
    /// when `last` is set.
    pub fn encode(&self, last: bool) -> [u8; ADDRESS_LEN] {
        let mut out = [b' ' << 1; ADDRESS_LEN];
        for (slot, c) in out.iter_mut().zip(self.callsign.bytes().take(6)) {
            *slot = c.to_ascii_uppercase() << 1;
        }
        out[6] = 0b0110_0000 | ((self.ssid & 0x0F) << 1) | u8::from(last);
        out
    }
}

impl fmt::Display for Ax25Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ssid > 0 {
            write!(f, "{}-{}", self.callsign, self.ssid)
        } else {
            write!(f, "{}", self.callsign)
        }
    }
}

/// A decoded UI frame borrowing its information field from the input buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ax25Frame<'a> {
    pub destination: Ax25Address,
    pub source: Ax25Address,
    pub digipeaters: Vec<Ax25Address>,
    pub info: &'a [u8],
}

impl Ax25Frame<'_> {
    /// Digipeater path rendered as `CALL-SSID` strings
    pub fn path(&self) -> Vec<String> {
        self.digipeaters.iter().map(ToString::to_string).collect()
    }
}

/// Decode a de-framed AX.25 buffer (KISS command byte already stripped).
pub fn decode(buffer: &[u8]) -> Option<Ax25Frame<'_>> {
    if buffer.len() < MIN_FRAME_LEN {
        return None;
    }

    let destination = Ax25Address::decode(&buffer[..ADDRESS_LEN])?;
    let source = Ax25Address::decode(&buffer[ADDRESS_LEN..])?;

    let mut offset = ADDRESS_LEN * 2;
    let mut last = source.last;
    let mut digipeaters = Vec::new();

    while !last {
        // Truncated address list: no terminal address before the buffer ends
        let digi = Ax25Address::decode(buffer.get(offset..)?)?;
        last = digi.last;
        digipeaters.push(digi);
        offset += ADDRESS_LEN;
    }

    if *buffer.get(offset)? != CONTROL_UI {
        return None;
    }
    if *buffer.get(offset + 1)? != PID_NO_LAYER3 {
        return None;
    }

    Some(Ax25Frame {
        destination,
        source,
        digipeaters,
        info: &buffer[offset + 2..],
    })
}

/// Build a UI frame (without FCS) as a TNC would hand it over KISS
pub fn encode_ui_frame(
    destination: &Ax25Address,
    source: &Ax25Address,
    digipeaters: &[Ax25Address],
    info: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(ADDRESS_LEN * (2 + digipeaters.len()) + 2 + info.len());
    out.extend_from_slice(&destination.encode(false));
    out.extend_from_slice(&source.encode(digipeaters.is_empty()));
    for (idx, digi) in digipeaters.iter().enumerate() {
        out.extend_from_slice(&digi.encode(idx == digipeaters.len() - 1));
    }
    out.push(CONTROL_UI);
    out.push(PID_NO_LAYER3);
    out.extend_from_slice(info);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame(digis: &[Ax25Address], info: &[u8]) -> Vec<u8> {
        encode_ui_frame(
            &Ax25Address::new("APRS", 0),
            &Ax25Address::new("N0CALL", 9),
            digis,
            info,
        )
    }

    #[test]
    fn test_address_round_trip() {
        for (call, ssid) in [("N0CALL", 0u8), ("W1AW", 15), ("G4ABC", 7), ("K", 1)] {
            let encoded = Ax25Address::new(call, ssid).encode(true);
            let decoded = Ax25Address::decode(&encoded).unwrap();
            assert_eq!(decoded.callsign, call);
            assert_eq!(decoded.ssid, ssid);
            assert!(decoded.last);
        }
    }

    #[test]
    fn test_address_wire_encoding() {
        // "N0CALL" SSID 9, not last
        let encoded = Ax25Address::new("N0CALL", 9).encode(false);
        assert_eq!(
            encoded,
            [b'N' << 1, b'0' << 1, b'C' << 1, b'A' << 1, b'L' << 1, b'L' << 1, 0x72]
        );
    }

    #[test]
    fn test_display_includes_nonzero_ssid() {
        assert_eq!(Ax25Address::new("N0CALL", 0).to_string(), "N0CALL");
        assert_eq!(Ax25Address::new("N0CALL", 9).to_string(), "N0CALL-9");
    }

    #[test]
    fn test_decode_without_digipeaters() {
        let bytes = sample_frame(&[], b"!5144.50N/00009.00E-test");
        let frame = decode(&bytes).unwrap();

        assert_eq!(frame.destination.callsign, "APRS");
        assert_eq!(frame.source.to_string(), "N0CALL-9");
        assert!(frame.digipeaters.is_empty());
        assert_eq!(frame.info, b"!5144.50N/00009.00E-test");
    }

    #[test]
    fn test_decode_with_digipeaters() {
        let digis = [Ax25Address::new("WIDE1", 1), Ax25Address::new("WIDE2", 2)];
        let bytes = sample_frame(&digis, b">status");
        let frame = decode(&bytes).unwrap();

        assert_eq!(frame.path(), vec!["WIDE1-1", "WIDE2-2"]);
        assert_eq!(frame.info, b">status");
    }

    #[test]
    fn test_empty_info_field_is_allowed() {
        let bytes = sample_frame(&[], b"");
        let frame = decode(&bytes).unwrap();
        assert!(frame.info.is_empty());
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        assert!(decode(&[]).is_none());
        assert!(decode(&[0x40; 15]).is_none());
    }

    #[test]
    fn test_wrong_control_byte_is_rejected() {
        let mut bytes = sample_frame(&[], b"!test");
        bytes[ADDRESS_LEN * 2] = 0x3F;
        assert!(decode(&bytes).is_none());
    }

    #[test]
    fn test_wrong_pid_is_rejected() {
        let mut bytes = sample_frame(&[], b"!test");
        bytes[ADDRESS_LEN * 2 + 1] = 0xCC;
        assert!(decode(&bytes).is_none());
    }

    #[test]
    fn test_truncated_digipeater_list_is_rejected() {
        let digis = [Ax25Address::new("WIDE1", 1)];
        let bytes = sample_frame(&digis, b"");
        // Drop control, PID and the final digipeater's SSID octet
        let truncated = &bytes[..ADDRESS_LEN * 3 - 1];
        assert!(decode(truncated).is_none());

        // Source claims more addresses follow but none are terminal
        let mut unterminated = sample_frame(&[], b"xyz");
        unterminated[ADDRESS_LEN * 2 - 1] &= !0x01;
        assert!(decode(&unterminated).is_none());
    }

    #[test]
    fn test_missing_pid_is_rejected() {
        let digis = [Ax25Address::new("WIDE1", 1)];
        let bytes = sample_frame(&digis, b"");
        // Exactly 16+ bytes long but ends right after the control byte
        let cut = &bytes[..ADDRESS_LEN * 3 + 1];
        assert!(decode(cut).is_none());
    }
}
