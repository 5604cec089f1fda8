use anyhow::{Context, Result, bail};
use tracing::warn;

use tnc_tracker::aprs::AprsPacket;
use tnc_tracker::ax25;
use tnc_tracker::kiss::KissDecoder;

/// Decode a hex-encoded AX.25 frame, or a KISS byte stream when `kiss` is set,
/// and print each parsed packet as JSON
pub fn handle_decode(input: &str, kiss: bool) -> Result<()> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let bytes = hex::decode(&cleaned).context("Input is not valid hex")?;

    let frames: Vec<Vec<u8>> = if kiss {
        let mut decoder = KissDecoder::new();
        decoder
            .feed(&bytes)
            .into_iter()
            .filter_map(|frame| match frame.ax25_payload() {
                Some(payload) => Some(payload.to_vec()),
                None => {
                    warn!(
                        "Skipping KISS {:?} frame on port {}",
                        frame.command(),
                        frame.port()
                    );
                    None
                }
            })
            .collect()
    } else {
        vec![bytes]
    };

    if frames.is_empty() {
        bail!("No KISS data frames found in input");
    }

    let mut decoded = 0;
    for frame in &frames {
        let Some(ax25_frame) = ax25::decode(frame) else {
            warn!("Not an APRS UI frame: {}", hex::encode(frame));
            continue;
        };
        let packet = AprsPacket::from_frame(&ax25_frame);
        println!("{}", serde_json::to_string_pretty(&packet)?);
        decoded += 1;
    }

    if decoded == 0 {
        bail!("No frames could be decoded");
    }
    Ok(())
}
