//! QR rendering of pairing payloads for terminals and plain-text responses.
//!
//! Two QR rows share one text row using Unicode half-block characters,
//! which keeps the code roughly square in a terminal cell grid.

use qrcodegen::{QrCode, QrCodeEcc};
use tracing::{debug, warn};

/// Modules of white border around the code
const QUIET_ZONE: i32 = 2;

/// Render `data` as half-block lines that fit within the given dimensions.
///
/// Error correction is lowered until the code fits. If it never fits, or
/// the data is too long for any QR version, explanatory lines are returned
/// instead of a code.
pub fn render_qr_lines(data: &str, max_width: u16, max_height: u16) -> Vec<String> {
    for ecc in [QrCodeEcc::Medium, QrCodeEcc::Low] {
        let Ok(code) = QrCode::encode_text(data, ecc) else {
            continue;
        };
        let (width, height) = rendered_size(&code);
        if width <= usize::from(max_width) && height <= usize::from(max_height) {
            debug!("QR code fits with ecc={:?} -> {}x{}", ecc, width, height);
            return half_block_lines(&code);
        }
    }

    match QrCode::encode_text(data, QrCodeEcc::Low) {
        Ok(code) => {
            let (width, height) = rendered_size(&code);
            vec![
                "Window too small for pairing code".to_string(),
                format!("Need {}x{}, have {}x{}", width, height, max_width, max_height),
            ]
        }
        Err(_) => {
            warn!("Pairing payload too long for QR code ({} chars)", data.len());
            vec![
                "Pairing payload too long for QR code".to_string(),
                format!("Payload is {} chars", data.len()),
            ]
        }
    }
}

fn rendered_size(code: &QrCode) -> (usize, usize) {
    let total = (code.size() + QUIET_ZONE * 2) as usize;
    (total, total.div_ceil(2))
}

fn half_block_lines(code: &QrCode) -> Vec<String> {
    let total = code.size() + QUIET_ZONE * 2;
    // get_module is false outside the symbol, which yields the quiet zone
    let dark = |x: i32, y: i32| code.get_module(x - QUIET_ZONE, y - QUIET_ZONE);

    (0..total)
        .step_by(2)
        .map(|upper_y| {
            (0..total)
                .map(|x| match (dark(x, upper_y), dark(x, upper_y + 1)) {
                    (true, true) => '█',
                    (true, false) => '▀',
                    (false, true) => '▄',
                    (false, false) => ' ',
                })
                .collect()
        })
        .collect()
}
