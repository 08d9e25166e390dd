//! Color and brightness conversion between the backend and host frameworks.
//!
//! The backend speaks `#rrggbb` hex strings and 0–100 brightness; hosts
//! commonly model color as hue (degrees, 0–360) plus saturation (percent,
//! 0–100) and brightness on a 0–255 scale. Hue/saturation conversion pins
//! the value channel at 100%, matching how the devices render color.

use crate::Result;
use crate::error::Error;

/// Convert a `#rrggbb` hex color to (hue in degrees, saturation in percent).
pub fn hex_to_hs(hex: &str) -> Result<(f64, f64)> {
    let (r, g, b) = parse_hex(hex)?;

    let r = f64::from(r) / 255.0;
    let g = f64::from(g) / 255.0;
    let b = f64::from(b) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let saturation = if max == 0.0 { 0.0 } else { delta / max * 100.0 };

    Ok((hue, saturation))
}

/// Convert (hue in degrees, saturation in percent) to a `#rrggbb` hex color
/// at full value.
#[must_use]
pub fn hs_to_hex(hue: f64, saturation: f64) -> String {
    let hue = hue.rem_euclid(360.0);
    let saturation = (saturation / 100.0).clamp(0.0, 1.0);

    let chroma = saturation;
    let x = chroma * (1.0 - ((hue / 60.0).rem_euclid(2.0) - 1.0).abs());
    let m = 1.0 - chroma;

    let (r, g, b) = match hue {
        h if h < 60.0 => (chroma, x, 0.0),
        h if h < 120.0 => (x, chroma, 0.0),
        h if h < 180.0 => (0.0, chroma, x),
        h if h < 240.0 => (0.0, x, chroma),
        h if h < 300.0 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };

    format!(
        "#{:02x}{:02x}{:02x}",
        channel(r + m),
        channel(g + m),
        channel(b + m)
    )
}

/// Rescale backend brightness (0–100) to the host's 0–255 range.
#[must_use]
pub fn brightness_to_host(percent: u8) -> u8 {
    let clamped = percent.min(100);
    (f64::from(clamped) / 100.0 * 255.0).round() as u8
}

/// Rescale host brightness (0–255) to the backend's 0–100 range.
#[must_use]
pub fn brightness_from_host(host: u8) -> u8 {
    (f64::from(host) / 255.0 * 100.0).round() as u8
}

fn channel(value: f64) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn parse_hex(hex: &str) -> Result<(u8, u8, u8)> {
    let digits = hex
        .strip_prefix('#')
        .ok_or_else(|| Error::validation(format!("color {hex:?} must start with '#'")))?;
    if digits.len() != 6 {
        return Err(Error::validation(format!(
            "color {hex:?} must have exactly six hex digits"
        )));
    }

    let value = u32::from_str_radix(digits, 16)
        .map_err(|_| Error::validation(format!("color {hex:?} is not valid hex")))?;

    Ok((
        ((value >> 16) & 0xff) as u8,
        ((value >> 8) & 0xff) as u8,
        (value & 0xff) as u8,
    ))
}
