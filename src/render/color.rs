//! Color token parsing.
//!
//! Tables and palettes carry colors as strings. Accepted forms are `#RGB`,
//! `#RRGGBB`, `#RRGGBBAA` (leading `#` optional) and a handful of names.
//! Anything else becomes mid gray.

use image::Rgba;

pub const FALLBACK: Rgba<u8> = Rgba([128, 128, 128, 255]);

/// Parse a color token into an opaque (or explicit-alpha) RGBA pixel.
pub fn parse_color(token: &str) -> Rgba<u8> {
    try_parse_color(token).unwrap_or(FALLBACK)
}

/// Like [`parse_color`] but reports unparseable tokens.
pub fn try_parse_color(token: &str) -> Option<Rgba<u8>> {
    let t = token.trim();
    if let Some(named) = named_color(t) {
        return Some(named);
    }
    let hex = t.strip_prefix('#').unwrap_or(t);
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|n| n * 17);
    match hex.len() {
        3 => Some(Rgba([nibble(0)?, nibble(1)?, nibble(2)?, 255])),
        6 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
        8 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
        _ => None,
    }
}

/// The same color with a different alpha.
pub fn with_alpha(color: Rgba<u8>, alpha: u8) -> Rgba<u8> {
    Rgba([color[0], color[1], color[2], alpha])
}

fn named_color(name: &str) -> Option<Rgba<u8>> {
    let rgb = match name.to_ascii_lowercase().as_str() {
        "red" => [255, 0, 0],
        "orange" => [255, 165, 0],
        "yellow" => [255, 255, 0],
        "green" => [0, 128, 0],
        "blue" => [0, 0, 255],
        "purple" => [128, 0, 128],
        "black" => [0, 0, 0],
        "white" => [255, 255, 255],
        "gray" | "grey" => [128, 128, 128],
        _ => return None,
    };
    Some(Rgba([rgb[0], rgb[1], rgb[2], 255]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_forms() {
        assert_eq!(parse_color("#FF0000"), Rgba([255, 0, 0, 255]));
        assert_eq!(parse_color("00aa00"), Rgba([0, 170, 0, 255]));
        assert_eq!(parse_color("#0f0"), Rgba([0, 255, 0, 255]));
        assert_eq!(parse_color("#11223344"), Rgba([0x11, 0x22, 0x33, 0x44]));
    }

    #[test]
    fn names_and_fallback() {
        assert_eq!(parse_color("Orange"), Rgba([255, 165, 0, 255]));
        assert_eq!(parse_color("#GGGGGG"), FALLBACK);
        assert_eq!(parse_color("#12345"), FALLBACK);
        assert_eq!(parse_color("ünï"), FALLBACK);
        assert!(try_parse_color("nope").is_none());
    }
}
