//! Colors as they arrive from the control panel.
//!
//! Controls hand over CSS-style hex strings. [`Color`] keeps the canonical
//! `#rrggbb` spelling (so bindings can be compared and displayed exactly as
//! entered) and converts to linear RGB for the shaders.

use std::{fmt, str::FromStr};

use anyhow::{Context as _, bail};

/// An sRGB color parsed from `#rgb` or `#rrggbb`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color {
    r: u8,
    g: u8,
    b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a hex color. Leading/trailing whitespace is ignored, the `#` is
    /// optional and both the short and the long form are accepted.
    pub fn parse(input: &str) -> anyhow::Result<Self> {
        let hex = input.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("'{input}' is not a hex color");
        }
        match hex.len() {
            3 => {
                let digit = |i: usize| -> anyhow::Result<u8> {
                    let d = u8::from_str_radix(&hex[i..=i], 16)
                        .with_context(|| format!("bad digit in '{input}'"))?;
                    Ok(d * 17)
                };
                Ok(Self::rgb(digit(0)?, digit(1)?, digit(2)?))
            }
            6 => {
                let channel = |i: usize| -> anyhow::Result<u8> {
                    u8::from_str_radix(&hex[i..i + 2], 16)
                        .with_context(|| format!("bad channel in '{input}'"))
                };
                Ok(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
            }
            n => bail!("'{input}' has {n} hex digits, expected 3 or 6"),
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_srgb(&self) -> [f32; 3] {
        [self.r, self.g, self.b].map(|c| c as f32 / 255.0)
    }

    /// Linear RGB, which is what every shader in this crate works in.
    pub fn to_linear(&self) -> [f32; 3] {
        self.to_srgb().map(srgb_to_linear)
    }
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

impl FromStr for Color {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_and_short_forms() {
        assert_eq!(Color::parse("#fff0f0").unwrap(), Color::rgb(255, 240, 240));
        assert_eq!(Color::parse("#FFF").unwrap(), Color::WHITE);
        assert_eq!(Color::parse("  112233 ").unwrap(), Color::rgb(0x11, 0x22, 0x33));
    }

    #[test]
    fn keeps_canonical_spelling() {
        assert_eq!(Color::parse("#AABBCC").unwrap().to_hex(), "#aabbcc");
        assert_eq!(Color::parse("#abc").unwrap().to_string(), "#aabbcc");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Color::parse("").is_err());
        assert!(Color::parse("#12345").is_err());
        assert!(Color::parse("#gg0000").is_err());
        assert!(Color::parse("red").is_err());
    }

    #[test]
    fn linear_conversion_hits_the_endpoints() {
        assert_eq!(Color::BLACK.to_linear(), [0.0; 3]);
        let white = Color::WHITE.to_linear();
        for c in white {
            assert!((c - 1.0).abs() < 1e-6);
        }
        let mid = Color::rgb(128, 128, 128).to_linear()[0];
        assert!((mid - 0.2158).abs() < 1e-3);
    }
}
