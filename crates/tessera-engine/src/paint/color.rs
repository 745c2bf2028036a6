use crate::error::{Error, Result};

/// Straight-alpha RGBA color.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl Color {
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);

    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Creates a color from straight sRGB bytes (`0`–`255`).
    #[inline]
    pub fn from_rgba_u8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::new(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        )
    }

    /// Parses `#rgb`, `#rrggbb` or `#rrggbbaa` (leading `#` optional).
    pub fn from_hex(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        let invalid = || Error::InvalidColor(s.to_string());

        if !hex.is_ascii() {
            return Err(invalid());
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());

        match hex.len() {
            3 => {
                let mut c = [0u8; 3];
                for (i, ch) in hex.chars().enumerate() {
                    let v = ch.to_digit(16).ok_or_else(invalid)? as u8;
                    c[i] = v * 17;
                }
                Ok(Self::from_rgba_u8(c[0], c[1], c[2], 255))
            }
            6 => Ok(Self::from_rgba_u8(byte(0)?, byte(2)?, byte(4)?, 255)),
            8 => Ok(Self::from_rgba_u8(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => Err(invalid()),
        }
    }

    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite() && self.a.is_finite()
    }

    /// Clear color for a render pass.
    pub fn to_wgpu(self) -> wgpu::Color {
        wgpu::Color {
            r: self.r as f64,
            g: self.g as f64,
            b: self.b as f64,
            a: self.a as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_six_digit_hex() {
        let c = Color::from_hex("#ff0000").unwrap();
        assert_eq!(c, Color::new(1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn parses_short_and_alpha_hex() {
        assert_eq!(Color::from_hex("fff").unwrap(), Color::WHITE);
        let c = Color::from_hex("#00000000").unwrap();
        assert_eq!(c, Color::TRANSPARENT);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(Color::from_hex("#12345"), Err(Error::InvalidColor(_))));
        assert!(matches!(Color::from_hex("#gg0000"), Err(Error::InvalidColor(_))));
        assert!(matches!(Color::from_hex("#ééé"), Err(Error::InvalidColor(_))));
    }
}
