//! Color bands for the widget metrics.
//!
//! Backgrounds are linear per-channel interpolations between two anchors.
//! Text colors are the background with its HSL lightness scaled down, so
//! every band gets readable contrast without a hand-picked table.

use std::fmt;

/// Lightness multiplier applied to a background to get its text color
pub const TEXT_LIGHTNESS_FACTOR: f64 = 0.6;

/// 8-bit sRGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

// =============================================================================
// Anchor colors
// =============================================================================

/// Neutral gray for "no rain" and unknown values.
pub const NEUTRAL_GRAY: Rgb = Rgb::from_hex(0x9E9E9E);

/// Light blue: the faintest chance of rain.
pub const PRECIP_LOW: Rgb = Rgb::from_hex(0xBBDEFB);

/// Deep blue: saturated rain.
pub const PRECIP_HIGH: Rgb = Rgb::from_hex(0x0D47A1);

pub const HUMIDITY_LOW: Rgb = Rgb::from_hex(0xFFFFFF);
pub const HUMIDITY_HIGH: Rgb = Rgb::from_hex(0x1565C0);

/// UV index up to 3 (low).
pub const UV_GREEN: Rgb = Rgb::from_hex(0x2ECC71);

/// UV index above 3 and below 7 (moderate to high).
pub const UV_YELLOW: Rgb = Rgb::from_hex(0xFFD700);

/// UV index 7 and up (very high).
pub const UV_RED: Rgb = Rgb::from_hex(0xFF3B30);

// =============================================================================
// UV thresholds (raw index, not normalized)
// =============================================================================

pub const UV_GREEN_MAX: f64 = 3.0;
pub const UV_RED_MIN: f64 = 7.0;

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// From a 0xRRGGBB literal.
    pub const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as u8,
            g: ((hex >> 8) & 0xFF) as u8,
            b: (hex & 0xFF) as u8,
        }
    }

    /// Channel-wise linear interpolation; `t` is clamped to [0, 1].
    pub fn lerp(from: Rgb, to: Rgb, t: f64) -> Rgb {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let mix = |a: u8, b: u8| -> u8 {
            let v = f64::from(a) + (f64::from(b) - f64::from(a)) * t;
            v.round().clamp(0.0, 255.0) as u8
        };
        Rgb::new(mix(from.r, to.r), mix(from.g, to.g), mix(from.b, to.b))
    }

    pub fn to_hsl(self) -> Hsl {
        let r = f64::from(self.r) / 255.0;
        let g = f64::from(self.g) / 255.0;
        let b = f64::from(self.b) / 255.0;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) / 2.0;
        let d = max - min;

        if d == 0.0 {
            return Hsl { h: 0.0, s: 0.0, l };
        }

        let s = if l > 0.5 {
            d / (2.0 - max - min)
        } else {
            d / (max + min)
        };

        let h = if max == r {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };

        Hsl { h: h / 6.0, s, l }
    }

    /// Readable text color for this background.
    pub fn text_color(self) -> Rgb {
        let hsl = self.to_hsl();
        Hsl {
            l: hsl.l * TEXT_LIGHTNESS_FACTOR,
            ..hsl
        }
        .to_rgb()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Hue, saturation and lightness, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    pub h: f64,
    pub s: f64,
    pub l: f64,
}

impl Hsl {
    pub fn to_rgb(self) -> Rgb {
        let channel = |v: f64| (v * 255.0).round().clamp(0.0, 255.0) as u8;

        if self.s == 0.0 {
            let v = channel(self.l);
            return Rgb::new(v, v, v);
        }

        let q = if self.l < 0.5 {
            self.l * (1.0 + self.s)
        } else {
            self.l + self.s - self.l * self.s
        };
        let p = 2.0 * self.l - q;

        Rgb::new(
            channel(hue_to_rgb(p, q, self.h + 1.0 / 3.0)),
            channel(hue_to_rgb(p, q, self.h)),
            channel(hue_to_rgb(p, q, self.h - 1.0 / 3.0)),
        )
    }
}

fn hue_to_rgb(p: f64, q: f64, t: f64) -> f64 {
    let t = if t < 0.0 {
        t + 1.0
    } else if t > 1.0 {
        t - 1.0
    } else {
        t
    };

    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// Precipitation band from the normalized value. Exactly zero reads as gray.
pub fn precipitation_color(normalized: Option<f64>) -> Rgb {
    match normalized {
        Some(v) if v > 0.0 => Rgb::lerp(PRECIP_LOW, PRECIP_HIGH, v),
        _ => NEUTRAL_GRAY,
    }
}

pub fn humidity_color(normalized: Option<f64>) -> Rgb {
    match normalized {
        Some(v) => Rgb::lerp(HUMIDITY_LOW, HUMIDITY_HIGH, v),
        None => NEUTRAL_GRAY,
    }
}

/// UV band from the raw index.
pub fn uv_color(raw: Option<f64>) -> Rgb {
    match raw {
        Some(uv) if uv >= UV_RED_MIN => UV_RED,
        Some(uv) if uv > UV_GREEN_MAX => UV_YELLOW,
        Some(_) => UV_GREEN,
        None => NEUTRAL_GRAY,
    }
}
