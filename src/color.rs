use anyhow::{Result, anyhow};
use image::Rgba;
use serde::Deserialize;

/// Named continuous scale, sampled between evenly spaced stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScale {
    #[default]
    Viridis,
    Plasma,
    Cividis,
    Greys,
    Blues,
    Reds,
}

const VIRIDIS: [[u8; 3]; 10] = [
    [0x44, 0x01, 0x54],
    [0x48, 0x28, 0x78],
    [0x3e, 0x49, 0x89],
    [0x31, 0x68, 0x8e],
    [0x26, 0x82, 0x8e],
    [0x1f, 0x9e, 0x89],
    [0x35, 0xb7, 0x79],
    [0x6e, 0xce, 0x58],
    [0xb5, 0xde, 0x2b],
    [0xfd, 0xe7, 0x25],
];

const PLASMA: [[u8; 3]; 10] = [
    [0x0d, 0x08, 0x87],
    [0x46, 0x03, 0x9f],
    [0x72, 0x01, 0xa8],
    [0x9c, 0x17, 0x9e],
    [0xbd, 0x37, 0x86],
    [0xd8, 0x57, 0x6b],
    [0xed, 0x79, 0x53],
    [0xfb, 0x9f, 0x3a],
    [0xfd, 0xca, 0x26],
    [0xf0, 0xf9, 0x21],
];

const CIVIDIS: [[u8; 3]; 10] = [
    [0x00, 0x22, 0x4e],
    [0x12, 0x35, 0x70],
    [0x3b, 0x49, 0x6c],
    [0x57, 0x5d, 0x6d],
    [0x70, 0x71, 0x73],
    [0x8a, 0x86, 0x78],
    [0xa5, 0x9c, 0x74],
    [0xc3, 0xb3, 0x69],
    [0xe1, 0xcc, 0x55],
    [0xfe, 0xe8, 0x38],
];

const GREYS: [[u8; 3]; 2] = [[0xff, 0xff, 0xff], [0x00, 0x00, 0x00]];

const BLUES: [[u8; 3]; 9] = [
    [0xf7, 0xfb, 0xff],
    [0xde, 0xeb, 0xf7],
    [0xc6, 0xdb, 0xef],
    [0x9e, 0xca, 0xe1],
    [0x6b, 0xae, 0xd6],
    [0x42, 0x92, 0xc6],
    [0x21, 0x71, 0xb5],
    [0x08, 0x51, 0x9c],
    [0x08, 0x30, 0x6b],
];

const REDS: [[u8; 3]; 9] = [
    [0xff, 0xf5, 0xf0],
    [0xfe, 0xe0, 0xd2],
    [0xfc, 0xbb, 0xa1],
    [0xfc, 0x92, 0x72],
    [0xfb, 0x6a, 0x4a],
    [0xef, 0x3b, 0x2c],
    [0xcb, 0x18, 0x1d],
    [0xa5, 0x0f, 0x15],
    [0x67, 0x00, 0x0d],
];

impl ColorScale {
    fn stops(self) -> &'static [[u8; 3]] {
        match self {
            ColorScale::Viridis => &VIRIDIS,
            ColorScale::Plasma => &PLASMA,
            ColorScale::Cividis => &CIVIDIS,
            ColorScale::Greys => &GREYS,
            ColorScale::Blues => &BLUES,
            ColorScale::Reds => &REDS,
        }
    }

    /// Color at position `t` along the scale; `t` is clamped to `[0, 1]`.
    pub fn color_at(self, t: f64) -> Rgba<u8> {
        let stops = self.stops();
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };

        let pos = t * (stops.len() - 1) as f64;
        let lower = (pos.floor() as usize).min(stops.len() - 2);
        let frac = pos - lower as f64;

        let a = stops[lower];
        let b = stops[lower + 1];
        let mix = |i: usize| (a[i] as f64 + (b[i] as f64 - a[i] as f64) * frac).round() as u8;
        Rgba([mix(0), mix(1), mix(2), 255])
    }
}

/// The value interval mapped onto a color scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Smallest range covering all finite values; `[0, 1]` when there are none.
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values.into_iter().filter(|v| v.is_finite()) {
            min = min.min(v);
            max = max.max(v);
        }
        if min > max {
            Self::new(0.0, 1.0)
        } else {
            Self::new(min, max)
        }
    }

    /// Position of `value` inside the range. Values outside are clamped to the ends.
    pub fn normalize(&self, value: f64) -> f64 {
        // A reversed range (max below min) runs the scale backwards
        let span = self.max - self.min;
        if span == 0.0 || !span.is_finite() {
            return 0.5;
        }
        ((value - self.min) / span).clamp(0.0, 1.0)
    }

    /// Roughly `target` evenly spaced round values within the range.
    pub fn ticks(&self, target: usize) -> Vec<f64> {
        let (lo, hi) = (self.min.min(self.max), self.min.max(self.max));
        let span = hi - lo;
        if span <= 0.0 || !span.is_finite() || target == 0 {
            return vec![self.min];
        }

        let raw = span / target as f64;
        let magnitude = 10f64.powf(raw.log10().floor());
        let step = [1.0, 2.0, 2.5, 5.0, 10.0]
            .iter()
            .map(|m| m * magnitude)
            .find(|s| *s >= raw)
            .unwrap_or(10.0 * magnitude);

        let first = (lo / step).ceil() as i64;
        let last = (hi / step).floor() as i64;
        (first..=last).map(|i| i as f64 * step).collect()
    }
}

/// Parse `#rrggbb` or `#rrggbbaa`.
pub fn parse_hex(hex: &str) -> Result<Rgba<u8>> {
    let digits = hex.trim().trim_start_matches('#');
    if !(digits.len() == 6 || digits.len() == 8) || !digits.is_ascii() {
        return Err(anyhow!("Invalid color '{}': expected #rrggbb", hex));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&digits[i..i + 2], 16)
            .map_err(|_| anyhow!("Invalid color '{}': bad hex digits", hex))
    };
    let alpha = if digits.len() == 8 { channel(6)? } else { 255 };
    Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, alpha]))
}

/// Short label for a tick value: no trailing zeros, scientific for very large or small magnitudes.
pub fn format_tick(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-3..1e7).contains(&magnitude) {
        return format!("{:.1e}", value);
    }
    let text = format!("{:.3}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" { "0".to_string() } else { text.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_ends_are_the_first_and_last_stops() {
        assert_eq!(ColorScale::Viridis.color_at(0.0), Rgba([0x44, 0x01, 0x54, 255]));
        assert_eq!(ColorScale::Viridis.color_at(1.0), Rgba([0xfd, 0xe7, 0x25, 255]));
        assert_eq!(ColorScale::Greys.color_at(0.5), Rgba([128, 128, 128, 255]));
    }

    #[test]
    fn scale_clamps_out_of_range_positions() {
        assert_eq!(ColorScale::Plasma.color_at(-3.0), ColorScale::Plasma.color_at(0.0));
        assert_eq!(ColorScale::Plasma.color_at(7.0), ColorScale::Plasma.color_at(1.0));
        assert_eq!(ColorScale::Plasma.color_at(f64::NAN), ColorScale::Plasma.color_at(0.0));
    }

    #[test]
    fn fixed_range_clamps_values_outside() {
        let range = ValueRange::new(0.0, 12.0);
        assert_eq!(range.normalize(6.0), 0.5);
        assert_eq!(range.normalize(-4.0), 0.0);
        assert_eq!(range.normalize(30.0), 1.0);
    }

    #[test]
    fn data_range_and_degenerate_range() {
        let range = ValueRange::from_values([3.0, f64::NAN, -1.0, 8.0]);
        assert_eq!(range, ValueRange::new(-1.0, 8.0));
        assert_eq!(ValueRange::from_values(Vec::new()), ValueRange::new(0.0, 1.0));
        assert_eq!(ValueRange::new(2.0, 2.0).normalize(2.0), 0.5);
    }

    #[test]
    fn ticks_are_round_numbers_inside_the_range() {
        assert_eq!(ValueRange::new(0.0, 12.0).ticks(5), vec![0.0, 2.5, 5.0, 7.5, 10.0]);
        let ticks = ValueRange::new(1.2e8, 1.9e9).ticks(5);
        assert!(ticks.iter().all(|t| *t >= 1.2e8 && *t <= 1.9e9));
        assert!(ticks.len() >= 3);
    }

    #[test]
    fn reversed_range_runs_the_scale_backwards() {
        let range = ValueRange::new(12.0, 0.0);
        assert_eq!(range.normalize(0.0), 1.0);
        assert_eq!(range.normalize(12.0), 0.0);
        assert_eq!(range.normalize(3.0), 0.75);
        assert_eq!(range.normalize(20.0), 0.0);
        assert_eq!(range.ticks(5), vec![0.0, 2.5, 5.0, 7.5, 10.0]);
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex("#d3d3d3").unwrap(), Rgba([0xd3, 0xd3, 0xd3, 255]));
        assert_eq!(parse_hex("00000080").unwrap(), Rgba([0, 0, 0, 0x80]));
        assert!(parse_hex("#abc").is_err());
        assert!(parse_hex("#gg0000").is_err());
    }

    #[test]
    fn tick_labels() {
        assert_eq!(format_tick(2.5), "2.5");
        assert_eq!(format_tick(10.0), "10");
        assert_eq!(format_tick(0.0), "0");
        assert_eq!(format_tick(1.5e9), "1.5e9");
    }
}
