//! Aspect ratio classification for probed video dimensions.
//!
//! Real encodes rarely hit exact pixel ratios, so classification first
//! compares the decimal ratio against the two presentation ratios with a
//! small tolerance and only then falls back to the exact reduced ratio.

use std::fmt;

const PORTRAIT: f64 = 9.0 / 16.0;
const LANDSCAPE: f64 = 16.0 / 9.0;
const TOLERANCE: f64 = 0.01;

/// Presentation ratio of a video, derived per upload and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectClass {
    Landscape,
    Portrait,
    Other,
}

impl AspectClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectClass::Landscape => "16:9",
            AspectClass::Portrait => "9:16",
            AspectClass::Other => "other",
        }
    }
}

impl fmt::Display for AspectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Greatest common divisor, Euclid's recursion.
pub fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Exact `W:H` ratio of the dimensions reduced by their gcd.
pub fn reduced_ratio(width: u32, height: u32) -> String {
    let divisor = gcd(width, height);
    if divisor == 0 {
        return "0:0".to_string();
    }
    format!("{}:{}", width / divisor, height / divisor)
}

/// Classify `width x height`.
///
/// The caller excludes zero dimensions; they classify as `Other` rather than
/// panicking.
pub fn classify(width: u32, height: u32) -> AspectClass {
    if width == 0 || height == 0 {
        return AspectClass::Other;
    }

    let decimal = f64::from(width) / f64::from(height);
    if (decimal - PORTRAIT).abs() < TOLERANCE {
        return AspectClass::Portrait;
    }
    if (decimal - LANDSCAPE).abs() < TOLERANCE {
        return AspectClass::Landscape;
    }

    match reduced_ratio(width, height).as_str() {
        "16:9" => AspectClass::Landscape,
        "9:16" => AspectClass::Portrait,
        _ => AspectClass::Other,
    }
}
