//! Fade curve implementations for crossfading
//!
//! The same curve names drive both the local gain ramps (dreams-ap) and the
//! encoder crossfade filter (dreams-sd), so each variant knows its ffmpeg
//! `acrossfade` curve name.

use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

/// Fade curve types for crossfading
///
/// - Linear: constant rate of change (the default crossfade)
/// - Exponential: slow start, fast finish
/// - Logarithmic: fast start, slow finish
/// - SCurve: smooth acceleration and deceleration
/// - EqualPower: constant perceived loudness during crossfade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// v(t) = t
    #[default]
    Linear,
    /// v(t) = t²
    Exponential,
    /// v(t) = (1-t)² for fade-out
    Logarithmic,
    /// v(t) = 0.5 × (1 - cos(π × t))
    SCurve,
    /// v(t) = sin(t × π/2)
    EqualPower,
}

impl FadeCurve {
    /// Fade-in multiplier at normalized position 0.0..=1.0
    pub fn calculate_fade_in(&self, position: f32) -> f32 {
        let t = position.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => t,
            FadeCurve::Exponential => t * t,
            // Inverse of the quadratic fade-out
            FadeCurve::Logarithmic => t.sqrt(),
            FadeCurve::SCurve => 0.5 * (1.0 - (PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).sin(),
        }
    }

    /// Fade-out multiplier at normalized position 0.0..=1.0
    pub fn calculate_fade_out(&self, position: f32) -> f32 {
        let t = position.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => 1.0 - t,
            FadeCurve::Exponential | FadeCurve::Logarithmic => {
                let inv = 1.0 - t;
                inv * inv
            }
            FadeCurve::SCurve => 0.5 * (1.0 + (PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).cos(),
        }
    }

    /// Gain at `position` along a ramp from `from` to `to`
    ///
    /// Rising ramps follow the fade-in shape, falling ramps the fade-out shape.
    pub fn interpolate(&self, from: f32, to: f32, position: f32) -> f32 {
        if to >= from {
            from + (to - from) * self.calculate_fade_in(position)
        } else {
            to + (from - to) * self.calculate_fade_out(position)
        }
    }

    /// Curve name understood by ffmpeg's `acrossfade` filter (c1/c2)
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "tri",
            FadeCurve::Exponential => "exp",
            FadeCurve::Logarithmic => "log",
            FadeCurve::SCurve => "hsin",
            FadeCurve::EqualPower => "qsin",
        }
    }

    /// Parse curve from a configuration string
    ///
    /// Accepts the snake_case names plus the ffmpeg aliases.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "linear" | "tri" => Some(FadeCurve::Linear),
            "exponential" | "exp" => Some(FadeCurve::Exponential),
            "logarithmic" | "log" => Some(FadeCurve::Logarithmic),
            "cosine" | "scurve" | "s-curve" | "s_curve" | "hsin" => Some(FadeCurve::SCurve),
            "equal_power" | "equalpower" | "qsin" => Some(FadeCurve::EqualPower),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "Linear",
            FadeCurve::Exponential => "Exponential",
            FadeCurve::Logarithmic => "Logarithmic",
            FadeCurve::SCurve => "S-Curve",
            FadeCurve::EqualPower => "Equal Power",
        }
    }

    pub fn all_variants() -> &'static [FadeCurve] {
        &[
            FadeCurve::Linear,
            FadeCurve::Exponential,
            FadeCurve::Logarithmic,
            FadeCurve::SCurve,
            FadeCurve::EqualPower,
        ]
    }
}

impl std::fmt::Display for FadeCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_bounds() {
        for curve in FadeCurve::all_variants() {
            assert!(curve.calculate_fade_in(0.0).abs() < 0.01, "{:?} fade-in start", curve);
            assert!((curve.calculate_fade_in(1.0) - 1.0).abs() < 0.01, "{:?} fade-in end", curve);
            assert!((curve.calculate_fade_out(0.0) - 1.0).abs() < 0.01, "{:?} fade-out start", curve);
            assert!(curve.calculate_fade_out(1.0).abs() < 0.01, "{:?} fade-out end", curve);
        }
    }

    #[test]
    fn test_linear_interpolate() {
        let c = FadeCurve::Linear;
        assert!((c.interpolate(0.0, 1.0, 0.25) - 0.25).abs() < 1e-6);
        assert!((c.interpolate(1.0, 0.0, 0.25) - 0.75).abs() < 1e-6);
        // Partial ramp (stop fade from a mid-crossfade gain)
        assert!((c.interpolate(0.4, 0.0, 0.5) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_interpolate_endpoints() {
        for curve in FadeCurve::all_variants() {
            assert!((curve.interpolate(0.2, 0.9, 0.0) - 0.2).abs() < 0.01);
            assert!((curve.interpolate(0.2, 0.9, 1.0) - 0.9).abs() < 0.01);
            assert!((curve.interpolate(0.9, 0.2, 1.0) - 0.2).abs() < 0.01);
        }
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(FadeCurve::from_str("tri"), Some(FadeCurve::Linear));
        assert_eq!(FadeCurve::from_str("cosine"), Some(FadeCurve::SCurve));
        assert_eq!(FadeCurve::from_str("EQUAL_POWER"), Some(FadeCurve::EqualPower));
        assert_eq!(FadeCurve::from_str("nope"), None);
    }

    #[test]
    fn test_ffmpeg_names_round_trip() {
        for curve in FadeCurve::all_variants() {
            assert_eq!(FadeCurve::from_str(curve.ffmpeg_name()), Some(*curve));
        }
    }
}
