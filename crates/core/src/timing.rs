//! Timing resolver: maps per-slide narration spans to display durations.

use serde::{Deserialize, Serialize};

use crate::presentation::SlideManifest;

/// Options for resolving display durations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimingOptions {
    /// Floor for any slide's display duration, in seconds.
    #[serde(default = "default_min_display")]
    pub min_display_secs: f64,
    /// Duration for slides with zero or missing narration, in seconds.
    #[serde(default = "default_fallback_display")]
    pub fallback_display_secs: f64,
}

fn default_min_display() -> f64 {
    1.0
}

fn default_fallback_display() -> f64 {
    3.0
}

impl Default for TimingOptions {
    fn default() -> Self {
        Self {
            min_display_secs: default_min_display(),
            fallback_display_secs: default_fallback_display(),
        }
    }
}

/// Resolve each slide's display duration from its narration span.
///
/// Duration is `end - start`, clamped to the minimum floor; slides without
/// narration (or with a degenerate span) use the fallback duration.
pub fn resolve_display_durations(slides: &[SlideManifest], opts: TimingOptions) -> Vec<f64> {
    slides
        .iter()
        .map(|slide| match &slide.narration {
            Some(span) => {
                let narrated = span.duration_secs();
                if narrated <= 0.0 {
                    opts.fallback_display_secs
                } else {
                    narrated.max(opts.min_display_secs)
                }
            }
            None => opts.fallback_display_secs,
        })
        .collect()
}

/// Sum of resolved display durations, the expected output duration.
pub fn total_display_secs(durations: &[f64]) -> f64 {
    durations.iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::NarrationSpan;

    fn slide(index: usize, span: Option<(f64, f64)>) -> SlideManifest {
        SlideManifest {
            index,
            narration: span.map(|(start_secs, end_secs)| NarrationSpan {
                start_secs,
                end_secs,
            }),
            audio_chunks: vec![],
        }
    }

    #[test]
    fn test_durations_from_spans() {
        let slides = vec![
            slide(0, Some((0.0, 2.0))),
            slide(1, Some((2.0, 5.5))),
            slide(2, Some((5.5, 6.5))),
        ];
        let durations = resolve_display_durations(&slides, TimingOptions::default());
        assert_eq!(durations, vec![2.0, 3.5, 1.0]);
        assert!((total_display_secs(&durations) - 6.5).abs() < 1e-9);
    }

    #[test]
    fn test_minimum_floor() {
        let slides = vec![slide(0, Some((0.0, 0.25)))];
        let durations = resolve_display_durations(&slides, TimingOptions::default());
        assert_eq!(durations, vec![1.0]);
    }

    #[test]
    fn test_missing_narration_uses_fallback() {
        let slides = vec![slide(0, None), slide(1, Some((3.0, 3.0)))];
        let durations = resolve_display_durations(&slides, TimingOptions::default());
        assert_eq!(durations, vec![3.0, 3.0]);
    }

    #[test]
    fn test_custom_options() {
        let opts = TimingOptions {
            min_display_secs: 2.0,
            fallback_display_secs: 5.0,
        };
        let slides = vec![slide(0, Some((0.0, 0.5))), slide(1, None)];
        let durations = resolve_display_durations(&slides, opts);
        assert_eq!(durations, vec![2.0, 5.0]);
    }
}
