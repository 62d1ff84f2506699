//! DTMF tone validation and queueing (§4.1 `sendDTMF`).

use crate::errors::SessionError;
use std::time::Duration;

/// A single queued DTMF tone with its own timing, already clamped to
/// configured bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtmfTone {
    pub tone: char,
    pub duration: Duration,
    pub inter_tone_gap: Duration,
}

/// Validate a tone string against `[0-9A-DR#*,]+` (case-insensitive), per
/// §4.1.
pub fn validate_tones(tones: &str) -> Result<(), SessionError> {
    if tones.is_empty() {
        return Err(SessionError::invalid_argument("DTMF tone string must not be empty"));
    }
    if tones.chars().all(is_valid_tone_char) {
        Ok(())
    } else {
        Err(SessionError::invalid_argument(format!("invalid DTMF tone string: {tones}")))
    }
}

fn is_valid_tone_char(c: char) -> bool {
    matches!(c.to_ascii_uppercase(), '0'..='9' | 'A'..='D' | 'R' | '#' | '*' | ',')
}

pub fn clamp_duration(requested: Duration, min: Duration, max: Duration) -> Duration {
    requested.clamp(min, max)
}

pub fn clamp_inter_tone_gap(requested: Duration, min: Duration) -> Duration {
    std::cmp::max(requested, min)
}

/// Expand a validated tone string into individually-clamped queue entries.
/// A comma becomes a 2000ms pause rather than an emitted tone (§4.1).
pub fn expand_tones(
    tones: &str,
    duration: Duration,
    inter_tone_gap: Duration,
    comma_pause: Duration,
    min_duration: Duration,
    max_duration: Duration,
    min_gap: Duration,
) -> Vec<DtmfTone> {
    let duration = clamp_duration(duration, min_duration, max_duration);
    let inter_tone_gap = clamp_inter_tone_gap(inter_tone_gap, min_gap);
    tones
        .chars()
        .map(|c| {
            if c == ',' {
                DtmfTone { tone: ',', duration: Duration::ZERO, inter_tone_gap: comma_pause }
            } else {
                DtmfTone { tone: c.to_ascii_uppercase(), duration, inter_tone_gap }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_tone_strings() {
        assert!(validate_tones("123*#ABCDR").is_ok());
        assert!(validate_tones("1,2,3").is_ok());
        assert!(validate_tones("abcd").is_ok());
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(validate_tones("12x3").is_err());
        assert!(validate_tones("").is_err());
    }

    #[test]
    fn clamps_duration_into_bounds() {
        let min = Duration::from_millis(70);
        let max = Duration::from_millis(6000);
        assert_eq!(clamp_duration(Duration::from_millis(10), min, max), min);
        assert_eq!(clamp_duration(Duration::from_millis(10_000), min, max), max);
        assert_eq!(clamp_duration(Duration::from_millis(100), min, max), Duration::from_millis(100));
    }

    #[test]
    fn comma_becomes_a_pause_entry() {
        let plan = expand_tones(
            "1,2",
            Duration::from_millis(100),
            Duration::from_millis(70),
            Duration::from_millis(2000),
            Duration::from_millis(70),
            Duration::from_millis(6000),
            Duration::from_millis(70),
        );
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[1].tone, ',');
        assert_eq!(plan[1].inter_tone_gap, Duration::from_millis(2000));
    }

    #[test]
    fn enqueue_is_equivalent_to_one_call() {
        // sendDTMF("1"); sendDTMF("2") produces the same tone sequence as
        // sendDTMF("12") (testable property 6).
        let d = Duration::from_millis(100);
        let g = Duration::from_millis(70);
        let separate: Vec<char> = expand_tones("1", d, g, Duration::from_millis(2000), g, d * 60, g)
            .into_iter()
            .chain(expand_tones("2", d, g, Duration::from_millis(2000), g, d * 60, g))
            .map(|t| t.tone)
            .collect();
        let combined: Vec<char> =
            expand_tones("12", d, g, Duration::from_millis(2000), g, d * 60, g).into_iter().map(|t| t.tone).collect();
        assert_eq!(separate, combined);
    }
}
