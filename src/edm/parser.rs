//! EDM response grammar.
//!
//! The instrument answers a trigger with one ASCII line:
//!
//! ```text
//! <slope distance mm> <vertical [D]DDMMSS> <horizontal [D]DDMMSS> <...ignored>
//! ```
//!
//! Angles are packed degrees-minutes-seconds. A six-character angle has a two-digit
//! degree part and is left-padded to seven before splitting.

use super::ParsedReading;
use crate::error::{AppResult, PolyfieldError};

/// Decode a packed `[D]DDMMSS` angle into decimal degrees.
pub fn parse_angle(raw: &str) -> AppResult<f64> {
    let invalid = |reason: String| PolyfieldError::InvalidAngle {
        field: raw.to_string(),
        reason,
    };

    if !(6..=7).contains(&raw.len()) {
        return Err(invalid(format!("expected 6 or 7 digits, got {}", raw.len())));
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("non-digit character".to_string()));
    }

    let padded = format!("{raw:0>7}");
    let digits = |range: std::ops::Range<usize>| -> AppResult<u32> {
        padded[range]
            .parse::<u32>()
            .map_err(|e| invalid(e.to_string()))
    };

    let degrees = digits(0..3)?;
    let minutes = digits(3..5)?;
    let seconds = digits(5..7)?;

    if minutes >= 60 || seconds >= 60 {
        return Err(invalid(format!(
            "minutes or seconds out of range (mm={minutes:02}, ss={seconds:02})"
        )));
    }

    Ok(f64::from(degrees) + f64::from(minutes) / 60.0 + f64::from(seconds) / 3600.0)
}

/// Decode one raw response line.
pub fn parse_response(raw: &str) -> AppResult<ParsedReading> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    if parts.len() < 4 {
        return Err(PolyfieldError::MalformedResponse(format!(
            "got {} parts",
            parts.len()
        )));
    }

    let slope_distance_mm = parts[0].parse::<f64>().map_err(|_| {
        PolyfieldError::MalformedResponse(format!("non-numeric slope distance '{}'", parts[0]))
    })?;

    Ok(ParsedReading {
        slope_distance_mm,
        vertical_angle_deg: parse_angle(parts[1])?,
        horizontal_angle_deg: parse_angle(parts[2])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_parse_angle_seven_digits() {
        let deg = parse_angle("1801530").unwrap();
        assert!(approx(deg, 180.0 + 15.0 / 60.0 + 30.0 / 3600.0));
    }

    #[test]
    fn test_parse_angle_six_digits_is_padded() {
        // 883015 -> 0883015
        assert!(approx(
            parse_angle("883015").unwrap(),
            parse_angle("0883015").unwrap()
        ));
        assert!(approx(
            parse_angle("883015").unwrap(),
            88.0 + 30.0 / 60.0 + 15.0 / 3600.0
        ));
    }

    #[test]
    fn test_parse_angle_padding_invariant_over_range() {
        for degrees in 0..100u32 {
            for (mm, ss) in [(0u32, 0u32), (7, 45), (59, 59), (30, 1)] {
                let short = format!("{degrees:02}{mm:02}{ss:02}");
                let long = format!("0{short}");
                let expected =
                    f64::from(degrees) + f64::from(mm) / 60.0 + f64::from(ss) / 3600.0;
                assert!(approx(parse_angle(&short).unwrap(), expected));
                assert!(approx(parse_angle(&long).unwrap(), expected));
            }
        }
    }

    #[test]
    fn test_parse_angle_rejects_out_of_range_fields() {
        assert!(parse_angle("0886000").is_err());
        assert!(parse_angle("0880060").is_err());
        assert!(parse_angle("886015").is_err());
        assert!(parse_angle("3599999").is_err());
    }

    #[test]
    fn test_parse_angle_rejects_bad_length_and_tokens() {
        let err = parse_angle("12345").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Parse);
        assert!(parse_angle("12345678").is_err());
        assert!(parse_angle("08a3015").is_err());
        assert!(parse_angle("+883015").is_err());
    }

    #[test]
    fn test_parse_response_reference_line() {
        let reading = parse_response("15234 0883015 1801530 extra").unwrap();
        assert_eq!(reading.slope_distance_mm, 15234.0);
        assert!((reading.vertical_angle_deg - 88.504167).abs() < 1e-6);
        assert!((reading.horizontal_angle_deg - 180.258333).abs() < 1e-6);
    }

    #[test]
    fn test_parse_response_trims_and_ignores_trailing_fields() {
        let reading = parse_response("  10000.5\t0900000 0000000 0 1 2\r\n").unwrap();
        assert_eq!(reading.slope_distance_mm, 10000.5);
        assert!(approx(reading.vertical_angle_deg, 90.0));
        assert!(approx(reading.horizontal_angle_deg, 0.0));
    }

    #[test]
    fn test_parse_response_requires_four_fields() {
        let err = parse_response("15234 0883015 1801530").unwrap_err();
        assert!(matches!(err, PolyfieldError::MalformedResponse(ref m) if m.contains("3 parts")));
        assert!(parse_response("").is_err());
    }

    #[test]
    fn test_parse_response_reports_offending_token() {
        let err = parse_response("abc 0883015 1801530 x").unwrap_err();
        assert!(err.to_string().contains("abc"));

        let err = parse_response("15234 0886515 1801530 x").unwrap_err();
        assert!(matches!(err, PolyfieldError::InvalidAngle { ref field, .. } if field == "0886515"));
    }
}
