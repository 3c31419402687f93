use std::time::Duration;

use crate::common::error::validation_error;

/// Parses a PBS walltime string in the `HH:MM:SS` format.
///
/// Hours may have one to three digits; minutes and seconds must have exactly
/// two digits and be below 60.
pub fn parse_hms_time(value: &str) -> crate::Result<Duration> {
    let invalid = || {
        validation_error(format!(
            "Invalid walltime format: '{value}'. Expected HH:MM:SS (e.g. 01:30:00)"
        ))
    };

    let parts: Vec<&str> = value.split(':').collect();
    let [hours, minutes, seconds] = parts.as_slice() else {
        return invalid();
    };

    if hours.is_empty() || hours.len() > 3 || minutes.len() != 2 || seconds.len() != 2 {
        return invalid();
    }

    let parse = |part: &str| -> Option<u64> {
        part.chars()
            .all(|c| c.is_ascii_digit())
            .then(|| part.parse().ok())
            .flatten()
    };
    let (Some(hours), Some(minutes), Some(seconds)) =
        (parse(hours), parse(minutes), parse(seconds))
    else {
        return invalid();
    };

    if minutes >= 60 || seconds >= 60 {
        return invalid();
    }

    Ok(Duration::from_secs(hours * 3600 + minutes * 60 + seconds))
}

/// Formats a duration as a PBS time string, e.g. 01:05:02
pub fn format_hms_duration(duration: &Duration) -> String {
    let mut seconds = duration.as_secs();
    let hours = seconds / 3600;
    seconds %= 3600;
    let minutes = seconds / 60;
    seconds %= 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::{format_hms_duration, parse_hms_time};
    use std::time::Duration;

    #[test]
    fn parse_valid_walltime() {
        assert_eq!(
            parse_hms_time("01:30:00").unwrap(),
            Duration::from_secs(5400)
        );
        assert_eq!(
            parse_hms_time("120:00:30").unwrap(),
            Duration::from_secs(120 * 3600 + 30)
        );
    }

    #[test]
    fn reject_out_of_range_fields() {
        assert!(parse_hms_time("25:99:99").is_err());
        assert!(parse_hms_time("00:60:00").is_err());
        assert!(parse_hms_time("00:00:60").is_err());
    }

    #[test]
    fn reject_malformed_walltime() {
        assert!(parse_hms_time("1:2:3").is_err());
        assert!(parse_hms_time("01:30").is_err());
        assert!(parse_hms_time("1h30m").is_err());
        assert!(parse_hms_time("").is_err());
        assert!(parse_hms_time("-1:00:00").is_err());
    }

    #[test]
    fn format_roundtrip() {
        let duration = Duration::from_secs(3902);
        assert_eq!(format_hms_duration(&duration), "01:05:02");
        assert_eq!(parse_hms_time("01:05:02").unwrap(), duration);
    }
}
