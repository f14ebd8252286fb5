//! Path Renderer (spec §4.1): turns a time-formatted pattern into a concrete
//! path under a captured local time.

use std::fmt::Write as _;

use chrono::{DateTime, Local};

use crate::error::{PipelogError, Result};

/// At least the platform's `PATH_MAX`. Linux reports 4096 including the NUL
/// terminator; we keep a comfortable margin since we render to a `String`.
pub const MAX_RENDERED_LEN: usize = 4096;

/// `true` iff the pattern contains a time-formatting escape, matching the
/// original's `strchr(out->filename, '%')` check used to decide whether a
/// sink is rotation-enabled at all.
pub fn is_rotation_enabled(pattern: &str) -> bool {
    pattern.contains('%')
}

/// Renders `pattern` under `now`, failing with [`PipelogError::Format`] if the
/// pattern contains an escape `chrono` cannot render or the result would not
/// fit in [`MAX_RENDERED_LEN`].
pub fn render(pattern: &str, now: DateTime<Local>) -> Result<String> {
    if !is_rotation_enabled(pattern) {
        return Ok(pattern.to_owned());
    }

    let mut buf = String::new();
    write!(buf, "{}", now.format(pattern)).map_err(|_| PipelogError::Format {
        pattern: pattern.to_owned(),
    })?;

    if buf.is_empty() || buf.len() > MAX_RENDERED_LEN {
        return Err(PipelogError::Format {
            pattern: pattern.to_owned(),
        });
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
    }

    #[test]
    fn renders_calendar_fields() {
        let now = at(2024, 6, 1, 0, 0);
        assert_eq!(render("out-%Y.log", now).unwrap(), "out-2024.log");
    }

    #[test]
    fn renders_clock_fields() {
        let now = at(2024, 6, 1, 3, 0);
        assert_eq!(render("log-%H.log", now).unwrap(), "log-03.log");
    }

    #[test]
    fn static_pattern_passes_through() {
        let now = at(2024, 6, 1, 3, 0);
        assert_eq!(render("static.log", now).unwrap(), "static.log");
    }

    #[test]
    fn rotation_enabled_detection() {
        assert!(is_rotation_enabled("a-%M.log"));
        assert!(!is_rotation_enabled("a.log"));
    }
}
