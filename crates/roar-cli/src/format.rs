//! Output rendering: every command prints either a human-readable report
//! or, behind `--json`, the same data as a single `serde_json::Value`.
//!
//! Grounded on `original_source/roar/presenters/console.py` and
//! `formatting.py` for the human-readable shapes (fixed-width tables,
//! `@N`/`@BN` labels, size/duration formatting).

use serde_json::Value;

/// Print `value` as pretty JSON, or fall back to `fallback` when `json`
/// is false. The one call every command makes at its output boundary.
pub fn emit(json: bool, value: impl Fn() -> Value, fallback: impl FnOnce(&Value)) {
    let v = value();
    if json {
        println!("{}", serde_json::to_string_pretty(&v).unwrap_or_else(|_| v.to_string()));
    } else {
        fallback(&v);
    }
}

/// `@N` or `@BN`, matching `roar-dag`'s reference syntax.
pub fn step_label(step_number: u32, is_build: bool) -> String {
    if is_build {
        format!("@B{step_number}")
    } else {
        format!("@{step_number}")
    }
}

/// Human-readable byte size (`"1.2 MB"`), matching `formatting.py`'s
/// `format_size`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

/// `"3.2s"` / `"1m 05s"`, matching `formatting.py`'s `format_duration`.
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else {
        let minutes = (seconds / 60.0) as u64;
        let rest = seconds - (minutes as f64 * 60.0);
        format!("{minutes}m {rest:02.0}s")
    }
}

/// `"2026-08-01 12:34:56"`, matching `formatting.py`'s `format_timestamp`.
pub fn format_timestamp(unix_seconds: f64) -> String {
    match chrono::DateTime::from_timestamp(unix_seconds as i64, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}

/// Truncate a command string to `width` chars for table display.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(width.saturating_sub(1)).collect();
        t.push('…');
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_label_formats_run_and_build() {
        assert_eq!(step_label(3, false), "@3");
        assert_eq!(step_label(2, true), "@B2");
    }

    #[test]
    fn format_size_scales_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
    }

    #[test]
    fn format_duration_switches_to_minutes() {
        assert_eq!(format_duration(30.0), "30.0s");
        assert_eq!(format_duration(65.0), "1m 05s");
    }

    #[test]
    fn truncate_adds_ellipsis_only_when_needed() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long command line", 10), "a very lo…");
    }
}
