//! Formatting of numbers for display.
use crate::units::{Money, Seconds};
use itertools::Itertools;

/// Abbreviate `value` with a K, M or B suffix.
///
/// Billions and millions get two decimal places, thousands one and smaller values none.
fn abbreviate(value: f64) -> String {
    if value >= 1e9 {
        format!("{:.2}B", value / 1e9)
    } else if value >= 1e6 {
        format!("{:.2}M", value / 1e6)
    } else if value >= 1e3 {
        format!("{:.1}K", value / 1e3)
    } else {
        format!("{value:.0}")
    }
}

/// Format an amount of money, e.g. `$1.23M`
pub fn format_currency(amount: Money) -> String {
    format!("${}", abbreviate(amount.value()))
}

/// Format a large number, e.g. `17.5K`
pub fn format_large_number(value: f64) -> String {
    abbreviate(value)
}

/// Format a duration as `Xm Ys`, or as `X.Ys` if shorter than a minute
pub fn format_duration(duration: Seconds) -> String {
    let seconds = duration.value();
    if seconds < 60.0 {
        return format!("{seconds:.1}s");
    }

    let minutes = (seconds / 60.0).floor();
    let secs = (seconds % 60.0).floor();
    format!("{minutes:.0}m {secs:.0}s")
}

/// Format a number with thousands separators and at most two decimal places
pub fn format_number(value: f64) -> String {
    let rounded = format!("{:.2}", value.abs());
    let (integer, fraction) = rounded.split_once('.').unwrap_or((&rounded, ""));
    let fraction = fraction.trim_end_matches('0');

    let digits = integer.chars().collect_vec();
    let grouped = digits
        .rchunks(3)
        .rev()
        .map(|chunk| chunk.iter().collect::<String>())
        .join(",");

    let sign = if value < 0.0 && rounded.chars().any(|c| c.is_ascii_digit() && c != '0') {
        "-"
    } else {
        ""
    };
    if fraction.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{fraction}")
    }
}
