use chrono::Datelike;

/// Column headers for the twelve month cells, in grid order.
pub const MONTH_LABELS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Header label for a 1-based month. Out-of-range months render as "???".
pub fn month_label(month: u32) -> &'static str {
    match month {
        1..=12 => MONTH_LABELS[(month - 1) as usize],
        _ => "???",
    }
}

pub fn current_year() -> i32 {
    chrono::Local::now().year()
}

/// Years the picker offers: `start_year` through one (configurable) year
/// past the current one.
pub fn available_years(start_year: i32, years_ahead: i32) -> Vec<i32> {
    year_window(current_year(), start_year, years_ahead)
}

pub fn year_window(current: i32, start_year: i32, years_ahead: i32) -> Vec<i32> {
    let end = current + years_ahead;
    (start_year..=end).collect()
}

/// Year the grid opens on: the current year when the window contains it,
/// otherwise the latest available year.
pub fn default_year(years: &[i32], current: i32) -> i32 {
    if years.contains(&current) {
        return current;
    }
    years.iter().copied().max().unwrap_or(current)
}

/// Format a value with space as thousands separator (e.g. 12300 -> "12 300").
///
/// Grouping applies to the integer digits only; a fractional part passes
/// through untouched.
pub fn format_value(value: f64) -> String {
    let s = value.to_string();
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s.as_str(), None),
    };

    let negative = int_part.starts_with('-');
    let digits = if negative { &int_part[1..] } else { int_part };

    let mut out = String::with_capacity(s.len() + digits.len() / 3);
    if negative {
        out.push('-');
    }
    let len = digits.len();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(ch);
    }
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Render one grid cell: the formatted number, or an em dash for "no
/// data". Zero is a real value and renders as "0".
pub fn format_cell(value: Option<f64>) -> String {
    match value {
        Some(v) => format_value(v),
        None => "—".to_string(),
    }
}
