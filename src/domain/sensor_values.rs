use serde::Serialize;

pub const BATTERY_RANGE: (i64, i64) = (0, 100);
pub const SPEED_RANGE: (i64, i64) = (0, 1000);

/// Per-entity poll state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    /// No sample has ever been obtained.
    Uninitialized,
    /// The last poll succeeded.
    Fresh,
    /// The last poll failed; a previous sample exists.
    Stale,
}

impl PollState {
    pub fn after_failure(has_sample: bool) -> Self {
        if has_sample { Self::Stale } else { Self::Uninitialized }
    }
}

pub fn clamp_battery(raw: f64) -> i64 {
    clamp_truncated(raw, BATTERY_RANGE)
}

pub fn clamp_speed(raw: f64) -> i64 {
    clamp_truncated(raw, SPEED_RANGE)
}

fn clamp_truncated(raw: f64, (min, max): (i64, i64)) -> i64 {
    if raw.is_nan() {
        return min;
    }
    // `as` saturates for out-of-range floats
    (raw.trunc() as i64).clamp(min, max)
}

pub fn battery_icon(level: Option<i64>) -> &'static str {
    let Some(level) = level else {
        return "mdi:battery-alert";
    };

    match level.clamp(BATTERY_RANGE.0, BATTERY_RANGE.1) {
        100 => "mdi:battery",
        90..=99 => "mdi:battery-90",
        80..=89 => "mdi:battery-80",
        70..=79 => "mdi:battery-70",
        60..=69 => "mdi:battery-60",
        50..=59 => "mdi:battery-50",
        40..=49 => "mdi:battery-40",
        30..=39 => "mdi:battery-30",
        20..=29 => "mdi:battery-20",
        10..=19 => "mdi:battery-10",
        _ => "mdi:battery-alert",
    }
}
