/// Whether `current_hour` (0-23) falls inside the user's quiet window.
///
/// A window with `start <= end` covers [start, end) on the same day. A
/// window with `start > end` wraps past midnight, e.g. 22 -> 8 covers
/// 22:00 through 07:59. Equal start and end yield an empty window.
pub fn is_quiet_hours(current_hour: u32, start: u32, end: u32) -> bool {
    if start <= end {
        current_hour >= start && current_hour < end
    } else {
        current_hour >= start || current_hour < end
    }
}
