/// Hard ceiling on the per-window fire probability, so that no task is
/// guaranteed a reminder in every evaluation window.
pub const MAX_FIRE_PROBABILITY: f64 = 0.8;

/// Chance that a reminder fires for a task in the current evaluation
/// window.
///
/// The base rate is picked by remaining-time bucket (tightest first) and
/// scaled by the task's intensity. Each window draws independently, so
/// the chance of at least one reminder over a longer period accumulates
/// geometrically and repeats in adjacent windows are possible.
pub fn reminder_probability(hours_remaining: f64, intensity: u8) -> f64 {
    let normalized = f64::from(intensity.clamp(1, 10)) / 10.0;

    let base = if hours_remaining <= 0.0 {
        0.60
    } else if hours_remaining < 1.0 {
        0.50
    } else if hours_remaining < 6.0 {
        0.35
    } else if hours_remaining < 24.0 {
        0.20
    } else if hours_remaining < 72.0 {
        0.10
    } else if hours_remaining < 168.0 {
        0.04
    } else {
        0.015
    };

    (base * normalized).min(MAX_FIRE_PROBABILITY)
}
