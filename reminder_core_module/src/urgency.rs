/// Discrete urgency of a task given its remaining time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrgencyTier {
    Overdue,
    Critical,
    Soon,
    Normal,
}

/// Map signed hours-to-deadline to an urgency tier. Total; negative
/// input means the deadline has passed.
pub fn classify(hours_remaining: f64) -> UrgencyTier {
    if hours_remaining <= 0.0 {
        UrgencyTier::Overdue
    } else if hours_remaining < 24.0 {
        UrgencyTier::Critical
    } else if hours_remaining < 72.0 {
        UrgencyTier::Soon
    } else {
        UrgencyTier::Normal
    }
}
