//! Urgency-tiered reminder wording.
//!
//! Each tier has a fixed pool of title/body pairs. Bodies may reference
//! the task title and a relative-time phrase through the `{task}`,
//! `{timeLeft}` and `{timeAgo}` placeholders; rendering substitutes
//! every occurrence and never fails.

use rand::Rng;

use crate::types::ReminderMessage;
use crate::urgency::{classify, UrgencyTier};

struct Template {
    title: &'static str,
    body: &'static str,
}

const OVERDUE_TEMPLATES: &[Template] = &[
    Template {
        title: "Overdue Alert",
        body: "'{task}' is OVERDUE! Time to get it done right now.",
    },
    Template {
        title: "Past Deadline",
        body: "'{task}' was due {timeAgo}. Don't let it slip any further!",
    },
    Template {
        title: "Action Required",
        body: "OVERDUE: '{task}' needed your attention already. Get on it!",
    },
    Template {
        title: "No More Delays",
        body: "'{task}' is past due. The best time to start is NOW.",
    },
];

const CRITICAL_TEMPLATES: &[Template] = &[
    Template {
        title: "Final Call",
        body: "'{task}' is due in less than a day! Lock in now.",
    },
    Template {
        title: "Hours Left",
        body: "'{task}' deadline is TODAY. You've got this — finish strong!",
    },
    Template {
        title: "Deadline Imminent",
        body: "'{task}' is due very soon. Drop everything and focus!",
    },
    Template {
        title: "Last Chance",
        body: "'{task}' — this is your last chance to get it done on time!",
    },
];

const SOON_TEMPLATES: &[Template] = &[
    Template {
        title: "Coming Up",
        body: "'{task}' is due {timeLeft}. Time to make progress!",
    },
    Template {
        title: "Don't Wait",
        body: "'{task}' needs your attention. Due {timeLeft}.",
    },
    Template {
        title: "Getting Close",
        body: "'{task}' is approaching fast. Have you started yet?",
    },
    Template {
        title: "Heads Up",
        body: "'{task}' is due {timeLeft}. Better get cracking!",
    },
];

const NORMAL_TEMPLATES: &[Template] = &[
    Template {
        title: "Friendly Nudge",
        body: "Have you thought about '{task}' today?",
    },
    Template {
        title: "T.O.D.O Reminder",
        body: "'{task}' is on your list — due {timeLeft}.",
    },
    Template {
        title: "Stay On Track",
        body: "You've got this! '{task}' is due {timeLeft}.",
    },
    Template {
        title: "Quick Check-In",
        body: "Just a nudge about '{task}'. Due {timeLeft}.",
    },
];

fn pool_for(tier: UrgencyTier) -> &'static [Template] {
    match tier {
        UrgencyTier::Overdue => OVERDUE_TEMPLATES,
        UrgencyTier::Critical => CRITICAL_TEMPLATES,
        UrgencyTier::Soon => SOON_TEMPLATES,
        UrgencyTier::Normal => NORMAL_TEMPLATES,
    }
}

/// Human-readable relative-time phrase for the given signed remaining
/// hours, e.g. "in 3 hours", "2 days ago", "just now".
pub fn format_time_remaining(hours_remaining: f64) -> String {
    if hours_remaining <= 0.0 {
        let hours_overdue = hours_remaining.abs();
        if hours_overdue < 1.0 {
            return "just now".to_string();
        }
        if hours_overdue < 24.0 {
            return format!("{} hours ago", hours_overdue.round() as i64);
        }
        return format!("{} days ago", (hours_overdue / 24.0).round() as i64);
    }
    if hours_remaining < 1.0 {
        format!("in {} minutes", (hours_remaining * 60.0).round() as i64)
    } else if hours_remaining < 24.0 {
        format!("in {} hours", hours_remaining.round() as i64)
    } else {
        format!("in {} days", (hours_remaining / 24.0).round() as i64)
    }
}

/// Render the pool entry at `index` for the given tier, substituting the
/// task title and time phrase into every placeholder. An out-of-range
/// index falls back to the first entry.
pub fn render_template(
    tier: UrgencyTier,
    index: usize,
    task_title: &str,
    hours_remaining: f64,
) -> ReminderMessage {
    let pool = pool_for(tier);
    let template = pool.get(index).unwrap_or(&pool[0]);
    let time_phrase = format_time_remaining(hours_remaining);

    ReminderMessage {
        title: template.title.to_string(),
        body: template
            .body
            .replace("{task}", task_title)
            .replace("{timeLeft}", &time_phrase)
            .replace("{timeAgo}", &time_phrase),
    }
}

/// Generate a reminder for a task: classify its urgency and pick a
/// template uniformly at random from that tier's pool.
pub fn generate_reminder(task_title: &str, hours_remaining: f64) -> ReminderMessage {
    let tier = classify(hours_remaining);
    let index = rand::thread_rng().gen_range(0..pool_for(tier).len());
    render_template(tier, index, task_title, hours_remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIERS: &[(UrgencyTier, f64)] = &[
        (UrgencyTier::Overdue, -30.0),
        (UrgencyTier::Critical, 5.0),
        (UrgencyTier::Soon, 48.0),
        (UrgencyTier::Normal, 120.0),
    ];

    #[test]
    fn rendered_bodies_contain_no_placeholders() {
        for &(tier, hours) in TIERS {
            for index in 0..pool_for(tier).len() {
                let message = render_template(tier, index, "Ship the report", hours);
                assert!(
                    !message.body.contains('{') && !message.body.contains('}'),
                    "unsubstituted placeholder in tier {:?} index {}: {}",
                    tier,
                    index,
                    message.body
                );
                assert!(!message.title.is_empty());
            }
        }
    }

    #[test]
    fn generated_reminders_embed_the_title() {
        for &(_, hours) in TIERS {
            let message = generate_reminder("Water the cactus", hours);
            assert!(!message.body.contains('{'));
            assert!(
                message.body.contains("Water the cactus"),
                "body missing title: {}",
                message.body
            );
        }
    }

    #[test]
    fn out_of_range_index_falls_back_to_first_entry() {
        let fallback = render_template(UrgencyTier::Soon, 999, "Ship it", 48.0);
        let first = render_template(UrgencyTier::Soon, 0, "Ship it", 48.0);
        assert_eq!(fallback, first);
    }

    #[test]
    fn time_phrases_cover_every_range() {
        assert_eq!(format_time_remaining(0.0), "just now");
        assert_eq!(format_time_remaining(-0.5), "just now");
        assert_eq!(format_time_remaining(-5.0), "5 hours ago");
        assert_eq!(format_time_remaining(-50.0), "2 days ago");
        assert_eq!(format_time_remaining(0.5), "in 30 minutes");
        assert_eq!(format_time_remaining(3.2), "in 3 hours");
        assert_eq!(format_time_remaining(48.0), "in 2 days");
    }

    #[test]
    fn every_tier_has_a_non_empty_pool() {
        for &(tier, _) in TIERS {
            assert!(!pool_for(tier).is_empty());
        }
    }
}
