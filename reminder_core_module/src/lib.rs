//! Domain logic shared by the server-side reminder engine and the
//! device-local fallback scheduler.

pub mod probability;
pub mod quiet_hours;
pub mod templates;
pub mod types;
pub mod urgency;

pub use probability::{reminder_probability, MAX_FIRE_PROBABILITY};
pub use quiet_hours::is_quiet_hours;
pub use templates::{format_time_remaining, generate_reminder, render_template};
pub use types::{Profile, ReminderChannel, ReminderMessage, Task};
pub use urgency::{classify, UrgencyTier};
