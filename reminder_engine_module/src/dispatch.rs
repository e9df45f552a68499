use std::sync::Arc;
use std::thread;

use tracing::{debug, error, warn};

use reminder_core_module::{Profile, ReminderChannel, ReminderMessage, Task};

use crate::mail_queue::{MailIntent, MailIntentQueue};
use crate::push_gateway::{PushGateway, PushOutcome};

/// Per-task outcome of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStatus {
    /// The task does not have push reminders enabled.
    NotRequested,
    /// Push was requested but the profile holds no token. Not an error.
    SkippedNoToken,
    Delivered,
    StaleToken,
    TransientFailure,
}

/// Per-task outcome of the email channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailStatus {
    NotRequested,
    SkippedNoAddress,
    Enqueued,
    /// The queue refused the record.
    Rejected,
    /// The enqueue itself failed; logged, not retried this window.
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchReport {
    pub push: PushStatus,
    pub email: EmailStatus,
}

impl DispatchReport {
    /// Number of delivery attempts actually issued (skipped channels do
    /// not count).
    pub fn attempts(&self) -> usize {
        let push = !matches!(
            self.push,
            PushStatus::NotRequested | PushStatus::SkippedNoToken
        );
        let email = !matches!(
            self.email,
            EmailStatus::NotRequested | EmailStatus::SkippedNoAddress
        );
        usize::from(push) + usize::from(email)
    }
}

/// Fans one rendered reminder out to the task's enabled channels.
pub struct ReminderDispatcher {
    push_gateway: Arc<dyn PushGateway>,
    mail_queue: Arc<dyn MailIntentQueue>,
}

impl ReminderDispatcher {
    pub fn new(push_gateway: Arc<dyn PushGateway>, mail_queue: Arc<dyn MailIntentQueue>) -> Self {
        Self {
            push_gateway,
            mail_queue,
        }
    }

    /// Dispatch to every enabled channel. Channels run concurrently and
    /// are joined before returning; a failure on one never suppresses
    /// the other.
    pub fn dispatch(
        &self,
        task: &Task,
        profile: &Profile,
        message: &ReminderMessage,
    ) -> DispatchReport {
        let wants_push = task.wants_channel(ReminderChannel::Push);
        let wants_email = task.wants_channel(ReminderChannel::Email);

        thread::scope(|scope| {
            let push_worker = if wants_push {
                match profile.fcm_token.as_deref() {
                    Some(token) => Some(scope.spawn(move || {
                        match self.push_gateway.send(token, &message.title, &message.body) {
                            PushOutcome::Delivered => PushStatus::Delivered,
                            PushOutcome::StaleToken => PushStatus::StaleToken,
                            PushOutcome::TransientFailure => PushStatus::TransientFailure,
                        }
                    })),
                    None => {
                        debug!("no push token for user {}; skipping push", profile.user_id);
                        None
                    }
                }
            } else {
                None
            };

            let email = if wants_email {
                self.enqueue_email(profile, message)
            } else {
                EmailStatus::NotRequested
            };

            let push = match push_worker {
                Some(worker) => worker.join().unwrap_or_else(|_| {
                    error!("push dispatch worker panicked for task {}", task.id);
                    PushStatus::TransientFailure
                }),
                None if wants_push => PushStatus::SkippedNoToken,
                None => PushStatus::NotRequested,
            };

            DispatchReport { push, email }
        })
    }

    fn enqueue_email(&self, profile: &Profile, message: &ReminderMessage) -> EmailStatus {
        let recipient = profile.email.trim();
        if recipient.is_empty() {
            debug!("no contact email for user {}; skipping email", profile.user_id);
            return EmailStatus::SkippedNoAddress;
        }

        let intent = MailIntent::new(
            recipient,
            format!("T.O.D.O: {}", message.title),
            render_reminder_html(message),
        );
        match self.mail_queue.enqueue(&intent) {
            Ok(result) if result.accepted => EmailStatus::Enqueued,
            Ok(_) => {
                warn!("mail queue rejected intent for {}", recipient);
                EmailStatus::Rejected
            }
            Err(err) => {
                warn!("failed to enqueue mail intent for {}: {}", recipient, err);
                EmailStatus::Failed
            }
        }
    }
}

/// The branded HTML shell the email channel wraps every reminder in.
pub fn render_reminder_html(message: &ReminderMessage) -> String {
    format!(
        r#"<div style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 480px; margin: 0 auto; padding: 24px;">
  <h2 style="color: #f97316; margin-bottom: 4px;">T.O.D.O</h2>
  <p style="color: #6b7280; font-size: 12px; margin-top: 0;">Task-Oriented Delay Obliterator</p>
  <hr style="border: none; border-top: 1px solid #e5e7eb; margin: 16px 0;">
  <h3 style="margin-bottom: 8px;">{title}</h3>
  <p style="color: #374151; line-height: 1.6;">{body}</p>
  <hr style="border: none; border-top: 1px solid #e5e7eb; margin: 16px 0;">
  <p style="color: #9ca3af; font-size: 12px;">Open the T.O.D.O app to manage your tasks.</p>
</div>"#,
        title = message.title,
        body = message.body
    )
}
