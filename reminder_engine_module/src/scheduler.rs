use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{error, info, warn};

use reminder_core_module::{generate_reminder, is_quiet_hours, reminder_probability};

use crate::dispatch::{DispatchReport, EmailStatus, PushStatus, ReminderDispatcher};
use crate::document_store::{DocumentStore, DocumentStoreError};

/// Counters for one evaluation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassStats {
    pub users_seen: usize,
    pub users_skipped_no_profile: usize,
    pub users_suppressed_quiet_hours: usize,
    pub users_failed: usize,
    pub tasks_evaluated: usize,
    pub reminders_fired: usize,
    pub push_delivered: usize,
    pub push_stale_tokens: usize,
    pub push_transient_failures: usize,
    pub emails_enqueued: usize,
    pub email_failures: usize,
}

impl PassStats {
    fn record(&mut self, report: &DispatchReport) {
        match report.push {
            PushStatus::Delivered => self.push_delivered += 1,
            PushStatus::StaleToken => self.push_stale_tokens += 1,
            PushStatus::TransientFailure => self.push_transient_failures += 1,
            PushStatus::NotRequested | PushStatus::SkippedNoToken => {}
        }
        match report.email {
            EmailStatus::Enqueued => self.emails_enqueued += 1,
            EmailStatus::Rejected | EmailStatus::Failed => self.email_failures += 1,
            EmailStatus::NotRequested | EmailStatus::SkippedNoAddress => {}
        }
    }
}

/// The periodic evaluation engine. Memoryless: each pass reads the
/// current users and tasks, draws once per task, and dispatches; nothing
/// carries over between passes.
pub struct ReminderScheduler {
    store: Arc<dyn DocumentStore>,
    dispatcher: ReminderDispatcher,
}

impl ReminderScheduler {
    pub fn new(store: Arc<dyn DocumentStore>, dispatcher: ReminderDispatcher) -> Self {
        Self { store, dispatcher }
    }

    /// Entry point for the external cadence trigger: run one pass, log
    /// the outcome, surface nothing.
    pub fn run_pass(&self) {
        match self.run_pass_at(Utc::now()) {
            Ok(stats) => info!(
                "reminder pass complete users={} no_profile={} quiet={} failed={} tasks={} fired={} push_ok={} push_stale={} push_transient={} email_ok={} email_failed={}",
                stats.users_seen,
                stats.users_skipped_no_profile,
                stats.users_suppressed_quiet_hours,
                stats.users_failed,
                stats.tasks_evaluated,
                stats.reminders_fired,
                stats.push_delivered,
                stats.push_stale_tokens,
                stats.push_transient_failures,
                stats.emails_enqueued,
                stats.email_failures,
            ),
            Err(err) => error!("reminder pass failed: {}", err),
        }
    }

    /// Evaluate every user's incomplete tasks as of `now`. Fails only
    /// when user enumeration itself fails; every per-user and per-task
    /// problem is logged and skipped.
    pub fn run_pass_at(&self, now: DateTime<Utc>) -> Result<PassStats, DocumentStoreError> {
        let mut stats = PassStats::default();

        for user_id in self.store.list_user_ids()? {
            stats.users_seen += 1;

            let profile = match self.store.profile(&user_id) {
                Ok(Some(profile)) => profile,
                Ok(None) => {
                    stats.users_skipped_no_profile += 1;
                    continue;
                }
                Err(err) => {
                    warn!("failed to load profile for user {}: {}", user_id, err);
                    stats.users_failed += 1;
                    continue;
                }
            };

            // Quiet hours are checked in the recipient's local time,
            // recomputed every pass.
            let local_hour = profile.local_hour(now);
            if is_quiet_hours(
                local_hour,
                profile.quiet_hours_start,
                profile.quiet_hours_end,
            ) {
                stats.users_suppressed_quiet_hours += 1;
                continue;
            }

            let tasks = match self.store.incomplete_tasks(&user_id) {
                Ok(tasks) => tasks,
                Err(err) => {
                    warn!("failed to load tasks for user {}: {}", user_id, err);
                    stats.users_failed += 1;
                    continue;
                }
            };

            for task in tasks {
                stats.tasks_evaluated += 1;

                let hours_remaining = task.hours_remaining(now);
                let probability = reminder_probability(hours_remaining, task.intensity);
                let draw: f64 = rand::thread_rng().gen();
                if draw >= probability {
                    continue;
                }

                stats.reminders_fired += 1;
                let message = generate_reminder(&task.title, hours_remaining);
                let report = self.dispatcher.dispatch(&task, &profile, &message);
                if report.push == PushStatus::StaleToken {
                    // Distinct marker line; an external cleanup job drops
                    // the dead token from the profile.
                    warn!(
                        "stale push token user={} task={}; profile cleanup required",
                        user_id, task.id
                    );
                }
                stats.record(&report);
            }
        }

        Ok(stats)
    }

    /// Drive passes on a fixed interval until `stop` is set. Passes never
    /// overlap: the sleep starts only after a pass completes.
    pub fn run_loop(&self, interval: Duration, stop: &AtomicBool) {
        while !stop.load(Ordering::Relaxed) {
            self.run_pass();
            let mut slept = Duration::ZERO;
            while slept < interval && !stop.load(Ordering::Relaxed) {
                let step = std::cmp::min(Duration::from_secs(1), interval - slept);
                std::thread::sleep(step);
                slept += step;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail_queue::{EnqueueResult, MailIntent, MailIntentQueue, MailQueueError};
    use crate::push_gateway::{PushGateway, PushOutcome};
    use chrono::TimeZone;
    use reminder_core_module::{Profile, ReminderChannel, Task};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    struct InMemoryDocumentStore {
        users: Vec<String>,
        profiles: HashMap<String, Profile>,
        tasks: HashMap<String, Vec<Task>>,
    }

    impl InMemoryDocumentStore {
        fn single_user(profile: Option<Profile>, tasks: Vec<Task>) -> Self {
            let user_id = "user-1".to_string();
            let mut profiles = HashMap::new();
            if let Some(profile) = profile {
                profiles.insert(user_id.clone(), profile);
            }
            let mut task_map = HashMap::new();
            task_map.insert(user_id.clone(), tasks);
            Self {
                users: vec![user_id],
                profiles,
                tasks: task_map,
            }
        }
    }

    impl DocumentStore for InMemoryDocumentStore {
        fn list_user_ids(&self) -> Result<Vec<String>, DocumentStoreError> {
            Ok(self.users.clone())
        }

        fn profile(&self, user_id: &str) -> Result<Option<Profile>, DocumentStoreError> {
            Ok(self.profiles.get(user_id).cloned())
        }

        fn incomplete_tasks(&self, user_id: &str) -> Result<Vec<Task>, DocumentStoreError> {
            Ok(self
                .tasks
                .get(user_id)
                .map(|tasks| {
                    tasks
                        .iter()
                        .filter(|task| !task.is_completed)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    struct CountingPushGateway {
        outcome: PushOutcome,
        calls: AtomicUsize,
    }

    impl CountingPushGateway {
        fn delivered() -> Self {
            Self {
                outcome: PushOutcome::Delivered,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                outcome: PushOutcome::TransientFailure,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl PushGateway for CountingPushGateway {
        fn send(&self, _token: &str, _title: &str, _body: &str) -> PushOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
        }
    }

    struct CountingMailQueue {
        fail: bool,
        enqueued: AtomicUsize,
    }

    impl CountingMailQueue {
        fn working() -> Self {
            Self {
                fail: false,
                enqueued: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                enqueued: AtomicUsize::new(0),
            }
        }
    }

    impl MailIntentQueue for CountingMailQueue {
        fn enqueue(&self, _intent: &MailIntent) -> Result<EnqueueResult, MailQueueError> {
            if self.fail {
                return Err(MailQueueError::MissingDbUrl);
            }
            self.enqueued.fetch_add(1, Ordering::SeqCst);
            Ok(EnqueueResult { accepted: true })
        }

        fn claim_next(&self) -> Result<Option<MailIntent>, MailQueueError> {
            Ok(None)
        }

        fn mark_done(&self, _id: &uuid::Uuid) -> Result<(), MailQueueError> {
            Ok(())
        }

        fn mark_failed(&self, _id: &uuid::Uuid, _error: &str) -> Result<(), MailQueueError> {
            Ok(())
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn task_due_in_minutes(minutes: i64, intensity: u8, channels: Vec<ReminderChannel>) -> Task {
        Task {
            id: format!("task-{}-{}", minutes, intensity),
            title: "Ship the report".to_string(),
            details: String::new(),
            deadline: noon() + chrono::Duration::minutes(minutes),
            is_completed: false,
            intensity,
            reminder_types: channels,
            user_id: "user-1".to_string(),
            created_at: noon() - chrono::Duration::days(1),
        }
    }

    fn profile_with_token() -> Profile {
        let mut profile = Profile::default_profile("user-1", "user@example.com");
        profile.fcm_token = Some("token-1".to_string());
        profile
    }

    fn scheduler(
        store: InMemoryDocumentStore,
        gateway: Arc<CountingPushGateway>,
        queue: Arc<CountingMailQueue>,
    ) -> ReminderScheduler {
        ReminderScheduler::new(Arc::new(store), ReminderDispatcher::new(gateway, queue))
    }

    #[test]
    fn quiet_hours_skip_the_user_entirely() {
        // Default quiet window 22 -> 8; local hour 2 sits inside it.
        let two_am = Utc.with_ymd_and_hms(2026, 3, 2, 2, 0, 0).unwrap();
        let store = InMemoryDocumentStore::single_user(
            Some(profile_with_token()),
            vec![task_due_in_minutes(30, 10, vec![ReminderChannel::Push])],
        );
        let gateway = Arc::new(CountingPushGateway::delivered());
        let queue = Arc::new(CountingMailQueue::working());
        let scheduler = scheduler(store, gateway.clone(), queue.clone());

        for _ in 0..100 {
            let stats = scheduler.run_pass_at(two_am).expect("pass");
            assert_eq!(stats.users_suppressed_quiet_hours, 1);
            assert_eq!(stats.tasks_evaluated, 0);
            assert_eq!(stats.reminders_fired, 0);
        }
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
        assert_eq!(queue.enqueued.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_profile_skips_the_user_silently() {
        let store = InMemoryDocumentStore::single_user(
            None,
            vec![task_due_in_minutes(30, 10, vec![ReminderChannel::Push])],
        );
        let gateway = Arc::new(CountingPushGateway::delivered());
        let queue = Arc::new(CountingMailQueue::working());
        let scheduler = scheduler(store, gateway.clone(), queue);

        let stats = scheduler.run_pass_at(noon()).expect("pass");
        assert_eq!(stats.users_skipped_no_profile, 1);
        assert_eq!(stats.tasks_evaluated, 0);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn completed_tasks_are_never_evaluated() {
        let mut done = task_due_in_minutes(30, 10, vec![ReminderChannel::Push]);
        done.is_completed = true;
        let store = InMemoryDocumentStore::single_user(Some(profile_with_token()), vec![done]);
        let gateway = Arc::new(CountingPushGateway::delivered());
        let queue = Arc::new(CountingMailQueue::working());
        let scheduler = scheduler(store, gateway.clone(), queue);

        for _ in 0..50 {
            let stats = scheduler.run_pass_at(noon()).expect("pass");
            assert_eq!(stats.tasks_evaluated, 0);
        }
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn firing_rate_converges_to_the_model_probability() {
        // 30 minutes out at intensity 10 the model yields 0.5.
        let store = InMemoryDocumentStore::single_user(
            Some(profile_with_token()),
            vec![task_due_in_minutes(30, 10, vec![ReminderChannel::Push])],
        );
        let gateway = Arc::new(CountingPushGateway::delivered());
        let queue = Arc::new(CountingMailQueue::working());
        let scheduler = scheduler(store, gateway.clone(), queue);

        let passes = 4000;
        let mut fired = 0usize;
        for _ in 0..passes {
            fired += scheduler.run_pass_at(noon()).expect("pass").reminders_fired;
        }

        let rate = fired as f64 / passes as f64;
        assert!(
            (0.45..=0.55).contains(&rate),
            "firing rate {} strayed from 0.5",
            rate
        );
        assert_eq!(gateway.calls.load(Ordering::SeqCst), fired);
    }

    #[test]
    fn dispatch_failures_never_abort_the_pass() {
        let tasks = vec![
            task_due_in_minutes(10, 10, vec![ReminderChannel::Push, ReminderChannel::Email]),
            task_due_in_minutes(20, 10, vec![ReminderChannel::Push, ReminderChannel::Email]),
            task_due_in_minutes(-30, 10, vec![ReminderChannel::Push, ReminderChannel::Email]),
        ];
        let store = InMemoryDocumentStore::single_user(Some(profile_with_token()), tasks);
        let gateway = Arc::new(CountingPushGateway::failing());
        let queue = Arc::new(CountingMailQueue::failing());
        let scheduler = scheduler(store, gateway.clone(), queue);

        let mut total_fired = 0usize;
        for _ in 0..100 {
            let stats = scheduler.run_pass_at(noon()).expect("pass");
            assert_eq!(stats.tasks_evaluated, 3);
            assert_eq!(stats.push_delivered, 0);
            assert_eq!(stats.emails_enqueued, 0);
            total_fired += stats.reminders_fired;
        }
        // With p in {0.5, 0.6} per task the odds of zero firings over 100
        // passes are negligible.
        assert!(total_fired > 0);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), total_fired);
    }

    #[test]
    fn stale_tokens_are_counted_for_cleanup() {
        let store = InMemoryDocumentStore::single_user(
            Some(profile_with_token()),
            vec![task_due_in_minutes(-10, 10, vec![ReminderChannel::Push])],
        );
        let gateway = Arc::new(CountingPushGateway {
            outcome: PushOutcome::StaleToken,
            calls: AtomicUsize::new(0),
        });
        let queue = Arc::new(CountingMailQueue::working());
        let scheduler = scheduler(store, gateway, queue);

        let mut stale = 0usize;
        for _ in 0..100 {
            stale += scheduler
                .run_pass_at(noon())
                .expect("pass")
                .push_stale_tokens;
        }
        assert!(stale > 0);
    }
}
