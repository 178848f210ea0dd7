//! Dispatcher: the single loop that turns inbound chat events into calls
//! on the onboarding, entitlement and coaching services.

use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::StreamExt;

use crate::channels::{ChannelManager, IncomingMessage, OutgoingResponse, StatusUpdate};
use crate::coaching::Coach;
use crate::entitlement::Entitlements;
use crate::error::{CoachError, Error};
use crate::onboarding::prompts as onboarding_prompts;
use crate::onboarding::{
    ChoiceKind, OnboardingManager, OnboardingReply, OnboardingStep, StartKind, StepInput,
};
use crate::profile::model::parse_reminder_time;
use crate::profile::{TrainingSchedule, TrainingStatus};
use crate::store::Database;

use super::event::BotEvent;
use super::history::{KEEP_AFTER_CONTENT, KEEP_AFTER_STEP, MessageHistory};
use super::replies;

/// Shared services the dispatcher calls into.
pub struct BotDeps {
    pub db: Arc<dyn Database>,
    pub onboarding: Arc<OnboardingManager>,
    pub entitlements: Arc<Entitlements>,
    pub coach: Arc<Coach>,
}

/// Settings the dispatcher reads from `BotConfig`.
#[derive(Debug, Clone, Default)]
pub struct DispatchSettings {
    pub admin_ids: Vec<String>,
    pub payment_provider_token: Option<String>,
}

/// Which earlier bot messages to clear after a reply goes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cleanup {
    None,
    /// Keep only the messages of this reply.
    Step,
    /// Keep the newest few.
    Content,
}

struct Reply {
    messages: Vec<OutgoingResponse>,
    cleanup: Cleanup,
}

impl Reply {
    fn text(content: impl Into<String>) -> Self {
        Self::one(OutgoingResponse::text(content))
    }

    fn one(response: OutgoingResponse) -> Self {
        Self {
            messages: vec![response],
            cleanup: Cleanup::None,
        }
    }

    fn cleanup(mut self, cleanup: Cleanup) -> Self {
        self.cleanup = cleanup;
        self
    }
}

pub struct Dispatcher {
    deps: BotDeps,
    settings: DispatchSettings,
    channels: Arc<ChannelManager>,
    history: MessageHistory,
}

impl Dispatcher {
    pub fn new(deps: BotDeps, settings: DispatchSettings, channels: Arc<ChannelManager>) -> Self {
        Self {
            deps,
            settings,
            channels,
            history: MessageHistory::new(),
        }
    }

    /// Run until Ctrl+C or until every channel stream ends.
    pub async fn run(self) -> Result<(), Error> {
        let mut messages = self.channels.start_all().await?;
        tracing::info!("Fit coach ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = messages.next() => match msg {
                    Some(m) => m,
                    None => {
                        tracing::info!("All channel streams ended, shutting down...");
                        break;
                    }
                },
            };

            self.handle_message(&message).await;
        }

        self.channels.shutdown_all().await;
        Ok(())
    }

    /// Handle one inbound message end to end. Failures are logged and
    /// answered with a fixed reply; they never stop the loop.
    pub async fn handle_message(&self, msg: &IncomingMessage) {
        let Some(event) = BotEvent::classify(msg) else {
            tracing::debug!(user_id = %msg.user_id, "Nothing to act on");
            return;
        };

        let reply = match self.dispatch(msg, event).await {
            Ok(Some(reply)) => reply,
            Ok(None) => return,
            Err(e) => {
                match &e {
                    CoachError::Database(db) => {
                        tracing::error!(user_id = %msg.user_id, "Handler failed: {db}")
                    }
                    other => tracing::debug!(user_id = %msg.user_id, "Refused: {other}"),
                }
                Reply::text(replies::for_error(&e))
            }
        };

        self.deliver(msg, reply).await;
    }

    async fn deliver(&self, msg: &IncomingMessage, reply: Reply) {
        let mut sent = 0;
        for response in reply.messages {
            match self.channels.respond(msg, response).await {
                Ok(Some(handle)) => {
                    self.history.record(&msg.user_id, &msg.channel, handle).await;
                    sent += 1;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(user_id = %msg.user_id, "Failed to send reply: {e}"),
            }
        }

        let keep = match reply.cleanup {
            Cleanup::None => return,
            Cleanup::Step => KEEP_AFTER_STEP + sent,
            Cleanup::Content => KEEP_AFTER_CONTENT,
        };
        for old in self.history.trim(&msg.user_id, keep).await {
            if let Err(e) = self
                .channels
                .retract(&old.channel, &msg.user_id, &old.handle)
                .await
            {
                tracing::debug!(
                    user_id = %msg.user_id,
                    handle = %old.handle,
                    "Retraction failed: {e}"
                );
            }
        }
    }

    async fn dispatch(
        &self,
        msg: &IncomingMessage,
        event: BotEvent,
    ) -> Result<Option<Reply>, CoachError> {
        let user_id = msg.user_id.as_str();
        match event {
            BotEvent::Command { name, args } => self.command(msg, &name, &args).await.map(Some),
            BotEvent::FreeText(text) => {
                let reply = self
                    .deps
                    .onboarding
                    .handle(user_id, StepInput::Text(&text))
                    .await?;
                self.onboarding_reply(user_id, reply).await.map(Some)
            }
            BotEvent::Choice { kind, value } => self.choice(user_id, &kind, &value).await,
            BotEvent::Payment(notice) => {
                let sub = self
                    .deps
                    .entitlements
                    .payment_confirmed(user_id, &notice.payload)
                    .await?;
                tracing::info!(
                    user_id = %user_id,
                    payload = %notice.payload,
                    amount = notice.total_amount,
                    currency = %notice.currency,
                    "Payment applied"
                );
                Ok(Some(Reply::text(replies::payment_received(&sub))))
            }
        }
    }

    async fn onboarding_reply(
        &self,
        user_id: &str,
        reply: OnboardingReply,
    ) -> Result<Reply, CoachError> {
        Ok(match reply {
            OnboardingReply::Prompt(step) => {
                Reply::one(onboarding_prompts::step_prompt(step)).cleanup(Cleanup::Step)
            }
            OnboardingReply::Rejected { message, step } => {
                Reply::one(onboarding_prompts::rejection(&message, step)).cleanup(Cleanup::Step)
            }
            OnboardingReply::Completed(profile) => {
                Reply::text(onboarding_prompts::completed(&profile)).cleanup(Cleanup::Step)
            }
            OnboardingReply::NoDraft => {
                // Onboarded users chatting freely get pointed at the commands.
                match self.deps.entitlements.require_profile(user_id).await {
                    Ok(_) => Reply::text(replies::UNKNOWN_COMMAND),
                    Err(CoachError::NotOnboarded) => Reply::text(onboarding_prompts::NO_DRAFT),
                    Err(e) => return Err(e),
                }
            }
        })
    }

    async fn command(
        &self,
        msg: &IncomingMessage,
        name: &str,
        args: &str,
    ) -> Result<Reply, CoachError> {
        let user_id = msg.user_id.as_str();
        let db = &self.deps.db;

        match name {
            "start" => {
                let kind = self.deps.onboarding.start(user_id).await?;
                let first = OnboardingStep::default();
                Ok(Reply {
                    messages: vec![
                        OutgoingResponse::text(onboarding_prompts::greeting(
                            kind == StartKind::Returning,
                        )),
                        onboarding_prompts::step_prompt(first),
                    ],
                    cleanup: Cleanup::Step,
                })
            }
            "cancel" => Ok(Reply::text(if self.deps.onboarding.cancel(user_id).await? {
                onboarding_prompts::CANCELLED
            } else {
                onboarding_prompts::NOTHING_TO_CANCEL
            })),
            "training" => {
                self.thinking(msg).await;
                let generated = self.deps.coach.request_training(user_id).await?;
                Ok(Reply::one(replies::training(&generated.content)).cleanup(Cleanup::Content))
            }
            "food" => {
                self.thinking(msg).await;
                let plan = self.deps.coach.request_food(user_id).await?;
                Ok(Reply::one(replies::food(&plan)).cleanup(Cleanup::Content))
            }
            "weight" | "progress" => {
                if args.replace(',', ".").parse::<f64>().is_err() {
                    return Ok(Reply::text(replies::WEIGHT_USAGE));
                }
                let logged = self.deps.coach.log_weight(user_id, args).await?;
                Ok(Reply::text(replies::weight_saved(
                    logged.weight_kg,
                    &logged.new_achievements,
                )))
            }
            "weight_history" | "weight_graph" => {
                let weights = db.list_weights(user_id).await?;
                Ok(Reply::text(replies::weight_history(&weights)))
            }
            "profile" => self.profile(user_id).await,
            "subscribe" => self.subscribe(user_id).await,
            "schedule" => Ok(Reply::one(replies::schedule_menu())),
            "reminder" => {
                let Some(hhmm) = parse_reminder_time(args) else {
                    return Ok(Reply::text(replies::REMINDER_USAGE));
                };
                db.ensure_user(user_id).await?;
                db.set_reminder_time(user_id, &hhmm).await?;
                Ok(Reply::text(replies::reminder_saved(&hhmm)))
            }
            "report" => {
                let week_ago = Some(Utc::now() - Duration::days(7));
                let completed = db
                    .count_trainings(user_id, TrainingStatus::Completed, week_ago)
                    .await?;
                let missed = db
                    .count_trainings(user_id, TrainingStatus::Missed, week_ago)
                    .await?;
                Ok(Reply::text(replies::report(completed, missed)))
            }
            "achievements" => {
                let list = db.list_achievements(user_id).await?;
                Ok(Reply::text(replies::achievements(&list)))
            }
            "admin" => {
                if !self.settings.admin_ids.iter().any(|id| id == user_id) {
                    tracing::warn!(user_id = %user_id, "Admin command refused");
                    return Ok(Reply::text(replies::NOT_ADMIN));
                }
                let users = db.count_users().await?;
                let subscribers = db.count_active_subscriptions(Utc::now()).await?;
                Ok(Reply::text(replies::admin_stats(users, subscribers)))
            }
            "help" => Ok(Reply::text(replies::HELP)),
            _ => Ok(Reply::text(replies::UNKNOWN_COMMAND)),
        }
    }

    async fn choice(
        &self,
        user_id: &str,
        kind: &str,
        value: &str,
    ) -> Result<Option<Reply>, CoachError> {
        if let Some(choice) = ChoiceKind::parse(kind) {
            let reply = self
                .deps
                .onboarding
                .handle(user_id, StepInput::Choice { kind: choice, value })
                .await?;
            // A questionnaire button outside a questionnaire, onboarded or not.
            if matches!(reply, OnboardingReply::NoDraft) {
                return Ok(Some(Reply::text(onboarding_prompts::NO_DRAFT)));
            }
            return self.onboarding_reply(user_id, reply).await.map(Some);
        }

        let reply = match (kind, value) {
            ("trial", "claim") => {
                let sub = self.deps.entitlements.grant_trial(user_id).await?;
                Reply::text(replies::trial_granted(sub.expires_at))
            }
            ("training", "done") => {
                let done = self.deps.coach.confirm_completed(user_id).await?;
                Reply::text(replies::workout_completed(&done.new_achievements))
            }
            ("training", "postpone") => {
                let next = self.deps.coach.postpone(user_id).await?;
                Reply::text(replies::postponed(next))
            }
            ("schedule", days) => {
                let Some(schedule) = days.parse().ok().and_then(TrainingSchedule::preset) else {
                    tracing::debug!(user_id = %user_id, value = %days, "Unknown schedule option");
                    return Ok(None);
                };
                self.deps.db.ensure_user(user_id).await?;
                self.deps.db.set_schedule(user_id, &schedule).await?;
                Reply::text(replies::schedule_saved(&schedule))
            }
            _ => {
                tracing::debug!(
                    user_id = %user_id,
                    kind = %kind,
                    value = %value,
                    "Unhandled button"
                );
                return Ok(None);
            }
        };
        Ok(Some(reply))
    }

    async fn profile(&self, user_id: &str) -> Result<Reply, CoachError> {
        let db = &self.deps.db;
        let user = db.get_user(user_id).await?.ok_or(CoachError::NotOnboarded)?;
        let schedule = db.get_schedule(user_id).await?;
        let achievements = db.list_achievements(user_id).await?;
        let subscription = db.get_subscription(user_id).await?;
        let trial_days_left = self.deps.entitlements.remaining_trial_days(user_id).await?;
        let weights = db.list_weights(user_id).await?;

        let view = replies::ProfileView {
            user: &user,
            schedule: schedule.as_ref(),
            achievements: &achievements,
            subscription: subscription.as_ref(),
            trial_days_left,
            weights: &weights,
        };
        replies::profile(&view, Utc::now())
            .map(Reply::text)
            .ok_or(CoachError::NotOnboarded)
    }

    async fn subscribe(&self, user_id: &str) -> Result<Reply, CoachError> {
        let db = &self.deps.db;
        let plans = self.deps.entitlements.plans();
        let subscription = db.get_subscription(user_id).await?;
        let trial_used = db
            .get_user(user_id)
            .await?
            .is_some_and(|u| u.trial_granted);

        let status = format!(
            "Subscription: {}",
            replies::subscription_status(subscription.as_ref(), Utc::now())
        );
        let mut messages = match &self.settings.payment_provider_token {
            Some(token) => vec![
                OutgoingResponse::text(status)
                    .with_invoice(replies::monthly_invoice(token, plans.subscription_days)),
            ],
            None => vec![OutgoingResponse::text(format!(
                "{status}\n\n{}",
                replies::PAYMENT_UNAVAILABLE
            ))],
        };
        if !trial_used {
            messages.push(replies::trial_offer(plans.trial_days));
        }

        Ok(Reply {
            messages,
            cleanup: Cleanup::None,
        })
    }

    /// Best-effort typing indicator before a slow generation call.
    async fn thinking(&self, msg: &IncomingMessage) {
        let _ = self
            .channels
            .send_status(msg, StatusUpdate::Thinking(replies::GENERATING.to_string()))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use futures::stream;

    use crate::achievements::AchievementEvaluator;
    use crate::channels::{Channel, MessageHandle, MessageStream};
    use crate::config::PlanConfig;
    use crate::error::{ChannelError, LlmError};
    use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider};
    use crate::store::LibSqlBackend;

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<OutgoingResponse>>,
        retracted: Mutex<Vec<String>>,
        next_handle: AtomicUsize,
    }

    impl RecordingChannel {
        fn last(&self) -> OutgoingResponse {
            self.sent.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "test"
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            Ok(Box::pin(stream::empty()))
        }

        async fn respond(
            &self,
            msg: &IncomingMessage,
            response: OutgoingResponse,
        ) -> Result<Option<MessageHandle>, ChannelError> {
            self.send_to(&msg.user_id, response).await
        }

        async fn send_to(
            &self,
            _user_id: &str,
            response: OutgoingResponse,
        ) -> Result<Option<MessageHandle>, ChannelError> {
            self.sent.lock().unwrap().push(response);
            Ok(Some(self.next_handle.fetch_add(1, Ordering::SeqCst).to_string()))
        }

        async fn retract(
            &self,
            _user_id: &str,
            handle: &MessageHandle,
        ) -> Result<(), ChannelError> {
            self.retracted.lock().unwrap().push(handle.clone());
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    struct EchoLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for EchoLlm {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CompletionResponse {
                content: "Push-ups 3x12".into(),
            })
        }
    }

    struct Harness {
        dispatcher: Dispatcher,
        channel: Arc<RecordingChannel>,
        llm: Arc<EchoLlm>,
        db: Arc<dyn Database>,
    }

    async fn harness(settings: DispatchSettings) -> Harness {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let entitlements = Arc::new(Entitlements::new(db.clone(), PlanConfig::default()));
        let llm = Arc::new(EchoLlm {
            calls: AtomicUsize::new(0),
        });
        let coach = Arc::new(Coach::new(
            db.clone(),
            entitlements.clone(),
            Arc::new(AchievementEvaluator::new(db.clone())),
            llm.clone(),
            std::time::Duration::from_secs(5),
        ));
        let channel = Arc::new(RecordingChannel::default());
        let channels = Arc::new(ChannelManager::new());
        channels.add(channel.clone()).await;

        let deps = BotDeps {
            db: db.clone(),
            onboarding: Arc::new(OnboardingManager::new(db.clone())),
            entitlements,
            coach,
        };
        Harness {
            dispatcher: Dispatcher::new(deps, settings, channels),
            channel,
            llm,
            db,
        }
    }

    impl Harness {
        async fn say(&self, text: &str) -> OutgoingResponse {
            self.dispatcher
                .handle_message(&IncomingMessage::new("test", "u1", text))
                .await;
            self.channel.last()
        }

        async fn press(&self, data: &str) -> OutgoingResponse {
            self.dispatcher
                .handle_message(&IncomingMessage::new("test", "u1", "").with_callback(data))
                .await;
            self.channel.last()
        }

        async fn onboard(&self) {
            self.say("/start").await;
            self.say("Al").await;
            self.say("34").await;
            self.press("gender:male").await;
            self.say("180").await;
            self.say("90").await;
            self.press("goal:lose").await;
            self.press("location:gym").await;
            self.press("level:beginner").await;
        }
    }

    #[tokio::test]
    async fn gated_command_before_onboarding() {
        let h = harness(DispatchSettings::default()).await;
        let reply = h.say("/training").await;
        assert_eq!(reply.content, replies::for_error(&CoachError::NotOnboarded));
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn onboarding_steps_retract_earlier_prompts() {
        let h = harness(DispatchSettings::default()).await;
        h.say("/start").await;
        assert!(h.channel.retracted.lock().unwrap().is_empty());

        let reply = h.say("Al").await;
        assert_eq!(reply.content, "How old are you?");
        // Greeting and name question were both cleared.
        assert_eq!(*h.channel.retracted.lock().unwrap(), vec!["0", "1"]);

        let reply = h.say("7").await;
        assert!(reply.content.starts_with("⚠️"));
        assert!(reply.content.ends_with("How old are you?"));
    }

    #[tokio::test]
    async fn trial_then_training_then_done() {
        let h = harness(DispatchSettings::default()).await;
        h.onboard().await;

        let reply = h.say("/training").await;
        assert!(reply.content.contains("subscription"));

        let reply = h.press(replies::TRIAL_CLAIM).await;
        assert!(reply.content.contains("trial activated"));
        let reply = h.press(replies::TRIAL_CLAIM).await;
        assert_eq!(reply.content, replies::for_error(&CoachError::AlreadyGranted));

        let reply = h.say("/training").await;
        assert!(reply.content.contains("Push-ups 3x12"));
        assert_eq!(reply.buttons[0].len(), 2);

        let reply = h.press(replies::TRAINING_DONE).await;
        assert!(reply.content.contains("First workout"));
        let reply = h.press(replies::TRAINING_DONE).await;
        assert_eq!(reply.content, replies::for_error(&CoachError::NoActiveItem));
    }

    #[tokio::test]
    async fn subscribe_without_provider_token() {
        let h = harness(DispatchSettings::default()).await;
        h.say("/subscribe").await;
        let sent = h.channel.sent.lock().unwrap().clone();
        assert!(sent[0].content.contains(replies::PAYMENT_UNAVAILABLE));
        assert!(sent[0].invoice.is_none());
        assert_eq!(sent[1].buttons[0][0].data, replies::TRIAL_CLAIM);
    }

    #[tokio::test]
    async fn subscribe_with_provider_token_sends_invoice() {
        let h = harness(DispatchSettings {
            payment_provider_token: Some("provider:TEST".into()),
            ..DispatchSettings::default()
        })
        .await;
        h.say("/subscribe").await;
        let sent = h.channel.sent.lock().unwrap().clone();
        let invoice = sent[0].invoice.as_ref().unwrap();
        assert_eq!(invoice.payload, crate::entitlement::PLAN_MONTHLY);
        assert_eq!(invoice.amount, replies::MONTHLY_PRICE);
    }

    #[tokio::test]
    async fn weight_usage_and_logging() {
        let h = harness(DispatchSettings::default()).await;
        h.onboard().await;

        assert_eq!(h.say("/weight").await.content, replies::WEIGHT_USAGE);
        assert_eq!(h.say("/weight abc").await.content, replies::WEIGHT_USAGE);
        assert!(h.say("/weight 500").await.content.starts_with("⚠️"));

        let reply = h.say("/weight 88").await;
        assert!(reply.content.contains("88 kg saved"));
        assert!(!reply.content.contains("5 kg lost"));

        let reply = h.say("/progress 82,5").await;
        assert!(reply.content.contains("82.5 kg saved"));
        assert!(reply.content.contains("5 kg lost"));
        assert_eq!(h.db.list_weights("u1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn schedule_and_reminder() {
        let h = harness(DispatchSettings::default()).await;
        assert_eq!(h.say("/schedule").await.buttons.len(), 3);
        assert!(h.press("schedule:4").await.content.contains("Mon, Tue, Thu, Sat"));
        assert_eq!(h.db.get_schedule("u1").await.unwrap().unwrap().days_per_week, 4);

        assert_eq!(h.say("/reminder 25:00").await.content, replies::REMINDER_USAGE);
        h.say("/reminder 7:05").await;
        assert_eq!(h.db.get_user("u1").await.unwrap().unwrap().reminder_time, "07:05");
    }

    #[tokio::test]
    async fn admin_only_for_configured_ids() {
        let h = harness(DispatchSettings::default()).await;
        assert_eq!(h.say("/admin").await.content, replies::NOT_ADMIN);

        let h = harness(DispatchSettings {
            admin_ids: vec!["u1".into()],
            ..DispatchSettings::default()
        })
        .await;
        h.onboard().await;
        assert!(h.say("/admin").await.content.contains("Users: 1"));
    }

    #[tokio::test]
    async fn payment_grants_subscription() {
        let h = harness(DispatchSettings::default()).await;
        let notice = crate::channels::PaymentNotice {
            payload: crate::entitlement::PLAN_MONTHLY.into(),
            currency: "RUB".into(),
            total_amount: replies::MONTHLY_PRICE,
        };
        h.dispatcher
            .handle_message(&IncomingMessage::new("test", "u1", "").with_payment(notice))
            .await;
        assert!(h.channel.last().content.starts_with("✅ Thank you!"));
        assert!(h.db.get_subscription("u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn free_text_without_draft() {
        let h = harness(DispatchSettings::default()).await;
        assert_eq!(h.say("hello").await.content, onboarding_prompts::NO_DRAFT);
        h.onboard().await;
        assert_eq!(h.say("hello").await.content, replies::UNKNOWN_COMMAND);
    }

    #[tokio::test]
    async fn stale_questionnaire_button_after_onboarding() {
        let h = harness(DispatchSettings::default()).await;
        assert_eq!(h.press("goal:gain").await.content, onboarding_prompts::NO_DRAFT);
        h.onboard().await;
        assert_eq!(h.press("goal:gain").await.content, onboarding_prompts::NO_DRAFT);
        let profile = h.db.get_user("u1").await.unwrap().unwrap().profile.unwrap();
        assert_eq!(profile.goal, crate::profile::Goal::Lose);
    }
}
