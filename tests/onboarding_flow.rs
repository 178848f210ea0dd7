//! A full conversation through the dispatcher loop: questionnaire, trial,
//! workout, completion.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;

use fit_coach::achievements::AchievementEvaluator;
use fit_coach::bot::{BotDeps, DispatchSettings, Dispatcher};
use fit_coach::channels::{
    Channel, ChannelManager, IncomingMessage, MessageHandle, MessageStream, OutgoingResponse,
};
use fit_coach::coaching::Coach;
use fit_coach::config::PlanConfig;
use fit_coach::entitlement::Entitlements;
use fit_coach::error::{ChannelError, LlmError};
use fit_coach::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use fit_coach::onboarding::OnboardingManager;
use fit_coach::profile::{AchievementKind, Gender, Goal, Level, TrainingLocation, TrainingStatus};
use fit_coach::store::{Database, LibSqlBackend};

/// Replays a fixed script and records everything the bot sends.
struct ScriptedChannel {
    script: Mutex<Vec<IncomingMessage>>,
    sent: Mutex<Vec<OutgoingResponse>>,
    retracted: AtomicUsize,
    handles: AtomicUsize,
}

impl ScriptedChannel {
    fn new(script: Vec<IncomingMessage>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            sent: Mutex::new(Vec::new()),
            retracted: AtomicUsize::new(0),
            handles: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn name(&self) -> &str {
        "script"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let script = std::mem::take(&mut *self.script.lock().unwrap());
        Ok(Box::pin(stream::iter(script)))
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
        Ok(Some(self.handles.fetch_add(1, Ordering::SeqCst).to_string()))
    }

    async fn retract(&self, _user_id: &str, _handle: &MessageHandle) -> Result<(), ChannelError> {
        self.retracted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

struct CountingLlm {
    calls: AtomicUsize,
}

#[async_trait]
impl LlmProvider for CountingLlm {
    fn model_name(&self) -> &str {
        "counting"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(request.system.contains("Al"));
        Ok(CompletionResponse {
            content: "Goblet squats 3x10".into(),
        })
    }
}

fn text(t: &str) -> IncomingMessage {
    IncomingMessage::new("script", "100", t)
}

fn press(data: &str) -> IncomingMessage {
    IncomingMessage::new("script", "100", "").with_callback(data)
}

#[tokio::test]
async fn questionnaire_trial_and_first_workout() {
    let script = vec![
        text("/training"),
        text("/start"),
        text("A"),
        text("Al"),
        text("200"),
        text("34"),
        press("gender:male"),
        text("180"),
        text("90,5"),
        press("goal:lose"),
        press("location:home_weights"),
        press("level:intermediate"),
        text("/training"),
        press("trial:claim"),
        text("/training"),
        press("training:done"),
    ];
    let channel = ScriptedChannel::new(script);

    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let entitlements = Arc::new(Entitlements::new(db.clone(), PlanConfig::default()));
    let llm = Arc::new(CountingLlm {
        calls: AtomicUsize::new(0),
    });
    let coach = Arc::new(Coach::new(
        db.clone(),
        entitlements.clone(),
        Arc::new(AchievementEvaluator::new(db.clone())),
        llm.clone(),
        Duration::from_secs(5),
    ));
    let channels = Arc::new(ChannelManager::new());
    channels.add(channel.clone()).await;

    let dispatcher = Dispatcher::new(
        BotDeps {
            db: db.clone(),
            onboarding: Arc::new(OnboardingManager::new(db.clone())),
            entitlements,
            coach,
        },
        DispatchSettings::default(),
        channels,
    );
    dispatcher.run().await.unwrap();

    // Profile committed with the valid answers only.
    let user = db.get_user("100").await.unwrap().unwrap();
    let profile = user.profile.unwrap();
    assert_eq!(profile.name, "Al");
    assert_eq!(profile.age, 34);
    assert_eq!(profile.gender, Gender::Male);
    assert_eq!(profile.height_cm, 180);
    assert!((profile.weight_kg - 90.5).abs() < f64::EPSILON);
    assert_eq!(profile.goal, Goal::Lose);
    assert_eq!(profile.training_location, TrainingLocation::HomeWeights);
    assert_eq!(profile.level, Level::Intermediate);
    assert!(user.trial_granted);
    assert!(db.get_draft("100").await.unwrap().is_none());

    // Only the training request after the trial reached the generator.
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        db.recent_training_statuses("100", 5).await.unwrap(),
        vec![TrainingStatus::Completed]
    );
    let badges: Vec<AchievementKind> = db
        .list_achievements("100")
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.kind)
        .collect();
    assert!(badges.contains(&AchievementKind::FirstWorkout));

    let sent = channel.sent.lock().unwrap().clone();
    assert!(sent[0].content.contains("questionnaire"));
    assert!(sent.iter().any(|r| r.content.contains("Goblet squats 3x10")));
    assert!(sent.last().unwrap().content.contains("First workout"));
    assert!(channel.retracted.load(Ordering::SeqCst) > 0);
}
