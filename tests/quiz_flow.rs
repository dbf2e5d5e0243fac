//! Drives the engine end to end against a recording messenger, with tokio's
//! clock paused so the countdown and the auto-advance delay are exact.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use quiz_tgbot::quiz::bank::QuestionBank;
use quiz_tgbot::quiz::engine::Engine;
use quiz_tgbot::quiz::errors::{PresentationFailure, QuizError};
use quiz_tgbot::quiz::scores::{Leaderboard, MemoryStore};
use quiz_tgbot::quiz::{Effect, Letter, MessageRef, Messenger, PlayerId, ScoreTier};

#[derive(Default)]
struct RecordingUi {
    effects: Mutex<Vec<Effect>>,
    next_id: AtomicI64,
}

impl RecordingUi {
    fn sent(&self) -> Vec<Effect> {
        self.effects.lock().unwrap().clone()
    }

    fn count(&self, matches: impl Fn(&Effect) -> bool) -> usize {
        self.sent().iter().filter(|e| matches(e)).count()
    }

    fn questions(&self) -> Vec<Effect> {
        self.sent()
            .into_iter()
            .filter(|e| matches!(e, Effect::ShowQuestion { .. }))
            .collect()
    }

    fn results(&self) -> Vec<Effect> {
        self.sent()
            .into_iter()
            .filter(|e| matches!(e, Effect::ShowResults { .. }))
            .collect()
    }
}

#[async_trait]
impl Messenger for RecordingUi {
    async fn send(&self, _user: PlayerId, effect: &Effect) -> Result<MessageRef, PresentationFailure> {
        self.effects.lock().unwrap().push(effect.clone());
        Ok(MessageRef(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn edit(
        &self,
        _user: PlayerId,
        _message: MessageRef,
        effect: &Effect,
    ) -> Result<(), PresentationFailure> {
        // timer ticks arrive as edits; record those too
        self.effects.lock().unwrap().push(effect.clone());
        Ok(())
    }

    async fn delete(&self, _user: PlayerId, _message: MessageRef) -> Result<(), PresentationFailure> {
        Ok(())
    }
}

const QUESTIONS: &str = r#"{
    "A1": [
        {"question": "Pick a", "options": ["a", "b", "c", "d"], "correct": 0},
        {"question": "Pick b", "options": ["a", "b", "c", "d"], "correct": "B"},
        {"question": "Pick c", "options": ["a", "b", "c", "d"], "answer": "C", "explanation": "because"}
    ],
    "B1": [
        {"question": "First", "options": ["x", "y"], "correct": 1},
        {"question": "Second", "options": ["x", "y"], "correct": 0}
    ]
}"#;

const READING: &str = r#"{
    "A1": [
        {"question": "What does Tom have?", "passage": "Tom has a cat.",
         "options": ["a cat", "a dog"], "correct": 0}
    ]
}"#;

fn fixture() -> (Arc<Engine>, Arc<RecordingUi>, Arc<Leaderboard>) {
    let bank = Arc::new(QuestionBank::from_json(QUESTIONS, READING).unwrap());
    let scores = Arc::new(Leaderboard::open(Box::new(MemoryStore::default())));
    let ui = Arc::new(RecordingUi::default());
    let engine = Engine::new(bank, scores.clone(), ui.clone());
    (engine, ui, scores)
}

#[tokio::test(start_paused = true)]
async fn full_run_scores_and_bands() {
    let (engine, ui, scores) = fixture();
    let user = PlayerId(1);

    engine.select_level(user, "Alice", "A1").await.unwrap();
    engine.answer(user, Letter::A).await.unwrap();
    engine.next(user).await.unwrap();
    engine.answer(user, Letter::B).await.unwrap();
    engine.next(user).await.unwrap();
    engine.answer(user, Letter::D).await.unwrap();
    engine.next(user).await.unwrap();

    assert_eq!(
        ui.results(),
        vec![Effect::ShowResults { score: 2, total: 3, percent: 67, tier: ScoreTier::Good }]
    );

    // the session is gone; further events ask the user to restart
    assert_eq!(engine.next(user).await, Err(QuizError::SessionNotFound));

    let top = scores.top_scores(10);
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].best_score, 2);
    assert_eq!(top[0].first_name, "Alice");
}

#[tokio::test(start_paused = true)]
async fn timeout_reveals_the_answer_and_auto_advances() {
    let (engine, ui, _) = fixture();
    let user = PlayerId(2);

    engine.select_level(user, "Bob", "B1").await.unwrap();

    // 10 s question timer, then the 3 s feedback delay
    tokio::time::sleep(Duration::from_secs(14)).await;

    let sent = ui.sent();
    let feedback = sent
        .iter()
        .find(|e| matches!(e, Effect::ShowFeedback { .. }))
        .expect("timeout produced feedback");
    assert!(matches!(
        feedback,
        Effect::ShowFeedback { was_correct: false, chosen: None, correct: Letter::B, .. }
    ));
    assert_eq!(ui.questions().len(), 2);

    // let question 2 time out as well: the run ends with score 0
    tokio::time::sleep(Duration::from_secs(13)).await;
    assert_eq!(
        ui.results(),
        vec![Effect::ShowResults { score: 0, total: 2, percent: 0, tier: ScoreTier::NeedsPractice }]
    );
}

#[tokio::test(start_paused = true)]
async fn answering_cancels_the_countdown() {
    let (engine, ui, _) = fixture();
    let user = PlayerId(3);

    engine.select_level(user, "Cara", "B1").await.unwrap();
    engine.answer(user, Letter::B).await.unwrap();

    // well past the original expiry: only the manual answer's feedback
    // exists, and the auto-advance has shown question 2 exactly once
    tokio::time::sleep(Duration::from_secs(20)).await;

    let feedback_for_q1 = ui.count(|e| {
        matches!(e, Effect::ShowFeedback { was_correct: true, chosen: Some(Letter::B), .. })
    });
    assert_eq!(feedback_for_q1, 1);
    assert_eq!(ui.questions().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn paused_session_accepts_only_restart() {
    let (engine, ui, _) = fixture();
    let user = PlayerId(4);

    engine.select_level(user, "Dan", "B1").await.unwrap();
    engine.answer(user, Letter::B).await.unwrap();
    engine.next(user).await.unwrap();
    engine.pause(user).await.unwrap();

    assert_eq!(ui.count(|e| matches!(e, Effect::ShowPausedControls)), 1);

    // answers and next are no-ops now, and no timer is running
    engine.answer(user, Letter::A).await.unwrap();
    engine.next(user).await.unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(ui.count(|e| matches!(e, Effect::ShowFeedback { .. })), 1);
    assert!(ui.results().is_empty());

    engine.restart(user).await.unwrap();
    let questions = ui.questions();
    assert_eq!(questions.len(), 3);
    assert!(matches!(questions[2], Effect::ShowQuestion { index: 0, .. }));
}

#[tokio::test(start_paused = true)]
async fn duplicate_answers_are_consumed_once() {
    let (engine, ui, _) = fixture();
    let user = PlayerId(5);

    engine.select_level(user, "Eve", "B1").await.unwrap();
    engine.answer(user, Letter::B).await.unwrap();
    // a second tap on the same (already concluded) question
    engine.answer(user, Letter::B).await.unwrap();
    engine.next(user).await.unwrap();
    engine.answer(user, Letter::B).await.unwrap(); // wrong for question 2
    engine.next(user).await.unwrap();

    assert_eq!(ui.count(|e| matches!(e, Effect::ShowFeedback { .. })), 2);
    assert_eq!(
        ui.results(),
        vec![Effect::ShowResults { score: 1, total: 2, percent: 50, tier: ScoreTier::Average }]
    );
}

#[tokio::test(start_paused = true)]
async fn reselecting_a_level_is_an_implicit_restart() {
    let (engine, ui, _) = fixture();
    let user = PlayerId(6);

    engine.select_level(user, "Fay", "A1").await.unwrap();
    engine.answer(user, Letter::A).await.unwrap();
    engine.next(user).await.unwrap();

    engine.select_level(user, "Fay", "B1").await.unwrap();

    let questions = ui.questions();
    assert!(matches!(
        questions.last(),
        Some(Effect::ShowQuestion { index: 0, total: 2, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn reading_questions_run_on_the_longer_clock() {
    let (engine, ui, _) = fixture();
    let user = PlayerId(7);

    engine.select_level(user, "Gus", "reading_A1").await.unwrap();

    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(ui.count(|e| matches!(e, Effect::ShowFeedback { .. })), 0);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(ui.count(|e| matches!(e, Effect::ShowFeedback { .. })), 1);
}

#[tokio::test]
async fn events_without_a_session_are_errors() {
    let (engine, _, _) = fixture();
    let user = PlayerId(8);

    assert_eq!(engine.answer(user, Letter::A).await, Err(QuizError::SessionNotFound));
    assert_eq!(engine.pause(user).await, Err(QuizError::SessionNotFound));
    assert_eq!(
        engine.select_level(user, "Hal", "Z9").await,
        Err(QuizError::UnknownLevel("Z9".to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn slash_start_clears_the_session() {
    let (engine, _, _) = fixture();
    let user = PlayerId(9);

    engine.select_level(user, "Ivy", "A1").await.unwrap();
    engine.reset(user);

    assert_eq!(engine.active_sessions(), 0);
    assert_eq!(engine.answer(user, Letter::A).await, Err(QuizError::SessionNotFound));
}

#[tokio::test(start_paused = true)]
async fn timer_ticks_count_down_without_repeats() {
    let (engine, ui, _) = fixture();
    let user = PlayerId(10);

    engine.select_level(user, "Jo", "B1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(8250)).await;

    let ticks: Vec<u64> = ui
        .sent()
        .iter()
        .filter_map(|e| match e {
            Effect::ShowTimerTick { remaining_secs, .. } => Some(*remaining_secs),
            _ => None,
        })
        .collect();

    // initial message plus the first tick both show 10, then strictly down
    let dedup: Vec<u64> = ticks[1..].to_vec();
    assert!(dedup.windows(2).all(|w| w[0] > w[1]));
    assert_eq!(*dedup.last().unwrap(), 2);
}
