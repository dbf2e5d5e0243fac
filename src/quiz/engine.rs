use std::sync::{Arc, Weak};

use log::{debug, warn};

use crate::quiz::bank::{CollectionKind, QuestionBank};
use crate::quiz::errors::QuizError;
use crate::quiz::scores::Leaderboard;
use crate::quiz::session::{Phase, Session, SessionStore};
use crate::quiz::timer::{self, Countdown};
use crate::quiz::{Effect, Letter, MessageRef, Messenger, PlayerId, ScoreTier};

/// The per-user quiz state machine.
///
/// Every inbound event locks the user's session and runs to completion, so
/// one session's fields are never mutated concurrently. The countdown and
/// the post-feedback auto-advance re-enter through `timer_expired` /
/// `auto_advance` carrying the epoch token they were armed with; a token
/// that no longer matches means a competing event won the race and the
/// continuation is dropped. That is what guarantees at most one of
/// {expire, answer} is applied per question.
pub struct Engine {
    bank: Arc<QuestionBank>,
    sessions: SessionStore,
    scores: Arc<Leaderboard>,
    ui: Arc<dyn Messenger>,
    this: Weak<Engine>,
}

impl Engine {
    pub fn new(
        bank: Arc<QuestionBank>,
        scores: Arc<Leaderboard>,
        ui: Arc<dyn Messenger>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            bank,
            sessions: SessionStore::new(),
            scores,
            ui,
            this: this.clone(),
        })
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.active_count()
    }

    /// Starts a run for the chosen level or topic. An existing session for
    /// the user is discarded: re-selecting is an implicit restart.
    pub async fn select_level(
        &self,
        user: PlayerId,
        display_name: &str,
        key: &str,
    ) -> Result<(), QuizError> {
        let collection = self.bank.questions_for(key)?;
        let session = Session::new(key, collection.kind, display_name, collection.questions.len());
        let handle = self.sessions.create(user, session);
        let mut session = handle.lock().await;
        self.present_question(user, &mut session).await;
        Ok(())
    }

    /// An answer button press. Ignored unless the session is awaiting one.
    pub async fn answer(&self, user: PlayerId, letter: Letter) -> Result<(), QuizError> {
        let handle = self.sessions.get(user).ok_or(QuizError::SessionNotFound)?;
        let mut session = handle.lock().await;
        if session.phase != Phase::AwaitingAnswer {
            debug!("{user}: answer {letter} ignored in {:?}", session.phase);
            return Ok(());
        }
        self.conclude_question(user, &mut session, Some(letter)).await;
        Ok(())
    }

    /// Explicit advance out of the feedback screen.
    pub async fn next(&self, user: PlayerId) -> Result<(), QuizError> {
        let handle = self.sessions.get(user).ok_or(QuizError::SessionNotFound)?;
        let mut session = handle.lock().await;
        if session.phase != Phase::ShowingFeedback {
            debug!("{user}: next ignored in {:?}", session.phase);
            return Ok(());
        }
        self.advance(user, &mut session).await;
        Ok(())
    }

    /// Freezes the run. Only restart is accepted afterwards.
    pub async fn pause(&self, user: PlayerId) -> Result<(), QuizError> {
        let handle = self.sessions.get(user).ok_or(QuizError::SessionNotFound)?;
        let mut session = handle.lock().await;
        if session.phase != Phase::AwaitingAnswer {
            debug!("{user}: pause ignored in {:?}", session.phase);
            return Ok(());
        }
        session.disarm();
        session.phase = Phase::Paused;
        if let Some(msg) = session.timer_msg.take() {
            self.try_delete(user, msg).await;
        }
        match session.question_msg {
            Some(msg) => {
                if let Err(err) = self.ui.edit(user, msg, &Effect::ShowPausedControls).await {
                    warn!("{user}: failed to show pause controls: {err}");
                }
            }
            None => {
                session.question_msg = self.try_send(user, &Effect::ShowPausedControls).await;
            }
        }
        Ok(())
    }

    /// Throws the current run away and starts over at question 1 of the
    /// same level. Valid from any phase.
    pub async fn restart(&self, user: PlayerId) -> Result<(), QuizError> {
        let handle = self.sessions.get(user).ok_or(QuizError::SessionNotFound)?;
        let (level, name) = {
            let mut session = handle.lock().await;
            session.disarm();
            self.cleanup_messages(user, &mut session).await;
            (session.level.clone(), session.display_name.clone())
        };
        self.select_level(user, &name, &level).await
    }

    /// `/start` support: forget the user's session entirely so the level
    /// menu can be shown afresh.
    pub fn reset(&self, user: PlayerId) {
        self.sessions.remove(user);
    }

    /// Countdown expiry. `epoch` must match the token the timer was armed
    /// with; a stale fire (an answer won the race, a restart happened, a
    /// later question is on screen) is a no-op.
    pub async fn timer_expired(&self, user: PlayerId, epoch: u64) {
        let Some(handle) = self.sessions.get(user) else {
            debug!("{user}: timer expired for a cleared session");
            return;
        };
        let mut session = handle.lock().await;
        if session.epoch() != epoch || session.phase != Phase::AwaitingAnswer {
            debug!("{user}: stale timer expiry ignored");
            return;
        }
        self.conclude_question(user, &mut session, None).await;
    }

    /// End of the post-feedback delay.
    pub async fn auto_advance(&self, user: PlayerId, epoch: u64) {
        let Some(handle) = self.sessions.get(user) else {
            return;
        };
        let mut session = handle.lock().await;
        if session.epoch() != epoch || session.phase != Phase::ShowingFeedback {
            debug!("{user}: stale auto-advance ignored");
            return;
        }
        self.advance(user, &mut session).await;
    }

    async fn present_question(&self, user: PlayerId, session: &mut Session) {
        session.disarm();
        self.cleanup_messages(user, session).await;

        let Some(question) = self.bank.question(&session.level, session.question_index).cloned()
        else {
            self.finish(user, session).await;
            return;
        };

        session.phase = Phase::AwaitingAnswer;
        session.question_msg = self
            .try_send(
                user,
                &Effect::ShowQuestion {
                    index: session.question_index,
                    total: session.total,
                    prompt: question.prompt.clone(),
                    passage: question.passage.clone(),
                    options: question.options.clone(),
                },
            )
            .await;

        let total_secs = match session.kind {
            CollectionKind::Standard => timer::QUESTION_SECS,
            CollectionKind::Reading => timer::READING_SECS,
        };
        session.timer_msg = self
            .try_send(user, &Effect::ShowTimerTick { remaining_secs: total_secs, total_secs })
            .await;

        session.current = Some(question);
        self.arm_countdown(user, session, total_secs);
    }

    fn arm_countdown(&self, user: PlayerId, session: &mut Session, total_secs: u64) {
        let epoch = session.epoch();
        let engine = self.this.clone();
        let ui = self.ui.clone();
        let timer_msg = session.timer_msg;
        session.arm(Countdown::start(
            total_secs,
            move |remaining_secs| {
                let ui = ui.clone();
                async move {
                    let Some(msg) = timer_msg else { return };
                    let tick = Effect::ShowTimerTick { remaining_secs, total_secs };
                    if let Err(err) = ui.edit(user, msg, &tick).await {
                        debug!("{user}: timer tick not delivered: {err}");
                    }
                }
            },
            move || async move {
                if let Some(engine) = engine.upgrade() {
                    engine.timer_expired(user, epoch).await;
                }
            },
        ));
    }

    /// Shared tail of `answer` and `timer_expired`: `chosen == None` means
    /// the clock ran out, which scores as incorrect and still reveals the
    /// correct answer. Both paths end in the feedback phase with the
    /// auto-advance armed, so a late tap racing the expiry hits the phase
    /// guard instead of the next question.
    async fn conclude_question(&self, user: PlayerId, session: &mut Session, chosen: Option<Letter>) {
        let epoch = session.disarm();

        let Some(question) = session.current.clone() else {
            debug!("{user}: event for a question that is not on screen");
            return;
        };

        let correct = question.correct_letter();
        let was_correct = chosen == Some(correct);
        if was_correct {
            session.correct_answers += 1;
        }

        self.cleanup_messages(user, session).await;

        self.try_send(
            user,
            &Effect::ShowFeedback {
                was_correct,
                chosen,
                chosen_text: chosen.and_then(|l| question.options.get(l.index()).cloned()),
                correct,
                correct_text: question.options[question.correct].clone(),
                explanation: question.explanation.clone(),
            },
        )
        .await;

        session.phase = Phase::ShowingFeedback;

        let engine = self.this.clone();
        session.arm(Countdown::delay(timer::FEEDBACK_DELAY_SECS, move || async move {
            if let Some(engine) = engine.upgrade() {
                engine.auto_advance(user, epoch).await;
            }
        }));
    }

    async fn advance(&self, user: PlayerId, session: &mut Session) {
        session.disarm();
        session.question_index += 1;
        if session.question_index >= session.total {
            self.finish(user, session).await;
        } else {
            self.present_question(user, session).await;
        }
    }

    async fn finish(&self, user: PlayerId, session: &mut Session) {
        session.disarm();
        self.cleanup_messages(user, session).await;

        let score = session.correct_answers;
        let total = session.total;
        let percent = if total == 0 {
            0
        } else {
            (f64::from(score) / total as f64 * 100.0).round() as u32
        };
        let tier = ScoreTier::for_percent(percent);

        self.try_send(user, &Effect::ShowResults { score, total, percent, tier }).await;

        self.scores.record_attempt(user, &session.display_name, score);
        self.sessions.remove(user);
        debug!("{user}: run finished with {score}/{total}");
    }

    async fn try_send(&self, user: PlayerId, effect: &Effect) -> Option<MessageRef> {
        match self.ui.send(user, effect).await {
            Ok(message) => Some(message),
            Err(err) => {
                warn!("{user}: failed to deliver {effect:?}: {err}");
                None
            }
        }
    }

    async fn try_delete(&self, user: PlayerId, message: MessageRef) {
        if let Err(err) = self.ui.delete(user, message).await {
            debug!("{user}: failed to delete message: {err}");
        }
    }

    async fn cleanup_messages(&self, user: PlayerId, session: &mut Session) {
        if let Some(msg) = session.timer_msg.take() {
            self.try_delete(user, msg).await;
        }
        if let Some(msg) = session.question_msg.take() {
            self.try_delete(user, msg).await;
        }
    }
}
