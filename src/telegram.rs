use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode};
use teloxide::utils::html;

use crate::quiz::errors::PresentationFailure;
use crate::quiz::scores::PlayerRecord;
use crate::quiz::{Effect, Letter, MessageRef, Messenger, PlayerId, ScoreTier};

/// Callback-data vocabulary shared with the dispatcher in `main`.
pub const CB_ANSWER_PREFIX: &str = "ans_";
pub const CB_NEXT: &str = "next_question";
pub const CB_PAUSE: &str = "pause_quiz";
pub const CB_RESTART: &str = "restart_quiz";

pub const LEVELS: [&str; 6] = ["A1", "A2", "B1", "B2", "C1", "C2"];

/// Messaging port over a Telegram private chat: the user id doubles as the
/// chat id.
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send(&self, user: PlayerId, effect: &Effect) -> Result<MessageRef, PresentationFailure> {
        let mut request = self
            .bot
            .send_message(ChatId(user.0), render_text(effect))
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = render_keyboard(effect) {
            request = request.reply_markup(keyboard);
        }
        let message = request.await.map_err(to_failure)?;
        Ok(MessageRef(i64::from(message.id.0)))
    }

    async fn edit(
        &self,
        user: PlayerId,
        message: MessageRef,
        effect: &Effect,
    ) -> Result<(), PresentationFailure> {
        let mut request = self
            .bot
            .edit_message_text(ChatId(user.0), MessageId(message.0 as i32), render_text(effect))
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = render_keyboard(effect) {
            request = request.reply_markup(keyboard);
        }
        request.await.map_err(to_failure)?;
        Ok(())
    }

    async fn delete(&self, user: PlayerId, message: MessageRef) -> Result<(), PresentationFailure> {
        self.bot
            .delete_message(ChatId(user.0), MessageId(message.0 as i32))
            .await
            .map_err(to_failure)?;
        Ok(())
    }
}

fn to_failure(err: teloxide::RequestError) -> PresentationFailure {
    PresentationFailure(err.to_string())
}

fn render_text(effect: &Effect) -> String {
    match effect {
        Effect::ShowQuestion { index, total, prompt, passage, options } => {
            let options = options
                .iter()
                .enumerate()
                .map(|(i, text)| format!("{}) {}", Letter::ALL[i], html::escape(text)))
                .collect::<Vec<_>>()
                .join("\n");
            match passage {
                Some(passage) => format!(
                    "📖 <b>Question {}/{}</b>\n\n<i>{}</i>\n\n{}\n\n{}",
                    index + 1,
                    total,
                    html::escape(passage),
                    html::escape(prompt),
                    options
                ),
                None => format!(
                    "📝 <b>Question {}/{}</b>\n\n{}\n\n{}",
                    index + 1,
                    total,
                    html::escape(prompt),
                    options
                ),
            }
        }
        Effect::ShowTimerTick { remaining_secs, total_secs } => {
            timer_text(*remaining_secs, *total_secs)
        }
        Effect::ShowFeedback { was_correct, chosen, chosen_text, correct, correct_text, explanation } => {
            let mut text = match (was_correct, chosen) {
                (true, _) => "✅ <b>Correct!</b>\n".to_string(),
                (false, Some(_)) => "❌ <b>Wrong answer!</b>\n".to_string(),
                (false, None) => "⏰ <b>Time is up!</b>\n".to_string(),
            };
            if let (Some(letter), Some(chosen_text)) = (chosen, chosen_text) {
                text.push_str(&format!(
                    "\nYou chose: <b>{}. {}</b>\n",
                    letter,
                    html::escape(chosen_text)
                ));
            }
            if !was_correct {
                text.push_str(&format!(
                    "✅ Correct answer: <b>{}. {}</b>\n",
                    correct,
                    html::escape(correct_text)
                ));
            }
            if let Some(explanation) = explanation {
                text.push_str(&format!("\n💡 <i>{}</i>", html::escape(explanation)));
            }
            text
        }
        Effect::ShowResults { score, total, percent, tier } => format!(
            "🎊 <b>Quiz finished!</b>\n\n\
             ✅ Correct answers: <b>{score}/{total}</b>\n\
             📈 Score: <b>{percent}%</b>\n\n\
             {}\n\n\
             Send /start to try again!",
            tier_comment(*tier)
        ),
        Effect::ShowPausedControls => {
            "⏸ <b>Quiz paused</b>\n\nPress restart to start this level over.".to_string()
        }
    }
}

fn render_keyboard(effect: &Effect) -> Option<InlineKeyboardMarkup> {
    match effect {
        Effect::ShowQuestion { options, .. } => {
            let letters: Vec<InlineKeyboardButton> = options
                .iter()
                .enumerate()
                .map(|(i, _)| {
                    let letter = Letter::ALL[i];
                    InlineKeyboardButton::callback(
                        letter.to_string(),
                        format!("{CB_ANSWER_PREFIX}{letter}"),
                    )
                })
                .collect();
            let mut rows: Vec<Vec<InlineKeyboardButton>> =
                letters.chunks(2).map(|pair| pair.to_vec()).collect();
            rows.push(vec![InlineKeyboardButton::callback("⏸ Pause", CB_PAUSE)]);
            Some(InlineKeyboardMarkup::new(rows))
        }
        Effect::ShowFeedback { .. } => Some(InlineKeyboardMarkup::new(vec![vec![
            InlineKeyboardButton::callback("⏭ Next question", CB_NEXT),
        ]])),
        Effect::ShowPausedControls => Some(InlineKeyboardMarkup::new(vec![vec![
            InlineKeyboardButton::callback("🔄 Restart", CB_RESTART),
        ]])),
        Effect::ShowTimerTick { .. } | Effect::ShowResults { .. } => None,
    }
}

fn tier_comment(tier: ScoreTier) -> &'static str {
    match tier {
        ScoreTier::Excellent => "🏆 Excellent! A truly professional result!",
        ScoreTier::Great => "⭐ Great job!",
        ScoreTier::Good => "👌 Good result!",
        ScoreTier::Average => "📚 Not bad. Keep practicing!",
        ScoreTier::NeedsPractice => "💪 Keep studying, you will get there!",
    }
}

fn timer_text(remaining: u64, total: u64) -> String {
    if remaining == 0 {
        return "⏰ Time is up!".to_string();
    }
    let cells = 10usize;
    let filled = ((remaining as f64 / total as f64) * cells as f64).round() as usize;
    let filled = filled.min(cells);
    format!(
        "<b>⏰ {remaining} seconds left</b>\n{}{}",
        "🟩".repeat(filled),
        "⬜".repeat(cells - filled)
    )
}

pub fn level_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(
        LEVELS
            .iter()
            .map(|level| vec![InlineKeyboardButton::callback(*level, *level)])
            .collect::<Vec<_>>(),
    )
}

pub fn reading_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(
        LEVELS
            .iter()
            .map(|level| {
                vec![InlineKeyboardButton::callback(*level, format!("reading_{level}"))]
            })
            .collect::<Vec<_>>(),
    )
}

pub fn leaderboard_text(top: &[PlayerRecord]) -> String {
    if top.is_empty() {
        return "No finished quizzes yet. Be the first: /start!".to_string();
    }
    let mut out = String::from("🏆 <b>Best scores</b>\n\n");
    for (i, record) in top.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} - <b>{}</b>\n",
            i + 1,
            html::escape(&record.first_name),
            record.best_score
        ));
    }
    out
}
