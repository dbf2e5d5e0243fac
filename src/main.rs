use std::sync::Arc;

use dotenv::dotenv;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use teloxide::utils::html;

use quiz_tgbot::quiz::bank::QuestionBank;
use quiz_tgbot::quiz::engine::Engine;
use quiz_tgbot::quiz::errors::QuizError;
use quiz_tgbot::quiz::scores::{JsonFileStore, Leaderboard};
use quiz_tgbot::quiz::{Letter, PlayerId};
use quiz_tgbot::telegram::{self, TelegramMessenger};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
enum Command {
    #[command(description = "pick a level and start the quiz")]
    Start,
    #[command(description = "pick a level for a reading test")]
    Reading,
    #[command(description = "show the best scores")]
    Top,
    #[command(description = "bot statistics (admin only)")]
    Stats,
}

/// The one id allowed to see /stats, if configured.
#[derive(Clone, Copy)]
struct AdminId(Option<i64>);

#[tokio::main]
async fn main() {
    dotenv().ok();
    pretty_env_logger::init();
    log::info!("Starting quiz bot...");

    let bot = Bot::from_env();

    let questions_file =
        std::env::var("QUESTIONS_FILE").unwrap_or_else(|_| "data/questions.json".to_string());
    let reading_file =
        std::env::var("READING_FILE").unwrap_or_else(|_| "data/reading_tests.json".to_string());
    let users_file = std::env::var("USERS_FILE").unwrap_or_else(|_| "users.json".to_string());
    let admin = AdminId(std::env::var("ADMIN_ID").ok().and_then(|v| v.parse().ok()));

    let bank = Arc::new(
        QuestionBank::from_files(&questions_file, &reading_file)
            .expect("failed to load question files"),
    );
    log::info!("Question bank loaded from {questions_file} and {reading_file}");

    let scores = Arc::new(Leaderboard::open(Box::new(JsonFileStore::new(users_file))));
    let ui = Arc::new(TelegramMessenger::new(bot.clone()));
    let engine = Engine::new(bank, scores.clone(), ui);

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![engine, scores, admin])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    engine: Arc<Engine>,
    scores: Arc<Leaderboard>,
    admin: AdminId,
) -> HandlerResult {
    match cmd {
        Command::Start => {
            engine.reset(PlayerId(msg.chat.id.0));
            bot.send_message(
                msg.chat.id,
                "🇬🇧 Hi! Let's find out your English level.\n\n📊 Pick a level:",
            )
            .reply_markup(telegram::level_menu())
            .await?;
        }
        Command::Reading => {
            engine.reset(PlayerId(msg.chat.id.0));
            bot.send_message(msg.chat.id, "📖 Reading test. Pick a level:")
                .reply_markup(telegram::reading_menu())
                .await?;
        }
        Command::Top => {
            bot.send_message(msg.chat.id, telegram::leaderboard_text(&scores.top_scores(10)))
                .parse_mode(ParseMode::Html)
                .await?;
        }
        Command::Stats => {
            let from_id = msg.from().map(|user| user.id.0 as i64);
            if admin.0.is_some() && admin.0 == from_id {
                let text = format!(
                    "👥 Players: {}\n🎮 Active sessions: {}",
                    scores.player_count(),
                    engine.active_sessions()
                );
                bot.send_message(msg.chat.id, text).await?;
            }
        }
    }
    Ok(())
}

async fn handle_callback(bot: Bot, q: CallbackQuery, engine: Arc<Engine>) -> HandlerResult {
    // remove the button's loading state first, whatever happens next
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    let Some(message) = &q.message else {
        return Ok(());
    };
    let user = PlayerId(message.chat.id.0);

    let outcome = if let Some(letter) =
        data.strip_prefix(telegram::CB_ANSWER_PREFIX).and_then(Letter::parse)
    {
        engine.answer(user, letter).await
    } else {
        match data {
            telegram::CB_NEXT => engine.next(user).await,
            telegram::CB_PAUSE => engine.pause(user).await,
            telegram::CB_RESTART => engine.restart(user).await,
            key => match engine.select_level(user, &q.from.first_name, key).await {
                Ok(()) => {
                    let confirm =
                        format!("🎯 You picked <b>{}</b>. Good luck!", html::escape(key));
                    if let Err(err) = bot
                        .edit_message_text(message.chat.id, message.id, confirm)
                        .parse_mode(ParseMode::Html)
                        .await
                    {
                        log::debug!("could not edit level menu: {err}");
                    }
                    Ok(())
                }
                Err(QuizError::UnknownLevel(_)) => {
                    log::debug!("{user}: ignoring unknown callback {key:?}");
                    Ok(())
                }
                Err(err) => Err(err),
            },
        }
    };

    if let Err(err) = outcome {
        log::debug!("{user}: {err}");
        bot.send_message(
            message.chat.id,
            "Your quiz session has expired. Send /start to begin again.",
        )
        .await?;
    }
    Ok(())
}
