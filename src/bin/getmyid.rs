//! Replies to any message with the sender's chat id. Handy for finding the
//! value to put into ADMIN_ID.

use dotenv::dotenv;
use teloxide::prelude::*;

#[tokio::main]
async fn main() {
    dotenv().ok();
    pretty_env_logger::init();
    log::info!("getmyid helper running; message the bot to see your chat id");

    let bot = Bot::from_env();

    teloxide::repl(bot, |bot: Bot, msg: Message| async move {
        bot.send_message(msg.chat.id, format!("Your chat id: {}", msg.chat.id))
            .await?;
        respond(())
    })
    .await;
}
