//! HTML digests of the promotion lists
//!
//! Used both as the scheduled broadcast text and as the reply to the
//! read-only `current_games` / `upcoming_games` queries.

use chrono::{DateTime, Utc};

use crate::models::PromotionRecord;
use crate::utils::{escape_attribute, escape_html, truncate_text};

/// Descriptions are cut to this many characters
pub const DESCRIPTION_LIMIT: usize = 100;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

/// Digest of the games that are free right now
pub fn current_games_digest(games: &[PromotionRecord]) -> String {
    if games.is_empty() {
        return "😔 No free games on the Epic Games Store right now.".to_string();
    }

    let mut message = String::from("🎮 <b>Free on the Epic Games Store right now</b>\n\n");

    for (index, game) in games.iter().enumerate() {
        message.push_str(&format!("{}. {}\n", index + 1, title_line(game)));
        if let Some(end) = game.window_end {
            message.push_str(&format!("⏰ Ends: {}\n", format_date(end)));
        }
        push_details(&mut message, game);
        message.push('\n');
    }

    message.push_str("⚡️ <b>Claim them before they're gone!</b>");
    message
}

/// Digest of the games that will be free once their window opens
pub fn upcoming_games_digest(games: &[PromotionRecord]) -> String {
    if games.is_empty() {
        return "📅 No upcoming free games announced yet.".to_string();
    }

    let mut message = String::from("🔮 <b>Coming soon to the Epic Games Store</b>\n\n");

    for (index, game) in games.iter().enumerate() {
        message.push_str(&format!("{}. {}\n", index + 1, title_line(game)));
        message.push_str(&format!("🚀 Starts: {}\n", format_date(game.window_start)));
        push_details(&mut message, game);
        message.push('\n');
    }

    message.push_str("⏰ <b>Set a reminder!</b>");
    message
}

fn title_line(game: &PromotionRecord) -> String {
    let title = escape_html(&game.title);
    match game.store_url.as_deref() {
        Some(url) => format!("<a href=\"{}\"><b>{title}</b></a>", escape_attribute(url)),
        None => format!("<b>{title}</b>"),
    }
}

fn push_details(message: &mut String, game: &PromotionRecord) {
    message.push_str(&format!(
        "💰 Normal price: {}\n",
        escape_html(&game.display_price)
    ));
    if let Some(description) = game.description.as_deref() {
        message.push_str(&format!(
            "📝 {}\n",
            escape_html(&truncate_text(description, DESCRIPTION_LIMIT))
        ));
    }
}

fn format_date(date: DateTime<Utc>) -> String {
    date.format(DATE_FORMAT).to_string()
}
