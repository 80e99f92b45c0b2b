//! Caption rendering for `RaffleEntered` notifications.
//!
//! The caption uses Telegram's legacy Markdown. Its wording, emoji and line
//! layout are what the channel's readers know, so the template is literal.

use crate::chain::RaffleEvent;
use crate::format::{
    compute_prize_breakdown, format_duration, format_grouped_decimal, saturating_u64,
    shift_decimal, truncate_address,
};
use crate::snapshot::EconomicSnapshot;

/// Fixed parts of every notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    /// Ticker of the chain's native currency, used for prize values.
    pub native_symbol: String,
    pub play_url: String,
    /// Block explorer page of the raffle contract.
    pub explorer_url: String,
    pub social_url: String,
    /// Local path, URL or Telegram file id of the attached video.
    pub media: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub caption: String,
    pub media: String,
}

/// Render the notification for one entry.
pub fn build_notification(
    event: &RaffleEvent,
    snapshot: &EconomicSnapshot,
    template: &MessageTemplate,
) -> NotificationMessage {
    let decimals = snapshot.token_decimals;
    let spend = snapshot.ticket_cost_wei.saturating_mul(event.tickets_bought);
    let supply_after = snapshot.token_total_supply_wei.saturating_sub(spend);

    let token_amount = |wei| format_grouped_decimal(Some(shift_decimal(wei, decimals).as_str()), 2);
    let spent = token_amount(spend);
    let supply_was = token_amount(snapshot.token_total_supply_wei);
    let supply_now = token_amount(supply_after);

    let player = truncate_address(&event.participant);
    let tickets = event.tickets_bought;
    let total_tickets = snapshot.total_tickets;
    let players = snapshot.total_participants;
    let time_left = format_duration(saturating_u64(snapshot.time_left_seconds));
    let prizes = compute_prize_breakdown(snapshot.contract_balance_wei);

    let symbol = &snapshot.token_symbol;
    let name = &snapshot.token_name;
    let native = &template.native_symbol;
    let play = &template.play_url;
    let explorer = &template.explorer_url;
    let social = &template.social_url;

    let caption = format!(
        "📢**New Tickets Bought**\n\
         \n\
         🧑**Player:** {player}\n\
         ✅**Tickets Bought:** {tickets}\n\
         💸**Spent:** {spent} {symbol}\n\
         🔥**${symbol} Burned:** {spent} {symbol}\n\
         🔢**Total Tickets:** {total_tickets}\n\
         🧑\u{200d}🤝\u{200d}🧑**Total Players:** {players}\n\
         ⏳**Time Left:** {time_left}\n\
         \n\
         **🏆Current Prizes Values🏆**\n\
         \n\
         💰**Total Prize:** {total} {native}\n\
         🥇**Fist Prize:** {first} {native}\n\
         🥈**Second Prize:** {second} {native}\n\
         🥉**Third Prize:** {third} {native}\n\
         🔄**Rollover Prize:** {rollover} {native}\n\
         \n\
         **📑Token Details📑**\n\
         \n\
         🏷️**Name:** {name}\n\
         💠**Symbol:** {symbol}\n\
         🔢 **Decimals:** {decimals}\n\
         💰**Total Supply was:** {supply_was} 👈\n\
         💰**Total Supply now:** {supply_now} 🔥🔥🔥\n\
         \n\
         \n\
         [🎰▶️ Play Now]({play}) | [🔗 Tx]({explorer}) | [🌐 X]({social})",
        total = prizes.total,
        first = prizes.first,
        second = prizes.second,
        third = prizes.third,
        rollover = prizes.rollover,
    );

    NotificationMessage {
        caption,
        media: template.media.clone(),
    }
}
