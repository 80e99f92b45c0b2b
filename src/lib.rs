//! Raffle entry relay.
//!
//! Watches a raffle contract for `RaffleEntered` events and posts a summary
//! of each entry (ticket spend, prize pool, token supply) to a Telegram chat.

pub mod chain;
pub mod config;
pub mod format;
pub mod message;
pub mod notify;
pub mod relay;
pub mod snapshot;

#[cfg(test)]
mod testing;
