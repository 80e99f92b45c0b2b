//! Per-event economic snapshot of the raffle and its token.

use crate::chain::{ChainError, ChainReader, ReadAt};
use alloy::primitives::{Address, U256};
use futures::TryFutureExt;
use std::fmt;
use thiserror::Error;

/// Raffle and token state as of the reads, not necessarily as of the event
/// that triggered them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EconomicSnapshot {
    pub time_left_seconds: U256,
    pub ticket_cost_wei: U256,
    pub total_tickets: U256,
    pub total_participants: U256,
    pub contract_balance_wei: U256,
    pub token_total_supply_wei: U256,
    pub token_symbol: String,
    pub token_name: String,
    pub token_decimals: u8,
}

/// The individual reads making up a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Read {
    TimeLeft,
    TicketCost,
    TotalTickets,
    TotalParticipants,
    NativeBalance,
    TotalSupply,
    Symbol,
    Name,
    Decimals,
}

impl Read {
    pub fn as_str(&self) -> &'static str {
        match self {
            Read::TimeLeft => "getTimeLeftToDraw",
            Read::TicketCost => "getTicketCost",
            Read::TotalTickets => "getTotalTickets",
            Read::TotalParticipants => "getTotalParticipants",
            Read::NativeBalance => "getBalance",
            Read::TotalSupply => "totalSupply",
            Read::Symbol => "symbol",
            Read::Name => "name",
            Read::Decimals => "decimals",
        }
    }
}

impl fmt::Display for Read {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("{read} read failed")]
pub struct FetchError {
    pub read: Read,
    #[source]
    pub source: ChainError,
}

fn failed(read: Read) -> impl FnOnce(ChainError) -> FetchError {
    move |source| FetchError { read, source }
}

/// Issue every snapshot read concurrently. The first failure wins.
pub async fn fetch_snapshot<R: ChainReader>(
    reader: &R,
    raffle_address: Address,
    at: ReadAt,
) -> Result<EconomicSnapshot, FetchError> {
    let (
        time_left_seconds,
        ticket_cost_wei,
        total_tickets,
        total_participants,
        contract_balance_wei,
        token_total_supply_wei,
        token_symbol,
        token_name,
        token_decimals,
    ) = tokio::try_join!(
        reader.time_left_to_draw(at).map_err(failed(Read::TimeLeft)),
        reader.ticket_cost(at).map_err(failed(Read::TicketCost)),
        reader.total_tickets(at).map_err(failed(Read::TotalTickets)),
        reader
            .total_participants(at)
            .map_err(failed(Read::TotalParticipants)),
        reader
            .native_balance(raffle_address, at)
            .map_err(failed(Read::NativeBalance)),
        reader.token_total_supply(at).map_err(failed(Read::TotalSupply)),
        reader.token_symbol(at).map_err(failed(Read::Symbol)),
        reader.token_name(at).map_err(failed(Read::Name)),
        reader.token_decimals(at).map_err(failed(Read::Decimals)),
    )?;

    Ok(EconomicSnapshot {
        time_left_seconds,
        ticket_cost_wei,
        total_tickets,
        total_participants,
        contract_balance_wei,
        token_total_supply_wei,
        token_symbol,
        token_name,
        token_decimals,
    })
}
