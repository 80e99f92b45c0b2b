//! Chain-facing capabilities used by the relay.
//!
//! The relay never talks to a provider directly. It reads contract state
//! through [`ChainReader`] and receives `RaffleEntered` events through an
//! [`EventSubscriber`]; [`RpcChain`] implements both on top of alloy.
//!
//! Architecture:
//! - `abi`: contract interfaces plus startup verification of the ABI files
//! - `rpc`: alloy provider, polling or pubsub log subscription with
//!   resume-from-last-block on resubscribe

pub mod abi;
pub mod rpc;

pub use rpc::RpcChain;

use alloy::eips::BlockId;
use alloy::primitives::{Address, B256, U256};
use std::future::Future;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("rpc request failed: {0}")]
    Rpc(String),
    #[error("contract call failed: {0}")]
    Call(String),
    #[error("connected to chain {actual}, expected {expected}")]
    WrongChain { expected: u64, actual: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("failed to register log subscription: {0}")]
    Register(String),
    #[error("log stream failed: {0}")]
    Stream(String),
}

/// Which block a read is answered at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadAt {
    #[default]
    Latest,
    Block(u64),
}

impl From<ReadAt> for BlockId {
    fn from(at: ReadAt) -> Self {
        match at {
            ReadAt::Latest => BlockId::latest(),
            ReadAt::Block(number) => BlockId::number(number),
        }
    }
}

/// A decoded `RaffleEntered` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaffleEvent {
    pub participant: String,
    pub tickets_bought: U256,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
}

/// Typed view reads against the raffle and token contracts.
pub trait ChainReader: Send + Sync + 'static {
    fn time_left_to_draw(&self, at: ReadAt) -> impl Future<Output = Result<U256, ChainError>> + Send;

    fn ticket_cost(&self, at: ReadAt) -> impl Future<Output = Result<U256, ChainError>> + Send;

    fn total_tickets(&self, at: ReadAt) -> impl Future<Output = Result<U256, ChainError>> + Send;

    fn total_participants(&self, at: ReadAt) -> impl Future<Output = Result<U256, ChainError>> + Send;

    /// Native currency balance held by `address`.
    fn native_balance(
        &self,
        address: Address,
        at: ReadAt,
    ) -> impl Future<Output = Result<U256, ChainError>> + Send;

    fn token_total_supply(&self, at: ReadAt) -> impl Future<Output = Result<U256, ChainError>> + Send;

    fn token_symbol(&self, at: ReadAt) -> impl Future<Output = Result<String, ChainError>> + Send;

    fn token_name(&self, at: ReadAt) -> impl Future<Output = Result<String, ChainError>> + Send;

    fn token_decimals(&self, at: ReadAt) -> impl Future<Output = Result<u8, ChainError>> + Send;
}

/// Registers and tears down the live `RaffleEntered` feed.
pub trait EventSubscriber: Send + Sync + 'static {
    fn subscribe(&self) -> impl Future<Output = Result<Subscription, SubscriptionError>> + Send;

    /// Drop whatever subscription is registered. Safe to call when none is.
    fn unsubscribe(&self) -> impl Future<Output = ()> + Send;
}

/// Push-based sequence of events from one registration.
///
/// An `Err` item means the underlying feed broke; the sequence ends after it.
/// `None` from [`Subscription::next`] means the producer went away.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Result<RaffleEvent, SubscriptionError>>,
}

pub type EventSender = mpsc::UnboundedSender<Result<RaffleEvent, SubscriptionError>>;

impl Subscription {
    pub fn channel() -> (EventSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    pub async fn next(&mut self) -> Option<Result<RaffleEvent, SubscriptionError>> {
        self.rx.recv().await
    }
}
