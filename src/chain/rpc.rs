//! alloy-backed chain access.
//!
//! One provider serves both the contract reads and the `RaffleEntered` feed.
//! The transport is picked from the URL scheme: `http(s)://` polls
//! `eth_getLogs` on an interval, `ws(s)://` uses `eth_subscribe`.
//!
//! Features:
//! - Chain id pinned at connect time
//! - Each feed resumes from the block after the last one it saw, so a
//!   resubscribe after a provider hiccup does not skip entries
//! - Reorged (`removed`) logs are ignored

use crate::chain::abi::{IERC20Metadata, IRaffle, RAFFLE_ENTERED_TOPIC};
use crate::chain::{
    ChainError, ChainReader, EventSender, EventSubscriber, RaffleEvent, ReadAt, Subscription,
    SubscriptionError,
};

use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Widest block range requested in one `eth_getLogs` call.
const MAX_BLOCK_RANGE: u64 = 2_000;

/// How new logs are discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    Poll(Duration),
    PubSub,
}

impl LogMode {
    pub fn for_url(url: &str, poll_interval: Duration) -> Self {
        if url.starts_with("ws://") || url.starts_with("wss://") {
            LogMode::PubSub
        } else {
            LogMode::Poll(poll_interval)
        }
    }
}

/// Raffle and token contracts behind one provider.
#[derive(Clone)]
pub struct RpcChain {
    provider: DynProvider,
    raffle: IRaffle::IRaffleInstance<DynProvider>,
    token: IERC20Metadata::IERC20MetadataInstance<DynProvider>,
    raffle_address: Address,
    mode: LogMode,
    /// Highest block the feed has fully processed. Zero until the first
    /// subscription.
    last_block: Arc<AtomicU64>,
    feed: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl RpcChain {
    /// Connect, then refuse to continue if the node serves a different chain.
    pub async fn connect(
        rpc_url: &str,
        chain_id: u64,
        raffle_address: Address,
        token_address: Address,
        poll_interval: Duration,
    ) -> Result<Self, ChainError> {
        let provider = ProviderBuilder::new()
            .connect(rpc_url)
            .await
            .map_err(rpc_error)?
            .erased();

        let actual = provider.get_chain_id().await.map_err(rpc_error)?;
        if actual != chain_id {
            return Err(ChainError::WrongChain {
                expected: chain_id,
                actual,
            });
        }

        let mode = LogMode::for_url(rpc_url, poll_interval);
        info!(chain_id, mode = ?mode, raffle = %raffle_address, token = %token_address, "chain connected");

        Ok(Self::with_provider(provider, raffle_address, token_address, mode))
    }

    fn with_provider(
        provider: DynProvider,
        raffle_address: Address,
        token_address: Address,
        mode: LogMode,
    ) -> Self {
        Self {
            raffle: IRaffle::new(raffle_address, provider.clone()),
            token: IERC20Metadata::new(token_address, provider.clone()),
            provider,
            raffle_address,
            mode,
            last_block: Arc::new(AtomicU64::new(0)),
            feed: Arc::new(Mutex::new(None)),
        }
    }

    fn entries_filter(&self) -> Filter {
        Filter::new()
            .address(self.raffle_address)
            .event_signature(RAFFLE_ENTERED_TOPIC)
    }

    /// First block the next feed should cover.
    async fn resume_from(&self) -> Result<u64, SubscriptionError> {
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| SubscriptionError::Register(e.to_string()))?;

        match self.last_block.load(Ordering::SeqCst) {
            0 => {
                self.last_block.store(head, Ordering::SeqCst);
                info!(block = head, "current block, streaming forward");
                Ok(head + 1)
            }
            last => {
                if head > last {
                    info!(from = last + 1, to = head, "resuming feed after gap");
                }
                Ok(last + 1)
            }
        }
    }

    fn replace_feed(&self, handle: Option<JoinHandle<()>>) {
        let previous = {
            let mut feed = self.feed.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *feed, handle)
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl ChainReader for RpcChain {
    async fn time_left_to_draw(&self, at: ReadAt) -> Result<U256, ChainError> {
        self.raffle
            .getTimeLeftToDraw()
            .block(at.into())
            .call()
            .await
            .map_err(call_error)
    }

    async fn ticket_cost(&self, at: ReadAt) -> Result<U256, ChainError> {
        self.raffle
            .getTicketCost()
            .block(at.into())
            .call()
            .await
            .map_err(call_error)
    }

    async fn total_tickets(&self, at: ReadAt) -> Result<U256, ChainError> {
        self.raffle
            .getTotalTickets()
            .block(at.into())
            .call()
            .await
            .map_err(call_error)
    }

    async fn total_participants(&self, at: ReadAt) -> Result<U256, ChainError> {
        self.raffle
            .getTotalParticipants()
            .block(at.into())
            .call()
            .await
            .map_err(call_error)
    }

    async fn native_balance(&self, address: Address, at: ReadAt) -> Result<U256, ChainError> {
        self.provider
            .get_balance(address)
            .block_id(at.into())
            .await
            .map_err(rpc_error)
    }

    async fn token_total_supply(&self, at: ReadAt) -> Result<U256, ChainError> {
        self.token
            .totalSupply()
            .block(at.into())
            .call()
            .await
            .map_err(call_error)
    }

    async fn token_symbol(&self, at: ReadAt) -> Result<String, ChainError> {
        self.token
            .symbol()
            .block(at.into())
            .call()
            .await
            .map_err(call_error)
    }

    async fn token_name(&self, at: ReadAt) -> Result<String, ChainError> {
        self.token
            .name()
            .block(at.into())
            .call()
            .await
            .map_err(call_error)
    }

    async fn token_decimals(&self, at: ReadAt) -> Result<u8, ChainError> {
        self.token
            .decimals()
            .block(at.into())
            .call()
            .await
            .map_err(call_error)
    }
}

impl EventSubscriber for RpcChain {
    async fn subscribe(&self) -> Result<Subscription, SubscriptionError> {
        let from_block = self.resume_from().await?;
        let filter = self.entries_filter();
        let (tx, subscription) = Subscription::channel();

        let handle = match self.mode {
            LogMode::Poll(interval) => tokio::spawn(poll_logs(
                self.provider.clone(),
                filter,
                from_block,
                interval,
                tx,
                self.last_block.clone(),
            )),
            LogMode::PubSub => {
                let sub = self
                    .provider
                    .subscribe_logs(&filter)
                    .await
                    .map_err(|e| SubscriptionError::Register(e.to_string()))?;
                let provider = self.provider.clone();
                let last_block = self.last_block.clone();
                tokio::spawn(async move {
                    // Subscribed first, so anything mined during the backfill
                    // arrives on the stream too (possibly twice).
                    if catch_up(&provider, &filter, from_block, &tx, &last_block).await {
                        stream_logs(sub, tx, last_block).await;
                    }
                })
            }
        };

        self.replace_feed(Some(handle));
        info!(from_block, "subscribed to RaffleEntered");
        Ok(subscription)
    }

    async fn unsubscribe(&self) {
        self.replace_feed(None);
        debug!("RaffleEntered feed stopped");
    }
}

async fn poll_logs(
    provider: DynProvider,
    filter: Filter,
    mut next_block: u64,
    interval: Duration,
    tx: EventSender,
    last_block: Arc<AtomicU64>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            return;
        }

        let head = match provider.get_block_number().await {
            Ok(head) => head,
            Err(e) => {
                let _ = tx.send(Err(SubscriptionError::Stream(e.to_string())));
                return;
            }
        };

        if !backfill(&provider, &filter, next_block, head, &tx, &last_block).await {
            return;
        }
        next_block = next_block.max(head + 1);
    }
}

/// Backfill `from..=head` before switching to the live stream. Returns false
/// once the feed is finished.
async fn catch_up(
    provider: &DynProvider,
    filter: &Filter,
    from: u64,
    tx: &EventSender,
    last_block: &AtomicU64,
) -> bool {
    match provider.get_block_number().await {
        Ok(head) => backfill(provider, filter, from, head, tx, last_block).await,
        Err(e) => {
            warn!(error = %e, from, "failed to read head block for backfill");
            let _ = tx.send(Err(SubscriptionError::Stream(e.to_string())));
            false
        }
    }
}

/// Inclusive ranges covering `from..=to`, each at most [`MAX_BLOCK_RANGE`]
/// blocks wide.
fn block_chunks(from: u64, to: u64) -> impl Iterator<Item = (u64, u64)> {
    (from..=to)
        .step_by(MAX_BLOCK_RANGE as usize)
        .map(move |start| (start, to.min(start.saturating_add(MAX_BLOCK_RANGE - 1))))
}

/// Fetch and forward logs in `from..=to`, chunked by [`MAX_BLOCK_RANGE`].
/// Returns false once the feed is finished (error sent or receiver gone).
async fn backfill(
    provider: &DynProvider,
    filter: &Filter,
    from: u64,
    to: u64,
    tx: &EventSender,
    last_block: &AtomicU64,
) -> bool {
    for (start, end) in block_chunks(from, to) {
        let range = filter.clone().from_block(start).to_block(end);

        let logs = match provider.get_logs(&range).await {
            Ok(logs) => logs,
            Err(e) => {
                let _ = tx.send(Err(SubscriptionError::Stream(e.to_string())));
                return false;
            }
        };

        for log in &logs {
            if !forward(tx, log) {
                return false;
            }
        }
        if !logs.is_empty() {
            debug!(from = start, to = end, entries = logs.len(), "fetched RaffleEntered logs");
        }

        last_block.fetch_max(end, Ordering::SeqCst);
    }
    true
}

async fn stream_logs(
    mut sub: alloy::pubsub::Subscription<Log>,
    tx: EventSender,
    last_block: Arc<AtomicU64>,
) {
    loop {
        match sub.recv().await {
            Ok(log) => {
                if !forward(&tx, &log) {
                    return;
                }
                mark_streamed(&last_block, &log);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "log subscription lagged");
            }
            Err(RecvError::Closed) => {
                let _ = tx.send(Err(SubscriptionError::Stream(
                    "log subscription closed".to_string(),
                )));
                return;
            }
        }
    }
}

/// More logs of a streamed log's block may still be on the way, so only the
/// block before it counts as processed. A resubscribe repeats that block.
fn mark_streamed(last_block: &AtomicU64, log: &Log) {
    if let Some(block) = log.block_number {
        last_block.fetch_max(block.saturating_sub(1), Ordering::SeqCst);
    }
}

/// Decode and send one log. Returns false once the receiver is gone.
fn forward(tx: &EventSender, log: &Log) -> bool {
    if log.removed {
        debug!(tx = ?log.transaction_hash, "skipping removed log");
        return true;
    }
    match decode_entry(log) {
        Ok(event) => {
            debug!(
                participant = %event.participant,
                tickets = %event.tickets_bought,
                block = ?event.block_number,
                "RaffleEntered"
            );
            tx.send(Ok(event)).is_ok()
        }
        Err(e) => {
            warn!(error = %e, tx = ?log.transaction_hash, "failed to decode RaffleEntered log");
            true
        }
    }
}

/// Decode a `RaffleEntered(address indexed participant, uint256 tickets)` log.
pub fn decode_entry(log: &Log) -> Result<RaffleEvent, alloy::sol_types::Error> {
    let decoded = log.log_decode::<IRaffle::RaffleEntered>()?;
    let entry = decoded.inner.data;
    Ok(RaffleEvent {
        participant: entry.participant.to_checksum(None),
        tickets_bought: entry.tickets,
        block_number: log.block_number,
        transaction_hash: log.transaction_hash,
        log_index: log.log_index,
    })
}

fn rpc_error(e: impl std::fmt::Display) -> ChainError {
    ChainError::Rpc(e.to_string())
}

fn call_error(e: alloy::contract::Error) -> ChainError {
    ChainError::Call(e.to_string())
}
