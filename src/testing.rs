//! In-memory fakes for the chain and chat capabilities.

use crate::chain::{
    ChainError, ChainReader, EventSender, EventSubscriber, RaffleEvent, ReadAt, Subscription,
    SubscriptionError,
};
use crate::message::MessageTemplate;
use crate::notify::{DeliveryError, Notifier, ParseMode};
use crate::snapshot::{EconomicSnapshot, Read};

use alloy::primitives::{Address, U256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

/// Take one from `counter` if it is non-zero.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

pub fn sample_event() -> RaffleEvent {
    RaffleEvent {
        participant: "0xABCDEF1234567890".to_string(),
        tickets_bought: U256::from(5),
        block_number: Some(100),
        transaction_hash: None,
        log_index: None,
    }
}

pub fn sample_snapshot() -> EconomicSnapshot {
    EconomicSnapshot {
        time_left_seconds: U256::from(90061),
        ticket_cost_wei: "1000000000000000000".parse().unwrap(),
        total_tickets: U256::from(50),
        total_participants: U256::from(10),
        contract_balance_wei: "10000000000000000000".parse().unwrap(),
        token_total_supply_wei: "1000000000000000000000000".parse().unwrap(),
        token_symbol: "BUNNY".to_string(),
        token_name: "CashBunny".to_string(),
        token_decimals: 18,
    }
}

pub fn sample_template() -> MessageTemplate {
    MessageTemplate {
        native_symbol: "BNB".to_string(),
        play_url: "https://cashbunny.fun/raffle".to_string(),
        explorer_url: "https://bscscan.com/address/0x1111111111111111111111111111111111111111"
            .to_string(),
        social_url: "https://x.com/CashBunnydotfun".to_string(),
        media: "./video.mp4".to_string(),
    }
}

struct ChainState {
    snapshot: EconomicSnapshot,
    failures: Mutex<HashMap<Read, usize>>,
    read_points: Mutex<Vec<ReadAt>>,
    balance_queries: Mutex<Vec<Address>>,
    latency: Mutex<Duration>,
}

/// Serves a fixed snapshot; individual reads can be made to fail.
#[derive(Clone)]
pub struct FakeChain {
    inner: Arc<ChainState>,
}

impl FakeChain {
    pub fn new(snapshot: EconomicSnapshot) -> Self {
        Self {
            inner: Arc::new(ChainState {
                snapshot,
                failures: Mutex::new(HashMap::new()),
                read_points: Mutex::new(Vec::new()),
                balance_queries: Mutex::new(Vec::new()),
                latency: Mutex::new(Duration::ZERO),
            }),
        }
    }

    /// Fail the next `times` calls of `read`.
    pub fn fail_next(&self, read: Read, times: usize) {
        lock(&self.inner.failures).insert(read, times);
    }

    /// Delay every read by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.inner.latency) = latency;
    }

    pub fn read_points(&self) -> Vec<ReadAt> {
        lock(&self.inner.read_points).clone()
    }

    pub fn clear_read_points(&self) {
        lock(&self.inner.read_points).clear();
    }

    pub fn balance_queries(&self) -> Vec<Address> {
        lock(&self.inner.balance_queries).clone()
    }

    async fn read<T>(&self, read: Read, at: ReadAt, value: T) -> Result<T, ChainError> {
        let latency = *lock(&self.inner.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        lock(&self.inner.read_points).push(at);
        let mut failures = lock(&self.inner.failures);
        match failures.get_mut(&read) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(ChainError::Rpc(format!("simulated {read} failure")))
            }
            _ => Ok(value),
        }
    }
}

impl ChainReader for FakeChain {
    async fn time_left_to_draw(&self, at: ReadAt) -> Result<U256, ChainError> {
        self.read(Read::TimeLeft, at, self.inner.snapshot.time_left_seconds)
            .await
    }

    async fn ticket_cost(&self, at: ReadAt) -> Result<U256, ChainError> {
        self.read(Read::TicketCost, at, self.inner.snapshot.ticket_cost_wei)
            .await
    }

    async fn total_tickets(&self, at: ReadAt) -> Result<U256, ChainError> {
        self.read(Read::TotalTickets, at, self.inner.snapshot.total_tickets)
            .await
    }

    async fn total_participants(&self, at: ReadAt) -> Result<U256, ChainError> {
        self.read(Read::TotalParticipants, at, self.inner.snapshot.total_participants)
            .await
    }

    async fn native_balance(&self, address: Address, at: ReadAt) -> Result<U256, ChainError> {
        lock(&self.inner.balance_queries).push(address);
        self.read(Read::NativeBalance, at, self.inner.snapshot.contract_balance_wei)
            .await
    }

    async fn token_total_supply(&self, at: ReadAt) -> Result<U256, ChainError> {
        self.read(Read::TotalSupply, at, self.inner.snapshot.token_total_supply_wei)
            .await
    }

    async fn token_symbol(&self, at: ReadAt) -> Result<String, ChainError> {
        self.read(Read::Symbol, at, self.inner.snapshot.token_symbol.clone())
            .await
    }

    async fn token_name(&self, at: ReadAt) -> Result<String, ChainError> {
        self.read(Read::Name, at, self.inner.snapshot.token_name.clone())
            .await
    }

    async fn token_decimals(&self, at: ReadAt) -> Result<u8, ChainError> {
        self.read(Read::Decimals, at, self.inner.snapshot.token_decimals)
            .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub destination: String,
    pub media: String,
    pub caption: String,
    pub parse_mode: ParseMode,
}

/// Records deliveries; the next N sends can be made to fail.
#[derive(Clone, Default)]
pub struct FakeNotifier {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    attempts: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, times: usize) {
        self.failures.store(times, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Notifier for FakeNotifier {
    async fn send_media(
        &self,
        destination: &str,
        media: &str,
        caption: &str,
        parse_mode: ParseMode,
    ) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.failures) {
            return Err(DeliveryError::Api {
                code: 500,
                description: "simulated delivery failure".to_string(),
            });
        }
        lock(&self.sent).push(SentMessage {
            destination: destination.to_string(),
            media: media.to_string(),
            caption: caption.to_string(),
            parse_mode,
        });
        Ok(())
    }
}

struct SubscriberState {
    calls: Mutex<Vec<&'static str>>,
    failures: AtomicUsize,
    sender: watch::Sender<Option<EventSender>>,
}

/// Hands out channel-backed subscriptions and records every call.
#[derive(Clone)]
pub struct FakeSubscriber {
    inner: Arc<SubscriberState>,
}

impl FakeSubscriber {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            inner: Arc::new(SubscriberState {
                calls: Mutex::new(Vec::new()),
                failures: AtomicUsize::new(0),
                sender,
            }),
        }
    }

    /// Fail the next `times` registrations.
    pub fn fail_next(&self, times: usize) {
        self.inner.failures.store(times, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.inner.calls).clone()
    }

    pub fn subscribe_count(&self) -> usize {
        self.calls().iter().filter(|c| **c == "subscribe").count()
    }

    /// Sender of the live subscription, once there is one.
    pub async fn wait_for_sender(&self) -> EventSender {
        let mut rx = self.inner.sender.subscribe();
        let current = rx
            .wait_for(Option::is_some)
            .await
            .expect("subscriber state dropped");
        current.clone().expect("checked by wait_for")
    }
}

impl EventSubscriber for FakeSubscriber {
    async fn subscribe(&self) -> Result<Subscription, SubscriptionError> {
        lock(&self.inner.calls).push("subscribe");
        if take_one(&self.inner.failures) {
            return Err(SubscriptionError::Register("simulated registration failure".to_string()));
        }
        let (tx, subscription) = Subscription::channel();
        self.inner.sender.send_replace(Some(tx));
        Ok(subscription)
    }

    async fn unsubscribe(&self) {
        lock(&self.inner.calls).push("unsubscribe");
        self.inner.sender.send_replace(None);
    }
}
