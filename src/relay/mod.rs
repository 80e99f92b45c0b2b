//! Event relay: subscription lifecycle and per-event handling.
//!
//! `Supervisor` owns the `RaffleEntered` subscription. Every event is handed
//! to its own task running `RelayContext::handle_event` (fetch snapshot →
//! build caption → deliver), so a slow or failing event never holds up the
//! feed. A broken subscription is torn down and re-registered after a fixed
//! delay, forever. Panics are left to the process-wide boundary in `fault`.

pub mod fault;

use crate::chain::{ChainReader, EventSubscriber, RaffleEvent, ReadAt, Subscription};
use crate::message::{build_notification, MessageTemplate, NotificationMessage};
use crate::notify::{DeliveryError, Notifier, ParseMode};
use crate::snapshot::{fetch_snapshot, FetchError};

use alloy::primitives::Address;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Pause between a subscription failure and the next registration attempt.
pub const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum HandleError {
    #[error("snapshot fetch failed")]
    Fetch(#[from] FetchError),
    #[error("delivery failed")]
    Delivery(#[from] DeliveryError),
}

/// Everything one event handler needs, built once at startup.
pub struct RelayContext<C, N> {
    pub chain: C,
    pub notifier: N,
    pub raffle_address: Address,
    pub destination: String,
    pub template: MessageTemplate,
    pub parse_mode: ParseMode,
    /// Answer every read at the triggering event's block instead of latest.
    pub read_at_event_block: bool,
}

impl<C: ChainReader, N: Notifier> RelayContext<C, N> {
    /// Fetch, render and deliver the notification for one event.
    pub async fn handle_event(&self, event: &RaffleEvent) -> Result<NotificationMessage, HandleError> {
        let at = match event.block_number {
            Some(block) if self.read_at_event_block => ReadAt::Block(block),
            _ => ReadAt::Latest,
        };

        let snapshot = fetch_snapshot(&self.chain, self.raffle_address, at).await?;
        let message = build_notification(event, &snapshot, &self.template);

        self.notifier
            .send_media(&self.destination, &message.media, &message.caption, self.parse_mode)
            .await?;

        Ok(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Subscribing,
    Listening,
    /// Backing off before the next registration attempt.
    Waiting,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Subscribing => write!(f, "subscribing"),
            Self::Listening => write!(f, "listening"),
            Self::Waiting => write!(f, "waiting"),
        }
    }
}

/// Keeps one subscription alive and dispatches its events.
pub struct Supervisor<C, N, S> {
    ctx: Arc<RelayContext<C, N>>,
    subscriber: S,
    retry_delay: Duration,
    /// Bound on concurrently running handlers; `None` is unbounded.
    limiter: Option<Arc<Semaphore>>,
    state: watch::Sender<SupervisorState>,
}

impl<C, N, S> Supervisor<C, N, S>
where
    C: ChainReader,
    N: Notifier,
    S: EventSubscriber,
{
    pub fn new(ctx: Arc<RelayContext<C, N>>, subscriber: S) -> Self {
        let (state, _) = watch::channel(SupervisorState::Stopped);
        Self {
            ctx,
            subscriber,
            retry_delay: RESUBSCRIBE_DELAY,
            limiter: None,
            state,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Cap concurrently running handlers. Zero keeps them unbounded.
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.limiter = (max > 0).then(|| Arc::new(Semaphore::new(max)));
        self
    }

    pub fn state(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Run until the process ends.
    pub async fn run(&self) {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` resolves, then drop the subscription. Handlers
    /// still in flight are aborted.
    pub async fn run_until<F: Future<Output = ()>>(&self, shutdown: F) {
        tokio::select! {
            _ = shutdown => info!("shutdown requested"),
            _ = self.supervise() => {}
        }
        self.subscriber.unsubscribe().await;
        self.set_state(SupervisorState::Stopped);
    }

    async fn supervise(&self) {
        let mut handlers = JoinSet::new();
        loop {
            self.set_state(SupervisorState::Subscribing);
            match self.subscriber.subscribe().await {
                Ok(subscription) => {
                    self.set_state(SupervisorState::Listening);
                    info!("listening for RaffleEntered events");
                    self.listen(subscription, &mut handlers).await;
                }
                Err(e) => {
                    error!(error = %e, "failed to subscribe to RaffleEntered");
                }
            }

            self.subscriber.unsubscribe().await;
            self.set_state(SupervisorState::Waiting);
            info!(delay_secs = self.retry_delay.as_secs(), "resubscribing after delay");
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    /// Dispatch events until the subscription breaks or ends.
    async fn listen(&self, mut subscription: Subscription, handlers: &mut JoinSet<()>) {
        loop {
            tokio::select! {
                item = subscription.next() => match item {
                    Some(Ok(event)) => self.dispatch(event, handlers),
                    Some(Err(e)) => {
                        warn!(error = %e, "RaffleEntered subscription failed");
                        return;
                    }
                    None => {
                        warn!("RaffleEntered subscription ended");
                        return;
                    }
                },
                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "event handler aborted");
                    }
                }
            }
        }
    }

    fn dispatch(&self, event: RaffleEvent, handlers: &mut JoinSet<()>) {
        let ctx = self.ctx.clone();
        let limiter = self.limiter.clone();
        debug!(in_flight = handlers.len(), participant = %event.participant, "dispatching event");

        handlers.spawn(async move {
            let _permit = match limiter {
                Some(limiter) => match limiter.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };

            match ctx.handle_event(&event).await {
                Ok(_) => info!(
                    participant = %event.participant,
                    tickets = %event.tickets_bought,
                    tx = ?event.transaction_hash,
                    "notification delivered"
                ),
                Err(e) => error!(
                    error = &e as &dyn std::error::Error,
                    participant = %event.participant,
                    tx = ?event.transaction_hash,
                    "failed to relay RaffleEntered"
                ),
            }
        });
    }

    fn set_state(&self, next: SupervisorState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "supervisor state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Read;
    use crate::testing::{
        sample_event, sample_snapshot, sample_template, FakeChain, FakeNotifier, FakeSubscriber,
    };
    use alloy::primitives::U256;

    fn context(chain: FakeChain, notifier: FakeNotifier) -> Arc<RelayContext<FakeChain, FakeNotifier>> {
        Arc::new(RelayContext {
            chain,
            notifier,
            raffle_address: Address::repeat_byte(0x11),
            destination: "-1001234".to_string(),
            template: sample_template(),
            parse_mode: ParseMode::Markdown,
            read_at_event_block: false,
        })
    }

    fn event_with_tickets(tickets: u64) -> RaffleEvent {
        RaffleEvent {
            tickets_bought: U256::from(tickets),
            ..sample_event()
        }
    }

    #[tokio::test]
    async fn test_handle_event_delivers_caption() {
        let notifier = FakeNotifier::new();
        let ctx = context(FakeChain::new(sample_snapshot()), notifier.clone());

        let message = ctx.handle_event(&sample_event()).await.unwrap();
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination, "-1001234");
        assert_eq!(sent[0].caption, message.caption);
        assert_eq!(sent[0].media, "./video.mp4");
        assert_eq!(sent[0].parse_mode, ParseMode::Markdown);
    }

    #[tokio::test]
    async fn test_handle_event_reports_stage() {
        let chain = FakeChain::new(sample_snapshot());
        chain.fail_next(Read::TicketCost, 1);
        let notifier = FakeNotifier::new();
        let ctx = context(chain, notifier.clone());

        let err = ctx.handle_event(&sample_event()).await.unwrap_err();
        assert!(matches!(err, HandleError::Fetch(ref f) if f.read == Read::TicketCost));
        assert!(notifier.sent().is_empty());

        notifier.fail_next(1);
        let err = ctx.handle_event(&sample_event()).await.unwrap_err();
        assert!(matches!(err, HandleError::Delivery(_)));
    }

    #[tokio::test]
    async fn test_reads_follow_event_block_when_enabled() {
        let chain = FakeChain::new(sample_snapshot());
        let mut ctx = RelayContext {
            chain,
            notifier: FakeNotifier::new(),
            raffle_address: Address::ZERO,
            destination: "chat".to_string(),
            template: sample_template(),
            parse_mode: ParseMode::Markdown,
            read_at_event_block: true,
        };
        let event = RaffleEvent {
            block_number: Some(1234),
            ..sample_event()
        };

        ctx.handle_event(&event).await.unwrap();
        assert!(ctx.chain.read_points().iter().all(|at| *at == ReadAt::Block(1234)));

        ctx.read_at_event_block = false;
        ctx.chain.clear_read_points();
        ctx.handle_event(&event).await.unwrap();
        assert!(ctx.chain.read_points().iter().all(|at| *at == ReadAt::Latest));
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_failure_retries_once_after_delay() {
        let subscriber = FakeSubscriber::new();
        subscriber.fail_next(1);
        let supervisor = Arc::new(Supervisor::new(
            context(FakeChain::new(sample_snapshot()), FakeNotifier::new()),
            subscriber.clone(),
        ));
        let mut state = supervisor.state();

        let runner = supervisor.clone();
        let task = tokio::spawn(async move { runner.run().await });

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(subscriber.calls(), vec!["subscribe", "unsubscribe"]);
        assert_eq!(*state.borrow_and_update(), SupervisorState::Waiting);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(subscriber.calls(), vec!["subscribe", "unsubscribe", "subscribe"]);
        assert_eq!(*state.borrow_and_update(), SupervisorState::Listening);

        // still exactly one retry much later
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(subscriber.calls().len(), 3);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_event_does_not_block_next() {
        let chain = FakeChain::new(sample_snapshot());
        chain.fail_next(Read::NativeBalance, 1);
        let notifier = FakeNotifier::new();
        let subscriber = FakeSubscriber::new();
        let supervisor = Supervisor::new(context(chain, notifier.clone()), subscriber.clone());

        let feed = subscriber.clone();
        let shutdown = async move {
            let tx = feed.wait_for_sender().await;
            tx.send(Ok(event_with_tickets(1))).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send(Ok(event_with_tickets(2))).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        supervisor.run_until(shutdown).await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].caption.contains("Tickets Bought:** 2\n"));
        assert_eq!(subscriber.calls(), vec!["subscribe", "unsubscribe"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_failure_keeps_listening() {
        let notifier = FakeNotifier::new();
        notifier.fail_next(1);
        let subscriber = FakeSubscriber::new();
        let supervisor = Supervisor::new(
            context(FakeChain::new(sample_snapshot()), notifier.clone()),
            subscriber.clone(),
        );

        let feed = subscriber.clone();
        supervisor
            .run_until(async move {
                let tx = feed.wait_for_sender().await;
                tx.send(Ok(event_with_tickets(3))).unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
                tx.send(Ok(event_with_tickets(4))).unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            })
            .await;

        assert_eq!(notifier.attempts(), 2);
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(subscriber.subscribe_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_error_resubscribes() {
        let notifier = FakeNotifier::new();
        let subscriber = FakeSubscriber::new();
        let supervisor = Supervisor::new(
            context(FakeChain::new(sample_snapshot()), notifier.clone()),
            subscriber.clone(),
        );

        let feed = subscriber.clone();
        supervisor
            .run_until(async move {
                let tx = feed.wait_for_sender().await;
                tx.send(Err(crate::chain::SubscriptionError::Stream("reset".into())))
                    .unwrap();
                tokio::time::sleep(RESUBSCRIBE_DELAY + Duration::from_secs(1)).await;

                let tx = feed.wait_for_sender().await;
                tx.send(Ok(sample_event())).unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            })
            .await;

        assert_eq!(
            subscriber.calls(),
            vec!["subscribe", "unsubscribe", "subscribe", "unsubscribe"]
        );
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_limit_serialises_handlers() {
        let chain = FakeChain::new(sample_snapshot());
        chain.set_latency(Duration::from_secs(1));
        let notifier = FakeNotifier::new();
        let subscriber = FakeSubscriber::new();
        let supervisor = Supervisor::new(context(chain, notifier.clone()), subscriber.clone())
            .with_max_in_flight(1);

        let feed = subscriber.clone();
        let observed = notifier.clone();
        supervisor
            .run_until(async move {
                let tx = feed.wait_for_sender().await;
                for tickets in 1..=3 {
                    tx.send(Ok(event_with_tickets(tickets))).unwrap();
                }
                tokio::time::sleep(Duration::from_millis(1_500)).await;
                assert_eq!(observed.sent().len(), 1);
                tokio::time::sleep(Duration::from_secs(2)).await;
            })
            .await;

        assert_eq!(notifier.sent().len(), 3);
    }
}
