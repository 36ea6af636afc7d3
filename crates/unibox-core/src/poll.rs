//! New mail polling.
//!
//! [`Poller::run`] refreshes the active account's inbox on a fixed interval
//! and reports messages that were not in the previous listing. The first
//! listing after start or an account switch only sets the baseline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::account::{SelectOutcome, SelectionSource};
use crate::handoff::{HandoffError, HandoffReply, HandoffRequest, HandoffTransport};
use crate::inbox::{FetchOutcome, FolderError, Inbox};
use crate::notice::Notice;
use crate::service::{FolderKey, Message};

/// Messages that arrived since the previous poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMailEvent {
    /// Account the mail arrived in.
    pub account: String,
    /// Number of new messages.
    pub delta: usize,
    /// The new messages, newest first.
    pub messages: Vec<Message>,
}

/// Remembers which inbox messages have been seen.
#[derive(Debug, Clone, Default)]
pub struct PollTracker {
    baseline: Option<HashSet<String>>,
}

impl PollTracker {
    /// Creates a tracker without a baseline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful inbox listing and returns the messages that were
    /// not in the previous one.
    ///
    /// The first listing only sets the baseline and returns nothing.
    pub fn observe(&mut self, listing: &[Message]) -> Vec<Message> {
        let ids: HashSet<String> = listing.iter().map(|m| m.id.clone()).collect();
        let fresh = match &self.baseline {
            Some(seen) => listing
                .iter()
                .filter(|m| !seen.contains(&m.id))
                .cloned()
                .collect(),
            None => {
                debug!(count = ids.len(), "poll baseline established");
                Vec::new()
            }
        };
        self.baseline = Some(ids);
        fresh
    }

    /// Whether a baseline exists.
    #[must_use]
    pub const fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    /// Forgets the baseline.
    pub fn reset(&mut self) {
        self.baseline = None;
    }
}

/// Requests sent to a running [`Poller`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    /// Poll now instead of waiting for the next tick.
    PollNow,
    /// Switch the active account.
    SelectAccount(String),
}

/// Receives poll results.
#[async_trait]
pub trait PollHandler: Send {
    /// New mail arrived.
    async fn on_new_mail(&mut self, event: &NewMailEvent, notice: &Notice);

    /// A refresh failed. The baseline is kept.
    async fn on_poll_error(&mut self, _error: &FolderError) {}

    /// The AI hand-off for new mail finished.
    async fn on_handoff(
        &mut self,
        _account: &str,
        _result: std::result::Result<HandoffReply, HandoffError>,
    ) {
    }
}

#[derive(Debug, Clone)]
struct HandoffHook {
    transport: Arc<dyn HandoffTransport>,
    agent_id: Option<String>,
}

type HandoffResult = (String, std::result::Result<HandoffReply, HandoffError>);

/// Periodic inbox refresh with an in-flight guard.
#[derive(Debug)]
pub struct Poller<H> {
    interval: Duration,
    notice_dismiss: Duration,
    tracker: PollTracker,
    in_flight: bool,
    skipped: u64,
    handoff: Option<HandoffHook>,
    handler: H,
}

impl<H: PollHandler> Poller<H> {
    /// Creates a poller that ticks every `interval`.
    #[must_use]
    pub fn new(interval: Duration, handler: H) -> Self {
        Self {
            interval,
            notice_dismiss: Duration::from_secs(5),
            tracker: PollTracker::new(),
            in_flight: false,
            skipped: 0,
            handoff: None,
            handler,
        }
    }

    /// How long new mail notices stay up.
    #[must_use]
    pub const fn with_notice_dismiss(mut self, dismiss: Duration) -> Self {
        self.notice_dismiss = dismiss;
        self
    }

    /// Hands new mail to the AI endpoint, once per detected increase.
    #[must_use]
    pub fn with_handoff(
        mut self,
        transport: Arc<dyn HandoffTransport>,
        agent_id: Option<String>,
    ) -> Self {
        self.handoff = Some(HandoffHook {
            transport,
            agent_id,
        });
        self
    }

    /// Ticks that were skipped because a refresh was still running.
    #[must_use]
    pub const fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Whether a refresh is running.
    #[must_use]
    pub const fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// The handler.
    #[must_use]
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    /// Starts a refresh unless one is already running.
    fn start(&mut self, inbox: &Inbox) -> Option<JoinHandle<FetchOutcome>> {
        if self.in_flight {
            self.skipped += 1;
            info!(skipped = self.skipped, "poll skipped, previous refresh still running");
            return None;
        }
        match inbox.background_request(FolderKey::Inbox) {
            Ok(Ok(ticket)) => {
                self.in_flight = true;
                debug!(epoch = ticket.epoch(), "polling inbox");
                Some(tokio::spawn(ticket.run()))
            }
            Ok(Err(e)) => {
                warn!(error = %e, "cannot poll inbox");
                None
            }
            Err(e) => {
                debug!(error = %e, "nothing to poll");
                None
            }
        }
    }

    /// Applies a finished refresh and reports new mail.
    async fn finish(
        &mut self,
        inbox: &mut Inbox,
        outcome: FetchOutcome,
        handoffs: &mut JoinSet<HandoffResult>,
    ) {
        self.in_flight = false;
        let error = outcome.error().cloned();
        if !inbox.apply(outcome) {
            return;
        }
        if let Some(e) = error {
            self.handler.on_poll_error(&e).await;
            return;
        }

        let Some(account) = inbox.active_connection().map(|c| c.email_address.clone()) else {
            return;
        };
        let listing = inbox
            .cache()
            .get(FolderKey::Inbox)
            .map(|entry| entry.messages.as_slice())
            .unwrap_or_default();
        let fresh = self.tracker.observe(listing);
        if fresh.is_empty() {
            return;
        }

        let event = NewMailEvent {
            delta: fresh.len(),
            account,
            messages: fresh,
        };
        info!(account = %event.account, delta = event.delta, "new mail");
        let notice = Notice::new_mail(&event.account, event.delta, self.notice_dismiss);
        self.handler.on_new_mail(&event, &notice).await;

        if let Some(hook) = &self.handoff {
            let mut request = HandoffRequest::from_messages(&event.messages, &event.account);
            request.agent_id.clone_from(&hook.agent_id);
            let transport = Arc::clone(&hook.transport);
            let account = event.account;
            handoffs.spawn(async move {
                let result = transport.send(&request).await;
                (account, result)
            });
        }
    }

    /// Polls until `shutdown` fires or every sender of it is dropped.
    ///
    /// The first tick fires immediately. Ticks missed while busy are skipped,
    /// not replayed. Switching accounts drops the pending refresh, resets the
    /// baseline and polls the new account right away.
    pub async fn run(
        &mut self,
        inbox: &mut Inbox,
        mut commands: mpsc::Receiver<WatchCommand>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut pending: Option<JoinHandle<FetchOutcome>> = None;
        let mut handoffs: JoinSet<HandoffResult> = JoinSet::new();

        info!(interval = ?self.interval, "watching inbox");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("watch loop shutdown");
                    break;
                }
                _ = ticker.tick() => {
                    if let Some(handle) = self.start(inbox) {
                        pending = Some(handle);
                    }
                }
                Some(command) = commands.recv() => match command {
                    WatchCommand::PollNow => {
                        if let Some(handle) = self.start(inbox) {
                            pending = Some(handle);
                        }
                    }
                    WatchCommand::SelectAccount(email) => {
                        match inbox.select_account(&email, SelectionSource::Manual).await {
                            Ok(SelectOutcome::Switched { .. }) => {
                                if let Some(handle) = pending.take() {
                                    handle.abort();
                                }
                                self.in_flight = false;
                                self.tracker.reset();
                                ticker.reset_immediately();
                            }
                            Ok(_) => {}
                            Err(e) => warn!(%email, error = %e, "account switch failed"),
                        }
                    }
                },
                joined = wait_pending(&mut pending) => {
                    pending = None;
                    match joined {
                        Ok(outcome) => self.finish(inbox, outcome, &mut handoffs).await,
                        Err(e) => {
                            self.in_flight = false;
                            warn!(error = %e, "poll task failed");
                        }
                    }
                }
                Some(done) = handoffs.join_next() => match done {
                    Ok((account, result)) => self.handler.on_handoff(&account, result).await,
                    Err(e) => warn!(error = %e, "hand-off task failed"),
                },
            }
        }

        if let Some(handle) = pending.take() {
            handle.abort();
        }
        handoffs.abort_all();
        self.in_flight = false;
    }
}

async fn wait_pending(
    pending: &mut Option<JoinHandle<FetchOutcome>>,
) -> std::result::Result<FetchOutcome, tokio::task::JoinError> {
    match pending {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::Settings;
    use crate::service::ProviderError;
    use crate::test_support::{FakeFactory, FakeProvider, connection, messages};

    const A: &str = "a@example.com";
    const B: &str = "b@example.com";
    const PERIOD: Duration = Duration::from_secs(300);

    #[derive(Debug, Default, Clone)]
    struct Recorder {
        events: Arc<Mutex<Vec<NewMailEvent>>>,
        errors: Arc<AtomicUsize>,
        replies: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl PollHandler for Recorder {
        async fn on_new_mail(&mut self, event: &NewMailEvent, notice: &Notice) {
            assert_eq!(notice.body, event.account);
            self.events.lock().unwrap().push(event.clone());
        }

        async fn on_poll_error(&mut self, _error: &FolderError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_handoff(
            &mut self,
            _account: &str,
            result: std::result::Result<HandoffReply, HandoffError>,
        ) {
            self.replies.lock().unwrap().push(result.unwrap().response);
        }
    }

    #[derive(Debug, Default)]
    struct CountingTransport {
        requests: Mutex<Vec<HandoffRequest>>,
    }

    #[async_trait]
    impl HandoffTransport for CountingTransport {
        async fn send(
            &self,
            request: &HandoffRequest,
        ) -> std::result::Result<HandoffReply, HandoffError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(HandoffReply {
                response: "summary".into(),
                usage: None,
            })
        }
    }

    async fn inbox_on(a: &Arc<FakeProvider>, b: &Arc<FakeProvider>) -> Inbox {
        let factory = FakeFactory::default()
            .with(A, Arc::clone(a))
            .with(B, Arc::clone(b));
        let mut inbox = Inbox::new(
            vec![connection(A), connection(B)],
            Arc::new(factory),
            &Settings::default(),
        );
        inbox.select_account(A, SelectionSource::Manual).await.unwrap();
        inbox
    }

    /// Runs the loop until `after` has passed on the paused clock.
    async fn run_for(
        poller: &mut Poller<Recorder>,
        inbox: &mut Inbox,
        after: Duration,
        script: impl std::future::Future<Output = ()>,
    ) {
        let (_tx, rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let driver = async {
            script.await;
            tokio::time::sleep(after).await;
            stop_tx.send(()).unwrap();
        };
        tokio::join!(poller.run(inbox, rx, stop_rx), driver);
    }

    #[test]
    fn first_listing_is_baseline() {
        let mut tracker = PollTracker::new();
        assert!(tracker.observe(&messages(&["1", "2", "3"])).is_empty());
        assert!(tracker.has_baseline());

        let fresh = tracker.observe(&messages(&["5", "4", "1", "2", "3"]));
        let ids: Vec<_> = fresh.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["5", "4"]);

        assert!(tracker.observe(&messages(&["5", "4", "1", "2", "3"])).is_empty());
        tracker.reset();
        assert!(tracker.observe(&messages(&["9"])).is_empty());
    }

    #[test]
    fn full_page_with_same_count_still_reports_new_mail() {
        let mut tracker = PollTracker::new();
        tracker.observe(&messages(&["3", "2", "1"]));

        let fresh = tracker.observe(&messages(&["4", "3", "2"]));
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].id, "4");
    }

    #[tokio::test(start_paused = true)]
    async fn three_to_five_reports_two_and_hands_off_once() {
        let (a, b) = (FakeProvider::new(), FakeProvider::new());
        a.script("INBOX", Ok(messages(&["1", "2", "3"])));
        a.script("INBOX", Ok(messages(&["5", "4", "1", "2", "3"])));
        let mut inbox = inbox_on(&a, &b).await;

        let recorder = Recorder::default();
        let transport = Arc::new(CountingTransport::default());
        let mut poller = Poller::new(PERIOD, recorder.clone())
            .with_handoff(transport.clone(), Some("agent".into()));

        // Ticks at 0, 300 and 600 seconds.
        run_for(&mut poller, &mut inbox, PERIOD * 2 + Duration::from_secs(1), async {}).await;

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].delta, 2);
        assert_eq!(events[0].account, A);

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].agent_id.as_deref(), Some("agent"));
        assert_eq!(requests[0].session_id, A);
        assert_eq!(*recorder.replies.lock().unwrap(), vec!["summary".to_string()]);
        assert_eq!(a.list_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_baseline() {
        let (a, b) = (FakeProvider::new(), FakeProvider::new());
        a.script("INBOX", Ok(messages(&["1", "2"])));
        a.script("INBOX", Err(ProviderError::Network("offline".into())));
        a.script("INBOX", Ok(messages(&["3", "1", "2"])));
        let mut inbox = inbox_on(&a, &b).await;

        let recorder = Recorder::default();
        let mut poller = Poller::new(PERIOD, recorder.clone());
        run_for(&mut poller, &mut inbox, PERIOD * 2 + Duration::from_secs(1), async {}).await;

        assert_eq!(recorder.errors.load(Ordering::SeqCst), 1);
        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].delta, 1);
        assert_eq!(events[0].messages[0].id, "3");
    }

    #[tokio::test]
    async fn overlapping_tick_is_skipped() {
        let (a, b) = (FakeProvider::new(), FakeProvider::new());
        let inbox = inbox_on(&a, &b).await;
        let mut poller = Poller::new(PERIOD, Recorder::default());

        let first = poller.start(&inbox);
        assert!(first.is_some());
        assert!(poller.in_flight());

        assert!(poller.start(&inbox).is_none());
        assert_eq!(poller.skipped(), 1);
        first.unwrap().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn account_switch_resets_baseline() {
        let (a, b) = (FakeProvider::new(), FakeProvider::new());
        a.script("INBOX", Ok(messages(&["a1"])));
        b.script("INBOX", Ok(messages(&["b1", "b2"])));
        let mut inbox = inbox_on(&a, &b).await;

        let recorder = Recorder::default();
        let mut poller = Poller::new(PERIOD, recorder.clone());
        let (tx, rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let driver = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            tx.send(WatchCommand::SelectAccount(B.into())).await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            stop_tx.send(()).unwrap();
        };
        tokio::join!(poller.run(&mut inbox, rx, stop_rx), driver);

        // B's first listing is a new baseline, not new mail.
        assert!(recorder.events.lock().unwrap().is_empty());
        assert_eq!(b.list_calls(), 1);
        assert_eq!(inbox.active_connection().unwrap().email_address, B);
        assert!(!poller.in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_now_refreshes_between_ticks() {
        let (a, b) = (FakeProvider::new(), FakeProvider::new());
        a.script("INBOX", Ok(messages(&["1"])));
        a.script("INBOX", Ok(messages(&["2", "1"])));
        let mut inbox = inbox_on(&a, &b).await;

        let recorder = Recorder::default();
        let mut poller = Poller::new(PERIOD, recorder.clone());
        let (tx, rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let driver = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            tx.send(WatchCommand::PollNow).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            stop_tx.send(()).unwrap();
        };
        tokio::join!(poller.run(&mut inbox, rx, stop_rx), driver);

        assert_eq!(a.list_calls(), 2);
        assert_eq!(recorder.events.lock().unwrap()[0].delta, 1);
    }
}
