//! Sync driver
//!
//! Runs [`SyncState`] on a tokio task. Commands come in over a channel,
//! fetches run as spawned tasks that report back over a second channel, and
//! every transition is published as a [`SyncSnapshot`] on a watch channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use minemap_core::{Listing, NewListing};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::api::ListingsApi;
use crate::machine::{Effect, Event, FilterState, Phase, SyncState};
use crate::{Result, SyncError};

/// What subscribers see after each transition
#[derive(Debug, Clone)]
pub struct SyncSnapshot {
    pub filters: FilterState,
    pub phase: Phase,
    pub listings: Vec<Listing>,
    pub last_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SyncSnapshot {
    fn of(state: &SyncState, last_synced_at: Option<DateTime<Utc>>) -> Self {
        Self {
            filters: state.filters.clone(),
            phase: state.phase,
            listings: state.listings.clone(),
            last_error: state.last_error.clone(),
            last_synced_at,
        }
    }
}

enum Command {
    SetFilters(FilterState),
    Create(NewListing, oneshot::Sender<Result<Listing>>),
    Shutdown,
}

enum Outcome {
    Event(Event),
    Created(Result<minemap_core::ListingRecord>, oneshot::Sender<Result<Listing>>),
}

/// Handle to a running driver
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SyncSnapshot>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Record a filter change; the fetch happens once changes settle
    pub fn set_filters(&self, filters: FilterState) -> Result<()> {
        self.commands
            .send(Command::SetFilters(filters))
            .map_err(|_| SyncError::Closed)
    }

    /// Create a listing and append it to the local collection
    pub async fn create(&self, draft: NewListing) -> Result<Listing> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Create(draft, tx))
            .map_err(|_| SyncError::Closed)?;
        rx.await.map_err(|_| SyncError::Closed)?
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.snapshots.borrow().clone()
    }

    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        let _ = self.task.await;
    }
}

/// Start a driver with no filters applied and nothing fetched yet
pub fn spawn<A: ListingsApi>(api: Arc<A>, debounce: Duration) -> SyncHandle {
    let state = SyncState::new(FilterState::default(), debounce);
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
    let (snapshots_tx, snapshots_rx) = watch::channel(SyncSnapshot::of(&state, None));

    let driver = Driver {
        api,
        state,
        outcomes: outcomes_tx,
        snapshots: snapshots_tx,
        last_synced_at: None,
    };
    let task = tokio::spawn(driver.run(commands_rx, outcomes_rx));

    SyncHandle {
        commands: commands_tx,
        snapshots: snapshots_rx,
        task,
    }
}

struct Driver<A> {
    api: Arc<A>,
    state: SyncState,
    outcomes: mpsc::UnboundedSender<Outcome>,
    snapshots: watch::Sender<SyncSnapshot>,
    last_synced_at: Option<DateTime<Utc>>,
}

impl<A: ListingsApi> Driver<A> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut outcomes: mpsc::UnboundedReceiver<Outcome>,
    ) {
        loop {
            let due = self.state.due().map(Instant::from_std);

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::SetFilters(filters)) => {
                        let at = Instant::now().into_std();
                        self.dispatch(Event::FiltersChanged { filters, at });
                    }
                    Some(Command::Create(draft, reply)) => self.spawn_create(draft, reply),
                    Some(Command::Shutdown) | None => break,
                },
                Some(outcome) = outcomes.recv() => match outcome {
                    Outcome::Event(event) => self.dispatch(event),
                    Outcome::Created(Ok(record), reply) => {
                        let decoded = Listing::try_from(record.clone()).map_err(SyncError::from);
                        self.dispatch(Event::ListingCreated { record });
                        let _ = reply.send(decoded);
                    }
                    Outcome::Created(Err(e), reply) => {
                        let _ = reply.send(Err(e));
                    }
                },
                _ = sleep_until(due.unwrap_or_else(Instant::now)), if due.is_some() => {
                    let now = Instant::now().into_std();
                    self.dispatch(Event::Tick { now });
                }
            }
        }
        tracing::debug!("sync driver stopped");
    }

    fn dispatch(&mut self, event: Event) {
        let (next, effects) = std::mem::take(&mut self.state).apply(event);
        self.state = next;

        for effect in effects {
            match effect {
                Effect::Fetch { generation, query } => {
                    tracing::debug!(generation, ?query, "fetching listings");
                    let api = self.api.clone();
                    let outcomes = self.outcomes.clone();
                    tokio::spawn(async move {
                        let event = match api.fetch(&query).await {
                            Ok(records) => Event::FetchSucceeded {
                                generation,
                                records,
                            },
                            Err(e) => Event::FetchFailed {
                                generation,
                                error: e.to_string(),
                            },
                        };
                        let _ = outcomes.send(Outcome::Event(event));
                    });
                }
                Effect::Applied { count } => {
                    self.last_synced_at = Some(Utc::now());
                    tracing::info!(count, "listings synced");
                }
                Effect::Stale { generation } => {
                    tracing::debug!(generation, "discarding superseded result");
                }
                Effect::Failed { error } => {
                    tracing::warn!(%error, "listing fetch failed, keeping previous results");
                }
                Effect::Rejected { id, error } => {
                    tracing::warn!(id, %error, "dropping listing with unreadable location");
                }
                Effect::Appended { id } => {
                    tracing::debug!(id, "appended created listing");
                }
            }
        }

        self.snapshots
            .send_replace(SyncSnapshot::of(&self.state, self.last_synced_at));
    }

    fn spawn_create(&self, draft: NewListing, reply: oneshot::Sender<Result<Listing>>) {
        let api = self.api.clone();
        let outcomes = self.outcomes.clone();
        tokio::spawn(async move {
            let result = api.create(&draft).await;
            let _ = outcomes.send(Outcome::Created(result, reply));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use minemap_core::{ListingQuery, ListingRecord};
    use std::sync::Mutex;

    /// Answers by power source: Solar is slow, Grid fails, anything else is quick
    #[derive(Default)]
    struct FakeApi {
        calls: Mutex<Vec<ListingQuery>>,
    }

    impl FakeApi {
        fn calls(&self) -> Vec<ListingQuery> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn record(id: i64, power_source: &str) -> ListingRecord {
        ListingRecord {
            id,
            title: format!("{power_source} site"),
            description: "d".into(),
            electricity_rate: 0.05,
            power_source: power_source.into(),
            cooling_type: "Air".into(),
            location: format!("POINT({id} {id})"),
        }
    }

    #[async_trait]
    impl ListingsApi for FakeApi {
        async fn fetch(&self, query: &ListingQuery) -> Result<Vec<ListingRecord>> {
            self.calls.lock().unwrap().push(query.clone());
            let power = query.power_source.clone().unwrap_or_default();
            match power.as_str() {
                "Solar" => {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    Ok(vec![record(1, "Solar")])
                }
                "Grid" => Err(SyncError::Status {
                    status: 500,
                    message: "Internal Server Error".into(),
                }),
                _ => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(vec![record(2, &power), record(3, &power)])
                }
            }
        }

        async fn create(&self, draft: &NewListing) -> Result<ListingRecord> {
            let valid = draft.validate()?;
            Ok(ListingRecord {
                id: 42,
                title: valid.title,
                description: valid.description,
                electricity_rate: valid.electricity_rate,
                power_source: valid.power_source,
                cooling_type: valid.cooling_type,
                location: "POINT(-79.37 43.71)".into(),
            })
        }
    }

    fn power(value: &str) -> FilterState {
        FilterState {
            power_source: value.into(),
            ..Default::default()
        }
    }

    async fn wait(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_changes_send_one_request() {
        let api = Arc::new(FakeApi::default());
        let handle = spawn(api.clone(), Duration::from_millis(500));

        for value in ["Hydro", "Wind", "Hydro"] {
            handle.set_filters(power(value)).unwrap();
            wait(100).await;
        }
        assert!(api.calls().is_empty());

        wait(1000).await;
        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].power_source.as_deref(), Some("Hydro"));

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.phase, Phase::Idle);
        assert_eq!(snapshot.listings.len(), 2);
        assert!(snapshot.last_synced_at.is_some());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_superseded_fetch_is_ignored() {
        let api = Arc::new(FakeApi::default());
        let handle = spawn(api.clone(), Duration::from_millis(500));

        // Solar goes out at 500ms and answers at 2500ms
        handle.set_filters(power("Solar")).unwrap();
        wait(600).await;
        handle.set_filters(power("Wind")).unwrap();
        wait(3000).await;

        assert_eq!(api.calls().len(), 2);
        let snapshot = handle.snapshot();
        let ids: Vec<i64> = snapshot.listings.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(snapshot.filters.power_source, "Wind");
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_previous_listings() {
        let api = Arc::new(FakeApi::default());
        let handle = spawn(api.clone(), Duration::from_millis(500));

        handle.set_filters(power("Wind")).unwrap();
        wait(1000).await;
        assert_eq!(handle.snapshot().listings.len(), 2);

        handle.set_filters(power("Grid")).unwrap();
        wait(1000).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.listings.len(), 2);
        assert!(snapshot.last_error.unwrap().contains("500"));
        assert_eq!(snapshot.phase, Phase::Idle);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_appends_without_fetch() {
        let api = Arc::new(FakeApi::default());
        let handle = spawn(api.clone(), Duration::from_millis(500));
        let mut updates = handle.subscribe();

        let draft = NewListing::new("Site A", "Hydro site", 0.05, -79.37, 43.71);
        let listing = handle.create(draft).await.unwrap();
        assert_eq!(listing.id, 42);
        assert_eq!(listing.latitude(), 43.71);

        let snapshot = updates
            .wait_for(|s| !s.listings.is_empty())
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.listings[0].title, "Site A");
        assert!(api.calls().is_empty());

        let bad = NewListing::new("", "d", 0.05, 0.0, 0.0);
        assert!(matches!(
            handle.create(bad).await,
            Err(SyncError::Core(minemap_core::Error::Validation(_)))
        ));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_closed_handle() {
        let handle = spawn(Arc::new(FakeApi::default()), Duration::from_millis(5));
        let commands = handle.commands.clone();
        handle.shutdown().await;
        assert!(commands.send(Command::SetFilters(power("Wind"))).is_err());
    }
}
