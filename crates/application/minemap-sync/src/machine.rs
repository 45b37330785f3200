//! Sync state machine
//!
//! Pure and clock-free: the caller passes the time in with each event, and
//! every transition consumes the state and returns the next one plus the
//! effects to run.
//!
//! ```text
//!            FiltersChanged             Tick (due)
//!   Idle ─────────────────► PendingFetch ─────────► Fetching ──► Idle
//!                            ▲       │ FiltersChanged    │  succeeded / failed
//!                            └───────┘ (re-armed)        │
//!                            ▲                           │
//!                            └───────────────────────────┘ FiltersChanged
//!                                                          (in-flight fetch is now stale)
//! ```
//!
//! Each filter change bumps `generation`. A fetch result is applied only if
//! it carries the current generation.

use std::time::{Duration, Instant};

use minemap_core::{Error, Listing, ListingQuery, ListingRecord};

/// Quiet period before a filter change triggers a fetch
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Area selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Region {
    /// No proximity filter
    All,
    Around {
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    },
}

impl Region {
    /// 5 km around New York City
    pub fn new_york() -> Self {
        Region::Around {
            latitude: 40.73,
            longitude: -73.93,
            radius_meters: 5000.0,
        }
    }
}

/// Everything the user can filter on
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    pub region: Region,
    pub power_source: String,
    pub cooling_type: String,
    pub max_rate: Option<f64>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            region: Region::All,
            power_source: minemap_core::ALL_SENTINEL.to_string(),
            cooling_type: minemap_core::ALL_SENTINEL.to_string(),
            max_rate: None,
        }
    }
}

impl FilterState {
    /// Request parameters. Categories are sent as-is, `"all"` included.
    pub fn to_query(&self) -> ListingQuery {
        let (lat, lng, radius) = match self.region {
            Region::All => (None, None, None),
            Region::Around {
                latitude,
                longitude,
                radius_meters,
            } => (
                Some(latitude.to_string()),
                Some(longitude.to_string()),
                Some(radius_meters.to_string()),
            ),
        };
        ListingQuery {
            lat,
            lng,
            radius,
            power_source: Some(self.power_source.clone()),
            cooling_type: Some(self.cooling_type.clone()),
            max_rate: self.max_rate.map(|r| r.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// A change was seen; fetch once `due` passes without another change
    PendingFetch { due: Instant },
    /// Request for `generation` in flight
    Fetching { generation: u64 },
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::PendingFetch { .. } => "pending",
            Phase::Fetching { .. } => "fetching",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    FiltersChanged { filters: FilterState, at: Instant },
    Tick { now: Instant },
    FetchSucceeded { generation: u64, records: Vec<ListingRecord> },
    FetchFailed { generation: u64, error: String },
    ListingCreated { record: ListingRecord },
}

/// Work for the driver to carry out
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send this request, tagged with `generation`
    Fetch { generation: u64, query: ListingQuery },
    /// Collection replaced with `count` listings
    Applied { count: usize },
    /// Result for an old generation ignored
    Stale { generation: u64 },
    /// Fetch failed; collection kept
    Failed { error: String },
    /// Record dropped because its location did not decode
    Rejected { id: i64, error: Error },
    Appended { id: i64 },
}

#[derive(Debug, Clone)]
pub struct SyncState {
    pub filters: FilterState,
    pub phase: Phase,
    pub listings: Vec<Listing>,
    pub generation: u64,
    pub last_error: Option<String>,
    pub debounce: Duration,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new(FilterState::default(), DEFAULT_DEBOUNCE)
    }
}

impl SyncState {
    pub fn new(filters: FilterState, debounce: Duration) -> Self {
        Self {
            filters,
            phase: Phase::Idle,
            listings: Vec::new(),
            generation: 0,
            last_error: None,
            debounce,
        }
    }

    /// When the pending fetch fires, if one is armed
    pub fn due(&self) -> Option<Instant> {
        match self.phase {
            Phase::PendingFetch { due } => Some(due),
            _ => None,
        }
    }

    pub fn apply(mut self, event: Event) -> (Self, Vec<Effect>) {
        let mut effects = Vec::new();

        match event {
            Event::FiltersChanged { filters, at } => {
                self.filters = filters;
                self.generation += 1;
                self.phase = Phase::PendingFetch {
                    due: at + self.debounce,
                };
            }

            Event::Tick { now } => {
                if let Phase::PendingFetch { due } = self.phase {
                    if now >= due {
                        self.phase = Phase::Fetching {
                            generation: self.generation,
                        };
                        effects.push(Effect::Fetch {
                            generation: self.generation,
                            query: self.filters.to_query(),
                        });
                    }
                }
            }

            Event::FetchSucceeded {
                generation,
                records,
            } => {
                if !self.is_current(generation) {
                    effects.push(Effect::Stale { generation });
                } else {
                    let mut listings = Vec::with_capacity(records.len());
                    for record in records {
                        let id = record.id;
                        match Listing::try_from(record) {
                            Ok(listing) => listings.push(listing),
                            Err(error) => effects.push(Effect::Rejected { id, error }),
                        }
                    }
                    effects.push(Effect::Applied {
                        count: listings.len(),
                    });
                    self.listings = listings;
                    self.last_error = None;
                    self.phase = Phase::Idle;
                }
            }

            Event::FetchFailed { generation, error } => {
                if !self.is_current(generation) {
                    effects.push(Effect::Stale { generation });
                } else {
                    self.last_error = Some(error.clone());
                    self.phase = Phase::Idle;
                    effects.push(Effect::Failed { error });
                }
            }

            Event::ListingCreated { record } => {
                let id = record.id;
                match Listing::try_from(record) {
                    Ok(listing) => {
                        self.listings.push(listing);
                        effects.push(Effect::Appended { id });
                    }
                    Err(error) => {
                        self.last_error = Some(error.to_string());
                        effects.push(Effect::Rejected { id, error });
                    }
                }
            }
        }

        (self, effects)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.phase
            == Phase::Fetching {
                generation: self.generation,
            }
            && generation == self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, location: &str) -> ListingRecord {
        ListingRecord {
            id,
            title: format!("Site {id}"),
            description: "d".into(),
            electricity_rate: 0.05,
            power_source: "Hydro".into(),
            cooling_type: "Immersion".into(),
            location: location.into(),
        }
    }

    fn solar() -> FilterState {
        FilterState {
            power_source: "Solar".into(),
            ..Default::default()
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn fetches(effects: &[Effect]) -> Vec<&ListingQuery> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Fetch { query, .. } => Some(query),
                _ => None,
            })
            .collect()
    }

    /// Run to the point of an in-flight fetch for `filters`
    fn fetching(filters: FilterState, t0: Instant) -> (SyncState, u64) {
        let state = SyncState::new(FilterState::default(), DEFAULT_DEBOUNCE);
        let (state, _) = state.apply(Event::FiltersChanged { filters, at: t0 });
        let (state, effects) = state.apply(Event::Tick { now: t0 + ms(500) });
        let generation = match effects.as_slice() {
            [Effect::Fetch { generation, .. }] => *generation,
            other => panic!("expected one fetch, got {other:?}"),
        };
        (state, generation)
    }

    #[test]
    fn test_debounce_coalesces_changes() {
        let t0 = Instant::now();
        let mut state = SyncState::new(FilterState::default(), DEFAULT_DEBOUNCE);
        let mut all_effects = Vec::new();

        for (i, power) in ["Hydro", "Wind", "Solar"].iter().enumerate() {
            let at = t0 + ms(100 * i as u64);
            let filters = FilterState {
                power_source: power.to_string(),
                ..Default::default()
            };
            let (next, effects) = state.apply(Event::FiltersChanged { filters, at });
            all_effects.extend(effects);
            // Ticks between changes never fire
            let (next, effects) = next.apply(Event::Tick { now: at + ms(50) });
            all_effects.extend(effects);
            state = next;
        }

        let (state, effects) = state.apply(Event::Tick { now: t0 + ms(699) });
        assert!(effects.is_empty());
        all_effects.extend(effects);

        let (state, effects) = state.apply(Event::Tick { now: t0 + ms(700) });
        all_effects.extend(effects);

        let sent = fetches(&all_effects);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].power_source.as_deref(), Some("Solar"));
        assert_eq!(state.phase, Phase::Fetching { generation: 3 });
    }

    #[test]
    fn test_success_replaces_collection() {
        let t0 = Instant::now();
        let (mut state, generation) = fetching(solar(), t0);
        state.listings = vec![Listing::try_from(record(99, "POINT(0 0)")).unwrap()];

        let (state, effects) = state.apply(Event::FetchSucceeded {
            generation,
            records: vec![record(1, "POINT(-79.37 43.71)"), record(2, "POINT(10 20)")],
        });

        assert_eq!(state.phase, Phase::Idle);
        let ids: Vec<i64> = state.listings.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(state.listings[0].longitude(), -79.37);
        assert_eq!(state.listings[0].latitude(), 43.71);
        assert_eq!(effects, vec![Effect::Applied { count: 2 }]);
    }

    #[test]
    fn test_malformed_record_dropped() {
        let t0 = Instant::now();
        let (state, generation) = fetching(solar(), t0);
        let (state, effects) = state.apply(Event::FetchSucceeded {
            generation,
            records: vec![record(1, "POINT(1 2)"), record(2, "POINT(oops)")],
        });
        assert_eq!(state.listings.len(), 1);
        assert!(matches!(
            effects[0],
            Effect::Rejected { id: 2, error: Error::MalformedLocation(_) }
        ));
    }

    #[test]
    fn test_failure_keeps_collection() {
        let t0 = Instant::now();
        let (mut state, generation) = fetching(solar(), t0);
        let kept = Listing::try_from(record(5, "POINT(1 1)")).unwrap();
        state.listings = vec![kept.clone()];

        let (state, effects) = state.apply(Event::FetchFailed {
            generation,
            error: "connection refused".into(),
        });
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.listings, vec![kept]);
        assert_eq!(state.last_error.as_deref(), Some("connection refused"));
        assert_eq!(
            effects,
            vec![Effect::Failed {
                error: "connection refused".into()
            }]
        );
    }

    #[test]
    fn test_superseded_fetch_is_discarded() {
        let t0 = Instant::now();
        let (state, old_generation) = fetching(solar(), t0);

        // Change arrives while the first request is in flight
        let wind = FilterState {
            power_source: "Wind".into(),
            ..Default::default()
        };
        let (state, _) = state.apply(Event::FiltersChanged {
            filters: wind,
            at: t0 + ms(600),
        });
        let (state, effects) = state.apply(Event::Tick { now: t0 + ms(1100) });
        let new_generation = match effects.as_slice() {
            [Effect::Fetch { generation, .. }] => *generation,
            other => panic!("{other:?}"),
        };

        // Newer result lands first, older one afterwards
        let (state, _) = state.apply(Event::FetchSucceeded {
            generation: new_generation,
            records: vec![record(2, "POINT(2 2)")],
        });
        let (state, effects) = state.apply(Event::FetchSucceeded {
            generation: old_generation,
            records: vec![record(1, "POINT(1 1)")],
        });

        assert_eq!(effects, vec![Effect::Stale { generation: old_generation }]);
        assert_eq!(state.listings.len(), 1);
        assert_eq!(state.listings[0].id, 2);
    }

    #[test]
    fn test_stale_result_while_pending() {
        let t0 = Instant::now();
        let (state, generation) = fetching(solar(), t0);
        let (state, _) = state.apply(Event::FiltersChanged {
            filters: FilterState::default(),
            at: t0 + ms(600),
        });
        let (state, effects) = state.apply(Event::FetchFailed {
            generation,
            error: "late".into(),
        });
        assert_eq!(effects, vec![Effect::Stale { generation }]);
        assert!(matches!(state.phase, Phase::PendingFetch { .. }));
        assert_eq!(state.last_error, None);
    }

    #[test]
    fn test_created_listing_appended() {
        let state = SyncState::new(FilterState::default(), DEFAULT_DEBOUNCE);
        let (state, effects) = state.apply(Event::ListingCreated {
            record: record(7, "POINT(-79.37 43.71)"),
        });
        assert_eq!(effects, vec![Effect::Appended { id: 7 }]);
        assert_eq!(state.listings[0].latitude(), 43.71);
        // Not debounced, no fetch armed
        assert_eq!(state.phase, Phase::Idle);
    }

    #[test]
    fn test_phase_names_follow_transitions() {
        let t0 = Instant::now();
        let state = SyncState::default();
        assert_eq!(state.phase.name(), "idle");
        let (state, _) = state.apply(Event::FiltersChanged {
            filters: solar(),
            at: t0,
        });
        assert_eq!(state.phase.name(), "pending");
        let (state, _) = state.apply(Event::Tick { now: t0 + ms(500) });
        assert_eq!(state.phase.name(), "fetching");
    }

    #[test]
    fn test_region_query() {
        let filters = FilterState {
            region: Region::new_york(),
            max_rate: Some(0.07),
            ..Default::default()
        };
        let query = filters.to_query();
        assert_eq!(query.lat.as_deref(), Some("40.73"));
        assert_eq!(query.lng.as_deref(), Some("-73.93"));
        assert_eq!(query.radius.as_deref(), Some("5000"));
        assert_eq!(query.power_source.as_deref(), Some("all"));
        assert_eq!(query.max_rate.as_deref(), Some("0.07"));

        let query = FilterState::default().to_query();
        assert_eq!(query.lat, None);
    }
}
