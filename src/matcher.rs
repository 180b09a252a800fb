use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::errors::{AppError, AppResult};
use crate::geo::{distance_miles, miles_to_meters, Coordinate};
use crate::ledger::NotificationLedger;
use crate::places::{PlaceCandidate, PlacesProvider};
use crate::reminders::{Category, CategoryGroup, CategoryIndex};
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRequest {
    pub category: Category,
    pub place_id: String,
    pub place_name: String,
    pub distance_miles: f64,
    pub title: String,
    pub message: String,
}

impl NotificationRequest {
    fn build(group: &CategoryGroup, place: &PlaceCandidate, distance: f64) -> Self {
        let items = group.titles().join(", ");
        Self {
            category: group.category.clone(),
            place_id: place.place_id.clone(),
            place_name: place.name.clone(),
            distance_miles: distance,
            title: format!("Reminder: {} is nearby", place.name),
            message: format!(
                "You can get {items} at {}, {distance:.1} miles away.",
                place.name
            ),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub requests: Vec<NotificationRequest>,
    pub ledger: NotificationLedger,
    pub queries: usize,
    pub failed_queries: usize,
}

pub fn first_qualifying<'a>(
    location: Coordinate,
    candidates: &'a [PlaceCandidate],
    ledger: &NotificationLedger,
    radius_miles: f64,
) -> Option<(&'a PlaceCandidate, f64)> {
    candidates
        .iter()
        .filter(|candidate| !ledger.is_notified(&candidate.place_id))
        .map(|candidate| (candidate, distance_miles(location, candidate.location)))
        .find(|(_, distance)| *distance <= radius_miles)
}

pub struct ProximityMatcher {
    places: Arc<dyn PlacesProvider>,
    query_timeout: Duration,
}

impl ProximityMatcher {
    pub fn new(places: Arc<dyn PlacesProvider>, query_timeout: Duration) -> Self {
        Self {
            places,
            query_timeout,
        }
    }

    pub async fn match_location(
        &self,
        location: Coordinate,
        index: &CategoryIndex,
        settings: &Settings,
        ledger: NotificationLedger,
        now: i64,
    ) -> MatchOutcome {
        self.run(location, index, settings, ledger, now, |_, _| {})
            .await
    }

    /// `on_match` runs right after each match is recorded, with the updated
    /// ledger, before the next category is queried. The ledger passed in must
    /// already be pruned for `now`.
    pub async fn run<F>(
        &self,
        location: Coordinate,
        index: &CategoryIndex,
        settings: &Settings,
        mut ledger: NotificationLedger,
        now: i64,
        mut on_match: F,
    ) -> MatchOutcome
    where
        F: FnMut(&NotificationRequest, &NotificationLedger) + Send,
    {
        let radius_miles = settings.search_radius_miles;
        let radius_meters = miles_to_meters(radius_miles);
        let mut outcome = MatchOutcome::default();

        for group in index.groups() {
            let place_type = group.category.place_type();
            outcome.queries += 1;
            let candidates = match self.query(location, place_type, radius_meters).await {
                Ok(candidates) => candidates,
                Err(err) => {
                    if err.is_transient() {
                        warn!(
                            target: "tracking",
                            error = ?err,
                            category = %group.category,
                            "nearby places query failed; skipping category"
                        );
                    } else {
                        error!(
                            target: "tracking",
                            error = ?err,
                            category = %group.category,
                            "nearby places query unusable; skipping category"
                        );
                    }
                    outcome.failed_queries += 1;
                    continue;
                }
            };

            let Some((place, distance)) =
                first_qualifying(location, &candidates, &ledger, radius_miles)
            else {
                debug!(
                    target: "tracking",
                    category = %group.category,
                    candidates = candidates.len(),
                    "no qualifying place"
                );
                continue;
            };

            let request = NotificationRequest::build(group, place, distance);
            ledger = ledger.record(&request.place_id, now);
            on_match(&request, &ledger);
            outcome.requests.push(request);
        }

        outcome.ledger = ledger;
        outcome
    }

    async fn query(
        &self,
        location: Coordinate,
        place_type: &str,
        radius_meters: f64,
    ) -> AppResult<Vec<PlaceCandidate>> {
        timeout(
            self.query_timeout,
            self.places.find_nearby(location, place_type, radius_meters),
        )
        .await
        .map_err(|_| AppError::Timeout(self.query_timeout))?
    }
}
