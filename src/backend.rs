use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};
use crate::geo::Coordinate;
use crate::places::{http_client, into_candidates, NearbyPlace, PlaceCandidate, PlacesProvider};
use crate::reminders::{retain_valid, Category, Reminder, ReminderStore};

#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
    token: Option<SecretString>,
}

#[derive(Debug, Deserialize)]
struct BackendReminder {
    id: String,
    title: String,
    category: Category,
    created_at: Option<String>,
}

impl BackendReminder {
    fn into_reminder(self) -> Reminder {
        let created_at = self.created_at.as_deref().and_then(parse_timestamp);
        Reminder {
            id: self.id,
            title: self.title,
            category: self.category,
            created_at,
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    // The backend writes naive UTC timestamps.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, token: Option<SecretString>) -> AppResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http: http_client()?,
            base_url,
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    pub async fn create_reminder(&self, title: &str, category: &Category) -> AppResult<Reminder> {
        #[derive(Serialize)]
        struct RequestBody<'a> {
            title: &'a str,
            category: &'a Category,
        }

        if title.trim().is_empty() {
            return Err(AppError::Validation("reminder title must not be empty".into()));
        }

        let response = self
            .authorized(self.http.post(self.url("/reminders/")))
            .json(&RequestBody { title, category })
            .send()
            .await?
            .error_for_status()?;
        let created: BackendReminder = response.json().await?;
        debug!(target: "reminders", id = %created.id, "reminder created");
        Ok(created.into_reminder())
    }

    pub async fn delete_reminder(&self, reminder_id: &str) -> AppResult<()> {
        self.authorized(
            self.http
                .delete(self.url(&format!("/reminders/{reminder_id}"))),
        )
        .send()
        .await?
        .error_for_status()?;
        debug!(target: "reminders", id = %reminder_id, "reminder deleted");
        Ok(())
    }
}

#[async_trait]
impl ReminderStore for BackendClient {
    async fn list_active(&self) -> AppResult<Vec<Reminder>> {
        let response = self
            .authorized(self.http.get(self.url("/reminders/")))
            .send()
            .await?
            .error_for_status()?;
        let reminders: Vec<BackendReminder> = response.json().await?;
        Ok(retain_valid(
            reminders
                .into_iter()
                .map(BackendReminder::into_reminder)
                .collect(),
        ))
    }
}

#[async_trait]
impl PlacesProvider for BackendClient {
    async fn find_nearby(
        &self,
        location: Coordinate,
        place_type: &str,
        radius_meters: f64,
    ) -> AppResult<Vec<PlaceCandidate>> {
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            places: Vec<NearbyPlace>,
        }

        let latitude = location.latitude.to_string();
        let longitude = location.longitude.to_string();
        let radius = radius_meters.to_string();
        let response = self
            .authorized(self.http.get(self.url("/api/places/nearby")))
            .query(&[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("place_type", place_type),
                ("radius", radius.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(
                target: "places",
                status = %response.status(),
                place_type,
                "backend nearby search rejected"
            );
        }
        let parsed: Response = response.error_for_status()?.json().await?;
        Ok(into_candidates(parsed.places))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_timestamps() {
        let naive = parse_timestamp("2024-05-01T12:30:00.123456").unwrap();
        assert_eq!(naive.timestamp(), 1_714_566_600);
        let zoned = parse_timestamp("2024-05-01T14:30:00+02:00").unwrap();
        assert_eq!(zoned.timestamp(), 1_714_566_600);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn normalizes_base_url() {
        let client = BackendClient::new("http://localhost:8001/", None).unwrap();
        assert_eq!(client.url("/reminders/"), "http://localhost:8001/reminders/");
    }
}
