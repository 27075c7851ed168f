//! Reminder entity, its lifecycle, and the notification event it produces.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ReminderError;

// ---

pub const DEFAULT_MINUTES_BEFORE: i32 = 5;

/// Departure assumed when the caller has not resolved a real one upstream.
pub const PLACEHOLDER_DEPARTURE_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderStatus {
    Pending,
    Triggered,
    Cancelled,
}

impl ReminderStatus {
    // ---
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Triggered => "TRIGGERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// TRIGGERED and CANCELLED never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "TRIGGERED" => Ok(Self::Triggered),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(anyhow::anyhow!("unknown reminder status '{}'", other)),
        }
    }
}

/// A persisted intent to notify a user before a transit departure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    // ---
    pub id: Uuid,
    pub user_id: String,
    pub stop_name: String,
    pub stop_id: Option<String>,
    pub route_name: Option<String>,
    pub minutes_before: i32,
    pub departure_time: DateTime<Utc>,
    pub trigger_time: DateTime<Utc>,
    pub status: ReminderStatus,
    pub created_at: DateTime<Utc>,
    pub triggered_at: Option<DateTime<Utc>>,
}

/// Fields a caller supplies for a new reminder, before identity and
/// lifecycle are assigned.
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub user_id: String,
    pub stop_name: String,
    pub stop_id: Option<String>,
    pub route_name: Option<String>,
    pub minutes_before: i32,
    pub departure_time: DateTime<Utc>,
    pub trigger_time: DateTime<Utc>,
}

impl Reminder {
    // ---
    /// Validate `new` and give it an id, `created_at` and PENDING status.
    ///
    /// This is the only way to build a fresh reminder, so every record that
    /// reaches a store has already passed validation.
    pub fn new(new: NewReminder, now: DateTime<Utc>) -> Result<Self, ReminderError> {
        // ---
        if new.user_id.trim().is_empty() {
            return Err(ReminderError::missing("userId"));
        }
        if new.stop_name.trim().is_empty() {
            return Err(ReminderError::missing("stopName"));
        }
        if new.minutes_before <= 0 {
            return Err(ReminderError::invalid("minutesBefore"));
        }
        if new.trigger_time > new.departure_time {
            return Err(ReminderError::Validation(
                "please specify a triggerTime that is not after the departureTime".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            stop_name: new.stop_name,
            stop_id: new.stop_id,
            route_name: new.route_name,
            minutes_before: new.minutes_before,
            departure_time: new.departure_time,
            trigger_time: new.trigger_time,
            status: ReminderStatus::Pending,
            created_at: now,
            triggered_at: None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ReminderStatus::Pending && self.trigger_time <= now
    }

    /// PENDING -> TRIGGERED. Returns `false` and leaves the record untouched
    /// if it is already terminal.
    pub fn trigger(&mut self, at: DateTime<Utc>) -> bool {
        // ---
        if self.is_terminal() {
            return false;
        }
        self.status = ReminderStatus::Triggered;
        self.triggered_at = Some(at);
        true
    }

    /// PENDING -> CANCELLED. Returns `false` if already terminal.
    pub fn cancel(&mut self) -> bool {
        // ---
        if self.is_terminal() {
            return false;
        }
        self.status = ReminderStatus::Cancelled;
        true
    }

    /// Build the event published when this reminder fires at `fired_at`.
    pub fn notification(&self, fired_at: DateTime<Utc>) -> NotificationEvent {
        // ---
        NotificationEvent {
            reminder_id: self.id,
            user_id: self.user_id.clone(),
            message: format!(
                "Reminder: Bus {} departs from {} in {} minutes!",
                self.route_name.as_deref().unwrap_or("N/A"),
                self.stop_name,
                self.minutes_before
            ),
            stop_id: self.stop_id.clone(),
            route_name: self.route_name.clone(),
            trigger_time: fired_at,
            departure_time: self.departure_time,
        }
    }

    pub fn confirmation_message(&self) -> String {
        format!(
            "Reminder set for {} minutes before departure from {}",
            self.minutes_before, self.stop_name
        )
    }
}

/// The message carried on the event channel when a reminder fires.
///
/// Serialized as flat JSON text. The `message` is fixed at publish time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    // ---
    pub reminder_id: Uuid,
    pub user_id: String,
    pub message: String,
    pub stop_id: Option<String>,
    pub route_name: Option<String>,
    pub trigger_time: DateTime<Utc>,
    pub departure_time: DateTime<Utc>,
}

/// Body of a reminder creation request. Everything is optional on the wire
/// so that missing fields produce a "please specify" message instead of a
/// decode error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRequest {
    pub user_id: Option<String>,
    pub stop_name: Option<String>,
    pub stop_id: Option<String>,
    pub route_name: Option<String>,
    pub minutes_before: Option<i32>,
    pub departure_time: Option<String>,
    pub trigger_time: Option<String>,
}

impl ReminderRequest {
    // ---
    /// Resolve defaults and timestamps against `now`.
    ///
    /// Without a `departureTime` the departure is assumed to be
    /// [`PLACEHOLDER_DEPARTURE_MINUTES`] from now. The trigger is always
    /// `minutesBefore` ahead of the departure; a supplied `triggerTime` must
    /// match it.
    pub fn into_new_reminder(self, now: DateTime<Utc>) -> Result<NewReminder, ReminderError> {
        // ---
        let user_id = required(self.user_id, "userId")?;
        let stop_name = required(self.stop_name, "stopName")?;
        let minutes_before = self.minutes_before.unwrap_or(DEFAULT_MINUTES_BEFORE);

        let departure_time = match self.departure_time.as_deref() {
            Some(raw) => parse_timestamp(raw, "departureTime")?,
            None => now + Duration::minutes(PLACEHOLDER_DEPARTURE_MINUTES),
        };
        let trigger_time = departure_time - Duration::minutes(i64::from(minutes_before));

        // A supplied trigger is only accepted when it agrees with minutesBefore
        if let Some(raw) = self.trigger_time.as_deref() {
            let supplied = parse_timestamp(raw, "triggerTime")?;
            if supplied != trigger_time {
                return Err(ReminderError::Validation(format!(
                    "please specify a triggerTime exactly {minutes_before} minutes before the departureTime, or omit it"
                )));
            }
        }

        Ok(NewReminder {
            user_id,
            stop_name,
            stop_id: self.stop_id.filter(|s| !s.trim().is_empty()),
            route_name: self.route_name.filter(|s| !s.trim().is_empty()),
            minutes_before,
            departure_time,
            trigger_time,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ReminderError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ReminderError::missing(field))
}

/// Accept RFC 3339 timestamps, or ISO-8601 local date-times which are read
/// as UTC.
pub fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>, ReminderError> {
    // ---
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| {
            ReminderError::Validation(format!(
                "please specify {field} as an ISO-8601 timestamp, got '{raw}'"
            ))
        })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, 18, 0, 0).unwrap()
    }

    fn request() -> ReminderRequest {
        ReminderRequest {
            user_id: Some("user1".to_string()),
            stop_name: Some("Keskustori".to_string()),
            route_name: Some("3".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_placeholder_departure_and_default_minutes() {
        // ---
        let new = request().into_new_reminder(now()).unwrap();

        assert_eq!(new.minutes_before, 5);
        assert_eq!(new.departure_time, now() + Duration::minutes(10));
        assert_eq!(new.trigger_time, now() + Duration::minutes(5));
    }

    #[test]
    fn test_trigger_computed_from_supplied_departure() {
        // ---
        let req = ReminderRequest {
            minutes_before: Some(7),
            departure_time: Some("2025-03-26T19:00:00Z".to_string()),
            ..request()
        };
        let new = req.into_new_reminder(now()).unwrap();

        assert_eq!(new.departure_time, Utc.with_ymd_and_hms(2025, 3, 26, 19, 0, 0).unwrap());
        assert_eq!(new.trigger_time, Utc.with_ymd_and_hms(2025, 3, 26, 18, 53, 0).unwrap());
    }

    #[test]
    fn test_local_timestamps_read_as_utc() {
        // ---
        let ts = parse_timestamp("2025-03-26T19:00:00", "departureTime").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 3, 26, 19, 0, 0).unwrap());

        let offset = parse_timestamp("2025-03-26T21:00:00+02:00", "departureTime").unwrap();
        assert_eq!(offset, ts);
    }

    #[test]
    fn test_missing_fields_are_named() {
        // ---
        let err = ReminderRequest {
            user_id: None,
            ..request()
        }
        .into_new_reminder(now())
        .unwrap_err();
        assert_eq!(err.to_string(), "please specify userId");

        let err = ReminderRequest {
            stop_name: Some("   ".to_string()),
            ..request()
        }
        .into_new_reminder(now())
        .unwrap_err();
        assert_eq!(err.to_string(), "please specify stopName");

        let err = ReminderRequest {
            departure_time: Some("tomorrow-ish".to_string()),
            ..request()
        }
        .into_new_reminder(now())
        .unwrap_err();
        assert!(err.to_string().contains("departureTime"));
    }

    #[test]
    fn test_new_rejects_non_positive_minutes_and_late_trigger() {
        // ---
        let new = ReminderRequest {
            minutes_before: Some(0),
            ..request()
        }
        .into_new_reminder(now())
        .unwrap();
        assert!(matches!(
            Reminder::new(new, now()),
            Err(ReminderError::Validation(_))
        ));

        let late = ReminderRequest {
            departure_time: Some("2025-03-26T19:00:00Z".to_string()),
            trigger_time: Some("2025-03-26T19:01:00Z".to_string()),
            ..request()
        }
        .into_new_reminder(now());
        assert!(matches!(late, Err(ReminderError::Validation(_))));
    }

    #[test]
    fn test_supplied_trigger_must_match_minutes_before() {
        // ---
        let early = ReminderRequest {
            minutes_before: Some(5),
            departure_time: Some("2025-03-26T20:00:00Z".to_string()),
            trigger_time: Some("2025-03-26T18:00:00Z".to_string()),
            ..request()
        }
        .into_new_reminder(now())
        .unwrap_err();
        assert!(early.to_string().contains("triggerTime"));

        let agreed = ReminderRequest {
            minutes_before: Some(5),
            departure_time: Some("2025-03-26T20:00:00Z".to_string()),
            trigger_time: Some("2025-03-26T19:55:00Z".to_string()),
            ..request()
        }
        .into_new_reminder(now())
        .unwrap();
        assert_eq!(agreed.trigger_time, Utc.with_ymd_and_hms(2025, 3, 26, 19, 55, 0).unwrap());
    }

    #[test]
    fn test_lifecycle_is_terminal() {
        // ---
        let new = request().into_new_reminder(now()).unwrap();
        let mut reminder = Reminder::new(new, now()).unwrap();

        assert_eq!(reminder.status, ReminderStatus::Pending);
        assert_eq!(reminder.created_at, now());
        assert!(reminder.triggered_at.is_none());
        assert!(reminder.trigger_time <= reminder.departure_time);

        let mut cancelled = reminder.clone();
        assert!(cancelled.cancel());
        assert!(!cancelled.cancel());
        assert!(!cancelled.trigger(now()));
        assert_eq!(cancelled.status, ReminderStatus::Cancelled);
        assert!(cancelled.triggered_at.is_none());

        assert!(reminder.trigger(now()));
        assert_eq!(reminder.triggered_at, Some(now()));
        assert!(!reminder.cancel());
        assert!(!reminder.trigger(now() + Duration::minutes(1)));
        assert_eq!(reminder.status, ReminderStatus::Triggered);
        assert_eq!(reminder.triggered_at, Some(now()));
    }

    #[test]
    fn test_notification_message() {
        // ---
        let new = request().into_new_reminder(now()).unwrap();
        let reminder = Reminder::new(new, now()).unwrap();
        let event = reminder.notification(now());

        assert_eq!(event.reminder_id, reminder.id);
        assert_eq!(event.message, "Reminder: Bus 3 departs from Keskustori in 5 minutes!");

        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("reminderId").is_some());
        assert!(json.get("departureTime").is_some());
    }

    #[test]
    fn test_status_text_round_trip() {
        // ---
        for status in [
            ReminderStatus::Pending,
            ReminderStatus::Triggered,
            ReminderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<ReminderStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<ReminderStatus>().is_err());
    }
}
