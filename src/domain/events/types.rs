//! Monitoring events
//!
//! Facts published by the stoppage detector for external subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::stoppage::{EquipmentStoppage, StoppageUrgency};

/// Event types for notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MonitoringEvent {
    StoppageDetected(StoppageDetectedEvent),
    StoppageEnded(StoppageEndedEvent),
}

impl MonitoringEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            MonitoringEvent::StoppageDetected(_) => "stoppage_detected",
            MonitoringEvent::StoppageEnded(_) => "stoppage_ended",
        }
    }

    pub fn line_id(&self) -> &str {
        match self {
            MonitoringEvent::StoppageDetected(e) => &e.line_id,
            MonitoringEvent::StoppageEnded(e) => &e.line_id,
        }
    }

    pub fn stoppage_id(&self) -> Uuid {
        match self {
            MonitoringEvent::StoppageDetected(e) => e.stoppage_id,
            MonitoringEvent::StoppageEnded(e) => e.stoppage_id,
        }
    }
}

/// A new stoppage was opened on a line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoppageDetectedEvent {
    pub stoppage_id: Uuid,
    pub line_id: String,
    pub work_order_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub requires_classification: bool,
    pub urgency: StoppageUrgency,
    pub summary: String,
}

impl StoppageDetectedEvent {
    pub fn from_stoppage(
        stoppage: &EquipmentStoppage,
        detected_at: DateTime<Utc>,
        classification_threshold_minutes: u32,
    ) -> Self {
        let duration_minutes = stoppage.duration_minutes(detected_at);
        let requires_classification =
            stoppage.requires_classification(detected_at, classification_threshold_minutes);
        let urgency = StoppageUrgency::for_duration(duration_minutes, requires_classification);
        let summary = format!(
            "Line {} stopped for {} min since {}{}",
            stoppage.line_id,
            duration_minutes,
            stoppage.start_time.format("%H:%M:%S"),
            if requires_classification {
                " (classification required)"
            } else {
                ""
            }
        );

        Self {
            stoppage_id: stoppage.id,
            line_id: stoppage.line_id.clone(),
            work_order_id: stoppage.work_order_id.clone(),
            start_time: stoppage.start_time,
            detected_at,
            duration_minutes,
            requires_classification,
            urgency,
            summary,
        }
    }
}

/// An open stoppage was closed because production resumed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoppageEndedEvent {
    pub stoppage_id: Uuid,
    pub line_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
}

impl StoppageEndedEvent {
    /// `None` while the stoppage is still open.
    pub fn from_stoppage(stoppage: &EquipmentStoppage) -> Option<Self> {
        let end_time = stoppage.end_time?;
        Some(Self {
            stoppage_id: stoppage.id,
            line_id: stoppage.line_id.clone(),
            start_time: stoppage.start_time,
            end_time,
            duration_minutes: stoppage.duration_minutes(end_time),
        })
    }
}

/// Envelope delivered to bus subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: MonitoringEvent,
}

impl EventMessage {
    pub fn new(event: MonitoringEvent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn detected_payload_reflects_duration() {
        let now = Utc::now();
        let stoppage = EquipmentStoppage::detected(
            "LINE-7",
            Some("WO-1".to_string()),
            now - Duration::minutes(16),
            5,
        );

        let event = StoppageDetectedEvent::from_stoppage(&stoppage, now, 5);
        assert_eq!(event.duration_minutes, 16);
        assert!(event.requires_classification);
        assert_eq!(event.urgency, StoppageUrgency::High);
        assert_eq!(event.work_order_id.as_deref(), Some("WO-1"));
        assert!(event.summary.contains("LINE-7"));
    }

    #[test]
    fn ended_payload_requires_closed_stoppage() {
        let now = Utc::now();
        let mut stoppage =
            EquipmentStoppage::detected("LINE-7", None, now - Duration::minutes(12), 5);
        assert!(StoppageEndedEvent::from_stoppage(&stoppage).is_none());

        stoppage.close(now).unwrap();
        let event = StoppageEndedEvent::from_stoppage(&stoppage).unwrap();
        assert_eq!(event.duration_minutes, 12);
        assert_eq!(event.end_time, now);
    }

    #[test]
    fn serializes_with_type_tag() {
        let now = Utc::now();
        let stoppage = EquipmentStoppage::detected("LINE-7", None, now - Duration::minutes(6), 5);
        let event = MonitoringEvent::StoppageDetected(StoppageDetectedEvent::from_stoppage(
            &stoppage, now, 5,
        ));

        let json = serde_json::to_value(EventMessage::new(event)).unwrap();
        assert_eq!(json["type"], "StoppageDetected");
        assert_eq!(json["data"]["line_id"], "LINE-7");
        assert!(json["id"].is_string());
    }
}
