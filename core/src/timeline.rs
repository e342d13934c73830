//! Append-only shipment timeline.
//!
//! A shipment's status is never stored. It is whatever the latest event says,
//! where "latest" is the maximum by `(created_at, sequence)`.
//!
//! [`Timeline::append`] only persists. Notifying the client about a status
//! change is the caller's job, see [`crate::lifecycle`].

use crate::environment::Clock;
use crate::error::{Result, ShipmentError};
use crate::providers::ShipmentRepository;
use crate::types::{EventId, Shipment, ShipmentEvent, ShipmentStatus};

/// Used when a caller supplies a blank description.
pub const FALLBACK_DESCRIPTION: &str = "Status update for shipment.";

/// Latest event of a timeline.
#[must_use]
pub fn latest(events: &[ShipmentEvent]) -> Option<&ShipmentEvent> {
    events
        .iter()
        .max_by_key(|event| (event.created_at, event.sequence))
}

/// Current status of a timeline, `None` when it is empty.
#[must_use]
pub fn derive_status(events: &[ShipmentEvent]) -> Option<ShipmentStatus> {
    latest(events).map(|event| event.status)
}

/// Default description for an event.
#[must_use]
pub fn describe(status: ShipmentStatus, location: u32) -> String {
    match status {
        ShipmentStatus::Placed => {
            format!("Shipment has been placed and is at location {location}.")
        }
        ShipmentStatus::InTransit => {
            format!("Shipment is in transit and currently at location {location}.")
        }
        ShipmentStatus::OutForDelivery => {
            format!("Shipment is out for delivery from location {location}.")
        }
        ShipmentStatus::Delivered => {
            format!("Shipment has been delivered to the destination from location {location}.")
        }
        ShipmentStatus::Cancelled => {
            format!("Shipment has been cancelled at location {location}.")
        }
    }
}

/// Result of an append.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendOutcome {
    /// The persisted event
    pub event: ShipmentEvent,
    /// Derived status before the append
    pub previous_status: Option<ShipmentStatus>,
}

impl AppendOutcome {
    /// Whether the append moved the derived status.
    #[must_use]
    pub fn status_changed(&self) -> bool {
        self.previous_status != Some(self.event.status)
    }
}

/// Writes timeline events through a [`ShipmentRepository`].
pub struct Timeline<'a, S> {
    repo: &'a S,
    clock: &'a dyn Clock,
}

impl<'a, S: ShipmentRepository> Timeline<'a, S> {
    /// Timeline writer over `repo`, stamping events with `clock`.
    #[must_use]
    pub fn new(repo: &'a S, clock: &'a dyn Clock) -> Self {
        Self { repo, clock }
    }

    /// Persist one event and push it onto `shipment.timeline`.
    ///
    /// Omitted `location` and `status` are inherited from the latest event.
    /// An omitted description is generated from the status and location.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The timeline is empty and `location` or `status` is missing → `ValidationError`
    /// - The repository write fails
    pub async fn append(
        &self,
        shipment: &mut Shipment,
        location: Option<u32>,
        status: Option<ShipmentStatus>,
        description: Option<String>,
    ) -> Result<AppendOutcome> {
        let latest_event = latest(&shipment.timeline);
        let previous_status = latest_event.map(|event| event.status);

        let location = location
            .or_else(|| latest_event.map(|event| event.location))
            .ok_or_else(|| {
                ShipmentError::ValidationError("location is required for the first event".into())
            })?;
        let status = status.or(previous_status).ok_or_else(|| {
            ShipmentError::ValidationError("status is required for the first event".into())
        })?;

        let description = match description {
            Some(text) if text.trim().is_empty() => FALLBACK_DESCRIPTION.to_string(),
            Some(text) => text,
            None => describe(status, location),
        };

        let sequence = shipment
            .timeline
            .iter()
            .map(|event| event.sequence)
            .max()
            .unwrap_or(0)
            + 1;

        let event = ShipmentEvent {
            id: EventId::new(),
            shipment_id: shipment.id,
            location,
            status,
            description,
            created_at: self.clock.now(),
            sequence,
        };

        self.repo.append_event(&event).await?;
        shipment.timeline.push(event.clone());

        tracing::debug!(
            shipment_id = %shipment.id,
            status = %event.status,
            location = event.location,
            sequence = event.sequence,
            "Appended timeline event"
        );

        Ok(AppendOutcome {
            event,
            previous_status,
        })
    }
}
