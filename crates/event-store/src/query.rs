use chrono::{DateTime, Utc};

use crate::{AggregateId, EventEnvelope};

/// Filter over the event log, used by audit and replay tooling.
///
/// Results are always returned in log insertion order.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Filter by aggregate ID.
    pub aggregate_id: Option<AggregateId>,

    /// Filter by event types (any of these types).
    pub event_types: Option<Vec<String>>,

    /// Events that occurred at or after this instant.
    pub from_timestamp: Option<DateTime<Utc>>,

    /// Events that occurred at or before this instant.
    pub to_timestamp: Option<DateTime<Utc>>,

    /// Maximum number of events to return.
    pub limit: Option<usize>,

    /// Number of matching events to skip.
    pub offset: Option<usize>,
}

impl EventQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for a specific aggregate.
    pub fn for_aggregate(aggregate_id: AggregateId) -> Self {
        Self {
            aggregate_id: Some(aggregate_id),
            ..Default::default()
        }
    }

    /// Creates a query for events of a specific type.
    pub fn for_event_type(event_type: impl Into<String>) -> Self {
        Self {
            event_types: Some(vec![event_type.into()]),
            ..Default::default()
        }
    }

    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types = Some(vec![event_type.into()]);
        self
    }

    /// Filters by multiple event types (any of these).
    pub fn event_types(mut self, event_types: Vec<String>) -> Self {
        self.event_types = Some(event_types);
        self
    }

    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Whether `envelope` passes every filter of this query.
    ///
    /// Paging (`limit`/`offset`) is not considered here.
    pub fn matches(&self, envelope: &EventEnvelope) -> bool {
        if let Some(id) = self.aggregate_id
            && envelope.aggregate_id() != id
        {
            return false;
        }
        if let Some(ref types) = self.event_types
            && !types.iter().any(|t| t == envelope.event_type())
        {
            return false;
        }
        if let Some(from) = self.from_timestamp
            && envelope.occurred_at() < from
        {
            return false;
        }
        if let Some(to) = self.to_timestamp
            && envelope.occurred_at() > to
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn envelope(aggregate_id: AggregateId, event_type: &str, at: DateTime<Utc>) -> EventEnvelope {
        EventEnvelope::new(aggregate_id, event_type, "{}", at)
    }

    #[test]
    fn query_for_aggregate() {
        let id = AggregateId::new();
        let query = EventQuery::for_aggregate(id);

        assert_eq!(query.aggregate_id, Some(id));
        assert!(query.event_types.is_none());
    }

    #[test]
    fn query_for_event_type() {
        let query = EventQuery::for_event_type("CustomerCreated");

        assert!(query.aggregate_id.is_none());
        assert_eq!(query.event_types, Some(vec!["CustomerCreated".to_string()]));
    }

    #[test]
    fn matches_applies_every_filter() {
        let id = AggregateId::new();
        let now = Utc::now();
        let query = EventQuery::for_aggregate(id)
            .event_types(vec!["CustomerCreated".into(), "CustomerEmailChanged".into()])
            .from_timestamp(now - Duration::minutes(1))
            .to_timestamp(now + Duration::minutes(1));

        assert!(query.matches(&envelope(id, "CustomerCreated", now)));
        assert!(!query.matches(&envelope(AggregateId::new(), "CustomerCreated", now)));
        assert!(!query.matches(&envelope(id, "Unrelated", now)));
        assert!(!query.matches(&envelope(id, "CustomerCreated", now - Duration::hours(1))));
        assert!(!query.matches(&envelope(id, "CustomerCreated", now + Duration::hours(1))));
    }

    #[test]
    fn empty_query_matches_everything() {
        let query = EventQuery::new().limit(10).offset(5);
        assert!(query.matches(&envelope(AggregateId::new(), "Anything", Utc::now())));
    }
}
