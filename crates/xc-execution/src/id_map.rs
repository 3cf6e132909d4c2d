//! Internal order id → venue order id mapping.
//!
//! After a successful `VenueAdapter::place_order`, the venue assigns its own
//! order identifier. Cancel operations MUST target the **venue** id —
//! sending the internal `intent_id` to a live venue will silently cancel the
//! wrong order (or 404). `VenueOrderMap` is the in-memory store that tracks
//! `intent_id -> venue_order_id` so the rest of the OrderManager never has
//! to carry both ids around by hand.
//!
//! Callers must:
//! 1. Call [`VenueOrderMap::register`] immediately after every successful
//!    place, using the `intent_id` and the `venue_order_id` the adapter
//!    returned.
//! 2. Call [`VenueOrderMap::venue_id`] before every cancel to obtain the
//!    correct venue target. A `None` result means the mapping is missing and
//!    the operation MUST be aborted — never fabricate a venue id.
//! 3. Call [`VenueOrderMap::deregister`] when an order reaches a terminal
//!    state (Filled, Canceled, Rejected) to keep the map bounded.

use std::collections::HashMap;

/// Maps `intent_id -> venue_order_id`. Not `Sync`; wrap in a `Mutex` for
/// concurrent access.
#[derive(Clone, Debug, Default)]
pub struct VenueOrderMap {
    map: HashMap<String, String>,
}

impl VenueOrderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites any existing mapping for `intent_id` — an idempotent
    /// retry that the venue accepted again still resolves to the latest
    /// venue id.
    pub fn register(&mut self, intent_id: impl Into<String>, venue_order_id: impl Into<String>) {
        self.map.insert(intent_id.into(), venue_order_id.into());
    }

    pub fn venue_id(&self, intent_id: &str) -> Option<&str> {
        self.map.get(intent_id).map(|s| s.as_str())
    }

    pub fn intent_id_for_venue(&self, venue_order_id: &str) -> Option<&str> {
        self.map
            .iter()
            .find(|(_, v)| v.as_str() == venue_order_id)
            .map(|(k, _)| k.as_str())
    }

    pub fn deregister(&mut self, intent_id: &str) {
        self.map.remove(intent_id);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_lookup_round_trips() {
        let mut map = VenueOrderMap::new();
        map.register("intent-1", "venue-1");
        assert_eq!(map.venue_id("intent-1"), Some("venue-1"));
        assert_eq!(map.intent_id_for_venue("venue-1"), Some("intent-1"));
    }

    #[test]
    fn unknown_intent_resolves_to_none() {
        let map = VenueOrderMap::new();
        assert_eq!(map.venue_id("nope"), None);
    }

    #[test]
    fn deregister_removes_mapping() {
        let mut map = VenueOrderMap::new();
        map.register("intent-1", "venue-1");
        map.deregister("intent-1");
        assert!(map.is_empty());
    }

    #[test]
    fn re_register_overwrites_prior_venue_id() {
        let mut map = VenueOrderMap::new();
        map.register("intent-1", "venue-1");
        map.register("intent-1", "venue-2");
        assert_eq!(map.venue_id("intent-1"), Some("venue-2"));
    }
}
