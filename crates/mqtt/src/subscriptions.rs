//! Correlates subscribe requests with broker acknowledgements.
//!
//! rumqttc assigns packet ids when a request leaves the event loop, and
//! requests leave in the order they were queued. The tracker pairs each
//! `Outgoing::Subscribe(pkid)` with the oldest queued filter so a later
//! SUBACK can be reported against the filter it belongs to.

use std::collections::{HashMap, VecDeque};

use rumqttc::v5::mqttbytes::v5 as v5_packets;
use rumqttc::{SubAck, SubscribeReasonCode};

use crate::events::BusEvent;

#[derive(Debug, Default)]
pub struct SubscriptionTracker {
    queued: VecDeque<String>,
    in_flight: HashMap<u16, String>,
}

impl SubscriptionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A subscribe request for `filter` was handed to the client.
    pub fn queued(&mut self, filter: impl Into<String>) {
        self.queued.push_back(filter.into());
    }

    /// The oldest queued request was written with packet id `pkid`.
    pub fn sent(&mut self, pkid: u16) {
        if let Some(filter) = self.queued.pop_front() {
            self.in_flight.insert(pkid, filter);
        }
    }

    /// Turns a SUBACK into per-filter events.
    pub fn acknowledged(&mut self, ack: &SubAck) -> Vec<BusEvent> {
        let outcomes = ack.return_codes.iter().map(|code| match code {
            SubscribeReasonCode::Success(_) => None,
            SubscribeReasonCode::Failure => Some("rejected by broker".to_string()),
        });
        self.resolve(ack.pkid, outcomes)
    }

    /// Turns an MQTT 5 SUBACK into per-filter events.
    pub fn acknowledged_v5(&mut self, ack: &v5_packets::SubAck) -> Vec<BusEvent> {
        let outcomes = ack.return_codes.iter().map(|code| match code {
            v5_packets::SubscribeReasonCode::Success(_) => None,
            other => Some(format!("rejected by broker: {:?}", other)),
        });
        self.resolve(ack.pkid, outcomes)
    }

    fn resolve(
        &mut self,
        pkid: u16,
        outcomes: impl Iterator<Item = Option<String>>,
    ) -> Vec<BusEvent> {
        let Some(filter) = self.in_flight.remove(&pkid) else {
            return Vec::new();
        };

        outcomes
            .map(|failure| match failure {
                None => BusEvent::Subscribed {
                    filter: filter.clone(),
                },
                Some(reason) => BusEvent::SubscriptionFailed {
                    filter: filter.clone(),
                    reason,
                },
            })
            .collect()
    }

    /// Forgets pending requests after the connection dropped.
    pub fn reset(&mut self) {
        self.queued.clear();
        self.in_flight.clear();
    }

    pub fn pending(&self) -> usize {
        self.queued.len() + self.in_flight.len()
    }
}
