//! Which buffered message goes where.
//!
//! Messages are always visited in ascending key order, so the oldest
//! eligible message wins. A message is eligible for a bpmn process id when
//! it has not expired and was never correlated to that process id.

use crate::model::ElementGraph;
use crate::state::{EngineState, StoredMessage};
use crate::types::{Key, Timestamp};

/// A buffered message chosen for a start event.
#[derive(Debug, Clone, PartialEq)]
pub struct StartEventCorrelation {
    pub subscription_key: Key,
    pub message_key: Key,
}

/// First message `name`/`correlation_key` that may still be correlated to an
/// instance of `bpmn_process_id`.
pub fn first_correlatable_message<'s>(
    state: &'s EngineState,
    name: &str,
    correlation_key: &str,
    bpmn_process_id: &str,
    now: Timestamp,
) -> Option<&'s StoredMessage> {
    state
        .messages
        .messages_for(name, correlation_key)
        .find(|m| !m.is_expired(now) && !state.messages.exist_correlation(m.key, bpmn_process_id))
}

/// Lowest-key buffered message with `correlation_key` across every message
/// start event of the latest version of `bpmn_process_id`.
pub fn find_message_to_correlate(
    state: &EngineState,
    graph: &dyn ElementGraph,
    bpmn_process_id: &str,
    correlation_key: &str,
    now: Timestamp,
) -> Option<StartEventCorrelation> {
    let process = graph.latest_process(bpmn_process_id)?;
    state
        .message_start_subscriptions
        .subscriptions_of_definition(process.key)
        .into_iter()
        .filter_map(|(subscription_key, subscription)| {
            first_correlatable_message(
                state,
                &subscription.message_name,
                correlation_key,
                bpmn_process_id,
                now,
            )
            .map(|message| StartEventCorrelation {
                subscription_key,
                message_key: message.key,
            })
        })
        .min_by_key(|c| c.message_key)
}
