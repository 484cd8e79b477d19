//! Periodic sweeps of the partition state.
//!
//! A sweep never writes events. It appends commands that the engine then
//! processes like any other, so expiring a message or resending a lost
//! subscription command goes through the usual checks. The only state a
//! sweep touches itself is the sent time of what it resent.

use crate::behavior::BpmnBehaviors;
use crate::intent::{MessageIntent, MessageSubscriptionIntent, ProcessMessageSubscriptionIntent};
use crate::record::{MessageRecord, MessageSubscriptionRecord, ProcessMessageSubscriptionRecord};
use crate::state::{StoredMessage, SubscriptionStatus};
use crate::types::Key;

/// Appends an EXPIRE command for each message past its deadline, oldest
/// first and at most `expire_batch_limit` per sweep.
pub fn expire_messages(b: &mut BpmnBehaviors<'_>) -> usize {
    let limit = b.config.message.expire_batch_limit;
    let expired: Vec<StoredMessage> = b
        .state
        .messages
        .expired_before(b.now, limit)
        .into_iter()
        .filter_map(|key| b.state.messages.get(key).cloned())
        .collect();
    for message in &expired {
        b.command(
            message.key,
            MessageIntent::Expire,
            MessageRecord {
                name: message.name.clone(),
                correlation_key: message.correlation_key.clone(),
                time_to_live_ms: 0,
                deadline: message.deadline,
                variables: Vec::new(),
                message_id: message.message_id.clone(),
            },
        );
    }
    if !expired.is_empty() {
        tracing::debug!(count = expired.len(), "expiring messages");
    }
    expired.len()
}

/// Resends CORRELATE for message-side subscriptions whose process side has
/// not answered within the retry timeout.
pub fn resend_pending_correlations(b: &mut BpmnBehaviors<'_>) -> usize {
    let deadline = b.now.saturating_sub(b.config.subscription.pending_retry_timeout_ms);
    let mut pending: Vec<(Key, MessageSubscriptionRecord)> = Vec::new();
    b.state
        .message_subscriptions
        .visit_subscriptions_before(deadline, |subscription| {
            if subscription.correlating {
                pending.push((subscription.key, subscription.record.clone()));
            }
            true
        });

    for (key, record) in &pending {
        b.command(
            *key,
            ProcessMessageSubscriptionIntent::Correlate,
            ProcessMessageSubscriptionRecord::from_message_side(record),
        );
        b.state.message_subscriptions.update_sent_time(*key, b.now);
    }
    if !pending.is_empty() {
        tracing::debug!(count = pending.len(), "resent pending correlations");
    }
    pending.len()
}

/// Resends CREATE or DELETE for process-side subscriptions still waiting
/// for the message side to acknowledge.
pub fn resend_pending_subscription_commands(b: &mut BpmnBehaviors<'_>) -> usize {
    let deadline = b.now.saturating_sub(b.config.subscription.pending_retry_timeout_ms);
    let mut pending: Vec<(Key, SubscriptionStatus, ProcessMessageSubscriptionRecord)> = Vec::new();
    b.state
        .process_message_subscriptions
        .visit_subscriptions_before(deadline, |subscription| {
            if subscription.status != SubscriptionStatus::Opened {
                pending.push((subscription.key, subscription.status, subscription.record.clone()));
            }
            true
        });

    for (key, status, record) in &pending {
        let intent = match status {
            SubscriptionStatus::Closing => MessageSubscriptionIntent::Delete,
            _ => MessageSubscriptionIntent::Create,
        };
        b.command(*key, intent, MessageSubscriptionRecord::from_process_side(record));
        b.state.process_message_subscriptions.update_sent_time(*key, b.now);
    }
    if !pending.is_empty() {
        tracing::debug!(count = pending.len(), "resent pending subscription commands");
    }
    pending.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::testing::Harness;
    use crate::behavior::Services;
    use crate::clock::ControlledClock;
    use crate::intent::Intent;
    use std::sync::Arc;

    #[test]
    fn expired_messages_get_expire_commands() {
        let mut harness = Harness::new(&[]);
        harness.run(|b| {
            for (deadline, name) in [(500, "late"), (900, "later"), (5_000, "fresh")] {
                let key = b.next_key();
                b.emit(
                    key,
                    MessageIntent::Published,
                    MessageRecord {
                        name: name.to_string(),
                        deadline,
                        ..Default::default()
                    },
                )
                .unwrap();
            }
        });

        let before = harness.records.len();
        let count = harness.run(|b| expire_messages(b));
        assert_eq!(count, 2);
        let names: Vec<_> = harness.records[before..]
            .iter()
            .filter(|r| r.intent == Intent::Message(MessageIntent::Expire))
            .filter_map(|r| match &r.value {
                crate::record::RecordValue::Message(m) => Some(m.name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["late".to_string(), "later".to_string()]);
    }

    #[test]
    fn opening_subscription_is_resent_after_the_timeout() {
        let mut harness = Harness::new(&[]);
        harness.config.subscription.pending_retry_timeout_ms = 100;
        harness.run(|b| {
            let key = b.next_key();
            b.emit(
                key,
                ProcessMessageSubscriptionIntent::Creating,
                ProcessMessageSubscriptionRecord {
                    element_instance_key: 42,
                    message_name: "paid".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        });

        // Sent at 1000; nothing is due yet.
        assert_eq!(harness.run(|b| resend_pending_subscription_commands(b)), 0);

        harness.services = Services::new(Arc::new(ControlledClock::new(1_200)));
        let before = harness.records.len();
        assert_eq!(harness.run(|b| resend_pending_subscription_commands(b)), 1);
        assert_eq!(
            harness.records[before].intent,
            Intent::MessageSubscription(MessageSubscriptionIntent::Create)
        );

        // Sent again at 1200.
        assert_eq!(harness.run(|b| resend_pending_subscription_commands(b)), 0);
    }
}
