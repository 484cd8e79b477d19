//! Publishing and expiring messages.
//!
//! A published message is buffered until its deadline. On publish it is
//! offered to every waiting subscription and every message start event,
//! but to at most one subscription per bpmn process id.

use super::subscription::send_correlate;
use crate::behavior::BpmnBehaviors;
use crate::document;
use crate::error::EngineResult;
use crate::intent::MessageIntent;
use crate::record::{MessageRecord, MessageStartEventSubscriptionRecord, Record, RejectionType};
use crate::state::MessageSubscription;
use crate::types::Key;
use std::collections::BTreeSet;

pub(super) fn publish(b: &mut BpmnBehaviors<'_>, command: &Record, record: &MessageRecord) -> EngineResult<()> {
    if let Some(message_id) = record.message_id.as_deref().filter(|id| !id.is_empty()) {
        if b.state.messages.exist_message_id(&record.name, message_id) {
            b.reject(
                command,
                RejectionType::AlreadyExists,
                format!(
                    "Expected to publish a new message with id '{message_id}', but a message with that id was already published"
                ),
            );
            return Ok(());
        }
    }
    if let Err(err) = document::entries(&record.variables) {
        b.reject(
            command,
            RejectionType::InvalidArgument,
            format!("Expected message variables to be a valid document, but {err}"),
        );
        return Ok(());
    }

    let message_key = b.next_key();
    let published = MessageRecord {
        deadline: b.now.saturating_add(record.time_to_live_ms.max(0)),
        ..record.clone()
    };
    b.emit(message_key, MessageIntent::Published, published.clone())?;
    tracing::debug!(
        message_key,
        name = %published.name,
        correlation_key = %published.correlation_key,
        deadline = published.deadline,
        "message published"
    );

    correlate_to_subscriptions(b, message_key, &published)?;
    correlate_to_start_events(b, message_key, &published)?;

    if published.time_to_live_ms <= 0 {
        b.emit(message_key, MessageIntent::Expired, published)?;
    }
    Ok(())
}

pub(super) fn expire(b: &mut BpmnBehaviors<'_>, command: &Record) -> EngineResult<()> {
    let stored = command.key.and_then(|key| b.state.messages.get(key)).cloned();
    let Some(message) = stored else {
        b.reject(
            command,
            RejectionType::NotFound,
            format!(
                "Expected to expire message with key '{}', but no such message was found",
                command.key.unwrap_or_default()
            ),
        );
        return Ok(());
    };
    b.emit(
        message.key,
        MessageIntent::Expired,
        MessageRecord {
            name: message.name,
            correlation_key: message.correlation_key,
            time_to_live_ms: 0,
            deadline: message.deadline,
            variables: message.variables,
            message_id: message.message_id,
        },
    )?;
    tracing::debug!(message_key = message.key, "message expired");
    Ok(())
}

fn correlate_to_subscriptions(b: &mut BpmnBehaviors<'_>, message_key: Key, message: &MessageRecord) -> EngineResult<()> {
    let candidates: Vec<MessageSubscription> = b
        .state
        .message_subscriptions
        .subscriptions_for(&message.name, &message.correlation_key)
        .filter(|subscription| !subscription.correlating)
        .cloned()
        .collect();

    let mut correlated = BTreeSet::new();
    for subscription in candidates {
        let bpmn_process_id = &subscription.record.bpmn_process_id;
        if correlated.contains(bpmn_process_id) || b.state.messages.exist_correlation(message_key, bpmn_process_id) {
            continue;
        }
        send_correlate(b, subscription.key, &subscription.record, message_key, &message.variables)?;
        correlated.insert(bpmn_process_id.clone());
    }
    Ok(())
}

fn correlate_to_start_events(b: &mut BpmnBehaviors<'_>, message_key: Key, message: &MessageRecord) -> EngineResult<()> {
    let subscriptions: Vec<(Key, MessageStartEventSubscriptionRecord)> = b
        .state
        .message_start_subscriptions
        .subscriptions_for_message(&message.name)
        .into_iter()
        .map(|(key, record)| (key, record.clone()))
        .collect();

    for (subscription_key, subscription) in subscriptions {
        let bpmn_process_id = subscription.bpmn_process_id.clone();
        if b.state.messages.exist_correlation(message_key, &bpmn_process_id) {
            continue;
        }
        if !message.correlation_key.is_empty()
            && b.state
                .messages
                .exist_active_process_instance(&bpmn_process_id, &message.correlation_key)
        {
            // Picked up once the instance holding the lock ends.
            tracing::debug!(
                message_key,
                bpmn_process_id = %bpmn_process_id,
                correlation_key = %message.correlation_key,
                "message buffered behind active instance"
            );
            continue;
        }
        b.correlate_to_start_event(
            subscription_key,
            subscription,
            message_key,
            &message.correlation_key,
            &message.variables,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::testing::Harness;
    use crate::intent::{Intent, MessageStartEventSubscriptionIntent};
    use crate::record::RecordType;

    const PAYMENT: &str = r#"
id: payment
nodes:
  - kind: MessageStartEvent
    id: paid
    message: orderPaid
  - kind: EndEvent
    id: end
edges:
  - from: paid
    to: end
"#;

    fn publish_command(record: MessageRecord) -> Record {
        Record {
            position: 0,
            key: None,
            record_type: RecordType::Command,
            intent: MessageIntent::Publish.into(),
            value: record.into(),
            rejection: None,
        }
    }

    fn message(correlation_key: &str, ttl: i64) -> MessageRecord {
        MessageRecord {
            name: "orderPaid".to_string(),
            correlation_key: correlation_key.to_string(),
            time_to_live_ms: ttl,
            variables: document::empty_document(),
            ..Default::default()
        }
    }

    fn harness() -> Harness {
        let mut harness = Harness::new(&[PAYMENT]);
        harness.run(|b| b.open_start_event_subscriptions(1).unwrap());
        harness
    }

    #[test]
    fn duplicate_message_id_is_rejected() {
        let mut harness = harness();
        let record = MessageRecord {
            message_id: Some("m-1".to_string()),
            ..message("order-1", 10_000)
        };
        let command = publish_command(record.clone());
        harness.run(|b| publish(b, &command, &record).unwrap());
        harness.run(|b| publish(b, &command, &record).unwrap());

        let rejection = harness.records.last().unwrap();
        assert_eq!(rejection.record_type, RecordType::Rejection);
        assert_eq!(
            rejection.rejection.as_ref().unwrap().rejection_type,
            RejectionType::AlreadyExists
        );
    }

    #[test]
    fn second_message_waits_behind_the_lock() {
        let mut harness = harness();
        let first = message("order-1", 10_000);
        let second = message("order-1", 10_000);
        harness.run(|b| publish(b, &publish_command(first.clone()), &first).unwrap());
        harness.run(|b| publish(b, &publish_command(second.clone()), &second).unwrap());

        let started = harness
            .records
            .iter()
            .filter(|r| r.intent == Intent::MessageStartEventSubscription(MessageStartEventSubscriptionIntent::Correlated))
            .count();
        assert_eq!(started, 1);
        assert_eq!(harness.state.messages.len(), 2);
    }

    #[test]
    fn longest_ttl_keeps_the_message_until_the_end_of_time() {
        let mut harness = harness();
        let record = message("order-9", i64::MAX);
        harness.run(|b| publish(b, &publish_command(record.clone()), &record).unwrap());

        let deadline = harness.records.iter().find_map(|r| match (&r.intent, &r.value) {
            (Intent::Message(MessageIntent::Published), crate::record::RecordValue::Message(m)) => Some(m.deadline),
            _ => None,
        });
        assert_eq!(deadline, Some(i64::MAX));
        assert_eq!(harness.state.messages.len(), 1);
        assert!(harness.state.messages.expired_before(i64::MAX - 1, 10).is_empty());
    }

    #[test]
    fn zero_ttl_message_is_not_buffered() {
        let mut harness = harness();
        let record = message("", 0);
        harness.run(|b| publish(b, &publish_command(record.clone()), &record).unwrap());

        assert!(harness.state.messages.is_empty());
        assert!(harness
            .records
            .iter()
            .any(|r| r.intent == Intent::MessageStartEventSubscription(MessageStartEventSubscriptionIntent::Correlated)));
    }
}
