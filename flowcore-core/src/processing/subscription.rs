//! The two halves of a message subscription.
//!
//! The process side lives with the waiting element instance, the message
//! side with the buffered messages. They talk through commands only, and
//! every command the process side sends is acknowledged by the message
//! side (and the other way round), so a lost command is simply sent again
//! by the periodic sweep.

use crate::behavior::BpmnBehaviors;
use crate::correlation::first_correlatable_message;
use crate::error::EngineResult;
use crate::intent::{MessageSubscriptionIntent, ProcessInstanceIntent, ProcessMessageSubscriptionIntent};
use crate::record::{MessageSubscriptionRecord, ProcessMessageSubscriptionRecord, Record, RejectionType};
use crate::state::SubscriptionStatus;
use crate::types::Key;

/// Hands a message to the process side of a subscription. The subscription
/// stays correlating until the process side acknowledges or rejects it.
pub(super) fn send_correlate(
    b: &mut BpmnBehaviors<'_>,
    subscription_key: Key,
    subscription: &MessageSubscriptionRecord,
    message_key: Key,
    variables: &[u8],
) -> EngineResult<()> {
    let correlating = MessageSubscriptionRecord {
        message_key: Some(message_key),
        variables: variables.to_vec(),
        ..subscription.clone()
    };
    b.emit(subscription_key, MessageSubscriptionIntent::Correlating, correlating.clone())?;
    b.command(
        subscription_key,
        ProcessMessageSubscriptionIntent::Correlate,
        ProcessMessageSubscriptionRecord::from_message_side(&correlating),
    );
    tracing::debug!(
        subscription_key,
        message_key,
        element_instance_key = correlating.element_instance_key,
        "message correlating"
    );
    Ok(())
}

/// Offers the oldest correlatable buffered message to a subscription.
fn correlate_buffered_message(
    b: &mut BpmnBehaviors<'_>,
    subscription_key: Key,
    subscription: &MessageSubscriptionRecord,
) -> EngineResult<()> {
    let message = first_correlatable_message(
        &*b.state,
        &subscription.message_name,
        &subscription.correlation_key,
        &subscription.bpmn_process_id,
        b.now,
    )
    .map(|message| (message.key, message.variables.clone()));
    match message {
        Some((message_key, variables)) => send_correlate(b, subscription_key, subscription, message_key, &variables),
        None => Ok(()),
    }
}

fn command_key(b: &mut BpmnBehaviors<'_>, command: &Record) -> Key {
    match command.key {
        Some(key) => key,
        None => b.next_key(),
    }
}

// ── Message side ──

pub(super) fn process_message_side(
    b: &mut BpmnBehaviors<'_>,
    command: &Record,
    intent: MessageSubscriptionIntent,
    record: &MessageSubscriptionRecord,
) -> EngineResult<()> {
    match intent {
        MessageSubscriptionIntent::Create => create(b, command, record),
        MessageSubscriptionIntent::Correlate => acknowledge_correlation(b, command, record),
        MessageSubscriptionIntent::Reject => reject_correlation(b, command, record),
        MessageSubscriptionIntent::Delete => delete(b, command, record),
        other => {
            b.reject(
                command,
                RejectionType::InvalidArgument,
                format!("Expected a message subscription command, but got {other:?}"),
            );
            Ok(())
        }
    }
}

fn create(b: &mut BpmnBehaviors<'_>, command: &Record, record: &MessageSubscriptionRecord) -> EngineResult<()> {
    let key = command_key(b, command);
    let ack = ProcessMessageSubscriptionRecord::from_message_side(record);

    if b
        .state
        .message_subscriptions
        .get_for_element(record.element_instance_key, &record.message_name)
        .is_some()
    {
        b.reject(
            command,
            RejectionType::AlreadyExists,
            format!(
                "Expected to open a new message subscription for element with key '{}' and message name '{}', but there is already a message subscription for that element key and message name opened",
                record.element_instance_key, record.message_name
            ),
        );
        // A retried CREATE: the first acknowledgement may have been lost.
        b.command(key, ProcessMessageSubscriptionIntent::Create, ack);
        return Ok(());
    }

    let created = MessageSubscriptionRecord {
        message_key: None,
        variables: Vec::new(),
        ..record.clone()
    };
    b.emit(key, MessageSubscriptionIntent::Created, created.clone())?;
    b.command(key, ProcessMessageSubscriptionIntent::Create, ack);
    correlate_buffered_message(b, key, &created)
}

fn acknowledge_correlation(
    b: &mut BpmnBehaviors<'_>,
    command: &Record,
    record: &MessageSubscriptionRecord,
) -> EngineResult<()> {
    let subscription = command
        .key
        .and_then(|key| b.state.message_subscriptions.get(key))
        .cloned();
    let Some(subscription) = subscription.filter(|s| s.correlating && s.record.message_key == record.message_key) else {
        b.reject(
            command,
            RejectionType::NotFound,
            format!(
                "Expected to correlate subscription for element with key '{}' and message name '{}', but no such correlating subscription was found",
                record.element_instance_key, record.message_name
            ),
        );
        return Ok(());
    };

    b.emit(subscription.key, MessageSubscriptionIntent::Correlated, subscription.record.clone())?;
    if !subscription.record.interrupting {
        correlate_buffered_message(b, subscription.key, &subscription.record)?;
    }
    Ok(())
}

fn reject_correlation(b: &mut BpmnBehaviors<'_>, command: &Record, record: &MessageSubscriptionRecord) -> EngineResult<()> {
    let subscription = command
        .key
        .and_then(|key| b.state.message_subscriptions.get(key))
        .cloned();
    let Some(subscription) = subscription.filter(|s| s.correlating && s.record.message_key == record.message_key) else {
        b.reject(
            command,
            RejectionType::InvalidState,
            format!(
                "Expected subscription for element with key '{}' and message name '{}' to be correlating, but it was not",
                record.element_instance_key, record.message_name
            ),
        );
        return Ok(());
    };

    b.emit(subscription.key, MessageSubscriptionIntent::Rejected, subscription.record.clone())?;
    tracing::debug!(
        subscription_key = subscription.key,
        message_key = ?subscription.record.message_key,
        "message correlation rejected"
    );

    // The message may still go to another instance of the same process.
    let Some(message) = subscription
        .record
        .message_key
        .and_then(|message_key| b.state.messages.get(message_key))
        .filter(|message| !message.is_expired(b.now))
        .cloned()
    else {
        return Ok(());
    };
    let other = b
        .state
        .message_subscriptions
        .subscriptions_for(&message.name, &message.correlation_key)
        .find(|s| {
            s.key != subscription.key
                && !s.correlating
                && s.record.bpmn_process_id == subscription.record.bpmn_process_id
        })
        .map(|s| (s.key, s.record.clone()));
    if let Some((other_key, other)) = other {
        send_correlate(b, other_key, &other, message.key, &message.variables)?;
    }
    Ok(())
}

fn delete(b: &mut BpmnBehaviors<'_>, command: &Record, record: &MessageSubscriptionRecord) -> EngineResult<()> {
    let key = command_key(b, command);
    let existing = b
        .state
        .message_subscriptions
        .get_for_element(record.element_instance_key, &record.message_name)
        .map(|s| (s.key, s.record.clone()));
    match existing {
        Some((subscription_key, subscription)) => {
            b.emit(subscription_key, MessageSubscriptionIntent::Deleted, subscription)?;
        }
        None => b.reject(
            command,
            RejectionType::NotFound,
            format!(
                "Expected to close message subscription for element with key '{}' and message name '{}', but no such message subscription exists",
                record.element_instance_key, record.message_name
            ),
        ),
    }
    b.command(
        key,
        ProcessMessageSubscriptionIntent::Delete,
        ProcessMessageSubscriptionRecord::from_message_side(record),
    );
    Ok(())
}

// ── Process side ──

pub(super) fn process_process_side(
    b: &mut BpmnBehaviors<'_>,
    command: &Record,
    intent: ProcessMessageSubscriptionIntent,
    record: &ProcessMessageSubscriptionRecord,
) -> EngineResult<()> {
    match intent {
        ProcessMessageSubscriptionIntent::Create => opened(b, command, record),
        ProcessMessageSubscriptionIntent::Correlate => correlate(b, command, record),
        ProcessMessageSubscriptionIntent::Delete => closed(b, command, record),
        other => {
            b.reject(
                command,
                RejectionType::InvalidArgument,
                format!("Expected a process message subscription command, but got {other:?}"),
            );
            Ok(())
        }
    }
}

fn opened(b: &mut BpmnBehaviors<'_>, command: &Record, record: &ProcessMessageSubscriptionRecord) -> EngineResult<()> {
    let subscription = b
        .state
        .process_message_subscriptions
        .get(record.element_instance_key, &record.message_name)
        .cloned();
    match subscription {
        Some(subscription) if subscription.status == SubscriptionStatus::Opening => {
            b.emit(subscription.key, ProcessMessageSubscriptionIntent::Created, subscription.record)
        }
        Some(subscription) => {
            b.reject(
                command,
                RejectionType::InvalidState,
                format!(
                    "Expected subscription to be opening, but it was {:?}",
                    subscription.status
                ),
            );
            Ok(())
        }
        None => {
            b.reject(
                command,
                RejectionType::NotFound,
                format!(
                    "Expected subscription for element with key '{}' and message name '{}' to be present, but it was not",
                    record.element_instance_key, record.message_name
                ),
            );
            Ok(())
        }
    }
}

fn correlate(b: &mut BpmnBehaviors<'_>, command: &Record, record: &ProcessMessageSubscriptionRecord) -> EngineResult<()> {
    let element_instance_key = record.element_instance_key;
    let accepting = b
        .state
        .element_instances
        .get(element_instance_key)
        .is_some_and(|instance| instance.state == ProcessInstanceIntent::ElementActivated && !instance.interrupted)
        && b.state.element_instances.peek_trigger(element_instance_key).is_none();
    let subscription = b
        .state
        .process_message_subscriptions
        .get(element_instance_key, &record.message_name)
        .filter(|s| s.status != SubscriptionStatus::Closing)
        .cloned();

    let Some(subscription) = subscription.filter(|_| accepting) else {
        b.reject(
            command,
            RejectionType::InvalidState,
            format!(
                "Expected element instance with key '{element_instance_key}' to wait for message '{}', but it does not",
                record.message_name
            ),
        );
        let key = command_key(b, command);
        b.command(key, MessageSubscriptionIntent::Reject, MessageSubscriptionRecord::from_process_side(record));
        return Ok(());
    };

    let correlated = ProcessMessageSubscriptionRecord {
        message_key: record.message_key,
        variables: record.variables.clone(),
        ..subscription.record.clone()
    };
    b.emit(subscription.key, ProcessMessageSubscriptionIntent::Correlated, correlated.clone())?;

    let waiting = b.context_of(element_instance_key)?;
    let catch = b.element_by_id(waiting.record.process_definition_key, &subscription.record.element_id)?;
    b.trigger_catch(&waiting, catch, record.variables.clone())?;
    b.command(
        subscription.key,
        MessageSubscriptionIntent::Correlate,
        MessageSubscriptionRecord::from_process_side(&correlated),
    );
    tracing::info!(
        element_instance_key,
        catch_element = %catch.id,
        message_name = %correlated.message_name,
        message_key = ?correlated.message_key,
        "message correlated"
    );
    Ok(())
}

fn closed(b: &mut BpmnBehaviors<'_>, command: &Record, record: &ProcessMessageSubscriptionRecord) -> EngineResult<()> {
    let subscription = b
        .state
        .process_message_subscriptions
        .get(record.element_instance_key, &record.message_name)
        .cloned();
    match subscription {
        Some(subscription) => b.emit(subscription.key, ProcessMessageSubscriptionIntent::Deleted, subscription.record),
        None => {
            b.reject(
                command,
                RejectionType::NotFound,
                format!(
                    "Expected subscription for element with key '{}' and message name '{}' to be closing, but it was not found",
                    record.element_instance_key, record.message_name
                ),
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::testing::Harness;
    use crate::document::{empty_document, from_json};
    use crate::intent::{Intent, MessageIntent};
    use crate::record::{MessageRecord, RecordType};
    use serde_json::json;

    fn command(key: Key, intent: impl Into<crate::intent::Intent>, value: impl Into<crate::record::RecordValue>) -> Record {
        Record {
            position: 0,
            key: Some(key),
            record_type: RecordType::Command,
            intent: intent.into(),
            value: value.into(),
            rejection: None,
        }
    }

    fn subscription(element_instance_key: Key, bpmn_process_id: &str) -> MessageSubscriptionRecord {
        MessageSubscriptionRecord {
            process_instance_key: element_instance_key,
            element_instance_key,
            bpmn_process_id: bpmn_process_id.to_string(),
            message_name: "paid".to_string(),
            correlation_key: "order-1".to_string(),
            message_key: None,
            variables: Vec::new(),
            interrupting: true,
        }
    }

    fn buffer_message(harness: &mut Harness) -> Key {
        harness.run(|b| {
            let key = b.next_key();
            b.emit(
                key,
                MessageIntent::Published,
                MessageRecord {
                    name: "paid".to_string(),
                    correlation_key: "order-1".to_string(),
                    time_to_live_ms: 60_000,
                    deadline: 61_000,
                    variables: from_json(&json!({"amount": 5})).unwrap(),
                    message_id: None,
                },
            )
            .unwrap();
            key
        })
    }

    fn written_intents(harness: &Harness, from: usize) -> Vec<(RecordType, Intent)> {
        harness.records[from..]
            .iter()
            .map(|r| (r.record_type, r.intent))
            .collect()
    }

    #[test]
    fn create_acknowledges_and_correlates_a_buffered_message() {
        let mut harness = Harness::new(&[]);
        let message_key = buffer_message(&mut harness);
        let record = subscription(100, "order");
        let create = command(200, MessageSubscriptionIntent::Create, record.clone());

        let before = harness.records.len();
        harness.run(|b| process_message_side(b, &create, MessageSubscriptionIntent::Create, &record).unwrap());

        assert_eq!(
            written_intents(&harness, before),
            vec![
                (RecordType::Event, Intent::MessageSubscription(MessageSubscriptionIntent::Created)),
                (RecordType::Command, Intent::ProcessMessageSubscription(ProcessMessageSubscriptionIntent::Create)),
                (RecordType::Event, Intent::MessageSubscription(MessageSubscriptionIntent::Correlating)),
                (RecordType::Command, Intent::ProcessMessageSubscription(ProcessMessageSubscriptionIntent::Correlate)),
            ]
        );
        let stored = harness.state.message_subscriptions.get(200).unwrap();
        assert!(stored.correlating);
        assert_eq!(stored.record.message_key, Some(message_key));
        assert!(harness.state.messages.exist_correlation(message_key, "order"));
    }

    #[test]
    fn duplicate_create_is_rejected_but_acknowledged() {
        let mut harness = Harness::new(&[]);
        let record = subscription(100, "order");
        let create = command(200, MessageSubscriptionIntent::Create, record.clone());
        harness.run(|b| process_message_side(b, &create, MessageSubscriptionIntent::Create, &record).unwrap());

        let before = harness.records.len();
        harness.run(|b| process_message_side(b, &create, MessageSubscriptionIntent::Create, &record).unwrap());
        assert_eq!(
            written_intents(&harness, before),
            vec![
                (RecordType::Rejection, Intent::MessageSubscription(MessageSubscriptionIntent::Create)),
                (RecordType::Command, Intent::ProcessMessageSubscription(ProcessMessageSubscriptionIntent::Create)),
            ]
        );
    }

    #[test]
    fn rejected_message_goes_to_another_instance_of_the_same_process() {
        let mut harness = Harness::new(&[]);
        let message_key = buffer_message(&mut harness);
        let first = subscription(100, "order");
        let second = subscription(101, "order");
        harness.run(|b| {
            process_message_side(b, &command(200, MessageSubscriptionIntent::Create, first.clone()), MessageSubscriptionIntent::Create, &first).unwrap();
            process_message_side(b, &command(201, MessageSubscriptionIntent::Create, second.clone()), MessageSubscriptionIntent::Create, &second).unwrap();
        });
        assert!(harness.state.message_subscriptions.get(200).unwrap().correlating);
        assert!(!harness.state.message_subscriptions.get(201).unwrap().correlating);

        let rejected = MessageSubscriptionRecord {
            message_key: Some(message_key),
            ..first.clone()
        };
        let reject = command(200, MessageSubscriptionIntent::Reject, rejected.clone());
        harness.run(|b| process_message_side(b, &reject, MessageSubscriptionIntent::Reject, &rejected).unwrap());

        assert!(!harness.state.message_subscriptions.get(200).unwrap().correlating);
        let other = harness.state.message_subscriptions.get(201).unwrap();
        assert!(other.correlating);
        assert_eq!(other.record.message_key, Some(message_key));
    }

    #[test]
    fn delete_of_unknown_subscription_still_acknowledges() {
        let mut harness = Harness::new(&[]);
        let record = subscription(100, "order");
        let delete_command = command(200, MessageSubscriptionIntent::Delete, record.clone());

        harness.run(|b| process_message_side(b, &delete_command, MessageSubscriptionIntent::Delete, &record).unwrap());
        assert_eq!(
            written_intents(&harness, 0),
            vec![
                (RecordType::Rejection, Intent::MessageSubscription(MessageSubscriptionIntent::Delete)),
                (RecordType::Command, Intent::ProcessMessageSubscription(ProcessMessageSubscriptionIntent::Delete)),
            ]
        );
    }

    #[test]
    fn correlate_for_a_missing_instance_is_rejected_back() {
        let mut harness = Harness::new(&[]);
        let record = ProcessMessageSubscriptionRecord {
            message_key: Some(7),
            variables: empty_document(),
            ..ProcessMessageSubscriptionRecord::from_message_side(&subscription(100, "order"))
        };
        let correlate_command = command(200, ProcessMessageSubscriptionIntent::Correlate, record.clone());

        harness.run(|b| {
            process_process_side(b, &correlate_command, ProcessMessageSubscriptionIntent::Correlate, &record).unwrap()
        });
        assert_eq!(
            written_intents(&harness, 0),
            vec![
                (RecordType::Rejection, Intent::ProcessMessageSubscription(ProcessMessageSubscriptionIntent::Correlate)),
                (RecordType::Command, Intent::MessageSubscription(MessageSubscriptionIntent::Reject)),
            ]
        );
    }
}
