use crate::behavior::BpmnBehaviors;
use crate::document;
use crate::error::EngineResult;
use crate::intent::{ProcessInstanceIntent, SignalIntent};
use crate::record::{Record, RejectionType, SignalRecord, SignalSubscriptionRecord};

/// Broadcasts a signal to every element instance currently waiting for it.
/// Instances that cannot take a trigger right now miss the signal.
pub(super) fn broadcast(b: &mut BpmnBehaviors<'_>, command: &Record, record: &SignalRecord) -> EngineResult<()> {
    if let Err(err) = document::entries(&record.variables) {
        b.reject(
            command,
            RejectionType::InvalidArgument,
            format!("Expected signal variables to be a valid document, but {err}"),
        );
        return Ok(());
    }

    let key = b.next_key();
    b.emit(key, SignalIntent::Broadcasted, record.clone())?;

    let subscriptions: Vec<SignalSubscriptionRecord> = b
        .state
        .signal_subscriptions
        .subscriptions_for(&record.signal_name)
        .into_iter()
        .map(|(_, subscription)| subscription.clone())
        .collect();

    let mut triggered = 0usize;
    for subscription in subscriptions {
        let waiting_key = subscription.catch_event_instance_key;
        let accepting = b
            .state
            .element_instances
            .get(waiting_key)
            .is_some_and(|instance| instance.state == ProcessInstanceIntent::ElementActivated && !instance.interrupted)
            && b.state.element_instances.peek_trigger(waiting_key).is_none();
        if !accepting {
            continue;
        }
        let waiting = b.context_of(waiting_key)?;
        let catch = b.element_by_id(subscription.process_definition_key, &subscription.catch_element_id)?;
        b.trigger_catch(&waiting, catch, record.variables.clone())?;
        triggered += 1;
    }

    tracing::info!(signal_key = key, signal_name = %record.signal_name, triggered, "signal broadcast");
    Ok(())
}
