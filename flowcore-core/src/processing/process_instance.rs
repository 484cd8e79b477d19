//! ACTIVATE, COMPLETE and TERMINATE commands of element instances, and the
//! client's CANCEL of a process instance.
//!
//! The checks here reject commands that arrive too late, e.g. a COMPLETE
//! for an instance that is already being terminated. Everything past the
//! checks is a lifecycle step of the element's processor.

use super::element;
use crate::behavior::BpmnBehaviors;
use crate::error::EngineResult;
use crate::intent::ProcessInstanceIntent;
use crate::lifecycle::can_terminate;
use crate::record::{ProcessInstanceRecord, Record, RejectionType};
use crate::state::ElementInstance;
use crate::types::{ElementType, Key};

pub(super) fn process(
    b: &mut BpmnBehaviors<'_>,
    command: &Record,
    intent: ProcessInstanceIntent,
    record: &ProcessInstanceRecord,
) -> EngineResult<()> {
    match intent {
        ProcessInstanceIntent::ActivateElement => activate(b, command, record),
        ProcessInstanceIntent::CompleteElement => complete(b, command),
        ProcessInstanceIntent::TerminateElement => terminate(b, command),
        ProcessInstanceIntent::Cancel => cancel(b, command),
        other => {
            b.reject(
                command,
                RejectionType::InvalidArgument,
                format!("Expected a process instance command, but got {other:?}"),
            );
            Ok(())
        }
    }
}

fn activate(b: &mut BpmnBehaviors<'_>, command: &Record, record: &ProcessInstanceRecord) -> EngineResult<()> {
    // The root of a called process hangs off the call activity instead.
    let parent = record.flow_scope_key.or(record.parent_element_instance_key);
    if let Some(parent_key) = parent {
        let reason = match b.state.element_instances.get(parent_key) {
            None => Some(format!(
                "Expected flow scope instance with key '{parent_key}' to be present, but it was not found"
            )),
            Some(scope) if scope.state != ProcessInstanceIntent::ElementActivated => Some(format!(
                "Expected flow scope instance with key '{parent_key}' to be in state ELEMENT_ACTIVATED, but it was {:?}",
                scope.state
            )),
            Some(scope) if scope.interrupted => Some(format!(
                "Expected flow scope instance with key '{parent_key}' to accept new children, but it is being interrupted"
            )),
            Some(_) => None,
        };
        if let Some(reason) = reason {
            b.reject(command, RejectionType::InvalidState, reason);
            return Ok(());
        }
    }
    element::activate_element(b, command.key, record.clone(), false)
}

fn lookup<'s>(b: &'s BpmnBehaviors<'_>, command: &Record, action: &str) -> Result<&'s ElementInstance, (RejectionType, String)> {
    let key: Option<Key> = command.key;
    key.and_then(|key| b.state.element_instances.get(key)).ok_or_else(|| {
        (
            RejectionType::NotFound,
            format!(
                "Expected to {action} element instance with key '{}', but no such element instance was found",
                key.map_or_else(|| "none".to_string(), |k| k.to_string())
            ),
        )
    })
}

fn complete(b: &mut BpmnBehaviors<'_>, command: &Record) -> EngineResult<()> {
    let checked = lookup(b, command, "complete").and_then(|instance| {
        if instance.state != ProcessInstanceIntent::ElementActivated {
            Err((
                RejectionType::InvalidState,
                format!(
                    "Expected element instance with key '{}' to be in state ELEMENT_ACTIVATED, but it was {:?}",
                    instance.key, instance.state
                ),
            ))
        } else if instance.interrupted {
            Err((
                RejectionType::InvalidState,
                format!("Expected element instance with key '{}' to complete, but it is being interrupted", instance.key),
            ))
        } else if instance.has_pending_execution_paths() {
            Err((
                RejectionType::InvalidState,
                format!(
                    "Expected element instance with key '{}' to have no active children, but {} are active",
                    instance.key,
                    instance.active_children + instance.active_sequence_flows
                ),
            ))
        } else {
            Ok(instance.key)
        }
    });
    match checked {
        Ok(key) => {
            let ctx = b.context_of(key)?;
            element::complete_element(b, &ctx, false)
        }
        Err((rejection_type, reason)) => {
            b.reject(command, rejection_type, reason);
            Ok(())
        }
    }
}

fn terminate(b: &mut BpmnBehaviors<'_>, command: &Record) -> EngineResult<()> {
    let checked = lookup(b, command, "terminate").and_then(|instance| {
        if can_terminate(instance.state) {
            Ok(instance.key)
        } else {
            Err((
                RejectionType::InvalidState,
                format!(
                    "Expected element instance with key '{}' to be terminable, but it is in state {:?}",
                    instance.key, instance.state
                ),
            ))
        }
    });
    match checked {
        Ok(key) => {
            let ctx = b.context_of(key)?;
            element::terminate_element(b, &ctx)
        }
        Err((rejection_type, reason)) => {
            b.reject(command, rejection_type, reason);
            Ok(())
        }
    }
}

/// Only a root process instance can be cancelled. Inner elements end with
/// their flow scope, and a called process ends with its call activity.
fn cancel(b: &mut BpmnBehaviors<'_>, command: &Record) -> EngineResult<()> {
    let checked = lookup(b, command, "cancel").and_then(|instance| {
        let key = instance.key;
        if instance.value.element_type != ElementType::Process {
            Err((
                RejectionType::NotFound,
                format!("Expected to cancel a process instance with key '{key}', but no such process was found"),
            ))
        } else if let Some(parent) = instance.value.parent_process_instance_key {
            Err((
                RejectionType::InvalidState,
                format!(
                    "Expected to cancel a process instance with key '{key}', but it is created by a parent process instance. Cancel the root process instance '{parent}' instead."
                ),
            ))
        } else if !can_terminate(instance.state) {
            Err((
                RejectionType::InvalidState,
                format!(
                    "Expected to cancel a process instance with key '{key}', but it is in state {:?}",
                    instance.state
                ),
            ))
        } else {
            Ok(key)
        }
    });
    match checked {
        Ok(key) => {
            let ctx = b.context_of(key)?;
            element::terminate_element(b, &ctx)
        }
        Err((rejection_type, reason)) => {
            b.reject(command, rejection_type, reason);
            Ok(())
        }
    }
}
