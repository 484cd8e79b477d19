//! Allowed transitions of an element instance.
//!
//! ```text
//! ACTIVATING ──► ACTIVATED ──► COMPLETING ──► COMPLETED ──► SEQUENCE_FLOW_TAKEN ──► ACTIVATING
//!      │             │              │
//!      └─────────────┴──────────────┴──► TERMINATING ──► TERMINATED
//! ```

use crate::intent::ProcessInstanceIntent;
use crate::intent::ProcessInstanceIntent::*;

/// Transition table, indexed by source state.
const TRANSITIONS: &[(ProcessInstanceIntent, &[ProcessInstanceIntent])] = &[
    (ElementActivating, &[ElementActivated, ElementTerminating]),
    (ElementActivated, &[ElementCompleting, ElementTerminating]),
    (ElementCompleting, &[ElementCompleted, ElementTerminating]),
    (ElementCompleted, &[SequenceFlowTaken]),
    (ElementTerminating, &[ElementTerminated]),
    (ElementTerminated, &[]),
    (SequenceFlowTaken, &[ElementActivating]),
];

pub fn can_transition(from: ProcessInstanceIntent, to: ProcessInstanceIntent) -> bool {
    TRANSITIONS
        .iter()
        .find(|(source, _)| *source == from)
        .is_some_and(|(_, targets)| targets.contains(&to))
}

pub fn can_terminate(state: ProcessInstanceIntent) -> bool {
    can_transition(state, ElementTerminating)
}

pub fn is_initial_state(state: ProcessInstanceIntent) -> bool {
    state == ElementActivating
}

pub fn is_final_state(state: ProcessInstanceIntent) -> bool {
    matches!(state, ElementCompleted | ElementTerminated)
}

/// States an element instance can rest in between commands.
pub fn is_element_instance_state(state: ProcessInstanceIntent) -> bool {
    matches!(
        state,
        ElementActivating | ElementActivated | ElementCompleting | ElementTerminating
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_allowed() {
        assert!(can_transition(ElementActivating, ElementActivated));
        assert!(can_transition(ElementActivated, ElementCompleting));
        assert!(can_transition(ElementCompleting, ElementCompleted));
        assert!(can_transition(ElementCompleted, SequenceFlowTaken));
        assert!(can_transition(SequenceFlowTaken, ElementActivating));
    }

    #[test]
    fn termination_only_from_non_final_states() {
        assert!(can_terminate(ElementActivating));
        assert!(can_terminate(ElementActivated));
        assert!(can_terminate(ElementCompleting));
        assert!(!can_terminate(ElementTerminating));
        assert!(!can_terminate(ElementCompleted));
        assert!(!can_terminate(ElementTerminated));
    }

    #[test]
    fn sequence_flow_only_after_completion() {
        assert!(!can_transition(ElementActivated, SequenceFlowTaken));
        assert!(!can_transition(ElementCompleting, SequenceFlowTaken));
        assert!(!can_transition(ElementTerminated, SequenceFlowTaken));
    }

    #[test]
    fn final_states() {
        assert!(is_final_state(ElementCompleted));
        assert!(is_final_state(ElementTerminated));
        assert!(!is_final_state(ElementActivated));
        assert!(is_initial_state(ElementActivating));
        assert!(!is_element_instance_state(ElementCompleted));
    }
}
