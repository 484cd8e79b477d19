use super::element;
use crate::behavior::BpmnBehaviors;
use crate::error::EngineResult;
use crate::intent::ProcessInstanceBatchIntent;
use crate::lifecycle::can_terminate;
use crate::record::{ProcessInstanceBatchRecord, Record};

/// Terminates the next chunk of children of `batch_element_instance_key`
/// and schedules the rest as another batch command.
pub(super) fn terminate(
    b: &mut BpmnBehaviors<'_>,
    command: &Record,
    record: &ProcessInstanceBatchRecord,
) -> EngineResult<()> {
    let batch_size = b.config.processing.terminate_batch_size.max(1);
    let pending: Vec<_> = b
        .state
        .element_instances
        .children(record.batch_element_instance_key)
        .filter(|child| record.index.map_or(true, |index| child.key > index))
        .filter(|child| can_terminate(child.state))
        .map(|child| child.key)
        .collect();

    let (chunk, rest) = pending.split_at(pending.len().min(batch_size));
    for child_key in chunk {
        let child = b.context_of(*child_key)?;
        element::terminate_element(b, &child)?;
    }

    if let (Some(last), false) = (chunk.last(), rest.is_empty()) {
        let key = match command.key {
            Some(key) => key,
            None => b.next_key(),
        };
        b.command(
            key,
            ProcessInstanceBatchIntent::Terminate,
            ProcessInstanceBatchRecord {
                index: Some(*last),
                ..record.clone()
            },
        );
        tracing::debug!(
            scope_key = record.batch_element_instance_key,
            terminated = chunk.len(),
            remaining = rest.len(),
            "termination batch continued"
        );
    }
    Ok(())
}
