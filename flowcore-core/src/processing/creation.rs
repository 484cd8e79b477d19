use crate::behavior::{BpmnBehaviors, VariableScope};
use crate::document;
use crate::error::EngineResult;
use crate::intent::{ProcessInstanceCreationIntent, ProcessInstanceIntent};
use crate::model::{ElementGraph, ExecutableProcess};
use crate::record::{ProcessInstanceCreationRecord, ProcessInstanceRecord, Record, RejectionType};
use crate::types::ElementType;

/// Starts a new instance at the none start event of a deployed process.
/// The creation variables become root-scope variables of the instance.
pub(super) fn create(
    b: &mut BpmnBehaviors<'_>,
    command: &Record,
    record: &ProcessInstanceCreationRecord,
) -> EngineResult<()> {
    let graph: &dyn ElementGraph = b.graph;
    let process: Option<&ExecutableProcess> = if record.process_definition_key == 0 {
        graph.latest_process(&record.bpmn_process_id)
    } else {
        graph.process(record.process_definition_key)
    };
    let Some(process) = process else {
        b.reject(
            command,
            RejectionType::NotFound,
            format!(
                "Expected to find process definition with process ID '{}', but none found",
                record.bpmn_process_id
            ),
        );
        return Ok(());
    };
    let Some(root) = process.root().filter(|root| root.none_start_event.is_some()) else {
        b.reject(
            command,
            RejectionType::InvalidArgument,
            format!(
                "Expected to create instance of process with none start event, but there is no such event in '{}'",
                process.bpmn_process_id
            ),
        );
        return Ok(());
    };
    if let Err(err) = document::entries(&record.variables) {
        b.reject(
            command,
            RejectionType::InvalidArgument,
            format!("Expected variables to be a valid document, but {err}"),
        );
        return Ok(());
    }

    let process_instance_key = b.next_key();
    let instance = ProcessInstanceRecord {
        bpmn_process_id: process.bpmn_process_id.clone(),
        process_definition_key: process.key,
        process_instance_key,
        element_id: root.id.clone(),
        element_type: ElementType::Process,
        event_type: root.event_type,
        flow_scope_key: None,
        parent_process_instance_key: None,
        parent_element_instance_key: None,
    };
    b.merge_local_document(VariableScope::new(process_instance_key, &instance), &record.variables)?;
    b.emit(
        process_instance_key,
        ProcessInstanceCreationIntent::Created,
        ProcessInstanceCreationRecord {
            bpmn_process_id: process.bpmn_process_id.clone(),
            process_definition_key: process.key,
            process_instance_key: Some(process_instance_key),
            variables: record.variables.clone(),
        },
    )?;
    b.command(process_instance_key, ProcessInstanceIntent::ActivateElement, instance);

    tracing::info!(
        bpmn_process_id = %process.bpmn_process_id,
        version = process.version,
        process_instance_key,
        "process instance created"
    );
    Ok(())
}
