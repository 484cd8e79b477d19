use crate::behavior::BpmnBehaviors;
use crate::document;
use crate::error::EngineResult;
use crate::intent::VariableDocumentIntent;
use crate::record::{Record, RejectionType, VariableDocumentRecord};

/// Sets variables from outside the process. With `local` every field lands
/// in the given scope; otherwise each field updates the nearest scope that
/// already holds it, or the process instance scope.
pub(super) fn update(b: &mut BpmnBehaviors<'_>, command: &Record, record: &VariableDocumentRecord) -> EngineResult<()> {
    if !b.state.element_instances.contains(record.scope_key) {
        b.reject(
            command,
            RejectionType::NotFound,
            format!(
                "Expected to update variables for element with key '{}', but no such element was found",
                record.scope_key
            ),
        );
        return Ok(());
    }
    if let Err(err) = document::entries(&record.variables) {
        b.reject(
            command,
            RejectionType::InvalidArgument,
            format!("Expected document to be a valid map, but {err}"),
        );
        return Ok(());
    }

    let scope = b.context_of(record.scope_key)?.scope();
    if record.local {
        b.merge_local_document(scope, &record.variables)?;
    } else {
        b.merge_document(scope, &record.variables)?;
    }
    let key = b.next_key();
    b.emit(key, VariableDocumentIntent::Updated, record.clone())
}
