//! Containers of element instances and the notifications they receive.
//!
//! A child reaches its container through the flow scope key of its record.
//! The root instance of a called process has no flow scope; its container is
//! the call activity that created it. Only the root of a process instance
//! that was not called has no container at all.

use super::{multi_instance, process};
use crate::behavior::{BpmnBehaviors, BpmnElementContext};
use crate::error::{EngineError, EngineResult, ProcessingResult};
use crate::intent::ProcessInstanceIntent;
use crate::model::ExecutableElement;
use crate::types::ElementType;

#[derive(Debug, Clone, PartialEq)]
pub enum Container {
    /// The process, sub-process or multi-instance body the child runs in.
    FlowScope(BpmnElementContext),
    /// The call activity that created the called process instance.
    CallingActivity(BpmnElementContext),
    None,
}

impl<'a> BpmnBehaviors<'a> {
    pub fn container_of(&self, child: &BpmnElementContext) -> EngineResult<Container> {
        if let Some(scope_key) = child.flow_scope_key() {
            let scope = self
                .state
                .element_instances
                .get(scope_key)
                .ok_or(EngineError::MissingFlowScope(scope_key))?;
            return Ok(Container::FlowScope(BpmnElementContext::new(
                scope_key,
                scope.state,
                scope.value.clone(),
            )));
        }
        let calling = child
            .record
            .parent_element_instance_key
            .and_then(|key| self.state.element_instances.get(key));
        Ok(match calling {
            Some(call_activity) => Container::CallingActivity(BpmnElementContext::new(
                call_activity.key,
                call_activity.state,
                call_activity.value.clone(),
            )),
            None => Container::None,
        })
    }

    /// An active, uninterrupted scope without pending execution paths.
    fn is_completable(&self, scope: &BpmnElementContext) -> bool {
        self.state.element_instances.get(scope.key).is_some_and(|instance| {
            instance.state == ProcessInstanceIntent::ElementActivated
                && !instance.interrupted
                && !instance.has_pending_execution_paths()
        })
    }

    fn container_element(&self, scope: &BpmnElementContext) -> EngineResult<&'a ExecutableElement> {
        let element = self.element(&scope.record)?;
        if element.element_type.is_container() {
            Ok(element)
        } else {
            Err(EngineError::NotAContainer(element.id.clone()))
        }
    }

    // ── Notifications ──

    /// Called right after a child entered ACTIVATING.
    pub fn on_element_activating(&mut self, child: &BpmnElementContext) -> ProcessingResult<()> {
        match self.container_of(child)? {
            Container::FlowScope(scope) if scope.element_type() == ElementType::MultiInstanceBody => {
                let body = self.container_element(&scope)?;
                multi_instance::on_child_activating(self, body, &scope, child)
            }
            _ => Ok(()),
        }
    }

    /// Called before a child at the end of an execution path completes.
    /// Returns true when the container's completion condition holds.
    pub fn before_execution_path_completed(&mut self, child: &BpmnElementContext) -> ProcessingResult<bool> {
        match self.container_of(child)? {
            Container::FlowScope(scope) => match scope.element_type() {
                ElementType::MultiInstanceBody => {
                    let body = self.container_element(&scope)?;
                    multi_instance::before_child_completed(self, body, &scope, child)
                }
                ElementType::Process | ElementType::SubProcess => Ok(false),
                _ => Err(EngineError::NotAContainer(scope.element_id().to_string()).into()),
            },
            Container::CallingActivity(_) | Container::None => Ok(false),
        }
    }

    /// Called after a child at the end of an execution path completed.
    pub fn after_execution_path_completed(
        &mut self,
        child: &BpmnElementContext,
        satisfied: bool,
    ) -> ProcessingResult<()> {
        match self.container_of(child)? {
            Container::FlowScope(scope) => match scope.element_type() {
                ElementType::MultiInstanceBody => {
                    let body = self.container_element(&scope)?;
                    multi_instance::after_child_completed(self, body, &scope, child, satisfied)
                }
                ElementType::Process | ElementType::SubProcess => {
                    if self.is_completable(&scope) {
                        self.complete_element(&scope);
                    }
                    Ok(())
                }
                _ => Err(EngineError::NotAContainer(scope.element_id().to_string()).into()),
            },
            Container::CallingActivity(_) | Container::None => Ok(()),
        }
    }

    /// Called after a child terminated.
    pub fn on_element_terminated(&mut self, child: &BpmnElementContext) -> ProcessingResult<()> {
        match self.container_of(child)? {
            Container::FlowScope(scope) => {
                let idle = !self
                    .state
                    .element_instances
                    .get(scope.key)
                    .is_some_and(|i| i.has_pending_execution_paths());
                if !idle {
                    return Ok(());
                }
                match (scope.intent, scope.element_type()) {
                    (ProcessInstanceIntent::ElementTerminating, ElementType::Process) => {
                        process::finish_process_termination(self, &scope)
                    }
                    (ProcessInstanceIntent::ElementTerminating, _) => {
                        self.finish_termination(&scope)?;
                        Ok(())
                    }
                    (ProcessInstanceIntent::ElementActivated, ElementType::MultiInstanceBody) => {
                        if self.is_completable(&scope) {
                            self.complete_element(&scope);
                        }
                        Ok(())
                    }
                    _ => Ok(()),
                }
            }
            Container::CallingActivity(call_activity) => self.on_called_process_terminated(&call_activity),
            Container::None => Ok(()),
        }
    }

    // ── Call activities ──

    /// Hands the variables of a completed called process to its call
    /// activity and completes it.
    pub fn on_called_process_completed(&mut self, completed: &BpmnElementContext, variables: Vec<u8>) -> ProcessingResult<()> {
        let Container::CallingActivity(call_activity) = self.container_of(completed)? else {
            return Ok(());
        };
        if call_activity.intent != ProcessInstanceIntent::ElementActivated {
            return Ok(());
        }
        self.trigger_event(&call_activity, &call_activity.record.element_id, variables, false)?;
        self.complete_element(&call_activity);
        Ok(())
    }

    pub fn on_called_process_terminated(&mut self, call_activity: &BpmnElementContext) -> ProcessingResult<()> {
        if call_activity.intent == ProcessInstanceIntent::ElementTerminating {
            self.finish_termination(call_activity)?;
        }
        Ok(())
    }

    /// Activates `element` next to `ctx`, in the same flow scope.
    pub fn activate_element_instance_in_flow_scope(&mut self, ctx: &BpmnElementContext, element: &ExecutableElement) {
        self.new_command(
            ProcessInstanceIntent::ActivateElement,
            ctx.record_for(element, ctx.flow_scope_key()),
        );
    }
}
