//! Plan validator — static checks run before anything is dispatched.
//!
//! Checks run in a fixed order and stop at the first failure:
//! 1. every tool is registered
//! 2. every required input is bound
//! 3. the plan is non-empty and within the step limit
//! 4. references point at an earlier step and a slot its tool declares
//!
//! Finally the dependency graph must admit a topological order.

use std::sync::Arc;
use tasksmith_core::error::ValidationFailure;
use tasksmith_core::plan::{Plan, ValidationState};
use tasksmith_core::tool::ToolRegistry;
use tracing::debug;

/// A plan the validator turned down, handed back marked `Invalid`.
#[derive(Debug)]
pub struct Rejection {
    pub plan: Plan,
    pub failure: ValidationFailure,
}

pub struct PlanValidator {
    registry: Arc<ToolRegistry>,
    max_steps: usize,
}

impl PlanValidator {
    pub fn new(registry: Arc<ToolRegistry>, max_steps: usize) -> Self {
        Self { registry, max_steps }
    }

    /// Validate and hand the plan back marked executable: `Valid` on the
    /// first attempt, `Repaired` after a re-synthesis. A rejected plan is
    /// returned with the failure, marked `Invalid`.
    pub fn validate(&self, plan: Plan) -> Result<Plan, Rejection> {
        if let Err(failure) = self.check(&plan) {
            let plan = plan.into_state(ValidationState::Invalid(failure.to_string()));
            return Err(Rejection { plan, failure });
        }
        let state = if plan.attempt > 1 {
            ValidationState::Repaired
        } else {
            ValidationState::Valid
        };
        debug!(plan_id = %plan.id, steps = plan.len(), state = ?state, "Plan validated");
        Ok(plan.into_state(state))
    }

    pub fn check(&self, plan: &Plan) -> Result<(), ValidationFailure> {
        for (pos, step) in plan.steps.iter().enumerate() {
            if !self.registry.contains(&step.tool) {
                return Err(ValidationFailure::UnknownTool {
                    step: pos,
                    tool: step.tool.clone(),
                });
            }
        }

        for (pos, step) in plan.steps.iter().enumerate() {
            let Some(descriptor) = self.registry.descriptor(&step.tool) else {
                continue;
            };
            if let Some(missing) = descriptor
                .required_params()
                .find(|p| !step.inputs.contains_key(&p.name))
            {
                return Err(ValidationFailure::MissingInput {
                    step: pos,
                    tool: step.tool.clone(),
                    input: missing.name.clone(),
                });
            }
        }

        if plan.is_empty() {
            return Err(ValidationFailure::EmptyPlan);
        }
        if plan.len() > self.max_steps {
            return Err(ValidationFailure::TooManySteps {
                count: plan.len(),
                max: self.max_steps,
            });
        }

        for (pos, step) in plan.steps.iter().enumerate() {
            for (_, referenced, output) in step.references() {
                if referenced == pos {
                    return Err(ValidationFailure::SelfReference { step: pos });
                }
                if referenced > pos {
                    return Err(ValidationFailure::ForwardReference { step: pos, referenced });
                }
                let produces = self
                    .registry
                    .descriptor(&plan.steps[referenced].tool)
                    .is_some_and(|d| d.produces(output));
                if !produces {
                    return Err(ValidationFailure::UnknownOutput {
                        step: pos,
                        referenced,
                        output: output.to_string(),
                    });
                }
            }
        }

        plan.dependency_graph()
            .waves()
            .map(|_| ())
            .map_err(|step| ValidationFailure::Cycle { step })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::standard_registry;
    use tasksmith_core::plan::{InputBinding, PlanStep};
    use tasksmith_core::task::TaskId;

    fn validator(max_steps: usize) -> PlanValidator {
        PlanValidator::new(Arc::new(standard_registry().0), max_steps)
    }

    fn search(pos: usize) -> PlanStep {
        PlanStep::new(pos, "web_search").input("query", InputBinding::literal("gold price"))
    }

    fn write(pos: usize, from: usize, slot: &str) -> PlanStep {
        PlanStep::new(pos, "text_writer")
            .input("instructions", InputBinding::literal("write"))
            .input("context", InputBinding::reference(from, slot))
    }

    fn plan(steps: Vec<PlanStep>) -> Plan {
        Plan::new(TaskId::new(), steps)
    }

    #[test]
    fn valid_plan_is_marked_valid() {
        let validated = validator(5).validate(plan(vec![search(0), write(1, 0, "results")])).unwrap();
        assert_eq!(validated.state, ValidationState::Valid);

        let waves = validated.dependency_graph().waves().unwrap();
        let order: Vec<usize> = waves.into_iter().flatten().collect();
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn repaired_plan_is_marked_repaired() {
        let validated = validator(5)
            .validate(plan(vec![search(0)]).with_attempt(2))
            .unwrap();
        assert_eq!(validated.state, ValidationState::Repaired);
    }

    #[test]
    fn rejects_unregistered_tool() {
        let err = validator(5)
            .validate(plan(vec![search(0), PlanStep::new(1, "calculator")]))
            .unwrap_err()
            .failure;
        assert_eq!(err, ValidationFailure::UnknownTool { step: 1, tool: "calculator".into() });
    }

    #[test]
    fn rejects_missing_required_input() {
        let err = validator(5).validate(plan(vec![PlanStep::new(0, "web_search")])).unwrap_err().failure;
        assert_eq!(err.reason(), "missing_input");
        assert!(err.to_string().contains("'query'"));
    }

    #[test]
    fn rejects_empty_and_oversized_plans() {
        assert_eq!(validator(5).validate(plan(vec![])).unwrap_err().failure, ValidationFailure::EmptyPlan);
        let err = validator(2)
            .validate(plan(vec![search(0), search(1), search(2)]))
            .unwrap_err()
            .failure;
        assert_eq!(err, ValidationFailure::TooManySteps { count: 3, max: 2 });
    }

    #[test]
    fn unknown_tool_is_reported_before_step_count() {
        let err = validator(1)
            .validate(plan(vec![search(0), PlanStep::new(1, "nope")]))
            .unwrap_err()
            .failure;
        assert_eq!(err.reason(), "unknown_tool");
    }

    #[test]
    fn rejects_forward_and_self_references() {
        let forward = plan(vec![
            search(0),
            write(1, 2, "results"),
            PlanStep::new(2, "web_search").input("query", InputBinding::literal("x")),
        ]);
        assert_eq!(
            validator(5).validate(forward).unwrap_err().failure,
            ValidationFailure::ForwardReference { step: 1, referenced: 2 }
        );

        let selfish = plan(vec![search(0), write(1, 1, "text")]);
        assert_eq!(
            validator(5).validate(selfish).unwrap_err().failure,
            ValidationFailure::SelfReference { step: 1 }
        );
    }

    #[test]
    fn rejects_reference_to_undeclared_output() {
        let err = validator(5)
            .validate(plan(vec![search(0), write(1, 0, "content")]))
            .unwrap_err()
            .failure;
        assert_eq!(
            err,
            ValidationFailure::UnknownOutput { step: 1, referenced: 0, output: "content".into() }
        );
    }

    #[test]
    fn rejected_plan_is_marked_invalid_with_the_reason() {
        let rejection = validator(5)
            .validate(plan(vec![search(0), write(1, 0, "content")]))
            .unwrap_err();
        match &rejection.plan.state {
            ValidationState::Invalid(reason) => {
                assert_eq!(reason, &rejection.failure.to_string());
                assert!(reason.contains("'content'"));
            }
            other => panic!("expected an invalid plan, got {other:?}"),
        }
        assert!(!rejection.plan.state.is_executable());
        assert_eq!(rejection.plan.len(), 2);
    }
}
