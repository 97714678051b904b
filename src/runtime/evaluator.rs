//! Transition eligibility and selection
//!
//! Given the current state and the entity record, decides which outgoing
//! transition (if any) fires. Transitions are checked in declared order and
//! the first eligible one wins.

use crate::entity::EntityRecord;
use crate::functions::{FunctionRegistry, FunctionRole};
use crate::runtime::condition::evaluate_group;
use crate::runtime::engine::EngineError;
use crate::workflow::types::{Condition, State, Transition, WorkflowDescriptor};
use std::sync::Arc;

/// Which transitions take part in selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionFilter {
    /// Only AUTOMATIC transitions, as used by automatic chaining
    Automatic,
    /// Every transition regardless of kind
    Any,
}

impl TransitionFilter {
    fn admits(&self, transition: &Transition) -> bool {
        match self {
            TransitionFilter::Automatic => transition.kind.is_automatic(),
            TransitionFilter::Any => true,
        }
    }
}

/// The transition chosen to fire
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedTransition<'a> {
    pub name: &'a str,
    pub transition: &'a Transition,
}

impl<'a> SelectedTransition<'a> {
    /// Target state
    pub fn next(&self) -> &'a str {
        &self.transition.next
    }
}

/// Evaluates transition conditions against entity records
#[derive(Debug, Clone)]
pub struct TransitionEvaluator {
    /// Criterion lookup for function conditions
    functions: Arc<FunctionRegistry>,
}

impl TransitionEvaluator {
    pub fn new(functions: Arc<FunctionRegistry>) -> Self {
        Self { functions }
    }

    /// Whether `transition` may fire for `record`
    ///
    /// No condition means always eligible. A criterion that is not registered
    /// is an error rather than "not eligible".
    pub fn is_eligible(&self, transition: &Transition, record: &EntityRecord) -> Result<bool, EngineError> {
        match &transition.condition {
            None => Ok(true),
            Some(Condition::Function { function }) => {
                let criterion = self.functions.criterion(&function.name).ok_or_else(|| {
                    EngineError::UnresolvedFunction {
                        role: FunctionRole::Criterion,
                        name: function.name.clone(),
                    }
                })?;
                Ok(criterion.check(record))
            }
            Some(Condition::Group(group)) => Ok(evaluate_group(group, record)),
        }
    }

    /// First eligible transition of `state` admitted by `filter`
    pub fn select_transition<'a>(
        &self,
        state: &'a State,
        record: &EntityRecord,
        filter: TransitionFilter,
    ) -> Result<Option<SelectedTransition<'a>>, EngineError> {
        for (name, transition) in state.transitions.iter() {
            if !filter.admits(transition) {
                continue;
            }
            if self.is_eligible(transition, record)? {
                tracing::debug!("Transition '{}' -> '{}' is eligible", name, transition.next);
                return Ok(Some(SelectedTransition {
                    name,
                    transition,
                }));
            }
            tracing::debug!("Transition '{}' is not eligible", name);
        }
        Ok(None)
    }

    /// Name of the state the first eligible transition leads to, if any
    pub fn next_state(
        &self,
        descriptor: &WorkflowDescriptor,
        current_state: &str,
        record: &EntityRecord,
    ) -> Result<Option<String>, EngineError> {
        let state = descriptor
            .state(current_state)
            .ok_or_else(|| EngineError::UnknownState {
                workflow: descriptor.workflow_name.clone(),
                state: current_state.to_string(),
            })?;

        Ok(self
            .select_transition(state, record, TransitionFilter::Any)?
            .map(|selected| selected.next().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::ordered::OrderedMap;
    use crate::workflow::types::{ConditionGroup, GroupOperator, OperatorType, Predicate};
    use serde_json::json;

    fn record(value: serde_json::Value) -> EntityRecord {
        value.as_object().cloned().unwrap()
    }

    fn evaluator() -> TransitionEvaluator {
        let mut functions = FunctionRegistry::new();
        functions.register_criterion("is_vip", |record: &EntityRecord| {
            record.get("vip") == Some(&json!(true))
        });
        TransitionEvaluator::new(Arc::new(functions))
    }

    fn single_step() -> WorkflowDescriptor {
        WorkflowDescriptor {
            version: None,
            workflow_name: "single".into(),
            description: None,
            initial_state: "s0".into(),
            states: OrderedMap::new()
                .with("s0", State {
                    transitions: OrderedMap::new().with("t1", Transition::to("s1")),
                })
                .with("s1", State::default()),
        }
    }

    #[test]
    fn unconditional_transition_always_fires() {
        let evaluator = evaluator();
        let descriptor = single_step();

        for data in [json!({}), json!({"anything": [1, 2, 3]})] {
            assert_eq!(
                evaluator.next_state(&descriptor, "s0", &record(data)).unwrap(),
                Some("s1".to_string())
            );
        }
        assert_eq!(evaluator.next_state(&descriptor, "s1", &record(json!({}))).unwrap(), None);
        assert!(matches!(
            evaluator.next_state(&descriptor, "nowhere", &record(json!({}))),
            Err(EngineError::UnknownState { .. })
        ));
    }

    #[test]
    fn first_eligible_transition_wins() {
        let state = State {
            transitions: OrderedMap::new()
                .with(
                    "vip_lane",
                    Transition::to("priority").with_condition(Condition::function("is_vip")),
                )
                .with(
                    "in_stock",
                    Transition::to("ready").with_condition(Condition::Group(ConditionGroup::new(
                        GroupOperator::And,
                        vec![Predicate::simple("qty", OperatorType::GreaterThan, json!(0))],
                    ))),
                )
                .with("fallback", Transition::to("backorder")),
        };
        let evaluator = evaluator();

        let pick = |data| {
            evaluator
                .select_transition(&state, &record(data), TransitionFilter::Any)
                .unwrap()
                .map(|s| s.name.to_string())
        };

        assert_eq!(pick(json!({"vip": true, "qty": 5})), Some("vip_lane".into()));
        assert_eq!(pick(json!({"qty": 5})), Some("in_stock".into()));
        assert_eq!(pick(json!({"qty": 0})), Some("fallback".into()));
    }

    #[test]
    fn automatic_filter_skips_manual_transitions() {
        let state = State {
            transitions: OrderedMap::new()
                .with("approve", Transition::to("approved").manual())
                .with("expire", Transition::to("expired").with_condition(Condition::Group(
                    ConditionGroup::new(
                        GroupOperator::And,
                        vec![Predicate::simple("age", OperatorType::GreaterOrEqual, json!(30))],
                    ),
                ))),
        };
        let evaluator = evaluator();

        let fresh = record(json!({"age": 1}));
        assert!(evaluator
            .select_transition(&state, &fresh, TransitionFilter::Automatic)
            .unwrap()
            .is_none());
        assert_eq!(
            evaluator
                .select_transition(&state, &fresh, TransitionFilter::Any)
                .unwrap()
                .map(|s| s.next()),
            Some("approved")
        );
    }

    #[test]
    fn unregistered_criterion_is_an_error() {
        let transition = Transition::to("x").with_condition(Condition::function("ghost"));
        let err = evaluator().is_eligible(&transition, &record(json!({}))).unwrap_err();
        assert!(matches!(
            err,
            EngineError::UnresolvedFunction { role: FunctionRole::Criterion, ref name } if name == "ghost"
        ));
    }
}
