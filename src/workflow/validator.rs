//! Static descriptor validation
//!
//! Runs before a descriptor is handed to the registry. Validation is batch:
//! every violated invariant produces one [`ValidationError`] so authors can fix
//! all problems in one pass instead of one per deployment attempt.

use crate::functions::{FunctionCatalog, FunctionRole};
use crate::workflow::types::{
    Condition, ConditionGroup, GroupOperator, Predicate, Transition, WorkflowDescriptor,
};
use serde::Serialize;

/// One violated descriptor invariant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("workflow_name must not be empty")]
    EmptyWorkflowName,

    #[error("initial state '{state}' is not defined")]
    MissingInitialState { state: String },

    #[error("state '{state}' is declared more than once")]
    DuplicateState { state: String },

    #[error("state '{state}' declares transition '{transition}' more than once")]
    DuplicateTransition { state: String, transition: String },

    #[error("transition '{state}.{transition}' targets undefined state '{target}'")]
    UnknownTarget {
        state: String,
        transition: String,
        target: String,
    },

    #[error("transition '{state}.{transition}' has a malformed {role} name '{name}'")]
    MalformedFunctionName {
        state: String,
        transition: String,
        role: FunctionRole,
        name: String,
    },

    #[error("transition '{state}.{transition}' references unregistered {role} '{name}'")]
    UnregisteredFunction {
        state: String,
        transition: String,
        role: FunctionRole,
        name: String,
    },

    #[error("transition '{state}.{transition}' uses unknown group operator '{operator}'")]
    UnknownGroupOperator {
        state: String,
        transition: String,
        operator: String,
    },

    #[error("transition '{state}.{transition}' uses unknown operatorType '{operator}' at '{json_path}'")]
    UnknownOperatorType {
        state: String,
        transition: String,
        json_path: String,
        operator: String,
    },

    #[error("transition '{state}.{transition}' has a predicate with an empty jsonPath")]
    EmptyJsonPath { state: String, transition: String },

    #[error("transition '{state}.{transition}' has a NOT group with {count} parameters, expected exactly one")]
    NotArity {
        state: String,
        transition: String,
        count: usize,
    },

    #[error("transition '{state}.{transition}' uses {operator} at '{json_path}' without a [low, high] value")]
    RangeValue {
        state: String,
        transition: String,
        json_path: String,
        operator: String,
    },
}

/// Validate a descriptor against the names known to `catalog`
///
/// Pure: the descriptor and catalog are only read. An empty result means the
/// descriptor can be registered.
pub fn validate<C>(descriptor: &WorkflowDescriptor, catalog: &C) -> Vec<ValidationError>
where
    C: FunctionCatalog + ?Sized,
{
    let mut errors = Vec::new();

    if descriptor.workflow_name.trim().is_empty() {
        errors.push(ValidationError::EmptyWorkflowName);
    }

    if !descriptor.states.contains_key(&descriptor.initial_state) {
        errors.push(ValidationError::MissingInitialState {
            state: descriptor.initial_state.clone(),
        });
    }

    for state in descriptor.states.duplicate_keys() {
        errors.push(ValidationError::DuplicateState {
            state: state.to_string(),
        });
    }

    for (state_name, state) in descriptor.states.iter() {
        for transition in state.transitions.duplicate_keys() {
            errors.push(ValidationError::DuplicateTransition {
                state: state_name.to_string(),
                transition: transition.to_string(),
            });
        }

        for (transition_name, transition) in state.transitions.iter() {
            let location = Location {
                state: state_name,
                transition: transition_name,
            };
            validate_transition(descriptor, catalog, &location, transition, &mut errors);
        }
    }

    errors
}

/// A function name is well formed when it looks like an identifier:
/// ASCII letter or `_` first, then ASCII alphanumerics, `_`, `-` or `.`.
pub fn is_well_formed_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

struct Location<'a> {
    state: &'a str,
    transition: &'a str,
}

impl Location<'_> {
    fn state(&self) -> String {
        self.state.to_string()
    }

    fn transition(&self) -> String {
        self.transition.to_string()
    }
}

fn validate_transition<C>(
    descriptor: &WorkflowDescriptor,
    catalog: &C,
    location: &Location<'_>,
    transition: &Transition,
    errors: &mut Vec<ValidationError>,
) where
    C: FunctionCatalog + ?Sized,
{
    if !descriptor.states.contains_key(&transition.next) {
        errors.push(ValidationError::UnknownTarget {
            state: location.state(),
            transition: location.transition(),
            target: transition.next.clone(),
        });
    }

    if let Some(action) = &transition.action {
        check_function(catalog, location, FunctionRole::Processor, &action.name, errors);
    }

    match &transition.condition {
        Some(Condition::Function { function }) => {
            check_function(catalog, location, FunctionRole::Criterion, &function.name, errors);
        }
        Some(Condition::Group(group)) => check_group(location, group, errors),
        None => {}
    }
}

fn check_function<C>(
    catalog: &C,
    location: &Location<'_>,
    role: FunctionRole,
    name: &str,
    errors: &mut Vec<ValidationError>,
) where
    C: FunctionCatalog + ?Sized,
{
    if !is_well_formed_name(name) {
        errors.push(ValidationError::MalformedFunctionName {
            state: location.state(),
            transition: location.transition(),
            role,
            name: name.to_string(),
        });
        return;
    }

    let registered = match role {
        FunctionRole::Processor => catalog.has_processor(name),
        FunctionRole::Criterion => catalog.has_criterion(name),
    };

    if !registered {
        errors.push(ValidationError::UnregisteredFunction {
            state: location.state(),
            transition: location.transition(),
            role,
            name: name.to_string(),
        });
    }
}

fn check_group(location: &Location<'_>, group: &ConditionGroup, errors: &mut Vec<ValidationError>) {
    match &group.operator {
        GroupOperator::Unknown(raw) => errors.push(ValidationError::UnknownGroupOperator {
            state: location.state(),
            transition: location.transition(),
            operator: raw.clone(),
        }),
        GroupOperator::Not if group.parameters.len() != 1 => {
            errors.push(ValidationError::NotArity {
                state: location.state(),
                transition: location.transition(),
                count: group.parameters.len(),
            })
        }
        _ => {}
    }

    for predicate in &group.parameters {
        match predicate {
            Predicate::Group(nested) => check_group(location, nested, errors),
            Predicate::Simple(simple) => {
                if simple.json_path.trim().is_empty() {
                    errors.push(ValidationError::EmptyJsonPath {
                        state: location.state(),
                        transition: location.transition(),
                    });
                }

                if !simple.operator_type.is_known() {
                    errors.push(ValidationError::UnknownOperatorType {
                        state: location.state(),
                        transition: location.transition(),
                        json_path: simple.json_path.clone(),
                        operator: simple.operator_type.to_string(),
                    });
                } else if simple.operator_type.is_range()
                    && !simple.value.as_array().is_some_and(|bounds| bounds.len() == 2)
                {
                    errors.push(ValidationError::RangeValue {
                        state: location.state(),
                        transition: location.transition(),
                        json_path: simple.json_path.clone(),
                        operator: simple.operator_type.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::RegisteredNames;
    use crate::workflow::ordered::OrderedMap;
    use crate::workflow::types::State;
    use serde_json::json;

    fn catalog() -> RegisteredNames {
        RegisteredNames::new(["process_create_pet"], ["is_available"])
    }

    fn valid_descriptor() -> WorkflowDescriptor {
        WorkflowDescriptor::from_json(
            r#"{
                "workflow_name": "pet",
                "initial_state": "none",
                "states": {
                    "none": {"transitions": {
                        "create": {"next": "available", "action": {"name": "process_create_pet"}}
                    }},
                    "available": {"transitions": {
                        "adopt": {
                            "next": "adopted",
                            "condition": {"type": "function", "function": {"name": "is_available"}}
                        },
                        "restock": {
                            "next": "available",
                            "condition": {"type": "group", "operator": "OR", "parameters": [
                                {"type": "simple", "jsonPath": "qty", "operatorType": "BETWEEN", "value": [0, 5]},
                                {"type": "group", "operator": "NOT", "parameters": [
                                    {"type": "simple", "jsonPath": "$.status", "operatorType": "IS_NULL"}
                                ]}
                            ]}
                        }
                    }},
                    "adopted": {}
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn valid_descriptor_has_no_errors() {
        assert_eq!(validate(&valid_descriptor(), &catalog()), vec![]);
    }

    #[test]
    fn reports_missing_initial_state_and_unknown_target() {
        let mut descriptor = valid_descriptor();
        descriptor.initial_state = "start".into();
        descriptor.states = OrderedMap::new()
            .with("none", State {
                transitions: OrderedMap::new().with("go", Transition::to("nowhere")),
            });

        let errors = validate(&descriptor, &catalog());
        assert_eq!(
            errors,
            vec![
                ValidationError::MissingInitialState { state: "start".into() },
                ValidationError::UnknownTarget {
                    state: "none".into(),
                    transition: "go".into(),
                    target: "nowhere".into(),
                },
            ]
        );
    }

    #[test]
    fn reports_every_problem_in_one_pass() {
        let descriptor = WorkflowDescriptor::from_json(
            r#"{
                "workflow_name": "",
                "initial_state": "a",
                "states": {
                    "a": {"transitions": {
                        "t": {"next": "b", "action": {"name": "unknown_processor"}},
                        "t": {"next": "b", "action": {"name": "9lives"}},
                        "u": {"next": "b", "condition": {"type": "function", "function": {"name": ""}}},
                        "v": {"next": "b", "condition": {"type": "group", "operator": "XOR", "parameters": [
                            {"type": "simple", "jsonPath": "", "operatorType": "SOUNDS_LIKE", "value": 1}
                        ]}},
                        "w": {"next": "b", "condition": {"type": "group", "operator": "NOT", "parameters": []}},
                        "x": {"next": "b", "condition": {"type": "group", "operator": "AND", "parameters": [
                            {"type": "simple", "jsonPath": "qty", "operatorType": "BETWEEN_INCLUSIVE", "value": 3}
                        ]}}
                    }},
                    "b": {},
                    "b": {}
                }
            }"#,
        )
        .unwrap();

        let errors = validate(&descriptor, &catalog());
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();

        assert_eq!(
            messages,
            vec![
                "workflow_name must not be empty",
                "state 'b' is declared more than once",
                "state 'a' declares transition 't' more than once",
                "transition 'a.t' references unregistered processor 'unknown_processor'",
                "transition 'a.t' has a malformed processor name '9lives'",
                "transition 'a.u' has a malformed criterion name ''",
                "transition 'a.v' uses unknown group operator 'XOR'",
                "transition 'a.v' has a predicate with an empty jsonPath",
                "transition 'a.v' uses unknown operatorType 'SOUNDS_LIKE' at ''",
                "transition 'a.w' has a NOT group with 0 parameters, expected exactly one",
                "transition 'a.x' uses BETWEEN_INCLUSIVE at 'qty' without a [low, high] value",
            ]
        );
    }

    #[test]
    fn function_roles_are_checked_separately() {
        let descriptor = WorkflowDescriptor {
            version: None,
            workflow_name: "roles".into(),
            description: None,
            initial_state: "a".into(),
            states: OrderedMap::new()
                .with("a", State {
                    transitions: OrderedMap::new().with(
                        "t",
                        Transition::to("b")
                            .with_action("is_available")
                            .with_condition(Condition::function("process_create_pet")),
                    ),
                })
                .with("b", State::default()),
        };

        let errors = validate(&descriptor, &catalog());
        assert!(matches!(
            &errors[..],
            [
                ValidationError::UnregisteredFunction { role: FunctionRole::Processor, .. },
                ValidationError::UnregisteredFunction { role: FunctionRole::Criterion, .. },
            ]
        ));
    }

    #[test]
    fn cycles_are_not_validation_errors() {
        let descriptor = WorkflowDescriptor {
            version: None,
            workflow_name: "loop".into(),
            description: None,
            initial_state: "a".into(),
            states: OrderedMap::new()
                .with("a", State {
                    transitions: OrderedMap::new().with("to_b", Transition::to("b")),
                })
                .with("b", State {
                    transitions: OrderedMap::new().with("to_a", Transition::to("a")),
                }),
        };

        assert!(validate(&descriptor, &RegisteredNames::default()).is_empty());
    }

    #[test]
    fn well_formed_names() {
        assert!(is_well_formed_name("process_create_pet"));
        assert!(is_well_formed_name("_private.v2-beta"));
        assert!(!is_well_formed_name(""));
        assert!(!is_well_formed_name("1st"));
        assert!(!is_well_formed_name("has space"));
    }

    #[test]
    fn errors_serialize_with_kind_tag() {
        let error = ValidationError::UnknownTarget {
            state: "a".into(),
            transition: "t".into(),
            target: "z".into(),
        };
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"kind": "unknown_target", "state": "a", "transition": "t", "target": "z"})
        );
    }
}
