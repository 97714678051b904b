//! Workflow descriptor type definitions
//!
//! A descriptor is the declarative finite-state machine that drives the
//! lifecycle of one entity model. These types map 1:1 onto the descriptor JSON
//! files and are immutable once loaded; only the per-instance current-state
//! pointer changes at runtime.

use crate::workflow::ordered::OrderedMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A complete workflow definition for one entity model
///
/// Stored as `<workflow_dir>/<entity_model>/workflow.json` and compiled into
/// the registry at startup or on hot reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDescriptor {
    /// Descriptor format version (e.g. "1.0")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Workflow identifier
    pub workflow_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// State every new entity instance starts in
    pub initial_state: String,
    /// States in declared order
    pub states: OrderedMap<State>,
}

impl WorkflowDescriptor {
    /// Parse a descriptor from its JSON text
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Pretty JSON used when writing descriptor files
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    /// A state is terminal when it declares no outgoing transitions.
    /// Unknown states are not terminal.
    pub fn is_terminal(&self, name: &str) -> bool {
        self.state(name).is_some_and(State::is_terminal)
    }
}

/// A single state and its outgoing transitions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Outgoing transitions in declared (evaluation) order
    #[serde(default)]
    pub transitions: OrderedMap<Transition>,
}

impl State {
    pub fn is_terminal(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// A named edge from its owning state to `next`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Target state name
    pub next: String,
    /// Processor invoked with the entity record once the transition fires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<FunctionRef>,
    /// Gate evaluated against the entity record; absent means always eligible
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Whether the engine fires this transition on its own or only on request
    #[serde(default, skip_serializing_if = "TransitionKind::is_automatic")]
    pub kind: TransitionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Transition {
    /// Unconditional automatic transition to `next`
    pub fn to(next: impl Into<String>) -> Self {
        Self {
            next: next.into(),
            action: None,
            condition: None,
            kind: TransitionKind::Automatic,
            description: None,
        }
    }

    pub fn with_action(mut self, name: impl Into<String>) -> Self {
        self.action = Some(FunctionRef::new(name));
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn manual(mut self) -> Self {
        self.kind = TransitionKind::Manual;
        self
    }
}

/// How a transition gets fired
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionKind {
    /// Evaluated by the engine after every event on the instance
    #[default]
    Automatic,
    /// Fired only when a caller triggers it by name
    Manual,
}

impl TransitionKind {
    pub fn is_automatic(&self) -> bool {
        matches!(self, TransitionKind::Automatic)
    }
}

/// Reference to a registered processor or criterion function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRef {
    pub name: String,
}

impl FunctionRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Transition gate
///
/// JSON form is tagged by `"type"`:
/// - `{"type": "function", "function": {"name": "is_available"}}`
/// - `{"type": "group", "operator": "AND", "parameters": [...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Condition {
    /// Named boolean criterion from the function registry
    Function { function: FunctionRef },
    /// Declarative predicate group evaluated against the record
    Group(ConditionGroup),
}

impl Condition {
    pub fn function(name: impl Into<String>) -> Self {
        Condition::Function {
            function: FunctionRef::new(name),
        }
    }
}

/// Predicates combined with AND / OR / NOT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub operator: GroupOperator,
    #[serde(default)]
    pub parameters: Vec<Predicate>,
}

impl ConditionGroup {
    pub fn new(operator: GroupOperator, parameters: Vec<Predicate>) -> Self {
        Self {
            operator,
            parameters,
        }
    }
}

/// One parameter of a condition group: a simple predicate or a nested group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Predicate {
    Simple(SimpleCondition),
    Group(ConditionGroup),
}

impl Predicate {
    pub fn simple(json_path: impl Into<String>, operator_type: OperatorType, value: Value) -> Self {
        Predicate::Simple(SimpleCondition {
            json_path: json_path.into(),
            operator_type,
            value,
        })
    }
}

/// Compare the record value at `jsonPath` against `value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleCondition {
    /// Path into the entity record; `status` and `$.status` are equivalent
    #[serde(rename = "jsonPath")]
    pub json_path: String,
    #[serde(rename = "operatorType")]
    pub operator_type: OperatorType,
    /// Comparison operand; a `[low, high]` array for the BETWEEN operators
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

/// Group combinator
///
/// Unrecognized strings survive parsing as `Unknown` so the validator can
/// report them alongside every other problem in the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GroupOperator {
    And,
    Or,
    Not,
    Unknown(String),
}

impl GroupOperator {
    pub fn as_str(&self) -> &str {
        match self {
            GroupOperator::And => "AND",
            GroupOperator::Or => "OR",
            GroupOperator::Not => "NOT",
            GroupOperator::Unknown(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, GroupOperator::Unknown(_))
    }
}

impl From<String> for GroupOperator {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "AND" => GroupOperator::And,
            "OR" => GroupOperator::Or,
            "NOT" => GroupOperator::Not,
            _ => GroupOperator::Unknown(raw),
        }
    }
}

impl From<GroupOperator> for String {
    fn from(operator: GroupOperator) -> Self {
        operator.as_str().to_string()
    }
}

impl fmt::Display for GroupOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator of a simple predicate
///
/// The `I`-prefixed variants fold both operands to lowercase before comparing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperatorType {
    Equals,
    NotEqual,
    IEquals,
    INotEqual,
    IsNull,
    NotNull,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    IContains,
    IStartsWith,
    IEndsWith,
    INotContains,
    INotStartsWith,
    INotEndsWith,
    MatchesPattern,
    Between,
    BetweenInclusive,
    Unknown(String),
}

/// Wire names of every known operator, in declaration order
pub const OPERATOR_NAMES: [&str; 19] = [
    "EQUALS",
    "NOT_EQUAL",
    "IEQUALS",
    "INOT_EQUAL",
    "IS_NULL",
    "NOT_NULL",
    "GREATER_THAN",
    "GREATER_OR_EQUAL",
    "LESS_THAN",
    "LESS_OR_EQUAL",
    "ICONTAINS",
    "ISTARTS_WITH",
    "IENDS_WITH",
    "INOT_CONTAINS",
    "INOT_STARTS_WITH",
    "INOT_ENDS_WITH",
    "MATCHES_PATTERN",
    "BETWEEN",
    "BETWEEN_INCLUSIVE",
];

impl OperatorType {
    pub fn as_str(&self) -> &str {
        match self {
            OperatorType::Equals => "EQUALS",
            OperatorType::NotEqual => "NOT_EQUAL",
            OperatorType::IEquals => "IEQUALS",
            OperatorType::INotEqual => "INOT_EQUAL",
            OperatorType::IsNull => "IS_NULL",
            OperatorType::NotNull => "NOT_NULL",
            OperatorType::GreaterThan => "GREATER_THAN",
            OperatorType::GreaterOrEqual => "GREATER_OR_EQUAL",
            OperatorType::LessThan => "LESS_THAN",
            OperatorType::LessOrEqual => "LESS_OR_EQUAL",
            OperatorType::IContains => "ICONTAINS",
            OperatorType::IStartsWith => "ISTARTS_WITH",
            OperatorType::IEndsWith => "IENDS_WITH",
            OperatorType::INotContains => "INOT_CONTAINS",
            OperatorType::INotStartsWith => "INOT_STARTS_WITH",
            OperatorType::INotEndsWith => "INOT_ENDS_WITH",
            OperatorType::MatchesPattern => "MATCHES_PATTERN",
            OperatorType::Between => "BETWEEN",
            OperatorType::BetweenInclusive => "BETWEEN_INCLUSIVE",
            OperatorType::Unknown(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, OperatorType::Unknown(_))
    }

    /// Operators whose `value` must be a `[low, high]` pair
    pub fn is_range(&self) -> bool {
        matches!(self, OperatorType::Between | OperatorType::BetweenInclusive)
    }

    /// Operators that ignore `value`
    pub fn is_nullity(&self) -> bool {
        matches!(self, OperatorType::IsNull | OperatorType::NotNull)
    }
}

impl From<String> for OperatorType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "EQUALS" => OperatorType::Equals,
            "NOT_EQUAL" => OperatorType::NotEqual,
            "IEQUALS" => OperatorType::IEquals,
            "INOT_EQUAL" => OperatorType::INotEqual,
            "IS_NULL" => OperatorType::IsNull,
            "NOT_NULL" => OperatorType::NotNull,
            "GREATER_THAN" => OperatorType::GreaterThan,
            "GREATER_OR_EQUAL" => OperatorType::GreaterOrEqual,
            "LESS_THAN" => OperatorType::LessThan,
            "LESS_OR_EQUAL" => OperatorType::LessOrEqual,
            "ICONTAINS" => OperatorType::IContains,
            "ISTARTS_WITH" => OperatorType::IStartsWith,
            "IENDS_WITH" => OperatorType::IEndsWith,
            "INOT_CONTAINS" => OperatorType::INotContains,
            "INOT_STARTS_WITH" => OperatorType::INotStartsWith,
            "INOT_ENDS_WITH" => OperatorType::INotEndsWith,
            "MATCHES_PATTERN" => OperatorType::MatchesPattern,
            "BETWEEN" => OperatorType::Between,
            "BETWEEN_INCLUSIVE" => OperatorType::BetweenInclusive,
            _ => OperatorType::Unknown(raw),
        }
    }
}

impl From<OperatorType> for String {
    fn from(operator: OperatorType) -> Self {
        operator.as_str().to_string()
    }
}

impl fmt::Display for OperatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PET_WORKFLOW: &str = r#"{
        "version": "1.0",
        "workflow_name": "pet_lifecycle",
        "initial_state": "none",
        "states": {
            "none": {
                "transitions": {
                    "create": {"next": "available", "action": {"name": "process_create_pet"}}
                }
            },
            "available": {
                "transitions": {
                    "reserve": {
                        "next": "reserved",
                        "kind": "MANUAL",
                        "condition": {
                            "type": "group",
                            "operator": "AND",
                            "parameters": [
                                {"jsonPath": "status", "operatorType": "EQUALS", "value": "available", "type": "simple"},
                                {"jsonPath": "qty", "operatorType": "GREATER_THAN", "value": 0, "type": "simple"}
                            ]
                        }
                    },
                    "archive": {
                        "next": "archived",
                        "condition": {"type": "function", "function": {"name": "is_stale"}}
                    }
                }
            },
            "reserved": {"transitions": {}},
            "archived": {}
        }
    }"#;

    #[test]
    fn parses_descriptor_skeleton() {
        let descriptor = WorkflowDescriptor::from_json(PET_WORKFLOW).unwrap();

        assert_eq!(descriptor.workflow_name, "pet_lifecycle");
        assert_eq!(
            descriptor.states.keys().collect::<Vec<_>>(),
            vec!["none", "available", "reserved", "archived"]
        );

        let available = descriptor.state("available").unwrap();
        assert_eq!(
            available.transitions.keys().collect::<Vec<_>>(),
            vec!["reserve", "archive"]
        );

        let reserve = available.transitions.get("reserve").unwrap();
        assert_eq!(reserve.kind, TransitionKind::Manual);
        match reserve.condition.as_ref().unwrap() {
            Condition::Group(group) => {
                assert_eq!(group.operator, GroupOperator::And);
                assert_eq!(group.parameters.len(), 2);
                assert_eq!(
                    group.parameters[1],
                    Predicate::simple("qty", OperatorType::GreaterThan, json!(0))
                );
            }
            other => panic!("expected a group condition, got {other:?}"),
        }

        assert!(descriptor.is_terminal("reserved"));
        assert!(descriptor.is_terminal("archived"));
        assert!(!descriptor.is_terminal("available"));
        assert!(!descriptor.is_terminal("missing"));
    }

    #[test]
    fn json_round_trip_preserves_structure_and_order() {
        let descriptor = WorkflowDescriptor::from_json(PET_WORKFLOW).unwrap();
        let text = descriptor.to_json_pretty().unwrap();
        let reparsed = WorkflowDescriptor::from_json(&text).unwrap();

        assert_eq!(descriptor, reparsed);
        assert_eq!(
            reparsed.states.keys().collect::<Vec<_>>(),
            descriptor.states.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn unknown_enum_strings_survive_parsing() {
        let condition: Condition = serde_json::from_value(json!({
            "type": "group",
            "operator": "XOR",
            "parameters": [
                {"type": "simple", "jsonPath": "name", "operatorType": "SOUNDS_LIKE", "value": "rex"}
            ]
        }))
        .unwrap();

        let Condition::Group(group) = condition else {
            panic!("expected group");
        };
        assert_eq!(group.operator, GroupOperator::Unknown("XOR".into()));
        let Predicate::Simple(simple) = &group.parameters[0] else {
            panic!("expected simple predicate");
        };
        assert_eq!(simple.operator_type, OperatorType::Unknown("SOUNDS_LIKE".into()));
        assert_eq!(
            serde_json::to_value(&group.operator).unwrap(),
            json!("XOR")
        );
    }

    #[test]
    fn operator_names_parse_to_known_variants() {
        for name in OPERATOR_NAMES {
            let operator = OperatorType::from(name.to_string());
            assert!(operator.is_known(), "{name} should be known");
            assert_eq!(operator.as_str(), name);
        }
    }

    #[test]
    fn automatic_kind_is_default_and_omitted() {
        let transition: Transition = serde_json::from_value(json!({"next": "done"})).unwrap();
        assert_eq!(transition.kind, TransitionKind::Automatic);
        assert_eq!(serde_json::to_value(&transition).unwrap(), json!({"next": "done"}));
    }
}
