//! Attribute data-type validation.

use std::collections::BTreeMap;

use crate::model::{DataType, Model};
use crate::simulation::{InstanceId, SimulationState, Violation, ViolationType};
use crate::value::Value;

#[derive(Debug, Clone)]
struct AttributeRule {
    nullable: bool,
    data_type: Option<DataType>,
}

/// Checks attribute values against their declared data types.
///
/// Rules are parsed once when the checker is built. A rule that fails to
/// parse is reported once as a [`ViolationType::DataTypeDeclaration`] and
/// its attribute is afterwards only checked for required-ness.
#[derive(Debug, Clone)]
pub struct DataTypeChecker {
    rules: BTreeMap<String, BTreeMap<String, AttributeRule>>,
    declaration_violations: Vec<Violation>,
}

impl DataTypeChecker {
    #[must_use]
    pub fn new(model: &Model) -> Self {
        let mut rules: BTreeMap<String, BTreeMap<String, AttributeRule>> = BTreeMap::new();
        let mut declaration_violations = Vec::new();
        for class in model.classes() {
            let per_class = rules.entry(class.key.clone()).or_default();
            for attr in &class.attributes {
                let data_type = match attr.data_type.as_deref().map(DataType::parse) {
                    None => None,
                    Some(Ok(dt)) => Some(dt),
                    Some(Err(e)) => {
                        declaration_violations.push(
                            Violation::new(
                                ViolationType::DataTypeDeclaration,
                                format!("attribute {}.{} has an unusable data type", class.key, attr.key),
                            )
                            .with_class(class.key.clone())
                            .with_expression(e.rules.clone())
                            .with_detail(e.reason),
                        );
                        None
                    }
                };
                per_class.insert(
                    attr.key.clone(),
                    AttributeRule {
                        nullable: attr.nullable,
                        data_type,
                    },
                );
            }
        }
        Self {
            rules,
            declaration_violations,
        }
    }

    /// Problems found while parsing the declared rules.
    #[must_use]
    pub fn declaration_violations(&self) -> &[Violation] {
        &self.declaration_violations
    }

    /// Parsed rule of one attribute, if it declared a usable one.
    #[must_use]
    pub fn data_type(&self, class_key: &str, attribute: &str) -> Option<&DataType> {
        self.rules.get(class_key)?.get(attribute)?.data_type.as_ref()
    }

    /// Checks every declared attribute of one live instance.
    #[must_use]
    pub fn check_instance(&self, state: &SimulationState, id: InstanceId) -> Vec<Violation> {
        let Some(instance) = state.get(id) else {
            return Vec::new();
        };
        let Some(rules) = self.rules.get(&instance.class_key) else {
            return Vec::new();
        };
        let mut violations = Vec::new();
        for (name, rule) in rules {
            let value = instance.get(name).unwrap_or(&Value::Nil);
            let problem = if value.is_nil() {
                (!rule.nullable).then(|| "required attribute is NIL".to_string())
            } else {
                rule.data_type.as_ref().and_then(|dt| dt.check(value).err())
            };
            if let Some(problem) = problem {
                violations.push(
                    Violation::new(
                        ViolationType::DataType,
                        format!("{}.{name} of {id} breaks its data type: {problem}", instance.class_key),
                    )
                    .with_instance(id)
                    .with_class(instance.class_key.clone())
                    .with_detail(problem),
                );
            }
        }
        violations
    }

    /// Checks each of `ids` in order; deleted instances are skipped.
    pub fn check_instances<'a, I>(&self, state: &SimulationState, ids: I) -> Vec<Violation>
    where
        I: IntoIterator<Item = &'a InstanceId>,
    {
        ids.into_iter()
            .flat_map(|id| self.check_instance(state, *id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::load_model_from_str;
    use num::rational::Rational64;

    fn model() -> Model {
        load_model_from_str(
            r#"{"domains": [{"key": "d", "subdomains": [{"key": "s", "classes": [
                {"key": "Item", "attributes": [
                    {"key": "qty", "data_type": "[1 .. 10]", "nullable": false},
                    {"key": "price", "data_type": "(0 .. 100] at 0.01"},
                    {"key": "color", "data_type": "enum of red, blue"},
                    {"key": "tags", "data_type": "{0..2} of string"},
                    {"key": "weird", "data_type": "integer-ish"}
                ]}]}]}]}"#,
        )
        .unwrap()
    }

    fn item(state: &mut SimulationState, fields: &[(&str, Value)]) -> InstanceId {
        state.create_instance(
            "Item",
            fields.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect(),
        )
    }

    #[test]
    fn unparsable_rules_are_reported_once() {
        let checker = DataTypeChecker::new(&model());
        assert_eq!(checker.declaration_violations().len(), 1);
        assert_eq!(
            checker.declaration_violations()[0].kind,
            ViolationType::DataTypeDeclaration
        );
        assert!(checker.data_type("Item", "weird").is_none());
        assert!(checker.data_type("Item", "qty").is_some());
    }

    #[test]
    fn valid_instance_passes() {
        let checker = DataTypeChecker::new(&model());
        let mut state = SimulationState::new();
        let id = item(
            &mut state,
            &[
                ("qty", Value::Int(3)),
                ("price", Value::rational(Rational64::new(999, 100))),
                ("color", Value::from("red")),
                ("weird", Value::from("anything")),
            ],
        );
        assert!(checker.check_instance(&state, id).is_empty());
    }

    #[test]
    fn reports_each_breach() {
        let checker = DataTypeChecker::new(&model());
        let mut state = SimulationState::new();
        let id = item(
            &mut state,
            &[
                ("price", Value::rational(Rational64::new(1, 1000))),
                ("color", Value::from("green")),
                (
                    "tags",
                    Value::Tuple(vec![Value::from("a"), Value::from("b"), Value::from("c")]),
                ),
            ],
        );
        let violations = checker.check_instance(&state, id);
        // qty is required, price off-grid, color not in enum, tags too many.
        assert_eq!(violations.len(), 4);
        assert!(violations.iter().all(|v| v.kind == ViolationType::DataType));
    }

    #[test]
    fn deleted_instances_are_skipped() {
        let checker = DataTypeChecker::new(&model());
        let state = SimulationState::new();
        assert!(checker
            .check_instances(&state, &[InstanceId::new(5)])
            .is_empty());
    }
}
