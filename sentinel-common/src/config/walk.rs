//! Two-level traversal of a configuration tree.
//!
//! The walker presents a [`Visitor`] with exactly the two depth levels the
//! engine cares about: declared sections (and their list elements), then the
//! options inside whichever section or element the visitor chose to enter.
//! Anything nested deeper travels inside the option values and is never
//! presented, so visitors cannot accidentally react to sub-sub-fields.

use serde_json::Value;

use super::coerce::kind_of;
use super::errors::OverrideError;
use super::schema::{Schema, SectionSpec};

/// Whether the walker should descend into the section or element it just
/// presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Descend {
    Into,
    Skip,
}

/// Callbacks invoked by [`walk`]. All methods default to doing nothing so a
/// visitor only implements the levels it reacts to.
pub(crate) trait Visitor {
    /// A declared section, before any of its contents.
    fn section(&mut self, _spec: &SectionSpec, _value: &mut Value) -> Result<Descend, OverrideError> {
        Ok(Descend::Skip)
    }

    /// One element of a list-valued section that was entered.
    fn element(
        &mut self,
        _spec: &SectionSpec,
        _index: usize,
        _id: &str,
        _value: &mut Value,
    ) -> Result<Descend, OverrideError> {
        Ok(Descend::Skip)
    }

    /// One option of an entered section or element.
    fn option(
        &mut self,
        _spec: &SectionSpec,
        _name: &str,
        _value: &mut Value,
    ) -> Result<(), OverrideError> {
        Ok(())
    }

    /// The section presented by the matching `section` call is complete.
    fn exit_section(&mut self, _spec: &SectionSpec) -> Result<(), OverrideError> {
        Ok(())
    }
}

/// Walk every declared section of `root`, short-circuiting on the first
/// visitor error. Top-level fields without a declaration are skipped.
pub(crate) fn walk(
    schema: &Schema,
    root: &mut Value,
    visitor: &mut dyn Visitor,
) -> Result<(), OverrideError> {
    let map = root
        .as_object_mut()
        .ok_or_else(|| OverrideError::internal("configuration tree is not an object"))?;

    for spec in schema.sections() {
        let value = map.get_mut(spec.name()).ok_or_else(|| {
            OverrideError::internal(format!(
                "declared section {} is missing from the configuration tree",
                spec.name()
            ))
        })?;

        if visitor.section(spec, value)? == Descend::Into {
            match spec.element_key() {
                None => visit_options(spec, value, visitor)?,
                Some(key) => {
                    let elements = value.as_array_mut().ok_or_else(|| {
                        OverrideError::internal(format!(
                            "list section {} is not an array",
                            spec.name()
                        ))
                    })?;
                    for (index, element) in elements.iter_mut().enumerate() {
                        let id = element_id(spec, key, element)?;
                        if visitor.element(spec, index, &id, element)? == Descend::Into {
                            visit_options(spec, element, visitor)?;
                        }
                    }
                }
            }
        }
        visitor.exit_section(spec)?;
    }
    Ok(())
}

fn visit_options(
    spec: &SectionSpec,
    value: &mut Value,
    visitor: &mut dyn Visitor,
) -> Result<(), OverrideError> {
    let map = value.as_object_mut().ok_or_else(|| {
        OverrideError::internal(format!("section {} is not an object", spec.name()))
    })?;
    for (name, option) in map.iter_mut() {
        visitor.option(spec, name, option)?;
    }
    Ok(())
}

/// The string value of an element's key field.
pub(crate) fn element_id(
    spec: &SectionSpec,
    key: &str,
    element: &Value,
) -> Result<String, OverrideError> {
    match element.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(OverrideError::internal(format!(
            "element key {} of section {} must be a string, got {}",
            key,
            spec.name(),
            kind_of(other)
        ))),
        None => Err(OverrideError::internal(format!(
            "element in section {} is missing its key field {}",
            spec.name(),
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{SectionConfig, SectionSpec};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Inner {
        deep: String,
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Single {
        url: String,
        nested: Inner,
    }

    impl SectionConfig for Single {}

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Item {
        name: String,
        weight: i64,
    }

    impl SectionConfig for Item {}

    fn schema() -> Schema {
        Schema::new(vec![
            SectionSpec::singleton::<Single>("single"),
            SectionSpec::list::<Item>("items", "name"),
        ])
    }

    fn tree() -> Value {
        json!({
            "single": {"url": "http://localhost", "nested": {"deep": "x"}},
            "items": [
                {"name": "a", "weight": 1},
                {"name": "b", "weight": 2},
            ],
            "undeclared": {"ignored": true},
        })
    }

    #[derive(Default)]
    struct Recorder {
        sections: Vec<String>,
        elements: Vec<(usize, String)>,
        options: Vec<String>,
    }

    impl Visitor for Recorder {
        fn section(&mut self, spec: &SectionSpec, _: &mut Value) -> Result<Descend, OverrideError> {
            self.sections.push(spec.name().to_string());
            Ok(Descend::Into)
        }

        fn element(
            &mut self,
            _: &SectionSpec,
            index: usize,
            id: &str,
            _: &mut Value,
        ) -> Result<Descend, OverrideError> {
            self.elements.push((index, id.to_string()));
            Ok(Descend::Into)
        }

        fn option(
            &mut self,
            _: &SectionSpec,
            name: &str,
            _: &mut Value,
        ) -> Result<(), OverrideError> {
            self.options.push(name.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_walk_visits_declared_sections_only() {
        let mut root = tree();
        let mut recorder = Recorder::default();
        walk(&schema(), &mut root, &mut recorder).unwrap();

        assert_eq!(recorder.sections, vec!["single", "items"]);
        assert_eq!(
            recorder.elements,
            vec![(0, "a".to_string()), (1, "b".to_string())]
        );
        // "deep" never appears: option values keep their nested structure
        // but the walker does not descend into it.
        assert_eq!(
            recorder.options,
            vec!["nested", "url", "name", "weight", "name", "weight"]
        );
    }

    #[test]
    fn test_walk_fails_on_missing_declared_section() {
        let mut root = json!({"single": {"url": "", "nested": {"deep": ""}}});
        let err = walk(&schema(), &mut root, &mut Recorder::default()).unwrap_err();
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_walk_fails_on_non_string_element_key() {
        let mut root = json!({
            "single": {"url": "", "nested": {"deep": ""}},
            "items": [{"name": 7, "weight": 1}],
        });
        let err = walk(&schema(), &mut root, &mut Recorder::default()).unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }

    struct FailOnOption;

    impl Visitor for FailOnOption {
        fn section(&mut self, _: &SectionSpec, _: &mut Value) -> Result<Descend, OverrideError> {
            Ok(Descend::Into)
        }

        fn option(
            &mut self,
            _: &SectionSpec,
            name: &str,
            _: &mut Value,
        ) -> Result<(), OverrideError> {
            Err(OverrideError::internal(format!("stopped at {name}")))
        }
    }

    #[test]
    fn test_walk_short_circuits_on_first_error() {
        let mut root = tree();
        let err = walk(&schema(), &mut root, &mut FailOnOption).unwrap_err();
        assert!(err.to_string().contains("stopped at"));
    }
}
