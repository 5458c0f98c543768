//! Applying override requests to a configuration tree.
//!
//! The [`Overrider`] owns the original tree exclusively and never mutates
//! it. Every request works on a deep copy: the copy is walked, option
//! values are coerced into it, the resolved section is cut out of it, and
//! the rest of the copy is discarded.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::coerce::coerce;
use super::errors::OverrideError;
use super::redact::redact_options;
use super::schema::{CheckError, Schema, SectionSpec};
use super::walk::{element_id, walk, Descend, Visitor};

/// A single override request against one section or list element.
#[derive(Debug, Clone, Default)]
pub struct Override {
    /// Declared section name. Required.
    pub section: String,
    /// Element id for list-valued sections. Empty for singleton sections
    /// and for `create` requests (the id comes from the options).
    pub element: String,
    /// Option name to raw value.
    pub options: BTreeMap<String, Value>,
    /// Create a new list element seeded from the section's defaults.
    pub create: bool,
    /// Remove the addressed list element.
    pub delete: bool,
}

impl Override {
    /// Request against a singleton section.
    pub fn section(name: impl Into<String>) -> Self {
        Self {
            section: name.into(),
            ..Default::default()
        }
    }

    /// Request against one element of a list-valued section.
    pub fn element(section: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            element: element.into(),
            ..Default::default()
        }
    }

    /// Request creating a new element. The element-key option must be
    /// present in the option map.
    pub fn create_element(section: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            create: true,
            ..Default::default()
        }
    }

    /// Request removing an existing element.
    pub fn remove_element(section: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            element: element.into(),
            delete: true,
            ..Default::default()
        }
    }

    /// Add one option to the request.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

}

/// A resolved section value, detached from the overrider's original tree
/// and owned by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    section: String,
    element: Option<String>,
    value: Value,
    redacted: &'static [&'static str],
}

impl Element {
    pub fn section(&self) -> &str {
        &self.section
    }

    /// The element id for values out of a list-valued section.
    pub fn element_id(&self) -> Option<&str> {
        self.element.as_deref()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Decode the resolved value back into its typed form.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, OverrideError> {
        serde_json::from_value(self.value.clone()).map_err(|e| OverrideError::Decode {
            section: self.section.clone(),
            message: e.to_string(),
        })
    }

    /// Option map with sensitive options replaced by a set/unset boolean.
    pub fn redacted(&self) -> Map<String, Value> {
        redact_options(&self.value, self.redacted)
    }
}

/// Applies override requests to a configuration tree without ever touching
/// the original value.
pub struct Overrider {
    original: Value,
    schema: Schema,
}

impl Overrider {
    /// Encode `config` once and verify that every declared section exists
    /// in it with the declared shape.
    pub fn new<C: Serialize>(config: &C, schema: Schema) -> Result<Self, OverrideError> {
        let original = serde_json::to_value(config).map_err(|e| {
            OverrideError::internal(format!("failed to encode configuration tree: {e}"))
        })?;
        let overrider = Self { original, schema };
        let mut probe = overrider.original.clone();
        walk(&overrider.schema, &mut probe, &mut ShapeProbe)?;
        Ok(overrider)
    }

    /// Section name to element-key field name ("" for singletons).
    pub fn element_keys(&self) -> BTreeMap<String, String> {
        self.schema.element_keys()
    }

    /// Apply a single request and return the resolved element, or `None`
    /// for an element removal.
    pub fn apply(&self, request: &Override) -> Result<Option<Element>, OverrideError> {
        let spec = self.check_request(request)?;
        let mut copy = self.original.clone();
        let created_index = apply_to_tree(&self.schema, &mut copy, request)?;
        if request.delete {
            return Ok(None);
        }
        let (element, value) = extract_resolved(spec, copy, request, created_index)?;
        spec.check_value(&value)
            .map_err(|e| check_error(spec.name(), e))?;
        Ok(Some(Element {
            section: request.section.clone(),
            element,
            value,
            redacted: spec.redacted_options(),
        }))
    }

    /// Apply every request to a single copy, then collect the full
    /// snapshot. Sections touched by at least one request are re-validated;
    /// element lists are sorted ascending by element id.
    pub fn apply_all(
        &self,
        requests: &[Override],
    ) -> Result<BTreeMap<String, Vec<Element>>, OverrideError> {
        let mut copy = self.original.clone();
        let mut touched: BTreeSet<&str> = BTreeSet::new();
        for request in requests {
            let spec = self.check_request(request)?;
            apply_to_tree(&self.schema, &mut copy, request)?;
            touched.insert(spec.name());
        }

        let mut collector = SectionCollector::default();
        walk(&self.schema, &mut copy, &mut collector)?;
        let mut sections = collector.sections;
        for (name, elements) in &mut sections {
            elements.sort_by(|a, b| a.element.cmp(&b.element));
            if touched.contains(name.as_str()) {
                let spec = self
                    .schema
                    .section(name)
                    .ok_or_else(|| OverrideError::internal(format!("lost section {name}")))?;
                for element in elements.iter() {
                    spec.check_value(&element.value)
                        .map_err(|e| check_error(spec.name(), e))?;
                }
            }
        }
        Ok(sections)
    }

    /// Unmodified snapshot of every declared section.
    pub fn sections(&self) -> Result<BTreeMap<String, Vec<Element>>, OverrideError> {
        self.apply_all(&[])
    }

    /// Whether the original tree declares the given list element.
    pub fn has_element(&self, section: &str, element: &str) -> Result<bool, OverrideError> {
        let spec = self
            .schema
            .section(section)
            .ok_or_else(|| OverrideError::UnknownSection(section.to_string()))?;
        let key = match spec.element_key() {
            Some(key) => key,
            None => return Ok(false),
        };
        let items = self
            .original
            .get(section)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                OverrideError::internal(format!("list section {section} is not an array"))
            })?;
        for item in items {
            if element_id(spec, key, item)? == element {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Enforce the request shape rules before any tree work happens.
    fn check_request(&self, request: &Override) -> Result<&SectionSpec, OverrideError> {
        if request.section.is_empty() {
            return Err(OverrideError::invalid("section cannot be empty"));
        }
        let spec = self
            .schema
            .section(&request.section)
            .ok_or_else(|| OverrideError::UnknownSection(request.section.clone()))?;

        if request.delete {
            if request.create {
                return Err(OverrideError::invalid(
                    "create and delete are mutually exclusive",
                ));
            }
            if !spec.is_list() {
                return Err(OverrideError::invalid(format!(
                    "cannot delete from singleton section {}",
                    spec.name()
                )));
            }
            if request.element.is_empty() {
                return Err(OverrideError::invalid("delete requires an element"));
            }
            if !request.options.is_empty() {
                return Err(OverrideError::invalid("delete cannot include options"));
            }
            return Ok(spec);
        }

        match spec.element_key() {
            None => {
                if request.create {
                    return Err(OverrideError::invalid(format!(
                        "cannot create elements in singleton section {}",
                        spec.name()
                    )));
                }
                if !request.element.is_empty() {
                    return Err(OverrideError::invalid(format!(
                        "section {} has no elements",
                        spec.name()
                    )));
                }
            }
            Some(key) => {
                if request.create {
                    if !request.element.is_empty() {
                        return Err(OverrideError::invalid(
                            "create requires an empty element; the id comes from the options",
                        ));
                    }
                    match request.options.get(key) {
                        Some(Value::String(id)) if !id.is_empty() => {}
                        Some(_) => {
                            return Err(OverrideError::invalid(format!(
                                "element key option {key} must be a non-empty string"
                            )));
                        }
                        None => {
                            return Err(OverrideError::invalid(format!(
                                "create requires the element key option {key}"
                            )));
                        }
                    }
                } else {
                    if request.element.is_empty() {
                        return Err(OverrideError::invalid(format!(
                            "section {} requires an element",
                            spec.name()
                        )));
                    }
                    if request.options.contains_key(key) {
                        return Err(OverrideError::invalid(format!(
                            "cannot override element key {key}"
                        )));
                    }
                }
            }
        }
        Ok(spec)
    }
}

/// Walk the copy, mutate the target section, and return the index of a
/// created element if the request created one.
fn apply_to_tree(
    schema: &Schema,
    tree: &mut Value,
    request: &Override,
) -> Result<Option<usize>, OverrideError> {
    let mut visitor = OverrideVisitor {
        request,
        used: BTreeSet::new(),
        removed: 0,
        created_index: None,
        matched: false,
    };
    walk(schema, tree, &mut visitor)?;

    if request.delete {
        if visitor.removed == 0 {
            return Err(OverrideError::UnknownElement {
                section: request.section.clone(),
                element: request.element.clone(),
            });
        }
        return Ok(None);
    }
    if !visitor.matched {
        return Err(OverrideError::UnknownElement {
            section: request.section.clone(),
            element: request.element.clone(),
        });
    }
    let unused: Vec<String> = request
        .options
        .keys()
        .filter(|name| !visitor.used.contains(name.as_str()))
        .cloned()
        .collect();
    if !unused.is_empty() {
        return Err(OverrideError::UnknownOptions {
            section: request.section.clone(),
            options: unused,
        });
    }
    Ok(visitor.created_index)
}

/// Cut the resolved section or element out of the consumed copy.
fn extract_resolved(
    spec: &SectionSpec,
    copy: Value,
    request: &Override,
    created_index: Option<usize>,
) -> Result<(Option<String>, Value), OverrideError> {
    let section_value = match copy {
        Value::Object(mut map) => map
            .remove(spec.name())
            .ok_or_else(|| OverrideError::internal(format!("lost section {}", spec.name())))?,
        _ => return Err(OverrideError::internal("configuration tree is not an object")),
    };
    let key = match spec.element_key() {
        None => return Ok((None, section_value)),
        Some(key) => key,
    };
    let elements = match section_value {
        Value::Array(items) => items,
        _ => {
            return Err(OverrideError::internal(format!(
                "list section {} is not an array",
                spec.name()
            )))
        }
    };
    if let Some(index) = created_index {
        let value = elements.into_iter().nth(index).ok_or_else(|| {
            OverrideError::internal(format!("lost created element in section {}", spec.name()))
        })?;
        let id = element_id(spec, key, &value)?;
        return Ok((Some(id), value));
    }
    for element in elements {
        if element_id(spec, key, &element)? == request.element {
            return Ok((Some(request.element.clone()), element));
        }
    }
    Err(OverrideError::UnknownElement {
        section: request.section.clone(),
        element: request.element.clone(),
    })
}

fn check_error(section: &str, err: CheckError) -> OverrideError {
    match err {
        CheckError::Decode(message) => OverrideError::Decode {
            section: section.to_string(),
            message,
        },
        CheckError::Validation(source) => OverrideError::Validation {
            section: section.to_string(),
            source,
        },
    }
}

/// Mutating visitor for a single override request.
struct OverrideVisitor<'a> {
    request: &'a Override,
    used: BTreeSet<String>,
    removed: usize,
    created_index: Option<usize>,
    matched: bool,
}

impl Visitor for OverrideVisitor<'_> {
    fn section(&mut self, spec: &SectionSpec, value: &mut Value) -> Result<Descend, OverrideError> {
        if spec.name() != self.request.section {
            return Ok(Descend::Skip);
        }

        if self.request.delete {
            let key = spec
                .element_key()
                .ok_or_else(|| OverrideError::internal("delete against a singleton section"))?;
            let elements = value.as_array_mut().ok_or_else(|| {
                OverrideError::internal(format!("list section {} is not an array", spec.name()))
            })?;
            let before = elements.len();
            let mut kept = Vec::with_capacity(before);
            for element in elements.drain(..) {
                if element_id(spec, key, &element)? != self.request.element {
                    kept.push(element);
                }
            }
            self.removed = before - kept.len();
            *elements = kept;
            return Ok(Descend::Skip);
        }

        if self.request.create {
            let key = spec
                .element_key()
                .ok_or_else(|| OverrideError::internal("create against a singleton section"))?;
            let seed = spec.seed_element().map_err(|e| {
                OverrideError::internal(format!(
                    "failed to seed element for section {}: {e}",
                    spec.name()
                ))
            })?;
            let mut seed_map = match seed {
                Value::Object(map) => map,
                _ => {
                    return Err(OverrideError::internal(format!(
                        "element seed for section {} is not an object",
                        spec.name()
                    )))
                }
            };
            if let Some(id) = self.request.options.get(key) {
                seed_map.insert(key.to_string(), id.clone());
            }
            let elements = value.as_array_mut().ok_or_else(|| {
                OverrideError::internal(format!("list section {} is not an array", spec.name()))
            })?;
            elements.push(Value::Object(seed_map));
            self.created_index = Some(elements.len() - 1);
            return Ok(Descend::Into);
        }

        if !spec.is_list() {
            self.matched = true;
        }
        Ok(Descend::Into)
    }

    fn element(
        &mut self,
        _spec: &SectionSpec,
        index: usize,
        id: &str,
        _value: &mut Value,
    ) -> Result<Descend, OverrideError> {
        match self.created_index {
            Some(created) => {
                if index == created {
                    self.matched = true;
                    Ok(Descend::Into)
                } else {
                    Ok(Descend::Skip)
                }
            }
            // First match by list order wins.
            None => {
                if !self.matched && id == self.request.element {
                    self.matched = true;
                    Ok(Descend::Into)
                } else {
                    Ok(Descend::Skip)
                }
            }
        }
    }

    fn option(
        &mut self,
        _spec: &SectionSpec,
        name: &str,
        value: &mut Value,
    ) -> Result<(), OverrideError> {
        if let Some(set_value) = self.request.options.get(name) {
            coerce(value, set_value.clone()).map_err(|e| OverrideError::CannotSetOption {
                name: name.to_string(),
                source: e,
            })?;
            self.used.insert(name.to_string());
        }
        Ok(())
    }
}

/// Read-only visitor collecting the full section snapshot.
#[derive(Default)]
struct SectionCollector {
    sections: BTreeMap<String, Vec<Element>>,
}

impl Visitor for SectionCollector {
    fn section(&mut self, spec: &SectionSpec, value: &mut Value) -> Result<Descend, OverrideError> {
        if spec.is_list() {
            // Empty lists still appear in the snapshot.
            self.sections.entry(spec.name().to_string()).or_default();
            Ok(Descend::Into)
        } else {
            self.sections
                .entry(spec.name().to_string())
                .or_default()
                .push(Element {
                    section: spec.name().to_string(),
                    element: None,
                    value: value.clone(),
                    redacted: spec.redacted_options(),
                });
            Ok(Descend::Skip)
        }
    }

    fn element(
        &mut self,
        spec: &SectionSpec,
        _index: usize,
        id: &str,
        value: &mut Value,
    ) -> Result<Descend, OverrideError> {
        self.sections
            .entry(spec.name().to_string())
            .or_default()
            .push(Element {
                section: spec.name().to_string(),
                element: Some(id.to_string()),
                value: value.clone(),
                redacted: spec.redacted_options(),
            });
        Ok(Descend::Skip)
    }
}

/// Shape check used at construction: entering every section exercises the
/// walker's structural errors without touching anything.
struct ShapeProbe;

impl Visitor for ShapeProbe {
    fn section(&mut self, _: &SectionSpec, _: &mut Value) -> Result<Descend, OverrideError> {
        Ok(Descend::Into)
    }
}
