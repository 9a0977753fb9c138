//! Completeness report - static analysis of a whole mapping.
//!
//! Checks every developer object against its pairings for:
//! - Unmapped fields and unconfigured events
//! - Pointers that no longer exist in the paired schema
//! - Static literals that don't fit the field's declared shape
//! - Fields with no compatible source at all

use serde::Serialize;

use crate::completeness::{is_field_selected, is_object_selected, mappings_for};
use crate::error::ValidateError;
use crate::resolver::compatible_pointers;
use crate::types::{
    ActionData, ApiObject, DeveloperObject, EventAction, ObjectMapping, Selector, Transformation,
    TransformationName,
};
use crate::validator::validate_static_value;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic from checking a mapping.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    /// Developer object slug.
    pub object: String,
    /// API object id of the pairing, if the issue is pairing-specific.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing: Option<String>,
    /// Location of the issue (e.g., "fields/email", "events/contact.created/name")
    pub path: String,
    pub message: String,
}

/// Status of a checked developer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectState {
    Complete,
    Incomplete,
    Unpaired,
}

/// Result of checking a single developer object.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectResult {
    pub object: String,
    pub status: ObjectState,
    pub pairings: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of checking every developer object.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub objects_checked: usize,
    pub complete: usize,
    pub incomplete: usize,
    pub unpaired: usize,
    pub errors: usize,
    pub warnings: usize,
    pub results: Vec<ObjectResult>,
}

impl CheckResult {
    /// Returns true if every developer object is complete.
    pub fn is_ok(&self) -> bool {
        self.complete == self.objects_checked
    }
}

/// Check every developer object against the mapping list.
///
/// Pointer and compatibility checks only run for API objects whose selector
/// has been fetched.
pub fn check(
    objects: &[DeveloperObject],
    api_objects: &[ApiObject],
    mappings: &[ObjectMapping],
) -> CheckResult {
    let results: Vec<ObjectResult> = objects
        .iter()
        .map(|object| check_object(object, api_objects, mappings))
        .collect();

    let count = |state: ObjectState| results.iter().filter(|r| r.status == state).count();
    let severity = |severity: Severity| {
        results
            .iter()
            .flat_map(|r| &r.diagnostics)
            .filter(|d| d.severity == severity)
            .count()
    };

    CheckResult {
        objects_checked: results.len(),
        complete: count(ObjectState::Complete),
        incomplete: count(ObjectState::Incomplete),
        unpaired: count(ObjectState::Unpaired),
        errors: severity(Severity::Error),
        warnings: severity(Severity::Warning),
        results,
    }
}

/// Check one developer object and each of its pairings.
pub fn check_object(
    object: &DeveloperObject,
    api_objects: &[ApiObject],
    mappings: &[ObjectMapping],
) -> ObjectResult {
    let pairings: Vec<&ObjectMapping> = mappings_for(object, mappings).collect();

    if pairings.is_empty() {
        return ObjectResult {
            object: object.slug.clone(),
            status: ObjectState::Unpaired,
            pairings: Vec::new(),
            diagnostics: vec![Diagnostic {
                severity: Severity::Warning,
                code: "W002".to_string(),
                object: object.slug.clone(),
                pairing: None,
                path: "/".to_string(),
                message: "developer object is not paired with any API object".to_string(),
            }],
        };
    }

    let mut diagnostics = Vec::new();
    for mapping in &pairings {
        let selector = api_objects
            .iter()
            .find(|a| a.id == mapping.api_object_id)
            .and_then(|a| a.selector.as_ref());
        let mut ctx = PairingCheck {
            object,
            mapping,
            selector,
            diagnostics: &mut diagnostics,
        };
        ctx.check_fields();
        ctx.check_events();
    }

    let has_errors = diagnostics.iter().any(|d| d.severity == Severity::Error);
    let status = if has_errors || !is_object_selected(object, mappings) {
        ObjectState::Incomplete
    } else {
        ObjectState::Complete
    };

    ObjectResult {
        object: object.slug.clone(),
        status,
        pairings: pairings.iter().map(|m| m.api_object_id.clone()).collect(),
        diagnostics,
    }
}

struct PairingCheck<'a> {
    object: &'a DeveloperObject,
    mapping: &'a ObjectMapping,
    selector: Option<&'a Selector>,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl PairingCheck<'_> {
    fn push(&mut self, severity: Severity, code: &str, path: String, message: String) {
        self.diagnostics.push(Diagnostic {
            severity,
            code: code.to_string(),
            object: self.object.slug.clone(),
            pairing: Some(self.mapping.api_object_id.clone()),
            path,
            message,
        });
    }

    fn check_fields(&mut self) {
        let object = self.object;
        let mapping = self.mapping;
        let transformations = &mapping.transformations;
        let api_object_id = &mapping.api_object_id;

        for field in object.top_level_fields() {
            if is_field_selected(object, field, transformations) {
                continue;
            }
            self.push(
                Severity::Error,
                "E001",
                format!("fields/{}", field.slug),
                format!("field '{}' is not mapped", field.slug),
            );
            let unmappable = self
                .selector
                .map_or(false, |root| compatible_pointers(root, field).is_empty());
            if unmappable {
                self.push(
                    Severity::Warning,
                    "W001",
                    format!("fields/{}", field.slug),
                    format!(
                        "no source in '{}' accepts type '{}'{}",
                        api_object_id,
                        field.simple_type.kind,
                        field
                            .simple_type
                            .format
                            .as_ref()
                            .map(|f| format!(" with format '{}'", f))
                            .unwrap_or_default()
                    ),
                );
            }
        }

        for transformation in transformations {
            let Some(slug) = transformation.slug() else {
                continue;
            };
            let path = format!("fields/{}", slug);
            self.check_pointer(transformation, &path);
            if transformation.name == TransformationName::Static {
                self.check_static(slug, transformation, &path);
            }
        }
    }

    fn check_events(&mut self) {
        let object = self.object;
        let mapping = self.mapping;

        for event in &object.events {
            if ActionData::for_event_type(event.event_type).is_none() {
                continue;
            }
            let path = format!("events/{}", event.slug);
            let Some(action) = mapping.event_action(&event.slug) else {
                self.push(
                    Severity::Error,
                    "E002",
                    path,
                    format!("event '{}' has no configured action", event.slug),
                );
                continue;
            };

            if !action.action.matches_event_type(event.event_type) {
                self.push(
                    Severity::Error,
                    "E002",
                    path,
                    format!("event '{}' is configured with the wrong action type", event.slug),
                );
                continue;
            }

            if let Some(payload) = action.action.payload() {
                for field in &event.fields {
                    if payload.transformations.iter().all(|t| t.slug() != Some(field.slug.as_str())) {
                        self.push(
                            Severity::Error,
                            "E003",
                            format!("{}/{}", path, field.slug),
                            format!("payload field '{}' is not mapped", field.slug),
                        );
                    }
                }
            }

            self.check_action_pointers(action, &path);
        }
    }

    fn check_action_pointers(&mut self, action: &EventAction, path: &str) {
        match &action.action {
            ActionData::Create(payload) | ActionData::Update(payload) => {
                for t in payload.transformations.iter().chain(&payload.static_transformations) {
                    self.check_pointer(t, path);
                }
            }
            ActionData::Search(search) => {
                for (i, filter) in search.filters.iter().enumerate() {
                    if let Some(pointer) = &filter.source_pointer {
                        self.check_pointer_str(pointer, &format!("{}/filters/{}", path, i));
                    }
                }
            }
            ActionData::Delete => {}
        }
    }

    fn check_pointer(&mut self, transformation: &Transformation, path: &str) {
        // Field-bound statics carry no pointer.
        if let Some(pointer) = &transformation.source_pointer {
            self.check_pointer_str(pointer, path);
        }
    }

    fn check_pointer_str(&mut self, pointer: &str, path: &str) {
        let Some(root) = self.selector else {
            return;
        };
        if root.find(pointer).is_none() {
            self.push(
                Severity::Error,
                "E004",
                path.to_string(),
                format!("pointer not found: {}", pointer),
            );
        }
    }

    fn check_static(&mut self, slug: &str, transformation: &Transformation, path: &str) {
        let (Some(field), Some(value)) = (self.object.field(slug), &transformation.static_value) else {
            return;
        };
        match validate_static_value(field, value) {
            Ok(()) => {}
            Err(ValidateError::Invalid { errors }) => {
                for error in errors {
                    self.push(Severity::Error, "E005", path.to_string(), error.to_string());
                }
            }
            Err(e) => self.push(Severity::Error, "E005", path.to_string(), e.to_string()),
        }
    }
}
