//! Compatibility resolution - decides which selector nodes can feed a field.
//!
//! A node is a legal source for a field when one of its `input_types`
//! entries has the field's exact `(type, format)` and offers at least one
//! transformation this engine supports (`direct` or `date`). The first such
//! entry wins; the server's ordering is authoritative.

use serde::Serialize;
use tracing::debug;

use crate::selector::{flatten_options, to_addressable_options, SelectorOption};
use crate::types::{
    Field, InputTypeEntry, Selector, SimpleType, Transformation, TransformationKind,
    TransformationName,
};

/// The matched `input_types` entry, narrowed to supported transformations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Criteria<'a> {
    pub entry: &'a InputTypeEntry,
    /// Supported transformations offered by the entry, in entry order.
    pub transformations: Vec<TransformationKind>,
}

impl Criteria<'_> {
    pub fn allows(&self, kind: TransformationKind) -> bool {
        self.transformations.contains(&kind)
    }

    /// Only `date` is offered; the conversion cannot be switched off.
    pub fn is_date_only(&self) -> bool {
        self.allows(TransformationKind::Date) && !self.allows(TransformationKind::Direct)
    }

    /// Both `direct` and `date` are offered; the user picks.
    pub fn is_date_optional(&self) -> bool {
        self.allows(TransformationKind::Date) && self.allows(TransformationKind::Direct)
    }
}

/// Resolve a selector node against a field's declared shape.
///
/// Returns the first `input_types` entry whose type and format match and
/// whose transformations intersect the supported set, or `None`.
pub fn resolve_selector<'a>(selector: &'a Selector, simple_type: &SimpleType) -> Option<Criteria<'a>> {
    let criteria = selector.input_types.iter().find_map(|entry| {
        if entry.input_type != *simple_type {
            return None;
        }
        let transformations: Vec<TransformationKind> = entry
            .transformations
            .iter()
            .copied()
            .filter(TransformationKind::is_supported)
            .collect();
        if transformations.is_empty() {
            None
        } else {
            Some(Criteria {
                entry,
                transformations,
            })
        }
    });

    debug!(
        pointer = %selector.pointer,
        field_type = %simple_type.kind,
        format = simple_type.format.as_deref().unwrap_or(""),
        matched = criteria.is_some(),
        "resolved selector"
    );
    criteria
}

/// Resolve an option against a field.
pub fn resolve<'a>(option: &SelectorOption<'a>, field: &Field) -> Option<Criteria<'a>> {
    resolve_selector(option.selector, &field.simple_type)
}

/// Returns true if the option is a legal source for the field.
pub fn is_selectable(option: &SelectorOption<'_>, field: &Field) -> bool {
    resolve(option, field).is_some()
}

/// State of the "convert to date" control for a field/source pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateToggle {
    pub checked: bool,
    pub disabled: bool,
}

impl DateToggle {
    /// Apply a user toggle. Ignored while the toggle is disabled.
    pub fn toggle(self, checked: bool) -> Self {
        if self.disabled {
            self
        } else {
            Self { checked, ..self }
        }
    }

    /// Transformation name implied by the toggle.
    pub fn transformation_name(&self) -> TransformationName {
        if self.checked {
            TransformationName::Date
        } else {
            TransformationName::Direct
        }
    }
}

/// Compute the date toggle for a resolved source.
///
/// Date-only sources force the toggle on and disable it; direct-only sources
/// force it off and disable it. When both are offered the stored
/// transformation's name decides.
pub fn date_toggle(criteria: &Criteria<'_>, stored: Option<&Transformation>) -> DateToggle {
    if criteria.is_date_only() {
        DateToggle {
            checked: true,
            disabled: true,
        }
    } else if criteria.is_date_optional() {
        DateToggle {
            checked: stored.map_or(false, |t| t.name == TransformationName::Date),
            disabled: false,
        }
    } else {
        DateToggle {
            checked: false,
            disabled: true,
        }
    }
}

/// Build the transformation for selecting `selector` as the source of `field`.
///
/// `date_requested` is honored only when both `direct` and `date` are
/// offered. Returns `None` when the selector is not a legal source.
pub fn transformation_for(
    field: &Field,
    selector: &Selector,
    date_requested: bool,
) -> Option<Transformation> {
    let criteria = resolve_selector(selector, &field.simple_type)?;
    let use_date = if criteria.is_date_only() {
        true
    } else if criteria.is_date_optional() {
        date_requested
    } else {
        false
    };

    Some(if use_date {
        Transformation::date(&field.slug, &selector.pointer)
    } else {
        Transformation::direct(&field.slug, &selector.pointer)
    })
}

/// Every pointer in the tree that can feed the field, in pre-order.
///
/// An empty result means the field has no compatible source in this tree.
pub fn compatible_pointers<'a>(root: &'a Selector, field: &Field) -> Vec<&'a str> {
    let options = to_addressable_options(std::slice::from_ref(root));
    flatten_options(&options)
        .into_iter()
        .filter(|option| is_selectable(option, field))
        .map(|option| option.value)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn selector(input_types: serde_json::Value) -> Selector {
        serde_json::from_value(json!({
            "label": "Created",
            "pointer": "#/created_at",
            "type_label": "string",
            "input_types": input_types
        }))
        .unwrap()
    }

    fn date_field() -> Field {
        Field::new("created", SimpleType::new("string").format("date-time"))
    }

    #[test]
    fn resolve_requires_exact_type_and_format() {
        let sel = selector(json!([
            { "input_type": { "type": "string" }, "transformations": ["direct"] }
        ]));
        assert!(resolve_selector(&sel, &SimpleType::new("string")).is_some());
        assert!(resolve_selector(&sel, &SimpleType::new("number")).is_none());
        assert!(resolve_selector(&sel, &date_field().simple_type).is_none());
    }

    #[test]
    fn resolve_null_format_equals_missing_format() {
        let sel = selector(json!([
            { "input_type": { "type": "string", "format": null }, "transformations": ["direct"] }
        ]));
        assert!(resolve_selector(&sel, &SimpleType::new("string")).is_some());
    }

    #[test]
    fn resolve_skips_unsupported_transformations() {
        let sel = selector(json!([
            { "input_type": { "type": "string" }, "transformations": ["find", "collect"] },
            { "input_type": { "type": "string" }, "transformations": ["collect", "direct"] }
        ]));
        let criteria = resolve_selector(&sel, &SimpleType::new("string")).unwrap();
        assert_eq!(criteria.transformations, vec![TransformationKind::Direct]);
        assert_eq!(
            criteria.entry.transformations,
            vec![TransformationKind::Collect, TransformationKind::Direct]
        );
    }

    #[test]
    fn resolve_is_first_match() {
        let sel = selector(json!([
            { "input_type": { "type": "string", "format": "date-time" }, "transformations": ["date"] },
            { "input_type": { "type": "string", "format": "date-time" }, "transformations": ["direct", "date"] }
        ]));
        let criteria = resolve_selector(&sel, &date_field().simple_type).unwrap();
        assert!(criteria.is_date_only());
    }

    #[test]
    fn date_only_forces_toggle() {
        let sel = selector(json!([
            { "input_type": { "type": "string", "format": "date-time" }, "transformations": ["date"] }
        ]));
        let criteria = resolve_selector(&sel, &date_field().simple_type).unwrap();
        let stored = Transformation::direct("created", "#/created_at");

        let toggle = date_toggle(&criteria, Some(&stored));
        assert_eq!(
            toggle,
            DateToggle {
                checked: true,
                disabled: true
            }
        );
        assert_eq!(toggle.toggle(false), toggle);
    }

    #[test]
    fn optional_date_follows_stored_name() {
        let sel = selector(json!([
            { "input_type": { "type": "string", "format": "date-time" }, "transformations": ["direct", "date"] }
        ]));
        let criteria = resolve_selector(&sel, &date_field().simple_type).unwrap();

        let stored = Transformation::date("created", "#/created_at");
        let toggle = date_toggle(&criteria, Some(&stored));
        assert!(toggle.checked);
        assert!(!toggle.disabled);
        assert!(!toggle.toggle(false).checked);

        assert!(!date_toggle(&criteria, None).checked);
    }

    #[test]
    fn transformation_for_forces_date() {
        let sel = selector(json!([
            { "input_type": { "type": "string", "format": "date-time" }, "transformations": ["date"] }
        ]));
        let t = transformation_for(&date_field(), &sel, false).unwrap();
        assert_eq!(t.name, TransformationName::Date);
        assert_eq!(t.source_pointer.as_deref(), Some("#/created_at"));
        assert_eq!(t.slug(), Some("created"));
    }

    #[test]
    fn transformation_for_ignores_date_request_on_direct_only() {
        let sel = selector(json!([
            { "input_type": { "type": "string" }, "transformations": ["direct"] }
        ]));
        let field = Field::new("name", SimpleType::new("string"));
        let t = transformation_for(&field, &sel, true).unwrap();
        assert_eq!(t.name, TransformationName::Direct);
    }

    #[test]
    fn transformation_for_rejects_ineligible() {
        let sel = selector(json!([]));
        assert!(transformation_for(&date_field(), &sel, true).is_none());
    }

    #[test]
    fn compatible_pointers_walks_tree() {
        let root: Selector = serde_json::from_value(json!({
            "label": "Deal",
            "pointer": "#",
            "children": [
                {
                    "label": "Amount",
                    "pointer": "#/amount",
                    "input_types": [{ "input_type": { "type": "number" }, "transformations": ["direct"] }]
                },
                {
                    "label": "Owner",
                    "pointer": "#/owner",
                    "children": [{
                        "label": "Score",
                        "pointer": "#/owner/score",
                        "input_types": [{ "input_type": { "type": "number" }, "transformations": ["direct"] }]
                    }]
                }
            ]
        }))
        .unwrap();

        let field = Field::new("amount", SimpleType::new("number"));
        assert_eq!(compatible_pointers(&root, &field), ["#/amount", "#/owner/score"]);

        let unmappable = Field::new("flag", SimpleType::new("boolean"));
        assert!(compatible_pointers(&root, &unmappable).is_empty());
    }
}
