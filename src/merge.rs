//! Reconciling saved mapping state with the current schema snapshot.
//!
//! On load the saved developer objects may carry custom nested fields the
//! user created earlier. Those are re-attached to the fresh developer-object
//! schema when their parent still exists. Mappings whose objects no longer
//! resolve are then dropped.

use tracing::{debug, warn};

use crate::error::EditError;
use crate::store::remove_by_slug;
use crate::types::{ApiObject, DeveloperObject, Field, ObjectMapping, SimpleType};

/// Re-attach custom fields from `saved` onto the matching objects in `current`.
///
/// A custom field is kept only if its parent slug resolves in the merged
/// field list and no field with the same slug already exists. Saved objects
/// not present in `current` are ignored.
pub fn reattach_custom_fields(
    current: &[DeveloperObject],
    saved: &[DeveloperObject],
) -> Vec<DeveloperObject> {
    current
        .iter()
        .map(|object| match saved.iter().find(|s| s.id == object.id) {
            Some(previous) => merge_object(object, previous),
            None => object.clone(),
        })
        .collect()
}

fn merge_object(current: &DeveloperObject, saved: &DeveloperObject) -> DeveloperObject {
    let mut merged = current.clone();
    for field in saved.fields.iter().filter(|f| f.is_custom()) {
        if merged.field(&field.slug).is_some() {
            continue;
        }
        let parent = field.parent_slug.as_deref().unwrap_or_default();
        if merged.field(parent).is_some() {
            debug!(object = %merged.slug, field = %field.slug, "re-attached custom field");
            merged.fields.push(field.clone());
        } else {
            warn!(
                object = %merged.slug,
                field = %field.slug,
                parent,
                "dropping custom field whose parent no longer exists"
            );
        }
    }
    merged
}

/// Drop mappings whose developer or API object is not in the current lists.
pub fn prune_stale_mappings(
    mappings: &[ObjectMapping],
    objects: &[DeveloperObject],
    api_objects: &[ApiObject],
) -> Vec<ObjectMapping> {
    mappings
        .iter()
        .filter(|mapping| {
            let resolves = objects.iter().any(|o| o.id == mapping.crm_object_id)
                && api_objects.iter().any(|a| a.id == mapping.api_object_id);
            if !resolves {
                warn!(
                    crm_object_id = %mapping.crm_object_id,
                    api_object_id = %mapping.api_object_id,
                    "pruning stale mapping"
                );
            }
            resolves
        })
        .cloned()
        .collect()
}

/// Result of reconciling a saved mapping with the current schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    pub objects: Vec<DeveloperObject>,
    pub mappings: Vec<ObjectMapping>,
}

/// Re-attach custom fields, then prune stale mappings.
pub fn merge_saved_state(
    current: &[DeveloperObject],
    api_objects: &[ApiObject],
    saved_objects: &[DeveloperObject],
    saved_mappings: &[ObjectMapping],
) -> Merged {
    let objects = reattach_custom_fields(current, saved_objects);
    let mappings = prune_stale_mappings(saved_mappings, &objects, api_objects);
    Merged { objects, mappings }
}

/// Add a custom field `key` nested under the object-typed field `parent_slug`.
///
/// The new field's slug is `"{parent_slug}.{key}"`.
pub fn add_custom_field(
    object: &DeveloperObject,
    parent_slug: &str,
    key: &str,
    simple_type: SimpleType,
) -> Result<DeveloperObject, EditError> {
    let parent = object
        .field(parent_slug)
        .ok_or_else(|| EditError::UnknownParentField {
            slug: parent_slug.to_string(),
        })?;
    if !parent.simple_type.is_object() {
        return Err(EditError::ParentNotObject {
            slug: parent_slug.to_string(),
        });
    }

    let slug = format!("{}.{}", parent_slug, key);
    if object.field(&slug).is_some() {
        return Err(EditError::DuplicateField { slug });
    }

    let mut next = object.clone();
    next.fields.push(Field {
        slug,
        simple_type,
        label: key.to_string(),
        description: None,
        parent_slug: Some(parent_slug.to_string()),
    });
    Ok(next)
}

/// Remove a custom field, its custom descendants, and their transformations.
///
/// Returns the updated object and the updated mapping for that object.
pub fn remove_custom_field(
    object: &DeveloperObject,
    mapping: &ObjectMapping,
    slug: &str,
) -> Result<(DeveloperObject, ObjectMapping), EditError> {
    let removed = custom_field_family(object, slug)?;
    let mut next = object.clone();
    next.fields.retain(|f| !removed.contains(&f.slug));
    Ok((next, without_fields(mapping, &removed)))
}

/// Slug of a custom field followed by the slugs of all its nested children.
pub fn custom_field_family(object: &DeveloperObject, slug: &str) -> Result<Vec<String>, EditError> {
    match object.field(slug) {
        Some(field) if field.is_custom() => {}
        _ => {
            return Err(EditError::UnknownField {
                slug: slug.to_string(),
            })
        }
    }

    let mut removed = vec![slug.to_string()];
    let mut cursor = 0;
    while cursor < removed.len() {
        let parent = removed[cursor].clone();
        removed.extend(object.children_of(&parent).map(|f| f.slug.clone()));
        cursor += 1;
    }
    Ok(removed)
}

/// Drop the transformations keyed by any of `slugs`.
pub fn without_fields(mapping: &ObjectMapping, slugs: &[String]) -> ObjectMapping {
    mapping.derive(|m| {
        for slug in slugs {
            m.transformations = remove_by_slug(slug, &m.transformations);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Transformation;

    fn object(id: &str, fields: Vec<Field>) -> DeveloperObject {
        DeveloperObject {
            id: id.into(),
            slug: id.into(),
            label: id.into(),
            description: None,
            fields,
            events: vec![],
        }
    }

    fn api(id: &str) -> ApiObject {
        ApiObject {
            id: id.into(),
            slug: id.into(),
            label_one: id.into(),
            label_many: format!("{}s", id),
            selector: None,
        }
    }

    fn custom(slug: &str, parent: &str) -> Field {
        Field {
            parent_slug: Some(parent.into()),
            ..Field::new(slug, SimpleType::new("string"))
        }
    }

    #[test]
    fn reattaches_custom_fields_with_live_parent() {
        let current = vec![object(
            "contact",
            vec![Field::new("meta", SimpleType::new("object"))],
        )];
        let saved = vec![object(
            "contact",
            vec![
                Field::new("meta", SimpleType::new("object")),
                custom("meta.tier", "meta"),
                custom("gone.x", "gone"),
            ],
        )];

        let merged = reattach_custom_fields(&current, &saved);
        let slugs: Vec<&str> = merged[0].fields.iter().map(|f| f.slug.as_str()).collect();
        assert_eq!(slugs, ["meta", "meta.tier"]);
    }

    #[test]
    fn reattach_handles_nested_custom_chain() {
        let current = vec![object(
            "contact",
            vec![Field::new("meta", SimpleType::new("object"))],
        )];
        let mut inner = custom("meta.extra", "meta");
        inner.simple_type = SimpleType::new("object");
        let saved = vec![object(
            "contact",
            vec![inner, custom("meta.extra.note", "meta.extra")],
        )];

        let merged = reattach_custom_fields(&current, &saved);
        assert_eq!(merged[0].fields.len(), 3);
    }

    #[test]
    fn prune_drops_unresolved_pairs() {
        let objects = vec![object("contact", vec![])];
        let apis = vec![api("person")];
        let keep = ObjectMapping::new("contact", "person");
        let stale_api = ObjectMapping::new("contact", "lead");
        let stale_dev = ObjectMapping::new("invoice", "person");

        let pruned = prune_stale_mappings(
            &[keep.clone(), stale_api, stale_dev],
            &objects,
            &apis,
        );
        assert_eq!(pruned, vec![keep]);
    }

    #[test]
    fn add_custom_field_under_object_parent() {
        let obj = object("contact", vec![Field::new("meta", SimpleType::new("object"))]);
        let next = add_custom_field(&obj, "meta", "tier", SimpleType::new("string")).unwrap();
        let field = next.field("meta.tier").unwrap();
        assert_eq!(field.parent_slug.as_deref(), Some("meta"));
        assert!(obj.field("meta.tier").is_none());

        let err = add_custom_field(&next, "meta", "tier", SimpleType::new("string")).unwrap_err();
        assert!(matches!(err, EditError::DuplicateField { .. }));
    }

    #[test]
    fn add_custom_field_rejects_non_object_parent() {
        let obj = object("contact", vec![Field::new("name", SimpleType::new("string"))]);
        assert!(matches!(
            add_custom_field(&obj, "name", "x", SimpleType::new("string")),
            Err(EditError::ParentNotObject { .. })
        ));
        assert!(matches!(
            add_custom_field(&obj, "nope", "x", SimpleType::new("string")),
            Err(EditError::UnknownParentField { .. })
        ));
    }

    #[test]
    fn remove_custom_field_cascades() {
        let mut extra = custom("meta.extra", "meta");
        extra.simple_type = SimpleType::new("object");
        let obj = object(
            "contact",
            vec![
                Field::new("meta", SimpleType::new("object")),
                extra,
                custom("meta.extra.note", "meta.extra"),
            ],
        );
        let mapping = ObjectMapping::new("contact", "person").derive(|m| {
            m.transformations = vec![
                Transformation::direct("meta.extra.note", "#/note"),
                Transformation::direct("meta", "#/meta"),
            ];
        });

        let (next, next_mapping) = remove_custom_field(&obj, &mapping, "meta.extra").unwrap();
        assert_eq!(next.fields.len(), 1);
        assert_eq!(next_mapping.transformations.len(), 1);
        assert_eq!(next_mapping.transformations[0].slug(), Some("meta"));

        assert!(remove_custom_field(&obj, &mapping, "meta").is_err());
    }
}
