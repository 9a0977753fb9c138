//! Transformation store operations.
//!
//! Every operation takes the previous snapshot by reference and returns a new
//! one; nothing is modified in place. Field transformations are keyed by
//! `field.slug`, mappings by `(crm_object_id, api_object_id)`, event actions
//! by event slug. Search filter rows and static side-transformations have no
//! key and are addressed by position.

use tracing::debug;

use crate::error::EditError;
use crate::types::{
    EventAction, FieldRef, FilterValue, ObjectMapping, SearchFilter, StaticValue, Transformation,
};

/// Position of the transformation for `slug`, if any.
pub fn index_of(slug: &str, transformations: &[Transformation]) -> Option<usize> {
    transformations.iter().position(|t| t.slug() == Some(slug))
}

/// Replace the entry with the same slug, or append.
///
/// Untouched entries keep their order. Transformations without a field are
/// always appended.
pub fn upsert(transformation: Transformation, transformations: &[Transformation]) -> Vec<Transformation> {
    let mut next = transformations.to_vec();
    let existing = transformation
        .slug()
        .and_then(|slug| index_of(slug, transformations));
    match existing {
        Some(index) => next[index] = transformation,
        None => next.push(transformation),
    }
    next
}

/// Remove the entry for `slug`. Missing slugs are a no-op.
pub fn remove_by_slug(slug: &str, transformations: &[Transformation]) -> Vec<Transformation> {
    let mut next = transformations.to_vec();
    if let Some(index) = index_of(slug, transformations) {
        next.remove(index);
    }
    next
}

/// Position of the mapping pairing the same two objects.
pub fn mapping_index(mapping: &ObjectMapping, mappings: &[ObjectMapping]) -> Option<usize> {
    mappings.iter().position(|m| m.same_pair(mapping))
}

/// Replace the mapping for the same object pair, or append.
pub fn upsert_mapping(mapping: ObjectMapping, mappings: &[ObjectMapping]) -> Vec<ObjectMapping> {
    let mut next = mappings.to_vec();
    match mapping_index(&mapping, mappings) {
        Some(index) => next[index] = mapping,
        None => next.push(mapping),
    }
    next
}

/// Remove the mapping for the same object pair. Missing pairs are a no-op.
pub fn remove_mapping(mapping: &ObjectMapping, mappings: &[ObjectMapping]) -> Vec<ObjectMapping> {
    mappings
        .iter()
        .filter(|m| !m.same_pair(mapping))
        .cloned()
        .collect()
}

/// Position of the action configured for `event_slug`.
pub fn event_action_index(event_slug: &str, actions: &[EventAction]) -> Option<usize> {
    actions.iter().position(|a| a.event_slug() == event_slug)
}

/// Replace the action for the same event, or append.
pub fn upsert_event_action(action: EventAction, actions: &[EventAction]) -> Vec<EventAction> {
    let mut next = actions.to_vec();
    match event_action_index(action.event_slug(), actions) {
        Some(index) => next[index] = action,
        None => next.push(action),
    }
    next
}

/// Remove the action for `event_slug`. Missing events are a no-op.
pub fn remove_event_action(event_slug: &str, actions: &[EventAction]) -> Vec<EventAction> {
    actions
        .iter()
        .filter(|a| a.event_slug() != event_slug)
        .cloned()
        .collect()
}

// --- Positional edits on search filters ---

/// Append an empty filter row.
pub fn add_filter(filters: &[SearchFilter]) -> Vec<SearchFilter> {
    let mut next = filters.to_vec();
    next.push(SearchFilter::default());
    next
}

/// Remove row `index`; later rows shift down by one.
pub fn remove_filter(index: usize, filters: &[SearchFilter]) -> Result<Vec<SearchFilter>, EditError> {
    check_row(index, filters.len())?;
    let mut next = filters.to_vec();
    next.remove(index);
    Ok(next)
}

/// Set the API field compared by row `index`.
pub fn set_filter_pointer(
    index: usize,
    pointer: impl Into<String>,
    filters: &[SearchFilter],
) -> Result<Vec<SearchFilter>, EditError> {
    edit_filter(index, filters, |row| row.source_pointer = Some(pointer.into()))
}

/// Compare row `index` against a payload field, discarding any literal.
pub fn set_filter_payload_field(
    index: usize,
    slug: impl Into<String>,
    filters: &[SearchFilter],
) -> Result<Vec<SearchFilter>, EditError> {
    edit_filter(index, filters, |row| {
        row.value = Some(FilterValue::Field {
            field: FieldRef::new(slug),
        })
    })
}

/// Compare row `index` against a literal, discarding any payload field.
pub fn set_filter_static(
    index: usize,
    value: impl Into<StaticValue>,
    filters: &[SearchFilter],
) -> Result<Vec<SearchFilter>, EditError> {
    edit_filter(index, filters, |row| {
        row.value = Some(FilterValue::Static {
            static_value: value.into(),
        })
    })
}

fn edit_filter(
    index: usize,
    filters: &[SearchFilter],
    patch: impl FnOnce(&mut SearchFilter),
) -> Result<Vec<SearchFilter>, EditError> {
    check_row(index, filters.len())?;
    let mut next = filters.to_vec();
    patch(&mut next[index]);
    debug!(index, "edited search filter row");
    Ok(next)
}

// --- Positional edits on static side-transformations ---

/// Append a field-less literal assignment.
pub fn add_static(
    target_pointer: impl Into<String>,
    value: impl Into<StaticValue>,
    statics: &[Transformation],
) -> Vec<Transformation> {
    let mut next = statics.to_vec();
    next.push(Transformation::side_static(target_pointer, value));
    next
}

/// Replace the literal assignment at `index`.
pub fn set_static(
    index: usize,
    target_pointer: impl Into<String>,
    value: impl Into<StaticValue>,
    statics: &[Transformation],
) -> Result<Vec<Transformation>, EditError> {
    check_row(index, statics.len())?;
    let mut next = statics.to_vec();
    next[index] = Transformation::side_static(target_pointer, value);
    Ok(next)
}

/// Remove the literal assignment at `index`; later rows shift down by one.
pub fn remove_static(index: usize, statics: &[Transformation]) -> Result<Vec<Transformation>, EditError> {
    check_row(index, statics.len())?;
    let mut next = statics.to_vec();
    next.remove(index);
    Ok(next)
}

fn check_row(index: usize, len: usize) -> Result<(), EditError> {
    if index < len {
        Ok(())
    } else {
        Err(EditError::RowOutOfBounds { index, len })
    }
}
