//! Completeness evaluation - is a developer object fully mapped?
//!
//! These are pure predicates over a developer object and the mapping
//! snapshot. They gate the "Done" transitions in each editing stage and the
//! final save.

use crate::store::index_of;
use crate::types::{
    ActionData, DeveloperObject, Event, EventAction, Field, ObjectMapping, Transformation,
};

/// Every top-level field has a transformation.
///
/// Vacuously true for objects without fields. A field with custom nested
/// children is also satisfied when all of its children are.
pub fn is_all_fields_selected(object: &DeveloperObject, transformations: &[Transformation]) -> bool {
    object
        .top_level_fields()
        .all(|field| is_field_selected(object, field, transformations))
}

/// Returns true if the field, or all of its nested children, are mapped.
pub fn is_field_selected(
    object: &DeveloperObject,
    field: &Field,
    transformations: &[Transformation],
) -> bool {
    if index_of(&field.slug, transformations).is_some() {
        return true;
    }
    let mut children = object.children_of(&field.slug).peekable();
    children.peek().is_some() && children.all(|child| is_field_selected(object, child, transformations))
}

/// Every event has an action, and create/update actions wire every payload field.
///
/// Vacuously true for objects without events. Events of a type with no
/// action counterpart are not considered.
pub fn is_all_events_selected(object: &DeveloperObject, actions: &[EventAction]) -> bool {
    events_selected(object.events.iter(), actions)
}

/// Returns true if the event is configured with a matching, complete action.
pub fn is_event_selected(event: &Event, actions: &[EventAction]) -> bool {
    let Some(action) = actions.iter().find(|a| a.event_slug() == event.slug) else {
        return false;
    };
    if !action.action.matches_event_type(event.event_type) {
        return false;
    }
    if !event.event_type.requires_payload() {
        return true;
    }
    match action.action.payload() {
        Some(payload) => event
            .fields
            .iter()
            .all(|field| index_of(&field.slug, &payload.transformations).is_some()),
        None => false,
    }
}

fn events_selected<'a>(mut events: impl Iterator<Item = &'a Event>, actions: &[EventAction]) -> bool {
    events.all(|event| {
        ActionData::for_event_type(event.event_type).is_none()
            || is_event_selected(event, actions)
    })
}

/// Mappings that pair the given developer object.
pub fn mappings_for<'a>(
    object: &'a DeveloperObject,
    mappings: &'a [ObjectMapping],
) -> impl Iterator<Item = &'a ObjectMapping> {
    mappings.iter().filter(move |m| m.crm_object_id == object.id)
}

/// Read stage gate: the pairing exists, fields are mapped, and read-time
/// (search) events are configured.
pub fn is_read_selected(object: &DeveloperObject, mapping: Option<&ObjectMapping>) -> bool {
    mapping.map_or(false, |m| {
        is_all_fields_selected(object, &m.transformations)
            && events_selected(
                object.events.iter().filter(|e| e.event_type.is_read_time()),
                &m.event_actions,
            )
    })
}

/// Write stage gate: the pairing exists and every write-time event is configured.
pub fn is_write_selected(object: &DeveloperObject, mapping: Option<&ObjectMapping>) -> bool {
    mapping.map_or(false, |m| {
        events_selected(
            object.events.iter().filter(|e| !e.event_type.is_read_time()),
            &m.event_actions,
        )
    })
}

/// Object gate: at least one pairing, and every pairing is read- and write-complete.
pub fn is_object_selected(object: &DeveloperObject, mappings: &[ObjectMapping]) -> bool {
    let mut pairings = mappings_for(object, mappings).peekable();
    pairings.peek().is_some()
        && pairings.all(|m| is_read_selected(object, Some(m)) && is_write_selected(object, Some(m)))
}

/// Save gate: every developer object is selected.
pub fn is_all_objects_selected(objects: &[DeveloperObject], mappings: &[ObjectMapping]) -> bool {
    objects
        .iter()
        .all(|object| is_object_selected(object, mappings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventType, PayloadActionData, SearchActionData, SimpleType};

    fn string_field(slug: &str) -> Field {
        Field::new(slug, SimpleType::new("string"))
    }

    fn event(slug: &str, event_type: EventType, fields: &[&str]) -> Event {
        Event {
            slug: slug.to_string(),
            event_type,
            label: slug.to_string(),
            description: None,
            fields: fields.iter().map(|f| string_field(f)).collect(),
        }
    }

    fn contact() -> DeveloperObject {
        DeveloperObject {
            id: "dev-contact".into(),
            slug: "contact".into(),
            label: "Contact".into(),
            description: None,
            fields: vec![string_field("name"), string_field("email")],
            events: vec![],
        }
    }

    #[test]
    fn no_fields_is_vacuously_selected() {
        let object = DeveloperObject {
            fields: vec![],
            ..contact()
        };
        assert!(is_all_fields_selected(&object, &[]));
    }

    #[test]
    fn every_field_needs_a_transformation() {
        let object = contact();
        let one = vec![Transformation::direct("name", "#/name")];
        assert!(!is_all_fields_selected(&object, &one));

        let both = vec![
            Transformation::direct("name", "#/name"),
            Transformation::static_value("email", "none@example.com"),
        ];
        assert!(is_all_fields_selected(&object, &both));
    }

    #[test]
    fn nested_children_satisfy_parent() {
        let mut object = contact();
        object.fields = vec![Field::new("address", SimpleType::new("object"))];
        let mut city = string_field("address.city");
        city.parent_slug = Some("address".into());
        object.fields.push(city);

        assert!(!is_all_fields_selected(&object, &[]));
        let t = vec![Transformation::direct("address.city", "#/city")];
        assert!(is_all_fields_selected(&object, &t));
    }

    #[test]
    fn payload_events_need_every_field() {
        let mut object = contact();
        object.events = vec![event("contact.created", EventType::Create, &["name", "email"])];

        assert!(!is_all_events_selected(&object, &[]));

        let partial = EventAction::new(
            "contact.created",
            ActionData::Create(PayloadActionData {
                transformations: vec![Transformation::direct("name", "#/name")],
                static_transformations: vec![],
            }),
        );
        assert!(!is_all_events_selected(&object, &[partial]));

        let full = EventAction::new(
            "contact.created",
            ActionData::Create(PayloadActionData {
                transformations: vec![
                    Transformation::direct("name", "#/name"),
                    Transformation::direct("email", "#/email"),
                ],
                static_transformations: vec![],
            }),
        );
        assert!(is_all_events_selected(&object, &[full]));
    }

    #[test]
    fn mismatched_action_kind_is_incomplete() {
        let mut object = contact();
        object.events = vec![event("contact.updated", EventType::Update, &["name"])];
        let action = EventAction::new("contact.updated", ActionData::Delete);
        assert!(!is_all_events_selected(&object, &[action]));
    }

    #[test]
    fn search_event_with_delete_action_is_incomplete() {
        let mut object = contact();
        object.events = vec![
            event("contact.search", EventType::Search, &[]),
            event("contact.deleted", EventType::Delete, &[]),
        ];
        let crossed = vec![
            EventAction::new("contact.search", ActionData::Delete),
            EventAction::new("contact.deleted", ActionData::Search(SearchActionData::default())),
        ];
        assert!(!is_event_selected(&object.events[0], &crossed));
        assert!(!is_event_selected(&object.events[1], &crossed));
        assert!(!is_all_events_selected(&object, &crossed));
    }

    #[test]
    fn create_event_with_update_action_is_incomplete() {
        let mut object = contact();
        object.events = vec![event("contact.created", EventType::Create, &[])];
        let action = EventAction::new("contact.created", ActionData::Update(PayloadActionData::default()));
        assert!(!is_all_events_selected(&object, &[action]));
    }

    #[test]
    fn search_and_delete_need_only_configuration() {
        let mut object = contact();
        object.events = vec![
            event("contact.search", EventType::Search, &["email"]),
            event("contact.deleted", EventType::Delete, &["id"]),
        ];
        let actions = vec![
            EventAction::new("contact.search", ActionData::Search(SearchActionData::default())),
            EventAction::new("contact.deleted", ActionData::Delete),
        ];
        assert!(is_all_events_selected(&object, &actions));
        assert!(!is_all_events_selected(&object, &actions[..1]));
    }

    #[test]
    fn read_and_write_gates_split_events() {
        let mut object = contact();
        object.events = vec![
            event("contact.search", EventType::Search, &[]),
            event("contact.deleted", EventType::Delete, &[]),
        ];
        let mapping = ObjectMapping::new("dev-contact", "api-contact").derive(|m| {
            m.transformations = vec![
                Transformation::direct("name", "#/name"),
                Transformation::direct("email", "#/email"),
            ];
            m.event_actions = vec![EventAction::new("contact.deleted", ActionData::Delete)];
        });

        assert!(!is_read_selected(&object, Some(&mapping)));
        assert!(is_write_selected(&object, Some(&mapping)));
        assert!(!is_read_selected(&object, None));
        assert!(!is_write_selected(&object, None));
    }

    #[test]
    fn object_selected_requires_a_pairing() {
        let object = DeveloperObject {
            fields: vec![],
            ..contact()
        };
        assert!(!is_object_selected(&object, &[]));

        let mapping = ObjectMapping::new("dev-contact", "api-contact");
        assert!(is_object_selected(&object, &[mapping.clone()]));
        assert!(is_all_objects_selected(&[object], &[mapping]));
    }
}
