//! Schema Mapping
//!
//! Engine for mapping developer-defined objects onto the objects exposed by a
//! connected service.
//!
//! Each developer object is paired with one or more API objects. For every
//! pairing the user maps fields (Read) and events (Write) onto nodes of the
//! API object's schema tree. A field may only be fed by a node whose
//! advertised `input_types` match the field's `(type, format)` and offer a
//! supported transformation.
//!
//! # Example
//!
//! ```
//! use schema_mapping::{transformation_for, Field, Selector, SimpleType, TransformationName};
//! use serde_json::json;
//!
//! let selector: Selector = serde_json::from_value(json!({
//!     "label": "Created at",
//!     "pointer": "#/created_at",
//!     "input_types": [{
//!         "input_type": { "type": "string", "format": "date-time" },
//!         "transformations": ["date"]
//!     }]
//! }))
//! .unwrap();
//!
//! let field = Field::new("created", SimpleType::new("string").format("date-time"));
//!
//! // Date-only sources always convert, whatever was requested
//! let t = transformation_for(&field, &selector, false).unwrap();
//! assert_eq!(t.name, TransformationName::Date);
//! assert_eq!(t.source_pointer.as_deref(), Some("#/created_at"));
//! ```
//!
//! # Compatibility Rules
//!
//! | Source offers | Field gets | Date toggle |
//! |---------------|------------|-------------|
//! | `direct` | `direct` | off, disabled |
//! | `date` | `date` | on, disabled |
//! | `direct` + `date` | user's choice | enabled |
//! | nothing supported | not selectable | - |
//!
//! # Editing
//!
//! Mapping edits are copy-on-write: every store operation takes the previous
//! list and returns a new one. [`MappingSession`] drives the stage workflow
//! and talks to storage only through a [`Collaborator`].

mod collaborator;
mod completeness;
mod error;
mod loader;
mod merge;
mod report;
mod resolver;
mod selector;
mod session;
mod store;
mod suggest;
mod types;
mod validator;

pub use collaborator::{
    Call, Collaborator, FileCollaborator, InMemoryCollaborator, SaveRequest, SchemaResponse,
};
pub use completeness::{
    is_all_events_selected, is_all_fields_selected, is_all_objects_selected, is_event_selected,
    is_field_selected, is_object_selected, is_read_selected, is_write_selected, mappings_for,
};
pub use error::{CollaboratorError, EditError, SessionError, ValidateError, ValueError};
pub use loader::{is_url, load_json, load_json_auto, load_json_str};
pub use merge::{
    add_custom_field, merge_saved_state, prune_stale_mappings, reattach_custom_fields,
    remove_custom_field, Merged,
};
pub use report::{check, check_object, CheckResult, Diagnostic, ObjectResult, ObjectState, Severity};
pub use resolver::{
    compatible_pointers, date_toggle, is_selectable, resolve, resolve_selector,
    transformation_for, Criteria, DateToggle,
};
pub use selector::{filter_options, find_option, flatten_options, to_addressable_options, SelectorOption};
pub use session::{
    MappingSession, ObjectStatus, PairingStatus, SessionEvent, SessionView, Snapshot, Stage,
};
pub use store::{
    add_filter, add_static, event_action_index, index_of, mapping_index, remove_by_slug,
    remove_event_action, remove_filter, remove_mapping, remove_static, set_filter_payload_field,
    set_filter_pointer, set_filter_static, set_static, upsert, upsert_event_action, upsert_mapping,
};
pub use suggest::{is_suggested, match_rank, rank_candidates, MatchRank};
pub use types::{
    json_type_name, ActionData, ApiObject, Connection, CriteriaOperator, DeveloperObject, Event,
    EventAction, EventType, Field, FieldRef, FilterValue, InputTypeEntry, ObjectMapping,
    PayloadActionData, SavedMapping, SearchActionData, SearchFilter, Selector, SimpleType,
    StaticValue, Transformation, TransformationKind, TransformationName,
    SUPPORTED_TRANSFORMATIONS,
};
pub use validator::{validate_against_type, validate_static_value, value_schema};

#[cfg(feature = "remote")]
pub use collaborator::{HttpCollaborator, RemoteConfig};
#[cfg(feature = "remote")]
pub use loader::{load_json_url, HTTP_TIMEOUT};
