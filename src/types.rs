//! Core types for schema mapping.
//!
//! Everything here is plain owned data with serde support. Schema trees
//! ([`Selector`]) are read-only once fetched; mappings ([`ObjectMapping`])
//! are edited copy-on-write through [`ObjectMapping::derive`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transformations the engine knows how to apply to a pointer copy.
pub const SUPPORTED_TRANSFORMATIONS: &[TransformationKind] =
    &[TransformationKind::Direct, TransformationKind::Date];

/// Declared shape of a value: a JSON type plus an optional format.
///
/// A missing format and an explicit `null` format are equivalent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimpleType {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl SimpleType {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            format: None,
        }
    }

    /// Set the format (e.g. `date-time`).
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn is_object(&self) -> bool {
        self.kind == "object"
    }
}

/// Transformation a selector node can perform for a given target shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformationKind {
    Direct,
    Date,
    Find,
    Collect,
    /// Anything the server advertises that this engine does not model.
    #[serde(other)]
    Unknown,
}

impl TransformationKind {
    pub fn is_supported(&self) -> bool {
        SUPPORTED_TRANSFORMATIONS.contains(self)
    }
}

/// One `(target shape -> allowed transformations)` pair served by a selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputTypeEntry {
    pub input_type: SimpleType,
    #[serde(default)]
    pub transformations: Vec<TransformationKind>,
}

/// A node in an API object's schema tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    pub label: String,
    /// Address of this node, unique within the tree.
    pub pointer: String,
    #[serde(default)]
    pub type_label: String,
    #[serde(default)]
    pub input_types: Vec<InputTypeEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Selector>>,
}

impl Selector {
    pub fn is_leaf(&self) -> bool {
        self.children.as_ref().map_or(true, |c| c.is_empty())
    }

    /// Depth-first search for the node with the given pointer.
    pub fn find(&self, pointer: &str) -> Option<&Selector> {
        if self.pointer == pointer {
            return Some(self);
        }
        self.children
            .iter()
            .flatten()
            .find_map(|child| child.find(pointer))
    }
}

/// A developer-defined field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Unique within the owning list; dot-qualified for nested fields.
    pub slug: String,
    pub simple_type: SimpleType,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Set only on user-added custom fields nested under an object field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_slug: Option<String>,
}

impl Field {
    pub fn new(slug: impl Into<String>, simple_type: SimpleType) -> Self {
        let slug = slug.into();
        Self {
            label: slug.clone(),
            slug,
            simple_type,
            description: None,
            parent_slug: None,
        }
    }

    pub fn is_custom(&self) -> bool {
        self.parent_slug.is_some()
    }
}

/// Kind of developer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Create,
    Update,
    Search,
    Delete,
    #[serde(other)]
    Other,
}

impl EventType {
    /// Search events are lookups performed at read time.
    pub fn is_read_time(&self) -> bool {
        matches!(self, EventType::Search)
    }

    /// Returns true for actions whose payload fields must all be wired.
    pub fn requires_payload(&self) -> bool {
        matches!(self, EventType::Create | EventType::Update)
    }
}

/// A developer-defined event with its payload fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub slug: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

/// An application-defined entity requiring data from the connected service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeveloperObject {
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl DeveloperObject {
    pub fn field(&self, slug: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.slug == slug)
    }

    /// Fields not nested under another field.
    pub fn top_level_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.parent_slug.is_none())
    }

    /// Custom fields whose parent is `parent_slug`.
    pub fn children_of<'a>(&'a self, parent_slug: &'a str) -> impl Iterator<Item = &'a Field> {
        self.fields
            .iter()
            .filter(move |f| f.parent_slug.as_deref() == Some(parent_slug))
    }

    pub fn event(&self, slug: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.slug == slug)
    }

    pub fn has_read_side(&self) -> bool {
        !self.fields.is_empty() || self.events.iter().any(|e| e.event_type.is_read_time())
    }

    pub fn has_write_side(&self) -> bool {
        self.events.iter().any(|e| !e.event_type.is_read_time())
    }
}

/// A schema-discoverable entity exposed by the connected service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiObject {
    pub id: String,
    pub slug: String,
    pub label_one: String,
    #[serde(default)]
    pub label_many: String,
    /// Fetched lazily the first time a pairing is opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,
}

/// Handle for the connection the mapping belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Connection {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
        }
    }
}

/// How a transformation produces its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformationName {
    /// Raw pointer copy.
    Direct,
    /// Pointer copy normalized to ISO-8601.
    Date,
    /// Literal supplied by the user.
    Static,
}

/// A string, number, or boolean literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StaticValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl StaticValue {
    pub fn to_json(&self) -> Value {
        match self {
            StaticValue::Bool(b) => Value::Bool(*b),
            StaticValue::Number(n) => Value::Number(n.clone()),
            StaticValue::String(s) => Value::String(s.clone()),
        }
    }
}

impl From<&str> for StaticValue {
    fn from(s: &str) -> Self {
        StaticValue::String(s.to_string())
    }
}

impl From<bool> for StaticValue {
    fn from(b: bool) -> Self {
        StaticValue::Bool(b)
    }
}

impl From<i64> for StaticValue {
    fn from(n: i64) -> Self {
        StaticValue::Number(n.into())
    }
}

/// Comparison used by a search filter row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriteriaOperator {
    #[default]
    Eq,
}

/// Reference to a field by slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub slug: String,
}

impl FieldRef {
    pub fn new(slug: impl Into<String>) -> Self {
        Self { slug: slug.into() }
    }
}

/// Resolved rule for populating one field.
///
/// `source_pointer` is set for `direct`/`date`, `static_value` for `static`.
/// Static side-transformations on write actions carry no `field` and use
/// `source_pointer` to address the API field being written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldRef>,
    pub name: TransformationName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_pointer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_value: Option<StaticValue>,
}

impl Transformation {
    pub fn direct(slug: impl Into<String>, pointer: impl Into<String>) -> Self {
        Self {
            field: Some(FieldRef::new(slug)),
            name: TransformationName::Direct,
            source_pointer: Some(pointer.into()),
            static_value: None,
        }
    }

    pub fn date(slug: impl Into<String>, pointer: impl Into<String>) -> Self {
        Self {
            name: TransformationName::Date,
            ..Self::direct(slug, pointer)
        }
    }

    pub fn static_value(slug: impl Into<String>, value: impl Into<StaticValue>) -> Self {
        Self {
            field: Some(FieldRef::new(slug)),
            name: TransformationName::Static,
            source_pointer: None,
            static_value: Some(value.into()),
        }
    }

    /// Field-less literal written to `target_pointer` on a write action.
    pub fn side_static(target_pointer: impl Into<String>, value: impl Into<StaticValue>) -> Self {
        Self {
            field: None,
            name: TransformationName::Static,
            source_pointer: Some(target_pointer.into()),
            static_value: Some(value.into()),
        }
    }

    pub fn slug(&self) -> Option<&str> {
        self.field.as_ref().map(|f| f.slug.as_str())
    }
}

/// Value side of a search filter row. The two forms never coexist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum FilterValue {
    /// Compare against a payload field of the search event.
    #[serde(rename = "direct")]
    Field { field: FieldRef },
    /// Compare against a literal.
    Static { static_value: StaticValue },
}

/// One clause of a search action: `API field <op> value`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchFilter {
    /// API field being compared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_pointer: Option<String>,
    #[serde(default)]
    pub criteria_operator: CriteriaOperator,
    #[serde(flatten)]
    pub value: Option<FilterValue>,
}

impl SearchFilter {
    pub fn name(&self) -> Option<TransformationName> {
        match self.value {
            Some(FilterValue::Field { .. }) => Some(TransformationName::Direct),
            Some(FilterValue::Static { .. }) => Some(TransformationName::Static),
            None => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.source_pointer.is_some() && self.value.is_some()
    }
}

/// Data for create/update actions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PayloadActionData {
    /// One entry per payload field wired to an API field, unique by slug.
    #[serde(default)]
    pub transformations: Vec<Transformation>,
    /// User-defined literals not tied to any payload field, addressed by index.
    #[serde(default)]
    pub static_transformations: Vec<Transformation>,
}

/// Data for search actions: ordered filter rows addressed by position.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchActionData {
    #[serde(default)]
    pub filters: Vec<SearchFilter>,
}

/// Write-side configuration, tagged by action type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "lowercase")]
pub enum ActionData {
    Create(PayloadActionData),
    Update(PayloadActionData),
    Search(SearchActionData),
    Delete,
}

impl ActionData {
    /// Empty action data matching an event's type.
    ///
    /// Returns `None` for event types with no action counterpart.
    pub fn for_event_type(event_type: EventType) -> Option<Self> {
        match event_type {
            EventType::Create => Some(ActionData::Create(PayloadActionData::default())),
            EventType::Update => Some(ActionData::Update(PayloadActionData::default())),
            EventType::Search => Some(ActionData::Search(SearchActionData::default())),
            EventType::Delete => Some(ActionData::Delete),
            EventType::Other => None,
        }
    }

    /// Returns true if this action is the kind an event of `event_type` takes.
    pub fn matches_event_type(&self, event_type: EventType) -> bool {
        matches!(
            (self, event_type),
            (ActionData::Create(_), EventType::Create)
                | (ActionData::Update(_), EventType::Update)
                | (ActionData::Search(_), EventType::Search)
                | (ActionData::Delete, EventType::Delete)
        )
    }

    pub fn payload(&self) -> Option<&PayloadActionData> {
        match self {
            ActionData::Create(data) | ActionData::Update(data) => Some(data),
            _ => None,
        }
    }

    pub fn payload_mut(&mut self) -> Option<&mut PayloadActionData> {
        match self {
            ActionData::Create(data) | ActionData::Update(data) => Some(data),
            _ => None,
        }
    }

    pub fn search(&self) -> Option<&SearchActionData> {
        match self {
            ActionData::Search(data) => Some(data),
            _ => None,
        }
    }

    pub fn search_mut(&mut self) -> Option<&mut SearchActionData> {
        match self {
            ActionData::Search(data) => Some(data),
            _ => None,
        }
    }
}

/// Write-side mapping for one developer event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAction {
    pub event: FieldRef,
    #[serde(flatten)]
    pub action: ActionData,
}

impl EventAction {
    pub fn new(event_slug: impl Into<String>, action: ActionData) -> Self {
        Self {
            event: FieldRef::new(event_slug),
            action,
        }
    }

    pub fn event_slug(&self) -> &str {
        &self.event.slug
    }
}

/// Pairing of one developer object with one API object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMapping {
    /// Developer object id.
    pub crm_object_id: String,
    pub api_object_id: String,
    #[serde(default)]
    pub transformations: Vec<Transformation>,
    #[serde(default)]
    pub event_actions: Vec<EventAction>,
}

impl ObjectMapping {
    /// A fresh pairing with no field or event mappings.
    pub fn new(crm_object_id: impl Into<String>, api_object_id: impl Into<String>) -> Self {
        Self {
            crm_object_id: crm_object_id.into(),
            api_object_id: api_object_id.into(),
            transformations: Vec::new(),
            event_actions: Vec::new(),
        }
    }

    /// Returns true if both mappings pair the same two objects.
    pub fn same_pair(&self, other: &ObjectMapping) -> bool {
        self.crm_object_id == other.crm_object_id && self.api_object_id == other.api_object_id
    }

    /// Derive a new snapshot by applying `patch` to a deep copy.
    ///
    /// The receiver is never modified.
    pub fn derive(&self, patch: impl FnOnce(&mut ObjectMapping)) -> ObjectMapping {
        let mut next = self.clone();
        patch(&mut next);
        next
    }

    pub fn event_action(&self, event_slug: &str) -> Option<&EventAction> {
        self.event_actions
            .iter()
            .find(|a| a.event_slug() == event_slug)
    }
}

/// Previously persisted state returned by the collaborator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SavedMapping {
    /// Developer objects as saved, including any custom fields.
    #[serde(default)]
    pub objects: Vec<DeveloperObject>,
    #[serde(default)]
    pub mapping: Vec<ObjectMapping>,
}

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn simple_type_missing_format_is_none() {
        let t: SimpleType = serde_json::from_value(json!({ "type": "string" })).unwrap();
        assert_eq!(t, SimpleType::new("string"));

        let t: SimpleType =
            serde_json::from_value(json!({ "type": "string", "format": null })).unwrap();
        assert_eq!(t.format, None);
    }

    #[test]
    fn unknown_transformation_kind_parses() {
        let kinds: Vec<TransformationKind> =
            serde_json::from_value(json!(["direct", "date", "find", "reverse"])).unwrap();
        assert_eq!(kinds[3], TransformationKind::Unknown);
        assert!(kinds[0].is_supported());
        assert!(!kinds[2].is_supported());
    }

    #[test]
    fn selector_find_descends_children() {
        let selector: Selector = serde_json::from_value(json!({
            "label": "Contact",
            "pointer": "#",
            "children": [
                { "label": "Name", "pointer": "#/name" },
                {
                    "label": "Address",
                    "pointer": "#/address",
                    "children": [{ "label": "City", "pointer": "#/address/city" }]
                }
            ]
        }))
        .unwrap();

        assert_eq!(selector.find("#/address/city").unwrap().label, "City");
        assert!(selector.find("#/missing").is_none());
        assert!(!selector.is_leaf());
    }

    #[test]
    fn action_data_is_tagged_by_action_type() {
        let action = EventAction::new("contact.created", ActionData::Delete);
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["action_type"], "delete");
        assert_eq!(value["event"]["slug"], "contact.created");

        let parsed: EventAction = serde_json::from_value(json!({
            "event": { "slug": "contact.search" },
            "action_type": "search",
            "filters": [{
                "source_pointer": "#/email",
                "criteria_operator": "eq",
                "name": "static",
                "static_value": "a@b.c"
            }]
        }))
        .unwrap();
        let filters = &parsed.action.search().unwrap().filters;
        assert_eq!(filters[0].name(), Some(TransformationName::Static));
    }

    #[test]
    fn derive_leaves_original_untouched() {
        let original = ObjectMapping::new("dev-1", "api-1");
        let next = original.derive(|m| {
            m.transformations.push(Transformation::direct("name", "#/name"));
        });
        assert!(original.transformations.is_empty());
        assert_eq!(next.transformations.len(), 1);
    }

    #[test]
    fn static_value_untagged() {
        let values: Vec<StaticValue> = serde_json::from_value(json!([true, 3, "x"])).unwrap();
        assert_eq!(values[0], StaticValue::Bool(true));
        assert_eq!(values[1], StaticValue::from(3i64));
        assert_eq!(values[2], StaticValue::from("x"));
    }
}
