//! Mapping editing session.
//!
//! The session walks the user through choosing an API object for each
//! developer object and mapping its fields (Read) and events (Write). Stage
//! changes are driven by [`Stage::next`], a pure function of the current stage,
//! the event, and a read-only [`SessionView`]; the session only performs the
//! data side of each step and then applies the transition.
//!
//! Edits in Read/Write go to a draft copy of the pairing. The draft is
//! committed to the mapping list on a successful "Done" and discarded on
//! "Back". Nothing is persisted until [`MappingSession::finish`].

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collaborator::Collaborator;
use crate::completeness::{
    is_all_objects_selected, is_object_selected, is_read_selected, is_write_selected, mappings_for,
};
use crate::error::{CollaboratorError, EditError, SessionError};
use crate::merge::{add_custom_field, custom_field_family, merge_saved_state, without_fields};
use crate::resolver::{compatible_pointers, date_toggle, resolve_selector, transformation_for, DateToggle};
use crate::selector::{to_addressable_options, SelectorOption};
use crate::store::{
    self, event_action_index, index_of, mapping_index, remove_by_slug, remove_mapping, upsert,
    upsert_event_action, upsert_mapping,
};
use crate::suggest::rank_candidates;
use crate::types::{
    ActionData, ApiObject, Connection, DeveloperObject, Event, EventAction, Field, ObjectMapping,
    Selector, SimpleType, StaticValue, Transformation,
};

/// Where the user is in the editing workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Loading,
    /// Developer objects with their completeness.
    Configuration,
    /// Connection details; lifecycle is handled elsewhere.
    Connection,
    /// Choosing an API object to pair with a developer object.
    Objects { object_id: String },
    /// Overview of a developer object's pairings.
    Mappings { object_id: String },
    Read { object_id: String, api_object_id: String },
    Write { object_id: String, api_object_id: String },
    Saving,
    Finished,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Loading => "loading",
            Stage::Configuration => "configuration",
            Stage::Connection => "connection",
            Stage::Objects { .. } => "objects",
            Stage::Mappings { .. } => "mappings",
            Stage::Read { .. } => "read",
            Stage::Write { .. } => "write",
            Stage::Saving => "saving",
            Stage::Finished => "finished",
        }
    }

    /// Compute the stage after `event`.
    ///
    /// Refused transitions, including "Done" while the relevant completeness
    /// gate fails, return the current stage unchanged.
    pub fn next(&self, event: &SessionEvent, view: &SessionView<'_>) -> Stage {
        use SessionEvent as E;

        match (self, event) {
            (Stage::Loading, E::Loaded) => Stage::Configuration,

            (Stage::Configuration, E::OpenConnection) => Stage::Connection,
            (Stage::Connection, E::Back | E::Done) => Stage::Configuration,

            (Stage::Configuration, E::SelectObject { object_id }) => {
                if view.object(object_id).is_none() {
                    self.clone()
                } else if view.pairing_count(object_id) > 0 {
                    Stage::Mappings {
                        object_id: object_id.clone(),
                    }
                } else {
                    Stage::Objects {
                        object_id: object_id.clone(),
                    }
                }
            }
            (Stage::Configuration, E::Finish) => {
                if is_all_objects_selected(view.objects, view.mappings) {
                    Stage::Saving
                } else {
                    self.clone()
                }
            }

            (Stage::Objects { object_id }, E::PairApiObject { .. }) => Stage::Mappings {
                object_id: object_id.clone(),
            },
            (Stage::Objects { object_id }, E::Back) => {
                if view.pairing_count(object_id) > 0 {
                    Stage::Mappings {
                        object_id: object_id.clone(),
                    }
                } else {
                    Stage::Configuration
                }
            }

            (Stage::Mappings { object_id }, E::AddPairing) => Stage::Objects {
                object_id: object_id.clone(),
            },
            (Stage::Mappings { object_id }, E::OpenRead { api_object_id }) => {
                match (view.object(object_id), view.pairing(object_id, api_object_id)) {
                    (Some(object), Some(_)) if object.has_read_side() => Stage::Read {
                        object_id: object_id.clone(),
                        api_object_id: api_object_id.clone(),
                    },
                    _ => self.clone(),
                }
            }
            (Stage::Mappings { object_id }, E::OpenWrite { api_object_id }) => {
                match (view.object(object_id), view.pairing(object_id, api_object_id)) {
                    (Some(object), Some(_)) if object.has_write_side() => Stage::Write {
                        object_id: object_id.clone(),
                        api_object_id: api_object_id.clone(),
                    },
                    _ => self.clone(),
                }
            }
            (Stage::Mappings { object_id }, E::RemovePairing { .. }) => {
                if view.pairing_count(object_id) <= 1 {
                    Stage::Objects {
                        object_id: object_id.clone(),
                    }
                } else {
                    self.clone()
                }
            }
            (Stage::Mappings { .. }, E::Back) => Stage::Configuration,
            (Stage::Mappings { object_id }, E::Done) => match view.object(object_id) {
                Some(object) if is_object_selected(object, view.mappings) => Stage::Configuration,
                _ => self.clone(),
            },

            (Stage::Read { object_id, .. }, E::Done) => match view.object(object_id) {
                Some(object) if is_read_selected(object, view.draft) => Stage::Mappings {
                    object_id: object_id.clone(),
                },
                _ => self.clone(),
            },
            (Stage::Write { object_id, .. }, E::Done) => match view.object(object_id) {
                Some(object) if is_write_selected(object, view.draft) => Stage::Mappings {
                    object_id: object_id.clone(),
                },
                _ => self.clone(),
            },
            (Stage::Read { object_id, .. } | Stage::Write { object_id, .. }, E::Back) => {
                Stage::Mappings {
                    object_id: object_id.clone(),
                }
            }

            (Stage::Saving, E::Saved) => Stage::Finished,
            (Stage::Saving, E::SaveFailed) => Stage::Configuration,

            _ => self.clone(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inputs that drive stage transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Loaded,
    OpenConnection,
    SelectObject { object_id: String },
    PairApiObject { api_object_id: String },
    AddPairing,
    OpenRead { api_object_id: String },
    OpenWrite { api_object_id: String },
    RemovePairing { api_object_id: String },
    Done,
    Back,
    Finish,
    Saved,
    SaveFailed,
}

/// Read-only state consulted by [`Stage::next`].
#[derive(Debug, Clone, Copy)]
pub struct SessionView<'a> {
    pub objects: &'a [DeveloperObject],
    pub mappings: &'a [ObjectMapping],
    /// Pairing being edited in Read/Write.
    pub draft: Option<&'a ObjectMapping>,
}

impl<'a> SessionView<'a> {
    pub fn object(&self, object_id: &str) -> Option<&'a DeveloperObject> {
        self.objects.iter().find(|o| o.id == object_id)
    }

    pub fn pairing(&self, object_id: &str, api_object_id: &str) -> Option<&'a ObjectMapping> {
        self.mappings
            .iter()
            .find(|m| m.crm_object_id == object_id && m.api_object_id == api_object_id)
    }

    pub fn pairing_count(&self, object_id: &str) -> usize {
        self.mappings
            .iter()
            .filter(|m| m.crm_object_id == object_id)
            .count()
    }
}

/// Committed developer objects and mappings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub objects: Vec<DeveloperObject>,
    pub mappings: Vec<ObjectMapping>,
}

/// Completeness of one developer object, for the Configuration list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectStatus {
    pub object_id: String,
    pub label: String,
    pub complete: bool,
}

/// One pairing in the Mappings overview.
///
/// `read`/`write` are `None` when the developer object declares nothing for
/// that side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairingStatus {
    pub api_object_id: String,
    pub label: String,
    pub read: Option<bool>,
    pub write: Option<bool>,
}

/// What the Read/Write edit helpers have to work with.
struct EditContext<'a> {
    object: &'a DeveloperObject,
    selector: &'a Selector,
    draft: &'a ObjectMapping,
    read: bool,
}

impl<'a> EditContext<'a> {
    fn event(&self, slug: &str) -> Result<&'a Event, SessionError> {
        let event = self.object.event(slug).ok_or_else(|| EditError::UnknownEvent {
            slug: slug.to_string(),
        })?;
        if event.event_type.is_read_time() != self.read {
            let expected = if event.event_type.is_read_time() { "read" } else { "write" };
            return Err(EditError::WrongSide {
                slug: slug.to_string(),
                expected: expected.to_string(),
            }
            .into());
        }
        Ok(event)
    }

    fn source(&self, pointer: &str) -> Result<&'a Selector, SessionError> {
        self.selector.find(pointer).ok_or_else(|| {
            EditError::UnknownPointer {
                pointer: pointer.to_string(),
            }
            .into()
        })
    }
}

/// Stateful driver for one mapping edit.
#[derive(Debug)]
pub struct MappingSession<C> {
    collaborator: C,
    connection: Connection,
    stage: Stage,
    api_objects: Vec<ApiObject>,
    committed: Snapshot,
    history: Vec<Snapshot>,
    draft: Option<ObjectMapping>,
    submitting: bool,
}

fn load_failure(err: CollaboratorError) -> SessionError {
    warn!(error = %err, "load failed");
    SessionError::LoadFailure {
        message: err.to_string(),
    }
}

impl<C: Collaborator> MappingSession<C> {
    pub fn new(collaborator: C, connection: Connection) -> Self {
        Self {
            collaborator,
            connection,
            stage: Stage::Loading,
            api_objects: Vec::new(),
            committed: Snapshot::default(),
            history: Vec::new(),
            draft: None,
            submitting: false,
        }
    }

    // --- Accessors ---

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn collaborator(&self) -> &C {
        &self.collaborator
    }

    pub fn objects(&self) -> &[DeveloperObject] {
        &self.committed.objects
    }

    pub fn api_objects(&self) -> &[ApiObject] {
        &self.api_objects
    }

    /// Last committed mapping list. Never includes an in-progress draft.
    pub fn mappings(&self) -> &[ObjectMapping] {
        &self.committed.mappings
    }

    pub fn draft(&self) -> Option<&ObjectMapping> {
        self.draft.as_ref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn object(&self, object_id: &str) -> Option<&DeveloperObject> {
        self.committed.objects.iter().find(|o| o.id == object_id)
    }

    pub fn api_object(&self, api_object_id: &str) -> Option<&ApiObject> {
        self.api_objects.iter().find(|a| a.id == api_object_id)
    }

    pub fn view(&self) -> SessionView<'_> {
        SessionView {
            objects: &self.committed.objects,
            mappings: &self.committed.mappings,
            draft: self.draft.as_ref(),
        }
    }

    fn invalid_stage(&self) -> SessionError {
        if self.stage == Stage::Loading {
            return SessionError::NotLoaded;
        }
        SessionError::InvalidStage {
            stage: self.stage.name().to_string(),
        }
    }

    /// Apply a transition. Returns false if it was refused.
    fn apply(&mut self, event: &SessionEvent) -> bool {
        let next = self.stage.next(event, &self.view());
        if next == self.stage {
            debug!(stage = self.stage.name(), ?event, "transition refused");
            return false;
        }
        info!(from = self.stage.name(), to = next.name(), "stage transition");
        self.stage = next;
        true
    }

    fn commit(&mut self, snapshot: Snapshot) {
        let previous = std::mem::replace(&mut self.committed, snapshot);
        self.history.push(previous);
    }

    fn commit_mappings(&mut self, mappings: Vec<ObjectMapping>) {
        let snapshot = Snapshot {
            objects: self.committed.objects.clone(),
            mappings,
        };
        self.commit(snapshot);
    }

    // --- Loading ---

    /// Fetch developer objects, API objects, and the saved mapping, then
    /// merge and prune.
    ///
    /// Calls are made in that order and the first failure aborts the load;
    /// the session stays in Loading with no partial state.
    pub fn load(&mut self) -> Result<(), SessionError> {
        if self.stage != Stage::Loading {
            return Err(self.invalid_stage());
        }

        let objects = self
            .collaborator
            .list_developer_objects()
            .map_err(load_failure)?;
        let api_objects = self
            .collaborator
            .list_api_objects(&self.connection)
            .map_err(load_failure)?;
        let saved = self
            .collaborator
            .get_mapping(&self.connection)
            .map_err(load_failure)?;

        let merged = merge_saved_state(&objects, &api_objects, &saved.objects, &saved.mapping);
        info!(
            objects = merged.objects.len(),
            api_objects = api_objects.len(),
            mappings = merged.mappings.len(),
            pruned = saved.mapping.len() - merged.mappings.len(),
            "mapping loaded"
        );

        self.api_objects = api_objects;
        self.committed = Snapshot {
            objects: merged.objects,
            mappings: merged.mappings,
        };
        self.history.clear();
        self.apply(&SessionEvent::Loaded);
        Ok(())
    }

    // --- Configuration ---

    /// Completeness of every developer object.
    pub fn object_statuses(&self) -> Vec<ObjectStatus> {
        self.committed
            .objects
            .iter()
            .map(|object| ObjectStatus {
                object_id: object.id.clone(),
                label: object.label.clone(),
                complete: is_object_selected(object, &self.committed.mappings),
            })
            .collect()
    }

    pub fn open_connection(&mut self) -> bool {
        self.apply(&SessionEvent::OpenConnection)
    }

    /// Route to Objects (no pairing yet) or Mappings.
    pub fn select_object(&mut self, object_id: &str) -> Result<&Stage, SessionError> {
        if self.stage != Stage::Configuration {
            return Err(self.invalid_stage());
        }
        if self.object(object_id).is_none() {
            return Err(SessionError::UnknownObject {
                id: object_id.to_string(),
            });
        }
        self.apply(&SessionEvent::SelectObject {
            object_id: object_id.to_string(),
        });
        Ok(&self.stage)
    }

    // --- Objects ---

    /// API objects available for pairing, suggested matches first.
    ///
    /// Objects already paired with the current developer object are excluded.
    pub fn candidates(&self) -> Result<Vec<&ApiObject>, SessionError> {
        let Stage::Objects { object_id } = &self.stage else {
            return Err(self.invalid_stage());
        };
        let object = self
            .object(object_id)
            .ok_or_else(|| SessionError::UnknownObject {
                id: object_id.clone(),
            })?;
        let view = self.view();
        let available = self
            .api_objects
            .iter()
            .filter(|a| view.pairing(object_id, &a.id).is_none());
        Ok(rank_candidates(&object.label, available))
    }

    /// Pair the current developer object with `api_object_id`.
    pub fn pair(&mut self, api_object_id: &str) -> Result<&Stage, SessionError> {
        let Stage::Objects { object_id } = &self.stage else {
            return Err(self.invalid_stage());
        };
        if self.api_object(api_object_id).is_none() {
            return Err(SessionError::UnknownApiObject {
                id: api_object_id.to_string(),
            });
        }

        let mapping = ObjectMapping::new(object_id.clone(), api_object_id);
        if mapping_index(&mapping, &self.committed.mappings).is_none() {
            info!(crm_object_id = %mapping.crm_object_id, api_object_id, "paired objects");
            let mappings = upsert_mapping(mapping, &self.committed.mappings);
            self.commit_mappings(mappings);
        }
        self.apply(&SessionEvent::PairApiObject {
            api_object_id: api_object_id.to_string(),
        });
        Ok(&self.stage)
    }

    // --- Mappings ---

    /// Pairings of the current developer object with their completeness.
    pub fn pairings(&self) -> Result<Vec<PairingStatus>, SessionError> {
        let Stage::Mappings { object_id } = &self.stage else {
            return Err(self.invalid_stage());
        };
        let object = self
            .object(object_id)
            .ok_or_else(|| SessionError::UnknownObject {
                id: object_id.clone(),
            })?;
        Ok(mappings_for(object, &self.committed.mappings)
            .map(|mapping| PairingStatus {
                api_object_id: mapping.api_object_id.clone(),
                label: self
                    .api_object(&mapping.api_object_id)
                    .map(|a| a.label_one.clone())
                    .unwrap_or_default(),
                read: object
                    .has_read_side()
                    .then(|| is_read_selected(object, Some(mapping))),
                write: object
                    .has_write_side()
                    .then(|| is_write_selected(object, Some(mapping))),
            })
            .collect())
    }

    /// Go back to Objects to pair another API object.
    pub fn add_pairing(&mut self) -> bool {
        self.apply(&SessionEvent::AddPairing)
    }

    /// Remove a pairing and all its field/event mappings.
    ///
    /// Removing the last pairing returns to Objects.
    pub fn remove_pairing(&mut self, api_object_id: &str) -> Result<&Stage, SessionError> {
        let Stage::Mappings { object_id } = &self.stage else {
            return Err(self.invalid_stage());
        };
        let key = ObjectMapping::new(object_id.clone(), api_object_id);
        if mapping_index(&key, &self.committed.mappings).is_none() {
            return Err(SessionError::UnknownApiObject {
                id: api_object_id.to_string(),
            });
        }

        // Transition is decided on the pre-removal view. Other pairings left
        // means staying in Mappings.
        let event = SessionEvent::RemovePairing {
            api_object_id: api_object_id.to_string(),
        };
        if self.stage.next(&event, &self.view()) != self.stage {
            self.apply(&event);
        }
        let mappings = remove_mapping(&key, &self.committed.mappings);
        self.commit_mappings(mappings);
        Ok(&self.stage)
    }

    pub fn open_read(&mut self, api_object_id: &str) -> Result<&Stage, SessionError> {
        self.open_side(SessionEvent::OpenRead {
            api_object_id: api_object_id.to_string(),
        })
    }

    pub fn open_write(&mut self, api_object_id: &str) -> Result<&Stage, SessionError> {
        self.open_side(SessionEvent::OpenWrite {
            api_object_id: api_object_id.to_string(),
        })
    }

    fn open_side(&mut self, event: SessionEvent) -> Result<&Stage, SessionError> {
        let (SessionEvent::OpenRead { api_object_id } | SessionEvent::OpenWrite { api_object_id }) =
            &event
        else {
            return Err(self.invalid_stage());
        };
        let Stage::Mappings { object_id } = &self.stage else {
            return Err(self.invalid_stage());
        };
        let Some(mapping) = self.view().pairing(object_id, api_object_id).cloned() else {
            return Err(SessionError::UnknownApiObject {
                id: api_object_id.clone(),
            });
        };
        if self.stage.next(&event, &self.view()) == self.stage {
            return Ok(&self.stage);
        }

        self.ensure_schema(api_object_id)?;
        self.draft = Some(mapping);
        self.apply(&event);
        Ok(&self.stage)
    }

    /// Fetch the API object's schema the first time it is needed.
    fn ensure_schema(&mut self, api_object_id: &str) -> Result<(), SessionError> {
        let api = self
            .api_objects
            .iter_mut()
            .find(|a| a.id == api_object_id)
            .ok_or_else(|| SessionError::UnknownApiObject {
                id: api_object_id.to_string(),
            })?;
        if api.selector.is_some() {
            return Ok(());
        }

        debug!(slug = %api.slug, "fetching API object schema");
        let selector = self
            .collaborator
            .fetch_api_object_schema(&self.connection, &api.slug)
            .map_err(|e| SessionError::SchemaFetch {
                slug: api.slug.clone(),
                message: e.to_string(),
            })?;
        api.selector = Some(selector);
        Ok(())
    }

    /// Fetch the schema of every paired API object not fetched yet.
    ///
    /// A failed fetch does not stop the others; each failure is logged and
    /// the first one is returned once every object has been tried.
    pub fn load_schemas(&mut self) -> Result<(), SessionError> {
        let mut paired: Vec<String> = self
            .committed
            .mappings
            .iter()
            .map(|m| m.api_object_id.clone())
            .collect();
        paired.sort();
        paired.dedup();

        let mut first_error = None;
        for api_object_id in paired {
            if let Err(err) = self.ensure_schema(&api_object_id) {
                warn!(api_object = %api_object_id, error = %err, "schema fetch failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // --- Stage exits ---

    /// Leave the current stage forward. Refused unless its gate passes.
    ///
    /// Leaving Read/Write commits the draft.
    pub fn done(&mut self) -> bool {
        if !self.apply(&SessionEvent::Done) {
            return false;
        }
        if let Some(draft) = self.draft.take() {
            let mappings = upsert_mapping(draft, &self.committed.mappings);
            self.commit_mappings(mappings);
        }
        true
    }

    /// Leave the current stage backward, discarding any draft.
    pub fn back(&mut self) -> bool {
        if !self.apply(&SessionEvent::Back) {
            return false;
        }
        if self.draft.take().is_some() {
            debug!("discarded draft");
        }
        true
    }

    /// Restore the previous committed snapshot. Only from Configuration.
    pub fn undo(&mut self) -> bool {
        if self.stage != Stage::Configuration {
            return false;
        }
        match self.history.pop() {
            Some(previous) => {
                self.committed = previous;
                true
            }
            None => false,
        }
    }

    /// Hand the whole mapping to the collaborator.
    ///
    /// Requires every developer object to be complete. On failure the local
    /// state is kept and the session returns to Configuration so the user
    /// can retry.
    pub fn finish(&mut self) -> Result<Connection, SessionError> {
        if self.stage != Stage::Configuration {
            return Err(self.invalid_stage());
        }
        if !self.apply(&SessionEvent::Finish) {
            return Err(SessionError::IncompleteMapping);
        }

        self.submitting = true;
        let result = self.collaborator.save_mapping(
            &self.connection,
            &self.committed.objects,
            &self.committed.mappings,
        );
        self.submitting = false;

        match result {
            Ok(()) => {
                self.apply(&SessionEvent::Saved);
                info!(mappings = self.committed.mappings.len(), "mapping saved");
                Ok(self.connection.clone())
            }
            Err(err) => {
                self.apply(&SessionEvent::SaveFailed);
                warn!(error = %err, "save failed");
                Err(SessionError::SaveFailure {
                    message: err.to_string(),
                })
            }
        }
    }

    // --- Read/Write editing ---

    fn edit_context(&self) -> Result<EditContext<'_>, SessionError> {
        let (object_id, api_object_id, read) = match &self.stage {
            Stage::Read {
                object_id,
                api_object_id,
            } => (object_id, api_object_id, true),
            Stage::Write {
                object_id,
                api_object_id,
            } => (object_id, api_object_id, false),
            _ => return Err(self.invalid_stage()),
        };
        let object = self
            .object(object_id)
            .ok_or_else(|| SessionError::UnknownObject {
                id: object_id.clone(),
            })?;
        let selector = self
            .api_object(api_object_id)
            .and_then(|a| a.selector.as_ref())
            .ok_or_else(|| SessionError::UnknownApiObject {
                id: api_object_id.clone(),
            })?;
        let draft = self.draft.as_ref().ok_or_else(|| self.invalid_stage())?;
        Ok(EditContext {
            object,
            selector,
            draft,
            read,
        })
    }

    fn edit_draft<R>(
        &mut self,
        patch: impl FnOnce(&EditContext<'_>) -> Result<(ObjectMapping, R), SessionError>,
    ) -> Result<R, SessionError> {
        let (next, out) = {
            let ctx = self.edit_context()?;
            patch(&ctx)?
        };
        self.draft = Some(next);
        Ok(out)
    }

    fn require_read(&self) -> Result<(), SessionError> {
        match self.stage {
            Stage::Read { .. } => Ok(()),
            _ => Err(self.invalid_stage()),
        }
    }

    /// Option tree of the schema being mapped against.
    pub fn options(&self) -> Result<Vec<SelectorOption<'_>>, SessionError> {
        let ctx = self.edit_context()?;
        Ok(to_addressable_options(std::slice::from_ref(ctx.selector)))
    }

    /// Pointers that can feed the given developer field.
    pub fn compatible_sources(&self, field_slug: &str) -> Result<Vec<&str>, SessionError> {
        let ctx = self.edit_context()?;
        let field = ctx.object.field(field_slug).ok_or_else(|| EditError::UnknownField {
            slug: field_slug.to_string(),
        })?;
        Ok(compatible_pointers(ctx.selector, field))
    }

    /// Map a developer field to a schema pointer.
    ///
    /// `convert_date` is honored only where the source offers both `direct`
    /// and `date`; date-only sources always convert.
    pub fn select_source(
        &mut self,
        field_slug: &str,
        pointer: &str,
        convert_date: bool,
    ) -> Result<Transformation, SessionError> {
        self.require_read()?;
        self.edit_draft(|ctx| {
            let field = ctx.object.field(field_slug).ok_or_else(|| EditError::UnknownField {
                slug: field_slug.to_string(),
            })?;
            let source = ctx.source(pointer)?;
            let transformation = transformation_for(field, source, convert_date).ok_or_else(|| {
                EditError::IneligibleSource {
                    slug: field_slug.to_string(),
                    pointer: pointer.to_string(),
                }
            })?;
            debug!(field = field_slug, pointer, name = ?transformation.name, "selected source");
            let next = ctx.draft.derive(|m| {
                m.transformations = upsert(transformation.clone(), &m.transformations);
            });
            Ok((next, transformation))
        })
    }

    /// State of the date conversion control for a mapped field.
    pub fn date_toggle(&self, field_slug: &str) -> Result<Option<DateToggle>, SessionError> {
        let ctx = self.edit_context()?;
        let field = ctx.object.field(field_slug).ok_or_else(|| EditError::UnknownField {
            slug: field_slug.to_string(),
        })?;
        Ok(stored_toggle(ctx.selector, field, &ctx.draft.transformations))
    }

    /// Flip date conversion for a mapped field. Disabled toggles are left as is.
    pub fn set_date_conversion(
        &mut self,
        field_slug: &str,
        checked: bool,
    ) -> Result<Option<DateToggle>, SessionError> {
        let Some(toggle) = self.date_toggle(field_slug)? else {
            return Ok(None);
        };
        let toggle = toggle.toggle(checked);
        self.edit_draft(|ctx| {
            let next = ctx.draft.derive(|m| {
                if let Some(index) = index_of(field_slug, &m.transformations) {
                    m.transformations[index].name = toggle.transformation_name();
                }
            });
            Ok((next, Some(toggle)))
        })
    }

    /// Map a developer field to a literal.
    pub fn set_static_value(
        &mut self,
        field_slug: &str,
        value: impl Into<StaticValue>,
    ) -> Result<(), SessionError> {
        self.require_read()?;
        let value = value.into();
        self.edit_draft(|ctx| {
            if ctx.object.field(field_slug).is_none() {
                return Err(EditError::UnknownField {
                    slug: field_slug.to_string(),
                }
                .into());
            }
            let transformation = Transformation::static_value(field_slug, value);
            let next = ctx.draft.derive(|m| {
                m.transformations = upsert(transformation, &m.transformations);
            });
            Ok((next, ()))
        })
    }

    /// Remove a developer field's mapping. Unmapped fields are a no-op.
    pub fn clear_field(&mut self, field_slug: &str) -> Result<(), SessionError> {
        self.require_read()?;
        self.edit_draft(|ctx| {
            let next = ctx.draft.derive(|m| {
                m.transformations = remove_by_slug(field_slug, &m.transformations);
            });
            Ok((next, ()))
        })
    }

    /// Add a custom field nested under an object-typed field.
    ///
    /// Returns the new field's slug.
    pub fn add_custom_field(
        &mut self,
        parent_slug: &str,
        key: &str,
        simple_type: SimpleType,
    ) -> Result<String, SessionError> {
        self.require_read()?;
        let (object_id, updated) = {
            let ctx = self.edit_context()?;
            let updated = add_custom_field(ctx.object, parent_slug, key, simple_type)?;
            (ctx.object.id.clone(), updated)
        };
        let slug = format!("{}.{}", parent_slug, key);
        self.replace_object(&object_id, updated);
        Ok(slug)
    }

    /// Remove a custom field, its nested children, and their mappings.
    ///
    /// The object and every committed pairing of it are updated in one
    /// commit, so discarding the draft afterwards leaves no orphaned
    /// transformation behind.
    pub fn remove_custom_field(&mut self, slug: &str) -> Result<(), SessionError> {
        self.require_read()?;
        let (snapshot, draft) = {
            let ctx = self.edit_context()?;
            let removed = custom_field_family(ctx.object, slug)?;
            let mut snapshot = self.committed.clone();
            for slot in snapshot.objects.iter_mut().filter(|o| o.id == ctx.object.id) {
                slot.fields.retain(|f| !removed.contains(&f.slug));
            }
            for mapping in snapshot
                .mappings
                .iter_mut()
                .filter(|m| m.crm_object_id == ctx.object.id)
            {
                *mapping = without_fields(mapping, &removed);
            }
            debug!(field = slug, removed = removed.len(), "removed custom field");
            (snapshot, without_fields(ctx.draft, &removed))
        };
        self.commit(snapshot);
        self.draft = Some(draft);
        Ok(())
    }

    fn replace_object(&mut self, object_id: &str, updated: DeveloperObject) {
        let mut snapshot = self.committed.clone();
        if let Some(slot) = snapshot.objects.iter_mut().find(|o| o.id == object_id) {
            *slot = updated;
        }
        self.commit(snapshot);
    }

    // --- Event actions ---

    /// Create an empty action for an event, matching its type.
    ///
    /// An existing action of the right kind is kept.
    pub fn configure_event(&mut self, event_slug: &str) -> Result<(), SessionError> {
        self.edit_draft(|ctx| {
            let event = ctx.event(event_slug)?;
            let Some(action) = ActionData::for_event_type(event.event_type) else {
                return Err(EditError::UnknownEvent {
                    slug: event_slug.to_string(),
                }
                .into());
            };
            let keep = ctx.draft.event_action(event_slug).map_or(false, |existing| {
                std::mem::discriminant(&existing.action) == std::mem::discriminant(&action)
            });
            if keep {
                return Ok((ctx.draft.clone(), ()));
            }
            let next = ctx.draft.derive(|m| {
                m.event_actions =
                    upsert_event_action(EventAction::new(event_slug, action), &m.event_actions);
            });
            Ok((next, ()))
        })
    }

    /// Drop an event's action. Unconfigured events are a no-op.
    pub fn remove_event(&mut self, event_slug: &str) -> Result<(), SessionError> {
        self.edit_draft(|ctx| {
            ctx.event(event_slug)?;
            let next = ctx.draft.derive(|m| {
                m.event_actions = store::remove_event_action(event_slug, &m.event_actions);
            });
            Ok((next, ()))
        })
    }

    fn edit_action<R>(
        &mut self,
        event_slug: &str,
        patch: impl FnOnce(&Event, &Selector, &mut ActionData) -> Result<R, SessionError>,
    ) -> Result<R, SessionError> {
        self.edit_draft(|ctx| {
            let event = ctx.event(event_slug)?;
            let index = event_action_index(event_slug, &ctx.draft.event_actions).ok_or_else(|| {
                EditError::EventNotConfigured {
                    slug: event_slug.to_string(),
                }
            })?;
            let mut action = ctx.draft.event_actions[index].clone();
            let out = patch(event, ctx.selector, &mut action.action)?;
            let next = ctx.draft.derive(|m| {
                m.event_actions = upsert_event_action(action, &m.event_actions);
            });
            Ok((next, out))
        })
    }

    /// Wire a create/update payload field to an API field.
    pub fn map_event_field(
        &mut self,
        event_slug: &str,
        field_slug: &str,
        pointer: &str,
        convert_date: bool,
    ) -> Result<Transformation, SessionError> {
        self.edit_action(event_slug, |event, selector, action| {
            let field = event
                .fields
                .iter()
                .find(|f| f.slug == field_slug)
                .ok_or_else(|| EditError::UnknownField {
                    slug: field_slug.to_string(),
                })?;
            let source = selector.find(pointer).ok_or_else(|| EditError::UnknownPointer {
                pointer: pointer.to_string(),
            })?;
            let transformation = transformation_for(field, source, convert_date).ok_or_else(|| {
                EditError::IneligibleSource {
                    slug: field_slug.to_string(),
                    pointer: pointer.to_string(),
                }
            })?;
            let payload = payload_of(event, action)?;
            payload.transformations = upsert(transformation.clone(), &payload.transformations);
            Ok(transformation)
        })
    }

    /// State of the date conversion control for a wired payload field.
    pub fn event_date_toggle(
        &self,
        event_slug: &str,
        field_slug: &str,
    ) -> Result<Option<DateToggle>, SessionError> {
        let ctx = self.edit_context()?;
        let event = ctx.event(event_slug)?;
        let field = event
            .fields
            .iter()
            .find(|f| f.slug == field_slug)
            .ok_or_else(|| EditError::UnknownField {
                slug: field_slug.to_string(),
            })?;
        let Some(payload) = ctx
            .draft
            .event_action(event_slug)
            .and_then(|a| a.action.payload())
        else {
            return Ok(None);
        };
        Ok(stored_toggle(ctx.selector, field, &payload.transformations))
    }

    /// Flip date conversion for a wired payload field. Disabled toggles are
    /// left as is.
    pub fn set_event_date_conversion(
        &mut self,
        event_slug: &str,
        field_slug: &str,
        checked: bool,
    ) -> Result<Option<DateToggle>, SessionError> {
        let Some(toggle) = self.event_date_toggle(event_slug, field_slug)? else {
            return Ok(None);
        };
        let toggle = toggle.toggle(checked);
        self.edit_action(event_slug, |event, _, action| {
            let payload = payload_of(event, action)?;
            if let Some(index) = index_of(field_slug, &payload.transformations) {
                payload.transformations[index].name = toggle.transformation_name();
            }
            Ok(Some(toggle))
        })
    }

    /// Unwire a payload field. Unwired fields are a no-op.
    pub fn clear_event_field(&mut self, event_slug: &str, field_slug: &str) -> Result<(), SessionError> {
        self.edit_action(event_slug, |event, _, action| {
            let payload = payload_of(event, action)?;
            payload.transformations = remove_by_slug(field_slug, &payload.transformations);
            Ok(())
        })
    }

    /// Append a literal written to `target_pointer` on create/update.
    pub fn add_static_row(
        &mut self,
        event_slug: &str,
        target_pointer: &str,
        value: impl Into<StaticValue>,
    ) -> Result<usize, SessionError> {
        let value = value.into();
        self.edit_action(event_slug, |event, _, action| {
            let payload = payload_of(event, action)?;
            payload.static_transformations =
                store::add_static(target_pointer, value, &payload.static_transformations);
            Ok(payload.static_transformations.len() - 1)
        })
    }

    pub fn set_static_row(
        &mut self,
        event_slug: &str,
        index: usize,
        target_pointer: &str,
        value: impl Into<StaticValue>,
    ) -> Result<(), SessionError> {
        let value = value.into();
        self.edit_action(event_slug, |event, _, action| {
            let payload = payload_of(event, action)?;
            payload.static_transformations =
                store::set_static(index, target_pointer, value, &payload.static_transformations)?;
            Ok(())
        })
    }

    pub fn remove_static_row(&mut self, event_slug: &str, index: usize) -> Result<(), SessionError> {
        self.edit_action(event_slug, |event, _, action| {
            let payload = payload_of(event, action)?;
            payload.static_transformations =
                store::remove_static(index, &payload.static_transformations)?;
            Ok(())
        })
    }

    /// Append an empty filter row to a search action. Returns its index.
    pub fn add_filter(&mut self, event_slug: &str) -> Result<usize, SessionError> {
        self.edit_action(event_slug, |event, _, action| {
            let search = search_of(event, action)?;
            search.filters = store::add_filter(&search.filters);
            Ok(search.filters.len() - 1)
        })
    }

    pub fn remove_filter(&mut self, event_slug: &str, index: usize) -> Result<(), SessionError> {
        self.edit_action(event_slug, |event, _, action| {
            let search = search_of(event, action)?;
            search.filters = store::remove_filter(index, &search.filters)?;
            Ok(())
        })
    }

    /// Set the API field a filter row compares.
    pub fn set_filter_pointer(
        &mut self,
        event_slug: &str,
        index: usize,
        pointer: &str,
    ) -> Result<(), SessionError> {
        self.edit_action(event_slug, |event, selector, action| {
            if selector.find(pointer).is_none() {
                return Err(EditError::UnknownPointer {
                    pointer: pointer.to_string(),
                }
                .into());
            }
            let search = search_of(event, action)?;
            search.filters = store::set_filter_pointer(index, pointer, &search.filters)?;
            Ok(())
        })
    }

    /// Compare a filter row against one of the event's payload fields.
    pub fn set_filter_payload_field(
        &mut self,
        event_slug: &str,
        index: usize,
        field_slug: &str,
    ) -> Result<(), SessionError> {
        self.edit_action(event_slug, |event, _, action| {
            if !event.fields.iter().any(|f| f.slug == field_slug) {
                return Err(EditError::UnknownField {
                    slug: field_slug.to_string(),
                }
                .into());
            }
            let search = search_of(event, action)?;
            search.filters = store::set_filter_payload_field(index, field_slug, &search.filters)?;
            Ok(())
        })
    }

    /// Compare a filter row against a literal.
    pub fn set_filter_static(
        &mut self,
        event_slug: &str,
        index: usize,
        value: impl Into<StaticValue>,
    ) -> Result<(), SessionError> {
        let value = value.into();
        self.edit_action(event_slug, |event, _, action| {
            let search = search_of(event, action)?;
            search.filters = store::set_filter_static(index, value, &search.filters)?;
            Ok(())
        })
    }
}

/// Date toggle of the transformation stored for `field`, if it still
/// resolves against `selector`.
fn stored_toggle(
    selector: &Selector,
    field: &Field,
    transformations: &[Transformation],
) -> Option<DateToggle> {
    let stored = &transformations[index_of(&field.slug, transformations)?];
    stored
        .source_pointer
        .as_deref()
        .and_then(|pointer| selector.find(pointer))
        .and_then(|source| resolve_selector(source, &field.simple_type))
        .map(|criteria| date_toggle(&criteria, Some(stored)))
}

fn payload_of<'a>(
    event: &Event,
    action: &'a mut ActionData,
) -> Result<&'a mut crate::types::PayloadActionData, SessionError> {
    action.payload_mut().ok_or_else(|| {
        EditError::NotAPayloadAction {
            slug: event.slug.clone(),
        }
        .into()
    })
}

fn search_of<'a>(
    event: &Event,
    action: &'a mut ActionData,
) -> Result<&'a mut crate::types::SearchActionData, SessionError> {
    action.search_mut().ok_or_else(|| {
        EditError::NotAFilterAction {
            slug: event.slug.clone(),
        }
        .into()
    })
}
