//! External collaborator boundary.
//!
//! The engine never talks to storage or the network directly. Loading the
//! developer objects, the API objects, a lazily fetched API schema, and the
//! saved mapping, plus persisting the result, all go through [`Collaborator`].
//! Calls are blocking and issued one at a time by the session.

use std::cell::RefCell;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;
use crate::loader::load_json;
use crate::types::{ApiObject, Connection, DeveloperObject, ObjectMapping, SavedMapping, Selector};

/// Transport used by a mapping session.
pub trait Collaborator {
    fn list_developer_objects(&self) -> Result<Vec<DeveloperObject>, CollaboratorError>;

    fn list_api_objects(&self, connection: &Connection) -> Result<Vec<ApiObject>, CollaboratorError>;

    fn fetch_api_object_schema(
        &self,
        connection: &Connection,
        slug: &str,
    ) -> Result<Selector, CollaboratorError>;

    fn get_mapping(&self, connection: &Connection) -> Result<SavedMapping, CollaboratorError>;

    fn save_mapping(
        &self,
        connection: &Connection,
        objects: &[DeveloperObject],
        mappings: &[ObjectMapping],
    ) -> Result<(), CollaboratorError>;
}

/// Body of a save request and of a saved-mapping file.
#[derive(Debug, Serialize)]
pub struct SaveRequest<'a> {
    pub objects: &'a [DeveloperObject],
    pub mapping: &'a [ObjectMapping],
}

/// Response of a schema fetch.
#[derive(Debug, Deserialize)]
pub struct SchemaResponse {
    pub selector: Selector,
}

/// Which collaborator call to fail, for exercising error paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    ListDeveloperObjects,
    ListApiObjects,
    FetchSchema,
    GetMapping,
    SaveMapping,
}

/// Collaborator backed by in-memory values.
///
/// Saved state is kept and returned by later `get_mapping` calls.
#[derive(Debug, Default)]
pub struct InMemoryCollaborator {
    pub developer_objects: Vec<DeveloperObject>,
    pub api_objects: Vec<ApiObject>,
    saved: RefCell<SavedMapping>,
    calls: RefCell<Vec<Call>>,
    fail: RefCell<Option<(Call, String)>>,
}

impl InMemoryCollaborator {
    pub fn new(developer_objects: Vec<DeveloperObject>, api_objects: Vec<ApiObject>) -> Self {
        Self {
            developer_objects,
            api_objects,
            ..Self::default()
        }
    }

    /// Seed the saved mapping returned by `get_mapping`.
    pub fn with_saved(self, saved: SavedMapping) -> Self {
        self.saved.replace(saved);
        self
    }

    /// Make `call` fail with `message` until cleared.
    pub fn fail_on(&self, call: Call, message: impl Into<String>) {
        self.fail.replace(Some((call, message.into())));
    }

    pub fn clear_failure(&self) {
        self.fail.replace(None);
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn saved(&self) -> SavedMapping {
        self.saved.borrow().clone()
    }

    fn record(&self, call: Call) -> Result<(), CollaboratorError> {
        self.calls.borrow_mut().push(call);
        match &*self.fail.borrow() {
            Some((failing, message)) if *failing == call => Err(CollaboratorError::rejected(message)),
            _ => Ok(()),
        }
    }
}

impl Collaborator for InMemoryCollaborator {
    fn list_developer_objects(&self) -> Result<Vec<DeveloperObject>, CollaboratorError> {
        self.record(Call::ListDeveloperObjects)?;
        Ok(self.developer_objects.clone())
    }

    fn list_api_objects(&self, _connection: &Connection) -> Result<Vec<ApiObject>, CollaboratorError> {
        self.record(Call::ListApiObjects)?;
        // Schemas are served separately.
        Ok(self
            .api_objects
            .iter()
            .map(|a| ApiObject {
                selector: None,
                ..a.clone()
            })
            .collect())
    }

    fn fetch_api_object_schema(
        &self,
        _connection: &Connection,
        slug: &str,
    ) -> Result<Selector, CollaboratorError> {
        self.record(Call::FetchSchema)?;
        schema_from_list(&self.api_objects, slug)
    }

    fn get_mapping(&self, _connection: &Connection) -> Result<SavedMapping, CollaboratorError> {
        self.record(Call::GetMapping)?;
        Ok(self.saved.borrow().clone())
    }

    fn save_mapping(
        &self,
        _connection: &Connection,
        objects: &[DeveloperObject],
        mappings: &[ObjectMapping],
    ) -> Result<(), CollaboratorError> {
        self.record(Call::SaveMapping)?;
        self.saved.replace(SavedMapping {
            objects: objects.to_vec(),
            mapping: mappings.to_vec(),
        });
        Ok(())
    }
}

/// Collaborator backed by JSON files on disk.
///
/// The API objects file may embed each object's `selector`; those are served
/// by `fetch_api_object_schema`. A missing mapping file loads as empty.
#[derive(Debug, Clone)]
pub struct FileCollaborator {
    pub objects_path: PathBuf,
    pub api_objects_path: PathBuf,
    pub mapping_path: PathBuf,
}

impl FileCollaborator {
    pub fn new(
        objects_path: impl Into<PathBuf>,
        api_objects_path: impl Into<PathBuf>,
        mapping_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            objects_path: objects_path.into(),
            api_objects_path: api_objects_path.into(),
            mapping_path: mapping_path.into(),
        }
    }
}

impl Collaborator for FileCollaborator {
    fn list_developer_objects(&self) -> Result<Vec<DeveloperObject>, CollaboratorError> {
        load_json(&self.objects_path)
    }

    fn list_api_objects(&self, _connection: &Connection) -> Result<Vec<ApiObject>, CollaboratorError> {
        let objects: Vec<ApiObject> = load_json(&self.api_objects_path)?;
        Ok(objects
            .into_iter()
            .map(|a| ApiObject { selector: None, ..a })
            .collect())
    }

    fn fetch_api_object_schema(
        &self,
        _connection: &Connection,
        slug: &str,
    ) -> Result<Selector, CollaboratorError> {
        let objects: Vec<ApiObject> = load_json(&self.api_objects_path)?;
        schema_from_list(&objects, slug)
    }

    fn get_mapping(&self, _connection: &Connection) -> Result<SavedMapping, CollaboratorError> {
        if !self.mapping_path.exists() {
            return Ok(SavedMapping::default());
        }
        load_json(&self.mapping_path)
    }

    fn save_mapping(
        &self,
        _connection: &Connection,
        objects: &[DeveloperObject],
        mappings: &[ObjectMapping],
    ) -> Result<(), CollaboratorError> {
        let body = SaveRequest {
            objects,
            mapping: mappings,
        };
        let json = serde_json::to_string_pretty(&body)
            .map_err(|source| CollaboratorError::InvalidJson { source })?;
        std::fs::write(&self.mapping_path, json).map_err(|source| CollaboratorError::WriteError {
            path: self.mapping_path.clone(),
            source,
        })
    }
}

fn schema_from_list(objects: &[ApiObject], slug: &str) -> Result<Selector, CollaboratorError> {
    objects
        .iter()
        .find(|a| a.slug == slug)
        .and_then(|a| a.selector.clone())
        .ok_or_else(|| CollaboratorError::rejected(format!("no schema available for '{}'", slug)))
}

#[cfg(feature = "remote")]
pub use remote::{HttpCollaborator, RemoteConfig};

#[cfg(feature = "remote")]
mod remote {
    use std::time::Duration;

    use reqwest::blocking::{Client, RequestBuilder, Response};
    use serde::de::DeserializeOwned;
    use serde_json::Value;
    use tracing::debug;

    use super::{Collaborator, SaveRequest, SchemaResponse};
    use crate::error::CollaboratorError;
    use crate::loader::HTTP_TIMEOUT;
    use crate::types::{
        ApiObject, Connection, DeveloperObject, ObjectMapping, SavedMapping, Selector,
    };

    /// Connection settings for [`HttpCollaborator`].
    #[derive(Debug, Clone)]
    pub struct RemoteConfig {
        pub base_url: String,
        pub token: Option<String>,
        pub timeout: Duration,
    }

    impl RemoteConfig {
        /// Create a config with no token and the default timeout.
        pub fn new(base_url: impl Into<String>) -> Self {
            Self {
                base_url: base_url.into(),
                token: None,
                timeout: HTTP_TIMEOUT,
            }
        }

        /// Send `Authorization: Bearer <token>` on every request.
        pub fn token(mut self, token: Option<String>) -> Self {
            self.token = token;
            self
        }

        pub fn timeout(mut self, timeout: Duration) -> Self {
            self.timeout = timeout;
            self
        }
    }

    /// Collaborator speaking a small REST API.
    ///
    /// | Call | Request |
    /// |------|---------|
    /// | list developer objects | `GET /developer-objects` |
    /// | list API objects | `GET /connections/{id}/api-objects` |
    /// | fetch schema | `GET /connections/{id}/api-objects/{slug}/schema` |
    /// | get mapping | `GET /connections/{id}/mapping` |
    /// | save mapping | `PUT /connections/{id}/mapping` |
    #[derive(Debug, Clone)]
    pub struct HttpCollaborator {
        config: RemoteConfig,
        client: Client,
    }

    impl HttpCollaborator {
        pub fn new(config: RemoteConfig) -> Result<Self, CollaboratorError> {
            let client = Client::builder()
                .timeout(config.timeout)
                .build()
                .map_err(|source| CollaboratorError::Network {
                    url: config.base_url.clone(),
                    source,
                })?;
            Ok(Self { config, client })
        }

        fn url(&self, path: &str) -> String {
            format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
        }

        fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
            match &self.config.token {
                Some(token) => request.bearer_auth(token),
                None => request,
            }
        }

        fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CollaboratorError> {
            let url = self.url(path);
            debug!(%url, "GET");
            let response = self
                .authorize(self.client.get(&url))
                .send()
                .map_err(|source| CollaboratorError::Network {
                    url: url.clone(),
                    source,
                })?;
            let response = check_status(&url, response)?;
            response
                .json()
                .map_err(|source| CollaboratorError::Network { url, source })
        }
    }

    /// Map a non-success response to an error, preferring a server `message`.
    fn check_status(url: &str, response: Response) -> Result<Response, CollaboratorError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .json::<Value>()
            .ok()
            .and_then(|body| body.get("message").and_then(Value::as_str).map(String::from));
        Err(match message {
            Some(message) => CollaboratorError::Rejected { message },
            None => CollaboratorError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            },
        })
    }

    impl Collaborator for HttpCollaborator {
        fn list_developer_objects(&self) -> Result<Vec<DeveloperObject>, CollaboratorError> {
            self.get("developer-objects")
        }

        fn list_api_objects(
            &self,
            connection: &Connection,
        ) -> Result<Vec<ApiObject>, CollaboratorError> {
            self.get(&format!("connections/{}/api-objects", connection.id))
        }

        fn fetch_api_object_schema(
            &self,
            connection: &Connection,
            slug: &str,
        ) -> Result<Selector, CollaboratorError> {
            let response: SchemaResponse = self.get(&format!(
                "connections/{}/api-objects/{}/schema",
                connection.id, slug
            ))?;
            Ok(response.selector)
        }

        fn get_mapping(&self, connection: &Connection) -> Result<SavedMapping, CollaboratorError> {
            self.get(&format!("connections/{}/mapping", connection.id))
        }

        fn save_mapping(
            &self,
            connection: &Connection,
            objects: &[DeveloperObject],
            mappings: &[ObjectMapping],
        ) -> Result<(), CollaboratorError> {
            let url = self.url(&format!("connections/{}/mapping", connection.id));
            debug!(%url, mappings = mappings.len(), "PUT");
            let body = SaveRequest {
                objects,
                mapping: mappings,
            };
            let response = self
                .authorize(self.client.put(&url).json(&body))
                .send()
                .map_err(|source| CollaboratorError::Network {
                    url: url.clone(),
                    source,
                })?;
            check_status(&url, response).map(|_| ())
        }
    }
}
