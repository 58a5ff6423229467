//! The debug operation surface shared by contributors and the base service.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    Error, Result,
    types::{
        ConfigurationSnippet, DebugConfiguration, DebugSessionFactory, DebuggerDescription,
        JsonSchema,
    },
};

/// An externally supplied debugger, consulted before the base service.
#[async_trait]
pub trait DebugContributor: Send + Sync {
    /// The debugger this contributor provides.
    fn description(&self) -> &DebuggerDescription;

    /// Language ids this debugger supports.
    async fn supported_languages(&self) -> Result<Vec<String>>;

    /// Schema fragments for this debugger's launch attributes.
    async fn schema_attributes(&self) -> Result<Vec<JsonSchema>>;

    /// Snippets offered when editing launch configurations.
    async fn configuration_snippets(&self) -> Result<Vec<ConfigurationSnippet>>;

    /// Initial configurations for a workspace folder.
    async fn provide_debug_configurations(
        &self,
        workspace_folder: Option<&str>,
    ) -> Result<Vec<DebugConfiguration>>;

    /// Fill in or rewrite `config`. `None` leaves it unchanged.
    async fn resolve_debug_configuration(
        &self,
        config: &DebugConfiguration,
        workspace_folder: Option<&str>,
    ) -> Result<Option<DebugConfiguration>>;

    /// Start a session and return its id.
    async fn create_debug_session(&self, config: &DebugConfiguration) -> Result<String>;

    /// Stop a session.
    async fn terminate_debug_session(&self, session_id: &str) -> Result<()>;

    /// Session factory registered alongside the contributor, if any.
    async fn debug_session_factory(&self) -> Option<Arc<dyn DebugSessionFactory>> {
        None
    }
}

/// Built-in debug service used when no contributor claims a request.
#[async_trait]
pub trait DebugService: Send + Sync {
    /// Debug types handled natively.
    async fn debug_types(&self) -> Result<Vec<String>>;

    /// Initial configurations for `debug_type`.
    async fn provide_debug_configurations(
        &self,
        debug_type: &str,
        workspace_folder: Option<&str>,
    ) -> Result<Vec<DebugConfiguration>>;

    /// Final resolution step applied after every contributor.
    async fn resolve_debug_configuration(
        &self,
        config: DebugConfiguration,
        workspace_folder: Option<&str>,
    ) -> Result<DebugConfiguration>;

    /// Native debuggers for `language`.
    async fn get_debuggers_for_language(&self, language: &str)
    -> Result<Vec<DebuggerDescription>>;

    /// Schema fragments for `debug_type`.
    async fn get_schema_attributes(&self, debug_type: &str) -> Result<Vec<JsonSchema>>;

    /// Native configuration snippets.
    async fn get_configuration_snippets(&self) -> Result<Vec<ConfigurationSnippet>>;

    /// Start a native session.
    async fn create_debug_session(&self, config: &DebugConfiguration) -> Result<String>;

    /// Stop a native session.
    async fn terminate_debug_session(&self, session_id: &str) -> Result<()>;
}

/// A base service with no debuggers of its own.
///
/// Listing operations return nothing, resolution passes configurations
/// through, and session requests fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyDebugService;

#[async_trait]
impl DebugService for EmptyDebugService {
    async fn debug_types(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn provide_debug_configurations(
        &self,
        _debug_type: &str,
        _workspace_folder: Option<&str>,
    ) -> Result<Vec<DebugConfiguration>> {
        Ok(Vec::new())
    }

    async fn resolve_debug_configuration(
        &self,
        config: DebugConfiguration,
        _workspace_folder: Option<&str>,
    ) -> Result<DebugConfiguration> {
        Ok(config)
    }

    async fn get_debuggers_for_language(
        &self,
        _language: &str,
    ) -> Result<Vec<DebuggerDescription>> {
        Ok(Vec::new())
    }

    async fn get_schema_attributes(&self, _debug_type: &str) -> Result<Vec<JsonSchema>> {
        Ok(Vec::new())
    }

    async fn get_configuration_snippets(&self) -> Result<Vec<ConfigurationSnippet>> {
        Ok(Vec::new())
    }

    async fn create_debug_session(&self, config: &DebugConfiguration) -> Result<String> {
        Err(Error::UnknownDebugType(config.debug_type.clone()))
    }

    async fn terminate_debug_session(&self, session_id: &str) -> Result<()> {
        Err(Error::UnknownSession(session_id.to_string()))
    }
}
