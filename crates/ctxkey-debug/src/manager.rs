//! Routing between contributors and the base debug service.

use std::{collections::HashMap, fmt, sync::Arc};

use ctxkey::{Emitter, Subscription};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::{
    Result,
    contributor::{DebugContributor, DebugService},
    types::{
        ConfigurationSnippet, DebugConfiguration, DebugSessionFactory, DebuggerDescription,
        JsonSchema,
    },
};

/// Registered contributor list, in registration order.
type Contributors = Vec<(String, Arc<dyn DebugContributor>)>;

/// Routes debug requests to the contributor registered for a debug type,
/// falling back to the base service.
///
/// Requests aimed at one debug type go to that type's contributor only.
/// Requests that aggregate across debuggers query the base service and then
/// every contributor in registration order; a failing contributor is logged
/// and skipped rather than failing the whole request.
///
/// No lock is held across an `.await`: contributor lists are snapshotted
/// before any contributor is called.
pub struct DebugContributionManager {
    /// Fallback for unclaimed debug types.
    base: Arc<dyn DebugService>,
    /// Registered contributors.
    contributors: Mutex<Contributors>,
    /// Session factories supplied at registration.
    session_factories: Mutex<HashMap<String, Arc<dyn DebugSessionFactory>>>,
    /// Fired with the debug type after a contributor is added.
    added: Emitter<String>,
    /// Fired with the debug type after a contributor is removed.
    deleted: Emitter<String>,
}

impl DebugContributionManager {
    /// Create a manager over `base`.
    pub fn new(base: Arc<dyn DebugService>) -> Arc<Self> {
        Arc::new(Self {
            base,
            contributors: Mutex::new(Vec::new()),
            session_factories: Mutex::new(HashMap::new()),
            added: Emitter::new(),
            deleted: Emitter::new(),
        })
    }

    /// The contributor registered for `debug_type`.
    fn contributor(&self, debug_type: &str) -> Option<Arc<dyn DebugContributor>> {
        self.contributors
            .lock()
            .iter()
            .find(|(t, _)| t == debug_type)
            .map(|(_, c)| c.clone())
    }

    /// Snapshot of every contributor.
    fn snapshot(&self) -> Contributors {
        self.contributors.lock().clone()
    }

    /// Register `contributor` for `debug_type`.
    ///
    /// A type that is already known (natively or from an earlier registration)
    /// is refused with a warning and an inert handle. Otherwise the returned
    /// handle unregisters the contributor when dropped.
    pub async fn register(
        self: &Arc<Self>,
        debug_type: &str,
        contributor: Arc<dyn DebugContributor>,
    ) -> Result<Subscription> {
        if self.debug_types().await?.iter().any(|t| t == debug_type) {
            warn!(debug_type, "debugger_already_registered");
            return Ok(Subscription::empty());
        }
        let factory = contributor.debug_session_factory().await;
        {
            let mut contributors = self.contributors.lock();
            if contributors.iter().any(|(t, _)| t == debug_type) {
                warn!(debug_type, "debugger_already_registered");
                return Ok(Subscription::empty());
            }
            contributors.push((debug_type.to_string(), contributor));
        }
        if let Some(factory) = factory {
            self.session_factories
                .lock()
                .insert(debug_type.to_string(), factory);
        }
        debug!(debug_type, "debug_contributor_registered");
        self.added.fire(&debug_type.to_string());

        let manager = Arc::downgrade(self);
        let debug_type = debug_type.to_string();
        Ok(Subscription::new(move || {
            if let Some(manager) = manager.upgrade() {
                manager.unregister(&debug_type);
            }
        }))
    }

    /// Remove the contributor for `debug_type` and its session factory.
    /// Returns `false` when nothing was registered.
    pub fn unregister(&self, debug_type: &str) -> bool {
        let removed = {
            let mut contributors = self.contributors.lock();
            let before = contributors.len();
            contributors.retain(|(t, _)| t != debug_type);
            contributors.len() != before
        };
        self.session_factories.lock().remove(debug_type);
        if removed {
            debug!(debug_type, "debug_contributor_unregistered");
            self.deleted.fire(&debug_type.to_string());
        }
        removed
    }

    /// Subscribe to contributor additions.
    pub fn on_did_add_contribution<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&String) + Send + Sync + 'static,
    {
        self.added.subscribe(listener)
    }

    /// Subscribe to contributor removals.
    pub fn on_did_delete_contribution<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&String) + Send + Sync + 'static,
    {
        self.deleted.subscribe(listener)
    }

    /// Native debug types followed by contributed ones.
    pub async fn debug_types(&self) -> Result<Vec<String>> {
        let mut types = self.base.debug_types().await?;
        types.extend(self.contributors.lock().iter().map(|(t, _)| t.clone()));
        Ok(types)
    }

    /// Initial configurations for `debug_type`.
    pub async fn provide_debug_configurations(
        &self,
        debug_type: &str,
        workspace_folder: Option<&str>,
    ) -> Result<Vec<DebugConfiguration>> {
        match self.contributor(debug_type) {
            Some(c) => c.provide_debug_configurations(workspace_folder).await,
            None => {
                self.base
                    .provide_debug_configurations(debug_type, workspace_folder)
                    .await
            }
        }
    }

    /// Offer `config` to every contributor, then to the base service.
    ///
    /// Each contributor sees the original configuration; the last non-empty
    /// answer wins and is passed to the base service.
    pub async fn resolve_debug_configuration(
        &self,
        config: DebugConfiguration,
        workspace_folder: Option<&str>,
    ) -> Result<DebugConfiguration> {
        let mut resolved: Option<DebugConfiguration> = None;
        for (debug_type, contributor) in self.snapshot() {
            match contributor
                .resolve_debug_configuration(&config, workspace_folder)
                .await
            {
                Ok(Some(r)) => resolved = Some(r),
                Ok(None) => {}
                Err(e) => error!(debug_type = %debug_type, error = %e, "resolve_debug_configuration_failed"),
            }
        }
        self.base
            .resolve_debug_configuration(resolved.unwrap_or(config), workspace_folder)
            .await
    }

    /// Native debuggers for `language`, then every contributor that lists it.
    pub async fn get_debuggers_for_language(
        &self,
        language: &str,
    ) -> Result<Vec<DebuggerDescription>> {
        let mut debuggers = self.base.get_debuggers_for_language(language).await?;
        for (debug_type, contributor) in self.snapshot() {
            match contributor.supported_languages().await {
                Ok(languages) if languages.iter().any(|l| l == language) => {
                    debuggers.push(contributor.description().clone());
                }
                Ok(_) => {}
                Err(e) => error!(debug_type = %debug_type, error = %e, "supported_languages_failed"),
            }
        }
        Ok(debuggers)
    }

    /// Schema fragments for `debug_type`.
    pub async fn get_schema_attributes(&self, debug_type: &str) -> Result<Vec<JsonSchema>> {
        match self.contributor(debug_type) {
            Some(c) => c.schema_attributes().await,
            None => self.base.get_schema_attributes(debug_type).await,
        }
    }

    /// Native snippets followed by every contributor's snippets.
    pub async fn get_configuration_snippets(&self) -> Result<Vec<ConfigurationSnippet>> {
        let mut snippets = self.base.get_configuration_snippets().await?;
        for (debug_type, contributor) in self.snapshot() {
            match contributor.configuration_snippets().await {
                Ok(more) => snippets.extend(more),
                Err(e) => error!(debug_type = %debug_type, error = %e, "configuration_snippets_failed"),
            }
        }
        Ok(snippets)
    }

    /// Start a session for `config`, routed by its debug type.
    pub async fn create(&self, config: &DebugConfiguration) -> Result<String> {
        match self.contributor(&config.debug_type) {
            Some(c) => c.create_debug_session(config).await,
            None => self.base.create_debug_session(config).await,
        }
    }

    /// Stop `session_id`, routed by `debug_type`.
    pub async fn stop(&self, debug_type: &str, session_id: &str) -> Result<()> {
        match self.contributor(debug_type) {
            Some(c) => c.terminate_debug_session(session_id).await,
            None => self.base.terminate_debug_session(session_id).await,
        }
    }

    /// Session factory registered for `debug_type`.
    pub fn session_factory(&self, debug_type: &str) -> Option<Arc<dyn DebugSessionFactory>> {
        self.session_factories.lock().get(debug_type).cloned()
    }
}

impl fmt::Debug for DebugContributionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<String> = self
            .contributors
            .lock()
            .iter()
            .map(|(t, _)| t.clone())
            .collect();
        f.debug_struct("DebugContributionManager")
            .field("contributors", &types)
            .finish()
    }
}
