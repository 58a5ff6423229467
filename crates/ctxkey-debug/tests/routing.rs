use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use ctxkey_debug::{
    ConfigurationSnippet, DebugConfiguration, DebugContributionManager, DebugContributor,
    DebugService, DebugSession, DebugSessionFactory, DebuggerDescription, EmptyDebugService,
    Error, JsonSchema, Result,
};
use parking_lot::Mutex;
use serde_json::json;

/// Base service with one native debugger, `native`.
struct NativeService {
    stopped: Mutex<Vec<String>>,
}

impl NativeService {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            stopped: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl DebugService for NativeService {
    async fn debug_types(&self) -> Result<Vec<String>> {
        Ok(vec!["native".into()])
    }

    async fn provide_debug_configurations(
        &self,
        debug_type: &str,
        _workspace_folder: Option<&str>,
    ) -> Result<Vec<DebugConfiguration>> {
        Ok(vec![DebugConfiguration::launch(debug_type, "base")])
    }

    async fn resolve_debug_configuration(
        &self,
        config: DebugConfiguration,
        _workspace_folder: Option<&str>,
    ) -> Result<DebugConfiguration> {
        Ok(config.with("resolvedBy", "base"))
    }

    async fn get_debuggers_for_language(
        &self,
        language: &str,
    ) -> Result<Vec<DebuggerDescription>> {
        if language == "c" {
            Ok(vec![DebuggerDescription::new("native", "Native")])
        } else {
            Ok(Vec::new())
        }
    }

    async fn get_schema_attributes(&self, debug_type: &str) -> Result<Vec<JsonSchema>> {
        Ok(vec![json!({ "from": "base", "type": debug_type })])
    }

    async fn get_configuration_snippets(&self) -> Result<Vec<ConfigurationSnippet>> {
        Ok(vec![ConfigurationSnippet {
            label: "base".into(),
            description: None,
            body: json!({}),
        }])
    }

    async fn create_debug_session(&self, _config: &DebugConfiguration) -> Result<String> {
        Ok("base-session".into())
    }

    async fn terminate_debug_session(&self, session_id: &str) -> Result<()> {
        self.stopped.lock().push(session_id.to_string());
        Ok(())
    }
}

struct Factory;

impl DebugSessionFactory for Factory {
    fn create_session(
        &self,
        session_id: &str,
        configuration: &DebugConfiguration,
    ) -> DebugSession {
        DebugSession {
            id: session_id.to_string(),
            configuration: configuration.clone(),
        }
    }
}

/// Contributor whose answers are tagged with its debug type. When `broken`
/// is set, every aggregated query fails.
struct Plugin {
    description: DebuggerDescription,
    languages: Vec<String>,
    broken: bool,
    sessions: AtomicUsize,
}

impl Plugin {
    fn new(debug_type: &str, languages: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            description: DebuggerDescription::new(debug_type, debug_type.to_uppercase()),
            languages: languages.iter().map(|l| (*l).to_string()).collect(),
            broken: false,
            sessions: AtomicUsize::new(0),
        })
    }

    fn broken(debug_type: &str) -> Arc<Self> {
        Arc::new(Self {
            description: DebuggerDescription::new(debug_type, debug_type),
            languages: Vec::new(),
            broken: true,
            sessions: AtomicUsize::new(0),
        })
    }

    fn fail(&self) -> Error {
        Error::Contributor {
            debug_type: self.description.debug_type.clone(),
            message: "plugin host crashed".into(),
        }
    }
}

#[async_trait]
impl DebugContributor for Plugin {
    fn description(&self) -> &DebuggerDescription {
        &self.description
    }

    async fn supported_languages(&self) -> Result<Vec<String>> {
        if self.broken {
            return Err(self.fail());
        }
        Ok(self.languages.clone())
    }

    async fn schema_attributes(&self) -> Result<Vec<JsonSchema>> {
        Ok(vec![json!({ "from": self.description.debug_type })])
    }

    async fn configuration_snippets(&self) -> Result<Vec<ConfigurationSnippet>> {
        if self.broken {
            return Err(self.fail());
        }
        Ok(vec![ConfigurationSnippet {
            label: self.description.debug_type.clone(),
            description: Some("contributed".into()),
            body: json!({ "type": self.description.debug_type }),
        }])
    }

    async fn provide_debug_configurations(
        &self,
        workspace_folder: Option<&str>,
    ) -> Result<Vec<DebugConfiguration>> {
        Ok(vec![
            DebugConfiguration::launch(&self.description.debug_type, "contributed")
                .with("cwd", workspace_folder.unwrap_or("<none>")),
        ])
    }

    async fn resolve_debug_configuration(
        &self,
        config: &DebugConfiguration,
        _workspace_folder: Option<&str>,
    ) -> Result<Option<DebugConfiguration>> {
        if self.broken {
            return Err(self.fail());
        }
        if config.debug_type == self.description.debug_type {
            Ok(Some(config.clone().with("resolvedBy", "plugin")))
        } else {
            Ok(None)
        }
    }

    async fn create_debug_session(&self, _config: &DebugConfiguration) -> Result<String> {
        let n = self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}-{}", self.description.debug_type, n))
    }

    async fn terminate_debug_session(&self, _session_id: &str) -> Result<()> {
        self.sessions.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn debug_session_factory(&self) -> Option<Arc<dyn DebugSessionFactory>> {
        if self.broken {
            return None;
        }
        Some(Arc::new(Factory))
    }
}

#[tokio::test]
async fn registration_lists_types_and_fires_events() {
    let manager = DebugContributionManager::new(NativeService::new());
    let events = Arc::new(Mutex::new(Vec::new()));
    let _add = {
        let events = events.clone();
        manager.on_did_add_contribution(move |t| events.lock().push(format!("+{}", t)))
    };
    let _del = {
        let events = events.clone();
        manager.on_did_delete_contribution(move |t| events.lock().push(format!("-{}", t)))
    };

    let handle = manager
        .register("node", Plugin::new("node", &["javascript"]))
        .await
        .unwrap();
    assert_eq!(manager.debug_types().await.unwrap(), vec!["native", "node"]);
    assert!(manager.session_factory("node").is_some());

    drop(handle);
    assert_eq!(manager.debug_types().await.unwrap(), vec!["native"]);
    assert!(manager.session_factory("node").is_none());
    assert_eq!(*events.lock(), vec!["+node", "-node"]);
}

#[tokio::test]
async fn duplicate_types_are_refused() {
    let manager = DebugContributionManager::new(NativeService::new());
    let shadow = manager
        .register("native", Plugin::new("native", &[]))
        .await
        .unwrap();
    let first = manager
        .register("node", Plugin::new("node", &[]))
        .await
        .unwrap();
    let second = manager
        .register("node", Plugin::new("node", &[]))
        .await
        .unwrap();
    assert_eq!(manager.debug_types().await.unwrap(), vec!["native", "node"]);

    // Refused handles are inert.
    drop(shadow);
    drop(second);
    assert_eq!(manager.debug_types().await.unwrap(), vec!["native", "node"]);
    first.unsubscribe();
    assert!(!manager.unregister("node"));
}

#[tokio::test]
async fn single_type_requests_prefer_the_contributor() {
    let base = NativeService::new();
    let manager = DebugContributionManager::new(base.clone());
    let plugin = Plugin::new("node", &["javascript"]);
    let _h = manager.register("node", plugin.clone()).await.unwrap();

    let configs = manager
        .provide_debug_configurations("node", Some("/ws"))
        .await
        .unwrap();
    assert_eq!(configs[0].name, "contributed");
    assert_eq!(configs[0].extra.get("cwd"), Some(&json!("/ws")));
    let configs = manager
        .provide_debug_configurations("native", None)
        .await
        .unwrap();
    assert_eq!(configs[0].name, "base");

    assert_eq!(
        manager.get_schema_attributes("node").await.unwrap(),
        vec![json!({ "from": "node" })]
    );
    assert_eq!(
        manager.get_schema_attributes("other").await.unwrap(),
        vec![json!({ "from": "base", "type": "other" })]
    );

    let session = manager
        .create(&DebugConfiguration::launch("node", "run"))
        .await
        .unwrap();
    assert_eq!(session, "node-0");
    manager.stop("node", &session).await.unwrap();
    assert_eq!(plugin.sessions.load(Ordering::SeqCst), 0);

    let native = manager
        .create(&DebugConfiguration::launch("native", "run"))
        .await
        .unwrap();
    manager.stop("native", &native).await.unwrap();
    assert_eq!(*base.stopped.lock(), vec!["base-session".to_string()]);
}

#[tokio::test]
async fn resolution_runs_contributors_then_base() {
    let manager = DebugContributionManager::new(NativeService::new());
    let _a = manager.register("node", Plugin::new("node", &[])).await.unwrap();
    let _b = manager.register("bad", Plugin::broken("bad")).await.unwrap();

    let resolved = manager
        .resolve_debug_configuration(DebugConfiguration::launch("node", "x"), None)
        .await
        .unwrap();
    // The base service runs last and sees the contributor's answer.
    assert_eq!(resolved.extra.get("resolvedBy"), Some(&json!("base")));
    assert_eq!(resolved.debug_type, "node");

    let untouched = manager
        .resolve_debug_configuration(DebugConfiguration::launch("python", "y"), None)
        .await
        .unwrap();
    assert_eq!(untouched.name, "y");
}

#[tokio::test]
async fn aggregation_skips_failing_contributors() {
    let manager = DebugContributionManager::new(NativeService::new());
    let _bad = manager.register("bad", Plugin::broken("bad")).await.unwrap();
    let _node = manager
        .register("node", Plugin::new("node", &["javascript", "typescript"]))
        .await
        .unwrap();

    let debuggers = manager.get_debuggers_for_language("typescript").await.unwrap();
    assert_eq!(debuggers, vec![DebuggerDescription::new("node", "NODE")]);
    let debuggers = manager.get_debuggers_for_language("c").await.unwrap();
    assert_eq!(debuggers, vec![DebuggerDescription::new("native", "Native")]);

    let labels: Vec<String> = manager
        .get_configuration_snippets()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.label)
        .collect();
    assert_eq!(labels, vec!["base", "node"]);
    assert!(manager.session_factory("bad").is_none());
}

#[tokio::test]
async fn empty_base_rejects_unclaimed_sessions() {
    let manager = DebugContributionManager::new(Arc::new(EmptyDebugService));
    assert!(manager.debug_types().await.unwrap().is_empty());
    let err = manager
        .create(&DebugConfiguration::launch("ghost", "x"))
        .await
        .unwrap_err();
    assert_eq!(err, Error::UnknownDebugType("ghost".into()));
    assert_eq!(
        manager.stop("ghost", "s1").await.unwrap_err(),
        Error::UnknownSession("s1".into())
    );

    let factory = Factory;
    let session = factory.create_session("s2", &DebugConfiguration::launch("ghost", "x"));
    assert_eq!(session.id, "s2");
}
