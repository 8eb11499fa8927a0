//! Resolves the agent core once at process start.
//!
//! The loader pairs a [`LoopFactory`] with descriptive metadata (version,
//! provider, tool registry) and validates the combination before any
//! session is admitted. The resulting [`AgentCore`] is shared read-only by
//! the registry for the lifetime of the process.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::agent_loop::{AgentLoop, LoopFactory, RunContext};
use crate::config::RunConfig;
use crate::error::{CoreError, LoopError};

/// Descriptive metadata about the loaded agent core.
#[derive(Debug, Clone, Serialize)]
pub struct CoreInfo {
    pub agent_version: String,
    pub api_provider: String,
    pub default_model: String,
    /// Names of the tools the loop can call.
    pub tools: Vec<String>,
}

impl Default for CoreInfo {
    fn default() -> Self {
        Self {
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            api_provider: "local".to_string(),
            default_model: String::new(),
            tools: Vec::new(),
        }
    }
}

impl CoreInfo {
    /// Directory-safe rendering of the version: `"v1.2.3"` → `"v1_2_3"`.
    pub fn version_folder(&self) -> String {
        let bare = self.agent_version.trim_start_matches('v');
        format!("v{}", bare.replace('.', "_"))
    }
}

/// The resolved agent core: a loop factory plus its metadata.
pub struct AgentCore {
    info: CoreInfo,
    factory: Arc<dyn LoopFactory>,
}

impl AgentCore {
    pub fn info(&self) -> &CoreInfo {
        &self.info
    }

    /// Build a loop for one run.
    pub fn create_loop(
        &self,
        config: &RunConfig,
        ctx: &RunContext,
    ) -> Result<Box<dyn AgentLoop>, LoopError> {
        self.factory.create(config, ctx)
    }
}

/// Builder that validates and produces an [`AgentCore`].
///
/// ```ignore
/// let core = CoreLoader::new(MyLoopFactory::default())
///     .with_agent_version("0.3.1")
///     .with_api_provider("openai")
///     .with_tools(["write_file", "read_file"])
///     .load()?;
/// ```
pub struct CoreLoader {
    info: CoreInfo,
    factory: Arc<dyn LoopFactory>,
}

impl CoreLoader {
    pub fn new(factory: impl LoopFactory + 'static) -> Self {
        Self {
            info: CoreInfo::default(),
            factory: Arc::new(factory),
        }
    }

    pub fn with_agent_version(mut self, version: impl Into<String>) -> Self {
        self.info.agent_version = version.into();
        self
    }

    pub fn with_api_provider(mut self, provider: impl Into<String>) -> Self {
        self.info.api_provider = provider.into();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.info.default_model = model.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.info.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Validate the metadata and produce the shared core.
    pub fn load(self) -> Result<Arc<AgentCore>, CoreError> {
        if self.info.agent_version.trim().is_empty() {
            return Err(CoreError::MissingField("agent_version"));
        }
        if self.info.api_provider.trim().is_empty() {
            return Err(CoreError::MissingField("api_provider"));
        }
        if let Some(dup) = first_duplicate(&self.info.tools) {
            return Err(CoreError::Configuration(format!(
                "tool `{dup}` is registered twice"
            )));
        }

        info!(
            "Agent core loaded: version={}, provider={}, {} tool(s)",
            self.info.agent_version,
            self.info.api_provider,
            self.info.tools.len()
        );

        Ok(Arc::new(AgentCore {
            info: self.info,
            factory: self.factory,
        }))
    }
}

fn first_duplicate(names: &[String]) -> Option<&str> {
    let mut seen = std::collections::HashSet::new();
    names
        .iter()
        .find(|name| !seen.insert(name.as_str()))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::scripted::ScriptedLoopFactory;

    #[test]
    fn version_folder_replaces_dots() {
        let info = CoreInfo {
            agent_version: "v0.3.1".into(),
            ..Default::default()
        };
        assert_eq!(info.version_folder(), "v0_3_1");

        let info = CoreInfo {
            agent_version: "1.2".into(),
            ..Default::default()
        };
        assert_eq!(info.version_folder(), "v1_2");
    }

    #[test]
    fn load_with_defaults_succeeds() {
        let core = CoreLoader::new(ScriptedLoopFactory::default())
            .with_tools(["write_file"])
            .load()
            .unwrap();
        assert_eq!(core.info().api_provider, "local");
        assert_eq!(core.info().tools, vec!["write_file".to_string()]);
    }

    #[test]
    fn empty_provider_is_rejected() {
        let err = CoreLoader::new(ScriptedLoopFactory::default())
            .with_api_provider("")
            .load()
            .err()
            .unwrap();
        assert!(matches!(err, CoreError::MissingField("api_provider")));
    }

    #[test]
    fn duplicate_tools_are_rejected() {
        let err = CoreLoader::new(ScriptedLoopFactory::default())
            .with_tools(["shell", "read_file", "shell"])
            .load()
            .err()
            .unwrap();
        assert!(err.to_string().contains("shell"));
    }
}
