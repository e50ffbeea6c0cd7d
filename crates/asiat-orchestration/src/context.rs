use crate::approval::ApprovalManager;
use crate::assistant::{Assistant, AssistantDeps};
use crate::intent::IntentParser;
use asiat_commands::common::initialize_builtin_tools;
use asiat_commands::executor::CommandExecutor;
use asiat_commands::git_integration::GitManager;
use asiat_commands::patch::PatchEngine;
use asiat_commands::project_index::CodeIndex;
use asiat_commands::registry::{ToolContext, ToolRegistry};
use asiat_core::config::Config;
use asiat_core::memory::SessionMemory;
use asiat_core::provider::ProviderClient;
use asiat_core::{AsiatError, Result};
use asiat_provider::ProviderClientFactory;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Everything one interactive session needs, wired from configuration.
pub struct RuntimeContext {
    pub config: Config,
    pub session_id: Uuid,
    pub registry: Arc<ToolRegistry>,
    pub approval: Arc<ApprovalManager>,
    pub assistant: Assistant,
}

impl RuntimeContext {
    /// Build the runtime with the provider named in the configuration.
    pub async fn new(config: Config) -> Result<Self> {
        let provider = ProviderClientFactory::create_client(&config.provider)?;
        Self::with_provider(config, provider).await
    }

    /// Build the runtime around an existing provider client.
    #[instrument(skip_all, fields(root = %config.project_root.display()))]
    pub async fn with_provider(
        mut config: Config,
        provider: Arc<dyn ProviderClient>,
    ) -> Result<Self> {
        config.project_root = tokio::fs::canonicalize(&config.project_root)
            .await
            .map_err(|e| AsiatError::Config {
                message: format!(
                    "Project root {} is not accessible: {}",
                    config.project_root.display(),
                    e
                ),
            })?;
        let root = config.project_root.clone();
        let session_id = Uuid::new_v4();

        let registry = Arc::new(initialize_builtin_tools().await?);
        let approval = Arc::new(ApprovalManager::new(registry.clone()));

        let mut index = CodeIndex::new(&root, config.resolved_index_path());
        if let Err(e) = index.load().await {
            warn!(error = %e, "Ignoring unreadable persisted index");
        }
        let files = index.index_project().await?;

        let tool_context = ToolContext::new(&root)
            .with_session(session_id)
            .with_command_timeout(config.commands.default_timeout_ms);

        let assistant = Assistant::new(AssistantDeps {
            intents: IntentParser::new()?,
            index,
            git: GitManager::new(&root),
            provider,
            patches: PatchEngine::new(&root),
            executor: CommandExecutor::new(&root)
                .with_script_runner(config.commands.script_runner.clone()),
            memory: SessionMemory::new(),
            registry: registry.clone(),
            approval: approval.clone(),
            tool_context,
        });

        info!(
            %session_id,
            files,
            provider = assistant.provider_name(),
            "Runtime ready"
        );

        Ok(Self {
            config,
            session_id,
            registry,
            approval,
            assistant,
        })
    }
}
