use std::time::Duration;

use envconfig::Envconfig;

use crate::finalizer::FINALIZER;
use crate::policy::{AnnotationPolicy, PolicyError, SharedDependencyPolicy};

#[derive(Envconfig, Clone, Debug)]
pub struct TemplatingConfig {
    /// Name of the stack definition object describing the parent kind.
    #[envconfig(from = "OPRC_TMPL_STACK_NAME")]
    pub stack_name: String,

    #[envconfig(from = "OPRC_TMPL_STACK_NAMESPACE")]
    pub stack_namespace: Option<String>,

    #[envconfig(
        from = "OPRC_TMPL_STACK_API_VERSION",
        default = "stacks.oaas.io/v1alpha1"
    )]
    pub stack_api_version: String,

    #[envconfig(from = "OPRC_TMPL_STACK_KIND", default = "StackDefinition")]
    pub stack_kind: String,

    /// Directory holding the stack's resource files.
    /// Env: OPRC_TMPL_RESOURCES_DIR
    #[envconfig(from = "OPRC_TMPL_RESOURCES_DIR", default = "resources")]
    pub resources_dir: String,

    /// Only watch parents in this namespace when set.
    #[envconfig(from = "OPRC_TMPL_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    #[envconfig(
        from = "OPRC_TMPL_FIELD_MANAGER",
        default = "oprc-templating"
    )]
    pub field_manager: String,

    #[envconfig(from = "OPRC_TMPL_DEBUG", default = "false")]
    pub debug: bool,

    #[envconfig(nested)]
    pub waits: WaitConfig,

    #[envconfig(nested)]
    pub policy: PolicyConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct WaitConfig {
    /// Retry interval after a failure.
    #[envconfig(from = "OPRC_TMPL_SHORT_WAIT_SECS", default = "30")]
    pub short_secs: u64,
    /// Resync interval after a successful reconcile.
    #[envconfig(from = "OPRC_TMPL_LONG_WAIT_SECS", default = "60")]
    pub long_secs: u64,
    /// Poll interval while children are being deleted.
    #[envconfig(from = "OPRC_TMPL_TINY_WAIT_SECS", default = "1")]
    pub tiny_secs: u64,
    #[envconfig(from = "OPRC_TMPL_RECONCILE_TIMEOUT_SECS", default = "60")]
    pub timeout_secs: u64,
}

#[derive(Envconfig, Clone, Debug)]
pub struct PolicyConfig {
    #[envconfig(from = "OPRC_TMPL_FINALIZER", default = "templating.oaas.io/finalizer")]
    pub finalizer: String,
    /// Comma separated kinds never owned by the parent.
    #[envconfig(from = "OPRC_TMPL_SHARED_KINDS", default = "provider")]
    pub shared_kinds: String,
    /// Comma separated `<group-suffix>=<kind>` rules.
    #[envconfig(from = "OPRC_TMPL_SHARED_GROUP_KINDS", default = "")]
    pub shared_group_kinds: String,
    #[envconfig(from = "OPRC_TMPL_DEFAULT_DELETION_PRIORITY", default = "0")]
    pub default_deletion_priority: i64,
}

impl WaitConfig {
    pub fn short(&self) -> Duration {
        Duration::from_secs(self.short_secs)
    }

    pub fn long(&self) -> Duration {
        Duration::from_secs(self.long_secs)
    }

    pub fn tiny(&self) -> Duration {
        Duration::from_secs(self.tiny_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PolicyConfig {
    pub fn finalizer_token(&self) -> &str {
        if self.finalizer.is_empty() {
            FINALIZER
        } else {
            &self.finalizer
        }
    }

    pub fn annotations(&self) -> AnnotationPolicy {
        AnnotationPolicy {
            default_deletion_priority: self.default_deletion_priority,
            ..Default::default()
        }
    }

    pub fn shared_dependencies(
        &self,
    ) -> Result<SharedDependencyPolicy, PolicyError> {
        SharedDependencyPolicy::parse(
            &self.shared_kinds,
            &self.shared_group_kinds,
        )
    }
}

impl TemplatingConfig {
    /// `debug` when the debug flag is set, `info` otherwise.
    pub fn log_level(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }
}
