//! The action registry: a catalog of named, schema-validated operations.
//!
//! The catalog is read by every running task and mutated only by
//! registration. A registration builds a new catalog and swaps it in whole,
//! so a concurrent reader sees either the old catalog or the new one.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use wayfarer_core::action::{ActionHandler, ActionOutcome, ParamSchema, ValidatedParams};
use wayfarer_core::decision::ActionInvocation;
use wayfarer_core::environment::Environment;
use wayfarer_core::error::ActionError;
use wayfarer_core::task::Task;
use wayfarer_security::{AuditEvent, AuditLogger, AuditOutcome, DomainCheck, DomainPolicy, SensitiveData};

/// Everything the registry knows about one action.
pub struct ActionDescriptor {
    pub name: String,
    pub description: String,
    pub schema: ParamSchema,
    /// Locations the action may run against; `None` means anywhere
    pub domain_filter: Option<DomainPolicy>,
    handler: Arc<dyn ActionHandler>,
}

impl std::fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("name", &self.name)
            .field("params", &self.schema.params.len())
            .field("domain_filter", &self.domain_filter)
            .finish()
    }
}

/// An immutable view of the registered actions.
#[derive(Debug, Default)]
pub struct Catalog {
    actions: BTreeMap<String, Arc<ActionDescriptor>>,
}

impl Catalog {
    pub fn get(&self, name: &str) -> Option<&Arc<ActionDescriptor>> {
        self.actions.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionDescriptor> {
        self.actions.values().map(|d| d.as_ref())
    }
}

/// Per-task constraints applied at dispatch.
#[derive(Debug, Clone, Default)]
pub struct TaskScope {
    pub task_id: String,
    pub sensitive: SensitiveData,
    /// Where navigation may go; `None` means unrestricted
    pub allowed_domains: Option<DomainPolicy>,
}

impl TaskScope {
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            sensitive: SensitiveData::new(task.sensitive_data.clone()),
            allowed_domains: task.allowed_domains.as_ref().map(DomainPolicy::new),
        }
    }
}

/// Prefix bare hosts with `https://`.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.contains("://") || raw.starts_with("about:") || raw.starts_with("data:") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    }
}

/// A registry of available actions.
pub struct ActionRegistry {
    catalog: RwLock<Arc<Catalog>>,
    action_timeout: Duration,
    audit: Arc<AuditLogger>,
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.catalog().names())
            .field("action_timeout", &self.action_timeout)
            .finish()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            catalog: RwLock::new(Arc::new(Catalog::default())),
            action_timeout: Duration::from_secs(60),
            audit: Arc::new(AuditLogger::tracing()),
        }
    }

    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// The current catalog. Cheap; the returned view never changes.
    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Register an action. Re-registering a name replaces its handler.
    ///
    /// The schema is checked here, once, rather than on every dispatch.
    pub fn register(
        &self,
        name: &str,
        description: &str,
        schema: ParamSchema,
        domain_filter: Option<Vec<String>>,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<(), ActionError> {
        if name.trim().is_empty() {
            return Err(ActionError::InvalidSchema {
                action: name.into(),
                reason: "action name is empty".into(),
            });
        }
        schema.validate_definition(name)?;

        let descriptor = Arc::new(ActionDescriptor {
            name: name.into(),
            description: description.into(),
            schema,
            domain_filter: domain_filter.map(DomainPolicy::new),
            handler,
        });

        let mut guard = self
            .catalog
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut actions = guard.actions.clone();
        if actions.insert(name.into(), descriptor).is_some() {
            debug!(action = name, "Replacing registered action");
        }
        *guard = Arc::new(Catalog { actions });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.catalog().get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.catalog().names().into_iter().map(String::from).collect()
    }

    /// The catalog as shown to the model: one line per action.
    pub fn describe(&self) -> String {
        self.catalog()
            .iter()
            .map(|d| {
                format!(
                    "- {}: {} Parameters: {}",
                    d.name,
                    d.description,
                    d.schema.to_json_schema()["properties"]
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Dispatch one invocation.
    ///
    /// Never returns an error: every failure becomes an error-carrying
    /// outcome. The handler only runs once the parameters are valid, the
    /// action is in scope and every element index exists in the current
    /// selector map.
    pub async fn dispatch(
        &self,
        invocation: &ActionInvocation,
        env: &mut dyn Environment,
        scope: &TaskScope,
    ) -> ActionOutcome {
        let started = Instant::now();
        let mut outcome = match self.prepare_and_invoke(invocation, env, scope).await {
            Ok(outcome) => outcome,
            Err(err) => ActionOutcome::from(err),
        };
        outcome.action = invocation.name.clone();
        redact_outcome(&mut outcome, &scope.sensitive);

        if let Some(error) = &outcome.error {
            warn!(action = %invocation.name, kind = %error.kind, error = %error.message, "Action failed");
        }

        debug!(
            action = %invocation.name,
            error = outcome.is_error(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Action dispatched"
        );
        outcome
    }

    async fn prepare_and_invoke(
        &self,
        invocation: &ActionInvocation,
        env: &mut dyn Environment,
        scope: &TaskScope,
    ) -> Result<ActionOutcome, ActionError> {
        let name = invocation.name.as_str();
        let catalog = self.catalog();
        let descriptor = catalog
            .get(name)
            .ok_or_else(|| ActionError::UnknownAction(name.into()))?;

        let mut params = descriptor.schema.validate(name, &invocation.params)?;
        self.substitute_secrets(&mut params, scope, name)?;

        if let Some(filter) = &descriptor.domain_filter {
            let location = env.current_location().await?;
            if let DomainCheck::Denied { reason, .. } = filter.check(&location) {
                self.audit.log(
                    AuditEvent::ScopeViolation {
                        action: name.into(),
                    },
                    &scope.task_id,
                    &location,
                    AuditOutcome::Denied,
                    Some(reason),
                );
                return Err(ActionError::Scope {
                    action: name.into(),
                    location,
                });
            }
        }

        for param in descriptor.schema.url_params() {
            let Some(raw) = params.str(param) else {
                continue;
            };
            let url = normalize_url(raw);
            if let Some(policy) = &scope.allowed_domains {
                if let DomainCheck::Denied { reason, .. } = policy.check(&url) {
                    self.audit.log(
                        AuditEvent::NavigationDenied { url: url.clone() },
                        &scope.task_id,
                        &url,
                        AuditOutcome::Denied,
                        Some(reason),
                    );
                    return Err(ActionError::Scope {
                        action: name.into(),
                        location: url,
                    });
                }
            }
            params.replace_str(param, url);
        }

        let indices = params.element_indices();
        if !indices.is_empty() {
            let current = env.current_selector_map().await?;
            if let Some(missing) = indices.into_iter().find(|i| !current.contains_key(i)) {
                self.audit.log(
                    AuditEvent::StaleReference { index: missing.0 },
                    &scope.task_id,
                    name,
                    AuditOutcome::Failure,
                    None,
                );
                return Err(ActionError::StaleReference { index: missing });
            }
        }

        let handler = descriptor.handler.clone();
        match tokio::time::timeout(self.action_timeout, handler.invoke(&params, env)).await {
            Ok(result) => result,
            Err(_) => Err(ActionError::Timeout {
                action: name.into(),
                after_secs: self.action_timeout.as_secs(),
            }),
        }
    }

    fn substitute_secrets(
        &self,
        params: &mut ValidatedParams,
        scope: &TaskScope,
        action: &str,
    ) -> Result<(), ActionError> {
        let mut used = Vec::new();
        params.map_strings(|s| {
            if !SensitiveData::has_placeholders(s) {
                return Ok(s.to_string());
            }
            let (replaced, names) = scope.sensitive.substitute(s)?;
            used.extend(names);
            Ok(replaced)
        })?;
        for name in used {
            self.audit.log(
                AuditEvent::SecretSubstituted { name },
                &scope.task_id,
                action,
                AuditOutcome::Success,
                None,
            );
        }
        Ok(())
    }
}

fn redact_outcome(outcome: &mut ActionOutcome, sensitive: &SensitiveData) {
    if sensitive.is_empty() {
        return;
    }
    if let Some(content) = outcome.content.as_mut() {
        *content = sensitive.redact(content);
    }
    if let Some(error) = outcome.error.as_mut() {
        error.message = sensitive.redact(&error.message);
    }
}
