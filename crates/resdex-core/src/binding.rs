//! Binding entities
//!
//! A `Binding` ties a target (a resource query or a class name) to a binding
//! type and carries the fully resolved parameter map. Resource bindings get
//! their resources either eagerly (resolved and frozen at construction) or
//! lazily (resolved on first access and memoized for the binding's lifetime).
//!
//! Equality is structural: target, language, type name and resolved
//! parameters. The uuid and the resources never take part in it.

use crate::errors::{DiscoveryError, Result};
use crate::glob::QueryPattern;
use crate::repository::{ResourceCollection, ResourceRepository};
use crate::types::{BindingType, ParamValue, Parameters};
use crate::validation::resolve_parameters;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// The only supported query language
pub const GLOB_LANGUAGE: &str = "glob";

/// Fail unless `language` is the glob language
pub fn check_language(language: &str) -> Result<()> {
    if language == GLOB_LANGUAGE {
        Ok(())
    } else {
        Err(DiscoveryError::UnsupportedLanguage(language.to_string()))
    }
}

/// What a binding points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingKind {
    Resource,
    Class,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKind::Resource => f.write_str("resource"),
            BindingKind::Class => f.write_str("class"),
        }
    }
}

// =============================================================================
// RESOURCE SOURCE
// =============================================================================

/// How a resource binding obtains its resources
#[derive(Clone)]
pub enum ResourceSource {
    /// Resolved once at construction
    Eager(ResourceCollection),
    /// Resolved on first access; `repository` is attached by an initializer
    /// when the binding was deserialized
    Lazy {
        repository: Option<Arc<dyn ResourceRepository>>,
        resolved: OnceCell<ResourceCollection>,
    },
}

impl fmt::Debug for ResourceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceSource::Eager(resources) => f.debug_tuple("Eager").field(resources).finish(),
            ResourceSource::Lazy {
                repository,
                resolved,
            } => f
                .debug_struct("Lazy")
                .field("initialized", &repository.is_some())
                .field("resolved", &resolved.get())
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum BindingTarget {
    Resource {
        query: Arc<str>,
        language: Arc<str>,
        pattern: QueryPattern,
        source: ResourceSource,
    },
    Class {
        class_name: Arc<str>,
    },
}

// =============================================================================
// BINDING
// =============================================================================

#[derive(Debug, Clone)]
pub struct Binding {
    uuid: Uuid,
    target: BindingTarget,
    binding_type: Arc<BindingType>,
    parameters: Parameters,
}

impl Binding {
    /// Resource binding resolved on first access
    ///
    /// Queries matching nothing are accepted; resources may appear later.
    pub fn lazy(
        query: &str,
        binding_type: Arc<BindingType>,
        parameters: Parameters,
        language: &str,
        repository: Option<Arc<dyn ResourceRepository>>,
    ) -> Result<Self> {
        let (query, language, pattern) = prepare_query(query, language)?;
        let parameters = resolve_parameters(parameters, &binding_type)?;
        Ok(Binding {
            uuid: Uuid::new_v4(),
            target: BindingTarget::Resource {
                query,
                language,
                pattern,
                source: ResourceSource::Lazy {
                    repository,
                    resolved: OnceCell::new(),
                },
            },
            binding_type,
            parameters,
        })
    }

    /// Resource binding resolved now; fails if the query matches nothing
    pub fn eager(
        query: &str,
        binding_type: Arc<BindingType>,
        parameters: Parameters,
        language: &str,
        repository: &dyn ResourceRepository,
    ) -> Result<Self> {
        let (query, language, pattern) = prepare_query(query, language)?;
        let parameters = resolve_parameters(parameters, &binding_type)?;
        let resources = repository.find(&query)?;
        if resources.is_empty() {
            return Err(DiscoveryError::Binding(format!(
                "the query '{}' did not return any resources",
                query
            )));
        }
        Ok(Binding {
            uuid: Uuid::new_v4(),
            target: BindingTarget::Resource {
                query,
                language,
                pattern,
                source: ResourceSource::Eager(resources),
            },
            binding_type,
            parameters,
        })
    }

    /// Binding of a class name instead of resources
    pub fn class(
        class_name: &str,
        binding_type: Arc<BindingType>,
        parameters: Parameters,
    ) -> Result<Self> {
        if class_name.trim().is_empty() {
            return Err(DiscoveryError::Binding(
                "the class name must not be empty".to_string(),
            ));
        }
        let parameters = resolve_parameters(parameters, &binding_type)?;
        Ok(Binding {
            uuid: Uuid::new_v4(),
            target: BindingTarget::Class {
                class_name: Arc::from(class_name),
            },
            binding_type,
            parameters,
        })
    }

    /// Replace the generated uuid (used when restoring persisted bindings)
    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn kind(&self) -> BindingKind {
        match self.target {
            BindingTarget::Resource { .. } => BindingKind::Resource,
            BindingTarget::Class { .. } => BindingKind::Class,
        }
    }

    pub fn target(&self) -> &BindingTarget {
        &self.target
    }

    /// The query for resource bindings, the class name for class bindings
    pub fn key(&self) -> &Arc<str> {
        match &self.target {
            BindingTarget::Resource { query, .. } => query,
            BindingTarget::Class { class_name } => class_name,
        }
    }

    pub fn query(&self) -> Option<&str> {
        match &self.target {
            BindingTarget::Resource { query, .. } => Some(query),
            BindingTarget::Class { .. } => None,
        }
    }

    pub fn language(&self) -> Option<&str> {
        match &self.target {
            BindingTarget::Resource { language, .. } => Some(language),
            BindingTarget::Class { .. } => None,
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        match &self.target {
            BindingTarget::Class { class_name } => Some(class_name),
            BindingTarget::Resource { .. } => None,
        }
    }

    pub fn binding_type(&self) -> &Arc<BindingType> {
        &self.binding_type
    }

    pub fn type_name(&self) -> &Arc<str> {
        self.binding_type.name()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Result<&ParamValue> {
        self.parameters
            .get(name)
            .ok_or_else(|| DiscoveryError::NoSuchParameter {
                parameter: name.to_string(),
                type_name: self.type_name().to_string(),
            })
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn is_eager(&self) -> bool {
        matches!(
            self.target,
            BindingTarget::Resource {
                source: ResourceSource::Eager(_),
                ..
            }
        )
    }

    /// False for lazy bindings that still wait for a repository
    pub fn is_initialized(&self) -> bool {
        !matches!(
            self.target,
            BindingTarget::Resource {
                source: ResourceSource::Lazy {
                    repository: None,
                    ..
                },
                ..
            }
        )
    }

    /// Attach a repository to a lazy resource binding; other bindings are untouched
    pub fn attach_repository(&mut self, repo: Arc<dyn ResourceRepository>) {
        if let BindingTarget::Resource {
            source: ResourceSource::Lazy { repository, .. },
            ..
        } = &mut self.target
        {
            *repository = Some(repo);
        }
    }

    /// Resources of a resource binding
    ///
    /// Lazy bindings query the repository on the first call only; later calls
    /// return the memoized collection even if the repository changed since.
    pub fn resources(&self) -> Result<&ResourceCollection> {
        match &self.target {
            BindingTarget::Resource {
                source: ResourceSource::Eager(resources),
                ..
            } => Ok(resources),
            BindingTarget::Resource {
                query,
                source:
                    ResourceSource::Lazy {
                        repository,
                        resolved,
                    },
                ..
            } => resolved.get_or_try_init(|| match repository {
                Some(repository) => repository.find(query),
                None => Err(DiscoveryError::NotInitialized(query.to_string())),
            }),
            BindingTarget::Class { class_name } => Err(DiscoveryError::Binding(format!(
                "the class binding '{}' has no resources",
                class_name
            ))),
        }
    }

    /// Whether the binding's query selects `resource_path`; class bindings never do
    pub fn matches_path(&self, resource_path: &str) -> bool {
        match &self.target {
            BindingTarget::Resource { pattern, .. } => pattern.matches(resource_path),
            BindingTarget::Class { .. } => false,
        }
    }
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
            && self.key() == other.key()
            && self.language() == other.language()
            && self.type_name() == other.type_name()
            && self.parameters == other.parameters
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.key(), self.type_name())?;
        if !self.parameters.is_empty() {
            let rendered: Vec<String> = self
                .parameters
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, " ({})", rendered.join(", "))?;
        }
        Ok(())
    }
}

fn prepare_query(query: &str, language: &str) -> Result<(Arc<str>, Arc<str>, QueryPattern)> {
    check_language(language)?;
    if query.is_empty() {
        return Err(DiscoveryError::Binding(
            "the query must not be empty".to_string(),
        ));
    }
    let pattern = QueryPattern::parse(query)?;
    Ok((Arc::from(query), Arc::from(language), pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use crate::types::BindingParameter;

    fn catalog() -> Arc<BindingType> {
        let ty = BindingParameter::required("domain").and_then(|domain| {
            BindingParameter::optional_with_default("locale", "en")
                .and_then(|locale| BindingType::new("catalog", [domain, locale]))
        });
        match ty {
            Ok(ty) => Arc::new(ty),
            Err(e) => panic!("type should build: {e}"),
        }
    }

    fn domain(value: &str) -> Parameters {
        Parameters::from([(Arc::from("domain"), ParamValue::from(value))])
    }

    fn shared_repo(paths: &[&str]) -> Arc<InMemoryRepository> {
        match InMemoryRepository::with_paths(paths.iter().copied()) {
            Ok(repo) => Arc::new(repo),
            Err(e) => panic!("repository should build: {e}"),
        }
    }

    #[test]
    fn test_default_parameter_filled() {
        let binding = Binding::lazy("/app/*", catalog(), domain("errors"), GLOB_LANGUAGE, None);
        let Ok(binding) = binding else {
            panic!("binding should build");
        };
        assert_eq!(
            binding.parameter("locale"),
            binding.binding_type().parameter_value("locale")
        );
        assert_eq!(binding.parameters().len(), 2);
    }

    #[test]
    fn test_equality_ignores_uuid_and_source() {
        let repo = shared_repo(&["/app/a"]);
        let lazy = Binding::lazy(
            "/app/a",
            catalog(),
            domain("errors"),
            GLOB_LANGUAGE,
            Some(repo.clone()),
        );
        let eager = Binding::eager("/app/a", catalog(), domain("errors"), GLOB_LANGUAGE, &*repo);
        let (Ok(lazy), Ok(eager)) = (lazy, eager) else {
            panic!("bindings should build");
        };
        assert_ne!(lazy.uuid(), eager.uuid());
        assert_eq!(lazy, eager);

        let other = Binding::lazy("/app/a", catalog(), domain("messages"), GLOB_LANGUAGE, None);
        assert!(other.is_ok_and(|other| other != lazy));
    }

    #[test]
    fn test_explicit_default_equals_implicit_default() {
        let mut explicit = domain("errors");
        explicit.insert(Arc::from("locale"), ParamValue::from("en"));
        let a = Binding::lazy("/x", catalog(), explicit, GLOB_LANGUAGE, None);
        let b = Binding::lazy("/x", catalog(), domain("errors"), GLOB_LANGUAGE, None);
        assert!(matches!((a, b), (Ok(a), Ok(b)) if a == b));
    }

    #[test]
    fn test_class_and_resource_never_equal() {
        let class = Binding::class("/x", catalog(), domain("errors"));
        let resource = Binding::lazy("/x", catalog(), domain("errors"), GLOB_LANGUAGE, None);
        assert!(matches!((class, resource), (Ok(c), Ok(r)) if c != r));
    }

    #[test]
    fn test_eager_requires_resources() {
        let repo = shared_repo(&["/file1"]);
        let result = Binding::eager("/nothing*", catalog(), domain("errors"), GLOB_LANGUAGE, &*repo);
        assert!(matches!(result, Err(DiscoveryError::Binding(_))));
    }

    #[test]
    fn test_lazy_accepts_empty_match_and_memoizes() {
        let repo = shared_repo(&["/file1"]);
        let binding = Binding::lazy(
            "/later*",
            catalog(),
            domain("errors"),
            GLOB_LANGUAGE,
            Some(repo.clone()),
        );
        let Ok(binding) = binding else {
            panic!("lazy binding should accept empty matches");
        };

        assert!(repo.add("/later1").is_ok());
        assert_eq!(binding.resources().map(|r| r.len()), Ok(1));

        // Resolved once; later repository changes are not observed
        assert!(repo.add("/later2").is_ok());
        assert_eq!(binding.resources().map(|r| r.len()), Ok(1));
    }

    #[test]
    fn test_uninitialized_lazy_binding() {
        let binding = Binding::lazy("/a", catalog(), domain("errors"), GLOB_LANGUAGE, None);
        let Ok(mut binding) = binding else {
            panic!("binding should build");
        };
        assert!(!binding.is_initialized());
        assert_eq!(
            binding.resources().map(|r| r.len()),
            Err(DiscoveryError::NotInitialized("/a".to_string()))
        );

        binding.attach_repository(shared_repo(&["/a"]));
        assert!(binding.is_initialized());
        assert_eq!(binding.resources().map(|r| r.len()), Ok(1));
    }

    #[test]
    fn test_unsupported_language() {
        let result = Binding::lazy("/a", catalog(), domain("errors"), "xpath", None);
        assert_eq!(
            result.map(|b| b.uuid()),
            Err(DiscoveryError::UnsupportedLanguage("xpath".to_string()))
        );
    }

    #[test]
    fn test_class_binding_has_no_resources() {
        let binding = Binding::class("App\\Catalog", catalog(), domain("errors"));
        let Ok(binding) = binding else {
            panic!("class binding should build");
        };
        assert_eq!(binding.kind(), BindingKind::Class);
        assert!(!binding.matches_path("/App"));
        assert!(binding.resources().is_err());
        assert!(Binding::class("  ", catalog(), domain("errors")).is_err());
    }
}
