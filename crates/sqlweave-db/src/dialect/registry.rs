//! The dialect registry.
//!
//! Dialects are resolved by name into a shared [`DialectDescriptor`]: the
//! capability record plus its data type override table, merged once at
//! registration. Registration is append-only. A name can be registered
//! exactly once and a descriptor is never mutated afterwards, so resolved
//! `Arc`s can be held for as long as a caller likes.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use sqlweave_core::{SqlError, SqlResult};

use super::{builtin, DialectCapabilities, Feature};
use crate::types::TypeOverrides;

/// A registered dialect: capabilities plus resolved type overrides.
#[derive(Debug, Clone)]
pub struct DialectDescriptor {
    pub capabilities: DialectCapabilities,
    pub types: TypeOverrides,
}

impl DialectDescriptor {
    /// Builds a descriptor, merging `overrides` over the family defaults.
    pub fn new(capabilities: DialectCapabilities, overrides: &TypeOverrides) -> Self {
        let types = TypeOverrides::for_family(capabilities.family).merge(overrides);
        Self {
            capabilities,
            types,
        }
    }

    /// The registered dialect name.
    pub fn name(&self) -> &str {
        &self.capabilities.name
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.capabilities.supports(feature)
    }
}

/// The process-wide registry, seeded with the built-in dialects.
static GLOBAL: Lazy<DialectRegistry> = Lazy::new(DialectRegistry::builtin);

/// A name-keyed, append-only set of dialects.
#[derive(Debug, Default)]
pub struct DialectRegistry {
    dialects: RwLock<HashMap<String, Arc<DialectDescriptor>>>,
}

impl DialectRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in dialect.
    pub fn builtin() -> Self {
        let mut dialects = HashMap::new();
        for caps in builtin::all() {
            let descriptor = DialectDescriptor::new(caps, &TypeOverrides::new());
            dialects.insert(descriptor.capabilities.name.clone(), Arc::new(descriptor));
        }
        Self {
            dialects: RwLock::new(dialects),
        }
    }

    /// The shared process-wide registry.
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Registers a dialect under `capabilities.name`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the name is empty or already taken.
    pub fn register(
        &self,
        capabilities: DialectCapabilities,
        overrides: &TypeOverrides,
    ) -> SqlResult<Arc<DialectDescriptor>> {
        if capabilities.name.trim().is_empty() {
            return Err(SqlError::ConfigurationError(
                "dialect name must not be empty".into(),
            ));
        }
        let mut dialects = self.dialects.write().unwrap_or_else(PoisonError::into_inner);
        if dialects.contains_key(&capabilities.name) {
            return Err(SqlError::ConfigurationError(format!(
                "dialect '{}' is already registered",
                capabilities.name
            )));
        }
        let descriptor = Arc::new(DialectDescriptor::new(capabilities, overrides));
        tracing::info!(
            dialect = %descriptor.capabilities.name,
            family = %descriptor.capabilities.family,
            "Registered dialect"
        );
        dialects.insert(descriptor.capabilities.name.clone(), Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Looks up a dialect by name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownDialect` if nothing is registered under `name`.
    pub fn resolve(&self, name: &str) -> SqlResult<Arc<DialectDescriptor>> {
        self.dialects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| SqlError::UnknownDialect(name.to_string()))
    }

    /// Returns whether the named dialect supports `feature`.
    pub fn is_supported(&self, name: &str, feature: Feature) -> SqlResult<bool> {
        Ok(self.resolve(name)?.supports(feature))
    }

    /// Registered dialect names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .dialects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::UpsertStyle;
    use crate::types::{DataType, TypeKey, TypeOverride};
    use sqlweave_core::ErrorKind;

    #[test]
    fn test_builtin_names() {
        let registry = DialectRegistry::builtin();
        assert_eq!(
            registry.names(),
            vec!["db2", "ibmi", "mariadb", "mssql", "mysql", "oracle", "postgres", "snowflake", "sqlite"]
        );
    }

    #[test]
    fn test_resolve_unknown() {
        let err = DialectRegistry::builtin().resolve("informix").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownDialect);
        assert!(err.to_string().contains("informix"));
    }

    #[test]
    fn test_register_derived_dialect() {
        let registry = DialectRegistry::builtin();
        let mut caps = builtin::sqlite();
        caps.name = "sqlite-legacy".into();
        caps.upsert = UpsertStyle::None;
        registry.register(caps, &TypeOverrides::new()).unwrap();

        assert!(!registry.is_supported("sqlite-legacy", Feature::NativeUpsert).unwrap());
        assert!(registry.is_supported("sqlite", Feature::NativeUpsert).unwrap());
        // The fallback plan keeps upsert itself available.
        assert!(registry.is_supported("sqlite-legacy", Feature::Upsert).unwrap());
        // Family overrides carry over to the derived dialect.
        let legacy = registry.resolve("sqlite-legacy").unwrap();
        assert_eq!(DataType::uuid().to_sql(&legacy).unwrap(), "TEXT");
    }

    #[test]
    fn test_register_is_append_only() {
        let registry = DialectRegistry::builtin();
        let err = registry.register(builtin::postgres(), &TypeOverrides::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_register_with_user_overrides() {
        let registry = DialectRegistry::new();
        let mut caps = builtin::postgres();
        caps.name = "cockroach".into();
        let overrides = TypeOverrides::new().with(
            TypeKey::Json,
            TypeOverride {
                to_sql: Some(|_, _| Ok("JSONB".into())),
                ..TypeOverride::default()
            },
        );
        let cockroach = registry.register(caps, &overrides).unwrap();
        assert_eq!(DataType::Json.to_sql(&cockroach).unwrap(), "JSONB");
        assert_eq!(DataType::uuid().to_sql(&cockroach).unwrap(), "UUID");
    }

    #[test]
    fn test_global_registry_is_seeded() {
        assert!(DialectRegistry::global().resolve("mssql").is_ok());
    }
}
