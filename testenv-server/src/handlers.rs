use axum::Router;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use testenv_common::{HarnessError, Result};
use tracing::warn;

/// Identity of a registered handler, unique across a catalog.
pub type HandlerId = String;

#[derive(Clone)]
struct Handler {
    id: HandlerId,
    router: Router,
}

/// Handlers available for discovery, organised into named groups.
///
/// Registration order is preserved within a group; groups iterate by name.
#[derive(Clone, Default)]
pub struct HandlerCatalog {
    groups: BTreeMap<String, Vec<Handler>>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `router` to `group` under `id`. Fails if `id` is already registered in any group.
    pub fn register(&mut self, group: &str, id: &str, router: Router) -> Result<()> {
        if self.contains(id) {
            return Err(HarnessError::DuplicateHandler(id.to_string()));
        }
        self.groups
            .entry(group.to_string())
            .or_default()
            .push(Handler { id: id.to_string(), router });
        Ok(())
    }

    /// Builder form of [`HandlerCatalog::register`].
    pub fn with_handler(mut self, group: &str, id: &str, router: Router) -> Result<Self> {
        self.register(group, id, router)?;
        Ok(self)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn handler_ids(&self) -> impl Iterator<Item = &str> {
        self.groups.values().flatten().map(|h| h.id.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn find(&self, id: &str) -> Option<&Handler> {
        self.groups.values().flatten().find(|h| h.id == id)
    }
}

impl fmt::Debug for HandlerCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.groups
                    .iter()
                    .map(|(group, handlers)| (group, handlers.iter().map(|h| &h.id).collect::<Vec<_>>())),
            )
            .finish()
    }
}

/// Which handlers a test server mounts.
#[derive(Clone)]
pub enum HandlerConfiguration {
    /// Every handler in the catalog.
    ScanAll,
    /// Handlers registered under any of the named groups.
    ScanGroups(BTreeSet<String>),
    /// Exactly these handlers, in this order.
    ExplicitList(Vec<HandlerId>),
    /// A pre-built router, mounted as is. The catalog is not consulted.
    Custom(Router),
}

impl HandlerConfiguration {
    pub fn scan_groups<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ScanGroups(names.into_iter().map(Into::into).collect())
    }

    pub fn explicit<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<HandlerId>,
    {
        Self::ExplicitList(ids.into_iter().map(Into::into).collect())
    }

    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ScanAll => "scan-all",
            Self::ScanGroups(_) => "scan-groups",
            Self::ExplicitList(_) => "explicit-list",
            Self::Custom(_) => "custom",
        }
    }

    /// Merge the selected handlers into one router.
    ///
    /// Unknown group names are logged and skipped; an unknown handler id is an error.
    /// Listing the same id twice mounts it once. Two selected handlers serving the
    /// same method and path fail with [`HarnessError::RouteConflict`].
    pub fn resolve(&self, catalog: &HandlerCatalog) -> Result<Router> {
        match self {
            Self::ScanAll => merge(catalog.groups.values().flatten()),
            Self::ScanGroups(names) => {
                for name in names.iter().filter(|name| !catalog.groups.contains_key(name.as_str())) {
                    warn!(group = %name, "No handlers registered for group");
                }
                merge(
                    catalog
                        .groups
                        .iter()
                        .filter(|(group, _)| names.contains(*group))
                        .flat_map(|(_, handlers)| handlers),
                )
            }
            Self::ExplicitList(ids) => {
                let mut seen = HashSet::new();
                let mut selected = Vec::with_capacity(ids.len());
                for id in ids {
                    let handler = catalog.find(id).ok_or_else(|| HarnessError::UnknownHandler(id.clone()))?;
                    if seen.insert(id.as_str()) {
                        selected.push(handler);
                    }
                }
                merge(selected)
            }
            Self::Custom(router) => Ok(router.clone()),
        }
    }
}

impl fmt::Debug for HandlerConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScanAll => f.write_str("ScanAll"),
            Self::ScanGroups(names) => f.debug_tuple("ScanGroups").field(names).finish(),
            Self::ExplicitList(ids) => f.debug_tuple("ExplicitList").field(ids).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

// `Router::merge` panics on overlapping routes; that is reported as the
// conflicting handler instead of unwinding out of `start`.
fn merge<'a>(handlers: impl IntoIterator<Item = &'a Handler>) -> Result<Router> {
    handlers.into_iter().try_fold(Router::new(), |app, handler| {
        let router = handler.router.clone();
        panic::catch_unwind(AssertUnwindSafe(move || app.merge(router)))
            .map_err(|_| HarnessError::RouteConflict(handler.id.clone()))
    })
}
