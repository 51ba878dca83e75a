//! Ordered, concurrency-safe mapping registry.
//!
//! Mappings are kept sorted by `(priority ascending, insertion index
//! descending)`. Readers take a cheap `Arc` snapshot of the sorted list and
//! never block each other; writers compile outside the lock, then swap in a
//! new list (copy-on-write), so a reader never observes a half-applied
//! mutation.

use super::types::StubMapping;
use crate::error::{MappingError, RegistryError};
use crate::metrics;
use crate::pattern::{CompiledRequestPattern, CustomMatcherRegistry, RequestPattern};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// A mapping together with its compiled pattern and ordering key.
#[derive(Debug)]
pub struct RegisteredMapping {
    mapping: StubMapping,
    pattern: CompiledRequestPattern,
    priority: i32,
    insertion_index: u64,
}

impl RegisteredMapping {
    pub fn id(&self) -> Uuid {
        self.mapping.id
    }

    pub fn mapping(&self) -> &StubMapping {
        &self.mapping
    }

    pub fn pattern(&self) -> &CompiledRequestPattern {
        &self.pattern
    }

    /// Effective priority (declared or default).
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub(crate) fn insertion_index(&self) -> u64 {
        self.insertion_index
    }

    fn sort_key(&self) -> (i32, Reverse<u64>) {
        (self.priority, Reverse(self.insertion_index))
    }
}

/// Sorted snapshot of the registry, in selection order.
pub type Snapshot = Arc<Vec<Arc<RegisteredMapping>>>;

pub struct MappingRegistry {
    mappings: RwLock<Snapshot>,
    next_index: AtomicU64,
    default_priority: i32,
    case_insensitive_methods: bool,
    custom_matchers: CustomMatcherRegistry,
}

impl std::fmt::Debug for MappingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingRegistry")
            .field("mappings", &self.len())
            .field("default_priority", &self.default_priority)
            .field("custom_matchers", &self.custom_matchers)
            .finish()
    }
}

fn insert_sorted(list: &mut Vec<Arc<RegisteredMapping>>, entry: Arc<RegisteredMapping>) {
    let key = entry.sort_key();
    let position = list.partition_point(|m| m.sort_key() < key);
    list.insert(position, entry);
}

impl MappingRegistry {
    pub fn new(default_priority: i32, custom_matchers: CustomMatcherRegistry) -> Self {
        Self {
            mappings: RwLock::new(Arc::new(Vec::new())),
            next_index: AtomicU64::new(0),
            default_priority,
            case_insensitive_methods: false,
            custom_matchers,
        }
    }

    pub fn with_case_insensitive_methods(mut self, enabled: bool) -> Self {
        self.case_insensitive_methods = enabled;
        self
    }

    pub fn default_priority(&self) -> i32 {
        self.default_priority
    }

    pub fn custom_matchers(&self) -> &CustomMatcherRegistry {
        &self.custom_matchers
    }

    /// Compile a request pattern with this registry's matchers and options.
    pub fn compile_pattern(
        &self,
        pattern: &RequestPattern,
    ) -> Result<CompiledRequestPattern, MappingError> {
        Ok(CompiledRequestPattern::compile(pattern, &self.custom_matchers)?
            .with_case_insensitive_method(self.case_insensitive_methods))
    }

    fn build(
        &self,
        mapping: StubMapping,
        insertion_index: u64,
    ) -> Result<RegisteredMapping, MappingError> {
        let pattern = self.compile_pattern(&mapping.request)?;
        Ok(RegisteredMapping {
            priority: mapping.effective_priority(self.default_priority),
            mapping,
            pattern,
            insertion_index,
        })
    }

    fn next_insertion_index(&self) -> u64 {
        self.next_index.fetch_add(1, Ordering::SeqCst)
    }

    /// Current mappings in selection order.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.mappings.read())
    }

    /// Apply a mutation to a private copy of the list and publish it.
    fn mutate<T>(&self, f: impl FnOnce(&mut Vec<Arc<RegisteredMapping>>) -> T) -> T {
        let mut guard = self.mappings.write();
        let mut next = Vec::clone(&guard);
        let out = f(&mut next);
        metrics::set_registered_mappings(next.len());
        *guard = Arc::new(next);
        out
    }

    /// Register a new mapping.
    pub fn add(&self, mapping: StubMapping) -> Result<Arc<RegisteredMapping>, RegistryError> {
        let id = mapping.id;
        let entry = Arc::new(self.build(mapping, self.next_insertion_index())?);

        self.mutate(|list| {
            if list.iter().any(|m| m.id() == id) {
                return Err(RegistryError::DuplicateId(id));
            }
            insert_sorted(list, Arc::clone(&entry));
            Ok(())
        })?;

        info!(
            "Registered stub mapping {} (priority {})",
            entry.mapping.display_name(),
            entry.priority
        );
        Ok(entry)
    }

    /// Register a batch of new mappings, all or nothing.
    ///
    /// Every mapping is compiled and every id checked (against the registry
    /// and within the batch) before the list is published.
    pub fn add_all(
        &self,
        mappings: Vec<StubMapping>,
    ) -> Result<Vec<Arc<RegisteredMapping>>, RegistryError> {
        let entries = mappings
            .into_iter()
            .map(|mapping| self.build(mapping, self.next_insertion_index()).map(Arc::new))
            .collect::<Result<Vec<_>, MappingError>>()?;

        self.mutate(|list| {
            let mut seen = HashSet::with_capacity(entries.len());
            for entry in &entries {
                let id = entry.id();
                if !seen.insert(id) || list.iter().any(|m| m.id() == id) {
                    return Err(RegistryError::DuplicateId(id));
                }
            }
            for entry in &entries {
                insert_sorted(list, Arc::clone(entry));
            }
            Ok(())
        })?;

        info!("Registered {} stub mapping(s)", entries.len());
        Ok(entries)
    }

    /// Replace an existing mapping, keeping its identity and insertion index.
    pub fn edit(&self, mapping: StubMapping) -> Result<Arc<RegisteredMapping>, RegistryError> {
        let id = mapping.id;
        let pattern = self.compile_pattern(&mapping.request)?;
        let priority = mapping.effective_priority(self.default_priority);

        let entry = self.mutate(|list| {
            let position = list
                .iter()
                .position(|m| m.id() == id)
                .ok_or(RegistryError::MappingNotFound(id))?;
            let previous = list.remove(position);
            let entry = Arc::new(RegisteredMapping {
                mapping,
                pattern,
                priority,
                insertion_index: previous.insertion_index,
            });
            insert_sorted(list, Arc::clone(&entry));
            Ok::<_, RegistryError>(entry)
        })?;

        info!("Edited stub mapping {}", entry.mapping.display_name());
        Ok(entry)
    }

    /// Remove a mapping by id, returning it.
    pub fn remove(&self, id: Uuid) -> Result<StubMapping, RegistryError> {
        let removed = self.mutate(|list| {
            let position = list
                .iter()
                .position(|m| m.id() == id)
                .ok_or(RegistryError::MappingNotFound(id))?;
            Ok::<_, RegistryError>(list.remove(position))
        })?;

        info!("Removed stub mapping {}", removed.mapping.display_name());
        Ok(removed.mapping.clone())
    }

    /// Remove every mapping whose metadata satisfies the predicate.
    pub fn remove_by_metadata(
        &self,
        predicate: impl Fn(&Map<String, Value>) -> bool,
    ) -> Vec<StubMapping> {
        let removed: Vec<StubMapping> = self.mutate(|list| {
            let (removed, kept): (Vec<_>, Vec<_>) = list
                .drain(..)
                .partition(|m| m.mapping.metadata.as_ref().is_some_and(&predicate));
            *list = kept;
            removed.iter().map(|m| m.mapping.clone()).collect()
        });

        info!("Removed {} stub mapping(s) by metadata", removed.len());
        removed
    }

    pub fn find_by_metadata(
        &self,
        predicate: impl Fn(&Map<String, Value>) -> bool,
    ) -> Vec<StubMapping> {
        self.snapshot()
            .iter()
            .filter(|m| m.mapping.metadata.as_ref().is_some_and(&predicate))
            .map(|m| m.mapping.clone())
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<RegisteredMapping>> {
        self.snapshot().iter().find(|m| m.id() == id).cloned()
    }

    /// All mappings in selection order.
    pub fn list(&self) -> Vec<StubMapping> {
        self.snapshot().iter().map(|m| m.mapping.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.mappings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every mapping. Insertion indices are never reused.
    pub fn reset(&self) {
        let removed = self.mutate(|list| {
            let count = list.len();
            list.clear();
            count
        });
        info!("Reset mapping registry ({removed} mapping(s) removed)");
    }

    /// Import a batch of mappings atomically.
    ///
    /// Every mapping is compiled before anything changes, so one invalid
    /// mapping rejects the whole batch. Mappings whose id is already
    /// registered are replaced in place (keeping their insertion index);
    /// with `replace`, mappings absent from the batch are removed first.
    pub fn import(
        &self,
        mappings: Vec<StubMapping>,
        replace: bool,
    ) -> Result<Vec<Arc<RegisteredMapping>>, RegistryError> {
        let compiled = mappings
            .into_iter()
            .map(|mapping| {
                self.compile_pattern(&mapping.request)
                    .map(|pattern| (mapping, pattern))
            })
            .collect::<Result<Vec<_>, MappingError>>()?;

        let imported = self.mutate(|list| {
            if replace {
                list.clear();
            }
            let mut imported = Vec::with_capacity(compiled.len());
            for (mapping, pattern) in compiled {
                let insertion_index = match list.iter().position(|m| m.id() == mapping.id) {
                    Some(position) => list.remove(position).insertion_index,
                    None => self.next_insertion_index(),
                };
                let entry = Arc::new(RegisteredMapping {
                    priority: mapping.effective_priority(self.default_priority),
                    mapping,
                    pattern,
                    insertion_index,
                });
                insert_sorted(list, Arc::clone(&entry));
                imported.push(entry);
            }
            imported
        });

        info!("Imported {} stub mapping(s)", imported.len());
        debug!(replace, total = self.len(), "Import complete");
        Ok(imported)
    }
}
