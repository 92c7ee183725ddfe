//! Template use-cases, including default-template materialization.
//!
//! While no template is persisted, reads return the provider's defaults as
//! read-only entries. The first mutation touching them persists *all*
//! defaults in their displayed order before applying the change, so editing
//! one default never drops its siblings. Materialization and the mutation
//! commit together.

use super::NotesRepository;
use crate::model::template::{Template, TemplateId, TemplateKey};
use crate::store::{StorageAdapter, StoreResult};
use log::info;

impl<A: StorageAdapter> NotesRepository<A> {
    /// Persisted templates, or the synthesized defaults when none exist.
    pub fn get_templates(&self) -> StoreResult<Vec<Template>> {
        let stored = self.adapter.get_templates()?;
        if !stored.is_empty() {
            return Ok(stored);
        }
        Ok(self.default_entries())
    }

    pub fn get_template_by_id(&self, id: TemplateId) -> StoreResult<Option<Template>> {
        self.adapter.get_template_by_id(id)
    }

    /// Appends a template after every existing one.
    pub fn add_template(&self, text: &str) -> StoreResult<Template> {
        self.in_transaction(|store| {
            self.materialize_defaults(store)?;
            store.add_template(text)
        })
    }

    /// Replaces a template's text. Returns `None` when the key names nothing.
    pub fn update_template(&self, key: TemplateKey, text: &str) -> StoreResult<Option<Template>> {
        self.in_transaction(|store| {
            let materialized = self.materialize_if_targeted(store, &[Some(key)])?;
            match resolve_key(key, &materialized) {
                Some(id) => store.update_template(id, text),
                None => Ok(None),
            }
        })
    }

    pub fn delete_template(&self, key: TemplateKey) -> StoreResult<()> {
        self.in_transaction(|store| {
            let materialized = self.materialize_if_targeted(store, &[Some(key)])?;
            match resolve_key(key, &materialized) {
                Some(id) => store.delete_template(id),
                None => Ok(()),
            }
        })
    }

    /// Moves `key` right after `after` (to the front when `after` is `None`).
    ///
    /// Unresolvable keys make the call a no-op.
    pub fn move_template(&self, key: TemplateKey, after: Option<TemplateKey>) -> StoreResult<()> {
        self.in_transaction(|store| {
            let materialized = self.materialize_if_targeted(store, &[Some(key), after])?;

            let Some(id) = resolve_key(key, &materialized) else {
                return Ok(());
            };
            let after_id = match after {
                None => None,
                Some(after) => match resolve_key(after, &materialized) {
                    Some(after_id) => Some(after_id),
                    None => return Ok(()),
                },
            };
            store.move_template(id, after_id)
        })
    }

    fn default_entries(&self) -> Vec<Template> {
        (0_i64..)
            .zip(self.default_texts())
            .map(|(order, text)| Template::default_entry(text, order))
            .collect()
    }

    fn default_texts(&self) -> Vec<String> {
        self.default_templates
            .as_ref()
            .map(|provider| provider())
            .unwrap_or_default()
    }

    fn materialize_if_targeted(
        &self,
        store: &dyn StorageAdapter,
        keys: &[Option<TemplateKey>],
    ) -> StoreResult<Vec<Template>> {
        if keys.iter().flatten().any(TemplateKey::is_default) {
            self.materialize_defaults(store)
        } else {
            Ok(Vec::new())
        }
    }

    /// Persists the defaults when the store is empty; returns the new rows.
    fn materialize_defaults(&self, store: &dyn StorageAdapter) -> StoreResult<Vec<Template>> {
        if !store.get_templates()?.is_empty() {
            return Ok(Vec::new());
        }
        let texts = self.default_texts();
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let created = store.add_templates(&texts)?;
        info!(
            "event=template_defaults_materialized module=repository status=ok count={}",
            created.len()
        );
        Ok(created)
    }
}

/// Maps a key to a stored id. Default indexes only resolve against rows
/// materialized by the current call.
fn resolve_key(key: TemplateKey, materialized: &[Template]) -> Option<TemplateId> {
    match key {
        TemplateKey::Id(id) => Some(id),
        TemplateKey::DefaultIndex(index) => materialized.get(index).and_then(|template| template.id),
    }
}
