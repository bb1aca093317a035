//! Template compiler and cache.
//!
//! A template is compiled on first use – main document, partial fragments and
//! the fixed helper set go into a dedicated Handlebars registry – and the
//! result is memoized by name for the lifetime of the cache. There is no
//! invalidation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use handlebars::Handlebars;
use serde::Serialize;

use crate::config::{MAIN_DOCUMENT, PARTIALS_DIR, PARTIAL_EXTENSION};
use crate::error::{ReportError, Result};
use crate::helpers::register_builtin_helpers;
use crate::store::TemplateStore;

/// A compiled template: an immutable registry holding the main document,
/// its partials, and the helper set.
pub struct CompiledTemplate {
    name: String,
    /// Registry key of the main document. Contains a `/`, so no partial
    /// file stem can collide with it.
    main_key: String,
    partials: Vec<String>,
    registry: Handlebars<'static>,
}

impl CompiledTemplate {
    /// Compile `main_source` with the given `(name, source)` partials.
    pub fn compile(name: &str, main_source: &str, partials: &[(String, String)]) -> Result<Self> {
        let mut registry = Handlebars::new();
        register_builtin_helpers(&mut registry);
        for (partial, source) in partials {
            registry.register_partial(partial, source)?;
        }
        let main_key = format!("{name}/{MAIN_DOCUMENT}");
        registry.register_template_string(&main_key, main_source)?;
        Ok(Self {
            name: name.to_string(),
            main_key,
            partials: partials.iter().map(|(n, _)| n.clone()).collect(),
            registry,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the registered partials, sorted.
    pub fn partials(&self) -> &[String] {
        &self.partials
    }

    pub fn render<T: Serialize>(&self, data: &T) -> Result<String> {
        Ok(self.registry.render(&self.main_key, data)?)
    }
}

impl std::fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .field("partials", &self.partials)
            .finish()
    }
}

/// Compiled templates keyed by name.
///
/// Safe to share between concurrent requests. Two first-time compilations of
/// the same name may race; both produce equivalent templates and the last
/// insert wins.
#[derive(Debug)]
pub struct TemplateCache {
    store: TemplateStore,
    entries: RwLock<HashMap<String, Arc<CompiledTemplate>>>,
}

impl TemplateCache {
    pub fn new(store: TemplateStore) -> Self {
        Self {
            store,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    /// Return the compiled template for `name`, compiling it on a miss.
    pub async fn get(&self, name: &str) -> Result<Arc<CompiledTemplate>> {
        if let Some(hit) = self.cached(name) {
            log::debug!("Template cache hit: {name}");
            return Ok(hit);
        }

        let dir = self.store.resolve(name)?;
        let main_path = dir.join(MAIN_DOCUMENT);
        let main_source = tokio::fs::read_to_string(&main_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ReportError::NotFound { path: main_path.clone() },
                _ => ReportError::Io(e),
            })?;
        let partials = read_partials(&dir.join(PARTIALS_DIR)).await?;

        let compiled = Arc::new(CompiledTemplate::compile(name, &main_source, &partials)?);
        log::info!(
            "Compiled template '{name}' ({} partial{})",
            partials.len(),
            if partials.len() == 1 { "" } else { "s" }
        );

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Cached entry for `name`, without compiling.
    pub fn cached(&self, name: &str) -> Option<Arc<CompiledTemplate>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read every `*.hbs` file in `dir`, keyed by file stem and sorted by name.
/// A missing directory yields no partials.
async fn read_partials(dir: &Path) -> Result<Vec<(String, String)>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut partials = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(PARTIAL_EXTENSION) {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let source = tokio::fs::read_to_string(&path).await?;
        partials.push((name.to_string(), source));
    }
    partials.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(partials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn write_template(root: &Path, name: &str, main: &str, partials: &[(&str, &str)]) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MAIN_DOCUMENT), main).unwrap();
        if !partials.is_empty() {
            fs::create_dir_all(dir.join(PARTIALS_DIR)).unwrap();
            for (file, source) in partials {
                fs::write(dir.join(PARTIALS_DIR).join(file), source).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn compiles_with_partials() {
        let root = tempfile::tempdir().unwrap();
        write_template(
            root.path(),
            "invoice",
            "<h1>{{> header}}</h1><p>{{content.total}}</p>",
            &[("header.hbs", "Invoice {{content.number}}"), ("notes.txt", "ignored")],
        );
        let cache = TemplateCache::new(TemplateStore::new(root.path()));
        let template = cache.get("invoice").await.unwrap();
        assert_eq!(template.partials().to_vec(), vec!["header".to_string()]);
        let out = template
            .render(&json!({"content": {"number": 7, "total": 10}}))
            .unwrap();
        assert_eq!(out, "<h1>Invoice 7</h1><p>10</p>");
    }

    #[tokio::test]
    async fn partial_named_after_its_template() {
        let root = tempfile::tempdir().unwrap();
        write_template(
            root.path(),
            "invoice",
            "<main>{{> invoice}}</main>",
            &[("invoice.hbs", "<p>line {{content.total}}</p>")],
        );
        let cache = TemplateCache::new(TemplateStore::new(root.path()));
        let template = cache.get("invoice").await.unwrap();
        assert_eq!(template.name(), "invoice");
        let out = template.render(&json!({"content": {"total": 10}})).unwrap();
        assert_eq!(out, "<main><p>line 10</p></main>");
    }

    #[tokio::test]
    async fn second_lookup_does_no_io() {
        let root = tempfile::tempdir().unwrap();
        write_template(root.path(), "invoice", "{{content.total}}", &[]);
        let cache = TemplateCache::new(TemplateStore::new(root.path()));

        let first = cache.get("invoice").await.unwrap();
        fs::remove_dir_all(root.path().join("invoice")).unwrap();
        let second = cache.get("invoice").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let data = json!({"content": {"total": 3}});
        assert_eq!(first.render(&data).unwrap(), second.render(&data).unwrap());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn missing_main_document() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("empty")).unwrap();
        let cache = TemplateCache::new(TemplateStore::new(root.path()));
        let err = cache.get("empty").await.unwrap_err();
        assert!(matches!(err, ReportError::NotFound { .. }), "{err}");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn broken_partial_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        write_template(root.path(), "broken", "{{> row}}", &[("row.hbs", "{{#if}}")]);
        let cache = TemplateCache::new(TemplateStore::new(root.path()));
        let err = cache.get("broken").await.unwrap_err();
        assert!(matches!(err, ReportError::Template(_)), "{err}");
    }

    #[tokio::test]
    async fn invalid_name_never_touches_disk() {
        let cache = TemplateCache::new(TemplateStore::new("/nonexistent/root"));
        let err = cache.get("../secret").await.unwrap_err();
        assert!(matches!(err, ReportError::InvalidName(_)));
    }

    #[tokio::test]
    async fn caches_are_isolated() {
        let root = tempfile::tempdir().unwrap();
        write_template(root.path(), "a", "A", &[]);
        let first = TemplateCache::new(TemplateStore::new(root.path()));
        let second = TemplateCache::new(TemplateStore::new(root.path()));
        first.get("a").await.unwrap();
        assert!(first.cached("a").is_some());
        assert!(second.cached("a").is_none());
    }

    #[tokio::test]
    async fn concurrent_first_compilation() {
        let root = tempfile::tempdir().unwrap();
        write_template(root.path(), "race", "{{content.v}}", &[]);
        let cache = TemplateCache::new(TemplateStore::new(root.path()));
        let (a, b) = tokio::join!(cache.get("race"), cache.get("race"));
        let data = json!({"content": {"v": "ok"}});
        assert_eq!(a.unwrap().render(&data).unwrap(), "ok");
        assert_eq!(b.unwrap().render(&data).unwrap(), "ok");
        assert_eq!(cache.len(), 1);
    }
}
