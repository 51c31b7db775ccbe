use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::{Instant, SystemTime};

use dashmap::DashMap;
use glob::glob;
use log::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, TplError};
use crate::source::Source;
use crate::tpl::ast::Tree;
use crate::tpl::compile_with;

/// Where a cached template came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Backed by a file; eligible for hot reload.
    File(PathBuf),
    /// Parsed from a string at runtime.
    Inline,
    /// Embedded at compile time by `template_assets!`.
    Embedded,
}

/// A compiled template. Immutable: a reload swaps in a new `Template`.
#[derive(Debug)]
pub struct Template {
    pub source: Source,
    pub tree: Arc<Tree>,
    pub origin: Origin,
    /// Modification time of the file the tree was built from.
    pub modified: Option<SystemTime>,
}

impl Template {
    pub fn identity(&self) -> &str {
        self.source.identity()
    }
}

/// 全局模板缓存：identity -> 已编译模板
pub static TEMPLATES: LazyLock<TemplateCache> = LazyLock::new(TemplateCache::default);

/// Identity-keyed store of compiled templates.
///
/// Readers never block each other; a reload compiles outside the map and
/// only locks a shard to swap the new entry in. A failed reload leaves the
/// previous tree in place.
#[derive(Debug, Default)]
pub struct TemplateCache {
    templates: DashMap<String, Arc<Template>>,
    /// Mtime of the last failed reload per identity, retried only once the
    /// file changes again.
    failures: DashMap<String, SystemTime>,
    config: Config,
}

impl TemplateCache {
    pub fn new(config: Config) -> Self {
        Self {
            templates: DashMap::new(),
            failures: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn get(&self, identity: &str) -> Option<Arc<Template>> {
        self.templates.get(identity).map(|t| t.value().clone())
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.templates.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn identities(&self) -> Vec<String> {
        self.templates.iter().map(|t| t.key().clone()).collect()
    }

    pub fn remove(&self, identity: &str) -> Option<Arc<Template>> {
        self.failures.remove(identity);
        self.templates.remove(identity).map(|(_, t)| t)
    }

    /// 清理所有已缓存的模板（主要用于测试环境重置状态）
    pub fn clear(&self) {
        self.templates.clear();
        self.failures.clear();
    }

    /// Compiles an inline template, or returns the cached one with the same
    /// content.
    pub fn parse_str(&self, text: &str) -> Result<Arc<Template>> {
        let source = Source::from_string(text);
        if let Some(cached) = self.get(source.identity()) {
            return Ok(cached);
        }
        self.insert(source, Origin::Inline, None)
    }

    /// Compiles a template file, or returns the cached one for that path.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Arc<Template>> {
        let path = path.as_ref();
        if let Some(cached) = self.get(&path.display().to_string()) {
            return Ok(cached);
        }
        let modified = fs::metadata(path)?.modified()?;
        let source = Source::from_file(path)?;
        self.insert(source, Origin::File(path.to_path_buf()), Some(modified))
    }

    /// Registers a template under an explicit identity; an identity can
    /// only be registered once.
    pub fn register(&self, identity: &str, text: &str) -> Result<Arc<Template>> {
        if self.contains(identity) {
            return Err(TplError::DuplicateTemplate(identity.to_string()));
        }
        self.insert(Source::new(identity, text), Origin::Embedded, None)
    }

    /// Loads every file matching a glob pattern, e.g. `"templates/**/*.html"`.
    /// Returns how many templates were loaded.
    pub fn load(&self, pattern: &str) -> Result<usize> {
        let paths = glob(pattern)
            .map_err(|e| TplError::LoadError(format!("invalid glob pattern {}: {}", pattern, e)))?;
        let mut count = 0;
        for entry in paths {
            let path = entry
                .map_err(|e| TplError::LoadError(format!("cannot read path {}: {}", pattern, e)))?;
            if path.is_file() {
                self.parse_file(&path)?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Registers templates embedded at compile time as `(identity, content)`.
    ///
    /// Each asset is registered on its own: one that fails is logged and
    /// skipped, the rest still land in the cache. Returns how many were
    /// registered, or a `LoadError` naming every asset that failed.
    pub fn load_assets(&self, assets: Vec<(&str, &str)>) -> Result<usize> {
        let total = assets.len();
        let mut failed = Vec::new();
        for (identity, content) in assets {
            if let Err(e) = self.register(identity, content) {
                warn!("Register: template={}, error={}", identity, e);
                failed.push(identity);
            }
        }

        if failed.is_empty() {
            return Ok(total);
        }
        Err(TplError::LoadError(format!(
            "{} of {} embedded templates failed: {}",
            failed.len(),
            total,
            failed.join(", ")
        )))
    }

    /// Identities of file-backed templates whose file changed since it was
    /// compiled, skipping changes that already failed to compile.
    pub fn stale(&self) -> Vec<String> {
        self.templates
            .iter()
            .filter_map(|entry| {
                let template = entry.value();
                let Origin::File(path) = &template.origin else {
                    return None;
                };
                let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
                let changed = template.modified != Some(modified) && !self.failed_at(entry.key(), modified);
                changed.then(|| entry.key().clone())
            })
            .collect()
    }

    /// Re-reads and re-compiles a file-backed template if its file changed.
    ///
    /// Returns `Ok(true)` when a new tree was swapped in. On a compile error
    /// the cached tree is kept and the error returned.
    pub fn reload(&self, identity: &str) -> Result<bool> {
        let current = self
            .get(identity)
            .ok_or_else(|| TplError::NotFound(identity.to_string()))?;
        let Origin::File(path) = &current.origin else {
            return Ok(false);
        };

        let modified = fs::metadata(path)?.modified()?;
        if current.modified == Some(modified) || self.failed_at(identity, modified) {
            return Ok(false);
        }

        let start = Instant::now();
        let compiled = Source::from_file(path)
            .map_err(TplError::from)
            .and_then(|source| {
                compile_with(&source, self.config.context_radius).map(|tree| (source, tree))
            });
        let elapsed = start.elapsed().as_millis();

        match compiled {
            Ok((source, tree)) => {
                let template = Arc::new(Template {
                    source,
                    tree: Arc::new(tree),
                    origin: current.origin.clone(),
                    modified: Some(modified),
                });
                self.templates.insert(identity.to_string(), template);
                self.failures.remove(identity);
                info!("Reload: template={}, elapsed={}ms", identity, elapsed);
                Ok(true)
            }
            Err(e) => {
                self.failures.insert(identity.to_string(), modified);
                warn!("Reload: template={}, elapsed={}ms, error={}", identity, elapsed, e);
                Err(e)
            }
        }
    }

    fn failed_at(&self, identity: &str, modified: SystemTime) -> bool {
        self.failures
            .get(identity)
            .is_some_and(|f| *f.value() == modified)
    }

    fn insert(
        &self,
        source: Source,
        origin: Origin,
        modified: Option<SystemTime>,
    ) -> Result<Arc<Template>> {
        let tree = compile_with(&source, self.config.context_radius)?;
        let identity = source.identity().to_string();
        let template = Arc::new(Template {
            source,
            tree: Arc::new(tree),
            origin,
            modified,
        });
        self.templates.insert(identity.clone(), template.clone());
        debug!("Register: template={}, templates={}", identity, self.templates.len());
        Ok(template)
    }
}
