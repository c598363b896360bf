//! The registry: concurrent-safe store of registrations,
//! per-context bound trees, and PMNS-style name traversal.
//!
//! A single [`parking_lot::ReentrantMutex`] guards the whole store, because
//! `register` can recurse into itself through configuration loading
//! — an ordinary `Mutex` would deadlock on that reentry.
//! Name/id maps use an `IndexMap`-with-fixed-hasher idiom so registration
//! order is preserved for `traverse`/`children` without a second parallel
//! `Vec`.

use std::cell::RefCell;

use parking_lot::ReentrantMutex;

use crate::ast::{BoundNode, Descriptor, StaticNode};
use crate::binder;
use crate::collections::IndexMap;
use crate::error::{Error, ErrorKind};
use crate::host::HostContext;
use crate::id::MetricId;
use crate::parser;

/// One registration: the parsed static tree plus its name/id bookkeeping.
struct RegistryEntry {
    name: String,
    id: MetricId,
    anonymous: bool,
    static_root: StaticNode,
}

/// A per-context bound tree, or `None` if binding failed or was disabled
/// for this registration in this context.
type ContextEntries = Vec<Option<BoundNode>>;

/// Opaque handle returned by [`Registry::open_context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

struct Inner {
    entries: Vec<RegistryEntry>,
    by_name: IndexMap<String, usize>,
    by_id: IndexMap<MetricId, usize>,
    contexts: IndexMap<u64, ContextEntries>,
    next_context: u64,
}

impl Inner {
    fn new() -> Self {
        Inner {
            entries: Vec::new(),
            by_name: IndexMap::default(),
            by_id: IndexMap::default(),
            contexts: IndexMap::default(),
            next_context: 1,
        }
    }
}

/// The concurrent-safe registration store.
pub struct Registry {
    inner: ReentrantMutex<RefCell<Inner>>,
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            inner: ReentrantMutex::new(RefCell::new(Inner::new())),
        }
    }

    /// Validate, parse, and register `name = expr`. Reentrant: `expr` may
    /// itself trigger `load_config_stream` while the lock is held by this
    /// same thread.
    pub fn register(&self, name: &str, expr: &str, anonymous: bool) -> Result<MetricId, Error> {
        let _span = crate::logging::op_span("register").entered();
        crate::error::clear_error();
        validate_name(name)?;

        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();

        if inner.by_name.contains_key(name) {
            return Err(Error::at(ErrorKind::DuplicateName, crate::error::Location::point(0))
                .with_registration(name));
        }

        let static_root = parser::parse(expr).map_err(|e| e.with_registration(name))?;

        let item = inner.entries.len() as u32 + 1;
        let id = MetricId::derived(item);
        let index = inner.entries.len();
        inner.entries.push(RegistryEntry {
            name: name.to_string(),
            id,
            anonymous,
            static_root,
        });
        inner.by_name.insert(name.to_string(), index);
        inner.by_id.insert(id, index);
        tracing::debug!(name, %id, "registered derived metric");
        Ok(id)
    }

    /// Shorthand for `register(name, "anon(T)", anonymous=true)`.
    pub fn register_anonymous(&self, name: &str, type_tag: &str) -> Result<MetricId, Error> {
        let expr = format!("anon({type_tag})");
        self.register(name, &expr, true)
    }

    /// Load a `name = expression` configuration stream. Returns the count
    /// of successful registrations; per-line failures are published to the
    /// error channel and do not stop subsequent lines.
    pub fn load_config_stream(&self, text: &str) -> usize {
        let mut succeeded = 0;
        for line in text.lines() {
            match crate::config::parse_config_line(line) {
                crate::config::ConfigLine::Skip => continue,
                crate::config::ConfigLine::MissingEquals => {
                    tracing::warn!(line, "configuration line missing '='");
                    crate::error::set_error(Error::new(ErrorKind::MissingEquals, None));
                    continue;
                }
                crate::config::ConfigLine::Entry { name, expr } => {
                    if validate_name(name).is_err() {
                        tracing::warn!(name, "invalid metric name syntax, skipping line");
                        crate::error::set_error(
                            Error::new(ErrorKind::InvalidNameSyntax, None).with_registration(name),
                        );
                        continue;
                    }
                    match self.register(name, expr, false) {
                        Ok(_) => succeeded += 1,
                        Err(e) => {
                            tracing::warn!(name, error = %e.kind, "registration failed, skipping");
                            crate::error::set_error(e);
                        }
                    }
                }
            }
        }
        succeeded
    }

    /// Load a `:`-separated path specification. Files are fed to
    /// [`Registry::load_config_stream`]; directories are walked recursively,
    /// skipping `.`/`..`. In `tolerant` mode, missing/unreadable paths are
    /// skipped rather than propagated.
    pub fn load_path_spec(&self, path_spec: &str, tolerant: bool) -> Result<usize, Error> {
        let mut total = 0;
        for component in path_spec.split(crate::config::PATH_SEPARATOR) {
            if component.is_empty() {
                continue;
            }
            match self.load_path_component(std::path::Path::new(component), tolerant) {
                Ok(n) => total += n,
                Err(e) => {
                    if tolerant {
                        tracing::warn!(path = component, "skipping unreadable path in tolerant mode");
                    } else {
                        return Err(e);
                    }
                }
            }
        }
        Ok(total)
    }

    fn load_path_component(&self, path: &std::path::Path, tolerant: bool) -> Result<usize, Error> {
        if path.is_dir() {
            let read_dir = std::fs::read_dir(path)
                .map_err(|_| Error::new(ErrorKind::PathNotFound(path.display().to_string()), None))?;
            let mut total = 0;
            for entry in read_dir {
                let Ok(entry) = entry else { continue };
                let name = entry.file_name();
                if name == "." || name == ".." {
                    continue;
                }
                total += self.load_path_component(&entry.path(), tolerant)?;
            }
            Ok(total)
        } else {
            let text = std::fs::read_to_string(path)
                .map_err(|_| Error::new(ErrorKind::PathNotFound(path.display().to_string()), None))?;
            Ok(self.load_config_stream(&text))
        }
    }

    /// Bind every registration under a fresh context.
    pub fn open_context(&self, host: &dyn HostContext) -> ContextId {
        let _span = crate::logging::op_span("open_context").entered();
        crate::error::clear_error();
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();

        let mut bound = Vec::with_capacity(inner.entries.len());
        for entry in &inner.entries {
            let result = binder::bind(entry.id, &entry.name, &entry.static_root, host);
            match result {
                Ok(node) => bound.push(node),
                Err(e) => {
                    tracing::debug!(name = %entry.name, error = %e.kind, "binding failed, disabling for context");
                    crate::error::set_error(e);
                    bound.push(None);
                }
            }
        }
        let id = inner.next_context;
        inner.next_context += 1;
        inner.contexts.insert(id, bound);
        tracing::debug!(context = id, "opened context");
        ContextId(id)
    }

    /// Free a context's bound trees. Static
    /// trees are untouched.
    pub fn close_context(&self, context: ContextId) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.contexts.shift_remove(&context.0);
    }

    pub fn lookup_id(&self, name: &str) -> Option<MetricId> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        inner.by_name.get(name).map(|&i| inner.entries[i].id)
    }

    pub fn lookup_name(&self, id: MetricId) -> Option<String> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        inner.by_id.get(&id).map(|&i| inner.entries[i].name.clone())
    }

    /// `descriptor(context, id)`, returning a typed result rather than a
    /// bare sentinel.
    pub fn describe(&self, context: ContextId, id: MetricId) -> Result<Descriptor, DescribeError> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        let &index = inner.by_id.get(&id).ok_or(DescribeError::NotFound)?;
        let bound = inner.contexts.get(&context.0).ok_or(DescribeError::NotFound)?;
        match bound.get(index) {
            Some(Some(node)) => Ok(node.descriptor.clone()),
            Some(None) => Err(DescribeError::Disabled),
            None => Err(DescribeError::NotFound),
        }
    }

    /// `traverse(context, prefix)`: fully-qualified names
    /// whose dotted path starts at `prefix`, in registration order,
    /// excluding entries disabled in `context`.
    pub fn traverse(&self, context: ContextId, prefix: &str) -> Vec<String> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        let Some(bound) = inner.contexts.get(&context.0) else {
            return Vec::new();
        };
        inner
            .entries
            .iter()
            .enumerate()
            .filter(|(i, e)| is_visible(e, &bound[*i]) && matches_prefix(&e.name, prefix))
            .map(|(_, e)| e.name.clone())
            .collect()
    }

    /// `children(context, prefix)`: unique next dotted path
    /// components past `prefix`, each tagged whether it is itself a leaf
    /// (a fully registered name) or an interior namespace component.
    pub fn children(&self, context: ContextId, prefix: &str) -> Vec<(String, bool)> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        let Some(bound) = inner.contexts.get(&context.0) else {
            return Vec::new();
        };

        let mut seen: IndexMap<String, bool> = IndexMap::default();
        for (i, entry) in inner.entries.iter().enumerate() {
            if !is_visible(entry, &bound[i]) || !matches_prefix(&entry.name, prefix) {
                continue;
            }
            let rest = strip_prefix(&entry.name, prefix);
            if rest.is_empty() {
                // The prefix names a leaf directly; no children to report.
                return Vec::new();
            }
            match rest.find('.') {
                Some(dot) => {
                    seen.entry(rest[..dot].to_string()).or_insert(false);
                }
                None => {
                    seen.insert(rest.to_string(), true);
                }
            }
        }
        seen.into_iter().collect()
    }
}

/// Why [`Registry::describe`] could not produce a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DescribeError {
    #[error("no such derived metric")]
    NotFound,
    #[error("derived metric is disabled in this context")]
    Disabled,
}

fn is_visible(entry: &RegistryEntry, bound: &Option<BoundNode>) -> bool {
    bound.is_some() || entry.anonymous
}

/// Prefix matches only on a dot boundary; the empty prefix matches
/// everything.
fn matches_prefix(name: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    name == prefix || (name.starts_with(prefix) && name.as_bytes().get(prefix.len()) == Some(&b'.'))
}

fn strip_prefix<'a>(name: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() {
        name
    } else if name == prefix {
        ""
    } else {
        &name[prefix.len() + 1..]
    }
}

/// Validate the dotted-identifier grammar:
/// `[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z][A-Za-z0-9_]*)*`.
fn validate_name(name: &str) -> Result<(), Error> {
    let valid = !name.is_empty()
        && name.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::InvalidNameSyntax, None).with_registration(name))
    }
}

/// A single process-wide registry, for callers who don't need an isolated
/// instance (the common case); tests build their own [`Registry::new`]
/// instead.
pub fn global() -> &'static Registry {
    static GLOBAL: once_cell::sync::Lazy<Registry> = once_cell::sync::Lazy::new(Registry::new);
    &GLOBAL
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Semantics, ValueType};
    use crate::host::MapHost;
    use pretty_assertions::assert_eq;

    #[test]
    fn duplicate_name_is_rejected() {
        let reg = Registry::new();
        reg.register("kernel.util", "1 + 1", false).unwrap();
        let err = reg.register("kernel.util", "2 + 2", false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateName);
    }

    #[test]
    fn ids_are_dense_and_derived() {
        let reg = Registry::new();
        let a = reg.register("a", "1", false).unwrap();
        let b = reg.register("b", "2", false).unwrap();
        assert_eq!(a.item(), 1);
        assert_eq!(b.item(), 2);
        assert!(a.is_derived() && b.is_derived());
    }

    #[test]
    fn open_context_binds_every_registration() {
        let reg = Registry::new();
        let id_cpu = MetricId::derived(1000);
        let host = MapHost::new().with_metric(
            "kernel.all.cpu.user",
            id_cpu,
            Descriptor::scalar(ValueType::U64, Semantics::Counter),
        );
        reg.register("half_user", "kernel.all.cpu.user / 2", false).unwrap();
        reg.register("bad", "no.such.metric", false).unwrap();

        let ctx = reg.open_context(&host);
        let names = reg.traverse(ctx, "");
        assert_eq!(names, vec!["half_user".to_string()]);
    }

    #[test]
    fn children_stops_at_exact_leaf_match() {
        let reg = Registry::new();
        let host = MapHost::new();
        reg.register("disk.dev.busy", "1 + 1", false).unwrap();
        reg.register("disk.dev.idle", "1 + 1", false).unwrap();
        reg.register("disk.all.busy", "1 + 1", false).unwrap();
        let ctx = reg.open_context(&host);

        let top = reg.children(ctx, "");
        let mut names: Vec<_> = top.iter().map(|(n, _)| n.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["disk".to_string()]);

        let dev = reg.children(ctx, "disk.dev");
        let mut dev_names: Vec<_> = dev.iter().map(|(n, leaf)| (n.clone(), *leaf)).collect();
        dev_names.sort();
        assert_eq!(
            dev_names,
            vec![("busy".to_string(), true), ("idle".to_string(), true)]
        );

        assert!(reg.children(ctx, "disk.dev.busy").is_empty());
    }

    #[test]
    fn config_stream_counts_successes_and_skips_bad_lines() {
        let reg = Registry::new();
        let text = "# a comment\n\nok.one = 1 + 1\nno_equals_here\nok.two = 2 * 3\n";
        let count = reg.load_config_stream(text);
        assert_eq!(count, 2);
    }
}
