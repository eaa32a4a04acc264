//! The document session: store primitives and tree operations.

use crate::acl::Acp;
use crate::error::{CoreError, CoreResult};
use crate::fulltext::{FulltextJob, FulltextKind, WorkSubmitter, DEFAULT_INDEX};
use crate::id::IdGenerator;
use crate::session::Session;
use crate::types::VersionIncrement;
use chrono::Utc;
use docrepo_state::keys::{
    is_system_key, KEY_ACP, KEY_ANCESTOR_IDS, KEY_BASE_VERSION_ID, KEY_FULLTEXT_BINARY,
    KEY_FULLTEXT_SIMPLE, KEY_ID, KEY_IS_CHECKED_IN, KEY_IS_PROXY, KEY_IS_VERSION,
    KEY_MAJOR_VERSION, KEY_MINOR_VERSION, KEY_NAME, KEY_PARENT_ID, KEY_PRIMARY_TYPE,
    KEY_PROXY_IDS, KEY_PROXY_TARGET_ID, KEY_VERSION_CREATED, KEY_VERSION_LABEL,
    KEY_VERSION_SERIES_ID,
};
use docrepo_state::{State, Value};
use docrepo_storage::{
    ArrayMatches, CountMode, DocumentStore, IgnoredIds, PartialList, Query,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Primary type of the repository root.
pub const TYPE_ROOT: &str = "Root";

/// Primary type of the folder versions are filed under.
pub const TYPE_VERSION_STORAGE: &str = "VersionStorage";

const VERSION_STORAGE_NAME: &str = "versionStorage";

/// Everything a document session needs from its repository.
pub(crate) struct SessionBackend {
    pub(crate) repository: String,
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) fulltext: Option<Arc<dyn WorkSubmitter>>,
    pub(crate) root_id: String,
    pub(crate) version_root_id: String,
    pub(crate) query_deep_copy: bool,
}

impl fmt::Debug for SessionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBackend")
            .field("repository", &self.repository)
            .field("root_id", &self.root_id)
            .field("fulltext", &self.fulltext.is_some())
            .finish()
    }
}

impl SessionBackend {
    /// Creates the root and the version storage folder in an empty store.
    ///
    /// The root gets the default ACL: administrators may do everything,
    /// members may read.
    pub(crate) fn bootstrap(
        repository: impl Into<String>,
        store: Arc<dyn DocumentStore>,
        ids: Arc<dyn IdGenerator>,
        fulltext: Option<Arc<dyn WorkSubmitter>>,
        query_deep_copy: bool,
    ) -> CoreResult<Self> {
        let repository = repository.into();
        let root_id = ids.generate();
        let root = State::with_id(root_id.as_str())
            .with(KEY_NAME, "")
            .with(KEY_PRIMARY_TYPE, TYPE_ROOT)
            .with(KEY_ANCESTOR_IDS, Value::Array(Vec::new()))
            .with(KEY_ACP, Acp::root_default().to_value());
        store.create_state(root)?;

        let version_root_id = ids.generate();
        let version_root = State::with_id(version_root_id.as_str())
            .with(KEY_PARENT_ID, Value::reference(root_id.as_str()))
            .with(KEY_NAME, VERSION_STORAGE_NAME)
            .with(KEY_PRIMARY_TYPE, TYPE_VERSION_STORAGE)
            .with(KEY_ANCESTOR_IDS, Value::references([root_id.as_str()]));
        store.create_state(version_root)?;

        tracing::info!(%repository, %root_id, "repository root created");
        Ok(Self {
            repository,
            store,
            ids,
            fulltext,
            root_id,
            version_root_id,
            query_deep_copy,
        })
    }
}

/// A session working directly against the document store.
///
/// Writes apply to the store immediately. The session only keeps track of
/// documents whose fulltext must be recomputed at the next
/// [`Session::commit`].
///
/// Tree operations that check the store and then write to it run one at a
/// time per session. Two sessions over one store are not serialized
/// against each other.
pub struct DocumentSession {
    session_id: String,
    backend: Arc<SessionBackend>,
    live: AtomicBool,
    // taken before `dirty`, never while holding it
    tree_writes: Mutex<()>,
    dirty: Mutex<BTreeSet<String>>,
}

impl fmt::Debug for DocumentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSession")
            .field("session_id", &self.session_id)
            .field("repository", &self.backend.repository)
            .field("live", &self.is_live())
            .finish()
    }
}

impl DocumentSession {
    pub(crate) fn new(backend: Arc<SessionBackend>, session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        tracing::debug!(repository = %backend.repository, %session_id, "session opened");
        Self {
            session_id,
            backend,
            live: AtomicBool::new(true),
            tree_writes: Mutex::new(()),
            dirty: Mutex::new(BTreeSet::new()),
        }
    }

    fn store(&self) -> CoreResult<&dyn DocumentStore> {
        if self.is_live() {
            Ok(self.backend.store.as_ref())
        } else {
            Err(CoreError::SessionClosed)
        }
    }

    fn require(&self, id: &str) -> CoreResult<Arc<State>> {
        self.store()?
            .read_state(id)?
            .ok_or_else(|| CoreError::not_found(id))
    }

    fn mark_dirty(&self, id: &str) {
        self.dirty.lock().insert(id.to_string());
    }

    fn check_container(&self, parent: &State) -> CoreResult<()> {
        if parent.is_proxy() {
            return Err(CoreError::invalid_operation("a proxy cannot have children"));
        }
        if parent.is_version() || parent.id() == Some(self.backend.version_root_id.as_str()) {
            return Err(CoreError::invalid_operation(
                "versions cannot be modified through the tree",
            ));
        }
        Ok(())
    }

    fn check_name_free(&self, parent_id: &str, name: &str) -> CoreResult<()> {
        if self.store()?.has_child(parent_id, name, &IgnoredIds::new())? {
            return Err(CoreError::name_conflict(parent_id, name));
        }
        Ok(())
    }

    fn check_structural(&self, id: &str, action: &str) -> CoreResult<()> {
        if id == self.backend.root_id || id == self.backend.version_root_id {
            return Err(CoreError::invalid_operation(format!(
                "cannot {action} a repository folder"
            )));
        }
        Ok(())
    }

    fn subtree(&self, id: &str, with_proxy_maps: bool) -> CoreResult<ArrayMatches> {
        Ok(self.store()?.query_key_value_array(
            KEY_ANCESTOR_IDS,
            &Value::reference(id),
            &IgnoredIds::new(),
            with_proxy_maps,
            with_proxy_maps,
        )?)
    }

    /// Adds or removes proxy ids in a target's `proxyIds`.
    fn update_proxy_refs(
        &self,
        target_id: &str,
        add: &BTreeSet<String>,
        remove: &BTreeSet<String>,
    ) -> CoreResult<()> {
        let store = self.store()?;
        let Some(target) = store.read_state(target_id)? else {
            return Ok(());
        };
        let mut proxies: Vec<String> = target
            .proxy_ids()
            .into_iter()
            .filter(|id| !remove.contains(*id))
            .map(str::to_string)
            .collect();
        for id in add {
            if !proxies.contains(id) {
                proxies.push(id.clone());
            }
        }
        let mut target = State::clone(&target);
        if proxies.is_empty() {
            target.remove(KEY_PROXY_IDS);
        } else {
            target.set(KEY_PROXY_IDS, Value::references(proxies));
        }
        store.update_state(target)?;
        Ok(())
    }
}

fn child_ancestors(parent: &State) -> Vec<Value> {
    parent
        .ancestor_ids()
        .into_iter()
        .chain(parent.id())
        .map(Value::reference)
        .collect()
}

fn version_number(state: &State, key: &str) -> i64 {
    state.get(key).and_then(Value::as_long).unwrap_or(0)
}

fn collect_text<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(text) if !text.is_empty() => out.push(text),
        Value::Array(items) => items.iter().for_each(|item| collect_text(item, out)),
        Value::Object(fields) => fields.values().for_each(|item| collect_text(item, out)),
        _ => {}
    }
}

/// Text indexed for a document: its user string properties, in key order.
pub(crate) fn simple_text(state: &State) -> String {
    let mut words = Vec::new();
    for (key, value) in state {
        if is_system_key(key)
            || key.starts_with(KEY_FULLTEXT_SIMPLE)
            || key.starts_with(KEY_FULLTEXT_BINARY)
        {
            continue;
        }
        collect_text(value, &mut words);
    }
    words.join(" ")
}

impl Session for DocumentSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn close(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.dirty.lock().clear();
            tracing::debug!(session_id = %self.session_id, "session closed");
        }
    }

    fn root_id(&self) -> CoreResult<String> {
        self.store()?;
        Ok(self.backend.root_id.clone())
    }

    fn read_state(&self, id: &str) -> CoreResult<Option<Arc<State>>> {
        Ok(self.store()?.read_state(id)?)
    }

    fn read_states(&self, ids: &[String]) -> CoreResult<Vec<Option<Arc<State>>>> {
        Ok(self.store()?.read_states(ids)?)
    }

    fn create_state(&self, state: State) -> CoreResult<()> {
        let id = state.id().map(str::to_string);
        self.store()?.create_state(state)?;
        if let Some(id) = id {
            self.mark_dirty(&id);
        }
        Ok(())
    }

    fn update_state(&self, state: State) -> CoreResult<()> {
        let id = state.id().map(str::to_string);
        self.store()?.update_state(state)?;
        if let Some(id) = id {
            self.mark_dirty(&id);
        }
        Ok(())
    }

    fn delete_state(&self, id: &str) -> CoreResult<()> {
        self.store()?.delete_state(id)?;
        self.dirty.lock().remove(id);
        Ok(())
    }

    fn read_child_state(
        &self,
        parent_id: &str,
        name: &str,
        ignored: &IgnoredIds,
    ) -> CoreResult<Option<Arc<State>>> {
        Ok(self.store()?.read_child_state(parent_id, name, ignored)?)
    }

    fn has_child(&self, parent_id: &str, name: &str, ignored: &IgnoredIds) -> CoreResult<bool> {
        Ok(self.store()?.has_child(parent_id, name, ignored)?)
    }

    fn query_key_value(
        &self,
        key: &str,
        value: &Value,
        ignored: &IgnoredIds,
    ) -> CoreResult<Vec<Arc<State>>> {
        Ok(self.store()?.query_key_value(key, value, ignored)?)
    }

    fn query_key_value_presence(
        &self,
        key: &str,
        value: &Value,
        ignored: &IgnoredIds,
    ) -> CoreResult<bool> {
        Ok(self.store()?.query_key_value_presence(key, value, ignored)?)
    }

    fn query_key_value_array(
        &self,
        key: &str,
        value: &Value,
        ignored: &IgnoredIds,
        want_proxy_targets: bool,
        want_target_proxies: bool,
    ) -> CoreResult<ArrayMatches> {
        Ok(self.store()?.query_key_value_array(
            key,
            value,
            ignored,
            want_proxy_targets,
            want_target_proxies,
        )?)
    }

    fn query_and_fetch(
        &self,
        query: &Query,
        ignored: &IgnoredIds,
    ) -> CoreResult<PartialList<Arc<State>>> {
        Ok(self.store()?.query_and_fetch(query, ignored)?)
    }

    fn query(
        &self,
        predicate: &str,
        order_by: &str,
        limit: usize,
        offset: usize,
        count_up_to: i64,
    ) -> CoreResult<PartialList<Arc<State>>> {
        let store = self.store()?;
        let query = Query::parse(predicate, order_by)?
            .page(limit, offset)
            .count(CountMode::from_count_up_to(count_up_to))
            .deep_copy(self.backend.query_deep_copy);
        Ok(store.query_and_fetch(&query, &IgnoredIds::new())?)
    }

    fn get_children(&self, parent_id: &str) -> CoreResult<Vec<Arc<State>>> {
        let children = self.store()?.query_key_value(
            KEY_PARENT_ID,
            &Value::reference(parent_id),
            &IgnoredIds::new(),
        )?;
        Ok(children
            .into_iter()
            .filter(|child| child.id() != Some(self.backend.version_root_id.as_str()))
            .collect())
    }

    fn exists_child(&self, parent_id: &str, name: &str) -> CoreResult<bool> {
        self.has_child(parent_id, name, &IgnoredIds::new())
    }

    fn add_child(&self, parent_id: &str, name: &str, primary_type: &str) -> CoreResult<Arc<State>> {
        let _tree = self.tree_writes.lock();
        let parent = self.require(parent_id)?;
        self.check_container(&parent)?;
        self.check_name_free(parent_id, name)?;

        let id = self.backend.ids.generate();
        let state = State::with_id(id.as_str())
            .with(KEY_PARENT_ID, Value::reference(parent_id))
            .with(KEY_NAME, name)
            .with(KEY_PRIMARY_TYPE, primary_type)
            .with(KEY_ANCESTOR_IDS, Value::Array(child_ancestors(&parent)));
        self.store()?.create_state(state)?;
        self.mark_dirty(&id);
        tracing::trace!(%id, %parent_id, %name, "child added");
        self.require(&id)
    }

    fn remove(&self, id: &str) -> CoreResult<()> {
        let _tree = self.tree_writes.lock();
        self.check_structural(id, "remove")?;
        let store = self.store()?;
        let doc = self.require(id)?;

        let subtree = self.subtree(id, true)?;
        let mut removed = subtree.ids;
        removed.insert(id.to_string());
        let mut proxy_targets = subtree.proxy_targets;
        let mut target_proxies = subtree.target_proxies;
        if let Some(target) = doc.proxy_target_id() {
            proxy_targets.insert(id.to_string(), target.to_string());
        }
        let own_proxies = doc.proxy_ids();
        if !own_proxies.is_empty() {
            target_proxies.insert(
                id.to_string(),
                own_proxies.into_iter().map(str::to_string).collect(),
            );
        }

        // proxies left behind by a removed target go with it
        let orphaned: BTreeSet<String> = target_proxies
            .values()
            .flatten()
            .filter(|proxy| !removed.contains(*proxy))
            .cloned()
            .collect();

        let mut detach: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (proxy, target) in proxy_targets {
            if !removed.contains(&target) {
                detach.entry(target).or_default().insert(proxy);
            }
        }
        for (target, proxies) in &detach {
            self.update_proxy_refs(target, &BTreeSet::new(), proxies)?;
        }

        let mut dirty = self.dirty.lock();
        for gone in removed.iter().chain(&orphaned) {
            store.delete_state(gone)?;
            dirty.remove(gone);
        }
        tracing::debug!(%id, removed = removed.len(), orphaned = orphaned.len(), "subtree removed");
        Ok(())
    }

    fn move_document(
        &self,
        id: &str,
        dest_parent_id: &str,
        name: Option<&str>,
    ) -> CoreResult<Arc<State>> {
        let _tree = self.tree_writes.lock();
        self.check_structural(id, "move")?;
        let store = self.store()?;
        let doc = self.require(id)?;
        if doc.is_version() {
            return Err(CoreError::invalid_operation("cannot move a version"));
        }
        let dest = self.require(dest_parent_id)?;
        self.check_container(&dest)?;
        if dest_parent_id == id || dest.ancestor_ids().contains(&id) {
            return Err(CoreError::invalid_operation(
                "cannot move a document under itself",
            ));
        }

        let name = name.or(doc.name()).unwrap_or_default().to_string();
        if doc.parent_id() == Some(dest_parent_id) && doc.name() == Some(name.as_str()) {
            return Ok(doc);
        }
        if let Some(existing) = store.read_child_state(dest_parent_id, &name, &IgnoredIds::new())? {
            if existing.id() != Some(id) {
                return Err(CoreError::name_conflict(dest_parent_id, name));
            }
        }

        let ancestors = child_ancestors(&dest);
        let mut moved = State::clone(&doc);
        moved.set(KEY_PARENT_ID, Value::reference(dest_parent_id));
        moved.set(KEY_NAME, name.as_str());
        moved.set(KEY_ANCESTOR_IDS, Value::Array(ancestors.clone()));
        store.update_state(moved)?;

        let prefix: Vec<Value> = ancestors
            .into_iter()
            .chain(std::iter::once(Value::reference(id)))
            .collect();
        for descendant_id in self.subtree(id, false)?.ids {
            let Some(descendant) = store.read_state(&descendant_id)? else {
                continue;
            };
            let old = descendant.ancestor_ids();
            let tail = old
                .iter()
                .position(|ancestor| *ancestor == id)
                .map_or(old.len(), |pos| pos + 1);
            let rewritten: Vec<Value> = prefix
                .iter()
                .cloned()
                .chain(old[tail..].iter().map(|ancestor| Value::reference(*ancestor)))
                .collect();
            let mut updated = State::clone(&descendant);
            updated.set(KEY_ANCESTOR_IDS, Value::Array(rewritten));
            store.update_state(updated)?;
        }
        tracing::trace!(%id, %dest_parent_id, "document moved");
        self.require(id)
    }

    fn copy(&self, id: &str, dest_parent_id: &str, name: Option<&str>) -> CoreResult<Arc<State>> {
        let _tree = self.tree_writes.lock();
        self.check_structural(id, "copy")?;
        let store = self.store()?;
        let source = self.require(id)?;
        if source.is_version() {
            return Err(CoreError::invalid_operation("cannot copy a version"));
        }
        let dest = self.require(dest_parent_id)?;
        self.check_container(&dest)?;
        if dest_parent_id == id || dest.ancestor_ids().contains(&id) {
            return Err(CoreError::invalid_operation(
                "cannot copy a document under itself",
            ));
        }
        let name = name.or(source.name()).unwrap_or_default().to_string();
        self.check_name_free(dest_parent_id, &name)?;

        let mut originals = vec![Arc::clone(&source)];
        for descendant in self.subtree(id, false)?.ids {
            if let Some(state) = store.read_state(&descendant)? {
                originals.push(state);
            }
        }
        let mapping: BTreeMap<String, String> = originals
            .iter()
            .filter_map(|state| state.id())
            .map(|old| (old.to_string(), self.backend.ids.generate()))
            .collect();
        let remap = |old: &str| mapping.get(old).map_or(old, String::as_str).to_string();

        let root_ancestors = child_ancestors(&dest);
        let source_depth = source.ancestor_ids().len();
        let mut new_proxies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for original in &originals {
            let Some(old_id) = original.id() else {
                continue;
            };
            let new_id = remap(old_id);
            let mut copy = State::clone(original);
            copy.set(KEY_ID, new_id.as_str());
            if old_id == id {
                copy.set(KEY_PARENT_ID, Value::reference(dest_parent_id));
                copy.set(KEY_NAME, name.as_str());
                copy.set(KEY_ANCESTOR_IDS, Value::Array(root_ancestors.clone()));
            } else {
                if let Some(parent) = original.parent_id() {
                    copy.set(KEY_PARENT_ID, Value::reference(remap(parent)));
                }
                let ancestors: Vec<Value> = root_ancestors
                    .iter()
                    .cloned()
                    .chain(
                        original
                            .ancestor_ids()
                            .iter()
                            .skip(source_depth)
                            .map(|ancestor| Value::reference(remap(*ancestor))),
                    )
                    .collect();
                copy.set(KEY_ANCESTOR_IDS, Value::Array(ancestors));
            }
            for key in [
                KEY_PROXY_IDS,
                KEY_IS_CHECKED_IN,
                KEY_BASE_VERSION_ID,
                KEY_MAJOR_VERSION,
                KEY_MINOR_VERSION,
                KEY_VERSION_LABEL,
            ] {
                copy.remove(key);
            }
            if let Some(target) = original.proxy_target_id() {
                let target = remap(target);
                copy.set(KEY_PROXY_TARGET_ID, Value::reference(target.as_str()));
                new_proxies.entry(target).or_default().insert(new_id.clone());
            }
            store.create_state(copy)?;
            self.mark_dirty(&new_id);
        }

        for (target, proxies) in &new_proxies {
            self.update_proxy_refs(target, proxies, &BTreeSet::new())?;
        }
        tracing::debug!(%id, %dest_parent_id, copied = originals.len(), "subtree copied");
        self.require(&remap(id))
    }

    fn checkin(&self, id: &str, increment: VersionIncrement) -> CoreResult<Arc<State>> {
        let _tree = self.tree_writes.lock();
        let store = self.store()?;
        let doc = self.require(id)?;
        if doc.is_proxy() || doc.is_version() {
            return Err(CoreError::invalid_operation(
                "only live documents can be checked in",
            ));
        }
        if doc.is_checked_in() {
            return Err(CoreError::invalid_operation("document is already checked in"));
        }

        let (major, minor) = match increment {
            VersionIncrement::Minor => (
                version_number(&doc, KEY_MAJOR_VERSION),
                version_number(&doc, KEY_MINOR_VERSION) + 1,
            ),
            VersionIncrement::Major => (version_number(&doc, KEY_MAJOR_VERSION) + 1, 0),
        };
        let label = format!("{major}.{minor}");
        let version_root = self.require(&self.backend.version_root_id)?;
        let version_id = self.backend.ids.generate();

        let mut version = State::clone(&doc);
        for key in [KEY_PROXY_IDS, KEY_IS_CHECKED_IN, KEY_BASE_VERSION_ID] {
            version.remove(key);
        }
        version.set(KEY_ID, version_id.as_str());
        version.set(KEY_PARENT_ID, Value::reference(self.backend.version_root_id.as_str()));
        version.set(KEY_NAME, version_id.as_str());
        version.set(KEY_ANCESTOR_IDS, Value::Array(child_ancestors(&version_root)));
        version.set(KEY_IS_VERSION, true);
        version.set(KEY_VERSION_SERIES_ID, Value::reference(id));
        version.set(KEY_MAJOR_VERSION, major);
        version.set(KEY_MINOR_VERSION, minor);
        version.set(KEY_VERSION_LABEL, label.as_str());
        version.set(KEY_VERSION_CREATED, Utc::now());
        store.create_state(version)?;
        self.mark_dirty(&version_id);

        let mut live = State::clone(&doc);
        live.set(KEY_IS_CHECKED_IN, true);
        live.set(KEY_BASE_VERSION_ID, Value::reference(version_id.as_str()));
        live.set(KEY_MAJOR_VERSION, major);
        live.set(KEY_MINOR_VERSION, minor);
        live.set(KEY_VERSION_LABEL, label.as_str());
        store.update_state(live)?;

        tracing::debug!(%id, %version_id, %label, "checked in");
        self.require(&version_id)
    }

    fn checkout(&self, id: &str) -> CoreResult<()> {
        let _tree = self.tree_writes.lock();
        let doc = self.require(id)?;
        if !doc.is_checked_in() {
            return Err(CoreError::invalid_operation("document is not checked in"));
        }
        let mut live = State::clone(&doc);
        live.remove(KEY_IS_CHECKED_IN);
        self.store()?.update_state(live)?;
        Ok(())
    }

    fn get_versions(&self, id: &str) -> CoreResult<Vec<Arc<State>>> {
        let mut versions = self.store()?.query_key_value(
            KEY_VERSION_SERIES_ID,
            &Value::reference(id),
            &IgnoredIds::new(),
        )?;
        versions.sort_by_key(|version| {
            (
                version_number(version, KEY_MAJOR_VERSION),
                version_number(version, KEY_MINOR_VERSION),
            )
        });
        Ok(versions)
    }

    fn get_proxies(&self, target_id: &str, parent_id: Option<&str>) -> CoreResult<Vec<Arc<State>>> {
        let target = self.require(target_id)?;
        let ids: Vec<String> = target.proxy_ids().into_iter().map(str::to_string).collect();
        Ok(self
            .store()?
            .read_states(&ids)?
            .into_iter()
            .flatten()
            .filter(|proxy| parent_id.map_or(true, |parent| proxy.parent_id() == Some(parent)))
            .collect())
    }

    fn add_proxy(&self, target_id: &str, parent_id: &str, name: &str) -> CoreResult<Arc<State>> {
        let _tree = self.tree_writes.lock();
        let target = self.require(target_id)?;
        if target.is_proxy() {
            return Err(CoreError::invalid_operation("cannot create a proxy to a proxy"));
        }
        let parent = self.require(parent_id)?;
        self.check_container(&parent)?;
        self.check_name_free(parent_id, name)?;

        let id = self.backend.ids.generate();
        let mut proxy = State::with_id(id.as_str())
            .with(KEY_PARENT_ID, Value::reference(parent_id))
            .with(KEY_NAME, name)
            .with(KEY_ANCESTOR_IDS, Value::Array(child_ancestors(&parent)))
            .with(KEY_IS_PROXY, true)
            .with(KEY_PROXY_TARGET_ID, Value::reference(target_id));
        if let Some(primary_type) = target.primary_type() {
            proxy.set(KEY_PRIMARY_TYPE, primary_type);
        }
        self.store()?.create_state(proxy)?;
        self.update_proxy_refs(target_id, &BTreeSet::from([id.clone()]), &BTreeSet::new())?;
        tracing::trace!(%id, %target_id, "proxy added");
        self.require(&id)
    }

    fn set_acp(&self, id: &str, acp: &Acp, overwrite: bool) -> CoreResult<()> {
        let _tree = self.tree_writes.lock();
        let doc = self.require(id)?;
        let merged = if overwrite {
            acp.clone()
        } else {
            let mut existing = match doc.get(KEY_ACP) {
                Some(value) => Acp::from_value(value)?,
                None => Acp::new(),
            };
            existing.merge(acp);
            existing
        };
        let mut updated = State::clone(&doc);
        if merged.is_empty() {
            updated.remove(KEY_ACP);
        } else {
            updated.set(KEY_ACP, merged.to_value());
        }
        self.store()?.update_state(updated)?;
        Ok(())
    }

    fn get_acp(&self, id: &str) -> CoreResult<Acp> {
        match self.require(id)?.get(KEY_ACP) {
            Some(value) => Acp::from_value(value),
            None => Ok(Acp::new()),
        }
    }

    fn commit(&self) -> CoreResult<()> {
        let store = self.store()?;
        let dirty = std::mem::take(&mut *self.dirty.lock());
        let Some(fulltext) = &self.backend.fulltext else {
            return Ok(());
        };
        let mut scheduled = 0usize;
        for id in dirty {
            let Some(state) = store.read_state(&id)? else {
                continue;
            };
            if state.is_proxy() {
                continue;
            }
            let job = FulltextJob::document(self.backend.repository.as_str(), id, FulltextKind::Simple)
                .with_text(DEFAULT_INDEX, simple_text(&state));
            fulltext.submit(job)?;
            scheduled += 1;
        }
        tracing::trace!(session_id = %self.session_id, scheduled, "session committed");
        Ok(())
    }

    fn save(&self) -> CoreResult<()> {
        self.commit()
    }

    fn wait_for_indexing(&self, timeout: Duration) -> CoreResult<bool> {
        self.store()?;
        match &self.backend.fulltext {
            Some(fulltext) => fulltext.wait_idle(timeout),
            None => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::{Ace, Acl, LOCAL_ACL, READ};
    use crate::fulltext::FulltextQueue;
    use crate::id::SequentialIdGenerator;
    use docrepo_storage::{InMemoryStore, StorageError};

    struct Fixture {
        store: Arc<InMemoryStore>,
        session: DocumentSession,
        root: String,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let backend = SessionBackend::bootstrap(
            "test",
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            Arc::new(SequentialIdGenerator::new()),
            None,
            true,
        )
        .unwrap();
        let root = backend.root_id.clone();
        Fixture {
            store,
            session: DocumentSession::new(Arc::new(backend), "s1"),
            root,
        }
    }

    fn id_of(state: &State) -> String {
        state.id().unwrap().to_string()
    }

    #[test]
    fn bootstrap_creates_single_parentless_root() {
        let f = fixture();
        assert_eq!(f.root, "UUID_0");
        let root = f.session.read_state(&f.root).unwrap().unwrap();
        assert_eq!(root.primary_type(), Some(TYPE_ROOT));
        assert_eq!(root.name(), Some(""));
        assert!(root.parent_id().is_none());
        assert!(!f.session.get_acp(&f.root).unwrap().is_empty());

        let page = f.session.query("parentId IS NULL", "", 0, 0, -1).unwrap();
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn version_storage_is_hidden_from_children() {
        let f = fixture();
        assert!(f.session.get_children(&f.root).unwrap().is_empty());
        f.session.add_child(&f.root, "a", "Folder").unwrap();
        assert_eq!(f.session.get_children(&f.root).unwrap().len(), 1);
    }

    #[test]
    fn add_child_sets_structure() {
        let f = fixture();
        let folder = f.session.add_child(&f.root, "folder", "Folder").unwrap();
        let doc = f.session.add_child(&id_of(&folder), "doc", "File").unwrap();
        assert_eq!(doc.parent_id(), folder.id());
        assert_eq!(doc.ancestor_ids(), vec![f.root.as_str(), folder.id().unwrap()]);
        assert!(f.session.exists_child(&id_of(&folder), "doc").unwrap());
        assert!(!f.session.exists_child(&id_of(&folder), "other").unwrap());
    }

    #[test]
    fn add_child_rejects_duplicates_and_missing_parent() {
        let f = fixture();
        f.session.add_child(&f.root, "a", "Folder").unwrap();
        assert_eq!(
            f.session.add_child(&f.root, "a", "Folder").unwrap_err(),
            CoreError::name_conflict(f.root.as_str(), "a")
        );
        assert!(f.session.add_child("missing", "a", "Folder").unwrap_err().is_not_found());
    }

    #[test]
    fn concurrent_same_name_children_yield_one() {
        let f = fixture();
        let results: Vec<CoreResult<Arc<State>>> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| f.session.add_child(&f.root, "race", "File")))
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(*err, CoreError::name_conflict(f.root.as_str(), "race"));
        }
        assert_eq!(f.session.get_children(&f.root).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_proxies_and_copies_keep_names_unique() {
        let f = fixture();
        let doc = f.session.add_child(&f.root, "doc", "File").unwrap();
        let folder = f.session.add_child(&f.root, "folder", "Folder").unwrap();
        let (doc, folder) = (id_of(&doc), id_of(&folder));
        std::thread::scope(|scope| {
            for n in 0..8 {
                let (f, doc, folder) = (&f, &doc, &folder);
                scope.spawn(move || {
                    // either may win the name; the loser sees a conflict
                    let _ = if n % 2 == 0 {
                        f.session.add_proxy(doc, folder, "same").map(|_| ())
                    } else {
                        f.session.copy(doc, folder, Some("same")).map(|_| ())
                    };
                });
            }
        });
        assert_eq!(f.session.get_children(&folder).unwrap().len(), 1);
    }

    #[test]
    fn store_errors_surface_unchanged() {
        let f = fixture();
        let err = f.session.create_state(State::with_id(f.root.as_str())).unwrap_err();
        assert_eq!(err, CoreError::Storage(StorageError::already_exists(f.root.as_str())));
        let err = f.session.delete_state("missing").unwrap_err();
        assert_eq!(err, CoreError::Storage(StorageError::not_found("missing")));
        let err = f.session.query("size >", "", 0, 0, -1).unwrap_err();
        assert!(matches!(err, CoreError::Storage(StorageError::InvalidExpression { .. })));
    }

    #[test]
    fn remove_takes_subtree() {
        let f = fixture();
        let a = f.session.add_child(&f.root, "a", "Folder").unwrap();
        let b = f.session.add_child(&id_of(&a), "b", "Folder").unwrap();
        let c = f.session.add_child(&id_of(&b), "c", "File").unwrap();
        let keep = f.session.add_child(&f.root, "keep", "File").unwrap();

        f.session.remove(&id_of(&a)).unwrap();
        for gone in [&a, &b, &c] {
            assert!(f.session.read_state(&id_of(gone)).unwrap().is_none());
        }
        assert!(f.session.read_state(&id_of(&keep)).unwrap().is_some());
        assert!(f.session.remove(&id_of(&a)).unwrap_err().is_not_found());
    }

    #[test]
    fn remove_root_is_refused() {
        let f = fixture();
        assert!(matches!(
            f.session.remove(&f.root),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn remove_fixes_proxy_references() {
        let f = fixture();
        let target = f.session.add_child(&f.root, "target", "File").unwrap();
        let section = f.session.add_child(&f.root, "section", "Folder").unwrap();
        let p1 = f.session.add_proxy(&id_of(&target), &id_of(&section), "p1").unwrap();
        let p2 = f.session.add_proxy(&id_of(&target), &f.root, "p2").unwrap();

        // removing the section removes p1 and detaches it from the target
        f.session.remove(&id_of(&section)).unwrap();
        let target_now = f.session.read_state(&id_of(&target)).unwrap().unwrap();
        assert_eq!(target_now.proxy_ids(), vec![p2.id().unwrap()]);
        assert!(f.session.read_state(&id_of(&p1)).unwrap().is_none());

        // removing the target removes its remaining proxy
        f.session.remove(&id_of(&target)).unwrap();
        assert!(f.session.read_state(&id_of(&p2)).unwrap().is_none());
    }

    #[test]
    fn move_rewrites_ancestors() {
        let f = fixture();
        let a = f.session.add_child(&f.root, "a", "Folder").unwrap();
        let b = f.session.add_child(&f.root, "b", "Folder").unwrap();
        let child = f.session.add_child(&id_of(&a), "child", "Folder").unwrap();
        let leaf = f.session.add_child(&id_of(&child), "leaf", "File").unwrap();

        let moved = f
            .session
            .move_document(&id_of(&child), &id_of(&b), Some("renamed"))
            .unwrap();
        assert_eq!(moved.parent_id(), b.id());
        assert_eq!(moved.name(), Some("renamed"));
        let leaf = f.session.read_state(&id_of(&leaf)).unwrap().unwrap();
        assert_eq!(
            leaf.ancestor_ids(),
            vec![f.root.as_str(), b.id().unwrap(), child.id().unwrap()]
        );
        assert!(!f.session.exists_child(&id_of(&a), "child").unwrap());
    }

    #[test]
    fn move_refuses_cycles_and_duplicates() {
        let f = fixture();
        let a = f.session.add_child(&f.root, "a", "Folder").unwrap();
        let inner = f.session.add_child(&id_of(&a), "inner", "Folder").unwrap();
        f.session.add_child(&f.root, "taken", "File").unwrap();

        assert!(matches!(
            f.session.move_document(&id_of(&a), &id_of(&inner), None),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(matches!(
            f.session.move_document(&id_of(&inner), &f.root, Some("taken")),
            Err(CoreError::NameConflict { .. })
        ));
        // same place, same name: nothing to do
        let same = f.session.move_document(&id_of(&a), &f.root, None).unwrap();
        assert_eq!(same.id(), a.id());
    }

    #[test]
    fn copy_gives_fresh_ids_and_registers_proxies() {
        let f = fixture();
        let folder = f.session.add_child(&f.root, "folder", "Folder").unwrap();
        let doc = f.session.add_child(&id_of(&folder), "doc", "File").unwrap();
        let mut titled = State::clone(&doc);
        titled.set("title", "Hello");
        f.session.update_state(titled).unwrap();
        let outside = f.session.add_child(&f.root, "outside", "File").unwrap();
        f.session.add_proxy(&id_of(&doc), &id_of(&folder), "inner-proxy").unwrap();
        f.session.add_proxy(&id_of(&outside), &id_of(&folder), "outer-proxy").unwrap();

        let copy = f.session.copy(&id_of(&folder), &f.root, Some("copy")).unwrap();
        assert_ne!(copy.id(), folder.id());
        let children = f.session.get_children(&id_of(&copy)).unwrap();
        assert_eq!(children.len(), 3);

        let doc_copy = f
            .session
            .read_child_state(&id_of(&copy), "doc", &IgnoredIds::new())
            .unwrap()
            .unwrap();
        assert_ne!(doc_copy.id(), doc.id());
        assert_eq!(doc_copy.get("title"), Some(&Value::from("Hello")));
        assert_eq!(doc_copy.ancestor_ids(), vec![f.root.as_str(), copy.id().unwrap()]);

        // inner proxy now points at the copied document
        let inner = f
            .session
            .read_child_state(&id_of(&copy), "inner-proxy", &IgnoredIds::new())
            .unwrap()
            .unwrap();
        assert_eq!(inner.proxy_target_id(), doc_copy.id());
        let doc_copy = f.session.read_state(&id_of(&doc_copy)).unwrap().unwrap();
        assert_eq!(doc_copy.proxy_ids(), vec![inner.id().unwrap()]);

        // outer proxy copy still points at the outside target, which knows it
        let outer = f
            .session
            .read_child_state(&id_of(&copy), "outer-proxy", &IgnoredIds::new())
            .unwrap()
            .unwrap();
        assert_eq!(outer.proxy_target_id(), outside.id());
        let outside = f.session.read_state(&id_of(&outside)).unwrap().unwrap();
        assert_eq!(outside.proxy_ids().len(), 2);
        assert!(outside.proxy_ids().contains(&outer.id().unwrap()));
    }

    #[test]
    fn copy_under_itself_is_refused() {
        let f = fixture();
        let a = f.session.add_child(&f.root, "a", "Folder").unwrap();
        assert!(matches!(
            f.session.copy(&id_of(&a), &id_of(&a), Some("again")),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn checkin_and_checkout_cycle() {
        let f = fixture();
        let doc = f.session.add_child(&f.root, "doc", "File").unwrap();
        let id = id_of(&doc);

        let v1 = f.session.checkin(&id, VersionIncrement::Minor).unwrap();
        assert!(v1.is_version());
        assert_eq!(v1.get(KEY_VERSION_LABEL), Some(&Value::from("0.1")));
        assert!(f.session.checkin(&id, VersionIncrement::Minor).is_err());

        let live = f.session.read_state(&id).unwrap().unwrap();
        assert!(live.is_checked_in());
        assert_eq!(
            live.get(KEY_BASE_VERSION_ID).and_then(Value::as_reference),
            v1.id()
        );

        f.session.checkout(&id).unwrap();
        assert!(f.session.checkout(&id).is_err());
        let v2 = f.session.checkin(&id, VersionIncrement::Major).unwrap();
        assert_eq!(v2.get(KEY_VERSION_LABEL), Some(&Value::from("1.0")));

        let versions = f.session.get_versions(&id).unwrap();
        let labels: Vec<&str> = versions
            .iter()
            .filter_map(|v| v.get(KEY_VERSION_LABEL).and_then(Value::as_str))
            .collect();
        assert_eq!(labels, vec!["0.1", "1.0"]);
        assert_eq!(f.session.get_children(&f.root).unwrap().len(), 1);
    }

    #[test]
    fn versions_are_not_tree_containers() {
        let f = fixture();
        let doc = f.session.add_child(&f.root, "doc", "File").unwrap();
        let version = f.session.checkin(&id_of(&doc), VersionIncrement::Minor).unwrap();
        assert!(f.session.add_child(&id_of(&version), "x", "File").is_err());
        assert!(f.session.move_document(&id_of(&version), &f.root, None).is_err());
    }

    #[test]
    fn proxies_filter_by_parent() {
        let f = fixture();
        let target = f.session.add_child(&f.root, "target", "File").unwrap();
        let s1 = f.session.add_child(&f.root, "s1", "Folder").unwrap();
        let s2 = f.session.add_child(&f.root, "s2", "Folder").unwrap();
        f.session.add_proxy(&id_of(&target), &id_of(&s1), "p").unwrap();
        f.session.add_proxy(&id_of(&target), &id_of(&s2), "p").unwrap();

        assert_eq!(f.session.get_proxies(&id_of(&target), None).unwrap().len(), 2);
        let in_s1 = f.session.get_proxies(&id_of(&target), Some(&id_of(&s1))).unwrap();
        assert_eq!(in_s1.len(), 1);
        assert_eq!(in_s1[0].primary_type(), Some("File"));

        let proxy = id_of(&in_s1[0]);
        assert!(f.session.add_proxy(&proxy, &f.root, "pp").is_err());
    }

    #[test]
    fn acp_merge_and_overwrite() {
        let f = fixture();
        let doc = f.session.add_child(&f.root, "doc", "File").unwrap();
        let id = id_of(&doc);
        assert!(f.session.get_acp(&id).unwrap().is_empty());

        let mut acp = Acp::new();
        acp.add_acl(Acl::new(LOCAL_ACL).with(Ace::grant("alice", READ)));
        f.session.set_acp(&id, &acp, false).unwrap();
        let mut extra = Acp::new();
        extra.add_acl(Acl::new("workflow").with(Ace::grant("bob", READ)));
        f.session.set_acp(&id, &extra, false).unwrap();
        assert_eq!(f.session.get_acp(&id).unwrap().acls().len(), 2);

        f.session.set_acp(&id, &Acp::new(), true).unwrap();
        assert!(f.session.get_acp(&id).unwrap().is_empty());
    }

    #[test]
    fn query_pages_and_copies() {
        let f = fixture();
        for i in 0..10i64 {
            let doc = f.session.add_child(&f.root, &format!("d{i}"), "File").unwrap();
            let mut doc = State::clone(&doc);
            doc.set("rank", i);
            f.session.update_state(doc).unwrap();
        }
        let page = f
            .session
            .query("primaryType = 'File'", "rank DESC", 3, 2, 5)
            .unwrap();
        let ranks: Vec<i64> = page
            .items
            .iter()
            .filter_map(|s| s.get("rank").and_then(Value::as_long))
            .collect();
        assert_eq!(ranks, vec![7, 6, 5]);
        assert_eq!(page.total_size.as_i64(), -2);

        let stored = f.store.read_state(page.items[0].id().unwrap()).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&stored, &page.items[0]));
    }

    #[test]
    fn closed_session_refuses_work() {
        let f = fixture();
        f.session.close();
        f.session.close();
        assert!(!f.session.is_live());
        assert_eq!(f.session.root_id(), Err(CoreError::SessionClosed));
        assert_eq!(f.session.read_state("x"), Err(CoreError::SessionClosed));
    }

    #[test]
    fn simple_text_skips_system_fields() {
        let state = State::with_id("a")
            .with(KEY_NAME, "ignored")
            .with("title", "Hello")
            .with("tags", Value::from(vec!["red", "blue"]))
            .with("fulltextSimple_title", "stale")
            .with("size", 3i64);
        assert_eq!(simple_text(&state), "red blue Hello");
    }

    #[test]
    fn commit_schedules_fulltext() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(
            FulltextQueue::start("test", Arc::clone(&store) as Arc<dyn DocumentStore>, 8).unwrap(),
        );
        let backend = SessionBackend::bootstrap(
            "test",
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            Arc::new(SequentialIdGenerator::new()),
            Some(Arc::clone(&queue) as Arc<dyn WorkSubmitter>),
            true,
        )
        .unwrap();
        let root = backend.root_id.clone();
        let session = DocumentSession::new(Arc::new(backend), "s");

        let doc = session.add_child(&root, "doc", "File").unwrap();
        let mut doc = State::clone(&doc);
        doc.set("title", "quarterly report");
        session.update_state(doc.clone()).unwrap();
        session.add_proxy(doc.id().unwrap(), &root, "proxy").unwrap();

        session.save().unwrap();
        assert!(session.wait_for_indexing(Duration::from_secs(5)).unwrap());

        let indexed = session.read_state(doc.id().unwrap()).unwrap().unwrap();
        assert_eq!(
            indexed.get(KEY_FULLTEXT_SIMPLE),
            Some(&Value::from("quarterly report"))
        );
        let proxy = session.read_child_state(&root, "proxy", &IgnoredIds::new()).unwrap().unwrap();
        assert!(proxy.get(KEY_FULLTEXT_SIMPLE).is_none());
        queue.shutdown();
    }
}
