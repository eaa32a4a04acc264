//! Revocable session handles.

use crate::acl::Acp;
use crate::error::{CoreError, CoreResult};
use crate::interrupt;
use crate::session::Session;
use crate::transaction::TransactionContext;
use crate::types::VersionIncrement;
use docrepo_state::{State, Value};
use docrepo_storage::{ArrayMatches, IgnoredIds, PartialList, Query};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A handle onto the document session shared by one transaction.
///
/// Every operation except [`Session::session_id`], [`Session::close`] and
/// [`Session::is_live`] fails with `ClosedHandle` once the handle is closed,
/// and otherwise forwards to the shared session, returning its result
/// unchanged. When the forwarded call fails with `Interrupted` the calling
/// thread's interruption flag is set again before the error is returned.
///
/// Handles are closed explicitly, on drop, or by the transaction when it
/// completes.
pub struct SessionHandle {
    session_id: String,
    key: u64,
    closed: Arc<AtomicBool>,
    context: Arc<TransactionContext>,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .field("transaction", &self.context.transaction_id())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl SessionHandle {
    pub(crate) fn new(
        context: Arc<TransactionContext>,
        session_id: String,
        key: u64,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            session_id,
            key,
            closed,
            context,
        }
    }

    fn forward<T>(&self, call: impl FnOnce(&dyn Session) -> CoreResult<T>) -> CoreResult<T> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CoreError::closed_handle(self.session_id.as_str()));
        }
        match call(self.context.base_session()) {
            // completion closed the base after the flag check
            Err(CoreError::SessionClosed) => {
                Err(CoreError::closed_handle(self.session_id.as_str()))
            }
            Err(CoreError::Interrupted) => {
                interrupt::interrupt_current();
                Err(CoreError::Interrupted)
            }
            result => result,
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl Session for SessionHandle {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn is_live(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.context.base_session().is_live()
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.context.remove_handle(self.key);
        }
    }

    fn root_id(&self) -> CoreResult<String> {
        self.forward(|s| s.root_id())
    }

    fn read_state(&self, id: &str) -> CoreResult<Option<Arc<State>>> {
        self.forward(|s| s.read_state(id))
    }

    fn read_states(&self, ids: &[String]) -> CoreResult<Vec<Option<Arc<State>>>> {
        self.forward(|s| s.read_states(ids))
    }

    fn create_state(&self, state: State) -> CoreResult<()> {
        self.forward(|s| s.create_state(state))
    }

    fn update_state(&self, state: State) -> CoreResult<()> {
        self.forward(|s| s.update_state(state))
    }

    fn delete_state(&self, id: &str) -> CoreResult<()> {
        self.forward(|s| s.delete_state(id))
    }

    fn read_child_state(
        &self,
        parent_id: &str,
        name: &str,
        ignored: &IgnoredIds,
    ) -> CoreResult<Option<Arc<State>>> {
        self.forward(|s| s.read_child_state(parent_id, name, ignored))
    }

    fn has_child(&self, parent_id: &str, name: &str, ignored: &IgnoredIds) -> CoreResult<bool> {
        self.forward(|s| s.has_child(parent_id, name, ignored))
    }

    fn query_key_value(
        &self,
        key: &str,
        value: &Value,
        ignored: &IgnoredIds,
    ) -> CoreResult<Vec<Arc<State>>> {
        self.forward(|s| s.query_key_value(key, value, ignored))
    }

    fn query_key_value_presence(
        &self,
        key: &str,
        value: &Value,
        ignored: &IgnoredIds,
    ) -> CoreResult<bool> {
        self.forward(|s| s.query_key_value_presence(key, value, ignored))
    }

    fn query_key_value_array(
        &self,
        key: &str,
        value: &Value,
        ignored: &IgnoredIds,
        want_proxy_targets: bool,
        want_target_proxies: bool,
    ) -> CoreResult<ArrayMatches> {
        self.forward(|s| {
            s.query_key_value_array(key, value, ignored, want_proxy_targets, want_target_proxies)
        })
    }

    fn query_and_fetch(
        &self,
        query: &Query,
        ignored: &IgnoredIds,
    ) -> CoreResult<PartialList<Arc<State>>> {
        self.forward(|s| s.query_and_fetch(query, ignored))
    }

    fn query(
        &self,
        predicate: &str,
        order_by: &str,
        limit: usize,
        offset: usize,
        count_up_to: i64,
    ) -> CoreResult<PartialList<Arc<State>>> {
        self.forward(|s| s.query(predicate, order_by, limit, offset, count_up_to))
    }

    fn get_children(&self, parent_id: &str) -> CoreResult<Vec<Arc<State>>> {
        self.forward(|s| s.get_children(parent_id))
    }

    fn exists_child(&self, parent_id: &str, name: &str) -> CoreResult<bool> {
        self.forward(|s| s.exists_child(parent_id, name))
    }

    fn add_child(&self, parent_id: &str, name: &str, primary_type: &str) -> CoreResult<Arc<State>> {
        self.forward(|s| s.add_child(parent_id, name, primary_type))
    }

    fn remove(&self, id: &str) -> CoreResult<()> {
        self.forward(|s| s.remove(id))
    }

    fn move_document(
        &self,
        id: &str,
        dest_parent_id: &str,
        name: Option<&str>,
    ) -> CoreResult<Arc<State>> {
        self.forward(|s| s.move_document(id, dest_parent_id, name))
    }

    fn copy(&self, id: &str, dest_parent_id: &str, name: Option<&str>) -> CoreResult<Arc<State>> {
        self.forward(|s| s.copy(id, dest_parent_id, name))
    }

    fn checkin(&self, id: &str, increment: VersionIncrement) -> CoreResult<Arc<State>> {
        self.forward(|s| s.checkin(id, increment))
    }

    fn checkout(&self, id: &str) -> CoreResult<()> {
        self.forward(|s| s.checkout(id))
    }

    fn get_versions(&self, id: &str) -> CoreResult<Vec<Arc<State>>> {
        self.forward(|s| s.get_versions(id))
    }

    fn get_proxies(&self, target_id: &str, parent_id: Option<&str>) -> CoreResult<Vec<Arc<State>>> {
        self.forward(|s| s.get_proxies(target_id, parent_id))
    }

    fn add_proxy(&self, target_id: &str, parent_id: &str, name: &str) -> CoreResult<Arc<State>> {
        self.forward(|s| s.add_proxy(target_id, parent_id, name))
    }

    fn set_acp(&self, id: &str, acp: &Acp, overwrite: bool) -> CoreResult<()> {
        self.forward(|s| s.set_acp(id, acp, overwrite))
    }

    fn get_acp(&self, id: &str) -> CoreResult<Acp> {
        self.forward(|s| s.get_acp(id))
    }

    fn commit(&self) -> CoreResult<()> {
        self.forward(|s| s.commit())
    }

    fn save(&self) -> CoreResult<()> {
        self.forward(|s| s.save())
    }

    fn wait_for_indexing(&self, timeout: Duration) -> CoreResult<bool> {
        self.forward(|s| s.wait_for_indexing(timeout))
    }
}
