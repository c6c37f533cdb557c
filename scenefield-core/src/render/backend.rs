//! Rendering backends.
//!
//! The field engine never talks to a graphics API directly. Display lists
//! go through a [`RenderBackend`], and nodes draw through a
//! [`NodeRenderer`] installed on them.

use std::collections::HashMap;

use thiserror::Error;

use crate::error::Result;
use crate::graph::{FieldGraph, NodeId};

/// Handle of a compiled command list owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListHandle(pub u32);

/// Failure reported by a backend. Display lists absorb these and fall back
/// to uncached rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("no list handles available")]
    Exhausted,

    #[error("unknown list {0:?}")]
    UnknownList(ListHandle),

    #[error("list {0:?} opened while another list is being compiled")]
    NestedList(ListHandle),

    #[error("list {0:?} is not being compiled")]
    NotCompiling(ListHandle),

    #[error("backend failure: {0}")]
    Failed(String),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Display-list style command recording, modelled on OpenGL's
/// `glGenLists`/`glNewList`/`glCallList`.
pub trait RenderBackend {
    fn gen_list(&mut self) -> BackendResult<ListHandle>;

    /// Start compiling into `list`. Commands emitted until
    /// [`RenderBackend::end_list`] are recorded, not executed.
    fn begin_list(&mut self, list: ListHandle) -> BackendResult<()>;

    fn end_list(&mut self, list: ListHandle) -> BackendResult<()>;

    /// Execute a compiled list, or record the call if compiling.
    fn call_list(&mut self, list: ListHandle) -> BackendResult<()>;

    fn delete_list(&mut self, list: ListHandle) -> BackendResult<()>;

    /// Issue one drawing command.
    fn emit(&mut self, command: &str);
}

/// The render hook of a node. Display lists call it when they compile or
/// when they render uncached.
pub trait NodeRenderer: 'static {
    fn render(
        &mut self,
        graph: &mut FieldGraph,
        node: NodeId,
        backend: &mut dyn RenderBackend,
    ) -> Result<()>;
}

impl<F> NodeRenderer for F
where
    F: FnMut(&mut FieldGraph, NodeId, &mut dyn RenderBackend) -> Result<()> + 'static,
{
    fn render(
        &mut self,
        graph: &mut FieldGraph,
        node: NodeId,
        backend: &mut dyn RenderBackend,
    ) -> Result<()> {
        self(graph, node, backend)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Draw(String),
    Call(ListHandle),
}

/// Counters kept by [`RecordingBackend`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub lists_generated: u64,
    pub lists_compiled: u64,
    pub lists_called: u64,
    pub lists_deleted: u64,
    /// Commands executed outside any list.
    pub immediate_commands: u64,
}

/// In-memory backend that records what would have been drawn.
///
/// Executed commands, including those replayed from lists, are appended to
/// [`RecordingBackend::output`]. Failures can be injected to exercise the
/// fallback paths of display lists.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    next_handle: u32,
    lists: HashMap<ListHandle, Vec<Command>>,
    compiling: Option<(ListHandle, Vec<Command>)>,
    output: Vec<String>,
    stats: BackendStats,
    fail_gen: bool,
    fail_end: bool,
    fail_call: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> BackendStats {
        self.stats
    }

    /// Commands executed so far.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn clear_output(&mut self) {
        self.output.clear();
    }

    /// Number of lists currently allocated.
    pub fn live_lists(&self) -> usize {
        self.lists.len()
    }

    pub fn fail_next_gen(&mut self) {
        self.fail_gen = true;
    }

    /// Make the next `end_list` fail, discarding the compiled commands.
    pub fn fail_next_compile(&mut self) {
        self.fail_end = true;
    }

    pub fn fail_next_call(&mut self) {
        self.fail_call = true;
    }

    fn execute(&mut self, list: ListHandle, depth: usize) -> BackendResult<()> {
        // A list calling itself, directly or not, would never finish.
        if depth > 64 {
            return Err(BackendError::Failed(format!("list {list:?} nests too deep")));
        }
        let commands = self
            .lists
            .get(&list)
            .cloned()
            .ok_or(BackendError::UnknownList(list))?;
        for command in commands {
            match command {
                Command::Draw(c) => self.output.push(c),
                Command::Call(inner) => self.execute(inner, depth + 1)?,
            }
        }
        Ok(())
    }
}

impl RenderBackend for RecordingBackend {
    fn gen_list(&mut self) -> BackendResult<ListHandle> {
        if std::mem::take(&mut self.fail_gen) {
            return Err(BackendError::Exhausted);
        }
        self.next_handle += 1;
        let list = ListHandle(self.next_handle);
        self.lists.insert(list, Vec::new());
        self.stats.lists_generated += 1;
        Ok(list)
    }

    fn begin_list(&mut self, list: ListHandle) -> BackendResult<()> {
        if !self.lists.contains_key(&list) {
            return Err(BackendError::UnknownList(list));
        }
        if self.compiling.is_some() {
            return Err(BackendError::NestedList(list));
        }
        self.compiling = Some((list, Vec::new()));
        Ok(())
    }

    fn end_list(&mut self, list: ListHandle) -> BackendResult<()> {
        match self.compiling.take() {
            Some((open, commands)) if open == list => {
                if std::mem::take(&mut self.fail_end) {
                    return Err(BackendError::Failed("compile failed".to_string()));
                }
                self.lists.insert(list, commands);
                self.stats.lists_compiled += 1;
                Ok(())
            }
            other => {
                self.compiling = other;
                Err(BackendError::NotCompiling(list))
            }
        }
    }

    fn call_list(&mut self, list: ListHandle) -> BackendResult<()> {
        if std::mem::take(&mut self.fail_call) {
            return Err(BackendError::Failed("call failed".to_string()));
        }
        if !self.lists.contains_key(&list) {
            return Err(BackendError::UnknownList(list));
        }
        self.stats.lists_called += 1;
        match self.compiling.as_mut() {
            Some((_, commands)) => {
                commands.push(Command::Call(list));
                Ok(())
            }
            None => self.execute(list, 0),
        }
    }

    fn delete_list(&mut self, list: ListHandle) -> BackendResult<()> {
        self.lists
            .remove(&list)
            .ok_or(BackendError::UnknownList(list))?;
        self.stats.lists_deleted += 1;
        Ok(())
    }

    fn emit(&mut self, command: &str) {
        match self.compiling.as_mut() {
            Some((_, commands)) => commands.push(Command::Draw(command.to_string())),
            None => {
                self.stats.immediate_commands += 1;
                self.output.push(command.to_string());
            }
        }
    }
}
