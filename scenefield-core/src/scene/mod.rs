//! Scene Driver
//!
//! The graph is quiescent until something outside writes to it. A
//! [`Scene`] is that something: once per frame it advances the `time`
//! field, runs its frame stages (traversal, rendering) and finally pulls
//! the event sink.
//!
//! # Frame order
//!
//! 1. `frameRate` and `time` are set. Everything routed from `time`
//!    receives its event here, including the `isActive` field of every
//!    display list.
//! 2. Each registered [`FrameStage`] runs in registration order with the
//!    current `sceneRoot`.
//! 3. The event sink is pulled, updating every field routed into it whose
//!    period has elapsed.

mod config;
mod periodic;

pub use config::{CachingOptions, DelayPolicyKind, SceneConfig};
pub use periodic::{Period, PeriodicUpdate};

use tracing::{debug, trace};

use crate::error::Result;
use crate::field::{AccessType, Caller, FieldBuilder, FieldRef, TimeStamp};
use crate::graph::{FieldGraph, NodeId};
use crate::render::RenderBackend;

/// One step of a frame, run after `time` advanced.
pub trait FrameStage: 'static {
    fn run(
        &mut self,
        graph: &mut FieldGraph,
        root: Option<NodeId>,
        backend: &mut dyn RenderBackend,
    ) -> Result<()>;
}

impl<F> FrameStage for F
where
    F: FnMut(&mut FieldGraph, Option<NodeId>, &mut dyn RenderBackend) -> Result<()> + 'static,
{
    fn run(
        &mut self,
        graph: &mut FieldGraph,
        root: Option<NodeId>,
        backend: &mut dyn RenderBackend,
    ) -> Result<()> {
        self(graph, root, backend)
    }
}

/// Renders the scene root, through its display list if it has one.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderRoot;

impl FrameStage for RenderRoot {
    fn run(
        &mut self,
        graph: &mut FieldGraph,
        root: Option<NodeId>,
        backend: &mut dyn RenderBackend,
    ) -> Result<()> {
        let Some(root) = root else {
            return Ok(());
        };
        match graph.display_list_of(root)? {
            Some(dl) => graph.call_list(dl, backend, true),
            None => graph.render_node(root, backend),
        }
    }
}

/// A field graph together with the loop that drives it.
pub struct Scene {
    graph: FieldGraph,
    node: NodeId,
    scene_root: FieldRef<Option<NodeId>>,
    frame_rate: FieldRef<f32>,
    stages: Vec<(String, Box<dyn FrameStage>)>,
    last_time: Option<f64>,
    frames: u64,
}

impl Scene {
    pub fn new() -> Result<Self> {
        Self::with_config(SceneConfig::default())
    }

    /// Create a scene whose graph uses `config`.
    pub fn with_config(config: SceneConfig) -> Result<Self> {
        let mut graph = FieldGraph::with_config(config);
        let node = graph.add_node("Scene", "Scene");
        let scene_root = graph.add_typed::<Option<NodeId>>(
            FieldBuilder::of(None::<NodeId>)
                .named("sceneRoot")
                .owned_by(node),
        )?;
        let frame_rate = graph.add_typed::<f32>(
            FieldBuilder::of(0.0f32)
                .named("frameRate")
                .owned_by(node)
                .access(AccessType::OutputOnly),
        )?;
        graph.initialize_node(node)?;

        Ok(Self {
            graph,
            node,
            scene_root,
            frame_rate,
            stages: Vec::new(),
            last_time: None,
            frames: 0,
        })
    }

    pub fn from_json_config(json: &str) -> Result<Self> {
        Self::with_config(SceneConfig::from_json(json)?)
    }

    pub fn graph(&self) -> &FieldGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut FieldGraph {
        &mut self.graph
    }

    /// The node owning `sceneRoot` and `frameRate`.
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn scene_root(&self) -> FieldRef<Option<NodeId>> {
        self.scene_root
    }

    pub fn set_scene_root(&mut self, root: Option<NodeId>) -> Result<()> {
        self.graph.set(self.scene_root, root)
    }

    /// Frames per second measured over the last frame.
    pub fn frame_rate(&self) -> FieldRef<f32> {
        self.frame_rate
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Append a stage to the frame.
    pub fn add_stage<S: FrameStage>(&mut self, name: impl Into<String>, stage: S) {
        let name = name.into();
        debug!(stage = %name, "add frame stage");
        self.stages.push((name, Box::new(stage)));
    }

    /// Run one frame at the current wall-clock time.
    pub fn idle(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        self.idle_at(TimeStamp::now(), backend)
    }

    /// Run one frame at scene time `now`.
    pub fn idle_at(&mut self, now: TimeStamp, backend: &mut dyn RenderBackend) -> Result<()> {
        let now = now.seconds();
        if let Some(last) = self.last_time {
            let dt = now - last;
            if dt > 0.0 {
                self.graph
                    .set_as(self.frame_rate, (1.0 / dt) as f32, Caller::Node(self.node))?;
            }
        }
        self.last_time = Some(now);
        self.graph.set(self.graph.time(), TimeStamp(now))?;

        let root = self.graph.get(self.scene_root)?;
        for (name, stage) in self.stages.iter_mut() {
            trace!(stage = %name, "run frame stage");
            stage.run(&mut self.graph, root, backend)?;
        }

        let sink = self.graph.event_sink();
        self.graph.up_to_date(sink)?;
        self.frames += 1;
        Ok(())
    }

    /// Delete backend resources of display lists that were broken or
    /// removed since the last frame.
    pub fn release_resources(&mut self, backend: &mut dyn RenderBackend) {
        self.graph.flush_released(backend);
    }

    pub fn into_graph(self) -> FieldGraph {
        self.graph
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("graph", &self.graph)
            .field("stages", &self.stages.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("frames", &self.frames)
            .finish()
    }
}
