//! The pipeline graph and its demand-driven update protocol.
//!
//! Nodes live in one arena indexed by [`NodeId`]. A node is either a
//! standalone image (data without a producer) or a process object that owns
//! its filter and its output image. Inputs are plain `NodeId`s: a consumer
//! never owns what it reads, and the producer link exists only so the update
//! passes can walk upstream.
//!
//! [`Pipeline::update`] runs three passes from the node it is called on:
//!
//! 1. **Output information**: recurse into every input, then regenerate this
//!    node's metadata if anything upstream changed since the last pass.
//! 2. **Requested region**: if this node cannot serve its request from its
//!    buffer, work out what it needs from each input (cropped to what the
//!    input can produce) and recurse.
//! 3. **Output data**: bring the inputs up to date, then regenerate the
//!    buffer, sized exactly to the request, if it is stale.

use crate::config::ExecutionSettings;
use crate::image::{Image, Pixel};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::event::{EventBus, PipelineEvent};
use crate::pipeline::filter::{Filter, Generation};
use crate::pipeline::id::NodeId;
use crate::pipeline::progress::{ProcessControl, ProgressTracker};
use crate::pipeline::threader::{panic_message, ExecContext, WorkerPool};
use crate::pipeline::time_stamp::{ModifiedTime, TimeStamp};
use crate::region::Region;
use crossbeam_channel::Receiver;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Observable state of a node's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Nothing it depends on changed and its buffer covers its request.
    Fresh,
    /// The next update will regenerate it.
    Stale,
    /// A generation is running.
    Generating,
}

struct ProcessSlot<P: Pixel, const D: usize> {
    /// Taken out while the node generates.
    filter: Option<Box<dyn Filter<P, D>>>,
    inputs: Vec<Option<NodeId>>,
    mtime: TimeStamp,
    output_information_mtime: TimeStamp,
    updating: bool,
    number_of_threads: usize,
    release_data_before_update: bool,
    control: ProcessControl,
}

enum NodeKind<P: Pixel, const D: usize> {
    Data,
    Process(ProcessSlot<P, D>),
}

struct NodeSlot<P: Pixel, const D: usize> {
    name: String,
    output: Image<P, D>,
    /// The caller chose this node's request; otherwise it tracks the largest region.
    requested_by_caller: bool,
    kind: NodeKind<P, D>,
}

fn connected(inputs: &[Option<NodeId>]) -> Vec<NodeId> {
    inputs.iter().flatten().copied().collect()
}

/// Crop an input request to what the input can produce.
fn crop_request<const D: usize>(wanted: Region<D>, largest: &Region<D>) -> PipelineResult<Region<D>> {
    if wanted.is_empty() || largest.contains(&wanted) {
        return Ok(wanted);
    }
    let cropped = wanted.intersect(largest);
    if cropped.is_empty() {
        return Err(PipelineError::RegionOutOfBounds {
            requested: wanted.to_string(),
            largest: largest.to_string(),
        });
    }
    tracing::debug!("Cropped input request {} to {}", wanted, cropped);
    Ok(cropped)
}

/// A demand-driven image pipeline.
pub struct Pipeline<P: Pixel, const D: usize> {
    nodes: Vec<NodeSlot<P, D>>,
    pool: Arc<WorkerPool>,
    settings: ExecutionSettings,
    events: Arc<EventBus>,
}

impl<P: Pixel, const D: usize> Default for Pipeline<P, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Pixel, const D: usize> std::fmt::Debug for Pipeline<P, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("nodes", &self.nodes.len())
            .field("pool", &self.pool)
            .field("settings", &self.settings)
            .finish()
    }
}

impl<P: Pixel, const D: usize> Pipeline<P, D> {
    /// A pipeline on the process-wide worker pool with default settings.
    pub fn new() -> Self {
        let settings = ExecutionSettings::default();
        let pool = WorkerPool::global_with(settings.number_of_threads);
        Self::with_settings(settings, pool)
    }

    pub fn with_settings(settings: ExecutionSettings, pool: Arc<WorkerPool>) -> Self {
        Self {
            nodes: Vec::new(),
            pool,
            settings,
            events: Arc::new(EventBus::new()),
        }
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Receive [`PipelineEvent`]s from every node of this pipeline.
    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    // ── Graph building ──

    /// Adds a standalone image. Its largest possible region defaults to its buffer.
    pub fn add_image(&mut self, name: impl Into<String>, mut image: Image<P, D>) -> NodeId {
        if image.largest_possible_region().is_empty() {
            let buffered = image.buffered_region();
            image.set_largest_possible_region(buffered);
        }
        if image.requested_region().is_empty() {
            image.set_requested_region_to_largest_possible_region();
        }
        let id = NodeId(self.nodes.len() as u32);
        let name = name.into();
        tracing::debug!("Added image {:?} ({})", id, name);
        self.nodes.push(NodeSlot {
            name,
            output: image,
            requested_by_caller: false,
            kind: NodeKind::Data,
        });
        id
    }

    pub fn add_filter<F: Filter<P, D>>(&mut self, filter: F) -> NodeId {
        let mut mtime = TimeStamp::new();
        mtime.modified();
        let id = NodeId(self.nodes.len() as u32);
        let name = filter.name().to_string();
        tracing::debug!("Added filter {:?} ({})", id, name);
        self.nodes.push(NodeSlot {
            name,
            output: Image::new(),
            requested_by_caller: false,
            kind: NodeKind::Process(ProcessSlot {
                filter: Some(Box::new(filter)),
                inputs: Vec::new(),
                mtime,
                output_information_mtime: TimeStamp::new(),
                updating: false,
                number_of_threads: self.settings.number_of_threads,
                release_data_before_update: self.settings.release_data_before_update,
                control: ProcessControl::new(),
            }),
        });
        id
    }

    /// Feeds `upstream`'s output into input 0 of `downstream`.
    pub fn connect(&mut self, upstream: NodeId, downstream: NodeId) -> PipelineResult<()> {
        self.set_input(downstream, 0, upstream)
    }

    pub fn set_input(&mut self, node: NodeId, index: usize, upstream: NodeId) -> PipelineResult<()> {
        self.slot(upstream)?;
        self.process(node)?;
        if self.would_create_cycle(upstream, node) {
            return Err(PipelineError::CycleDetected);
        }
        let process = self.process_mut(node)?;
        if process.inputs.len() <= index {
            process.inputs.resize(index + 1, None);
        }
        if process.inputs[index] == Some(upstream) {
            return Ok(());
        }
        process.inputs[index] = Some(upstream);
        process.mtime.modified();
        tracing::debug!("Connected {:?} -> {:?}[{}]", upstream, node, index);
        Ok(())
    }

    pub fn remove_input(&mut self, node: NodeId, index: usize) -> PipelineResult<()> {
        let process = self.process_mut(node)?;
        if let Some(slot) = process.inputs.get_mut(index) {
            if slot.take().is_some() {
                process.mtime.modified();
            }
        }
        Ok(())
    }

    /// Input slots of a process object, `None` where unconnected.
    pub fn inputs(&self, node: NodeId) -> PipelineResult<&[Option<NodeId>]> {
        Ok(&self.process(node)?.inputs)
    }

    pub fn name(&self, node: NodeId) -> PipelineResult<&str> {
        Ok(&self.slot(node)?.name)
    }

    fn would_create_cycle(&self, upstream: NodeId, node: NodeId) -> bool {
        // If `node` is already upstream of `upstream`, the new edge closes a loop.
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![upstream];

        while let Some(current) = stack.pop() {
            if current == node {
                return true;
            }
            let idx = current.index();
            if idx >= self.nodes.len() || visited[idx] {
                continue;
            }
            visited[idx] = true;
            if let NodeKind::Process(process) = &self.nodes[idx].kind {
                stack.extend(process.inputs.iter().flatten().copied());
            }
        }
        false
    }

    // ── Node access ──

    fn slot(&self, node: NodeId) -> PipelineResult<&NodeSlot<P, D>> {
        self.nodes
            .get(node.index())
            .ok_or(PipelineError::InvalidNode(node))
    }

    fn slot_mut(&mut self, node: NodeId) -> PipelineResult<&mut NodeSlot<P, D>> {
        self.nodes
            .get_mut(node.index())
            .ok_or(PipelineError::InvalidNode(node))
    }

    fn process(&self, node: NodeId) -> PipelineResult<&ProcessSlot<P, D>> {
        match &self.slot(node)?.kind {
            NodeKind::Process(process) => Ok(process),
            NodeKind::Data => Err(PipelineError::NotAProcessObject(node)),
        }
    }

    fn process_mut(&mut self, node: NodeId) -> PipelineResult<&mut ProcessSlot<P, D>> {
        match &mut self.slot_mut(node)?.kind {
            NodeKind::Process(process) => Ok(process),
            NodeKind::Data => Err(PipelineError::NotAProcessObject(node)),
        }
    }

    pub fn output(&self, node: NodeId) -> PipelineResult<&Image<P, D>> {
        Ok(&self.slot(node)?.output)
    }

    /// Direct access to a node's image. Call [`Image::modified`] after editing a
    /// standalone image so consumers regenerate.
    pub fn output_mut(&mut self, node: NodeId) -> PipelineResult<&mut Image<P, D>> {
        Ok(&mut self.slot_mut(node)?.output)
    }

    /// Hands the output image to the caller. The node keeps its metadata and
    /// request and regenerates on the next update.
    pub fn take_output(&mut self, node: NodeId) -> PipelineResult<Image<P, D>> {
        let slot = self.slot_mut(node)?;
        let mut fresh = Image::new();
        fresh.set_info(slot.output.info().clone());
        fresh.set_pipeline_mtime(slot.output.pipeline_mtime());
        fresh.set_requested_region(slot.output.requested_region());
        fresh.set_release_data_flag(slot.output.release_data_flag());
        Ok(std::mem::replace(&mut slot.output, fresh))
    }

    /// Asks the next update of `node` for `region` instead of its largest region.
    pub fn set_requested_region(&mut self, node: NodeId, region: Region<D>) -> PipelineResult<()> {
        let slot = self.slot_mut(node)?;
        slot.output.set_requested_region(region);
        slot.requested_by_caller = true;
        Ok(())
    }

    /// Forgets a caller-chosen request; the node asks for its largest region again.
    pub fn reset_requested_region(&mut self, node: NodeId) -> PipelineResult<()> {
        let slot = self.slot_mut(node)?;
        slot.requested_by_caller = false;
        slot.output.set_requested_region_to_largest_possible_region();
        Ok(())
    }

    pub fn set_release_data_flag(&mut self, node: NodeId, flag: bool) -> PipelineResult<()> {
        self.slot_mut(node)?.output.set_release_data_flag(flag);
        Ok(())
    }

    pub fn set_release_data_before_update(&mut self, node: NodeId, flag: bool) -> PipelineResult<()> {
        self.process_mut(node)?.release_data_before_update = flag;
        Ok(())
    }

    pub fn number_of_threads(&self, node: NodeId) -> PipelineResult<usize> {
        Ok(self.process(node)?.number_of_threads)
    }

    pub fn set_number_of_threads(&mut self, node: NodeId, threads: usize) -> PipelineResult<()> {
        let process = self.process_mut(node)?;
        let threads = threads.clamp(1, crate::config::MAX_THREADS);
        if process.number_of_threads != threads {
            process.number_of_threads = threads;
            process.mtime.modified();
        }
        Ok(())
    }

    /// Handle for aborting `node` and reading its progress from another thread.
    pub fn control(&self, node: NodeId) -> PipelineResult<ProcessControl> {
        Ok(self.process(node)?.control.clone())
    }

    /// Read access to a node's concrete filter.
    pub fn filter<F: Filter<P, D>>(&self, node: NodeId) -> PipelineResult<&F> {
        let filter = self
            .process(node)?
            .filter
            .as_deref()
            .ok_or(PipelineError::InvalidNode(node))?;
        (filter as &dyn Any)
            .downcast_ref::<F>()
            .ok_or(PipelineError::FilterTypeMismatch(node))
    }

    /// Changes a node's parameters and marks it modified.
    pub fn configure<F, R>(&mut self, node: NodeId, change: impl FnOnce(&mut F) -> R) -> PipelineResult<R>
    where
        F: Filter<P, D>,
    {
        let process = self.process_mut(node)?;
        let filter = process
            .filter
            .as_deref_mut()
            .ok_or(PipelineError::InvalidNode(node))?;
        let concrete = (filter as &mut dyn Any)
            .downcast_mut::<F>()
            .ok_or(PipelineError::FilterTypeMismatch(node))?;
        let result = change(concrete);
        process.mtime.modified();
        Ok(result)
    }

    /// Marks a node modified: a process object's parameters or a standalone image's data.
    pub fn modified(&mut self, node: NodeId) -> PipelineResult<()> {
        let slot = self.slot_mut(node)?;
        match &mut slot.kind {
            NodeKind::Process(process) => process.mtime.modified(),
            NodeKind::Data => slot.output.modified(),
        }
        Ok(())
    }

    /// Modification time of the node itself (parameters, or data for a standalone image).
    pub fn mtime(&self, node: NodeId) -> PipelineResult<ModifiedTime> {
        let slot = self.slot(node)?;
        Ok(match &slot.kind {
            NodeKind::Process(process) => process.mtime.time(),
            NodeKind::Data => slot.output.mtime(),
        })
    }

    /// Whether the next update of `node` would regenerate it.
    ///
    /// In a graph where one producer feeds several branches that meet again,
    /// the producer ends an update holding the request of the last branch.
    /// The branches before it can then report [`NodeState::Stale`] although
    /// the node they meet in is [`NodeState::Fresh`].
    pub fn state(&self, node: NodeId) -> PipelineResult<NodeState> {
        let slot = self.slot(node)?;
        let NodeKind::Process(process) = &slot.kind else {
            return Ok(if slot.output.requested_region_is_outside_of_buffered_region() {
                NodeState::Stale
            } else {
                NodeState::Fresh
            });
        };
        if process.control.is_generating() {
            return Ok(NodeState::Generating);
        }
        let output = &slot.output;
        let generated = output.update_mtime();
        if generated == ModifiedTime::ZERO
            || output.data_released()
            || output.requested_region_is_outside_of_buffered_region()
        {
            return Ok(NodeState::Stale);
        }
        let mut newest = process.mtime.time();
        for input in connected(&process.inputs) {
            newest = newest.max(self.upstream_mtime(input)?);
        }
        Ok(if newest > generated {
            NodeState::Stale
        } else {
            NodeState::Fresh
        })
    }

    /// Newest change the output of `node` depends on.
    fn upstream_mtime(&self, node: NodeId) -> PipelineResult<ModifiedTime> {
        let slot = self.slot(node)?;
        match &slot.kind {
            NodeKind::Data => Ok(slot.output.mtime()),
            NodeKind::Process(process) => {
                let mut newest = process.mtime.time().max(slot.output.mtime());
                for input in connected(&process.inputs) {
                    newest = newest.max(self.upstream_mtime(input)?);
                }
                Ok(newest)
            }
        }
    }

    // ── Update protocol ──

    /// Runs `pass`; on failure clears the re-entrancy guards upstream of `node`.
    fn guarded(
        &mut self,
        node: NodeId,
        pass: impl FnOnce(&mut Self) -> PipelineResult<()>,
    ) -> PipelineResult<()> {
        let result = pass(self);
        if result.is_err() {
            self.reset_pipeline(node);
        }
        result
    }

    /// Brings `node`'s requested region up to date, regenerating only what changed.
    ///
    /// A producer shared by several inputs of one node is re-requested per
    /// input, so it may generate once for each branch that needs a region its
    /// buffer does not cover.
    pub fn update(&mut self, node: NodeId) -> PipelineResult<()> {
        self.guarded(node, |p| {
            p.update_output_information_inner(node)?;
            p.propagate_requested_region_inner(node)?;
            p.update_output_data_inner(node)
        })
    }

    /// Resets the request of `node` to its largest possible region, then updates.
    pub fn update_largest_possible_region(&mut self, node: NodeId) -> PipelineResult<()> {
        self.guarded(node, |p| {
            p.update_output_information_inner(node)?;
            let slot = p.slot_mut(node)?;
            slot.requested_by_caller = false;
            slot.output.set_requested_region_to_largest_possible_region();
            p.propagate_requested_region_inner(node)?;
            p.update_output_data_inner(node)
        })
    }

    /// First pass only: metadata, no buffers.
    pub fn update_output_information(&mut self, node: NodeId) -> PipelineResult<()> {
        self.guarded(node, |p| p.update_output_information_inner(node))
    }

    /// Second pass only: push requests upstream.
    pub fn propagate_requested_region(&mut self, node: NodeId) -> PipelineResult<()> {
        self.guarded(node, |p| p.propagate_requested_region_inner(node))
    }

    /// Third pass only: generate stale data.
    pub fn update_output_data(&mut self, node: NodeId) -> PipelineResult<()> {
        self.guarded(node, |p| p.update_output_data_inner(node))
    }

    /// Clears the re-entrancy guard and generating flag of `node` and everything upstream.
    pub fn reset_pipeline(&mut self, node: NodeId) {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let idx = current.index();
            if idx >= self.nodes.len() || visited[idx] {
                continue;
            }
            visited[idx] = true;
            if let NodeKind::Process(process) = &mut self.nodes[idx].kind {
                process.updating = false;
                process.control.finish();
                stack.extend(process.inputs.iter().flatten().copied());
            }
        }
    }

    fn check_required_inputs(&self, node: NodeId) -> PipelineResult<()> {
        let slot = self.slot(node)?;
        let NodeKind::Process(process) = &slot.kind else {
            return Ok(());
        };
        let filter = process
            .filter
            .as_deref()
            .ok_or(PipelineError::InvalidNode(node))?;
        let required = filter.number_of_required_inputs();
        for index in 0..required {
            if process.inputs.get(index).copied().flatten().is_none() {
                return Err(PipelineError::MissingInput {
                    node_id: node,
                    name: slot.name.clone(),
                    required,
                    missing: index,
                });
            }
        }
        Ok(())
    }

    fn update_output_information_inner(&mut self, node: NodeId) -> PipelineResult<()> {
        if let NodeKind::Process(process) = &self.slot(node)?.kind {
            if process.updating {
                return Err(PipelineError::CycleDetected);
            }
            let inputs = connected(&process.inputs);
            let mut newest = process.mtime.time();

            self.process_mut(node)?.updating = true;
            for &input in &inputs {
                self.update_output_information_inner(input)?;
                let upstream = &self.slot(input)?.output;
                newest = newest.max(upstream.pipeline_mtime()).max(upstream.mtime());
            }
            self.process_mut(node)?.updating = false;

            if newest > self.process(node)?.output_information_mtime.time() {
                self.check_required_inputs(node)?;
                let infos = inputs
                    .iter()
                    .map(|&input| self.slot(input).map(|s| s.output.info()))
                    .collect::<PipelineResult<Vec<_>>>()?;
                let slot = self.slot(node)?;
                let filter = self
                    .process(node)?
                    .filter
                    .as_deref()
                    .ok_or(PipelineError::InvalidNode(node))?;
                let info = filter
                    .generate_output_information(&infos)
                    .map_err(|e| e.in_node(node, &slot.name))?;
                tracing::debug!(
                    "{} ({:?}) output information: largest region {}",
                    slot.name,
                    node,
                    info.largest_possible_region
                );

                let slot = self.slot_mut(node)?;
                slot.output.set_info(info);
                slot.output.set_pipeline_mtime(newest);
                if let NodeKind::Process(process) = &mut slot.kind {
                    process.output_information_mtime.modified();
                }
            }
        } else {
            let output = &mut self.slot_mut(node)?.output;
            if output.largest_possible_region().is_empty() {
                let buffered = output.buffered_region();
                output.set_largest_possible_region(buffered);
            }
        }

        let slot = self.slot_mut(node)?;
        if !slot.requested_by_caller || slot.output.requested_region().is_empty() {
            slot.output.set_requested_region_to_largest_possible_region();
        }
        Ok(())
    }

    fn propagate_requested_region_inner(&mut self, node: NodeId) -> PipelineResult<()> {
        let slot = self.slot(node)?;
        slot.output
            .verify_requested_region()
            .map_err(|e| e.in_node(node, &slot.name))?;

        let output = &slot.output;
        let stale = output.requested_region_is_outside_of_buffered_region()
            || output.update_mtime() < output.pipeline_mtime()
            || output.data_released();
        let NodeKind::Process(process) = &slot.kind else {
            return Ok(());
        };
        if !stale {
            tracing::trace!("{} ({:?}) serves its request from its buffer", slot.name, node);
            return Ok(());
        }
        if process.updating {
            return Err(PipelineError::CycleDetected);
        }

        let filter = process
            .filter
            .as_deref()
            .ok_or(PipelineError::InvalidNode(node))?;
        let largest = output.largest_possible_region();
        let mut requested = filter.enlarge_output_requested_region(&output.requested_region(), &largest);
        if !largest.contains(&requested) {
            requested = requested.intersect(&largest);
        }

        let mut input_requests = Vec::new();
        for (index, input) in process.inputs.iter().enumerate() {
            let Some(input) = *input else { continue };
            let info = self.slot(input)?.output.info();
            let wanted = filter
                .input_requested_region(&requested, index, info)
                .and_then(|wanted| crop_request(wanted, &info.largest_possible_region))
                .map_err(|e| e.in_node(node, &slot.name))?;
            input_requests.push((input, wanted));
        }

        self.slot_mut(node)?.output.set_requested_region(requested);
        for &(input, region) in &input_requests {
            self.slot_mut(input)?.output.set_requested_region(region);
        }

        self.process_mut(node)?.updating = true;
        for (input, _) in input_requests {
            self.propagate_requested_region_inner(input)?;
        }
        self.process_mut(node)?.updating = false;
        Ok(())
    }

    fn update_output_data_inner(&mut self, node: NodeId) -> PipelineResult<()> {
        let slot = self.slot(node)?;
        let output = &slot.output;
        match &slot.kind {
            NodeKind::Data => {
                if output.requested_region_is_outside_of_buffered_region() {
                    return Err(PipelineError::RegionOutOfBounds {
                        requested: output.requested_region().to_string(),
                        largest: output.buffered_region().to_string(),
                    }
                    .in_node(node, &slot.name));
                }
                Ok(())
            }
            NodeKind::Process(_) => {
                if output.update_mtime() < output.pipeline_mtime()
                    || output.data_released()
                    || output.requested_region_is_outside_of_buffered_region()
                {
                    self.generate(node)
                } else {
                    tracing::trace!("{} ({:?}) is up to date", slot.name, node);
                    Ok(())
                }
            }
        }
    }

    /// Updates the inputs of `node` and regenerates its output.
    fn generate(&mut self, node: NodeId) -> PipelineResult<()> {
        let (inputs, release_before, threads, control, name) = {
            let slot = self.slot(node)?;
            let process = match &slot.kind {
                NodeKind::Process(process) => process,
                NodeKind::Data => return Ok(()),
            };
            if process.updating {
                return Err(PipelineError::CycleDetected);
            }
            (
                connected(&process.inputs),
                process.release_data_before_update,
                process.number_of_threads,
                process.control.clone(),
                slot.name.clone(),
            )
        };

        if release_before {
            self.slot_mut(node)?.output.prepare_for_new_data();
        }

        self.process_mut(node)?.updating = true;
        if let [input] = inputs.as_slice() {
            self.update_output_data_inner(*input)?;
        } else {
            // Shared upstream nodes may have been re-requested by a sibling input.
            for &input in &inputs {
                self.propagate_requested_region_inner(input)?;
                self.update_output_data_inner(input)?;
            }
        }
        self.check_required_inputs(node)?;

        let (mut filter, mut output) = {
            let slot = self.slot_mut(node)?;
            let NodeKind::Process(process) = &mut slot.kind else {
                return Err(PipelineError::NotAProcessObject(node));
            };
            let filter = process
                .filter
                .take()
                .ok_or(PipelineError::InvalidNode(node))?;
            (filter, std::mem::take(&mut slot.output))
        };

        let requested = output.requested_region();
        output.allocate(requested);
        control.begin();
        self.events.emit(PipelineEvent::Start { node });
        let started = Instant::now();

        // Filter and buffer go back into the slot whichever way generation ends.
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_generation(node, filter.as_mut(), &inputs, &mut output, threads, &control)
        }))
        .unwrap_or_else(|payload| {
            Err(PipelineError::FilterPanicked {
                message: panic_message(payload.as_ref()),
            })
        });

        control.finish();
        if let Some(slot) = self.nodes.get_mut(node.index()) {
            slot.output = output;
            if let NodeKind::Process(process) = &mut slot.kind {
                process.filter = Some(filter);
                process.updating = false;
            }
        }

        match result {
            Ok(()) => {
                self.slot_mut(node)?.output.data_has_been_generated();
                self.events.emit(PipelineEvent::End { node });
                tracing::info!(
                    "{} ({:?}) generated {} in {:?}",
                    name,
                    node,
                    requested,
                    started.elapsed()
                );
                self.release_inputs(&inputs);
                Ok(())
            }
            Err(e) => {
                self.slot_mut(node)?.output.invalidate();
                if e.is_abort() {
                    self.events.emit(PipelineEvent::Abort { node });
                    tracing::info!("{} ({:?}) aborted after {:?}", name, node, started.elapsed());
                } else {
                    tracing::warn!("{} ({:?}) failed: {}", name, node, e);
                }
                Err(e.in_node(node, &name))
            }
        }
    }

    fn run_generation(
        &self,
        node: NodeId,
        filter: &mut dyn Filter<P, D>,
        inputs: &[NodeId],
        output: &mut Image<P, D>,
        threads: usize,
        control: &ProcessControl,
    ) -> PipelineResult<()> {
        let input_images = inputs
            .iter()
            .map(|&input| self.slot(input).map(|s| &s.output))
            .collect::<PipelineResult<Vec<_>>>()?;
        let tracker = ProgressTracker::new(
            node,
            output.requested_region().number_of_pixels(),
            control.clone(),
            Arc::clone(&self.events),
        );
        let exec = ExecContext::new(
            &self.pool,
            self.settings.split_strategy,
            threads,
            self.settings.abort_check_rows,
            &tracker,
        );

        match filter.generation() {
            Generation::Threaded => {
                filter.before_threaded_generate_data(&input_images, output)?;
                let shared: &dyn Filter<P, D> = &*filter;
                exec.for_each_output_chunk(output, |chunk, worker| {
                    shared.threaded_generate_data(&input_images, chunk, worker)
                })?;
                filter.after_threaded_generate_data(&input_images, output)?;
            }
            Generation::Whole => filter.generate_data(&input_images, output, &exec)?,
        }

        if control.is_abort_requested() {
            return Err(PipelineError::ProcessAborted { node_id: node });
        }
        tracker.finish();
        Ok(())
    }

    /// Frees flagged producer outputs once this node has consumed them.
    fn release_inputs(&mut self, inputs: &[NodeId]) {
        for &input in inputs {
            if let Some(slot) = self.nodes.get_mut(input.index()) {
                if matches!(slot.kind, NodeKind::Process(_)) && slot.output.release_data_flag() {
                    slot.output.release_data();
                    tracing::trace!("Released output of {} ({:?})", slot.name, input);
                }
            }
        }
    }
}
