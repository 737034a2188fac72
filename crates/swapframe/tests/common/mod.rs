//! In-memory backend for driving the frame coordinator without a GPU.
//!
//! The mock models a GPU that retires submissions in order, and only when
//! the CPU waits for them. It panics on any ordering rule a real driver
//! would reject: resetting or destroying a gate with pending work, reusing a
//! recording before its submission retired, waiting on a signal nobody set,
//! or destroying a chain or drawable targets still referenced by pending
//! work.
//!
//! Chains go stale whenever the scripted surface extent differs from the
//! extent they were created with.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use ash::vk;
use swapframe::{
    Acquired, ChainInfo, FrameDriver, FrameResult, GateStatus, GpuContext, PipelineParams,
    Presented, SurfaceProvider,
};
use swapframe_core::Config;
use swapframe_rhi::{RhiError, RhiResult};

pub const MOCK_FORMAT: vk::Format = vk::Format::B8G8R8A8_SRGB;
pub const MOCK_IMAGE_COUNT: u32 = 3;

pub type MockDriver = FrameDriver<MockContext, MockSurface>;

pub fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

/// Config with `frames` slots and a short timeout.
pub fn test_config(frames: usize) -> Config {
    Config::default()
        .with_frames_in_flight(frames)
        .with_frame_timeout(Duration::from_millis(10))
}

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Driver with `frames` slots over a surface of `initial` extent.
pub fn driver(frames: usize, initial: vk::Extent2D) -> (MockDriver, MockGpu) {
    init_test_logging();
    let gpu = MockGpu::new(initial);
    let driver = FrameDriver::initialize(gpu.context(), gpu.surface(), test_config(frames))
        .expect("mock driver initializes");
    (driver, gpu)
}

/// Factory building a [`MockPipeline`] for every chain.
pub fn pipeline_factory()
-> impl FnMut(&MockContext, &PipelineParams<'_, MockContext>) -> RhiResult<MockPipeline> {
    |context: &MockContext, params: &PipelineParams<'_, MockContext>| {
        context.create_pipeline(params)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GateState {
    Signaled,
    Unsignaled,
    Pending,
}

/// Number of live objects of each kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LiveCounts {
    pub gates: usize,
    pub signals: usize,
    pub recordings: usize,
    pub chains: usize,
    pub descriptions: usize,
    pub draw_targets: usize,
    pub pipelines: usize,
}

/// Operation that fails once with a fatal error when armed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailPoint {
    Acquire,
    Submit,
    CreateChain,
    BuildPipeline,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    CreateChain {
        chain: usize,
        extent: vk::Extent2D,
        replaced: Option<usize>,
    },
    DropChain {
        chain: usize,
    },
    Acquire {
        chain: usize,
        result: Acquired,
    },
    Submit {
        gate: usize,
    },
    Present {
        chain: usize,
        image: u32,
        extent: vk::Extent2D,
    },
    WaitIdle,
    WaitEvents,
    BuildPipeline {
        extent: vk::Extent2D,
    },
}

#[derive(Default)]
struct RecordingState {
    open: bool,
    in_target: bool,
    targets: Option<usize>,
    last_gate: Option<usize>,
}

struct Submission {
    gate: usize,
    targets: Option<usize>,
    chain: Option<usize>,
}

struct TargetSet {
    description: usize,
    chain: usize,
    extent: vk::Extent2D,
}

#[derive(Default)]
struct MockState {
    next_id: usize,
    live: LiveCounts,
    gates: HashMap<usize, GateState>,
    signals: HashMap<usize, bool>,
    recordings: HashMap<usize, RecordingState>,
    target_sets: HashMap<usize, TargetSet>,
    pipelines: HashMap<usize, usize>,
    pending: Vec<Submission>,
    max_in_flight: usize,
    surface_extent: vk::Extent2D,
    scripted_extents: VecDeque<vk::Extent2D>,
    close_requested: bool,
    hang_gpu: bool,
    acquire_timeouts: usize,
    suboptimal_acquires: usize,
    suboptimal_presents: usize,
    fail_at: Option<FailPoint>,
    events: Vec<Event>,
}

impl MockState {
    fn next_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    fn gate(&self, id: usize) -> GateState {
        self.gates[&id]
    }

    fn fail(&mut self, point: FailPoint) -> RhiResult<()> {
        if self.fail_at == Some(point) {
            self.fail_at = None;
            let result = match point {
                FailPoint::CreateChain | FailPoint::BuildPipeline => {
                    vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
                }
                FailPoint::Acquire | FailPoint::Submit => vk::Result::ERROR_DEVICE_LOST,
            };
            return Err(RhiError::VulkanError(result));
        }
        Ok(())
    }

    /// Retire every submission up to and including the one signaling `gate`.
    fn retire_through(&mut self, gate: usize) {
        if let Some(position) = self.pending.iter().position(|s| s.gate == gate) {
            for submission in self.pending.drain(..=position) {
                self.gates.insert(submission.gate, GateState::Signaled);
            }
        }
    }

    fn retire_all(&mut self) {
        for submission in self.pending.drain(..) {
            self.gates.insert(submission.gate, GateState::Signaled);
        }
    }
}

type Shared = Rc<RefCell<MockState>>;

/// Test-side handle for scripting and inspecting the mock.
#[derive(Clone)]
pub struct MockGpu {
    state: Shared,
}

impl MockGpu {
    pub fn new(surface_extent: vk::Extent2D) -> Self {
        let state = MockState {
            surface_extent,
            ..MockState::default()
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn context(&self) -> MockContext {
        MockContext {
            state: self.state.clone(),
        }
    }

    pub fn surface(&self) -> MockSurface {
        MockSurface {
            state: self.state.clone(),
        }
    }

    pub fn live(&self) -> LiveCounts {
        self.state.borrow().live
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    /// Resize the window immediately.
    pub fn set_surface_extent(&self, extent: vk::Extent2D) {
        self.state.borrow_mut().surface_extent = extent;
    }

    /// Extents delivered one per `wait_events` call.
    pub fn script_extents(&self, extents: &[vk::Extent2D]) {
        self.state.borrow_mut().scripted_extents.extend(extents);
    }

    pub fn request_close(&self) {
        self.state.borrow_mut().close_requested = true;
    }

    pub fn fail_at(&self, point: FailPoint) {
        self.state.borrow_mut().fail_at = Some(point);
    }

    /// While hung, pending submissions never retire.
    pub fn hang_gpu(&self, hung: bool) {
        self.state.borrow_mut().hang_gpu = hung;
    }

    pub fn time_out_acquires(&self, count: usize) {
        self.state.borrow_mut().acquire_timeouts = count;
    }

    pub fn suboptimal_acquires(&self, count: usize) {
        self.state.borrow_mut().suboptimal_acquires = count;
    }

    /// The next `count` presents onto an up-to-date chain report suboptimal.
    pub fn suboptimal_presents(&self, count: usize) {
        self.state.borrow_mut().suboptimal_presents = count;
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.borrow().max_in_flight
    }

    pub fn pending_submissions(&self) -> usize {
        self.state.borrow().pending.len()
    }

    pub fn signaled_gates(&self) -> usize {
        self.state
            .borrow()
            .gates
            .values()
            .filter(|&&state| state == GateState::Signaled)
            .count()
    }

    pub fn wait_events_calls(&self) -> usize {
        self.count_events(|e| matches!(e, Event::WaitEvents))
    }

    pub fn chain_creations(&self) -> usize {
        self.count_events(|e| matches!(e, Event::CreateChain { .. }))
    }

    pub fn stale_acquires(&self) -> usize {
        self.count_events(|e| {
            matches!(
                e,
                Event::Acquire {
                    result: Acquired::NeedsRecreate,
                    ..
                }
            )
        })
    }

    /// Extents of every presented image, in order.
    pub fn presented_extents(&self) -> Vec<vk::Extent2D> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Present { extent, .. } => Some(*extent),
                _ => None,
            })
            .collect()
    }

    fn count_events(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.state.borrow().events.iter().filter(|e| predicate(e)).count()
    }
}

pub struct MockGate {
    id: usize,
    state: Shared,
}

impl Drop for MockGate {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        let gate = state.gates.remove(&self.id);
        state.live.gates -= 1;
        if !std::thread::panicking() {
            assert_ne!(
                gate,
                Some(GateState::Pending),
                "gate destroyed while its submission is pending"
            );
        }
    }
}

pub struct MockSignal {
    id: usize,
    state: Shared,
}

impl Drop for MockSignal {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.signals.remove(&self.id);
        state.live.signals -= 1;
    }
}

pub struct MockRecording {
    id: usize,
    state: Shared,
}

impl Drop for MockRecording {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        let recording = state.recordings.remove(&self.id);
        state.live.recordings -= 1;
        let last_gate = recording.and_then(|r| r.last_gate);
        if !std::thread::panicking()
            && let Some(gate) = last_gate
        {
            assert_ne!(
                state.gates.get(&gate),
                Some(&GateState::Pending),
                "recording destroyed while its submission is pending"
            );
        }
    }
}

pub struct MockChain {
    id: usize,
    info: ChainInfo,
    next_image: Cell<u32>,
    state: Shared,
}

impl MockChain {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Drop for MockChain {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.live.chains -= 1;
        state.events.push(Event::DropChain { chain: self.id });
        if !std::thread::panicking() {
            assert!(
                state.pending.iter().all(|s| s.chain != Some(self.id)),
                "chain {} destroyed while GPU work references it",
                self.id
            );
        }
    }
}

pub struct MockDescription {
    id: usize,
    format: vk::Format,
    state: Shared,
}

impl Drop for MockDescription {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.live.descriptions -= 1;
        if !std::thread::panicking() {
            assert!(
                state.pipelines.values().all(|&d| d != self.id),
                "description destroyed before its pipeline"
            );
            assert!(
                state.target_sets.values().all(|t| t.description != self.id),
                "description destroyed before its drawable targets"
            );
        }
    }
}

pub struct MockDrawTarget {
    set: usize,
    image: u32,
}

impl MockDrawTarget {
    pub fn image(&self) -> u32 {
        self.image
    }

    /// Id of the draw-target set this target belongs to.
    pub fn set(&self) -> usize {
        self.set
    }
}

pub struct MockDrawTargets {
    id: usize,
    targets: Vec<MockDrawTarget>,
    state: Shared,
}

impl Drop for MockDrawTargets {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.target_sets.remove(&self.id);
        state.live.draw_targets -= 1;
        if !std::thread::panicking() {
            assert!(
                state.pending.iter().all(|s| s.targets != Some(self.id)),
                "drawable targets destroyed while GPU work references them"
            );
        }
    }
}

pub struct MockPipeline {
    id: usize,
    extent: vk::Extent2D,
    state: Shared,
}

impl MockPipeline {
    /// Extent the pipeline was built for.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for MockPipeline {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.pipelines.remove(&self.id);
        state.live.pipelines -= 1;
    }
}

/// [`GpuContext`] over the shared mock state.
pub struct MockContext {
    state: Shared,
}

impl MockContext {
    pub fn create_pipeline(
        &self,
        params: &PipelineParams<'_, MockContext>,
    ) -> RhiResult<MockPipeline> {
        let mut state = self.state.borrow_mut();
        state.fail(FailPoint::BuildPipeline)?;
        assert_eq!(params.format, params.description.format);

        let id = state.next_id();
        state.pipelines.insert(id, params.description.id);
        state.live.pipelines += 1;
        state.events.push(Event::BuildPipeline {
            extent: params.extent,
        });
        Ok(MockPipeline {
            id,
            extent: params.extent,
            state: self.state.clone(),
        })
    }
}

impl GpuContext for MockContext {
    type Gate = MockGate;
    type Signal = MockSignal;
    type Recording = MockRecording;
    type Chain = MockChain;
    type TargetDescription = MockDescription;
    type DrawTargets = MockDrawTargets;
    type DrawTarget = MockDrawTarget;
    type Pipeline = MockPipeline;

    fn create_gate(&self, signaled: bool) -> RhiResult<MockGate> {
        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        let gate = if signaled {
            GateState::Signaled
        } else {
            GateState::Unsignaled
        };
        state.gates.insert(id, gate);
        state.live.gates += 1;
        Ok(MockGate {
            id,
            state: self.state.clone(),
        })
    }

    fn wait_gate(&self, gate: &MockGate, _timeout: Duration) -> RhiResult<GateStatus> {
        let mut state = self.state.borrow_mut();
        match state.gate(gate.id) {
            GateState::Signaled => Ok(GateStatus::Signaled),
            GateState::Pending if state.hang_gpu => Ok(GateStatus::TimedOut),
            GateState::Pending => {
                state.retire_through(gate.id);
                Ok(GateStatus::Signaled)
            }
            GateState::Unsignaled => panic!("waiting on gate {} that was never submitted", gate.id),
        }
    }

    fn reset_gate(&self, gate: &MockGate) -> RhiResult<()> {
        let mut state = self.state.borrow_mut();
        assert_ne!(
            state.gate(gate.id),
            GateState::Pending,
            "gate reset while its submission is pending"
        );
        state.gates.insert(gate.id, GateState::Unsignaled);
        Ok(())
    }

    fn create_signal(&self) -> RhiResult<MockSignal> {
        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.signals.insert(id, false);
        state.live.signals += 1;
        Ok(MockSignal {
            id,
            state: self.state.clone(),
        })
    }

    fn create_recording(&self) -> RhiResult<MockRecording> {
        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.recordings.insert(id, RecordingState::default());
        state.live.recordings += 1;
        Ok(MockRecording {
            id,
            state: self.state.clone(),
        })
    }

    fn begin_recording(&self, recording: &MockRecording) -> RhiResult<()> {
        let mut state = self.state.borrow_mut();
        let last_gate = state.recordings[&recording.id].last_gate;
        if let Some(gate) = last_gate {
            assert_ne!(
                state.gate(gate),
                GateState::Pending,
                "recording reused while its submission is in flight"
            );
        }
        let entry = state
            .recordings
            .get_mut(&recording.id)
            .expect("live recording");
        assert!(!entry.open, "recording begun twice");
        entry.open = true;
        entry.targets = None;
        Ok(())
    }

    fn end_recording(&self, recording: &MockRecording) -> RhiResult<()> {
        let mut state = self.state.borrow_mut();
        let entry = state
            .recordings
            .get_mut(&recording.id)
            .expect("live recording");
        assert!(entry.open, "recording ended without begin");
        assert!(!entry.in_target, "recording ended inside a drawable target");
        entry.open = false;
        Ok(())
    }

    fn create_chain(
        &self,
        extent: vk::Extent2D,
        previous: Option<&MockChain>,
    ) -> RhiResult<MockChain> {
        let mut state = self.state.borrow_mut();
        state.fail(FailPoint::CreateChain)?;
        assert!(
            extent.width > 0 && extent.height > 0,
            "chain created with a zero extent"
        );

        let id = state.next_id();
        state.live.chains += 1;
        state.events.push(Event::CreateChain {
            chain: id,
            extent,
            replaced: previous.map(MockChain::id),
        });
        Ok(MockChain {
            id,
            info: ChainInfo {
                extent,
                format: MOCK_FORMAT,
                image_count: MOCK_IMAGE_COUNT,
            },
            next_image: Cell::new(0),
            state: self.state.clone(),
        })
    }

    fn chain_info(&self, chain: &MockChain) -> ChainInfo {
        chain.info
    }

    fn acquire_image(
        &self,
        chain: &MockChain,
        signal: &MockSignal,
        _timeout: Duration,
    ) -> RhiResult<Acquired> {
        let mut state = self.state.borrow_mut();
        state.fail(FailPoint::Acquire)?;
        assert!(
            !state.signals[&signal.id],
            "acquire signal still has an unconsumed signal"
        );

        let result = if state.acquire_timeouts > 0 {
            state.acquire_timeouts -= 1;
            Acquired::TimedOut
        } else if state.surface_extent != chain.info.extent {
            Acquired::NeedsRecreate
        } else {
            let image = chain.next_image.get();
            chain.next_image.set((image + 1) % chain.info.image_count);
            state.signals.insert(signal.id, true);
            if state.suboptimal_acquires > 0 {
                state.suboptimal_acquires -= 1;
                Acquired::SuboptimalButUsable(image)
            } else {
                Acquired::Ready(image)
            }
        };

        state.events.push(Event::Acquire {
            chain: chain.id,
            result,
        });
        Ok(result)
    }

    fn submit(
        &self,
        recording: &MockRecording,
        wait: &MockSignal,
        signal: &MockSignal,
        gate: &MockGate,
    ) -> RhiResult<()> {
        let mut state = self.state.borrow_mut();
        state.fail(FailPoint::Submit)?;

        assert_eq!(
            state.gate(gate.id),
            GateState::Unsignaled,
            "submission fenced with a gate that was not reset"
        );
        assert!(
            state.signals[&wait.id],
            "submission waits on a signal nobody set"
        );
        assert!(
            !state.signals[&signal.id],
            "render-done signal still has an unconsumed signal"
        );

        let entry = &state.recordings[&recording.id];
        assert!(!entry.open, "submitted an open recording");
        let targets = entry.targets;
        let chain = targets.map(|set| state.target_sets[&set].chain);

        state.signals.insert(wait.id, false);
        state.signals.insert(signal.id, true);
        state.gates.insert(gate.id, GateState::Pending);
        if let Some(entry) = state.recordings.get_mut(&recording.id) {
            entry.last_gate = Some(gate.id);
        }
        state.pending.push(Submission {
            gate: gate.id,
            targets,
            chain,
        });
        state.max_in_flight = state.max_in_flight.max(state.pending.len());
        state.events.push(Event::Submit { gate: gate.id });
        Ok(())
    }

    fn present(&self, chain: &MockChain, image_index: u32, wait: &MockSignal) -> RhiResult<Presented> {
        let mut state = self.state.borrow_mut();
        assert!(
            state.signals[&wait.id],
            "present waits on a signal nobody set"
        );
        assert!(image_index < chain.info.image_count);
        state.signals.insert(wait.id, false);
        state.events.push(Event::Present {
            chain: chain.id,
            image: image_index,
            extent: chain.info.extent,
        });

        if state.surface_extent != chain.info.extent {
            Ok(Presented::NeedsRecreate)
        } else if state.suboptimal_presents > 0 {
            state.suboptimal_presents -= 1;
            Ok(Presented::SuboptimalButUsable)
        } else {
            Ok(Presented::Ok)
        }
    }

    fn wait_idle(&self) -> RhiResult<()> {
        let mut state = self.state.borrow_mut();
        state.retire_all();
        state.events.push(Event::WaitIdle);
        Ok(())
    }

    fn create_target_description(&self, info: &ChainInfo) -> RhiResult<MockDescription> {
        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.live.descriptions += 1;
        Ok(MockDescription {
            id,
            format: info.format,
            state: self.state.clone(),
        })
    }

    fn create_draw_targets(
        &self,
        chain: &MockChain,
        description: &MockDescription,
    ) -> RhiResult<MockDrawTargets> {
        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.target_sets.insert(
            id,
            TargetSet {
                description: description.id,
                chain: chain.id,
                extent: chain.info.extent,
            },
        );
        state.live.draw_targets += 1;
        Ok(MockDrawTargets {
            id,
            targets: (0..chain.info.image_count)
                .map(|image| MockDrawTarget { set: id, image })
                .collect(),
            state: self.state.clone(),
        })
    }

    fn draw_target<'a>(
        &self,
        targets: &'a MockDrawTargets,
        image_index: u32,
    ) -> Option<&'a MockDrawTarget> {
        targets.targets.get(image_index as usize)
    }

    fn begin_target(
        &self,
        recording: &MockRecording,
        description: &MockDescription,
        target: &MockDrawTarget,
        extent: vk::Extent2D,
        _clear_color: [f32; 4],
    ) {
        let mut state = self.state.borrow_mut();
        let set = &state.target_sets[&target.set];
        assert_eq!(set.description, description.id, "target from another description");
        assert_eq!(set.extent, extent, "target begun with a mismatched extent");

        let entry = state
            .recordings
            .get_mut(&recording.id)
            .expect("live recording");
        assert!(entry.open, "target begun outside a recording");
        assert!(!entry.in_target, "target begun twice");
        entry.in_target = true;
        entry.targets = Some(target.set);
    }

    fn end_target(&self, recording: &MockRecording) {
        let mut state = self.state.borrow_mut();
        let entry = state
            .recordings
            .get_mut(&recording.id)
            .expect("live recording");
        assert!(entry.in_target, "target ended without begin");
        entry.in_target = false;
    }
}

/// Window whose size is scripted by the test.
pub struct MockSurface {
    state: Shared,
}

impl SurfaceProvider for MockSurface {
    fn drawable_extent(&self) -> vk::Extent2D {
        self.state.borrow().surface_extent
    }

    fn wait_events(&mut self) {
        let mut state = self.state.borrow_mut();
        state.events.push(Event::WaitEvents);
        let Some(next) = state.scripted_extents.pop_front() else {
            panic!("wait_events with no scripted window events would block forever");
        };
        state.surface_extent = next;
    }

    fn close_requested(&self) -> bool {
        self.state.borrow().close_requested
    }
}

/// Draw `count` frames, asserting none is skipped.
pub fn draw_frames(driver: &mut MockDriver, count: usize) -> FrameResult<()> {
    for _ in 0..count {
        assert!(driver.render_frame(|_| {})?, "frame unexpectedly skipped");
    }
    Ok(())
}
