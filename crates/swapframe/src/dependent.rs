//! Resources that are only valid for one presentation chain.
//!
//! The render-target description, the per-image drawable targets and the
//! rendering pipeline are built against a chain's extent and format. They
//! form one rebuild group: [`DependentResources::rebuild`] drops the whole
//! previous [`DependentSet`] and installs a new one, built in dependency
//! order. A set remembers the chain generation it was built for, so a set
//! that outlived its chain is detectable with [`DependentResources::is_stale`].
//!
//! Callers must ensure the GPU no longer references the current set before
//! calling `rebuild`, `release` or `register_pipeline`.

use ash::vk;
use tracing::debug;

use swapframe_rhi::RhiResult;

use crate::backend::{GpuContext, PipelineFactory, PipelineParams};

/// One generation of chain-dependent resources.
///
/// Fields drop in declaration order: pipeline, then drawable targets, then
/// the description both were built against.
pub struct DependentSet<C: GpuContext> {
    pipeline: Option<C::Pipeline>,
    draw_targets: C::DrawTargets,
    description: C::TargetDescription,
    generation: u64,
    extent: vk::Extent2D,
    format: vk::Format,
}

impl<C: GpuContext> DependentSet<C> {
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn description(&self) -> &C::TargetDescription {
        &self.description
    }

    #[inline]
    pub fn pipeline(&self) -> Option<&C::Pipeline> {
        self.pipeline.as_ref()
    }

    fn params(&self) -> PipelineParams<'_, C> {
        PipelineParams {
            extent: self.extent,
            format: self.format,
            description: &self.description,
        }
    }
}

/// Registry owning the active [`DependentSet`] and the pipeline factory used
/// to rebuild it.
pub struct DependentResources<C: GpuContext> {
    active: Option<DependentSet<C>>,
    factory: Option<Box<dyn PipelineFactory<C>>>,
}

impl<C: GpuContext> Default for DependentResources<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: GpuContext> DependentResources<C> {
    /// Empty registry without a pipeline factory.
    pub fn new() -> Self {
        Self {
            active: None,
            factory: None,
        }
    }

    /// Register the factory that builds the rendering pipeline.
    ///
    /// If a set is live its pipeline is (re)built immediately; the previous
    /// pipeline, if any, is dropped once the new one exists.
    pub fn register_pipeline<F>(&mut self, context: &C, factory: F) -> RhiResult<()>
    where
        F: PipelineFactory<C> + 'static,
    {
        let mut factory: Box<dyn PipelineFactory<C>> = Box::new(factory);

        if let Some(set) = self.active.as_mut() {
            let pipeline = factory.build(context, &set.params())?;
            set.pipeline = Some(pipeline);
            debug!(generation = set.generation, "Pipeline built for live chain");
        }

        self.factory = Some(factory);
        Ok(())
    }

    #[inline]
    pub fn has_pipeline_factory(&self) -> bool {
        self.factory.is_some()
    }

    /// Replace the active set with one built for `chain`.
    ///
    /// The old set is dropped before anything new is created. On error the
    /// registry is left empty.
    pub fn rebuild(&mut self, context: &C, chain: &C::Chain, generation: u64) -> RhiResult<()> {
        self.release();

        let info = context.chain_info(chain);
        let description = context.create_target_description(&info)?;
        let draw_targets = context.create_draw_targets(chain, &description)?;

        let mut set = DependentSet {
            pipeline: None,
            draw_targets,
            description,
            generation,
            extent: info.extent,
            format: info.format,
        };
        if let Some(factory) = self.factory.as_mut() {
            let pipeline = factory.build(context, &set.params())?;
            set.pipeline = Some(pipeline);
        }

        debug!(
            generation,
            width = info.extent.width,
            height = info.extent.height,
            pipeline = set.pipeline.is_some(),
            "Dependent resources rebuilt"
        );
        self.active = Some(set);
        Ok(())
    }

    /// Drop the active set, keeping the factory.
    pub fn release(&mut self) {
        if let Some(set) = self.active.take() {
            debug!(generation = set.generation, "Dependent resources released");
        }
    }

    #[inline]
    pub fn active(&self) -> Option<&DependentSet<C>> {
        self.active.as_ref()
    }

    pub fn active_render_target_description(&self) -> Option<&C::TargetDescription> {
        self.active.as_ref().map(DependentSet::description)
    }

    pub fn active_pipeline(&self) -> Option<&C::Pipeline> {
        self.active.as_ref().and_then(DependentSet::pipeline)
    }

    /// Drawable target for `image_index` of the active set.
    pub fn draw_target(&self, context: &C, image_index: u32) -> Option<&C::DrawTarget> {
        self.active
            .as_ref()
            .and_then(|set| context.draw_target(&set.draw_targets, image_index))
    }

    /// Generation of the chain the active set was built for.
    pub fn generation(&self) -> Option<u64> {
        self.active.as_ref().map(DependentSet::generation)
    }

    /// Whether the active set is missing or belongs to another chain.
    pub fn is_stale(&self, chain_generation: u64) -> bool {
        self.generation() != Some(chain_generation)
    }
}
