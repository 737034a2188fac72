//! Presentation chain manager.
//!
//! Owns the current image chain, the resources that depend on it, and a
//! generation counter bumped on every recreation.
//!
//! # Recreation protocol
//!
//! 1. Wait for the device to go idle, so nothing reads the old chain.
//! 2. Release the dependent resources of the old chain.
//! 3. Create the new chain, handing the old one over as `previous`.
//! 4. Drop the old chain.
//! 5. Rebuild description, drawable targets and pipeline, in that order.

use std::time::Duration;

use ash::vk;
use tracing::{debug, info, warn};

use swapframe_rhi::RhiResult;

use crate::backend::{Acquired, ChainInfo, GateStatus, GpuContext, PipelineFactory, Presented, is_drawable};
use crate::dependent::DependentResources;
use crate::frame_slot::FrameSlot;

/// Generation of the chain created at startup.
pub const INITIAL_GENERATION: u64 = 1;

/// The image chain plus its dependent resources.
pub struct PresentationChain<C: GpuContext> {
    // Dropped before the chain they were built from.
    dependents: DependentResources<C>,
    chain: C::Chain,
    info: ChainInfo,
    generation: u64,
}

impl<C: GpuContext> PresentationChain<C> {
    /// Create the startup chain for `extent` and build its dependents.
    pub fn new(context: &C, extent: vk::Extent2D) -> RhiResult<Self> {
        assert!(
            is_drawable(extent),
            "presentation chain requested for a degenerate extent {}x{}",
            extent.width,
            extent.height
        );

        let chain = context.create_chain(extent, None)?;
        let info = context.chain_info(&chain);

        let mut dependents = DependentResources::new();
        dependents.rebuild(context, &chain, INITIAL_GENERATION)?;

        info!(
            "Presentation chain created: {}x{}, {:?}, {} images",
            info.extent.width, info.extent.height, info.format, info.image_count
        );

        Ok(Self {
            dependents,
            chain,
            info,
            generation: INITIAL_GENERATION,
        })
    }

    /// Wait until `slot` may be reused, then request the next image.
    ///
    /// The slot's gate is reset only once an image was acquired, so a stale
    /// chain or a timeout leaves it signaled and the retry cannot deadlock.
    pub fn acquire_next(
        &self,
        context: &C,
        slot: &FrameSlot<C>,
        timeout: Duration,
    ) -> RhiResult<Acquired> {
        if context.wait_gate(slot.gate(), timeout)? == GateStatus::TimedOut {
            warn!(
                timeout_ms = millis(timeout),
                "Frame slot still busy after timeout"
            );
            return Ok(Acquired::TimedOut);
        }

        let acquired = context.acquire_image(&self.chain, slot.acquire_signal(), timeout)?;
        match acquired {
            Acquired::Ready(_) => context.reset_gate(slot.gate())?,
            Acquired::SuboptimalButUsable(image) => {
                debug!(image, "Acquired image from a suboptimal chain");
                context.reset_gate(slot.gate())?;
            }
            Acquired::NeedsRecreate => debug!("Chain is out of date on acquire"),
            Acquired::TimedOut => warn!(
                timeout_ms = millis(timeout),
                "No presentable image within timeout"
            ),
        }
        Ok(acquired)
    }

    /// Queue `image_index` for display after the slot's render-done signal.
    pub fn present(&self, context: &C, slot: &FrameSlot<C>, image_index: u32) -> RhiResult<Presented> {
        let presented = context.present(&self.chain, image_index, slot.render_done_signal())?;
        if presented != Presented::Ok {
            debug!(image = image_index, ?presented, "Chain is stale after present");
        }
        Ok(presented)
    }

    /// Rebuild the chain and its dependents for `extent`.
    ///
    /// # Panics
    ///
    /// Panics if `extent` has zero area; callers wait for a drawable extent
    /// first.
    pub fn recreate(&mut self, context: &C, extent: vk::Extent2D) -> RhiResult<()> {
        assert!(
            is_drawable(extent),
            "presentation chain recreated for a degenerate extent {}x{}",
            extent.width,
            extent.height
        );

        context.wait_idle()?;
        self.dependents.release();

        let chain = context.create_chain(extent, Some(&self.chain))?;
        drop(std::mem::replace(&mut self.chain, chain));

        self.generation += 1;
        self.info = context.chain_info(&self.chain);
        self.dependents.rebuild(context, &self.chain, self.generation)?;

        info!(
            generation = self.generation,
            "Presentation chain recreated: {}x{}, {:?}, {} images",
            self.info.extent.width,
            self.info.extent.height,
            self.info.format,
            self.info.image_count
        );
        Ok(())
    }

    /// Register the pipeline factory, building the pipeline for the current
    /// chain. The GPU must not be using the previous pipeline.
    pub fn register_pipeline<F>(&mut self, context: &C, factory: F) -> RhiResult<()>
    where
        F: PipelineFactory<C> + 'static,
    {
        self.dependents.register_pipeline(context, factory)
    }

    #[inline]
    pub fn info(&self) -> ChainInfo {
        self.info
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.info.extent
    }

    /// Incremented by every recreation.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn chain(&self) -> &C::Chain {
        &self.chain
    }

    #[inline]
    pub fn dependents(&self) -> &DependentResources<C> {
        &self.dependents
    }
}

/// Whole milliseconds for log fields, saturating instead of truncating.
fn millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}
