//! Piecewise updates of a terminal node.
//!
//! Because a buffer may cover less than the largest possible region, a
//! driver can walk a region piece by piece: request a piece, update, hand the
//! result to a sink, move on. Only the upstream closure of each piece is
//! generated, so the whole region never has to fit in memory at once.

use crate::image::{Image, Pixel};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::event::PipelineEvent;
use crate::pipeline::executor::Pipeline;
use crate::pipeline::id::NodeId;
use crate::pipeline::progress::ProgressAccumulator;
use crate::region::{Region, SplitStrategy};
use std::time::Instant;

/// One piece of a streamed update, as handed to the sink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamPiece<const D: usize> {
    /// Position of this piece, starting at 0.
    pub index: usize,
    /// Total number of pieces.
    pub count: usize,
    pub region: Region<D>,
    /// Overall progress after this piece, in `[0, 1]`.
    pub progress: f32,
}

impl<P: Pixel, const D: usize> Pipeline<P, D> {
    /// Updates `node` one piece of `region` at a time.
    ///
    /// `region` defaults to the node's largest possible region and is split
    /// into (at most) `divisions` pieces by `strategy`. After each piece the
    /// node's output buffers exactly that piece, and `sink` receives it.
    /// Returns the number of pieces processed. Afterwards the node requests
    /// its largest region again.
    pub fn stream<F>(
        &mut self,
        node: NodeId,
        region: Option<Region<D>>,
        divisions: usize,
        strategy: SplitStrategy,
        mut sink: F,
    ) -> PipelineResult<usize>
    where
        F: FnMut(&StreamPiece<D>, &Image<P, D>) -> PipelineResult<()>,
    {
        self.update_output_information(node)?;
        let largest = self.output(node)?.largest_possible_region();
        let full = region.unwrap_or(largest);
        if !largest.contains(&full) {
            return Err(PipelineError::RegionOutOfBounds {
                requested: full.to_string(),
                largest: largest.to_string(),
            });
        }

        let divisions = divisions.max(1);
        let count = strategy.number_of_splits(&full, divisions);
        let events = self.subscribe();
        let mut accumulator = ProgressAccumulator::new();
        accumulator.register(node, 1.0 / count as f32);
        let started = Instant::now();
        tracing::debug!("Streaming {} of {:?} in {} pieces ({})", full, node, count, strategy);

        let mut processed = 0;
        let result = (|| -> PipelineResult<()> {
            for index in 0..count {
                let piece = strategy.split(index, divisions, &full);
                if piece.is_empty() {
                    continue;
                }
                self.set_requested_region(node, piece)?;
                self.update(node)?;

                let mut generated = false;
                for event in events.try_iter() {
                    generated |= event == PipelineEvent::Start { node };
                    accumulator.observe(&event);
                }
                if !generated {
                    // Served from an up-to-date buffer.
                    accumulator.observe(&PipelineEvent::Start { node });
                    accumulator.observe(&PipelineEvent::Progress { node, fraction: 1.0 });
                }

                let info = StreamPiece {
                    index,
                    count,
                    region: piece,
                    progress: accumulator.accumulated(),
                };
                tracing::trace!("Streamed piece {}/{}: {}", index + 1, count, piece);
                sink(&info, self.output(node)?)?;
                processed += 1;
            }
            Ok(())
        })();

        // Also on failure, so the next plain update covers the largest region.
        self.reset_requested_region(node)?;
        result?;
        tracing::info!(
            "Streamed {:?} in {} pieces in {:?}",
            node,
            processed,
            started.elapsed()
        );
        Ok(processed)
    }

    /// Streams the whole largest region of `node` and assembles one image.
    ///
    /// The result matches a single-shot [`update`](Pipeline::update) of the
    /// largest region.
    pub fn stream_to_image(
        &mut self,
        node: NodeId,
        divisions: usize,
        strategy: SplitStrategy,
    ) -> PipelineResult<Image<P, D>> {
        self.update_output_information(node)?;
        let info = self.output(node)?.info().clone();
        let full = info.largest_possible_region;

        let mut assembled = Image::new();
        assembled.set_info(info);
        assembled.set_requested_region(full);
        assembled.allocate(full);
        self.stream(node, Some(full), divisions, strategy, |piece, image| {
            assembled.copy_region_from(image, &piece.region)
        })?;
        Ok(assembled)
    }
}
