//! Mask to filter derivation and the filtering convolution.
//!
//! The host mask is resampled to one gain per bin and window. An inverse
//! transform with a half-height rotation turns each mask column into a
//! centred impulse response. Filtering multiplies each response against the
//! extended signal in groups of 32 taps and then halves the partial sums
//! until one value per signal position remains.

use super::buffers::{BufferId, ChunkLayout};
use super::params::{FilterParams, ParamArena, ResizeParams, SumParams};
use super::pass::RecordedPass;
use super::pingpong::PingPong;
use super::pipelines::Kernel;

/// One planned reduction level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level<B> {
    pub params: SumParams,
    pub source: B,
    pub target: B,
    pub workgroups: [u32; 3],
}

pub fn resize_params(layout: &ChunkLayout) -> ResizeParams {
    ResizeParams {
        src_rows: layout.host_mask_height,
        src_cols: layout.host_mask_width,
        dst_rows: layout.spec_height,
        dst_cols: layout.segment_width,
    }
}

/// Plan the reduction of `groups` partials per position down to one.
///
/// The multiply writes `scratch.written_by(0)`. Intermediate levels halve the
/// stride from `groups / 2` down to 2 at full pitch; the final level sums the
/// last pair (or copies a lone partial) into `output` at unit pitch.
pub fn plan_reduction<B: Copy>(
    groups: u32,
    signal_len: u32,
    row_groups: u32,
    scratch: PingPong<B>,
    output: B,
) -> Vec<Level<B>> {
    let levels = groups.trailing_zeros();
    let intermediate = levels.saturating_sub(1);
    let workgroups = |stride: u32| [(stride / 32).max(1), row_groups, 1];

    let mut plan: Vec<Level<B>> = (0..intermediate)
        .map(|level| {
            let stride = groups >> (level + 1);
            Level {
                params: SumParams {
                    stride,
                    out_stride: groups,
                    spec_height: groups,
                    signal_len,
                },
                source: scratch.written_by(level as usize),
                target: scratch.written_by(level as usize + 1),
                workgroups: workgroups(stride),
            }
        })
        .collect();

    let stride = if levels == 0 { 0 } else { 1 };
    plan.push(Level {
        params: SumParams {
            stride,
            out_stride: 1,
            spec_height: groups,
            signal_len,
        },
        source: scratch.written_by(intermediate as usize),
        target: output,
        workgroups: workgroups(stride),
    });
    plan
}

/// Resample the host mask into the device mask.
pub fn record_mask_read(pass: &mut RecordedPass, arena: &mut ParamArena, layout: &ChunkLayout) {
    let offset = arena.push(&resize_params(layout));
    pass.barrier(BufferId::MaskHost);
    pass.dispatch(
        Kernel::Resize,
        vec![BufferId::MaskHost, BufferId::Mask],
        offset,
        [layout.transform_groups(), layout.segment_width, 1],
    );
    pass.barrier(BufferId::Mask);
}

/// Multiply the filters against the extended signal and reduce into `SignalFilt`.
pub fn record_convolution(pass: &mut RecordedPass, arena: &mut ParamArena, layout: &ChunkLayout) {
    let scratch = PingPong::new(BufferId::FilterScratch0, BufferId::FilterScratch1);
    let signal_len = layout.signal_len() as u32;
    let row_groups = layout.row_groups() as u32;
    let groups = layout.reduction_groups();

    let offset = arena.push(&FilterParams::new(
        signal_len,
        layout.hop,
        layout.spec_height,
    ));
    pass.barrier(BufferId::Filters);
    pass.dispatch(
        Kernel::Filter,
        vec![BufferId::Filters, BufferId::SignalExt, scratch.written_by(0)],
        offset,
        [groups, row_groups, 1],
    );
    pass.barrier(scratch.written_by(0));

    for level in plan_reduction(
        groups,
        signal_len,
        row_groups,
        scratch,
        BufferId::SignalFilt,
    ) {
        let offset = arena.push(&level.params);
        pass.dispatch(
            Kernel::Sum,
            vec![level.source, level.target],
            offset,
            level.workgroups,
        );
        pass.barrier(level.target);
    }
}
