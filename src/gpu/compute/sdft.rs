//! Multi-stage sliding DFT sequencing.
//!
//! A height-`H` transform runs `log2(H)` butterfly stages over every window at
//! once. Stage `s` uses stride `2^(log2(H) - s - 1)`; the first stage reads the
//! source windows `hop` apart, intermediate stages alternate between the two
//! scratch buffers and the last stage writes natural bin order into the
//! destination. A height of one is a single scaled copy.

use super::buffers::{BufferId, ChunkLayout};
use super::params::{ParamArena, SdftParams};
use super::pass::RecordedPass;
use super::pingpong::PingPong;
use super::pipelines::Kernel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Inverse,
}

/// A transform of every window of one buffer into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transform<B> {
    pub spec_height: u32,
    /// Source distance between window starts.
    pub input_hop: u32,
    pub direction: Direction,
    /// Rotate bins by `H / 2` on output.
    pub shift: bool,
    pub input: B,
    pub output: B,
}

/// One planned stage: the parameters it runs with and where it reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage<B> {
    pub params: SdftParams,
    pub source: B,
    pub target: B,
}

/// Number of butterfly stages for a power-of-two height.
pub fn stage_count(spec_height: u32) -> u32 {
    spec_height.trailing_zeros()
}

/// Plan the stages of a transform.
pub fn plan_stages<B: Copy>(transform: &Transform<B>, scratch: PingPong<B>) -> Vec<Stage<B>> {
    let height = transform.spec_height;
    let inverse = transform.direction == Direction::Inverse;
    let stages = stage_count(height);

    if stages == 0 {
        return vec![Stage {
            params: SdftParams::stage(0, transform.input_hop, height).with_flags(
                true,
                inverse,
                transform.shift,
            ),
            source: transform.input,
            target: transform.output,
        }];
    }

    (0..stages)
        .map(|stage| {
            let first = stage == 0;
            let last = stage + 1 == stages;
            let stride = 1 << (stages - stage - 1);
            let hop = if first { transform.input_hop } else { height };
            let source = if first {
                transform.input
            } else {
                scratch.written_by(stage as usize - 1)
            };
            let target = if last {
                transform.output
            } else {
                scratch.written_by(stage as usize)
            };
            Stage {
                params: SdftParams::stage(stride, hop, height).with_flags(
                    last,
                    inverse && (first || last),
                    last && transform.shift,
                ),
                source,
                target,
            }
        })
        .collect()
}

/// Record a transform into `pass`, writing its parameter blocks to `arena`.
///
/// The input is fenced before the first stage and every stage is followed by
/// a barrier on the buffer it wrote.
pub fn record(
    pass: &mut RecordedPass,
    arena: &mut ParamArena,
    layout: &ChunkLayout,
    transform: &Transform<BufferId>,
) {
    let scratch = PingPong::new(BufferId::SdftScratch0, BufferId::SdftScratch1);
    let workgroups = [layout.transform_groups(), layout.segment_width, 1];

    pass.barrier(transform.input);
    for stage in plan_stages(transform, scratch) {
        let offset = arena.push(&stage.params);
        pass.dispatch(
            Kernel::Sdft,
            vec![stage.source, stage.target],
            offset,
            workgroups,
        );
        pass.barrier(stage.target);
    }
}
