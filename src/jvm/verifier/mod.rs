//! Frame computation for method bodies
//!
//! Starting from the types of a method's parameters, every reachable instruction is interpreted
//! abstractly over verification types. Whenever two control flow paths meet, the frames coming
//! in are merged (see [`merge_into`]) and the instructions downstream are analyzed again, until
//! nothing changes anymore. The result is:
//!
//!   - the frame at every frame point (jump targets, exception handlers, the instruction after a
//!     widened conditional jump, and replaced dead code), which ends up in the `StackMapTable`
//!   - which instructions are reachable at all
//!   - the maximum stack depth and number of locals
//!
//! The types of values are only tracked as far as frames need them: the analysis checks stack
//! depths and value widths, but does not re-verify that every instruction gets operands of the
//! right type.

mod frame;
mod hierarchy;
mod merge;
mod stack_map;
mod types;

pub use frame::*;
pub use hierarchy::*;
pub use merge::*;
pub use stack_map::*;
pub use types::*;

use crate::jvm::code::{Insn, Layout, MethodContext};
use crate::jvm::{Error, VerifierErrorKind};
use crate::util::OffsetVec;
use std::collections::BTreeMap;

/// Exception handler, with its boundaries given as instruction indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerRange {
    /// First covered instruction
    pub start: usize,

    /// First instruction no longer covered
    pub end: usize,

    /// First instruction of the handler
    pub handler: usize,

    /// Caught class, or `None` for all throwables
    pub catch_type: Option<String>,
}

/// Result of analyzing a method body
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Frames at frame points, keyed by instruction index
    pub frames: BTreeMap<usize, Frame>,

    /// Which instructions can be reached from the method entry
    pub reachable: Vec<bool>,

    pub max_stack: u16,
    pub max_locals: u16,
}

impl Analysis {
    /// Maximal runs of unreachable instructions, as `(start, end)` index pairs
    pub fn dead_runs(&self) -> Vec<(usize, usize)> {
        let mut runs = vec![];
        let mut run_start = None;
        for (insn_index, reachable) in self.reachable.iter().enumerate() {
            match (run_start, *reachable) {
                (None, false) => run_start = Some(insn_index),
                (Some(start), true) => {
                    runs.push((start, insn_index));
                    run_start = None;
                }
                _ => (),
            }
        }
        if let Some(start) = run_start {
            runs.push((start, self.reachable.len()));
        }
        runs
    }
}

/// Compute frames for a method body
///
/// `placements` maps every label (by index) to the instruction it precedes. Jumps to the end of
/// the code (or falling off of it) are errors.
pub fn analyze(
    insns: &[Insn],
    placements: &[usize],
    handlers: &[HandlerRange],
    layout: &Layout,
    context: &MethodContext,
) -> Result<Analysis, Error> {
    let insn_count = insns.len();
    let verifier_error = |insn_index: usize, kind: VerifierErrorKind| Error::VerifierError {
        method: context.display_name(),
        offset: layout.offset(insn_index),
        kind,
    };

    let initial = Frame::initial(
        context.class_name,
        context.name,
        context.descriptor,
        context.is_static,
    );
    if insn_count == 0 {
        return Err(verifier_error(0, VerifierErrorKind::FallsOffEnd));
    }

    let mut covering: Vec<Vec<&HandlerRange>> = vec![vec![]; insn_count];
    for handler in handlers {
        for covered in covering.iter_mut().take(handler.end).skip(handler.start) {
            covered.push(handler);
        }
    }

    let mut max_stack = 0;
    let mut max_locals = initial.locals.len();

    let mut in_states: Vec<Option<Frame>> = vec![None; insn_count];
    let mut queued = vec![false; insn_count];
    let mut worklist = vec![0];
    in_states[0] = Some(initial);
    queued[0] = true;

    // Merge a frame into the in-state of an instruction, queuing it if anything changed
    let flow_into = |in_states: &mut Vec<Option<Frame>>,
                         worklist: &mut Vec<usize>,
                         queued: &mut Vec<bool>,
                         from: usize,
                         to: usize,
                         incoming: &Frame|
     -> Result<(), Error> {
        if to >= insn_count {
            return Err(verifier_error(from, VerifierErrorKind::FallsOffEnd));
        }
        let changed = match &mut in_states[to] {
            Some(existing) => merge_into(
                existing,
                incoming,
                context.merge_policy,
                context.hierarchy,
            )
            .map_err(|conflict| Error::FrameConflict {
                method: context.display_name(),
                offset: layout.offset(to),
                slot: conflict.slot,
                first: conflict.first,
                second: conflict.second,
            })?,
            slot @ None => {
                *slot = Some(incoming.clone());
                true
            }
        };
        if changed && !queued[to] {
            queued[to] = true;
            worklist.push(to);
        }
        Ok(())
    };

    while let Some(insn_index) = worklist.pop() {
        queued[insn_index] = false;
        let in_state = match &in_states[insn_index] {
            Some(frame) => frame.clone(),
            None => continue,
        };
        let insn = &insns[insn_index];

        let mut out_state = in_state.clone();
        out_state
            .execute(insns, insn_index, context.class_name)
            .map_err(|kind| verifier_error(insn_index, kind))?;
        max_stack = max_stack.max(out_state.stack.offset_len().0);
        max_locals = max_locals.max(out_state.locals.len());

        for handler in &covering[insn_index] {
            let catch_type = handler
                .catch_type
                .as_deref()
                .unwrap_or(THROWABLE_NAME);
            for locals in [&in_state.locals, &out_state.locals] {
                let mut stack = OffsetVec::new();
                stack.push(VType::object(catch_type));
                let handler_entry = Frame {
                    locals: locals.clone(),
                    stack,
                };
                max_stack = max_stack.max(1);
                flow_into(
                    &mut in_states,
                    &mut worklist,
                    &mut queued,
                    insn_index,
                    handler.handler,
                    &handler_entry,
                )?;
            }
        }

        for target in insn.targets() {
            let target_index = placements[target.index()];
            flow_into(
                &mut in_states,
                &mut worklist,
                &mut queued,
                insn_index,
                target_index,
                &out_state,
            )?;
        }
        if insn.falls_through() {
            flow_into(
                &mut in_states,
                &mut worklist,
                &mut queued,
                insn_index,
                insn_index + 1,
                &out_state,
            )?;
        }
    }

    let reachable: Vec<bool> = in_states.iter().map(Option::is_some).collect();

    // Frame points among the reachable instructions
    let mut frame_points: Vec<usize> = vec![];
    for (insn_index, insn) in insns.iter().enumerate() {
        if !reachable[insn_index] {
            continue;
        }
        frame_points.extend(insn.targets().iter().map(|label| placements[label.index()]));
        if layout.is_wide_conditional(insns, insn_index) {
            frame_points.push(insn_index + 1);
        }
    }
    for handler in handlers {
        if reachable.get(handler.handler).copied().unwrap_or(false) {
            frame_points.push(handler.handler);
        }
    }

    let mut frames = BTreeMap::new();
    for frame_point in frame_points {
        if let Some(Some(frame)) = in_states.get(frame_point) {
            frames.insert(frame_point, frame.clone());
        }
    }

    let mut analysis = Analysis {
        frames,
        reachable,
        max_stack: 0,
        max_locals: 0,
    };

    if context.replace_dead_code {
        for (start, _) in analysis.dead_runs() {
            analysis.frames.insert(start, Frame::dead_code());
            max_stack = max_stack.max(1);
        }
    }

    analysis.max_stack = u16::try_from(max_stack).unwrap_or(u16::MAX);
    analysis.max_locals = u16::try_from(max_locals).unwrap_or(u16::MAX);

    log::debug!(
        "Analyzed {}: {} frames, {} unreachable instructions, max stack {}, max locals {}",
        context.display_name(),
        analysis.frames.len(),
        analysis.reachable.iter().filter(|r| !**r).count(),
        analysis.max_stack,
        analysis.max_locals,
    );

    Ok(analysis)
}
