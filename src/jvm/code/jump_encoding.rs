//! Pick the encoding of every jump
//!
//! Most jump instructions take a signed 16-bit relative offset. Jumps further than that need a
//! different encoding: `goto` and `jsr` become `goto_w` and `jsr_w`, while conditional jumps get
//! rewritten into the inverted condition hopping over a `goto_w`:
//!
//! ```text,ignore,no_run
//!     if* L2                ifnot* +8
//! L1: ...         =>        goto_w L2
//!     ...               L1: ...
//! L2: ...               L2: ...
//! ```
//!
//! ### Fixed point
//!
//! Every jump starts out in its wide encoding (which is always valid) and the layout is then
//! shrunk. Each pass computes the offsets of all instructions under the current choice of
//! encodings and narrows every wide jump whose distance fits in 16 bits. Narrowing a jump only
//! ever brings other jumps closer to their targets, with one exception: the alignment padding of
//! `tableswitch`/`lookupswitch` can grow by up to 3 bytes when the switch moves. When that pushes
//! an already narrowed jump out of range, the jump goes back to being wide and is pinned there.
//!
//! ### Termination
//!
//! A jump can be narrowed at most once and widened again at most once (after which it is pinned),
//! and every pass except the last changes at least one jump.

use super::Insn;
use std::ops::{RangeBounds, RangeInclusive};

/// Range of relative jump offsets supported by `goto` and `if*` branch instructions
pub const SIGNED_16BIT_JUMP_RANGE: RangeInclusive<i64> =
    RangeInclusive::new(i16::MIN as i64, i16::MAX as i64);

/// Encoding chosen for a jump
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum JumpWidth {
    /// 16-bit relative offset (`goto`, `if*`, `jsr`)
    Narrow,

    /// 32-bit relative offset (`goto_w`, `jsr_w`, or `ifnot* +8; goto_w`)
    Wide,
}

/// Final positions of the instructions in a method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Byte offset of every instruction, plus the code length as the last element
    pub offsets: Vec<usize>,

    /// Encoding of every instruction (always `Narrow` for non-jumps)
    pub widths: Vec<JumpWidth>,

    /// Number of passes it took to reach the fixed point
    pub passes: usize,
}

impl Layout {
    pub fn code_length(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// Byte offset of the instruction at this arena index (or the code length, for the index
    /// one past the end)
    pub fn offset(&self, insn_index: usize) -> usize {
        self.offsets[insn_index]
    }

    /// Is this a conditional jump that got rewritten into `ifnot* +8; goto_w`?
    pub fn is_wide_conditional(&self, insns: &[Insn], insn_index: usize) -> bool {
        match &insns[insn_index] {
            Insn::Jump { opcode, .. } => {
                self.widths[insn_index] == JumpWidth::Wide
                    && crate::jvm::opcodes::is_conditional_jump(*opcode)
            }
            _ => false,
        }
    }
}

/// Find the narrowest encodings that fit
///
/// `placements` maps every label (by index) to the arena index of the instruction it precedes.
/// The `small_jump_range` parameter should always be `SIGNED_16BIT_JUMP_RANGE` - it is a
/// parameter only for unit testing purposes.
pub fn resolve_jumps(
    insns: &[Insn],
    placements: &[usize],
    small_jump_range: &impl RangeBounds<i64>,
) -> Layout {
    let mut widths: Vec<JumpWidth> = insns
        .iter()
        .map(|insn| {
            if insn.is_jump() {
                JumpWidth::Wide
            } else {
                JumpWidth::Narrow
            }
        })
        .collect();
    let mut pinned: Vec<bool> = vec![false; insns.len()];
    let mut offsets: Vec<usize> = vec![0; insns.len() + 1];
    let mut passes = 0;

    loop {
        passes += 1;
        compute_offsets(insns, &widths, &mut offsets);

        let mut changed = false;
        for (insn_index, insn) in insns.iter().enumerate() {
            if let Insn::Jump { target, .. } = insn {
                let target_offset = offsets[placements[target.index()]] as i64;
                let distance = target_offset - offsets[insn_index] as i64;
                let fits = small_jump_range.contains(&distance);

                match widths[insn_index] {
                    JumpWidth::Wide if fits && !pinned[insn_index] => {
                        widths[insn_index] = JumpWidth::Narrow;
                        changed = true;
                    }
                    JumpWidth::Narrow if !fits => {
                        log::debug!(
                            "Jump at offset {} pushed out of range by switch padding",
                            offsets[insn_index]
                        );
                        widths[insn_index] = JumpWidth::Wide;
                        pinned[insn_index] = true;
                        changed = true;
                    }
                    _ => (),
                }
            }
        }

        if !changed {
            break;
        }
    }

    log::debug!(
        "Resolved jumps in {} passes ({} wide, {} bytes)",
        passes,
        insns
            .iter()
            .zip(&widths)
            .filter(|(insn, width)| insn.is_jump() && **width == JumpWidth::Wide)
            .count(),
        offsets[insns.len()],
    );

    Layout {
        offsets,
        widths,
        passes,
    }
}

fn compute_offsets(insns: &[Insn], widths: &[JumpWidth], offsets: &mut [usize]) {
    let mut offset = 0;
    for (insn_index, insn) in insns.iter().enumerate() {
        offsets[insn_index] = offset;
        offset += insn.size(offset, widths[insn_index]);
    }
    offsets[insns.len()] = offset;
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::LabelGenerator;
    use crate::jvm::opcodes::*;

    const NOP_INSN: Insn = Insn::Simple(NOP);

    #[test]
    fn short_jumps_are_narrow() {
        let mut labels = LabelGenerator::new();
        let end = labels.fresh_label();
        let insns = vec![
            Insn::Jump {
                opcode: GOTO,
                target: end,
            },
            NOP_INSN,
            NOP_INSN,
            NOP_INSN,
            NOP_INSN,
        ];
        let layout = resolve_jumps(&insns, &[4], &SIGNED_16BIT_JUMP_RANGE);
        assert_eq!(layout.widths[0], JumpWidth::Narrow);
        assert_eq!(layout.offsets, vec![0, 3, 4, 5, 6, 7]);
        assert_eq!(layout.code_length(), 7);
        assert_eq!(layout.passes, 2);
    }

    #[test]
    fn long_jumps_stay_wide() {
        let mut labels = LabelGenerator::new();
        let end = labels.fresh_label();
        let start = labels.fresh_label();
        let mut insns = vec![Insn::Jump {
            opcode: IFNULL,
            target: end,
        }];
        insns.extend((0..12).map(|_| NOP_INSN));
        insns.push(Insn::Jump {
            opcode: GOTO,
            target: start,
        });

        let layout = resolve_jumps(&insns, &[13, 0], &(-10..=10));
        assert_eq!(layout.widths[0], JumpWidth::Wide);
        assert_eq!(layout.widths[13], JumpWidth::Wide);
        assert!(layout.is_wide_conditional(&insns, 0));
        assert_eq!(layout.offset(13), 8 + 12);
        assert_eq!(layout.code_length(), 8 + 12 + 5);
    }

    #[test]
    fn narrowing_brings_other_jumps_in_range() {
        let mut labels = LabelGenerator::new();
        let target = labels.fresh_label();
        let insns = vec![
            Insn::Jump {
                opcode: GOTO,
                target,
            },
            Insn::Jump {
                opcode: GOTO,
                target,
            },
            NOP_INSN,
            NOP_INSN,
        ];

        // Initially the first jump spans 11 bytes, but only 9 once the second one is narrowed
        let layout = resolve_jumps(&insns, &[3], &(-10..=10));
        assert_eq!(layout.widths, vec![JumpWidth::Narrow; 4]);
        assert_eq!(layout.offsets, vec![0, 3, 6, 7, 8]);
        assert_eq!(layout.passes, 3);
    }

    #[test]
    fn switch_padding_pins_jump_wide() {
        let mut labels = LabelGenerator::new();
        let next = labels.fresh_label();
        let after_switch = labels.fresh_label();
        let insns = vec![
            NOP_INSN,
            NOP_INSN,
            Insn::Jump {
                opcode: IFEQ,
                target: next,
            },
            Insn::Jump {
                opcode: GOTO,
                target: after_switch,
            },
            Insn::LookupSwitch {
                default: after_switch,
                pairs: vec![],
            },
            NOP_INSN,
        ];

        // Narrowing the `ifeq` moves the switch so that its padding grows from 0 to 3 bytes,
        // which pushes the (already narrowed) `goto` out of range.
        let layout = resolve_jumps(&insns, &[3, 5], &(-14..=14));
        assert_eq!(layout.widths[2], JumpWidth::Narrow);
        assert_eq!(layout.widths[3], JumpWidth::Wide);
        assert_eq!(layout.offsets, vec![0, 1, 2, 5, 10, 20, 21]);
        assert_eq!(layout.passes, 3);
    }
}
