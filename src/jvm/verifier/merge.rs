use super::hierarchy::{common_super_class, ClassHierarchy};
use super::{Frame, VType};
use crate::jvm::FrameSlot;
use crate::util::{OffsetVec, Width};

/// What happens when two control flow paths disagree on the type of a slot
///
/// Local variables that disagree always become `Top`: an unusable local is legal as long as it is
/// not read. Operand stack entries are where the policies differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Disagreeing operand stack entries are a [`crate::jvm::Error::FrameConflict`]
    Strict,

    /// Disagreeing operand stack entries of the same width become `Top`
    Lenient,
}

impl Default for MergePolicy {
    fn default() -> MergePolicy {
        MergePolicy::Strict
    }
}

/// Two types that cannot be merged, and where they were found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub slot: FrameSlot,
    pub first: String,
    pub second: String,
}

/// Least upper bound of two verification types, if there is one other than `Top`
pub fn merge_types(hierarchy: &dyn ClassHierarchy, first: &VType, second: &VType) -> Option<VType> {
    match (first, second) {
        (t1, t2) if t1 == t2 => Some(t1.clone()),
        (VType::Null, obj @ VType::Object(_)) | (obj @ VType::Object(_), VType::Null) => {
            Some(obj.clone())
        }
        (VType::Object(cls1), VType::Object(cls2)) => {
            Some(VType::Object(common_super_class(hierarchy, cls1, cls2)))
        }
        _ => None,
    }
}

/// Merge an incoming frame into the frame already recorded for an instruction
///
/// Returns whether `target` changed (so the instruction needs to be analyzed again).
pub fn merge_into(
    target: &mut Frame,
    incoming: &Frame,
    policy: MergePolicy,
    hierarchy: &dyn ClassHierarchy,
) -> Result<bool, Conflict> {
    let mut changed = false;

    // Locals: a slot missing on one side is `Top`
    let top = VType::Top;
    let locals_len = target.locals.len().max(incoming.locals.len());
    let mut merged_locals = Vec::with_capacity(locals_len);
    for slot in 0..locals_len {
        let existing = target.locals.get(slot).unwrap_or(&top);
        let other = incoming.locals.get(slot).unwrap_or(&top);
        let merged = merge_types(hierarchy, existing, other).unwrap_or(VType::Top);
        if &merged != existing {
            changed = true;
        }
        merged_locals.push(merged);
    }
    if merged_locals.len() != target.locals.len() {
        changed = true;
    }

    // Stack: heights must agree exactly
    if target.stack.offset_len() != incoming.stack.offset_len()
        || target.stack.len() != incoming.stack.len()
    {
        return Err(Conflict {
            slot: FrameSlot::StackHeight,
            first: render_stack(&target.stack),
            second: render_stack(&incoming.stack),
        });
    }
    let mut merged_stack = OffsetVec::new();
    for (index, (existing, other)) in target
        .stack
        .values()
        .zip(incoming.stack.values())
        .enumerate()
    {
        let merged = match merge_types(hierarchy, existing, other) {
            Some(merged) => merged,
            None if policy == MergePolicy::Lenient && existing.width() == 1 && other.width() == 1 => {
                VType::Top
            }
            None => {
                return Err(Conflict {
                    slot: FrameSlot::Stack(index),
                    first: existing.to_string(),
                    second: other.to_string(),
                })
            }
        };
        if &merged != existing {
            changed = true;
        }
        merged_stack.push(merged);
    }

    target.locals = merged_locals;
    target.stack = merged_stack;
    Ok(changed)
}

fn render_stack(stack: &OffsetVec<VType>) -> String {
    let entries: Vec<String> = stack.values().map(|t| t.to_string()).collect();
    format!("[{}]", entries.join(", "))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::verifier::{ClassGraph, UnknownHierarchy};
    use crate::jvm::VerificationType::*;

    fn frame(locals: Vec<VType>, stack: Vec<VType>) -> Frame {
        Frame {
            locals,
            stack: stack.into_iter().collect(),
        }
    }

    #[test]
    fn locals_become_top() {
        let mut target = frame(vec![Integer, VType::object("a/B"), Long, Top], vec![]);
        let incoming = frame(vec![Float, Null, Long, Top, Integer], vec![]);
        let changed = merge_into(&mut target, &incoming, MergePolicy::Strict, &UnknownHierarchy);
        assert_eq!(changed, Ok(true));
        assert_eq!(
            target.locals,
            vec![Top, VType::object("a/B"), Long, Top, Top]
        );

        let again = merge_into(&mut target, &incoming, MergePolicy::Strict, &UnknownHierarchy);
        assert_eq!(again, Ok(false));
    }

    #[test]
    fn stack_conflicts() {
        let mut target = frame(vec![], vec![Integer]);
        let incoming = frame(vec![], vec![Float]);
        assert_eq!(
            merge_into(&mut target, &incoming, MergePolicy::Strict, &UnknownHierarchy),
            Err(Conflict {
                slot: FrameSlot::Stack(0),
                first: String::from("int"),
                second: String::from("float"),
            })
        );
        assert_eq!(
            merge_into(&mut target, &incoming, MergePolicy::Lenient, &UnknownHierarchy),
            Ok(true)
        );
        assert_eq!(target.stack, vec![Top].into_iter().collect::<OffsetVec<_>>());

        // Widths never merge, whatever the policy
        let mut target = frame(vec![], vec![Long]);
        let incoming = frame(vec![], vec![Integer, Integer]);
        let conflict =
            merge_into(&mut target, &incoming, MergePolicy::Lenient, &UnknownHierarchy).unwrap_err();
        assert_eq!(conflict.slot, FrameSlot::StackHeight);

        let mut target = frame(vec![], vec![Integer]);
        let incoming = frame(vec![], vec![]);
        let conflict =
            merge_into(&mut target, &incoming, MergePolicy::Lenient, &UnknownHierarchy).unwrap_err();
        assert_eq!(conflict.slot, FrameSlot::StackHeight);
    }

    #[test]
    fn references_merge_to_common_superclass() {
        let mut graph = ClassGraph::new();
        graph.add_class("zoo/Animal", "java/lang/Object");
        graph.add_class("zoo/Dog", "zoo/Animal");
        graph.add_class("zoo/Cat", "zoo/Animal");

        let mut target = frame(vec![], vec![VType::object("zoo/Dog")]);
        let incoming = frame(vec![], vec![VType::object("zoo/Cat")]);
        assert_eq!(
            merge_into(&mut target, &incoming, MergePolicy::Strict, &graph),
            Ok(true)
        );
        assert_eq!(
            target.stack,
            vec![VType::object("zoo/Animal")]
                .into_iter()
                .collect::<OffsetVec<_>>()
        );

        assert_eq!(
            merge_types(&graph, &Null, &VType::object("zoo/Cat")),
            Some(VType::object("zoo/Cat"))
        );
        assert_eq!(merge_types(&graph, &Null, &Uninitialized(3)), None);
        assert_eq!(merge_types(&graph, &Uninitialized(3), &Uninitialized(4)), None);
    }
}
