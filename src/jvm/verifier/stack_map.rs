use super::VerificationType;
use crate::jvm::{ClassConstantIndex, Serialize};
use byteorder::WriteBytesExt;

/// Verification type as it appears in a `StackMapTable`
pub type SerializableType = VerificationType<ClassConstantIndex, u16>;

/// One entry of a `StackMapTable` attribute
///
/// Locals are listed the way the attribute lists them: a `long` or `double` is one entry (even
/// though it covers two local slots). `V` is the type of entries, which is the serialized form
/// except while a reader resolves frames for its visitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame<V = SerializableType> {
    /// Frame has the same locals as the previous frame and number of stack items is zero
    /// Tags: 0-63 or 251
    SameLocalsNoStack { offset_delta: u16 },

    /// Frame has the same locals as the previous frame and number of stack items is one
    /// Tags: 64-127 or 247
    SameLocalsOneStack {
        offset_delta: u16,
        stack: V,
    },

    /// Frame is like the previous frame, but without the last `chopped_k` locals
    /// Tags: 248-250
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Frame is like the previous frame, but with 1-3 extra locals
    /// Tags: 252-254
    AppendLocalsNoStack { offset_delta: u16, locals: Vec<V> },

    /// Tag: 255
    Full {
        offset_delta: u16,
        locals: Vec<V>,
        stack: Vec<V>,
    },
}

impl<V: Clone + PartialEq> StackMapFrame<V> {
    /// Compute a stack map frame for this frame, given the previous frame's locals
    ///
    /// This will fall back to the `Full` option only if none of the other stack map frame
    /// variants are enough to encode the transition.
    pub fn compress(
        offset_delta: u16,
        locals: &[V],
        stack: &[V],
        previous_locals: &[V],
    ) -> StackMapFrame<V> {
        match stack.len() {
            0 => {
                let this_locals_len = locals.len();
                let prev_locals_len = previous_locals.len();

                if this_locals_len <= prev_locals_len {
                    let len_difference = prev_locals_len - this_locals_len;
                    let this_is_prefix_of_prev = locals
                        .iter()
                        .zip(previous_locals.iter())
                        .all(|(t1, t2)| t1 == t2);

                    if len_difference < 4 && this_is_prefix_of_prev {
                        if len_difference == 0 {
                            return StackMapFrame::SameLocalsNoStack { offset_delta };
                        } else {
                            return StackMapFrame::ChopLocalsNoStack {
                                offset_delta,
                                chopped_k: len_difference as u8,
                            };
                        }
                    }
                } else if this_locals_len - prev_locals_len < 4 {
                    let (prefix, added) = locals.split_at(prev_locals_len);
                    if prefix == previous_locals {
                        return StackMapFrame::AppendLocalsNoStack {
                            offset_delta,
                            locals: added.to_vec(),
                        };
                    }
                }
            }
            1 if locals == previous_locals => {
                return StackMapFrame::SameLocalsOneStack {
                    offset_delta,
                    stack: stack[0].clone(),
                }
            }
            _ => (),
        }

        StackMapFrame::Full {
            offset_delta,
            locals: locals.to_vec(),
            stack: stack.to_vec(),
        }
    }

    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::SameLocalsNoStack { offset_delta }
            | StackMapFrame::SameLocalsOneStack { offset_delta, .. }
            | StackMapFrame::ChopLocalsNoStack { offset_delta, .. }
            | StackMapFrame::AppendLocalsNoStack { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }

    /// Full locals and stack of this frame, given the previous frame's locals
    ///
    /// Returns `None` if the frame chops more locals than there are.
    pub fn expand(&self, previous_locals: &[V]) -> Option<(Vec<V>, Vec<V>)> {
        let expanded = match self {
            StackMapFrame::SameLocalsNoStack { .. } => (previous_locals.to_vec(), vec![]),
            StackMapFrame::SameLocalsOneStack { stack, .. } => {
                (previous_locals.to_vec(), vec![stack.clone()])
            }
            StackMapFrame::ChopLocalsNoStack { chopped_k, .. } => {
                let kept = previous_locals.len().checked_sub(*chopped_k as usize)?;
                (previous_locals[..kept].to_vec(), vec![])
            }
            StackMapFrame::AppendLocalsNoStack { locals, .. } => {
                let mut all_locals = previous_locals.to_vec();
                all_locals.extend(locals.iter().cloned());
                (all_locals, vec![])
            }
            StackMapFrame::Full { locals, stack, .. } => (locals.clone(), stack.clone()),
        };
        Some(expanded)
    }

    /// Every verification type mentioned in the frame
    pub fn types(&self) -> Vec<&V> {
        match self {
            StackMapFrame::SameLocalsNoStack { .. } | StackMapFrame::ChopLocalsNoStack { .. } => {
                vec![]
            }
            StackMapFrame::SameLocalsOneStack { stack, .. } => vec![stack],
            StackMapFrame::AppendLocalsNoStack { locals, .. } => locals.iter().collect(),
            StackMapFrame::Full { locals, stack, .. } => locals.iter().chain(stack).collect(),
        }
    }

    /// Convert every verification type in the frame
    pub fn try_map<W, E>(
        &self,
        mut convert: impl FnMut(&V) -> Result<W, E>,
    ) -> Result<StackMapFrame<W>, E> {
        fn convert_all<V, W, E>(
            types: &[V],
            convert: &mut impl FnMut(&V) -> Result<W, E>,
        ) -> Result<Vec<W>, E> {
            types.iter().map(convert).collect()
        }

        let mapped = match self {
            StackMapFrame::SameLocalsNoStack { offset_delta } => StackMapFrame::SameLocalsNoStack {
                offset_delta: *offset_delta,
            },
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => StackMapFrame::SameLocalsOneStack {
                offset_delta: *offset_delta,
                stack: convert(stack)?,
            },
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => StackMapFrame::ChopLocalsNoStack {
                offset_delta: *offset_delta,
                chopped_k: *chopped_k,
            },
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => StackMapFrame::AppendLocalsNoStack {
                offset_delta: *offset_delta,
                locals: convert_all(locals, &mut convert)?,
            },
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => StackMapFrame::Full {
                offset_delta: *offset_delta,
                locals: convert_all(locals, &mut convert)?,
                stack: convert_all(stack, &mut convert)?,
            },
        };
        Ok(mapped)
    }
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            // `same_frame` and `same_frame_extended`
            StackMapFrame::SameLocalsNoStack { offset_delta } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8).serialize(writer)?;
                } else {
                    251u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
            }

            // `same_locals_1_stack_item_frame` and `same_locals_1_stack_item_frame_extended`
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8 + 64).serialize(writer)?;
                } else {
                    247u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
                stack.serialize(writer)?;
            }

            // `chop_frame`
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => {
                (251 - chopped_k).serialize(writer)?;
                offset_delta.serialize(writer)?;
            }

            // `append_frame`
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => {
                (251 + locals.len() as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }

            // `full_frame`
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        };
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::ConstantIndex;
    use VerificationType::*;

    fn object(index: u16) -> SerializableType {
        Object(ClassConstantIndex(ConstantIndex(index)))
    }

    #[test]
    fn compression_variants() {
        let prev = vec![object(2), Integer];

        assert_eq!(
            StackMapFrame::compress(5, &[object(2), Integer], &[], &prev),
            StackMapFrame::SameLocalsNoStack { offset_delta: 5 }
        );
        assert_eq!(
            StackMapFrame::compress(5, &[object(2), Integer], &[Long], &prev),
            StackMapFrame::SameLocalsOneStack {
                offset_delta: 5,
                stack: Long
            }
        );
        assert_eq!(
            StackMapFrame::compress(0, &[object(2)], &[], &prev),
            StackMapFrame::ChopLocalsNoStack {
                offset_delta: 0,
                chopped_k: 1
            }
        );
        assert_eq!(
            StackMapFrame::compress(1, &[object(2), Integer, Double, Top], &[], &prev),
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 1,
                locals: vec![Double, Top]
            }
        );
        assert_eq!(
            StackMapFrame::compress(1, &[Integer], &[], &prev),
            StackMapFrame::Full {
                offset_delta: 1,
                locals: vec![Integer],
                stack: vec![]
            }
        );
        assert_eq!(
            StackMapFrame::compress(1, &[object(2)], &[Null, Null], &prev),
            StackMapFrame::Full {
                offset_delta: 1,
                locals: vec![object(2)],
                stack: vec![Null, Null]
            }
        );
    }

    #[test]
    fn serialized_tags() {
        let mut bytes = vec![];
        StackMapFrame::SameLocalsNoStack { offset_delta: 63 }
            .serialize(&mut bytes)
            .unwrap();
        StackMapFrame::SameLocalsNoStack { offset_delta: 64 }
            .serialize(&mut bytes)
            .unwrap();
        StackMapFrame::SameLocalsOneStack {
            offset_delta: 2,
            stack: object(9),
        }
        .serialize(&mut bytes)
        .unwrap();
        StackMapFrame::ChopLocalsNoStack {
            offset_delta: 3,
            chopped_k: 2,
        }
        .serialize(&mut bytes)
        .unwrap();
        StackMapFrame::AppendLocalsNoStack {
            offset_delta: 4,
            locals: vec![Integer],
        }
        .serialize(&mut bytes)
        .unwrap();
        assert_eq!(
            bytes,
            vec![63, 251, 0, 64, 66, 7, 0, 9, 249, 0, 3, 252, 0, 4, 1]
        );
    }

    #[test]
    fn expansion() {
        let prev = vec![object(2), Integer];
        let chop = StackMapFrame::ChopLocalsNoStack {
            offset_delta: 0,
            chopped_k: 3,
        };
        assert_eq!(chop.expand(&prev), None);

        let append = StackMapFrame::AppendLocalsNoStack {
            offset_delta: 0,
            locals: vec![Float],
        };
        assert_eq!(
            append.expand(&prev),
            Some((vec![object(2), Integer, Float], vec![]))
        );
    }
}
