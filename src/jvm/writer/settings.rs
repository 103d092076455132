use crate::jvm::verifier::{ClassHierarchy, MergePolicy, UnknownHierarchy};

/// What the writer recomputes for every method body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeMode {
    /// Max stack, max locals, and the `StackMapTable` (for class versions that have one)
    Frames,

    /// Max stack and max locals only, with no `StackMapTable` ever
    MaxsOnly,
}

impl Default for ComputeMode {
    fn default() -> ComputeMode {
        ComputeMode::Frames
    }
}

pub struct WriterSettings {
    pub compute: ComputeMode,

    /// How to treat operand stack entries that disagree where control flow merges
    ///
    /// Only matters when frames are computed: with [`ComputeMode::MaxsOnly`] merging is always
    /// lenient.
    pub merge_policy: MergePolicy,

    /// Oracle for the superclasses of classes mentioned in method bodies
    ///
    /// The class being written is added on top of this from its header.
    pub hierarchy: Box<dyn ClassHierarchy>,

    /// Overwrite unreachable code with `nop`s followed by `athrow`
    ///
    /// Only done when frames are emitted, since the verifier otherwise never looks at dead code.
    pub replace_dead_code: bool,
}

impl WriterSettings {
    pub fn new() -> WriterSettings {
        WriterSettings {
            compute: ComputeMode::Frames,
            merge_policy: MergePolicy::Strict,
            hierarchy: Box::new(UnknownHierarchy),
            replace_dead_code: true,
        }
    }

    /// Settings for output that will never have a `StackMapTable`
    pub fn maxs_only() -> WriterSettings {
        WriterSettings {
            compute: ComputeMode::MaxsOnly,
            merge_policy: MergePolicy::Lenient,
            ..WriterSettings::new()
        }
    }

    pub fn with_hierarchy(mut self, hierarchy: impl ClassHierarchy + 'static) -> WriterSettings {
        self.hierarchy = Box::new(hierarchy);
        self
    }

    /// Policy actually used when merging frames
    pub fn effective_merge_policy(&self) -> MergePolicy {
        match self.compute {
            ComputeMode::Frames => self.merge_policy,
            ComputeMode::MaxsOnly => MergePolicy::Lenient,
        }
    }
}

impl Default for WriterSettings {
    fn default() -> WriterSettings {
        WriterSettings::new()
    }
}
