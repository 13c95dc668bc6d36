//! Operation options

/// Options accepted by mutation, import, and export operations.
///
/// Operations ignore options that do not apply to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcflOption {
    /// Replace an occupied logical path instead of failing. Only the
    /// logical-path binding is replaced; previously committed content is
    /// never removed.
    Overwrite,
    /// The operation may consume (move) its source files instead of
    /// copying them.
    MoveSource,
    /// Skip post-operation validation on import/export.
    NoValidation,
}
