use crate::errors::Phase;

/// Reported to an observer each time one file has been handled.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Progress<'a> {
    pub phase: Phase,
    pub file: &'a str,
    /// How many steps of this phase are finished, including this one.
    pub done: usize,
    pub total: usize,
}

/// Callback invoked with every [`Progress`] event of an operation.
pub type Observer<'o> = &'o mut dyn FnMut(&Progress<'_>);

/// An observer that ignores everything.
pub fn silent(_: &Progress<'_>) {}
