//! Top-level parser stages.

/// Section of an embedded CPIM block being read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum CpimSection {
    /// CPIM message headers.
    Message,
    /// MIME headers of the encapsulated content.
    Mime,
}

/// Where the parser resumes on the next call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Stage {
    StartLine,
    Headers,
    Cpim(CpimSection),
    Body,
    /// The terminal piece was produced; waiting for `reset`.
    Done,
    /// A fatal error was reported.
    Failed,
}
