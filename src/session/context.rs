use crate::models::{Parametrization, SuiteKey, Target};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// A runner item about to execute a suite. Fixtures are set up under this frame,
    /// before the suite body itself is on the stack.
    Item(SuiteKey),
    Suite(SuiteKey),
    Case(Target),
    Fixture(Target),
}

/// One live instrumented invocation and the argument values bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub bindings: Parametrization,
}

impl Frame {
    pub fn new(kind: FrameKind, bindings: Parametrization) -> Self {
        Self { kind, bindings }
    }

    pub fn bare(kind: FrameKind) -> Self {
        Self::new(kind, Parametrization::new())
    }
}

/// The explicit calling context: frames pushed by the session as invocations nest.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    frames: Vec<Frame>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Drop every frame above `depth`.
    pub fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Frames from the innermost invocation outwards.
    pub fn innermost_first(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().rev()
    }

    /// Copy of the context as seen by an invocation that is about to start.
    pub fn snapshot(&self) -> CallContext {
        self.clone()
    }
}
