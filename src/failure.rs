use std::fmt;

use crate::error::Error;

/// Result type returned by instrumented case, suite and fixture bodies.
pub type CaseResult<T> = std::result::Result<T, CaseFailure>;

/// A failure escaping an instrumented invocation.
///
/// Wraps the user's original error unchanged (see [`CaseFailure::downcast_ref`]) together with
/// its kind label and a marker telling enclosing invocations that the failure has already
/// been written into a record.
pub struct CaseFailure {
    error: anyhow::Error,
    kind: String,
    recorded: bool,
    /// Failures raised after this one by the same release, in the order they were raised.
    related: Vec<CaseFailure>,
}

impl CaseFailure {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            error: anyhow::Error::new(error),
            kind: short_type_name::<E>().to_string(),
            recorded: false,
            related: Vec::new(),
        }
    }

    /// Failure from a plain message with an explicit kind label.
    pub fn msg<M>(kind: impl Into<String>, message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self {
            error: anyhow::Error::msg(message),
            kind: kind.into(),
            recorded: false,
            related: Vec::new(),
        }
    }

    pub(crate) fn from_engine(error: Error) -> Self {
        let kind = error.kind();
        Self {
            error: anyhow::Error::new(error),
            kind: kind.to_string(),
            recorded: false,
            related: Vec::new(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> String {
        self.error.to_string()
    }

    /// Full error chain, including a backtrace when one was captured.
    pub fn trace(&self) -> String {
        format!("{:?}", self.error)
    }

    pub fn is_recorded(&self) -> bool {
        self.recorded
    }

    pub(crate) fn mark_recorded(&mut self) {
        self.recorded = true;
    }

    /// Later failures folded into this one by [`CaseFailure::chain`].
    pub fn related(&self) -> &[CaseFailure] {
        &self.related
    }

    /// Keep `later` alongside this failure. This failure stays the one returned to the caller.
    pub(crate) fn chain(&mut self, later: CaseFailure) {
        self.related.push(later);
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    pub fn into_error(self) -> anyhow::Error {
        self.error
    }
}

impl<E> From<E> for CaseFailure
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for CaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.error)?;
        for later in &self.related {
            write!(f, "; {}", later)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaseFailure")
            .field("kind", &self.kind)
            .field("error", &self.error)
            .field("recorded", &self.recorded)
            .field("related", &self.related)
            .finish()
    }
}

/// Last path segment of a type name, without generic arguments.
/// `my_tests::errors::KeyError` becomes `KeyError`.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
