use crate::models::{SuiteKey, Target};

use super::context::{CallContext, FrameKind};

/// What an invocation learned about its surroundings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Correlation key of the suite the record belongs to.
    pub suite: Option<SuiteKey>,
    /// Name of the closest enclosing case that is not the invocation itself.
    pub parent: Option<String>,
    /// A fixture frame sits between the invocation and its suite.
    pub inside_fixture: bool,
    /// The suite came from the pending runner item rather than a live suite frame.
    pub via_item: bool,
}

/// Resolve the enclosing suite and parent case of an invocation of `own`.
///
/// The closest suite frame wins. The parent search is independent of the suite search and
/// keeps scanning past it. Fixtures, and cases running inside a fixture, have no suite on
/// the stack (fixtures run before the suite body); they fall back to the pending item.
pub fn resolve(context: &CallContext, own: &Target, is_fixture: bool) -> Resolution {
    let mut resolution = Resolution::default();
    let mut item = None;

    for frame in context.innermost_first() {
        match &frame.kind {
            FrameKind::Suite(key) => {
                if resolution.suite.is_none() {
                    resolution.suite = Some(key.clone());
                }
            }
            FrameKind::Item(key) => {
                if item.is_none() {
                    item = Some(key.clone());
                }
            }
            FrameKind::Case(target) | FrameKind::Fixture(target) => {
                if matches!(frame.kind, FrameKind::Fixture(_)) && resolution.suite.is_none() {
                    resolution.inside_fixture = true;
                }
                if resolution.parent.is_none() && target.name != own.name {
                    resolution.parent = Some(target.name.clone());
                }
            }
        }
    }

    if resolution.suite.is_none() && (is_fixture || resolution.inside_fixture) {
        resolution.via_item = item.is_some();
        resolution.suite = item;
    }

    resolution
}
