//! Reactive Context
//!
//! The reactive context tracks which effect is currently running. This
//! enables automatic dependency tracking: when a field is read, the runtime
//! registers the effect at the top of the stack as a dependent.
//!
//! # Implementation
//!
//! Each [`Runtime`](super::Runtime) owns one stack. Entering an effect
//! pushes a frame and returns a guard; dropping the guard pops the frame.
//! Because the pop happens in `Drop`, it also happens while a panicking
//! computation unwinds, so the stack never points at an effect that is no
//! longer running.
//!
//! Nested effects push on top of their parent. While the inner effect runs
//! its reads are attributed to it; once its guard drops, attribution returns
//! to the parent.
//!
//! An untracked frame pauses tracking without hiding the stack depth.

use std::cell::RefCell;
use std::rc::Rc;

use super::runtime::Reactive;
use super::EffectId;

/// An entry in the reactive context stack.
enum Frame {
    Effect(Rc<dyn Reactive>),
    Untracked,
}

impl Frame {
    fn effect_id(&self) -> Option<EffectId> {
        match self {
            Frame::Effect(effect) => Some(effect.effect_id()),
            Frame::Untracked => None,
        }
    }
}

/// The active-effect stack of one runtime.
#[derive(Default)]
pub(crate) struct Context {
    stack: RefCell<Vec<Frame>>,
}

/// Guard that pops its frame when dropped.
pub(crate) struct ContextGuard<'a> {
    context: &'a Context,
    expected: Option<EffectId>,
}

impl Context {
    /// Make `effect` the implicit subscriber for reads until the guard drops.
    pub(crate) fn enter(&self, effect: Rc<dyn Reactive>) -> ContextGuard<'_> {
        let expected = Some(effect.effect_id());
        self.stack.borrow_mut().push(Frame::Effect(effect));
        ContextGuard {
            context: self,
            expected,
        }
    }

    /// Pause tracking until the guard drops.
    pub(crate) fn pause(&self) -> ContextGuard<'_> {
        self.stack.borrow_mut().push(Frame::Untracked);
        ContextGuard {
            context: self,
            expected: None,
        }
    }

    /// The effect reads are currently attributed to, if any.
    pub(crate) fn current(&self) -> Option<Rc<dyn Reactive>> {
        match self.stack.borrow().last()? {
            Frame::Effect(effect) => Some(Rc::clone(effect)),
            Frame::Untracked => None,
        }
    }

    pub(crate) fn current_id(&self) -> Option<EffectId> {
        self.stack.borrow().last().and_then(Frame::effect_id)
    }

    pub(crate) fn is_tracking(&self) -> bool {
        self.current_id().is_some()
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack.borrow().len()
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let popped = self.context.stack.borrow_mut().pop();

        // Verify we're popping the right frame.
        if let Some(frame) = popped {
            debug_assert_eq!(
                frame.effect_id(),
                self.expected,
                "context stack mismatch: expected {:?}, got {:?}",
                self.expected,
                frame.effect_id()
            );
        }
    }
}
