//! Modification slots
//!
//! Every synthesized node passes through a slot that hands the caller the
//! composer's proposal and takes back the final value. Mandatory slots
//! always emit; optional slots may also suppress the node or force an
//! otherwise skipped default.

use std::fmt;

type Hook<P> = Box<dyn FnOnce(P) -> P>;
type OptionalHook<P> = Box<dyn FnOnce(P) -> Outcome<P>>;

/// Result of an optional slot's hook
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<P> {
    /// Emit the proposal unchanged
    Default,
    Replace(P),
    Absent,
}

/// Slot for a node that is always emitted
pub struct Modification<P> {
    hook: Option<Hook<P>>,
}

impl<P> Default for Modification<P> {
    fn default() -> Self {
        Self { hook: None }
    }
}

impl<P> fmt::Debug for Modification<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modification")
            .field("customized", &self.hook.is_some())
            .finish()
    }
}

impl<P> Modification<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot whose hook rewrites the proposal
    pub fn with(hook: impl FnOnce(P) -> P + 'static) -> Self {
        Self {
            hook: Some(Box::new(hook)),
        }
    }

    pub fn replace(&mut self, hook: impl FnOnce(P) -> P + 'static) {
        self.hook = Some(Box::new(hook));
    }

    pub fn is_customized(&self) -> bool {
        self.hook.is_some()
    }

    /// Produce the final value. Consumes the hook.
    pub fn apply(&mut self, proposed: P) -> P {
        match self.hook.take() {
            Some(hook) => hook(proposed),
            None => proposed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Presence {
    #[default]
    Unset,
    Keep,
    Absent,
}

/// Slot for a node the composer may or may not emit by default
pub struct OptionalModification<P> {
    presence: Presence,
    hook: Option<OptionalHook<P>>,
}

impl<P> Default for OptionalModification<P> {
    fn default() -> Self {
        Self {
            presence: Presence::Unset,
            hook: None,
        }
    }
}

impl<P> fmt::Debug for OptionalModification<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionalModification")
            .field("presence", &self.presence)
            .field("customized", &self.hook.is_some())
            .finish()
    }
}

impl<P: Clone + 'static> OptionalModification<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force emission even where the composer would skip it
    pub fn keep(&mut self) -> &mut Self {
        self.presence = Presence::Keep;
        self
    }

    /// Suppress emission
    pub fn remove(&mut self) -> &mut Self {
        self.presence = Presence::Absent;
        self
    }

    /// Rewrite the proposal; implies `keep`
    pub fn modify(&mut self, hook: impl FnOnce(P) -> P + 'static) -> &mut Self {
        self.presence = Presence::Keep;
        self.hook = Some(Box::new(move |p| Outcome::Replace(hook(p))));
        self
    }

    /// Decide per proposal; the node still follows the default presence
    /// unless `keep` or `remove` was called
    pub fn decide(&mut self, hook: impl FnOnce(P) -> Outcome<P> + 'static) -> &mut Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn is_customized(&self) -> bool {
        self.hook.is_some() || self.presence != Presence::Unset
    }

    /// `Some(explicit choice)` when the caller called `keep` or `remove`
    pub fn explicit_presence(&self) -> Option<bool> {
        match self.presence {
            Presence::Unset => None,
            Presence::Keep => Some(true),
            Presence::Absent => Some(false),
        }
    }

    /// Fold a second declaration of the same node into this slot.
    /// Returns `false`, leaving `self` untouched, when the two disagree on
    /// presence or both carry a hook.
    pub fn merge(&mut self, other: Self) -> bool {
        let disagree = matches!(
            (self.explicit_presence(), other.explicit_presence()),
            (Some(a), Some(b)) if a != b
        );
        if disagree || (self.hook.is_some() && other.hook.is_some()) {
            return false;
        }
        if self.presence == Presence::Unset {
            self.presence = other.presence;
        }
        if self.hook.is_none() {
            self.hook = other.hook;
        }
        true
    }

    /// Produce the final value, or `None` when the node is not emitted.
    /// Consumes the hook.
    pub fn resolve(&mut self, default_present: bool, proposed: P) -> Option<P> {
        let present = self.explicit_presence().unwrap_or(default_present);
        if !present {
            self.hook = None;
            return None;
        }
        match self.hook.take() {
            None => Some(proposed),
            Some(hook) => match hook(proposed.clone()) {
                Outcome::Default => Some(proposed),
                Outcome::Replace(p) => Some(p),
                Outcome::Absent => None,
            },
        }
    }
}
