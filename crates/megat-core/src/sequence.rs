// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Action Sequences and Ownership
// Mirrors: DDG4 Geant4ActionSequence + Geant4RunActionSequence
// ─────────────────────────────────────────────────────────────────────
//! Ordered, phase-scoped containers that own their actions.
//!
//! Adoption moves a boxed action into the sequence, so the same box
//! cannot be adopted twice. A cloned action keeps its `ActionId`, and
//! the shared `OwnershipRegistry` rejects the second claim.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use megat_types::{SimError, SimResult};

use crate::action::{Action, ActionContext, ActionId, Phase};

/// Kernel-scoped ledger of which container owns each action identity.
///
/// Cloning the registry shares the ledger.
#[derive(Debug, Clone, Default)]
pub struct OwnershipRegistry {
    owners: Arc<Mutex<HashMap<ActionId, String>>>,
}

impl OwnershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `owner` as the exclusive owner of `ids`.
    ///
    /// All-or-nothing: if any id is already owned, nothing is claimed.
    pub fn claim(&self, ids: &[(ActionId, &str)], owner: &str) -> SimResult<()> {
        let mut owners = self.owners.lock();
        for (i, (id, name)) in ids.iter().enumerate() {
            let dup_in_batch = ids[..i].iter().any(|(other, _)| other == id);
            if let Some(current) = owners.get(id) {
                return Err(SimError::Ownership(format!(
                    "action '{name}' ({id}) is already owned by {current}; \
                     cannot adopt into {owner}"
                )));
            }
            if dup_in_batch {
                return Err(SimError::Ownership(format!(
                    "action '{name}' ({id}) appears twice in one adoption"
                )));
            }
        }
        for (id, _) in ids {
            owners.insert(*id, owner.to_string());
        }
        Ok(())
    }

    pub fn owner_of(&self, id: ActionId) -> Option<String> {
        self.owners.lock().get(&id).cloned()
    }

    /// Drop every claim held by `owner`.
    pub fn release(&self, owner: &str) {
        self.owners.lock().retain(|_, o| o != owner);
    }

    pub fn len(&self) -> usize {
        self.owners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.lock().is_empty()
    }
}

/// A failure recorded by a sequence invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    /// 1-based invocation counter of the sequence.
    pub invocation: u64,
    pub action: String,
    pub reason: String,
}

/// Read-only view shared by every sequence type.
pub trait SequenceInfo {
    fn label(&self) -> &str;
    fn phase(&self) -> Phase;
    fn len(&self) -> usize;
    fn names(&self) -> Vec<&str>;
    fn failures(&self) -> &[ActionFailure];

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered container for one phase. Insertion order is invocation order.
pub struct ActionSequence<A: Action + ?Sized> {
    label: String,
    phase: Phase,
    members: Vec<Box<A>>,
    registry: OwnershipRegistry,
    failures: Vec<ActionFailure>,
    invocations: u64,
}

impl<A: Action + ?Sized> ActionSequence<A> {
    pub fn new(phase: Phase, registry: OwnershipRegistry) -> Self {
        Self {
            label: format!("{phase} sequence"),
            phase,
            members: Vec::new(),
            registry,
            failures: Vec::new(),
            invocations: 0,
        }
    }

    /// Take exclusive ownership of `action` and its sub-actions.
    pub fn adopt(&mut self, action: Box<A>) -> SimResult<()> {
        {
            let mut ids = vec![(action.id(), action.name())];
            ids.extend(action.children().into_iter().map(|c| (c.id(), c.name())));
            self.registry.claim(&ids, &self.label)?;
        }
        log::debug!("{}: adopted {}", self.label, action.info().qualified_name());
        self.members.push(action);
        Ok(())
    }

    /// Call `f` on every member in insertion order.
    ///
    /// The first error is recorded and returned; later members of this
    /// invocation are skipped. The next invocation starts afresh.
    pub fn invoke_all<F>(&mut self, ctx: &mut ActionContext<'_>, mut f: F) -> SimResult<()>
    where
        F: FnMut(&mut A, &mut ActionContext<'_>) -> SimResult<()>,
    {
        self.invocations += 1;
        for action in self.members.iter_mut() {
            if let Err(e) = f(action.as_mut(), ctx) {
                log::error!(
                    "{}: action '{}' failed, skipping the rest of this invocation: {e}",
                    self.label,
                    action.name()
                );
                self.failures.push(ActionFailure {
                    invocation: self.invocations,
                    action: action.name().to_string(),
                    reason: e.to_string(),
                });
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &A> {
        self.members.iter().map(|a| a.as_ref())
    }

    pub fn get(&self, name: &str) -> Option<&A> {
        self.iter().find(|a| a.name() == name)
    }

    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    /// Drop every member and release its registry claims.
    pub fn clear(&mut self) {
        for action in self.members.drain(..).rev() {
            log::debug!("{}: released {}", self.label, action.info().qualified_name());
        }
        self.registry.release(&self.label);
    }
}

impl<A: Action + ?Sized> SequenceInfo for ActionSequence<A> {
    fn label(&self) -> &str {
        &self.label
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn len(&self) -> usize {
        self.members.len()
    }

    fn names(&self) -> Vec<&str> {
        self.members.iter().map(|a| a.name()).collect()
    }

    fn failures(&self) -> &[ActionFailure] {
        &self.failures
    }
}
