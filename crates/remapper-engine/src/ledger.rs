//! Match ledger: pending vote tallies and confirmed matches per entity kind.
//!
//! Every old handle owns at most one [`MatchEntry`], created lazily on first
//! access. An entry starts pending, accumulating votes for new-side
//! candidates, and is moved (never copied) to the confirmed side once a
//! target is fixed. Confirmation is permanent and withdraws the claimed
//! target from every other pending tally of the same kind.

use std::collections::BTreeMap;
use std::fmt::Debug;

use remapper_core::{FieldId, Handle, MethodId, TypeId};

use crate::error::{MatchKind, MergeError};

#[derive(Debug, Clone)]
pub struct MatchEntry<Id> {
    old: Handle<Id>,
    target: Option<Id>,
    votes: BTreeMap<Id, u32>,
    highest: Option<Id>,
    highest_votes: u32,
    second_votes: u32,
    owner_hint: Option<TypeId>,
    merged: bool,
}

impl<Id: Copy + Ord> MatchEntry<Id> {
    fn new(old: Handle<Id>) -> Self {
        Self {
            old,
            target: None,
            votes: BTreeMap::new(),
            highest: None,
            highest_votes: 0,
            second_votes: 0,
            owner_hint: None,
            merged: false,
        }
    }

    pub fn old(&self) -> &Handle<Id> {
        &self.old
    }

    pub fn target(&self) -> Option<Id> {
        self.target
    }

    pub fn votes_for(&self, candidate: Id) -> u32 {
        self.votes.get(&candidate).copied().unwrap_or(0)
    }

    pub fn tally(&self) -> &BTreeMap<Id, u32> {
        &self.votes
    }

    /// Candidate with the most votes.
    pub fn highest(&self) -> Option<Id> {
        self.highest
    }

    pub fn highest_votes(&self) -> u32 {
        self.highest_votes
    }

    pub fn second_votes(&self) -> u32 {
        self.second_votes
    }

    /// Lead of the best candidate over the runner-up.
    pub fn margin(&self) -> u32 {
        self.highest_votes - self.second_votes
    }

    /// New-side owner the member must belong to, once its old owner is
    /// confirmed.
    pub fn owner_hint(&self) -> Option<TypeId> {
        self.owner_hint
    }

    pub fn is_merged(&self) -> bool {
        self.merged
    }

    pub(crate) fn set_merged(&mut self) {
        self.merged = true;
    }

    pub(crate) fn set_owner_hint(&mut self, owner: TypeId) {
        self.owner_hint = Some(owner);
    }

    fn add_vote(&mut self, candidate: Id) -> bool {
        if self.target.is_some() {
            return false;
        }
        let count = self.votes.entry(candidate).or_insert(0);
        *count += 1;
        let count = *count;
        if self.highest == Some(candidate) {
            self.highest_votes = count;
        } else if count > self.highest_votes {
            self.second_votes = self.highest_votes;
            self.highest = Some(candidate);
            self.highest_votes = count;
        } else if count > self.second_votes {
            self.second_votes = count;
        }
        true
    }

    fn remove_vote(&mut self, candidate: Id) {
        if self.votes.remove(&candidate).is_some() {
            self.recompute();
        }
    }

    /// Drop every vote whose candidate fails `keep`.
    pub(crate) fn retain_votes(&mut self, mut keep: impl FnMut(Id) -> bool) {
        let before = self.votes.len();
        self.votes.retain(|id, _| keep(*id));
        if self.votes.len() != before {
            self.recompute();
        }
    }

    fn recompute(&mut self) {
        self.highest = None;
        self.highest_votes = 0;
        self.second_votes = 0;
        for (id, count) in &self.votes {
            if *count > self.highest_votes {
                self.second_votes = self.highest_votes;
                self.highest = Some(*id);
                self.highest_votes = *count;
            } else if *count > self.second_votes {
                self.second_votes = *count;
            }
        }
    }
}

/// Pending and confirmed entries of one kind, plus the inverse index of
/// claimed new handles.
#[derive(Debug, Clone)]
pub struct Partition<Id> {
    kind: MatchKind,
    pending: BTreeMap<Handle<Id>, MatchEntry<Id>>,
    confirmed: BTreeMap<Handle<Id>, MatchEntry<Id>>,
    inverse: BTreeMap<Id, Handle<Id>>,
}

impl<Id: Copy + Ord + Debug> Partition<Id> {
    pub fn new(kind: MatchKind) -> Self {
        Self {
            kind,
            pending: BTreeMap::new(),
            confirmed: BTreeMap::new(),
            inverse: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    /// The entry for `old`, confirmed or pending, if one was ever created.
    pub fn get(&self, old: &Handle<Id>) -> Option<&MatchEntry<Id>> {
        self.confirmed.get(old).or_else(|| self.pending.get(old))
    }

    /// Lazily create the entry for `old`.
    pub fn entry_mut(&mut self, old: Handle<Id>) -> &mut MatchEntry<Id> {
        let side = if self.confirmed.contains_key(&old) {
            &mut self.confirmed
        } else {
            &mut self.pending
        };
        side.entry(old.clone()).or_insert_with(|| MatchEntry::new(old))
    }

    pub fn confirmed_target(&self, old: &Handle<Id>) -> Option<Id> {
        self.confirmed.get(old).and_then(MatchEntry::target)
    }

    pub fn is_confirmed(&self, old: &Handle<Id>) -> bool {
        self.confirmed.contains_key(old)
    }

    /// The old handle confirmed onto `new`.
    pub fn inverse(&self, new: Id) -> Option<&Handle<Id>> {
        self.inverse.get(&new)
    }

    pub fn is_claimed(&self, new: Id) -> bool {
        self.inverse.contains_key(&new)
    }

    pub fn confirmed(&self) -> impl Iterator<Item = &MatchEntry<Id>> {
        self.confirmed.values()
    }

    pub fn pending(&self) -> impl Iterator<Item = &MatchEntry<Id>> {
        self.pending.values()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn confirmed_count(&self) -> usize {
        self.confirmed.len()
    }

    /// Register one vote for `old -> new`.
    ///
    /// Returns `true` when the vote was counted, or when `old` is already
    /// confirmed onto `new`. Votes for a different target of a confirmed
    /// entry and votes for a handle claimed by someone else are rejected.
    pub fn vote(&mut self, old: Handle<Id>, new: Id) -> bool {
        if let Some(entry) = self.confirmed.get(&old) {
            return entry.target == Some(new);
        }
        let claimed = self.inverse.contains_key(&new);
        let entry = self.entry_mut(old);
        if claimed {
            return false;
        }
        entry.add_vote(new)
    }

    pub fn remove_vote(&mut self, old: &Handle<Id>, new: Id) {
        if let Some(entry) = self.pending.get_mut(old) {
            entry.remove_vote(new);
        }
    }

    /// Fix the target of a pending entry without confirming it yet.
    pub fn set_target(&mut self, old: Handle<Id>, new: Id) {
        if let Some(entry) = self.pending.get_mut(&old) {
            entry.target = Some(new);
            return;
        }
        if !self.confirmed.contains_key(&old) {
            let mut entry = MatchEntry::new(old.clone());
            entry.target = Some(new);
            self.pending.insert(old, entry);
        }
    }

    /// Move the entry for `old` to the confirmed side.
    ///
    /// Fails when the entry has no target or the target already belongs to
    /// another confirmed entry; both mean a pass broke the ledger invariants.
    pub fn confirm(&mut self, old: &Handle<Id>) -> Result<Id, MergeError> {
        if let Some(target) = self.confirmed_target(old) {
            return Ok(target);
        }
        let target = self
            .pending
            .get(old)
            .and_then(MatchEntry::target)
            .ok_or_else(|| MergeError::UnsetTarget {
                kind: self.kind,
                old: format!("{old:?}"),
            })?;
        if let Some(holder) = self.inverse.get(&target) {
            return Err(MergeError::TargetClaimed {
                kind: self.kind,
                old: format!("{old:?}"),
                new: format!("{target:?} (held by {holder:?})"),
            });
        }
        let Some(mut entry) = self.pending.remove(old) else {
            return Err(MergeError::UnsetTarget {
                kind: self.kind,
                old: format!("{old:?}"),
            });
        };
        entry.votes.clear();
        entry.highest = None;
        entry.highest_votes = 0;
        entry.second_votes = 0;
        self.inverse.insert(target, old.clone());
        self.confirmed.insert(old.clone(), entry);
        for pending in self.pending.values_mut() {
            pending.remove_vote(target);
        }
        Ok(target)
    }

    /// Confirm `old -> new` directly when neither side is taken.
    ///
    /// Returns `Ok(false)` when `old` is already confirmed or `new` is
    /// already claimed.
    pub fn try_match(&mut self, old: Handle<Id>, new: Id) -> Result<bool, MergeError> {
        if self.confirmed.contains_key(&old) || self.inverse.contains_key(&new) {
            return Ok(false);
        }
        self.set_target(old.clone(), new);
        self.confirm(&old)?;
        Ok(true)
    }

    /// Pending keys ordered by margin, largest first. Ties keep key order.
    pub fn ranked_pending(&self) -> Vec<Handle<Id>> {
        let mut keys: Vec<(&Handle<Id>, u32)> = self
            .pending
            .iter()
            .map(|(k, e)| (k, e.margin()))
            .collect();
        keys.sort_by(|a, b| b.1.cmp(&a.1));
        keys.into_iter().map(|(k, _)| k.clone()).collect()
    }

    pub(crate) fn pending_mut(&mut self, old: &Handle<Id>) -> Option<&mut MatchEntry<Id>> {
        self.pending.get_mut(old)
    }

    /// Flag a confirmed entry as body-merged. Returns `false` when it was
    /// already flagged or is not confirmed.
    pub(crate) fn mark_merged(&mut self, old: &Handle<Id>) -> bool {
        match self.confirmed.get_mut(old) {
            Some(entry) if !entry.merged => {
                entry.set_merged();
                true
            }
            _ => false,
        }
    }
}

/// All match state of one merge.
#[derive(Debug, Clone)]
pub struct Ledger {
    pub types: Partition<TypeId>,
    pub methods: Partition<MethodId>,
    pub fields: Partition<FieldId>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            types: Partition::new(MatchKind::Type),
            methods: Partition::new(MatchKind::Method),
            fields: Partition::new(MatchKind::Field),
        }
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }
}
