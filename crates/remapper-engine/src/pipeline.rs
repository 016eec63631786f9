//! Pass pipeline: an ordered list of passes and conditional jumps.

use crate::collector::VoteCollector;
use crate::engine::MergeEngine;
use crate::error::MergeError;
use crate::operations::{
    CustomMethodMergers, MatchDiscreteFields, MatchDiscreteMethods, MatchEnums,
    MatchInnerClasses, MatchMethodGroups, MatchReferences, MatchStringConstants,
    MergeInitializers, MergeMatchedFields, MergeMatchedMethods, MergeMatchedTypes,
    MergeSyntheticOverloads,
};

/// One heuristic pass over the two programs and the ledger.
pub trait MergeOperation {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    fn operate(&mut self, engine: &mut MergeEngine<'_>) -> Result<(), MergeError>;
}

pub type Predicate = Box<dyn Fn(&mut MergeEngine<'_>) -> bool>;

pub enum Step {
    Run(Box<dyn MergeOperation>),
    Jump { target: usize, predicate: Predicate },
}

/// Jump predicate that holds when anything was confirmed since the last
/// check, resetting the counter.
pub fn changes_since_reset() -> Predicate {
    Box::new(|engine| engine.take_changes() > 0)
}

/// Index of the first step re-run by the default loop.
pub const LOOP_START: usize = 3;

/// The standard pass order. String constants and synthetic overloads run
/// once; everything from initializer linking to the vote collector repeats
/// until a cycle confirms nothing.
pub fn default_steps() -> Vec<Step> {
    let passes: Vec<Box<dyn MergeOperation>> = vec![
        Box::new(MatchStringConstants),
        Box::new(MergeSyntheticOverloads),
        Box::new(MatchEnums),
        Box::new(MergeInitializers::default()),
        Box::new(MatchReferences::default()),
        Box::new(MatchDiscreteFields),
        Box::new(MatchMethodGroups),
        Box::new(MatchDiscreteMethods),
        Box::new(MatchInnerClasses::default()),
        Box::new(MergeMatchedTypes),
        Box::new(CustomMethodMergers::default()),
        Box::new(MergeMatchedMethods),
        Box::new(MergeMatchedFields),
        Box::new(VoteCollector),
    ];
    let mut steps: Vec<Step> = passes.into_iter().map(Step::Run).collect();
    steps.push(Step::Jump {
        target: LOOP_START,
        predicate: changes_since_reset(),
    });
    steps
}
