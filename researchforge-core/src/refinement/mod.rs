//! Refinement loop: iterative revise/score cycles over a draft.
//!
//! The controller is an explicit state machine:
//! 1. **Start**: score the synthesized draft; accept it if it already passes
//! 2. **Iterate**: revise with the last report, score the candidate, track the best
//! 3. **Done**: threshold met, budget exhausted, a capability failed, or cancelled
//!
//! Evaluators and revisers are injected, so the loop itself performs no I/O.

pub mod controller;
pub mod evaluator;
pub mod reviser;

pub use controller::{
    IterationRecord, LoopState, NoOpCallback, RefinementCallback, RefinementConfig,
    RefinementController, TerminationReason,
};
pub use evaluator::{Evaluator, HeuristicEvaluator, LlmEvaluator};
pub use reviser::{LlmReviser, Reviser};
