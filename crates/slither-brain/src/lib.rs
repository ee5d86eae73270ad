//! Baseline bot brains for the Slither arena.
//!
//! These are closed-form steering policies used by the demo shell and as
//! opponents in scripted matches. Anything smarter (scripted sandboxes,
//! learned policies) plugs into the same [`slither_core::BotBrain`] seam from
//! outside the workspace.

mod cruiser;
mod forager;

pub use cruiser::CruiserBrain;
pub use forager::ForagerBrain;
