// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "restrictions/mod.rs"]
pub mod restrictions;
