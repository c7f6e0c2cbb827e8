//! Domain value types for the work-item engine.
//!
//! # Submodules
//!
//! - [`work_item`] - `WorkItem`, `Role`, `Priority`
//! - [`dependency`] - `Dependency`, `DependencyType`
//! - [`note`] - `Note`
//! - [`transition`] - `RoleTransition`, `Trigger`, `EntityType`

mod dependency;
mod note;
mod transition;
mod work_item;

pub use dependency::{Dependency, DependencyType};
pub use note::Note;
pub use transition::{EntityType, RoleTransition, Trigger};
pub use work_item::{Priority, Role, WorkItem};
