pub mod roster;
pub mod specialists;
pub mod traits;

pub use roster::default_roster;
pub use traits::{
    AssessmentError, Case, Opinion, SpecialistBehavior, SpecialistHandle, SpecialtyRole,
};
