pub mod summary;
pub mod synthesis;
pub mod team;

pub use summary::{CaseRecord, SpecialistFailure, TeamSummary};
pub use team::{ConsultError, MultidisciplinaryTeam, TeamConfig};
