pub mod diagnostics;
pub mod error;
pub mod io;
pub mod math;
pub mod model;
pub mod scenario;
pub mod trajectory;

pub use error::{Result, SirvdError};
pub use math::rk45::SolverOptions;
pub use model::params::{ModelParameters, VaccinationStart};
pub use model::sirvd::{Compartment, SirvdModel, SirvdState};
pub use model::vaccination::VaccinationGate;
pub use scenario::{compare_strategies, run_scenario, ObservationGrid, ScenarioConfig, VaccinationStrategy};
pub use trajectory::{CompartmentValues, Trajectory, TrajectoryView};
