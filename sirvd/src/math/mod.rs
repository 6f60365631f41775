pub mod linalg;
pub mod ode;
pub mod rk45;
