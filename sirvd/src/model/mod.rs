pub mod params;
pub mod sirvd;
pub mod vaccination;
