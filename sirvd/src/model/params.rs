use serde::{Deserialize, Serialize};

use crate::error::{ensure, Result, SirvdError};

/// Raw value that marks a group as never vaccinated in serialized configs.
pub const NO_VACCINATION: f64 = -1.0;

/// Instant from which a group's vaccination rate applies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum VaccinationStart {
    /// Vaccination is permanently disabled for the group.
    Never,
    /// Vaccination applies for every `t >= day`.
    Day(f64),
}

impl VaccinationStart {
    pub fn day(self) -> Option<f64> {
        match self {
            VaccinationStart::Never => None,
            VaccinationStart::Day(day) => Some(day),
        }
    }
}

impl TryFrom<f64> for VaccinationStart {
    type Error = SirvdError;

    fn try_from(raw: f64) -> Result<Self> {
        if raw == NO_VACCINATION {
            return Ok(VaccinationStart::Never);
        }
        ensure!(
            raw.is_finite() && raw >= 0.0,
            SirvdError::params(format!(
                "vaccination start must be >= 0 or {NO_VACCINATION} (never), got {raw}"
            ))
        );
        Ok(VaccinationStart::Day(raw))
    }
}

impl From<VaccinationStart> for f64 {
    fn from(start: VaccinationStart) -> f64 {
        start.day().unwrap_or(NO_VACCINATION)
    }
}

/// Epidemiological constants of a run. Rates are per day.
///
/// Validated on construction and immutable afterwards; strategies that need a
/// different vaccination plan build a new value through
/// [`ModelParameters::with_vaccination`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawModelParameters", into = "RawModelParameters")]
pub struct ModelParameters {
    beta: Vec<Vec<f64>>,
    gamma: f64,
    mu: Vec<f64>,
    phi: f64,
    rho: f64,
    eta: Vec<f64>,
    vaccination_start: Vec<VaccinationStart>,
}

/// Unvalidated field bundle used for (de)serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawModelParameters {
    beta: Vec<Vec<f64>>,
    gamma: f64,
    mu: Vec<f64>,
    phi: f64,
    rho: f64,
    eta: Vec<f64>,
    vaccination_start: Vec<VaccinationStart>,
}

impl TryFrom<RawModelParameters> for ModelParameters {
    type Error = SirvdError;

    fn try_from(raw: RawModelParameters) -> Result<Self> {
        ModelParameters::new(
            raw.beta,
            raw.gamma,
            raw.mu,
            raw.phi,
            raw.rho,
            raw.eta,
            raw.vaccination_start,
        )
    }
}

impl From<ModelParameters> for RawModelParameters {
    fn from(p: ModelParameters) -> Self {
        RawModelParameters {
            beta: p.beta,
            gamma: p.gamma,
            mu: p.mu,
            phi: p.phi,
            rho: p.rho,
            eta: p.eta,
            vaccination_start: p.vaccination_start,
        }
    }
}

fn check_rate(name: &str, value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value >= 0.0,
        SirvdError::params(format!("{name} must be finite and >= 0, got {value}"))
    );
    Ok(())
}

fn check_per_group(name: &str, values: &[f64], n_groups: usize) -> Result<()> {
    ensure!(
        values.len() == n_groups,
        SirvdError::params(format!("{name}.len()={} != n_groups={n_groups}", values.len()))
    );
    for (g, v) in values.iter().enumerate() {
        check_rate(&format!("{name}[{g}]"), *v)?;
    }
    Ok(())
}

impl ModelParameters {
    /// Builds a validated parameter set.
    ///
    /// `beta[g][h]` is the transmission intensity of group `h`'s infectious
    /// fraction on group `g`'s susceptibles. The group count is taken from
    /// `beta`; every per-group vector must match it.
    pub fn new(
        beta: Vec<Vec<f64>>,
        gamma: f64,
        mu: Vec<f64>,
        phi: f64,
        rho: f64,
        eta: Vec<f64>,
        vaccination_start: Vec<VaccinationStart>,
    ) -> Result<Self> {
        let n = beta.len();
        ensure!(n > 0, SirvdError::params("at least one group is required"));
        for (g, row) in beta.iter().enumerate() {
            ensure!(
                row.len() == n,
                SirvdError::params(format!(
                    "beta must be square {n} x {n}, row {g} has {} entries",
                    row.len()
                ))
            );
            for (h, v) in row.iter().enumerate() {
                check_rate(&format!("beta[{g}][{h}]"), *v)?;
            }
        }
        check_rate("gamma", gamma)?;
        check_rate("phi", phi)?;
        check_rate("rho", rho)?;
        check_per_group("mu", &mu, n)?;
        check_per_group("eta", &eta, n)?;
        ensure!(
            vaccination_start.len() == n,
            SirvdError::params(format!(
                "vaccination_start.len()={} != n_groups={n}",
                vaccination_start.len()
            ))
        );
        for (g, start) in vaccination_start.iter().enumerate() {
            if let VaccinationStart::Day(day) = start {
                ensure!(
                    day.is_finite() && *day >= 0.0,
                    SirvdError::params(format!("vaccination_start[{g}] must be >= 0, got {day}"))
                );
            }
        }

        Ok(Self {
            beta,
            gamma,
            mu,
            phi,
            rho,
            eta,
            vaccination_start,
        })
    }

    /// Copy of these parameters with a different vaccination plan.
    /// `eta` defaults to the current rates when `None`.
    pub fn with_vaccination(
        &self,
        vaccination_start: Vec<VaccinationStart>,
        eta: Option<Vec<f64>>,
    ) -> Result<Self> {
        ModelParameters::new(
            self.beta.clone(),
            self.gamma,
            self.mu.clone(),
            self.phi,
            self.rho,
            eta.unwrap_or_else(|| self.eta.clone()),
            vaccination_start,
        )
    }

    pub fn n_groups(&self) -> usize {
        self.beta.len()
    }

    pub fn beta(&self) -> &[Vec<f64>] {
        &self.beta
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn mu(&self) -> &[f64] {
        &self.mu
    }

    pub fn phi(&self) -> f64 {
        self.phi
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn eta(&self) -> &[f64] {
        &self.eta
    }

    pub fn vaccination_start(&self) -> &[VaccinationStart] {
        &self.vaccination_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_group() -> Result<ModelParameters> {
        ModelParameters::new(
            vec![vec![0.3]],
            1.0 / 15.0,
            vec![0.0001],
            1.0 / 180.0,
            1.0 / 270.0,
            vec![0.0],
            vec![VaccinationStart::Never],
        )
    }

    #[test]
    fn accepts_valid_single_group() {
        let p = single_group().expect("valid parameters");
        assert_eq!(p.n_groups(), 1);
        assert_eq!(p.vaccination_start()[0], VaccinationStart::Never);
    }

    #[test]
    fn rejects_non_square_beta() {
        let err = ModelParameters::new(
            vec![vec![0.1, 0.2], vec![0.3]],
            0.1,
            vec![0.0, 0.0],
            0.0,
            0.0,
            vec![0.0, 0.0],
            vec![VaccinationStart::Never; 2],
        )
        .unwrap_err();
        assert!(matches!(err, SirvdError::InvalidParameters(_)), "{err}");
    }

    #[test]
    fn rejects_negative_rates_and_mismatched_lengths() {
        let negative_gamma = ModelParameters::new(
            vec![vec![0.3]],
            -0.1,
            vec![0.0],
            0.0,
            0.0,
            vec![0.0],
            vec![VaccinationStart::Never],
        );
        assert!(matches!(negative_gamma, Err(SirvdError::InvalidParameters(_))));

        let short_mu = ModelParameters::new(
            vec![vec![0.3, 0.0], vec![0.0, 0.3]],
            0.1,
            vec![0.0],
            0.0,
            0.0,
            vec![0.0, 0.0],
            vec![VaccinationStart::Never; 2],
        );
        assert!(matches!(short_mu, Err(SirvdError::InvalidParameters(_))));

        let negative_start = ModelParameters::new(
            vec![vec![0.3]],
            0.1,
            vec![0.0],
            0.0,
            0.0,
            vec![0.01],
            vec![VaccinationStart::Day(-5.0)],
        );
        assert!(matches!(negative_start, Err(SirvdError::InvalidParameters(_))));
    }

    #[test]
    fn sentinel_round_trips_through_json() {
        let json = r#"{
            "beta": [[0.05, 0.01], [0.01, 0.09]],
            "gamma": 0.0666,
            "mu": [0.00009, 0.00005],
            "phi": 0.0055,
            "rho": 0.0037,
            "eta": [0.01, 0.01],
            "vaccination_start": [-1, 30]
        }"#;
        let p: ModelParameters = serde_json::from_str(json).expect("parse");
        assert_eq!(
            p.vaccination_start(),
            &[VaccinationStart::Never, VaccinationStart::Day(30.0)]
        );

        let back = serde_json::to_value(&p).expect("serialize");
        assert_eq!(back["vaccination_start"], serde_json::json!([-1.0, 30.0]));
    }

    #[test]
    fn deserialization_validates() {
        let json = r#"{
            "beta": [[0.05, 0.01]],
            "gamma": 0.1, "mu": [0.0], "phi": 0.0, "rho": 0.0,
            "eta": [0.0], "vaccination_start": [-1]
        }"#;
        assert!(serde_json::from_str::<ModelParameters>(json).is_err());

        let bad_sentinel = r#"{
            "beta": [[0.05]],
            "gamma": 0.1, "mu": [0.0], "phi": 0.0, "rho": 0.0,
            "eta": [0.0], "vaccination_start": [-2]
        }"#;
        assert!(serde_json::from_str::<ModelParameters>(bad_sentinel).is_err());
    }

    #[test]
    fn with_vaccination_keeps_disease_constants() {
        let p = single_group().expect("valid");
        let q = p
            .with_vaccination(vec![VaccinationStart::Day(10.0)], Some(vec![0.02]))
            .expect("valid plan");
        assert_eq!(q.beta(), p.beta());
        assert_eq!(q.gamma(), p.gamma());
        assert_eq!(q.eta(), &[0.02]);
        assert_eq!(q.vaccination_start()[0].day(), Some(10.0));
    }
}
