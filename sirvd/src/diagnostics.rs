use crate::error::{ensure, Result, SirvdError};
use crate::math::linalg::spectral_radius_power_iteration;
use crate::model::params::ModelParameters;
use crate::model::sirvd::{Compartment, SirvdState};

/// Next-generation matrix at the given state:
/// `K[g][h] = S_g * beta[g][h] / (gamma + mu_h)`, the expected new infections
/// in group `g` caused by one infectious individual of group `h`.
///
/// A column whose infectious period never ends (`gamma + mu_h == 0`) and that
/// transmits at all makes the entry infinite.
pub fn next_generation_matrix(params: &ModelParameters, state: &SirvdState) -> Result<Vec<Vec<f64>>> {
    let n = params.n_groups();
    ensure!(
        state.n_groups() == n,
        SirvdError::initial_state(format!("state has {} groups, parameters have {n}", state.n_groups()))
    );
    Ok((0..n)
        .map(|g| {
            let s = state.get(Compartment::Susceptible, g);
            (0..n)
                .map(|h| {
                    let beta = params.beta()[g][h];
                    let exit = params.gamma() + params.mu()[h];
                    if beta == 0.0 || s == 0.0 {
                        0.0
                    } else if exit == 0.0 {
                        f64::INFINITY
                    } else {
                        s * beta / exit
                    }
                })
                .collect()
        })
        .collect())
}

/// Effective reproduction number at `state`; at a disease-free initial
/// state this is the basic reproduction number R0.
pub fn reproduction_number(params: &ModelParameters, state: &SirvdState) -> Result<f64> {
    let k = next_generation_matrix(params, state)?;
    if k.iter().flatten().any(|v| v.is_infinite()) {
        return Ok(f64::INFINITY);
    }
    Ok(spectral_radius_power_iteration(&k, 10_000, 1e-12))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::params::VaccinationStart;

    #[test]
    fn single_group_closed_form() {
        let params = ModelParameters::new(
            vec![vec![0.3]],
            1.0 / 15.0,
            vec![0.0001],
            1.0 / 180.0,
            1.0 / 270.0,
            vec![0.0],
            vec![VaccinationStart::Never],
        )
        .expect("valid");
        let x = SirvdState::from_group_fractions(&[[0.99, 0.01, 0.0, 0.0, 0.0]]).expect("valid");
        let r = reproduction_number(&params, &x).expect("matching groups");
        let expected = 0.99 * 0.3 / (1.0 / 15.0 + 0.0001);
        assert!((r - expected).abs() < 1e-9, "{r} vs {expected}");
        assert!(r > 1.0);
    }

    #[test]
    fn no_transmission_means_zero() {
        let params = ModelParameters::new(
            vec![vec![0.0, 0.0], vec![0.0, 0.0]],
            0.1,
            vec![0.0, 0.0],
            0.0,
            0.0,
            vec![0.0, 0.0],
            vec![VaccinationStart::Never; 2],
        )
        .expect("valid");
        let x = SirvdState::from_group_fractions(&[[1.0, 0.0, 0.0, 0.0, 0.0]; 2]).expect("valid");
        let one = SirvdState::from_group_fractions(&[[1.0, 0.0, 0.0, 0.0, 0.0]]).expect("valid");
        assert!(reproduction_number(&params, &one).is_err());
        assert_eq!(reproduction_number(&params, &x).expect("matching groups"), 0.0);
    }

    #[test]
    fn endless_infection_is_infinite() {
        let params = ModelParameters::new(
            vec![vec![0.1]],
            0.0,
            vec![0.0],
            0.0,
            0.0,
            vec![0.0],
            vec![VaccinationStart::Never],
        )
        .expect("valid");
        let x = SirvdState::from_group_fractions(&[[1.0, 0.0, 0.0, 0.0, 0.0]]).expect("valid");
        assert!(reproduction_number(&params, &x).expect("matching groups").is_infinite());
    }
}
