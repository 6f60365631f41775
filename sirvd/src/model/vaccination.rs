use super::params::{ModelParameters, VaccinationStart};

/// Time-gated vaccination policy: a group is vaccinated at its full rate from
/// its start instant onward and not at all before it.
///
/// The step is deliberately sharp. It is the only non-smooth term of the
/// model, so the integrator treats every start instant as a step boundary
/// (see [`VaccinationGate::switch_instants`]).
#[derive(Debug, Clone, Copy)]
pub struct VaccinationGate<'a> {
    params: &'a ModelParameters,
}

impl<'a> VaccinationGate<'a> {
    pub fn new(params: &'a ModelParameters) -> Self {
        Self { params }
    }

    /// Effective vaccination rate of group `g` at time `t`.
    pub fn effective_rate(&self, t: f64, g: usize) -> f64 {
        match self.params.vaccination_start()[g] {
            VaccinationStart::Day(start) if t >= start => self.params.eta()[g],
            _ => 0.0,
        }
    }

    /// Distinct start instants strictly inside `(t0, t1)`, ascending.
    ///
    /// Groups that never vaccinate, or whose rate is zero, do not switch the
    /// right-hand side and are left out.
    pub fn switch_instants(&self, t0: f64, t1: f64) -> Vec<f64> {
        let mut out: Vec<f64> = self
            .params
            .vaccination_start()
            .iter()
            .zip(self.params.eta())
            .filter_map(|(start, eta)| match start {
                VaccinationStart::Day(day) if *eta > 0.0 && *day > t0 && *day < t1 => Some(*day),
                _ => None,
            })
            .collect();
        out.sort_by(f64::total_cmp);
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(start: Vec<VaccinationStart>, eta: Vec<f64>) -> ModelParameters {
        let n = start.len();
        ModelParameters::new(
            vec![vec![0.1; n]; n],
            0.1,
            vec![0.0; n],
            0.0,
            0.0,
            eta,
            start,
        )
        .expect("valid parameters")
    }

    #[test]
    fn rate_switches_on_at_start_instant() {
        let p = params(vec![VaccinationStart::Day(30.0)], vec![0.01]);
        let gate = VaccinationGate::new(&p);
        assert_eq!(gate.effective_rate(-100.0, 0), 0.0);
        assert_eq!(gate.effective_rate(29.999_999, 0), 0.0);
        assert_eq!(gate.effective_rate(30.0, 0), 0.01);
        assert_eq!(gate.effective_rate(1e9, 0), 0.01);
    }

    #[test]
    fn never_means_never() {
        let p = params(vec![VaccinationStart::Never], vec![0.5]);
        let gate = VaccinationGate::new(&p);
        for t in [-1.0, 0.0, 1.0, 365.0, f64::MAX] {
            assert_eq!(gate.effective_rate(t, 0), 0.0);
        }
    }

    #[test]
    fn groups_are_gated_independently() {
        let p = params(
            vec![
                VaccinationStart::Day(0.0),
                VaccinationStart::Day(60.0),
                VaccinationStart::Never,
            ],
            vec![0.01, 0.02, 0.03],
        );
        let gate = VaccinationGate::new(&p);
        assert_eq!(gate.effective_rate(10.0, 0), 0.01);
        assert_eq!(gate.effective_rate(10.0, 1), 0.0);
        assert_eq!(gate.effective_rate(60.0, 1), 0.02);
        assert_eq!(gate.effective_rate(60.0, 2), 0.0);
    }

    #[test]
    fn switch_instants_are_interior_sorted_and_distinct() {
        let p = params(
            vec![
                VaccinationStart::Day(90.0),
                VaccinationStart::Day(30.0),
                VaccinationStart::Day(30.0),
                VaccinationStart::Day(0.0),
                VaccinationStart::Never,
                VaccinationStart::Day(400.0),
            ],
            vec![0.01; 6],
        );
        let gate = VaccinationGate::new(&p);
        assert_eq!(gate.switch_instants(0.0, 365.0), vec![30.0, 90.0]);
        assert_eq!(gate.switch_instants(30.0, 90.0), Vec::<f64>::new());
    }

    #[test]
    fn zero_rate_groups_do_not_switch() {
        let p = params(vec![VaccinationStart::Day(10.0)], vec![0.0]);
        assert!(VaccinationGate::new(&p).switch_instants(0.0, 20.0).is_empty());
    }
}
