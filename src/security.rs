use crate::contingency::OutageFactors;
use crate::error::{FlowError, Result};
use crate::lpf::BaseFlows;
use std::fmt;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Sense {
    /// `lhs <= rhs`
    Le,
    /// `lhs >= rhs`
    Ge,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sense::Le => write!(f, "<="),
            Sense::Ge => write!(f, ">="),
        }
    }
}

/// Flow on a branch in one snapshot, as a decision variable of the
/// external optimization.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub struct FlowVar {
    pub snapshot: usize,
    pub branch: usize,
}

/// `sum(coef * var) <sense> rhs`
#[derive(Clone, Debug, PartialEq)]
pub struct LinearConstraint {
    pub name: String,
    pub terms: Vec<(FlowVar, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl LinearConstraint {
    /// Left-hand side evaluated at the given flows.
    pub fn lhs(&self, flows: &BaseFlows) -> f64 {
        self.terms
            .iter()
            .map(|(var, coef)| coef * flows.flows().get(var.snapshot, var.branch))
            .sum()
    }

    pub fn is_satisfied(&self, flows: &BaseFlows, tol: f64) -> bool {
        let lhs = self.lhs(flows);
        match self.sense {
            Sense::Le => lhs <= self.rhs + tol,
            Sense::Ge => lhs >= self.rhs - tol,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SecurityConstraints {
    pub constraints: Vec<LinearConstraint>,
    /// Outages (topology branch index) no constraints could be emitted for.
    pub failures: Vec<(usize, FlowError)>,
}

impl SecurityConstraints {
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Constraints not satisfied by `flows`.
    pub fn violated(&self, flows: &BaseFlows, tol: f64) -> Vec<&LinearConstraint> {
        self.constraints
            .iter()
            .filter(|c| !c.is_satisfied(flows, tol))
            .collect()
    }
}

/// Emits branch security constraints for a set of monitored outages.
///
/// For every snapshot, outage `c` and branch `b != c` of the same
/// sub-network:
///
/// ```txt
/// f_b + BODF[b, c] * f_c <=  F_b
/// f_b + BODF[b, c] * f_c >= -F_b
/// ```
///
/// Branches with non-finite or non-positive capacity are not monitored.
/// Outages that fail, such as disconnecting ones, are reported in
/// `failures` without affecting the others.
pub fn security_constraints<F: OutageFactors>(
    factors: &F,
    outages: &[usize],
    capacities: &[f64],
    snapshots: &[String],
) -> Result<SecurityConstraints> {
    if capacities.len() != factors.num_branches() {
        return Err(FlowError::dimension(
            "branch capacities",
            factors.num_branches(),
            capacities.len(),
        ));
    }
    let name = |l: usize| -> String {
        factors
            .branch_name(l)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", l))
    };

    let mut result = SecurityConstraints::default();
    for &c in outages {
        let column = match factors.outage_column(c) {
            Ok(column) => column,
            Err(err) => {
                log::warn!("security: outage of '{}': {}", name(c), err);
                result.failures.push((c, err));
                continue;
            }
        };
        let outage = name(c);

        for &(b, bodf) in column.iter() {
            let cap = capacities[b];
            if b == c || !cap.is_finite() || cap <= 0.0 {
                continue;
            }
            let branch = name(b);

            for (s, snapshot) in snapshots.iter().enumerate() {
                let mut terms = vec![(FlowVar { snapshot: s, branch: b }, 1.0)];
                if bodf != 0.0 {
                    terms.push((FlowVar { snapshot: s, branch: c }, bodf));
                }

                result.constraints.push(LinearConstraint {
                    name: format!("contingency_flow_upper-{}-{}-{}", branch, outage, snapshot),
                    terms: terms.clone(),
                    sense: Sense::Le,
                    rhs: cap,
                });
                result.constraints.push(LinearConstraint {
                    name: format!("contingency_flow_lower-{}-{}-{}", branch, outage, snapshot),
                    terms,
                    sense: Sense::Ge,
                    rhs: -cap,
                });
            }
        }
    }

    log::info!(
        "security: {} constraints for {} outages, {} failed",
        result.len(),
        outages.len(),
        result.failures.len()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::Factors;
    use crate::lpf::{lpf, Injections};
    use crate::opt::FactorOpt;
    use crate::ptdf::Slack;
    use crate::tests::cases;
    use crate::topology::Topology;
    use anyhow::Result;
    use spsolve::rlu::RLU;
    use std::sync::Arc;

    fn factors_of(net: &crate::network::Network) -> Result<Factors> {
        let topo = Arc::new(Topology::new(net)?);
        Ok(Factors::build(topo, &Slack::Default, &FactorOpt::default(), &RLU::default()))
    }

    #[test]
    fn test_triangle_constraints() -> Result<()> {
        let factors = factors_of(&cases::triangle())?;
        let topo = factors.topology();
        let snapshots = vec!["now".to_string()];

        let sc = security_constraints(&factors, &[0], &topo.capacities(), &snapshots)?;
        // two monitored branches, upper and lower bound each
        assert_eq!(sc.len(), 4);
        assert!(sc.failures.is_empty());

        let upper = &sc.constraints[2];
        assert_eq!(upper.name, "contingency_flow_upper-L3-L1-now");
        assert_eq!(upper.sense, Sense::Le);
        assert_eq!(upper.rhs, 80.0);
        assert_eq!(upper.terms[0], (FlowVar { snapshot: 0, branch: 2 }, 1.0));
        assert_eq!(upper.terms[1].0, FlowVar { snapshot: 0, branch: 0 });
        approx::assert_abs_diff_eq!(upper.terms[1].1, 1.0, epsilon = 1e-12);

        // losing L1 pushes 100 onto L3, above its rating of 80
        let flows = lpf(&factors, &Injections::single(vec![100.0, 0.0, -100.0]))?.flows;
        let violated = sc.violated(&flows, 1e-9);
        assert_eq!(violated.len(), 1);
        assert_eq!(violated[0].name, "contingency_flow_upper-L3-L1-now");
        approx::assert_abs_diff_eq!(violated[0].lhs(&flows), 100.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_unrated_branches_are_not_monitored() -> Result<()> {
        let mut net = cases::triangle();
        net.branch[2].s_nom = f64::INFINITY;
        net.branch[1].s_nom = 0.0;
        let factors = factors_of(&net)?;
        let topo = factors.topology();
        let snapshots = vec!["t0".to_string(), "t1".to_string()];

        let sc = security_constraints(&factors, &[0, 1, 2], &topo.capacities(), &snapshots)?;
        // only L1 is monitored, under the outages of L2 and L3
        assert_eq!(sc.len(), 2 * 2 * 2);
        assert!(sc
            .constraints
            .iter()
            .all(|c| c.terms[0].0.branch == 0 && c.rhs.abs() == 80.0));
        Ok(())
    }

    #[test]
    fn test_disconnecting_outage_is_reported() -> Result<()> {
        let factors = factors_of(&cases::bridged())?;
        let topo = factors.topology();
        let bridge = topo.branch_index("L4")?;
        let snapshots = vec!["now".to_string()];

        let sc = security_constraints(&factors, &[bridge, 0], &topo.capacities(), &snapshots)?;
        assert_eq!(sc.failures.len(), 1);
        assert_eq!(sc.failures[0].0, bridge);
        assert!(matches!(
            sc.failures[0].1,
            FlowError::DisconnectingOutage { .. }
        ));
        // L2, L3 and the bridge itself are monitored for the outage of L1
        assert_eq!(sc.len(), 3 * 2);

        // no flow moves onto the radial branch
        let l4 = sc
            .constraints
            .iter()
            .find(|c| c.name == "contingency_flow_upper-L4-L1-now")
            .ok_or_else(|| anyhow::format_err!("missing L4 constraint"))?;
        assert!(l4.terms.iter().skip(1).all(|(_, v)| v.abs() < 1e-12));
        Ok(())
    }

    #[test]
    fn test_outages_stay_in_their_sub_network() -> Result<()> {
        let mut net = cases::two_islands();
        net.branch[3].s_nom = 10.0;
        let factors = factors_of(&net)?;
        let topo = factors.topology();

        let sc = security_constraints(&factors, &[0], &topo.capacities(), &["now".to_string()])?;
        assert!(sc.constraints.iter().all(|c| c.terms[0].0.branch != 3));
        Ok(())
    }

    #[test]
    fn test_capacity_length_mismatch() -> Result<()> {
        let factors = factors_of(&cases::triangle())?;
        let result = security_constraints(&factors, &[0], &[1.0], &["now".to_string()]);
        assert!(matches!(result, Err(FlowError::Dimension { .. })));
        Ok(())
    }
}
