use crate::dense::Mat;
use crate::error::{FlowError, Result};
use crate::incidence::Incidence;
use crate::math::bridge_tolerance;
use crate::opt::FactorOpt;
use crate::ptdf::Ptdf;
use std::collections::HashMap;

/// Branch outage distribution factors of one sub-network.
///
/// `BODF[b, c]` is the fraction of the pre-outage flow on branch `c` that
/// moves onto branch `b` when `c` is removed. Rows and columns are the
/// sub-network's branches in local order. The diagonal is exactly `-1`.
///
/// Columns whose outage would split the sub-network are flagged instead
/// of holding infinite values. Reading them returns `DisconnectingOutage`.
#[derive(Clone, Debug)]
pub struct Bodf {
    sub_network: usize,
    branches: Vec<usize>,
    branch_names: Vec<String>,
    branch_local: HashMap<usize, usize>,
    topology_nl: usize,

    bptdf: Mat<f64>,
    values: Mat<f64>,
    disconnecting: Vec<bool>,
    tolerance: f64,
}

impl Bodf {
    pub fn sub_network(&self) -> usize {
        self.sub_network
    }

    /// Topology branch index of each row/column.
    pub fn branches(&self) -> &[usize] {
        &self.branches
    }

    pub fn nl(&self) -> usize {
        self.branches.len()
    }

    /// Number of branches in the topology the factors were built from.
    pub fn topology_nl(&self) -> usize {
        self.topology_nl
    }

    pub fn branch_names(&self) -> &[String] {
        &self.branch_names
    }

    /// Branch-to-branch transfer factors `PTDF * K`.
    pub fn bptdf(&self) -> &Mat<f64> {
        &self.bptdf
    }

    /// Raw factor matrix. Disconnecting columns hold zeros off the diagonal.
    pub fn values(&self) -> &Mat<f64> {
        &self.values
    }

    /// Tolerance used for detecting disconnecting outages.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub(crate) fn local(&self, branch: usize) -> Result<usize> {
        self.branch_local
            .get(&branch)
            .copied()
            .ok_or_else(|| FlowError::UnknownBranch(format!("#{}", branch)))
    }

    /// True if removing `branch` (topology index) splits the sub-network.
    pub fn is_disconnecting(&self, branch: usize) -> Result<bool> {
        Ok(self.disconnecting[self.local(branch)?])
    }

    /// Topology indices of all branches whose outage splits the sub-network.
    pub fn disconnecting(&self) -> Vec<usize> {
        self.branches
            .iter()
            .zip(&self.disconnecting)
            .filter(|(_, &d)| d)
            .map(|(&br, _)| br)
            .collect()
    }

    fn check_column(&self, c: usize) -> Result<()> {
        if self.disconnecting[c] {
            return Err(FlowError::DisconnectingOutage {
                branch: self.branch_names[c].clone(),
                bptdf: self.bptdf.get(c, c),
            });
        }
        Ok(())
    }

    /// Factor for branch `b` when branch `c` is out (topology indices).
    pub fn get(&self, b: usize, c: usize) -> Result<f64> {
        let (lb, lc) = (self.local(b)?, self.local(c)?);
        self.check_column(lc)?;
        Ok(self.values.get(lb, lc))
    }

    /// Column of factors for the outage of branch `c`, in local row order.
    pub fn column(&self, c: usize) -> Result<Vec<f64>> {
        let lc = self.local(c)?;
        self.check_column(lc)?;
        Ok(self.values.col(lc).collect())
    }
}

/// Builds the branch outage distribution factor matrix.
///
/// Returns the DC branch outage distribution factors for a given PTDF and
/// the incidence matrix of the same sub-network:
///
/// ```txt
/// BPTDF = PTDF * K
/// BODF[b, c] = BPTDF[b, c] / (1 - BPTDF[c, c]),  b != c
/// BODF[c, c] = -1
/// ```
///
/// Column `c` is flagged as disconnecting when `|1 - BPTDF[c, c]|` is
/// within `max(bridge_tolerance, cond * eps)`.
pub fn build_bodf(ptdf: &Ptdf, incidence: &Incidence, opt: &FactorOpt) -> Result<Bodf> {
    if ptdf.branches() != incidence.branches() {
        return Err(FlowError::dimension(
            "incidence branches",
            ptdf.branches().len(),
            incidence.nl(),
        ));
    }
    if ptdf.buses() != incidence.buses() {
        return Err(FlowError::dimension(
            "incidence buses",
            ptdf.buses().len(),
            incidence.nb(),
        ));
    }

    let nl = incidence.nl();
    let bptdf = ptdf.values().mat_mat(&incidence.to_dense());

    let tolerance = bridge_tolerance(opt.bridge_tolerance, ptdf.condition());
    let disconnecting: Vec<bool> = bptdf
        .diagonal()
        .map(|h_cc| (1.0 - h_cc).abs() <= tolerance)
        .collect();

    let mut values = Mat::zeros(nl, nl);
    for c in 0..nl {
        if !disconnecting[c] {
            let denom = 1.0 - bptdf.get(c, c);
            for b in 0..nl {
                values.set(b, c, bptdf.get(b, c) / denom);
            }
        }
        values.set(c, c, -1.0);
    }

    let n_disc = disconnecting.iter().filter(|&&d| d).count();
    if n_disc > 0 {
        log::debug!(
            "bodf: sub-network {}: {} of {} outages disconnect the network",
            incidence.sub_network(),
            n_disc,
            nl
        );
    }

    Ok(Bodf {
        sub_network: incidence.sub_network(),
        branches: incidence.branches().to_vec(),
        branch_names: incidence.branch_names().to_vec(),
        branch_local: incidence
            .branches()
            .iter()
            .enumerate()
            .map(|(l, &br)| (br, l))
            .collect(),
        topology_nl: incidence.topology_nl(),
        bptdf,
        values,
        disconnecting,
        tolerance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ptdf::{sub_network_ptdf, Slack};
    use crate::tests::cases;
    use crate::topology::Topology;
    use anyhow::Result;
    use approx::assert_abs_diff_eq;
    use spsolve::rlu::RLU;

    fn bodf_of(topo: &Topology, sn: usize) -> Result<Bodf> {
        let opt = FactorOpt::default();
        let ptdf = sub_network_ptdf(topo, sn, &Slack::Default, &opt, &RLU::default())?;
        let incidence = Incidence::new(topo, &topo.sub_networks()[sn]);
        Ok(build_bodf(&ptdf, &incidence, &opt)?)
    }

    #[test]
    fn test_diagonal_is_minus_one() -> Result<()> {
        for net in [cases::triangle(), cases::meshed(), cases::bridged()] {
            let topo = Topology::new(&net)?;
            let bodf = bodf_of(&topo, 0)?;
            for v in bodf.values().diagonal() {
                assert_eq!(v, -1.0);
            }
        }
        Ok(())
    }

    #[test]
    fn test_triangle_outage_of_l1() -> Result<()> {
        let topo = Topology::new(&cases::triangle())?;
        let bodf = bodf_of(&topo, 0)?;

        assert_abs_diff_eq!(bodf.bptdf().get(0, 0), 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(bodf.get(1, 0)?, -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(bodf.get(2, 0)?, 1.0, epsilon = 1e-12);
        assert!(bodf.disconnecting().is_empty());
        Ok(())
    }

    #[test]
    fn test_bptdf_columns_are_terminal_differences() -> Result<()> {
        let topo = Topology::new(&cases::meshed())?;
        let opt = FactorOpt::default();
        let ptdf = sub_network_ptdf(&topo, 0, &Slack::Default, &opt, &RLU::default())?;
        let incidence = Incidence::new(&topo, &topo.sub_networks()[0]);
        let bodf = build_bodf(&ptdf, &incidence, &opt)?;

        assert_eq!(bodf.bptdf().shape(), (5, 5));
        for c in 0..incidence.nl() {
            let (f, t) = (incidence.from_bus()[c], incidence.to_bus()[c]);
            for b in 0..incidence.nl() {
                let expected = ptdf.values().get(b, f) - ptdf.values().get(b, t);
                assert_abs_diff_eq!(bodf.bptdf().get(b, c), expected, epsilon = 1e-12);
            }
        }
        Ok(())
    }

    #[test]
    fn test_bridge_column_is_flagged() -> Result<()> {
        let topo = Topology::new(&cases::bridged())?;
        let bodf = bodf_of(&topo, 0)?;
        let bridge = topo.branch_index("L4")?;

        assert_eq!(bodf.disconnecting(), vec![bridge]);
        assert!(bodf.is_disconnecting(bridge)?);
        match bodf.column(bridge) {
            Err(FlowError::DisconnectingOutage { branch, bptdf }) => {
                assert_eq!(branch, "L4");
                assert_abs_diff_eq!(bptdf, 1.0, epsilon = 1e-9);
            }
            other => panic!("expected disconnecting outage, got {:?}", other),
        }
        assert!(bodf.get(0, bridge).is_err());

        // other columns are unaffected and finite
        for c in 0..3 {
            for v in bodf.column(c)? {
                assert!(v.is_finite());
            }
            // no flow moves onto the radial branch
            assert_abs_diff_eq!(bodf.get(bridge, c)?, 0.0, epsilon = 1e-12);
        }
        Ok(())
    }

    #[test]
    fn test_radial_line_is_disconnecting() -> Result<()> {
        let topo = Topology::new(&cases::two_islands())?;
        let bodf = bodf_of(&topo, 1)?;
        assert_eq!(bodf.disconnecting(), vec![3]);
        assert!(bodf.get(3, 3).is_err());
        Ok(())
    }

    #[test]
    fn test_mismatched_incidence_is_rejected() -> Result<()> {
        let topo = Topology::new(&cases::two_islands())?;
        let opt = FactorOpt::default();
        let ptdf = sub_network_ptdf(&topo, 0, &Slack::Default, &opt, &RLU::default())?;
        let other = Incidence::new(&topo, &topo.sub_networks()[1]);
        assert!(matches!(
            build_bodf(&ptdf, &other, &opt),
            Err(FlowError::Dimension { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_bodf_is_independent_of_slack() -> Result<()> {
        let topo = Topology::new(&cases::meshed())?;
        let opt = FactorOpt::default();
        let incidence = Incidence::new(&topo, &topo.sub_networks()[0]);

        let a = sub_network_ptdf(&topo, 0, &Slack::Default, &opt, &RLU::default())?;
        let b = sub_network_ptdf(&topo, 0, &Slack::Weights(vec![1.0, 0.0, 2.0, 1.0]), &opt, &RLU::default())?;
        let bodf_a = build_bodf(&a, &incidence, &opt)?;
        let bodf_b = build_bodf(&b, &incidence, &opt)?;
        for (x, y) in bodf_a.values().values().iter().zip(bodf_b.values().values()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-12);
        }
        Ok(())
    }
}
