use crate::bodf::Bodf;
use crate::dense::Mat;
use crate::error::{FlowError, Result};
use crate::factors::Factors;
use crate::lpf::{lpf, BaseFlows, Injections};
use crate::opt::FactorOpt;
use crate::ptdf::Slack;
use crate::topology::Topology;
use crate::traits::LinearSolver;
use rayon::prelude::*;
use std::sync::Arc;

/// Source of branch outage distribution factors.
///
/// Branch indices are topology indices. Implemented by a single
/// sub-network's [`Bodf`] and by the [`Factors`] of a whole topology.
pub trait OutageFactors {
    /// Number of branches in the topology. Flow vectors must have this length.
    fn num_branches(&self) -> usize;

    fn branch_name(&self, c: usize) -> Option<&str>;

    /// Non-zero column `c` of the BODF as `(b, BODF[b, c])` pairs,
    /// including the diagonal `(c, -1)`. Branches outside the outaged
    /// branch's sub-network do not appear.
    fn outage_column(&self, c: usize) -> Result<Vec<(usize, f64)>>;
}

impl OutageFactors for Bodf {
    fn num_branches(&self) -> usize {
        self.topology_nl()
    }

    fn branch_name(&self, c: usize) -> Option<&str> {
        let lc = self.local(c).ok()?;
        Some(self.branch_names()[lc].as_str())
    }

    fn outage_column(&self, c: usize) -> Result<Vec<(usize, f64)>> {
        let column = self.column(c)?;
        Ok(self.branches().iter().copied().zip(column).collect())
    }
}

impl OutageFactors for Factors {
    fn num_branches(&self) -> usize {
        self.topology().nl()
    }

    fn branch_name(&self, c: usize) -> Option<&str> {
        self.topology().branch().get(c).map(|br| br.name.as_str())
    }

    fn outage_column(&self, c: usize) -> Result<Vec<(usize, f64)>> {
        self.branch_factors(c)?.bodf().outage_column(c)
    }
}

/// Post-outage flows for one outaged branch.
#[derive(Clone, Debug, PartialEq)]
pub struct OutageFlows {
    /// Topology index of the outaged branch.
    pub branch: usize,
    pub name: String,
    /// One row per snapshot, in topology branch order. The outaged branch
    /// itself carries zero flow.
    pub flows: Result<Mat<f64>>,
}

/// Base case and post-outage flows indexed by (snapshot, outage, branch).
#[derive(Clone, Debug, PartialEq)]
pub struct ContingencyTable {
    snapshots: Vec<String>,
    base: Mat<f64>,
    outages: Vec<OutageFlows>,
}

impl ContingencyTable {
    pub fn snapshots(&self) -> &[String] {
        &self.snapshots
    }

    /// Pre-outage flows, unchanged from the input.
    pub fn base(&self) -> &Mat<f64> {
        &self.base
    }

    pub fn outages(&self) -> &[OutageFlows] {
        &self.outages
    }

    /// Flow on `branch` in `snapshot` after the outage of branch `outage`,
    /// or the base case flow for `None`.
    pub fn flow(&self, snapshot: usize, outage: Option<usize>, branch: usize) -> Result<f64> {
        if snapshot >= self.base.rows() {
            return Err(FlowError::dimension("snapshot index", self.base.rows(), snapshot));
        }
        if branch >= self.base.cols() {
            return Err(FlowError::UnknownBranch(format!("#{}", branch)));
        }
        match outage {
            None => Ok(self.base.get(snapshot, branch)),
            Some(c) => {
                let entry = self
                    .outages
                    .iter()
                    .find(|o| o.branch == c)
                    .ok_or_else(|| FlowError::UnknownBranch(format!("#{}", c)))?;
                match &entry.flows {
                    Ok(flows) => Ok(flows.get(snapshot, branch)),
                    Err(err) => Err(err.clone()),
                }
            }
        }
    }

    /// Outages that could not be evaluated.
    pub fn failures(&self) -> Vec<(&str, &FlowError)> {
        self.outages
            .iter()
            .filter_map(|o| o.flows.as_ref().err().map(|err| (o.name.as_str(), err)))
            .collect()
    }
}

/// Evaluates single branch outages (N-1) against pre-computed BODFs.
///
/// For each outage `c` and each snapshot:
///
/// ```txt
/// f_post[b] = f[b] + BODF[b, c] * f[c]
/// ```
///
/// Each outage is evaluated independently of the others. One that cannot
/// be evaluated (typically a `DisconnectingOutage`) is recorded in the
/// table and the rest of the batch carries on. Outages are evaluated on
/// the rayon thread pool when `opt.parallel` is set.
pub fn contingency_flows<F>(
    base: &BaseFlows,
    factors: &F,
    outages: &[usize],
    opt: &FactorOpt,
) -> Result<ContingencyTable>
where
    F: OutageFactors + Sync,
{
    if base.nl() != factors.num_branches() {
        return Err(FlowError::dimension(
            "base flow branches",
            factors.num_branches(),
            base.nl(),
        ));
    }

    let evaluate = |&c: &usize| -> OutageFlows {
        let name = factors
            .branch_name(c)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", c));
        let flows = outage_flows(base, factors, c);
        if let Err(err) = &flows {
            log::warn!("outage of '{}': {}", name, err);
        }
        OutageFlows {
            branch: c,
            name,
            flows,
        }
    };

    let results: Vec<OutageFlows> = if opt.parallel {
        outages.par_iter().map(evaluate).collect()
    } else {
        outages.iter().map(evaluate).collect()
    };

    log::info!(
        "contingency: {} snapshots, {} outages, {} failed",
        base.snapshots().len(),
        results.len(),
        results.iter().filter(|o| o.flows.is_err()).count()
    );

    Ok(ContingencyTable {
        snapshots: base.snapshots().to_vec(),
        base: base.flows().clone(),
        outages: results,
    })
}

fn outage_flows<F: OutageFactors>(base: &BaseFlows, factors: &F, c: usize) -> Result<Mat<f64>> {
    if c >= base.nl() {
        return Err(FlowError::UnknownBranch(format!("#{}", c)));
    }
    let column = factors.outage_column(c)?;

    let mut flows = base.flows().clone();
    for s in 0..flows.rows() {
        let f_c = base.flows().get(s, c);
        let row = flows.row_mut(s);
        for &(b, bodf) in column.iter() {
            row[b] += bodf * f_c;
        }
    }
    Ok(flows)
}

/// Flows after the simultaneous outage of all `outages` (N-k).
///
/// The topology is rebuilt without the outaged branches, split into its
/// new islands, and every island is re-solved with its own slack. A
/// `Slack::Single` bus keeps its role in the island that contains it.
/// Outaged branches report zero flow. The returned flows are in the
/// branch order of `topology`.
pub fn resolve_outage_flows(
    topology: &Topology,
    injections: &Injections,
    outages: &[usize],
    slack: &Slack,
    opt: &FactorOpt,
    linsol: &dyn LinearSolver,
) -> Result<BaseFlows> {
    let reduced = topology.without_branches(outages)?;

    log::debug!(
        "resolve: {} outages, {} -> {} sub-networks",
        outages.len(),
        topology.sub_networks().len(),
        reduced.sub_networks().len()
    );

    let factors = Factors::build(Arc::new(reduced), slack, opt, linsol);
    let result = lpf(&factors, injections)?;

    let reduced = factors.topology();
    let mut flows = Mat::zeros(injections.len(), topology.nl());
    for (l, br) in reduced.branch().iter().enumerate() {
        let k = topology.branch_index(&br.name)?;
        for s in 0..injections.len() {
            flows.set(s, k, result.flows.flows().get(s, l));
        }
    }
    BaseFlows::new(injections.snapshots().to_vec(), flows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodf::build_bodf;
    use crate::incidence::Incidence;
    use crate::ptdf::sub_network_ptdf;
    use crate::tests::cases;
    use anyhow::Result;
    use approx::assert_abs_diff_eq;
    use spsolve::rlu::RLU;

    fn setup(net: &crate::network::Network, p: Vec<f64>) -> Result<(Factors, Injections, BaseFlows)> {
        let topo = Arc::new(Topology::new(net)?);
        let factors = Factors::build(topo, &Slack::Default, &FactorOpt::default(), &RLU::default());
        let injections = Injections::single(p);
        let base = lpf(&factors, &injections)?.flows;
        Ok((factors, injections, base))
    }

    #[test]
    fn test_no_outages_returns_base() -> Result<()> {
        let (factors, _, base) = setup(&cases::meshed(), vec![30.0, -10.0, 45.0, -65.0])?;
        let table = contingency_flows(&base, &factors, &[], &FactorOpt::default())?;

        assert!(table.outages().is_empty());
        assert_eq!(table.base(), base.flows());
        assert_eq!(table.flow(0, None, 2)?, base.row(0)[2]);
        Ok(())
    }

    #[test]
    fn test_triangle_outage_matches_resolve() -> Result<()> {
        let (factors, injections, base) = setup(&cases::triangle(), vec![100.0, 0.0, -100.0])?;
        let l1 = factors.topology().branch_index("L1")?;
        let table = contingency_flows(&base, &factors, &[l1], &FactorOpt::default())?;

        let after: Vec<f64> = (0..3).map(|b| table.flow(0, Some(l1), b)).collect::<crate::Result<_>>()?;
        assert_abs_diff_eq!(after[0], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(after[1], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(after[2], 100.0, epsilon = 1e-9);

        // L1's flow moves onto the parallel path through L3
        let before = base.row(0);
        assert_abs_diff_eq!(after[1] + after[2], before[0] + before[1], epsilon = 1e-9);

        let resolved = resolve_outage_flows(
            factors.topology(),
            &injections,
            &[l1],
            &Slack::Default,
            &FactorOpt::default(),
            &RLU::default(),
        )?;
        for (a, b) in after.iter().zip(resolved.row(0)) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_bodf_agrees_with_resolve_on_meshed_network() -> Result<()> {
        let (factors, injections, base) = setup(&cases::meshed(), vec![30.0, -10.0, 45.0, -65.0])?;
        let outages: Vec<usize> = (0..factors.topology().nl()).collect();
        let table = contingency_flows(&base, &factors, &outages, &FactorOpt::default())?;
        assert!(table.failures().is_empty());

        for &c in outages.iter() {
            let resolved = resolve_outage_flows(
                factors.topology(),
                &injections,
                &[c],
                &Slack::Default,
                &FactorOpt::default(),
                &RLU::default(),
            )?;
            for b in 0..outages.len() {
                assert_abs_diff_eq!(table.flow(0, Some(c), b)?, resolved.row(0)[b], epsilon = 1e-9);
            }
        }
        Ok(())
    }

    #[test]
    fn test_disconnecting_outage_is_reported_per_item() -> Result<()> {
        let (factors, injections, base) = setup(&cases::bridged(), vec![100.0, 0.0, -60.0, -40.0])?;
        let bridge = factors.topology().branch_index("L4")?;
        let table = contingency_flows(&base, &factors, &[0, bridge, 2], &FactorOpt::default())?;

        let failures = table.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "L4");
        assert!(failures[0].1.requires_split());
        assert!(table.flow(0, Some(bridge), 0).is_err());
        assert!(table.flow(0, Some(0), 1).is_ok());
        assert!(table.flow(0, Some(2), 1).is_ok());

        // re-solving the split network: D is islanded and keeps its own load
        let resolved = resolve_outage_flows(
            factors.topology(),
            &injections,
            &[bridge],
            &Slack::Default,
            &FactorOpt::default(),
            &RLU::default(),
        )?;
        let expect = [60.0, 20.0, 40.0, 0.0];
        for (f, e) in resolved.row(0).iter().zip(expect) {
            assert_abs_diff_eq!(*f, e, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_outage_in_other_island_leaves_flows_unchanged() -> Result<()> {
        let (factors, _, base) = setup(&cases::two_islands(), vec![100.0, 0.0, -100.0, 20.0, -20.0])?;
        let table = contingency_flows(&base, &factors, &[0], &FactorOpt::default())?;
        assert_abs_diff_eq!(table.flow(0, Some(0), 3)?, 20.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_serial_matches_parallel() -> Result<()> {
        let (factors, _, base) = setup(&cases::meshed(), vec![30.0, -10.0, 45.0, -65.0])?;
        let outages = [4, 0, 2];
        let serial = FactorOpt {
            parallel: false,
            ..Default::default()
        };
        let a = contingency_flows(&base, &factors, &outages, &serial)?;
        let b = contingency_flows(&base, &factors, &outages, &FactorOpt::default())?;
        assert_eq!(a, b);
        assert_eq!(a.outages()[0].branch, 4);
        Ok(())
    }

    #[test]
    fn test_single_bodf_as_outage_factors() -> Result<()> {
        let (factors, _, base) = setup(&cases::triangle(), vec![100.0, 0.0, -100.0])?;
        let topo = factors.topology();
        let opt = FactorOpt::default();
        let ptdf = sub_network_ptdf(topo, 0, &Slack::Default, &opt, &RLU::default())?;
        let bodf = build_bodf(&ptdf, &Incidence::new(topo, &topo.sub_networks()[0]), &opt)?;

        let table = contingency_flows(&base, &bodf, &[0, 7], &opt)?;
        assert_abs_diff_eq!(table.flow(0, Some(0), 2)?, 100.0, epsilon = 1e-9);
        assert!(matches!(
            table.flow(0, Some(7), 0),
            Err(FlowError::UnknownBranch(_))
        ));
        assert_eq!(table.outages()[1].name, "#7");
        Ok(())
    }

    #[test]
    fn test_mismatched_base_flows() -> Result<()> {
        let (factors, _, _) = setup(&cases::triangle(), vec![100.0, 0.0, -100.0])?;
        let base = BaseFlows::new(vec!["now".into()], Mat::zeros(1, 2))?;
        assert!(contingency_flows(&base, &factors, &[0], &FactorOpt::default()).is_err());
        Ok(())
    }

    #[test]
    fn test_simultaneous_outages() -> Result<()> {
        let (factors, injections, _) = setup(&cases::meshed(), vec![30.0, -10.0, 45.0, -65.0])?;
        let topo = factors.topology();
        let outages = [topo.branch_index("a")?, topo.branch_index("e")?];
        let resolved = resolve_outage_flows(
            topo,
            &injections,
            &outages,
            &Slack::Single(0),
            &FactorOpt::default(),
            &RLU::default(),
        )?;

        // the remaining network is the radial chain 1-4-3-2
        let expect = [0.0, -10.0, 35.0, -30.0, 0.0];
        for (f, e) in resolved.row(0).iter().zip(expect) {
            assert_abs_diff_eq!(*f, e, epsilon = 1e-9);
        }
        Ok(())
    }
}
