use crate::debug::format_f64_mat;
use crate::dense::Mat;
use crate::error::{FlowError, NumericalWarning, Result};
use crate::incidence::{make_b_dc, reduced_norm_1, Incidence};
use crate::opt::FactorOpt;
use crate::topology::{SubNetwork, Topology};
use crate::traits::LinearSolver;
use std::collections::HashMap;

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Slack {
    /// The designated slack bus of each sub-network.
    #[default]
    Default,
    /// Single slack bus, by topology bus index. Sub-networks that do not
    /// contain it use their designated slack.
    Single(usize),
    /// Weights specifying the proportion of the slack taken up at each bus,
    /// in topology bus order. Normalized per sub-network.
    Weights(Vec<f64>),
}

/// DC power transfer distribution factors of one sub-network.
///
/// `values()` has one row per branch and one column per bus of the
/// sub-network, so that `flow = PTDF * p` for any injection vector `p`
/// whose imbalance is taken up by the slack.
#[derive(Clone, Debug)]
pub struct Ptdf {
    sub_network: usize,
    buses: Vec<usize>,
    branches: Vec<usize>,
    bus_local: HashMap<usize, usize>,
    branch_local: HashMap<usize, usize>,

    slack_bus: usize,
    weights: Option<Vec<f64>>,

    values: Mat<f64>,

    condition: f64,
    warnings: Vec<NumericalWarning>,
}

impl Ptdf {
    pub fn sub_network(&self) -> usize {
        self.sub_network
    }

    /// Topology bus index of each column.
    pub fn buses(&self) -> &[usize] {
        &self.buses
    }

    /// Topology branch index of each row.
    pub fn branches(&self) -> &[usize] {
        &self.branches
    }

    /// Angle reference bus (topology index).
    pub fn slack_bus(&self) -> usize {
        self.slack_bus
    }

    /// Normalized slack distribution over the sub-network's buses, if any.
    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    pub fn values(&self) -> &Mat<f64> {
        &self.values
    }

    /// Factor for flow on `branch` per unit injected at `bus`.
    pub fn get(&self, branch: usize, bus: usize) -> Result<f64> {
        let l = self.local_branch(branch)?;
        let i = self.local_bus(bus)?;
        Ok(self.values.get(l, i))
    }

    pub(crate) fn local_bus(&self, bus: usize) -> Result<usize> {
        self.bus_local
            .get(&bus)
            .copied()
            .ok_or_else(|| FlowError::UnknownBus(format!("#{}", bus)))
    }

    pub(crate) fn local_branch(&self, branch: usize) -> Result<usize> {
        self.branch_local
            .get(&branch)
            .copied()
            .ok_or_else(|| FlowError::UnknownBranch(format!("#{}", branch)))
    }

    /// Branch flows for injections `p` given in sub-network bus order.
    pub fn flows(&self, p: &[f64]) -> Result<Vec<f64>> {
        if p.len() != self.buses.len() {
            return Err(FlowError::dimension(
                "injection vector",
                self.buses.len(),
                p.len(),
            ));
        }
        Ok(self.values.mat_vec(p))
    }

    /// Exact 1-norm condition number of the reduced susceptance matrix.
    pub fn condition(&self) -> f64 {
        self.condition
    }

    pub fn warnings(&self) -> &[NumericalWarning] {
        &self.warnings
    }
}

/// Builds the DC PTDF matrix of a connected topology.
///
/// Fails with `SingularNetwork` if the topology has more than one
/// sub-network. Use [`sub_network_ptdf`] for each island instead.
pub fn build_ptdf(
    topology: &Topology,
    slack: &Slack,
    opt: &FactorOpt,
    linsol: &dyn LinearSolver,
) -> Result<Ptdf> {
    match topology.sub_networks().len() {
        0 => Err(FlowError::SingularNetwork {
            reason: "network has no buses".to_string(),
        }),
        1 => sub_network_ptdf(topology, 0, slack, opt, linsol),
        n => Err(FlowError::SingularNetwork {
            reason: format!(
                "network is split into {} sub-networks, compute each separately",
                n
            ),
        }),
    }
}

/// Builds the DC PTDF matrix of sub-network `index` for a given choice of slack.
pub fn sub_network_ptdf(
    topology: &Topology,
    index: usize,
    slack: &Slack,
    opt: &FactorOpt,
    linsol: &dyn LinearSolver,
) -> Result<Ptdf> {
    let sn = topology
        .sub_networks()
        .get(index)
        .ok_or_else(|| FlowError::dimension("sub-network index", topology.sub_networks().len(), index))?;
    let incidence = Incidence::new(topology, sn);

    let (slack_bus, weights) = resolve_slack(topology, sn, slack)?;
    make_ptdf(&incidence, slack_bus, weights, opt, linsol)
}

/// Chooses the angle reference and, for a distributed slack, the
/// normalized weights over the sub-network's buses.
fn resolve_slack(
    topology: &Topology,
    sn: &SubNetwork,
    slack: &Slack,
) -> Result<(usize, Option<Vec<f64>>)> {
    match slack {
        Slack::Default => Ok((sn.slack, None)),
        Slack::Single(i) => {
            if *i >= topology.nb() {
                return Err(FlowError::InvalidSlack(format!(
                    "bus #{} is not in the network ({} buses)",
                    i,
                    topology.nb()
                )));
            }
            if !sn.buses.contains(i) {
                log::debug!(
                    "sub-network {}: slack bus #{} is elsewhere, using bus #{}",
                    sn.index,
                    i,
                    sn.slack
                );
                return Ok((sn.slack, None));
            }
            Ok((*i, None))
        }
        Slack::Weights(weights) => {
            if weights.len() != topology.nb() {
                return Err(FlowError::dimension(
                    "slack weights",
                    topology.nb(),
                    weights.len(),
                ));
            }
            let w: Vec<f64> = sn.buses.iter().map(|&i| weights[i]).collect();
            if w.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(FlowError::InvalidSlack(
                    "weights must be finite and non-negative".to_string(),
                ));
            }
            let total: f64 = w.iter().sum();
            if total == 0.0 {
                log::debug!(
                    "sub-network {}: no slack weight, using single slack",
                    sn.index
                );
                return Ok((sn.slack, None));
            }
            Ok((sn.slack, Some(w.iter().map(|v| v / total).collect()))) // normalize weights
        }
    }
}

fn make_ptdf(
    incidence: &Incidence,
    slack_bus: usize,
    weights: Option<Vec<f64>>,
    opt: &FactorOpt,
    linsol: &dyn LinearSolver,
) -> Result<Ptdf> {
    let nb = incidence.nb();
    let nl = incidence.nl();
    let sub_network = incidence.sub_network();

    let bus_local: HashMap<usize, usize> = incidence
        .buses()
        .iter()
        .enumerate()
        .map(|(i, &b)| (b, i))
        .collect();
    let branch_local: HashMap<usize, usize> = incidence
        .branches()
        .iter()
        .enumerate()
        .map(|(l, &br)| (br, l))
        .collect();
    let slack = bus_local[&slack_bus];
    let noslack: Vec<usize> = (0..nb).filter(|&i| i != slack).collect();

    //  compute PTDF for single slack_bus  //
    let mut d_theta = Mat::zeros(nb, nb);
    let mut condition = 1.0;
    if !noslack.is_empty() {
        let b_noslack = make_b_dc(incidence)
            .and_then(|b_bus| b_bus.select(Some(&noslack), Some(&noslack)))
            .map_err(|err| FlowError::Solver(err.to_string()))?
            .to_csc();

        // solve for change in voltage angles, one unit injection at a time
        let mut inv_norm_1: f64 = 0.0;
        for (k, &j) in noslack.iter().enumerate() {
            let mut rhs = vec![0.0; noslack.len()];
            rhs[k] = 1.0;
            linsol
                .solve(&b_noslack, &mut rhs)
                .map_err(|err| FlowError::SingularNetwork {
                    reason: format!("sub-network {}: {}", sub_network, err),
                })?;
            if rhs.iter().any(|v| !v.is_finite()) {
                return Err(FlowError::SingularNetwork {
                    reason: format!("sub-network {}: susceptance matrix is singular", sub_network),
                });
            }
            inv_norm_1 = inv_norm_1.max(rhs.iter().map(|v| v.abs()).sum());
            for (m, &i) in noslack.iter().enumerate() {
                d_theta.set(i, j, rhs[m]);
            }
        }

        let keep: Vec<bool> = (0..nb).map(|i| i != slack).collect();
        condition = reduced_norm_1(incidence, &keep) * inv_norm_1;
    }

    // compute corresponding change in branch flows
    let mut h = Mat::zeros(nl, nb);
    for l in 0..nl {
        let b = incidence.susceptance()[l];
        let (f, t) = (incidence.from_bus()[l], incidence.to_bus()[l]);
        let row = h.row_mut(l);
        for (j, h_lj) in row.iter_mut().enumerate() {
            *h_lj = b * (d_theta.get(f, j) - d_theta.get(t, j));
        }
    }

    // distribute slack, if requested //
    if let Some(w) = weights.as_ref() {
        // conceptually, we want to do ...
        //    H = H * (eye(nb,nb) - slack * ones(1, nb));
        // ... we just do it more efficiently
        let v = h.mat_vec(w);
        for (l, v_l) in v.iter().enumerate() {
            h.row_mut(l).iter_mut().for_each(|h_lj| *h_lj -= v_l);
        }
    }

    let mut warnings = Vec::new();
    if condition > opt.condition_limit {
        if opt.strict {
            return Err(FlowError::IllConditioned {
                condition,
                limit: opt.condition_limit,
            });
        }
        let warning = NumericalWarning {
            sub_network,
            condition,
            limit: opt.condition_limit,
        };
        log::warn!("{}", warning);
        warnings.push(warning);
    }

    log::debug!(
        "ptdf: sub-network {} ({} x {}), slack #{}, condition {:e}",
        sub_network,
        nl,
        nb,
        slack_bus,
        condition
    );
    log::trace!("PTDF =\n{}", format_f64_mat(&h));

    Ok(Ptdf {
        sub_network,
        buses: incidence.buses().to_vec(),
        branches: incidence.branches().to_vec(),
        bus_local,
        branch_local,
        slack_bus,
        weights,
        values: h,
        condition,
        warnings,
    })
}
