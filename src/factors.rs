use crate::bodf::{build_bodf, Bodf};
use crate::error::{FlowError, NumericalWarning, Result};
use crate::incidence::Incidence;
use crate::network::Network;
use crate::opt::FactorOpt;
use crate::ptdf::{sub_network_ptdf, Ptdf, Slack};
use crate::topology::Topology;
use crate::traits::LinearSolver;
use parking_lot::RwLock;
use rayon::prelude::*;
use std::sync::Arc;

/// PTDF and BODF of one sub-network.
#[derive(Clone, Debug)]
pub struct SubNetworkFactors {
    ptdf: Ptdf,
    bodf: Bodf,
}

impl SubNetworkFactors {
    pub fn ptdf(&self) -> &Ptdf {
        &self.ptdf
    }

    pub fn bodf(&self) -> &Bodf {
        &self.bodf
    }
}

/// Distribution factors of every sub-network of one topology.
///
/// A `Factors` value never changes after it is built. A sub-network whose
/// factors could not be computed keeps its error without affecting the
/// others.
#[derive(Debug)]
pub struct Factors {
    topology: Arc<Topology>,
    slack: Slack,
    sub_networks: Vec<Result<SubNetworkFactors>>,
    generation: u64,
}

impl Factors {
    pub fn build(
        topology: Arc<Topology>,
        slack: &Slack,
        opt: &FactorOpt,
        linsol: &dyn LinearSolver,
    ) -> Self {
        let build_one = |s: usize| -> Result<SubNetworkFactors> {
            let ptdf = sub_network_ptdf(&topology, s, slack, opt, linsol)?;
            let incidence = Incidence::new(&topology, &topology.sub_networks()[s]);
            let bodf = build_bodf(&ptdf, &incidence, opt)?;
            Ok(SubNetworkFactors { ptdf, bodf })
        };

        let n = topology.sub_networks().len();
        let sub_networks: Vec<Result<SubNetworkFactors>> = if opt.parallel {
            (0..n).into_par_iter().map(build_one).collect()
        } else {
            (0..n).map(build_one).collect()
        };

        for (s, result) in sub_networks.iter().enumerate() {
            if let Err(err) = result {
                log::warn!("sub-network {}: {}", s, err);
            }
        }

        Self {
            topology,
            slack: slack.clone(),
            sub_networks,
            generation: 0,
        }
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn slack(&self) -> &Slack {
        &self.slack
    }

    /// Publication counter assigned by the [`Engine`]. Zero if built directly.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.sub_networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sub_networks.is_empty()
    }

    pub fn sub_network(&self, s: usize) -> Result<&SubNetworkFactors> {
        match self.sub_networks.get(s) {
            Some(Ok(f)) => Ok(f),
            Some(Err(err)) => Err(err.clone()),
            None => Err(FlowError::dimension("sub-network index", self.len(), s)),
        }
    }

    pub fn ptdf(&self, s: usize) -> Result<&Ptdf> {
        self.sub_network(s).map(|f| &f.ptdf)
    }

    pub fn bodf(&self, s: usize) -> Result<&Bodf> {
        self.sub_network(s).map(|f| &f.bodf)
    }

    /// Factors of the sub-network containing topology branch `l`.
    pub fn branch_factors(&self, l: usize) -> Result<&SubNetworkFactors> {
        if l >= self.topology.nl() {
            return Err(FlowError::UnknownBranch(format!("#{}", l)));
        }
        self.sub_network(self.topology.branch_sub_network(l))
    }

    pub fn warnings(&self) -> Vec<NumericalWarning> {
        self.sub_networks
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .flat_map(|f| f.ptdf.warnings().iter().cloned())
            .collect()
    }

    pub fn failures(&self) -> Vec<(usize, FlowError)> {
        self.sub_networks
            .iter()
            .enumerate()
            .filter_map(|(s, r)| r.as_ref().err().map(|err| (s, err.clone())))
            .collect()
    }
}

/// Holds the published factors for the current topology.
///
/// Readers take an `Arc` snapshot and keep using it for as long as they
/// like. A topology change builds a complete new `Factors` outside the
/// lock and swaps it in. Generations increase in publication order.
pub struct Engine<S: LinearSolver> {
    opt: FactorOpt,
    slack: Slack,
    linsol: S,
    current: RwLock<Arc<Factors>>,
}

impl<S: LinearSolver> Engine<S> {
    pub fn new(topology: Topology, slack: Slack, opt: FactorOpt, linsol: S) -> Self {
        let mut factors = Factors::build(Arc::new(topology), &slack, &opt, &linsol);
        factors.generation = 1;
        Self {
            opt,
            slack,
            linsol,
            current: RwLock::new(Arc::new(factors)),
        }
    }

    pub fn opt(&self) -> &FactorOpt {
        &self.opt
    }

    /// The most recently published factors.
    pub fn current(&self) -> Arc<Factors> {
        self.current.read().clone()
    }

    /// Builds factors for `topology` and replaces the published set.
    pub fn publish(&self, topology: Topology) -> Arc<Factors> {
        let mut factors = Factors::build(Arc::new(topology), &self.slack, &self.opt, &self.linsol);

        // numbered under the same guard as the swap
        let factors = {
            let mut current = self.current.write();
            factors.generation = current.generation + 1;
            let factors = Arc::new(factors);
            *current = factors.clone();
            factors
        };
        log::info!(
            "published factors #{}: {} sub-networks, {} failed",
            factors.generation,
            factors.len(),
            factors.failures().len()
        );
        factors
    }

    /// Validates `network` and publishes its factors.
    pub fn update(&self, network: &Network) -> Result<Arc<Factors>> {
        let topology = Topology::new(network)?;
        Ok(self.publish(topology))
    }
}
