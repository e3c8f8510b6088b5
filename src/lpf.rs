use crate::debug::{format_f64, format_f64_vec};
use crate::dense::Mat;
use crate::error::{FlowError, Result};
use crate::factors::Factors;
use crate::math::norm_inf;

/// Active power bus injections, one row per snapshot.
///
/// Columns follow topology bus order. Positive values inject into the
/// network (generation), negative values withdraw (load).
#[derive(Clone, Debug, PartialEq)]
pub struct Injections {
    snapshots: Vec<String>,
    values: Mat<f64>,
}

impl Injections {
    pub fn new(snapshots: Vec<String>, values: Mat<f64>) -> Result<Self> {
        if snapshots.len() != values.rows() {
            return Err(FlowError::dimension(
                "injection snapshots",
                values.rows(),
                snapshots.len(),
            ));
        }
        Ok(Self { snapshots, values })
    }

    /// A single snapshot named "now".
    pub fn single(p: Vec<f64>) -> Self {
        let nb = p.len();
        Self {
            snapshots: vec!["now".to_string()],
            values: Mat::from_rows(1, nb, p).unwrap_or_default(),
        }
    }

    pub fn snapshots(&self) -> &[String] {
        &self.snapshots
    }

    pub fn values(&self) -> &Mat<f64> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn nb(&self) -> usize {
        self.values.cols()
    }
}

/// Pre-outage branch flows, one row per snapshot in topology branch order.
#[derive(Clone, Debug, PartialEq)]
pub struct BaseFlows {
    snapshots: Vec<String>,
    flows: Mat<f64>,
}

impl BaseFlows {
    pub fn new(snapshots: Vec<String>, flows: Mat<f64>) -> Result<Self> {
        if snapshots.len() != flows.rows() {
            return Err(FlowError::dimension(
                "flow snapshots",
                flows.rows(),
                snapshots.len(),
            ));
        }
        Ok(Self { snapshots, flows })
    }

    pub fn snapshots(&self) -> &[String] {
        &self.snapshots
    }

    pub fn flows(&self) -> &Mat<f64> {
        &self.flows
    }

    pub fn nl(&self) -> usize {
        self.flows.cols()
    }

    /// Flows of snapshot `s` in branch order.
    pub fn row(&self, s: usize) -> &[f64] {
        self.flows.row(s)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LpfResult {
    pub flows: BaseFlows,

    /// Power absorbed by the slack of each sub-network, one row per
    /// snapshot. Equal to the negated sum of the sub-network's injections.
    pub slack_injection: Mat<f64>,
}

/// Solves a linear (DC) power flow for every snapshot.
///
/// Branch flows are `PTDF * p` per sub-network. The imbalance of each
/// sub-network is taken up by its slack, or spread over its buses for a
/// distributed slack. Fails if the factors of any sub-network with
/// branches are unavailable.
pub fn lpf(factors: &Factors, injections: &Injections) -> Result<LpfResult> {
    let topology = factors.topology();
    if injections.nb() != topology.nb() {
        return Err(FlowError::dimension(
            "injection buses",
            topology.nb(),
            injections.nb(),
        ));
    }

    let n_snap = injections.len();
    let n_sub = topology.sub_networks().len();
    let mut flows = Mat::zeros(n_snap, topology.nl());
    let mut slack_injection = Mat::zeros(n_snap, n_sub);

    for sn in topology.sub_networks() {
        let ptdf = factors.ptdf(sn.index)?;

        for s in 0..n_snap {
            let p = injections.values().row(s);
            let p_local: Vec<f64> = ptdf.buses().iter().map(|&i| p[i]).collect();

            let f_local = ptdf.flows(&p_local)?;
            for (l, &br) in ptdf.branches().iter().enumerate() {
                flows.set(s, br, f_local[l]);
            }
            slack_injection.set(s, sn.index, -p_local.iter().sum::<f64>());
        }
    }

    if log::log_enabled!(log::Level::Debug) {
        for (s, name) in injections.snapshots().iter().enumerate() {
            log::debug!(
                "lpf: {}: max |flow| {}, slack {}",
                name,
                format_f64(norm_inf(flows.row(s))),
                format_f64_vec(slack_injection.row(s))
            );
        }
    }

    Ok(LpfResult {
        flows: BaseFlows::new(injections.snapshots().to_vec(), flows)?,
        slack_injection,
    })
}
