use crate::dense::Mat;
use crate::topology::{SubNetwork, Topology};
use anyhow::Result;
use sparsetools::coo::Coo;
use sparsetools::csr::CSR;
use std::collections::HashMap;

/// Incidence matrix `K` of one sub-network.
///
/// Rows are the sub-network's buses and columns its branches, both in
/// local order. Column `l` holds `+1` at the "from" bus and `-1` at the
/// "to" bus of branch `l`.
#[derive(Clone, Debug)]
pub struct Incidence {
    sub_network: usize,
    buses: Vec<usize>,
    branches: Vec<usize>,
    branch_names: Vec<String>,
    /// Number of branches in the whole topology.
    topology_nl: usize,

    /// Local "from" bus of each local branch.
    from_bus: Vec<usize>,
    /// Local "to" bus of each local branch.
    to_bus: Vec<usize>,
    susceptance: Vec<f64>,
}

impl Incidence {
    pub fn new(topology: &Topology, sn: &SubNetwork) -> Self {
        let bus_local: HashMap<usize, usize> = sn
            .buses
            .iter()
            .enumerate()
            .map(|(i, &bus)| (bus, i))
            .collect();

        let nl = sn.nl();
        let mut from_bus = Vec::with_capacity(nl);
        let mut to_bus = Vec::with_capacity(nl);
        let mut susceptance = Vec::with_capacity(nl);
        let mut branch_names = Vec::with_capacity(nl);

        for &br in sn.branches.iter() {
            from_bus.push(bus_local[&topology.from_bus()[br]]);
            to_bus.push(bus_local[&topology.to_bus()[br]]);
            susceptance.push(topology.susceptance()[br]);
            branch_names.push(topology.branch()[br].name.clone());
        }

        Self {
            sub_network: sn.index,
            buses: sn.buses.clone(),
            branches: sn.branches.clone(),
            branch_names,
            topology_nl: topology.nl(),
            from_bus,
            to_bus,
            susceptance,
        }
    }

    pub fn sub_network(&self) -> usize {
        self.sub_network
    }

    pub fn nb(&self) -> usize {
        self.buses.len()
    }

    pub fn nl(&self) -> usize {
        self.branches.len()
    }

    /// Topology bus index of each row.
    pub fn buses(&self) -> &[usize] {
        &self.buses
    }

    /// Topology branch index of each column.
    pub fn branches(&self) -> &[usize] {
        &self.branches
    }

    pub fn branch_names(&self) -> &[String] {
        &self.branch_names
    }

    pub fn topology_nl(&self) -> usize {
        self.topology_nl
    }

    pub fn from_bus(&self) -> &[usize] {
        &self.from_bus
    }

    pub fn to_bus(&self) -> &[usize] {
        &self.to_bus
    }

    pub fn susceptance(&self) -> &[f64] {
        &self.susceptance
    }

    /// Entry `K[i, l]` in local indices.
    pub fn get(&self, i: usize, l: usize) -> f64 {
        if self.from_bus[l] == i {
            1.0
        } else if self.to_bus[l] == i {
            -1.0
        } else {
            0.0
        }
    }

    /// Dense copy of `K` (buses x branches).
    pub fn to_dense(&self) -> Mat<f64> {
        let mut k = Mat::zeros(self.nb(), self.nl());
        for l in 0..self.nl() {
            k.set(self.from_bus[l], l, self.get(self.from_bus[l], l));
            k.set(self.to_bus[l], l, self.get(self.to_bus[l], l));
        }
        k
    }
}

/// Builds the bus susceptance matrix `Bbus = K * diag(b) * K'` for a DC
/// power flow of one sub-network, so that the real power bus injections
/// are related to the bus voltage angles by
///     P = Bbus * Va
///
/// Each branch adds `b` to both diagonal entries and `-b` to the two
/// off-diagonal ones. Parallel branches give duplicate entries, which are
/// summed so the result is in canonical form.
pub(crate) fn make_b_dc(incidence: &Incidence) -> Result<CSR<usize, f64>> {
    let (nb, nl) = (incidence.nb(), incidence.nl());

    let mut b_bus = Coo::with_capacity(nb, nb, 4 * nl);
    for l in 0..nl {
        let b = incidence.susceptance[l];
        let (f, t) = (incidence.from_bus[l], incidence.to_bus[l]);
        b_bus.push(f, f, b);
        b_bus.push(t, t, b);
        b_bus.push(f, t, -b);
        b_bus.push(t, f, -b);
    }
    let mut b_bus = b_bus.to_csr();
    b_bus.sum_duplicates()?;

    Ok(b_bus)
}

/// 1-norm of `Bbus` restricted to the rows and columns in `keep`.
///
/// Computed from the branch list: column `j` sums the diagonal
/// `sum(b)` over branches at `j` and `|-b|` for each kept neighbour.
pub(crate) fn reduced_norm_1(incidence: &Incidence, keep: &[bool]) -> f64 {
    let mut col_sum = vec![0.0; incidence.nb()];
    for l in 0..incidence.nl() {
        let (f, t) = (incidence.from_bus[l], incidence.to_bus[l]);
        let b = incidence.susceptance[l].abs();
        col_sum[f] += b;
        col_sum[t] += b;
        if keep[t] {
            col_sum[f] += b;
        }
        if keep[f] {
            col_sum[t] += b;
        }
    }
    col_sum
        .iter()
        .zip(keep)
        .filter(|(_, &k)| k)
        .fold(0.0, |max, (&s, _)| f64::max(max, s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::cases;
    use anyhow::Result;

    #[test]
    fn test_incidence_columns() -> Result<()> {
        let topo = Topology::new(&cases::triangle())?;
        let inc = Incidence::new(&topo, &topo.sub_networks()[0]);

        assert_eq!((inc.nb(), inc.nl()), (3, 3));
        for l in 0..inc.nl() {
            let col: Vec<f64> = (0..inc.nb()).map(|i| inc.get(i, l)).collect();
            assert_eq!(col.iter().filter(|&&v| v == 1.0).count(), 1);
            assert_eq!(col.iter().filter(|&&v| v == -1.0).count(), 1);
            assert_eq!(col.iter().sum::<f64>(), 0.0);
        }
        assert_eq!(inc.get(0, 2), 1.0); // L3 leaves A
        assert_eq!(inc.get(2, 2), -1.0); // and enters C
        Ok(())
    }

    #[test]
    fn test_local_indices_in_second_island() -> Result<()> {
        let topo = Topology::new(&cases::two_islands())?;
        let inc = Incidence::new(&topo, &topo.sub_networks()[1]);

        assert_eq!(inc.buses(), &[3, 4]);
        assert_eq!(inc.branches(), &[3]);
        assert_eq!(inc.from_bus(), &[0]);
        assert_eq!(inc.to_bus(), &[1]);
        assert_eq!(inc.branch_names(), &["L4".to_string()]);
        Ok(())
    }

    #[test]
    fn test_incidence_to_dense() -> Result<()> {
        let topo = Topology::new(&cases::triangle())?;
        let inc = Incidence::new(&topo, &topo.sub_networks()[0]);

        let k = inc.to_dense();
        assert_eq!(k.shape(), (3, 3));
        assert_eq!(k.row(0), &[1.0, 0.0, 1.0]);
        assert_eq!(k.row(1), &[-1.0, 1.0, 0.0]);
        assert_eq!(k.row(2), &[0.0, -1.0, -1.0]);
        Ok(())
    }

    #[test]
    fn test_make_b_dc_canonical() -> Result<()> {
        let topo = Topology::new(&cases::triangle())?;
        let inc = Incidence::new(&topo, &topo.sub_networks()[0]);

        let b_bus = make_b_dc(&inc)?;
        assert!(b_bus.has_canonical_format());
        assert_eq!(b_bus.nnz(), 9);
        assert_eq!(b_bus.get(0, 0), 15.0);
        assert_eq!(b_bus.get(1, 1), 20.0);
        assert_eq!(b_bus.get(2, 2), 15.0);
        assert_eq!(b_bus.get(0, 1), -10.0);
        assert_eq!(b_bus.get(2, 0), -5.0);

        // Slack B removed: [[15, -5], [-5, 15]]
        let reduced = b_bus.select(Some(&[0, 2][..]), Some(&[0, 2][..]))?;
        assert_eq!(reduced.to_coo().to_dense(), vec![vec![15.0, -5.0], vec![-5.0, 15.0]]);
        Ok(())
    }

    #[test]
    fn test_make_b_dc_parallel_branches() -> Result<()> {
        let mut net = cases::triangle();
        let mut twin = net.branch[0].clone();
        twin.name = "L1b".to_string();
        net.add_branch(twin);
        let topo = Topology::new(&net)?;
        let inc = Incidence::new(&topo, &topo.sub_networks()[0]);

        let b_bus = make_b_dc(&inc)?;
        assert!(b_bus.has_canonical_format());
        assert_eq!(b_bus.nnz(), 9);
        assert_eq!(b_bus.get(0, 1), -20.0);
        assert_eq!(b_bus.get(0, 0), 25.0);
        Ok(())
    }

    #[test]
    fn test_reduced_norm_1() -> Result<()> {
        let topo = Topology::new(&cases::triangle())?;
        let inc = Incidence::new(&topo, &topo.sub_networks()[0]);

        // Slack B removed: [[15, -5], [-5, 15]]
        let keep = [true, false, true];
        assert_eq!(reduced_norm_1(&inc, &keep), 20.0);
        Ok(())
    }
}
