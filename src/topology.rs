use crate::error::{FlowError, Result};
use crate::network::{Branch, Bus, Carrier, Network};
use petgraph::unionfind::UnionFind;
use std::collections::{HashMap, HashSet};

/// A connected island of the topology with its own angle reference.
#[derive(Clone, Debug, PartialEq)]
pub struct SubNetwork {
    pub index: usize,
    pub carrier: Carrier,
    /// Topology bus indices, ascending.
    pub buses: Vec<usize>,
    /// Topology branch indices, ascending.
    pub branches: Vec<usize>,
    /// Topology index of the slack bus.
    pub slack: usize,
}

impl SubNetwork {
    pub fn nb(&self) -> usize {
        self.buses.len()
    }

    pub fn nl(&self) -> usize {
        self.branches.len()
    }
}

/// Immutable, validated snapshot of a network.
///
/// Buses and in-service branches are stored in arenas addressed by
/// consecutive internal indices. Names are only resolved at the boundary.
/// Any change to the network produces a new `Topology`.
#[derive(Clone, Debug)]
pub struct Topology {
    name: String,
    bus: Vec<Bus>,
    branch: Vec<Branch>,

    bus_e2i: HashMap<String, usize>,
    branch_e2i: HashMap<String, usize>,

    from_bus: Vec<usize>,
    to_bus: Vec<usize>,
    susceptance: Vec<f64>,

    sub_networks: Vec<SubNetwork>,
    bus_sub: Vec<usize>,
    branch_sub: Vec<usize>,
}

impl Topology {
    /// Validates `network` and builds its topology.
    ///
    /// Out-of-service branches are dropped. Fails with `InvalidTopology`
    /// on duplicate names, unknown or identical terminal buses, mixed
    /// carriers and zero or non-finite branch impedance.
    pub fn new(network: &Network) -> Result<Self> {
        let nb = network.bus.len();

        let mut bus_e2i = HashMap::with_capacity(nb);
        for (i, b) in network.bus.iter().enumerate() {
            if bus_e2i.insert(b.name.clone(), i).is_some() {
                return Err(FlowError::invalid_topology(&b.name, "duplicate bus name"));
            }
        }

        let mut names = HashSet::with_capacity(network.branch.len());
        let mut branch = Vec::with_capacity(network.branch.len());
        let mut from_bus = Vec::with_capacity(network.branch.len());
        let mut to_bus = Vec::with_capacity(network.branch.len());
        let mut susceptance = Vec::with_capacity(network.branch.len());

        for br in network.branch.iter() {
            if !names.insert(br.name.as_str()) {
                return Err(FlowError::invalid_topology(&br.name, "duplicate branch name"));
            }
            let f = *bus_e2i.get(&br.bus0).ok_or_else(|| {
                FlowError::invalid_topology(&br.name, format!("unknown bus '{}'", br.bus0))
            })?;
            let t = *bus_e2i.get(&br.bus1).ok_or_else(|| {
                FlowError::invalid_topology(&br.name, format!("unknown bus '{}'", br.bus1))
            })?;
            if f == t {
                return Err(FlowError::invalid_topology(&br.name, "self loop"));
            }
            if !br.is_on() {
                continue;
            }

            let carrier = network.bus[f].carrier;
            if network.bus[t].carrier != carrier {
                return Err(FlowError::invalid_topology(
                    &br.name,
                    "connects buses with different carriers",
                ));
            }
            let z = br.effective_impedance(carrier);
            if z == 0.0 || !z.is_finite() {
                let what = match carrier {
                    Carrier::AC => "reactance",
                    Carrier::DC => "resistance",
                };
                return Err(FlowError::invalid_topology(
                    &br.name,
                    format!("zero or missing {}", what),
                ));
            }

            branch.push(br.clone());
            from_bus.push(f);
            to_bus.push(t);
            susceptance.push(1.0 / z);
        }

        let branch_e2i = branch
            .iter()
            .enumerate()
            .map(|(i, br)| (br.name.clone(), i))
            .collect();

        let (sub_networks, bus_sub, branch_sub) =
            find_sub_networks(&network.bus, &from_bus, &to_bus);

        log::debug!(
            "topology '{}': {} buses, {} branches, {} sub-networks",
            network.name,
            nb,
            branch.len(),
            sub_networks.len()
        );

        Ok(Self {
            name: network.name.clone(),
            bus: network.bus.clone(),
            branch,
            bus_e2i,
            branch_e2i,
            from_bus,
            to_bus,
            susceptance,
            sub_networks,
            bus_sub,
            branch_sub,
        })
    }

    /// Returns a new topology with the given branches taken out of service.
    pub fn without_branches(&self, outages: &[usize]) -> Result<Self> {
        for &l in outages {
            if l >= self.nl() {
                return Err(FlowError::UnknownBranch(format!("#{}", l)));
            }
        }
        let removed: HashSet<usize> = outages.iter().copied().collect();
        let network = Network {
            name: self.name.clone(),
            bus: self.bus.clone(),
            branch: self
                .branch
                .iter()
                .enumerate()
                .filter(|(i, _)| !removed.contains(i))
                .map(|(_, br)| br.clone())
                .collect(),
        };
        Topology::new(&network)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nb(&self) -> usize {
        self.bus.len()
    }

    pub fn nl(&self) -> usize {
        self.branch.len()
    }

    pub fn bus(&self) -> &[Bus] {
        &self.bus
    }

    pub fn branch(&self) -> &[Branch] {
        &self.branch
    }

    pub fn bus_index(&self, name: &str) -> Result<usize> {
        self.bus_e2i
            .get(name)
            .copied()
            .ok_or_else(|| FlowError::UnknownBus(name.to_string()))
    }

    pub fn branch_index(&self, name: &str) -> Result<usize> {
        self.branch_e2i
            .get(name)
            .copied()
            .ok_or_else(|| FlowError::UnknownBranch(name.to_string()))
    }

    /// "From" bus index of each branch.
    pub fn from_bus(&self) -> &[usize] {
        &self.from_bus
    }

    /// "To" bus index of each branch.
    pub fn to_bus(&self) -> &[usize] {
        &self.to_bus
    }

    /// Series susceptance `1 / (x * tap)` of each branch.
    pub fn susceptance(&self) -> &[f64] {
        &self.susceptance
    }

    pub fn sub_networks(&self) -> &[SubNetwork] {
        &self.sub_networks
    }

    pub fn is_connected(&self) -> bool {
        self.sub_networks.len() <= 1
    }

    /// Sub-network index of bus `i`.
    pub fn bus_sub_network(&self, i: usize) -> usize {
        self.bus_sub[i]
    }

    /// Sub-network index of branch `l`.
    pub fn branch_sub_network(&self, l: usize) -> usize {
        self.branch_sub[l]
    }

    /// Thermal ratings in branch order.
    pub fn capacities(&self) -> Vec<f64> {
        self.branch.iter().map(|br| br.s_nom).collect()
    }
}

/// Splits the buses into connected components of the in-service branches.
///
/// Sub-networks are numbered in order of their lowest bus index. The slack
/// of each is its first `Slack` controlled bus, else its first bus.
fn find_sub_networks(
    bus: &[Bus],
    from_bus: &[usize],
    to_bus: &[usize],
) -> (Vec<SubNetwork>, Vec<usize>, Vec<usize>) {
    let nb = bus.len();

    let mut uf = UnionFind::<usize>::new(nb);
    for (&f, &t) in from_bus.iter().zip(to_bus) {
        uf.union(f, t);
    }
    let labels = uf.into_labeling();

    let mut label_sub = HashMap::new();
    let mut sub_networks: Vec<SubNetwork> = Vec::new();
    let mut bus_sub = vec![0; nb];
    for (i, label) in labels.iter().enumerate() {
        let s = *label_sub.entry(*label).or_insert_with(|| {
            sub_networks.push(SubNetwork {
                index: sub_networks.len(),
                carrier: bus[i].carrier,
                buses: Vec::new(),
                branches: Vec::new(),
                slack: i,
            });
            sub_networks.len() - 1
        });
        sub_networks[s].buses.push(i);
        bus_sub[i] = s;
    }

    let branch_sub: Vec<usize> = from_bus.iter().map(|&f| bus_sub[f]).collect();
    for (l, &s) in branch_sub.iter().enumerate() {
        sub_networks[s].branches.push(l);
    }

    for sn in sub_networks.iter_mut() {
        let slacks: Vec<usize> = sn
            .buses
            .iter()
            .copied()
            .filter(|&i| bus[i].is_slack())
            .collect();
        if let Some(&first) = slacks.first() {
            if slacks.len() > 1 {
                log::warn!(
                    "sub-network {} has {} slack buses, using '{}'",
                    sn.index,
                    slacks.len(),
                    bus[first].name
                );
            }
            sn.slack = first;
        }
    }

    (sub_networks, bus_sub, branch_sub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Branch, Bus};
    use crate::tests::cases;

    #[test]
    fn test_triangle_is_connected() -> Result<()> {
        let topo = Topology::new(&cases::triangle())?;
        assert!(topo.is_connected());
        assert_eq!(topo.nb(), 3);
        assert_eq!(topo.nl(), 3);
        assert_eq!(topo.sub_networks()[0].slack, topo.bus_index("B")?);
        assert_eq!(topo.susceptance()[2], 5.0);
        Ok(())
    }

    #[test]
    fn test_islands_are_split() -> Result<()> {
        let topo = Topology::new(&cases::two_islands())?;
        assert_eq!(topo.sub_networks().len(), 2);

        let sn = &topo.sub_networks()[1];
        assert_eq!(sn.buses, vec![3, 4]);
        assert_eq!(sn.branches, vec![3]);
        assert_eq!(sn.slack, 3);
        assert_eq!(topo.bus_sub_network(4), 1);
        assert_eq!(topo.branch_sub_network(3), 1);
        Ok(())
    }

    #[test]
    fn test_isolated_bus_forms_own_sub_network() -> Result<()> {
        let mut net = cases::triangle();
        net.add_bus(Bus::new("D"));
        let topo = Topology::new(&net)?;
        assert_eq!(topo.sub_networks().len(), 2);
        assert!(topo.sub_networks()[1].branches.is_empty());
        Ok(())
    }

    #[test]
    fn test_zero_reactance_is_rejected() {
        let mut net = cases::triangle();
        net.branch[1].x = 0.0;
        match Topology::new(&net) {
            Err(FlowError::InvalidTopology { element, .. }) => assert_eq!(element, "L2"),
            other => panic!("expected invalid topology, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_bus_and_self_loop_are_rejected() {
        let mut net = cases::triangle();
        net.add_branch(Branch::line("L4", "A", "Z", 0.1));
        assert!(matches!(
            Topology::new(&net),
            Err(FlowError::InvalidTopology { .. })
        ));

        let mut net = cases::triangle();
        net.add_branch(Branch::line("L4", "A", "A", 0.1));
        assert!(matches!(
            Topology::new(&net),
            Err(FlowError::InvalidTopology { .. })
        ));
    }

    #[test]
    fn test_out_of_service_branch_is_dropped() -> Result<()> {
        let mut net = cases::triangle();
        net.branch[0] = net.branch[0].clone().out_of_service();
        net.branch[0].x = 0.0; // ignored when out of service
        let topo = Topology::new(&net)?;
        assert_eq!(topo.nl(), 2);
        assert!(topo.branch_index("L1").is_err());
        assert_eq!(topo.branch_index("L3")?, 1);
        Ok(())
    }

    #[test]
    fn test_without_branches_returns_new_topology() -> Result<()> {
        let topo = Topology::new(&cases::bridged())?;
        let bridge = topo.branch_index("L4")?;
        let split = topo.without_branches(&[bridge])?;

        assert_eq!(topo.sub_networks().len(), 1);
        assert_eq!(split.sub_networks().len(), 2);
        assert_eq!(split.nl(), topo.nl() - 1);
        Ok(())
    }

    #[test]
    fn test_dc_branch_uses_resistance() -> Result<()> {
        let mut net = Network::new("dc");
        net.add_bus(Bus::new("P").dc()).add_bus(Bus::new("Q").dc());
        net.add_branch(Branch::line("D1", "P", "Q", 0.0).with_resistance(0.5));
        let topo = Topology::new(&net)?;
        assert_eq!(topo.susceptance(), &[2.0]);
        assert_eq!(topo.sub_networks()[0].carrier, Carrier::DC);
        Ok(())
    }
}
