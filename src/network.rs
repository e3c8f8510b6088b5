use serde::{Deserialize, Serialize};

/// Network is the editable description of a power system as a graph of
/// buses joined by passive branches. It is validated and frozen into a
/// [`Topology`](crate::Topology) before any factors are computed.
#[derive(Clone, Debug, Default)]
pub struct Network {
    /// Optional case name.
    pub name: String,

    /// Power system nodes.
    pub bus: Vec<Bus>,

    /// Transmission lines/cables and transformers.
    pub branch: Vec<Branch>,
}

impl Network {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_bus(&mut self, bus: Bus) -> &mut Self {
        self.bus.push(bus);
        self
    }

    pub fn add_branch(&mut self, branch: Branch) -> &mut Self {
        self.branch.push(branch);
        self
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone, Default, Serialize, Deserialize)]
pub enum Carrier {
    #[default]
    AC,
    DC,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, Default, Serialize, Deserialize)]
pub enum Control {
    /// Fixed active power injection.
    #[default]
    PQ,
    /// Fixed active power and voltage magnitude.
    PV,
    /// Angle reference. Absorbs the power imbalance of its sub-network.
    Slack,
}

/// Bus is a node in the power system graph structure.
#[derive(Clone, Debug, PartialEq)]
pub struct Bus {
    /// Unique bus name.
    pub name: String,

    /// Nominal voltage (kV).
    pub v_nom: f64,

    pub carrier: Carrier,

    pub control: Control,
}

impl Bus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            v_nom: 1.0,
            carrier: Carrier::AC,
            control: Control::PQ,
        }
    }

    pub fn slack(mut self) -> Self {
        self.control = Control::Slack;
        self
    }

    pub fn dc(mut self) -> Self {
        self.carrier = Carrier::DC;
        self
    }

    pub fn is_slack(&self) -> bool {
        self.control == Control::Slack
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, Default, Serialize, Deserialize)]
pub enum BranchKind {
    #[default]
    Line,
    Transformer,
}

/// Branch is a passive line or transformer between two buses.
#[derive(Clone, Debug, PartialEq)]
pub struct Branch {
    /// Unique branch name.
    pub name: String,

    pub kind: BranchKind,

    /// "From" bus name.
    pub bus0: String,

    /// "To" bus name.
    pub bus1: String,

    /// Series reactance (p.u.).
    pub x: f64,

    /// Series resistance (p.u.). Used instead of `x` between DC buses.
    pub r: f64,

    /// Nominal thermal rating (MVA). Infinite means unmonitored.
    pub s_nom: f64,

    /// Off-nominal turns ratio. Zero means 1.
    pub tap_ratio: f64,

    pub in_service: bool,
}

impl Branch {
    pub fn line(
        name: impl Into<String>,
        bus0: impl Into<String>,
        bus1: impl Into<String>,
        x: f64,
    ) -> Self {
        Self {
            name: name.into(),
            kind: BranchKind::Line,
            bus0: bus0.into(),
            bus1: bus1.into(),
            x,
            r: 0.0,
            s_nom: f64::INFINITY,
            tap_ratio: 1.0,
            in_service: true,
        }
    }

    pub fn transformer(
        name: impl Into<String>,
        bus0: impl Into<String>,
        bus1: impl Into<String>,
        x: f64,
        tap_ratio: f64,
    ) -> Self {
        Self {
            kind: BranchKind::Transformer,
            tap_ratio,
            ..Self::line(name, bus0, bus1, x)
        }
    }

    pub fn with_rating(mut self, s_nom: f64) -> Self {
        self.s_nom = s_nom;
        self
    }

    pub fn with_resistance(mut self, r: f64) -> Self {
        self.r = r;
        self
    }

    pub fn out_of_service(mut self) -> Self {
        self.in_service = false;
        self
    }

    pub fn is_on(&self) -> bool {
        self.in_service
    }

    /// Effective series impedance seen by the linear flow model.
    pub(crate) fn effective_impedance(&self, carrier: Carrier) -> f64 {
        let z = match carrier {
            Carrier::AC => self.x,
            Carrier::DC => self.r,
        };
        let tap = if self.tap_ratio == 0.0 { 1.0 } else { self.tap_ratio }; // default tap ratio = 1
        z * tap
    }
}
