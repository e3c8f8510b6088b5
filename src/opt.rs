use derive_builder::Builder;

/// Options for building and applying distribution factors.
///
/// ```
/// use flowfactors::FactorOptBuilder;
///
/// let opt = FactorOptBuilder::default()
///     .strict(true)
///     .build()
///     .unwrap();
/// assert!(opt.strict);
/// assert_eq!(opt.bridge_tolerance, 1e-9);
/// ```
#[derive(Clone, Debug, PartialEq, Builder)]
#[builder(default)]
pub struct FactorOpt {
    /// Minimum tolerance on `|1 - BPTDF[c,c]|` for declaring that the outage
    /// of branch `c` disconnects its sub-network. Widened to `cond * eps`
    /// for poorly conditioned networks. Default value is 1e-9.
    pub bridge_tolerance: f64,

    /// Condition number of the reduced susceptance matrix above which a
    /// numerical warning is raised. Default value is 1e12.
    pub condition_limit: f64,

    /// Turn numerical warnings into errors.
    pub strict: bool,

    /// Evaluate sub-networks and outages on the rayon thread pool.
    pub parallel: bool,
}

impl Default for FactorOpt {
    fn default() -> Self {
        Self {
            bridge_tolerance: 1e-9,
            condition_limit: 1e12,
            strict: false,
            parallel: true,
        }
    }
}
