use anyhow::{format_err, Result};
use clap::{Args, Parser, Subcommand};
use flowfactors::{
    contingency_flows, load_case, lpf, save_constraints, save_contingency, save_flows,
    save_matrix, security_constraints, Case, FactorOpt, Factors, Mat, Slack, Topology,
};
use spsolve::rlu::RLU;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Linear power flow distribution factors and contingency analysis.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Power Transfer Distribution Factors
    #[clap(name = "ptdf")]
    PTDF(CaseArgs),

    /// Branch Outage Distribution Factors
    #[clap(name = "bodf")]
    BODF(CaseArgs),

    /// Linear (DC) Power Flow
    #[clap(name = "lpf")]
    LPF(CaseArgs),

    /// Post-outage branch flows (N-1)
    Contingency(OutageArgs),

    /// Security constraints for the monitored outages
    Security(OutageArgs),
}

#[derive(Args)]
struct CaseArgs {
    /// The case folder
    #[arg(required = true)]
    input: PathBuf,

    /// Output file. Written to stdout if omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Slack bus name. Sub-networks without it, or all of them if
    /// omitted, use their own slack.
    #[arg(long)]
    pub slack: Option<String>,

    /// Minimum tolerance for detecting disconnecting outages.
    #[arg(long)]
    pub bridge_tol: Option<f64>,

    /// Condition number limit for numerical warnings.
    #[arg(long)]
    pub cond_limit: Option<f64>,

    /// Treat numerical warnings as errors.
    #[arg(long, default_value_t = false)]
    pub strict: bool,

    /// Do not use the thread pool.
    #[arg(long, default_value_t = false)]
    pub serial: bool,
}

#[derive(Args)]
struct OutageArgs {
    #[command(flatten)]
    case: CaseArgs,

    /// Branches to take out, one at a time. Defaults to all branches.
    #[arg(long, value_delimiter = ',')]
    outages: Vec<String>,
}

fn main() {
    env_logger::Builder::from_default_env()
        .format_level(false)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    match execute(&cli) {
        Ok(_) => {
            std::process::exit(0);
        }
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(2);
        }
    }
}

fn execute(cli: &Cli) -> Result<()> {
    let args = match &cli.command {
        Commands::PTDF(args) => args,
        Commands::BODF(args) => args,
        Commands::LPF(args) => args,
        Commands::Contingency(args) => &args.case,
        Commands::Security(args) => &args.case,
    };

    let Case {
        network,
        injections,
    } = load_case(&args.input)?;
    let topology = Arc::new(Topology::new(&network)?);

    let mut opt = FactorOpt::default();
    if let Some(tol) = args.bridge_tol {
        opt.bridge_tolerance = tol;
    }
    if let Some(limit) = args.cond_limit {
        opt.condition_limit = limit;
    }
    opt.strict = args.strict;
    opt.parallel = !args.serial;

    let slack = match &args.slack {
        Some(name) => Slack::Single(topology.bus_index(name)?),
        None => Slack::Default,
    };

    let solver = RLU::default();
    let factors = Factors::build(topology.clone(), &slack, &opt, &solver);
    for warning in factors.warnings() {
        eprintln!("warning: {}", warning);
    }

    let bus_names: Vec<String> = topology.bus().iter().map(|b| b.name.clone()).collect();
    let branch_names: Vec<String> = topology.branch().iter().map(|br| br.name.clone()).collect();

    let out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(std::io::stdout()),
    };

    match &cli.command {
        Commands::PTDF(_) => {
            let mut mat = Mat::zeros(topology.nl(), topology.nb());
            for sn in topology.sub_networks() {
                let ptdf = factors.ptdf(sn.index)?;
                for (l, &br) in ptdf.branches().iter().enumerate() {
                    for (i, &bus) in ptdf.buses().iter().enumerate() {
                        mat.set(br, bus, ptdf.values().get(l, i));
                    }
                }
            }
            save_matrix(out, "branch", &branch_names, &bus_names, &mat)?;
        }
        Commands::BODF(_) => {
            let mut mat = Mat::zeros(topology.nl(), topology.nl());
            for sn in topology.sub_networks() {
                let bodf = factors.bodf(sn.index)?;
                for (c, &col) in bodf.branches().iter().enumerate() {
                    let disconnecting = bodf.is_disconnecting(col)?;
                    if disconnecting {
                        log::warn!("outage of '{}' disconnects the network", branch_names[col]);
                    }
                    for (b, &row) in bodf.branches().iter().enumerate() {
                        let v = if disconnecting && b != c {
                            f64::NAN
                        } else {
                            bodf.values().get(b, c)
                        };
                        mat.set(row, col, v);
                    }
                }
            }
            save_matrix(out, "branch", &branch_names, &branch_names, &mat)?;
        }
        Commands::LPF(_) => {
            let injections = injections.ok_or_else(|| format_err!("case has no injections"))?;
            let result = lpf(&factors, &injections)?;
            save_flows(out, &result.flows, &branch_names)?;
        }
        Commands::Contingency(args) => {
            let injections = injections.ok_or_else(|| format_err!("case has no injections"))?;
            let outages = outage_indices(&topology, &args.outages)?;
            let base = lpf(&factors, &injections)?.flows;

            let table = contingency_flows(&base, &factors, &outages, &opt)?;
            for (name, err) in table.failures() {
                eprintln!("warning: outage '{}': {}", name, err);
            }
            save_contingency(out, &table, &branch_names)?;
        }
        Commands::Security(args) => {
            let snapshots = match &injections {
                Some(injections) => injections.snapshots().to_vec(),
                None => vec!["now".to_string()],
            };
            let outages = outage_indices(&topology, &args.outages)?;

            let sc = security_constraints(&factors, &outages, &topology.capacities(), &snapshots)?;
            for (c, err) in sc.failures.iter() {
                eprintln!("warning: outage '{}': {}", branch_names[*c], err);
            }
            save_constraints(out, &sc, &branch_names, &snapshots)?;
        }
    }

    Ok(())
}

fn outage_indices(topology: &Topology, names: &[String]) -> Result<Vec<usize>> {
    if names.is_empty() {
        return Ok((0..topology.nl()).collect());
    }
    let outages = names
        .iter()
        .map(|name| topology.branch_index(name))
        .collect::<flowfactors::Result<Vec<usize>>>()?;
    Ok(outages)
}
