use crate::dense::Mat;
use crate::lpf::Injections;
use crate::network::{Branch, BranchKind, Bus, Carrier, Control, Network};
use anyhow::{format_err, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// A network with optional per-snapshot bus injections.
#[derive(Clone, Debug)]
pub struct Case {
    pub network: Network,
    pub injections: Option<Injections>,
}

#[derive(Debug, Deserialize)]
struct BusRecord {
    name: String,
    v_nom: Option<f64>,
    carrier: Option<Carrier>,
    control: Option<Control>,
}

#[derive(Debug, Deserialize)]
struct BranchRecord {
    name: String,
    bus0: String,
    bus1: String,
    x: Option<f64>,
    r: Option<f64>,
    s_nom: Option<f64>,
    tap_ratio: Option<f64>,
    in_service: Option<bool>,
}

impl BranchRecord {
    fn into_branch(self, kind: BranchKind) -> Branch {
        Branch {
            name: self.name,
            kind,
            bus0: self.bus0,
            bus1: self.bus1,
            x: self.x.unwrap_or(0.0),
            r: self.r.unwrap_or(0.0),
            s_nom: match self.s_nom {
                Some(s_nom) if s_nom > 0.0 => s_nom,
                _ => f64::INFINITY,
            },
            tap_ratio: self.tap_ratio.unwrap_or(1.0),
            in_service: self.in_service.unwrap_or(true),
        }
    }
}

/// Reads a case folder.
///
/// The folder holds `buses.csv` and `lines.csv`, and optionally
/// `transformers.csv` and `buses-p_set.csv`. The last one has a
/// `snapshot` column followed by one column of active power injections
/// per bus name. Buses without a column inject nothing.
pub fn load_case(case_dir: &Path) -> Result<Case> {
    if !case_dir.is_dir() {
        return Err(format_err!("case folder {} does not exist", case_dir.display()));
    }
    let name = case_dir
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut network = Network::new(name);

    for record in read_records::<BusRecord>(&case_dir.join("buses.csv"))? {
        network.add_bus(Bus {
            name: record.name,
            v_nom: record.v_nom.unwrap_or(1.0),
            carrier: record.carrier.unwrap_or_default(),
            control: record.control.unwrap_or_default(),
        });
    }
    for record in read_records::<BranchRecord>(&case_dir.join("lines.csv"))? {
        network.add_branch(record.into_branch(BranchKind::Line));
    }
    let transformers = case_dir.join("transformers.csv");
    if transformers.exists() {
        for record in read_records::<BranchRecord>(&transformers)? {
            network.add_branch(record.into_branch(BranchKind::Transformer));
        }
    }

    let p_set = case_dir.join("buses-p_set.csv");
    let injections = if p_set.exists() {
        Some(load_injections(&p_set, &network)?)
    } else {
        None
    };

    log::info!(
        "loaded case '{}': {} buses, {} branches",
        network.name,
        network.bus.len(),
        network.branch.len()
    );

    Ok(Case {
        network,
        injections,
    })
}

fn read_records<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut records = Vec::new();
    for result in reader.deserialize() {
        let record: T = result.with_context(|| format!("parsing record in {}", path.display()))?;
        records.push(record);
    }
    Ok(records)
}

/// Reads per-snapshot injections with one column per bus name.
pub fn load_injections(path: &Path, network: &Network) -> Result<Injections> {
    let bus_index: HashMap<&str, usize> = network
        .bus
        .iter()
        .enumerate()
        .map(|(i, b)| (b.name.as_str(), i))
        .collect();

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let columns: Vec<usize> = reader
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .iter()
        .skip(1)
        .map(|name| {
            bus_index
                .get(name)
                .copied()
                .ok_or_else(|| format_err!("{}: unknown bus '{}'", path.display(), name))
        })
        .collect::<Result<_>>()?;

    let nb = network.bus.len();
    let mut snapshots = Vec::new();
    let mut values = Vec::new();
    for result in reader.records() {
        let record = result.with_context(|| format!("reading {}", path.display()))?;
        let snapshot = record
            .get(0)
            .ok_or_else(|| format_err!("{}: missing snapshot column", path.display()))?;

        let mut p = vec![0.0; nb];
        for (k, &i) in columns.iter().enumerate() {
            let field = record.get(k + 1).unwrap_or("");
            if field.is_empty() {
                continue;
            }
            p[i] = field.parse().with_context(|| {
                format!("{}: snapshot {}: bus '{}'", path.display(), snapshot, network.bus[i].name)
            })?;
        }
        snapshots.push(snapshot.to_string());
        values.extend(p);
    }

    let values = Mat::from_rows(snapshots.len(), nb, values).map_err(anyhow::Error::msg)?;
    Ok(Injections::new(snapshots, values)?)
}
