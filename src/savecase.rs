use crate::contingency::ContingencyTable;
use crate::debug::format_f64;
use crate::dense::Mat;
use crate::lpf::BaseFlows;
use crate::security::SecurityConstraints;
use anyhow::{format_err, Context, Result};
use std::io::Write;

/// Writes a labelled matrix with `row_labels` in the first column.
pub fn save_matrix<W: Write>(
    w: W,
    corner: &str,
    row_labels: &[String],
    col_labels: &[String],
    mat: &Mat<f64>,
) -> Result<()> {
    if row_labels.len() != mat.rows() || col_labels.len() != mat.cols() {
        return Err(format_err!(
            "labels ({} x {}) do not match matrix ({} x {})",
            row_labels.len(),
            col_labels.len(),
            mat.rows(),
            mat.cols()
        ));
    }
    let mut wtr = csv::Writer::from_writer(w);

    let mut header = vec![corner.to_string()];
    header.extend(col_labels.iter().cloned());
    wtr.write_record(&header).context("writing CSV header")?;

    for (r, label) in row_labels.iter().enumerate() {
        let mut record = vec![label.clone()];
        record.extend(mat.row(r).iter().map(|&v| format_f64(v)));
        wtr.write_record(&record).context("writing CSV record")?;
    }
    wtr.flush().context("flushing CSV writer")?;
    Ok(())
}

/// Writes flows with one row per snapshot and one column per branch.
pub fn save_flows<W: Write>(w: W, flows: &BaseFlows, branch_names: &[String]) -> Result<()> {
    save_matrix(w, "snapshot", flows.snapshots(), branch_names, flows.flows())
}

/// Writes a contingency table with one row per (snapshot, outage).
///
/// The base case is written with outage `base`. Outages that could not
/// be evaluated are left out.
pub fn save_contingency<W: Write>(
    w: W,
    table: &ContingencyTable,
    branch_names: &[String],
) -> Result<()> {
    if branch_names.len() != table.base().cols() {
        return Err(format_err!(
            "{} branch names for {} branches",
            branch_names.len(),
            table.base().cols()
        ));
    }
    let mut wtr = csv::Writer::from_writer(w);

    let mut header = vec!["snapshot".to_string(), "outage".to_string()];
    header.extend(branch_names.iter().cloned());
    wtr.write_record(&header).context("writing CSV header")?;

    for (s, snapshot) in table.snapshots().iter().enumerate() {
        let mut record = vec![snapshot.clone(), "base".to_string()];
        record.extend(table.base().row(s).iter().map(|&v| format_f64(v)));
        wtr.write_record(&record).context("writing CSV record")?;

        for outage in table.outages() {
            if let Ok(flows) = &outage.flows {
                let mut record = vec![snapshot.clone(), outage.name.clone()];
                record.extend(flows.row(s).iter().map(|&v| format_f64(v)));
                wtr.write_record(&record).context("writing CSV record")?;
            }
        }
    }
    wtr.flush().context("flushing CSV writer")?;
    Ok(())
}

/// Writes security constraints as `name,sense,rhs,lhs` with the
/// left-hand side in readable form, e.g. `1*L3[now] + 1*L1[now]`.
pub fn save_constraints<W: Write>(
    w: W,
    constraints: &SecurityConstraints,
    branch_names: &[String],
    snapshots: &[String],
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(w);
    wtr.write_record(["name", "sense", "rhs", "lhs"])
        .context("writing CSV header")?;

    for c in constraints.constraints.iter() {
        let lhs = c
            .terms
            .iter()
            .map(|(var, coef)| {
                let branch = branch_names.get(var.branch).ok_or_else(|| {
                    format_err!("{}: no name for branch #{}", c.name, var.branch)
                })?;
                let snapshot = snapshots.get(var.snapshot).ok_or_else(|| {
                    format_err!("{}: no name for snapshot #{}", c.name, var.snapshot)
                })?;
                Ok(format!("{}*{}[{}]", format_f64(*coef), branch, snapshot))
            })
            .collect::<Result<Vec<String>>>()?
            .join(" + ");

        wtr.write_record([
            c.name.clone(),
            c.sense.to_string(),
            format_f64(c.rhs),
            lhs,
        ])
        .context("writing CSV record")?;
    }
    wtr.flush().context("flushing CSV writer")?;
    Ok(())
}
