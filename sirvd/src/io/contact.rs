use anyhow::Context;

/// Load a square transmission matrix from CSV.
///
/// Numeric cells are read row by row; header rows and label columns (any
/// non-numeric cell) are skipped, so both a bare matrix and one with group
/// names along the top and left edge are accepted. Row `g`, column `h` is the
/// intensity of group `h`'s infectious fraction on group `g`'s susceptibles.
pub fn load_transmission_matrix_csv(path: impl AsRef<std::path::Path>) -> anyhow::Result<Vec<Vec<f64>>> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open transmission CSV: {}", path.display()))?;

    let mut matrix: Vec<Vec<f64>> = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("bad CSV record at line {}", line + 1))?;
        let row_vals: Vec<f64> = record
            .iter()
            .filter_map(|field| field.trim().parse::<f64>().ok())
            .collect();
        if !row_vals.is_empty() {
            matrix.push(row_vals);
        }
    }

    let n = matrix.len();
    anyhow::ensure!(n > 0, "transmission matrix empty or unparsable");
    anyhow::ensure!(
        matrix.iter().all(|r| r.len() == n),
        "transmission matrix must be square (n x n)"
    );
    Ok(matrix)
}
