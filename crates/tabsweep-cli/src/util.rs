use anyhow::Result;
use std::path::Path;

/// Check that `path` names an existing `.csv` file.
pub fn validate_csv_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();

    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    if ext.as_deref() != Some("csv") {
        anyhow::bail!("File must have a .csv extension: {}", path.display());
    }

    if !path.exists() {
        anyhow::bail!("File does not exist: {}", path.display());
    }

    Ok(())
}

/// Path of the HTML summary written next to a results CSV.
pub fn report_path<P: AsRef<Path>>(output: P) -> std::path::PathBuf {
    output.as_ref().with_extension("html")
}
