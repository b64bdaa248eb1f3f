use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, warn};

use crate::orchestrator::CaseRecord;

/// Outcome of a catalog export. Unreadable records are skipped and counted,
/// never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportReport {
    pub exported: usize,
    pub skipped: usize,
}

/// Persist one finished case as pretty-printed JSON, filename = case id.
pub fn write_case_record(dir: &Path, record: &CaseRecord) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create case directory {}", dir.display()))?;

    let path = dir.join(format!("{}.json", record.file_stem()));
    let data = serde_json::to_string_pretty(record)?;
    fs::write(&path, data)
        .with_context(|| format!("Failed to write case record {}", path.display()))?;

    Ok(path)
}

/// Export every case record in `cases_dir` to a static catalog under
/// `out_dir`: one JSON file per case plus an `index.json` listing all records
/// and their total count. Items are ordered by case filename stem so the
/// catalog is stable across runs.
pub fn export_catalog(cases_dir: &Path, out_dir: &Path) -> anyhow::Result<ExportReport> {
    anyhow::ensure!(
        cases_dir.is_dir(),
        "case directory {} not found",
        cases_dir.display()
    );
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;

    let mut records: Vec<(String, CaseRecord)> = Vec::new();
    let mut skipped = 0usize;

    for entry in fs::read_dir(cases_dir)
        .with_context(|| format!("Failed to read case directory {}", cases_dir.display()))?
    {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let stem = match path.file_stem().and_then(|stem| stem.to_str()) {
            Some(stem) => stem.to_string(),
            None => {
                skipped += 1;
                continue;
            }
        };

        match read_record(&path) {
            Ok(record) => records.push((stem, record)),
            Err(err) => {
                warn!(path = %path.display(), %err, "skipping unreadable case record");
                skipped += 1;
            }
        }
    }

    records.sort_by(|a, b| a.0.cmp(&b.0));

    for (stem, record) in &records {
        let out_path = out_dir.join(format!("{stem}.json"));
        fs::write(&out_path, serde_json::to_string_pretty(record)?)
            .with_context(|| format!("Failed to write {}", out_path.display()))?;
    }

    let index = serde_json::json!({
        "items": records.iter().map(|(_, record)| record).collect::<Vec<_>>(),
        "total": records.len(),
    });
    let index_path = out_dir.join("index.json");
    fs::write(&index_path, serde_json::to_string_pretty(&index)?)
        .with_context(|| format!("Failed to write {}", index_path.display()))?;

    info!(
        exported = records.len(),
        skipped,
        out = %out_dir.display(),
        "catalog export complete"
    );

    Ok(ExportReport {
        exported: records.len(),
        skipped,
    })
}

fn read_record(path: &Path) -> anyhow::Result<CaseRecord> {
    let data = fs::read_to_string(path)?;
    let record = serde_json::from_str(&data)?;
    Ok(record)
}
