//! One-shot export of a pipeline run to a directory of `<unit>.xml` files

use futures::StreamExt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::pipeline::{PipelineRun, RunReport};

/// Files written by [`DocumentExporter::export`] plus the run's final report
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub files: Vec<PathBuf>,
    pub report: RunReport,
}

#[derive(Debug, Clone)]
pub struct DocumentExporter {
    output_dir: PathBuf,
}

impl DocumentExporter {
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn ensure_output_dir(&self) -> Result<(), std::io::Error> {
        if !self.output_dir.exists() {
            fs::create_dir_all(&self.output_dir).await?;
        }
        Ok(())
    }

    /// Drain `run`, writing each document as it arrives
    pub async fn export(&self, mut run: PipelineRun) -> Result<ExportSummary, std::io::Error> {
        self.ensure_output_dir().await?;

        let mut taken = HashSet::new();
        let mut files = Vec::new();

        while let Some(document) = run.next().await {
            let file_name = unique_file_name(&document.unit_name, &mut taken);
            let path = self.output_dir.join(&file_name);
            fs::write(&path, document.content.as_bytes()).await?;
            debug!(
                "Wrote unit '{}' to {} ({} bytes)",
                document.unit_name,
                path.display(),
                document.content.len()
            );
            files.push(path);
        }

        let report = run.report();
        info!(
            "Exported {} documents to {}",
            files.len(),
            self.output_dir.display()
        );
        Ok(ExportSummary { files, report })
    }
}

/// Reduce a unit name to a safe file stem: ASCII alphanumerics, `-`, `_`
/// and `.` survive, everything else becomes `_`
pub fn sanitize_file_stem(unit_name: &str) -> String {
    let stem: String = unit_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let stem = stem.trim_matches('.');
    if stem.is_empty() {
        "unit".to_string()
    } else {
        stem.to_string()
    }
}

fn unique_file_name(unit_name: &str, taken: &mut HashSet<String>) -> String {
    let stem = sanitize_file_stem(unit_name);
    let mut candidate = format!("{stem}.xml");
    let mut suffix = 2;
    while !taken.insert(candidate.to_lowercase()) {
        candidate = format!("{stem}-{suffix}.xml");
        suffix += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_plain_names() {
        assert_eq!(sanitize_file_stem("Growth"), "Growth");
        assert_eq!(sanitize_file_stem("q3-income_v2"), "q3-income_v2");
    }

    #[test]
    fn test_sanitize_strips_path_components() {
        assert_eq!(sanitize_file_stem("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_stem("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_file_stem(".."), "unit");
        assert_eq!(sanitize_file_stem(""), "unit");
    }

    #[test]
    fn test_colliding_names_get_suffixes() {
        let mut taken = HashSet::new();
        assert_eq!(unique_file_name("a/b", &mut taken), "a_b.xml");
        assert_eq!(unique_file_name("a:b", &mut taken), "a_b-2.xml");
        assert_eq!(unique_file_name("A_B", &mut taken), "A_B-3.xml");
    }
}
