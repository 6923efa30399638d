//! Timeline definition loading.
//!
//! Definitions are loaded from TOML files in a watched directory, one
//! timeline per file. A file that fails to parse is skipped with a logged
//! error so one bad edit never takes down the rest of the set.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::compile::{DefinitionError, compile_timeline};
use super::timeline::TimelineDefinition;
use crate::script::ScriptHost;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },
}

/// Outcome summary of a directory load.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Zones successfully loaded, in file order.
    pub loaded: Vec<String>,
    /// Zones that appeared in more than one file (first file wins).
    pub duplicates: Vec<String>,
    /// Files that failed to read or parse.
    pub failed_files: Vec<(PathBuf, String)>,
    /// Per-node compilation errors (bad regex/script); the owning nodes are
    /// disabled, the timelines stay loaded.
    pub node_errors: Vec<DefinitionError>,
}

/// Load and compile a single timeline file.
pub fn load_file(path: &Path, scripts: &ScriptHost) -> Result<TimelineDefinition, StoreError> {
    let contents = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut def: TimelineDefinition =
        toml::from_str(&contents).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
    def.source_path = Some(path.to_path_buf());

    let errors = compile_timeline(&mut def, scripts);
    if !errors.is_empty() {
        tracing::warn!(
            path = %path.display(),
            count = errors.len(),
            "timeline loaded with disabled nodes"
        );
    }
    Ok(def)
}

/// Load every `.toml` timeline in a directory.
///
/// Unparseable files are recorded in the report and skipped; duplicate zone
/// names keep the first file and record the rest.
pub fn load_directory(
    dir: &Path,
    scripts: &ScriptHost,
) -> Result<(Vec<TimelineDefinition>, LoadReport), StoreError> {
    let entries = fs::read_dir(dir).map_err(|source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    let mut report = LoadReport::default();
    let mut timelines: Vec<TimelineDefinition> = Vec::new();

    for path in paths {
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to read timeline file");
                report.failed_files.push((path, e.to_string()));
                continue;
            }
        };

        let mut def: TimelineDefinition = match toml::from_str(&contents) {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to parse timeline file");
                report.failed_files.push((path, e.to_string()));
                continue;
            }
        };
        def.source_path = Some(path.clone());

        if timelines.iter().any(|t| t.zone == def.zone) {
            tracing::warn!(zone = %def.zone, path = %path.display(), "duplicate timeline zone, keeping first");
            report.duplicates.push(def.zone.clone());
            continue;
        }

        report.node_errors.extend(compile_timeline(&mut def, scripts));
        report.loaded.push(def.zone.clone());
        timelines.push(def);
    }

    tracing::info!(
        count = report.loaded.len(),
        failed = report.failed_files.len(),
        "loaded timeline directory"
    );
    Ok((timelines, report))
}
