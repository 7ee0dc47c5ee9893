//! Sample sinks attached to chains.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use csv::{Writer, WriterBuilder};
use tempo_core::{ErrorInfo, Model, NodeId, TempoError};

use crate::moves::Heats;

/// Snapshot of a chain handed to monitors after a cycle.
#[derive(Debug)]
pub struct ChainState<'a, M: Model> {
    /// Model of the chain, read-only.
    pub model: &'a M,
    /// Current generation.
    pub generation: u64,
    /// Unheated joint log probability.
    pub ln_posterior: f64,
    /// Log likelihood (clamped nodes).
    pub ln_likelihood: f64,
    /// Log prior (unclamped nodes).
    pub ln_prior: f64,
    /// Heats the chain samples under.
    pub heats: Heats,
    /// Index of the chain within its sampler.
    pub chain_index: usize,
}

/// Sink receiving chain samples.
pub trait Monitor<M: Model>: Send {
    /// Nodes printed by the monitor.
    fn nodes(&self) -> Vec<NodeId>;

    /// Opens the output, truncating it unless `append` is set.
    fn open_stream(&mut self, append: bool) -> Result<(), TempoError>;

    /// Writes the column header.
    fn print_header(&mut self, model: &M) -> Result<(), TempoError>;

    /// Records the chain state when due.
    fn monitor(&mut self, state: &ChainState<'_, M>) -> Result<(), TempoError>;

    /// Flushes and closes the output.
    fn close_stream(&mut self) -> Result<(), TempoError>;

    /// Derives the output path of a replicate or stone from the base path.
    fn add_file_extension(&mut self, extension: &str, directory: bool);

    /// Clones the monitor behind a box; open streams are not shared.
    fn box_clone(&self) -> Box<dyn Monitor<M>>;
}

impl<M: Model> Clone for Box<dyn Monitor<M>> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Inserts `extension` into `path`.
///
/// With `directory` the extension becomes a sub-directory holding the file,
/// otherwise it is appended to the file stem ahead of the file extension:
/// `out/run.log` with `_stone_2` yields `out/run_stone_2.log`, or
/// `out/_stone_2/run.log` as a directory.
pub fn with_file_extension(path: &Path, extension: &str, directory: bool) -> PathBuf {
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    if directory {
        return parent.join(extension).join(file_name);
    }
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => parent.join(format!("{stem}{extension}.{}", ext.to_string_lossy())),
        None => parent.join(format!("{stem}{extension}")),
    }
}

/// Tab-delimited trace of the joint probabilities and node values.
#[derive(Debug)]
pub struct TraceMonitor {
    path: PathBuf,
    nodes: Vec<NodeId>,
    interval: u64,
    writer: Option<Writer<File>>,
}

impl Clone for TraceMonitor {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            nodes: self.nodes.clone(),
            interval: self.interval,
            writer: None,
        }
    }
}

impl TraceMonitor {
    /// Creates a monitor printing `nodes` every `interval` generations.
    pub fn new(path: impl Into<PathBuf>, nodes: Vec<NodeId>, interval: u64) -> Self {
        Self {
            path: path.into(),
            nodes,
            interval: interval.max(1),
            writer: None,
        }
    }

    /// Output file of the monitor.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_record(&mut self, columns: &[String]) -> Result<(), TempoError> {
        let path = self.path.clone();
        let writer = self.writer.as_mut().ok_or_else(|| {
            TempoError::Io(
                ErrorInfo::new("stream-closed", "monitor stream is not open")
                    .with_context("path", path.display().to_string()),
            )
        })?;
        writer.write_record(columns).map_err(|err| {
            TempoError::Io(
                ErrorInfo::new("monitor-write", "failed to write trace row")
                    .with_context("path", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;
        writer
            .flush()
            .map_err(|err| TempoError::io("monitor-write", err, &path))
    }
}

impl<M: Model> Monitor<M> for TraceMonitor {
    fn nodes(&self) -> Vec<NodeId> {
        self.nodes.clone()
    }

    fn open_stream(&mut self, append: bool) -> Result<(), TempoError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|err| TempoError::io("monitor-open", err, parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&self.path)
            .map_err(|err| TempoError::io("monitor-open", err, &self.path))?;
        self.writer = Some(
            WriterBuilder::new()
                .delimiter(b'\t')
                .has_headers(false)
                .from_writer(file),
        );
        Ok(())
    }

    fn print_header(&mut self, model: &M) -> Result<(), TempoError> {
        let mut columns = vec![
            "Iteration".to_string(),
            "Posterior".to_string(),
            "Likelihood".to_string(),
            "Prior".to_string(),
        ];
        columns.extend(self.nodes.iter().map(|&id| model.name(id).to_string()));
        self.write_record(&columns)
    }

    fn monitor(&mut self, state: &ChainState<'_, M>) -> Result<(), TempoError> {
        if state.generation % self.interval != 0 {
            return Ok(());
        }
        let mut columns = vec![
            state.generation.to_string(),
            state.ln_posterior.to_string(),
            state.ln_likelihood.to_string(),
            state.ln_prior.to_string(),
        ];
        columns.extend(self.nodes.iter().map(|&id| state.model.value_string(id)));
        self.write_record(&columns)
    }

    fn close_stream(&mut self) -> Result<(), TempoError> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|err| TempoError::io("monitor-close", err, &self.path))?;
        }
        Ok(())
    }

    fn add_file_extension(&mut self, extension: &str, directory: bool) {
        self.path = with_file_extension(&self.path, extension, directory);
    }

    fn box_clone(&self) -> Box<dyn Monitor<M>> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::with_file_extension;
    use std::path::{Path, PathBuf};

    #[test]
    fn extension_goes_before_suffix() {
        assert_eq!(
            with_file_extension(Path::new("out/run.log"), "_stone_2", false),
            PathBuf::from("out/run_stone_2.log")
        );
        assert_eq!(
            with_file_extension(Path::new("out/run.log"), "run_1", true),
            PathBuf::from("out/run_1/run.log")
        );
        assert_eq!(
            with_file_extension(Path::new("trace"), "_2", false),
            PathBuf::from("trace_2")
        );
    }
}
