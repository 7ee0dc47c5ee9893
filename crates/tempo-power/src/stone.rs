//! Stones of a power ladder and the tab-delimited files they are stored in.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Writer, WriterBuilder};
use serde::{Deserialize, Serialize};
use tempo_core::{ErrorInfo, TempoError};
use tempo_mcmc::with_file_extension;

/// Column names shared by stone files and the summary file.
pub const STONE_COLUMNS: [&str; 3] = ["state", "power", "likelihood"];

/// One row of a stone or summary file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoneRow {
    /// Generation the sample was taken at.
    pub state: u64,
    /// Power the likelihood was raised to.
    pub power: f64,
    /// Unheated log-likelihood.
    pub likelihood: f64,
}

/// One power at which the likelihood is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stone {
    /// Power applied to the likelihood.
    pub power: f64,
    /// Mean of the sampled log-likelihoods once the stone ran.
    pub average_ln_likelihood: f64,
    /// Whether the stone still has to be sampled.
    pub dirty: bool,
    /// Creation order, starting at 1; stone files use `index - 1`.
    pub index: usize,
}

impl Stone {
    fn new(power: f64, index: usize) -> Self {
        Self {
            power,
            average_ln_likelihood: 0.0,
            dirty: true,
            index,
        }
    }

    /// Suffix appended to monitor and stone file names.
    pub fn file_extension(&self) -> String {
        format!("_stone_{}", self.index.saturating_sub(1))
    }
}

/// Stones kept sorted by decreasing power, all powers distinct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoneLadder {
    stones: Vec<Stone>,
}

impl StoneLadder {
    /// Starting ladder of the adaptive analysis: powers 1, 0.5 and 0.
    pub fn initial() -> Self {
        Self {
            stones: vec![Stone::new(1.0, 1), Stone::new(0.5, 2), Stone::new(0.0, 3)],
        }
    }

    /// Ladder over explicit powers; indices follow the given order.
    pub fn from_powers(powers: &[f64]) -> Result<Self, TempoError> {
        if powers.len() < 2 {
            return Err(invalid_ladder("at least two powers are required", powers));
        }
        if powers.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(invalid_ladder("powers must lie in [0, 1]", powers));
        }
        if !powers.contains(&1.0) || !powers.contains(&0.0) {
            return Err(invalid_ladder("the ladder must contain powers 0 and 1", powers));
        }
        let mut stones: Vec<Stone> = powers
            .iter()
            .enumerate()
            .map(|(i, &power)| Stone::new(power, i + 1))
            .collect();
        stones.sort_by(|a, b| b.power.total_cmp(&a.power));
        if stones.windows(2).any(|w| w[0].power == w[1].power) {
            return Err(invalid_ladder("powers must be distinct", powers));
        }
        Ok(Self { stones })
    }

    /// Stones in decreasing power.
    pub fn stones(&self) -> &[Stone] {
        &self.stones
    }

    /// Powers in decreasing order.
    pub fn powers(&self) -> Vec<f64> {
        self.stones.iter().map(|s| s.power).collect()
    }

    /// Number of stones.
    pub fn len(&self) -> usize {
        self.stones.len()
    }

    /// Whether the ladder has no stones.
    pub fn is_empty(&self) -> bool {
        self.stones.is_empty()
    }

    /// Positions of the stones still to be sampled, in ladder order.
    pub fn dirty_positions(&self) -> Vec<usize> {
        self.stones
            .iter()
            .enumerate()
            .filter(|(_, s)| s.dirty)
            .map(|(i, _)| i)
            .collect()
    }

    /// Stores the sampled average of the stone at `position` and marks it clean.
    pub fn set_average(&mut self, position: usize, average: f64) {
        if let Some(stone) = self.stones.get_mut(position) {
            stone.average_ln_likelihood = average;
            stone.dirty = false;
        }
    }

    /// Splits the two segments around the stone at `middle`.
    ///
    /// Inserts dirty stones at `(a+c)/2` and `(c+b)/2`, where `a` and `b` are
    /// the neighbours of `c`, then restores the descending order. Returns the
    /// new powers.
    pub fn split(&mut self, middle: usize) -> Result<[f64; 2], TempoError> {
        if middle == 0 || middle + 1 >= self.stones.len() {
            return Err(TempoError::Config(
                ErrorInfo::new("invalid-split", "a split needs a stone on each side")
                    .with_context("position", middle.to_string())
                    .with_context("stones", self.stones.len().to_string()),
            ));
        }
        let a = self.stones[middle - 1].power;
        let c = self.stones[middle].power;
        let b = self.stones[middle + 1].power;
        let left = (a + c) / 2.0;
        let right = (c + b) / 2.0;
        let next = self.stones.len();
        self.stones.push(Stone::new(left, next + 1));
        self.stones.push(Stone::new(right, next + 2));
        self.stones.sort_by(|x, y| y.power.total_cmp(&x.power));
        Ok([left, right])
    }
}

fn invalid_ladder(message: &str, powers: &[f64]) -> TempoError {
    TempoError::Config(
        ErrorInfo::new("invalid-ladder", message).with_context("powers", format!("{powers:?}")),
    )
}

/// Checks that `base` has a file name with an extension.
pub fn require_extension(base: &Path) -> Result<(), TempoError> {
    if base.file_stem().is_none() || base.extension().is_none() {
        return Err(TempoError::Config(
            ErrorInfo::new("missing-extension", "Please provide a filename with an extension")
                .with_context("filename", base.display().to_string()),
        ));
    }
    Ok(())
}

/// `<stem>_stone_<index - 1>.<ext>` next to `base`.
pub fn stone_file_name(base: &Path, stone: &Stone) -> Result<PathBuf, TempoError> {
    require_extension(base)?;
    Ok(with_file_extension(base, &stone.file_extension(), false))
}

/// Tab-delimited writer shared by stone and summary files.
pub(crate) fn tab_writer(path: &Path) -> Result<Writer<File>, TempoError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| TempoError::io("stone-mkdir", err, parent))?;
    }
    let file = File::create(path).map_err(|err| TempoError::io("stone-open", err, path))?;
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(file);
    writer
        .write_record(STONE_COLUMNS)
        .map_err(|err| wrap_csv("stone-write", err, path))?;
    Ok(writer)
}

pub(crate) fn wrap_csv(code: &str, err: csv::Error, path: &Path) -> TempoError {
    let mut info = ErrorInfo::new(code, "tab-delimited sample file failure")
        .with_context("path", path.display().to_string())
        .with_hint(err.to_string());
    if let Some(position) = err.position() {
        info = info.with_context("line", position.line().to_string());
    }
    if err.is_io_error() {
        TempoError::Io(info)
    } else {
        TempoError::Serde(info)
    }
}

/// Writer of one stone's samples.
#[derive(Debug)]
pub struct StoneWriter {
    path: PathBuf,
    writer: Writer<File>,
}

impl StoneWriter {
    /// Creates the file (and its directory) and writes the header.
    pub fn create(path: &Path) -> Result<Self, TempoError> {
        Ok(Self {
            path: path.to_path_buf(),
            writer: tab_writer(path)?,
        })
    }

    /// Appends one sample row.
    pub fn record(&mut self, state: u64, power: f64, ln_likelihood: f64) -> Result<(), TempoError> {
        self.write_row(&StoneRow {
            state,
            power,
            likelihood: ln_likelihood,
        })
    }

    fn write_row(&mut self, row: &StoneRow) -> Result<(), TempoError> {
        self.writer
            .serialize(row)
            .map_err(|err| wrap_csv("stone-write", err, &self.path))
    }

    /// Flushes the rows to disk.
    pub fn finish(mut self) -> Result<(), TempoError> {
        self.writer
            .flush()
            .map_err(|err| TempoError::io("stone-write", err, &self.path))
    }
}

/// Concatenates the stone files of `ladder`, in ladder order, into `base`.
///
/// Each stone file's header is dropped; the summary carries one header. A
/// stone file that cannot be opened is reported and left out. Returns the
/// number of stones included.
pub fn summarize_stones(base: &Path, ladder: &StoneLadder) -> Result<usize, TempoError> {
    let mut summary = StoneWriter::create(base)?;
    let mut included = 0;
    for stone in ladder.stones() {
        let path = stone_file_name(base, stone)?;
        let mut reader = match ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_path(&path)
        {
            Ok(reader) => reader,
            Err(err) => {
                log::warn!(
                    "Problem reading stone {} from file {}: {err}",
                    stone.index,
                    path.display()
                );
                continue;
            }
        };
        for row in reader.deserialize::<StoneRow>() {
            let row = row.map_err(|err| wrap_csv("stone-read", err, &path))?;
            summary.write_row(&row)?;
        }
        included += 1;
    }
    summary.finish()?;
    Ok(included)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stone_names_use_the_creation_index() {
        let ladder = StoneLadder::initial();
        let names: Vec<_> = ladder
            .stones()
            .iter()
            .map(|s| stone_file_name(Path::new("out/powp.out"), s).unwrap())
            .collect();
        assert_eq!(names[0], PathBuf::from("out/powp_stone_0.out"));
        assert_eq!(names[2], PathBuf::from("out/powp_stone_2.out"));
    }

    #[test]
    fn extensionless_names_are_rejected() {
        let stone = &StoneLadder::initial().stones()[0].clone();
        let err = stone_file_name(Path::new("out/powp"), stone).unwrap_err();
        assert_eq!(err.info().code, "missing-extension");
    }

    #[test]
    fn explicit_powers_are_sorted_and_distinct() {
        let ladder = StoneLadder::from_powers(&[0.0, 1.0, 0.25]).unwrap();
        assert_eq!(ladder.powers(), vec![1.0, 0.25, 0.0]);
        assert_eq!(ladder.stones()[1].index, 3);
        assert!(StoneLadder::from_powers(&[1.0, 0.5, 0.5, 0.0]).is_err());
    }

    #[test]
    fn explicit_ladders_must_span_zero_to_one() {
        for powers in [&[0.9, 0.1][..], &[1.0, 0.4][..], &[0.6, 0.0][..]] {
            let err = StoneLadder::from_powers(powers).unwrap_err();
            assert_eq!(err.info().code, "invalid-ladder");
        }
    }
}
