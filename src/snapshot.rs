use crate::error::SnapshotError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Persisted meter state: `<m3>;<True|False>;<value with 6 decimals>`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterSnapshot {
    pub major_unit_count: u64,
    pub rollover_guard: bool,
    pub cumulative_value: f64,
}

impl fmt::Display for MeterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{:.6}",
            self.major_unit_count,
            if self.rollover_guard { "True" } else { "False" },
            self.cumulative_value
        )
    }
}

impl FromStr for MeterSnapshot {
    type Err = SnapshotError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let malformed = || SnapshotError::Malformed(line.to_string());

        let mut fields = line.trim().split(';');
        let (Some(m3), Some(guard), Some(value), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(malformed());
        };

        let rollover_guard = match guard.trim() {
            "True" => true,
            "False" => false,
            _ => return Err(malformed()),
        };
        let major_unit_count = m3.trim().parse().map_err(|_| malformed())?;
        let cumulative_value: f64 = value.trim().parse().map_err(|_| malformed())?;
        if !cumulative_value.is_finite() || cumulative_value < 0.0 {
            return Err(malformed());
        }

        Ok(Self {
            major_unit_count,
            rollover_guard,
            cumulative_value,
        })
    }
}

/// Single-file store for the meter snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot, `Ok(None)` when the file does not exist.
    pub async fn load(&self) -> Result<Option<MeterSnapshot>, SnapshotError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents.parse::<MeterSnapshot>().map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Rewrites the whole file with the given snapshot.
    pub async fn store(&self, snapshot: &MeterSnapshot) -> Result<(), SnapshotError> {
        tokio::fs::write(&self.path, snapshot.to_string()).await?;
        Ok(())
    }
}
