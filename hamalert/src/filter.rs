//! Band and source filters
//!
//! Each known band and source has its own tri-state cell: unset (no
//! restriction configured), allowed, or denied. Cells are independent
//! atomics, so the UI thread can toggle them while the ingestion thread
//! evaluates records, without a lock. A toggle only affects records that
//! are filtered after it; anything already enqueued stays.

use crate::alert::{Alert, SOURCE_CLUSTER, SOURCE_POTA, SOURCE_SOTA};
use crossbeam::atomic::AtomicCell;

/// Amateur bands known to HamAlert, from ultra-long-wave to millimeter.
pub const BANDS: &[&str] = &[
    "2200m", "630m", "160m", "80m", "60m", "40m", "30m", "20m", "17m", "15m", "12m", "10m",
    "6m", "4m", "2m", "1.25m", "70cm", "33cm", "23cm", "13cm", "9cm", "6cm", "3cm", "1.25cm",
    "6mm", "4mm", "2.5mm", "2mm", "1mm",
];

/// Alert sources that can be filtered.
pub const SOURCES: &[&str] = &[SOURCE_POTA, SOURCE_SOTA, SOURCE_CLUSTER];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("unknown band '{0}'")]
    UnknownBand(String),
    #[error("unknown source '{0}'")]
    UnknownSource(String),
}

/// A fixed set of names, each with an independently updated tri-state flag.
struct Table {
    names: &'static [&'static str],
    flags: Vec<AtomicCell<Option<bool>>>,
}

impl Table {
    fn new(names: &'static [&'static str]) -> Table {
        Table {
            names,
            flags: names.iter().map(|_| AtomicCell::new(None)).collect(),
        }
    }

    fn cell(&self, name: &str) -> Option<&AtomicCell<Option<bool>>> {
        let idx = self.names.iter().position(|n| n.eq_ignore_ascii_case(name))?;
        Some(&self.flags[idx])
    }

    /// Values without a table entry are never restricted.
    fn allows(&self, name: Option<&str>) -> bool {
        match name.and_then(|n| self.cell(n)) {
            Some(cell) => cell.load().unwrap_or(true),
            None => true,
        }
    }

    fn snapshot(&self) -> Vec<(&'static str, Option<bool>)> {
        self.names
            .iter()
            .zip(self.flags.iter())
            .map(|(name, flag)| (*name, flag.load()))
            .collect()
    }
}

/// Band and source filters shared between the UI and the ingestion thread.
pub struct FilterSet {
    bands: Table,
    sources: Table,
}

impl Default for FilterSet {
    fn default() -> Self {
        FilterSet::new()
    }
}

impl FilterSet {
    /// A filter set without any restriction.
    pub fn new() -> FilterSet {
        FilterSet {
            bands: Table::new(BANDS),
            sources: Table::new(SOURCES),
        }
    }

    /// Whether `alert` passes both the band and the source filter.
    pub fn accept(&self, alert: &Alert) -> bool {
        self.bands.allows(alert.band.as_deref()) && self.sources.allows(alert.source.as_deref())
    }

    /// Allow (`Some(true)`), deny (`Some(false)`) or clear (`None`) a band.
    pub fn set_band(&self, band: &str, state: Option<bool>) -> Result<(), FilterError> {
        self.bands
            .cell(band)
            .ok_or_else(|| FilterError::UnknownBand(band.to_string()))?
            .store(state);
        Ok(())
    }

    /// Allow (`Some(true)`), deny (`Some(false)`) or clear (`None`) a source.
    pub fn set_source(&self, source: &str, state: Option<bool>) -> Result<(), FilterError> {
        self.sources
            .cell(source)
            .ok_or_else(|| FilterError::UnknownSource(source.to_string()))?
            .store(state);
        Ok(())
    }

    pub fn band(&self, band: &str) -> Option<bool> {
        self.bands.cell(band).and_then(|c| c.load())
    }

    pub fn source(&self, source: &str) -> Option<bool> {
        self.sources.cell(source).and_then(|c| c.load())
    }

    pub fn bands(&self) -> Vec<(&'static str, Option<bool>)> {
        self.bands.snapshot()
    }

    pub fn sources(&self) -> Vec<(&'static str, Option<bool>)> {
        self.sources.snapshot()
    }
}
