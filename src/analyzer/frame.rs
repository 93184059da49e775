use crate::model::{Bar, Column, IndicatorError};
use std::collections::BTreeMap;

/// Column-oriented view of an OHLCV series, oldest bar first.
///
/// Frames built from [`Bar`]s always carry every column. Frames assembled
/// from raw columns may carry only some of them, and every indicator checks
/// for the columns it needs before computing anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    timestamps: Vec<i64>,
    columns: BTreeMap<Column, Vec<f64>>,
    len: usize,
}

impl Frame {
    /// Builds a frame from bars, ordering them by timestamp.
    pub fn from_bars(bars: &[Bar]) -> Self {
        let mut sorted = bars.to_vec();
        sorted.sort_by_key(|b| b.t);

        let mut columns = BTreeMap::new();
        columns.insert(Column::Open, sorted.iter().map(|b| b.open).collect());
        columns.insert(Column::High, sorted.iter().map(|b| b.high).collect());
        columns.insert(Column::Low, sorted.iter().map(|b| b.low).collect());
        columns.insert(Column::Close, sorted.iter().map(|b| b.close).collect());
        columns.insert(Column::Volume, sorted.iter().map(|b| b.volume).collect());

        Self {
            timestamps: sorted.iter().map(|b| b.t).collect(),
            len: sorted.len(),
            columns,
        }
    }

    /// Builds a frame from an arbitrary subset of columns. All columns must
    /// have the same length.
    pub fn from_columns<I>(columns: I) -> Result<Self, IndicatorError>
    where
        I: IntoIterator<Item = (Column, Vec<f64>)>,
    {
        let columns: BTreeMap<Column, Vec<f64>> = columns.into_iter().collect();
        let len = columns.values().next().map(|v| v.len()).unwrap_or(0);

        for (column, values) in &columns {
            if values.len() != len {
                return Err(IndicatorError::LengthMismatch {
                    column: *column,
                    expected: len,
                    got: values.len(),
                });
            }
        }

        Ok(Self {
            timestamps: (0..len as i64).collect(),
            columns,
            len,
        })
    }

    /// A close-only frame.
    pub fn from_closes(closes: Vec<f64>) -> Self {
        let len = closes.len();
        let mut columns = BTreeMap::new();
        columns.insert(Column::Close, closes);
        Self {
            timestamps: (0..len as i64).collect(),
            columns,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn has(&self, column: Column) -> bool {
        self.columns.contains_key(&column)
    }

    pub fn column(&self, column: Column) -> Result<&[f64], IndicatorError> {
        self.columns
            .get(&column)
            .map(|v| v.as_slice())
            .ok_or(IndicatorError::MissingColumn(column))
    }

    /// Fails with the first missing column, in the order given.
    pub fn require(&self, columns: &[Column]) -> Result<(), IndicatorError> {
        match columns.iter().find(|c| !self.has(**c)) {
            Some(missing) => Err(IndicatorError::MissingColumn(*missing)),
            None => Ok(()),
        }
    }

    pub fn last(&self, column: Column) -> Option<f64> {
        self.columns.get(&column).and_then(|v| v.last().copied())
    }

    /// The trailing `n` rows (or the whole frame if shorter).
    pub fn tail(&self, n: usize) -> Frame {
        let start = self.len.saturating_sub(n);
        Frame {
            timestamps: self.timestamps[start..].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(c, v)| (*c, v[start..].to_vec()))
                .collect(),
            len: self.len - start,
        }
    }
}
