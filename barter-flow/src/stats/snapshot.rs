use super::{aggregator::StatBucket, classifier::SizeBucket};
use crate::instrument::AggregateKey;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Display precision of USD volume figures.
pub const USD_PRECISION: usize = 2;

/// Display precision of base amounts and deltas.
pub const BASE_PRECISION: usize = 4;

/// Label of the columns holding trades above the largest [`SizeBucket`].
const UNBUCKETED_LABEL: &str = "100m+";

/// Structured trade statistics report. Values are stored at full precision and only rounded
/// when rendered as text.
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct TradeStatsSnapshot {
    pub rows: Vec<TradeStatsRow>,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct TradeStatsRow {
    pub key: AggregateKey,
    pub stats: StatBucket,
}

impl TradeStatsSnapshot {
    pub fn get(&self, key: &AggregateKey) -> Option<&StatBucket> {
        self.rows
            .iter()
            .find(|row| &row.key == key)
            .map(|row| &row.stats)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Report column headers.
    pub fn headers() -> Vec<String> {
        let fixed = ["Exchange/Symbol", "USD Vol", "Base Vol", "Delta USD", "Delta BASE"]
            .into_iter()
            .map(str::to_string);

        let buckets = SizeBucket::ALL
            .iter()
            .map(SizeBucket::label)
            .chain(std::iter::once(UNBUCKETED_LABEL))
            .flat_map(|label| [label.to_string(), format!("{label}Δ")]);

        fixed.chain(buckets).collect()
    }
}

impl TradeStatsRow {
    /// Text cells of this row, in [`TradeStatsSnapshot::headers`] order.
    pub fn cells(&self) -> Vec<String> {
        let StatBucket { volume, cvd } = &self.stats;

        let fixed = [
            self.key.to_string(),
            format!("{:.*}", USD_PRECISION, volume.total_usd),
            format!("{:.*}", BASE_PRECISION, volume.total_base),
            format!("{:.*}", BASE_PRECISION, cvd.total_usd),
            format!("{:.*}", BASE_PRECISION, cvd.total_base),
        ];

        let buckets = volume
            .buckets
            .iter()
            .zip(cvd.buckets.iter())
            .chain(std::iter::once((&volume.unbucketed, &cvd.unbucketed)))
            .flat_map(|(volume, delta)| {
                [
                    format!("{:.*}", BASE_PRECISION, volume),
                    format!("{:.*}", BASE_PRECISION, delta),
                ]
            });

        fixed.into_iter().chain(buckets).collect()
    }
}

/// Renders a grid table, one row per [`AggregateKey`].
impl std::fmt::Display for TradeStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let headers = Self::headers();
        let rows = self.rows.iter().map(TradeStatsRow::cells).collect::<Vec<_>>();

        let widths = headers
            .iter()
            .enumerate()
            .map(|(column, header)| {
                rows.iter()
                    .map(|cells| cells[column].chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>();

        let border = |fill: &str| {
            format!(
                "+{}+",
                widths
                    .iter()
                    .map(|width| fill.repeat(width + 2))
                    .join("+")
            )
        };

        // First column (labels) left aligned, figures right aligned
        let line = |cells: &[String]| {
            format!(
                "|{}|",
                cells
                    .iter()
                    .zip(widths.iter().copied())
                    .enumerate()
                    .map(|(column, (cell, width))| match column {
                        0 => format!(" {cell:<width$} "),
                        _ => format!(" {cell:>width$} "),
                    })
                    .join("|")
            )
        };

        writeln!(f, "{}", border("-"))?;
        writeln!(f, "{}", line(headers.as_slice()))?;
        writeln!(f, "{}", border("="))?;
        for cells in &rows {
            writeln!(f, "{}", line(cells.as_slice()))?;
            writeln!(f, "{}", border("-"))?;
        }
        Ok(())
    }
}
