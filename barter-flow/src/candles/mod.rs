//! Resampling of OHLCV rows into a coarser, calendar-aligned [`Timeframe`].

use crate::{
    error::FlowError,
    subscription::candle::{CandleRow, Timeframe},
};
use itertools::Itertools;
use std::str::FromStr;

/// Resample `rows` into windows of the timeframe given by its exchange label, eg/ "5m", "4h".
///
/// See [`resample_to`].
pub fn resample(rows: &[CandleRow], timeframe: &str) -> Result<Vec<CandleRow>, FlowError> {
    resample_to(rows, Timeframe::from_str(timeframe)?)
}

/// Resample `rows` into windows of `timeframe`.
///
/// Rows are ordered by timestamp first. Windows are laid out from the earliest row as described
/// by [`Timeframe::window_start`]. Each non-empty window yields one row stamped with the window
/// start (whole seconds): first open, max high, min low, last close and summed volume.
pub fn resample_to(rows: &[CandleRow], timeframe: Timeframe) -> Result<Vec<CandleRow>, FlowError> {
    let mut rows = rows
        .iter()
        .map(|row| match row.is_finite() {
            true => row.time().map(|time| (time, *row)),
            false => Err(FlowError::InvalidCandle {
                timestamp: row.timestamp,
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    rows.sort_by_key(|(time, _)| *time);

    let Some((origin, _)) = rows.first().copied() else {
        return Ok(Vec::new());
    };

    let windows = rows
        .iter()
        .chunk_by(|(time, _)| timeframe.window_start(origin, *time));

    let resampled = windows
        .into_iter()
        .filter_map(|(start, mut window)| {
            let (_, first) = window.next()?;
            let candle = window.fold(
                CandleRow {
                    timestamp: start.timestamp(),
                    ..*first
                },
                |mut candle, (_, row)| {
                    candle.high = candle.high.max(row.high);
                    candle.low = candle.low.min(row.low);
                    candle.close = row.close;
                    candle.volume += row.volume;
                    candle
                },
            );
            Some(candle)
        })
        .collect();

    Ok(resampled)
}
