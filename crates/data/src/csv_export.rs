use coinlab_core::Candle;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub const CANDLE_HEADER: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

/// Write candles to a CSV file, one row per candle in the order given.
///
/// Timestamps are RFC 3339; prices keep their full decimal precision.
/// Returns the number of rows written.
pub fn write_candles_to_csv(path: &Path, candles: &[Candle]) -> Result<usize, ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CANDLE_HEADER)?;

    for candle in candles {
        writer.write_record([
            candle.timestamp.to_rfc3339(),
            candle.open.to_string(),
            candle.high.to_string(),
            candle.low.to_string(),
            candle.close.to_string(),
            candle.volume.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(candles.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    #[test]
    fn test_write_candles() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let candles = vec![
            Candle {
                timestamp: t0,
                open: dec!(42000.10),
                high: dec!(42500),
                low: dec!(41800),
                close: dec!(42300.5),
                volume: dec!(12.5),
            },
            Candle {
                timestamp: t0 + Duration::hours(1),
                open: dec!(42300.5),
                high: dec!(42400),
                low: dec!(42100),
                close: dec!(42150),
                volume: dec!(3),
            },
        ];

        let path = std::env::temp_dir().join(format!("coinlab-candles-{}.csv", uuid::Uuid::new_v4()));
        let written = write_candles_to_csv(&path, &candles).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(written, 2);
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "timestamp,open,high,low,close,volume");
        assert_eq!(lines[1], "2024-01-01T00:00:00+00:00,42000.10,42500,41800,42300.5,12.5");
        assert_eq!(lines[2], "2024-01-01T01:00:00+00:00,42300.5,42400,42100,42150,3");
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let path = std::env::temp_dir()
            .join(format!("coinlab-missing-{}", uuid::Uuid::new_v4()))
            .join("out.csv");
        assert!(write_candles_to_csv(&path, &[]).is_err());
    }
}
