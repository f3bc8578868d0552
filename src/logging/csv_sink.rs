//! CSV sinks for the bar stream and the trade-event audit trail.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;

use crate::types::{AccountSnapshot, Bar};

/// Appends one row per processed market snapshot.
pub struct BarsCsvSink {
    writer: Mutex<csv::Writer<File>>,
}

impl BarsCsvSink {
    pub fn create(path: &Path) -> Result<Self> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("create bars csv {}", path.display()))?;
        writer.write_record([
            "Timestamp", "Symbol", "Open", "High", "Low", "Close", "Volume", "ATR", "AvgATR",
            "AvgVolume",
        ])?;
        writer.flush()?;
        Ok(Self {
            writer: Mutex::new(writer),
        })
    }

    pub fn log_bar(
        &self,
        symbol: &str,
        bar: &Bar,
        atr: f64,
        avg_atr: f64,
        avg_volume: f64,
    ) -> Result<()> {
        let mut writer = self.writer.lock().unwrap();
        writer.write_record([
            bar.timestamp.as_str(),
            symbol,
            &format!("{:.4}", bar.open),
            &format!("{:.4}", bar.high),
            &format!("{:.4}", bar.low),
            &format!("{:.4}", bar.close),
            &format!("{:.2}", bar.volume),
            &format!("{atr:.4}"),
            &format!("{avg_atr:.4}"),
            &format!("{avg_volume:.2}"),
        ])?;
        writer.flush()?;
        Ok(())
    }
}

/// Appends one row per notable trading event (signals, orders, rejections,
/// halts). `values` carries up to five event-specific fields.
pub struct TradeEventsCsvSink {
    writer: Mutex<csv::Writer<File>>,
}

impl TradeEventsCsvSink {
    pub fn create(path: &Path) -> Result<Self> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("create trade events csv {}", path.display()))?;
        writer.write_record([
            "timestamp", "symbol", "event_type", "value1", "value2", "value3", "value4", "value5",
            "notes",
        ])?;
        writer.flush()?;
        Ok(Self {
            writer: Mutex::new(writer),
        })
    }

    pub fn log_event(
        &self,
        symbol: &str,
        event_type: &str,
        values: &[String],
        notes: &str,
    ) -> Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let mut row: Vec<&str> = vec![timestamp.as_str(), symbol, event_type];
        for i in 0..5 {
            row.push(values.get(i).map(String::as_str).unwrap_or(""));
        }
        row.push(notes);

        let mut writer = self.writer.lock().unwrap();
        writer.write_record(&row)?;
        writer.flush()?;
        Ok(())
    }

    /// One row per trader cycle recording broker state at decision time, so
    /// the decision log can be reconciled against the account afterwards.
    pub fn log_account(&self, symbol: &str, account: &AccountSnapshot) -> Result<()> {
        self.log_event(
            symbol,
            "ACCOUNT_SNAPSHOT",
            &[
                format!("{:.2}", account.equity),
                format!("{:.2}", account.buying_power),
                account.position.quantity.to_string(),
                format!("{:.2}", account.position.market_value),
                format!("{:.2}", account.exposure_pct()),
            ],
            "",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "bracket-trader-{}-{}-{}",
            name,
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)
        ))
    }

    #[test]
    fn bars_sink_writes_header_and_rows() {
        let path = temp_path("bars.csv");
        let sink = BarsCsvSink::create(&path).unwrap();
        let bar = Bar {
            timestamp: "2024-06-03T14:30:00Z".to_string(),
            open: 100.0,
            high: 101.0,
            low: 99.5,
            close: 100.5,
            volume: 12_000.0,
        };
        sink.log_bar("AAPL", &bar, 0.75, 0.6, 10_500.0).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(contents.starts_with("Timestamp,Symbol,Open"));
        assert!(contents.contains("2024-06-03T14:30:00Z,AAPL,100.0000,101.0000"));
        assert!(contents.contains("0.7500,0.6000,10500.00"));
    }

    #[test]
    fn account_snapshot_row_records_broker_state() {
        let path = temp_path("account-events.csv");
        let sink = TradeEventsCsvSink::create(&path).unwrap();
        let account = AccountSnapshot {
            equity: 50_000.0,
            buying_power: 80_000.0,
            position: crate::types::PositionDetails {
                quantity: 25,
                unrealized_pnl: 12.5,
                market_value: 2_500.0,
            },
            open_order_count: 1,
            trading_blocked: false,
        };
        sink.log_account("AAPL", &account).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        let data_line = contents.lines().nth(1).unwrap();
        assert!(data_line.contains("AAPL,ACCOUNT_SNAPSHOT"));
        assert!(data_line.contains("50000.00,80000.00,25,2500.00,5.00"));
    }

    #[test]
    fn trade_events_pads_missing_values() {
        let path = temp_path("events.csv");
        let sink = TradeEventsCsvSink::create(&path).unwrap();
        sink.log_event(
            "AAPL",
            "ORDER_SUBMITTED",
            &["BUY".to_string(), "5".to_string()],
            "bracket order",
        )
        .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        let data_line = contents.lines().nth(1).unwrap();
        assert_eq!(data_line.matches(',').count(), 8);
        assert!(data_line.contains("ORDER_SUBMITTED,BUY,5,,,"));
        assert!(data_line.ends_with("bracket order"));
    }
}
