//! Cross-section and acceptance lookup for simulated samples.
//!
//! Rows are whitespace-separated `<channel> <xs> <acceptance> <nEvents>`.
//! A row matches when its channel field contains the requested channel
//! number; the last matching row wins.

use std::path::Path;

use mjb_core::{Error, Result};

/// One row of the table.
#[derive(Debug, Clone, PartialEq)]
pub struct XsAccEntry {
    /// Channel field as written.
    pub channel: String,
    /// Cross-section.
    pub xs: f64,
    /// Filter acceptance.
    pub acceptance: f64,
    /// Generated event count.
    pub n_events: f64,
}

/// Parsed cross-section table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XsAccTable {
    rows: Vec<XsAccEntry>,
}

impl XsAccTable {
    /// Parse table text. Lines that do not hold four fields with three
    /// numbers are skipped.
    pub fn parse(text: &str) -> Self {
        let rows = text.lines().filter_map(parse_row).collect();
        Self { rows }
    }

    /// Read a table file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read cross-section file {}: {e}", path.display()))
        })?;
        Ok(Self::parse(&text))
    }

    /// Rows in file order.
    pub fn rows(&self) -> &[XsAccEntry] {
        &self.rows
    }

    /// `(xs, acceptance)` for `channel`.
    pub fn lookup(&self, channel: u32) -> Result<(f64, f64)> {
        let key = channel.to_string();
        let row = self
            .rows
            .iter()
            .rev()
            .find(|r| r.channel.contains(&key))
            .ok_or_else(|| Error::config(format!("channel {channel} not in cross-section table")))?;
        if row.n_events <= 0.0 {
            return Err(Error::config(format!(
                "channel {channel} has no generated events in cross-section table"
            )));
        }
        Ok((row.xs, row.acceptance))
    }
}

fn parse_row(line: &str) -> Option<XsAccEntry> {
    let mut fields = line.split_whitespace();
    let channel = fields.next()?;
    let xs = fields.next()?.parse().ok()?;
    let acceptance = fields.next()?.parse().ok()?;
    let n_events = fields.next()?.parse().ok()?;
    Some(XsAccEntry { channel: channel.to_string(), xs, acceptance, n_events })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
# channel xs acc nevents
361020 78420000 1.0 2000000
361023 26454 0.00032 7884500
361023 26450 0.00031 7884500
361024 254.63 0.00053 0
";

    #[test]
    fn last_match_wins() {
        let t = XsAccTable::parse(TABLE);
        assert_eq!(t.rows().len(), 4);
        assert_eq!(t.lookup(361023).unwrap(), (26450.0, 0.00031));
        assert_eq!(t.lookup(361020).unwrap(), (78420000.0, 1.0));
    }

    #[test]
    fn missing_or_empty_channel_is_config_error() {
        let t = XsAccTable::parse(TABLE);
        assert!(matches!(t.lookup(361099), Err(Error::Configuration(_))));
        assert!(matches!(t.lookup(361024), Err(Error::Configuration(_))));
    }

    #[test]
    fn substring_match() {
        let t = XsAccTable::parse("mc15_361023_JZ3 1.5 0.5 10\n");
        assert_eq!(t.lookup(361023).unwrap(), (1.5, 0.5));
    }

    #[test]
    fn unreadable_file() {
        assert!(matches!(
            XsAccTable::from_path("/nonexistent/XsAcc_13TeV.txt"),
            Err(Error::Configuration(_))
        ));
    }
}
