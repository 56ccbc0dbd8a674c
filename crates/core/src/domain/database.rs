// Logical Database Names

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named storage partition, backed by exactly one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalDatabase {
    /// content, queue, analytics
    Core,
    /// posts, engagement, followers
    Social,
    /// financial_news, market_data, signals
    Market,
}

impl LogicalDatabase {
    pub const ALL: [LogicalDatabase; 3] = [
        LogicalDatabase::Core,
        LogicalDatabase::Social,
        LogicalDatabase::Market,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LogicalDatabase::Core => "core",
            LogicalDatabase::Social => "social",
            LogicalDatabase::Market => "market",
        }
    }

    /// File name inside the data directory
    pub fn file_name(&self) -> &'static str {
        match self {
            LogicalDatabase::Core => "unified_core.db",
            LogicalDatabase::Social => "unified_social.db",
            LogicalDatabase::Market => "unified_market.db",
        }
    }

    /// Legacy stores folded into this database by a consolidation pass,
    /// relative to the legacy root
    pub fn legacy_sources(&self) -> &'static [&'static str] {
        match self {
            LogicalDatabase::Core => &["data/agency.db", "posting_queue.db", "unified_platform.db"],
            LogicalDatabase::Social => &[
                "engagement_tracking.db",
                "automated_manager.db",
                "treum_platform.db",
            ],
            LogicalDatabase::Market => &[
                "financial_data.db",
                "realtime_posts.db",
                "news_tracker.db",
            ],
        }
    }
}

impl fmt::Display for LogicalDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogicalDatabase {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "core" => Ok(LogicalDatabase::Core),
            "social" => Ok(LogicalDatabase::Social),
            "market" => Ok(LogicalDatabase::Market),
            _ => Err(DomainError::UnknownDatabase(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("core".parse::<LogicalDatabase>().unwrap(), LogicalDatabase::Core);
        assert_eq!(" Market ".parse::<LogicalDatabase>().unwrap(), LogicalDatabase::Market);
        assert!("ledger".parse::<LogicalDatabase>().is_err());
    }

    #[test]
    fn test_file_names_are_distinct() {
        let mut names: Vec<_> = LogicalDatabase::ALL.iter().map(|db| db.file_name()).collect();
        names.dedup();
        assert_eq!(names.len(), 3);
    }
}
