// 🍺 Round Entity
//
// One "someone paid" event. Rounds are append-only: the timestamp is
// assigned by the store at insert and the row is never updated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    /// Insertion sequence number, also the tie-break between equal dates
    pub id: i64,
    pub group_id: i64,
    pub paid_by_id: i64,

    /// Smallest currency unit (cents)
    pub amount: i64,
    pub date: DateTime<Utc>,

    #[serde(default)]
    pub notes: Option<String>,
}

impl Round {
    /// Ordering key for "latest": date first, then insertion order
    pub fn recency_key(&self) -> (DateTime<Utc>, i64) {
        (self.date, self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRound {
    pub group_id: i64,
    pub paid_by_id: i64,
    pub amount: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewRound {
    pub fn new(group_id: i64, paid_by_id: i64, amount: i64, notes: Option<String>) -> Self {
        NewRound {
            group_id,
            paid_by_id,
            amount,
            notes: notes.filter(|n| !n.trim().is_empty()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.amount < 0 {
            return Err(Error::Validation(format!(
                "amount must be non-negative, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}
