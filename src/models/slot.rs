use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::Interval;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: i64,
    pub booking_id: i64,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

impl Slot {
    pub fn interval(&self) -> Interval {
        Interval::new(self.start_time, self.end_time)
    }
}
