use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{Slot, User};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub user_id: i64,
    pub created_at: NaiveDateTime,
    pub slots: Vec<Slot>,
}

impl Booking {
    pub fn is_owned_by(&self, user: &User) -> bool {
        self.user_id == user.id
    }
}
