pub mod booking;
pub mod interval;
pub mod slot;
pub mod user;

pub use booking::Booking;
pub use interval::Interval;
pub use slot::Slot;
pub use user::User;
