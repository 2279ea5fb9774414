mod inactivity;

pub use inactivity::InactivitySweeper;
