pub mod auth;
pub mod counter;
pub mod menu;
pub mod order;
pub mod otp;
pub mod reports;
pub mod stock;
pub mod users;
