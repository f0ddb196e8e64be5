pub mod audit;
pub mod checkin;
pub mod server;
pub mod storage;
