pub mod api;
pub mod storage;
pub mod transactions;
pub mod users;
