pub mod summary;
pub mod transactions;
pub mod users;
