pub mod batch;
pub mod repository;
pub mod todo;
pub mod user;
