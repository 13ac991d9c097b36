pub mod envelope;

pub use envelope::{ApiResponse, ListResponse, MessageResponse, Pagination};
