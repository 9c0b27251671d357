pub mod handlers;
pub mod response;
pub mod server;

pub use response::{ApiResponse, ResponseCode};
pub use server::ApiServer;
