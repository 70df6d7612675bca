mod app;
mod likes;

pub use app::{add_routes, ReaderState};
