mod app;
mod like;

pub use app::{add_routes, AppState};
