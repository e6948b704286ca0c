mod app;
mod fetch;
mod submit;

pub use app::{add_routes, AppState};
