pub mod render_handler;

pub use render_handler::RenderJobHandler;
