mod capture;
mod local_track;
mod media_source_manager;
mod render_sink;

pub use capture::*;
pub use local_track::*;
pub use media_source_manager::*;
pub use render_sink::*;
