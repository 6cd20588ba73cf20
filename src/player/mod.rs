pub mod controller;
pub mod demo;
pub mod locate;
pub mod reader;
pub mod traits;

pub use controller::ProcessController;
pub use demo::{DemoSource, LoggingController};
pub use locate::{locate_controller, locate_reader};
pub use reader::ReaderSource;
pub use traits::{
    progress, ControlCommand, ControlPort, MediaSnapshot, MediaSource, PlaybackStatus, PollSource,
    PushSource, Subscription,
};
