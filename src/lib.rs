pub mod common;
pub mod dashboard;
pub mod federation;
pub mod gui;
pub mod logging;
pub mod settings;
