//! egui glue around the session engine

pub mod dialogs;
pub mod editor;
pub mod surface;
pub mod tab_strip;
