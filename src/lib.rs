//! Music Mosaic library - audio-reactive mosaic image visualizer

pub mod audio;
pub mod cli;
pub mod director;
pub mod gpu;
pub mod images;
pub mod keybindings;
pub mod params;
pub mod prefs;
pub mod state;
pub mod status;
pub mod timing;

#[cfg(test)]
mod testing;
