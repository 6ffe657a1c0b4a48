pub mod capture;
pub mod keyboard;
pub mod keymap;
pub mod model;
pub mod playback;
pub mod predictor;
pub mod profile;
pub mod sim;
pub mod stats;
pub mod typo;
