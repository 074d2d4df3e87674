//! Trackdeck Core - Playlist playback engine
//!
//! This crate provides the playback engine, playlist navigation, progress
//! reporting and the controller thread that ties them together, plus the
//! device, storage and scanning backends they run against.

pub mod command;
pub mod controller;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod library;
pub mod line;
pub mod output;
pub mod persistence;
pub mod player;
pub mod playlist;
pub mod progress;
pub mod track;

#[cfg( test )]
mod testing;

pub use command::{ Command, CommandError };
pub use engine::PlaybackState;
pub use error::PlayerError;
pub use library::{ LibraryError, LibraryScanner };
pub use output::DeviceBackend;
pub use persistence::{ PlaylistStore, SqliteStore, StoreError, UserId };
pub use player::{ LoadReport, Player, PlayerEvent, PlayerOptions, PlayerSnapshot };
pub use progress::{ Progress, PROGRESS_RANGE };
pub use track::Track;
