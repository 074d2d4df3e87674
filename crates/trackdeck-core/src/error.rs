//! Caller-facing errors for playback and playlist operations.

use thiserror::Error;

use crate::line::LineError;
use crate::persistence::StoreError;


/// Errors returned by the engine, the controller and the player handle.
#[derive( Debug, Error )]
pub enum PlayerError {
    #[error( "Unsupported format: {0}" )]
    UnsupportedFormat( String ),

    #[error( "Resource unavailable: {0}" )]
    ResourceUnavailable( String ),

    #[error( "Index {index} out of range for playlist of {len}" )]
    IndexOutOfRange { index: usize, len: usize },

    #[error( "Playlist is empty" )]
    EmptyPlaylist,

    #[error( "Playlist storage failed: {0}" )]
    PersistenceFailure( String ),

    #[error( "No track loaded" )]
    NoTrackLoaded,

    #[error( "Player thread is not running" )]
    Disconnected,
}


impl From<LineError> for PlayerError {
    fn from( err: LineError ) -> Self {
        match err {
            LineError::UnsupportedFormat( msg ) => PlayerError::UnsupportedFormat( msg ),
            LineError::Unavailable( msg ) => PlayerError::ResourceUnavailable( msg ),
        }
    }
}


impl From<StoreError> for PlayerError {
    fn from( err: StoreError ) -> Self {
        PlayerError::PersistenceFailure( err.to_string() )
    }
}
