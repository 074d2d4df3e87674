//! Audio line abstraction
//!
//! An audio line is an opened, playable track: it can be started and
//! stopped, repositioned in microseconds, and attenuated through a gain
//! control. Lines report every stop (explicit or end of stream) through a
//! listener that may be called from the audio callback thread.

use std::sync::Arc;

use thiserror::Error;

use crate::track::Track;


/// Errors a backend can report when opening a line.
#[derive( Debug, Error )]
pub enum LineError {
    #[error( "Unsupported format: {0}" )]
    UnsupportedFormat( String ),

    #[error( "Audio resource unavailable: {0}" )]
    Unavailable( String ),
}


/// Payload of a stop notification.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub struct LineStopped {
    /// Line position when it stopped.
    pub position_micros: u64,
}


/// Callback invoked whenever a line stops.
///
/// Called from whatever thread noticed the stop, which for end of stream
/// is the audio callback. Implementations must only post the notice
/// somewhere and return.
pub type StopListener = Arc<dyn Fn( LineStopped ) + Send + Sync>;


/// Gain control range in decibels.
#[derive( Debug, Clone, Copy, PartialEq )]
pub struct GainRange {
    pub min_db: f32,
    pub max_db: f32,
}


impl GainRange {
    /// Maps a volume percentage linearly onto the range.
    pub fn gain_for_percent( &self, percent: u8 ) -> f32 {
        let percent = percent.min( 100 ) as f32;
        self.min_db + ( self.max_db - self.min_db ) * percent / 100.0
    }
}


/// An opened, playable audio stream.
pub trait AudioLine {
    /// Starts (or continues) rendering from the current position.
    fn start( &mut self );

    /// Stops rendering, keeping the position. Notifies the stop listener
    /// if the line was running.
    fn stop( &mut self );

    /// Returns true while the line is rendering.
    fn is_running( &self ) -> bool;

    /// Current position in microseconds.
    fn position_micros( &self ) -> u64;

    /// Moves the play head. Values past the end are clamped by the line.
    fn set_position_micros( &mut self, micros: u64 );

    /// Total length in microseconds.
    fn duration_micros( &self ) -> u64;

    /// Gain control range, or None if the line has no gain control.
    fn gain_range( &self ) -> Option<GainRange>;

    /// Sets the gain in decibels. Ignored without a gain control.
    fn set_gain_db( &mut self, gain_db: f32 );
}


/// Opens lines for tracks.
pub trait LineBackend {
    /// Opens `track`. The listener is called every time the returned line
    /// stops, for as long as the line lives.
    fn open( &mut self, track: &Track, on_stop: StopListener ) -> Result<Box<dyn AudioLine>, LineError>;
}


impl<T: LineBackend + ?Sized> LineBackend for Box<T> {
    fn open( &mut self, track: &Track, on_stop: StopListener ) -> Result<Box<dyn AudioLine>, LineError> {
        ( **self ).open( track, on_stop )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_gain_mapping_is_linear() {
        let range = GainRange { min_db: -80.0, max_db: 6.0 };
        assert_eq!( range.gain_for_percent( 0 ), -80.0 );
        assert_eq!( range.gain_for_percent( 100 ), 6.0 );
        assert!( ( range.gain_for_percent( 50 ) - -37.0 ).abs() < 1e-4 );
    }


    #[test]
    fn test_gain_mapping_clamps_percent() {
        let range = GainRange { min_db: -80.0, max_db: 6.0 };
        assert_eq!( range.gain_for_percent( 250 ), 6.0 );
    }
}
