//! Playback engine
//!
//! Owns the single open audio line and the play/pause/stop state machine
//! around it. Lines report every stop the same way, so the engine decides
//! whether a stop was the end of the track or something it asked for.

use std::sync::Arc;
use std::time::Duration;

use crate::error::PlayerError;
use crate::line::{ AudioLine, LineBackend, LineStopped, StopListener };
use crate::track::Track;


/// How close to the end a stopped line must be to count as finished.
pub const COMPLETION_TOLERANCE: Duration = Duration::from_millis( 2 );

/// Volume applied until the user changes it.
pub const DEFAULT_VOLUME: u8 = 70;


/// Current playback state.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum PlaybackState {
    /// Nothing loaded.
    #[default]
    Idle,
    Playing,
    Paused,
    /// Loaded and parked, normally at position 0.
    Stopped,
}


/// Events the engine raises while handling stop notices.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum EngineEvent {
    /// The loaded track played to its end.
    Completed,
}


/// A line stop, tagged with the generation of the line that raised it.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub struct StopNotice {
    pub generation: u64,
    pub position_micros: u64,
}


/// Where stop notices are posted. Must not touch engine state.
pub type NoticeSink = Arc<dyn Fn( StopNotice ) + Send + Sync>;


/// Playback state machine over one audio line at a time.
pub struct PlaybackEngine<B: LineBackend> {
    backend: B,
    line: Option<Box<dyn AudioLine>>,
    track: Option<Track>,
    state: PlaybackState,
    paused_position_micros: u64,
    /// Volume percentage, 0 to 100
    volume: u8,
    /// Bumped on every load so stale notices can be told apart
    generation: u64,
    completion_tolerance_micros: u64,
    notices: NoticeSink,
}


impl<B: LineBackend> PlaybackEngine<B> {
    /// Creates an idle engine. Stop notices from opened lines go to
    /// `notices`.
    pub fn new( backend: B, notices: NoticeSink ) -> Self {
        Self {
            backend,
            line: None,
            track: None,
            state: PlaybackState::Idle,
            paused_position_micros: 0,
            volume: DEFAULT_VOLUME,
            generation: 0,
            completion_tolerance_micros: COMPLETION_TOLERANCE.as_micros() as u64,
            notices,
        }
    }


    /// Overrides the end-of-track tolerance.
    pub fn set_completion_tolerance( &mut self, tolerance: Duration ) {
        self.completion_tolerance_micros = tolerance.as_micros() as u64;
    }


    /// Opens `track`, replacing whatever was loaded.
    ///
    /// On success the engine is Stopped at 0 with the current volume
    /// applied. On failure the previous line is still released and the
    /// engine is Idle.
    pub fn load( &mut self, track: &Track ) -> Result<(), PlayerError> {
        self.release();

        self.generation += 1;
        let generation = self.generation;
        let sink = Arc::clone( &self.notices );
        let listener: StopListener = Arc::new( move |stopped: LineStopped| {
            sink( StopNotice { generation, position_micros: stopped.position_micros } );
        });

        let mut line = self.backend.open( track, listener ).map_err( |e| {
            tracing::warn!( "Failed to open {:?}: {}", track.path(), e );
            PlayerError::from( e )
        })?;

        line.set_position_micros( 0 );
        Self::apply_volume( line.as_mut(), self.volume );

        tracing::info!(
            "Loaded {} ({} ms)",
            track.display_name(),
            line.duration_micros() / 1000
        );

        self.line = Some( line );
        self.track = Some( track.clone() );
        self.paused_position_micros = 0;
        self.state = PlaybackState::Stopped;
        Ok(())
    }


    /// Starts or resumes playback.
    pub fn play( &mut self ) -> Result<(), PlayerError> {
        let line = self.line.as_mut().ok_or( PlayerError::NoTrackLoaded )?;

        match self.state {
            PlaybackState::Playing => return Ok(()),
            PlaybackState::Paused => {
                line.set_position_micros( self.paused_position_micros );
                line.start();
                tracing::info!( "Resumed at {} ms", self.paused_position_micros / 1000 );
            }
            PlaybackState::Stopped | PlaybackState::Idle => {
                line.start();
                tracing::info!( "Playing from {} ms", line.position_micros() / 1000 );
            }
        }

        self.state = PlaybackState::Playing;
        Ok(())
    }


    /// Pauses playback, remembering the position. No-op unless playing.
    pub fn pause( &mut self ) {
        if self.state != PlaybackState::Playing {
            return;
        }
        if let Some( line ) = self.line.as_mut() {
            self.paused_position_micros = line.position_micros();
            self.state = PlaybackState::Paused;
            line.stop();
            tracing::info!( "Paused at {} ms", self.paused_position_micros / 1000 );
        }
    }


    /// Stops playback and rewinds to the start. No-op when idle.
    pub fn stop( &mut self ) {
        if let Some( line ) = self.line.as_mut() {
            self.state = PlaybackState::Stopped;
            self.paused_position_micros = 0;
            line.stop();
            line.set_position_micros( 0 );
            tracing::info!( "Stopped" );
        }
    }


    /// Moves the play head, clamped to the track length.
    ///
    /// Never changes the play/pause state: a playing track keeps playing
    /// from the new position, a paused or stopped one stays put.
    ///
    /// @returns The position actually applied
    pub fn seek( &mut self, target_micros: i64 ) -> Result<u64, PlayerError> {
        let line = self.line.as_mut().ok_or( PlayerError::NoTrackLoaded )?;

        let duration = line.duration_micros();
        let position = target_micros.clamp( 0, duration.min( i64::MAX as u64 ) as i64 ) as u64;
        line.set_position_micros( position );

        match self.state {
            PlaybackState::Playing => {
                // The line may already have run out at the end
                if !line.is_running() {
                    line.start();
                }
            }
            PlaybackState::Paused => self.paused_position_micros = position,
            PlaybackState::Stopped | PlaybackState::Idle => {}
        }

        tracing::debug!( "Seek to {} ms", position / 1000 );
        Ok( position )
    }


    /// Sets the volume percentage, applying it to the open line.
    pub fn set_volume( &mut self, percent: u8 ) {
        self.volume = percent.min( 100 );
        if let Some( line ) = self.line.as_mut() {
            Self::apply_volume( line.as_mut(), self.volume );
        }
    }


    fn apply_volume( line: &mut dyn AudioLine, percent: u8 ) {
        if let Some( range ) = line.gain_range() {
            line.set_gain_db( range.gain_for_percent( percent ) );
        }
    }


    /// Classifies a stop notice.
    ///
    /// A notice for the current line that arrives while playing, with the
    /// line parked within the tolerance of its end, is a natural
    /// completion: the engine rewinds to Stopped and returns `Completed`.
    /// Any other stop while playing leaves the track paused where it was.
    pub fn handle_stop( &mut self, notice: StopNotice ) -> Option<EngineEvent> {
        if notice.generation != self.generation {
            tracing::debug!( "Ignoring stop from stale line {}", notice.generation );
            return None;
        }
        if self.state != PlaybackState::Playing {
            return None;
        }

        let line = self.line.as_mut()?;
        if line.is_running() {
            return None;
        }

        let duration = line.duration_micros();
        let position = line.position_micros();

        if duration > 0 && position.saturating_add( self.completion_tolerance_micros ) >= duration {
            line.set_position_micros( 0 );
            self.state = PlaybackState::Stopped;
            tracing::info!( "Track completed" );
            Some( EngineEvent::Completed )
        } else {
            tracing::warn!(
                "Line {} stopped unexpectedly at {} of {} ms; pausing",
                notice.generation,
                position / 1000,
                duration / 1000
            );
            self.paused_position_micros = position;
            self.state = PlaybackState::Paused;
            None
        }
    }


    /// Closes the line and returns to Idle.
    pub fn shutdown( &mut self ) {
        self.release();
    }


    fn release( &mut self ) {
        if let Some( mut line ) = self.line.take() {
            line.stop();
            tracing::debug!( "Released line {}", self.generation );
        }
        self.track = None;
        self.paused_position_micros = 0;
        self.state = PlaybackState::Idle;
    }


    /// Gets the current playback state.
    pub fn state( &self ) -> PlaybackState {
        self.state
    }


    /// Gets the loaded track, if any.
    pub fn track( &self ) -> Option<&Track> {
        self.track.as_ref()
    }


    /// Gets the volume percentage.
    pub fn volume( &self ) -> u8 {
        self.volume
    }


    /// Gets the generation of the current line (0 before the first load).
    pub fn generation( &self ) -> u64 {
        self.generation
    }


    /// Gets the play position in microseconds.
    pub fn position_micros( &self ) -> u64 {
        match ( self.state, self.line.as_ref() ) {
            ( PlaybackState::Paused, _ ) => self.paused_position_micros,
            ( _, Some( line ) ) => line.position_micros(),
            ( _, None ) => 0,
        }
    }


    /// Gets the loaded track's length in microseconds, 0 when idle.
    pub fn duration_micros( &self ) -> u64 {
        self.line.as_ref().map( |l| l.duration_micros() ).unwrap_or( 0 )
    }
}


impl<B: LineBackend> Drop for PlaybackEngine<B> {
    fn drop( &mut self ) {
        self.release();
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::testing::{ tracks, NoticeLog, ScriptedBackend, GAIN, TRACK_MICROS };


    fn engine() -> ( PlaybackEngine<ScriptedBackend>, ScriptedBackend, NoticeLog ) {
        let backend = ScriptedBackend::new();
        let log = NoticeLog::new();
        let engine = PlaybackEngine::new( backend.clone(), log.sink() );
        ( engine, backend, log )
    }


    fn loaded() -> ( PlaybackEngine<ScriptedBackend>, ScriptedBackend, NoticeLog ) {
        let ( mut engine, backend, log ) = engine();
        engine.load( &tracks( &[ "a.wav" ] )[ 0 ] ).unwrap();
        ( engine, backend, log )
    }


    fn deliver( engine: &mut PlaybackEngine<ScriptedBackend>, log: &NoticeLog ) -> Vec<EngineEvent> {
        log.drain().into_iter().filter_map( |n| engine.handle_stop( n ) ).collect()
    }


    #[test]
    fn test_load_parks_at_zero_without_playing() {
        let ( engine, backend, _ ) = loaded();
        assert_eq!( engine.state(), PlaybackState::Stopped );
        assert_eq!( engine.position_micros(), 0 );
        assert_eq!( engine.duration_micros(), TRACK_MICROS );
        assert!( !backend.is_running() );
        assert_eq!( backend.gain_db(), Some( GAIN.gain_for_percent( DEFAULT_VOLUME ) ) );
    }


    #[test]
    fn test_load_failure_releases_previous_line() {
        let ( mut engine, backend, _ ) = loaded();
        engine.play().unwrap();

        let err = engine.load( &tracks( &[ "broken.xyz" ] )[ 0 ] ).unwrap_err();
        assert!( matches!( err, PlayerError::UnsupportedFormat( _ ) ) );
        assert_eq!( engine.state(), PlaybackState::Idle );
        assert!( engine.track().is_none() );
        assert_eq!( backend.open_lines(), 0 );

        let err = engine.load( &tracks( &[ "missing.wav" ] )[ 0 ] ).unwrap_err();
        assert!( matches!( err, PlayerError::ResourceUnavailable( _ ) ) );
    }


    #[test]
    fn test_play_without_track_fails() {
        let ( mut engine, _, _ ) = engine();
        assert!( matches!( engine.play(), Err( PlayerError::NoTrackLoaded ) ) );
        assert!( matches!( engine.seek( 10 ), Err( PlayerError::NoTrackLoaded ) ) );
        engine.stop();
        engine.pause();
        assert_eq!( engine.state(), PlaybackState::Idle );
    }


    #[test]
    fn test_pause_then_play_resumes_from_paused_position() {
        let ( mut engine, backend, _ ) = loaded();
        engine.play().unwrap();
        backend.advance( 5_000_000 );

        engine.pause();
        assert_eq!( engine.state(), PlaybackState::Paused );
        let paused_at = engine.position_micros();
        assert_eq!( paused_at, 5_000_000 );
        assert!( !backend.is_running() );

        engine.play().unwrap();
        assert_eq!( engine.state(), PlaybackState::Playing );
        assert!( engine.position_micros() >= paused_at );
        backend.advance( 1_000_000 );
        assert_eq!( engine.position_micros(), 6_000_000 );
    }


    #[test]
    fn test_play_twice_is_noop() {
        let ( mut engine, backend, _ ) = loaded();
        engine.play().unwrap();
        backend.advance( 2_000_000 );
        engine.play().unwrap();
        assert_eq!( engine.position_micros(), 2_000_000 );
    }


    #[test]
    fn test_stop_rewinds() {
        let ( mut engine, backend, _ ) = loaded();
        engine.play().unwrap();
        backend.advance( 3_000_000 );
        engine.stop();
        assert_eq!( engine.state(), PlaybackState::Stopped );
        assert_eq!( engine.position_micros(), 0 );
        assert!( !backend.is_running() );
    }


    #[test]
    fn test_seek_clamps_to_track() {
        let ( mut engine, _, _ ) = loaded();
        assert_eq!( engine.seek( -50 ).unwrap(), 0 );
        assert_eq!( engine.position_micros(), 0 );
        assert_eq!( engine.seek( i64::MAX ).unwrap(), TRACK_MICROS );
        assert_eq!( engine.position_micros(), TRACK_MICROS );
    }


    #[test]
    fn test_seek_keeps_play_state() {
        let ( mut engine, backend, _ ) = loaded();

        engine.seek( 10_000_000 ).unwrap();
        assert_eq!( engine.state(), PlaybackState::Stopped );
        assert!( !backend.is_running() );

        engine.play().unwrap();
        assert_eq!( engine.position_micros(), 10_000_000 );

        engine.seek( 20_000_000 ).unwrap();
        assert_eq!( engine.state(), PlaybackState::Playing );
        assert!( backend.is_running() );

        engine.pause();
        engine.seek( 30_000_000 ).unwrap();
        assert_eq!( engine.state(), PlaybackState::Paused );
        assert!( !backend.is_running() );
        assert_eq!( engine.position_micros(), 30_000_000 );

        engine.play().unwrap();
        assert_eq!( backend.line_position(), 30_000_000 );
    }


    #[test]
    fn test_volume_changes_do_not_disturb_playback() {
        let ( mut engine, backend, _ ) = loaded();
        engine.play().unwrap();
        backend.advance( 4_000_000 );

        engine.set_volume( 0 );
        assert_eq!( backend.gain_db(), Some( GAIN.min_db ) );
        engine.set_volume( 100 );
        assert_eq!( backend.gain_db(), Some( GAIN.max_db ) );

        assert_eq!( engine.state(), PlaybackState::Playing );
        assert!( backend.is_running() );
        assert_eq!( engine.position_micros(), 4_000_000 );
    }


    #[test]
    fn test_volume_is_applied_on_next_load() {
        let ( mut engine, backend, _ ) = engine();
        engine.set_volume( 150 );
        assert_eq!( engine.volume(), 100 );
        engine.load( &tracks( &[ "a.wav" ] )[ 0 ] ).unwrap();
        assert_eq!( backend.gain_db(), Some( GAIN.max_db ) );
    }


    #[test]
    fn test_end_of_stream_completes() {
        let ( mut engine, backend, log ) = loaded();
        engine.play().unwrap();
        backend.finish();

        assert_eq!( deliver( &mut engine, &log ), vec![ EngineEvent::Completed ] );
        assert_eq!( engine.state(), PlaybackState::Stopped );
        assert_eq!( engine.position_micros(), 0 );
    }


    #[test]
    fn test_stop_within_tolerance_completes() {
        let ( mut engine, backend, log ) = loaded();
        engine.play().unwrap();
        backend.interrupt( TRACK_MICROS - 1_500 );
        assert_eq!( deliver( &mut engine, &log ), vec![ EngineEvent::Completed ] );
    }


    #[test]
    fn test_stop_short_of_end_pauses() {
        let ( mut engine, backend, log ) = loaded();
        engine.play().unwrap();
        backend.interrupt( TRACK_MICROS - 10_000 );

        assert!( deliver( &mut engine, &log ).is_empty() );
        assert_eq!( engine.state(), PlaybackState::Paused );
        assert_eq!( engine.position_micros(), TRACK_MICROS - 10_000 );
    }


    struct Captured( Arc<std::sync::Mutex<Vec<u8>>> );

    impl std::io::Write for Captured {
        fn write( &mut self, buf: &[u8] ) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice( buf );
            Ok( buf.len() )
        }

        fn flush( &mut self ) -> std::io::Result<()> {
            Ok( () )
        }
    }


    #[test]
    fn test_unexpected_stop_names_its_line() {
        let output = Arc::new( std::sync::Mutex::new( Vec::new() ) );
        let sink = Arc::clone( &output );
        let subscriber = tracing_subscriber::fmt()
            .with_writer( move || Captured( Arc::clone( &sink ) ) )
            .with_ansi( false )
            .finish();

        tracing::subscriber::with_default( subscriber, || {
            let ( mut engine, backend, log ) = loaded();
            engine.play().unwrap();
            backend.interrupt( 5_000_000 );
            assert!( deliver( &mut engine, &log ).is_empty() );
        } );

        let logged = String::from_utf8( output.lock().unwrap().clone() ).unwrap();
        assert!(
            logged.contains( "Line 1 stopped unexpectedly at 5000 of 180000 ms" ),
            "{}", logged
        );
    }


    #[test]
    fn test_commanded_stops_are_not_completions() {
        let ( mut engine, backend, log ) = loaded();
        engine.play().unwrap();
        backend.advance( TRACK_MICROS );
        engine.pause();
        assert!( deliver( &mut engine, &log ).is_empty() );

        engine.play().unwrap();
        engine.stop();
        assert!( deliver( &mut engine, &log ).is_empty() );
        assert_eq!( engine.state(), PlaybackState::Stopped );
    }


    #[test]
    fn test_stale_notice_is_ignored() {
        let ( mut engine, backend, log ) = loaded();
        engine.play().unwrap();
        backend.finish();
        let stale = log.drain();

        engine.load( &tracks( &[ "b.wav" ] )[ 0 ] ).unwrap();
        engine.play().unwrap();
        for notice in stale {
            assert_eq!( engine.handle_stop( notice ), None );
        }
        assert_eq!( engine.state(), PlaybackState::Playing );
    }


    #[test]
    fn test_seek_after_end_restarts_line() {
        let ( mut engine, backend, log ) = loaded();
        engine.play().unwrap();
        backend.finish();

        // User scrubs back before the notice is handled
        engine.seek( 1_000_000 ).unwrap();
        assert!( backend.is_running() );
        assert!( deliver( &mut engine, &log ).is_empty() );
        assert_eq!( engine.state(), PlaybackState::Playing );
    }


    #[test]
    fn test_shutdown_releases_line() {
        let ( mut engine, backend, _ ) = loaded();
        engine.play().unwrap();
        engine.shutdown();
        assert_eq!( engine.state(), PlaybackState::Idle );
        assert_eq!( backend.open_lines(), 0 );
    }
}
