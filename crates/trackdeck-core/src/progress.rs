//! Progress reporting
//!
//! Samples the engine once per tick while a track is active and turns the
//! raw microsecond position into a gauge value and `MM:SS` labels. Also
//! converts scrub input from the gauge back into a seek.

use std::time::{ Duration, Instant };

use crate::engine::{ PlaybackEngine, PlaybackState };
use crate::error::PlayerError;
use crate::line::LineBackend;


/// Gauge values run from 0 to this.
pub const PROGRESS_RANGE: u32 = 1000;

/// Default time between samples.
pub const TICK_INTERVAL: Duration = Duration::from_secs( 1 );


/// One progress sample.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct Progress {
    pub position_micros: u64,
    pub duration_micros: u64,
    /// Position on the 0..=PROGRESS_RANGE gauge
    pub value: u32,
    pub elapsed: String,
    pub total: String,
}


impl Progress {
    /// Builds a sample from a raw position and duration.
    pub fn new( position_micros: u64, duration_micros: u64 ) -> Self {
        Self {
            position_micros,
            duration_micros,
            value: normalize( position_micros, duration_micros ),
            elapsed: format_time( position_micros ),
            total: format_time( duration_micros ),
        }
    }


    /// Samples the engine.
    pub fn of<B: LineBackend>( engine: &PlaybackEngine<B> ) -> Self {
        Self::new( engine.position_micros(), engine.duration_micros() )
    }


    /// `MM:SS / MM:SS` label.
    pub fn label( &self ) -> String {
        format!( "{} / {}", self.elapsed, self.total )
    }
}


/// Maps a position onto the gauge, rounding to nearest. A zero duration
/// maps to 0.
pub fn normalize( position_micros: u64, duration_micros: u64 ) -> u32 {
    if duration_micros == 0 {
        return 0;
    }
    let ratio = position_micros as f64 / duration_micros as f64;
    ( ratio * PROGRESS_RANGE as f64 ).round().clamp( 0.0, PROGRESS_RANGE as f64 ) as u32
}


/// Maps a gauge value back to microseconds.
pub fn denormalize( value: u32, duration_micros: u64 ) -> i64 {
    let ratio = value.min( PROGRESS_RANGE ) as f64 / PROGRESS_RANGE as f64;
    ( ratio * duration_micros as f64 ) as i64
}


/// Formats microseconds as `MM:SS`. Minutes are not capped at 60.
pub fn format_time( micros: u64 ) -> String {
    let seconds = micros / 1_000_000;
    format!( "{:02}:{:02}", seconds / 60, seconds % 60 )
}


/// Tick scheduler for progress samples.
///
/// Runs while the engine is playing or paused, halts when it is stopped
/// or idle, and restarts whenever a new line is loaded.
pub struct ProgressReporter {
    interval: Duration,
    generation: u64,
    next_tick: Option<Instant>,
}


impl ProgressReporter {
    pub fn new( interval: Duration ) -> Self {
        Self {
            interval,
            generation: 0,
            next_tick: None,
        }
    }


    /// Starts or halts ticking to match the engine.
    ///
    /// @returns A sample to publish right away when ticking (re)starts
    pub fn sync<B: LineBackend>( &mut self, engine: &PlaybackEngine<B>, now: Instant ) -> Option<Progress> {
        match engine.state() {
            PlaybackState::Idle | PlaybackState::Stopped => {
                if self.next_tick.take().is_some() {
                    tracing::debug!( "Progress ticking halted" );
                }
                None
            }
            PlaybackState::Playing | PlaybackState::Paused => {
                if self.next_tick.is_some() && self.generation == engine.generation() {
                    return None;
                }
                self.generation = engine.generation();
                self.next_tick = Some( now + self.interval );
                tracing::debug!( "Progress ticking started for line {}", self.generation );
                Some( Progress::of( engine ) )
            }
        }
    }


    /// Samples the engine if a tick is due.
    pub fn tick<B: LineBackend>( &mut self, engine: &PlaybackEngine<B>, now: Instant ) -> Option<Progress> {
        let due = self.next_tick?;
        if now < due {
            return None;
        }

        // Skip missed ticks rather than bursting
        let next = due + self.interval;
        self.next_tick = Some( if next > now { next } else { now + self.interval } );
        Some( Progress::of( engine ) )
    }


    /// Time left until the next tick, None while halted.
    pub fn time_until_tick( &self, now: Instant ) -> Option<Duration> {
        self.next_tick.map( |t| t.saturating_duration_since( now ) )
    }


    /// Returns true while ticking.
    pub fn is_running( &self ) -> bool {
        self.next_tick.is_some()
    }


    /// Seeks to a gauge value and returns the resulting sample.
    pub fn scrub<B: LineBackend>( &self, engine: &mut PlaybackEngine<B>, value: u32 ) -> Result<Progress, PlayerError> {
        let target = denormalize( value, engine.duration_micros() );
        engine.seek( target )?;
        Ok( Progress::of( engine ) )
    }
}


impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new( TICK_INTERVAL )
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::testing::{ tracks, NoticeLog, ScriptedBackend, TRACK_MICROS };


    fn loaded() -> ( PlaybackEngine<ScriptedBackend>, ScriptedBackend ) {
        let backend = ScriptedBackend::new();
        let mut engine = PlaybackEngine::new( backend.clone(), NoticeLog::new().sink() );
        engine.load( &tracks( &[ "a.wav" ] )[ 0 ] ).unwrap();
        ( engine, backend )
    }


    #[test]
    fn test_format_time() {
        assert_eq!( format_time( 0 ), "00:00" );
        assert_eq!( format_time( 65_900_000 ), "01:05" );
        assert_eq!( format_time( 3_725_000_000 ), "62:05" );
    }


    #[test]
    fn test_normalize_rounds_and_guards_zero() {
        assert_eq!( normalize( 0, 0 ), 0 );
        assert_eq!( normalize( 500, 0 ), 0 );
        assert_eq!( normalize( 1, 3 ), 333 );
        assert_eq!( normalize( 2, 3 ), 667 );
        assert_eq!( normalize( 10, 10 ), PROGRESS_RANGE );
        assert_eq!( normalize( 20, 10 ), PROGRESS_RANGE );
    }


    #[test]
    fn test_denormalize() {
        assert_eq!( denormalize( 0, TRACK_MICROS ), 0 );
        assert_eq!( denormalize( 500, TRACK_MICROS ), 90_000_000 );
        assert_eq!( denormalize( 5000, TRACK_MICROS ), TRACK_MICROS as i64 );
    }


    #[test]
    fn test_label() {
        let progress = Progress::new( 61_000_000, 180_000_000 );
        assert_eq!( progress.label(), "01:01 / 03:00" );
    }


    #[test]
    fn test_ticks_only_while_active() {
        let ( mut engine, backend ) = loaded();
        let mut reporter = ProgressReporter::default();
        let t0 = Instant::now();

        assert_eq!( reporter.sync( &engine, t0 ), None );
        assert!( !reporter.is_running() );

        engine.play().unwrap();
        let first = reporter.sync( &engine, t0 ).unwrap();
        assert_eq!( first.value, 0 );
        assert_eq!( reporter.time_until_tick( t0 ), Some( TICK_INTERVAL ) );

        // Not due yet
        assert_eq!( reporter.tick( &engine, t0 + Duration::from_millis( 400 ) ), None );

        backend.advance( 90_000_000 );
        let sample = reporter.tick( &engine, t0 + TICK_INTERVAL ).unwrap();
        assert_eq!( sample.value, 500 );
        assert_eq!( sample.elapsed, "01:30" );
        assert_eq!( sample.total, "03:00" );

        engine.pause();
        assert_eq!( reporter.sync( &engine, t0 + TICK_INTERVAL ), None );
        assert!( reporter.is_running() );

        engine.stop();
        assert_eq!( reporter.sync( &engine, t0 + TICK_INTERVAL ), None );
        assert!( !reporter.is_running() );
        assert_eq!( reporter.tick( &engine, t0 + TICK_INTERVAL * 5 ), None );
    }


    #[test]
    fn test_restarts_on_new_load() {
        let ( mut engine, _ ) = loaded();
        let mut reporter = ProgressReporter::default();
        let t0 = Instant::now();

        engine.play().unwrap();
        assert!( reporter.sync( &engine, t0 ).is_some() );
        assert!( reporter.sync( &engine, t0 ).is_none() );

        engine.load( &tracks( &[ "b.wav" ] )[ 0 ] ).unwrap();
        engine.play().unwrap();
        let later = t0 + Duration::from_millis( 700 );
        assert!( reporter.sync( &engine, later ).is_some() );
        assert_eq!( reporter.time_until_tick( later ), Some( TICK_INTERVAL ) );
    }


    #[test]
    fn test_missed_ticks_do_not_burst() {
        let ( mut engine, _ ) = loaded();
        let mut reporter = ProgressReporter::default();
        let t0 = Instant::now();
        engine.play().unwrap();
        reporter.sync( &engine, t0 );

        let late = t0 + TICK_INTERVAL * 5;
        assert!( reporter.tick( &engine, late ).is_some() );
        assert!( reporter.tick( &engine, late ).is_none() );
    }


    #[test]
    fn test_scrub_seeks_without_starting() {
        let ( mut engine, backend ) = loaded();
        let reporter = ProgressReporter::default();

        let progress = reporter.scrub( &mut engine, 250 ).unwrap();
        assert_eq!( progress.position_micros, 45_000_000 );
        assert_eq!( progress.value, 250 );
        assert_eq!( engine.state(), PlaybackState::Stopped );
        assert!( !backend.is_running() );
    }


    #[test]
    fn test_scrub_while_playing_keeps_playing() {
        let ( mut engine, backend ) = loaded();
        let reporter = ProgressReporter::default();
        engine.play().unwrap();

        reporter.scrub( &mut engine, 1000 ).unwrap();
        assert_eq!( engine.position_micros(), TRACK_MICROS );
        assert!( backend.is_running() );
        assert_eq!( engine.state(), PlaybackState::Playing );
    }


    #[test]
    fn test_scrub_without_track_fails() {
        let backend = ScriptedBackend::new();
        let mut engine = PlaybackEngine::new( backend, NoticeLog::new().sink() );
        let reporter = ProgressReporter::default();
        assert!( matches!( reporter.scrub( &mut engine, 10 ), Err( PlayerError::NoTrackLoaded ) ) );
    }
}
