//! Playlist controller
//!
//! Navigation and playlist mutation on top of the playback engine. The
//! controller is the only writer of the current-track cursor and the only
//! consumer of the engine's completion events.

use rand::rngs::StdRng;
use rand::{ Rng, RngCore, SeedableRng };

use crate::engine::{ EngineEvent, PlaybackEngine, PlaybackState, StopNotice };
use crate::error::PlayerError;
use crate::line::LineBackend;
use crate::player::PlayerEvent;
use crate::playlist::{ Playlist, Removal };
use crate::track::Track;


/// Coordinates the playlist cursor with the engine.
pub struct PlaylistController<B: LineBackend> {
    playlist: Playlist,
    engine: PlaybackEngine<B>,
    rng: Box<dyn RngCore + Send>,
    /// Events raised since the last drain
    events: Vec<PlayerEvent>,
}


impl<B: LineBackend> PlaylistController<B> {
    /// Creates a controller with an empty playlist.
    pub fn new( engine: PlaybackEngine<B> ) -> Self {
        Self {
            playlist: Playlist::new(),
            engine,
            rng: Box::new( StdRng::from_entropy() ),
            events: Vec::new(),
        }
    }


    /// Replaces the random source used by `shuffle`.
    pub fn with_rng( mut self, rng: impl RngCore + Send + 'static ) -> Self {
        self.rng = Box::new( rng );
        self
    }


    /// Loads and plays the track at `index`.
    ///
    /// The cursor moves to `index` before loading, so a track that fails
    /// to open still ends up selected.
    pub fn play_at( &mut self, index: usize ) -> Result<(), PlayerError> {
        if self.playlist.is_empty() {
            return Err( PlayerError::EmptyPlaylist );
        }
        let track = self.playlist
            .get( index )
            .cloned()
            .ok_or( PlayerError::IndexOutOfRange { index, len: self.playlist.len() } )?;

        self.playlist.set_current( Some( index ) );
        self.engine.load( &track )?;
        self.engine.play()?;

        self.events.push( PlayerEvent::TrackStarted { index, track } );
        Ok(())
    }


    /// Plays the next track, wrapping. No-op on an empty playlist.
    pub fn next( &mut self ) -> Result<(), PlayerError> {
        match self.playlist.next_index() {
            Some( index ) => self.play_at( index ),
            None => Ok(()),
        }
    }


    /// Plays the previous track, wrapping. No-op on an empty playlist.
    pub fn previous( &mut self ) -> Result<(), PlayerError> {
        match self.playlist.previous_index() {
            Some( index ) => self.play_at( index ),
            None => Ok(()),
        }
    }


    /// Plays a uniformly random track. The current one may come up again.
    pub fn shuffle( &mut self ) -> Result<(), PlayerError> {
        if self.playlist.is_empty() {
            return Ok(());
        }
        let index = self.rng.gen_range( 0..self.playlist.len() );
        self.play_at( index )
    }


    /// Flips repeat mode. Playback is not affected.
    pub fn toggle_repeat( &mut self ) -> bool {
        let repeat = self.playlist.toggle_repeat();
        tracing::info!( "Repeat {}", if repeat { "on" } else { "off" } );
        repeat
    }


    /// Sets repeat mode.
    pub fn set_repeat( &mut self, repeat: bool ) {
        self.playlist.set_repeat( repeat );
    }


    /// Handles a line stop notice. A natural completion replays the
    /// current track with repeat on, and advances otherwise.
    pub fn handle_stop( &mut self, notice: StopNotice ) -> Result<(), PlayerError> {
        match self.engine.handle_stop( notice ) {
            Some( EngineEvent::Completed ) => {
                if self.playlist.repeat() {
                    match self.playlist.current_index() {
                        Some( index ) => self.play_at( index ),
                        None => Ok(()),
                    }
                } else {
                    self.next()
                }
            }
            None => Ok(()),
        }
    }


    /// The play button: resumes a paused track, otherwise plays the
    /// selection, the current track, or the first track.
    pub fn play_or_resume( &mut self, selection: Option<usize> ) -> Result<(), PlayerError> {
        let current = self.playlist.current_index();
        if self.engine.state() == PlaybackState::Paused && ( selection.is_none() || selection == current ) {
            return self.engine.play();
        }

        let index = selection
            .or( current )
            .or( if self.playlist.is_empty() { None } else { Some( 0 ) } )
            .ok_or( PlayerError::EmptyPlaylist )?;
        self.play_at( index )
    }


    /// The pause button: pauses while playing, resumes otherwise.
    pub fn toggle_pause( &mut self ) -> Result<(), PlayerError> {
        match self.engine.state() {
            PlaybackState::Playing => {
                self.engine.pause();
                Ok(())
            }
            PlaybackState::Paused | PlaybackState::Stopped => self.engine.play(),
            PlaybackState::Idle => Ok(()),
        }
    }


    /// Appends tracks to the playlist and its snapshot.
    pub fn add( &mut self, tracks: Vec<Track> ) {
        if tracks.is_empty() {
            return;
        }
        tracing::info!( "Adding {} tracks", tracks.len() );
        self.playlist.add_many( tracks );
        self.events.push( PlayerEvent::PlaylistChanged );
    }


    /// Removes tracks by index, stopping playback if the current track
    /// goes.
    pub fn remove( &mut self, indices: &[usize] ) -> Vec<Track> {
        let Removal { removed, current_removed } = self.playlist.remove( indices );
        if current_removed {
            self.engine.stop();
        }
        if !removed.is_empty() {
            self.events.push( PlayerEvent::PlaylistChanged );
        }
        removed
    }


    /// Restores the unfiltered playlist.
    pub fn reset( &mut self ) {
        self.playlist.reset();
        self.events.push( PlayerEvent::PlaylistChanged );
    }


    /// Narrows the visible playlist to tracks matching `query`. The cursor
    /// keeps pointing at the same track, so a completion advances from it;
    /// if that track is filtered out the cursor is cleared.
    pub fn filter( &mut self, query: &str ) -> usize {
        let count = self.playlist.filter( query );
        self.events.push( PlayerEvent::PlaylistChanged );
        count
    }


    /// Replaces the playlist with a loaded one. Playback stops.
    pub fn replace_all( &mut self, tracks: Vec<Track> ) {
        self.engine.stop();
        self.playlist.replace_all( tracks );
        self.events.push( PlayerEvent::PlaylistChanged );
    }


    /// Shows search results from the store, keeping the snapshot.
    pub fn show_results( &mut self, tracks: Vec<Track> ) -> usize {
        self.playlist.show( tracks );
        self.events.push( PlayerEvent::PlaylistChanged );
        self.playlist.len()
    }


    /// Gets the playlist.
    pub fn playlist( &self ) -> &Playlist {
        &self.playlist
    }


    /// Gets the engine.
    pub fn engine( &self ) -> &PlaybackEngine<B> {
        &self.engine
    }


    /// Gets the engine for direct transport commands.
    pub fn engine_mut( &mut self ) -> &mut PlaybackEngine<B> {
        &mut self.engine
    }


    /// Takes the events raised since the last call.
    pub fn drain_events( &mut self ) -> Vec<PlayerEvent> {
        std::mem::take( &mut self.events )
    }


    /// Stops playback and releases the line.
    pub fn shutdown( &mut self ) {
        self.engine.shutdown();
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::testing::{ tracks, NoticeLog, ScriptedBackend };


    struct Harness {
        controller: PlaylistController<ScriptedBackend>,
        backend: ScriptedBackend,
        log: NoticeLog,
    }


    impl Harness {
        fn new( names: &[&str] ) -> Self {
            let backend = ScriptedBackend::new();
            let log = NoticeLog::new();
            let engine = PlaybackEngine::new( backend.clone(), log.sink() );
            let mut controller = PlaylistController::new( engine ).with_rng( StdRng::seed_from_u64( 7 ) );
            controller.add( tracks( names ) );
            Self { controller, backend, log }
        }


        fn deliver( &mut self ) {
            for notice in self.log.drain() {
                self.controller.handle_stop( notice ).unwrap();
            }
        }


        fn current( &self ) -> Option<usize> {
            self.controller.playlist().current_index()
        }


        fn state( &self ) -> PlaybackState {
            self.controller.engine().state()
        }
    }


    #[test]
    fn test_play_at_loads_and_plays() {
        let mut h = Harness::new( &[ "a", "b", "c" ] );
        h.controller.play_at( 1 ).unwrap();
        assert_eq!( h.current(), Some( 1 ) );
        assert_eq!( h.state(), PlaybackState::Playing );
        assert_eq!( h.backend.opened(), vec![ "b" ] );
    }


    #[test]
    fn test_play_at_bounds() {
        let mut h = Harness::new( &[ "a" ] );
        assert!( matches!(
            h.controller.play_at( 3 ),
            Err( PlayerError::IndexOutOfRange { index: 3, len: 1 } )
        ));
        assert_eq!( h.current(), None );

        let mut empty = Harness::new( &[] );
        assert!( matches!( empty.controller.play_at( 0 ), Err( PlayerError::EmptyPlaylist ) ) );
    }


    #[test]
    fn test_play_at_failure_leaves_engine_idle() {
        let mut h = Harness::new( &[ "a", "broken" ] );
        h.controller.play_at( 0 ).unwrap();
        assert!( matches!( h.controller.play_at( 1 ), Err( PlayerError::UnsupportedFormat( _ ) ) ) );
        assert_eq!( h.state(), PlaybackState::Idle );
        assert_eq!( h.current(), Some( 1 ) );
        assert_eq!( h.backend.open_lines(), 0 );
    }


    #[test]
    fn test_next_previous_on_empty_playlist() {
        let mut h = Harness::new( &[] );
        h.controller.next().unwrap();
        h.controller.previous().unwrap();
        h.controller.shuffle().unwrap();
        assert_eq!( h.current(), None );
        assert_eq!( h.state(), PlaybackState::Idle );
    }


    #[test]
    fn test_next_and_previous_wrap() {
        let mut h = Harness::new( &[ "a", "b", "c" ] );
        h.controller.play_at( 2 ).unwrap();
        h.controller.next().unwrap();
        assert_eq!( h.current(), Some( 0 ) );
        h.controller.previous().unwrap();
        assert_eq!( h.current(), Some( 2 ) );
        h.controller.previous().unwrap();
        assert_eq!( h.current(), Some( 1 ) );
    }


    #[test]
    fn test_completion_without_repeat_advances_with_wrap() {
        let mut h = Harness::new( &[ "A", "B", "C" ] );
        h.controller.play_at( 2 ).unwrap();
        h.backend.finish();
        h.deliver();

        assert_eq!( h.current(), Some( 0 ) );
        assert_eq!( h.state(), PlaybackState::Playing );
        assert_eq!( h.backend.opened(), vec![ "C", "A" ] );
    }


    #[test]
    fn test_completion_with_repeat_replays() {
        let mut h = Harness::new( &[ "A", "B", "C" ] );
        assert!( h.controller.toggle_repeat() );
        h.controller.play_at( 1 ).unwrap();
        h.backend.finish();
        h.deliver();

        assert_eq!( h.current(), Some( 1 ) );
        assert_eq!( h.state(), PlaybackState::Playing );
        assert_eq!( h.backend.opened(), vec![ "B", "B" ] );
        assert_eq!( h.controller.engine().position_micros(), 0 );
    }


    #[test]
    fn test_toggle_repeat_does_not_touch_playback() {
        let mut h = Harness::new( &[ "A" ] );
        h.controller.play_at( 0 ).unwrap();
        h.backend.advance( 1_000_000 );
        h.controller.toggle_repeat();
        assert_eq!( h.state(), PlaybackState::Playing );
        assert_eq!( h.controller.engine().position_micros(), 1_000_000 );
    }


    #[test]
    fn test_manual_stop_does_not_advance() {
        let mut h = Harness::new( &[ "A", "B" ] );
        h.controller.play_at( 0 ).unwrap();
        h.backend.advance( 1_000_000 );
        h.controller.engine_mut().stop();
        h.deliver();
        assert_eq!( h.current(), Some( 0 ) );
        assert_eq!( h.backend.opened(), vec![ "A" ] );
    }


    #[test]
    fn test_user_skip_beats_pending_completion() {
        let mut h = Harness::new( &[ "A", "B", "C" ] );
        h.controller.play_at( 0 ).unwrap();
        h.backend.finish();

        // The user presses next before the notice is handled
        h.controller.next().unwrap();
        h.deliver();

        assert_eq!( h.current(), Some( 1 ) );
        assert_eq!( h.backend.opened(), vec![ "A", "B" ] );
    }


    #[test]
    fn test_shuffle_plays_a_valid_index() {
        let mut h = Harness::new( &[ "a", "b", "c", "d" ] );
        for _ in 0..20 {
            h.controller.shuffle().unwrap();
            assert!( h.current().is_some_and( |i| i < 4 ) );
            assert_eq!( h.state(), PlaybackState::Playing );
        }
    }


    #[test]
    fn test_remove_current_stops_playback() {
        let mut h = Harness::new( &[ "a", "b", "c" ] );
        h.controller.play_at( 1 ).unwrap();
        let removed = h.controller.remove( &[ 1 ] );
        assert_eq!( removed.len(), 1 );
        assert_eq!( h.current(), None );
        assert_eq!( h.state(), PlaybackState::Stopped );
        assert!( !h.backend.is_running() );
    }


    #[test]
    fn test_remove_below_current_keeps_playing() {
        let mut h = Harness::new( &[ "a", "b", "c", "d" ] );
        h.controller.play_at( 3 ).unwrap();
        h.controller.remove( &[ 0, 1 ] );
        assert_eq!( h.current(), Some( 1 ) );
        assert_eq!( h.controller.playlist().current().unwrap().display_name(), "d" );
        assert_eq!( h.state(), PlaybackState::Playing );
    }


    #[test]
    fn test_play_or_resume() {
        let mut h = Harness::new( &[ "a", "b" ] );
        h.controller.play_or_resume( None ).unwrap();
        assert_eq!( h.current(), Some( 0 ) );

        h.backend.advance( 2_000_000 );
        h.controller.toggle_pause().unwrap();
        assert_eq!( h.state(), PlaybackState::Paused );

        h.controller.play_or_resume( None ).unwrap();
        assert_eq!( h.state(), PlaybackState::Playing );
        assert_eq!( h.controller.engine().position_micros(), 2_000_000 );
        assert_eq!( h.backend.opened(), vec![ "a" ] );

        h.controller.play_or_resume( Some( 1 ) ).unwrap();
        assert_eq!( h.current(), Some( 1 ) );

        let mut empty = Harness::new( &[] );
        assert!( matches!( empty.controller.play_or_resume( None ), Err( PlayerError::EmptyPlaylist ) ) );
    }


    #[test]
    fn test_toggle_pause_round_trip() {
        let mut h = Harness::new( &[ "a" ] );
        h.controller.toggle_pause().unwrap();
        assert_eq!( h.state(), PlaybackState::Idle );

        h.controller.play_at( 0 ).unwrap();
        h.backend.advance( 3_000_000 );
        h.controller.toggle_pause().unwrap();
        h.controller.toggle_pause().unwrap();
        assert_eq!( h.state(), PlaybackState::Playing );
        assert_eq!( h.controller.engine().position_micros(), 3_000_000 );
    }


    #[test]
    fn test_filter_then_reset() {
        let mut h = Harness::new( &[ "Abba - Song", "Crab Walk", "Tune" ] );
        assert_eq!( h.controller.filter( "ab" ), 2 );
        h.controller.reset();
        let names: Vec<_> = h.controller.playlist().tracks().iter().map( |t| t.display_name() ).collect();
        assert_eq!( names, vec![ "Abba - Song", "Crab Walk", "Tune" ] );
    }


    #[test]
    fn test_replace_all_stops_playback() {
        let mut h = Harness::new( &[ "a" ] );
        h.controller.play_at( 0 ).unwrap();
        h.controller.replace_all( tracks( &[ "x", "y" ] ) );
        assert_eq!( h.state(), PlaybackState::Stopped );
        assert_eq!( h.current(), None );
        assert_eq!( h.controller.playlist().pristine().len(), 2 );
    }


    #[test]
    fn test_events_are_drained() {
        let mut h = Harness::new( &[ "a" ] );
        h.controller.drain_events();
        h.controller.play_at( 0 ).unwrap();
        let events = h.controller.drain_events();
        assert!( matches!( events.as_slice(), [ PlayerEvent::TrackStarted { index: 0, .. } ] ) );
        assert!( h.controller.drain_events().is_empty() );
    }
}
