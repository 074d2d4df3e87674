//! Playlist model
//!
//! Holds the working track list shown to the user, the pristine snapshot
//! it can be reset to, the current-track cursor and the repeat flag.
//! Nothing here touches playback; the controller drives that.

use crate::track::Track;


/// Result of a batch removal.
#[derive( Debug, Clone, Default, PartialEq, Eq )]
pub struct Removal {
    /// Removed tracks, highest index first.
    pub removed: Vec<Track>,
    /// True if the current track was among them.
    pub current_removed: bool,
}


/// Working playlist plus its pristine snapshot.
#[derive( Debug, Default )]
pub struct Playlist {
    tracks: Vec<Track>,
    /// Snapshot slot each working entry came from, if any
    origins: Vec<Option<usize>>,
    pristine: Vec<Track>,
    current_index: Option<usize>,
    repeat: bool,
}


impl Playlist {
    /// Creates a new empty playlist.
    pub fn new() -> Self {
        Self::default()
    }


    /// Appends tracks to both the working list and the snapshot.
    pub fn add_many( &mut self, tracks: impl IntoIterator<Item = Track> ) {
        for track in tracks {
            self.origins.push( Some( self.pristine.len() ) );
            self.pristine.push( track.clone() );
            self.tracks.push( track );
        }
    }


    /// Replaces everything, e.g. after loading a saved playlist. The
    /// cursor is cleared.
    pub fn replace_all( &mut self, tracks: Vec<Track> ) {
        self.origins = ( 0..tracks.len() ).map( Some ).collect();
        self.pristine = tracks.clone();
        self.tracks = tracks;
        self.current_index = None;
    }


    /// Removes the tracks at `indices` from the working list.
    ///
    /// Indices are processed highest first so earlier ones stay valid;
    /// duplicates and out-of-range values are ignored. The cursor follows
    /// its track, or is cleared if that track goes. Each removed entry is
    /// also dropped from the snapshot, at the slot it was listed from, so
    /// other copies of the same file survive a reset.
    pub fn remove( &mut self, indices: &[usize] ) -> Removal {
        let mut indices: Vec<usize> = indices.iter()
            .copied()
            .filter( |&i| i < self.tracks.len() )
            .collect();
        indices.sort_unstable_by( |a, b| b.cmp( a ) );
        indices.dedup();

        let mut removal = Removal::default();

        for index in indices {
            let track = self.tracks.remove( index );
            let origin = self.origins.remove( index );

            match self.current_index {
                Some( current ) if current == index => {
                    self.current_index = None;
                    removal.current_removed = true;
                }
                Some( current ) if current > index => {
                    self.current_index = Some( current - 1 );
                }
                _ => {}
            }

            if let Some( slot ) = origin {
                self.pristine.remove( slot );
                for other in self.origins.iter_mut().flatten() {
                    if *other > slot {
                        *other -= 1;
                    }
                }
            }

            removal.removed.push( track );
        }

        removal
    }


    /// Restores the working list from the snapshot.
    pub fn reset( &mut self ) {
        let origins: Vec<Option<usize>> = ( 0..self.pristine.len() ).map( Some ).collect();
        self.replace_view( self.pristine.clone(), origins );
    }


    /// Narrows the working list to tracks matching `query`. The snapshot
    /// is left alone; a blank query resets instead.
    ///
    /// The cursor stays on the track it pointed at, wherever that lands in
    /// the new view, and is cleared if the track is filtered out.
    ///
    /// @returns The number of matches
    pub fn filter( &mut self, query: &str ) -> usize {
        if query.trim().is_empty() {
            self.reset();
        } else {
            let ( origins, tracks ): ( Vec<Option<usize>>, Vec<Track> ) = self.pristine
                .iter()
                .enumerate()
                .filter( |( _, t )| t.matches( query ) )
                .map( |( i, t )| ( Some( i ), t.clone() ) )
                .unzip();
            self.replace_view( tracks, origins );
        }
        self.tracks.len()
    }


    /// Shows an externally produced result list (a store search) without
    /// touching the snapshot. Results are matched to snapshot entries by
    /// path, each entry claimed once.
    pub fn show( &mut self, tracks: Vec<Track> ) {
        let mut claimed = vec![ false; self.pristine.len() ];
        let origins: Vec<Option<usize>> = tracks.iter()
            .map( |track| {
                let slot = ( 0..self.pristine.len() )
                    .find( |&i| !claimed[ i ] && self.pristine[ i ] == *track )?;
                claimed[ slot ] = true;
                Some( slot )
            })
            .collect();
        self.replace_view( tracks, origins );
    }


    /// Swaps in a new working list, carrying the cursor over to the same
    /// snapshot entry.
    fn replace_view( &mut self, tracks: Vec<Track>, origins: Vec<Option<usize>> ) {
        let current = self.current_index.and_then( |i| self.origins.get( i ).copied().flatten() );

        self.tracks = tracks;
        self.origins = origins;
        self.current_index = current.and_then( |slot| self.origins.iter().position( |o| *o == Some( slot ) ) );
    }


    /// Index after the cursor, wrapping. None when empty.
    pub fn next_index( &self ) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }
        Some( match self.current_index {
            Some( current ) => ( current + 1 ) % len,
            None => 0,
        })
    }


    /// Index before the cursor, wrapping. None when empty.
    pub fn previous_index( &self ) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }
        Some( match self.current_index {
            Some( current ) => ( current + len - 1 ) % len,
            None => len - 1,
        })
    }


    /// Moves the cursor. Out-of-range values clear it.
    pub fn set_current( &mut self, index: Option<usize> ) {
        self.current_index = index.filter( |&i| i < self.tracks.len() );
    }


    /// Gets the current track index.
    pub fn current_index( &self ) -> Option<usize> {
        self.current_index
    }


    /// Gets the current track.
    pub fn current( &self ) -> Option<&Track> {
        self.current_index.and_then( |i| self.tracks.get( i ) )
    }


    /// Gets the track at `index`.
    pub fn get( &self, index: usize ) -> Option<&Track> {
        self.tracks.get( index )
    }


    /// Flips repeat and returns the new value.
    pub fn toggle_repeat( &mut self ) -> bool {
        self.repeat = !self.repeat;
        self.repeat
    }


    /// Sets repeat mode.
    pub fn set_repeat( &mut self, repeat: bool ) {
        self.repeat = repeat;
    }


    /// Gets repeat mode.
    pub fn repeat( &self ) -> bool {
        self.repeat
    }


    /// Gets the working list.
    pub fn tracks( &self ) -> &[Track] {
        &self.tracks
    }


    /// Gets the snapshot `reset` restores.
    pub fn pristine( &self ) -> &[Track] {
        &self.pristine
    }


    /// Gets the number of tracks in the working list.
    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    /// Returns true if the working list is empty.
    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::testing::tracks;


    fn playlist( names: &[&str] ) -> Playlist {
        let mut playlist = Playlist::new();
        playlist.add_many( tracks( names ) );
        playlist
    }


    fn names( playlist: &Playlist ) -> Vec<&str> {
        playlist.tracks().iter().map( |t| t.display_name() ).collect()
    }


    #[test]
    fn test_next_then_previous_round_trips() {
        for len in 1..6 {
            let all: Vec<String> = ( 0..len ).map( |i| format!( "t{}", i ) ).collect();
            let refs: Vec<&str> = all.iter().map( |s| s.as_str() ).collect();
            let mut playlist = playlist( &refs );

            for start in 0..len {
                playlist.set_current( Some( start ) );
                playlist.set_current( playlist.next_index() );
                playlist.set_current( playlist.previous_index() );
                assert_eq!( playlist.current_index(), Some( start ) );

                playlist.set_current( playlist.previous_index() );
                playlist.set_current( playlist.next_index() );
                assert_eq!( playlist.current_index(), Some( start ) );
            }
        }
    }


    #[test]
    fn test_navigation_wraps() {
        let mut playlist = playlist( &[ "a", "b", "c" ] );
        playlist.set_current( Some( 2 ) );
        assert_eq!( playlist.next_index(), Some( 0 ) );
        playlist.set_current( Some( 0 ) );
        assert_eq!( playlist.previous_index(), Some( 2 ) );
    }


    #[test]
    fn test_navigation_without_cursor() {
        let playlist = playlist( &[ "a", "b", "c" ] );
        assert_eq!( playlist.next_index(), Some( 0 ) );
        assert_eq!( playlist.previous_index(), Some( 2 ) );
        assert_eq!( Playlist::new().next_index(), None );
        assert_eq!( Playlist::new().previous_index(), None );
    }


    #[test]
    fn test_remove_current_clears_cursor() {
        let mut playlist = playlist( &[ "a", "b", "c" ] );
        playlist.set_current( Some( 1 ) );
        let removal = playlist.remove( &[ 1 ] );
        assert!( removal.current_removed );
        assert_eq!( playlist.current_index(), None );
        assert_eq!( names( &playlist ), vec![ "a", "c" ] );
    }


    #[test]
    fn test_remove_below_cursor_shifts_it() {
        let mut playlist = playlist( &[ "a", "b", "c", "d", "e" ] );
        playlist.set_current( Some( 4 ) );
        let removal = playlist.remove( &[ 0, 2 ] );
        assert!( !removal.current_removed );
        assert_eq!( playlist.current_index(), Some( 2 ) );
        assert_eq!( playlist.current().unwrap().display_name(), "e" );
        assert_eq!( removal.removed.len(), 2 );
        assert_eq!( removal.removed[ 0 ].display_name(), "c" );
    }


    #[test]
    fn test_remove_ignores_bad_indices() {
        let mut playlist = playlist( &[ "a", "b" ] );
        playlist.set_current( Some( 1 ) );
        let removal = playlist.remove( &[ 0, 0, 7 ] );
        assert_eq!( removal.removed.len(), 1 );
        assert_eq!( playlist.current_index(), Some( 0 ) );
    }


    #[test]
    fn test_remove_drops_from_snapshot() {
        let mut playlist = playlist( &[ "a", "b", "c" ] );
        playlist.remove( &[ 1 ] );
        playlist.reset();
        assert_eq!( names( &playlist ), vec![ "a", "c" ] );
    }


    #[test]
    fn test_filter_and_reset() {
        let mut playlist = playlist( &[ "Abba - Song", "Crab Walk", "Tune" ] );
        assert_eq!( playlist.filter( "ab" ), 2 );
        assert_eq!( names( &playlist ), vec![ "Abba - Song", "Crab Walk" ] );
        assert_eq!( playlist.pristine().len(), 3 );

        playlist.reset();
        assert_eq!( names( &playlist ), vec![ "Abba - Song", "Crab Walk", "Tune" ] );
    }


    #[test]
    fn test_filter_with_blank_query_resets() {
        let mut playlist = playlist( &[ "a", "b" ] );
        playlist.filter( "a" );
        assert_eq!( playlist.filter( "  " ), 2 );
    }


    #[test]
    fn test_filter_clears_cursor_of_hidden_track() {
        let mut playlist = playlist( &[ "Abba", "Crab", "Tune" ] );
        playlist.set_current( Some( 2 ) );
        playlist.filter( "ab" );
        assert_eq!( playlist.current_index(), None );

        playlist.set_current( Some( 1 ) );
        playlist.reset();
        assert_eq!( playlist.current_index(), Some( 1 ) );
    }


    #[test]
    fn test_cursor_follows_its_track_through_filter_and_reset() {
        let mut playlist = playlist( &[ "Abba", "Crab Walk", "Tune" ] );
        playlist.set_current( Some( 0 ) );
        playlist.filter( "crab" );
        assert_eq!( playlist.current_index(), None );

        playlist.reset();
        playlist.set_current( Some( 1 ) );
        playlist.filter( "crab" );
        assert_eq!( playlist.current_index(), Some( 0 ) );
        assert_eq!( playlist.current().unwrap().display_name(), "Crab Walk" );

        playlist.reset();
        assert_eq!( playlist.current_index(), Some( 1 ) );
    }


    #[test]
    fn test_removing_a_duplicate_keeps_the_other_copy_in_place() {
        let mut playlist = playlist( &[ "a", "b", "a" ] );
        playlist.remove( &[ 2 ] );
        assert_eq!( names( &playlist ), vec![ "a", "b" ] );

        playlist.reset();
        assert_eq!( names( &playlist ), vec![ "a", "b" ] );
    }


    #[test]
    fn test_removing_from_a_filtered_view_drops_that_snapshot_slot() {
        let mut playlist = playlist( &[ "a", "b", "a", "c" ] );
        playlist.filter( "a" );
        playlist.remove( &[ 1 ] );

        playlist.reset();
        assert_eq!( names( &playlist ), vec![ "a", "b", "c" ] );
        assert_eq!( playlist.pristine().len(), 3 );
    }


    #[test]
    fn test_show_claims_snapshot_slots_once() {
        let mut playlist = playlist( &[ "a", "b", "a" ] );
        playlist.show( tracks( &[ "a", "a" ] ) );
        playlist.remove( &[ 1 ] );

        playlist.reset();
        assert_eq!( names( &playlist ), vec![ "a", "b" ] );
    }


    #[test]
    fn test_duplicates_are_kept() {
        let mut playlist = playlist( &[ "a", "a" ] );
        assert_eq!( playlist.len(), 2 );
        playlist.filter( "a" );
        assert_eq!( playlist.len(), 2 );
    }


    #[test]
    fn test_replace_all_clears_cursor() {
        let mut playlist = playlist( &[ "a", "b" ] );
        playlist.set_current( Some( 1 ) );
        playlist.replace_all( tracks( &[ "x" ] ) );
        assert_eq!( playlist.current_index(), None );
        assert_eq!( playlist.pristine().len(), 1 );
    }


    #[test]
    fn test_show_keeps_snapshot() {
        let mut playlist = playlist( &[ "a", "b", "c" ] );
        playlist.show( tracks( &[ "b" ] ) );
        assert_eq!( names( &playlist ), vec![ "b" ] );
        playlist.reset();
        assert_eq!( playlist.len(), 3 );
    }
}
