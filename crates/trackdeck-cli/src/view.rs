//! View mode management for the TUI.


/// What the main area shows.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum ViewMode {
    /// The playlist (default)
    #[default]
    Playlist,

    /// Command and key reference
    Help,
}


impl ViewMode {
    /// Header label for the view.
    pub fn title( &self ) -> &'static str {
        match self {
            ViewMode::Playlist => "PLAYLIST",
            ViewMode::Help => "HELP",
        }
    }


    /// Opens help from the playlist, and closes it again.
    pub fn toggle_help( self ) -> Self {
        match self {
            ViewMode::Playlist => ViewMode::Help,
            ViewMode::Help => ViewMode::Playlist,
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_toggle_help() {
        assert_eq!( ViewMode::default().toggle_help(), ViewMode::Help );
        assert_eq!( ViewMode::Help.toggle_help(), ViewMode::Playlist );
        assert_eq!( ViewMode::Help.title(), "HELP" );
    }
}
