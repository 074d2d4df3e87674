//! Command-line argument parsing for trackdeck.

use std::path::PathBuf;

use clap::Parser;


/// Trackdeck - A terminal playlist player.
#[derive( Parser, Debug )]
#[command( name = "trackdeck" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// User whose saved playlist is used.
    #[arg( short, long, default_value_t = 1 )]
    pub user: i64,

    /// Playlist database (defaults to the platform data directory).
    #[arg( long )]
    pub db: Option<PathBuf>,

    /// Starting volume, 0-100. Overrides the saved setting.
    #[arg( long, value_parser = clap::value_parser!( u8 ).range( 0..=100 ) )]
    pub volume: Option<u8>,

    /// Load the saved playlist on startup.
    #[arg( short, long )]
    pub load: bool,

    /// Files or directories to add to the playlist.
    #[arg( trailing_var_arg = true )]
    pub files: Vec<PathBuf>,
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from( [ "trackdeck" ] ).unwrap();
        assert_eq!( args.user, 1 );
        assert!( args.db.is_none() );
        assert!( args.volume.is_none() );
        assert!( !args.load );
        assert!( args.files.is_empty() );
    }


    #[test]
    fn test_all_options() {
        let args = Args::try_parse_from( [
            "trackdeck", "--user", "7", "--db", "/tmp/p.db", "--volume", "40", "--load", "a.mp3", "music",
        ]).unwrap();
        assert_eq!( args.user, 7 );
        assert_eq!( args.db, Some( PathBuf::from( "/tmp/p.db" ) ) );
        assert_eq!( args.volume, Some( 40 ) );
        assert!( args.load );
        assert_eq!( args.files, vec![ PathBuf::from( "a.mp3" ), PathBuf::from( "music" ) ] );
    }


    #[test]
    fn test_volume_out_of_range_is_rejected() {
        assert!( Args::try_parse_from( [ "trackdeck", "--volume", "150" ] ).is_err() );
    }
}
